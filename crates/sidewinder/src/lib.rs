mod channel;
mod logic;
mod match_spec;
mod repo_data;
mod solver;
pub(crate) mod utils;
mod version;
mod version_spec;

pub use channel::ChannelConfig;
pub use logic::{minimal_unsatisfiable_subset, Clauses, Lit, Model, FALSE, TRUE};
pub use match_spec::{MatchSpec, ParseMatchSpecError};
pub use repo_data::{index_from_json, Package, PackageIndex, PackageRecord};
pub use solver::{NoPackagesFound, Resolve, ResolveError, Unsatisfiable};
pub use version::{ParseVersionError, Version};
pub use version_spec::{ParseVersionSpecError, VersionSpec};
