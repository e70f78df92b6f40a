//! The package index model.
//!
//! On the wire the index is a JSON object mapping artifact filenames
//! (`name-version-build.tar.bz2`, optionally prefixed `channel::`) to
//! package records.

use std::cmp::Ordering;
use std::rc::Rc;

use fxhash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::channel::ChannelConfig;
use crate::version::{ParseVersionError, Version};

fn default_priority() -> i64 {
    1
}

/// A single record from the package index. Unknown fields are ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageRecord {
    pub name: String,
    pub version: String,
    pub build: String,
    #[serde(default)]
    pub build_number: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schannel: Option<String>,
    #[serde(default = "default_priority")]
    pub priority: i64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends: Vec<String>,
    /// Space-separated tags this artifact provides.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub features: String,
    /// Space-separated tags whose presence activates features.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub track_features: String,
    /// Extra dependencies keyed by the feature set that activates them.
    #[serde(default, skip_serializing_if = "FxHashMap::is_empty")]
    pub with_features_depends: FxHashMap<String, Vec<String>>,
    /// Present iff the artifact is currently installed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<serde_json::Value>,
}

impl PackageRecord {
    pub fn is_installed(&self) -> bool {
        self.link.is_some()
    }
}

/// The raw index: fkey to record.
pub type PackageIndex = FxHashMap<String, PackageRecord>;

/// Parses an index snapshot from its JSON wire format.
pub fn index_from_json(json: &str) -> Result<PackageIndex, serde_json::Error> {
    serde_json::from_str(json)
}

/// A sortable view over an index record. Ordering compares the normalized
/// version, the build number and the build string, and is only defined
/// between packages of the same name.
#[derive(Debug, Clone)]
pub struct Package {
    fkey: String,
    norm_version: Version,
    schannel: String,
    record: Rc<PackageRecord>,
}

impl Package {
    pub fn new(
        fkey: &str,
        record: Rc<PackageRecord>,
        config: &ChannelConfig,
    ) -> Result<Self, ParseVersionError> {
        let norm_version = record.version.parse().map_err(|err| {
            error!("the version of package {fkey} cannot be parsed: {err}");
            err
        })?;
        let schannel = record
            .schannel
            .clone()
            .unwrap_or_else(|| config.canonical_channel_name(record.channel.as_deref()));
        Ok(Package {
            fkey: fkey.to_owned(),
            norm_version,
            schannel,
            record,
        })
    }

    pub fn fkey(&self) -> &str {
        &self.fkey
    }

    pub fn name(&self) -> &str {
        &self.record.name
    }

    pub fn version(&self) -> &Version {
        &self.norm_version
    }

    pub fn build(&self) -> &str {
        &self.record.build
    }

    pub fn build_number(&self) -> u64 {
        self.record.build_number
    }

    pub fn schannel(&self) -> &str {
        &self.schannel
    }

    pub fn record(&self) -> &PackageRecord {
        &self.record
    }
}

impl PartialEq for Package {
    fn eq(&self, other: &Self) -> bool {
        self.name() == other.name()
            && self.norm_version == other.norm_version
            && self.build_number() == other.build_number()
            && self.build() == other.build()
    }
}

impl Eq for Package {}

/// Packages of different names do not order.
impl PartialOrd for Package {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self.name() != other.name() {
            return None;
        }
        Some(
            (&self.norm_version, self.build_number(), self.build()).cmp(&(
                &other.norm_version,
                other.build_number(),
                other.build(),
            )),
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn record(json: &str) -> Rc<PackageRecord> {
        Rc::new(serde_json::from_str(json).unwrap())
    }

    fn package(fkey: &str, json: &str) -> Package {
        Package::new(fkey, record(json), &ChannelConfig::default()).unwrap()
    }

    #[test]
    fn defaults_fill_sparse_records() {
        let rec = record(r#"{ "name": "zlib", "version": "1.2.7", "build": "0" }"#);
        assert_eq!(rec.build_number, 0);
        assert_eq!(rec.priority, 1);
        assert!(rec.depends.is_empty());
        assert!(rec.features.is_empty());
        assert!(!rec.is_installed());
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let rec = record(
            r#"{ "name": "zlib", "version": "1.2.7", "build": "0",
                 "requires": [], "md5": "d41d8", "size": 0 }"#,
        );
        assert_eq!(rec.name, "zlib");
    }

    #[test]
    fn link_marks_installed() {
        let rec = record(
            r#"{ "name": "zlib", "version": "1.2.7", "build": "0",
                 "link": { "source": "/opt/pkgs/zlib-1.2.7-0" } }"#,
        );
        assert!(rec.is_installed());
    }

    #[test]
    fn ordering_within_a_name() {
        let older = package(
            "sympy-0.7.1-py27_0.tar.bz2",
            r#"{ "name": "sympy", "version": "0.7.1", "build": "py27_0" }"#,
        );
        let newer = package(
            "sympy-0.7.2-py27_0.tar.bz2",
            r#"{ "name": "sympy", "version": "0.7.2", "build": "py27_0" }"#,
        );
        assert!(older < newer);
        assert!(!(newer < older));
        assert!(older <= older.clone());
        assert_eq!(older, older.clone());
        assert_ne!(older, newer);
    }

    #[test]
    fn ordering_across_names_is_undefined() {
        let sympy = package(
            "sympy-0.7.1-py27_0.tar.bz2",
            r#"{ "name": "sympy", "version": "0.7.1", "build": "py27_0" }"#,
        );
        let python = package(
            "python-2.7.5-0.tar.bz2",
            r#"{ "name": "python", "version": "2.7.5", "build": "0" }"#,
        );
        assert_eq!(sympy.partial_cmp(&python), None);
        assert!(!(sympy < python));
        assert!(!(sympy > python));
        assert_ne!(sympy, python);
    }

    #[test]
    fn equality_ignores_channel_and_features() {
        let plain = package(
            "numpy-1.7.1-py27_0.tar.bz2",
            r#"{ "name": "numpy", "version": "1.7.1", "build": "py27_0" }"#,
        );
        let other_channel = package(
            "other::numpy-1.7.1-py27_0.tar.bz2",
            r#"{ "name": "numpy", "version": "1.7.1", "build": "py27_0",
                 "channel": "https://conda.anaconda.org/other/linux-64", "priority": 0 }"#,
        );
        assert_eq!(plain, other_channel);
        assert_eq!(other_channel.schannel(), "other");
    }

    #[test]
    fn featured_build_sorts_after_plain_build() {
        let plain = package(
            "numpy-1.7.1-py27_0.tar.bz2",
            r#"{ "name": "numpy", "version": "1.7.1", "build": "py27_0" }"#,
        );
        let featured = package(
            "numpy-1.7.1-py27_p0.tar.bz2",
            r#"{ "name": "numpy", "version": "1.7.1", "build": "py27_p0",
                 "features": "mkl", "depends": ["mkl-rt 11.0"] }"#,
        );
        assert!(plain < featured);
        assert_ne!(plain, featured);
    }

    #[test]
    fn bad_version_is_reported() {
        let rec = record(r#"{ "name": "bad", "version": "not a version", "build": "0" }"#);
        assert!(Package::new("bad-x-0.tar.bz2", rec, &ChannelConfig::default()).is_err());
    }

    #[test]
    fn index_round_trip() {
        let index = index_from_json(
            r#"{ "zlib-1.2.7-0.tar.bz2": { "name": "zlib", "version": "1.2.7", "build": "0" } }"#,
        )
        .unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index["zlib-1.2.7-0.tar.bz2"].name, "zlib");
    }
}
