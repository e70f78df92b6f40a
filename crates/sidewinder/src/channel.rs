//! Channel configuration.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use url::Url;

/// Describes how channel strings are interpreted and how the resolver
/// weighs channels against versions. The configuration is immutable for
/// the lifetime of a [`crate::Resolve`] instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// A url prefixed to channel names that are not themselves urls, e.g.
    /// "conda-forge" refers to `<channel_alias>/conda-forge`.
    pub channel_alias: Url,

    /// When true, a channel's priority number outranks version freshness.
    pub channel_priority: bool,

    /// The platform subdirectory this index was taken from.
    pub subdir: String,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        ChannelConfig {
            channel_alias: Url::from_str("https://conda.anaconda.org")
                .expect("could not parse default channel alias"),
            channel_priority: false,
            subdir: "linux-64".to_owned(),
        }
    }
}

impl ChannelConfig {
    /// The short, canonical name of a channel: alias-relative urls are
    /// stripped down to their channel path, a trailing platform segment is
    /// dropped, and an unknown channel maps to `<unknown>`.
    pub fn canonical_channel_name(&self, channel: Option<&str>) -> String {
        let Some(channel) = channel else {
            return "<unknown>".to_owned();
        };
        if channel == "defaults" {
            return channel.to_owned();
        }
        if let Some(rest) = channel.strip_prefix(self.channel_alias.as_str()) {
            let mut segments: Vec<&str> = rest.trim_matches('/').split('/').collect();
            if segments.last() == Some(&self.subdir.as_str()) {
                segments.pop();
            }
            return segments.join("/");
        }
        channel.trim_end_matches('/').to_owned()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn canonical_names() {
        let config = ChannelConfig::default();
        assert_eq!(config.canonical_channel_name(None), "<unknown>");
        assert_eq!(config.canonical_channel_name(Some("defaults")), "defaults");
        assert_eq!(
            config.canonical_channel_name(Some("https://conda.anaconda.org/conda-forge/linux-64")),
            "conda-forge"
        );
        assert_eq!(
            config.canonical_channel_name(Some("https://conda.anaconda.org/t/tok/conda-forge")),
            "t/tok/conda-forge"
        );
        assert_eq!(config.canonical_channel_name(Some("other")), "other");
    }

    #[test]
    fn config_round_trips_through_serde() {
        let config = ChannelConfig {
            channel_priority: true,
            subdir: "osx-64".to_owned(),
            ..ChannelConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: ChannelConfig = serde_json::from_str(&json).unwrap();
        assert!(back.channel_priority);
        assert_eq!(back.subdir, "osx-64");
    }
}
