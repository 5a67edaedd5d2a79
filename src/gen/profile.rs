//! TP-022: Version-pinned output formats.
//!
//! Each profile fixes one historical shape of generated code. The generator
//! picks a profile once, at construction, and consults it only while
//! printing.

use crate::core::error::{Error, Result};
use semver::Version;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FormatProfile {
    /// Before 0.17.0: untyped config getters, comments on resources only
    Legacy,
    /// 0.17.0 up to 0.17.28: typed config, `pulumi.interpolate`
    Outputs,
    /// 0.17.28 up to 1.0.0: data-source invokes take `{ async: true }`
    AsyncInvoke,
    /// 1.0.0 and later
    V1,
}

impl FormatProfile {
    /// Pick the profile for an SDK version string such as `0.17.1` or `v1.2.0`.
    pub fn from_version(version: &str) -> Result<Self> {
        let parsed = Version::parse(version.trim_start_matches('v')).map_err(|e| Error::Version {
            version: version.to_string(),
            message: e.to_string(),
        })?;
        let profile = if parsed < Version::new(0, 17, 0) {
            Self::Legacy
        } else if parsed < Version::new(0, 17, 28) {
            Self::Outputs
        } else if parsed < Version::new(1, 0, 0) {
            Self::AsyncInvoke
        } else {
            Self::V1
        };
        Ok(profile)
    }

    pub fn typed_config(self) -> bool {
        self >= Self::Outputs
    }

    pub fn interpolate(self) -> bool {
        self >= Self::Outputs
    }

    /// Whether comments are kept on every node kind or only on resources.
    pub fn comments_on_all_nodes(self) -> bool {
        self >= Self::Outputs
    }

    pub fn async_invoke(self) -> bool {
        self >= Self::AsyncInvoke
    }

    pub fn supports_prompt_data_sources(self) -> bool {
        self >= Self::AsyncInvoke
    }
}

impl fmt::Display for FormatProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Legacy => write!(f, "legacy"),
            Self::Outputs => write!(f, "outputs"),
            Self::AsyncInvoke => write!(f, "async-invoke"),
            Self::V1 => write!(f, "v1"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tp022_version_boundaries() {
        let cases = [
            ("0.16.0", FormatProfile::Legacy),
            ("0.17.0", FormatProfile::Outputs),
            ("0.17.1", FormatProfile::Outputs),
            ("0.17.27", FormatProfile::Outputs),
            ("0.17.28", FormatProfile::AsyncInvoke),
            ("1.0.0-beta.1", FormatProfile::AsyncInvoke),
            ("1.0.0", FormatProfile::V1),
            ("v2.3.4", FormatProfile::V1),
        ];
        for (version, expected) in cases {
            assert_eq!(FormatProfile::from_version(version).unwrap(), expected, "{}", version);
        }
    }

    #[test]
    fn test_tp022_bad_version() {
        let err = FormatProfile::from_version("latest").unwrap_err();
        assert!(matches!(err, Error::Version { ref version, .. } if version == "latest"));
    }

    #[test]
    fn test_tp022_feature_flags() {
        assert!(!FormatProfile::Legacy.typed_config());
        assert!(FormatProfile::Outputs.interpolate());
        assert!(!FormatProfile::Outputs.supports_prompt_data_sources());
        assert!(FormatProfile::AsyncInvoke.async_invoke());
        assert_eq!(FormatProfile::AsyncInvoke.to_string(), "async-invoke");
    }
}
