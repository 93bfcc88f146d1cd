use std::fmt;

use super::ConfigurationError;

/// How `opm registry add` threads a new bundle into the existing upgrade graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GraphUpdateMode {
    /// Channel heads are ordered by bundle version.
    Semver,
    /// Bundles link to their predecessor through `spec.replaces`.
    Replaces,
}

impl GraphUpdateMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Semver => "semver",
            Self::Replaces => "replaces",
        }
    }

    /// Parses a mode as accepted by `opm registry add --mode`.
    pub fn parse(raw: &str) -> Result<Self, ConfigurationError> {
        match raw {
            "semver" => Ok(Self::Semver),
            "replaces" => Ok(Self::Replaces),
            _ if raw.trim().is_empty() => Err(ConfigurationError::EmptyBundleAddMode),
            _ => Err(ConfigurationError::UnknownBundleAddMode(raw.to_owned())),
        }
    }

    /// The mode used when none is given: `semver` for the stock builder image,
    /// `replaces` for any other index image, whose graph was presumably built that way.
    pub fn default_for(index_image: &str, default_index_image: &str) -> Self {
        if index_image == default_index_image {
            Self::Semver
        } else {
            Self::Replaces
        }
    }
}

impl fmt::Display for GraphUpdateMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
