//! Registry pods: resolve a [`BundleSource`] and render the pod that serves it.

/// What a catalog is bootstrapped from.
///
/// Unset fields are resolved by [`RegistryPod::resolve`]:
/// the index image falls back to [`Config::default_index_image`](crate::Config::default_index_image),
/// the database path to [`Config::default_database_path`](crate::Config::default_database_path),
/// the mode to [`GraphUpdateMode::default_for`] the resolved index image,
/// and the injected bundles to the bundle image alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BundleSource {
    /// The bundle image to add to the index.
    pub bundle_image: String,
    /// The index image the registry runs from.
    pub index_image: Option<String>,
    /// The registry database path inside the index image.
    pub database_path: Option<String>,
    /// The raw graph update mode, parsed with [`GraphUpdateMode::parse`].
    pub mode: Option<String>,
    /// Bundles recorded on the catalog source as injected into the index.
    pub inject_bundles: Option<Vec<String>>,
}

impl BundleSource {
    pub fn new(bundle_image: impl Into<String>) -> Self {
        Self {
            bundle_image: bundle_image.into(),
            ..Self::default()
        }
    }

    pub fn with_index_image(mut self, index_image: impl Into<String>) -> Self {
        self.index_image = Some(index_image.into());
        self
    }

    pub fn with_database_path(mut self, database_path: impl Into<String>) -> Self {
        self.database_path = Some(database_path.into());
        self
    }

    pub fn with_mode(mut self, mode: impl Into<String>) -> Self {
        self.mode = Some(mode.into());
        self
    }

    pub fn with_inject_bundles<B: Into<String>>(
        mut self,
        bundles: impl IntoIterator<Item = B>,
    ) -> Self {
        self.inject_bundles = Some(bundles.into_iter().map(Into::into).collect());
        self
    }
}

/// Invalid bundle source parameters, reported before anything is created.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("bundle image cannot be empty")]
    EmptyBundleImage,
    #[error("registry database path cannot be empty")]
    EmptyDatabasePath,
    #[error("bundle add mode cannot be empty")]
    EmptyBundleAddMode,
    #[error("unknown bundle add mode {0:?}")]
    UnknownBundleAddMode(String),
    #[error("{field} {value:?} contains disallowed character {ch:?}")]
    DisallowedCharacter {
        field: &'static str,
        value: String,
        ch: char,
    },
    #[error("bundle image {0:?} does not yield a valid pod name")]
    UnnamedBundleImage(String),
}

/// The container command could not be rendered.
#[derive(Debug, thiserror::Error)]
#[error("error in rendering container command: {0}")]
pub struct TemplateError(#[from] std::fmt::Error);

pub mod mode;
pub use mode::GraphUpdateMode;

pub mod pod;
pub use pod::{build, BuildError, RegistryPod};
