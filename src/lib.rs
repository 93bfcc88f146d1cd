//! olm-catalog-bootstrap publishes a bundle image as an OLM catalog on a cluster.
//!
//! Given a bundle image and optionally an index image, it starts a registry pod
//! that adds the bundle to the index database and serves it over gRPC,
//! creates a `CatalogSource` pointing at that pod,
//! and waits until OLM reports the catalog connection as ready.
//!
//! The cluster is reached through [`store::ResourceStore`] (implemented by [`store::KubeStore`])
//! and image labels through [`image::ImageInspector`];
//! [`CatalogBootstrap`] drives the whole sequence.

pub mod bootstrap;
pub use bootstrap::{BootstrapError, CatalogBootstrap};
pub mod catalog;
pub use catalog::CatalogSource;
pub mod config;
pub use config::Config;
pub mod image;
pub mod name;
pub mod poll;
pub mod registry;
pub use registry::{BundleSource, GraphUpdateMode};
pub mod store;

/// Errors from collaborators whose concrete error type this crate does not know.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;
