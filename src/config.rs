use std::time::Duration;

use serde::{Deserialize, Serialize};

/// The opm builder image used when no index image is supplied.
pub const DEFAULT_INDEX_IMAGE: &str = "quay.io/operator-framework/upstream-opm-builder:latest";
/// Where the registry database lives inside an index image without a database label.
pub const DEFAULT_DATABASE_PATH: &str = "/database/index.db";
/// The gRPC port the registry pod serves on.
pub const DEFAULT_GRPC_PORT: i32 = 50051;

/// Parameters for [`CatalogBootstrap`](crate::CatalogBootstrap) and the registry pod builder.
///
/// Every field has a default, so a partial document deserializes into a usable config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    /// Index image used when the bundle source does not name one.
    pub default_index_image: String,
    /// Database path used when the index image carries no database label.
    pub default_database_path: String,
    /// Port the registry serves gRPC on, also used in the catalog source address.
    pub grpc_port: i32,
    /// Name of the single registry container.
    pub container_name: String,
    /// Name of the registry container port.
    pub container_port_name: String,
    /// Publisher recorded on newly created catalog sources.
    pub publisher: String,
    /// Delay between readiness checks.
    pub poll_interval: Duration,
    /// Abort the pod wait once the pod reaches `Failed` or `Succeeded`
    /// instead of polling until cancellation.
    pub fail_fast_on_terminal_phase: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_index_image: DEFAULT_INDEX_IMAGE.to_owned(),
            default_database_path: DEFAULT_DATABASE_PATH.to_owned(),
            grpc_port: DEFAULT_GRPC_PORT,
            container_name: "registry-grpc".to_owned(),
            container_port_name: "grpc".to_owned(),
            publisher: "operator-sdk".to_owned(),
            poll_interval: Duration::from_millis(200),
            fail_fast_on_terminal_phase: false,
        }
    }
}

impl Config {
    /// Overrides the readiness poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Opts into failing the pod wait on terminal pod phases.
    pub fn fail_fast(mut self) -> Self {
        self.fail_fast_on_terminal_phase = true;
        self
    }
}
