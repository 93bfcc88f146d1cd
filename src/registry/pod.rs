use std::fmt::Write;

use k8s_openapi::api::core::v1::{Container, ContainerPort, Pod, PodSpec};
use kube_core::ObjectMeta;

use super::{BundleSource, ConfigurationError, GraphUpdateMode, TemplateError};
use crate::{name::derive_name, Config};

/// A fully resolved registry pod: every field defaulted and validated,
/// so each value is safe to place in the container's shell command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryPod {
    pub bundle_image: String,
    pub index_image: String,
    pub database_path: String,
    pub mode: GraphUpdateMode,
    pub inject_bundles: Vec<String>,
}

impl RegistryPod {
    /// Applies defaults from `config` and validates the result.
    ///
    /// Checks run in a fixed order and the first failure is returned:
    /// bundle image, database path, mode, the character allow-lists,
    /// then whether the bundle image yields a pod name at all.
    pub fn resolve(source: &BundleSource, config: &Config) -> Result<Self, ConfigurationError> {
        let index_image = source
            .index_image
            .as_deref()
            .filter(|image| !image.trim().is_empty())
            .unwrap_or(&config.default_index_image)
            .to_owned();
        let database_path = source
            .database_path
            .clone()
            .unwrap_or_else(|| config.default_database_path.clone());

        if source.bundle_image.trim().is_empty() {
            return Err(ConfigurationError::EmptyBundleImage);
        }
        if database_path.trim().is_empty() {
            return Err(ConfigurationError::EmptyDatabasePath);
        }
        let mode = match source.mode.as_deref() {
            Some(raw) => GraphUpdateMode::parse(raw)?,
            None => GraphUpdateMode::default_for(&index_image, &config.default_index_image),
        };

        // These values end up in `sh -c`, so only plain reference and path characters pass.
        check_characters("bundle image", &source.bundle_image, is_image_reference_char)?;
        check_characters("registry database path", &database_path, is_path_char)?;
        if derive_name(&source.bundle_image).is_empty() {
            return Err(ConfigurationError::UnnamedBundleImage(
                source.bundle_image.clone(),
            ));
        }

        let inject_bundles = source
            .inject_bundles
            .clone()
            .unwrap_or_else(|| vec![source.bundle_image.clone()]);

        Ok(Self {
            bundle_image: source.bundle_image.clone(),
            index_image,
            database_path,
            mode,
            inject_bundles,
        })
    }

    /// The pod name, derived from the bundle image.
    pub fn name(&self) -> String {
        derive_name(&self.bundle_image)
    }

    /// Renders the shell pipeline run in the registry container:
    /// create the database directory, add the bundle, serve the database.
    pub fn container_command(&self, grpc_port: i32) -> Result<String, TemplateError> {
        let db = &self.database_path;
        let mut command = String::new();
        write!(command, "/bin/mkdir -p {db} &&")?;
        write!(
            command,
            "/bin/opm registry add -d {db} -b {bundle} --mode={mode} &&",
            bundle = self.bundle_image,
            mode = self.mode,
        )?;
        write!(command, "/bin/opm registry serve -d {db} -p {grpc_port}")?;
        Ok(command)
    }

    /// The pod definition, without owner references.
    pub fn to_pod(&self, namespace: &str, config: &Config) -> Result<Pod, TemplateError> {
        let command = self.container_command(config.grpc_port)?;

        Ok(Pod {
            metadata: ObjectMeta {
                name: Some(self.name()),
                namespace: Some(namespace.to_owned()),
                ..ObjectMeta::default()
            },
            spec: Some(PodSpec {
                containers: vec![Container {
                    name: config.container_name.clone(),
                    image: Some(self.index_image.clone()),
                    command: Some(vec!["/bin/sh".to_owned(), "-c".to_owned(), command]),
                    ports: Some(vec![ContainerPort {
                        name: Some(config.container_port_name.clone()),
                        container_port: config.grpc_port,
                        ..ContainerPort::default()
                    }]),
                    ..Container::default()
                }],
                ..PodSpec::default()
            }),
            status: None,
        })
    }
}

/// Errors from [`build`].
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("invalid registry pod: {0}")]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Template(#[from] TemplateError),
}

/// Resolves `source` and renders its registry pod in `namespace`.
pub fn build(
    source: &BundleSource,
    namespace: &str,
    config: &Config,
) -> Result<(RegistryPod, Pod), BuildError> {
    let registry = RegistryPod::resolve(source, config)?;
    let pod = registry.to_pod(namespace, config)?;
    Ok((registry, pod))
}

fn check_characters(
    field: &'static str,
    value: &str,
    allowed: fn(char) -> bool,
) -> Result<(), ConfigurationError> {
    match value.chars().find(|&ch| !allowed(ch)) {
        Some(ch) => Err(ConfigurationError::DisallowedCharacter {
            field,
            value: value.to_owned(),
            ch,
        }),
        None => Ok(()),
    }
}

fn is_image_reference_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '/' | ':' | '@' | '+' | '-')
}

fn is_path_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '/' | '-')
}
