//! Bootstraps a catalog source served by a registry pod.
//!
//! [`CatalogBootstrap::create_catalog`] walks a fixed sequence of steps and aborts on the
//! first failure, leaving whatever was already created in place:
//!
//! 1. resolve and validate the [`BundleSource`] and render the registry pod,
//! 2. create (or adopt) the catalog source with only its identity,
//! 3. create (or adopt) the registry pod, owned by the catalog source,
//! 4. wait for the pod to run,
//! 5. read the catalog source again and point it at the pod's gRPC address,
//! 6. annotate the catalog source with where its content came from,
//! 7. wait for OLM to report the catalog source connection as ready.
//!
//! Deleting the catalog source garbage-collects the pod through its owner reference.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Pod;
use kube_core::Resource;
use tokio_util::sync::CancellationToken;

use crate::{
    catalog::{
        new_catalog_source, registry_pod_host, CatalogSource, CATALOG_SOURCE_LABEL,
        INDEX_IMAGE_ANNOTATION, INJECTED_BUNDLES_ANNOTATION, INJECT_BUNDLE_MODE_ANNOTATION,
    },
    image::{resolve_database_path, ImageError, ImageInspector},
    name::catalog_name,
    poll::{await_condition, PollError},
    registry::{BuildError, BundleSource, ConfigurationError, RegistryPod, TemplateError},
    store::{create_or_adopt, ObjectKey, ResourceStore, StoreError},
    Config,
};

const POD_RUNNING: &str = "Running";
const POD_TERMINAL_PHASES: [&str; 2] = ["Failed", "Succeeded"];

#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("invalid registry pod: {0}")]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error(transparent)]
    Image(#[from] ImageError),
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Cancellation fired before `target` became ready.
    #[error("{target} is not ready: timed out waiting for the condition")]
    ReadinessTimeout { target: String },
    #[error("error in json marshal injected bundles: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("catalog source {0} has no uid to own the registry pod")]
    MissingOwnerUid(ObjectKey),
    #[error("registry pod {0} disappeared while waiting for it to run")]
    PodGone(ObjectKey),
    #[error("registry pod {0} is running without a pod IP")]
    MissingPodIp(ObjectKey),
    #[error("registry pod {key} terminated in phase {phase}")]
    PodTerminated { key: ObjectKey, phase: String },
    #[error("catalog source {0} disappeared before it became ready")]
    CatalogGone(ObjectKey),
}

impl BootstrapError {
    /// Whether the caller's deadline ran out before the catalog became ready,
    /// as opposed to the bootstrap failing outright.
    pub fn is_readiness_timeout(&self) -> bool {
        matches!(self, Self::ReadinessTimeout { .. })
    }
}

impl From<BuildError> for BootstrapError {
    fn from(err: BuildError) -> Self {
        match err {
            BuildError::Configuration(err) => Self::Configuration(err),
            BuildError::Template(err) => Self::Template(err),
        }
    }
}

/// Creates catalog sources through a [`ResourceStore`],
/// looking up index image labels through an [`ImageInspector`].
pub struct CatalogBootstrap<S, I> {
    store: S,
    images: I,
    config: Config,
}

impl<S: ResourceStore, I: ImageInspector> CatalogBootstrap<S, I> {
    pub fn new(store: S, images: I, config: Config) -> Self {
        Self {
            store,
            images,
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Creates the catalog source for `package` in `namespace`, backed by a registry pod
    /// serving `source`, and waits until OLM can reach it.
    ///
    /// `cancel` bounds both waits; there is no built-in deadline.
    /// Calling this again with the same arguments adopts the objects created before.
    pub async fn create_catalog(
        &self,
        source: &BundleSource,
        namespace: &str,
        package: &str,
        cancel: &CancellationToken,
    ) -> Result<CatalogSource, BootstrapError> {
        let mut source = source.clone();
        if source.database_path.is_none() {
            let index_image = source
                .index_image
                .as_deref()
                .filter(|image| !image.trim().is_empty())
                .unwrap_or(&self.config.default_index_image);
            source.database_path =
                Some(resolve_database_path(&self.images, index_image, &self.config).await?);
        }

        let registry = RegistryPod::resolve(&source, &self.config)?;
        let name = catalog_name(package);
        let mut pod = registry.to_pod(namespace, &self.config)?;
        pod.metadata
            .labels
            .get_or_insert_with(BTreeMap::new)
            .insert(CATALOG_SOURCE_LABEL.to_owned(), name.clone());

        log::info!("index image:       {:?}", registry.index_image);
        log::info!("database path:     {:?}", registry.database_path);
        log::info!("bundle image:      {:?}", registry.bundle_image);
        log::info!("injected bundles:  {:?}", registry.inject_bundles);
        log::info!("bundle add mode:   {:?}", registry.mode.as_str());

        let catalog = create_or_adopt(
            &self.store,
            new_catalog_source(&name, namespace, package, &self.config.publisher),
            None,
        )
        .await?
        .object;
        let catalog_key = ObjectKey::new(namespace, &name);

        let pod_key = ObjectKey::new(namespace, registry.name());
        let pod = self
            .create_registry_pod(&catalog, &catalog_key, pod, &pod_key, cancel)
            .await?;
        let pod_ip = pod
            .status
            .and_then(|status| status.pod_ip)
            .filter(|ip| !ip.is_empty())
            .ok_or_else(|| BootstrapError::MissingPodIp(pod_key.clone()))?;

        self.update_catalog_source(&catalog_key, &registry, &pod_ip).await?;
        log::info!("catalog source {catalog_key} points at registry pod {pod_key} ({pod_ip})");

        self.wait_for_catalog_source(&catalog_key, cancel).await
    }

    /// Lists the registry pods created for the catalog source `catalog`.
    pub async fn registry_pods(
        &self,
        namespace: &str,
        catalog: &str,
    ) -> Result<Vec<Pod>, BootstrapError> {
        let selector = format!("{CATALOG_SOURCE_LABEL}={catalog}");
        Ok(self.store.list::<Pod>(namespace, &selector).await?)
    }

    async fn create_registry_pod(
        &self,
        catalog: &CatalogSource,
        catalog_key: &ObjectKey,
        pod: Pod,
        pod_key: &ObjectKey,
        cancel: &CancellationToken,
    ) -> Result<Pod, BootstrapError> {
        let owner = catalog
            .owner_reference()
            .ok_or_else(|| BootstrapError::MissingOwnerUid(catalog_key.clone()))?;
        let adoption = create_or_adopt(&self.store, pod, Some(owner)).await?;
        if adoption.created {
            log::info!("created registry pod {pod_key}");
        } else {
            log::info!("adopted existing registry pod {pod_key}");
        }

        let fail_fast = self.config.fail_fast_on_terminal_phase;
        await_condition(self.config.poll_interval, cancel, move || async move {
            let current = self
                .store
                .get::<Pod>(pod_key)
                .await?
                .ok_or_else(|| BootstrapError::PodGone(pod_key.clone()))?;
            let phase = current
                .status
                .as_ref()
                .and_then(|status| status.phase.clone())
                .unwrap_or_default();
            log::debug!("registry pod {pod_key} is in phase {phase:?}");
            if fail_fast && POD_TERMINAL_PHASES.contains(&phase.as_str()) {
                return Err(BootstrapError::PodTerminated {
                    key: pod_key.clone(),
                    phase,
                });
            }
            Ok::<_, BootstrapError>((phase == POD_RUNNING).then_some(current))
        })
        .await
        .map_err(|err| readiness(err, format!("registry pod {pod_key}")))
    }

    /// Writes the registry address, then the provenance annotations.
    ///
    /// The catalog source is read again first: OLM may have written to it
    /// while the pod was starting, and an update must carry the latest version.
    async fn update_catalog_source(
        &self,
        key: &ObjectKey,
        registry: &RegistryPod,
        pod_ip: &str,
    ) -> Result<(), BootstrapError> {
        let mut catalog = self
            .store
            .get::<CatalogSource>(key)
            .await?
            .ok_or_else(|| BootstrapError::CatalogGone(key.clone()))?;
        catalog.set_grpc_address(registry_pod_host(pod_ip, self.config.grpc_port));
        let mut catalog = self.store.update(&catalog).await?;

        let injected_bundles = serde_json::to_string(&registry.inject_bundles)?;
        let annotations = catalog.meta_mut().annotations.get_or_insert_with(BTreeMap::new);
        annotations.insert(INDEX_IMAGE_ANNOTATION.to_owned(), registry.index_image.clone());
        annotations.insert(
            INJECT_BUNDLE_MODE_ANNOTATION.to_owned(),
            registry.mode.as_str().to_owned(),
        );
        annotations.insert(INJECTED_BUNDLES_ANNOTATION.to_owned(), injected_bundles);
        self.store.update(&catalog).await?;
        Ok(())
    }

    async fn wait_for_catalog_source(
        &self,
        key: &ObjectKey,
        cancel: &CancellationToken,
    ) -> Result<CatalogSource, BootstrapError> {
        await_condition(self.config.poll_interval, cancel, move || async move {
            let current = self
                .store
                .get::<CatalogSource>(key)
                .await?
                .ok_or_else(|| BootstrapError::CatalogGone(key.clone()))?;
            Ok::<_, BootstrapError>(current.is_ready().then_some(current))
        })
        .await
        .map_err(|err| readiness(err, format!("catalog source {key} connection")))
    }
}

fn readiness(err: PollError<BootstrapError>, target: String) -> BootstrapError {
    match err {
        PollError::Cancelled => BootstrapError::ReadinessTimeout { target },
        PollError::Check(err) => err,
    }
}
