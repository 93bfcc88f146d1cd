//! The OLM `CatalogSource` resource, reduced to the fields this crate reads and writes.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::CustomResource;
use kube_core::{ObjectMeta, Resource};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Annotation recording the index image the registry pod serves.
pub const INDEX_IMAGE_ANNOTATION: &str = "operators.operatorframework.io/index-image";
/// Annotation recording the graph update mode bundles were added with.
pub const INJECT_BUNDLE_MODE_ANNOTATION: &str = "operators.operatorframework.io/inject-bundle-mode";
/// Annotation recording the JSON array of bundles added to the index.
pub const INJECTED_BUNDLES_ANNOTATION: &str = "operators.operatorframework.io/injected-bundles";
/// Label placed on registry pods to select them by catalog source.
pub const CATALOG_SOURCE_LABEL: &str = "operators.operatorframework.io/catalog-source";

/// Connection state reported by OLM once it reaches the registry.
pub const READY_STATE: &str = "READY";

#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "operators.coreos.com",
    version = "v1alpha1",
    kind = "CatalogSource",
    plural = "catalogsources",
    namespaced,
    status = "CatalogSourceStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct CatalogSourceSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_type: Option<SourceType>,
    /// `host:port` of a gRPC registry, for [`SourceType::Grpc`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Grpc,
    Internal,
    Configmap,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CatalogSourceStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_state: Option<GrpcConnectionState>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GrpcConnectionState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default)]
    pub last_observed_state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_connect: Option<String>,
}

impl CatalogSource {
    /// Whether OLM reports a ready connection to the registry.
    pub fn is_ready(&self) -> bool {
        self.status
            .as_ref()
            .and_then(|status| status.connection_state.as_ref())
            .is_some_and(|state| state.last_observed_state == READY_STATE)
    }

    /// Points the catalog source at a gRPC registry.
    pub fn set_grpc_address(&mut self, address: String) {
        self.spec.source_type = Some(SourceType::Grpc);
        self.spec.address = Some(address);
    }

    /// A plain owner reference to this catalog source, neither controller nor blocking deletion.
    ///
    /// `None` until the catalog source has been stored and carries a name and uid.
    pub fn owner_reference(&self) -> Option<OwnerReference> {
        Some(OwnerReference {
            api_version: Self::api_version(&()).into_owned(),
            kind: Self::kind(&()).into_owned(),
            name: self.metadata.name.clone()?,
            uid: self.metadata.uid.clone()?,
            ..OwnerReference::default()
        })
    }
}

/// A catalog source carrying only its identity and publisher,
/// created before the registry pod so it can own the pod.
pub fn new_catalog_source(
    name: &str,
    namespace: &str,
    package: &str,
    publisher: &str,
) -> CatalogSource {
    CatalogSource {
        metadata: ObjectMeta {
            name: Some(name.to_owned()),
            namespace: Some(namespace.to_owned()),
            ..ObjectMeta::default()
        },
        spec: CatalogSourceSpec {
            display_name: Some(package.to_owned()),
            publisher: Some(publisher.to_owned()),
            ..CatalogSourceSpec::default()
        },
        status: None,
    }
}

/// The `host:port` address of a registry pod.
pub fn registry_pod_host(ip: &str, port: i32) -> String {
    format!("{ip}:{port}")
}
