//! The narrow slice of the cluster resource store this crate depends on.

use std::{fmt, future::Future};

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube_client::{
    api::{ListParams, PostParams},
    Api, Client,
};
use kube_core::{NamespaceResourceScope, Resource};
use serde::{de::DeserializeOwned, Serialize};

use crate::BoxError;

/// Uniquely identifies a namespaced object of a known type.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectKey {
    /// The object namespace
    pub namespace: String,
    /// The object name
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// The key of `resource`, if it has both a name and a namespace.
    pub fn from_resource<K: Resource>(resource: &K) -> Option<Self> {
        Some(Self {
            namespace: resource.meta().namespace.clone()?,
            name: resource.meta().name.clone()?,
        })
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Objects that can be kept in a [`ResourceStore`].
pub trait StoreObject:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + fmt::Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
}

impl<K> StoreObject for K where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + fmt::Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static
{
}

/// The store operation that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Get,
    Create,
    Update,
    List,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Get => "get",
            Self::Create => "create",
            Self::Update => "update",
            Self::List => "list",
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A create raced with another writer of the same key.
    #[error("{kind} {key} already exists")]
    AlreadyExists { kind: String, key: ObjectKey },
    /// The object has no name or namespace to address it by.
    #[error("{kind} has no name or namespace")]
    MissingKey { kind: String },
    #[error("error in {operation} {kind} {key}: {source}")]
    Api {
        operation: Operation,
        kind: String,
        key: String,
        #[source]
        source: BoxError,
    },
}

impl StoreError {
    pub fn api<K: StoreObject>(
        operation: Operation,
        key: impl fmt::Display,
        source: impl Into<BoxError>,
    ) -> Self {
        Self::Api {
            operation,
            kind: K::kind(&()).into_owned(),
            key: key.to_string(),
            source: source.into(),
        }
    }
}

/// Create, read, update and list access to namespaced objects.
///
/// `get` reports a missing object as `Ok(None)`;
/// `create` reports a name collision as [`StoreError::AlreadyExists`].
pub trait ResourceStore: Send + Sync {
    fn get<K: StoreObject>(
        &self,
        key: &ObjectKey,
    ) -> impl Future<Output = Result<Option<K>, StoreError>> + Send;

    fn create<K: StoreObject>(&self, object: &K)
        -> impl Future<Output = Result<K, StoreError>> + Send;

    fn update<K: StoreObject>(&self, object: &K)
        -> impl Future<Output = Result<K, StoreError>> + Send;

    fn list<K: StoreObject>(
        &self,
        namespace: &str,
        label_selector: &str,
    ) -> impl Future<Output = Result<Vec<K>, StoreError>> + Send;
}

/// A [`ResourceStore`] backed by the apiserver.
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api<K: StoreObject>(&self, namespace: &str) -> Api<K> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn object_key<K: StoreObject>(object: &K) -> Result<ObjectKey, StoreError> {
    ObjectKey::from_resource(object).ok_or_else(|| StoreError::MissingKey {
        kind: K::kind(&()).into_owned(),
    })
}

impl ResourceStore for KubeStore {
    async fn get<K: StoreObject>(&self, key: &ObjectKey) -> Result<Option<K>, StoreError> {
        self.api::<K>(&key.namespace)
            .get_opt(&key.name)
            .await
            .map_err(|err| StoreError::api::<K>(Operation::Get, key, err))
    }

    async fn create<K: StoreObject>(&self, object: &K) -> Result<K, StoreError> {
        let key = object_key(object)?;
        match self
            .api::<K>(&key.namespace)
            .create(&PostParams::default(), object)
            .await
        {
            Ok(created) => Ok(created),
            Err(kube_client::Error::Api(err)) if err.code == 409 => {
                Err(StoreError::AlreadyExists {
                    kind: K::kind(&()).into_owned(),
                    key,
                })
            }
            Err(err) => Err(StoreError::api::<K>(Operation::Create, key, err)),
        }
    }

    async fn update<K: StoreObject>(&self, object: &K) -> Result<K, StoreError> {
        let key = object_key(object)?;
        self.api::<K>(&key.namespace)
            .replace(&key.name, &PostParams::default(), object)
            .await
            .map_err(|err| StoreError::api::<K>(Operation::Update, key, err))
    }

    async fn list<K: StoreObject>(
        &self,
        namespace: &str,
        label_selector: &str,
    ) -> Result<Vec<K>, StoreError> {
        self.api::<K>(namespace)
            .list(&ListParams::default().labels(label_selector))
            .await
            .map(|list| list.items)
            .map_err(|err| {
                StoreError::api::<K>(
                    Operation::List,
                    format!("{namespace} ({label_selector})"),
                    err,
                )
            })
    }
}

/// Result of [`create_or_adopt`].
#[derive(Debug, Clone)]
pub struct Adoption<K> {
    /// The live object.
    pub object: K,
    /// Whether this call created the object, rather than finding an existing one.
    pub created: bool,
}

/// Returns the object stored under `desired`'s key, creating `desired` if there is none.
///
/// A newly created object is owned by `owner`. An existing object is returned unchanged,
/// including when another writer created it between the read and the create.
/// No other failure is retried.
pub async fn create_or_adopt<S, K>(
    store: &S,
    mut desired: K,
    owner: Option<OwnerReference>,
) -> Result<Adoption<K>, StoreError>
where
    S: ResourceStore,
    K: StoreObject,
{
    let key = object_key(&desired)?;
    let kind = K::kind(&());

    if let Some(existing) = store.get::<K>(&key).await? {
        log::debug!("adopting existing {kind} {key}");
        return Ok(Adoption {
            object: existing,
            created: false,
        });
    }

    if let Some(owner) = owner {
        let refs = desired.meta_mut().owner_references.get_or_insert_with(Vec::new);
        if !refs.iter().any(|existing| existing.uid == owner.uid) {
            refs.push(owner);
        }
    }

    match store.create(&desired).await {
        Ok(object) => {
            log::debug!("created {kind} {key}");
            Ok(Adoption {
                object,
                created: true,
            })
        }
        Err(StoreError::AlreadyExists { kind, key }) => {
            log::debug!("{kind} {key} was created concurrently, adopting it");
            match store.get::<K>(&key).await? {
                Some(object) => Ok(Adoption {
                    object,
                    created: false,
                }),
                None => Err(StoreError::AlreadyExists { kind, key }),
            }
        }
        Err(err) => Err(err),
    }
}
