use std::{collections::BTreeMap, future::Future};

use crate::{BoxError, Config};

/// Label on index images naming the registry database path.
pub const DATABASE_PATH_LABEL: &str = "operators.operatorframework.io.index.database.v1";

/// Reads the labels of a container image, e.g. from its registry manifest.
pub trait ImageInspector: Send + Sync {
    fn image_labels(
        &self,
        image: &str,
    ) -> impl Future<Output = Result<BTreeMap<String, String>, BoxError>> + Send;
}

/// Image labels could not be read.
#[derive(Debug, thiserror::Error)]
#[error("get index image labels for {image}: {source}")]
pub struct ImageError {
    pub image: String,
    #[source]
    pub source: BoxError,
}

/// The database path declared by `index_image`, or the configured default.
pub async fn resolve_database_path<I: ImageInspector>(
    inspector: &I,
    index_image: &str,
    config: &Config,
) -> Result<String, ImageError> {
    let labels = inspector
        .image_labels(index_image)
        .await
        .map_err(|source| ImageError {
            image: index_image.to_owned(),
            source,
        })?;

    Ok(match labels.get(DATABASE_PATH_LABEL) {
        Some(path) => {
            log::debug!("index image {index_image} declares database path {path}");
            path.clone()
        }
        None => config.default_database_path.clone(),
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Serves fixed labels for every image, or fails every lookup.
    pub(crate) struct StaticLabels(pub Option<BTreeMap<String, String>>);

    impl ImageInspector for StaticLabels {
        async fn image_labels(&self, image: &str) -> Result<BTreeMap<String, String>, BoxError> {
            self.0
                .clone()
                .ok_or_else(|| format!("manifest unknown: {image}").into())
        }
    }

    #[tokio::test]
    async fn label_overrides_default() {
        let inspector = StaticLabels(Some(BTreeMap::from([(
            DATABASE_PATH_LABEL.to_owned(),
            "/var/lib/registry/index.db".to_owned(),
        )])));
        let path = resolve_database_path(&inspector, "quay.io/example/index:v1", &Config::default())
            .await
            .unwrap();
        assert_eq!(path, "/var/lib/registry/index.db");
    }

    #[tokio::test]
    async fn default_without_label() {
        let inspector = StaticLabels(Some(BTreeMap::new()));
        let path = resolve_database_path(&inspector, "quay.io/example/index:v1", &Config::default())
            .await
            .unwrap();
        assert_eq!(path, "/database/index.db");
    }

    #[tokio::test]
    async fn inspection_failure_names_image() {
        let err = resolve_database_path(&StaticLabels(None), "quay.io/example/index:v1", &Config::default())
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "get index image labels for quay.io/example/index:v1: manifest unknown: quay.io/example/index:v1"
        );
    }
}
