//! S3-compatible export account
//!
//! Containers map to buckets and file paths to object keys, so an export
//! laid out as `<container>/<workspace path>/y=../PT05M.json` is read as
//! bucket `<container>` with keys `<workspace path>/y=../PT05M.json`.
//!
//! Diagnostic exports land in Azure Blob Storage containers. This adapter
//! does not talk to Azure: it needs an S3-compatible mirror of the account
//! with one bucket per container, named like the container (`am-*`), and
//! object keys equal to the blob paths. Deleting an object only removes it
//! from the mirror.

use anyhow::Result;
use async_trait::async_trait;
use aws_sdk_s3::{
    config::{Credentials, Region},
    error::DisplayErrorContext,
    Client,
};
use futures::StreamExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, info, instrument};

use super::{config::S3StorageConfig, BlobStorage, ByteStream, ListPage, StorageError};

#[derive(Clone)]
pub struct S3Storage {
    client: Client,
}

impl S3Storage {
    pub async fn new(config: S3StorageConfig) -> Result<Self> {
        config.validate()?;
        debug!("Initializing storage with config: {:?}", config);

        let mut builder = match config.static_credentials() {
            Some((access_key, secret_key)) => {
                let credentials =
                    Credentials::new(access_key, secret_key, None, None, "logsync-storage");
                aws_sdk_s3::Config::builder()
                    .credentials_provider(credentials)
                    .region(Region::new(config.region.clone()))
            },
            None => {
                let shared = aws_config::defaults(aws_config::BehaviorVersion::latest())
                    .region(Region::new(config.region.clone()))
                    .load()
                    .await;
                aws_sdk_s3::config::Builder::from(&shared)
            },
        };

        builder = builder.force_path_style(config.path_style);
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        info!(
            region = %config.region,
            endpoint = config.endpoint.as_deref().unwrap_or("aws"),
            "Storage client initialized"
        );

        Ok(Self::from_client(Client::from_conf(builder.build())))
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl BlobStorage for S3Storage {
    #[instrument(skip(self))]
    async fn list_containers(
        &self,
        prefix: &str,
        marker: Option<String>,
    ) -> Result<ListPage, StorageError> {
        let output = self
            .client
            .list_buckets()
            .prefix(prefix)
            .set_continuation_token(marker)
            .send()
            .await
            .map_err(|e| StorageError::List {
                target: format!("containers with prefix {prefix:?}"),
                message: DisplayErrorContext(&e).to_string(),
            })?;

        // Older S3-compatible servers ignore the prefix parameter.
        let names = output
            .buckets()
            .iter()
            .filter_map(|bucket| bucket.name())
            .filter(|name| name.starts_with(prefix))
            .map(str::to_string)
            .collect();

        Ok(ListPage {
            names,
            next_marker: output.continuation_token().map(str::to_string),
        })
    }

    #[instrument(skip(self))]
    async fn list_files(
        &self,
        container: &str,
        marker: Option<String>,
    ) -> Result<ListPage, StorageError> {
        let output = self
            .client
            .list_objects_v2()
            .bucket(container)
            .set_continuation_token(marker)
            .send()
            .await
            .map_err(|e| StorageError::List {
                target: format!("files in {container}"),
                message: DisplayErrorContext(&e).to_string(),
            })?;

        let names = output
            .contents()
            .iter()
            .filter_map(|object| object.key())
            .map(str::to_string)
            .collect();

        let next_marker = if output.is_truncated().unwrap_or(false) {
            output.next_continuation_token().map(str::to_string)
        } else {
            None
        };

        Ok(ListPage { names, next_marker })
    }

    #[instrument(skip(self))]
    async fn open_read(&self, container: &str, path: &str) -> Result<ByteStream, StorageError> {
        let output = self
            .client
            .get_object()
            .bucket(container)
            .key(path)
            .send()
            .await
            .map_err(|e| StorageError::Read {
                container: container.to_string(),
                path: path.to_string(),
                message: DisplayErrorContext(&e).to_string(),
            })?;

        debug!(
            size = output.content_length().unwrap_or(-1),
            "Opened s3://{}/{}", container, path
        );

        Ok(ReaderStream::new(output.body.into_async_read()).boxed())
    }

    #[instrument(skip(self))]
    async fn delete(&self, container: &str, path: &str) -> Result<(), StorageError> {
        self.client
            .delete_object()
            .bucket(container)
            .key(path)
            .send()
            .await
            .map_err(|e| StorageError::Delete {
                container: container.to_string(),
                path: path.to_string(),
                message: DisplayErrorContext(&e).to_string(),
            })?;

        debug!("Deleted s3://{}/{}", container, path);
        Ok(())
    }
}
