//! S3 object store.

use async_trait::async_trait;
use aws_sdk_s3::Client;
use tracing::{debug, instrument};

use super::{ObjectEntry, ObjectStore};
use crate::errors::IngestError;

pub struct S3ObjectStore {
    client: Client,
}

impl S3ObjectStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    #[instrument(skip(self))]
    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectEntry>, IngestError> {
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .prefix(prefix)
            .into_paginator()
            .send();

        let mut entries = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| {
                IngestError::storage(format!("failed to list s3://{}/{}: {}", bucket, prefix, e))
            })?;
            for object in page.contents() {
                let Some(key) = object.key() else {
                    continue;
                };
                // folder placeholders
                if key.ends_with('/') {
                    continue;
                }
                entries.push(ObjectEntry {
                    key: key.to_string(),
                    size: object.size().unwrap_or(0).max(0) as u64,
                });
            }
        }

        debug!(objects = entries.len(), "Listed objects");
        Ok(entries)
    }

    #[instrument(skip(self))]
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, IngestError> {
        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| IngestError::storage(format!("failed to get s3://{}/{}: {}", bucket, key, e)))?;

        let data = response.body.collect().await.map_err(|e| {
            IngestError::storage(format!("failed to read s3://{}/{}: {}", bucket, key, e))
        })?;
        Ok(data.into_bytes().to_vec())
    }
}
