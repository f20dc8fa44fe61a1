//! Abstractions over S3-compatible storage used to stage warehouse exports.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Mutex;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::provider::SharedCredentialsProvider;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use bytes::Bytes;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct S3Config {
    pub bucket: String,
    pub region: String,
    pub endpoint: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub force_path_style: bool,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            bucket: "geoferry-staging".to_string(),
            region: "us-east-1".to_string(),
            endpoint: None,
            access_key_id: None,
            secret_access_key: None,
            force_path_style: false,
        }
    }
}

#[derive(Debug, Error)]
pub enum BucketError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("sdk error: {0}")]
    Sdk(String),
    #[error("object not found: {0}")]
    NotFound(String),
}

impl BucketError {
    fn from_sdk(err: impl fmt::Display) -> Self {
        Self::Sdk(err.to_string())
    }
}

/// Render the `s3://bucket/key` handle other services use to reference an object.
pub fn object_url(bucket: &str, key: &str) -> String {
    format!("s3://{bucket}/{key}")
}

#[async_trait]
pub trait BucketStore: Send + Sync {
    async fn put_object(
        &self,
        key: &str,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<(), BucketError>;
    async fn get_object(&self, key: &str) -> Result<Bytes, BucketError>;
    /// List every key under `prefix`, following pagination to exhaustion.
    async fn list_prefix(&self, prefix: &str) -> Result<Vec<String>, BucketError>;
    async fn delete_object(&self, key: &str) -> Result<(), BucketError>;
}

#[derive(Clone)]
pub struct S3BucketStore {
    client: Client,
    bucket: String,
}

impl S3BucketStore {
    pub async fn new(config: S3Config) -> Result<Self, BucketError> {
        if config.bucket.is_empty() {
            return Err(BucketError::Configuration(
                "bucket name cannot be empty".into(),
            ));
        }

        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()));

        if let (Some(access_key), Some(secret_key)) =
            (&config.access_key_id, &config.secret_access_key)
        {
            let credentials = Credentials::new(access_key, secret_key, None, None, "static");
            loader = loader.credentials_provider(SharedCredentialsProvider::new(credentials));
        }

        let shared_config = loader.load().await;
        let mut builder = aws_sdk_s3::config::Builder::from(&shared_config);

        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        if config.force_path_style {
            builder = builder.force_path_style(true);
        }

        let client = Client::from_conf(builder.build());
        Ok(Self {
            client,
            bucket: config.bucket,
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

#[async_trait]
impl BucketStore for S3BucketStore {
    async fn put_object(
        &self,
        key: &str,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<(), BucketError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(bytes.to_vec()))
            .content_type(content_type)
            .send()
            .await
            .map_err(BucketError::from_sdk)?;
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<Bytes, BucketError> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| match err {
                SdkError::ServiceError(service_err) => {
                    let message = service_err.err().to_string();
                    if message.contains("NoSuchKey") {
                        BucketError::NotFound(key.to_string())
                    } else {
                        BucketError::from_sdk(message)
                    }
                }
                other => BucketError::from_sdk(other),
            })?;

        let data = output.body.collect().await.map_err(BucketError::from_sdk)?;
        Ok(Bytes::from(data.into_bytes()))
    }

    async fn list_prefix(&self, prefix: &str) -> Result<Vec<String>, BucketError> {
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix);
            if let Some(token) = &continuation {
                request = request.continuation_token(token);
            }

            let output = request.send().await.map_err(BucketError::from_sdk)?;
            for object in output.contents() {
                if let Some(key) = object.key() {
                    keys.push(key.to_string());
                }
            }

            match output.next_continuation_token() {
                Some(token) => continuation = Some(token.to_string()),
                None => break,
            }
        }

        Ok(keys)
    }

    async fn delete_object(&self, key: &str) -> Result<(), BucketError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(BucketError::from_sdk)?;
        Ok(())
    }
}

/// In-memory store used by pipeline tests. Keys list in lexicographic order,
/// matching what the S3 listing API returns.
#[derive(Default)]
pub struct MemoryBucketStore {
    objects: Mutex<BTreeMap<String, Bytes>>,
}

impl MemoryBucketStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_objects<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Bytes)>,
        K: Into<String>,
    {
        let store = Self::new();
        {
            let mut objects = store.objects.lock().expect("bucket lock poisoned");
            for (key, bytes) in entries {
                objects.insert(key.into(), bytes);
            }
        }
        store
    }
}

#[async_trait]
impl BucketStore for MemoryBucketStore {
    async fn put_object(
        &self,
        key: &str,
        bytes: Bytes,
        _content_type: &str,
    ) -> Result<(), BucketError> {
        self.objects
            .lock()
            .expect("bucket lock poisoned")
            .insert(key.to_string(), bytes);
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<Bytes, BucketError> {
        self.objects
            .lock()
            .expect("bucket lock poisoned")
            .get(key)
            .cloned()
            .ok_or_else(|| BucketError::NotFound(key.to_string()))
    }

    async fn list_prefix(&self, prefix: &str) -> Result<Vec<String>, BucketError> {
        Ok(self
            .objects
            .lock()
            .expect("bucket lock poisoned")
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn delete_object(&self, key: &str) -> Result<(), BucketError> {
        self.objects
            .lock()
            .expect("bucket lock poisoned")
            .remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_round_trips_and_lists_by_prefix() {
        let store = MemoryBucketStore::new();
        store
            .put_object("exports/a/part-000.csv", Bytes::from_static(b"a"), "text/csv")
            .await
            .unwrap();
        store
            .put_object("exports/a/part-001.csv", Bytes::from_static(b"b"), "text/csv")
            .await
            .unwrap();
        store
            .put_object("exports/b/part-000.csv", Bytes::from_static(b"c"), "text/csv")
            .await
            .unwrap();

        let listed = store.list_prefix("exports/a/").await.unwrap();
        assert_eq!(
            listed,
            vec![
                "exports/a/part-000.csv".to_string(),
                "exports/a/part-001.csv".to_string()
            ]
        );

        let body = store.get_object("exports/a/part-000.csv").await.unwrap();
        assert_eq!(body, Bytes::from_static(b"a"));

        store.delete_object("exports/a/part-000.csv").await.unwrap();
        let err = store.get_object("exports/a/part-000.csv").await.unwrap_err();
        assert!(matches!(err, BucketError::NotFound(_)));
    }

    #[test]
    fn object_url_renders_scheme_bucket_and_key() {
        assert_eq!(
            object_url("staging", "exports/abc/part-000.csv"),
            "s3://staging/exports/abc/part-000.csv"
        );
    }
}
