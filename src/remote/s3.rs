use super::{DocumentBackend, RemoteDocument, UserProfile};
use crate::error::{Result, SyncError};
use crate::record::{Collection, PreferenceRecord};
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_smithy_types::byte_stream::ByteStream;

/// S3 document backend
///
/// Each document is a small JSON object:
/// - `{prefix}/users/{identity}/profile.json`
/// - `{prefix}/users/{identity}/{collection}/{session_id}.json`
///
/// Works with AWS S3 and S3-compatible services (Cloudflare R2, MinIO, ...).
pub struct S3Backend {
    client: Client,
    bucket: String,
    prefix: String,
}

impl S3Backend {
    /// Create a new S3 backend
    ///
    /// # Arguments
    /// * `bucket` - S3 bucket name
    /// * `prefix` - Key prefix (e.g., "confmark/")
    /// * `region` - Optional AWS region (defaults to config/env)
    /// * `endpoint` - Optional custom endpoint (for R2, MinIO, etc.)
    pub async fn new(
        bucket: String,
        prefix: String,
        region: Option<String>,
        endpoint: Option<String>,
    ) -> Result<Self> {
        let config = if let Some(r) = region {
            aws_config::from_env()
                .region(aws_sdk_s3::config::Region::new(r))
                .load()
                .await
        } else {
            aws_config::load_from_env().await
        };

        let s3_config_builder = aws_sdk_s3::config::Builder::from(&config);

        let s3_config = if let Some(ep) = endpoint {
            s3_config_builder
                .endpoint_url(ep)
                .force_path_style(true) // Required for non-AWS S3
                .build()
        } else {
            s3_config_builder.build()
        };

        Ok(Self {
            client: Client::from_conf(s3_config),
            bucket,
            prefix,
        })
    }

    fn user_root(&self, identity: &str) -> String {
        users_key(&self.prefix, identity)
    }

    fn collection_prefix(&self, identity: &str, collection: Collection) -> String {
        format!("{}/{}/", self.user_root(identity), collection.as_str())
    }

    fn document_key(&self, identity: &str, collection: Collection, session_id: &str) -> String {
        format!(
            "{}{}.json",
            self.collection_prefix(identity, collection),
            session_id
        )
    }

    fn profile_key(&self, identity: &str) -> String {
        format!("{}/profile.json", self.user_root(identity))
    }

    async fn get_json(&self, key: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| SyncError::Backend(format!("Failed to download {}: {}", key, e)))?;

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| SyncError::Backend(format!("Failed to read {}: {}", key, e)))?;

        Ok(data.into_bytes().to_vec())
    }

    async fn put_json(&self, key: &str, body: Vec<u8>) -> Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type("application/json")
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| SyncError::Backend(format!("Failed to upload {}: {}", key, e)))?;
        Ok(())
    }
}

fn users_key(prefix: &str, identity: &str) -> String {
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        format!("users/{}", identity)
    } else {
        format!("{}/users/{}", prefix, identity)
    }
}

#[async_trait]
impl DocumentBackend for S3Backend {
    async fn list(&self, identity: &str, collection: Collection) -> Result<Vec<PreferenceRecord>> {
        let prefix = self.collection_prefix(identity, collection);
        let mut continuation_token: Option<String> = None;
        let mut keys = Vec::new();

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(&prefix);

            if let Some(token) = continuation_token {
                request = request.continuation_token(token);
            }

            let response = request
                .send()
                .await
                .map_err(|e| SyncError::Backend(format!("Failed to list {}: {}", prefix, e)))?;

            for obj in response.contents() {
                if let Some(key) = obj.key() {
                    if key.ends_with(".json") {
                        keys.push(key.to_string());
                    }
                }
            }

            if response.is_truncated().unwrap_or(false) {
                continuation_token = response.next_continuation_token().map(|s| s.to_string());
            } else {
                break;
            }
        }

        let mut records = Vec::with_capacity(keys.len());
        for key in keys {
            let data = self.get_json(&key).await?;
            let doc: RemoteDocument = serde_json::from_slice(&data)?;
            records.push(PreferenceRecord::from(doc));
        }

        // S3 lists keys lexicographically; show records oldest first
        records.sort_by_key(|r| r.timestamp);
        Ok(records)
    }

    async fn upsert(
        &self,
        identity: &str,
        collection: Collection,
        session_id: &str,
        title: Option<&str>,
    ) -> Result<()> {
        let key = self.document_key(identity, collection, session_id);
        let body = serde_json::to_vec(&RemoteDocument::new(session_id, title))?;
        self.put_json(&key, body).await
    }

    async fn delete(&self, identity: &str, collection: Collection, session_id: &str) -> Result<()> {
        let key = self.document_key(identity, collection, session_id);

        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|e| SyncError::Backend(format!("Failed to delete {}: {}", key, e)))?;

        Ok(())
    }

    async fn profile_exists(&self, identity: &str) -> Result<bool> {
        let key = self.profile_key(identity);

        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                let service_error = e.into_service_error();
                if service_error.is_not_found() {
                    Ok(false)
                } else {
                    Err(SyncError::Backend(format!(
                        "Failed to check {}: {}",
                        key, service_error
                    )))
                }
            }
        }
    }

    async fn create_profile(&self, identity: &str, email: Option<&str>) -> Result<()> {
        let key = self.profile_key(identity);
        let body = serde_json::to_vec(&UserProfile::new(email))?;
        self.put_json(&key, body).await
    }

    fn kind(&self) -> &'static str {
        "s3"
    }
}
