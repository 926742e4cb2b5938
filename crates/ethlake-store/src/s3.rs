//! S3 staging area for Redshift bulk loads.
//!
//! Batches land here as CSV files, one folder per batch, and are deleted
//! after the `COPY` commits or rolls back. The underlying client is
//! rebuilt every five minutes so shared-profile credentials never expire
//! mid-run.

use std::time::{Duration, Instant};

use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{Delete, ObjectIdentifier};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use ethlake_core::StoreError;

/// Client refresh interval.
const REFRESH_AFTER: Duration = Duration::from_secs(300);

struct ClientSlot {
    client: aws_sdk_s3::Client,
    created: Instant,
}

/// A staging bucket handle.
pub struct S3Staging {
    bucket: String,
    region: String,
    profile: String,
    slot: Mutex<ClientSlot>,
}

impl S3Staging {
    /// Build the client from the shared AWS profile and region.
    pub async fn connect(
        bucket: impl Into<String>,
        profile: impl Into<String>,
        region: impl Into<String>,
    ) -> Result<Self, StoreError> {
        let profile = profile.into();
        let region = region.into();
        let client = Self::build_client(&profile, &region).await;
        Ok(Self {
            bucket: bucket.into(),
            region,
            profile,
            slot: Mutex::new(ClientSlot {
                client,
                created: Instant::now(),
            }),
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    async fn build_client(profile: &str, region: &str) -> aws_sdk_s3::Client {
        let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(region.to_string()))
            .profile_name(profile)
            .load()
            .await;
        aws_sdk_s3::Client::new(&config)
    }

    /// Current client, refreshed when older than [`REFRESH_AFTER`].
    async fn client(&self) -> aws_sdk_s3::Client {
        let mut slot = self.slot.lock().await;
        if slot.created.elapsed() > REFRESH_AFTER {
            info!(bucket = %self.bucket, "refreshing S3 client credentials");
            slot.client = Self::build_client(&self.profile, &self.region).await;
            slot.created = Instant::now();
        }
        slot.client.clone()
    }

    /// Upload one staging file.
    pub async fn put(&self, key: &str, content: Vec<u8>) -> Result<(), StoreError> {
        let client = self.client().await;
        debug!(key, bytes = content.len(), "uploading staging file");
        client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type("text/plain")
            .body(ByteStream::from(content))
            .send()
            .await
            .map_err(|e| StoreError::Staging(format!("put {key}: {e}")))?;
        Ok(())
    }

    /// Delete one staging file.
    pub async fn delete_file(&self, key: &str) -> Result<(), StoreError> {
        let client = self.client().await;
        client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StoreError::Staging(format!("delete {key}: {e}")))?;
        Ok(())
    }

    /// Delete everything under a staging folder.
    pub async fn delete_folder(&self, folder: &str) -> Result<(), StoreError> {
        let client = self.client().await;
        let prefix = if folder.ends_with('/') {
            folder.to_string()
        } else {
            format!("{folder}/")
        };

        let list = client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(&prefix)
            .send()
            .await
            .map_err(|e| StoreError::Staging(format!("list {prefix}: {e}")))?;

        let keys: Vec<ObjectIdentifier> = list
            .contents()
            .iter()
            .filter_map(|obj| {
                obj.key()
                    .and_then(|k| ObjectIdentifier::builder().key(k).build().ok())
            })
            .collect();
        if keys.is_empty() {
            return Ok(());
        }
        if list.is_truncated() == Some(true) {
            warn!(prefix = %prefix, "staging folder listing truncated at 1000 objects");
        }

        let delete = Delete::builder()
            .set_objects(Some(keys))
            .build()
            .map_err(|e| StoreError::Staging(e.to_string()))?;
        client
            .delete_objects()
            .bucket(&self.bucket)
            .delete(delete)
            .send()
            .await
            .map_err(|e| StoreError::Staging(format!("delete {prefix}: {e}")))?;
        debug!(prefix = %prefix, "staging folder removed");
        Ok(())
    }
}
