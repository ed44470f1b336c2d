//! Component C — object blob adapter over S3 (spec §4.4).

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use futures::TryStreamExt;
use tokio::fs::File;

use crate::capability::BlobStore;

#[derive(Debug, Clone)]
pub struct S3BlobStore {
    client: Client,
}

impl S3BlobStore {
    pub fn new(client: Client) -> Self {
        S3BlobStore { client }
    }

    /// Builds a client from the ambient AWS config (env/instance profile),
    /// optionally overriding the endpoint for S3-compatible stores used in
    /// tests/self-hosted deployments.
    pub async fn from_env(endpoint_override: Option<&str>) -> Self {
        let shared = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(endpoint) = endpoint_override {
            builder = builder.endpoint_url(endpoint);
        }
        S3BlobStore {
            client: Client::from_conf(builder.build()),
        }
    }
}

/// Parses `s3://bucket/key` via a single split on the first `/` (spec §4.4).
pub fn parse_s3_url(url: &str) -> Result<(String, String)> {
    let rest = url
        .strip_prefix("s3://")
        .with_context(|| format!("not an s3:// url: {url}"))?;
    let (bucket, key) = rest
        .split_once('/')
        .with_context(|| format!("s3 url missing key: {url}"))?;
    if bucket.is_empty() || key.is_empty() {
        bail!("s3 url has an empty bucket or key: {url}");
    }
    Ok((bucket.to_string(), key.to_string()))
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn download(&self, url: &str, local: &Path) -> Result<()> {
        let (bucket, key) = parse_s3_url(url)?;
        let mut obj = self
            .client
            .get_object()
            .bucket(&bucket)
            .key(&key)
            .send()
            .await
            .with_context(|| format!("downloading {url}"))?;
        if let Some(parent) = local.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = File::create(local)
            .await
            .with_context(|| format!("creating {}", local.display()))?;
        while let Some(chunk) = obj
            .body
            .try_next()
            .await
            .context("reading s3 object body")?
        {
            tokio::io::AsyncWriteExt::write_all(&mut file, &chunk).await?;
        }
        Ok(())
    }

    async fn upload(&self, local: &Path, bucket: &str, key: &str) -> Result<String> {
        let body = ByteStream::from_path(local)
            .await
            .with_context(|| format!("opening {}", local.display()))?;
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body)
            .send()
            .await
            .with_context(|| format!("uploading {} to s3://{bucket}/{key}", local.display()))?;
        Ok(format!("s3://{bucket}/{key}"))
    }

    async fn presign_put(
        &self,
        bucket: &str,
        key: &str,
        ttl: Duration,
        content_type: &str,
    ) -> Result<String> {
        let config = PresigningConfig::expires_in(ttl).context("invalid presign ttl")?;
        let req = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .presigned(config)
            .await
            .context("minting presigned PUT url")?;
        Ok(req.uri().to_string())
    }

    async fn presign_get(&self, bucket: &str, key: &str, ttl: Duration) -> Result<String> {
        let config = PresigningConfig::expires_in(ttl).context("invalid presign ttl")?;
        let req = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .presigned(config)
            .await
            .context("minting presigned GET url")?;
        Ok(req.uri().to_string())
    }
}
