//! Object storage: per-facility image upload and presigned-URL resolution
//! against one fixed S3-compatible bucket (MinIO in the usual deployment).

pub mod images;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use aws_sdk_s3::config::Credentials;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tracing::{debug, info, instrument, warn};

use crate::config::StorageConfig;

pub struct ObjectStore {
    client: Client,
    bucket: String,
    presign_expiry: Duration,
}

impl ObjectStore {
    pub async fn connect(cfg: &StorageConfig) -> Result<Self> {
        let credentials =
            Credentials::new(&cfg.access_key, &cfg.secret_key, None, None, "carehub-env");
        let base = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(cfg.region.clone()))
            .endpoint_url(&cfg.endpoint)
            .credentials_provider(credentials)
            .load()
            .await;
        // MinIO serves buckets by path, not by virtual host.
        let s3_config = aws_sdk_s3::config::Builder::from(&base)
            .force_path_style(true)
            .build();
        Ok(Self {
            client: Client::from_conf(s3_config),
            bucket: cfg.bucket.clone(),
            presign_expiry: cfg.presign_expiry,
        })
    }

    /// Create the fixed bucket lazily at startup if it does not exist.
    pub async fn ensure_bucket(&self) -> Result<()> {
        match self.client.head_bucket().bucket(&self.bucket).send().await {
            Ok(_) => {
                debug!(bucket = %self.bucket, "bucket already exists");
                Ok(())
            }
            Err(err) => {
                let service_err = err.into_service_error();
                if !service_err.is_not_found() {
                    return Err(anyhow::Error::new(service_err)
                        .context(format!("checking bucket {:?}", self.bucket)));
                }
                self.client
                    .create_bucket()
                    .bucket(&self.bucket)
                    .send()
                    .await
                    .with_context(|| format!("creating bucket {:?}", self.bucket))?;
                info!(bucket = %self.bucket, "bucket created");
                Ok(())
            }
        }
    }

    /// Upload every recognized image in the facility's local asset directory
    /// under the `"{name}/{filename}"` key prefix. A missing directory is a
    /// normal, common case and yields an empty list; a per-file upload
    /// failure is logged and skipped without aborting the rest.
    #[instrument(skip(self, assets_root), fields(entity = %name))]
    pub async fn upload_entity_images(
        &self,
        name: &str,
        assets_root: &Path,
    ) -> Result<Vec<String>> {
        let dir = assets_root.join(name);
        if !dir.is_dir() {
            debug!(dir = %dir.display(), "no local asset directory; nothing to upload");
            return Ok(Vec::new());
        }

        let mut uploaded = Vec::new();
        for path in collect_image_files(&dir)? {
            let Some(file_name) = path.file_name().and_then(|f| f.to_str()) else {
                continue;
            };
            let key = images::object_key(name, file_name);
            match self.put_file(&key, &path).await {
                Ok(()) => uploaded.push(key),
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "image upload failed; skipping file");
                }
            }
        }
        info!(count = uploaded.len(), "entity images uploaded");
        Ok(uploaded)
    }

    async fn put_file(&self, key: &str, path: &Path) -> Result<()> {
        let body = ByteStream::from_path(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(images::content_type_for(key))
            .body(body)
            .send()
            .await
            .with_context(|| format!("putting object {key:?}"))?;
        Ok(())
    }

    /// Presigned URLs for every stored image of one facility, in key order.
    #[instrument(skip(self), fields(entity = %name))]
    pub async fn list_entity_images(&self, name: &str) -> Result<Vec<String>> {
        let keys = self.list_image_keys(name).await?;
        let mut urls = Vec::with_capacity(keys.len());
        for key in &keys {
            urls.push(self.presign_get(key).await?);
        }
        debug!(count = urls.len(), "resolved entity image urls");
        Ok(urls)
    }

    /// The first listed image, or None when the facility has no images.
    pub async fn main_image(&self, name: &str) -> Result<Option<String>> {
        Ok(self.list_entity_images(name).await?.into_iter().next())
    }

    async fn list_image_keys(&self, name: &str) -> Result<Vec<String>> {
        let prefix = format!("{name}/");
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(&prefix)
            .into_paginator()
            .send();

        let mut keys = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page.with_context(|| format!("listing objects under {prefix:?}"))?;
            for object in page.contents() {
                if let Some(key) = object.key() {
                    if images::is_allowed_image(key) {
                        keys.push(key.to_string());
                    }
                }
            }
        }
        // Backends do not contractually guarantee listing order; sort so the
        // "main image" pick is deterministic across runs.
        keys.sort();
        Ok(keys)
    }

    async fn presign_get(&self, key: &str) -> Result<String> {
        let presign_cfg = PresigningConfig::expires_in(self.presign_expiry)
            .context("building presigning config")?;
        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presign_cfg)
            .await
            .with_context(|| format!("presigning {key:?}"))?;
        Ok(request.uri().to_string())
    }
}

/// Regular files with allow-listed extensions, sorted by name so upload
/// order is stable.
fn collect_image_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("scanning {}", dir.display()))? {
        let entry = entry.with_context(|| format!("scanning {}", dir.display()))?;
        if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if images::is_allowed_image(name) {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_only_allow_listed_regular_files() {
        let dir = tempfile::tempdir().unwrap();
        for f in ["a.jpg", "b.txt", "c.PNG"] {
            std::fs::write(dir.path().join(f), b"x").unwrap();
        }
        std::fs::create_dir(dir.path().join("nested.jpg")).unwrap();

        let got: Vec<String> = collect_image_files(dir.path())
            .unwrap()
            .into_iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(got, vec!["a.jpg", "c.PNG"]);
    }

    #[test]
    fn missing_directory_is_an_error_only_past_the_existence_check() {
        // upload_entity_images short-circuits on !is_dir(); the raw scan of a
        // genuinely missing path must still error for callers that reach it.
        assert!(collect_image_files(Path::new("no/such/dir")).is_err());
    }

    #[tokio::test]
    async fn facility_without_asset_directory_uploads_nothing() {
        // The short-circuit fires before any S3 call, so a client pointed at
        // an unreachable endpoint never gets exercised.
        let store = ObjectStore::connect(&StorageConfig {
            endpoint: "http://127.0.0.1:1".into(),
            region: "us-east-1".into(),
            access_key: "test".into(),
            secret_key: "test".into(),
            bucket: "carehub".into(),
            presign_expiry: Duration::from_secs(3600),
        })
        .await
        .unwrap();

        let root = tempfile::tempdir().unwrap();
        let uploaded = store
            .upload_entity_images("NO SUCH FACILITY", root.path())
            .await
            .unwrap();
        assert!(uploaded.is_empty());
    }
}
