// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Local object store.
//!
//! Signed URLs carry `method`, `expires` (ms since epoch) and a SHA-256
//! signature over `secret|method|path|expires`.

use async_trait::async_trait;
use std::ops::Bound;
use std::time::Duration;
use tracing::debug;

use super::{sha256_hex, LocalBackend};
use crate::provider::traits::{ProviderError, ProviderResult, StorageProvider};
use crate::provider::types::{
    now_millis, Operation, Page, SignedUrlMethod, StoredObject, UploadOptions,
};

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Debug, Clone)]
pub(super) struct StoredBlob {
    content: Vec<u8>,
    object: StoredObject,
}

fn validate_path(path: &str) -> ProviderResult<()> {
    if path.is_empty() || path.starts_with('/') || path.split('/').any(|s| s == "..") {
        return Err(ProviderError::invalid_argument(format!("invalid object path '{}'", path)));
    }
    Ok(())
}

impl LocalBackend {
    fn url_signature(&self, method: &str, path: &str, expires: i64) -> String {
        sha256_hex(&[
            self.config.signing_secret.as_bytes(),
            "|".as_bytes(),
            method.as_bytes(),
            "|".as_bytes(),
            path.as_bytes(),
            "|".as_bytes(),
            expires.to_string().as_bytes(),
        ])
    }

    /// Check a URL produced by `signed_url`: signature valid and not expired.
    #[must_use]
    pub fn verify_signed_url(&self, url: &str) -> bool {
        let base = format!("{}/", self.config.storage_base_url);
        let Some(rest) = url.strip_prefix(&base) else {
            return false;
        };
        let Some((path, query)) = rest.split_once('?') else {
            return false;
        };

        let mut method = None;
        let mut expires = None;
        let mut signature = None;
        for pair in query.split('&') {
            match pair.split_once('=') {
                Some(("method", v)) => method = Some(v),
                Some(("expires", v)) => expires = v.parse::<i64>().ok(),
                Some(("signature", v)) => signature = Some(v),
                _ => {}
            }
        }

        match (method, expires, signature) {
            (Some(method), Some(expires), Some(signature)) => {
                expires > now_millis() && self.url_signature(method, path, expires) == signature
            }
            _ => false,
        }
    }
}

#[async_trait]
impl StorageProvider for LocalBackend {
    async fn upload_file(
        &self,
        path: &str,
        content: &[u8],
        options: &UploadOptions,
    ) -> ProviderResult<StoredObject> {
        self.enter(Operation::UploadFile)?;
        validate_path(path)?;

        let object = StoredObject {
            path: path.to_string(),
            size: content.len() as u64,
            content_type: options
                .content_type
                .clone()
                .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
            checksum: sha256_hex(&[content]),
            updated_at: now_millis(),
            metadata: options.metadata.clone(),
        };
        self.objects.write().insert(
            path.to_string(),
            StoredBlob {
                content: content.to_vec(),
                object: object.clone(),
            },
        );
        debug!(path, size = object.size, "Stored local object");
        Ok(object)
    }

    async fn download_file(&self, path: &str) -> ProviderResult<Vec<u8>> {
        self.enter(Operation::DownloadFile)?;
        self.objects
            .read()
            .get(path)
            .map(|blob| blob.content.clone())
            .ok_or_else(|| ProviderError::not_found(format!("object '{}'", path)))
    }

    async fn delete_file(&self, path: &str) -> ProviderResult<()> {
        self.enter(Operation::DeleteFile)?;
        self.objects
            .write()
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| ProviderError::not_found(format!("object '{}'", path)))
    }

    async fn list_files(
        &self,
        prefix: &str,
        cursor: Option<&str>,
        limit: usize,
    ) -> ProviderResult<Page<StoredObject>> {
        self.enter(Operation::ListFiles)?;

        let objects = self.objects.read();
        let start = match cursor {
            Some(c) => Bound::Excluded(c.to_string()),
            None => Bound::Included(prefix.to_string()),
        };
        let mut remaining = objects
            .range((start, Bound::Unbounded))
            .take_while(|(path, _)| path.starts_with(prefix))
            .map(|(_, blob)| blob.object.clone());

        let items: Vec<StoredObject> = remaining.by_ref().take(limit.max(1)).collect();
        let next_cursor = match remaining.next() {
            Some(_) => items.last().map(|o| o.path.clone()),
            None => None,
        };
        Ok(Page { items, next_cursor })
    }

    async fn signed_url(
        &self,
        path: &str,
        method: SignedUrlMethod,
        expires_in: Duration,
    ) -> ProviderResult<String> {
        self.enter(Operation::SignedUrl)?;
        validate_path(path)?;
        if method == SignedUrlMethod::Get && !self.objects.read().contains_key(path) {
            return Err(ProviderError::not_found(format!("object '{}'", path)));
        }

        let expires = now_millis() + expires_in.as_millis() as i64;
        let signature = self.url_signature(method.as_str(), path, expires);
        Ok(format!(
            "{}/{}?method={}&expires={}&signature={}",
            self.config.storage_base_url,
            path,
            method.as_str(),
            expires,
            signature
        ))
    }

    async fn copy_file(&self, from: &str, to: &str) -> ProviderResult<StoredObject> {
        self.enter(Operation::CopyFile)?;
        validate_path(to)?;

        let mut objects = self.objects.write();
        let source = objects
            .get(from)
            .cloned()
            .ok_or_else(|| ProviderError::not_found(format!("object '{}'", from)))?;

        let object = StoredObject {
            path: to.to_string(),
            updated_at: now_millis(),
            ..source.object
        };
        objects.insert(
            to.to_string(),
            StoredBlob {
                content: source.content,
                object: object.clone(),
            },
        );
        Ok(object)
    }
}
