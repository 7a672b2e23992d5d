//! LocalBlobStore - ローカルファイルシステム上の BlobStore
//!
//! key をルートディレクトリからの相対パスとして扱います。
//! 書き込みは一時ファイル + rename なので、途中で落ちても中途半端な
//! document が残りません。
//!
//! # Signed upload URL
//! `{base_url}/{key}?expires={ts}&content_type={ct}&signature={sig}` の形式。
//! signature は `secret + "{key}/{expires}/{content_type}"` の SHA-256 を
//! URL-safe base64 にしたもの。受け取り側は `verify_upload` で検証します。

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use sha2::{Digest, Sha256};
use ulid::Ulid;

use crate::ports::{BlobError, BlobStore, Clock};

pub struct LocalBlobStore {
    root: PathBuf,
    base_url: String,
    secret: Vec<u8>,
    clock: Arc<dyn Clock>,
}

impl LocalBlobStore {
    pub fn new(
        root: impl Into<PathBuf>,
        base_url: impl Into<String>,
        secret: &[u8],
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            secret: secret.to_vec(),
            clock,
        }
    }

    /// Store raw bytes (used by the upload endpoint for images).
    pub async fn put_bytes(&self, key: &str, bytes: &[u8]) -> Result<(), BlobError> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| transport(key, e))?;
        }

        // 同じ key への同時書き込みが衝突しないよう、一時ファイル名は毎回変える
        let mut tmp = path.clone().into_os_string();
        tmp.push(format!(".{}.tmp-upload", Ulid::new()));
        let tmp = PathBuf::from(tmp);
        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| transport(key, e))?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(transport(key, e));
        }
        Ok(())
    }

    /// Check a signed upload request produced by `signed_upload_url`.
    pub fn verify_upload(
        &self,
        key: &str,
        expires: i64,
        content_type: &str,
        signature: &str,
    ) -> bool {
        if self.clock.now().timestamp() > expires {
            return false;
        }
        self.sign(key, expires, content_type) == signature
    }

    fn sign(&self, key: &str, expires: i64, content_type: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.secret);
        hasher.update(format!("{key}/{expires}/{content_type}").as_bytes());
        URL_SAFE_NO_PAD.encode(hasher.finalize())
    }

    /// key をルート配下のパスに変換（`..` や絶対パスは拒否）
    fn resolve(&self, key: &str) -> Result<PathBuf, BlobError> {
        let relative = Path::new(key);
        let is_plain = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !is_plain {
            return Err(BlobError::Transport(format!("invalid blob key: {key:?}")));
        }
        Ok(self.root.join(relative))
    }
}

fn transport(key: &str, err: std::io::Error) -> BlobError {
    BlobError::Transport(format!("{key}: {err}"))
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(&self, key: &str, value: String) -> Result<(), BlobError> {
        self.put_bytes(key, value.as_bytes()).await
    }

    async fn get(&self, key: &str) -> Result<String, BlobError> {
        let path = self.resolve(key)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(value) => Ok(value),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(BlobError::not_found(key)),
            Err(e) => Err(transport(key, e)),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), BlobError> {
        let path = self.resolve(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(BlobError::not_found(key)),
            Err(e) => Err(transport(key, e)),
        }
    }

    async fn signed_upload_url(
        &self,
        key: &str,
        ttl: Duration,
        content_type: &str,
    ) -> Result<String, BlobError> {
        self.resolve(key)?;
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| BlobError::Transport(format!("invalid ttl: {e}")))?;
        let expires = (self.clock.now() + ttl).timestamp();
        let signature = self.sign(key, expires, content_type);

        Ok(format!(
            "{}/{}?expires={}&content_type={}&signature={}",
            self.base_url,
            key,
            expires,
            content_type.replace('/', "%2F"),
            signature
        ))
    }
}
