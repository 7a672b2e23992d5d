//! BlobStore port - オブジェクトストレージ（S3 / Local / InMemory）
//!
//! Document と version はこの port 越しに文字列として読み書きします。
//!
//! # 設計原則
//! - key/value は両方とも文字列（JSON / 10 進数の版数）
//! - 存在しない key は `BlobError::NotFound` として transport 障害と区別する
//! - リトライ方針は呼び出し側が決める（port は失敗をそのまま返す）

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BlobError {
    #[error("no such key: {key}")]
    NotFound { key: String },

    #[error("blob transport error: {0}")]
    Transport(String),
}

impl BlobError {
    pub fn not_found(key: impl Into<String>) -> Self {
        BlobError::NotFound { key: key.into() }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, BlobError::NotFound { .. })
    }
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, key: &str, value: String) -> Result<(), BlobError>;

    async fn get(&self, key: &str) -> Result<String, BlobError>;

    /// 呼び出し側が失敗を無視してよい（画像の後始末など）
    async fn delete(&self, key: &str) -> Result<(), BlobError>;

    /// Issue a URL a client can upload `key` to until `ttl` elapses.
    async fn signed_upload_url(
        &self,
        key: &str,
        ttl: Duration,
        content_type: &str,
    ) -> Result<String, BlobError>;
}
