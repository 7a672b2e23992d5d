//! InMemoryBlobStore - 開発・テスト用の BlobStore
//!
//! # 学習ポイント
//! - tokio::sync::Mutex による async な排他制御
//! - watch channel で put を一時停止（「トランザクション実行中」を再現する）
//! - AtomicBool による障害注入

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, watch};

use crate::ports::{BlobError, BlobStore};

/// InMemoryBlobStore は HashMap に object を保持する
///
/// # 使用例
/// ```ignore
/// let blob = InMemoryBlobStore::new();
/// blob.put("data/version.json", "3".into()).await?;
/// blob.pause_puts();      // 以降の put は resume_puts() まで待たされる
/// blob.fail_puts(true);   // 以降の put は Transport エラー
/// ```
pub struct InMemoryBlobStore {
    objects: Arc<Mutex<HashMap<String, String>>>,
    /// put / delete された key の順序
    writes: Arc<Mutex<Vec<String>>>,
    paused: watch::Sender<bool>,
    fail_puts: AtomicBool,
    fail_gets: AtomicBool,
    fail_deletes: AtomicBool,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::from_map(HashMap::new())
    }

    fn from_map(objects: HashMap<String, String>) -> Self {
        let (paused, _) = watch::channel(false);
        Self {
            objects: Arc::new(Mutex::new(objects)),
            writes: Arc::new(Mutex::new(Vec::new())),
            paused,
            fail_puts: AtomicBool::new(false),
            fail_gets: AtomicBool::new(false),
            fail_deletes: AtomicBool::new(false),
        }
    }

    /// 初期状態を入れた store を作る
    pub fn with_objects<I, K, V>(objects: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self::from_map(
            objects
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn pause_puts(&self) {
        self.paused.send_replace(true);
    }

    pub fn resume_puts(&self) {
        self.paused.send_replace(false);
    }

    pub fn fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    pub fn fail_gets(&self, fail: bool) {
        self.fail_gets.store(fail, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// 障害注入を無視して現在の値を読む
    pub async fn peek(&self, key: &str) -> Option<String> {
        self.objects.lock().await.get(key).cloned()
    }

    /// 成功した put / delete の key を発生順に返す
    pub async fn writes(&self) -> Vec<String> {
        self.writes.lock().await.clone()
    }

    async fn wait_until_resumed(&self) {
        let mut rx = self.paused.subscribe();
        // sender は self が持っているので wait_for がエラーになることはない
        let _ = rx.wait_for(|paused| !*paused).await;
    }
}

impl Default for InMemoryBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn put(&self, key: &str, value: String) -> Result<(), BlobError> {
        self.wait_until_resumed().await;
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(BlobError::Transport(format!("injected put failure: {key}")));
        }
        self.objects.lock().await.insert(key.to_string(), value);
        self.writes.lock().await.push(key.to_string());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<String, BlobError> {
        if self.fail_gets.load(Ordering::SeqCst) {
            return Err(BlobError::Transport(format!("injected get failure: {key}")));
        }
        self.objects
            .lock()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| BlobError::not_found(key))
    }

    async fn delete(&self, key: &str) -> Result<(), BlobError> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(BlobError::Transport(format!("injected delete failure: {key}")));
        }
        match self.objects.lock().await.remove(key) {
            Some(_) => {
                self.writes.lock().await.push(key.to_string());
                Ok(())
            }
            None => Err(BlobError::not_found(key)),
        }
    }

    async fn signed_upload_url(
        &self,
        key: &str,
        ttl: Duration,
        content_type: &str,
    ) -> Result<String, BlobError> {
        Ok(format!(
            "memory://{key}?expires_in={}&content_type={content_type}",
            ttl.as_secs()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let blob = InMemoryBlobStore::new();
        blob.put("a", "1".to_string()).await.unwrap();
        assert_eq!(blob.get("a").await.unwrap(), "1");
    }

    #[tokio::test]
    async fn test_missing_key_is_not_found() {
        let blob = InMemoryBlobStore::new();
        let err = blob.get("missing").await.unwrap_err();
        assert!(err.is_not_found());

        let err = blob.delete("missing").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_injected_failures_are_transport_errors() {
        let blob = InMemoryBlobStore::with_objects([("a", "1")]);
        blob.fail_gets(true);
        blob.fail_puts(true);

        assert!(matches!(blob.get("a").await, Err(BlobError::Transport(_))));
        assert!(matches!(
            blob.put("a", "2".to_string()).await,
            Err(BlobError::Transport(_))
        ));
        assert_eq!(blob.peek("a").await.as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn test_paused_put_waits_for_resume() {
        let blob = Arc::new(InMemoryBlobStore::new());
        blob.pause_puts();

        let handle = tokio::spawn({
            let blob = blob.clone();
            async move { blob.put("k", "v".to_string()).await }
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(blob.peek("k").await.is_none());

        blob.resume_puts();
        handle.await.unwrap().unwrap();
        assert_eq!(blob.peek("k").await.as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn test_writes_are_recorded_in_order() {
        let blob = InMemoryBlobStore::new();
        blob.put("first", String::new()).await.unwrap();
        blob.put("second", String::new()).await.unwrap();
        blob.delete("first").await.unwrap();

        assert_eq!(blob.writes().await, vec!["first", "second", "first"]);
    }
}
