//! AppBuilder - アプリケーションの構築とワイヤリング
//!
//! # 学習ポイント
//! - Builder パターンの実装
//! - 起動時検証（Fail-fast 設計）
//! - 共有状態は `VersionedStore` / `MutationQueue` の clone で配る

use std::sync::Arc;
use std::time::Duration;

use crate::domain::{Document, Item, Person, Question};
use crate::error::RtmcsError;
use crate::ports::{BlobStore, IdGenerator, SystemClock, UlidGenerator};
use crate::queue::{DEFAULT_DRAIN_INTERVAL, DrainLoop, MutationQueue};
use crate::store::{ReconcilePolicy, VersionedStore};

use super::Collection;

/// AppBuilder はアプリケーションを構築
///
/// # 使用例
/// ```ignore
/// let app = AppBuilder::new(Arc::new(InMemoryBlobStore::new()))
///     .policy(ReconcilePolicy::FetchRemote)
///     .drain_interval(Duration::from_millis(500))
///     .build()?;
/// let drain = app.spawn_drain_loop();
/// ```
pub struct AppBuilder {
    blob: Arc<dyn BlobStore>,
    baseline: Baseline,
    policy: ReconcilePolicy,
    ids: Option<Arc<dyn IdGenerator>>,
    drain_interval: Duration,
}

enum Baseline {
    Embedded,
    Document(Document),
    Json(String),
}

/// BuildError はアプリケーション構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Invalid baseline document: {0}")]
    Baseline(#[from] RtmcsError),
    #[error("Drain interval must be greater than zero")]
    ZeroDrainInterval,
}

impl AppBuilder {
    pub fn new(blob: Arc<dyn BlobStore>) -> Self {
        Self {
            blob,
            baseline: Baseline::Embedded,
            policy: ReconcilePolicy::default(),
            ids: None,
            drain_interval: DEFAULT_DRAIN_INTERVAL,
        }
    }

    pub fn baseline(mut self, document: Document) -> Self {
        self.baseline = Baseline::Document(document);
        self
    }

    /// JSON の baseline を設定（パースは build() 時）
    pub fn baseline_json(mut self, json: impl Into<String>) -> Self {
        self.baseline = Baseline::Json(json.into());
        self
    }

    pub fn policy(mut self, policy: ReconcilePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn drain_interval(mut self, interval: Duration) -> Self {
        self.drain_interval = interval;
        self
    }

    /// # 検証
    /// - baseline JSON がパースできること
    /// - drain interval が 0 でないこと
    pub fn build(self) -> Result<App, BuildError> {
        if self.drain_interval.is_zero() {
            return Err(BuildError::ZeroDrainInterval);
        }
        let baseline = match self.baseline {
            Baseline::Embedded => Document::embedded_baseline()?,
            Baseline::Document(document) => document,
            Baseline::Json(json) => Document::from_json(&json)?,
        };
        let ids = self
            .ids
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(SystemClock)));

        let store = VersionedStore::new(self.blob, baseline, self.policy);
        let queue = MutationQueue::new(store.clone());
        Ok(App {
            people: Collection::new(queue.clone(), ids.clone()),
            questions: Collection::new(queue.clone(), ids.clone()),
            items: Collection::new(queue.clone(), ids),
            store,
            queue,
            drain_interval: self.drain_interval,
        })
    }
}

/// App はアプリケーションのランタイム
#[derive(Clone)]
pub struct App {
    pub store: VersionedStore,
    pub queue: MutationQueue,
    pub people: Collection<Person>,
    pub questions: Collection<Question>,
    pub items: Collection<Item>,
    drain_interval: Duration,
}

impl App {
    pub fn spawn_drain_loop(&self) -> DrainLoop {
        DrainLoop::spawn(self.queue.clone(), self.drain_interval)
    }

    /// Stop the drain loop and wait for every outstanding write.
    pub async fn shutdown(&self, drain: DrainLoop) {
        drain.shutdown_and_join().await;
        self.store.wait_background().await;
    }
}
