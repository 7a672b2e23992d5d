//! VersionedStore - in-memory document と版数の正本
//!
//! # 責務
//! - `reconcile()`: remote の版数と突き合わせ、必要ならローカルを置き換える
//! - `persist()`: 版数 → document の順で blob store に書く
//! - mutation の適用（MutationQueue からのみ呼ばれる）
//!
//! # ロック
//! - `state`: 版数と document。blob store を await している間は保持しない
//! - `upload_lock`: persist 同士を直列化する。snapshot はこのロックの内側で取るので、
//!   最後に完了した upload が常に最新の状態になる

use std::collections::VecDeque;
use std::str::FromStr;
use std::sync::Arc;

use log::{debug, info, warn};
use tokio::sync::Mutex;
use tokio::task::JoinSet;

use super::keys::{DOCUMENT_KEY, VERSION_KEY};
use crate::domain::{Document, Version};
use crate::error::RtmcsError;
use crate::ports::{BlobError, BlobStore};
use crate::queue::Mutation;

/// remote の版数がローカルより進んでいたときの扱い
///
/// - `FetchRemote`: remote の document を取得して採用する（既定）
/// - `ResetToBaseline`: remote の中身は見ずに baseline に戻す。旧サーバーと同じ挙動で、
///   他プロセスの編集は捨てられる
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReconcilePolicy {
    #[default]
    FetchRemote,
    ResetToBaseline,
}

impl FromStr for ReconcilePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fetch-remote" => Ok(ReconcilePolicy::FetchRemote),
            "reset-to-baseline" => Ok(ReconcilePolicy::ResetToBaseline),
            other => Err(format!(
                "unknown reconcile policy {other:?} (expected fetch-remote or reset-to-baseline)"
            )),
        }
    }
}

struct StoreState {
    version: Version,
    /// None = まだ一度も読み込んでいない
    document: Option<Document>,
}

/// VersionedStore は document キャッシュと版数を保持する
///
/// `Clone` は同じ状態を共有するハンドルを返します（中身は `Arc`）。
#[derive(Clone)]
pub struct VersionedStore {
    blob: Arc<dyn BlobStore>,
    baseline: Arc<Document>,
    policy: ReconcilePolicy,
    state: Arc<Mutex<StoreState>>,
    upload_lock: Arc<Mutex<()>>,
    background: Arc<Mutex<JoinSet<()>>>,
}

impl VersionedStore {
    pub fn new(blob: Arc<dyn BlobStore>, baseline: Document, policy: ReconcilePolicy) -> Self {
        Self {
            blob,
            baseline: Arc::new(baseline),
            policy,
            state: Arc::new(Mutex::new(StoreState {
                version: 0,
                document: None,
            })),
            upload_lock: Arc::new(Mutex::new(())),
            background: Arc::new(Mutex::new(JoinSet::new())),
        }
    }

    pub fn blob(&self) -> &Arc<dyn BlobStore> {
        &self.blob
    }

    /// ローカルの版数（未読み込みなら 0）
    pub async fn local_version(&self) -> Version {
        self.state.lock().await.version
    }

    pub async fn is_loaded(&self) -> bool {
        self.state.lock().await.document.is_some()
    }

    /// Compare the local version against the remote one and adopt remote state if it moved.
    ///
    /// # 分岐
    /// - version key がない: remote は未初期化。baseline を採用して裏で persist
    /// - remote > local: policy に従って remote を採用し、local = remote
    /// - remote == 0 かつ local == 0: baseline。初回読み込みなら裏で persist
    /// - remote < local: 以前の persist が失敗している。ローカルを残して裏で persist
    /// - remote == local: 何もしない
    pub async fn reconcile(&self) -> Result<(), RtmcsError> {
        let remote = match self.blob.get(VERSION_KEY).await {
            Ok(raw) => parse_version(&raw),
            Err(BlobError::NotFound { .. }) => {
                info!("remote version is missing; initializing from baseline");
                {
                    let mut state = self.state.lock().await;
                    state.version = 0;
                    state.document = Some((*self.baseline).clone());
                }
                self.persist_in_background().await;
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let local = self.state.lock().await.version;
        if remote > local {
            let adopted = match self.policy {
                ReconcilePolicy::FetchRemote => self.fetch_remote_document().await?,
                ReconcilePolicy::ResetToBaseline => (*self.baseline).clone(),
            };
            let mut state = self.state.lock().await;
            // fetch 中に別の reconcile / commit が進んでいたら上書きしない
            if remote > state.version {
                info!(
                    "remote version {remote} is ahead of local {}; adopting ({:?})",
                    state.version, self.policy
                );
                state.version = remote;
                state.document = Some(adopted);
            }
            return Ok(());
        }

        let mut state = self.state.lock().await;
        if remote == 0 && (state.version == 0 || self.policy == ReconcilePolicy::ResetToBaseline) {
            let first_load = state.document.is_none();
            state.document = Some((*self.baseline).clone());
            drop(state);
            if first_load {
                self.persist_in_background().await;
            }
            return Ok(());
        }

        if remote < state.version {
            warn!(
                "remote version {remote} is behind local {}; re-persisting local state",
                state.version
            );
            drop(state);
            self.persist_in_background().await;
        }
        Ok(())
    }

    /// Upload the version, then the document.
    ///
    /// どちらかの put が失敗したらエラーを返す。ローカルの変更は巻き戻さない。
    pub async fn persist(&self) -> Result<Version, RtmcsError> {
        let _upload = self.upload_lock.lock().await;
        let (version, body) = {
            let state = self.state.lock().await;
            let Some(document) = state.document.as_ref() else {
                return Err(RtmcsError::NotFound("document is not loaded".to_string()));
            };
            (state.version, document.to_json()?)
        };

        self.blob.put(VERSION_KEY, version.to_string()).await?;
        self.blob.put(DOCUMENT_KEY, body).await?;
        debug!("persisted version {version}");
        Ok(version)
    }

    /// 裏で走っている persist をすべて待つ（shutdown とテスト用）
    pub async fn wait_background(&self) {
        let mut tasks = std::mem::take(&mut *self.background.lock().await);
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                warn!("background persist task did not finish: {e}");
            }
        }
    }

    /// 現在の版数と document のコピー（必要なら読み込む）
    pub async fn snapshot(&self) -> Result<(Version, Document), RtmcsError> {
        self.read(|version, doc| (version, doc.clone())).await
    }

    /// Run `f` against the cached document, loading it first if needed.
    pub async fn read<R>(
        &self,
        f: impl FnOnce(Version, &Document) -> R,
    ) -> Result<R, RtmcsError> {
        self.ensure_loaded().await?;
        let state = self.state.lock().await;
        match state.document.as_ref() {
            Some(document) => Ok(f(state.version, document)),
            None => Err(RtmcsError::NotFound("document is not loaded".to_string())),
        }
    }

    /// Apply everything in `backlog`, then `tail`, in order as one new version. Does not persist.
    ///
    /// backlog は state のロックを取ってから取り出す。取り出しから適用完了までの間に
    /// await がないので、この future が drop されても積まれた mutation は失われない。
    pub(crate) async fn apply_batch(
        &self,
        backlog: &Mutex<VecDeque<Mutation>>,
        tail: Vec<Mutation>,
    ) -> Result<(Version, usize), RtmcsError> {
        self.ensure_loaded().await?;
        let mut state = self.state.lock().await;
        let mut pending = backlog.lock().await;
        let next = state.version + 1;
        let Some(document) = state.document.as_mut() else {
            return Err(RtmcsError::NotFound("document is not loaded".to_string()));
        };

        document.set_working_version(next);
        let count = pending.len() + tail.len();
        for mutation in pending.drain(..).chain(tail) {
            mutation(document);
        }
        state.version = next;
        Ok((next, count))
    }

    #[cfg(test)]
    pub(crate) async fn lock_state(&self) -> impl Sized + '_ {
        self.state.lock().await
    }

    pub(crate) async fn ensure_loaded(&self) -> Result<(), RtmcsError> {
        if self.is_loaded().await {
            return Ok(());
        }
        self.reconcile().await
    }

    async fn fetch_remote_document(&self) -> Result<Document, RtmcsError> {
        match self.blob.get(DOCUMENT_KEY).await {
            Ok(body) => Document::from_json(&body),
            Err(BlobError::NotFound { .. }) => {
                warn!("remote version exists but {DOCUMENT_KEY} is missing; using baseline");
                Ok((*self.baseline).clone())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn persist_in_background(&self) {
        let store = self.clone();
        let mut tasks = self.background.lock().await;
        // 終わったものは回収しておく
        while tasks.try_join_next().is_some() {}
        tasks.spawn(async move {
            if let Err(e) = store.persist().await {
                warn!("background persist failed: {e}");
            }
        });
    }
}

/// 版数をパースする。壊れていたら 0 として扱う
fn parse_version(raw: &str) -> Version {
    match raw.trim().parse::<Version>() {
        Ok(version) => version,
        Err(_) => {
            warn!("unparsable remote version {raw:?}; treating it as 0");
            0
        }
    }
}
