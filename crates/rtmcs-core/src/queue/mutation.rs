//! MutationQueue - document への書き込みを 1 本のトランザクションに直列化する
//!
//! # フロー
//! 1. `apply()` がトランザクションフラグを取れたら、pending を先に適用してから
//!    自分の mutation を適用し、版数を 1 つ進めて persist する
//! 2. フラグが取れなければ pending の末尾に積んで `Applied::Queued` を返す
//! 3. pending は DrainLoop（`drain_now()`）か次のトランザクションがまとめて commit する
//!
//! どの経路でも pending は先頭から順に適用されるので、FIFO が保たれる。

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::debug;
use tokio::sync::Mutex;

use crate::domain::{Document, Version};
use crate::error::RtmcsError;
use crate::store::VersionedStore;

/// Document を書き換える 1 回分の変更
pub type Mutation = Box<dyn FnOnce(&mut Document) + Send>;

/// クロージャを `Mutation` に包む
pub fn mutation(f: impl FnOnce(&mut Document) + Send + 'static) -> Mutation {
    Box::new(f)
}

/// `apply()` の結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// 自分のトランザクションで適用・persist まで完了した
    Committed { version: Version },
    /// 別のトランザクションが実行中だったので pending に積んだ
    Queued,
}

/// トランザクションフラグを握っている間だけ生きるガード
///
/// Drop で必ずフラグを戻すので、エラーや future の drop でもロックが残らない。
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[derive(Clone)]
pub struct MutationQueue {
    store: VersionedStore,
    in_flight: Arc<AtomicBool>,
    pending: Arc<Mutex<VecDeque<Mutation>>>,
}

impl MutationQueue {
    pub fn new(store: VersionedStore) -> Self {
        Self {
            store,
            in_flight: Arc::new(AtomicBool::new(false)),
            pending: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    pub fn store(&self) -> &VersionedStore {
        &self.store
    }

    /// Apply `mutation` now, or queue it if a transaction is already in flight.
    ///
    /// persist に失敗した場合はエラーを返すが、ローカルの document と版数はそのまま。
    pub async fn apply(&self, mutation: Mutation) -> Result<Applied, RtmcsError> {
        let Some(_in_flight) = self.try_begin() else {
            let pending = self.enqueue(mutation).await;
            debug!("transaction in flight; queued mutation ({pending} pending)");
            return Ok(Applied::Queued);
        };

        let (version, _) = self.commit(vec![mutation]).await?;
        Ok(Applied::Committed { version })
    }

    /// Commit every pending mutation as one version.
    ///
    /// 適用した件数を返す。トランザクション実行中なら何もせず 0（次の tick で拾う）。
    pub async fn drain_now(&self) -> Result<usize, RtmcsError> {
        let Some(_in_flight) = self.try_begin() else {
            return Ok(0);
        };
        if self.pending.lock().await.is_empty() {
            return Ok(0);
        }

        let (version, count) = self.commit(Vec::new()).await?;
        debug!("drained {count} queued mutations into version {version}");
        Ok(count)
    }

    /// 無条件に pending の末尾へ積む。積んだ後の件数を返す
    pub(crate) async fn enqueue(&self, mutation: Mutation) -> usize {
        let mut pending = self.pending.lock().await;
        pending.push_back(mutation);
        pending.len()
    }

    pub async fn pending_len(&self) -> usize {
        self.pending.lock().await.len()
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    fn try_begin(&self) -> Option<InFlight<'_>> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlight(&self.in_flight))
    }

    /// pending を先頭から、続けて `tail` を適用して persist する
    ///
    /// pending の取り出しは store 側で state のロックの内側で行うので、
    /// 途中で drop されても他の呼び出し元が積んだ mutation は残る。
    async fn commit(&self, tail: Vec<Mutation>) -> Result<(Version, usize), RtmcsError> {
        let (_, count) = self.store.apply_batch(&self.pending, tail).await?;
        let version = self.store.persist().await?;
        Ok((version, count))
    }
}
