//! DrainLoop - pending の定期 commit
//!
//! # フロー
//! 1. `interval` ごとに `MutationQueue::drain_now()` を呼ぶ
//! 2. persist の失敗はログに残してループを続ける（次の tick か次の apply で再送される）
//! 3. shutdown 要求を受けたら最後に 1 回 drain してから抜ける

use std::time::Duration;

use log::{debug, error, warn};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::MutationQueue;

pub const DEFAULT_DRAIN_INTERVAL: Duration = Duration::from_millis(500);

/// Drain loop handle.
/// - `request_shutdown()` でループを止める
/// - `shutdown_and_join()` で最後の drain まで待てる
pub struct DrainLoop {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl DrainLoop {
    pub fn spawn(queue: MutationQueue, interval: Duration) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(drain_loop(queue, interval, shutdown_rx));
        Self { shutdown_tx, join }
    }

    pub fn request_shutdown(&self) {
        // ignore send error: the loop may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    /// Shutdown and wait for the final drain.
    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        if let Err(e) = self.join.await {
            error!("drain loop task failed: {e}");
        }
    }
}

async fn drain_loop(
    queue: MutationQueue,
    interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        tokio::select! {
            changed = shutdown_rx.changed() => {
                // sender が drop されたら止める
                if changed.is_err() {
                    break;
                }
                continue;
            }
            _ = ticker.tick() => {}
        }

        drain_once(&queue).await;
    }

    drain_once(&queue).await;
    let left = queue.pending_len().await;
    if left > 0 {
        warn!("drain loop stopped with {left} mutations still pending");
    }
    debug!("drain loop stopped");
}

async fn drain_once(queue: &MutationQueue) {
    if let Err(e) = queue.drain_now().await {
        error!("failed to commit queued mutations: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Document, Record};
    use crate::impls::InMemoryBlobStore;
    use crate::queue::{Applied, mutation};
    use crate::store::keys::VERSION_KEY;
    use crate::store::{ReconcilePolicy, VersionedStore};
    use serde_json::json;
    use std::sync::Arc;

    fn queue_on(blob: &Arc<InMemoryBlobStore>) -> MutationQueue {
        MutationQueue::new(VersionedStore::new(
            blob.clone(),
            Document::default(),
            ReconcilePolicy::FetchRemote,
        ))
    }

    fn push_item(n: i64) -> crate::queue::Mutation {
        mutation(move |doc: &mut Document| {
            let mut record = Record::new();
            record.insert("n".to_string(), json!(n));
            doc.items.push(record);
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_commits_queued_mutations_on_next_tick() {
        let blob = Arc::new(InMemoryBlobStore::new());
        let queue = queue_on(&blob);
        queue.store().reconcile().await.unwrap();
        queue.store().wait_background().await;

        blob.pause_puts();
        let first = tokio::spawn({
            let queue = queue.clone();
            async move { queue.apply(push_item(0)).await }
        });
        while !queue.is_in_flight() || queue.store().local_version().await == 0 {
            tokio::task::yield_now().await;
        }
        for n in 1..=3 {
            assert_eq!(queue.apply(push_item(n)).await.unwrap(), Applied::Queued);
        }

        let drain = DrainLoop::spawn(queue.clone(), DEFAULT_DRAIN_INTERVAL);
        blob.resume_puts();
        first.await.unwrap().unwrap();

        tokio::time::sleep(DEFAULT_DRAIN_INTERVAL * 2).await;

        assert_eq!(queue.pending_len().await, 0);
        let (version, doc) = queue.store().snapshot().await.unwrap();
        let order: Vec<i64> = doc.items.iter().map(|r| r["n"].as_i64().unwrap()).collect();
        assert_eq!(order, vec![0, 1, 2, 3]);
        assert_eq!(version, 2);
        assert_eq!(blob.peek(VERSION_KEY).await.as_deref(), Some("2"));

        drain.shutdown_and_join().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_keeps_running_after_persist_failure() {
        let blob = Arc::new(InMemoryBlobStore::new());
        let queue = queue_on(&blob);
        queue.store().reconcile().await.unwrap();
        queue.store().wait_background().await;

        let drain = DrainLoop::spawn(queue.clone(), DEFAULT_DRAIN_INTERVAL);
        blob.fail_puts(true);
        queue.enqueue(push_item(1)).await;
        tokio::time::sleep(DEFAULT_DRAIN_INTERVAL * 2).await;

        // 適用はされたが persist できていない
        assert_eq!(queue.store().local_version().await, 1);
        assert_eq!(blob.peek(VERSION_KEY).await.as_deref(), Some("0"));

        blob.fail_puts(false);
        queue.enqueue(push_item(2)).await;
        tokio::time::sleep(DEFAULT_DRAIN_INTERVAL * 2).await;

        assert_eq!(blob.peek(VERSION_KEY).await.as_deref(), Some("2"));
        drain.shutdown_and_join().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_flushes_pending_mutations() {
        let blob = Arc::new(InMemoryBlobStore::new());
        let queue = queue_on(&blob);
        queue.store().reconcile().await.unwrap();
        queue.store().wait_background().await;

        let drain = DrainLoop::spawn(queue.clone(), Duration::from_secs(3600));
        // 最初の tick は即時なので、それが終わってから積む
        tokio::task::yield_now().await;
        queue.enqueue(push_item(7)).await;

        drain.shutdown_and_join().await;

        assert_eq!(queue.pending_len().await, 0);
        assert_eq!(blob.peek(VERSION_KEY).await.as_deref(), Some("1"));
    }
}
