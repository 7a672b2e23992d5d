//! Collection - People / Questions / Items の CRUD
//!
//! 読み取りは `reconcile()` してからキャッシュを返し、書き込みは
//! すべて `MutationQueue` に mutation として渡します。

use std::marker::PhantomData;
use std::sync::Arc;

use log::{debug, warn};
use serde_json::json;

use crate::domain::{CollectionKind, Document, Id, Record, record_id};
use crate::error::RtmcsError;
use crate::ports::IdGenerator;
use crate::ports::id_generator::generate;
use crate::queue::{Applied, MutationQueue, mutation};
use crate::store::keys::{IMAGE_CONTENT_TYPE, IMAGE_UPLOAD_TTL};

/// `K` が Document のどのコレクションかを決める
pub struct Collection<K: CollectionKind> {
    queue: MutationQueue,
    ids: Arc<dyn IdGenerator>,
    _kind: PhantomData<K>,
}

impl<K: CollectionKind> Clone for Collection<K> {
    fn clone(&self) -> Self {
        Self {
            queue: self.queue.clone(),
            ids: self.ids.clone(),
            _kind: PhantomData,
        }
    }
}

impl<K: CollectionKind> Collection<K> {
    pub fn new(queue: MutationQueue, ids: Arc<dyn IdGenerator>) -> Self {
        Self {
            queue,
            ids,
            _kind: PhantomData,
        }
    }

    pub async fn list(&self) -> Result<Vec<Record>, RtmcsError> {
        self.refresh().await?;
        self.queue
            .store()
            .read(|_, doc| K::records(doc).clone())
            .await
    }

    pub async fn get(&self, id: &str) -> Result<Record, RtmcsError> {
        self.refresh().await?;
        self.queue
            .store()
            .read(|_, doc| {
                K::records(doc)
                    .iter()
                    .find(|record| record_id(record) == Some(id))
                    .cloned()
            })
            .await?
            .ok_or_else(|| RtmcsError::NotFound(format!("{} {id}", K::NAME)))
    }

    /// Assign a fresh id to `payload` and append it.
    ///
    /// 別のトランザクションが実行中なら積むだけで、commit を待たずに ID を返す。
    pub async fn create(&self, mut payload: Record) -> Result<Id<K>, RtmcsError> {
        let id = generate::<K>(self.ids.as_ref());
        payload.insert("id".to_string(), json!(id.to_string()));

        let applied = self
            .queue
            .apply(mutation(move |doc: &mut Document| {
                stamp(&mut payload, doc);
                K::records_mut(doc).push(payload);
            }))
            .await?;
        debug!("create {} {id}: {applied:?}", K::NAME);
        Ok(id)
    }

    /// Overwrite the record whose id matches. Unknown ids change nothing.
    pub async fn replace(&self, id: &str, payload: Record) -> Result<Applied, RtmcsError> {
        let target = id.to_string();
        self.queue
            .apply(mutation(move |doc: &mut Document| {
                let version = doc.working_version();
                let records = K::records_mut(doc);
                if let Some(slot) = records
                    .iter_mut()
                    .find(|record| record_id(record) == Some(target.as_str()))
                {
                    let mut payload = payload;
                    payload.insert("version".to_string(), json!(version));
                    *slot = payload;
                }
            }))
            .await
    }

    /// Remove the record, then best-effort delete its images.
    pub async fn delete(&self, id: &str) -> Result<Applied, RtmcsError> {
        let target = id.to_string();
        let applied = self
            .queue
            .apply(mutation(move |doc: &mut Document| {
                K::records_mut(doc).retain(|record| record_id(record) != Some(target.as_str()));
            }))
            .await?;

        let blob = self.queue.store().blob();
        for key in K::image_keys(id) {
            if let Err(e) = blob.delete(&key).await {
                debug!("ignoring image cleanup failure for {key}: {e}");
            }
        }
        Ok(applied)
    }

    /// Signed URL for uploading this entity's image.
    pub async fn image_upload_url(&self, id: &str, variant: &str) -> Result<String, RtmcsError> {
        let key = K::upload_key(id, variant).ok_or_else(|| {
            RtmcsError::NotFound(format!("{} {id} has no image {variant:?}", K::NAME))
        })?;
        let url = self
            .queue
            .store()
            .blob()
            .signed_upload_url(&key, IMAGE_UPLOAD_TTL, IMAGE_CONTENT_TYPE)
            .await?;
        Ok(url)
    }

    /// reconcile に失敗しても、キャッシュがあればそれを返す
    async fn refresh(&self) -> Result<(), RtmcsError> {
        let store = self.queue.store();
        match store.reconcile().await {
            Ok(()) => Ok(()),
            Err(e) if store.is_loaded().await => {
                warn!("serving cached {} after reconcile failure: {e}", K::NAME);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

fn stamp(record: &mut Record, doc: &Document) {
    record.insert("version".to_string(), json!(doc.working_version()));
}
