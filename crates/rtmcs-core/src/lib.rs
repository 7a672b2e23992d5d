//! rtmcs-core
//!
//! Core building blocks for the RTMCS admin backend.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, document, kind）
//! - **ports**: 抽象化レイヤー（BlobStore, Clock, IdGenerator）
//! - **impls**: ports の実装（InMemoryBlobStore, LocalBlobStore）
//! - **store**: VersionedStore（in-memory document + version の正本と reconcile/persist）
//! - **queue**: MutationQueue（書き込みの直列化）と DrainLoop
//! - **app**: Collection API と AppBuilder によるワイヤリング

pub mod domain;
pub mod ports;
pub mod impls;
pub mod store;
pub mod queue;
pub mod app;
pub mod error;

pub use error::RtmcsError;
