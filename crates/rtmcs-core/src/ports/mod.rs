//! Ports - 抽象化レイヤー
//!
//! 外部システム（オブジェクトストレージ、時計、ID 生成）への
//! インターフェースを定義し、実装の詳細を隠蔽します。
//!
//! # 設計原則
//! - Blob storage が document の正本（source of truth）
//! - プロセス内のキャッシュは version で remote と突き合わせる

pub mod blob_store;
pub mod clock;
pub mod id_generator;

pub use self::blob_store::{BlobError, BlobStore};
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
