//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **InMemoryBlobStore**: 開発・テスト用（障害注入、put の一時停止）
//! - **LocalBlobStore**: ローカルディスク上の object store（signed upload URL 付き）

pub mod inmem_blob;
pub mod local_blob;

pub use self::inmem_blob::InMemoryBlobStore;
pub use self::local_blob::LocalBlobStore;
