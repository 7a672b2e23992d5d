//! Store - document キャッシュと blob store の同期
//!
//! - **keys**: object-store 上の key 配置
//! - **versioned**: VersionedStore（reconcile / persist）

pub mod keys;
pub mod versioned;

pub use self::versioned::{ReconcilePolicy, VersionedStore};
