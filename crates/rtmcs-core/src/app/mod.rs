//! App - アプリケーション層
//!
//! store / queue を組み合わせて、HTTP 層から使う Collection API を提供します。
//!
//! # 主要コンポーネント
//! - **AppBuilder**: アプリケーションの構築とワイヤリング
//! - **Collection**: People / Questions / Items の CRUD と画像 URL

pub mod builder;
pub mod collection;

pub use self::builder::{App, AppBuilder, BuildError};
pub use self::collection::Collection;
