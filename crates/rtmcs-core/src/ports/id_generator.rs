//! IdGenerator port - ID 生成の抽象化
//!
//! # 実装
//! - **UlidGenerator**: ULID ベース（本番用）

use crate::domain::ids::{Id, IdMarker};
use crate::ports::Clock;
use ulid::Ulid;

/// IdGenerator は新しいエンティティの ID を生成
///
/// # Thread Safety
/// - `Send + Sync` を要求（複数の request handler から同時に呼ばれる）
pub trait IdGenerator: Send + Sync {
    fn next_ulid(&self) -> Ulid;
}

/// 型付き ID を生成するヘルパー（trait を object-safe に保つため分離）
pub fn generate<T: IdMarker>(generator: &dyn IdGenerator) -> Id<T> {
    Id::from_ulid(generator.next_ulid())
}

/// UlidGenerator は ULID ベースの ID 生成器
///
/// Clock を使って現在時刻ベースの ULID を生成します。
/// FixedClock でも乱数部分（80-bit）があるので ID は衝突しません。
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn next_ulid(&self) -> Ulid {
        let timestamp_ms = self.clock.now().timestamp_millis() as u64;
        Ulid::from_parts(timestamp_ms, rand::random())
    }
}
