//! Document - アプリケーション状態の全体
//!
//! `{ people: [...], questions: [...], items: [...] }` を 1 つの JSON として
//! blob store に保存します。各 record はスキーマを持たない JSON object で、
//! `id` と `version` 以外のフィールドはそのまま往復させます。

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::RtmcsError;

/// Document の版数。remote には `data/version.json` として別に保存される。
pub type Version = u64;

/// 1 件のエンティティ（Person / Question / Item）
pub type Record = Map<String, Value>;

const EMBEDDED_BASELINE: &str = include_str!("baseline.json");

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub people: Vec<Record>,
    #[serde(default)]
    pub questions: Vec<Record>,
    #[serde(default)]
    pub items: Vec<Record>,

    /// 実行中のトランザクションが commit する版数（mutation が record に刻む）
    #[serde(skip)]
    working_version: Version,
}

impl Document {
    /// Crate に埋め込まれた seed データ
    pub fn embedded_baseline() -> Result<Self, RtmcsError> {
        Self::from_json(EMBEDDED_BASELINE)
    }

    pub fn from_json(json: &str) -> Result<Self, RtmcsError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, RtmcsError> {
        Ok(serde_json::to_string(self)?)
    }

    /// The version the in-flight transaction will commit.
    pub fn working_version(&self) -> Version {
        self.working_version
    }

    pub(crate) fn set_working_version(&mut self, version: Version) {
        self.working_version = version;
    }
}

impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        self.people == other.people
            && self.questions == other.questions
            && self.items == other.items
    }
}

/// record の `id` を文字列として取り出す
pub fn record_id(record: &Record) -> Option<&str> {
    record.get("id").and_then(Value::as_str)
}
