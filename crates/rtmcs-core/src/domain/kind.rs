//! CollectionKind - Document 内のコレクションを型で表す
//!
//! People / Questions / Items は同じ操作（list/create/replace/delete）を持ち、
//! 違うのは「Document のどのフィールドか」「ID のプレフィックス」「画像 key」だけ。
//! その差分をマーカー型に閉じ込め、`Collection<K>` を 1 つの実装で済ませます。

use super::document::{Document, Record};
use super::ids::IdMarker;
use crate::store::keys;

pub trait CollectionKind: IdMarker {
    /// ログとエラーメッセージ用の名前
    const NAME: &'static str;

    fn records(doc: &Document) -> &Vec<Record>;

    fn records_mut(doc: &mut Document) -> &mut Vec<Record>;

    /// Blob keys removed (best-effort) when an entity is deleted.
    fn image_keys(id: &str) -> Vec<String>;

    /// Key for a signed image upload, or `None` if the kind/variant has no image.
    fn upload_key(id: &str, variant: &str) -> Option<String>;
}

/// Person のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Person {}

impl IdMarker for Person {
    fn prefix() -> &'static str {
        "person-"
    }
}

impl CollectionKind for Person {
    const NAME: &'static str = "people";

    fn records(doc: &Document) -> &Vec<Record> {
        &doc.people
    }

    fn records_mut(doc: &mut Document) -> &mut Vec<Record> {
        &mut doc.people
    }

    fn image_keys(_id: &str) -> Vec<String> {
        Vec::new()
    }

    fn upload_key(_id: &str, _variant: &str) -> Option<String> {
        None
    }
}

/// Question のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Question {}

impl IdMarker for Question {
    fn prefix() -> &'static str {
        "question-"
    }
}

impl CollectionKind for Question {
    const NAME: &'static str = "questions";

    fn records(doc: &Document) -> &Vec<Record> {
        &doc.questions
    }

    fn records_mut(doc: &mut Document) -> &mut Vec<Record> {
        &mut doc.questions
    }

    fn image_keys(id: &str) -> Vec<String> {
        keys::QuestionImage::ALL
            .iter()
            .map(|variant| keys::question_image_key(id, *variant))
            .collect()
    }

    fn upload_key(id: &str, variant: &str) -> Option<String> {
        let variant = variant.parse::<keys::QuestionImage>().ok()?;
        Some(keys::question_image_key(id, variant))
    }
}

/// Shop item のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Item {}

impl IdMarker for Item {
    fn prefix() -> &'static str {
        "item-"
    }
}

impl CollectionKind for Item {
    const NAME: &'static str = "items";

    fn records(doc: &Document) -> &Vec<Record> {
        &doc.items
    }

    fn records_mut(doc: &mut Document) -> &mut Vec<Record> {
        &mut doc.items
    }

    fn image_keys(id: &str) -> Vec<String> {
        vec![keys::shop_image_key(id)]
    }

    // shop item は画像 1 枚なので variant は見ない
    fn upload_key(id: &str, _variant: &str) -> Option<String> {
        Some(keys::shop_image_key(id))
    }
}
