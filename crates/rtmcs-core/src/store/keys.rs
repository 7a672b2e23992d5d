//! Object-store key layout.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Document 本体（JSON）
pub const DOCUMENT_KEY: &str = "data/index.json";

/// Document の版数（10 進数の文字列）
pub const VERSION_KEY: &str = "data/version.json";

pub const IMAGE_UPLOAD_TTL: Duration = Duration::from_secs(60 * 60);

pub const IMAGE_CONTENT_TYPE: &str = "image/png";

/// Question が持つ画像の種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestionImage {
    Default,
    Correct,
}

impl QuestionImage {
    pub const ALL: [QuestionImage; 2] = [QuestionImage::Default, QuestionImage::Correct];

    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionImage::Default => "default",
            QuestionImage::Correct => "correct",
        }
    }
}

impl fmt::Display for QuestionImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuestionImage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(QuestionImage::Default),
            "correct" => Ok(QuestionImage::Correct),
            other => Err(format!("unknown question image variant: {other}")),
        }
    }
}

pub fn question_image_key(id: &str, variant: QuestionImage) -> String {
    format!("images/questions/{id}_{variant}.png")
}

pub fn shop_image_key(id: &str) -> String {
    format!("images/shop/{id}.png")
}
