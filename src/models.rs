use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How hard a posted question is, as chosen by its author.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Difficulty {
    pub const ALL: [Difficulty; 3] = [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard];

    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }

    pub fn label_ja(&self) -> &'static str {
        match self {
            Difficulty::Easy => "かんたん",
            Difficulty::Medium => "ふつう",
            Difficulty::Hard => "むずかしい",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Difficulty {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            other => Err(UnknownVariant::new("difficulty", other)),
        }
    }
}

/// Subject area of a posted question.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Algebra,
    Geometry,
    Calculus,
    #[default]
    Other,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Algebra,
        Category::Geometry,
        Category::Calculus,
        Category::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Algebra => "algebra",
            Category::Geometry => "geometry",
            Category::Calculus => "calculus",
            Category::Other => "other",
        }
    }

    pub fn label_ja(&self) -> &'static str {
        match self {
            Category::Algebra => "代数",
            Category::Geometry => "幾何",
            Category::Calculus => "微積分",
            Category::Other => "その他",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "algebra" => Ok(Category::Algebra),
            "geometry" => Ok(Category::Geometry),
            "calculus" => Ok(Category::Calculus),
            "other" => Ok(Category::Other),
            other => Err(UnknownVariant::new("category", other)),
        }
    }
}

/// Returned when a form value does not name one of the enumerated options.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {field} `{value}`")]
pub struct UnknownVariant {
    pub field: &'static str,
    pub value: String,
}

impl UnknownVariant {
    fn new(field: &'static str, value: &str) -> Self {
        Self {
            field,
            value: value.to_string(),
        }
    }
}

/// Named partitions of the blob store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    ProblemImages,
    SolutionImages,
}

impl Bucket {
    pub const ALL: [Bucket; 2] = [Bucket::ProblemImages, Bucket::SolutionImages];

    pub fn as_str(&self) -> &'static str {
        match self {
            Bucket::ProblemImages => "problem_images",
            Bucket::SolutionImages => "solution_images",
        }
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A file picked in the form, held in memory until it is uploaded.
#[derive(Debug, Clone)]
pub struct LocalFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl LocalFile {
    pub fn new(
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            bytes,
        }
    }
}

/// Location of an uploaded object inside its bucket, e.g. `questions/<token>.png`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssetKey(pub String);

impl AssetKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A local file once persisted in the blob store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedAsset {
    pub key: AssetKey,
    pub public_url: String,
}

/// Identifier the record store assigned to a freshly inserted row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub serde_json::Value);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            serde_json::Value::String(value) => f.write_str(value),
            other => write!(f, "{other}"),
        }
    }
}

/// Row written to the `problems` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewProblem {
    pub title: String,
    pub text_content: String,
    pub image_urls: Vec<String>,
    pub difficulty: Difficulty,
    pub category: Category,
    pub created_by: String,
}

/// Row returned by the store after insertion.
#[derive(Debug, Clone, Deserialize)]
pub struct ProblemRow {
    pub id: RecordId,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// The signed-in user as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionIdentity {
    pub id: String,
    pub display_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn difficulty_parses_form_values() {
        assert_eq!("hard".parse::<Difficulty>(), Ok(Difficulty::Hard));
        let err = "extreme".parse::<Difficulty>().unwrap_err();
        assert_eq!(err.to_string(), "unknown difficulty `extreme`");
    }

    #[test]
    fn category_serializes_lowercase() {
        let value = serde_json::to_value(Category::Calculus).unwrap();
        assert_eq!(value, serde_json::json!("calculus"));
        assert_eq!(Category::default(), Category::Other);
    }

    #[test]
    fn record_id_displays_without_quotes() {
        assert_eq!(RecordId(serde_json::json!("abc")).to_string(), "abc");
        assert_eq!(RecordId(serde_json::json!(42)).to_string(), "42");
    }
}
