use serde::{Deserialize, Serialize};
use std::fmt;

use crate::account::UserId;
use crate::transaction::ValidRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CategoryId(pub i64);

impl fmt::Display for CategoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub user_id: UserId,
    pub name: String,
}

/// A user-defined "description contains pattern" rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRule {
    pub pattern: String,
    pub category_id: CategoryId,
    /// Higher runs first.
    #[serde(default)]
    pub priority: i32,
}

/// Which cascade tier assigned the category. Ordered best first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Exact,
    Partial,
    Keyword,
    None,
}

impl Confidence {
    pub fn as_str(self) -> &'static str {
        match self {
            Confidence::Exact => "exact",
            Confidence::Partial => "partial",
            Confidence::Keyword => "keyword",
            Confidence::None => "none",
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Confidence {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "exact" => Ok(Confidence::Exact),
            "partial" => Ok(Confidence::Partial),
            "keyword" => Ok(Confidence::Keyword),
            "none" => Ok(Confidence::None),
            other => Err(format!("Unknown confidence: '{other}'")),
        }
    }
}

/// Policy for applying cascade results without asking the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategorizationMode {
    /// Apply every match, keyword matches included.
    #[default]
    Auto,
    /// Keyword matches are surfaced for confirmation instead of applied.
    Safe,
}

impl CategorizationMode {
    pub fn applies(self, confidence: Confidence) -> bool {
        match confidence {
            Confidence::Exact | Confidence::Partial => true,
            Confidence::Keyword => self == CategorizationMode::Auto,
            Confidence::None => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategorizedRecord {
    pub record: ValidRecord,
    pub category_id: Option<CategoryId>,
    pub confidence: Confidence,
    /// Name of the matched category, kept even when it did not resolve to an id.
    pub suggested_category: Option<String>,
}

impl CategorizedRecord {
    pub fn uncategorized(record: ValidRecord) -> Self {
        CategorizedRecord {
            record,
            category_id: None,
            confidence: Confidence::None,
            suggested_category: None,
        }
    }

    /// Category to persist under `mode`.
    pub fn applied_category(&self, mode: CategorizationMode) -> Option<CategoryId> {
        if mode.applies(self.confidence) {
            self.category_id
        } else {
            None
        }
    }

    /// Keyword match held back by `mode` for the user to confirm.
    pub fn needs_confirmation(&self, mode: CategorizationMode) -> bool {
        self.confidence == Confidence::Keyword && !mode.applies(self.confidence)
    }
}
