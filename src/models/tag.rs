//! Tag model
//!
//! Tags are identified by name and created on first use.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tag entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    /// Unique identifier
    pub id: i64,
    /// Tag name (unique)
    pub name: String,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

/// Tag with the number of articles linked to it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagWithCount {
    #[serde(flatten)]
    pub tag: Tag,
    pub article_count: i64,
}

/// Trim tag names, drop blanks and collapse duplicates, keeping first-seen order.
pub fn normalize_tag_names<I, S>(names: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = Vec::new();
    for name in names {
        let name = name.as_ref().trim();
        if !name.is_empty() && !seen.iter().any(|s: &String| s == name) {
            seen.push(name.to_string());
        }
    }
    seen
}
