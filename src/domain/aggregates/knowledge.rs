//! Knowledge records backing the shopping assistant

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeRecord {
    pub id: Uuid,
    pub title: String,
    pub text: String,
    pub tags: Vec<String>,
    #[serde(skip)]
    pub embedding: Vec<f32>,
    pub created_at: DateTime<Utc>,
    pub source: KnowledgeSource,
}

impl KnowledgeRecord {
    pub fn has_tag(&self, pattern: &regex::Regex) -> bool {
        self.tags.iter().any(|t| pattern.is_match(t))
    }
}

/// Search result: a record without its vector, plus cosine similarity.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct KnowledgeHit {
    pub id: Uuid,
    pub title: String,
    pub text: String,
    pub tags: Vec<String>,
    pub score: f32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KnowledgeSource { #[default] Manual, Product }

impl KnowledgeSource {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Manual => "manual", Self::Product => "product" }
    }
}

impl fmt::Display for KnowledgeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for KnowledgeSource {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, String> {
        match s { "manual" => Ok(Self::Manual), "product" => Ok(Self::Product), other => Err(format!("unknown source '{other}'")) }
    }
}
