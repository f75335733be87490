//! Domain Entities - Corpus records and the cache snapshot
//!
//! Records are plain data parsed from the corpus. The snapshot bundles one
//! complete, validated load and is never mutated after creation.

use crate::domain::value_objects::{Accessibility, ComponentExample, ComponentProp, TokenCategory};
use crate::error::ServiceError;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Maximum number of suggestions attached to a lookup miss.
const MAX_SUGGESTIONS: usize = 3;

/// A named corpus record.
pub trait Record {
    /// Collection name used in error messages
    const KIND: &'static str;

    /// Identifier used for lookups and duplicate detection
    fn key(&self) -> &str;

    /// Semantic checks beyond what deserialization enforces.
    fn validate(&self) -> Result<(), String> {
        if self.key().trim().is_empty() {
            return Err(format!("{} name must not be empty", Self::KIND));
        }
        Ok(())
    }
}

/// A design token (color, spacing step, type ramp entry, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub name: String,
    pub value: String,
    pub category: TokenCategory,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub usage: Option<String>,
    #[serde(default)]
    pub deprecated: bool,
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl Record for Token {
    const KIND: &'static str = "token";

    fn key(&self) -> &str {
        &self.name
    }

    fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("token name must not be empty".to_string());
        }
        if self.value.trim().is_empty() {
            return Err(format!("token '{}' has an empty value", self.name));
        }
        Ok(())
    }
}

/// A UI component definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    pub name: String,
    pub description: String,
    pub category: String,
    pub props: Vec<ComponentProp>,
    pub variants: Vec<String>,
    pub examples: Vec<ComponentExample>,
    pub guidelines: Vec<String>,
    pub accessibility: Accessibility,
}

impl Record for Component {
    const KIND: &'static str = "component";

    fn key(&self) -> &str {
        &self.name
    }
}

/// A written design guideline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Guideline {
    pub id: String,
    pub title: String,
    pub category: String,
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub related_components: Vec<String>,
}

impl Record for Guideline {
    const KIND: &'static str = "guideline";

    fn key(&self) -> &str {
        &self.id
    }
}

/// One complete, validated load of the corpus.
#[derive(Debug, Clone)]
pub struct CacheSnapshot {
    pub design_tokens: Vec<Token>,
    pub components: Vec<Component>,
    pub guidelines: Vec<Guideline>,
    pub last_updated: Instant,
}

impl CacheSnapshot {
    pub fn new(
        design_tokens: Vec<Token>,
        components: Vec<Component>,
        guidelines: Vec<Guideline>,
    ) -> Self {
        Self {
            design_tokens,
            components,
            guidelines,
            last_updated: Instant::now(),
        }
    }

    pub fn record_count(&self) -> usize {
        self.design_tokens.len() + self.components.len() + self.guidelines.len()
    }

    /// Look up a token by name or alias.
    pub fn token(&self, name: &str) -> Result<&Token, ServiceError> {
        self.design_tokens
            .iter()
            .find(|t| {
                t.name.eq_ignore_ascii_case(name)
                    || t.aliases.iter().any(|a| a.eq_ignore_ascii_case(name))
            })
            .ok_or_else(|| {
                ServiceError::not_found(Token::KIND, name, suggest(&self.design_tokens, name))
            })
    }

    pub fn component(&self, name: &str) -> Result<&Component, ServiceError> {
        self.components
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| {
                ServiceError::not_found(Component::KIND, name, suggest(&self.components, name))
            })
    }

    pub fn guideline(&self, id: &str) -> Result<&Guideline, ServiceError> {
        self.guidelines
            .iter()
            .find(|g| g.id.eq_ignore_ascii_case(id))
            .ok_or_else(|| {
                ServiceError::not_found(Guideline::KIND, id, suggest(&self.guidelines, id))
            })
    }
}

/// Keys that contain, or are contained in, the missed name.
fn suggest<R: Record>(records: &[R], name: &str) -> Vec<String> {
    let needle = name.to_lowercase();
    records
        .iter()
        .map(|r| r.key())
        .filter(|key| {
            let key = key.to_lowercase();
            !needle.is_empty() && (key.contains(&needle) || needle.contains(&key))
        })
        .take(MAX_SUGGESTIONS)
        .map(str::to_string)
        .collect()
}
