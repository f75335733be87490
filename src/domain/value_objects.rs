//! Value Objects - Immutable domain primitives
//!
//! Small pieces of the corpus records, identified by their value.

use serde::{Deserialize, Serialize};

/// Design token category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenCategory {
    Color,
    Typography,
    Spacing,
    Elevation,
    Motion,
}

impl TokenCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Color => "color",
            Self::Typography => "typography",
            Self::Spacing => "spacing",
            Self::Elevation => "elevation",
            Self::Motion => "motion",
        }
    }

    /// Parse a category name, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "color" => Some(Self::Color),
            "typography" => Some(Self::Typography),
            "spacing" => Some(Self::Spacing),
            "elevation" => Some(Self::Elevation),
            "motion" => Some(Self::Motion),
            _ => None,
        }
    }
}

impl std::fmt::Display for TokenCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A configurable property of a component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentProp {
    pub name: String,
    #[serde(rename = "type")]
    pub prop_type: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub default: Option<serde_json::Value>,
    #[serde(default)]
    pub description: Option<String>,
}

/// A usage example for a component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentExample {
    pub title: String,
    pub code: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Accessibility notes for a component.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Accessibility {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub aria_attributes: Vec<String>,
    #[serde(default)]
    pub keyboard_support: Vec<String>,
    #[serde(default)]
    pub notes: Option<String>,
}
