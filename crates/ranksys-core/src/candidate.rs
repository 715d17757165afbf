//! Candidate types.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Attribute bag of a candidate.
///
/// `category`, `price`, `currency` and `description` are the structurally
/// significant keys; everything else is carried through opaquely in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,

    #[serde(default = "default_currency", skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Any other attribute supplied by the caller (e.g. `url`).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_currency() -> Option<String> {
    Some("CNY".to_string())
}

impl Default for CandidateInfo {
    fn default() -> Self {
        Self {
            category: None,
            price: None,
            currency: default_currency(),
            description: None,
            extra: Map::new(),
        }
    }
}

/// One option under evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Identifier, unique within a request.
    pub id: String,

    /// Display name.
    pub name: String,

    /// Attribute bag.
    #[serde(default)]
    pub info: CandidateInfo,
}

impl Candidate {
    /// Create a candidate with an empty attribute bag.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            info: CandidateInfo::default(),
        }
    }

    /// Synthesize a candidate standing for a URL (`url_<index>`).
    pub fn from_url(index: usize, url: impl Into<String>) -> Self {
        let url = url.into();
        let mut candidate = Self::new(format!("url_{}", index), url.clone());
        candidate
            .info
            .extra
            .insert("url".to_string(), Value::String(url));
        candidate
    }

    /// Builder method to set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.info.description = Some(description.into());
        self
    }

    /// Builder method to set the category.
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.info.category = Some(category.into());
        self
    }

    /// Builder method to set the price.
    pub fn with_price(mut self, price: f64) -> Self {
        self.info.price = Some(price);
        self
    }

    /// Builder method to add an extra attribute.
    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.info.extra.insert(key.into(), value);
        self
    }

    /// The non-empty `url` attribute, if any.
    pub fn url(&self) -> Option<&str> {
        self.info
            .extra
            .get("url")
            .and_then(Value::as_str)
            .filter(|u| !u.trim().is_empty())
    }

    /// True when the candidate has a URL but no description yet.
    pub fn needs_enrichment(&self) -> bool {
        let has_description = self
            .info
            .description
            .as_deref()
            .is_some_and(|d| !d.is_empty());
        self.url().is_some() && !has_description
    }
}
