//! Product Catalog: static price table for every tool behind the paywall.
//!
//! Built once at startup (from the built-in table or a JSON file) and handed
//! to the entitlement service by value. Never mutated at runtime.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const ATS_CHECKER: &str = "ats-checker";
pub const SKILL_GAP: &str = "skill-gap";
pub const COVER_LETTER: &str = "cover-letter";
pub const RESUME_BUILDER: &str = "resume-builder";

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read catalog file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse catalog: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid price for tool '{tool_id}': {reason}")]
    InvalidPrice { tool_id: String, reason: String },

    #[error("catalog contains no tools")]
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Price {
    pub actual_price: i64,
    pub sale_price: i64,
}

impl Price {
    pub const fn new(actual_price: i64, sale_price: i64) -> Self {
        Self {
            actual_price,
            sale_price,
        }
    }

    pub fn is_free(&self) -> bool {
        self.sale_price == 0
    }
}

/// Immutable `tool_id -> Price` mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ProductCatalog {
    tools: BTreeMap<String, Price>,
}

impl ProductCatalog {
    /// Builds a validated catalog. Prices must be non-negative and the sale
    /// price may not exceed the list price.
    pub fn new<I, K>(entries: I) -> Result<Self, CatalogError>
    where
        I: IntoIterator<Item = (K, Price)>,
        K: Into<String>,
    {
        let tools: BTreeMap<String, Price> =
            entries.into_iter().map(|(k, p)| (k.into(), p)).collect();

        if tools.is_empty() {
            return Err(CatalogError::Empty);
        }
        for (tool_id, price) in &tools {
            if price.actual_price < 0 || price.sale_price < 0 {
                return Err(CatalogError::InvalidPrice {
                    tool_id: tool_id.clone(),
                    reason: "prices must be non-negative".to_string(),
                });
            }
            if price.sale_price > price.actual_price {
                return Err(CatalogError::InvalidPrice {
                    tool_id: tool_id.clone(),
                    reason: format!(
                        "sale price {} exceeds actual price {}",
                        price.sale_price, price.actual_price
                    ),
                });
            }
        }
        Ok(Self { tools })
    }

    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let entries: BTreeMap<String, Price> = serde_json::from_str(json)?;
        Self::new(entries)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn get(&self, tool_id: &str) -> Option<&Price> {
        self.tools.get(tool_id)
    }

    /// True only for catalogued tools with a zero sale price.
    pub fn is_free(&self, tool_id: &str) -> bool {
        self.get(tool_id).is_some_and(Price::is_free)
    }

    /// Amount charged for a tool; unknown tools are charged 0.
    pub fn amount_for(&self, tool_id: &str) -> i64 {
        self.get(tool_id).map(|p| p.sale_price).unwrap_or(0)
    }

    pub fn tool_ids(&self) -> impl Iterator<Item = &str> {
        self.tools.keys().map(String::as_str)
    }
}

impl Default for ProductCatalog {
    fn default() -> Self {
        Self {
            tools: BTreeMap::from([
                (ATS_CHECKER.to_string(), Price::new(699, 149)),
                (SKILL_GAP.to_string(), Price::new(999, 199)),
                (COVER_LETTER.to_string(), Price::new(499, 99)),
                (RESUME_BUILDER.to_string(), Price::new(0, 0)),
            ]),
        }
    }
}
