//! Per-call options and query parameters

use crate::document::Document;
use crate::error::{QuarryError, Result, ValidationKind};
use crate::features::relationships::RelationshipSelector;
use crate::storage::{Filter, SortKey};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Options bag accepted by every store operation
#[derive(Debug, Clone, Default)]
pub struct StoreOptions {
    /// Identity of the caller, recorded by audit and changelog
    pub actor: Option<String>,
    pub params: QueryParams,
    /// Filter ANDed into every lookup (tenant-level or ownership scoping)
    pub scope: Option<Filter>,
    /// Callback features or names to leave out of this call
    pub skip: Vec<String>,
    /// Reciprocal field an expansion arrived through; never expanded again
    pub arrived_via: Option<String>,
}

impl StoreOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn as_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn with_params(mut self, params: QueryParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_scope(mut self, scope: Filter) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn skipping(mut self, callback: impl Into<String>) -> Self {
        self.skip.push(callback.into());
        self
    }

    pub fn published(mut self) -> Self {
        self.params.published = true;
        self
    }

    /// Options for a write performed on behalf of another operation
    pub fn derived(&self) -> Self {
        Self { actor: self.actor.clone(), ..Self::default() }
    }
}

/// Query parameters forwarded by the routing collaborator
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryParams {
    /// Resolve reads against the published snapshots
    pub published: bool,
    /// Attach the snapshot history to a get
    pub versions: bool,
    pub relationships: Option<RelationshipSelector>,
    /// Language translated properties are resolved to
    pub lang: Option<String>,
    pub sort: Vec<SortKey>,
    pub limit: Option<usize>,
    pub skip: Option<usize>,
    /// Also report the total number of matches on a list
    pub count: bool,
    /// Parameters the engine does not interpret, kept for custom callbacks
    pub extra: BTreeMap<String, String>,
}

impl QueryParams {
    /// Parse raw string pairs (`?published=true&relationships=2&sort=-createdAt`)
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut params = Self::default();
        for (key, value) in pairs {
            let (key, value) = (key.as_ref(), value.as_ref().trim());
            match key {
                "published" => params.published = parse_flag(key, value)?,
                "versions" => params.versions = parse_flag(key, value)?,
                "count" => params.count = parse_flag(key, value)?,
                "relationships" => {
                    let selector = RelationshipSelector::parse(value).map_err(|e| bad(key, e))?;
                    params.relationships = Some(selector);
                }
                "lang" => params.lang = Some(value.to_string()).filter(|l| !l.is_empty()),
                "sort" => {
                    params.sort = value.split(',').filter_map(SortKey::parse).collect();
                }
                "limit" => params.limit = Some(parse_number(key, value)?),
                "skip" => params.skip = Some(parse_number(key, value)?),
                _ => {
                    params.extra.insert(key.to_string(), value.to_string());
                }
            }
        }
        Ok(params)
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value {
        "" | "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        other => Err(bad(key, format!("expected a boolean, got {:?}", other))),
    }
}

fn parse_number(key: &str, value: &str) -> Result<usize> {
    value.parse().map_err(|_| bad(key, format!("expected a non-negative integer, got {:?}", value)))
}

fn bad(key: &str, message: impl Into<String>) -> QuarryError {
    QuarryError::invalid(key, ValidationKind::Schema, message)
}

/// Identity value or filter naming the target of get/update/delete
#[derive(Debug, Clone, PartialEq)]
pub enum Selector {
    Id(Value),
    Filter(Filter),
}

impl From<&str> for Selector {
    fn from(id: &str) -> Self {
        Self::Id(Value::String(id.to_string()))
    }
}

impl From<String> for Selector {
    fn from(id: String) -> Self {
        Self::Id(Value::String(id))
    }
}

impl From<&String> for Selector {
    fn from(id: &String) -> Self {
        Self::Id(Value::String(id.clone()))
    }
}

impl From<Value> for Selector {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => Self::Filter(Filter::from(map)),
            id => Self::Id(id),
        }
    }
}

impl From<&Value> for Selector {
    fn from(value: &Value) -> Self {
        Self::from(value.clone())
    }
}

impl From<Filter> for Selector {
    fn from(filter: Filter) -> Self {
        Self::Filter(filter)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(Value::String(id)) => f.write_str(id),
            Self::Id(id) => write!(f, "{}", id),
            Self::Filter(filter) => write!(f, "{}", filter.clone().into_value()),
        }
    }
}

/// Result page of a list
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListResult {
    pub data: Vec<Document>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
}
