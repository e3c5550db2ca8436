//! Convenient imports
//!
//! ```rust,ignore
//! use quarry_core::prelude::*;
//! ```

pub use crate::config::QuarryConfig;
pub use crate::doc;
pub use crate::document::Document;
pub use crate::error::{QuarryError, Result, ValidationKind};
pub use crate::features::changelog::ChangelogSink;
pub use crate::features::published::{PublishEvent, PublishNotifier, PublishState};
pub use crate::features::search::SearchIndexer;
pub use crate::pipeline::{Action, ActionFamily, Callback, HookContext, Priority, RegisteredCallback, Stage};
pub use crate::registry::{ModelRegistry, ModelResolver};
pub use crate::schema::{Feature, ModelDefinition, ModelSpec};
pub use crate::storage::{Filter, IndexSpec, MemoryStorage, SortKey, Storage};
pub use crate::store::{DocumentStore, ListResult, QueryParams, Selector, StoreOptions};
