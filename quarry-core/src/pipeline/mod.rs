//! Callback pipeline
//!
//! Every document operation is driven through a fixed sequence of stages. At
//! each stage the pipeline runs the callbacks registered for the operation's
//! action, strictly in order, each one observing the previous one's output.
//! The first error aborts the rest of the chain; side effects already
//! performed by earlier callbacks are not undone.

pub mod context;

pub use context::HookContext;

use crate::document::Document;
use crate::error::{Result, SpecError};
use crate::storage::ReadQuery;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Concrete operation being executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Create,
    Update,
    Delete,
    List,
    Get,
}

impl Action {
    pub fn is_write(self) -> bool {
        matches!(self, Self::Create | Self::Update | Self::Delete)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::List => "list",
            Self::Get => "get",
        };
        f.write_str(name)
    }
}

/// Callback list a handler registers into.
///
/// `Save` feeds both create and update, `Read` feeds both list and get.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionFamily {
    Save,
    Create,
    Update,
    Delete,
    Read,
    List,
    Get,
}

impl ActionFamily {
    /// Actions drawing from this family's list
    pub fn actions(self) -> &'static [Action] {
        match self {
            Self::Save => &[Action::Create, Action::Update],
            Self::Create => &[Action::Create],
            Self::Update => &[Action::Update],
            Self::Delete => &[Action::Delete],
            Self::Read => &[Action::List, Action::Get],
            Self::List => &[Action::List],
            Self::Get => &[Action::Get],
        }
    }

    /// Stages this family can run at
    pub fn stages(self) -> &'static [Stage] {
        match self {
            Self::Save | Self::Create | Self::Update => {
                &[Stage::BeforeValidation, Stage::AfterValidation, Stage::AfterSave]
            }
            Self::Delete | Self::Read | Self::List | Self::Get => &[Stage::Before, Stage::After],
        }
    }
}

impl fmt::Display for ActionFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Named point in an operation's lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Stage {
    BeforeValidation,
    AfterValidation,
    AfterSave,
    Before,
    After,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::BeforeValidation => "beforeValidation",
            Self::AfterValidation => "afterValidation",
            Self::AfterSave => "afterSave",
            Self::Before => "before",
            Self::After => "after",
        };
        f.write_str(name)
    }
}

/// Position of a callback relative to the others of the same stage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    First,
    #[default]
    Normal,
    Last,
}

/// A lifecycle hook.
///
/// The pipeline calls the method matching the stage the hook is registered
/// at: document stages (save stages and delete) call [`Callback::on_document`],
/// read `before` stages call [`Callback::on_query`], read `after` stages call
/// [`Callback::on_results`]. Returning `None` means "no change".
#[async_trait]
pub trait Callback: Send + Sync {
    async fn on_document(&self, doc: Document, ctx: &HookContext) -> Result<Option<Document>> {
        let _ = (doc, ctx);
        Ok(None)
    }

    async fn on_query(&self, query: ReadQuery, ctx: &HookContext) -> Result<Option<ReadQuery>> {
        let _ = (query, ctx);
        Ok(None)
    }

    async fn on_results(&self, docs: Vec<Document>, ctx: &HookContext) -> Result<Option<Vec<Document>>> {
        let _ = (docs, ctx);
        Ok(None)
    }
}

/// A callback bound to an action family, a stage and a priority
#[derive(Clone)]
pub struct RegisteredCallback {
    /// Feature contributing the callback, filled in at composition
    pub feature: String,
    pub name: String,
    pub family: ActionFamily,
    pub stage: Stage,
    pub priority: Priority,
    pub handler: Arc<dyn Callback>,
}

impl RegisteredCallback {
    pub fn new(
        name: impl Into<String>,
        family: ActionFamily,
        stage: Stage,
        handler: Arc<dyn Callback>,
    ) -> Self {
        Self {
            feature: String::new(),
            name: name.into(),
            family,
            stage,
            priority: Priority::Normal,
            handler,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Whether an options skip list excludes this callback (by feature or name)
    pub fn is_skipped(&self, skip: &[String]) -> bool {
        skip.iter().any(|s| *s == self.feature || *s == self.name)
    }
}

impl fmt::Debug for RegisteredCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredCallback")
            .field("feature", &self.feature)
            .field("name", &self.name)
            .field("family", &self.family)
            .field("stage", &self.stage)
            .field("priority", &self.priority)
            .finish()
    }
}

/// Ordered callback lists per (action, stage), resolved once at composition
#[derive(Debug, Clone, Default)]
pub struct CallbackTable {
    lists: HashMap<(Action, Stage), Vec<RegisteredCallback>>,
}

impl CallbackTable {
    /// Build the table from callbacks in registration order.
    ///
    /// Each list is stably sorted by priority, so registration order decides
    /// among callbacks sharing a priority.
    pub fn build(callbacks: Vec<RegisteredCallback>) -> std::result::Result<Self, SpecError> {
        let mut lists: HashMap<(Action, Stage), Vec<RegisteredCallback>> = HashMap::new();
        for callback in callbacks {
            if !callback.family.stages().contains(&callback.stage) {
                return Err(SpecError::InvalidStage {
                    callback: callback.name.clone(),
                    stage: callback.stage.to_string(),
                    family: callback.family.to_string(),
                });
            }
            for action in callback.family.actions() {
                lists.entry((*action, callback.stage)).or_default().push(callback.clone());
            }
        }
        for list in lists.values_mut() {
            list.sort_by_key(|c| c.priority);
        }
        Ok(Self { lists })
    }

    pub fn get(&self, action: Action, stage: Stage) -> &[RegisteredCallback] {
        self.lists.get(&(action, stage)).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Names of the callbacks run for (action, stage), in order
    pub fn names(&self, action: Action, stage: Stage) -> Vec<&str> {
        self.get(action, stage).iter().map(|c| c.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.lists.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Run the document callbacks of `(ctx.action, stage)` over `doc`
pub async fn invoke(doc: Document, stage: Stage, ctx: &HookContext) -> Result<Document> {
    let mut current = doc;
    for callback in active(ctx, stage) {
        log::debug!("{}.{} {} -> {}", ctx.spec.name, ctx.action, stage, callback.name);
        if let Some(next) = callback.handler.on_document(current.clone(), ctx).await? {
            current = next;
        }
    }
    Ok(current)
}

/// Run the read `before` callbacks, which may rewrite the query
pub async fn invoke_query(query: ReadQuery, ctx: &HookContext) -> Result<ReadQuery> {
    let mut current = query;
    for callback in active(ctx, Stage::Before) {
        log::debug!("{}.{} before -> {}", ctx.spec.name, ctx.action, callback.name);
        if let Some(next) = callback.handler.on_query(current.clone(), ctx).await? {
            current = next;
        }
    }
    Ok(current)
}

/// Run the read `after` callbacks, which may rewrite the result set
pub async fn invoke_results(docs: Vec<Document>, ctx: &HookContext) -> Result<Vec<Document>> {
    let mut current = docs;
    for callback in active(ctx, Stage::After) {
        log::debug!("{}.{} after -> {}", ctx.spec.name, ctx.action, callback.name);
        if let Some(next) = callback.handler.on_results(current.clone(), ctx).await? {
            current = next;
        }
    }
    Ok(current)
}

fn active<'a>(ctx: &'a HookContext, stage: Stage) -> impl Iterator<Item = &'a RegisteredCallback> {
    ctx.spec
        .callbacks
        .get(ctx.action, stage)
        .iter()
        .filter(move |c| !c.is_skipped(&ctx.options.skip))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    #[async_trait]
    impl Callback for Noop {}

    fn registered(name: &str, family: ActionFamily, stage: Stage, priority: Priority) -> RegisteredCallback {
        RegisteredCallback::new(name, family, stage, Arc::new(Noop)).with_priority(priority)
    }

    #[test]
    fn test_table_merges_save_and_action_lists() {
        let table = CallbackTable::build(vec![
            registered("save-a", ActionFamily::Save, Stage::AfterSave, Priority::Normal),
            registered("create-b", ActionFamily::Create, Stage::AfterSave, Priority::Normal),
            registered("update-c", ActionFamily::Update, Stage::AfterSave, Priority::Normal),
        ])
        .unwrap();

        assert_eq!(table.names(Action::Create, Stage::AfterSave), vec!["save-a", "create-b"]);
        assert_eq!(table.names(Action::Update, Stage::AfterSave), vec!["save-a", "update-c"]);
        assert!(table.get(Action::Delete, Stage::After).is_empty());
    }

    #[test]
    fn test_priority_sort_is_stable() {
        let table = CallbackTable::build(vec![
            registered("n1", ActionFamily::Save, Stage::BeforeValidation, Priority::Normal),
            registered("last", ActionFamily::Save, Stage::BeforeValidation, Priority::Last),
            registered("n2", ActionFamily::Save, Stage::BeforeValidation, Priority::Normal),
            registered("first", ActionFamily::Save, Stage::BeforeValidation, Priority::First),
        ])
        .unwrap();

        assert_eq!(
            table.names(Action::Update, Stage::BeforeValidation),
            vec!["first", "n1", "n2", "last"]
        );
    }

    #[test]
    fn test_rejects_stage_outside_family() {
        let err = CallbackTable::build(vec![registered(
            "bad",
            ActionFamily::Delete,
            Stage::AfterSave,
            Priority::Normal,
        )])
        .unwrap_err();
        assert!(matches!(err, SpecError::InvalidStage { .. }));
    }

    #[test]
    fn test_read_family_feeds_list_and_get() {
        let table = CallbackTable::build(vec![registered("r", ActionFamily::Read, Stage::After, Priority::Normal)])
            .unwrap();
        assert_eq!(table.names(Action::List, Stage::After), vec!["r"]);
        assert_eq!(table.names(Action::Get, Stage::After), vec!["r"]);
    }
}
