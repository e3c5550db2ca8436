//! Property-driven features, custom callbacks and collaborator hooks

mod helpers;

use async_trait::async_trait;
use helpers::{editor, id_of, params, Fixture, TENANT};
use quarry_core::error::SpecError;
use quarry_core::features::changelog::{self, ChangelogEntry};
use quarry_core::features::search::{self, SearchIndexer};
use quarry_core::prelude::*;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

#[tokio::test]
async fn test_slugs_are_derived_and_deduplicated() {
    let fixture = Fixture::new();
    fixture.define(ModelDefinition::new(
        "posts",
        json!({ "properties": {
            "title": { "type": "string" },
            "slug": { "type": "string", "x-meta": { "slug": { "from": "title" }, "index": true } }
        } }),
    ));
    let posts = fixture.api("posts");

    let first = posts.create(doc!({ "title": "Hello, World!" }), editor()).await.unwrap();
    let second = posts.create(doc!({ "title": "hello world" }), editor()).await.unwrap();
    let third = posts.create(doc!({ "title": "Hello World" }), editor()).await.unwrap();
    let custom = posts.create(doc!({ "title": "Hello", "slug": "mine" }), editor()).await.unwrap();

    assert_eq!(first.get("slug"), Some(&json!("hello-world")));
    assert_eq!(second.get("slug"), Some(&json!("hello-world-2")));
    assert_eq!(third.get("slug"), Some(&json!("hello-world-3")));
    assert_eq!(custom.get("slug"), Some(&json!("mine")));
}

#[tokio::test]
async fn test_sequence_numbers_on_create() {
    let fixture = Fixture::new();
    fixture.define(ModelDefinition::new(
        "tickets",
        json!({ "properties": {
            "subject": { "type": "string" },
            "number": { "type": "integer", "x-meta": { "sequence": true, "unique": true } }
        } }),
    ));
    let tickets = fixture.api("tickets");

    let a = tickets.create(doc!({ "subject": "a" }), editor()).await.unwrap();
    let b = tickets.create(doc!({ "subject": "b" }), editor()).await.unwrap();
    assert_eq!(a.get("number"), Some(&json!(1)));
    assert_eq!(b.get("number"), Some(&json!(2)));

    let updated = tickets.update(id_of(&a), doc!({ "subject": "a2" }), editor()).await.unwrap();
    assert_eq!(updated.get("number"), Some(&json!(1)));
}

#[tokio::test]
async fn test_translations_filed_and_resolved_by_language() {
    let fixture = Fixture::new();
    fixture.define(ModelDefinition::new(
        "products",
        json!({ "properties": {
            "sku": { "type": "string" },
            "label": { "type": "string", "x-meta": { "translated": true } }
        } }),
    ));
    let products = fixture.api("products");

    let created = products
        .create(doc!({ "sku": "p1", "label": { "en": "Chair", "fr": "Chaise" } }), editor())
        .await
        .unwrap();
    let id = id_of(&created);

    let french = products.get(id.clone(), params(&[("lang", "fr")])).await.unwrap();
    assert_eq!(french.get("label"), Some(&json!("Chaise")));
    let german = products.get(id.clone(), params(&[("lang", "de")])).await.unwrap();
    assert_eq!(german.get("label"), Some(&json!("Chair")));

    let options = params(&[("lang", "de")]).as_actor("editor");
    products.update(id.clone(), doc!({ "label": "Stuhl" }), options).await.unwrap();
    let raw = products.get(id, StoreOptions::new()).await.unwrap();
    assert_eq!(raw.get("label"), Some(&json!({ "en": "Chair", "fr": "Chaise", "de": "Stuhl" })));

    let err = products.create(doc!({ "sku": "p2", "label": { "en": 3 } }), editor()).await.unwrap_err();
    assert!(err.validation_errors().unwrap().for_field("label.en").is_some());
}

#[derive(Default)]
struct MemoryIndex(Mutex<Vec<(String, String)>>);

#[async_trait]
impl SearchIndexer for MemoryIndex {
    async fn index(&self, model: &str, doc: &Document) -> quarry_core::Result<()> {
        self.0.lock().unwrap().push((format!("index {}", model), doc.get("title").cloned().unwrap_or_default().to_string()));
        Ok(())
    }

    async fn remove(&self, model: &str, id: &Value) -> quarry_core::Result<()> {
        self.0.lock().unwrap().push((format!("remove {}", model), id.to_string()));
        Ok(())
    }
}

#[tokio::test]
async fn test_search_indexer_follows_saves_and_deletes() {
    let fixture = Fixture::new();
    let index = Arc::new(MemoryIndex::default());
    fixture.registry.register_feature(search::feature(index.clone()));
    fixture.define(
        ModelDefinition::new("notes", json!({ "properties": { "title": { "type": "string" } } })).with_features(["search"]),
    );
    let notes = fixture.api("notes");

    let created = notes.create(doc!({ "title": "Indexed" }), editor()).await.unwrap();
    notes.delete(id_of(&created), editor()).await.unwrap();

    let calls = index.0.lock().unwrap().clone();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0], ("index notes".to_string(), "\"Indexed\"".to_string()));
    assert_eq!(calls[1], ("remove notes".to_string(), id_of(&created).to_string()));
}

#[derive(Default)]
struct AuditTrail(Mutex<Vec<ChangelogEntry>>);

#[async_trait]
impl ChangelogSink for AuditTrail {
    async fn record(&self, entry: &ChangelogEntry) -> quarry_core::Result<()> {
        self.0.lock().unwrap().push(entry.clone());
        Ok(())
    }
}

#[tokio::test]
async fn test_changelog_sink_receives_entries_with_documents() {
    let fixture = Fixture::new();
    let trail = Arc::new(AuditTrail::default());
    fixture.registry.register_feature(changelog::feature(Some(trail.clone())));
    fixture.define(ModelDefinition::new("notes", json!({ "properties": { "title": { "type": "string" } } })));
    let notes = fixture.api("notes");

    let created = notes.create(doc!({ "title": "Kept" }), editor()).await.unwrap();
    notes.delete(id_of(&created), editor()).await.unwrap();

    let entries = trail.0.lock().unwrap().clone();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].action, Action::Create);
    assert_eq!(entries[0].doc.get("title"), Some(&json!("Kept")));
    assert_eq!(entries[1].action, Action::Delete);
    assert_eq!(entries[1].doc_id, id_of(&created));
    assert_eq!(entries[1].created_by.as_deref(), Some("editor"));
}

struct Uppercase;

#[async_trait]
impl Callback for Uppercase {
    async fn on_document(&self, mut doc: Document, _ctx: &HookContext) -> quarry_core::Result<Option<Document>> {
        let Some(title) = doc.get("title").and_then(Value::as_str).map(str::to_uppercase) else {
            return Ok(None);
        };
        doc.set("title", title);
        Ok(Some(doc))
    }
}

struct Guard;

#[async_trait]
impl Callback for Guard {
    async fn on_document(&self, _doc: Document, ctx: &HookContext) -> quarry_core::Result<Option<Document>> {
        match ctx.actor() {
            Some("admin") => Ok(None),
            _ => Err(QuarryError::Access("only admins may delete".to_string())),
        }
    }
}

#[tokio::test]
async fn test_model_callbacks_run_and_can_be_skipped() {
    let fixture = Fixture::new();
    fixture.define(
        ModelDefinition::new("notes", json!({ "properties": { "title": { "type": "string" } } }))
            .with_callback(RegisteredCallback::new(
                "uppercaseTitle",
                ActionFamily::Save,
                Stage::BeforeValidation,
                Arc::new(Uppercase),
            ))
            .with_callback(
                RegisteredCallback::new("guardDelete", ActionFamily::Delete, Stage::Before, Arc::new(Guard))
                    .with_priority(Priority::First),
            ),
    );
    let notes = fixture.api("notes");

    let shouted = notes.create(doc!({ "title": "quiet" }), editor()).await.unwrap();
    assert_eq!(shouted.get("title"), Some(&json!("QUIET")));

    let kept = notes.create(doc!({ "title": "quiet" }), editor().skipping("uppercaseTitle")).await.unwrap();
    assert_eq!(kept.get("title"), Some(&json!("quiet")));

    let err = notes.delete(id_of(&kept), editor()).await.unwrap_err();
    assert_eq!(err.status(), 401);
    notes.delete(id_of(&kept), StoreOptions::new().as_actor("admin")).await.unwrap();
}

#[test]
fn test_conflicting_feature_fragment_is_rejected() {
    let fixture = Fixture::new();
    fixture.registry.register_feature(
        Feature::new("ranking").with_schema(json!({ "properties": { "rank": { "type": "integer" } } })),
    );

    let err = fixture
        .registry
        .define_model(
            TENANT,
            ModelDefinition::new("items", json!({ "properties": { "rank": { "type": "string" } } }))
                .with_features(["ranking"]),
        )
        .unwrap_err();
    assert!(matches!(err, QuarryError::Spec(SpecError::SchemaConflict { ref path }) if path.contains("rank")));
}
