//! Configuration files and their effect on the engine

mod helpers;

use helpers::{editor, id_of, params, Fixture};
use quarry_core::prelude::*;
use quarry_core::storage::FindOptions;
use serde_json::json;
use std::io::Write;
use std::sync::Arc;
use tempfile::NamedTempFile;

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn test_load_from_file_overrides_defaults() {
    let file = write_config(
        r#"
[store]
default_limit = 20
max_limit = 50

[relationships]
max_depth = 1

[changelog]
enabled = false
"#,
    );

    let config = QuarryConfig::load_from(file.path()).unwrap();
    assert_eq!(config.store.default_limit, 20);
    assert_eq!(config.store.max_limit, 50);
    assert_eq!(config.relationships.max_depth, 1);
    assert!(!config.changelog.enabled);
    assert_eq!(config.models.identity_field, "_id");
    config.validate().unwrap();
}

#[test]
fn test_missing_file_falls_back_to_defaults() {
    let config = QuarryConfig::load_from("/nonexistent/quarry.toml").unwrap();
    assert_eq!(config.store.max_limit, 1000);
    assert_eq!(config.models.default_features, vec!["audit", "changelog"]);
}

#[test]
fn test_malformed_file_is_an_error() {
    let file = write_config("[store\nmax_limit = ");
    let err = QuarryConfig::from_file(file.path()).unwrap_err();
    assert!(err.to_string().contains("Failed to parse TOML config"));
}

#[test]
fn test_env_overrides_file() {
    let file = write_config("[versioning]\ncollection_suffix = \"_history\"\n");
    std::env::set_var("QUARRY_VERSIONS_SUFFIX", "_snapshots");
    let config = QuarryConfig::load_from(file.path()).unwrap();
    std::env::remove_var("QUARRY_VERSIONS_SUFFIX");

    assert_eq!(config.versioning.collection_for("pages"), "pages_snapshots");
}

#[test]
fn test_partial_section_keeps_sibling_defaults() {
    let file = write_config("[changelog]\ncollection = \"history\"\n");
    std::env::set_var("QUARRY_LOG_LEVEL", "debug");
    let config = QuarryConfig::load_from(file.path()).unwrap();
    std::env::remove_var("QUARRY_LOG_LEVEL");

    assert_eq!(config.changelog.collection, "history");
    assert!(config.changelog.enabled);
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.logging.format, "human");
}

#[test]
fn test_load_rejects_invalid_values() {
    let file = write_config("[store]\ndefault_limit = 5000\n");
    let err = QuarryConfig::load_from(file.path()).unwrap_err();
    assert!(err.to_string().contains("Invalid configuration"));
}

#[tokio::test]
async fn test_disabled_changelog_and_depth_clamp() {
    let mut config = QuarryConfig::default();
    config.changelog.enabled = false;
    config.relationships.max_depth = 1;

    let fixture = Fixture::with_config(config);
    fixture.define(helpers::authors());
    fixture.define(helpers::articles(false, "detach"));
    fixture.define(helpers::categories());

    let authors = fixture.api("authors");
    let articles = fixture.api("articles");
    let categories = fixture.api("categories");
    let ada = id_of(&authors.create(doc!({ "name": "Ada" }), editor()).await.unwrap());
    let rust = id_of(&categories.create(doc!({ "name": "Rust" }), editor()).await.unwrap());
    articles.create(doc!({ "title": "Engines", "author": ada, "categories": [rust] }), editor()).await.unwrap();

    let listed = authors.list(Filter::new(), params(&[("relationships", "3")])).await.unwrap();
    let author = listed.data[0].to_value();
    assert_eq!(author["articles"][0]["title"], "Engines");
    assert!(author["articles"][0]["categories"][0].is_string());

    let entries = fixture.storage.find("changelog", &Filter::new(), &FindOptions::default()).await.unwrap();
    assert!(entries.is_empty());
}

#[tokio::test]
async fn test_custom_identity_field_end_to_end() {
    let mut config = QuarryConfig::default();
    config.models.identity_field = "key".to_string();
    config.validate().unwrap();

    let mismatched = ModelRegistry::new(config.clone());
    assert!(mismatched.add_tenant("acme", Arc::new(MemoryStorage::new())).is_err());

    let fixture = Fixture::with_config(config);
    fixture.define(ModelDefinition::new("notes", json!({ "properties": { "title": { "type": "string" } } })));
    let notes = fixture.api("notes");

    let created = notes.create(doc!({ "title": "One" }), editor()).await.unwrap();
    let key = created.get("key").cloned().unwrap();
    assert!(!created.contains("_id"));

    let updated = notes.update(key.clone(), doc!({ "title": "Two" }), editor()).await.unwrap();
    assert_eq!(updated.get("title"), Some(&json!("Two")));
    let fetched = notes.get(key.clone(), StoreOptions::new()).await.unwrap();
    assert_eq!(fetched.get("title"), Some(&json!("Two")));

    notes.delete(key.clone(), editor()).await.unwrap();
    assert!(notes.get(key, StoreOptions::new()).await.unwrap_err().is_missing());
}

#[test]
fn test_validation_rejects_inconsistent_limits() {
    let mut config = QuarryConfig::default();
    config.store.default_limit = 5000;
    assert!(config.validate().is_err());

    let mut config = QuarryConfig::default();
    config.logging.format = "xml".to_string();
    assert!(config.validate().is_err());
}
