//! Versioning and publishing through the store

mod helpers;

use async_trait::async_trait;
use helpers::{editor, id_of, params, Fixture};
use quarry_core::features::published::{self, PublishEvent, PublishNotifier, PublishState};
use quarry_core::prelude::*;
use quarry_core::storage::FindOptions;
use serde_json::json;
use std::sync::{Arc, Mutex};

fn pages() -> ModelDefinition {
    ModelDefinition::new(
        "pages",
        json!({
            "properties": {
                "title": { "type": "string" },
                "views": { "type": "integer", "x-meta": { "versioned": false } }
            },
            "required": ["title"]
        }),
    )
    .with_features(["published"])
}

fn fixture() -> Fixture {
    let fixture = Fixture::new();
    fixture.define(pages());
    fixture
}

async fn snapshots(fixture: &Fixture) -> Vec<Document> {
    fixture.storage.find("pages_versions", &Filter::new(), &FindOptions::default()).await.unwrap()
}

#[tokio::test]
async fn test_draft_edits_stay_on_version_one() {
    let fixture = fixture();
    let pages = fixture.api("pages");

    let draft = pages.create(doc!({ "title": "A" }), editor()).await.unwrap();
    assert_eq!(draft.get("version"), Some(&json!(1)));
    assert_eq!(PublishState::of(&draft), PublishState::Draft);
    assert!(!draft.contains("versionToken"));

    let edited = pages.update(id_of(&draft), doc!({ "title": "A2" }), editor()).await.unwrap();
    assert_eq!(edited.get("version"), Some(&json!(1)));
    assert!(snapshots(&fixture).await.is_empty());
}

#[tokio::test]
async fn test_publish_edit_and_republish() {
    let fixture = fixture();
    let pages = fixture.api("pages");
    let id = id_of(&pages.create(doc!({ "title": "A" }), editor()).await.unwrap());

    let published = pages.update(id.clone(), doc!({ "publishedVersion": 1 }), editor()).await.unwrap();
    assert_eq!(PublishState::of(&published), PublishState::Published);
    assert!(published.get("versionToken").is_some());
    assert!(published.get("firstPublishedAt").is_some());
    assert_eq!(snapshots(&fixture).await.len(), 1);

    // editing published content cuts version 2 as a draft on top
    let edited = pages.update(id.clone(), doc!({ "title": "B" }), editor()).await.unwrap();
    assert_eq!(edited.get("version"), Some(&json!(2)));
    assert_eq!(edited.get("publishedVersion"), Some(&json!(1)));
    assert_ne!(edited.get("versionToken"), published.get("versionToken"));
    assert_eq!(PublishState::of(&edited), PublishState::PublishedStale);

    let live = pages.get(id.clone(), params(&[("published", "true")])).await.unwrap();
    assert_eq!(live.get("title"), Some(&json!("A")));
    let latest = pages.get(id.clone(), StoreOptions::new()).await.unwrap();
    assert_eq!(latest.get("title"), Some(&json!("B")));

    // a second edit rewrites the version 2 draft in place
    let again = pages.update(id.clone(), doc!({ "title": "B2" }), editor()).await.unwrap();
    assert_eq!(again.get("version"), Some(&json!(2)));
    assert_eq!(again.get("versionToken"), edited.get("versionToken"));
    assert_eq!(snapshots(&fixture).await.len(), 2);

    let republished = pages.update(id.clone(), doc!({ "publishedVersion": 2 }), editor()).await.unwrap();
    assert_eq!(PublishState::of(&republished), PublishState::Published);
    assert_eq!(republished.get("firstPublishedAt"), published.get("firstPublishedAt"));

    let live = pages.get(id.clone(), params(&[("published", "true")])).await.unwrap();
    assert_eq!(live.get("title"), Some(&json!("B2")));

    let history = pages.get(id, params(&[("versions", "true")])).await.unwrap();
    let versions: Vec<_> = history.get("versions").and_then(|v| v.as_array()).unwrap().iter().map(|v| v["version"].clone()).collect();
    assert_eq!(versions, vec![json!(2), json!(1)]);
}

#[tokio::test]
async fn test_non_versioned_edits_never_cut_versions() {
    let fixture = fixture();
    let pages = fixture.api("pages");
    let id = id_of(&pages.create(doc!({ "title": "A", "publishedVersion": 1 }), editor()).await.unwrap());

    let counted = pages.update(id.clone(), doc!({ "views": 10 }), editor()).await.unwrap();
    assert_eq!(counted.get("version"), Some(&json!(1)));
    assert_eq!(PublishState::of(&counted), PublishState::Published);

    // non-versioned fields of a published read come from the live document
    let live = pages.get(id, params(&[("published", "true")])).await.unwrap();
    assert_eq!(live.get("views"), Some(&json!(10)));
    assert_eq!(live.get("title"), Some(&json!("A")));
}

#[tokio::test]
async fn test_published_list_skips_drafts_and_versions_only_grow() {
    let fixture = fixture();
    let pages = fixture.api("pages");
    let live = id_of(&pages.create(doc!({ "title": "Live", "publishedVersion": 1 }), editor()).await.unwrap());
    pages.create(doc!({ "title": "Draft" }), editor()).await.unwrap();

    let listed = pages.list(Filter::new(), params(&[("published", "true")])).await.unwrap();
    assert_eq!(listed.data.len(), 1);
    assert_eq!(listed.data[0].get("title"), Some(&json!("Live")));

    let mut last = 1;
    for (i, title) in ["v2", "v3", "v4"].iter().enumerate() {
        let edited = pages.update(live.clone(), doc!({ "title": title }), editor()).await.unwrap();
        let version = edited.get("version").and_then(|v| v.as_u64()).unwrap();
        assert!(version >= last);
        last = version;
        if i < 2 {
            pages.update(live.clone(), doc!({ "publishedVersion": version }), editor()).await.unwrap();
        }
    }
    assert_eq!(last, 4);

    let unpublished = pages.update(live.clone(), doc!({ "publishedVersion": null }), editor()).await.unwrap();
    assert_eq!(PublishState::of(&unpublished), PublishState::Draft);
    assert_eq!(unpublished.get("version"), Some(&json!(4)));

    pages.delete(live, editor()).await.unwrap();
    assert!(snapshots(&fixture).await.is_empty());
}

#[tokio::test]
async fn test_published_version_is_clamped() {
    let fixture = fixture();
    let pages = fixture.api("pages");
    let created = pages.create(doc!({ "title": "A", "publishedVersion": 7 }), editor()).await.unwrap();
    assert_eq!(created.get("publishedVersion"), Some(&json!(1)));
}

#[derive(Default)]
struct Recorder(Mutex<Vec<PublishEvent>>);

#[async_trait]
impl PublishNotifier for Recorder {
    async fn notify(&self, event: PublishEvent, _model: &str, _doc: &Document) -> quarry_core::Result<()> {
        self.0.lock().unwrap().push(event);
        Ok(())
    }
}

#[tokio::test]
async fn test_notifier_sees_publish_transitions() {
    let fixture = fixture();
    let recorder = Arc::new(Recorder::default());
    fixture.registry.register_feature(published::feature(Some(recorder.clone())));
    let pages = fixture.api("pages");

    let id = id_of(&pages.create(doc!({ "title": "A" }), editor()).await.unwrap());
    pages.update(id.clone(), doc!({ "publishedVersion": 1 }), editor()).await.unwrap();
    pages.update(id.clone(), doc!({ "title": "B" }), editor()).await.unwrap();
    pages.update(id.clone(), doc!({ "publishedVersion": 2 }), editor()).await.unwrap();
    pages.update(id.clone(), doc!({ "publishedVersion": null }), editor()).await.unwrap();
    pages.update(id, doc!({ "publishedVersion": 2 }), editor()).await.unwrap();

    let events = recorder.0.lock().unwrap().clone();
    assert_eq!(
        events,
        vec![PublishEvent::FirstPublish, PublishEvent::PublishChange, PublishEvent::Unpublish, PublishEvent::Republish]
    );
}
