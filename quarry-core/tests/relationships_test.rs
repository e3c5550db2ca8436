//! Two-way relationships: reciprocity, cascade policy and expansion

mod helpers;

use helpers::{editor, id_of, params, Fixture};
use quarry_core::error::ValidationKind;
use quarry_core::prelude::*;
use serde_json::{json, Value};

async fn create(store: &DocumentStore, doc: Document) -> Value {
    id_of(&store.create(doc, editor()).await.unwrap())
}

async fn field(store: &DocumentStore, id: &Value, name: &str) -> Option<Value> {
    store.get(id.clone(), StoreOptions::new()).await.unwrap().get(name).cloned()
}

#[tokio::test]
async fn test_reassigning_author_moves_the_reciprocal() {
    let fixture = Fixture::blog(false, "detach");
    let authors = fixture.api("authors");
    let articles = fixture.api("articles");

    let ada = create(&authors, doc!({ "name": "Ada" })).await;
    let grace = create(&authors, doc!({ "name": "Grace" })).await;
    let article = create(&articles, doc!({ "title": "Engines", "author": ada.clone() })).await;
    assert_eq!(field(&authors, &ada, "articles").await, Some(json!([article.clone()])));

    articles.update(article.clone(), doc!({ "author": grace.clone() }), editor()).await.unwrap();
    assert_eq!(field(&authors, &ada, "articles").await, Some(json!([])));
    assert_eq!(field(&authors, &grace, "articles").await, Some(json!([article.clone()])));

    articles.update(article.clone(), doc!({ "author": null }), editor()).await.unwrap();
    assert_eq!(field(&authors, &grace, "articles").await, Some(json!([])));
}

#[tokio::test]
async fn test_to_many_side_sets_singular_reciprocal() {
    let fixture = Fixture::blog(false, "detach");
    let authors = fixture.api("authors");
    let articles = fixture.api("articles");

    let ada = create(&authors, doc!({ "name": "Ada" })).await;
    let grace = create(&authors, doc!({ "name": "Grace" })).await;
    let article = create(&articles, doc!({ "title": "Engines" })).await;

    authors.update(ada.clone(), doc!({ "articles": [article.clone()] }), editor()).await.unwrap();
    assert_eq!(field(&articles, &article, "author").await, Some(ada.clone()));

    // taking the article over releases it from its previous author
    authors.update(grace.clone(), doc!({ "articles": [article.clone()] }), editor()).await.unwrap();
    assert_eq!(field(&articles, &article, "author").await, Some(grace.clone()));
    assert_eq!(field(&authors, &ada, "articles").await, Some(json!([])));
}

#[tokio::test]
async fn test_many_to_many_mirrors_both_ways() {
    let fixture = Fixture::blog(false, "detach");
    let articles = fixture.api("articles");
    let categories = fixture.api("categories");

    let rust = create(&categories, doc!({ "name": "Rust" })).await;
    let db = create(&categories, doc!({ "name": "Databases" })).await;
    let first = create(&articles, doc!({ "title": "One", "categories": [rust.clone(), db.clone()] })).await;
    let second = create(&articles, doc!({ "title": "Two", "categories": [rust.clone()] })).await;

    assert_eq!(field(&categories, &rust, "articles").await, Some(json!([first.clone(), second.clone()])));
    assert_eq!(field(&categories, &db, "articles").await, Some(json!([first.clone()])));

    articles.update(first.clone(), doc!({ "categories": [db.clone()] }), editor()).await.unwrap();
    assert_eq!(field(&categories, &rust, "articles").await, Some(json!([second.clone()])));

    articles.delete(second, editor()).await.unwrap();
    assert_eq!(field(&categories, &rust, "articles").await, Some(json!([])));
}

#[tokio::test]
async fn test_missing_references_fail_validation() {
    let fixture = Fixture::blog(false, "detach");
    let articles = fixture.api("articles");

    let err = articles
        .create(doc!({ "title": "Orphan", "author": "nobody" }), editor())
        .await
        .unwrap_err();
    assert_eq!(err.status(), 422);
    let error = err.validation_errors().unwrap().for_field("author").unwrap();
    assert_eq!(error.kind, ValidationKind::Relationship);
    assert!(error.message.contains("nobody"));
    assert_eq!(fixture.storage.len("articles"), 0);
}

#[tokio::test]
async fn test_required_dependent_blocks_delete() {
    let fixture = Fixture::blog(true, "detach");
    let authors = fixture.api("authors");
    let articles = fixture.api("articles");

    let ada = create(&authors, doc!({ "name": "Ada" })).await;
    let article = create(&articles, doc!({ "title": "Engines", "author": ada.clone() })).await;

    let err = authors.delete(ada.clone(), editor()).await.unwrap_err();
    assert_eq!(err.status(), 422);
    let errors = err.validation_errors().unwrap();
    assert!(errors.has_kind(ValidationKind::Cascade));
    assert!(errors.for_field("articles").is_some());

    // removing the article from its author is vetoed the same way
    let err = authors.update(ada.clone(), doc!({ "articles": [] }), editor()).await.unwrap_err();
    assert!(err.validation_errors().unwrap().has_kind(ValidationKind::Cascade));

    assert!(authors.get(ada, StoreOptions::new()).await.is_ok());
    assert!(articles.get(article, StoreOptions::new()).await.is_ok());
}

#[tokio::test]
async fn test_cascade_deletes_dependents() {
    let fixture = Fixture::blog(true, "cascade");
    let authors = fixture.api("authors");
    let articles = fixture.api("articles");
    let categories = fixture.api("categories");

    let ada = create(&authors, doc!({ "name": "Ada" })).await;
    let rust = create(&categories, doc!({ "name": "Rust" })).await;
    create(&articles, doc!({ "title": "One", "author": ada.clone(), "categories": [rust.clone()] })).await;
    create(&articles, doc!({ "title": "Two", "author": ada.clone() })).await;

    authors.delete(ada, editor()).await.unwrap();

    assert_eq!(articles.count(Filter::new()).await.unwrap(), 0);
    assert_eq!(field(&categories, &rust, "articles").await, Some(json!([])));
}

#[tokio::test]
async fn test_depth_expansion_does_not_walk_back() {
    let fixture = Fixture::blog(false, "detach");
    let authors = fixture.api("authors");
    let articles = fixture.api("articles");
    let categories = fixture.api("categories");

    let ada = create(&authors, doc!({ "name": "Ada" })).await;
    let rust = create(&categories, doc!({ "name": "Rust" })).await;
    let db = create(&categories, doc!({ "name": "Databases" })).await;
    create(&articles, doc!({ "title": "Engines", "author": ada.clone(), "categories": [db, rust] })).await;

    let listed = authors.list(Filter::new(), params(&[("relationships", "2")])).await.unwrap();
    let author = listed.data[0].to_value();
    let article = &author["articles"][0];

    assert_eq!(article["title"], json!("Engines"));
    assert_eq!(article["categories"][0]["name"], json!("Databases"));
    assert_eq!(article["categories"][1]["name"], json!("Rust"));
    // the back-reference stays a plain id
    assert_eq!(article["author"], ada);
    // depth 2 stops before the categories' own articles
    assert!(article["categories"][0]["articles"][0].is_string());
}

#[tokio::test]
async fn test_path_and_graph_expansion() {
    let fixture = Fixture::blog(false, "detach");
    let authors = fixture.api("authors");
    let articles = fixture.api("articles");
    let categories = fixture.api("categories");

    let ada = create(&authors, doc!({ "name": "Ada", "email": "ada@example.com" })).await;
    let rust = create(&categories, doc!({ "name": "Rust" })).await;
    let article = create(&articles, doc!({ "title": "Engines", "body": "...", "author": ada, "categories": [rust] })).await;

    let by_path = articles.get(article.clone(), params(&[("relationships", "author")])).await.unwrap();
    assert_eq!(by_path.get("author").unwrap()["name"], json!("Ada"));
    assert!(by_path.get("categories").unwrap()[0].is_string());

    let graph = articles
        .get(article.clone(), params(&[("relationships", "{ title author { name } }")]))
        .await
        .unwrap();
    assert_eq!(
        graph.to_value(),
        json!({ "_id": article, "title": "Engines", "author": { "_id": graph.get("author").unwrap()["_id"], "name": "Ada" } })
    );
}
