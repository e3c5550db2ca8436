//! Read-side expansion
//!
//! Each level batch-fetches the referenced documents of every selected
//! relationship with one `identity $in [...]` list per relationship, then
//! splices them into the results under the relationship's logical name.
//! Deeper levels are expanded by the target model's own pipeline, with the
//! remaining selector passed down in the query parameters.

use super::RelationshipSelector;
use crate::document::{identity_key, Document};
use crate::error::Result;
use crate::pipeline::{Callback, HookContext};
use crate::schema::{references, ModelSpec, Relationship};
use crate::storage::Filter;
use crate::store::{QueryParams, StoreOptions};
use async_trait::async_trait;
use futures::future::try_join_all;
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// A relationship to expand at the current level
#[derive(Debug)]
struct Step<'a> {
    property: &'a str,
    relationship: &'a Relationship,
    /// Selector handed to the target model's read
    child: Option<RelationshipSelector>,
}

fn lookup<'a>(spec: &'a ModelSpec, name: &str) -> Option<(&'a str, &'a Relationship)> {
    spec.relationships()
        .find(|(property, _, rel)| *property == name || rel.logical_name(property) == name)
        .map(|(property, _, rel)| (property, rel))
}

fn plan<'a>(
    spec: &'a ModelSpec,
    selector: &RelationshipSelector,
    arrived_via: Option<&str>,
    max_depth: usize,
) -> Vec<Step<'a>> {
    match selector {
        RelationshipSelector::Depth(depth) => {
            let depth = (*depth).min(max_depth);
            if depth == 0 {
                return Vec::new();
            }
            spec.relationships()
                .filter(|(property, _, _)| Some(*property) != arrived_via)
                .map(|(property, _, relationship)| Step {
                    property,
                    relationship,
                    child: (depth > 1).then(|| RelationshipSelector::Depth(depth - 1)),
                })
                .collect()
        }
        RelationshipSelector::Paths(paths) => {
            let mut grouped: Vec<(&str, Vec<String>)> = Vec::new();
            for path in paths {
                let (head, rest) = match path.split_once('.') {
                    Some((head, rest)) => (head, Some(rest)),
                    None => (path.as_str(), None),
                };
                let slot = match grouped.iter().position(|(h, _)| *h == head) {
                    Some(i) => i,
                    None => {
                        grouped.push((head, Vec::new()));
                        grouped.len() - 1
                    }
                };
                if let Some(rest) = rest {
                    grouped[slot].1.push(rest.to_string());
                }
            }

            grouped
                .into_iter()
                .filter_map(|(head, rests)| {
                    let Some((property, relationship)) = lookup(spec, head) else {
                        log::debug!("{}: no relationship named {}", spec.name, head);
                        return None;
                    };
                    let child = (!rests.is_empty()).then_some(RelationshipSelector::Paths(rests));
                    Some(Step { property, relationship, child })
                })
                .collect()
        }
        RelationshipSelector::Graph(graph) => graph
            .relations
            .iter()
            .filter_map(|(name, nested)| {
                let (property, relationship) = lookup(spec, name)?;
                let child = (!nested.is_empty()).then(|| RelationshipSelector::Graph(nested.clone()));
                Some(Step { property, relationship, child })
            })
            .collect(),
    }
}

async fn fetch(ctx: &HookContext, docs: &[Document], step: &Step<'_>) -> Result<HashMap<String, Document>> {
    let mut seen = HashSet::new();
    let ids: Vec<Value> = docs
        .iter()
        .flat_map(|doc| references(doc.get(step.property)))
        .filter(|r| seen.insert(r.key()))
        .map(|r| r.id)
        .collect();
    if ids.is_empty() {
        return Ok(HashMap::new());
    }

    let target = ctx.api_for(&step.relationship.to_type)?;
    let identity = target.spec().identity.clone();
    let mut found = HashMap::with_capacity(ids.len());
    for chunk in ids.chunks(ctx.config().store.max_limit.max(1)) {
        let params = QueryParams {
            published: ctx.params().published,
            lang: ctx.params().lang.clone(),
            relationships: step.child.clone(),
            limit: Some(chunk.len()),
            ..QueryParams::default()
        };
        let options = StoreOptions {
            actor: ctx.options.actor.clone(),
            params,
            arrived_via: step.relationship.to_field.clone(),
            ..StoreOptions::default()
        };
        let page = target.list(Filter::new().is_in(identity.clone(), chunk.to_vec()), options).await?;
        for doc in page.data {
            if let Some(id) = target.spec().identity_of(&doc) {
                found.insert(identity_key(id), doc);
            }
        }
    }

    log::debug!("{}: expanded {} {} of {}", ctx.spec.name, found.len(), step.relationship.to_type, ids.len());
    Ok(found)
}

/// Replace the references of `step` in `doc` with the fetched documents
fn splice(doc: &mut Document, step: &Step<'_>, found: &HashMap<String, Document>) {
    let name = step.relationship.logical_name(step.property).to_string();
    let value = doc.get(step.property);
    let many = step.relationship.cardinality.is_to_many() || matches!(value, Some(Value::Array(_)));
    let refs = references(value);

    if many {
        let expanded = refs.iter().filter_map(|r| found.get(&r.key())).map(Document::to_value).collect();
        doc.set(name, Value::Array(expanded));
    } else {
        match refs.first().and_then(|r| found.get(&r.key())) {
            Some(related) => {
                doc.set(name, related.to_value());
            }
            None => {
                doc.remove(&name);
            }
        }
    }
}

pub(super) struct Expand;

#[async_trait]
impl Callback for Expand {
    async fn on_results(&self, docs: Vec<Document>, ctx: &HookContext) -> Result<Option<Vec<Document>>> {
        let Some(selector) = ctx.params().relationships.as_ref() else {
            return Ok(None);
        };
        if docs.is_empty() {
            return Ok(None);
        }

        let steps = plan(&ctx.spec, selector, ctx.options.arrived_via.as_deref(), ctx.config().relationships.max_depth);
        let fetched = try_join_all(steps.iter().map(|step| fetch(ctx, &docs, step))).await?;

        let mut docs = docs;
        for doc in &mut docs {
            for (step, found) in steps.iter().zip(&fetched) {
                splice(doc, step, found);
            }
        }

        if let RelationshipSelector::Graph(graph) = selector {
            if !graph.fields.is_empty() {
                let expanded: Vec<&str> = steps.iter().map(|s| s.relationship.logical_name(s.property)).collect();
                for doc in &mut docs {
                    doc.retain(|key, _| {
                        key == ctx.spec.identity || graph.fields.iter().any(|f| f == key) || expanded.contains(&key)
                    });
                }
            }
        }
        Ok(Some(docs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{compose, ModelDefinition};
    use serde_json::json;

    fn articles() -> ModelSpec {
        let def = ModelDefinition::new(
            "articles",
            json!({ "properties": {
                "title": { "type": "string" },
                "author": { "type": "string", "x-meta": { "relationship":
                    { "toType": "authors", "toField": "articles", "type": "many-to-one" } } },
                "categories": { "type": "array", "items": { "type": "string" }, "x-meta": { "relationship":
                    { "toType": "categories", "toField": "articles", "type": "many-to-many", "name": "tags" } } }
            } }),
        );
        compose(&def, &[], "_id").unwrap()
    }

    #[test]
    fn test_depth_plan_skips_arrival() {
        let spec = articles();
        let steps = plan(&spec, &RelationshipSelector::Depth(2), Some("author"), 5);
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].property, "categories");
        assert_eq!(steps[0].child, Some(RelationshipSelector::Depth(1)));

        let clamped = plan(&spec, &RelationshipSelector::Depth(9), None, 1);
        assert!(clamped.iter().all(|s| s.child.is_none()));
    }

    #[test]
    fn test_path_plan_groups_by_head() {
        let spec = articles();
        let selector = RelationshipSelector::Paths(vec!["tags.parent".into(), "tags.owner".into(), "ghost".into()]);
        let steps = plan(&spec, &selector, None, 5);
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].property, "categories");
        assert_eq!(
            steps[0].child,
            Some(RelationshipSelector::Paths(vec!["parent".to_string(), "owner".to_string()]))
        );
    }

    #[test]
    fn test_splice_keeps_order_and_drops_missing() {
        let spec = articles();
        let steps = plan(&spec, &RelationshipSelector::Depth(1), None, 5);
        let mut found = HashMap::new();
        found.insert("c2".to_string(), crate::doc!({ "_id": "c2", "name": "Two" }));
        found.insert("c1".to_string(), crate::doc!({ "_id": "c1", "name": "One" }));

        let mut doc = crate::doc!({ "title": "x", "author": "gone", "categories": ["c1", "missing", "c2"] });
        for step in &steps {
            let empty = HashMap::new();
            splice(&mut doc, step, if step.property == "categories" { &found } else { &empty });
        }

        assert!(!doc.contains("author"));
        assert_eq!(doc.get("tags"), Some(&json!([{ "_id": "c1", "name": "One" }, { "_id": "c2", "name": "Two" }])));
    }
}
