//! Query behaviour against stored documents, plus freeze properties

use std::collections::HashSet;

use pocketdb::query::{field, Path, RegexFlags};
use pocketdb::{freeze, Database, DocId, Document, Query};
use proptest::prelude::*;
use serde_json::{json, Map, Value};

fn ids(docs: &[Document]) -> Vec<DocId> {
    docs.iter().map(Document::doc_id).collect()
}

fn people() -> Database {
    let db = Database::in_memory();
    db.default_table()
        .insert_multiple(vec![
            json!({"name": "Ada", "age": 36, "langs": ["en", "fr"], "address": {"city": "London"}}),
            json!({"name": "alan", "age": 41, "langs": ["en"], "address": {"city": "Wilmslow"}}),
            json!({"name": "Grace", "age": 85.0, "langs": [], "groups": [{"name": "navy"}]}),
        ])
        .unwrap();
    db
}

#[test]
fn test_nested_and_parsed_paths() {
    let db = people();
    let t = db.default_table();

    let by_builder = t.search(&field("address").field("city").eq("London")).unwrap();
    let by_parse = t.search(&Path::parse("address.city").unwrap().eq("London")).unwrap();

    assert_eq!(ids(&by_builder), vec![DocId(1)]);
    assert_eq!(by_builder, by_parse);
    assert!(Path::parse("address..city").unwrap_err().is_usage());
}

#[test]
fn test_integral_float_equals_int() {
    let db = people();
    let t = db.default_table();
    assert_eq!(ids(&t.search(&field("age").eq(85)).unwrap()), vec![DocId(3)]);
    assert_eq!(ids(&t.search(&field("age").gt(40)).unwrap()), vec![DocId(2), DocId(3)]);
}

#[test]
fn test_combinators() {
    let db = people();
    let t = db.default_table();

    let q = field("age").lt(50) & !field("name").eq("Ada");
    assert_eq!(ids(&t.search(&q).unwrap()), vec![DocId(2)]);

    let q = field("name").eq("Ada") | !field("address").exists();
    assert_eq!(ids(&t.search(&q).unwrap()), vec![DocId(1), DocId(3)]);
}

#[test]
fn test_regex_operators() {
    let db = people();
    let t = db.default_table();

    let full = field("name").matches("a.*").unwrap();
    assert_eq!(ids(&t.search(&full).unwrap()), vec![DocId(2)]);

    let insensitive = field("name").matches_with("a.*", RegexFlags::ignore_case()).unwrap();
    assert_eq!(ids(&t.search(&insensitive).unwrap()), vec![DocId(1), DocId(2)]);

    let partial = field("name").search("ra").unwrap();
    assert_eq!(ids(&t.search(&partial).unwrap()), vec![DocId(3)]);

    assert!(field("name").matches("(").unwrap_err().is_usage());
}

#[test]
fn test_sequence_operators() {
    let db = people();
    let t = db.default_table();

    assert_eq!(ids(&t.search(&field("langs").any(vec!["fr"])).unwrap()), vec![DocId(1)]);

    // Every element is one of the listed values; empty arrays pass
    let all_en = field("langs").all(vec!["en", "de"]);
    assert_eq!(ids(&t.search(&all_en).unwrap()), vec![DocId(2), DocId(3)]);

    let navy = field("groups").any(field("name").eq("navy"));
    assert_eq!(ids(&t.search(&navy).unwrap()), vec![DocId(3)]);

    let empty: Vec<String> = Vec::new();
    assert!(t.search(&field("langs").all(empty)).unwrap().is_empty());
}

#[test]
fn test_one_of_and_fragment() {
    let db = people();
    let t = db.default_table();

    let q = field("name").one_of(["Ada", "Grace"]);
    assert_eq!(ids(&t.search(&q).unwrap()), vec![DocId(1), DocId(3)]);

    let mut partial = Map::new();
    partial.insert("age".into(), json!(41));
    partial.insert("name".into(), json!("alan"));
    assert_eq!(ids(&t.search(&Query::fragment(partial)).unwrap()), vec![DocId(2)]);

    let mut city = Map::new();
    city.insert("city".into(), json!("London"));
    assert_eq!(ids(&t.search(&field("address").fragment(city)).unwrap()), vec![DocId(1)]);
}

#[test]
fn test_map_and_test_are_not_cacheable() {
    let upper = field("name").map(|v: &Value| json!(v.as_str().map(str::to_uppercase)));
    let q = upper.eq("ALAN");
    assert!(!q.is_cacheable());

    let db = people();
    let t = db.default_table();
    assert_eq!(ids(&t.search(&q).unwrap()), vec![DocId(2)]);
    assert_eq!(t.cache_stats().inserts(), 0);
}

#[test]
fn test_query_identity() {
    let a = field("x").eq(1) & field("y").exists();
    let b = field("x").eq(1.0) & field("y").exists();
    let swapped = field("y").exists() & field("x").eq(1);

    assert_eq!(a, b);
    assert_ne!(a, swapped);

    let set: HashSet<Query> = [a, b, swapped, Query::noop()].into_iter().collect();
    assert_eq!(set.len(), 3);
}

#[test]
fn test_noop_matches_everything() {
    let db = people();
    assert_eq!(db.default_table().search(&Query::noop()).unwrap().len(), 3);
}

proptest! {
    #[test]
    fn prop_integral_numbers_freeze_alike(n in -(1i64 << 50)..(1i64 << 50)) {
        prop_assert_eq!(freeze(&json!(n)), freeze(&json!(n as f64)));
    }

    #[test]
    fn prop_object_freeze_ignores_insertion_order(
        entries in prop::collection::btree_map("[a-z]{1,6}", any::<i32>(), 0..8)
    ) {
        let forward: Map<String, Value> = entries.iter().map(|(k, v)| (k.clone(), json!(v))).collect();
        let backward: Map<String, Value> = entries.iter().rev().map(|(k, v)| (k.clone(), json!(v))).collect();
        prop_assert_eq!(freeze(&forward), freeze(&backward));
    }

    #[test]
    fn prop_freeze_thaw_preserves_structure(
        items in prop::collection::vec(any::<i32>(), 0..10),
        label in "[a-z]{0,8}",
    ) {
        let value = json!({"items": items, "label": label, "nested": {"flag": true, "none": null}});
        prop_assert_eq!(freeze(&value).thaw(), value);
    }
}
