use json_lens::{Document, Error};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

fn reparsed(doc: &Document) -> Value {
    serde_json::from_slice(&doc.bytes()).unwrap()
}

#[test]
fn first_write_materializes_and_preserves_reads() {
    let doc = Document::parse(r#"{"a":{"b":1}}"#).unwrap();
    assert!(!doc.is_materialized());

    doc.set("a.c", 2).unwrap();
    assert!(doc.is_materialized());
    assert_eq!(reparsed(&doc), json!({"a": {"b": 1, "c": 2}}));
    assert_eq!(doc.query("a.b").int().unwrap(), 1);
}

#[test]
fn set_then_query_returns_the_written_value() {
    let doc = Document::parse(r#"{}"#).unwrap();
    doc.set("user.name", "ada").unwrap();
    doc.set("user.tags", json!(["admin", "ops"])).unwrap();
    doc.set("user.age", 36).unwrap();

    assert_eq!(doc.query("user.name").string().unwrap(), "ada");
    assert_eq!(doc.query("user.age").int().unwrap(), 36);
    assert_eq!(
        doc.query("user.tags").to_value().unwrap(),
        json!(["admin", "ops"])
    );
}

#[test]
fn writes_compose_with_path_queries() {
    let doc = Document::parse(
        r#"{"store":{"book":[{"price":8.95},{"price":12.99}]}}"#,
    )
    .unwrap();
    doc.set("store.book.0.price", 9.99).unwrap();

    let prices = doc.query("store..price");
    let mut got = Vec::new();
    prices.for_each(|_, p| got.push(p.float().unwrap()));
    assert_eq!(got, vec![9.99, 12.99]);
}

#[test]
fn structural_write_round_trip() {
    let doc = Document::parse(r#"{"keep":"me"}"#).unwrap();
    let value = json!({"nested": {"xs": [1, 2, 3], "flag": false}});
    doc.set("blob", value.clone()).unwrap();
    assert_eq!(doc.query("blob").to_value().unwrap(), value);
    assert_eq!(doc.query("keep").string().unwrap(), "me");
}

#[test]
fn bytes_reserializes_after_every_write() {
    let doc = Document::parse(r#"{"a": 1}"#).unwrap();
    doc.set("b", 2).unwrap();
    let first = reparsed(&doc);
    doc.delete("a").unwrap();
    let second = reparsed(&doc);
    assert_eq!(first, json!({"a": 1, "b": 2}));
    assert_eq!(second, json!({"b": 2}));
}

#[test]
fn node_level_writes_dirty_the_document_serialization() {
    let doc = Document::parse(r#"{"xs": [1], "o": {"k": 1}}"#).unwrap();
    doc.root().get("xs").append(2).unwrap();
    assert_eq!(reparsed(&doc), json!({"xs": [1, 2], "o": {"k": 1}}));
    // Node-level writes do not go through the document entry points, so
    // the materialized flag is untouched.
    assert!(!doc.is_materialized());
}

#[test]
fn mutation_errors() {
    let doc = Document::parse(r#"{"a": 1, "xs": [1, 2]}"#).unwrap();
    assert!(matches!(doc.delete(""), Err(Error::DeleteRoot)));
    assert!(matches!(doc.delete("xs.0"), Err(Error::DeleteArrayElement)));
    assert!(matches!(
        doc.delete("a.b"),
        Err(Error::SetThroughScalar { .. })
    ));
    assert!(matches!(
        doc.set("a.deeper", 1),
        Err(Error::SetThroughScalar { .. })
    ));
    assert!(matches!(
        doc.set("xs.7", 1),
        Err(Error::BadArrayIndex { .. })
    ));
    assert!(matches!(
        doc.delete("missing.key"),
        Err(Error::KeyNotFound { .. })
    ));
}

#[test]
fn time_values_round_trip_through_writes() {
    let doc = Document::parse(r#"{}"#).unwrap();
    doc.set("at", "2021-07-06T05:04:03Z").unwrap();
    let at = doc.query("at").time().unwrap();
    assert_eq!(at.to_rfc3339(), "2021-07-06T05:04:03+00:00");
}
