//! End-to-end tests over the public API
//!
//! Covers cascade deletion, label rules, property round trips, search,
//! checkpoint round trips and partial-success import.

use knowgraph::graph::Label;
use knowgraph::loader::{parse_node_csv, NodeRecord, RowError, RowStream};
use knowgraph::*;
use tempfile::TempDir;

fn person(store: &mut GraphStore, name: &str) -> NodeId {
    store.create_node(name, ["Person"], PropertyMap::new()).unwrap()
}

#[test]
fn test_delete_node_cascades_both_directions() {
    let mut store = GraphStore::new();
    let a = person(&mut store, "A");
    let b = person(&mut store, "B");
    let c = person(&mut store, "C");
    store.create_relationship(a, b, "KNOWS", PropertyMap::new()).unwrap();
    store.create_relationship(c, a, "KNOWS", PropertyMap::new()).unwrap();
    store.create_relationship(a, a, "SELF", PropertyMap::new()).unwrap();
    store.create_relationship(b, c, "KNOWS", PropertyMap::new()).unwrap();

    let deleted = store.delete_node(a).unwrap();
    assert_eq!(deleted.node.id, a);
    assert_eq!(deleted.relationships.len(), 3);

    assert!(store.all_relationships().iter().all(|r| !r.touches(a)));
    assert_eq!(store.relationship_count(), 1);
    assert!(store.outgoing(c).is_empty());
    assert!(store.incoming(b).is_empty());
    assert!(store.nodes_named("A").is_empty());
    assert_eq!(store.nodes_by_label(&Label::new("Person")).len(), 2);
}

#[test]
fn test_scenario_delete_person() {
    // A(id=1), B(id=2), (1)-[:KNOWS]->(2), delete 1
    let mut store = GraphStore::new();
    let a = person(&mut store, "A");
    let b = person(&mut store, "B");
    assert_eq!((a, b), (NodeId::new(1), NodeId::new(2)));
    store.create_relationship(a, b, "KNOWS", PropertyMap::new()).unwrap();

    store.delete_node(a).unwrap();

    assert!(store.has_node(b));
    assert!(!store.has_relationship(&RelKey::new(a, b, "KNOWS")));
    assert_eq!(store.require_node(a).unwrap_err(), GraphError::NodeNotFound(a));
    assert_eq!(
        store.delete_node(a).unwrap_err(),
        GraphError::NodeNotFound(a)
    );
}

#[test]
fn test_last_label_cannot_be_removed() {
    let mut store = GraphStore::new();
    let a = person(&mut store, "A");

    let err = store.remove_label(a, "Person").unwrap_err();
    assert!(matches!(err, GraphError::InvalidOperation(_)));
    assert!(store.get_node(a).unwrap().has_label(&Label::new("Person")));

    // Absent label is a no-op
    assert_eq!(store.remove_label(a, "Robot").unwrap().label_count(), 1);
}

#[test]
fn test_add_label_is_idempotent() {
    let mut store = GraphStore::new();
    let a = store
        .create_node("A", ["Person", "Engineer"], PropertyMap::new())
        .unwrap();
    store.add_label(a, "Admin").unwrap();
    let before: Vec<Label> = store.get_node(a).unwrap().labels.iter().cloned().collect();

    let node = store.add_label(a, "Engineer").unwrap();
    let after: Vec<Label> = node.labels.iter().cloned().collect();
    assert_eq!(before, after);
    assert_eq!(store.nodes_by_label(&Label::new("Engineer")).len(), 1);
}

#[test]
fn test_property_round_trip() {
    let mut store = GraphStore::new();
    let a = person(&mut store, "A");
    let b = person(&mut store, "B");
    store
        .set_node_property(a, "age", PropertyValue::Integer(30))
        .unwrap();
    store.create_relationship(a, b, "KNOWS", PropertyMap::new()).unwrap();

    let node_before = store.get_node(a).unwrap().properties.clone();
    store
        .set_node_property(a, "city", PropertyValue::String("Paris".to_string()))
        .unwrap();
    store.delete_node_property(a, "city").unwrap();
    assert_eq!(store.get_node(a).unwrap().properties, node_before);

    let rel = EntityRef::Relationship(RelKey::new(a, b, "KNOWS"));
    store
        .set_property(&rel, "since", PropertyValue::Integer(2020))
        .unwrap();
    store.delete_property(&rel, "since").unwrap();
    // Deleting a missing key is a no-op success
    store.delete_property(&rel, "since").unwrap();
    assert_eq!(
        store
            .get_relationship(&RelKey::new(a, b, "KNOWS"))
            .unwrap()
            .property_count(),
        0
    );

    assert!(matches!(
        store.set_node_property(a, "name", PropertyValue::from("x")),
        Err(GraphError::InvalidOperation(_))
    ));
}

#[test]
fn test_recreating_triple_merges_properties() {
    let mut store = GraphStore::new();
    let a = person(&mut store, "A");
    let b = person(&mut store, "B");
    let mut first = PropertyMap::new();
    first.insert("since".to_string(), PropertyValue::Integer(2019));
    first.insert("weight".to_string(), PropertyValue::Float(0.5));
    store.create_relationship(a, b, "KNOWS", first).unwrap();

    let mut second = PropertyMap::new();
    second.insert("since".to_string(), PropertyValue::Integer(2021));
    let (upsert, rel) = store.create_relationship(a, b, "KNOWS", second).unwrap();

    assert_eq!(upsert, Upsert::Updated);
    assert_eq!(rel.get_property("since"), Some(&PropertyValue::Integer(2021)));
    assert_eq!(rel.get_property("weight"), Some(&PropertyValue::Float(0.5)));
    assert_eq!(store.relationship_count(), 1);
}

#[test]
fn test_empty_search_returns_nothing() {
    let mut store = GraphStore::new();
    person(&mut store, "Alice");
    person(&mut store, "Bob");
    let engine = QueryEngine::new();

    assert!(engine.search(&store, "").is_empty());
    assert!(engine.search(&store, "zzz").is_empty());
    assert_eq!(engine.search(&store, "B").len(), 1);
}

#[test]
fn test_path_errors() {
    let mut store = GraphStore::new();
    let a = person(&mut store, "A");
    let b = person(&mut store, "B");
    person(&mut store, "Twin");
    person(&mut store, "twin");
    store.create_relationship(b, a, "KNOWS", PropertyMap::new()).unwrap();
    let engine = QueryEngine::new();

    assert_eq!(
        engine.find_path(&store, "A", "B", None).unwrap_err(),
        QueryError::PathNotFound { from: a, to: b }
    );
    assert!(matches!(
        engine.find_path(&store, "A", "Nobody", None),
        Err(QueryError::NotFound(_))
    ));
    assert!(matches!(
        engine.find_path(&store, "Twin", "A", None),
        Err(QueryError::Ambiguous { .. })
    ));

    let trivial = engine.find_path(&store, "A", "A", None).unwrap();
    assert_eq!(trivial.node_ids(), vec![a]);
    assert!(trivial.relationships.is_empty());
}

#[tokio::test]
async fn test_save_init_restore_is_identical() {
    let dir = TempDir::new().unwrap();
    let db = GraphDb::new(EngineConfig::with_data_dir(dir.path()));

    let mut props = PropertyMap::new();
    props.insert("age".to_string(), PropertyValue::Integer(30));
    props.insert("score".to_string(), PropertyValue::Float(0.1 + 0.2));
    props.insert("active".to_string(), PropertyValue::Boolean(true));
    let a = db.create_node("Alice", &["Person", "Admin"], props).await.unwrap().id;
    let b = db.create_node("Bob", &["Person"], PropertyMap::new()).await.unwrap().id;
    let c = db.create_node("Acme", &["Company"], PropertyMap::new()).await.unwrap().id;
    let mut since = PropertyMap::new();
    since.insert("since".to_string(), PropertyValue::String("2020".to_string()));
    db.create_relationship(a, b, "KNOWS", since).await.unwrap();
    db.create_relationship(b, c, "WORKS_AT", PropertyMap::new())
        .await
        .unwrap();

    let saved = db.get_graph().await;
    db.save().await.unwrap();

    db.init(InitMode::Empty).await.unwrap();
    assert_eq!(db.statistics().await.node_count, 0);

    let outcome = db.init(InitMode::Checkpoint).await.unwrap();
    assert_eq!(outcome.source, InitSource::Checkpoint);
    let restored = db.get_graph().await;

    assert_eq!(restored.nodes.len(), 3);
    for (before, after) in saved.nodes.iter().zip(&restored.nodes) {
        assert_eq!(before.id, after.id);
        assert_eq!(before.name, after.name);
        assert_eq!(before.labels, after.labels);
        assert_eq!(before.properties, after.properties);
    }
    let triples = |g: &GraphExport| -> Vec<(RelKey, PropertyMap)> {
        g.relationships
            .iter()
            .map(|r| (r.key(), r.properties.clone()))
            .collect()
    };
    assert_eq!(triples(&saved), triples(&restored));
}

#[tokio::test]
async fn test_open_restores_checkpoint() {
    let dir = TempDir::new().unwrap();
    let config = EngineConfig {
        compress_snapshots: true,
        ..EngineConfig::with_data_dir(dir.path())
    };
    {
        let db = GraphDb::new(config.clone());
        db.create_node("Persisted", &["Thing"], PropertyMap::new())
            .await
            .unwrap();
        db.save().await.unwrap();
    }

    let (db, outcome) = GraphDb::open(config).await.unwrap();
    assert_eq!(outcome.source, InitSource::Checkpoint);
    assert_eq!(db.search("persisted").await.len(), 1);
}

#[tokio::test]
async fn test_import_five_rows_with_empty_third_name() {
    let dir = TempDir::new().unwrap();
    let db = GraphDb::new(EngineConfig::with_data_dir(dir.path()));
    let csv = "name,labels\nA,Person\nB,Person\n,Person\nD,Person\nE,Person\n";
    let batch = ImportBatch {
        nodes: parse_node_csv(csv.as_bytes()).unwrap(),
        relationships: Vec::new(),
    };

    let report = db.import(&batch, db.import_options(false)).await;

    assert_eq!(report.successes(), 4);
    assert_eq!(report.failures.len(), 1);
    let failure = &report.failures[0];
    assert_eq!((failure.stream, failure.row), (RowStream::Nodes, 3));
    assert!(matches!(failure.reason, RowError::Malformed(_)));
    assert_eq!(db.search("D").await.len(), 1);
    assert_eq!(db.search("E").await.len(), 1);
}

#[tokio::test]
async fn test_import_files_end_to_end() {
    let dir = TempDir::new().unwrap();
    let nodes = dir.path().join("entities.csv");
    let rels = dir.path().join("relations.csv");
    std::fs::write(
        &nodes,
        "id,name,labels,properties\n\
         10,Heart,Organ,\"{\"\"weight_g\"\": 300}\"\n\
         11,Circulatory System,System,{}\n\
         10,Duplicate,Organ,{}\n",
    )
    .unwrap();
    std::fs::write(
        &rels,
        "source_id,target_id,type,properties\n\
         10,11,PART_OF,{}\n\
         Heart,Blood,PUMPS,{}\n\
         10,404,PART_OF,{}\n",
    )
    .unwrap();

    let db = GraphDb::new(EngineConfig::with_data_dir(dir.path()));
    let report = db
        .import_csv(Some(&nodes), Some(&rels), db.import_options(false))
        .await
        .unwrap();

    assert_eq!(report.nodes_created, 2);
    assert_eq!(report.relationships_created, 2);
    assert_eq!(report.endpoints_created, 1);
    let reasons: Vec<(RowStream, usize)> =
        report.failures.iter().map(|f| (f.stream, f.row)).collect();
    assert_eq!(
        reasons,
        vec![(RowStream::Nodes, 3), (RowStream::Relationships, 3)]
    );

    let path = db.find_path("heart", "circulatory system", None).await.unwrap();
    assert_eq!(path.node_ids(), vec![NodeId::new(10), NodeId::new(11)]);

    // New nodes continue after the highest imported id
    let blood = db.resolve("Blood").await.unwrap();
    assert_eq!(blood, NodeId::new(12));

    let missing = db
        .import_csv(Some(&dir.path().join("missing.csv")), None, db.import_options(false))
        .await;
    assert!(matches!(missing, Err(ImportError::Io(_))));
}

#[tokio::test]
async fn test_import_replace() {
    let dir = TempDir::new().unwrap();
    let db = GraphDb::new(EngineConfig::with_data_dir(dir.path()));
    db.create_node("Old", &["Thing"], PropertyMap::new()).await.unwrap();

    let batch = ImportBatch::from_records(vec![NodeRecord::new("New")], vec![]);
    let report = db.import(&batch, db.import_options(true)).await;

    assert!(report.is_clean());
    assert!(db.search("old").await.is_empty());
    assert_eq!(db.statistics().await.labels.get("Unknown"), Some(&1));
}
