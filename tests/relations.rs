//! End-to-end relation behavior against in-memory SQLite.

use chrono::{DateTime, NaiveDate, Utc};
use provider_sdk::config::ResolvedRelationship;
use provider_sdk::store::table_exists;
use provider_sdk::{
    connect, describe_table, load_from_str, resolve, schema_version, AppError, ContentResolver, ContentValues,
    DbHelper, ForeignKeyDbHelper, QueryArgs, ResourcePath, Selection, Settings, Value,
};

const SCHEMA: &str = r#"{
    "entities": [
        {"id": "thread", "path": "thread", "columns": [{"name": "title", "type": "text"}]},
        {"id": "message", "path": "message", "sort_order": "_id ASC", "columns": [
            {"name": "subject", "type": "text", "nullable": false},
            {"name": "body", "type": "text"},
            {"name": "status", "type": "text", "nullable": false, "default": "new"}
        ]},
        {"id": "person", "path": "person", "columns": [{"name": "name", "type": "text", "nullable": false}]},
        {"id": "tag", "path": "tag", "sort_order": "name ASC", "columns": [{"name": "name", "type": "text", "nullable": false}]},
        {"id": "note", "path": "note", "columns": [
            {"name": "title", "type": "string"},
            {"name": "count", "type": "integer"},
            {"name": "score", "type": "double"},
            {"name": "done", "type": "boolean"},
            {"name": "due", "type": "date"},
            {"name": "created", "type": "timestamp"},
            {"name": "payload", "type": "blob"}
        ]}
    ],
    "relationships": [
        {"kind": "foreign_key", "parent": "thread", "child": "message", "column": "thread_id", "on_delete": "cascade"},
        {"kind": "many_to_many", "from": "person", "to": "tag"}
    ]
}"#;

async fn open(foreign_keys: bool) -> ContentResolver {
    let settings = Settings {
        database_url: "sqlite::memory:".into(),
        foreign_keys,
        ..Settings::default()
    };
    let pool = connect(&settings).await.unwrap();
    let registry = resolve(&load_from_str(SCHEMA).unwrap()).unwrap();
    let resolver = ContentResolver::new(registry, pool).unwrap();
    resolver.open(1).await.unwrap();
    resolver
}

fn values(pairs: &[(&str, Value)]) -> ContentValues {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

fn path(s: &str) -> ResourcePath {
    ResourcePath::parse(s)
}

async fn column_of(resolver: &ContentResolver, at: &str, column: &str) -> Vec<Value> {
    let mut cursor = resolver.query(&path(at), &QueryArgs::new()).await.unwrap();
    let mut out = Vec::new();
    while cursor.move_to_next() {
        out.push(cursor.get_by_name(column).cloned().unwrap());
    }
    cursor.close();
    out
}

#[tokio::test]
async fn created_tables_match_declared_columns() {
    let r = open(true).await;
    let message = describe_table(r.pool(), "message").await.unwrap();
    let shape: Vec<(&str, &str)> = message.iter().map(|c| (c.name.as_str(), c.sql_type.as_str())).collect();
    assert_eq!(
        shape,
        vec![
            ("_id", "INTEGER"),
            ("subject", "TEXT"),
            ("body", "TEXT"),
            ("status", "TEXT"),
            ("thread_id", "INTEGER"),
        ]
    );
    assert!(message[0].primary_key);
    assert!(message[1].not_null);

    let join = describe_table(r.pool(), "person_tag").await.unwrap();
    let names: Vec<&str> = join.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["_id", "from_id", "to_id"]);
}

#[tokio::test]
async fn foreign_key_collections_are_scoped_by_parent() {
    let r = open(false).await;
    let created = r
        .insert(&path("/thread/42/message"), values(&[("subject", "hi".into()), ("body", "there".into())]))
        .await
        .unwrap();
    assert_eq!(created.to_string(), "/thread/42/message/1");
    r.insert(&path("/thread/7/message"), values(&[("subject", "other".into())]))
        .await
        .unwrap();

    assert_eq!(column_of(&r, "/thread/42/message", "thread_id").await, vec![Value::Integer(42)]);
    assert_eq!(column_of(&r, "/thread/42/message", "subject").await, vec![Value::Text("hi".into())]);
    assert_eq!(
        column_of(&r, "/thread/_all/message", "thread_id").await,
        vec![Value::Integer(42), Value::Integer(7)]
    );
    assert_eq!(column_of(&r, "/thread/7/message/1", "subject").await, Vec::<Value>::new());
    assert_eq!(column_of(&r, "/thread/_all/message/2", "subject").await, vec![Value::Text("other".into())]);
}

#[tokio::test]
async fn parent_id_in_path_overrides_supplied_value() {
    let r = open(false).await;
    r.insert(
        &path("/thread/3/message"),
        values(&[("subject", "x".into()), ("thread_id", Value::Integer(99))]),
    )
    .await
    .unwrap();
    assert_eq!(column_of(&r, "/message", "thread_id").await, vec![Value::Integer(3)]);
}

#[tokio::test]
async fn item_scope_conjoins_caller_filter() {
    let r = open(false).await;
    for subject in ["a", "b"] {
        r.insert(&path("/thread/1/message"), values(&[("subject", subject.into())]))
            .await
            .unwrap();
    }
    r.update(&path("/message/2"), values(&[("status", "done".into())]), Selection::all())
        .await
        .unwrap();

    let set_body = || values(&[("body", "edited".into())]);
    let n = r
        .update(&path("/thread/1/message/1"), set_body(), Selection::new("status = ?", ["done"]))
        .await
        .unwrap();
    assert_eq!(n, 0);
    let n = r
        .update(&path("/thread/1/message/2"), set_body(), Selection::new("status = ?", ["done"]))
        .await
        .unwrap();
    assert_eq!(n, 1);
    assert_eq!(
        column_of(&r, "/message", "body").await,
        vec![Value::Null, Value::Text("edited".into())]
    );

    // Wrong parent: the id matches but the parent clause does not.
    let n = r.delete(&path("/thread/2/message/2"), Selection::all()).await.unwrap();
    assert_eq!(n, 0);

    let args = QueryArgs::new().selection(Selection::eq("status", "new"));
    let cursor = r.query(&path("/thread/1/message/2"), &args).await.unwrap();
    assert_eq!(cursor.count(), 0);
}

#[tokio::test]
async fn collection_mutations_stay_within_the_parent() {
    let r = open(false).await;
    r.insert(&path("/thread/1/message"), values(&[("subject", "a".into())])).await.unwrap();
    r.insert(&path("/thread/2/message"), values(&[("subject", "b".into())])).await.unwrap();

    let n = r
        .update(&path("/thread/1/message"), values(&[("status", "read".into())]), Selection::all())
        .await
        .unwrap();
    assert_eq!(n, 1);
    assert_eq!(
        column_of(&r, "/message", "status").await,
        vec![Value::Text("read".into()), Value::Text("new".into())]
    );
    assert_eq!(r.delete(&path("/thread/2/message"), Selection::all()).await.unwrap(), 1);
    assert_eq!(column_of(&r, "/message", "subject").await, vec![Value::Text("a".into())]);
}

#[tokio::test]
async fn wildcard_and_malformed_parents_are_refused_for_writes() {
    let r = open(false).await;
    let insert = r
        .insert(&path("/thread/_all/message"), values(&[("subject", "x".into())]))
        .await;
    assert!(matches!(insert, Err(AppError::BadRequest(_))));
    let insert = r
        .insert(&path("/thread/abc/message"), values(&[("subject", "x".into())]))
        .await;
    assert!(matches!(insert, Err(AppError::BadRequest(_))));
    let update = r
        .update(&path("/thread/_all/message"), values(&[("body", "x".into())]), Selection::all())
        .await;
    assert!(matches!(update, Err(AppError::BadRequest(_))));
    let delete = r.delete(&path("/thread/_all/message/1"), Selection::all()).await;
    assert!(matches!(delete, Err(AppError::BadRequest(_))));
    let query = r.query(&path("/thread/x/message"), &QueryArgs::new()).await;
    assert!(matches!(query, Err(AppError::BadRequest(_))));
}

#[tokio::test]
async fn insert_then_query_item_round_trips_values() {
    let r = open(true).await;
    let due = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
    let created = DateTime::<Utc>::from_timestamp_millis(1_700_000_000_123).unwrap();
    let supplied = values(&[
        ("title", "groceries".into()),
        ("count", Value::Integer(3)),
        ("score", Value::Real(2.5)),
        ("done", Value::Bool(true)),
        ("due", Value::Date(due)),
        ("created", Value::Timestamp(created)),
        ("payload", Value::Blob(vec![0, 1, 255])),
    ]);
    let item = r.insert(&path("/note"), supplied.clone()).await.unwrap();
    let mut records = r.query(&item, &QueryArgs::new()).await.unwrap().into_records();
    assert_eq!(records.len(), 1);
    let row = records.remove(0);
    for (column, value) in &supplied {
        assert_eq!(row.get(column), Some(value), "column {}", column);
    }
    assert_eq!(row.get("_id"), Some(&Value::Integer(item.last_id().unwrap())));
}

#[tokio::test]
async fn text_input_is_normalized_by_column_type() {
    let r = open(true).await;
    let item = r
        .insert(
            &path("/note"),
            values(&[("due", "2024-03-01".into()), ("score", Value::Integer(2)), ("done", Value::Integer(0))]),
        )
        .await
        .unwrap();
    let args = QueryArgs::new().projection(["due", "score", "done"]);
    let mut cursor = r.query(&item, &args).await.unwrap();
    assert_eq!(cursor.column_names(), &["due", "score", "done"]);
    assert!(cursor.move_to_next());
    assert_eq!(cursor.get(0), Some(&Value::Date(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap())));
    assert_eq!(cursor.get(1), Some(&Value::Real(2.0)));
    assert_eq!(cursor.get(2), Some(&Value::Bool(false)));
    assert!(!cursor.move_to_next());
}

#[tokio::test]
async fn request_shape_errors() {
    let r = open(true).await;
    let missing = r.insert(&path("/message"), values(&[("body", "x".into())])).await;
    assert!(matches!(missing, Err(AppError::Validation(_))));
    let mismatch = r.insert(&path("/note"), values(&[("count", "three".into())])).await;
    assert!(matches!(mismatch, Err(AppError::BadRequest(_))));
    let unknown = r.query(&path("/nothing/here"), &QueryArgs::new()).await;
    assert!(matches!(unknown, Err(AppError::NotFound(_))));
    let projection = r.query(&path("/note"), &QueryArgs::new().projection(["nope"])).await;
    assert!(matches!(projection, Err(AppError::BadRequest(_))));
    let item = r.query(&path("/note/abc"), &QueryArgs::new()).await;
    assert!(matches!(item, Err(AppError::BadRequest(_))));
}

#[tokio::test]
async fn deleting_a_parent_does_not_cascade_without_enforcement() {
    let r = open(false).await;
    let thread = r.insert(&path("/thread"), values(&[("title", "t".into())])).await.unwrap();
    let messages = thread.append("message");
    r.insert(&messages, values(&[("subject", "orphan".into())])).await.unwrap();

    assert_eq!(r.delete(&thread, Selection::all()).await.unwrap(), 1);
    assert_eq!(column_of(&r, "/thread/_all/message", "subject").await, vec![Value::Text("orphan".into())]);
}

#[tokio::test]
async fn deleting_a_parent_cascades_with_enforcement() {
    let r = open(true).await;
    let thread = r.insert(&path("/thread"), values(&[("title", "t".into())])).await.unwrap();
    r.insert(&thread.append("message"), values(&[("subject", "child".into())]))
        .await
        .unwrap();

    assert_eq!(r.delete(&thread, Selection::all()).await.unwrap(), 1);
    assert!(column_of(&r, "/thread/_all/message", "subject").await.is_empty());

    let dangling = r.insert(&path("/thread/999/message"), values(&[("subject", "x".into())])).await;
    assert!(matches!(dangling, Err(AppError::Db(_))));
}

#[tokio::test]
async fn many_to_many_links_query_and_unlink() {
    let r = open(true).await;
    let ada = r.insert(&path("/person"), values(&[("name", "ada".into())])).await.unwrap();
    let bob = r.insert(&path("/person"), values(&[("name", "bob".into())])).await.unwrap();

    let tags = r.many_to_many("person", "tag").unwrap();
    assert_eq!(tags.path().unwrap(), "tag");
    assert_eq!(tags.sort_order(), Some("name ASC"));
    assert_eq!(tags.uri(&ada).unwrap().to_string(), "/person/1/tag");

    let rust = tags.insert(&r, &ada, values(&[("name", "rust".into())])).await.unwrap();
    assert_eq!(rust.to_string(), "/person/1/tag/1");
    tags.insert(&r, &ada, values(&[("name", "go".into())])).await.unwrap();
    // Linking an existing tag reuses the row.
    let shared = tags
        .insert(&r, &bob, values(&[("_id", Value::Integer(1))]))
        .await
        .unwrap();
    assert_eq!(shared.to_string(), "/person/2/tag/1");

    let names = |c: provider_sdk::Cursor| -> Vec<Value> {
        c.into_records().into_iter().map(|mut row| row.remove("name").unwrap()).collect()
    };
    let ada_tags = tags.query(&r, &ada, None).await.unwrap();
    assert_eq!(names(ada_tags), vec![Value::Text("go".into()), Value::Text("rust".into())]);
    let bob_tags = tags.query(&r, &bob, Some(vec!["name".into()])).await.unwrap();
    assert_eq!(names(bob_tags), vec![Value::Text("rust".into())]);
    assert_eq!(column_of(&r, "/person/_all/tag", "name").await.len(), 2);

    assert_eq!(r.delete(&rust, Selection::all()).await.unwrap(), 1);
    assert_eq!(column_of(&r, "/person/1/tag", "name").await, vec![Value::Text("go".into())]);
    assert_eq!(column_of(&r, "/tag", "name").await.len(), 2);
    assert_eq!(column_of(&r, "/person/2/tag", "name").await, vec![Value::Text("rust".into())]);

    let n = r
        .update(&path("/person/2/tag"), values(&[("name", "rustlang".into())]), Selection::all())
        .await
        .unwrap();
    assert_eq!(n, 1);
    assert_eq!(
        column_of(&r, "/tag", "name").await,
        vec![Value::Text("go".into()), Value::Text("rustlang".into())]
    );
}

#[tokio::test]
async fn add_columns_upgrade_keeps_rows() {
    let v1 = r#"{"entities": [{"id": "item", "path": "item", "upgrade": "add_columns",
        "columns": [{"name": "name", "type": "text"}]}]}"#;
    let v2 = r#"{"entities": [{"id": "item", "path": "item", "upgrade": "add_columns",
        "columns": [{"name": "name", "type": "text"}, {"name": "price", "type": "double", "default": 1.5}]}]}"#;
    let settings = Settings {
        database_url: "sqlite::memory:".into(),
        ..Settings::default()
    };
    let pool = connect(&settings).await.unwrap();

    let first = ContentResolver::new(resolve(&load_from_str(v1).unwrap()).unwrap(), pool.clone()).unwrap();
    first.open(1).await.unwrap();
    first.insert(&path("/item"), values(&[("name", "kept".into())])).await.unwrap();

    let second = ContentResolver::new(resolve(&load_from_str(v2).unwrap()).unwrap(), pool.clone()).unwrap();
    second.open(2).await.unwrap();
    let names: Vec<String> = describe_table(&pool, "item").await.unwrap().into_iter().map(|c| c.name).collect();
    assert_eq!(names, vec!["_id", "name", "price"]);
    assert_eq!(column_of(&second, "/item", "name").await, vec![Value::Text("kept".into())]);
    assert_eq!(column_of(&second, "/item", "price").await, vec![Value::Real(1.5)]);
}

#[tokio::test]
async fn recreate_upgrade_discards_rows() {
    let schema = r#"{"entities": [{"id": "item", "path": "item", "columns": [{"name": "name", "type": "text"}]}]}"#;
    let settings = Settings {
        database_url: "sqlite::memory:".into(),
        ..Settings::default()
    };
    let pool = connect(&settings).await.unwrap();
    let registry = resolve(&load_from_str(schema).unwrap()).unwrap();
    let r = ContentResolver::new(registry, pool).unwrap();
    r.open(1).await.unwrap();
    r.insert(&path("/item"), values(&[("name", "gone".into())])).await.unwrap();
    r.open(2).await.unwrap();
    assert!(column_of(&r, "/item", "name").await.is_empty());
}

async fn open_schema(schema: &str, foreign_keys: bool) -> ContentResolver {
    let settings = Settings {
        database_url: "sqlite::memory:".into(),
        foreign_keys,
        ..Settings::default()
    };
    let pool = connect(&settings).await.unwrap();
    let r = ContentResolver::new(resolve(&load_from_str(schema).unwrap()).unwrap(), pool).unwrap();
    r.open(1).await.unwrap();
    r
}

#[tokio::test]
async fn relationships_nest_below_child_collections() {
    let schema = r#"{
        "entities": [
            {"id": "thread", "path": "thread", "columns": [{"name": "title", "type": "text"}]},
            {"id": "message", "path": "message", "columns": [{"name": "subject", "type": "text"}]},
            {"id": "attachment", "path": "attachment", "columns": [{"name": "file", "type": "text"}]},
            {"id": "tag", "path": "tag", "columns": [{"name": "name", "type": "text"}]}
        ],
        "relationships": [
            {"kind": "foreign_key", "parent": "thread", "child": "message", "column": "thread_id"},
            {"kind": "foreign_key", "parent": "message", "child": "attachment", "column": "message_id"},
            {"kind": "many_to_many", "from": "message", "to": "tag"}
        ]
    }"#;
    let r = open_schema(schema, true).await;
    r.insert(&path("/thread"), values(&[("title", "t".into())])).await.unwrap();
    let message = r
        .insert(&path("/thread/1/message"), values(&[("subject", "hi".into())]))
        .await
        .unwrap();
    assert_eq!(message.to_string(), "/thread/1/message/1");

    let tags = r.many_to_many("message", "tag").unwrap();
    let tag = tags.insert(&r, &message, values(&[("name", "x".into())])).await.unwrap();
    assert_eq!(tag.to_string(), "/thread/1/message/1/tag/1");
    let linked = tags.query(&r, &message, None).await.unwrap();
    assert_eq!(linked.count(), 1);
    assert_eq!(column_of(&r, "/message/1/tag", "name").await, vec![Value::Text("x".into())]);
    assert_eq!(column_of(&r, "/thread/_all/message/1/tag/1", "name").await, vec![Value::Text("x".into())]);

    let attachment = r
        .insert(&path("/thread/1/message/1/attachment"), values(&[("file", "a.txt".into())]))
        .await
        .unwrap();
    assert_eq!(attachment.to_string(), "/thread/1/message/1/attachment/1");
    assert_eq!(column_of(&r, "/message/1/attachment", "message_id").await, vec![Value::Integer(1)]);
    assert!(column_of(&r, "/thread/1/message/2/attachment", "file").await.is_empty());
}

const PARENT_CHILD_V1: &str = r#"{
    "entities": [
        {"id": "thread", "path": "thread", "columns": [{"name": "title", "type": "text"}]},
        {"id": "message", "path": "message", "columns": [{"name": "subject", "type": "text"}]}
    ],
    "relationships": [
        {"kind": "foreign_key", "parent": "thread", "child": "message", "column": "thread_id"}
    ]
}"#;

#[tokio::test]
async fn recreate_upgrade_with_enforced_foreign_keys_and_child_rows() {
    let r = open_schema(PARENT_CHILD_V1, true).await;
    r.insert(&path("/thread"), values(&[("title", "t".into())])).await.unwrap();
    r.insert(&path("/thread/1/message"), values(&[("subject", "hi".into())]))
        .await
        .unwrap();

    r.open(2).await.unwrap();
    assert_eq!(schema_version(r.pool()).await.unwrap(), 2);
    assert!(column_of(&r, "/thread", "title").await.is_empty());
    assert!(column_of(&r, "/message", "subject").await.is_empty());
}

#[tokio::test]
async fn failed_upgrade_leaves_tables_and_version_untouched() {
    // The child keeps its rows while the parent is rebuilt empty, so the references would dangle.
    let schema = PARENT_CHILD_V1.replace(
        r#"{"id": "message", "path": "message","#,
        r#"{"id": "message", "path": "message", "upgrade": "none","#,
    );
    let r = open_schema(&schema, true).await;
    r.insert(&path("/thread"), values(&[("title", "t".into())])).await.unwrap();
    r.insert(&path("/thread/1/message"), values(&[("subject", "hi".into())]))
        .await
        .unwrap();

    assert!(matches!(r.open(2).await, Err(AppError::Db(_))));
    assert_eq!(schema_version(r.pool()).await.unwrap(), 1);
    assert_eq!(column_of(&r, "/thread", "title").await, vec![Value::Text("t".into())]);
    assert_eq!(column_of(&r, "/thread/1/message", "subject").await, vec![Value::Text("hi".into())]);
}

const NODE_TREE: &str = r#"{
    "entities": [{"id": "node", "path": "node", "columns": [{"name": "name", "type": "text"}]}],
    "relationships": [{"kind": "foreign_key", "parent": "node", "child": "node", "column": "parent_id"}]
}"#;

#[tokio::test]
async fn self_referencing_foreign_key() {
    let r = open_schema(NODE_TREE, true).await;
    let shape: Vec<String> = describe_table(r.pool(), "node").await.unwrap().into_iter().map(|c| c.name).collect();
    assert_eq!(shape, vec!["_id", "name", "parent_id"]);

    let root = r.insert(&path("/node"), values(&[("name", "root".into())])).await.unwrap();
    let child = r
        .insert(&root.append("node"), values(&[("name", "leaf".into())]))
        .await
        .unwrap();
    assert_eq!(child.to_string(), "/node/1/node/2");

    assert_eq!(column_of(&r, "/node/1/node", "name").await, vec![Value::Text("leaf".into())]);
    assert_eq!(column_of(&r, "/node/1/node/2", "parent_id").await, vec![Value::Integer(1)]);
    assert!(column_of(&r, "/node/2/node", "name").await.is_empty());
    assert_eq!(column_of(&r, "/node/_all/node", "name").await.len(), 2);
    assert!(matches!(
        r.query(&path("/node/1/node/2/node"), &QueryArgs::new()).await,
        Err(AppError::NotFound(_))
    ));

    // No on_delete, so the leaf's reference blocks removing the root.
    assert!(matches!(r.delete(&root, Selection::all()).await, Err(AppError::Db(_))));
}

#[tokio::test]
async fn self_join_helper_leaves_schema_to_the_entity() {
    let registry = resolve(&load_from_str(NODE_TREE).unwrap()).unwrap();
    let relation = registry
        .relationships
        .iter()
        .find_map(|r| match r {
            ResolvedRelationship::ForeignKey(fk) => Some(fk),
            _ => None,
        })
        .unwrap();
    let helper = ForeignKeyDbHelper::new(relation);
    assert!(helper.is_self_join());

    let settings = Settings {
        database_url: "sqlite::memory:".into(),
        ..Settings::default()
    };
    let pool = connect(&settings).await.unwrap();
    let mut conn = pool.acquire().await.unwrap();
    helper.create_tables(&mut *conn).await.unwrap();
    helper.upgrade_tables(&mut *conn, 1, 2).await.unwrap();
    assert!(!table_exists(&mut *conn, "node").await.unwrap());

    // A distinct child table is created through the relation helper.
    let registry = resolve(&load_from_str(PARENT_CHILD_V1).unwrap()).unwrap();
    let ResolvedRelationship::ForeignKey(relation) = &registry.relationships[0] else {
        panic!("expected a foreign key");
    };
    let helper = ForeignKeyDbHelper::new(relation);
    assert!(!helper.is_self_join());
    helper.create_tables(&mut *conn).await.unwrap();
    assert!(table_exists(&mut *conn, "message").await.unwrap());
}
