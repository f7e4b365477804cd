// ABOUTME: Integration tests for the store collaborators
// ABOUTME: PostgreSQL and MongoDB tests need TEST_POSTGRES_URL / TEST_MONGODB_URL and are ignored by default

use collection_reconciler::engine::{reconcile, CompareSpec, KeySpec, Record};
use collection_reconciler::store::{connect_store, with_store, Store, StoreKind};
use serde_json::json;
use std::env;

fn record(value: serde_json::Value) -> Record {
    serde_json::from_value(value).unwrap()
}

#[tokio::test]
async fn test_sqlite_store_snapshot_reconciles() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.db");
    let conn = rusqlite::Connection::open(&path).unwrap();
    conn.execute_batch(
        "CREATE TABLE models (Model TEXT, Type TEXT);
         INSERT INTO models VALUES ('A1', 'T1');",
    )
    .unwrap();
    drop(conn);

    let store = connect_store(path.to_str().unwrap()).await.unwrap();
    assert!(matches!(store.kind(), StoreKind::Sqlite(_)));

    let snapshot = with_store(store, |s| async move { s.fetch_records("models").await })
        .await
        .unwrap();
    assert_eq!(snapshot.len(), 1);

    let spec = CompareSpec::new(KeySpec::new(["Model"]).unwrap())
        .with_identity_fields(vec!["_rowid".to_string()]);
    let source = vec![record(json!({"Model": "a1", "Type": "t1"}))];
    let changes = reconcile(&source, &snapshot, &spec).unwrap();
    assert_eq!(changes.counts.matches, 1);
}

#[tokio::test]
async fn test_sqlite_store_missing_table() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.db");
    rusqlite::Connection::open(&path)
        .unwrap()
        .execute_batch("CREATE TABLE models (Model TEXT);")
        .unwrap();

    let store = connect_store(&format!("sqlite://{}", path.display()))
        .await
        .unwrap();
    let err = with_store(store, |s| async move { s.fetch_records("parts").await })
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Available tables: models"));
}

#[tokio::test]
#[ignore]
async fn test_postgres_store_fetch() {
    let Ok(url) = env::var("TEST_POSTGRES_URL") else {
        eprintln!("TEST_POSTGRES_URL not set, skipping");
        return;
    };

    let (client, connection) = tokio_postgres::connect(&url, tokio_postgres::NoTls)
        .await
        .unwrap();
    tokio::spawn(connection);
    client
        .batch_execute(
            r#"
            DROP TABLE IF EXISTS "public"."reconciler_store_test";
            CREATE TABLE "public"."reconciler_store_test" (
                id SERIAL PRIMARY KEY,
                "Model" TEXT NOT NULL,
                "Qty" INTEGER
            );
            INSERT INTO "public"."reconciler_store_test" ("Model", "Qty") VALUES ('A1', 5), ('B1', NULL);
            "#,
        )
        .await
        .unwrap();

    let store = connect_store(&url).await.unwrap();
    assert_eq!(store.kind(), StoreKind::Postgres);
    let snapshot = with_store(store, |s| async move {
        s.fetch_records("public.reconciler_store_test").await
    })
    .await
    .unwrap();

    assert_eq!(snapshot.len(), 2);
    assert!(snapshot.iter().all(|r| r.contains_key("id")));

    let spec = CompareSpec::new(KeySpec::new(["Model"]).unwrap())
        .with_identity_fields(vec!["id".to_string()]);
    let source = vec![
        record(json!({"Model": "A1", "Qty": "5"})),
        record(json!({"Model": "B1", "Qty": ""})),
    ];
    let changes = reconcile(&source, &snapshot, &spec).unwrap();
    assert_eq!(changes.counts.matches, 2);

    client
        .batch_execute(r#"DROP TABLE IF EXISTS "public"."reconciler_store_test""#)
        .await
        .unwrap();
}

#[tokio::test]
#[ignore]
async fn test_mongodb_store_fetch() {
    let Ok(url) = env::var("TEST_MONGODB_URL") else {
        eprintln!("TEST_MONGODB_URL not set, skipping");
        return;
    };

    let client = mongodb::Client::with_uri_str(&url).await.unwrap();
    let collection = client
        .default_database()
        .expect("TEST_MONGODB_URL must name a database")
        .collection::<bson::Document>("reconciler_store_test");
    collection.drop().await.unwrap();
    collection
        .insert_many(vec![
            bson::doc! { "Model": "A1", "Qty": 5 },
            bson::doc! { "Model": "B1", "Qty": bson::Bson::Null },
        ])
        .await
        .unwrap();

    let store = connect_store(&url).await.unwrap();
    assert_eq!(store.kind(), StoreKind::MongoDb);
    let snapshot = with_store(store, |s| async move {
        s.fetch_records("reconciler_store_test").await
    })
    .await
    .unwrap();

    assert_eq!(snapshot.len(), 2);
    assert!(snapshot.iter().all(|r| r["_id"].is_string()));

    let spec = CompareSpec::new(KeySpec::new(["Model"]).unwrap())
        .with_identity_fields(vec!["_id".to_string()]);
    let source = vec![record(json!({"Model": "A1", "Qty": "5"}))];
    let changes = reconcile(&source, &snapshot, &spec).unwrap();
    assert_eq!(changes.counts.matches, 1);
    assert_eq!(changes.counts.deletions, 1);

    collection.drop().await.unwrap();
}
