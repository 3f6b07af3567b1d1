//! # Schema Storage Tests
//!
//! The destination side: version-row storage, compressed payload spillover,
//! DDL emission against a live database, and item loading.

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};

use extract_pipeline::infrastructure::repositories::SchemaVersionRepository;
use extract_pipeline::infrastructure::services::{SqlClientCapabilities, SqlJobClient};
use extract_pipeline_domain::entities::Schema;
use extract_pipeline_domain::services::DestinationJobClient;
use extract_pipeline_domain::value_objects::{ColumnSchema, TableSchema, WarehouseType};
use serde_json::json;

async fn pool() -> SqlitePool {
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory database")
}

fn events_schema() -> Schema {
    let mut schema = Schema::new("events");
    schema.set_table(
        TableSchema::new("clicks")
            .with_column(ColumnSchema::new("id", WarehouseType::Bigint).not_null())
            .with_column(ColumnSchema::new("url", WarehouseType::Text)),
    );
    schema
}

#[tokio::test]
async fn test_version_row_round_trip() {
    let pool = pool().await;
    let repository = SchemaVersionRepository::new(pool);
    repository.ensure_tables().await.unwrap();
    assert!(repository.tables_exist().await.unwrap());

    let schema = events_schema();
    repository.store_schema(&schema, 65_536).await.unwrap();

    let info = repository.newest_schema("events").await.unwrap().unwrap();
    assert_eq!(info.schema_name, "events");
    assert_eq!(info.version, schema.version());
    assert_eq!(info.version_hash, schema.version_hash());
    assert_eq!(info.engine_version, Schema::ENGINE_VERSION);
    assert_eq!(Schema::from_json(&info.schema).unwrap(), schema);

    let by_hash = repository.schema_by_hash(&schema.version_hash()).await.unwrap().unwrap();
    assert_eq!(by_hash, info);
    assert!(repository.schema_by_hash("missing").await.unwrap().is_none());
}

#[tokio::test]
async fn test_oversized_schema_is_stored_compressed() {
    let pool = pool().await;
    let repository = SchemaVersionRepository::new(pool.clone());
    repository.ensure_tables().await.unwrap();

    let schema = events_schema();
    // force the compression path with a tiny text limit
    repository.store_schema(&schema, 8).await.unwrap();

    // the raw stored payload is not the JSON document
    let row = sqlx::query("SELECT schema FROM _extract_version")
        .fetch_one(&pool)
        .await
        .unwrap();
    let stored: String = row.get("schema");
    assert_ne!(stored, schema.to_json().unwrap());

    // reading back transparently decompresses
    let info = repository.newest_schema("events").await.unwrap().unwrap();
    assert_eq!(Schema::from_json(&info.schema).unwrap(), schema);
}

#[tokio::test]
async fn test_job_client_creates_and_evolves_tables() {
    let pool = pool().await;
    let mut client =
        SqlJobClient::new(pool.clone(), events_schema(), SqlClientCapabilities::default());

    client.initialize_storage().await.unwrap();
    assert!(client.is_storage_initialized().await.unwrap());

    client.update_storage_schema().await.unwrap();
    let (exists, table) = client.get_storage_table("clicks").await.unwrap();
    assert!(exists);
    assert_eq!(table.columns.len(), 2);
    assert!(table.column("id").is_some());
    assert!(!table.column("id").unwrap().nullable);

    // a second update with the same schema stores nothing new
    client.update_storage_schema().await.unwrap();
    let versions: i64 = sqlx::query("SELECT COUNT(*) AS n FROM _extract_version")
        .fetch_one(&pool)
        .await
        .unwrap()
        .get("n");
    assert_eq!(versions, 1);

    // evolve: one more column triggers an ALTER and a new version row
    let mut evolved = events_schema();
    evolved.set_table(
        TableSchema::new("clicks")
            .with_column(ColumnSchema::new("id", WarehouseType::Bigint).not_null())
            .with_column(ColumnSchema::new("url", WarehouseType::Text))
            .with_column(ColumnSchema::new("referrer", WarehouseType::Text)),
    );
    let mut client =
        SqlJobClient::new(pool.clone(), evolved, SqlClientCapabilities::default());
    client.update_storage_schema().await.unwrap();
    let (_, table) = client.get_storage_table("clicks").await.unwrap();
    assert_eq!(table.columns.len(), 3);

    let versions: i64 = sqlx::query("SELECT COUNT(*) AS n FROM _extract_version")
        .fetch_one(&pool)
        .await
        .unwrap()
        .get("n");
    assert_eq!(versions, 2);
}

#[tokio::test]
async fn test_job_client_writes_items_and_completes_load() {
    let pool = pool().await;
    let mut client =
        SqlJobClient::new(pool.clone(), events_schema(), SqlClientCapabilities::default());
    client.initialize_storage().await.unwrap();
    client.update_storage_schema().await.unwrap();

    let items = vec![
        json!({"id": 1, "url": "https://example.com"}),
        json!({"id": 2, "url": null}),
        json!({"id": 3}),
    ];
    let written = client.write_items("clicks", &items).await.unwrap();
    assert_eq!(written, 3);

    let rows: i64 = sqlx::query("SELECT COUNT(*) AS n FROM \"clicks\"")
        .fetch_one(&pool)
        .await
        .unwrap()
        .get("n");
    assert_eq!(rows, 3);

    client.complete_load("load-1").await.unwrap();
    let repository = SchemaVersionRepository::new(pool);
    assert_eq!(repository.load_count().await.unwrap(), 1);

    // the newest stored schema matches the client schema
    let info = client.newest_stored_schema().await.unwrap().unwrap();
    assert_eq!(info.schema_name, "events");

    // unknown tables are refused
    assert!(client.write_items("missing", &[]).await.is_err());
}
