// /////////////////////////////////////////////////////////////////////////////
// Extract Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Schema Version Repository
//!
//! Bookkeeping tables kept next to loaded data: one row per stored schema
//! version and one row per completed load package.
//!
//! Oversized schema documents are stored zlib-compressed and base64-encoded;
//! reading back tries to decode and transparently falls back to the raw text
//! for rows that were stored uncompressed.

use std::io::{Read, Write};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use extract_pipeline_domain::entities::Schema;
use extract_pipeline_domain::value_objects::SchemaVersionInfo;
use extract_pipeline_domain::ExtractError;

/// Name of the schema version table.
pub const VERSION_TABLE_NAME: &str = "_extract_version";

/// Name of the completed loads table.
pub const LOADS_TABLE_NAME: &str = "_extract_loads";

/// Columns of the version table, in storage order.
pub const VERSION_TABLE_COLUMNS: &str =
    "version_hash, schema_name, version, engine_version, inserted_at, schema";

fn db_err(err: sqlx::Error) -> ExtractError {
    ExtractError::DatabaseError(err.to_string())
}

/// Repository over the version and loads tables.
pub struct SchemaVersionRepository {
    pool: SqlitePool,
}

impl SchemaVersionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SchemaVersionRepository { pool }
    }

    /// Creates the bookkeeping tables if they do not exist.
    pub async fn ensure_tables(&self) -> Result<(), ExtractError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS _extract_version (
                version_hash TEXT NOT NULL,
                schema_name TEXT NOT NULL,
                version INTEGER NOT NULL,
                engine_version INTEGER NOT NULL,
                inserted_at TEXT NOT NULL,
                schema TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS _extract_loads (
                load_id TEXT NOT NULL,
                schema_name TEXT,
                status INTEGER NOT NULL,
                inserted_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        debug!("schema bookkeeping tables ensured");
        Ok(())
    }

    /// Whether the version table exists.
    pub async fn tables_exist(&self) -> Result<bool, ExtractError> {
        let row = sqlx::query("SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?")
            .bind(VERSION_TABLE_NAME)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row.is_some())
    }

    /// Inserts a version row for `schema`, compressing the document when it
    /// exceeds `max_text_length`.
    pub async fn store_schema(
        &self,
        schema: &Schema,
        max_text_length: usize,
    ) -> Result<(), ExtractError> {
        let mut document = schema.to_json()?;
        if document.len() > max_text_length {
            document = compress_payload(&document)?;
        }
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO _extract_version (version_hash, schema_name, version, engine_version, inserted_at, schema) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(schema.version_hash())
        .bind(schema.name())
        .bind(schema.version())
        .bind(Schema::ENGINE_VERSION)
        .bind(&now)
        .bind(&document)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        debug!(schema = schema.name(), version = schema.version(), "stored schema version row");
        Ok(())
    }

    /// The newest stored version row for `schema_name`, if any.
    pub async fn newest_schema(
        &self,
        schema_name: &str,
    ) -> Result<Option<SchemaVersionInfo>, ExtractError> {
        let row = sqlx::query(
            "SELECT version_hash, schema_name, version, engine_version, inserted_at, schema \
             FROM _extract_version WHERE schema_name = ? ORDER BY inserted_at DESC LIMIT 1",
        )
        .bind(schema_name)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.map(row_to_info).transpose()
    }

    /// The stored version row with the given content hash, if any.
    pub async fn schema_by_hash(
        &self,
        version_hash: &str,
    ) -> Result<Option<SchemaVersionInfo>, ExtractError> {
        let row = sqlx::query(
            "SELECT version_hash, schema_name, version, engine_version, inserted_at, schema \
             FROM _extract_version WHERE version_hash = ?",
        )
        .bind(version_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.map(row_to_info).transpose()
    }

    /// Records the completion of a load package.
    pub async fn insert_load(
        &self,
        load_id: &str,
        schema_name: &str,
        status: i64,
    ) -> Result<(), ExtractError> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO _extract_loads (load_id, schema_name, status, inserted_at) VALUES (?, ?, ?, ?)",
        )
        .bind(load_id)
        .bind(schema_name)
        .bind(status)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    /// Number of completed load rows, for verification in tests and tooling.
    pub async fn load_count(&self) -> Result<i64, ExtractError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM _extract_loads")
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        row.try_get("n").map_err(db_err)
    }
}

fn compress_payload(document: &str) -> Result<String, ExtractError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(document.as_bytes())?;
    let compressed = encoder.finish()?;
    Ok(BASE64.encode(compressed))
}

/// Reverses [`compress_payload`]; rows stored uncompressed come back as-is.
fn decode_payload(stored: &str) -> String {
    let Ok(bytes) = BASE64.decode(stored) else {
        return stored.to_string();
    };
    let mut decoder = ZlibDecoder::new(bytes.as_slice());
    let mut document = String::new();
    match decoder.read_to_string(&mut document) {
        Ok(_) => document,
        Err(_) => stored.to_string(),
    }
}

fn row_to_info(row: sqlx::sqlite::SqliteRow) -> Result<SchemaVersionInfo, ExtractError> {
    let inserted_at: String = row.try_get("inserted_at").map_err(db_err)?;
    let inserted_at = DateTime::parse_from_rfc3339(&inserted_at)
        .map_err(|e| ExtractError::DatabaseError(format!("invalid inserted_at timestamp: {}", e)))?
        .with_timezone(&Utc);
    let stored: String = row.try_get("schema").map_err(db_err)?;
    Ok(SchemaVersionInfo {
        version_hash: row.try_get("version_hash").map_err(db_err)?,
        schema_name: row.try_get("schema_name").map_err(db_err)?,
        version: row.try_get("version").map_err(db_err)?,
        engine_version: row.try_get("engine_version").map_err(db_err)?,
        inserted_at,
        schema: decode_payload(&stored),
    })
}
