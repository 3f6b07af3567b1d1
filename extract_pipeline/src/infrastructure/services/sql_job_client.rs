// /////////////////////////////////////////////////////////////////////////////
// Extract Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # SQL Destination Job Client
//!
//! The destination side of an extraction run: consumes items yielded by the
//! driving iterator, keeps the destination tables in step with the source
//! schema, and records schema versions and completed loads in the
//! bookkeeping tables.
//!
//! ## Schema updates
//!
//! `update_storage_schema` looks up the current schema's content hash in the
//! version table. When it is absent, the client introspects each destination
//! table, computes the column delta against the source schema, emits
//! `CREATE TABLE` / `ALTER TABLE ADD COLUMN` statements, executes them in one
//! batch, and stores a new version row. Hint columns (unique, primary key)
//! can only be created with the table; a delta that needs a hint on an
//! existing table is refused.

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

use extract_pipeline_domain::entities::Schema;
use extract_pipeline_domain::services::DestinationJobClient;
use extract_pipeline_domain::value_objects::{
    ColumnSchema, DataItem, SchemaVersionInfo, TableSchema, WarehouseType,
};
use extract_pipeline_domain::ExtractError;

use crate::infrastructure::repositories::schema_version_repository::SchemaVersionRepository;

/// Destination capabilities that shape the emitted SQL.
#[derive(Debug, Clone)]
pub struct SqlClientCapabilities {
    /// Whether one `ALTER TABLE` may add several columns.
    pub alter_add_multi_column: bool,
    /// Longest text payload storable without compression.
    pub max_text_data_type_length: usize,
}

impl Default for SqlClientCapabilities {
    fn default() -> Self {
        // sqlite accepts one ADD COLUMN per statement
        SqlClientCapabilities { alter_add_multi_column: false, max_text_data_type_length: 65_536 }
    }
}

/// Quotes an identifier for the destination dialect.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Maps a warehouse type onto a destination column type.
pub fn to_db_type(data_type: WarehouseType) -> &'static str {
    match data_type {
        WarehouseType::Text => "TEXT",
        WarehouseType::Bigint => "INTEGER",
        WarehouseType::Double => "REAL",
        WarehouseType::Bool => "INTEGER",
        WarehouseType::Timestamp => "TEXT",
        WarehouseType::Binary => "BLOB",
        WarehouseType::Json => "TEXT",
    }
}

/// Maps an introspected destination column type back onto a warehouse type.
pub fn from_db_type(db_type: &str) -> WarehouseType {
    match db_type.to_ascii_uppercase().as_str() {
        "INTEGER" => WarehouseType::Bigint,
        "REAL" => WarehouseType::Double,
        "BLOB" => WarehouseType::Binary,
        _ => WarehouseType::Text,
    }
}

/// One column definition as it appears inside DDL.
fn column_def_sql(column: &ColumnSchema) -> String {
    let mut sql = format!("{} {}", quote_ident(&column.name), to_db_type(column.data_type));
    if column.primary_key {
        sql.push_str(" PRIMARY KEY");
    }
    if column.unique {
        sql.push_str(" UNIQUE");
    }
    if !column.nullable {
        sql.push_str(" NOT NULL");
    }
    sql
}

/// Builds the statement bringing `table_name` up to date: `CREATE TABLE`
/// when the table does not exist, `ALTER TABLE ADD COLUMN` otherwise.
///
/// Hint columns may only appear in `CREATE TABLE`; requesting one on an
/// existing table fails because the destination will not update it.
pub fn table_update_sql(
    table_name: &str,
    new_columns: &[ColumnSchema],
    generate_alter: bool,
    capabilities: &SqlClientCapabilities,
) -> Result<String, ExtractError> {
    let canonical_name = quote_ident(table_name);
    if !generate_alter {
        let defs: Vec<String> = new_columns.iter().map(column_def_sql).collect();
        return Ok(format!("CREATE TABLE {} (\n{}\n);", canonical_name, defs.join(",\n")));
    }

    if let Some(hinted) = new_columns.iter().find(|c| c.has_hints()) {
        return Err(ExtractError::DatabaseError(format!(
            "table {} will not update: hints on column {} were requested after the table was created",
            canonical_name, hinted.name
        )));
    }

    let additions: Vec<String> = new_columns
        .iter()
        .map(|c| format!("ADD COLUMN {}", column_def_sql(c)))
        .collect();
    let sql = if capabilities.alter_add_multi_column {
        format!("ALTER TABLE {}\n{};", canonical_name, additions.join(",\n"))
    } else {
        // one statement per column for destinations that cannot batch
        additions
            .iter()
            .map(|a| format!("ALTER TABLE {} {};", canonical_name, a))
            .collect::<Vec<_>>()
            .join("\n")
    };
    Ok(sql)
}

/// A destination job client over a SQL pool.
pub struct SqlJobClient {
    pool: SqlitePool,
    schema: Schema,
    capabilities: SqlClientCapabilities,
    repository: SchemaVersionRepository,
}

impl SqlJobClient {
    pub fn new(pool: SqlitePool, schema: Schema, capabilities: SqlClientCapabilities) -> Self {
        let repository = SchemaVersionRepository::new(pool.clone());
        SqlJobClient { pool, schema, capabilities, repository }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Introspects a destination table. Returns whether it exists and its
    /// current column layout.
    pub async fn get_storage_table(
        &self,
        table_name: &str,
    ) -> Result<(bool, TableSchema), ExtractError> {
        let pragma = format!("PRAGMA table_info({})", quote_ident(table_name));
        let rows = sqlx::query(&pragma)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| ExtractError::DatabaseError(e.to_string()))?;

        let mut table = TableSchema::new(table_name);
        for row in &rows {
            let name: String = row
                .try_get("name")
                .map_err(|e| ExtractError::DatabaseError(e.to_string()))?;
            let db_type: String = row
                .try_get("type")
                .map_err(|e| ExtractError::DatabaseError(e.to_string()))?;
            let not_null: i64 = row
                .try_get("notnull")
                .map_err(|e| ExtractError::DatabaseError(e.to_string()))?;
            let mut column = ColumnSchema::new(name, from_db_type(&db_type));
            column.nullable = not_null == 0;
            table.columns.push(column);
        }
        Ok((!rows.is_empty(), table))
    }

    /// Emits the DDL bringing every destination table up to date with the
    /// client's schema, in schema order.
    pub async fn build_schema_update_sql(&self) -> Result<Vec<String>, ExtractError> {
        let mut statements = Vec::new();
        for table_name in self.schema.table_names() {
            let (exists, storage_table) = self.get_storage_table(&table_name).await?;
            let new_columns = self.schema.new_columns(&table_name, &storage_table);
            info!(
                table = %table_name,
                updates = new_columns.len(),
                "computed schema delta for table"
            );
            if !new_columns.is_empty() {
                statements.push(table_update_sql(
                    &table_name,
                    &new_columns,
                    exists,
                    &self.capabilities,
                )?);
            }
        }
        Ok(statements)
    }

    async fn execute_schema_update_sql(&self) -> Result<(), ExtractError> {
        let updates = self.build_schema_update_sql().await?;
        for statement in &updates {
            // a statement may carry several per-column ALTERs
            for single in statement.split(';').map(str::trim).filter(|s| !s.is_empty()) {
                sqlx::query(single)
                    .execute(&self.pool)
                    .await
                    .map_err(|e| ExtractError::DatabaseError(e.to_string()))?;
            }
        }
        self.repository
            .store_schema(&self.schema, self.capabilities.max_text_data_type_length)
            .await
    }
}

#[async_trait]
impl DestinationJobClient for SqlJobClient {
    async fn initialize_storage(&mut self) -> Result<(), ExtractError> {
        if !self.is_storage_initialized().await? {
            self.repository.ensure_tables().await?;
        }
        Ok(())
    }

    async fn is_storage_initialized(&mut self) -> Result<bool, ExtractError> {
        self.repository.tables_exist().await
    }

    async fn update_storage_schema(&mut self) -> Result<(), ExtractError> {
        let hash = self.schema.version_hash();
        match self.repository.schema_by_hash(&hash).await? {
            None => {
                info!(schema = self.schema.name(), %hash, "schema not found in storage, upgrading");
                self.execute_schema_update_sql().await
            }
            Some(found) => {
                info!(
                    schema = self.schema.name(),
                    inserted_at = %found.inserted_at,
                    "schema found in storage, no upgrade required"
                );
                Ok(())
            }
        }
    }

    async fn write_items(&mut self, table: &str, items: &[DataItem]) -> Result<u64, ExtractError> {
        let table_schema = self
            .schema
            .get_table(table)
            .ok_or_else(|| {
                ExtractError::DatabaseError(format!("table '{}' is not part of the schema", table))
            })?
            .clone();
        if table_schema.columns.is_empty() {
            return Err(ExtractError::DatabaseError(format!(
                "table '{}' has no columns to write",
                table
            )));
        }

        let column_list: Vec<String> =
            table_schema.columns.iter().map(|c| quote_ident(&c.name)).collect();
        let placeholders: Vec<&str> = table_schema.columns.iter().map(|_| "?").collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(table),
            column_list.join(", "),
            placeholders.join(", ")
        );

        let mut written = 0u64;
        for item in items {
            let mut query = sqlx::query(&sql);
            for column in &table_schema.columns {
                let value = item.get(&column.name).cloned().unwrap_or(serde_json::Value::Null);
                query = match value {
                    serde_json::Value::Null => query.bind(None::<String>),
                    serde_json::Value::Bool(b) => query.bind(b),
                    serde_json::Value::Number(n) if n.is_i64() => query.bind(n.as_i64()),
                    serde_json::Value::Number(n) => query.bind(n.as_f64()),
                    serde_json::Value::String(s) => query.bind(s),
                    other => query.bind(other.to_string()),
                };
            }
            query
                .execute(&self.pool)
                .await
                .map_err(|e| ExtractError::DatabaseError(e.to_string()))?;
            written += 1;
        }
        debug!(table, rows = written, "wrote extracted items");
        Ok(written)
    }

    async fn newest_stored_schema(&mut self) -> Result<Option<SchemaVersionInfo>, ExtractError> {
        self.repository.newest_schema(self.schema.name()).await
    }

    async fn complete_load(&mut self, load_id: &str) -> Result<(), ExtractError> {
        self.repository.insert_load(load_id, self.schema.name(), 0).await
    }
}
