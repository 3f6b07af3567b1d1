// /////////////////////////////////////////////////////////////////////////////
// Extract Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Schema Value Objects
//!
//! Value objects shared by the destination job client and the versioned
//! schema storage: warehouse column types, table descriptions, and the
//! version rows persisted alongside loaded data.
//!
//! These types sit at the boundary of the engine. The dispatcher never
//! inspects them; they describe what the destination side of an extraction
//! run stores and introspects.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Warehouse-level column data types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarehouseType {
    Text,
    Bigint,
    Double,
    Bool,
    Timestamp,
    Binary,
    Json,
}

impl WarehouseType {
    /// Canonical lowercase name, as stored in schema documents.
    pub fn as_str(&self) -> &'static str {
        match self {
            WarehouseType::Text => "text",
            WarehouseType::Bigint => "bigint",
            WarehouseType::Double => "double",
            WarehouseType::Bool => "bool",
            WarehouseType::Timestamp => "timestamp",
            WarehouseType::Binary => "binary",
            WarehouseType::Json => "json",
        }
    }
}

/// A single column of a destination table.
///
/// `unique` and `primary_key` are hints: they participate in `CREATE TABLE`
/// emission but may not be added through `ALTER TABLE` after the table
/// exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    pub data_type: WarehouseType,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub primary_key: bool,
}

fn default_nullable() -> bool {
    true
}

impl ColumnSchema {
    /// A nullable column with no hints.
    pub fn new(name: impl Into<String>, data_type: WarehouseType) -> Self {
        ColumnSchema {
            name: name.into(),
            data_type,
            nullable: true,
            unique: false,
            primary_key: false,
        }
    }

    /// Marks the column NOT NULL.
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Whether any hint is set that cannot be applied via `ALTER TABLE`.
    pub fn has_hints(&self) -> bool {
        self.unique || self.primary_key
    }
}

/// An ordered collection of columns belonging to one destination table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnSchema>,
}

impl TableSchema {
    pub fn new(name: impl Into<String>) -> Self {
        TableSchema { name: name.into(), columns: Vec::new() }
    }

    pub fn with_column(mut self, column: ColumnSchema) -> Self {
        self.columns.push(column);
        self
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }
}

/// One row of the schema version table kept next to loaded data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaVersionInfo {
    pub version_hash: String,
    pub schema_name: String,
    pub version: i64,
    pub engine_version: i64,
    pub inserted_at: DateTime<Utc>,
    /// The serialized schema document, decompressed if it was stored
    /// compressed.
    pub schema: String,
}
