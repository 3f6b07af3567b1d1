// /////////////////////////////////////////////////////////////////////////////
// Extract Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Load Schema
//!
//! The schema a destination job client maintains for loaded data: a named,
//! versioned collection of table descriptions with a content hash used to
//! decide whether the stored schema needs an upgrade.

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::value_objects::{ColumnSchema, TableSchema};
use crate::ExtractError;

/// A named, versioned set of destination tables.
///
/// The version counts schema mutations; the version hash fingerprints the
/// table content, so two schemas with the same tables hash identically
/// regardless of how they were built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    name: String,
    version: i64,
    tables: BTreeMap<String, TableSchema>,
}

impl Schema {
    /// Version of the schema engine, stored next to every version row.
    pub const ENGINE_VERSION: i64 = 1;

    pub fn new(name: impl Into<String>) -> Self {
        Schema { name: name.into(), version: 1, tables: BTreeMap::new() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> i64 {
        self.version
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableSchema> {
        self.tables.values()
    }

    pub fn table_names(&self) -> Vec<String> {
        self.tables.keys().cloned().collect()
    }

    pub fn get_table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.get(name)
    }

    /// Adds or replaces a table and bumps the schema version.
    pub fn set_table(&mut self, table: TableSchema) {
        self.tables.insert(table.name.clone(), table);
        self.version += 1;
    }

    /// Columns of `table_name` that are missing from `existing`, in schema
    /// order. The destination client turns this delta into DDL.
    pub fn new_columns(&self, table_name: &str, existing: &TableSchema) -> Vec<ColumnSchema> {
        match self.tables.get(table_name) {
            Some(table) => table
                .columns
                .iter()
                .filter(|c| !existing.has_column(&c.name))
                .cloned()
                .collect(),
            None => Vec::new(),
        }
    }

    /// Content hash of the table definitions, as a base64 string.
    pub fn version_hash(&self) -> String {
        let mut hasher = Sha256::new();
        for (name, table) in &self.tables {
            hasher.update(name.as_bytes());
            for column in &table.columns {
                hasher.update(column.name.as_bytes());
                hasher.update(column.data_type.as_str().as_bytes());
                hasher.update([column.nullable as u8, column.unique as u8, column.primary_key as u8]);
            }
        }
        BASE64.encode(hasher.finalize())
    }

    /// Serializes the schema document to JSON.
    pub fn to_json(&self) -> Result<String, ExtractError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Restores a schema document from JSON.
    pub fn from_json(raw: &str) -> Result<Self, ExtractError> {
        Ok(serde_json::from_str(raw)?)
    }
}
