// /////////////////////////////////////////////////////////////////////////////
// Extract Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # JSON Codec Helpers
//!
//! One place for the JSON encodings used around the engine: schema documents,
//! load manifests, and item payload dumps. Supports deterministic output
//! (`sort_keys`) and pretty printing, writing to strings, byte buffers, or
//! `io` streams.

use std::io::{Read, Write};

use serde_json::Value;

use extract_pipeline_domain::ExtractError;

/// Serializes `value` to a string.
pub fn dumps(value: &Value, sort_keys: bool, pretty: bool) -> Result<String, ExtractError> {
    let value = normalized(value, sort_keys);
    let out = if pretty {
        serde_json::to_string_pretty(&value)?
    } else {
        serde_json::to_string(&value)?
    };
    Ok(out)
}

/// Serializes `value` to a byte buffer.
pub fn dumpb(value: &Value, sort_keys: bool, pretty: bool) -> Result<Vec<u8>, ExtractError> {
    Ok(dumps(value, sort_keys, pretty)?.into_bytes())
}

/// Serializes `value` into a writer.
pub fn dump<W: Write>(
    writer: &mut W,
    value: &Value,
    sort_keys: bool,
    pretty: bool,
) -> Result<(), ExtractError> {
    let value = normalized(value, sort_keys);
    if pretty {
        serde_json::to_writer_pretty(writer, &value)?;
    } else {
        serde_json::to_writer(writer, &value)?;
    }
    Ok(())
}

/// Parses a JSON string.
pub fn loads(raw: &str) -> Result<Value, ExtractError> {
    Ok(serde_json::from_str(raw)?)
}

/// Parses a JSON byte slice.
pub fn loadb(raw: &[u8]) -> Result<Value, ExtractError> {
    Ok(serde_json::from_slice(raw)?)
}

/// Parses JSON from a reader.
pub fn load<R: Read>(reader: R) -> Result<Value, ExtractError> {
    Ok(serde_json::from_reader(reader)?)
}

/// Recursively rebuilds objects with keys in lexicographic order when
/// `sort_keys` is set; arrays keep their element order.
fn normalized(value: &Value, sort_keys: bool) -> Value {
    if !sort_keys {
        return value.clone();
    }
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.clone(), normalized(v, true)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(|v| normalized(v, true)).collect()),
        other => other.clone(),
    }
}
