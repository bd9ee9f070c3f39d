/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Collection and field declarations, and the payload validation the record
//! store runs before admitting any operation. Payloads are otherwise opaque
//! to the engine; unknown extra fields pass through untouched so that newer
//! peers can ship fields we don't know about yet.

pub mod json;

use crate::error::*;
use crate::{JsonObject, JsonValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub use json::RawSchema;

/// The checked schema. Parsed from [`RawSchema`] (the JSON shape); the
/// conversions live in `json.rs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawSchema", into = "RawSchema")]
pub struct Schema {
    pub version: u32,
    pub collections: BTreeMap<String, CollectionSchema>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CollectionSchema {
    pub name: String,
    pub fields: Vec<Field>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub kind: FieldKind,
    pub required: bool,
}

/// The declarable field types, mapped onto the JSON value kinds. `timestamp`
/// is integer milliseconds; floats never participate in merge decisions so
/// this is purely a payload shape check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    String,
    Int,
    Float,
    Bool,
    Timestamp,
    Json,
}

impl FieldKind {
    fn admits(self, v: &JsonValue) -> bool {
        match self {
            FieldKind::String => v.is_string(),
            FieldKind::Int => v.is_i64() || v.is_u64(),
            FieldKind::Float => v.is_number(),
            FieldKind::Bool => v.is_boolean(),
            FieldKind::Timestamp => v.is_i64() || v.is_u64(),
            FieldKind::Json => true,
        }
    }
}

impl Schema {
    pub fn from_json_str(json: &str) -> Result<Schema> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_value(json: &JsonValue) -> Result<Schema> {
        Ok(serde_json::from_value(json.clone())?)
    }

    pub fn collection(&self, name: &str) -> Result<&CollectionSchema> {
        self.collections
            .get(name)
            .ok_or_else(|| Error::UnknownCollection(name.into()))
    }

    /// Checks a payload against a collection's declared fields. Required
    /// fields must be present and non-null; present fields must match their
    /// declared type; fields the schema doesn't know about are accepted.
    pub fn validate(&self, collection: &str, payload: &JsonObject) -> Result<()> {
        let coll = self.collection(collection)?;
        for field in &coll.fields {
            match payload.get(&field.name) {
                None | Some(JsonValue::Null) => {
                    if field.required {
                        throw!(Error::MissingRequiredField(field.name.clone()));
                    }
                }
                Some(v) => {
                    if !field.kind.admits(v) {
                        throw!(Error::TypeMismatch(field.name.clone()));
                    }
                }
            }
        }
        Ok(())
    }
}
