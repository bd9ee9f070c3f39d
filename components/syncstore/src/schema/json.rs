/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! The serialized representation of the schema, as hosts hand it to
//! `SyncEngine::new` and as it is embedded in snapshots. Parsing into the
//! checked form (and the checks themselves) live in `schema/mod.rs`.
//!
//! Important: changes to this are in general not allowed to fail to parse
//! older versions of this format.

use super::{CollectionSchema, Field, FieldKind, Schema};
use crate::error::*;
use crate::util::is_default;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSchema {
    /// The schema version. A single number; there are no migrations beyond
    /// replacing the whole schema.
    pub version: u32,
    /// Collections keyed by name. The value may repeat the name; if it does,
    /// it must match the key.
    pub collections: BTreeMap<String, RawCollection>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawCollection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub fields: Vec<RawField>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawField {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: FieldKind,
    #[serde(default, skip_serializing_if = "is_default")]
    pub required: bool,
}

impl TryFrom<RawSchema> for Schema {
    type Error = Error;

    fn try_from(raw: RawSchema) -> Result<Schema> {
        let mut collections = BTreeMap::new();
        for (key, coll) in raw.collections {
            if key.is_empty() {
                throw!(Error::Malformed("collection name may not be empty".into()));
            }
            if let Some(name) = &coll.name {
                if name != &key {
                    throw!(Error::Malformed(format!(
                        "collection {:?} declares mismatched name {:?}",
                        key, name
                    )));
                }
            }
            let mut seen = BTreeSet::new();
            let mut fields = Vec::with_capacity(coll.fields.len());
            for f in coll.fields {
                if f.name.is_empty() {
                    throw!(Error::Malformed(format!(
                        "collection {:?} has a field with an empty name",
                        key
                    )));
                }
                if !seen.insert(f.name.clone()) {
                    throw!(Error::Malformed(format!(
                        "collection {:?} declares field {:?} twice",
                        key, f.name
                    )));
                }
                fields.push(Field {
                    name: f.name,
                    kind: f.kind,
                    required: f.required,
                });
            }
            collections.insert(
                key.clone(),
                CollectionSchema {
                    name: key,
                    fields,
                },
            );
        }
        Ok(Schema {
            version: raw.version,
            collections,
        })
    }
}

impl From<Schema> for RawSchema {
    fn from(schema: Schema) -> RawSchema {
        RawSchema {
            version: schema.version,
            collections: schema
                .collections
                .into_iter()
                .map(|(key, coll)| {
                    (
                        key,
                        RawCollection {
                            name: Some(coll.name),
                            fields: coll
                                .fields
                                .into_iter()
                                .map(|f| RawField {
                                    name: f.name,
                                    kind: f.kind,
                                    required: f.required,
                                })
                                .collect(),
                        },
                    )
                })
                .collect(),
        }
    }
}
