/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Collection {0:?} is not declared in the schema")]
    UnknownCollection(String),

    #[error("Required field {0:?} is missing or null")]
    MissingRequiredField(String),

    #[error("Field {0:?} does not match its declared type")]
    TypeMismatch(String),

    #[error("No such record")]
    NotFound,

    #[error("A live record with this id already exists")]
    AlreadyExists,

    #[error("Operation expected version {expected} but the record is at version {actual}")]
    VersionMismatch { expected: u64, actual: u64 },

    #[error("Malformed value: {0}")]
    Malformed(String),

    #[error("Unsupported snapshot format version: {0}")]
    UnsupportedFormat(u32),

    #[error("Invariant violation: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Malformed(e.to_string())
    }
}
