// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Versioned payload envelope.
//!
//! Cached values and queued payloads outlive the build that wrote them. Each
//! one is wrapped with the schema version it was written under so a newer
//! build can refuse data it no longer understands instead of misreading it.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A payload tagged with the schema version it was serialized under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub schema_version: u32,
    pub payload: T,
}

impl<T> Envelope<T> {
    pub fn new(schema_version: u32, payload: T) -> Self {
        Envelope {
            schema_version,
            payload,
        }
    }

    /// Returns true if this envelope was written under `schema_version`.
    pub fn is_version(&self, schema_version: u32) -> bool {
        self.schema_version == schema_version
    }
}

impl Envelope<serde_json::Value> {
    /// Wrap any serializable value as a JSON envelope.
    pub fn encode<T: Serialize>(schema_version: u32, payload: &T) -> serde_json::Result<Self> {
        Ok(Envelope::new(schema_version, serde_json::to_value(payload)?))
    }

    /// Decode the payload, or `None` if the versions differ.
    pub fn decode<T: DeserializeOwned>(&self, schema_version: u32) -> Option<serde_json::Result<T>> {
        if !self.is_version(schema_version) {
            return None;
        }
        Some(serde_json::from_value(self.payload.clone()))
    }
}

#[cfg(test)]
#[path = "envelope_tests.rs"]
mod tests;
