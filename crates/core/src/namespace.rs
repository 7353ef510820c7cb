// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Namespace identifiers and the DAG safe-name mapping.
//!
//! A namespace is a 4-hex-char id that partitions every on-disk path:
//! `dags/<ns>/…`, `data/ns/<ns>/…`, `logs/ns/<ns>/…`. The id is derived
//! from the namespace name so independent hosts agree without a registry.

use sha2::{Digest, Sha256};
use thiserror::Error;

/// Length of a namespace id in hex characters.
pub const NAMESPACE_ID_LEN: usize = 4;

/// Name of the implicit namespace that legacy layouts migrate into.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Errors from namespace-id validation
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NamespaceError {
    #[error("namespace id must be {NAMESPACE_ID_LEN} lowercase hex characters, got {0:?}")]
    InvalidId(String),
}

/// A namespace identifier (4 lowercase hex chars).
#[derive(Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Namespace(String);

impl Namespace {
    /// Derive the namespace id from a human-readable name.
    pub fn from_name(name: &str) -> Self {
        let digest = Sha256::digest(name.as_bytes());
        let hex: String = digest
            .iter()
            .take(NAMESPACE_ID_LEN.div_ceil(2))
            .map(|b| format!("{b:02x}"))
            .collect();
        Self(hex[..NAMESPACE_ID_LEN].to_string())
    }

    /// Wrap an existing id, validating the 4-hex-char shape.
    pub fn from_id(id: impl Into<String>) -> Result<Self, NamespaceError> {
        let id = id.into();
        if !is_valid_id(&id) {
            return Err(NamespaceError::InvalidId(id));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Namespace {
    fn default() -> Self {
        Self::from_name(DEFAULT_NAMESPACE)
    }
}

impl std::fmt::Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl AsRef<str> for Namespace {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Check whether a string is a well-formed namespace id.
pub fn is_valid_id(s: &str) -> bool {
    s.len() == NAMESPACE_ID_LEN && s.chars().all(|c| c.is_ascii_hexdigit() && !c.is_uppercase())
}

/// Map a DAG name to an ASCII-safe filesystem name.
///
/// Filesystem-illegal characters are replaced with `_`; everything in
/// `[A-Za-z0-9._-]` passes through unchanged.
pub fn safe_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
#[path = "namespace_tests.rs"]
mod tests;
