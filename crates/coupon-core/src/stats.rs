// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Keyed integer counters stored in the `item_stats` table.
//!
//! Backends read the current value inside a transaction, call [`resolve`],
//! and then insert or update. The compare-and-set here is the only mutual
//! exclusion used for schema version and phase transitions.

use crate::error::StatError;

/// Join key words with `/`.
pub fn general_key(words: &[&str]) -> String {
    words.join("/")
}

/// `<words>#version`: last fully applied schema version.
pub fn version_key(words: &[&str]) -> String {
    format!("{}#version", general_key(words))
}

/// `<words>#phase`: 0 serving, 1 upgrading.
pub fn phase_key(words: &[&str]) -> String {
    format!("{}#phase", general_key(words))
}

/// How the new value is derived from the old one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StatMode {
    /// Replace with the given value.
    Set,
    /// Add the given delta.
    Add,
}

/// What the backend must write after [`resolve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StatWrite {
    /// No row existed: insert this value.
    Insert(i64),
    /// A row existed: overwrite with this value.
    Update(i64),
}

impl StatWrite {
    pub(crate) fn value(self) -> i64 {
        match self {
            Self::Insert(v) | Self::Update(v) => v,
        }
    }
}

/// Decide the write for `key` given its current value.
///
/// A missing row counts as 0 only when the expected value is 0. A missing row
/// cannot be initialized to a negative value.
pub(crate) fn resolve(
    key: &str,
    current: Option<i64>,
    value: i64,
    expected: Option<i64>,
    mode: StatMode,
) -> Result<StatWrite, StatError> {
    match current {
        None => {
            if let Some(expected) = expected
                && expected != 0
            {
                return Err(StatError::StaleCompareAndSet {
                    key: key.to_string(),
                    expected,
                    actual: None,
                });
            }
            if value < 0 {
                return Err(StatError::NegativeInitial {
                    key: key.to_string(),
                    value,
                });
            }
            Ok(StatWrite::Insert(value))
        }
        Some(stored) => {
            if let Some(expected) = expected
                && expected != stored
            {
                return Err(StatError::StaleCompareAndSet {
                    key: key.to_string(),
                    expected,
                    actual: Some(stored),
                });
            }
            let next = match mode {
                StatMode::Set => value,
                StatMode::Add => stored + value,
            };
            Ok(StatWrite::Update(next))
        }
    }
}
