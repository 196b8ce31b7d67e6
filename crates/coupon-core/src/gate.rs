// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Process-wide serving gate.
//!
//! Only the upgrader writes the gate; everything else reads it before touching
//! the database.

use std::sync::atomic::{AtomicI8, Ordering};

/// Serving phase of this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Startup has not finished the upgrade check.
    Unknown,
    /// Requests may be served.
    Serving,
    /// An upgrade step is running.
    Upgrading,
}

impl Phase {
    fn to_raw(self) -> i8 {
        match self {
            Self::Unknown => -1,
            Self::Serving => 0,
            Self::Upgrading => 1,
        }
    }

    fn from_raw(raw: i8) -> Self {
        match raw {
            0 => Self::Serving,
            1 => Self::Upgrading,
            _ => Self::Unknown,
        }
    }

    /// Lowercase name, as reported by the health endpoint.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Serving => "serving",
            Self::Upgrading => "upgrading",
        }
    }
}

/// Atomic phase flag shared by the supervisor and the upgrader.
#[derive(Debug)]
pub struct ServingGate {
    phase: AtomicI8,
}

impl Default for ServingGate {
    fn default() -> Self {
        Self::new()
    }
}

impl ServingGate {
    /// New gate in [`Phase::Unknown`].
    pub fn new() -> Self {
        Self {
            phase: AtomicI8::new(Phase::Unknown.to_raw()),
        }
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        Phase::from_raw(self.phase.load(Ordering::Acquire))
    }

    /// Whether requests may be served.
    pub fn is_serving(&self) -> bool {
        self.phase() == Phase::Serving
    }

    pub(crate) fn set(&self, phase: Phase) {
        self.phase.store(phase.to_raw(), Ordering::Release);
    }
}
