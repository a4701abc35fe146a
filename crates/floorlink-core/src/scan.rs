// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Card scan results produced by the device poller.

use serde::{Deserialize, Serialize};

/// The outcome of one inventory/select/read cycle.
///
/// Transient: consumed by the router on arrival and never retained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardScan {
    /// `true` if the full cycle succeeded.
    pub valid: bool,
    /// Card serial number as upper-case hex. Empty when invalid.
    pub card_id: String,
    /// Raw block data, or the failure description when invalid.
    pub data: String,
}

impl CardScan {
    /// A successful read.
    pub fn valid(card_id: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            valid: true,
            card_id: card_id.into(),
            data: data.into(),
        }
    }

    /// A card was detected but the cycle failed.
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            card_id: String::new(),
            data: reason.into(),
        }
    }
}
