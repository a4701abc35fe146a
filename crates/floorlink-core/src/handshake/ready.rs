// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Gateway-ready aggregation: all three sessions connected.

use tracing::info;

use super::Context;
use crate::event::Notice;
use crate::readiness::{Flag, FlagEdge};

/// Derived readiness of the whole gateway.
#[derive(Debug, Default)]
pub struct GatewayReady {
    ready: bool,
}

impl GatewayReady {
    /// Creates a not-ready aggregate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value.
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Recomputes on any connection edge.
    pub fn on_edge(&mut self, ctx: &mut Context, _edge: FlagEdge) {
        let ready = ctx.readiness.all(&Flag::CONNECTIONS);
        if ready != self.ready {
            self.ready = ready;
            info!(ready, "Gateway readiness changed");
            ctx.notify(Notice::GatewayReady { ready });
        }
    }
}
