// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! HMI login handshake.
//!
//! ```text
//!            loginRequested 0->1
//!   Idle ─────────────────────────► AwaitingCredentials
//!    ▲                                    │ username + password ready
//!    │                                    ▼
//!    │                              RequestingAuth ── response ──► WritingResult
//!    │                                                                 │ all 3 acks ok
//!    │        autho_request := 0 acked                                 ▼
//!    └───────────────────────────────────────────────────────────── Releasing
//! ```
//!
//! A failed write leaves its flag false and the handshake stays where it is
//! until the automation session ends.

use std::mem;

use tracing::{debug, info, warn};

use super::Context;
use crate::auth::{AuthOutcome, AuthReply, AuthRequest};
use crate::error::AuthServiceError;
use crate::event::{Command, Notice};
use crate::readiness::{Flag, FlagEdge};
use crate::tag::TagKey;
use crate::telemetry::Telemetry;
use crate::types::{TagValue, WriteId};

const MIN_CREDENTIAL_LEN: usize = 2;

const LOGIN_FLAGS: [Flag; 6] = [
    Flag::LoginRequested,
    Flag::HmiUsernameReady,
    Flag::HmiPasswordReady,
    Flag::AuthCodeWritten,
    Flag::AuthNameWritten,
    Flag::AuthLevelWritten,
];

/// States of the login handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginState {
    /// No login in progress.
    Idle,
    /// Monitoring username and password.
    AwaitingCredentials,
    /// Waiting for the authorization service.
    RequestingAuth {
        /// Outstanding request.
        request_id: u64,
    },
    /// Waiting for the three result writes to ack.
    WritingResult {
        /// The written triple.
        outcome: AuthOutcome,
        /// Issued writes and the flag each ack sets.
        acks: Vec<(WriteId, Flag)>,
    },
    /// Waiting for the `autho_request := 0` ack.
    Releasing {
        /// The written triple.
        outcome: AuthOutcome,
        /// The reset write.
        write_id: WriteId,
    },
}

/// The HMI login handshake.
#[derive(Debug)]
pub struct LoginHandshake {
    state: LoginState,
    username: Option<String>,
    password: Option<String>,
    next_request_id: u64,
}

impl Default for LoginHandshake {
    fn default() -> Self {
        Self::new()
    }
}

impl LoginHandshake {
    /// Creates an idle handshake.
    pub fn new() -> Self {
        Self {
            state: LoginState::Idle,
            username: None,
            password: None,
            next_request_id: 0,
        }
    }

    /// Current state.
    pub fn state(&self) -> &LoginState {
        &self.state
    }

    /// Returns to idle and forgets credentials. Flags are reset by the caller.
    pub fn reset(&mut self) {
        if self.state != LoginState::Idle {
            debug!(state = ?self.state, "Login handshake reset");
        }
        self.state = LoginState::Idle;
        self.username = None;
        self.password = None;
    }

    /// `autho_request` changed.
    pub fn on_request_tag(&mut self, ctx: &mut Context, value: Option<i64>) {
        if value == Some(1) {
            ctx.set_flag(Flag::LoginRequested, true);
        } else {
            debug!(?value, "Login request tag cleared");
        }
    }

    /// `username` changed.
    pub fn on_username(&mut self, ctx: &mut Context, raw: Option<&str>) {
        if self.state != LoginState::AwaitingCredentials {
            debug!(state = ?self.state, "Username update ignored");
            return;
        }
        let stripped: String = raw.unwrap_or_default().chars().filter(|c| !c.is_whitespace()).collect();
        if stripped.chars().count() < MIN_CREDENTIAL_LEN {
            debug!("Username too short, waiting");
            return;
        }
        info!(username = %stripped, "HMI username received");
        self.username = Some(stripped);
        ctx.set_flag(Flag::HmiUsernameReady, true);
    }

    /// `password` changed.
    pub fn on_password(&mut self, ctx: &mut Context, raw: Option<&str>) {
        if self.state != LoginState::AwaitingCredentials {
            debug!(state = ?self.state, "Password update ignored");
            return;
        }
        let password = raw.unwrap_or_default();
        if password.chars().count() < MIN_CREDENTIAL_LEN {
            debug!("Password too short, waiting");
            return;
        }
        info!("HMI password received");
        self.password = Some(password.to_string());
        ctx.set_flag(Flag::HmiPasswordReady, true);
    }

    /// A subscribed flag changed.
    pub fn on_edge(&mut self, ctx: &mut Context, edge: FlagEdge) {
        if !edge.is_rising() {
            return;
        }
        match edge.flag {
            Flag::LoginRequested => self.begin(ctx),
            Flag::HmiUsernameReady | Flag::HmiPasswordReady => self.try_request(ctx),
            Flag::AuthCodeWritten | Flag::AuthNameWritten | Flag::AuthLevelWritten => {
                self.try_release(ctx)
            }
            _ => {}
        }
    }

    fn begin(&mut self, ctx: &mut Context) {
        if self.state != LoginState::Idle {
            debug!(state = ?self.state, "Login already in progress");
            return;
        }
        info!("HMI login requested");
        self.state = LoginState::AwaitingCredentials;
        self.username = None;
        self.password = None;
        ctx.set_monitoring(&[TagKey::Username, TagKey::Password], true);
        ctx.notify(Notice::LoginRequested);
    }

    fn try_request(&mut self, ctx: &mut Context) {
        if self.state != LoginState::AwaitingCredentials
            || !ctx.readiness.all(&[
                Flag::LoginRequested,
                Flag::HmiUsernameReady,
                Flag::HmiPasswordReady,
            ])
        {
            return;
        }
        let (Some(username), Some(password)) = (self.username.clone(), self.password.clone())
        else {
            return;
        };

        self.next_request_id += 1;
        let request_id = self.next_request_id;
        info!(request_id, username = %username, "Requesting authorization");
        self.state = LoginState::RequestingAuth { request_id };
        ctx.command(Command::RequestAuth {
            request_id,
            request: AuthRequest {
                username,
                password,
                service: ctx.config.auth_service.clone(),
            },
        });
    }

    /// The authorization service answered.
    pub fn on_auth_response(
        &mut self,
        ctx: &mut Context,
        request_id: u64,
        response: Result<AuthReply, AuthServiceError>,
    ) {
        match self.state {
            LoginState::RequestingAuth { request_id: expected } if expected == request_id => {}
            _ => {
                debug!(request_id, state = ?self.state, "Stale authorization response discarded");
                return;
            }
        }

        if let Err(e) = &response {
            warn!(request_id, error = %e, "Authorization failed, rejecting login");
        }
        let outcome = AuthOutcome::from_response(&response);
        info!(
            code = outcome.code,
            name = %outcome.display_name,
            level = outcome.access_level,
            "Writing authorization result"
        );
        ctx.notify(Notice::AuthResult(outcome.clone()));

        let issued = ctx.write(&[
            (TagKey::AuthApprove, TagValue::Int16(outcome.code)),
            (TagKey::AuthName, TagValue::String(outcome.display_name.clone())),
            (TagKey::AuthAccessLevel, TagValue::Int16(outcome.access_level)),
        ]);
        if issued.len() < 3 {
            warn!(issued = issued.len(), "Authorization result not fully written, login stalled");
        }
        let acks = issued
            .iter()
            .filter_map(|w| ack_flag(w.key).map(|flag| (w.id, flag)))
            .collect();
        self.state = LoginState::WritingResult { outcome, acks };
    }

    /// A login write was acked.
    pub fn on_write_ack(&mut self, ctx: &mut Context, id: WriteId, ok: bool) {
        let releasing = matches!(&self.state, LoginState::Releasing { write_id, .. } if *write_id == id);
        if releasing {
            if ok {
                self.finish(ctx);
            } else {
                warn!("Login request reset failed, login stalled");
            }
            return;
        }

        match &self.state {
            LoginState::WritingResult { acks, .. } => {
                let Some((_, flag)) = acks.iter().find(|(w, _)| *w == id).copied() else {
                    debug!(write_id = %id, "Ack for an earlier login ignored");
                    return;
                };
                if ok {
                    ctx.set_flag(flag, true);
                } else {
                    warn!(flag = flag.name(), "Authorization write failed, login stalled");
                }
            }
            state => debug!(write_id = %id, ?state, "Unexpected login ack ignored"),
        }
    }

    fn try_release(&mut self, ctx: &mut Context) {
        if !matches!(self.state, LoginState::WritingResult { .. })
            || !ctx.readiness.all(&Flag::AUTH_WRITTEN)
        {
            return;
        }
        let issued = ctx.write(&[(TagKey::AuthRequest, TagValue::Int16(0))]);
        let Some(reset) = issued.first() else {
            warn!("Login request reset not issued, login stalled");
            return;
        };
        if let LoginState::WritingResult { outcome, .. } = mem::replace(&mut self.state, LoginState::Idle) {
            self.state = LoginState::Releasing {
                outcome,
                write_id: reset.id,
            };
        }
    }

    fn finish(&mut self, ctx: &mut Context) {
        let LoginState::Releasing { outcome, .. } = mem::replace(&mut self.state, LoginState::Idle) else {
            return;
        };
        info!(approved = outcome.is_approved(), "HMI login handshake complete");
        self.username = None;
        self.password = None;
        ctx.set_monitoring(&[TagKey::Username, TagKey::Password], false);
        ctx.reset_flags(&LOGIN_FLAGS);
        ctx.notify(Notice::LoginCompleted {
            approved: outcome.is_approved(),
        });
        ctx.publish(Telemetry::Login(outcome));
    }
}

fn ack_flag(key: TagKey) -> Option<Flag> {
    match key {
        TagKey::AuthApprove => Some(Flag::AuthCodeWritten),
        TagKey::AuthName => Some(Flag::AuthNameWritten),
        TagKey::AuthAccessLevel => Some(Flag::AuthLevelWritten),
        _ => None,
    }
}
