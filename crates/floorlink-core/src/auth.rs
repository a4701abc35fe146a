// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! HMI login request and authorization reply types.
//!
//! The authorization service answers
//! `{"result":1,"displayName":"Bob","rights":{"mespoc":{"mespoc":{"User":"5"}}}}`.
//! Only `result == 1` approves; anything else, including a failed or garbled
//! response, takes the reject path.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AuthServiceError;

/// Result code written to the server on approval.
pub const AUTH_APPROVED: i16 = 8;

/// Result code written to the server on rejection.
pub const AUTH_REJECTED: i16 = 7;

/// Display name written on rejection.
pub const REJECTED_NAME: &str = "NA";

/// Credentials collected from the HMI.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct AuthRequest {
    /// Username with whitespace stripped.
    pub username: String,
    /// Password as entered.
    pub password: String,
    /// Service the user logs into.
    pub service: String,
}

impl std::fmt::Debug for AuthRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthRequest")
            .field("username", &self.username)
            .field("service", &self.service)
            .finish_non_exhaustive()
    }
}

/// A decoded authorization reply.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AuthReply {
    /// Service result code. `1` is the only success.
    pub result: i64,
    /// Display name of the user.
    pub display_name: String,
    /// Access level, `0` when absent or not numeric.
    pub access_level: i16,
}

#[derive(Deserialize)]
struct WireReply {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default, rename = "displayName")]
    display_name: Option<Value>,
    #[serde(default)]
    rights: Option<Value>,
}

impl AuthReply {
    /// Decodes a reply body.
    ///
    /// Missing fields default the way the service clients always have; only a
    /// body that is not a JSON object is malformed.
    pub fn from_json(body: &[u8]) -> Result<Self, AuthServiceError> {
        let wire: WireReply =
            serde_json::from_slice(body).map_err(|e| AuthServiceError::Malformed(e.to_string()))?;

        let access_level = wire
            .rights
            .as_ref()
            .and_then(|r| r.pointer("/mespoc/mespoc/User"))
            .and_then(number_like)
            .and_then(|n| i16::try_from(n).ok())
            .unwrap_or(0);

        Ok(Self {
            result: wire.result.as_ref().and_then(number_like).unwrap_or(0),
            display_name: wire.display_name.as_ref().map(text_like).unwrap_or_default(),
            access_level,
        })
    }

    /// Returns `true` if the service approved the login.
    #[inline]
    pub fn is_approved(&self) -> bool {
        self.result == 1
    }
}

fn number_like(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Strings as they are, null as empty, anything else as its JSON text.
fn text_like(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// The three attributes written back to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthOutcome {
    /// `8` approve or `7` reject.
    pub code: i16,
    /// Display name, `NA` on rejection.
    pub display_name: String,
    /// Access level, `0` on rejection.
    pub access_level: i16,
}

impl AuthOutcome {
    /// The rejection triple `(7, "NA", 0)`.
    pub fn rejected() -> Self {
        Self {
            code: AUTH_REJECTED,
            display_name: REJECTED_NAME.to_string(),
            access_level: 0,
        }
    }

    /// Maps a service response onto the written triple.
    pub fn from_response(response: &Result<AuthReply, AuthServiceError>) -> Self {
        match response {
            Ok(reply) if reply.is_approved() => Self {
                code: AUTH_APPROVED,
                display_name: reply.display_name.clone(),
                access_level: reply.access_level,
            },
            _ => Self::rejected(),
        }
    }

    /// Returns `true` for the approve code.
    #[inline]
    pub fn is_approved(&self) -> bool {
        self.code == AUTH_APPROVED
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_approved_reply() {
        let body = br#"{"result":1,"displayName":"Bob","rights":{"mespoc":{"mespoc":{"User":"5"}}}}"#;
        let reply = AuthReply::from_json(body).unwrap();
        assert!(reply.is_approved());
        assert_eq!(reply.access_level, 5);

        let outcome = AuthOutcome::from_response(&Ok(reply));
        assert_eq!(outcome.code, 8);
        assert_eq!(outcome.display_name, "Bob");
        assert_eq!(outcome.access_level, 5);
    }

    #[test]
    fn test_rejected_reply() {
        let reply = AuthReply::from_json(br#"{"result":0,"displayName":"Bob"}"#).unwrap();
        assert_eq!(AuthOutcome::from_response(&Ok(reply)), AuthOutcome::rejected());
    }

    #[test]
    fn test_missing_fields_default() {
        let reply = AuthReply::from_json(b"{}").unwrap();
        assert_eq!(reply, AuthReply::default());

        let reply = AuthReply::from_json(br#"{"result":"1","rights":{"mespoc":{"mespoc":{"User":"admin"}}}}"#).unwrap();
        assert!(reply.is_approved());
        assert_eq!(reply.access_level, 0);
    }

    #[test]
    fn test_non_string_display_name() {
        let reply = AuthReply::from_json(br#"{"result":1,"displayName":123}"#).unwrap();
        assert!(reply.is_approved());
        assert_eq!(AuthOutcome::from_response(&Ok(reply)).display_name, "123");

        let reply = AuthReply::from_json(br#"{"result":1,"displayName":null}"#).unwrap();
        assert_eq!(reply.display_name, "");
        let reply = AuthReply::from_json(br#"{"result":1,"displayName":true}"#).unwrap();
        assert_eq!(reply.display_name, "true");
    }

    #[test]
    fn test_service_error_takes_reject_path() {
        assert!(AuthReply::from_json(b"<html>").is_err());
        let outcome = AuthOutcome::from_response(&Err(AuthServiceError::Status(502)));
        assert_eq!(outcome, AuthOutcome::rejected());
        assert!(!outcome.is_approved());
    }
}
