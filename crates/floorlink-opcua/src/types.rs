// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA node identifiers and client settings.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use floorlink_core::types::NodeAddress;

use crate::error::{ConfigurationError, OpcUaError, OpcUaResult};

// =============================================================================
// NodeId
// =============================================================================

/// Identifier part of a [`NodeId`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeIdentifier {
    /// `i=`
    Numeric(u32),
    /// `s=`
    String(String),
    /// `g=`
    Guid(Uuid),
    /// `b=`, base64 on the wire.
    Opaque(Vec<u8>),
}

/// An OPC UA node identifier.
///
/// Tag addresses are node ids in their string form, so a [`NodeAddress`]
/// converts into a `NodeId` by parsing and back by formatting.
///
/// # Examples
///
/// ```
/// use floorlink_opcua::NodeId;
///
/// let id: NodeId = "ns=2;s=|var|PLC.Application.GVL.job_request".parse().unwrap();
/// assert_eq!(id.namespace_index, 2);
/// assert_eq!(id.to_string(), "ns=2;s=|var|PLC.Application.GVL.job_request");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeId {
    /// Namespace index.
    pub namespace_index: u16,
    /// Identifier within the namespace.
    pub identifier: NodeIdentifier,
}

impl NodeId {
    /// Creates a numeric node id.
    pub fn numeric(namespace_index: u16, value: u32) -> Self {
        Self {
            namespace_index,
            identifier: NodeIdentifier::Numeric(value),
        }
    }

    /// Creates a string node id.
    pub fn string(namespace_index: u16, value: impl Into<String>) -> Self {
        Self {
            namespace_index,
            identifier: NodeIdentifier::String(value.into()),
        }
    }

    /// Parses a tag address.
    pub fn from_address(address: &NodeAddress) -> OpcUaResult<Self> {
        address.as_str().parse()
    }

    /// Formats this id as a tag address.
    pub fn to_address(&self) -> NodeAddress {
        NodeAddress::new(self.to_string())
    }
}

fn invalid(input: &str, reason: impl Into<String>) -> OpcUaError {
    OpcUaError::configuration(ConfigurationError::invalid_node_id(input, reason))
}

impl FromStr for NodeId {
    type Err = OpcUaError;

    /// Parses `ns=<n>;<kind>=<value>` or `<kind>=<value>` (namespace 0).
    ///
    /// String identifiers may themselves contain `;` and `=`; only the first
    /// `;` separates the namespace.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();

        let (namespace_index, identifier_part) = match s.strip_prefix("ns=") {
            Some(rest) => {
                let (ns, id) = rest
                    .split_once(';')
                    .ok_or_else(|| invalid(s, "Missing identifier after namespace"))?;
                let ns: u16 = ns.parse().map_err(|_| invalid(s, "Invalid namespace index"))?;
                (ns, id)
            }
            None => (0, s),
        };

        let identifier = if let Some(id) = identifier_part.strip_prefix("i=") {
            NodeIdentifier::Numeric(id.parse().map_err(|_| invalid(s, "Invalid numeric identifier"))?)
        } else if let Some(id) = identifier_part.strip_prefix("s=") {
            if id.is_empty() {
                return Err(invalid(s, "Empty string identifier"));
            }
            NodeIdentifier::String(id.to_string())
        } else if let Some(id) = identifier_part.strip_prefix("g=") {
            NodeIdentifier::Guid(Uuid::parse_str(id).map_err(|e| invalid(s, format!("Invalid GUID: {e}")))?)
        } else if let Some(id) = identifier_part.strip_prefix("b=") {
            NodeIdentifier::Opaque(BASE64.decode(id).map_err(|e| invalid(s, format!("Invalid base64: {e}")))?)
        } else {
            return Err(invalid(s, "Unknown identifier type. Expected i=, s=, g=, or b="));
        };

        Ok(Self {
            namespace_index,
            identifier,
        })
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // String ids always carry the namespace, the form tag addresses use.
        if self.namespace_index != 0 || matches!(self.identifier, NodeIdentifier::String(_)) {
            write!(f, "ns={};", self.namespace_index)?;
        }
        match &self.identifier {
            NodeIdentifier::Numeric(v) => write!(f, "i={v}"),
            NodeIdentifier::String(v) => write!(f, "s={v}"),
            NodeIdentifier::Guid(v) => write!(f, "g={v}"),
            NodeIdentifier::Opaque(v) => write!(f, "b={}", BASE64.encode(v)),
        }
    }
}

// =============================================================================
// Security
// =============================================================================

/// Message security mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityMode {
    /// Neither signed nor encrypted.
    #[default]
    None,
    /// Signed.
    Sign,
    /// Signed and encrypted.
    SignAndEncrypt,
}

impl FromStr for SecurityMode {
    type Err = OpcUaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "none" => Ok(Self::None),
            "sign" => Ok(Self::Sign),
            "signandencrypt" => Ok(Self::SignAndEncrypt),
            _ => Err(OpcUaError::configuration(ConfigurationError::InvalidValue {
                field: "security_mode",
                reason: format!("unknown mode '{s}'"),
            })),
        }
    }
}

impl fmt::Display for SecurityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::Sign => write!(f, "Sign"),
            Self::SignAndEncrypt => write!(f, "SignAndEncrypt"),
        }
    }
}

/// Security policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SecurityPolicy {
    /// No security.
    #[default]
    None,
    /// Basic256Sha256.
    Basic256Sha256,
    /// Aes128_Sha256_RsaOaep.
    Aes128Sha256RsaOaep,
    /// Aes256_Sha256_RsaPss.
    Aes256Sha256RsaPss,
}

impl SecurityPolicy {
    /// Returns the policy URI.
    pub const fn uri(&self) -> &'static str {
        match self {
            Self::None => "http://opcfoundation.org/UA/SecurityPolicy#None",
            Self::Basic256Sha256 => "http://opcfoundation.org/UA/SecurityPolicy#Basic256Sha256",
            Self::Aes128Sha256RsaOaep => "http://opcfoundation.org/UA/SecurityPolicy#Aes128_Sha256_RsaOaep",
            Self::Aes256Sha256RsaPss => "http://opcfoundation.org/UA/SecurityPolicy#Aes256_Sha256_RsaPss",
        }
    }
}

impl FromStr for SecurityPolicy {
    type Err = OpcUaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "none" => Ok(Self::None),
            "basic256sha256" => Ok(Self::Basic256Sha256),
            "aes128sha256rsaoaep" => Ok(Self::Aes128Sha256RsaOaep),
            "aes256sha256rsapss" => Ok(Self::Aes256Sha256RsaPss),
            _ => Err(OpcUaError::configuration(ConfigurationError::InvalidValue {
                field: "security_policy",
                reason: format!("unknown policy '{s}'"),
            })),
        }
    }
}

impl fmt::Display for SecurityPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let uri = self.uri();
        f.write_str(uri.rsplit('#').next().unwrap_or(uri))
    }
}

/// How the client identifies its user.
#[derive(Clone, PartialEq, Eq, Default)]
pub enum UserToken {
    /// Anonymous.
    #[default]
    Anonymous,
    /// Username and password.
    UserName {
        /// The username.
        username: String,
        /// The password.
        password: String,
    },
}

impl fmt::Debug for UserToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anonymous => f.write_str("Anonymous"),
            Self::UserName { username, .. } => f
                .debug_struct("UserName")
                .field("username", username)
                .field("password", &"***")
                .finish(),
        }
    }
}

// =============================================================================
// OpcUaConfig
// =============================================================================

/// Client settings for one automation-server session.
#[derive(Debug, Clone)]
pub struct OpcUaConfig {
    /// Server endpoint, `opc.tcp://host:port[/path]`.
    pub endpoint: String,
    /// Application name announced to the server.
    pub application_name: String,
    /// Application URI announced to the server.
    pub application_uri: String,
    /// Message security mode.
    pub security_mode: SecurityMode,
    /// Security policy.
    pub security_policy: SecurityPolicy,
    /// User identity.
    pub user_token: UserToken,
    /// Requested session timeout.
    pub session_timeout: Duration,
    /// Session retry limit inside the client stack.
    pub max_retries: u32,
    /// Directory holding the client PKI.
    pub pki_dir: String,
    /// Trust unknown server certificates.
    pub trust_server_certs: bool,
    /// Subscription publishing interval.
    pub publishing_interval: Duration,
    /// Monitored item sampling interval.
    pub sampling_interval: Duration,
    /// Subscription keep-alive count.
    pub keepalive_count: u32,
    /// Subscription lifetime count.
    pub lifetime_count: u32,
}

impl Default for OpcUaConfig {
    fn default() -> Self {
        Self {
            endpoint: "opc.tcp://localhost:4840".to_string(),
            application_name: "floorlink".to_string(),
            application_uri: "urn:floorlink:gateway".to_string(),
            security_mode: SecurityMode::None,
            security_policy: SecurityPolicy::None,
            user_token: UserToken::Anonymous,
            session_timeout: Duration::from_secs(60),
            max_retries: 0,
            pki_dir: "./pki".to_string(),
            trust_server_certs: true,
            publishing_interval: Duration::from_millis(100),
            sampling_interval: Duration::from_millis(100),
            keepalive_count: 10,
            lifetime_count: 30,
        }
    }
}

impl OpcUaConfig {
    /// Starts a builder for `endpoint`.
    pub fn builder(endpoint: impl Into<String>) -> OpcUaConfigBuilder {
        OpcUaConfigBuilder {
            config: OpcUaConfig {
                endpoint: endpoint.into(),
                ..OpcUaConfig::default()
            },
        }
    }

    /// Checks the settings for consistency.
    pub fn validate(&self) -> OpcUaResult<()> {
        if !self.endpoint.starts_with("opc.tcp://") || self.endpoint.len() <= "opc.tcp://".len() {
            return Err(OpcUaError::configuration(ConfigurationError::InvalidEndpoint {
                url: self.endpoint.clone(),
                reason: "expected opc.tcp://host:port".to_string(),
            }));
        }
        if (self.security_mode == SecurityMode::None) != (self.security_policy == SecurityPolicy::None) {
            return Err(OpcUaError::configuration(ConfigurationError::InvalidValue {
                field: "security_policy",
                reason: format!(
                    "mode {} cannot be combined with policy {}",
                    self.security_mode, self.security_policy
                ),
            }));
        }
        if self.sampling_interval.is_zero() || self.publishing_interval.is_zero() {
            return Err(OpcUaError::configuration(ConfigurationError::InvalidValue {
                field: "sampling_interval",
                reason: "must be greater than zero".to_string(),
            }));
        }
        Ok(())
    }
}

/// Builder for [`OpcUaConfig`].
#[derive(Debug, Clone)]
pub struct OpcUaConfigBuilder {
    config: OpcUaConfig,
}

impl OpcUaConfigBuilder {
    /// Sets the application name.
    pub fn application_name(mut self, name: impl Into<String>) -> Self {
        self.config.application_name = name.into();
        self
    }

    /// Sets the application URI.
    pub fn application_uri(mut self, uri: impl Into<String>) -> Self {
        self.config.application_uri = uri.into();
        self
    }

    /// Sets security mode and policy.
    pub fn security(mut self, mode: SecurityMode, policy: SecurityPolicy) -> Self {
        self.config.security_mode = mode;
        self.config.security_policy = policy;
        self
    }

    /// Authenticates with username and password.
    pub fn user_name(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.config.user_token = UserToken::UserName {
            username: username.into(),
            password: password.into(),
        };
        self
    }

    /// Sets the session timeout.
    pub fn session_timeout(mut self, timeout: Duration) -> Self {
        self.config.session_timeout = timeout;
        self
    }

    /// Sets the PKI directory.
    pub fn pki_dir(mut self, dir: impl Into<String>) -> Self {
        self.config.pki_dir = dir.into();
        self
    }

    /// Trusts unknown server certificates.
    pub fn trust_server_certs(mut self, trust: bool) -> Self {
        self.config.trust_server_certs = trust;
        self
    }

    /// Sets both the publishing and the sampling interval.
    pub fn monitoring_interval(mut self, interval: Duration) -> Self {
        self.config.publishing_interval = interval;
        self.config.sampling_interval = interval;
        self
    }

    /// Validates and returns the configuration.
    pub fn build(self) -> OpcUaResult<OpcUaConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_string_node_with_separators() {
        let id: NodeId = "ns=2;s=|var|CPS-PCS341MB-DS1.Application.GVL.OPC_Machine_A0001.autho_request"
            .parse()
            .unwrap();
        assert_eq!(id.namespace_index, 2);
        assert_eq!(
            id.identifier,
            NodeIdentifier::String("|var|CPS-PCS341MB-DS1.Application.GVL.OPC_Machine_A0001.autho_request".into())
        );
    }

    #[test]
    fn test_parse_other_kinds() {
        assert_eq!("i=2258".parse::<NodeId>().unwrap(), NodeId::numeric(0, 2258));
        let guid: NodeId = "ns=1;g=550e8400-e29b-41d4-a716-446655440000".parse().unwrap();
        assert!(matches!(guid.identifier, NodeIdentifier::Guid(_)));
        let opaque: NodeId = "ns=1;b=SGVsbG8=".parse().unwrap();
        assert_eq!(opaque.identifier, NodeIdentifier::Opaque(b"Hello".to_vec()));
    }

    #[test]
    fn test_parse_errors() {
        assert!("ns=2".parse::<NodeId>().is_err());
        assert!("ns=x;i=1".parse::<NodeId>().is_err());
        assert!("ns=2;q=1".parse::<NodeId>().is_err());
        assert!("ns=2;s=".parse::<NodeId>().is_err());
    }

    #[test]
    fn test_display_roundtrips_address() {
        let address = NodeAddress::new("ns=4;s=Machine.power_status");
        let id = NodeId::from_address(&address).unwrap();
        assert_eq!(id.to_address(), address);
        assert_eq!(NodeId::numeric(0, 85).to_string(), "i=85");

        let address = NodeAddress::new("ns=0;s=Machine.power_status");
        assert_eq!(NodeId::from_address(&address).unwrap().to_address(), address);
        let tricky = NodeId::string(0, "ns=3;s=x");
        assert_eq!(tricky.to_string(), "ns=0;s=ns=3;s=x");
        assert_eq!(tricky.to_string().parse::<NodeId>().unwrap(), tricky);
    }

    #[test]
    fn test_config_validation() {
        assert!(OpcUaConfig::builder("opc.tcp://plc:4840").build().is_ok());
        assert!(OpcUaConfig::builder("http://plc:4840").build().is_err());
        assert!(OpcUaConfig::builder("opc.tcp://plc:4840")
            .security(SecurityMode::Sign, SecurityPolicy::None)
            .build()
            .is_err());
        assert!(OpcUaConfig::builder("opc.tcp://plc:4840")
            .monitoring_interval(Duration::ZERO)
            .build()
            .is_err());
    }

    #[test]
    fn test_debug_hides_password() {
        let config = OpcUaConfig::builder("opc.tcp://plc:4840")
            .user_name("gateway", "hunter22")
            .build()
            .unwrap();
        let debug = format!("{config:?}");
        assert!(debug.contains("gateway"));
        assert!(!debug.contains("hunter22"));
    }

    #[test]
    fn test_security_from_str() {
        assert_eq!("sign_and_encrypt".parse::<SecurityMode>().unwrap(), SecurityMode::SignAndEncrypt);
        assert_eq!("Basic256Sha256".parse::<SecurityPolicy>().unwrap(), SecurityPolicy::Basic256Sha256);
        assert_eq!(SecurityPolicy::Aes128Sha256RsaOaep.to_string(), "Aes128_Sha256_RsaOaep");
        assert!("rot13".parse::<SecurityPolicy>().is_err());
    }
}
