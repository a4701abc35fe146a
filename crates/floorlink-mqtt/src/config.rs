// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Broker connection settings.

use std::time::Duration;

use rumqttc::MqttOptions;

use crate::error::{MqttError, MqttResult};

/// Default MQTT port.
pub const DEFAULT_PORT: u16 = 1883;

/// Default keep-alive interval.
pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(25);

/// Settings for one broker session.
#[derive(Clone, PartialEq, Eq)]
pub struct MqttConfig {
    /// Broker host name or address.
    pub host: String,
    /// Broker port.
    pub port: u16,
    /// Client identifier.
    pub client_id: String,
    /// Optional username. ThingsBoard uses the device access token here.
    pub username: Option<String>,
    /// Optional password.
    pub password: Option<String>,
    /// Keep-alive interval, whole seconds.
    pub keep_alive: Duration,
    /// Start with a clean session.
    pub clean_session: bool,
    /// Capacity of the client request queue.
    pub request_capacity: usize,
}

impl std::fmt::Debug for MqttConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("client_id", &self.client_id)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("keep_alive", &self.keep_alive)
            .field("clean_session", &self.clean_session)
            .finish_non_exhaustive()
    }
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            client_id: "floorlink".to_string(),
            username: None,
            password: None,
            keep_alive: DEFAULT_KEEP_ALIVE,
            clean_session: true,
            request_capacity: 64,
        }
    }
}

impl MqttConfig {
    /// Creates settings for `host:port` with defaults elsewhere.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// `host:port`, for logging.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Checks the settings.
    pub fn validate(&self) -> MqttResult<()> {
        if self.host.trim().is_empty() {
            return Err(MqttError::InvalidConfig("host must not be empty".into()));
        }
        if self.port == 0 {
            return Err(MqttError::InvalidConfig("port must not be 0".into()));
        }
        if self.client_id.is_empty() {
            return Err(MqttError::InvalidConfig("client_id must not be empty".into()));
        }
        if self.keep_alive.subsec_nanos() != 0 || self.keep_alive < Duration::from_secs(5) {
            return Err(MqttError::InvalidConfig(
                "keep_alive must be whole seconds and at least 5 s".into(),
            ));
        }
        if self.password.is_some() && self.username.is_none() {
            return Err(MqttError::InvalidConfig("password requires a username".into()));
        }
        if self.request_capacity == 0 {
            return Err(MqttError::InvalidConfig("request_capacity must be positive".into()));
        }
        Ok(())
    }

    /// Builds the client options.
    pub fn to_options(&self) -> MqttResult<MqttOptions> {
        self.validate()?;
        let mut options = MqttOptions::new(&self.client_id, &self.host, self.port);
        options.set_keep_alive(self.keep_alive);
        options.set_clean_session(self.clean_session);
        if let Some(username) = &self.username {
            options.set_credentials(username, self.password.clone().unwrap_or_default());
        }
        Ok(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = MqttConfig::default();
        assert_eq!(config.port, 1883);
        assert_eq!(config.keep_alive, Duration::from_secs(25));
        assert!(config.validate().is_ok());
        assert_eq!(MqttConfig::new("broker", 8883).endpoint(), "broker:8883");
    }

    #[test]
    fn test_invalid_settings() {
        let mut config = MqttConfig::new("", 1883);
        assert!(config.validate().is_err());

        config = MqttConfig::default();
        config.keep_alive = Duration::from_millis(1500);
        assert!(config.validate().is_err());

        config = MqttConfig::default();
        config.password = Some("secret".into());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_options_carry_credentials() {
        let mut config = MqttConfig::new("tb.local", 1883);
        config.username = Some("ACCESS_TOKEN".into());
        let options = config.to_options().unwrap();
        assert_eq!(options.broker_address(), ("tb.local".to_string(), 1883));
        assert_eq!(options.keep_alive(), Duration::from_secs(25));
        assert_eq!(options.credentials(), Some(("ACCESS_TOKEN".to_string(), String::new())));
    }
}
