// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # floorlink-mqtt
//!
//! MQTT broker session for the floorlink gateway, built on `rumqttc`.
//!
//! The gateway subscribes to ThingsBoard RPC requests
//! (`v1/devices/me/rpc/request/+`) for job dispatch and publishes telemetry to
//! `v1/devices/me/telemetry`. Publishing never waits: a full request queue
//! drops the message and the failure is logged by the caller.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod session;

pub use config::MqttConfig;
pub use error::{MqttError, MqttResult};
pub use session::MqttBroker;
