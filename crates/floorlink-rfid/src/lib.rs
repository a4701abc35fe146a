// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # floorlink-rfid
//!
//! Serial ISO 15693 card reader for the floorlink gateway.
//!
//! [`SerialCardReader`] implements the core
//! [`CardReader`](floorlink_core::CardReader) port and is driven by the
//! core device poller on its own thread, so all I/O here is blocking.
//!
//! A valid scan carries the card UID as upper-case hex and the block data as
//! `BlockAddr:[12] Data:[AA BB CC DD]`.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod error;
pub mod protocol;
pub mod reader;

pub use error::{RfidError, RfidResult};
pub use reader::{ReaderConfig, SerialCardReader};
