// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Reader command protocol.
//!
//! The reader runs in ASCII line mode. Each command is one line terminated by
//! CR LF and is answered by one line:
//!
//! ```text
//! VER                  -> OK <version>
//! BEEP <ms>            -> OK
//! INV                  -> OK <uid hex> | ERR <code>   (ERR means no card)
//! SEL <uid>            -> OK | ERR <code>
//! RDY <uid>            -> OK | ERR <code>
//! SEC <uid>            -> OK <info> | ERR <code>
//! RD <uid> <addr> <n>  -> OK <hex, 4 bytes per block> | ERR <code>
//! ```
//!
//! A read cycle mirrors the ISO 15693 sequence: inventory, select, reset to
//! ready, security info, read blocks.

use std::fmt;
use std::io::{BufRead, BufReader, Read, Write};

use floorlink_core::scan::CardScan;

use crate::error::{RfidError, RfidResult};

/// Bytes per data block.
pub const BLOCK_SIZE: usize = 4;

// =============================================================================
// Command
// =============================================================================

/// A reader command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Firmware version query.
    Version,
    /// Sound the buzzer.
    Beep(u16),
    /// Find a single card.
    Inventory,
    /// Select a card.
    Select(String),
    /// Reset a card to the ready state.
    ResetToReady(String),
    /// Read security information.
    SecurityInfo(String),
    /// Read `count` blocks starting at `start`.
    ReadBlocks {
        /// Card UID.
        uid: String,
        /// First block.
        start: u8,
        /// Block count.
        count: u8,
    },
}

impl Command {
    /// The command verb.
    pub const fn verb(&self) -> &'static str {
        match self {
            Self::Version => "VER",
            Self::Beep(_) => "BEEP",
            Self::Inventory => "INV",
            Self::Select(_) => "SEL",
            Self::ResetToReady(_) => "RDY",
            Self::SecurityInfo(_) => "SEC",
            Self::ReadBlocks { .. } => "RD",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Version | Self::Inventory => f.write_str(self.verb()),
            Self::Beep(ms) => write!(f, "BEEP {ms}"),
            Self::Select(uid) | Self::ResetToReady(uid) | Self::SecurityInfo(uid) => {
                write!(f, "{} {uid}", self.verb())
            }
            Self::ReadBlocks { uid, start, count } => write!(f, "RD {uid} {start} {count}"),
        }
    }
}

// =============================================================================
// Reply
// =============================================================================

/// A parsed reply line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// `OK` with an optional argument.
    Ok(String),
    /// `ERR` with the reader's code.
    Err(String),
}

impl Reply {
    /// Parses one line, without its terminator.
    pub fn parse(line: &str) -> RfidResult<Self> {
        let line = line.trim();
        let (status, rest) = line.split_once(' ').unwrap_or((line, ""));
        match status {
            "OK" => Ok(Self::Ok(rest.trim().to_string())),
            "ERR" => Ok(Self::Err(rest.trim().to_string())),
            _ => Err(RfidError::Protocol(format!("unexpected reply '{line}'"))),
        }
    }

    /// Returns the `OK` argument or a rejection for `command`.
    pub fn into_result(self, command: &Command) -> RfidResult<String> {
        match self {
            Self::Ok(arg) => Ok(arg),
            Self::Err(code) => Err(RfidError::Rejected {
                command: command.verb(),
                code,
            }),
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Normalizes a UID to upper-case hex. Rejects anything that is not an even
/// number of hex digits.
pub fn normalize_uid(raw: &str) -> RfidResult<String> {
    let uid = raw.trim();
    if uid.is_empty() || uid.len() % 2 != 0 || !uid.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(RfidError::Protocol(format!("invalid card id '{raw}'")));
    }
    Ok(uid.to_ascii_uppercase())
}

/// Decodes a hex string into bytes. Whitespace between digits is ignored.
pub fn decode_hex(hex: &str) -> RfidResult<Vec<u8>> {
    let digits: Vec<u8> = hex.bytes().filter(|b| !b.is_ascii_whitespace()).collect();
    if !digits.iter().all(u8::is_ascii_hexdigit) {
        return Err(RfidError::Protocol(format!("invalid hex in '{}'", hex.trim())));
    }
    if digits.len() % 2 != 0 {
        return Err(RfidError::Protocol(format!("odd hex length in '{}'", hex.trim())));
    }
    Ok(digits
        .chunks(2)
        .map(|pair| (nibble(pair[0]) << 4) | nibble(pair[1]))
        .collect())
}

fn nibble(digit: u8) -> u8 {
    match digit {
        b'0'..=b'9' => digit - b'0',
        b'a'..=b'f' => digit - b'a' + 10,
        _ => digit - b'A' + 10,
    }
}

/// Formats block data as `BlockAddr:[12] Data:[AA BB CC DD]`, one line per
/// block.
pub fn format_blocks(start: u8, data: &[u8]) -> String {
    data.chunks(BLOCK_SIZE)
        .enumerate()
        .map(|(i, block)| {
            let bytes: Vec<String> = block.iter().map(|b| format!("{b:02X}")).collect();
            format!("BlockAddr:[{:2}] Data:[{}]", usize::from(start) + i, bytes.join(" "))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// =============================================================================
// ReaderLink
// =============================================================================

/// Command/response exchange over a byte stream.
#[derive(Debug)]
pub struct ReaderLink<S> {
    stream: S,
    line: String,
}

impl<S: Read + Write> ReaderLink<BufReader<S>> {
    /// Wraps a buffered stream.
    pub fn new(stream: BufReader<S>) -> Self {
        Self {
            stream,
            line: String::new(),
        }
    }

    /// Returns the stream.
    pub fn into_inner(self) -> BufReader<S> {
        self.stream
    }

    /// Sends `command` and reads one reply.
    pub fn exchange(&mut self, command: &Command) -> RfidResult<Reply> {
        write!(self.stream.get_mut(), "{command}\r\n")?;
        self.stream.get_mut().flush()?;

        self.line.clear();
        match self.stream.read_line(&mut self.line) {
            Ok(0) => Err(RfidError::Protocol("reader closed the stream".into())),
            Ok(_) if !self.line.ends_with('\n') => Err(RfidError::Timeout),
            Ok(_) => Reply::parse(&self.line),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Err(RfidError::Timeout),
            Err(e) => Err(e.into()),
        }
    }

    /// Sends `command` and requires an `OK` reply.
    pub fn expect_ok(&mut self, command: &Command) -> RfidResult<String> {
        self.exchange(command)?.into_result(command)
    }

    /// Runs one read cycle.
    ///
    /// Returns `Ok(None)` when no card is in the field. Once a card answered
    /// the inventory, a rejected step yields an invalid scan rather than an
    /// error; stream failures are errors.
    pub fn read_card(&mut self, start: u8, count: u8) -> RfidResult<Option<CardScan>> {
        let uid = match self.exchange(&Command::Inventory)? {
            Reply::Ok(uid) => normalize_uid(&uid)?,
            Reply::Err(_) => return Ok(None),
        };

        let steps = [
            Command::Select(uid.clone()),
            Command::ResetToReady(uid.clone()),
            Command::SecurityInfo(uid.clone()),
        ];
        for step in &steps {
            match self.expect_ok(step) {
                Ok(_) => {}
                Err(RfidError::Rejected { command, code }) => {
                    return Ok(Some(CardScan::invalid(format!("{command} failed: {code}"))))
                }
                Err(e) => return Err(e),
            }
        }

        let read = Command::ReadBlocks { uid: uid.clone(), start, count };
        let data = match self.expect_ok(&read) {
            Ok(hex) => match decode_hex(&hex) {
                Ok(data) => data,
                Err(e) => return Ok(Some(CardScan::invalid(format!("read failed: {e}")))),
            },
            Err(RfidError::Rejected { code, .. }) => {
                return Ok(Some(CardScan::invalid(format!("read failed: {code}"))))
            }
            Err(e) => return Err(e),
        };
        if data.len() != usize::from(count) * BLOCK_SIZE {
            return Ok(Some(CardScan::invalid(format!(
                "expected {} bytes, got {}",
                usize::from(count) * BLOCK_SIZE,
                data.len()
            ))));
        }
        Ok(Some(CardScan::valid(uid, format_blocks(start, &data))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io::{self, BufReader, Read};

    /// A reader that answers from a script and records what it was sent.
    #[derive(Default)]
    pub(crate) struct Script {
        pub replies: VecDeque<u8>,
        pub sent: Vec<u8>,
    }

    impl Script {
        pub(crate) fn new(lines: &[&str]) -> Self {
            let mut replies = VecDeque::new();
            for line in lines {
                replies.extend(line.bytes());
                replies.extend(b"\r\n");
            }
            Self {
                replies,
                sent: Vec::new(),
            }
        }

        pub(crate) fn sent_lines(&self) -> Vec<String> {
            String::from_utf8_lossy(&self.sent)
                .split("\r\n")
                .filter(|l| !l.is_empty())
                .map(String::from)
                .collect()
        }
    }

    impl Read for Script {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.replies.is_empty() {
                return Err(io::Error::new(io::ErrorKind::TimedOut, "no reply"));
            }
            let n = buf.len().min(self.replies.len());
            for (slot, byte) in buf.iter_mut().zip(self.replies.drain(..n)) {
                *slot = byte;
            }
            Ok(n)
        }
    }

    impl Write for Script {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.sent.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn link(lines: &[&str]) -> ReaderLink<BufReader<Script>> {
        ReaderLink::new(BufReader::new(Script::new(lines)))
    }

    #[test]
    fn test_reply_parse() {
        assert_eq!(Reply::parse("OK 1.2\r\n").unwrap(), Reply::Ok("1.2".into()));
        assert_eq!(Reply::parse("ERR 0x01").unwrap(), Reply::Err("0x01".into()));
        assert!(Reply::parse("HELLO").is_err());
    }

    #[test]
    fn test_format_blocks() {
        assert_eq!(format_blocks(12, &[0xAA, 0xBB, 0xCC, 0xDD]), "BlockAddr:[12] Data:[AA BB CC DD]");
        assert_eq!(
            format_blocks(3, &[1, 2, 3, 4, 5, 6, 7, 8]),
            "BlockAddr:[ 3] Data:[01 02 03 04]\nBlockAddr:[ 4] Data:[05 06 07 08]"
        );
    }

    #[test]
    fn test_full_cycle() {
        let mut link = link(&["OK e004015012345678", "OK", "OK", "OK 0102", "OK aabbccdd"]);
        let scan = link.read_card(12, 1).unwrap().unwrap();
        assert!(scan.valid);
        assert_eq!(scan.card_id, "E004015012345678");
        assert_eq!(scan.data, "BlockAddr:[12] Data:[AA BB CC DD]");

        let sent = link.into_inner().into_inner().sent_lines();
        assert_eq!(
            sent,
            vec![
                "INV",
                "SEL E004015012345678",
                "RDY E004015012345678",
                "SEC E004015012345678",
                "RD E004015012345678 12 1",
            ]
        );
    }

    #[test]
    fn test_no_card() {
        let mut link = link(&["ERR 0x01"]);
        assert_eq!(link.read_card(12, 1).unwrap(), None);
    }

    #[test]
    fn test_failed_step_yields_invalid_scan() {
        let mut link = link(&["OK E0040150", "ERR 0x10"]);
        let scan = link.read_card(12, 1).unwrap().unwrap();
        assert!(!scan.valid);
        assert!(scan.data.contains("SEL"));

        let mut link = self::link(&["OK E0040150", "OK", "OK", "OK", "OK AABB"]);
        assert!(!link.read_card(12, 1).unwrap().unwrap().valid);
    }

    #[test]
    fn test_timeout_is_error() {
        let mut link = link(&["OK E0040150"]);
        assert!(matches!(link.read_card(12, 1), Err(RfidError::Timeout)));
    }

    #[test]
    fn test_non_ascii_read_reply() {
        assert!(decode_hex("aé1").is_err());
        assert!(decode_hex("éé").is_err());
        assert_eq!(decode_hex("aa BB 0c").unwrap(), vec![0xAA, 0xBB, 0x0C]);

        let mut link = link(&["OK E0040150", "OK", "OK", "OK", "OK aé1"]);
        let scan = link.read_card(12, 1).unwrap().unwrap();
        assert!(!scan.valid);
        assert!(scan.data.contains("invalid hex"));
    }

    #[test]
    fn test_uid_validation() {
        assert_eq!(normalize_uid("e0a1").unwrap(), "E0A1");
        assert!(normalize_uid("e0a").is_err());
        assert!(normalize_uid("zz").is_err());
    }
}
