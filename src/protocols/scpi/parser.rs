//! SCPI command parser and response generator.
//!
//! Implements parsing for the switch controller commands:
//! - Selection: SWITCH:SELECT, PATH:SELECT (legacy)
//! - Query: STATE?

use crate::device::Snapshot;
use bytes::{BufMut, BytesMut};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use std::io;

const SWITCH_SELECT: &str = "SWITCH:SELECT";
const PATH_SELECT: &str = "PATH:SELECT";
const STATE_QUERY: &str = "STATE?";

lazy_static! {
    static ref INTEGER_RE: Regex = Regex::new(r"-?[0-9]+").unwrap();
}

/// Parsed SCPI command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Select a path on a switch (not yet range checked)
    SelectSwitchPath { switch: i64, path: i64 },

    /// Select by legacy path index (not yet range checked)
    SelectLegacyPath(u64),

    /// Report the current device state
    QueryState,

    /// Unknown command keyword
    Unrecognized,
}

/// Protocol parsing errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Known keyword with malformed arguments
    BadSyntax(&'static str),
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::BadSyntax(reason) => write!(f, "Bad syntax: {}", reason),
        }
    }
}

impl std::error::Error for ParseError {}

/// Result of parsing a line
#[derive(Debug, PartialEq, Eq)]
pub enum ParseResult {
    /// Successfully parsed command
    Complete(Command),
    /// Blank line, produces no response
    Empty,
    /// Parse error
    Error(ParseError),
}

/// Parser for the SCPI text protocol
pub struct Parser;

impl Parser {
    /// Parse one line with its terminator already removed
    pub fn parse(line: &str) -> ParseResult {
        let line = line.trim();
        if line.is_empty() {
            return ParseResult::Empty;
        }

        let upper = line.to_uppercase();

        if upper.starts_with(SWITCH_SELECT) {
            Self::parse_switch_select(line)
        } else if upper.starts_with(PATH_SELECT) {
            Self::parse_path_select(line)
        } else if upper == STATE_QUERY {
            ParseResult::Complete(Command::QueryState)
        } else {
            ParseResult::Complete(Command::Unrecognized)
        }
    }

    /// Parse SWITCH:SELECT by scanning the whole line for integers.
    /// Accepts `<sw> <p>` and `<sw>,<p>` alike.
    fn parse_switch_select(line: &str) -> ParseResult {
        let numbers: Vec<i64> = INTEGER_RE
            .find_iter(line)
            .map(|m| parse_signed(m.as_str()))
            .collect();

        match numbers.as_slice() {
            [switch, path] => ParseResult::Complete(Command::SelectSwitchPath {
                switch: *switch,
                path: *path,
            }),
            _ => ParseResult::Error(ParseError::BadSyntax("expected two integers")),
        }
    }

    /// Parse PATH:SELECT n, where n must be a plain digit string
    fn parse_path_select(line: &str) -> ParseResult {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() != 2 {
            return ParseResult::Error(ParseError::BadSyntax("expected one path argument"));
        }

        let arg = parts[1];
        if !arg.bytes().all(|b| b.is_ascii_digit()) {
            return ParseResult::Error(ParseError::BadSyntax("path must be digits only"));
        }

        // Digits only, so the only failure is overflow
        let n = arg.parse::<u64>().unwrap_or(u64::MAX);
        ParseResult::Complete(Command::SelectLegacyPath(n))
    }
}

/// Parse a `-?[0-9]+` token, saturating on overflow
fn parse_signed(token: &str) -> i64 {
    token.parse().unwrap_or(if token.starts_with('-') {
        i64::MIN
    } else {
        i64::MAX
    })
}

/// Decode received line bytes as UTF-8, dropping invalid sequences
pub fn decode_line(bytes: &[u8]) -> String {
    let mut line = String::with_capacity(bytes.len());
    for chunk in bytes.utf8_chunks() {
        line.push_str(chunk.valid());
    }
    line
}

/// Protocol error codes sent back as `ERR,<CODE>`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    BadSyntax,
    InvalidArgs,
    InvalidPath,
    Unknown,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let code = match self {
            ErrorCode::BadSyntax => "BAD_SYNTAX",
            ErrorCode::InvalidArgs => "INVALID_ARGS",
            ErrorCode::InvalidPath => "INVALID_PATH",
            ErrorCode::Unknown => "UNKNOWN",
        };
        f.write_str(code)
    }
}

/// JSON formatter producing `{"a": 1, "b": 2}` spacing
struct SpacedFormatter;

impl serde_json::ser::Formatter for SpacedFormatter {
    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }
}

/// Response builder
pub struct Response;

impl Response {
    /// Generate OK response
    pub fn ok() -> &'static [u8] {
        b"OK\n"
    }

    /// Generate ERR,<CODE> response
    pub fn error(code: ErrorCode) -> BytesMut {
        BytesMut::from(format!("ERR,{}\n", code).as_bytes())
    }

    /// Generate the JSON state report line
    pub fn state(snapshot: &Snapshot) -> serde_json::Result<BytesMut> {
        let mut writer = BytesMut::with_capacity(96).writer();
        {
            let mut ser = serde_json::Serializer::with_formatter(&mut writer, SpacedFormatter);
            snapshot.serialize(&mut ser)?;
        }
        let mut response = writer.into_inner();
        response.put_u8(b'\n');
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(line: &str) -> Command {
        match Parser::parse(line) {
            ParseResult::Complete(command) => command,
            other => panic!("unexpected: {:?}", other),
        }
    }

    fn assert_bad_syntax(line: &str) {
        match Parser::parse(line) {
            ParseResult::Error(ParseError::BadSyntax(_)) => {}
            other => panic!("unexpected for {:?}: {:?}", line, other),
        }
    }

    #[test]
    fn test_parse_switch_select_space() {
        assert_eq!(
            parse_ok("SWITCH:SELECT 2 3"),
            Command::SelectSwitchPath { switch: 2, path: 3 }
        );
    }

    #[test]
    fn test_parse_switch_select_comma() {
        assert_eq!(
            parse_ok("SWITCH:SELECT 1,4"),
            Command::SelectSwitchPath { switch: 1, path: 4 }
        );
        assert_eq!(
            parse_ok("switch:select 2, 1"),
            Command::SelectSwitchPath { switch: 2, path: 1 }
        );
    }

    #[test]
    fn test_parse_switch_select_defers_range_check() {
        assert_eq!(
            parse_ok("SWITCH:SELECT 3,1"),
            Command::SelectSwitchPath { switch: 3, path: 1 }
        );
        assert_eq!(
            parse_ok("SWITCH:SELECT -1 2"),
            Command::SelectSwitchPath { switch: -1, path: 2 }
        );
    }

    #[test]
    fn test_parse_switch_select_scans_loosely() {
        // Integers are found anywhere in the line
        assert_eq!(
            parse_ok("SWITCH:SELECT sw=2 path=4"),
            Command::SelectSwitchPath { switch: 2, path: 4 }
        );
        assert_eq!(
            parse_ok("SWITCH:SELECT 1.5"),
            Command::SelectSwitchPath { switch: 1, path: 5 }
        );
        assert_eq!(
            parse_ok("SWITCH:SELECT 1-2"),
            Command::SelectSwitchPath { switch: 1, path: -2 }
        );
    }

    #[test]
    fn test_parse_switch_select_overflow_saturates() {
        assert_eq!(
            parse_ok("SWITCH:SELECT 99999999999999999999 -99999999999999999999"),
            Command::SelectSwitchPath {
                switch: i64::MAX,
                path: i64::MIN
            }
        );
    }

    #[test]
    fn test_parse_switch_select_wrong_count() {
        assert_bad_syntax("SWITCH:SELECT");
        assert_bad_syntax("SWITCH:SELECT 1");
        assert_bad_syntax("SWITCH:SELECT 1 2 3");
        assert_bad_syntax("SWITCH:SELECT one two");
    }

    #[test]
    fn test_parse_path_select() {
        assert_eq!(parse_ok("PATH:SELECT 5"), Command::SelectLegacyPath(5));
        assert_eq!(parse_ok("path:select 8"), Command::SelectLegacyPath(8));
        assert_eq!(parse_ok("PATH:SELECT 9"), Command::SelectLegacyPath(9));
        assert_eq!(parse_ok("PATH:SELECT 0"), Command::SelectLegacyPath(0));
        assert_eq!(parse_ok("PATH:SELECT\t03"), Command::SelectLegacyPath(3));
    }

    #[test]
    fn test_parse_path_select_malformed() {
        assert_bad_syntax("PATH:SELECT");
        assert_bad_syntax("PATH:SELECT 1.5");
        assert_bad_syntax("PATH:SELECT -1");
        assert_bad_syntax("PATH:SELECT abc");
        assert_bad_syntax("PATH:SELECT 1 2");
        assert_bad_syntax("PATH:SELECT,1");
    }

    #[test]
    fn test_parse_path_select_overflow() {
        assert_eq!(
            parse_ok("PATH:SELECT 123456789012345678901234567890"),
            Command::SelectLegacyPath(u64::MAX)
        );
    }

    #[test]
    fn test_parse_state_query() {
        assert_eq!(parse_ok("STATE?"), Command::QueryState);
        assert_eq!(parse_ok("state?"), Command::QueryState);
        assert_eq!(parse_ok("  State?\r"), Command::QueryState);
    }

    #[test]
    fn test_parse_state_query_exact() {
        assert_eq!(parse_ok("STATE? now"), Command::Unrecognized);
        assert_eq!(parse_ok("STATE"), Command::Unrecognized);
    }

    #[test]
    fn test_unknown_command() {
        assert_eq!(parse_ok("FOO:BAR"), Command::Unrecognized);
        assert_eq!(parse_ok("*IDN?"), Command::Unrecognized);
    }

    #[test]
    fn test_blank_line() {
        assert_eq!(Parser::parse(""), ParseResult::Empty);
        assert_eq!(Parser::parse("   \r"), ParseResult::Empty);
    }

    #[test]
    fn test_decode_line_drops_invalid_utf8() {
        assert_eq!(decode_line(b"PATH:SELECT 5\xff"), "PATH:SELECT 5");
        assert_eq!(decode_line(b"STATE?"), "STATE?");
    }

    #[test]
    fn test_error_responses() {
        assert_eq!(&Response::error(ErrorCode::BadSyntax)[..], b"ERR,BAD_SYNTAX\n");
        assert_eq!(&Response::error(ErrorCode::InvalidArgs)[..], b"ERR,INVALID_ARGS\n");
        assert_eq!(&Response::error(ErrorCode::InvalidPath)[..], b"ERR,INVALID_PATH\n");
        assert_eq!(&Response::error(ErrorCode::Unknown)[..], b"ERR,UNKNOWN\n");
        assert_eq!(Response::ok(), b"OK\n");
    }

    #[test]
    fn test_state_response_format() {
        let snapshot = Snapshot {
            switch: 2,
            path: 3,
            busy: false,
            switch_readback: "0x2103",
        };
        let response = Response::state(&snapshot).unwrap();
        assert_eq!(
            &response[..],
            b"{\"switch\": 2, \"path\": 3, \"busy\": false, \"switchReadback\": \"0x2103\"}\n"
        );
    }

    #[test]
    fn test_state_response_busy() {
        let snapshot = Snapshot {
            switch: 1,
            path: 0,
            busy: true,
            switch_readback: "0x0000",
        };
        let response = Response::state(&snapshot).unwrap();
        assert_eq!(
            &response[..],
            b"{\"switch\": 1, \"path\": 0, \"busy\": true, \"switchReadback\": \"0x0000\"}\n"
        );
    }
}
