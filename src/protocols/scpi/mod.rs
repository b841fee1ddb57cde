//! SCPI-like switch controller protocol.
//!
//! Newline-terminated text commands, one response line per non-blank
//! command:
//!
//! ```text
//! Request:  SWITCH:SELECT 2 3\n      (or SWITCH:SELECT 2,3)
//! Response: OK\n
//!
//! Request:  PATH:SELECT 7\n          (legacy index 1..8)
//! Response: OK\n
//!
//! Request:  STATE?\n
//! Response: {"switch": 2, "path": 3, "busy": false, "switchReadback": "0x2103"}\n
//! ```
//!
//! Failures are reported as `ERR,<CODE>` with codes `BAD_SYNTAX`,
//! `INVALID_ARGS`, `INVALID_PATH` and `UNKNOWN`. Keywords are
//! case-insensitive. Errors never close the connection.

pub mod handler;
pub mod parser;

pub use handler::handle_connection;
