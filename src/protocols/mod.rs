//! Protocol implementations.
//!
//! - `scpi`: SCPI-like text protocol for the switch controller
//!
//! Each protocol has a parser module and a Tokio connection handler.

pub mod scpi;
