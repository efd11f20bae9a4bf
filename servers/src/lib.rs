//! # Servers
//!
//! HTTP front end of the dead man's switch. The binary in `server_switch.rs`
//! is a thin shell around [`switch_logic`], which integration tests drive
//! in-process.

#![forbid(unsafe_code)]

pub mod switch_logic;
