//! # twin_value
//!
//! Property data for digital-twin entities.
//!
//! This crate provides:
//!
//! - [`Node`] — the tagged, self-describing property value with dot-path
//!   addressing and arithmetic/string coercion.
//! - [`Config`] — the declarative schema of one property, parsed from loosely
//!   typed input.
//! - [`ValueError`] — errors raised by path access, arithmetic, and schema
//!   parsing.

pub mod config;
pub mod error;
pub mod node;

pub use config::Config;
pub use error::ValueError;
pub use node::{ArithOp, Kind, Node, PATH_SEPARATOR};
