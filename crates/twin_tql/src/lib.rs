//! # twin_tql
//!
//! The TQL mapping language. A TQL statement declares how one entity's
//! properties are computed from other entities' properties:
//!
//! ```text
//! insert into room42 select sensor7.temp * 1.8 + 32 as temp_f, sensor7.unit
//! ```
//!
//! This crate provides:
//!
//! - [`lexer`] and [`parser`] — a hand-written recursive-descent front end
//!   producing the [`ast`].
//! - [`eval`] — pure evaluation of expressions over a [`Binding`].
//! - [`Mapper`] — the parsed, executable form of one statement, with its
//!   dependency [`Tentacle`]s.

pub mod ast;
pub mod error;
pub mod eval;
pub mod lexer;
pub mod mapper;
pub mod parser;
pub mod tentacle;

pub use error::TqlError;
pub use eval::{Binding, EvalError, evaluate};
pub use mapper::Mapper;
pub use parser::{ParseError, Parser};
pub use tentacle::{Tentacle, TentacleKind};
