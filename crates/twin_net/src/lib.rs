//! # twin_net
//!
//! NATS transport layer for the digital-twin cluster.
//!
//! This crate provides:
//!
//! - [`subjects`] — NATS subject constants and builders.
//! - [`messages`] — Wire types for routing, discovery, and the mapper registry.
//! - [`codec`] — MessagePack serialisation/deserialisation helpers.
//! - [`connection`] — NATS connection management and request/reply.
//! - [`error`] — Network-layer error types.

pub mod codec;
pub mod connection;
pub mod error;
pub mod messages;
pub mod subjects;

pub use codec::{decode, encode};
pub use connection::NatsConnection;
pub use error::NetError;
