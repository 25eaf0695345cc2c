//! NATS connection management.
//!
//! Provides a thin wrapper around `async-nats` for connecting to NATS with
//! cluster defaults and MessagePack-typed publish and request helpers.

use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::error::NetError;

/// Default NATS server URL.
pub const DEFAULT_NATS_URL: &str = "nats://localhost:4222";

/// The environment variable used to override the NATS URL.
pub const NATS_URL_ENV: &str = "NATS_URL";

/// Resolve the NATS URL: `explicit` if given, else `NATS_URL`, else
/// [`DEFAULT_NATS_URL`].
#[must_use]
pub fn resolve_url(explicit: Option<&str>) -> String {
    match explicit {
        Some(url) => url.to_string(),
        None => std::env::var(NATS_URL_ENV).unwrap_or_else(|_| DEFAULT_NATS_URL.to_string()),
    }
}

/// A wrapper around an `async-nats` client with cluster helpers.
#[derive(Debug, Clone)]
pub struct NatsConnection {
    /// The underlying NATS client.
    client: async_nats::Client,
}

impl NatsConnection {
    /// Connect to NATS using the URL from the `NATS_URL` environment variable,
    /// falling back to [`DEFAULT_NATS_URL`].
    ///
    /// # Errors
    ///
    /// Returns [`NetError::Connect`] if the connection cannot be established.
    pub async fn connect() -> Result<Self, NetError> {
        Self::connect_to(&resolve_url(None)).await
    }

    /// Connect to NATS at the specified URL.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::Connect`] if the connection cannot be established.
    pub async fn connect_to(url: &str) -> Result<Self, NetError> {
        info!(url, "connecting to NATS");
        let client = async_nats::connect(url).await?;
        info!(url, "NATS connection established");
        Ok(Self { client })
    }

    /// Wrap an existing client.
    #[must_use]
    pub fn from_client(client: async_nats::Client) -> Self {
        Self { client }
    }

    /// Returns a reference to the underlying `async-nats` client.
    #[must_use]
    pub fn client(&self) -> &async_nats::Client {
        &self.client
    }

    /// Publish a MessagePack-encoded message to a subject.
    ///
    /// # Errors
    ///
    /// Returns [`NetError`] if encoding or publishing fails.
    pub async fn publish<T: Serialize>(&self, subject: &str, message: &T) -> Result<(), NetError> {
        let payload = crate::codec::encode(message)?;
        self.client
            .publish(subject.to_string(), payload.into())
            .await?;
        Ok(())
    }

    /// Send a MessagePack-encoded request and decode the reply.
    ///
    /// The wait is bounded by the client's request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::NoResponders`] if nobody serves `subject`,
    /// [`NetError::Timeout`] if no reply arrives in time, and
    /// [`NetError`] encode/decode errors.
    pub async fn request<Req, Resp>(&self, subject: &str, message: &Req) -> Result<Resp, NetError>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let payload = crate::codec::encode(message)?;
        debug!(subject, bytes = payload.len(), "sending request");
        let reply = self
            .client
            .request(subject.to_string(), payload.into())
            .await
            .map_err(|e| match e.kind() {
                async_nats::RequestErrorKind::TimedOut => NetError::Timeout,
                async_nats::RequestErrorKind::NoResponders => {
                    NetError::NoResponders(subject.to_string())
                }
                _ => NetError::Request(e),
            })?;
        crate::codec::decode(&reply.payload)
    }

    /// [`request`](Self::request) bounded by `timeout`.
    ///
    /// # Errors
    ///
    /// As [`request`](Self::request); expiry of `timeout` yields
    /// [`NetError::Timeout`].
    pub async fn request_within<Req, Resp>(
        &self,
        subject: &str,
        message: &Req,
        timeout: Duration,
    ) -> Result<Resp, NetError>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        tokio::time::timeout(timeout, self.request(subject, message))
            .await
            .map_err(|_| NetError::Timeout)?
    }

    /// Subscribe to a subject.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::Subscribe`] if the subscription fails.
    pub async fn subscribe(&self, subject: &str) -> Result<async_nats::Subscriber, NetError> {
        let sub = self.client.subscribe(subject.to_string()).await?;
        Ok(sub)
    }

    /// Subscribe to a subject as a member of a queue group, so that each
    /// message is delivered to one member only.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::Subscribe`] if the subscription fails.
    pub async fn queue_subscribe(
        &self,
        subject: &str,
        queue: &str,
    ) -> Result<async_nats::Subscriber, NetError> {
        let sub = self
            .client
            .queue_subscribe(subject.to_string(), queue.to_string())
            .await?;
        Ok(sub)
    }
}
