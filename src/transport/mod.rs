//! Transport layer abstraction for BOSH frames.
//!
//! The engine never touches HTTP directly: it hands a serialized `<body/>`
//! to a [`Transport`] and gets the raw response body back.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │        BoshClient / Handshake           │
//! │         (Transport-Agnostic)            │
//! └──────────────────┬──────────────────────┘
//!                    │  send(body) -> body
//!          ┌────────┴────────┐
//!          ▼                 ▼
//! ┌─────────────────┐ ┌─────────────────┐
//! │  HttpTransport  │ │ in-memory/test  │
//! │   (reqwest)     │ │   transports    │
//! └─────────────────┘ └─────────────────┘
//! ```

mod http;

pub use http::HttpTransport;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::Result;

/// Boxed future returned by [`Transport::send`]
pub type SendFuture<'a> = Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>>;

/// Transport trait for pluggable request/response backends.
///
/// Several requests may be in flight at once (long-poll plus caller sends),
/// so implementations must allow concurrent calls.
pub trait Transport: Send + Sync {
    /// POST one frame and return the response body.
    ///
    /// Network failures and non-success statuses map to
    /// [`BoshError::Transport`](crate::BoshError::Transport).
    fn send(&self, body: String) -> SendFuture<'_>;

    /// Get the transport name for logging.
    fn name(&self) -> &'static str;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn send(&self, body: String) -> SendFuture<'_> {
        (**self).send(body)
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}
