//! # Function-backed handler (`HandlerFn`)
//!
//! [`HandlerFn`] wraps a closure `F: Fn(Vec<u8>) -> Fut`, producing a fresh
//! future per invocation. This avoids shared mutable state: each in-flight
//! delivery gets a future that owns its own state, and shared state is an
//! explicit `Arc<...>` captured by the closure.
//!
//! ## Example
//! ```rust
//! use jobpump::{HandlerError, HandlerFn, HandlerRef};
//!
//! let h: HandlerRef = HandlerFn::arc(|body: Vec<u8>| async move {
//!     if body.is_empty() {
//!         return Err(HandlerError::fail("empty body"));
//!     }
//!     Ok(())
//! });
//! ```

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::HandlerError;
use crate::handlers::handler::TaskHandler;

/// Shared reference to a task handler.
pub type HandlerRef = Arc<dyn TaskHandler>;

/// Function-backed handler implementation.
///
/// Wraps a closure that *creates* a new future per message.
pub struct HandlerFn<F> {
    f: F,
}

impl<F> HandlerFn<F> {
    /// Creates a new function-backed handler.
    ///
    /// Prefer [`HandlerFn::arc`] when you immediately need a [`HandlerRef`].
    pub fn new(f: F) -> Self {
        Self { f }
    }

    /// Creates the handler and returns it as a shared handle.
    pub fn arc(f: F) -> Arc<Self> {
        Arc::new(Self::new(f))
    }
}

#[async_trait]
impl<F, Fut> TaskHandler for HandlerFn<F>
where
    F: Fn(Vec<u8>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    async fn process(&self, body: Vec<u8>) -> Result<(), HandlerError> {
        (self.f)(body).await
    }
}

/// Placeholder handler that accepts every message.
///
/// Used as the builder default; stands in for real business logic the same
/// way a `process_task` stub would.
pub struct NoopHandler;

#[async_trait]
impl TaskHandler for NoopHandler {
    async fn process(&self, _body: Vec<u8>) -> Result<(), HandlerError> {
        Ok(())
    }
}
