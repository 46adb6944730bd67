//! # Task handler capability.
//!
//! The business logic invoked per message lives behind [`TaskHandler`] and is
//! injected at construction — a capability seam instead of subclass override,
//! so the runtime never needs to know what a message means.

use async_trait::async_trait;

use crate::error::HandlerError;

/// Processes one message body.
///
/// Invoked by a worker unit with the delivery's body; the return value
/// decides the acknowledgment outcome:
/// - `Ok(())` → Ack
/// - `Err(_)` → Nack (requeue per `Config::requeue_on_failure`)
///
/// ### Implementation requirements
/// - Must be safe to run concurrently with itself: one invocation per
///   in-flight delivery, up to the prefetch credit.
/// - Should return errors rather than panic; panics are caught by the worker
///   and converted to a Nack, but carry less diagnostic context.
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use jobpump::{HandlerError, TaskHandler};
///
/// struct FileProcessor;
///
/// #[async_trait]
/// impl TaskHandler for FileProcessor {
///     async fn process(&self, body: Vec<u8>) -> Result<(), HandlerError> {
///         let text = String::from_utf8(body)
///             .map_err(|e| HandlerError::fail(e.to_string()))?;
///         println!("processing {text}");
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait TaskHandler: Send + Sync + 'static {
    /// Processes a single message body.
    async fn process(&self, body: Vec<u8>) -> Result<(), HandlerError>;
}
