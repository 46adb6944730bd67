//! # Handler abstractions.
//!
//! - [`TaskHandler`] — trait for per-message business logic
//! - [`HandlerFn`] — function-backed handler implementation
//! - [`HandlerRef`] — shared reference to a handler (`Arc<dyn TaskHandler>`)
//! - [`NoopHandler`] — accept-everything placeholder

mod handler;
mod handler_fn;

pub use handler::TaskHandler;
pub use handler_fn::{HandlerFn, HandlerRef, NoopHandler};
