//! Handler system for the wabot framework.
//!
//! Command handlers and reply handlers share one signature: they receive a
//! [`DispatchArgs`] (bot handle, raw message, normalized context and the
//! per-invocation command facts) and return a [`HandlerResult`].
//!
//! Any async function or closure of the right shape is a [`Handler`]:
//!
//! ```rust,ignore
//! use wabot_framework::{DispatchArgs, HandlerResult};
//!
//! async fn ping(args: DispatchArgs) -> HandlerResult {
//!     args.reply("pong").await?;
//!     Ok(())
//! }
//! ```
//!
//! Handlers are stored type-erased as [`BoxedHandler`] and always invoked
//! through [`run_guarded`], which converts panics into
//! [`HandlerError::Panicked`] so a faulty plugin cannot take down the
//! dispatcher.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;

use futures::FutureExt;

use crate::args::DispatchArgs;
use crate::error::{HandlerError, HandlerResult};

/// A type alias for a boxed, pinned future that is `Send`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

// ============================================================================
// Handler Trait
// ============================================================================

/// A command or reply handler.
///
/// Implemented for every `Fn(DispatchArgs) -> impl Future<Output = HandlerResult>`.
pub trait Handler: Send + Sync + 'static {
    /// Invokes the handler.
    fn call(&self, args: DispatchArgs) -> BoxFuture<'static, HandlerResult>;
}

impl<F, Fut> Handler for F
where
    F: Fn(DispatchArgs) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn call(&self, args: DispatchArgs) -> BoxFuture<'static, HandlerResult> {
        Box::pin((self)(args))
    }
}

/// A type-erased handler that can be stored in collections.
pub type BoxedHandler = Arc<dyn Handler>;

/// Converts a handler function into a boxed handler.
pub fn into_handler<H: Handler>(handler: H) -> BoxedHandler {
    Arc::new(handler)
}

// ============================================================================
// Guarded Invocation
// ============================================================================

/// Runs a handler to completion, converting panics into errors.
///
/// Both the synchronous part of the call and the returned future are guarded.
pub async fn run_guarded(handler: &BoxedHandler, args: DispatchArgs) -> HandlerResult {
    let fut = match std::panic::catch_unwind(AssertUnwindSafe(|| handler.call(args))) {
        Ok(fut) => fut,
        Err(panic) => return Err(HandlerError::Panicked(panic_message(panic.as_ref()))),
    };

    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => Err(HandlerError::Panicked(panic_message(panic.as_ref()))),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
