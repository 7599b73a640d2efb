//! Reply-handler chain.
//!
//! Reply handlers serve conversational flows that are not commands (answering
//! a numbered prompt, for example). Every normalized message is offered to the
//! chain after command dispatch. Filters are evaluated in registration order;
//! the first handler whose filter matches runs and the chain stops there.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error};
use wabot_core::MessageContext;

use crate::args::DispatchArgs;
use crate::handler::{BoxedHandler, Handler, into_handler, run_guarded};

/// Filter predicate over the message text and its context.
pub type ReplyFilter = Arc<dyn Fn(&str, &MessageContext) -> bool + Send + Sync>;

/// A registered reply handler.
#[derive(Clone)]
pub struct ReplyHandlerSpec {
    name: String,
    filter: ReplyFilter,
    handler: BoxedHandler,
}

impl ReplyHandlerSpec {
    /// Creates a reply handler.
    pub fn new<F>(name: impl Into<String>, filter: F, handler: impl Handler) -> Self
    where
        F: Fn(&str, &MessageContext) -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            filter: Arc::new(filter),
            handler: into_handler(handler),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Evaluates the filter.
    pub fn matches(&self, ctx: &MessageContext) -> bool {
        (self.filter)(&ctx.text, ctx)
    }
}

impl std::fmt::Debug for ReplyHandlerSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplyHandlerSpec")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Ordered list of reply handlers.
#[derive(Default)]
pub struct ReplyChain {
    handlers: RwLock<Vec<Arc<ReplyHandlerSpec>>>,
}

impl ReplyChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a handler to the end of the chain.
    pub fn add(&self, spec: ReplyHandlerSpec) {
        debug!(handler = %spec.name, "Registered reply handler");
        self.handlers.write().push(Arc::new(spec));
    }

    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the first handler whose filter matches.
    ///
    /// Filters may keep state, so every call counts as an evaluation; use
    /// [`run`](Self::run) to match and invoke in one pass.
    pub fn first_match(&self, ctx: &MessageContext) -> Option<Arc<ReplyHandlerSpec>> {
        self.handlers
            .read()
            .iter()
            .find(|spec| spec.matches(ctx))
            .cloned()
    }

    /// Evaluates the filters once and runs the first match as a spawned task.
    ///
    /// Returns the handler's name and task, or `None` when no filter matches.
    /// A failing handler is logged; it is not retried and no later handler
    /// runs in its place.
    pub fn run(&self, args: DispatchArgs) -> Option<(String, JoinHandle<()>)> {
        let spec = self.first_match(&args.ctx)?;
        debug!(handler = %spec.name, message_id = %args.ctx.key.id, "Reply handler matched");

        let name = spec.name.clone();
        let task = tokio::spawn(
            async move {
                let message_id = args.ctx.key.id.clone();
                if let Err(e) = run_guarded(&spec.handler, args).await {
                    error!(handler = %spec.name, message_id = %message_id, error = %e, "Reply handler failed");
                }
            }
            .in_current_span(),
        );
        Some((name, task))
    }
}

impl std::fmt::Debug for ReplyChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplyChain")
            .field("handler_count", &self.len())
            .finish()
    }
}
