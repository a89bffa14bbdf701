//! Process-wide operation registry.
//!
//! Repositories, security services and controllers never hold references to
//! each other. Each one registers the operations it answers under a unique
//! name at startup, and reaches the others by asking the bus. Any operation can
//! therefore be replaced by a stub in tests by registering a different handler
//! under the same name.
//!
//! Operations are marker types implementing [`Operation`], so both sides of a
//! call agree on the argument and result types at compile time. The registry
//! itself is keyed by [`Operation::NAME`].

use std::any::{Any, TypeId};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::errors::{BackendError, Result};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A named request/response operation.
pub trait Operation: Send + Sync + 'static {
    const NAME: &'static str;
    type Args: Send + 'static;
    type Output: Send + 'static;
}

type HandlerFn<O> = Arc<
    dyn Fn(<O as Operation>::Args) -> BoxFuture<'static, Result<<O as Operation>::Output>>
        + Send
        + Sync,
>;

struct Registration {
    type_id: TypeId,
    handler: Box<dyn Any + Send + Sync>,
}

#[derive(Default)]
pub struct Bus {
    handlers: DashMap<&'static str, Registration>,
}

impl Bus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the handler answering `O`. Fails if the name is taken.
    pub fn on_ask<O, F, Fut>(&self, handler: F) -> Result<()>
    where
        O: Operation,
        F: Fn(O::Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O::Output>> + Send + 'static,
    {
        let boxed: HandlerFn<O> = Arc::new(
            move |args: O::Args| -> BoxFuture<'static, Result<O::Output>> {
                Box::pin(handler(args))
            },
        );

        match self.handlers.entry(O::NAME) {
            Entry::Occupied(_) => Err(BackendError::DuplicateOperation(O::NAME)),
            Entry::Vacant(slot) => {
                slot.insert(Registration {
                    type_id: TypeId::of::<O>(),
                    handler: Box::new(boxed),
                });
                tracing::debug!(operation = O::NAME, "Registered operation");
                Ok(())
            }
        }
    }

    /// Invoke the handler registered for `O`. Handler failures are returned unchanged.
    pub async fn ask<O: Operation>(&self, args: O::Args) -> Result<O::Output> {
        let handler = {
            let registration = self
                .handlers
                .get(O::NAME)
                .ok_or(BackendError::UnknownOperation(O::NAME))?;
            if registration.type_id != TypeId::of::<O>() {
                return Err(BackendError::OperationTypeMismatch(O::NAME));
            }
            registration
                .handler
                .downcast_ref::<HandlerFn<O>>()
                .cloned()
                .ok_or(BackendError::OperationTypeMismatch(O::NAME))?
        };
        // The shard guard is released before awaiting so handlers may ask the bus in turn.
        handler(args).await
    }

    pub fn has(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Names of every registered operation, sorted.
    pub fn operations(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.handlers.iter().map(|e| *e.key()).collect();
        names.sort_unstable();
        names
    }

    /// Fail with `UnknownOperation` for the first missing name.
    pub fn require(&self, names: &[&'static str]) -> Result<()> {
        match names.iter().find(|name| !self.has(name)) {
            Some(name) => Err(BackendError::UnknownOperation(*name)),
            None => Ok(()),
        }
    }
}
