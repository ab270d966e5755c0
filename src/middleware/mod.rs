//! Ordered asynchronous middleware pipeline.
//!
//! A [`Processor`] runs its middlewares in registration order. Each middleware receives the
//! shared context plus a [`Next`] continuation and decides whether and when the rest of the
//! chain runs. Errors stop the chain and propagate to the caller of [`Processor::process`].
mod processor;

pub use processor::*;


use std::sync::Arc;

use async_trait::async_trait;

use crate::Result;

#[async_trait]
pub trait Middleware<T>: Send + Sync + 'static
where
    T: Send + 'static,
{
    /// Name used in logs
    fn name(&self) -> &'static str;

    async fn handle(
        &self,
        ctx: &mut T,
        next: Next<'_, T>,
    ) -> Result<()>;
}

/// Continuation over the middlewares that have not run yet
pub struct Next<'a, T>
where
    T: Send + 'static,
{
    rest: &'a [Registered<T>],
}

impl<'a, T> Next<'a, T>
where
    T: Send + 'static,
{
    pub(crate) fn new(rest: &'a [Registered<T>]) -> Self {
        Self { rest }
    }

    /// Runs the remaining chain. A terminal middleware simply never calls it.
    pub async fn run(
        self,
        ctx: &mut T,
    ) -> Result<()> {
        match self.rest.split_first() {
            Some((head, tail)) => head.middleware.handle(ctx, Next::new(tail)).await,
            None => Ok(()),
        }
    }

    pub fn remaining(&self) -> usize {
        self.rest.len()
    }
}

/// Handle returned on registration, used to remove the middleware again
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MiddlewareId(pub(crate) u64);

pub(crate) struct Registered<T>
where
    T: Send + 'static,
{
    pub(crate) id: MiddlewareId,
    pub(crate) middleware: Arc<dyn Middleware<T>>,
}

impl<T> Clone for Registered<T>
where
    T: Send + 'static,
{
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            middleware: self.middleware.clone(),
        }
    }
}
