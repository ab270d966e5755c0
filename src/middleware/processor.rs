use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use arc_swap::ArcSwap;
use tracing::debug;
use tracing::trace;

use super::Middleware;
use super::MiddlewareId;
use super::Next;
use super::Registered;
use crate::Result;

/// Ordered middleware chain over a context of type `T`.
///
/// The chain is swapped atomically on registration, so a chain that is running keeps the
/// snapshot it started with.
pub struct Processor<T>
where
    T: Send + 'static,
{
    name: &'static str,
    stack: ArcSwap<Vec<Registered<T>>>,
    next_id: AtomicU64,
}

impl<T> Processor<T>
where
    T: Send + 'static,
{
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            stack: ArcSwap::from_pointee(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Appends `middleware` to the end of the chain
    pub fn add_middleware(
        &self,
        middleware: Arc<dyn Middleware<T>>,
    ) -> MiddlewareId {
        let id = MiddlewareId(self.next_id.fetch_add(1, Ordering::SeqCst));
        debug!(processor = self.name, middleware = middleware.name(), "add middleware");
        self.stack.rcu(|stack| {
            let mut next = Vec::with_capacity(stack.len() + 1);
            next.extend(stack.iter().cloned());
            next.push(Registered {
                id,
                middleware: middleware.clone(),
            });
            next
        });
        id
    }

    /// Returns `false` when no middleware is registered under `id`
    pub fn remove_middleware(
        &self,
        id: MiddlewareId,
    ) -> bool {
        let previous = self.stack.rcu(|stack| {
            stack
                .iter()
                .filter(|registered| registered.id != id)
                .cloned()
                .collect::<Vec<_>>()
        });
        previous.iter().any(|registered| registered.id == id)
    }

    pub fn len(&self) -> usize {
        self.stack.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub async fn process(
        &self,
        ctx: &mut T,
    ) -> Result<()> {
        let stack = self.stack.load_full();
        trace!(processor = self.name, middlewares = stack.len(), "process");
        Next::new(&stack[..]).run(ctx).await
    }
}
