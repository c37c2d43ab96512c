//! Process shutdown coordination.
//!
//! An explicit, ordered list of async release hooks. Components register a
//! hook when they acquire a long-lived resource; the process entry point
//! runs the coordinator once on the way out, invoking hooks in reverse
//! registration order so later-created resources release first.

use std::future::Future;

use futures::future::BoxFuture;
use parking_lot::Mutex;

type ReleaseHook = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

/// Ordered shutdown hooks for one process lifetime.
///
/// Construct one per process and pass it to every component that needs a
/// release hook. The hook list is guarded by a single mutex, touched only
/// at registration and shutdown time, never on the request path.
#[derive(Default)]
pub struct ShutdownCoordinator {
    hooks: Mutex<Vec<ReleaseHook>>,
}

impl ShutdownCoordinator {
    /// Create a coordinator with no hooks.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a release hook. Hooks run LIFO when
    /// [`ShutdownCoordinator::run`] is called.
    pub fn defer<F, Fut>(&self, hook: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.hooks.lock().push(Box::new(move || Box::pin(hook())));
    }

    /// Run all registered hooks in reverse registration order, awaiting
    /// each before starting the next.
    pub async fn run(self) {
        let mut hooks = self.hooks.into_inner();
        while let Some(hook) = hooks.pop() {
            hook().await;
        }
    }
}
