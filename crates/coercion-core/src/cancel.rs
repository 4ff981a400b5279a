use tokio_util::sync::CancellationToken;

/// Wraps [`tokio_util::sync::CancellationToken`] to model the hierarchical
/// stop cascade: `Stop(Plan) -> cancel(Plan body) -> cancel(current Block)
/// -> cancel(in-flight Sequences) -> cancel(current Action) -> cancel(plugin
/// context)`. Each level's token is a child of its parent's, so cancelling
/// a Plan cancels everything beneath it, but cancelling a Block does not
/// reach back up.
#[derive(Debug, Clone)]
pub struct Cancellation(CancellationToken);

impl Cancellation {
    pub fn new() -> Self {
        Self(CancellationToken::new())
    }

    pub fn child(&self) -> Self {
        Self(self.0.child_token())
    }

    /// A token that is never cancelled by this scope, no matter what happens
    /// to `self` afterwards. DeferredChecks run on one of these: the run
    /// still observes a fresh top-level token in case the *process* is
    /// shutting down, but never the Stop/failure cascade of its parent.
    pub fn detached() -> Self {
        Self(CancellationToken::new())
    }

    pub fn cancel(&self) {
        self.0.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.is_cancelled()
    }

    pub async fn cancelled(&self) {
        self.0.cancelled().await;
    }
}

impl Default for Cancellation {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn child_is_cancelled_when_parent_is() {
        let parent = Cancellation::new();
        let child = parent.child();
        assert!(!child.is_cancelled());
        parent.cancel();
        assert!(child.is_cancelled());
    }

    #[tokio::test]
    async fn parent_is_not_cancelled_when_child_is() {
        let parent = Cancellation::new();
        let child = parent.child();
        child.cancel();
        assert!(!parent.is_cancelled());
    }

    #[tokio::test]
    async fn detached_token_ignores_parent_cancellation() {
        let parent = Cancellation::new();
        let deferred = Cancellation::detached();
        parent.cancel();
        assert!(!deferred.is_cancelled());
    }
}
