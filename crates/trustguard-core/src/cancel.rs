use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{VerifyError, VerifyResult};

/// Cooperative cancellation flag shared between a stage and the work it
/// spawned.
///
/// Cancelling a token cancels every child derived from it; cancelling a
/// child leaves the parent untouched. Blocking provider code is expected to
/// call [`checkpoint`](Self::checkpoint) between units of work.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
    parent: Option<Box<CancellationToken>>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// A token that is cancelled when either it or `self` is cancelled.
    pub fn child(&self) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            parent: Some(Box::new(self.clone())),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
            || self
                .parent
                .as_ref()
                .map(|p| p.is_cancelled())
                .unwrap_or(false)
    }

    /// Returns `Cancelled` if the token has been signalled.
    pub fn checkpoint(&self, what: &str) -> VerifyResult<()> {
        if self.is_cancelled() {
            Err(VerifyError::Cancelled(what.to_string()))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_visible_through_clones() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_parent_cancels_child_not_reverse() {
        let parent = CancellationToken::new();
        let child = parent.child();
        child.cancel();
        assert!(!parent.is_cancelled());

        let child2 = parent.child();
        parent.cancel();
        assert!(child2.is_cancelled());
    }

    #[test]
    fn test_grandchild_sees_root_cancel() {
        let root = CancellationToken::new();
        let grandchild = root.child().child();
        root.cancel();
        assert!(grandchild.is_cancelled());
    }

    #[test]
    fn test_checkpoint_error() {
        let token = CancellationToken::new();
        assert!(token.checkpoint("rppg").is_ok());
        token.cancel();
        assert_eq!(
            token.checkpoint("rppg").unwrap_err(),
            VerifyError::Cancelled("rppg".into())
        );
    }
}
