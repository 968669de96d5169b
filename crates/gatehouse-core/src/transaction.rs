//! Unit of work with post-commit hooks.
//!
//! Hooks registered on a [`UnitOfWork`] run only after the underlying store
//! transaction commits. A rollback, a failed commit, or simply dropping the
//! unit of work discards them.

use crate::ports::StoreTransaction;
use crate::Result;
use tracing::debug;

pub type CommitHook = Box<dyn FnOnce() + Send + 'static>;

pub struct UnitOfWork {
    tx: Box<dyn StoreTransaction>,
    hooks: Vec<CommitHook>,
}

impl UnitOfWork {
    pub fn new(tx: Box<dyn StoreTransaction>) -> Self {
        Self {
            tx,
            hooks: Vec::new(),
        }
    }

    /// The store operations of this unit of work.
    pub fn store(&mut self) -> &mut dyn StoreTransaction {
        self.tx.as_mut()
    }

    pub fn after_commit(&mut self, hook: impl FnOnce() + Send + 'static) {
        self.hooks.push(Box::new(hook));
    }

    pub fn pending_hooks(&self) -> usize {
        self.hooks.len()
    }

    pub async fn commit(self) -> Result<()> {
        let UnitOfWork { tx, hooks } = self;
        tx.commit().await?;
        debug!(hooks = hooks.len(), "Unit of work committed");
        for hook in hooks {
            hook();
        }
        Ok(())
    }

    pub async fn rollback(self) -> Result<()> {
        let UnitOfWork { tx, hooks } = self;
        debug!(discarded_hooks = hooks.len(), "Unit of work rolled back");
        drop(hooks);
        tx.rollback().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{PipelineName, StageIdentifier};
    use crate::run::PipelineInstance;
    use crate::Error;
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeTx {
        fail_commit: bool,
    }

    #[async_trait]
    impl StoreTransaction for FakeTx {
        async fn save_pipeline(&mut self, instance: PipelineInstance) -> Result<PipelineInstance> {
            Ok(instance)
        }

        async fn lock_pipeline(&mut self, _holder: &StageIdentifier) -> Result<()> {
            Ok(())
        }

        async fn unlock_pipeline(&mut self, _name: &PipelineName) -> Result<()> {
            Ok(())
        }

        async fn lock_holder(&mut self, _name: &PipelineName) -> Result<Option<StageIdentifier>> {
            Ok(None)
        }

        async fn commit(self: Box<Self>) -> Result<()> {
            if self.fail_commit {
                Err(Error::Database("commit failed".to_string()))
            } else {
                Ok(())
            }
        }

        async fn rollback(self: Box<Self>) -> Result<()> {
            Ok(())
        }
    }

    fn counting_hook(counter: &Arc<AtomicUsize>) -> impl FnOnce() + Send + 'static {
        let counter = counter.clone();
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_hooks_run_after_commit() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut uow = UnitOfWork::new(Box::new(FakeTx { fail_commit: false }));
        uow.after_commit(counting_hook(&fired));
        uow.after_commit(counting_hook(&fired));
        assert_eq!(uow.pending_hooks(), 2);
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        uow.commit().await.unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_hooks_discarded_on_rollback() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut uow = UnitOfWork::new(Box::new(FakeTx { fail_commit: false }));
        uow.after_commit(counting_hook(&fired));
        uow.rollback().await.unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_hooks_discarded_when_commit_fails() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut uow = UnitOfWork::new(Box::new(FakeTx { fail_commit: true }));
        uow.after_commit(counting_hook(&fired));
        assert!(uow.commit().await.is_err());
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
