use crate::application_port::AuthError;
use crate::domain_port::{StorageTx, TxManager};
use anyhow::anyhow;
use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, OwnedMutexGuard};

type Undo = Box<dyn FnOnce() + Send>;

/// Serialises transactions and rolls back through an undo journal. Writes
/// land immediately, so a transaction reads its own writes.
#[derive(Default)]
pub struct MemoryTxManager {
    gate: Arc<Mutex<()>>,
    commits: Arc<AtomicU64>,
    rollbacks: Arc<AtomicU64>,
}

impl MemoryTxManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commits(&self) -> u64 {
        self.commits.load(Ordering::SeqCst)
    }

    pub fn rollbacks(&self) -> u64 {
        self.rollbacks.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl TxManager for MemoryTxManager {
    async fn begin<'t>(&'t self) -> anyhow::Result<Box<dyn StorageTx<'t> + 't>> {
        let guard = self.gate.clone().lock_owned().await;
        Ok(Box::new(MemoryTx {
            undo: Vec::new(),
            finished: false,
            commits: self.commits.clone(),
            rollbacks: self.rollbacks.clone(),
            _guard: guard,
        }))
    }
}

pub struct MemoryTx {
    undo: Vec<Undo>,
    finished: bool,
    commits: Arc<AtomicU64>,
    rollbacks: Arc<AtomicU64>,
    _guard: OwnedMutexGuard<()>,
}

impl MemoryTx {
    pub fn on_rollback(&mut self, undo: impl FnOnce() + Send + 'static) {
        self.undo.push(Box::new(undo));
    }

    fn unwind(&mut self) {
        while let Some(undo) = self.undo.pop() {
            undo();
        }
        self.finished = true;
        self.rollbacks.fetch_add(1, Ordering::SeqCst);
    }
}

impl Drop for MemoryTx {
    fn drop(&mut self) {
        if !self.finished {
            self.unwind();
        }
    }
}

#[async_trait::async_trait]
impl<'t> StorageTx<'t> for MemoryTx {
    async fn commit(mut self: Box<Self>) -> anyhow::Result<()> {
        if self.finished {
            return Err(anyhow!("transaction already finished"));
        }
        self.undo.clear();
        self.finished = true;
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> anyhow::Result<()> {
        if !self.finished {
            self.unwind();
        }
        Ok(())
    }

    fn as_any_mut(&mut self) -> &mut (dyn Any + Send) {
        self
    }
}

pub fn downcast<'a, 't>(tx: &'a mut dyn StorageTx<'t>) -> Result<&'a mut MemoryTx, AuthError> {
    tx.as_any_mut()
        .downcast_mut::<MemoryTx>()
        .ok_or_else(|| AuthError::Store("not a memory transaction".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    #[tokio::test]
    async fn rollback_runs_undo_in_reverse() {
        let manager = MemoryTxManager::new();
        let log = Arc::new(StdMutex::new(Vec::new()));

        let mut tx = manager.begin().await.unwrap();
        for i in 0..3 {
            let log = log.clone();
            downcast(tx.as_mut())
                .unwrap()
                .on_rollback(move || log.lock().unwrap().push(i));
        }
        tx.rollback().await.unwrap();

        assert_eq!(*log.lock().unwrap(), vec![2, 1, 0]);
        assert_eq!(manager.rollbacks(), 1);
        assert_eq!(manager.commits(), 0);
    }

    #[tokio::test]
    async fn commit_discards_undo_and_dropping_rolls_back() {
        let manager = MemoryTxManager::new();
        let hits = Arc::new(AtomicU64::new(0));

        let mut tx = manager.begin().await.unwrap();
        let h = hits.clone();
        downcast(tx.as_mut()).unwrap().on_rollback(move || {
            h.fetch_add(1, Ordering::SeqCst);
        });
        tx.commit().await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        {
            let mut tx = manager.begin().await.unwrap();
            let h = hits.clone();
            downcast(tx.as_mut()).unwrap().on_rollback(move || {
                h.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(manager.commits(), 1);
    }
}
