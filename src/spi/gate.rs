use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::{Error, Result};

/// Lock shared by every user of one physical SPI bus
///
/// Clones refer to the same lock. Other code driving the bus should hold
/// [`ExternalLock::lock`] while it does so.
#[derive(Debug, Clone, Default)]
pub struct ExternalLock(Arc<Mutex<()>>);

impl ExternalLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks until the lock is held. The lock guards no data, so a poisoned
    /// lock is simply taken over.
    pub fn lock(&self) -> MutexGuard<'_, ()> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether both handles refer to the same lock
    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl From<Arc<Mutex<()>>> for ExternalLock {
    fn from(lock: Arc<Mutex<()>>) -> Self {
        Self(lock)
    }
}

/// Optional mutual exclusion around SPI transfers
#[derive(Debug, Default)]
pub(crate) struct Gate {
    lock: Option<ExternalLock>,
}

impl Gate {
    /// Installs `lock`. Installing the lock already in place is accepted.
    pub(crate) fn install(&mut self, lock: ExternalLock) -> Result<()> {
        match &self.lock {
            Some(current) if current.same_as(&lock) => Ok(()),
            Some(_) => Err(Error::LockAlreadySet),
            None => {
                self.lock = Some(lock);
                Ok(())
            }
        }
    }

    /// Holds the lock, if any, until the guard is dropped.
    pub(crate) fn enter(&self) -> Option<MutexGuard<'_, ()>> {
        self.lock.as_ref().map(ExternalLock::lock)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_is_set_once() {
        let mut gate = Gate::default();
        assert!(gate.enter().is_none());

        let lock = ExternalLock::new();
        gate.install(lock.clone()).unwrap();
        gate.install(lock.clone()).unwrap();
        assert!(matches!(
            gate.install(ExternalLock::new()),
            Err(Error::LockAlreadySet)
        ));
        assert!(gate.enter().is_some());
    }

    #[test]
    fn entering_holds_the_shared_lock() {
        let mut gate = Gate::default();
        let lock = ExternalLock::new();
        gate.install(lock.clone()).unwrap();

        let held = gate.enter();
        assert!(lock.0.try_lock().is_err());
        drop(held);
        assert!(lock.0.try_lock().is_ok());
    }

    #[test]
    fn poisoned_lock_is_recovered() {
        let lock = ExternalLock::new();
        let poisoner = lock.clone();
        let _ = std::thread::spawn(move || {
            let _held = poisoner.lock();
            panic!("poison the bus lock");
        })
        .join();

        drop(lock.lock());
    }
}
