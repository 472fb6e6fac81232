//! Lock helpers shared by the in-memory backends and the scripted provider.

use std::sync::{Mutex, MutexGuard};

/// Extension trait for `Mutex` that ignores lock poisoning.
///
/// A poisoned lock only means another thread panicked while holding it; that
/// panic is the error worth reporting, so callers keep going with the guard.
pub trait IgnoreLock<T> {
    /// Lock the mutex, recovering the guard if the lock is poisoned.
    fn lock_ignore_poison(&self) -> MutexGuard<'_, T>;
}

impl<T> IgnoreLock<T> for Mutex<T> {
    fn lock_ignore_poison(&self) -> MutexGuard<'_, T> {
        match self.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn poisoned_lock_still_yields_guard() {
        let shared = Arc::new(Mutex::new(vec![1u32]));
        let clone = Arc::clone(&shared);
        let outcome = thread::spawn(move || {
            let _guard = clone.lock_ignore_poison();
            panic!("poison the lock");
        })
        .join();
        assert!(outcome.is_err());
        assert!(shared.is_poisoned());

        shared.lock_ignore_poison().push(2);
        assert_eq!(*shared.lock_ignore_poison(), vec![1, 2]);
    }
}
