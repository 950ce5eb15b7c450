use std::sync::{Mutex, MutexGuard};

/// Locks `mutex`, recovering the guard if a callback panicked while holding it.
///
/// Guarded state here is always left consistent between statements, so a
/// poisoned lock carries no torn data.
pub(crate) fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}
