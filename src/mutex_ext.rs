//! Poison-tolerant locking for the `std::sync::Mutex`-guarded SQLite connections.

use std::sync::{Mutex, MutexGuard};

pub trait MutexExt<T> {
    /// Locks the mutex, recovering the inner value if a previous holder panicked.
    fn lock_or_recover(&self) -> MutexGuard<'_, T>;
}

impl<T> MutexExt<T> for Mutex<T> {
    #[track_caller]
    fn lock_or_recover(&self) -> MutexGuard<'_, T> {
        match self.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                let loc = std::panic::Location::caller();
                tracing::error!(
                    mutex_type = std::any::type_name::<T>(),
                    file = loc.file(),
                    line = loc.line(),
                    "Mutex poisoned by a panicking holder, continuing with recovered state"
                );
                poisoned.into_inner()
            }
        }
    }
}
