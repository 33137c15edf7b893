use std::sync::{self, MutexGuard};

/// Adapter for `std::Mutex` that removes the poisoning aspects
/// from its api
/// The memory socket hub only holds the lock for a map lookup or insert,
/// there is no panic scenario after lock
#[derive(Debug)]
pub struct Mutex<T: ?Sized>(sync::Mutex<T>);

impl<T> Mutex<T> {
    #[inline]
    pub fn new(t: T) -> Mutex<T> {
        Mutex(sync::Mutex::new(t))
    }

    #[inline]
    pub fn lock(&self) -> MutexGuard<'_, T> {
        match self.0.lock() {
            Ok(guard) => guard,
            Err(p_err) => p_err.into_inner(),
        }
    }
}
