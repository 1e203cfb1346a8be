use std::sync::{Arc, Mutex, OnceLock, PoisonError};

/// A process-wide resource built at most once and shared read-only.
///
/// Construction runs under a mutex so concurrent first callers wait for a
/// single initializer. Once set, [`SharedResource::get_or_try_init`] is a
/// lock-free load plus an `Arc` clone. A failed initialization leaves the
/// slot empty and returns the error to the caller.
pub struct SharedResource<T> {
    value: OnceLock<Arc<T>>,
    init: Mutex<()>,
}

impl<T> SharedResource<T> {
    pub const fn new() -> Self {
        Self {
            value: OnceLock::new(),
            init: Mutex::new(()),
        }
    }

    pub fn get(&self) -> Option<Arc<T>> {
        self.value.get().cloned()
    }

    pub fn get_or_try_init<E, F>(&self, init: F) -> Result<Arc<T>, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        if let Some(value) = self.value.get() {
            return Ok(value.clone());
        }

        let _guard = self.init.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(value) = self.value.get() {
            return Ok(value.clone());
        }

        let value = Arc::new(init()?);
        Ok(self.value.get_or_init(|| value).clone())
    }
}

impl<T> Default for SharedResource<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn test_initializes_once_across_threads() {
        static RESOURCE: SharedResource<String> = SharedResource::new();
        static INITS: AtomicUsize = AtomicUsize::new(0);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                thread::spawn(|| {
                    RESOURCE
                        .get_or_try_init(|| {
                            INITS.fetch_add(1, Ordering::SeqCst);
                            thread::sleep(std::time::Duration::from_millis(20));
                            Ok::<_, ()>("weights".to_string())
                        })
                        .unwrap()
                })
            })
            .collect();

        let values: Vec<Arc<String>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(INITS.load(Ordering::SeqCst), 1);
        assert!(values.iter().all(|v| Arc::ptr_eq(v, &values[0])));
    }

    #[test]
    fn test_failed_init_can_be_retried() {
        let resource: SharedResource<u32> = SharedResource::new();
        let err = resource.get_or_try_init(|| Err("missing model")).unwrap_err();
        assert_eq!(err, "missing model");
        assert!(resource.get().is_none());

        let value = resource.get_or_try_init(|| Ok::<_, &str>(7)).unwrap();
        assert_eq!(*value, 7);
        assert_eq!(resource.get().as_deref(), Some(&7));
    }
}
