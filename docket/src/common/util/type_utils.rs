use std::sync::Arc;

use parking_lot::RwLock;

pub type Atomic<T> = Arc<RwLock<T>>;

#[inline]
pub fn atomic<T>(t: T) -> Atomic<T> {
    Arc::new(RwLock::new(t))
}

pub trait ReadExecutor<T: ?Sized> {
    fn read_with<R>(&self, f: impl FnOnce(&T) -> R) -> R;
}

impl<T> ReadExecutor<T> for Atomic<T> {
    #[inline]
    fn read_with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let read_guard = self.read();
        f(&*read_guard)
    }
}

pub trait WriteExecutor<T: ?Sized> {
    fn write_with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R;
}

impl<T> WriteExecutor<T> for Atomic<T> {
    #[inline]
    fn write_with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut write_guard = self.write();
        f(&mut *write_guard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_atomic() {
        let value = atomic("users/1".to_string());
        assert_eq!(value.read().as_str(), "users/1");
    }

    #[test]
    fn test_read_with() {
        let value = atomic(vec![1, 2, 3]);
        let len = value.read_with(|it| it.len());
        assert_eq!(len, 3);
    }

    #[test]
    fn test_write_with() {
        let value: Atomic<Option<String>> = atomic(None);
        value.write_with(|it| *it = Some("etag".to_string()));
        assert_eq!(value.read().as_deref(), Some("etag"));
    }

    #[test]
    fn test_shared_between_clones() {
        let first = atomic(0u64);
        let second = first.clone();
        second.write_with(|it| *it += 5);
        assert_eq!(first.read_with(|it| *it), 5);
    }
}
