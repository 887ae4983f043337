//! # RefPool
//!
//! A `RefPool` keeps the records of one object kind together with their reference
//! counts. Every record starts with one reference, owned by whoever created it. Other
//! objects add their own references when they depend on a record, and the record is
//! only disposed once the last reference is dropped.
//!
//! The pool itself never touches the backend. Whoever drops the last reference gets the
//! record back and is responsible for releasing its renderer resources.

use crate::utils::prelude::{HandleLike, ObjectPool};

struct Item<T> {
    rc: u32,
    value: T,
}

pub enum Released<T> {
    /// The record is still referenced, with the remaining count.
    Alive(u32),
    /// The last reference was dropped. The record is not reachable by its handle anymore.
    Disposed(T),
}

pub struct RefPool<H: HandleLike, T> {
    items: ObjectPool<H, Item<T>>,
}

impl<H: HandleLike, T> Default for RefPool<H, T> {
    fn default() -> Self {
        RefPool::new()
    }
}

impl<H: HandleLike, T> RefPool<H, T> {
    pub fn new() -> Self {
        RefPool {
            items: ObjectPool::new(),
        }
    }

    /// Stores `value` with a reference count of 1.
    #[inline]
    pub fn create(&mut self, value: T) -> H {
        self.items.create(Item { rc: 1, value })
    }

    #[inline]
    pub fn get(&self, handle: H) -> Option<&T> {
        self.items.get(handle).map(|e| &e.value)
    }

    #[inline]
    pub fn get_mut(&mut self, handle: H) -> Option<&mut T> {
        self.items.get_mut(handle).map(|e| &mut e.value)
    }

    #[inline]
    pub fn contains(&self, handle: H) -> bool {
        self.items.contains(handle)
    }

    #[inline]
    pub fn ref_count(&self, handle: H) -> Option<u32> {
        self.items.get(handle).map(|e| e.rc)
    }

    /// Adds a reference and returns the new count.
    pub fn add_ref(&mut self, handle: H) -> Option<u32> {
        self.items.get_mut(handle).map(|e| {
            e.rc += 1;
            e.rc
        })
    }

    /// Drops a reference. Returns `None` if the handle is stale.
    pub fn release(&mut self, handle: H) -> Option<Released<T>> {
        let rc = {
            let e = self.items.get_mut(handle)?;
            e.rc -= 1;
            e.rc
        };

        if rc > 0 {
            return Some(Released::Alive(rc));
        }

        self.items.free(handle).map(|e| Released::Disposed(e.value))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[inline]
    pub fn keys<'a>(&'a self) -> impl Iterator<Item = H> + 'a {
        self.items.keys()
    }

    #[inline]
    pub fn values_mut<'a>(&'a mut self) -> impl Iterator<Item = &'a mut T> + 'a {
        self.items.values_mut().map(|e| &mut e.value)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::utils::prelude::Handle;

    #[test]
    fn release() {
        let mut pool = RefPool::<Handle, &'static str>::new();
        let h = pool.create("a");
        assert_eq!(pool.add_ref(h), Some(2));

        match pool.release(h) {
            Some(Released::Alive(1)) => {}
            _ => panic!(),
        }

        match pool.release(h) {
            Some(Released::Disposed("a")) => {}
            _ => panic!(),
        }

        assert!(!pool.contains(h));
        assert!(pool.release(h).is_none());
        assert!(pool.add_ref(h).is_none());
    }
}
