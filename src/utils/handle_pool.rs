use super::handle::{HandleIndex, HandleLike};

/// `HandlePool` hands out versioned handles over a dense index space. A slot is
/// alive while its version is odd, freeing it bumps the version to the next even
/// number so that every outstanding handle to it goes stale.
#[derive(Debug)]
pub struct HandlePool<H: HandleLike> {
    versions: Vec<HandleIndex>,
    frees: Vec<HandleIndex>,
    _marker: ::std::marker::PhantomData<H>,
}

impl<H: HandleLike> Default for HandlePool<H> {
    fn default() -> Self {
        HandlePool::new()
    }
}

impl<H: HandleLike> HandlePool<H> {
    pub fn new() -> Self {
        HandlePool {
            versions: Vec::new(),
            frees: Vec::new(),
            _marker: ::std::marker::PhantomData,
        }
    }

    /// Creates a unused handle, recycling the most recently freed index first.
    pub fn create(&mut self) -> H {
        match self.frees.pop() {
            Some(index) => {
                let v = &mut self.versions[index as usize];
                *v += 1;
                H::new(index, *v)
            }
            None => {
                self.versions.push(1);
                H::new(self.versions.len() as HandleIndex - 1, 1)
            }
        }
    }

    #[inline]
    pub fn is_alive(&self, handle: H) -> bool {
        self.versions
            .get(handle.index() as usize)
            .map(|&v| v & 0x1 == 1 && v == handle.version())
            .unwrap_or(false)
    }

    /// Recycles the handle. Returns false if it was not alive.
    pub fn free(&mut self, handle: H) -> bool {
        if !self.is_alive(handle) {
            return false;
        }

        self.versions[handle.index() as usize] += 1;
        self.frees.push(handle.index());
        true
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.versions.len() - self.frees.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterates over every alive handle in index order.
    pub fn iter<'a>(&'a self) -> impl Iterator<Item = H> + 'a {
        self.versions
            .iter()
            .enumerate()
            .filter(|&(_, &v)| v & 0x1 == 1)
            .map(|(i, &v)| H::new(i as HandleIndex, v))
    }
}

#[cfg(test)]
mod test {
    use super::super::handle::Handle;
    use super::*;

    #[test]
    fn recycle() {
        let mut pool = HandlePool::<Handle>::new();
        let h1 = pool.create();
        let h2 = pool.create();
        assert_eq!(pool.len(), 2);
        assert!(pool.free(h1));
        assert!(!pool.free(h1));
        assert!(!pool.is_alive(h1));

        let h3 = pool.create();
        assert_eq!(h3.index(), h1.index());
        assert_ne!(h3.version(), h1.version());
        assert!(pool.is_alive(h2));
        assert!(pool.is_alive(h3));
        assert_eq!(pool.iter().collect::<Vec<_>>(), vec![h3, h2]);
    }
}
