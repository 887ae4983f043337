//! Handles and the pools that hand them out.

#[macro_use]
pub mod handle;
pub mod handle_pool;
pub mod object_pool;

pub mod prelude {
    pub use super::handle::{Handle, HandleIndex, HandleLike};
    pub use super::handle_pool::HandlePool;
    pub use super::object_pool::ObjectPool;
}

/// Checks whether `[offset, offset + size)` reaches past `len`, overflow included.
#[inline]
pub fn out_of_range(offset: usize, size: usize, len: usize) -> bool {
    offset.checked_add(size).map_or(true, |end| end > len)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn ranges() {
        assert!(!out_of_range(0, 4, 4));
        assert!(!out_of_range(4, 0, 4));
        assert!(out_of_range(1, 4, 4));
        assert!(out_of_range(usize::max_value(), 2, 256));
    }
}
