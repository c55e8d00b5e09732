use std::{collections::BTreeSet, fmt};

/// Radio network temporary identifier.
///
/// Distinguishes the concurrent sessions of one base station. Two terminals
/// attached to different base stations may hold the same value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Rnti(u16);

impl Rnti {
    pub const fn new(value: u16) -> Self {
        Self(value)
    }

    #[inline]
    pub const fn into_u16(self) -> u16 {
        self.0
    }
}

impl fmt::Display for Rnti {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Per base station RNTI pool.
///
/// Values are handed out sequentially from `1`, wrapping back to `1` after
/// `u16::MAX` and skipping values still in use. `0` is never allocated.
#[derive(Debug, Clone)]
pub(crate) struct RntiAllocator {
    next: u16,
    in_use: BTreeSet<Rnti>,
}

impl RntiAllocator {
    pub(crate) fn new() -> Self {
        Self {
            next: 1,
            in_use: BTreeSet::new(),
        }
    }

    pub(crate) fn is_exhausted(&self) -> bool {
        self.in_use.len() >= u16::MAX as usize
    }

    /// Returns `None` when every non-zero value is in use.
    pub(crate) fn allocate(&mut self) -> Option<Rnti> {
        if self.is_exhausted() {
            return None;
        }

        loop {
            let candidate = Rnti(self.next);
            self.next = if self.next == u16::MAX { 1 } else { self.next + 1 };

            if self.in_use.insert(candidate) {
                return Some(candidate);
            }
        }
    }

    pub(crate) fn release(&mut self, rnti: Rnti) {
        self.in_use.remove(&rnti);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequential_from_one() {
        let mut pool = RntiAllocator::new();
        assert_eq!(pool.allocate(), Some(Rnti(1)));
        assert_eq!(pool.allocate(), Some(Rnti(2)));
        assert_eq!(pool.allocate(), Some(Rnti(3)));
    }

    #[test]
    fn released_values_are_not_reused_immediately() {
        let mut pool = RntiAllocator::new();
        let first = pool.allocate().unwrap();
        pool.release(first);
        assert_eq!(pool.allocate(), Some(Rnti(2)));
    }

    #[test]
    fn wraps_and_skips_values_in_use() {
        let mut pool = RntiAllocator::new();
        pool.next = u16::MAX;
        pool.in_use.insert(Rnti(1));

        assert_eq!(pool.allocate(), Some(Rnti(u16::MAX)));
        assert_eq!(pool.allocate(), Some(Rnti(2)));
    }

    #[test]
    fn exhausted() {
        let mut pool = RntiAllocator::new();
        for _ in 0..u16::MAX {
            assert!(pool.allocate().is_some());
        }
        assert!(pool.is_exhausted());
        assert_eq!(pool.allocate(), None);

        pool.release(Rnti(7));
        assert!(!pool.is_exhausted());
        assert_eq!(pool.allocate(), Some(Rnti(7)));
    }
}
