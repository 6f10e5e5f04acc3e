use std::fmt::{Debug, Display, Formatter};
use std::num::NonZeroU16;
use std::ops::{Bound, RangeBounds, RangeInclusive};

use crate::util::name_of;

/// Attribute handle ([Vol 3] Part F, Section 3.2.2). Handles are assigned
/// contiguously starting at `0x0001`.
#[derive(Clone, Copy, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[repr(transparent)]
pub struct Handle(NonZeroU16);

impl Handle {
    pub const MIN: Self = Self::from_raw(0x0001);
    pub const MAX: Self = Self::from_raw(0xFFFF);

    /// Wraps a raw handle. Returns `None` if the handle is invalid.
    #[inline]
    #[must_use]
    pub const fn new(h: u16) -> Option<Self> {
        match NonZeroU16::new(h) {
            Some(nz) => Some(Self(nz)),
            None => None,
        }
    }

    /// Returns the handle of the attribute at index `i` of a table.
    #[inline]
    #[must_use]
    pub(crate) fn from_index(i: usize) -> Option<Self> {
        u16::try_from(i + 1).ok().and_then(Self::new)
    }

    /// Returns the table index of the handle.
    #[inline(always)]
    #[must_use]
    pub(crate) const fn index(self) -> usize {
        self.0.get() as usize - 1
    }

    /// Returns the next handle or `None` if the maximum handle was reached.
    #[inline]
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        Self::new(self.0.get().wrapping_add(1))
    }

    /// Returns the previous handle or `None` for the first handle.
    #[inline]
    #[must_use]
    pub const fn prev(self) -> Option<Self> {
        Self::new(self.0.get() - 1)
    }

    const fn from_raw(h: u16) -> Self {
        match Self::new(h) {
            Some(h) => h,
            None => panic!("invalid handle"),
        }
    }
}

impl Debug for Handle {
    #[allow(clippy::use_self)]
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({:#06X})", name_of!(Handle), self.0.get())
    }
}

impl Display for Handle {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(self, f)
    }
}

impl From<Handle> for u16 {
    #[inline]
    fn from(h: Handle) -> Self {
        h.0.get()
    }
}

/// Inclusive range of attribute handles. This is a `Copy` version of
/// `RangeInclusive<Handle>`.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[must_use]
pub struct HandleRange {
    start: Handle,
    end: Handle,
}

impl HandleRange {
    /// Handle range that includes all possible handles.
    pub const ALL: Self = Self {
        start: Handle::MIN,
        end: Handle::MAX,
    };

    /// Creates a new handle range `start..=end` or returns `None` if
    /// `start > end`.
    #[inline]
    #[must_use]
    pub fn new(start: Handle, end: Handle) -> Option<Self> {
        (start <= end).then_some(Self { start, end })
    }

    /// Returns the starting handle.
    #[inline(always)]
    #[must_use]
    pub const fn start(self) -> Handle {
        self.start
    }

    /// Returns the ending handle.
    #[inline(always)]
    #[must_use]
    pub const fn end(self) -> Handle {
        self.end
    }

    /// Returns the table index range covered by `self`, clamped to a table of
    /// `n` attributes.
    #[inline]
    #[must_use]
    pub(crate) fn indices(self, n: usize) -> RangeInclusive<usize> {
        #[allow(clippy::reversed_empty_ranges)]
        n.checked_sub(1).map_or(1..=0, |last| {
            self.start.index()..=self.end.index().min(last)
        })
    }
}

impl RangeBounds<Handle> for HandleRange {
    #[inline]
    fn start_bound(&self) -> Bound<&Handle> {
        Bound::Included(&self.start)
    }

    #[inline]
    fn end_bound(&self) -> Bound<&Handle> {
        Bound::Included(&self.end)
    }
}

impl Default for HandleRange {
    /// Returns a handle range that includes all possible handles.
    #[inline(always)]
    fn default() -> Self {
        Self::ALL
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_size() {
        assert_eq!(std::mem::size_of::<Handle>(), 2);
        assert_eq!(std::mem::size_of::<Option<Handle>>(), 2);
        assert_eq!(std::mem::size_of::<HandleRange>(), 4);
    }

    #[test]
    fn range() {
        let h = |v| Handle::new(v).unwrap();
        assert!(HandleRange::new(h(2), h(1)).is_none());
        let r = HandleRange::new(h(2), h(10)).unwrap();
        assert!(r.contains(&h(2)) && r.contains(&h(10)) && !r.contains(&h(11)));
        assert_eq!(r.indices(5), 1..=4);
        assert!(HandleRange::new(h(8), h(9)).unwrap().indices(5).is_empty());
        assert!(HandleRange::ALL.indices(0).is_empty());
        assert_eq!(Handle::from_index(0), Some(Handle::MIN));
        assert_eq!(h(7).index(), 6);
        assert_eq!(format!("{}", h(0x2A)), "Handle(0x002A)");
    }
}
