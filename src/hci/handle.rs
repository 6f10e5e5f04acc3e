use std::fmt::{Debug, Display, Formatter};
use std::num::NonZeroU16;

use crate::util::name_of;

/// Connection handle ([Vol 4] Part E, Section 5.4.2).
#[derive(Clone, Copy, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[repr(transparent)]
pub struct ConnHandle(NonZeroU16);

impl ConnHandle {
    /// Number of meaningful bits.
    pub(crate) const BITS: u16 = 12;
    /// Maximum valid connection handle.
    const MAX: u16 = 0xEFF;

    /// Wraps a raw connection handle, ignoring the packet boundary and
    /// broadcast flags of an ACL header. Returns `None` if the handle is
    /// invalid.
    #[inline]
    #[must_use]
    pub fn new(mut v: u16) -> Option<Self> {
        v &= (1 << Self::BITS) - 1;
        // SAFETY: v can't be 0xFFFF, so !v is never 0
        (v <= Self::MAX).then_some(Self(unsafe { NonZeroU16::new_unchecked(!v) }))
    }
}

impl From<ConnHandle> for u16 {
    #[inline]
    fn from(cn: ConnHandle) -> Self {
        !cn.0.get()
    }
}

impl Debug for ConnHandle {
    #[allow(clippy::use_self)]
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({:#05X})", name_of!(ConnHandle), u16::from(*self))
    }
}

impl Display for ConnHandle {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conn_handle() {
        assert_eq!(ConnHandle::new(0).map(u16::from), Some(0));
        assert_eq!(ConnHandle::new(0x2040).map(u16::from), Some(0x040));
        assert_eq!(ConnHandle::new(0xEFF).map(u16::from), Some(0xEFF));
        assert_eq!(ConnHandle::new(0xF00), None);
        assert_eq!(format!("{:?}", ConnHandle::new(0x40).unwrap()), "ConnHandle(0x040)");
    }
}
