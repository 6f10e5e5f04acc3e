//! Logical Link Control and Adaptation Protocol ([Vol 3] Part A).
//!
//! Only the fixed LE channels used by a peripheral are supported. Inbound
//! ACL fragments are recombined into basic information frames by
//! [`Reassembler`] and outbound frames are fragmented and flow-controlled by
//! [`AclQueue`].

use std::fmt::{Debug, Display, Formatter};

pub use {rx::*, tx::*};

mod rx;
mod tx;

/// ACL data packet header length ([Vol 4] Part E, Section 5.4.2).
pub(crate) const ACL_HDR: usize = 4;

/// Basic L2CAP header length ([Vol 3] Part A, Section 3.1).
pub(crate) const L2CAP_HDR: usize = 4;

/// Channel identifier ([Vol 3] Part A, Section 2.1).
#[derive(Clone, Copy, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[repr(transparent)]
pub struct Cid(pub(crate) u16);

impl Cid {
    /// Attribute protocol channel.
    pub const ATT: Self = Self(0x0004);
    /// LE signaling channel.
    pub const LE_SIGNAL: Self = Self(0x0005);
    /// Security Manager protocol channel.
    pub const SMP: Self = Self(0x0006);

    /// Wraps a raw channel identifier.
    #[inline(always)]
    #[must_use]
    pub const fn from_raw(v: u16) -> Self {
        Self(v)
    }
}

impl From<Cid> for u16 {
    #[inline(always)]
    fn from(cid: Cid) -> Self {
        cid.0
    }
}

impl Debug for Cid {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::ATT => f.write_str("ATT"),
            Self::LE_SIGNAL => f.write_str("LE_SIGNAL"),
            Self::SMP => f.write_str("SMP"),
            Self(cid) => write!(f, "Cid({cid:#06X})"),
        }
    }
}

impl Display for Cid {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(self, f)
    }
}

/// ACL packet boundary flag ([Vol 4] Part E, Section 5.4.2).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u16)]
pub(crate) enum Boundary {
    /// First non-automatically-flushable packet (host to controller).
    FirstNonFlush = 0b00,
    /// Continuing fragment.
    Cont = 0b01,
}

impl Boundary {
    /// Returns whether raw ACL header flags indicate the start of a PDU.
    /// Controllers mark the first fragment as automatically flushable (`0b10`),
    /// but `0b00` is accepted as well.
    #[inline(always)]
    pub const fn is_first(hdr: u16) -> bool {
        (hdr >> 12) & 0b11 != Self::Cont as u16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundary() {
        assert!(Boundary::is_first(0x2040));
        assert!(Boundary::is_first(0x0040));
        assert!(!Boundary::is_first(0x1040));
        assert_eq!(format!("{:?}", Cid::ATT), "ATT");
        assert_eq!(format!("{:?}", Cid::from_raw(0x40)), "Cid(0x0040)");
    }
}
