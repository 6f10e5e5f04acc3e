#![allow(clippy::use_self)]

use std::fmt::{Debug, Display, Formatter};
use std::hash::{Hash, Hasher};
use std::num::{NonZeroU128, NonZeroU16};
use std::ops::Deref;
use std::str::FromStr;

use structbuf::{Packer, Unpack};

const SHIFT: u32 = u128::BITS - u32::BITS;
const BASE: u128 = 0x00000000_0000_1000_8000_00805F9B34FB;
const MASK_16: u128 = !((u16::MAX as u128) << SHIFT);
const MASK_32: u128 = !((u32::MAX as u128) << SHIFT);

/// 16-, 32-, or 128-bit UUID ([Vol 3] Part B, Section 2.5.1).
///
/// All UUIDs are stored in their 128-bit form. On the ATT wire, assigned
/// 16-bit UUIDs use the 2-byte form and everything else uses 16 bytes.
#[derive(Clone, Copy, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[repr(transparent)]
pub struct Uuid(NonZeroU128);

impl Uuid {
    /// Number of bytes in the full UUID form.
    pub const BYTES: usize = std::mem::size_of::<u128>();

    /// Creates a UUID from a `u128`.
    #[inline]
    #[must_use]
    pub const fn new(v: u128) -> Option<Self> {
        match NonZeroU128::new(v) {
            Some(nz) => Some(Self(nz)),
            None => None,
        }
    }

    /// Returns a [`Uuid16`] representation or [`None`] if the UUID is not an
    /// assigned 16-bit UUID.
    #[inline]
    #[must_use]
    pub fn as_uuid16(self) -> Option<Uuid16> {
        self.as_u16().and_then(Uuid16::new)
    }

    /// Converts an assigned 16-bit Bluetooth SIG UUID to `u16`. This is
    /// mutually exclusive with `as_u32` and `as_u128`.
    #[inline]
    #[must_use]
    pub fn as_u16(self) -> Option<u16> {
        #[allow(clippy::cast_possible_truncation)]
        let v = (self.0.get() >> SHIFT) as u16;
        (self.0.get() & MASK_16 == BASE && v > 0).then_some(v)
    }

    /// Converts an assigned 32-bit Bluetooth SIG UUID to `u32`. This is
    /// mutually exclusive with `as_u16` and `as_u128`.
    #[inline]
    #[must_use]
    pub fn as_u32(self) -> Option<u32> {
        #[allow(clippy::cast_possible_truncation)]
        let v = (self.0.get() >> SHIFT) as u32;
        (self.0.get() & MASK_32 == BASE && v > u32::from(u16::MAX)).then_some(v)
    }

    /// Converts an unassigned UUID to `u128`. This is mutually exclusive with
    /// `as_u16` and `as_u32`.
    #[inline]
    #[must_use]
    pub fn as_u128(self) -> Option<u128> {
        (self.0.get() & MASK_32 != BASE).then_some(self.0.get())
    }

    /// Returns the UUID as a little-endian byte array.
    #[inline]
    #[must_use]
    pub const fn to_bytes(self) -> [u8; 16] {
        self.0.get().to_le_bytes()
    }

    /// Returns the shortest ATT encoding of the UUID (2 or 16 bytes,
    /// little-endian).
    #[inline]
    #[must_use]
    pub fn to_wire(self) -> UuidVec {
        UuidVec::new(self)
    }

    /// Returns the length of the ATT encoding.
    #[inline]
    #[must_use]
    pub fn wire_len(self) -> usize {
        if self.as_u16().is_some() {
            Uuid16::BYTES
        } else {
            Self::BYTES
        }
    }
}

impl From<Uuid16> for Uuid {
    #[inline]
    fn from(u: Uuid16) -> Self {
        u.as_uuid()
    }
}

impl TryFrom<&[u8]> for Uuid {
    type Error = ();

    #[inline]
    fn try_from(v: &[u8]) -> Result<Self, Self::Error> {
        match v.len() {
            2 => Uuid16::new(v.unpack().u16()).map(Uuid16::as_uuid),
            16 => Uuid::new(v.unpack().u128()),
            _ => None,
        }
        .ok_or(())
    }
}

/// Error returned when a UUID string cannot be parsed.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[error("invalid UUID: {0:?}")]
pub struct ParseUuidError(String);

impl FromStr for Uuid {
    type Err = ParseUuidError;

    /// Parses either a 4-digit assigned UUID (`"180D"`) or a 32-digit UUID
    /// with optional dashes (`"6E400001-B5A3-F393-E0A9-E50E24DCCA9E"`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseUuidError(s.to_owned());
        let hex: String = s.chars().filter(|&c| c != '-').collect();
        if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(err());
        }
        let u = match hex.len() {
            4 => u16::from_str_radix(&hex, 16)
                .ok()
                .and_then(Uuid16::new)
                .map(Uuid16::as_uuid),
            32 => u128::from_str_radix(&hex, 16).ok().and_then(Uuid::new),
            _ => None,
        };
        u.ok_or_else(err)
    }
}

impl Debug for Uuid {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        #[allow(clippy::cast_possible_truncation)]
        if let Some(v) = self.as_u16() {
            write!(f, "{v:#06X}")
        } else if let Some(v) = self.as_u32() {
            write!(f, "{v:#010X}")
        } else {
            let v = self.0.get();
            write!(
                f,
                "{:08X}-{:04X}-{:04X}-{:04X}-{:012X}",
                (v >> 96) as u32,
                (v >> 80) as u16,
                (v >> 64) as u16,
                (v >> 48) as u16,
                (v & ((1 << 48) - 1)) as u64
            )
        }
    }
}

impl Display for Uuid {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(self, f)
    }
}

impl From<Uuid> for u128 {
    #[inline]
    fn from(u: Uuid) -> Self {
        u.0.get()
    }
}

/// 16-bit Bluetooth SIG UUID.
#[derive(Clone, Copy, Eq, Ord, PartialEq, PartialOrd)]
#[repr(transparent)]
pub struct Uuid16(NonZeroU16);

impl Uuid16 {
    /// Number of bytes in the short UUID form.
    pub const BYTES: usize = std::mem::size_of::<u16>();

    /// Creates a 16-bit SIG UUID from a `u16`.
    #[inline]
    #[must_use]
    pub const fn new(v: u16) -> Option<Self> {
        match NonZeroU16::new(v) {
            Some(nz) => Some(Self(nz)),
            None => None,
        }
    }

    /// Returns 128-bit UUID representation.
    #[inline]
    #[must_use]
    pub const fn as_uuid(self) -> Uuid {
        // Shifting a non-zero u16 into the BASE gap can never produce zero
        match Uuid::new((self.0.get() as u128) << SHIFT | BASE) {
            Some(u) => u,
            None => unreachable!(),
        }
    }

    /// Returns the raw 16-bit UUID value.
    #[inline(always)]
    #[must_use]
    pub(crate) const fn raw(self) -> u16 {
        self.0.get()
    }

    /// Returns the UUID as a little-endian byte array.
    #[inline]
    #[must_use]
    pub const fn to_bytes(self) -> [u8; 2] {
        self.0.get().to_le_bytes()
    }
}

impl Debug for Uuid16 {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#06X}", self.0.get())
    }
}

impl Display for Uuid16 {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(self, f)
    }
}

#[allow(clippy::derived_hash_with_manual_eq)]
impl Hash for Uuid16 {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_uuid().hash(state);
    }
}

impl From<Uuid16> for u16 {
    #[inline]
    fn from(u: Uuid16) -> Self {
        u.raw()
    }
}

impl PartialEq<Uuid16> for Uuid {
    #[inline]
    fn eq(&self, rhs: &Uuid16) -> bool {
        *self == rhs.as_uuid()
    }
}

/// ATT wire encoding of a [`Uuid`], holding either 2 or 16 bytes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct UuidVec {
    n: u8,
    v: [u8; Uuid::BYTES],
}

impl UuidVec {
    /// Creates a vector representation of a UUID.
    #[must_use]
    pub fn new(u: Uuid) -> Self {
        let (n, v) = u.as_uuid16().map_or_else(
            || (Uuid::BYTES, u.to_bytes()),
            |u| {
                let mut v = [0; Uuid::BYTES];
                v[..Uuid16::BYTES].copy_from_slice(&u.to_bytes());
                (Uuid16::BYTES, v)
            },
        );
        #[allow(clippy::cast_possible_truncation)]
        Self { n: n as _, v }
    }
}

impl Deref for UuidVec {
    type Target = [u8];

    #[inline(always)]
    fn deref(&self) -> &Self::Target {
        &self.v[..usize::from(self.n)]
    }
}

impl AsRef<[u8]> for UuidVec {
    #[inline(always)]
    fn as_ref(&self) -> &[u8] {
        self
    }
}

/// Packer extension functions.
pub trait UuidPacker {
    /// Writes either a 16- or a 128-bit UUID at the current index.
    fn uuid(&mut self, u: impl Into<Uuid>) -> &mut Self;
}

impl UuidPacker for Packer<'_> {
    #[inline]
    fn uuid(&mut self, u: impl Into<Uuid>) -> &mut Self {
        self.put(u.into().to_wire())
    }
}

/// Creates an assigned 16-bit SIG UUID from a `u16`.
///
/// # Panics
///
/// Panics in const context if `v` is zero.
#[inline]
#[must_use]
pub(crate) const fn uuid16(v: u16) -> Uuid16 {
    match Uuid16::new(v) {
        Some(u) => u,
        None => panic!("zero UUID"),
    }
}

/// Provides conversions from a `repr(u16)` enum of assigned numbers into
/// [`Uuid`] and [`Uuid16`].
macro_rules! uuid16_enum {
    ($($t:ty)*) => {$(
        impl $t {
            /// Returns the `Uuid` representation of the variant.
            #[inline]
            #[must_use]
            pub const fn uuid(self) -> $crate::gap::Uuid {
                self.uuid16().as_uuid()
            }

            /// Returns the `Uuid16` representation of the variant.
            #[inline(always)]
            #[must_use]
            pub const fn uuid16(self) -> $crate::gap::Uuid16 {
                $crate::gap::uuid16(self as _)
            }
        }

        impl ::core::cmp::PartialEq<$t> for $crate::gap::Uuid {
            #[inline(always)]
            fn eq(&self, rhs: &$t) -> bool {
                *self == rhs.uuid()
            }
        }

        impl ::core::convert::From<$t> for $crate::gap::Uuid {
            #[inline]
            fn from(v: $t) -> Self {
                v.uuid()
            }
        }
    )*}
}
pub(crate) use uuid16_enum;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uuid16() {
        let u = Uuid16::new(0x180D).unwrap().as_uuid();
        assert_eq!(u.as_u16(), Some(0x180D));
        assert_eq!(u.as_u32(), None);
        assert_eq!(u.as_u128(), None);
        assert_eq!(&*u.to_wire(), &[0x0D, 0x18]);
        assert_eq!(u.wire_len(), 2);
        assert_eq!(format!("{u}"), "0x180D");
    }

    #[test]
    fn uuid128() {
        let u: Uuid = "6E400001-B5A3-F393-E0A9-E50E24DCCA9E".parse().unwrap();
        assert_eq!(u.as_u16(), None);
        assert_eq!(u.as_u128(), Some(0x6E400001_B5A3_F393_E0A9_E50E24DCCA9E));
        let w = u.to_wire();
        assert_eq!(w.len(), 16);
        assert_eq!(w[0], 0x9E);
        assert_eq!(w[15], 0x6E);
        assert_eq!(Uuid::try_from(&*w), Ok(u));
        assert_eq!(format!("{u}"), "6E400001-B5A3-F393-E0A9-E50E24DCCA9E");
    }

    #[test]
    fn parse() {
        assert_eq!("2a00".parse::<Uuid>().unwrap().as_u16(), Some(0x2A00));
        let base: Uuid = "0000180D00001000800000805F9B34FB".parse().unwrap();
        assert_eq!(base.as_u16(), Some(0x180D));
        assert!("".parse::<Uuid>().is_err());
        assert!("0000".parse::<Uuid>().is_err());
        assert!("12345".parse::<Uuid>().is_err());
        assert!("zz00".parse::<Uuid>().is_err());
    }

    #[test]
    fn from_bytes() {
        assert_eq!(
            Uuid::try_from([0x00, 0x28].as_ref()).unwrap().as_u16(),
            Some(0x2800)
        );
        assert!(Uuid::try_from([0x00, 0x00].as_ref()).is_err());
        assert!(Uuid::try_from([0x00; 4].as_ref()).is_err());
    }
}
