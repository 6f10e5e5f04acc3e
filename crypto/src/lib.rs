//! Bluetooth LE legacy pairing cryptographic toolbox
//! ([Vol 3] Part H, Section 2.2).

#![warn(missing_debug_implementations)]
#![warn(non_ascii_idents)]
#![warn(single_use_lifetimes)]
#![warn(unused_crate_dependencies)]
#![warn(unused_extern_crates)]
#![warn(unused_import_braces)]
#![warn(unused_lifetimes)]
#![warn(unused_qualifications)]
#![warn(variant_size_differences)]
#![warn(clippy::cargo)]
#![warn(clippy::nursery)]
#![warn(clippy::pedantic)]
#![allow(clippy::enum_glob_use)]
#![allow(clippy::inline_always)]
#![allow(clippy::module_name_repetitions)]
// #![warn(clippy::restriction)]
#![warn(clippy::assertions_on_result_states)]
#![warn(clippy::clone_on_ref_ptr)]
#![warn(clippy::dbg_macro)]
#![warn(clippy::decimal_literal_representation)]
#![warn(clippy::default_union_representation)]
#![warn(clippy::deref_by_slicing)]
#![warn(clippy::empty_drop)]
#![warn(clippy::empty_structs_with_brackets)]
#![warn(clippy::exhaustive_enums)]
#![warn(clippy::exit)]
#![warn(clippy::fn_to_numeric_cast_any)]
#![warn(clippy::format_push_string)]
#![warn(clippy::get_unwrap)]
#![warn(clippy::if_then_some_else_none)]
#![warn(clippy::lossy_float_literal)]
#![warn(clippy::missing_enforced_import_renames)]
#![warn(clippy::mixed_read_write_in_expression)]
#![warn(clippy::mod_module_files)]
#![warn(clippy::mutex_atomic)]
#![warn(clippy::pattern_type_mismatch)]
#![warn(clippy::print_stdout)]
#![warn(clippy::rc_buffer)]
#![warn(clippy::rc_mutex)]
#![warn(clippy::rest_pat_in_fully_bound_structs)]
//#![warn(clippy::semicolon_outside_block)]
#![warn(clippy::str_to_string)]
#![warn(clippy::string_add)]
#![warn(clippy::string_to_string)]
#![warn(clippy::suspicious_xor_used_as_pow)]
#![warn(clippy::todo)]
#![warn(clippy::try_err)]
#![warn(clippy::undocumented_unsafe_blocks)]
#![warn(clippy::unnecessary_safety_comment)]
#![warn(clippy::unnecessary_safety_doc)]
#![warn(clippy::unnecessary_self_imports)]
#![warn(clippy::unneeded_field_pattern)]
#![warn(clippy::unseparated_literal_suffix)]

use std::fmt::{Debug, Formatter};
use std::mem;

use aes::cipher::{BlockEncrypt, KeyInit};
use aes::{cipher, Aes128};
use rand_core::RngCore;
use subtle::{Choice, ConstantTimeEq};

/// Provides a [`Debug`] implementation for a type containing sensitive data.
macro_rules! debug_secret {
    ($T:ty) => {
        impl Debug for $T {
            #[inline]
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                f.debug_tuple(stringify!($T)).field(&"<secret>").finish()
            }
        }
    };
}

/// 128-bit secret key, such as a Temporary Key (TK), Short Term Key (STK), or
/// Long Term Key (LTK).
///
/// The key is stored in the big-endian byte order expected by AES-128. SMP
/// transfers keys in little-endian byte order.
#[derive(Clone, Default, zeroize::Zeroize, zeroize::ZeroizeOnDrop)]
#[must_use]
#[repr(transparent)]
pub struct Key(cipher::Key<Aes128>);

debug_secret!(Key);

impl Key {
    /// Creates a key from a `u128` value.
    #[inline(always)]
    pub fn new(k: u128) -> Self {
        Self(k.to_be_bytes().into())
    }

    /// Creates a key from its little-endian wire representation.
    #[inline]
    pub fn from_le_bytes(mut b: [u8; 16]) -> Self {
        b.reverse();
        Self(b.into())
    }

    /// Returns the key in little-endian byte order.
    #[inline]
    #[must_use]
    pub fn to_le_bytes(&self) -> [u8; 16] {
        let mut b: [u8; 16] = *self.0.as_ref();
        b.reverse();
        b
    }

    /// Security function `e` ([Vol 3] Part H, Section 2.2.1). Encrypts a
    /// single 128-bit block with AES-128.
    #[inline]
    #[must_use]
    pub fn e(&self, x: u128) -> u128 {
        let mut b = cipher::Block::<Aes128>::from(x.to_be_bytes());
        Aes128::new(&self.0).encrypt_block(&mut b);
        u128::from_be_bytes(*b.as_ref())
    }

    /// Legacy pairing confirm value generation function `c1`
    /// ([Vol 3] Part H, Section 2.2.3). `preq` and `pres` are the complete
    /// Pairing Request and Response commands, including the opcode, in the
    /// order they were transferred. `ia` is the initiating device address and
    /// `ra` is the responding device address.
    #[inline]
    pub fn c1(&self, r: u128, preq: &[u8; 7], pres: &[u8; 7], ia: Addr, ra: Addr) -> Confirm {
        let mut p1 = [0; 16];
        p1[0] = ia.0[0];
        p1[1] = ra.0[0];
        p1[2..9].copy_from_slice(preq);
        p1[9..].copy_from_slice(pres);
        let mut p2 = [0; 16];
        p2[..6].copy_from_slice(&ra.0[1..]);
        p2[6..12].copy_from_slice(&ia.0[1..]);
        let p1 = u128::from_le_bytes(p1);
        let p2 = u128::from_le_bytes(p2);
        Confirm(self.e(self.e(r ^ p1) ^ p2))
    }

    /// Legacy pairing key generation function `s1`
    /// ([Vol 3] Part H, Section 2.2.4). Only the least significant 64 bits of
    /// `r1` and `r2` are used.
    #[inline]
    pub fn s1(&self, r1: u128, r2: u128) -> Self {
        #[allow(clippy::cast_possible_truncation)]
        let r = u128::from(r1 as u64) << 64 | u128::from(r2 as u64);
        Self::new(self.e(r))
    }
}

impl ConstantTimeEq for Key {
    #[inline(always)]
    fn ct_eq(&self, other: &Self) -> Choice {
        self.0.as_slice().ct_eq(other.0.as_slice())
    }
}

impl PartialEq for Key {
    #[inline(always)]
    fn eq(&self, other: &Self) -> bool {
        bool::from(self.ct_eq(other))
    }
}

impl Eq for Key {}

impl serde::Serialize for Key {
    #[inline]
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        self.to_le_bytes().serialize(s)
    }
}

impl<'de> serde::Deserialize<'de> for Key {
    #[inline]
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        <[u8; 16]>::deserialize(d).map(Self::from_le_bytes)
    }
}

/// Device address type and value used as `c1` input. The first byte is the
/// address type (0 = public, 1 = random) followed by the address in
/// little-endian byte order.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[must_use]
#[repr(transparent)]
pub struct Addr([u8; 7]);

impl Addr {
    /// Creates a `c1` address from its type and little-endian value.
    #[inline]
    pub fn new(random: bool, le: [u8; 6]) -> Self {
        let mut b = [u8::from(random); 7];
        b[1..].copy_from_slice(&le);
        Self(b)
    }
}

/// 128-bit pairing confirm value with constant-time comparison.
#[derive(Clone, Copy, Debug, Eq)]
#[must_use]
#[repr(transparent)]
pub struct Confirm(u128);

impl Confirm {
    /// Creates a confirm value from its little-endian wire representation.
    #[inline(always)]
    pub const fn from_le_bytes(b: [u8; 16]) -> Self {
        Self(u128::from_le_bytes(b))
    }

    /// Returns the confirm value in little-endian byte order.
    #[inline(always)]
    #[must_use]
    pub const fn to_le_bytes(self) -> [u8; 16] {
        self.0.to_le_bytes()
    }
}

impl ConstantTimeEq for Confirm {
    #[inline(always)]
    fn ct_eq(&self, other: &Self) -> Choice {
        self.0.ct_eq(&other.0)
    }
}

impl PartialEq for Confirm {
    #[inline(always)]
    fn eq(&self, other: &Self) -> bool {
        bool::from(self.ct_eq(other))
    }
}

impl From<Confirm> for u128 {
    #[inline(always)]
    fn from(v: Confirm) -> Self {
        v.0
    }
}

/// 128-bit random nonce value.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[must_use]
#[repr(transparent)]
pub struct Nonce(u128);

impl Nonce {
    /// Obtains a new random nonce value from the OS CSPRNG.
    #[inline]
    pub fn new() -> Self {
        let mut b = [0; mem::size_of::<u128>()];
        rand_core::OsRng.fill_bytes(b.as_mut_slice());
        Self(u128::from_ne_bytes(b))
    }

    /// Creates a nonce from its little-endian wire representation.
    #[inline(always)]
    pub const fn from_le_bytes(b: [u8; 16]) -> Self {
        Self(u128::from_le_bytes(b))
    }

    /// Returns the nonce in little-endian byte order.
    #[inline(always)]
    #[must_use]
    pub const fn to_le_bytes(self) -> [u8; 16] {
        self.0.to_le_bytes()
    }
}

impl From<u128> for Nonce {
    #[inline(always)]
    fn from(v: u128) -> Self {
        Self(v)
    }
}

impl From<Nonce> for u128 {
    #[inline(always)]
    fn from(v: Nonce) -> Self {
        v.0
    }
}

#[allow(clippy::unusual_byte_groupings)]
#[cfg(test)]
mod tests {
    use super::*;

    const fn addr(random: bool, be: u64) -> Addr {
        let b = be.to_le_bytes();
        Addr([random as u8, b[0], b[1], b[2], b[3], b[4], b[5]])
    }

    #[test]
    fn nonce() {
        assert_ne!(Nonce::new().0, Nonce::new().0);
    }

    #[test]
    fn key_byte_order() {
        let k = Key::new(0x00112233_44556677_8899AABB_CCDDEEFF);
        assert_eq!(k.to_le_bytes()[0], 0xFF);
        assert_eq!(k.to_le_bytes()[15], 0x00);
        assert_eq!(Key::from_le_bytes(k.to_le_bytes()), k);
        assert_ne!(k, Key::new(0));
        assert_eq!(format!("{k:?}"), "Key(\"<secret>\")");
    }

    /// [Vol 3] Part H, Section 2.2.3.
    #[test]
    fn c1() {
        let preq = 0x07071000000101_u64.to_le_bytes();
        let pres = 0x05000800000302_u64.to_le_bytes();
        let c = Key::new(0).c1(
            0x5783D521_56AD6F0E_6388274E_C6702EE0,
            preq[..7].try_into().unwrap(),
            pres[..7].try_into().unwrap(),
            addr(true, 0xA1A2A3A4A5A6),
            addr(false, 0xB1B2B3B4B5B6),
        );
        assert_eq!(u128::from(c), 0x1e1e3fef_878988ea_d2a74dc5_bef13b86);
        assert_eq!(Confirm::from_le_bytes(c.to_le_bytes()), c);
    }

    /// [Vol 3] Part H, Section 2.2.4.
    #[test]
    fn s1() {
        let k = Key::new(0).s1(
            0x000F0E0D_0C0B0A09_11223344_55667788,
            0x01020304_05060708_99AABBCC_DDEEFF00,
        );
        assert_eq!(k, Key::new(0x9a1fe1f0_e8b0f49b_5b4216ae_796da062));
    }
}
