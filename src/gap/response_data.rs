//! Length-type-value response data format used in the Advertising Data (AD)
//! and Scan Response Data (SRD) blocks:
//!
//! * [Vol 3] Part C, Section 11
//! * [Core Specification Supplement] Part A, Section 1
//! * [Assigned Numbers] Section 2.3

use structbuf::{Pack, Packer, StructBuf};

use super::{AdvFlag, ResponseDataType, Uuid, Uuid16};
use crate::hci::{self, MAX_ADV_DATA_LEN};

/// Legacy advertising response data builder. Fields that do not fit in the
/// 31-byte payload are shortened or omitted.
#[derive(Clone, Debug)]
pub struct ResponseDataMut(StructBuf);

impl ResponseDataMut {
    /// Creates a new response data buffer.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(StructBuf::new(MAX_ADV_DATA_LEN))
    }

    /// Returns the final response data buffer.
    #[allow(clippy::missing_const_for_fn)]
    #[inline]
    #[must_use]
    pub fn get(self) -> StructBuf {
        self.0
    }

    /// Appends service class UUIDs (\[CSS\] Part A, Section 1.1). 16-bit and
    /// 128-bit UUIDs go into separate lists, each marked incomplete if some
    /// of its UUIDs were dropped.
    pub fn service_class(&mut self, uuids: &[Uuid]) -> &mut Self {
        let (short, long): (Vec<Uuid>, Vec<Uuid>) =
            uuids.iter().copied().partition(|u| u.as_u16().is_some());
        self.uuid_list(ResponseDataType::IncompleteServiceClass16, Uuid16::BYTES, &short);
        self.uuid_list(ResponseDataType::IncompleteServiceClass128, Uuid::BYTES, &long)
    }

    /// Appends the complete local device name, or the shortened name if the
    /// complete one does not fit (\[CSS\] Part A, Section 1.2).
    pub fn local_name(&mut self, v: &str) -> &mut Self {
        let Some(avail) = self.avail() else {
            return self;
        };
        let (typ, n) = if v.len() <= avail {
            (ResponseDataType::CompleteLocalName, v.len())
        } else {
            let mut n = avail;
            while !v.is_char_boundary(n) {
                n -= 1;
            }
            (ResponseDataType::ShortLocalName, n)
        };
        self.put(typ, |b| {
            b.put(&v.as_bytes()[..n]);
        })
    }

    /// Appends advertising flags (\[CSS\] Part A, Section 1.3).
    pub fn flags(&mut self, v: AdvFlag) -> &mut Self {
        if self.avail().is_none() {
            return self;
        }
        self.put(ResponseDataType::Flags, |b| {
            b.u8(v.bits());
        })
    }

    /// Appends raw manufacturer-specific data, including the company
    /// identifier (\[CSS\] Part A, Section 1.4).
    pub fn manufacturer_data(&mut self, v: &[u8]) -> hci::Result<&mut Self> {
        if self.avail().map_or(true, |n| n < v.len()) {
            return Err(hci::Error::AdvDataTooLong(self.0.len() + 2 + v.len()));
        }
        Ok(self.put(ResponseDataType::ManufacturerData, |b| {
            b.put(v);
        }))
    }

    /// Appends a UUID list of type `typ` (incomplete) or `typ + 1`
    /// (complete) with as many UUIDs as fit.
    fn uuid_list(&mut self, typ: ResponseDataType, size: usize, uuids: &[Uuid]) -> &mut Self {
        if uuids.is_empty() {
            return self;
        }
        let n = self.avail().map_or(0, |avail| uuids.len().min(avail / size));
        if n == 0 {
            return self;
        }
        let typ = u8::from(typ) + u8::from(n == uuids.len());
        self.put(typ, |b| {
            for u in &uuids[..n] {
                b.put(u.to_wire());
            }
        })
    }

    /// Returns the number of data bytes available for one more field or
    /// [`None`] if the buffer is full.
    #[inline]
    fn avail(&self) -> Option<usize> {
        MAX_ADV_DATA_LEN.checked_sub(self.0.len() + 2)
    }

    /// Appends a length-type-data field to the buffer, calling `f` to provide
    /// the data. The caller guarantees that the field fits.
    fn put<T: Into<u8>>(&mut self, typ: T, f: impl FnOnce(&mut Packer)) -> &mut Self {
        let i = self.0.len();
        f(self.0.append().put([0, typ.into()]));
        #[allow(clippy::cast_possible_truncation)]
        let n = (self.0.len() - i - 1) as u8;
        self.0[i] = n;
        self
    }
}

impl Default for ResponseDataMut {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}
