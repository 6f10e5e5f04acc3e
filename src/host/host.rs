//! Host transport layer ([Vol 4] Part A).
//!
//! The stack does not open controllers itself. The application provides a
//! [`Transport`] that writes H4-framed packets to the controller and feeds
//! inbound packets to [`crate::peripheral::Peripheral::handle_packet`]. Byte
//! stream transports (UART, TCP) can use [`Framer`] to split the inbound
//! stream into packets.

use std::fmt::Debug;
use std::io;
use std::sync::Arc;

use structbuf::Unpacker;
use tracing::warn;

/// HCI packet indicators for the UART transport layer ([Vol 4] Part A,
/// Section 2).
#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    PartialEq,
    num_enum::IntoPrimitive,
    num_enum::TryFromPrimitive,
    strum::Display,
)]
#[non_exhaustive]
#[repr(u8)]
pub enum PacketType {
    Command = 0x01,
    Acl = 0x02,
    Sco = 0x03,
    Event = 0x04,
    Iso = 0x05,
}

impl PacketType {
    /// Returns the header length following the packet indicator and the
    /// offset and width of the parameter length field within that header.
    #[inline]
    const fn header(self) -> (usize, usize, usize) {
        match self {
            Self::Command => (3, 2, 1),
            Self::Acl => (4, 2, 2),
            Self::Sco => (3, 2, 1),
            Self::Event => (2, 1, 1),
            Self::Iso => (4, 2, 2),
        }
    }
}

/// HCI transport layer. Each call writes one complete packet, including the
/// packet indicator.
pub trait Transport: Debug + Send + Sync {
    /// Writes an H4-framed packet to the controller.
    fn write(&self, pkt: &[u8]) -> io::Result<()>;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    #[inline(always)]
    fn write(&self, pkt: &[u8]) -> io::Result<()> {
        (**self).write(pkt)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    #[inline(always)]
    fn write(&self, pkt: &[u8]) -> io::Result<()> {
        (**self).write(pkt)
    }
}

/// Splits an inbound H4 byte stream into complete packets.
#[derive(Debug, Default)]
pub struct Framer {
    buf: Vec<u8>,
}

impl Framer {
    /// Creates an empty framer.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Appends received bytes to the stream buffer.
    #[inline]
    pub fn extend(&mut self, b: &[u8]) {
        self.buf.extend_from_slice(b);
    }

    /// Removes and returns the next complete packet, if any. Bytes that do not
    /// start a known packet type are discarded.
    pub fn next_packet(&mut self) -> Option<Vec<u8>> {
        loop {
            let &ind = self.buf.first()?;
            let Ok(typ) = PacketType::try_from(ind) else {
                warn!("Discarding stray byte: {ind:#04X}");
                self.buf.remove(0);
                continue;
            };
            let (hdr, off, width) = typ.header();
            if self.buf.len() < 1 + hdr {
                return None;
            }
            let mut p = Unpacker::new(&self.buf[1 + off..1 + off + width]);
            let n = if width == 1 {
                usize::from(p.u8())
            } else {
                usize::from(p.u16() & 0x3FFF)
            };
            let total = 1 + hdr + n;
            if self.buf.len() < total {
                return None;
            }
            let rest = self.buf.split_off(total);
            return Some(std::mem::replace(&mut self.buf, rest));
        }
    }
}

/// Transport that records every written packet.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct Recorder(parking_lot::Mutex<Vec<Vec<u8>>>);

#[cfg(test)]
impl Recorder {
    /// Removes and returns all recorded packets.
    pub fn take(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut *self.0.lock())
    }
}

#[cfg(test)]
impl Transport for Recorder {
    fn write(&self, pkt: &[u8]) -> io::Result<()> {
        self.0.lock().push(pkt.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn framer() {
        let mut f = Framer::new();
        f.extend(&[0xFF, 0x04, 0x0E, 0x04, 0x01]);
        assert_eq!(f.next_packet(), None);
        f.extend(&[0x03, 0x0C, 0x00, 0x02, 0x40, 0x20, 0x01]);
        assert_eq!(
            f.next_packet(),
            Some(vec![0x04, 0x0E, 0x04, 0x01, 0x03, 0x0C, 0x00])
        );
        assert_eq!(f.next_packet(), None);
        f.extend(&[0x00, 0xAA]);
        assert_eq!(f.next_packet(), Some(vec![0x02, 0x40, 0x20, 0x01, 0x00, 0xAA]));
        assert_eq!(f.next_packet(), None);
    }
}
