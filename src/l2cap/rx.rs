use std::collections::HashMap;

use structbuf::Unpacker;
use tracing::{trace, warn};

use crate::hci::ConnHandle;

use super::*;

/// Complete basic information frame received on a fixed channel.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Frame {
    pub hdl: ConnHandle,
    pub cid: Cid,
    pub data: Vec<u8>,
}

/// Partially received PDU.
#[derive(Debug)]
struct Partial {
    cid: Cid,
    len: usize,
    buf: Vec<u8>,
}

/// Inbound ACL data recombination ([Vol 3] Part A, Section 7.2). Start
/// fragments whose declared L2CAP length matches their payload are delivered
/// immediately. Others are buffered per connection handle until continuation
/// fragments complete them.
#[derive(Debug, Default)]
pub struct Reassembler {
    partial: HashMap<ConnHandle, Partial>,
}

impl Reassembler {
    /// Creates an empty reassembler.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Recombines an ACL data packet (without the packet indicator). Returns
    /// the complete frame once all of its fragments have been received.
    pub fn push(&mut self, pkt: &[u8]) -> Option<Frame> {
        trace!("ACL fragment: {pkt:02X?}");
        let mut p = Unpacker::new(pkt);
        let (raw, len) = (p.u16(), p.u16());
        let data = p.into_inner();
        if pkt.len() < ACL_HDR || data.len() != usize::from(len) {
            warn!("ACL data packet length mismatch: {pkt:02X?}");
            return None;
        }
        let Some(hdl) = ConnHandle::new(raw) else {
            warn!("ACL data packet with an invalid handle: {pkt:02X?}");
            return None;
        };
        if Boundary::is_first(raw) {
            return self.first(hdl, data);
        }
        let Some(pdu) = self.partial.get_mut(&hdl) else {
            trace!("Continuation fragment for {hdl} without a start fragment");
            return None;
        };
        let rem = pdu.len - pdu.buf.len();
        if rem < data.len() {
            warn!(
                "PDU fragment for {hdl} exceeds expected length (want={rem}, have={})",
                data.len()
            );
            self.partial.remove(&hdl);
            return None;
        }
        pdu.buf.extend_from_slice(data);
        if pdu.buf.len() < pdu.len {
            return None;
        }
        let pdu = self.partial.remove(&hdl)?;
        Some(Frame {
            hdl,
            cid: pdu.cid,
            data: pdu.buf,
        })
    }

    /// Discards any partial PDU for the specified connection.
    #[inline]
    pub fn remove(&mut self, hdl: ConnHandle) {
        self.partial.remove(&hdl);
    }

    /// Handles the start of a new PDU.
    fn first(&mut self, hdl: ConnHandle, data: &[u8]) -> Option<Frame> {
        if let Some(old) = self.partial.remove(&hdl) {
            warn!(
                "Discarding incomplete PDU for {hdl} ({} of {} bytes)",
                old.buf.len(),
                old.len
            );
        }
        let mut p = Unpacker::new(data);
        let (len, cid) = (usize::from(p.u16()), Cid(p.u16()));
        if !p.is_ok() {
            warn!("ACL data packet with missing L2CAP header: {data:02X?}");
            return None;
        }
        let payload = &data[L2CAP_HDR..];
        if len < payload.len() {
            warn!("PDU length mismatch: {data:02X?}");
            return None;
        }
        if len == payload.len() {
            return Some(Frame {
                hdl,
                cid,
                data: payload.to_vec(),
            });
        }
        let mut buf = Vec::with_capacity(len);
        buf.extend_from_slice(payload);
        self.partial.insert(hdl, Partial { cid, len, buf });
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn acl(raw: u16, data: &[u8]) -> Vec<u8> {
        let mut v = Vec::new();
        v.extend_from_slice(&raw.to_le_bytes());
        v.extend_from_slice(&u16::try_from(data.len()).unwrap().to_le_bytes());
        v.extend_from_slice(data);
        v
    }

    #[test]
    fn single() {
        let mut r = Reassembler::new();
        let f = r.push(&acl(0x2040, &[3, 0, 4, 0, 0x02, 0x17, 0x00])).unwrap();
        assert_eq!(u16::from(f.hdl), 0x40);
        assert_eq!(f.cid, Cid::ATT);
        assert_eq!(f.data, [0x02, 0x17, 0x00]);
    }

    #[test]
    fn fragmented() {
        let pdu: Vec<u8> = (0..40).collect();
        let mut l2cap = vec![40, 0, 6, 0];
        l2cap.extend_from_slice(&pdu);
        let mut r = Reassembler::new();
        assert_eq!(r.push(&acl(0x2040, &l2cap[..27])), None);
        assert_eq!(r.push(&acl(0x1040, &l2cap[27..40])), None);
        let f = r.push(&acl(0x1040, &l2cap[40..])).unwrap();
        assert_eq!(f.cid, Cid::SMP);
        assert_eq!(f.data, pdu);
        assert!(r.partial.is_empty());
    }

    #[test]
    fn stray() {
        let mut r = Reassembler::new();
        assert_eq!(r.push(&acl(0x1040, &[1, 2, 3])), None);

        // Overflow drops the partial PDU
        assert_eq!(r.push(&acl(0x2040, &[5, 0, 4, 0, 1, 2])), None);
        assert_eq!(r.push(&acl(0x1040, &[3, 4, 5, 6])), None);
        assert!(r.partial.is_empty());

        // New start fragment replaces an incomplete one
        assert_eq!(r.push(&acl(0x2040, &[5, 0, 4, 0, 1, 2])), None);
        let f = r.push(&acl(0x2040, &[1, 0, 4, 0, 9])).unwrap();
        assert_eq!(f.data, [9]);
        assert!(r.partial.is_empty());
    }
}
