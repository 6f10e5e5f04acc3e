use std::collections::{HashMap, VecDeque};

use structbuf::{Pack, StructBuf};
use tracing::{debug, trace};

use crate::hci::ConnHandle;
use crate::host::PacketType;

use super::*;

/// Default maximum ACL data packet length (23-byte ATT MTU plus the L2CAP
/// header).
pub const DEFAULT_ACL_MTU: u16 = 23 + L2CAP_HDR as u16;

/// Default number of ACL data packets the controller can buffer.
pub const DEFAULT_ACL_MAX_PKTS: u16 = 1;

/// Outbound ACL data packet ready for transmission.
#[derive(Debug)]
struct Unit {
    hdl: ConnHandle,
    pkt: StructBuf,
}

/// Outbound ACL data queue. Frames are split into fragments no larger than
/// the controller's ACL buffer size and released to the controller while the
/// number of packets that it has not yet reported as completed is below its
/// buffer count ([Vol 4] Part E, Section 4.1.1).
#[derive(Debug)]
pub struct AclQueue {
    mtu: usize,
    max_in_flight: u16,
    in_flight: HashMap<ConnHandle, u16>,
    queue: VecDeque<Unit>,
}

impl Default for AclQueue {
    #[inline]
    fn default() -> Self {
        Self::new(DEFAULT_ACL_MTU, DEFAULT_ACL_MAX_PKTS)
    }
}

impl AclQueue {
    /// Creates an empty queue for a controller with `max_pkts` buffers of
    /// `mtu` bytes each.
    #[must_use]
    pub fn new(mtu: u16, max_pkts: u16) -> Self {
        Self {
            mtu: usize::from(mtu.max(1)),
            max_in_flight: max_pkts.max(1),
            in_flight: HashMap::new(),
            queue: VecDeque::new(),
        }
    }

    /// Updates controller buffer information.
    #[inline]
    pub fn set_buffer_size(&mut self, mtu: u16, max_pkts: u16) {
        debug!("ACL buffer size: {mtu} bytes x {max_pkts}");
        self.mtu = usize::from(mtu.max(1));
        self.max_in_flight = max_pkts.max(1);
    }

    /// Returns the maximum fragment payload length.
    #[inline(always)]
    #[must_use]
    pub const fn mtu(&self) -> usize {
        self.mtu
    }

    /// Returns the number of packets awaiting transmission.
    #[inline(always)]
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Returns whether the queue is empty.
    #[inline(always)]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Adds a basic L2CAP header to `payload` and queues the resulting frame
    /// as one or more ACL data packets.
    pub fn push(&mut self, hdl: ConnHandle, cid: Cid, payload: &[u8]) {
        let mut frame = Vec::with_capacity(L2CAP_HDR + payload.len());
        #[allow(clippy::cast_possible_truncation)]
        frame.extend_from_slice(&(payload.len() as u16).to_le_bytes());
        frame.extend_from_slice(&cid.0.to_le_bytes());
        frame.extend_from_slice(payload);
        for (i, frag) in frame.chunks(self.mtu).enumerate() {
            let pb = if i == 0 {
                Boundary::FirstNonFlush
            } else {
                Boundary::Cont
            };
            let mut pkt = StructBuf::new(1 + ACL_HDR + frag.len());
            #[allow(clippy::cast_possible_truncation)]
            pkt.append()
                .u8(PacketType::Acl)
                .u16(u16::from(hdl) | (pb as u16) << ConnHandle::BITS)
                .u16(frag.len() as u16)
                .put(frag);
            self.queue.push_back(Unit { hdl, pkt });
        }
        trace!("Queued {cid} frame for {hdl} ({} bytes)", payload.len());
    }

    /// Returns the next packet to send, if the controller has room for it.
    /// The caller must write the returned packet to the transport.
    pub fn next(&mut self) -> Option<StructBuf> {
        let total: u32 = self.in_flight.values().map(|&n| u32::from(n)).sum();
        if total >= u32::from(self.max_in_flight) {
            return None;
        }
        let u = self.queue.pop_front()?;
        *self.in_flight.entry(u.hdl).or_default() += 1;
        Some(u.pkt)
    }

    /// Starts flow control accounting for a new connection.
    #[inline]
    pub fn connect(&mut self, hdl: ConnHandle) {
        self.in_flight.insert(hdl, 0);
    }

    /// Records the number of packets that the controller has completed for a
    /// connection. Counts for unknown connections are ignored. Controllers may
    /// report completions that the host never counted, so the count saturates
    /// at zero.
    pub fn complete(&mut self, hdl: ConnHandle, n: u16) {
        if let Some(v) = self.in_flight.get_mut(&hdl) {
            *v = v.saturating_sub(n);
        } else {
            trace!("Completed packets for an unknown {hdl}");
        }
    }

    /// Discards all state associated with a disconnected connection.
    pub fn disconnect(&mut self, hdl: ConnHandle) {
        self.in_flight.remove(&hdl);
        let n = self.queue.len();
        self.queue.retain(|u| u.hdl != hdl);
        if n != self.queue.len() {
            debug!("Discarded {} ACL packets for {hdl}", n - self.queue.len());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hdl() -> ConnHandle {
        ConnHandle::new(0x40).unwrap()
    }

    #[test]
    fn fragment() {
        let mut q = AclQueue::new(27, 8);
        let payload: Vec<u8> = (0..40).collect();
        q.push(hdl(), Cid::ATT, &payload);
        assert_eq!(q.len(), 2);
        let a = q.next().unwrap();
        assert_eq!(a.as_ref()[..9], [0x02, 0x40, 0x00, 27, 0, 40, 0, 4, 0]);
        assert_eq!(a.as_ref()[9..], payload[..23]);
        let b = q.next().unwrap();
        assert_eq!(b.as_ref()[..5], [0x02, 0x40, 0x10, 17, 0]);
        assert_eq!(b.as_ref()[5..], payload[23..]);
        assert!(q.next().is_none());
    }

    #[test]
    fn flow_control() {
        let mut q = AclQueue::default();
        q.push(hdl(), Cid::ATT, &[1]);
        q.push(hdl(), Cid::ATT, &[2]);
        assert_eq!(q.next().unwrap().as_ref()[9], 1);
        assert!(q.next().is_none());
        q.complete(hdl(), 1);
        assert_eq!(q.next().unwrap().as_ref()[9], 2);
        assert!(q.next().is_none());

        // Over-reported completions saturate
        q.complete(hdl(), 5);
        q.push(hdl(), Cid::ATT, &[3]);
        q.push(hdl(), Cid::ATT, &[4]);
        assert!(q.next().is_some());
        assert!(q.next().is_none());

        // Unknown handles are ignored
        q.complete(ConnHandle::new(0x41).unwrap(), 1);
        assert!(q.next().is_none());
    }

    #[test]
    fn disconnect() {
        let mut q = AclQueue::default();
        let other = ConnHandle::new(0x41).unwrap();
        q.push(hdl(), Cid::ATT, &[1]);
        q.push(hdl(), Cid::ATT, &[2]);
        q.push(other, Cid::ATT, &[3]);
        assert!(q.next().is_some());
        q.disconnect(hdl());
        assert_eq!(q.len(), 1);
        let pkt = q.next().unwrap();
        assert_eq!(pkt.as_ref()[1], 0x41);
    }
}
