//! Host Controller Interface ([Vol 4] Part E).
//!
//! [`Hci`] is a synchronous state machine. Commands are written to the
//! transport immediately and are not correlated with their completion events
//! beyond the processing in [`Hci::recv`]. Everything that the upper layers
//! need to know about is queued as a [`Signal`].

use std::collections::VecDeque;
use std::io;
use std::time::Duration;

use structbuf::{Pack, Packer, StructBuf, Unpacker};
use tracing::{debug, error, info, trace, warn};

pub use {adv::*, consts::*, event::*, handle::*};

use crate::host::{PacketType, Transport};
use crate::l2cap::{AclQueue, Cid, Frame, Reassembler};
use crate::le::{Addr, RawAddr};

mod adv;
mod cmd;
mod consts;
#[path = "event/event.rs"]
mod event;
mod handle;

/// Error type returned by the HCI layer.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),
    #[error("invalid packet: {0:02X?}")]
    InvalidPacket(Vec<u8>),
    #[error("invalid event: {0:02X?}")]
    InvalidEvent(Vec<u8>),
    #[error("unknown event [code={code:#04X}, subevent={subevent:#04X}]: {params:02X?}")]
    UnknownEvent {
        code: u8,
        subevent: u8,
        params: Vec<u8>,
    },
    #[error("advertising data too long ({0} bytes)")]
    AdvDataTooLong(usize),
    #[error("not connected")]
    NotConnected,
}

/// Common HCI result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Controller state as seen by the host.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, strum::Display)]
#[non_exhaustive]
pub enum AdapterState {
    #[default]
    Unknown,
    PoweredOff,
    PoweredOn,
    /// The transport rejected a write due to insufficient permissions.
    Unauthorized,
    /// The controller does not support Bluetooth LE 4.0.
    Unsupported,
}

/// Active LE connection in the peripheral role.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Conn {
    pub handle: ConnHandle,
    pub peer: Addr,
    pub local: Addr,
    pub params: ConnParams,
    pub encrypted: bool,
}

/// Notification produced by the HCI layer for the upper layers.
#[derive(Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum Signal {
    StateChange(AdapterState),
    AddressChange(Addr),
    Connected(Conn),
    Disconnected { conn: Conn, reason: Status },
    ConnUpdate(Conn),
    EncryptChange { handle: ConnHandle, enabled: bool },
    LtkRequest(LeLongTermKeyRequest),
    LtkNegativeReply(ConnHandle),
    Rssi { handle: ConnHandle, rssi: i8 },
    AdvertisingStart(Status),
    AdvertisingStop(Status),
    Frame(Frame),
}

/// Host side of the Host Controller Interface for a single peripheral
/// connection.
#[derive(Debug)]
pub struct Hci<T> {
    transport: T,
    adv_interval: Duration,
    state: AdapterState,
    addr: Option<Addr>,
    version: CoreVersion,
    conn: Option<Conn>,
    adv: AdvState,
    tx: AclQueue,
    rx: Reassembler,
    signals: VecDeque<Signal>,
}

impl<T: Transport> Hci<T> {
    /// Creates an HCI host using transport `t`. Advertising events will be
    /// sent every `adv_interval`.
    #[must_use]
    pub fn new(t: T, adv_interval: Duration) -> Self {
        Self {
            transport: t,
            adv_interval,
            state: AdapterState::default(),
            addr: None,
            version: CoreVersion::default(),
            conn: None,
            adv: AdvState::default(),
            tx: AclQueue::default(),
            rx: Reassembler::new(),
            signals: VecDeque::new(),
        }
    }

    /// Returns the underlying transport.
    #[inline(always)]
    #[must_use]
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// Returns the current adapter state.
    #[inline(always)]
    #[must_use]
    pub const fn state(&self) -> AdapterState {
        self.state
    }

    /// Returns the local controller address, if known.
    #[inline(always)]
    #[must_use]
    pub const fn addr(&self) -> Option<Addr> {
        self.addr
    }

    /// Returns the controller HCI version.
    #[inline(always)]
    #[must_use]
    pub const fn version(&self) -> CoreVersion {
        self.version
    }

    /// Returns the active connection.
    #[inline(always)]
    #[must_use]
    pub const fn conn(&self) -> Option<&Conn> {
        self.conn.as_ref()
    }

    /// Removes and returns the next pending signal.
    #[inline]
    pub fn poll_signal(&mut self) -> Option<Signal> {
        self.signals.pop_front()
    }

    /// Initializes the controller ([Vol 6] Part D, Section 2.1). When
    /// `reset` is set (exclusive user channel access), the controller is
    /// reset first and the remaining setup happens after the reset
    /// completes.
    pub fn init(&mut self, reset: bool) -> Result<()> {
        self.reset_buffers();
        if reset {
            self.reset()
        } else {
            self.setup()
        }
    }

    /// Handles one inbound packet, including the packet indicator.
    pub fn recv(&mut self, pkt: &[u8]) -> Result<()> {
        trace!("<- {pkt:02X?}");
        let Some((&ind, rest)) = pkt.split_first() else {
            return Err(Error::InvalidPacket(Vec::new()));
        };
        match PacketType::try_from(ind) {
            Ok(PacketType::Event) => match Event::unpack(rest) {
                Ok(evt) => self.on_event(evt),
                Err(Error::UnknownEvent {
                    code, subevent, ..
                }) => {
                    trace!("Ignored event [code={code:#04X}, subevent={subevent:#04X}]");
                    Ok(())
                }
                Err(e) => Err(e),
            },
            Ok(PacketType::Acl) => {
                if let Some(f) = self.rx.push(rest) {
                    self.on_frame(f);
                }
                Ok(())
            }
            _ => Err(Error::InvalidPacket(pkt.to_vec())),
        }
    }

    /// Queues an L2CAP frame for transmission on the specified channel and
    /// sends as many ACL data packets as flow control allows.
    pub fn send_frame(&mut self, hdl: ConnHandle, cid: Cid, payload: &[u8]) -> Result<()> {
        trace!("{hdl} {cid} -> {payload:02X?}");
        self.tx.push(hdl, cid, payload);
        self.flush()
    }

    /// Writes queued ACL data packets while the controller has buffer space.
    fn flush(&mut self) -> Result<()> {
        while let Some(pkt) = self.tx.next() {
            self.write(pkt.as_ref())?;
        }
        Ok(())
    }

    /// Writes a packet to the transport. Permission errors change the adapter
    /// state instead of being returned.
    fn write(&mut self, pkt: &[u8]) -> Result<()> {
        trace!("-> {pkt:02X?}");
        match self.transport.write(pkt) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                warn!("Transport permission denied: {e}");
                self.set_state(AdapterState::Unauthorized);
                Ok(())
            }
            Err(e) => {
                error!("Transport write error: {e}");
                Err(Error::Transport(e))
            }
        }
    }

    /// Updates adapter state, signaling actual changes only.
    pub(crate) fn set_state(&mut self, s: AdapterState) {
        if self.state == s {
            return;
        }
        info!("Adapter state: {} -> {s}", self.state);
        self.state = s;
        self.signals.push_back(Signal::StateChange(s));
    }

    /// Resets connection-related buffers.
    fn reset_buffers(&mut self) {
        self.conn = None;
        self.tx = AclQueue::default();
        self.rx = Reassembler::new();
    }

    /// Handles a decoded event.
    fn on_event(&mut self, evt: Event) -> Result<()> {
        debug!("{evt:?}");
        match evt {
            Event::CommandComplete(cc) => return self.on_cmd_complete(&cc),
            Event::CommandStatus { status, opcode, .. } => {
                if !status.is_ok() {
                    warn!("{opcode} command failed: {status}");
                }
            }
            Event::DisconnectionComplete(e) => return self.on_disconnect(e),
            Event::EncryptionChange(e) => self.on_encrypt(e.status, e.handle, e.enabled),
            Event::EncryptionKeyRefreshComplete { status, handle } => {
                self.on_encrypt(status, handle, true);
            }
            Event::NumberOfCompletedPackets(v) => {
                for (hdl, n) in v {
                    self.tx.complete(hdl, n);
                }
                return self.flush();
            }
            Event::HardwareError(code) => error!("Controller hardware error: {code:#04X}"),
            Event::DataBufferOverflow => warn!("Controller ACL buffer overflow"),
            Event::LeConnectionComplete(e) => self.on_connect(e),
            Event::LeConnectionUpdateComplete(e) => {
                let Some(conn) = self.conn.as_mut().filter(|c| c.handle == e.handle) else {
                    return Ok(());
                };
                if e.status.is_ok() {
                    conn.params = e.params;
                    info!("Connection parameters updated: {:?}", e.params);
                    let conn = *conn;
                    self.signals.push_back(Signal::ConnUpdate(conn));
                }
            }
            Event::LeLongTermKeyRequest(e) => {
                if self.is_conn(e.handle) {
                    self.signals.push_back(Signal::LtkRequest(e));
                }
            }
        }
        Ok(())
    }

    /// Handles command completion ([Vol 4] Part E, Section 7.7.14).
    fn on_cmd_complete(&mut self, cc: &CommandComplete) -> Result<()> {
        if !cc.status.is_ok() {
            warn!("{} command failed: {}", cc.opcode, cc.status);
        }
        let mut p = Unpacker::new(&cc.ret);
        match cc.opcode {
            Opcode::Reset => return self.setup(),
            Opcode::ReadLeHostSupport if cc.status.is_ok() => {
                let (le, simul) = (p.u8(), p.u8());
                debug!("LE host supported: le={le} simul={simul}");
            }
            Opcode::ReadLocalVersionInformation if cc.status.is_ok() => {
                let (hci_ver, hci_rev, lmp_ver) = (p.u8(), p.u16(), p.u8());
                let (manufacturer, lmp_subver) = (p.u16(), p.u16());
                self.version = CoreVersion::from(hci_ver);
                debug!(
                    "Controller version: HCI {} rev {hci_rev:#06X}, LMP {lmp_ver:#04X}/{lmp_subver:#06X}, \
                     manufacturer {manufacturer:#06X}",
                    self.version
                );
                if hci_ver < CoreVersion::V4_0 as u8 {
                    self.set_state(AdapterState::Unsupported);
                } else if self.state != AdapterState::PoweredOn {
                    self.set_advertise_enable(false)?;
                    self.set_advertising_parameters()?;
                }
            }
            Opcode::ReadBdAddr if cc.status.is_ok() => {
                let mut b = [0; 6];
                for v in &mut b {
                    *v = p.u8();
                }
                let addr = Addr::Public(RawAddr::from_le_bytes(b));
                info!("Controller address: {addr}");
                self.addr = Some(addr);
                self.signals.push_back(Signal::AddressChange(addr));
            }
            Opcode::LeSetAdvertisingParameters => self.set_state(AdapterState::PoweredOn),
            Opcode::LeSetAdvertisingEnable => self.on_adv_enable(cc.status),
            Opcode::ReadRssi if cc.status.is_ok() => {
                let (handle, rssi) = (ConnHandle::new(p.u16()), p.i8());
                if let Some(handle) = handle.filter(|_| p.is_ok()) {
                    debug!("RSSI for {handle}: {rssi} dBm");
                    self.signals.push_back(Signal::Rssi { handle, rssi });
                }
            }
            Opcode::LeLongTermKeyRequestNegativeReply => {
                if let Some(handle) = ConnHandle::new(p.u16()).filter(|_| p.is_ok()) {
                    if self.is_conn(handle) {
                        self.signals.push_back(Signal::LtkNegativeReply(handle));
                    }
                }
            }
            Opcode::LeReadBufferSize if cc.status.is_ok() => {
                let (mtu, max_pkts) = (p.u16(), p.u8());
                if mtu == 0 {
                    debug!("Falling back to BR/EDR buffer size");
                    return self.read_buffer_size();
                }
                self.tx.set_buffer_size(mtu, u16::from(max_pkts));
            }
            Opcode::ReadBufferSize if cc.status.is_ok() => {
                let (mtu, _sco_mtu, max_pkts) = (p.u16(), p.u8(), p.u16());
                if mtu != 0 && max_pkts != 0 {
                    self.tx.set_buffer_size(mtu, max_pkts);
                }
            }
            _ => {}
        }
        if !p.is_ok() {
            warn!("Truncated {} return parameters: {:02X?}", cc.opcode, cc.ret);
        }
        Ok(())
    }

    /// Handles `HCI_LE_Connection_Complete`. Only peripheral role connections
    /// are accepted.
    fn on_connect(&mut self, e: LeConnectionComplete) {
        if !e.status.is_ok() {
            warn!("Connection failed: {}", e.status);
            return;
        }
        if e.role != Role::Peripheral {
            warn!("Ignoring {:?} connection {}", e.role, e.handle);
            return;
        }
        if let Some(old) = self.conn {
            warn!("Replacing connection {} with {}", old.handle, e.handle);
        }
        let conn = Conn {
            handle: e.handle,
            peer: e.peer,
            local: self.addr.unwrap_or_default(),
            params: e.params,
            encrypted: false,
        };
        info!("Connected to {} ({})", conn.peer, conn.handle);
        self.tx.connect(conn.handle);
        self.conn = Some(conn);
        self.signals.push_back(Signal::Connected(conn));
    }

    /// Handles `HCI_Disconnection_Complete`. Unsent data for the connection is
    /// discarded and advertising is restarted if it was enabled.
    fn on_disconnect(&mut self, e: DisconnectionComplete) -> Result<()> {
        if !e.status.is_ok() {
            warn!("Disconnect failed for {}: {}", e.handle, e.status);
            return Ok(());
        }
        self.tx.disconnect(e.handle);
        self.rx.remove(e.handle);
        if let Some(conn) = self.conn.filter(|c| c.handle == e.handle) {
            info!("Disconnected from {} ({})", conn.peer, e.reason);
            self.conn = None;
            self.signals.push_back(Signal::Disconnected {
                conn,
                reason: e.reason,
            });
        }
        self.restart_advertising()?;
        self.flush()
    }

    /// Updates the encryption state of the active connection.
    fn on_encrypt(&mut self, status: Status, handle: ConnHandle, enabled: bool) {
        if !status.is_ok() {
            warn!("Encryption change failed for {handle}: {status}");
            return;
        }
        let Some(conn) = self.conn.as_mut().filter(|c| c.handle == handle) else {
            return;
        };
        info!("Encryption for {handle}: {enabled}");
        conn.encrypted = enabled;
        self.signals.push_back(Signal::EncryptChange { handle, enabled });
    }

    /// Delivers a complete L2CAP frame for the active connection.
    fn on_frame(&mut self, f: Frame) {
        if self.is_conn(f.hdl) {
            self.signals.push_back(Signal::Frame(f));
        } else {
            trace!("Dropping {} frame for an unknown {}", f.cid, f.hdl);
        }
    }

    /// Returns whether `hdl` is the active connection.
    #[inline]
    fn is_conn(&self, hdl: ConnHandle) -> bool {
        self.conn.map_or(false, |c| c.handle == hdl)
    }

    /// Writes a command packet ([Vol 4] Part E, Section 5.4.1), calling `f` to
    /// provide parameters.
    fn cmd(&mut self, opcode: Opcode, f: impl FnOnce(&mut Packer)) -> Result<()> {
        let mut params = StructBuf::new(u8::MAX as usize);
        f(&mut params.append());
        let mut pkt = StructBuf::new(4 + params.len());
        #[allow(clippy::cast_possible_truncation)]
        pkt.append()
            .u8(PacketType::Command)
            .u16(opcode)
            .u8(params.len() as u8)
            .put(params.as_ref());
        debug!("{opcode} {:02X?}", params.as_ref());
        self.write(pkt.as_ref())
    }
}

#[cfg(test)]
mod tests;
