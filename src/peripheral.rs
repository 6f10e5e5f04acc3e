//! Peripheral session.
//!
//! [`Peripheral`] ties the protocol engines together for one controller. It
//! owns the HCI host, the GATT server, the pairing session of the active
//! connection, and the key storage. Inbound H4 packets are fed to
//! [`Peripheral::handle_packet`], which routes L2CAP frames to ATT or SMP and
//! writes all responses before returning. Everything that the application
//! needs to know about is sent as an [`Event`].

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::att::Handle;
use crate::gap::{self, Uuid};
use crate::gatt::{self, AttributeTable, IoResult, Server, ServerEvent, ServiceDef, Token, Update};
use crate::hci::{self, AdapterState, Hci, LeLongTermKeyRequest, Signal, Status};
use crate::host::Transport;
use crate::l2cap::{Cid, Frame};
use crate::le::Addr;
use crate::smp::{self, Keyring, Pairing};
use crate::Config;

/// Error type returned by the peripheral.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Hci(#[from] hci::Error),
    #[error(transparent)]
    Gatt(#[from] gatt::Error),
    #[error("event loop is already running")]
    Running,
}

impl Error {
    /// Returns whether the error prevents further communication with the
    /// controller.
    #[inline]
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(*self, Self::Hci(hci::Error::Transport(_)))
    }
}

/// Common peripheral result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Event reported to the application.
#[derive(Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum Event {
    StateChange(AdapterState),
    AddressChange(Addr),
    /// A central connected.
    Accept(Addr),
    Disconnect { peer: Addr, reason: Status },
    MtuChanged(u16),
    Rssi(i8),
    PairingFailed(smp::Error),
    AdvertisingStart(Status),
    AdvertisingStop(Status),
    /// The attribute table was replaced by [`Peripheral::set_services`].
    ServicesSet,
    EncryptChange(bool),
}

/// Bluetooth LE peripheral with a single connection.
#[derive(Debug)]
pub struct Peripheral<T> {
    cfg: Config,
    hci: Hci<T>,
    srv: Server,
    smp: Option<Pairing>,
    keys: Box<dyn Keyring>,
    updates: Option<mpsc::UnboundedReceiver<Update>>,
    events: mpsc::UnboundedSender<Event>,
    events_rx: Option<mpsc::UnboundedReceiver<Event>>,
}

impl<T: Transport> Peripheral<T> {
    /// Creates a peripheral using transport `t` with an attribute table
    /// containing only the GAP and GATT services. Derived keys are saved to
    /// and loaded from `keys`.
    pub fn new(t: T, cfg: Config, keys: Box<dyn Keyring>) -> Result<Self> {
        let db = AttributeTable::build(&cfg.device_name, cfg.appearance, &[])
            .map_err(gatt::Error::from)?;
        let (tx, updates) = mpsc::unbounded_channel();
        let (events, events_rx) = mpsc::unbounded_channel();
        Ok(Self {
            hci: Hci::new(t, cfg.adv_interval),
            srv: Server::new(db, cfg.max_mtu(), tx),
            cfg,
            smp: None,
            keys,
            updates: Some(updates),
            events,
            events_rx: Some(events_rx),
        })
    }

    /// Returns the event receiver. This can only be called once.
    #[inline]
    pub fn events(&mut self) -> Option<mpsc::UnboundedReceiver<Event>> {
        self.events_rx.take()
    }

    /// Returns the peripheral configuration.
    #[inline(always)]
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.cfg
    }

    /// Returns the HCI host.
    #[inline(always)]
    #[must_use]
    pub const fn hci(&self) -> &Hci<T> {
        &self.hci
    }

    /// Returns the GATT server.
    #[inline(always)]
    #[must_use]
    pub const fn server(&self) -> &Server {
        &self.srv
    }

    /// Initializes the controller. The adapter state changes to
    /// [`AdapterState::PoweredOn`] once setup completes.
    pub fn init(&mut self) -> Result<()> {
        info!("Initializing controller");
        Ok(self.hci.init(self.cfg.user_channel)?)
    }

    /// Handles one inbound H4 packet.
    pub fn handle_packet(&mut self, pkt: &[u8]) -> Result<()> {
        let r = self.hci.recv(pkt).map_err(Error::from);
        while let Some(sig) = self.hci.poll_signal() {
            self.on_signal(sig)?;
        }
        self.flush()?;
        r
    }

    /// Replaces the application services. The GAP and GATT services are
    /// always included.
    pub fn set_services(&mut self, services: &[ServiceDef]) -> Result<()> {
        let db = AttributeTable::build(&self.cfg.device_name, self.cfg.appearance, services)
            .map_err(gatt::Error::from)?;
        info!("Services set ({} attributes)", db.len());
        self.srv.set_db(db);
        self.emit(Event::ServicesSet);
        Ok(())
    }

    /// Starts advertising the local `name` and service `uuids`.
    pub fn start_advertising(&mut self, name: &str, uuids: &[Uuid]) -> Result<()> {
        let (adv, scan) = (gap::advertising_data(uuids), gap::scan_response_data(name));
        self.start_advertising_with_eir(adv.as_ref(), scan.as_ref())
    }

    /// Starts advertising with raw advertising and scan response data.
    #[inline]
    pub fn start_advertising_with_eir(&mut self, adv: &[u8], scan: &[u8]) -> Result<()> {
        Ok(self.hci.start_advertising(adv, scan)?)
    }

    /// Starts advertising iBeacon manufacturer data with an empty scan
    /// response.
    pub fn start_advertising_ibeacon(&mut self, data: &[u8]) -> Result<()> {
        let adv = gap::ibeacon_data(data)?;
        self.start_advertising_with_eir(adv.as_ref(), &[])
    }

    /// Stops advertising.
    #[inline]
    pub fn stop_advertising(&mut self) -> Result<()> {
        Ok(self.hci.stop_advertising()?)
    }

    /// Terminates the active connection.
    #[inline]
    pub fn disconnect(&mut self) -> Result<()> {
        Ok(self.hci.disconnect(hci::DEFAULT_DISCONNECT_REASON)?)
    }

    /// Requests the RSSI of the active connection, which is reported as
    /// [`Event::Rssi`].
    #[inline]
    pub fn update_rssi(&mut self) -> Result<()> {
        Ok(self.hci.read_rssi()?)
    }

    /// Completes a pending capability read or write.
    pub fn complete(&mut self, token: Token, r: IoResult<Vec<u8>>) -> Result<()> {
        self.srv.complete(token, r)?;
        self.flush()
    }

    /// Sends a characteristic value update. Returns `false` if the client is
    /// not subscribed.
    pub fn notify(&mut self, hdl: Handle, data: &[u8]) -> Result<bool> {
        let ok = self.srv.notify(hdl, data);
        self.flush()?;
        Ok(ok)
    }

    /// Sends all value updates queued by subscribed capabilities. This is done
    /// automatically by [`run`].
    pub fn drain_updates(&mut self) -> Result<()> {
        while let Some(u) = self.updates.as_mut().and_then(|rx| rx.try_recv().ok()) {
            self.srv.notify(u.handle, &u.data);
        }
        self.flush()
    }

    /// Handles an HCI signal.
    fn on_signal(&mut self, sig: Signal) -> Result<()> {
        match sig {
            Signal::StateChange(s) => self.emit(Event::StateChange(s)),
            Signal::AddressChange(a) => self.emit(Event::AddressChange(a)),
            Signal::Connected(c) => {
                self.srv.connect();
                self.smp = Some(Pairing::new(c.peer, c.local));
                self.emit(Event::Accept(c.peer));
            }
            Signal::Disconnected { conn, reason } => {
                self.srv.disconnect();
                self.smp = None;
                self.emit(Event::Disconnect {
                    peer: conn.peer,
                    reason,
                });
            }
            Signal::ConnUpdate(c) => debug!("Connection parameters: {:?}", c.params),
            Signal::EncryptChange { enabled, .. } => {
                self.srv.set_encrypted(enabled);
                if let Some(p) = self.smp.as_mut() {
                    p.encryption_changed(enabled);
                }
                self.emit(Event::EncryptChange(enabled));
            }
            Signal::LtkRequest(e) => self.ltk_request(e)?,
            Signal::LtkNegativeReply(_) => {
                if let Some(Err(e)) = self.smp.as_mut().map(Pairing::ltk_negative_reply) {
                    self.emit(Event::PairingFailed(e));
                }
            }
            Signal::Rssi { rssi, .. } => self.emit(Event::Rssi(rssi)),
            Signal::AdvertisingStart(s) => self.emit(Event::AdvertisingStart(s)),
            Signal::AdvertisingStop(s) => self.emit(Event::AdvertisingStop(s)),
            Signal::Frame(f) => self.on_frame(&f),
        }
        Ok(())
    }

    /// Routes an L2CAP frame to its protocol.
    fn on_frame(&mut self, f: &Frame) {
        match f.cid {
            Cid::ATT => self.srv.recv(&f.data),
            Cid::SMP => {
                let Some(p) = self.smp.as_mut() else { return };
                if let Err(e) = p.recv(&f.data, &*self.keys) {
                    self.emit(Event::PairingFailed(e));
                }
            }
            cid => trace!("Ignoring {cid} frame: {:02X?}", f.data),
        }
    }

    /// Answers a Long Term Key request using the Short Term Key of the
    /// current pairing session or a stored key
    /// ([Vol 3] Part H, Section 2.4.4).
    fn ltk_request(&mut self, e: LeLongTermKeyRequest) -> Result<()> {
        let Some(peer) = self.hci.conn().map(|c| c.peer) else {
            return Ok(());
        };
        let stk = (self.smp.as_ref()).and_then(|p| p.stk(e.ediv, e.rand));
        let key = stk.cloned().or_else(|| {
            self.keys
                .load(peer, e.ediv, e.rand)
                .unwrap_or_else(|err| {
                    error!("Failed to load key for {peer}: {err}");
                    None
                })
        });
        if let Some(k) = key {
            debug!("Found LTK for {peer}");
            self.hci.le_ltk_reply(e.handle, &k)?;
        } else {
            debug!("No LTK for {peer} [ediv={:#06X}, rand={:#018X}]", e.ediv, e.rand);
            self.hci.le_ltk_negative_reply(e.handle)?;
        }
        Ok(())
    }

    /// Sends an update received from a [`gatt::Notifier`].
    fn update(&mut self, u: &Update) -> Result<()> {
        self.srv.notify(u.handle, &u.data);
        self.flush()
    }

    /// Writes all outbound ATT and SMP PDUs and reports server events.
    fn flush(&mut self) -> Result<()> {
        while let Some(e) = self.srv.poll_event() {
            match e {
                ServerEvent::MtuChanged(mtu) => self.emit(Event::MtuChanged(mtu)),
            }
        }
        let Some(hdl) = self.hci.conn().map(|c| c.handle) else {
            while let Some(pdu) = self.srv.poll_pdu() {
                trace!("Dropping ATT PDU without a connection: {:02X?}", pdu.as_ref());
            }
            return Ok(());
        };
        while let Some(pdu) = self.srv.poll_pdu() {
            self.hci.send_frame(hdl, Cid::ATT, pdu.as_ref())?;
        }
        if let Some(p) = self.smp.as_mut() {
            while let Some(pdu) = p.poll_pdu() {
                self.hci.send_frame(hdl, Cid::SMP, pdu.as_ref())?;
            }
        }
        Ok(())
    }

    fn emit(&self, e: Event) {
        debug!("{e:?}");
        if self.events.send(e).is_err() {
            trace!("Event receiver closed");
        }
    }
}

/// Input received by the event loop.
enum Input {
    Packet(Vec<u8>),
    Update(Update),
}

/// Drives a shared peripheral from inbound H4 `packets` and capability value
/// updates until `ct` is cancelled, the packet stream ends, or a fatal error
/// occurs. Non-fatal errors are logged.
pub async fn run<T: Transport>(
    p: Arc<Mutex<Peripheral<T>>>,
    mut packets: mpsc::Receiver<Vec<u8>>,
    ct: CancellationToken,
) -> Result<()> {
    let Some(mut updates) = p.lock().updates.take() else {
        return Err(Error::Running);
    };
    debug!("Event loop started");
    let r = loop {
        let input = tokio::select! {
            pkt = packets.recv() => match pkt {
                Some(pkt) => Input::Packet(pkt),
                None => {
                    debug!("Packet stream closed");
                    break Ok(());
                }
            },
            Some(u) = updates.recv() => Input::Update(u),
            () = ct.cancelled() => {
                debug!("Event loop terminating");
                break Ok(());
            }
        };
        let r = {
            let mut p = p.lock();
            match input {
                Input::Packet(pkt) => p.handle_packet(&pkt),
                Input::Update(u) => p.update(&u),
            }
        };
        match r {
            Ok(()) => {}
            Err(e) if e.is_fatal() => {
                error!("Event loop error: {e}");
                break Err(e);
            }
            Err(e) => warn!("{e}"),
        }
    };
    p.lock().updates = Some(updates);
    r
}

#[cfg(test)]
mod tests {
    use matches::assert_matches;

    use crate::gap::Uuid16;
    use crate::hci::Opcode;
    use crate::host::Recorder;
    use crate::le::RawAddr;
    use crate::smp::{LongTermKey, MemKeyring, Reason};

    use super::*;

    const PEER: Addr = Addr::Public(RawAddr::from_le_bytes([1, 2, 3, 4, 5, 6]));

    struct Fixture {
        p: Peripheral<Arc<Recorder>>,
        rec: Arc<Recorder>,
        events: mpsc::UnboundedReceiver<Event>,
    }

    impl Fixture {
        fn new(keys: MemKeyring) -> Self {
            let rec = Arc::new(Recorder::default());
            let mut p =
                Peripheral::new(Arc::clone(&rec), Config::default(), Box::new(keys)).unwrap();
            let events = p.events().unwrap();
            assert!(p.events().is_none());
            p.handle_packet(&cmd_complete(Opcode::LeReadBufferSize, &[0, 0xFB, 0x00, 8]))
                .unwrap();
            Self { p, rec, events }
        }

        fn connect(&mut self) {
            self.p.handle_packet(&connect_evt()).unwrap();
            assert_eq!(self.events(), [Event::Accept(PEER)]);
        }

        fn send(&mut self, cid: u16, payload: &[u8]) {
            let n = u16::try_from(payload.len()).unwrap();
            let mut pkt = vec![0x02, 0x40, 0x20];
            pkt.extend_from_slice(&(n + 4).to_le_bytes());
            pkt.extend_from_slice(&n.to_le_bytes());
            pkt.extend_from_slice(&cid.to_le_bytes());
            pkt.extend_from_slice(payload);
            self.p.handle_packet(&pkt).unwrap();
        }

        /// Returns all written L2CAP frames as (CID, payload) pairs.
        fn frames(&self) -> Vec<(u16, Vec<u8>)> {
            (self.rec.take().iter())
                .filter(|p| p[0] == 0x02)
                .map(|p| (u16::from_le_bytes([p[7], p[8]]), p[9..].to_vec()))
                .collect()
        }

        fn events(&mut self) -> Vec<Event> {
            std::iter::from_fn(|| self.events.try_recv().ok()).collect()
        }
    }

    fn evt(code: u8, params: &[u8]) -> Vec<u8> {
        let mut v = vec![0x04, code, u8::try_from(params.len()).unwrap()];
        v.extend_from_slice(params);
        v
    }

    fn cmd_complete(opcode: Opcode, ret: &[u8]) -> Vec<u8> {
        let mut p = vec![1];
        p.extend_from_slice(&u16::from(opcode).to_le_bytes());
        p.extend_from_slice(ret);
        evt(0x0E, &p)
    }

    fn connect_evt() -> Vec<u8> {
        evt(
            0x3E,
            &[
                0x01, 0x00, 0x40, 0x00, 0x01, 0x00, 1, 2, 3, 4, 5, 6, 0x18, 0x00, 0x00, 0x00, 0xC8,
                0x00, 0x00,
            ],
        )
    }

    #[test]
    fn att() {
        let mut t = Fixture::new(MemKeyring::new());
        t.connect();
        t.send(0x0004, &[0x02, 0x00, 0x01]);
        t.send(0x0004, &[0x0A, 0x03, 0x00]);
        assert_eq!(
            t.frames(),
            [
                (0x0004, vec![0x03, 0x00, 0x01]),
                (0x0004, b"\x0Bblep".to_vec())
            ]
        );
        assert_eq!(t.events(), [Event::MtuChanged(256)]);

        // Other channels are ignored
        t.send(0x0005, &[0x01]);
        assert!(t.frames().is_empty());

        t.p.handle_packet(&evt(0x05, &[0, 0x40, 0x00, 0x13])).unwrap();
        assert_eq!(
            t.events(),
            [Event::Disconnect {
                peer: PEER,
                reason: Status::RemoteUserTerminatedConnection
            }]
        );
        assert_eq!(t.p.server().mtu(), 23);
    }

    #[test]
    fn services() {
        let mut t = Fixture::new(MemKeyring::new());
        let svc = ServiceDef::new(Uuid16::new(0xFFF0).unwrap().as_uuid());
        t.p.set_services(&[svc]).unwrap();
        assert_eq!(t.events(), [Event::ServicesSet]);
        assert_eq!(t.p.server().db().len(), 10);
        assert!(!t.p.notify(Handle::new(0x08).unwrap(), &[1]).unwrap());
    }

    #[test]
    fn pairing() {
        let mut t = Fixture::new(MemKeyring::new());
        t.connect();
        t.send(0x0006, &[0x01, 0x03, 0x00, 0x01, 0x10, 0x07, 0x07]);
        assert_eq!(
            t.frames(),
            [(0x0006, vec![0x02, 0x03, 0x00, 0x01, 0x10, 0x00, 0x01])]
        );
        t.send(0x0006, &[0x05, 0x05]);
        assert_eq!(
            t.events(),
            [Event::PairingFailed(smp::Error::Remote(
                Reason::PairingNotSupported
            ))]
        );
        assert!(t.frames().is_empty());
    }

    #[test]
    fn ltk() {
        let keys = MemKeyring::new();
        let key = blep_crypto::Key::new(0x0F0E_0D0C_0B0A_0908_0706_0504_0302_0100);
        keys.store(&LongTermKey {
            peer: PEER,
            authenticated: false,
            central: false,
            ediv: 0x1234,
            rand: 0x0807_0605_0403_0201,
            key: key.clone(),
        })
        .unwrap();
        let mut t = Fixture::new(keys);
        t.connect();
        t.rec.take();

        let mut req = vec![0x05, 0x40, 0x00, 1, 2, 3, 4, 5, 6, 7, 8, 0x34, 0x12];
        t.p.handle_packet(&evt(0x3E, &req)).unwrap();
        let mut want = vec![0x01, 0x1A, 0x20, 18, 0x40, 0x00];
        want.extend_from_slice(&key.to_le_bytes());
        assert_eq!(t.rec.take(), [want]);

        req[11] = 0;
        t.p.handle_packet(&evt(0x3E, &req)).unwrap();
        assert_eq!(t.rec.take(), [vec![0x01, 0x1B, 0x20, 2, 0x40, 0x00]]);
        t.p.handle_packet(&cmd_complete(
            Opcode::LeLongTermKeyRequestNegativeReply,
            &[0, 0x40, 0x00],
        ))
        .unwrap();
        assert_eq!(
            t.events(),
            [Event::PairingFailed(smp::Error::Local(
                Reason::UnspecifiedReason
            ))]
        );
        assert_eq!(t.frames(), [(0x0006, vec![0x05, 0x08])]);
    }

    #[test]
    fn advertising() {
        let mut t = Fixture::new(MemKeyring::new());
        t.p.start_advertising("blep", &[Uuid16::new(0x180D).unwrap().as_uuid()])
            .unwrap();
        let pkts = t.rec.take();
        assert_eq!(pkts.len(), 3);
        assert_eq!(pkts[0][..11], [0x01, 0x09, 0x20, 32, 6, 5, 0x09, b'b', b'l', b'e', b'p']);
        assert_eq!(pkts[1][..9], [0x01, 0x08, 0x20, 32, 7, 0x02, 0x01, 0x06, 0x03]);
        t.p.handle_packet(&cmd_complete(Opcode::LeSetAdvertisingEnable, &[0]))
            .unwrap();
        assert_eq!(t.events(), [Event::AdvertisingStart(Status::Success)]);

        assert_matches!(
            t.p.start_advertising_with_eir(&[0; 32], &[]),
            Err(Error::Hci(hci::Error::AdvDataTooLong(32)))
        );
        assert_matches!(t.p.disconnect(), Err(Error::Hci(hci::Error::NotConnected)));
    }

    #[tokio::test]
    async fn event_loop() {
        let t = Fixture::new(MemKeyring::new());
        let (mut events, rec) = (t.events, t.rec);
        let p = Arc::new(Mutex::new(t.p));
        let (tx, rx) = mpsc::channel(4);
        tx.send(connect_evt()).await.unwrap();
        tx.send(vec![0xFF]).await.unwrap();
        drop(tx);
        run(Arc::clone(&p), rx, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(events.try_recv().unwrap(), Event::Accept(PEER));
        assert!(rec.take().is_empty());

        // Restartable after the packet stream closes
        let (_tx, rx) = mpsc::channel(1);
        let ct = CancellationToken::new();
        ct.cancel();
        run(p, rx, ct).await.unwrap();
    }
}
