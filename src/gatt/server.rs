use std::collections::VecDeque;
use std::sync::Arc;

use structbuf::{Pack, Packer, StructBuf};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::gap::UuidPacker;

use super::*;

/// Maximum number of PDUs buffered while a capability callback is pending.
const MAX_QUEUED: usize = 16;

/// Event reported by the server to the owner of the connection.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum ServerEvent {
    /// ATT_MTU was changed by an `ATT_EXCHANGE_MTU_REQ`.
    MtuChanged(u16),
}

/// GATT server ([Vol 3] Part G, Section 4). The server does no I/O. Received
/// PDUs are passed to [`Server::recv`] and outbound PDUs are collected with
/// [`Server::poll_pdu`].
///
/// At most one capability callback may be pending. PDUs received while a
/// callback is pending are queued and processed in order after the callback
/// is completed with [`Server::complete`]. Confirmations are never queued.
#[derive(Debug)]
pub struct Server {
    db: AttributeTable,
    max_mtu: u16,
    mtu: u16,
    encrypted: bool,
    prepared: Option<PreparedWrite>,
    last_indicated: Option<Arc<dyn Capability>>,
    pending: Option<Pending>,
    queue: VecDeque<Vec<u8>>,
    out: VecDeque<StructBuf>,
    events: VecDeque<ServerEvent>,
    tx: mpsc::UnboundedSender<Update>,
}

impl Server {
    /// Creates a new server. Notifiers handed to subscribed capabilities send
    /// their updates to `tx`.
    #[must_use]
    pub fn new(db: AttributeTable, max_mtu: u16, tx: mpsc::UnboundedSender<Update>) -> Self {
        db.dump();
        Self {
            db,
            max_mtu: max_mtu.clamp(DEFAULT_MTU, MAX_MTU),
            mtu: DEFAULT_MTU,
            encrypted: false,
            prepared: None,
            last_indicated: None,
            pending: None,
            queue: VecDeque::new(),
            out: VecDeque::new(),
            events: VecDeque::new(),
            tx,
        }
    }

    /// Returns the attribute table.
    #[inline(always)]
    #[must_use]
    pub const fn db(&self) -> &AttributeTable {
        &self.db
    }

    /// Replaces the attribute table. Existing subscriptions are dropped and
    /// their capabilities are unsubscribed.
    pub fn set_db(&mut self, db: AttributeTable) {
        self.unsubscribe_all("table change");
        db.dump();
        self.db = db;
        self.prepared = None;
        self.last_indicated = None;
    }

    /// Returns the current ATT_MTU.
    #[inline(always)]
    #[must_use]
    pub const fn mtu(&self) -> u16 {
        self.mtu
    }

    /// Sets the link encryption state used for secure attribute checks.
    #[inline]
    pub fn set_encrypted(&mut self, enabled: bool) {
        self.encrypted = enabled;
    }

    /// Returns whether a capability callback is pending.
    #[inline(always)]
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Resets per-connection state for a new connection.
    pub fn connect(&mut self) {
        self.reset();
    }

    /// Resets all subscriptions, calling `unsubscribe` once for each
    /// characteristic that had notifications or indications enabled, and
    /// clears per-connection state.
    pub fn disconnect(&mut self) {
        self.unsubscribe_all("disconnect");
        self.reset();
    }

    /// Returns the next outbound PDU.
    #[inline]
    pub fn poll_pdu(&mut self) -> Option<StructBuf> {
        self.out.pop_front()
    }

    /// Returns the next server event.
    #[inline]
    pub fn poll_event(&mut self) -> Option<ServerEvent> {
        self.events.pop_front()
    }

    /// Processes a received ATT PDU.
    pub fn recv(&mut self, pdu: &[u8]) {
        if self.pending.is_none() {
            self.process(pdu);
            return;
        }
        if pdu.first() == Some(&u8::from(Opcode::HandleValueCfm)) {
            self.confirm();
        } else if self.queue.len() < MAX_QUEUED {
            trace!("Queued ATT PDU: {pdu:02X?}");
            self.queue.push_back(pdu.to_vec());
        } else {
            warn!("ATT queue full, dropped PDU: {pdu:02X?}");
        }
    }

    /// Completes a pending capability callback. Read results carry the value
    /// and write results an empty vector.
    pub fn complete(&mut self, token: Token, r: IoResult<Vec<u8>>) -> Result<()> {
        let p = match self.pending.take() {
            Some(p) if p.token == token => p,
            other => {
                self.pending = other;
                return Err(Error::UnknownToken(token));
            }
        };
        trace!("Completed {token:?}");
        self.respond(p.ctx, r);
        while self.pending.is_none() {
            let Some(pdu) = self.queue.pop_front() else { break };
            self.process(&pdu);
        }
        Ok(())
    }

    /// Sends a notification or indication for the characteristic with value
    /// handle `hdl`. The value is truncated to ATT_MTU-3 bytes. Returns
    /// `false` if the client is not subscribed.
    pub fn notify(&mut self, hdl: Handle, data: &[u8]) -> bool {
        let Some(c) = self.db.value_owner(hdl) else {
            warn!("Update for non-value handle {hdl}");
            return false;
        };
        if self.db.subscription(hdl).is_empty() {
            debug!("Dropped update for unsubscribed {hdl}");
            return false;
        }
        let (props, cap) = (c.props, c.cap.cloned());
        let n = data.len().min(usize::from(self.mtu) - 3);
        if props.contains(CharProps::NOTIFY) {
            self.send(Opcode::HandleValueNtf, |p| {
                p.u16(hdl).put(&data[..n]);
            });
            if let Some(cap) = cap {
                cap.notify();
            }
        } else if props.contains(CharProps::INDICATE) {
            self.send(Opcode::HandleValueInd, |p| {
                p.u16(hdl).put(&data[..n]);
            });
            self.last_indicated = cap;
        } else {
            return false;
        }
        true
    }

    /// Processes a received PDU without queuing.
    fn process(&mut self, pdu: &[u8]) {
        let r = Request::parse(pdu).and_then(|req| {
            trace!("{req:?}");
            self.dispatch(req, pdu)
        });
        if let Err(e) = r {
            self.error(e);
        }
    }

    fn dispatch(&mut self, req: Request<'_>, pdu: &[u8]) -> RspResult<()> {
        use Request::*;
        match req {
            ExchangeMtu { mtu } => {
                self.exchange_mtu(mtu);
                Ok(())
            }
            FindInformation { range } => self.find_information(range),
            FindByTypeValue { range, typ, value } => self.find_by_type_value(range, typ, value),
            ReadByType { range, typ } => self.read_by_type(range, typ),
            Read { hdl } => self.read(Opcode::ReadReq, hdl, 0),
            ReadBlob { hdl, offset } => self.read(Opcode::ReadBlobReq, hdl, offset),
            ReadByGroupType { range, typ } => self.read_by_group_type(range, typ),
            Write { hdl, value, cmd } => self.write(hdl, value, cmd),
            PrepareWrite { hdl, offset, value } => self.prepare_write(hdl, offset, value, pdu),
            ExecuteWrite { flags } => self.execute_write(flags),
            HandleValueCfm => {
                self.confirm();
                Ok(())
            }
        }
    }

    /// Handles `ATT_EXCHANGE_MTU_REQ` ([Vol 3] Part F, Section 3.4.2.1).
    fn exchange_mtu(&mut self, mtu: u16) {
        let mtu = mtu.clamp(DEFAULT_MTU, self.max_mtu);
        debug!("ATT_MTU={mtu}");
        self.mtu = mtu;
        self.events.push_back(ServerEvent::MtuChanged(mtu));
        self.send(Opcode::ExchangeMtuRsp, |p| {
            p.u16(mtu);
        });
    }

    /// Handles `ATT_FIND_INFORMATION_REQ` ([Vol 3] Part F, Section 3.4.3.1).
    fn find_information(&mut self, range: HandleRange) -> RspResult<()> {
        let info: Vec<(Handle, Uuid)> = (self.db.range(range))
            .filter_map(|(hdl, _)| Some((hdl, self.db.typ(hdl)?)))
            .collect();
        let Some(&(_, first)) = info.first() else {
            return Err(not_found(Opcode::FindInformationReq, range));
        };
        let size = first.wire_len();
        let n = usize::from(self.mtu - 2) / (2 + size);
        self.send(Opcode::FindInformationRsp, |p| {
            p.u8(if size == Uuid16::BYTES { 0x01_u8 } else { 0x02_u8 });
            for &(hdl, uuid) in (info.iter())
                .take_while(|(_, u)| u.wire_len() == size)
                .take(n)
            {
                p.u16(hdl).uuid(uuid);
            }
        });
        Ok(())
    }

    /// Handles `ATT_FIND_BY_TYPE_VALUE_REQ` ([Vol 3] Part F, Section 3.4.3.3).
    /// Only primary service discovery by UUID is supported.
    fn find_by_type_value(&mut self, range: HandleRange, typ: u16, value: &[u8]) -> RspResult<()> {
        let want = Uuid::try_from(value).ok();
        let groups: Vec<(Handle, Handle)> = if typ == Declaration::PrimaryService as u16 {
            (self.db.range(range))
                .filter_map(|(hdl, at)| match *at {
                    Attr::Service { uuid, end } if Some(uuid) == want => Some((hdl, end)),
                    _ => None,
                })
                .collect()
        } else {
            Vec::new()
        };
        if groups.is_empty() {
            return Err(not_found(Opcode::FindByTypeValueReq, range));
        }
        let n = usize::from(self.mtu - 1) / 4;
        self.send(Opcode::FindByTypeValueRsp, |p| {
            for &(start, end) in groups.iter().take(n) {
                p.u16(start).u16(end);
            }
        });
        Ok(())
    }

    /// Handles `ATT_READ_BY_GROUP_TYPE_REQ` ([Vol 3] Part F, Section 3.4.4.9).
    fn read_by_group_type(&mut self, range: HandleRange, typ: Uuid) -> RspResult<()> {
        let op = Opcode::ReadByGroupTypeReq;
        let include = if typ == Declaration::PrimaryService {
            false
        } else if typ == Declaration::Include {
            true
        } else {
            let hdl = u16::from(range.start());
            return Err(ErrorRsp::new(op.into(), hdl, ErrorCode::UnsupportedGroupType));
        };
        let groups: Vec<(Handle, Handle, Uuid)> = (self.db.range(range))
            .filter_map(|(hdl, at)| match *at {
                Attr::Service { uuid, end } if !include => Some((hdl, end, uuid)),
                Attr::Include { uuid, start, end } if include => Some((start, end, uuid)),
                _ => None,
            })
            .collect();
        let Some(&(_, _, first)) = groups.first() else {
            return Err(not_found(op, range));
        };
        let size = first.wire_len();
        let entry = 4 + size;
        let n = usize::from(self.mtu - 2) / entry;
        self.send(Opcode::ReadByGroupTypeRsp, |p| {
            p.u8(entry as u8);
            for &(start, end, uuid) in (groups.iter())
                .take_while(|g| g.2.wire_len() == size)
                .take(n)
            {
                p.u16(start).u16(end).uuid(uuid);
            }
        });
        Ok(())
    }

    /// Handles `ATT_READ_BY_TYPE_REQ` ([Vol 3] Part F, Section 3.4.4.1).
    /// Characteristic discovery returns all declarations of the same UUID
    /// size. Any other type returns the value of the first matching
    /// characteristic or descriptor.
    fn read_by_type(&mut self, range: HandleRange, typ: Uuid) -> RspResult<()> {
        let op = Opcode::ReadByTypeReq;
        if typ == Declaration::Characteristic {
            let chars: Vec<(Handle, CharProps, Handle, Uuid)> = (self.db.range(range))
                .filter_map(|(hdl, _)| self.db.characteristic(hdl))
                .map(|c| (c.hdl, c.props, c.value_hdl, c.uuid))
                .collect();
            let Some(&(_, _, _, first)) = chars.first() else {
                return Err(not_found(op, range));
            };
            let size = first.wire_len();
            let entry = 5 + size;
            let n = usize::from(self.mtu - 2) / entry;
            self.send(Opcode::ReadByTypeRsp, |p| {
                p.u8(entry as u8);
                for &(hdl, props, value_hdl, uuid) in (chars.iter())
                    .take_while(|c| c.3.wire_len() == size)
                    .take(n)
                {
                    p.u16(hdl).u8(props.bits()).u16(value_hdl).uuid(uuid);
                }
            });
            return Ok(());
        }
        let found = self.db.range(range).find_map(|(hdl, at)| match *at {
            Attr::Characteristic {
                uuid,
                secure,
                value_hdl,
                ..
            } if uuid == typ => Some((value_hdl, secure)),
            Attr::Descriptor { uuid, secure, .. } if uuid == typ => Some((hdl, secure)),
            _ => None,
        });
        let Some((hdl, secure)) = found else {
            return Err(not_found(op, range));
        };
        if secure.contains(CharProps::READ) && !self.encrypted {
            let start = u16::from(range.start());
            return Err(ErrorRsp::new(op.into(), start, ErrorCode::InsufficientAuthentication));
        }
        let token = Token::next();
        let io = match self.static_value(hdl) {
            Some(v) => Io::Ready(Ok(v)),
            None => self.cap_read(hdl, 0, token),
        };
        self.start(token, Ctx::new(op, hdl, Kind::ReadByType), io);
        Ok(())
    }

    /// Handles `ATT_READ_REQ` and `ATT_READ_BLOB_REQ`
    /// ([Vol 3] Part F, Section 3.4.4.3 and 3.4.4.5).
    fn read(&mut self, op: Opcode, raw: u16, offset: u16) -> RspResult<()> {
        let err = |e| ErrorRsp::new(op.into(), raw, e);
        let (Some(hdl), Some(at)) = (Handle::new(raw), self.db.get(raw)) else {
            return Err(err(ErrorCode::InvalidHandle));
        };
        let v = match *at {
            Attr::Service { uuid, .. } | Attr::Include { uuid, .. } => Some(uuid.to_wire().to_vec()),
            Attr::Characteristic {
                uuid,
                props,
                value_hdl,
                ..
            } => {
                let mut v = vec![props.bits()];
                v.extend_from_slice(&u16::from(value_hdl).to_le_bytes());
                v.extend_from_slice(&uuid.to_wire());
                Some(v)
            }
            Attr::Value { .. } | Attr::Descriptor { .. } => None,
        };
        let v = match v {
            Some(v) => v,
            None => {
                let (props, secure) = self.access(hdl);
                if !props.contains(CharProps::READ) {
                    return Err(err(ErrorCode::ReadNotPermitted));
                }
                if secure.contains(CharProps::READ) && !self.encrypted {
                    return Err(err(ErrorCode::InsufficientAuthentication));
                }
                let Some(v) = self.static_value(hdl) else {
                    let token = Token::next();
                    let io = self.cap_read(hdl, offset, token);
                    self.start(token, Ctx::new(op, hdl, Kind::Read), io);
                    return Ok(());
                };
                v
            }
        };
        let Some(v) = v.get(usize::from(offset)..) else {
            return Err(err(ErrorCode::InvalidOffset));
        };
        self.respond(Ctx::new(op, hdl, Kind::Read), Ok(v.to_vec()));
        Ok(())
    }

    /// Handles `ATT_WRITE_REQ` and `ATT_WRITE_CMD`
    /// ([Vol 3] Part F, Section 3.4.5.1 and 3.4.5.3).
    fn write(&mut self, raw: u16, value: &[u8], cmd: bool) -> RspResult<()> {
        let op = if cmd { Opcode::WriteCmd } else { Opcode::WriteReq };
        let err = |e| ErrorRsp::new(op.into(), raw, e);
        let (Some(hdl), Some(at)) = (Handle::new(raw), self.db.get(raw)) else {
            return Err(err(ErrorCode::InvalidHandle));
        };
        let is_cccd = at.is_cccd();
        let perm = if cmd {
            CharProps::WRITE_WITHOUT_RESPONSE
        } else {
            CharProps::WRITE
        };
        let (props, secure) = self.access(hdl);
        if !props.contains(perm) {
            return Err(err(ErrorCode::WriteNotPermitted));
        }
        if secure.contains(perm) && !self.encrypted {
            return Err(err(ErrorCode::InsufficientAuthentication));
        }
        if is_cccd {
            return self.write_cccd(hdl, value, cmd).map_err(err);
        }
        let token = Token::next();
        let io = match self.db.value_owner(hdl).and_then(|c| c.cap) {
            Some(cap) => cap
                .write(WriteReq {
                    token,
                    handle: hdl,
                    data: value,
                    offset: 0,
                    without_response: cmd,
                })
                .map(|()| Vec::new()),
            None => Io::Ready(Err(ErrorCode::UnlikelyError)),
        };
        let kind = Kind::Write {
            without_response: cmd,
        };
        self.start(token, Ctx::new(op, hdl, kind), io);
        Ok(())
    }

    /// Writes a Client Characteristic Configuration descriptor and updates the
    /// subscription state of the owning characteristic.
    fn write_cccd(&mut self, hdl: Handle, value: &[u8], cmd: bool) -> IoResult<()> {
        let &[lo, hi] = value else {
            return Err(ErrorCode::InvalidAttributeValueLength);
        };
        let Some(Attr::Descriptor { value: v, owner, .. }) = self.db.get_mut(hdl) else {
            return Err(ErrorCode::UnlikelyError);
        };
        *v = Some(vec![lo, hi]);
        let owner = *owner;
        let cfg = Cccd::from_bits_truncate(u16::from_le_bytes([lo, hi]));
        if let Some(c) = self.db.characteristic(owner) {
            if let Some(cap) = c.cap {
                if cfg.is_empty() {
                    debug!("Unsubscribed from {}", c.value_hdl);
                    cap.unsubscribe();
                } else {
                    debug!("Subscribed to {} ({cfg:?})", c.value_hdl);
                    let n = Notifier::new(c.value_hdl, self.tx.clone());
                    cap.subscribe(usize::from(self.mtu) - 3, n);
                }
            }
        }
        if !cmd {
            self.send(Opcode::WriteRsp, |_| {});
        }
        Ok(())
    }

    /// Handles `ATT_PREPARE_WRITE_REQ` ([Vol 3] Part F, Section 3.4.6.1).
    /// Only one characteristic may be written at a time and each part must
    /// continue where the previous one ended.
    fn prepare_write(&mut self, raw: u16, offset: u16, value: &[u8], pdu: &[u8]) -> RspResult<()> {
        let err = |e| ErrorRsp::new(Opcode::PrepareWriteReq.into(), raw, e);
        let Some(hdl) = Handle::new(raw).filter(|_| self.db.get(raw).is_some()) else {
            return Err(err(ErrorCode::InvalidHandle));
        };
        let Some(c) = self.db.value_owner(hdl) else {
            return Err(err(ErrorCode::AttributeNotLong));
        };
        if !c.props.contains(CharProps::WRITE) {
            return Err(err(ErrorCode::WriteNotPermitted));
        }
        if c.secure.contains(CharProps::WRITE) && !self.encrypted {
            return Err(err(ErrorCode::InsufficientAuthentication));
        }
        match self.prepared.as_mut() {
            Some(pw) if pw.hdl != hdl => return Err(err(ErrorCode::UnlikelyError)),
            Some(pw) => {
                if usize::from(offset) != usize::from(pw.offset) + pw.data.len() {
                    return Err(err(ErrorCode::InvalidOffset));
                }
                if pw.data.len() + value.len() > MAX_VAL_LEN {
                    return Err(err(ErrorCode::PrepareQueueFull));
                }
                pw.data.extend_from_slice(value);
            }
            None => {
                if value.len() > MAX_VAL_LEN {
                    return Err(err(ErrorCode::PrepareQueueFull));
                }
                self.prepared = Some(PreparedWrite {
                    hdl,
                    offset,
                    data: value.to_vec(),
                });
            }
        }
        let n = pdu.len().min(usize::from(self.mtu));
        self.send(Opcode::PrepareWriteRsp, |p| {
            p.put(&pdu[1..n]);
        });
        Ok(())
    }

    /// Handles `ATT_EXECUTE_WRITE_REQ` ([Vol 3] Part F, Section 3.4.6.3).
    fn execute_write(&mut self, flags: u8) -> RspResult<()> {
        let err = ErrorRsp::new(Opcode::ExecuteWriteReq.into(), 0, ErrorCode::UnlikelyError);
        let Some(pw) = self.prepared.take() else {
            return Err(err);
        };
        match flags {
            0x00 => {
                debug!("Cancelled prepared write to {}", pw.hdl);
                self.send(Opcode::ExecuteWriteRsp, |_| {});
            }
            0x01 => {
                let token = Token::next();
                let io = match self.db.value_owner(pw.hdl).and_then(|c| c.cap) {
                    Some(cap) => cap
                        .write(WriteReq {
                            token,
                            handle: pw.hdl,
                            data: &pw.data,
                            offset: pw.offset,
                            without_response: false,
                        })
                        .map(|()| Vec::new()),
                    None => Io::Ready(Err(ErrorCode::UnlikelyError)),
                };
                self.start(token, Ctx::new(Opcode::ExecuteWriteReq, pw.hdl, Kind::Execute), io);
            }
            _ => return Err(err),
        }
        Ok(())
    }

    /// Handles `ATT_HANDLE_VALUE_CFM` ([Vol 3] Part F, Section 3.4.7.3).
    fn confirm(&mut self) {
        match self.last_indicated.take() {
            Some(cap) => cap.indicate(),
            None => debug!("Unexpected confirmation"),
        }
    }

    /// Returns the properties and the secure operations that apply to the
    /// attribute at `hdl`. Declarations permit nothing.
    fn access(&self, hdl: Handle) -> (CharProps, CharProps) {
        match self.db.get(hdl.into()) {
            Some(&Attr::Descriptor { props, secure, .. }) => (props, secure),
            Some(Attr::Value { .. }) => (self.db.value_owner(hdl))
                .map_or_else(Default::default, |c| (c.props, c.secure)),
            _ => Default::default(),
        }
    }

    /// Returns the static value of a characteristic value or descriptor.
    fn static_value(&self, hdl: Handle) -> Option<Vec<u8>> {
        match self.db.get(hdl.into())? {
            Attr::Value { value } | Attr::Descriptor { value, .. } => value.clone(),
            _ => None,
        }
    }

    /// Reads a characteristic value from its capability.
    fn cap_read(&self, hdl: Handle, offset: u16, token: Token) -> Io<Vec<u8>> {
        match self.db.value_owner(hdl).and_then(|c| c.cap) {
            Some(cap) => cap.read(ReadReq {
                token,
                handle: hdl,
                offset,
            }),
            None => Io::Ready(Err(ErrorCode::UnlikelyError)),
        }
    }

    /// Sends the response for a completed callback or records it as pending.
    fn start(&mut self, token: Token, ctx: Ctx, io: Io<Vec<u8>>) {
        match io {
            Io::Ready(r) => self.respond(ctx, r),
            Io::Pending => {
                trace!("Pending {token:?} for {ctx:?}");
                self.pending = Some(Pending { token, ctx });
            }
        }
    }

    /// Sends the response or error for a request.
    fn respond(&mut self, ctx: Ctx, r: IoResult<Vec<u8>>) {
        let v = match r {
            Ok(v) => v,
            Err(e) => {
                self.error(ErrorRsp::new(ctx.req.into(), ctx.hdl.into(), e));
                return;
            }
        };
        let mtu = usize::from(self.mtu);
        match ctx.kind {
            Kind::Read => {
                let op = if ctx.req == Opcode::ReadBlobReq {
                    Opcode::ReadBlobRsp
                } else {
                    Opcode::ReadRsp
                };
                let n = v.len().min(mtu - 1);
                self.send(op, |p| {
                    p.put(&v[..n]);
                });
            }
            Kind::ReadByType => {
                let n = v.len().min(mtu - 4).min(usize::from(u8::MAX) - 2);
                self.send(Opcode::ReadByTypeRsp, |p| {
                    p.u8((n + 2) as u8).u16(ctx.hdl).put(&v[..n]);
                });
            }
            Kind::Write { without_response } => {
                if !without_response {
                    self.send(Opcode::WriteRsp, |_| {});
                }
            }
            Kind::Execute => self.send(Opcode::ExecuteWriteRsp, |_| {}),
        }
    }

    /// Clears all CCCDs and unsubscribes their owners.
    fn unsubscribe_all(&mut self, why: &str) {
        for owner in self.db.reset_cccds() {
            if let Some(cap) = self.db.characteristic(owner).and_then(|c| c.cap) {
                debug!("Unsubscribing {owner} on {why}");
                cap.unsubscribe();
            }
        }
    }

    /// Sends an error response unless the failed PDU was a write command.
    fn error(&mut self, e: ErrorRsp) {
        debug!("{e}");
        if let Some(pdu) = e.to_pdu() {
            self.out.push_back(pdu);
        }
    }

    /// Queues an outbound PDU.
    #[inline]
    fn send(&mut self, op: Opcode, f: impl FnOnce(&mut Packer)) {
        self.out.push_back(pack(op, self.mtu, f));
    }

    fn reset(&mut self) {
        self.mtu = DEFAULT_MTU;
        self.encrypted = false;
        self.prepared = None;
        self.last_indicated = None;
        self.pending = None;
        self.queue.clear();
        self.out.clear();
        self.events.clear();
    }
}

/// Returns an `AttributeNotFound` error for the start of `range`.
#[inline]
fn not_found(op: Opcode, range: HandleRange) -> ErrorRsp {
    ErrorRsp::new(op.into(), range.start().into(), ErrorCode::AttributeNotFound)
}

/// Partial `ATT_PREPARE_WRITE_REQ` value.
#[derive(Clone, Debug, Eq, PartialEq)]
struct PreparedWrite {
    hdl: Handle,
    offset: u16,
    data: Vec<u8>,
}

/// Capability callback awaiting [`Server::complete`].
#[derive(Clone, Copy, Debug)]
struct Pending {
    token: Token,
    ctx: Ctx,
}

/// Request context needed to encode the response.
#[derive(Clone, Copy, Debug)]
struct Ctx {
    req: Opcode,
    hdl: Handle,
    kind: Kind,
}

impl Ctx {
    #[inline(always)]
    const fn new(req: Opcode, hdl: Handle, kind: Kind) -> Self {
        Self { req, hdl, kind }
    }
}

#[derive(Clone, Copy, Debug)]
enum Kind {
    Read,
    ReadByType,
    Write { without_response: bool },
    Execute,
}
