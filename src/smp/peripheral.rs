use std::collections::VecDeque;

use structbuf::StructBuf;
use tracing::{debug, error, info, trace, warn};

use blep_crypto::{Confirm, Key, Nonce};

use crate::le::Addr;

use super::*;

/// Pairing Failed reason sent when the peer confirm value does not match.
const CONFIRM_MISMATCH: Reason = Reason::AuthenticationRequirements;

/// Pairing session state.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, strum::Display)]
#[non_exhaustive]
pub enum State {
    #[default]
    Idle,
    RequestReceived,
    ConfirmExchanged,
    RandomExchanged,
    Bonded,
    Failed,
}

/// Peripheral role security manager implementing LE legacy pairing with the
/// Just Works association model ([Vol 3] Part H, Section 2.3.5.5). The
/// responder distributes the Short Term Key as its encryption key once the
/// link is encrypted.
///
/// Like the GATT server, `Pairing` does no I/O. Received PDUs are passed to
/// [`Pairing::recv`] and outbound PDUs are collected with
/// [`Pairing::poll_pdu`].
#[derive(Debug)]
pub struct Pairing {
    peer: Addr,
    local: Addr,
    state: State,
    preq: [u8; 7],
    pres: [u8; 7],
    tk: Key,
    pcnf: Option<Confirm>,
    r: Nonce,
    stk: Option<Key>,
    ediv: u16,
    rand: u64,
    out: VecDeque<StructBuf>,
}

impl Pairing {
    /// Creates an idle session for a connection between the peer (initiator)
    /// and local (responder) addresses.
    #[must_use]
    pub fn new(peer: Addr, local: Addr) -> Self {
        Self {
            peer,
            local,
            state: State::Idle,
            preq: [0; 7],
            pres: [0; 7],
            tk: Key::default(),
            pcnf: None,
            r: Nonce::default(),
            stk: None,
            ediv: 0,
            rand: 0,
            out: VecDeque::new(),
        }
    }

    /// Returns the session state.
    #[inline(always)]
    #[must_use]
    pub const fn state(&self) -> State {
        self.state
    }

    /// Returns the peer address.
    #[inline(always)]
    #[must_use]
    pub const fn peer(&self) -> Addr {
        self.peer
    }

    /// Returns the Short Term Key if `ediv` and `rand` identify it.
    #[must_use]
    pub fn stk(&self, ediv: u16, rand: u64) -> Option<&Key> {
        (self.stk.as_ref()).filter(|_| ediv == self.ediv && rand == self.rand)
    }

    /// Returns the next outbound PDU.
    #[inline]
    pub fn poll_pdu(&mut self) -> Option<StructBuf> {
        self.out.pop_front()
    }

    /// Processes a received SMP PDU. Derived keys are saved to `keys`. Returns
    /// an error if the pairing failed, either locally or by the peer.
    pub fn recv(&mut self, pdu: &[u8], keys: &dyn Keyring) -> Result<()> {
        trace!("SMP <- {pdu:02X?}");
        let cmd = match Command::unpack(pdu) {
            Ok(Some(cmd)) => cmd,
            Ok(None) => return Ok(()),
            Err(r) => return self.fail(r),
        };
        debug!("{cmd:?}");
        match (self.state, cmd) {
            (_, Command::PairingFailed(r)) => {
                warn!("Pairing failed by peer: {r}");
                self.set_state(State::Failed);
                Err(Error::Remote(r))
            }
            (_, Command::PairingRequest(_)) => {
                self.request(pdu);
                Ok(())
            }
            (State::RequestReceived, Command::PairingConfirm(c)) => {
                self.confirm(c);
                Ok(())
            }
            (State::ConfirmExchanged, Command::PairingRandom(r)) => self.random(r, keys),
            (s, cmd) => {
                warn!("Unexpected {cmd:?} in {s} state");
                self.fail(Reason::UnspecifiedReason)
            }
        }
    }

    /// Distributes the encryption key after the link is encrypted with the
    /// Short Term Key ([Vol 3] Part H, Section 3.6.1).
    pub fn encryption_changed(&mut self, enabled: bool) {
        if !enabled || self.state != State::RandomExchanged {
            return;
        }
        let Some(stk) = self.stk.clone() else { return };
        self.send(&Command::EncryptionInformation(stk));
        self.send(&Command::CentralIdentification {
            ediv: self.ediv,
            rand: self.rand,
        });
        info!("Bonded with {}", self.peer);
        self.set_state(State::Bonded);
    }

    /// Handles a rejected LTK request, which ends the session.
    pub fn ltk_negative_reply(&mut self) -> Result<()> {
        self.fail(Reason::UnspecifiedReason)
    }

    /// Handles Pairing Request by sending the fixed Pairing Response
    /// ([Vol 3] Part H, Section 3.5.1 and 3.5.2).
    fn request(&mut self, pdu: &[u8]) {
        let mut preq = [0; 7];
        preq.copy_from_slice(&pdu[..7]);
        let rsp = Command::PairingResponse(PairingParams::RESPONDER).pack();
        let mut pres = [0; 7];
        pres.copy_from_slice(rsp.as_ref());
        *self = Self {
            preq,
            pres,
            out: std::mem::take(&mut self.out),
            ..Self::new(self.peer, self.local)
        };
        self.out.push_back(rsp);
        self.set_state(State::RequestReceived);
    }

    /// Handles Pairing Confirm by sending the local confirm value
    /// ([Vol 3] Part H, Section 2.3.5.5).
    fn confirm(&mut self, c: Confirm) {
        self.pcnf = Some(c);
        self.r = Nonce::new();
        let cnf = self.c1(self.r);
        self.send(&Command::PairingConfirm(cnf));
        self.set_state(State::ConfirmExchanged);
    }

    /// Handles Pairing Random by verifying the peer confirm value and deriving
    /// the Short Term Key ([Vol 3] Part H, Section 2.4.4.1).
    fn random(&mut self, r: Nonce, keys: &dyn Keyring) -> Result<()> {
        if self.pcnf != Some(self.c1(r)) {
            error!("Confirm value mismatch for {}", self.peer);
            return self.fail(CONFIRM_MISMATCH);
        }
        let stk = self.tk.s1(self.r.into(), r.into());
        (self.ediv, self.rand) = (0, 0);
        let ltk = LongTermKey {
            peer: self.peer,
            authenticated: false,
            central: false,
            ediv: self.ediv,
            rand: self.rand,
            key: stk.clone(),
        };
        if let Err(e) = keys.store(&ltk) {
            error!("Failed to store key for {}: {e}", self.peer);
        }
        self.stk = Some(stk);
        self.send(&Command::PairingRandom(self.r));
        self.set_state(State::RandomExchanged);
        Ok(())
    }

    /// Computes the confirm value for random number `r` with the initiator
    /// address from the peer.
    fn c1(&self, r: Nonce) -> Confirm {
        let (ia, ra) = (self.peer.to_c1(), self.local.to_c1());
        self.tk.c1(r.into(), &self.preq, &self.pres, ia, ra)
    }

    /// Sends Pairing Failed and ends the session.
    fn fail<R>(&mut self, r: Reason) -> Result<R> {
        self.send(&Command::PairingFailed(r));
        self.set_state(State::Failed);
        Err(Error::Local(r))
    }

    fn send(&mut self, cmd: &Command) {
        let pdu = cmd.pack();
        trace!("SMP -> {:02X?}", pdu.as_ref());
        self.out.push_back(pdu);
    }

    fn set_state(&mut self, s: State) {
        if self.state != s {
            debug!("Pairing state: {} -> {s}", self.state);
            self.state = s;
        }
    }
}
