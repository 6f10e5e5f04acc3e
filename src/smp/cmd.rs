use structbuf::{Pack, Packer, StructBuf, Unpacker};
use tracing::warn;

use blep_crypto::{Confirm, Key, Nonce};

use super::*;

/// Maximum SMP PDU length for LE legacy pairing ([Vol 3] Part H, Section 3.2).
const MTU: usize = 23;

/// SMP command ([Vol 3] Part H, Section 3.3). Only LE legacy pairing
/// commands exchanged by the responder are represented.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(super) enum Command {
    PairingRequest(PairingParams),
    PairingResponse(PairingParams),
    PairingConfirm(Confirm),
    PairingRandom(Nonce),
    PairingFailed(Reason),
    EncryptionInformation(Key),
    CentralIdentification { ediv: u16, rand: u64 },
}

impl Command {
    /// Decodes a received PDU. Returns `Ok(None)` for commands with an unknown
    /// or unsupported code, which are ignored.
    pub fn unpack(pdu: &[u8]) -> std::result::Result<Option<Self>, Reason> {
        let Some((&code, params)) = pdu.split_first() else {
            return Err(Reason::InvalidParameters);
        };
        let Ok(code) = Code::try_from(code) else {
            warn!("Unknown SMP command code: {code:#04X}");
            return Ok(None);
        };
        let mut p = Unpacker::new(params);
        let cmd = match code {
            Code::PairingRequest => PairingParams::unpack(&mut p).map(Self::PairingRequest),
            Code::PairingResponse => PairingParams::unpack(&mut p).map(Self::PairingResponse),
            Code::PairingConfirm => {
                Some(Self::PairingConfirm(Confirm::from_le_bytes(p.u128().to_le_bytes())))
            }
            Code::PairingRandom => Some(Self::PairingRandom(Nonce::from(p.u128()))),
            Code::PairingFailed => Some(Self::PairingFailed(
                Reason::try_from(p.u8()).unwrap_or(Reason::UnspecifiedReason),
            )),
            Code::EncryptionInformation => Some(Self::EncryptionInformation(Key::from_le_bytes(
                p.u128().to_le_bytes(),
            ))),
            Code::CentralIdentification => Some(Self::CentralIdentification {
                ediv: p.u16(),
                rand: p.u64(),
            }),
            _ => {
                warn!("Unsupported SMP command: {code}");
                return Ok(None);
            }
        };
        match cmd {
            Some(cmd) if p.is_ok() => Ok(Some(cmd)),
            _ => {
                warn!("Invalid {code} PDU: {pdu:02X?}");
                Err(Reason::InvalidParameters)
            }
        }
    }

    /// Encodes the command.
    pub fn pack(&self) -> StructBuf {
        let mut pdu = StructBuf::new(MTU);
        let mut p = pdu.append();
        match *self {
            Self::PairingRequest(ref v) => v.pack(p.u8(Code::PairingRequest)),
            Self::PairingResponse(ref v) => v.pack(p.u8(Code::PairingResponse)),
            Self::PairingConfirm(v) => {
                p.u8(Code::PairingConfirm).put(v.to_le_bytes());
            }
            Self::PairingRandom(v) => {
                p.u8(Code::PairingRandom).put(v.to_le_bytes());
            }
            Self::PairingFailed(r) => {
                p.u8(Code::PairingFailed).u8(r);
            }
            Self::EncryptionInformation(ref k) => {
                p.u8(Code::EncryptionInformation).put(k.to_le_bytes());
            }
            Self::CentralIdentification { ediv, rand } => {
                (p.u8(Code::CentralIdentification).u16(ediv)).put(rand.to_le_bytes());
            }
        }
        pdu
    }
}

/// Pairing Request/Response parameters ([Vol 3] Part H, Section 3.5.1).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(super) struct PairingParams {
    /// IO capabilities.
    pub io_cap: IoCap,
    /// OOB authentication data is available flag.
    pub oob_data: bool,
    /// Requested security properties.
    pub auth_req: AuthReq,
    /// Maximum encryption key size that the device can support (7-16 octets).
    pub max_key_len: u8,
    /// Keys that the initiator is requesting to distribute.
    pub initiator_keys: KeyDist,
    /// Keys that the initiator is requesting the responder to distribute.
    pub responder_keys: KeyDist,
}

impl PairingParams {
    /// Valid encryption key sizes.
    pub const KEY_LEN: std::ops::RangeInclusive<u8> = 7..=16;

    /// Parameters sent in every Pairing Response: no input or output, no OOB
    /// data, bonding without MITM protection, 128-bit keys, and only the
    /// responder distributing its encryption key.
    pub const RESPONDER: Self = Self {
        io_cap: IoCap::NoInputNoOutput,
        oob_data: false,
        auth_req: AuthReq::BONDING,
        max_key_len: 16,
        initiator_keys: KeyDist::empty(),
        responder_keys: KeyDist::ENC,
    };

    #[inline]
    fn pack(&self, p: &mut Packer) {
        p.u8(self.io_cap)
            .u8(u8::from(self.oob_data))
            .u8(self.auth_req.bits())
            .u8(self.max_key_len)
            .u8(self.initiator_keys.bits())
            .u8(self.responder_keys.bits());
    }

    /// Decodes pairing parameters without validating them. The responder
    /// always uses Just Works and answers with [`Self::RESPONDER`], so a
    /// reserved IO capability is read as `NoInputNoOutput` and the key size is
    /// kept as sent.
    #[inline]
    fn unpack(p: &mut Unpacker) -> Option<Self> {
        let io_cap = p.u8();
        let io_cap = IoCap::try_from(io_cap).unwrap_or_else(|_| {
            warn!("Reserved IO capability: {io_cap:#04X}");
            IoCap::NoInputNoOutput
        });
        let params = Self {
            io_cap,
            oob_data: p.u8() != 0,
            auth_req: AuthReq::from_bits_retain(p.u8()),
            max_key_len: p.u8(),
            initiator_keys: KeyDist::from_bits_retain(p.u8()),
            responder_keys: KeyDist::from_bits_retain(p.u8()),
        };
        if !Self::KEY_LEN.contains(&params.max_key_len) {
            warn!("Invalid maximum key size: {}", params.max_key_len);
        }
        Some(params)
    }
}

#[cfg(test)]
mod tests {
    use matches::assert_matches;

    use super::*;

    #[test]
    fn pairing_response() {
        let pdu = Command::PairingResponse(PairingParams::RESPONDER).pack();
        assert_eq!(pdu.as_ref(), &[0x02, 0x03, 0x00, 0x01, 0x10, 0x00, 0x01]);
    }

    #[test]
    fn pairing_request() {
        let pdu = [0x01, 0x04, 0x00, 0x2D, 0x10, 0x0F, 0x0F];
        let Ok(Some(Command::PairingRequest(p))) = Command::unpack(&pdu) else {
            panic!("invalid request");
        };
        assert_eq!(p.io_cap, IoCap::KeyboardDisplay);
        assert_eq!(p.auth_req.bits(), 0x2D);
        assert_eq!(p.max_key_len, 16);
        assert_eq!(p.initiator_keys.bits(), 0x0F);

        // Field values are not validated, only the length
        let mut odd = pdu;
        odd[1] = 0x05;
        odd[4] = 6;
        assert_matches!(
            Command::unpack(&odd),
            Ok(Some(Command::PairingRequest(PairingParams {
                io_cap: IoCap::NoInputNoOutput,
                max_key_len: 6,
                ..
            })))
        );
        odd[4] = 17;
        assert_matches!(
            Command::unpack(&odd),
            Ok(Some(Command::PairingRequest(PairingParams { max_key_len: 17, .. })))
        );
        assert_matches!(Command::unpack(&pdu[..6]), Err(Reason::InvalidParameters));
    }

    #[test]
    fn unpack() {
        assert_matches!(Command::unpack(&[]), Err(Reason::InvalidParameters));
        assert_matches!(Command::unpack(&[0x20, 0x01]), Ok(None));
        assert_matches!(Command::unpack(&[0x0B, 0x01]), Ok(None));
        assert_matches!(
            Command::unpack(&[0x05, 0x04]),
            Ok(Some(Command::PairingFailed(Reason::ConfirmValueFailed)))
        );
        assert_matches!(
            Command::unpack(&[0x05, 0xF0]),
            Ok(Some(Command::PairingFailed(Reason::UnspecifiedReason)))
        );
        let mut pdu = [0; 17];
        pdu[0] = 0x04;
        pdu[1] = 0xAB;
        assert_eq!(
            Command::unpack(&pdu),
            Ok(Some(Command::PairingRandom(Nonce::from(0xAB))))
        );
        assert_matches!(Command::unpack(&pdu[..16]), Err(Reason::InvalidParameters));
    }

    #[test]
    fn key_distribution() {
        let k = Key::new(0x0102_0304_0506_0708_090A_0B0C_0D0E_0F10);
        let pdu = Command::EncryptionInformation(k.clone()).pack();
        assert_eq!(pdu.len(), 17);
        assert_eq!(&pdu.as_ref()[..3], &[0x06, 0x10, 0x0F]);
        assert_eq!(
            Command::unpack(pdu.as_ref()),
            Ok(Some(Command::EncryptionInformation(k)))
        );
        let pdu = Command::CentralIdentification {
            ediv: 0x1234,
            rand: 0x0102_0304_0506_0708,
        }
        .pack();
        assert_eq!(
            pdu.as_ref(),
            &[0x07, 0x34, 0x12, 0x08, 0x07, 0x06, 0x05, 0x04, 0x03, 0x02, 0x01]
        );
    }
}
