use structbuf::{Pack, Packer, StructBuf, Unpacker};

use crate::gap::Uuid;

use super::*;

/// Client request, command, or confirmation received by the server
/// ([Vol 3] Part F, Section 3.4). Handles are kept raw so that error
/// responses can echo the value sent by the client.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum Request<'a> {
    /// `ATT_EXCHANGE_MTU_REQ` ([Vol 3] Part F, Section 3.4.2.1).
    ExchangeMtu { mtu: u16 },
    /// `ATT_FIND_INFORMATION_REQ` ([Vol 3] Part F, Section 3.4.3.1).
    FindInformation { range: HandleRange },
    /// `ATT_FIND_BY_TYPE_VALUE_REQ` ([Vol 3] Part F, Section 3.4.3.3).
    FindByTypeValue {
        range: HandleRange,
        typ: u16,
        value: &'a [u8],
    },
    /// `ATT_READ_BY_TYPE_REQ` ([Vol 3] Part F, Section 3.4.4.1).
    ReadByType { range: HandleRange, typ: Uuid },
    /// `ATT_READ_REQ` ([Vol 3] Part F, Section 3.4.4.3).
    Read { hdl: u16 },
    /// `ATT_READ_BLOB_REQ` ([Vol 3] Part F, Section 3.4.4.5).
    ReadBlob { hdl: u16, offset: u16 },
    /// `ATT_READ_BY_GROUP_TYPE_REQ` ([Vol 3] Part F, Section 3.4.4.9).
    ReadByGroupType { range: HandleRange, typ: Uuid },
    /// `ATT_WRITE_REQ` and `ATT_WRITE_CMD` ([Vol 3] Part F, Section 3.4.5).
    Write {
        hdl: u16,
        value: &'a [u8],
        cmd: bool,
    },
    /// `ATT_PREPARE_WRITE_REQ` ([Vol 3] Part F, Section 3.4.6.1).
    PrepareWrite {
        hdl: u16,
        offset: u16,
        value: &'a [u8],
    },
    /// `ATT_EXECUTE_WRITE_REQ` ([Vol 3] Part F, Section 3.4.6.3).
    ExecuteWrite { flags: u8 },
    /// `ATT_HANDLE_VALUE_CFM` ([Vol 3] Part F, Section 3.4.7.3).
    HandleValueCfm,
}

impl<'a> Request<'a> {
    /// Parses a received PDU. Unsupported opcodes are reported as
    /// `RequestNotSupported` and malformed parameters as `InvalidPdu`.
    pub fn parse(pdu: &'a [u8]) -> RspResult<Self> {
        let Some((&raw, params)) = pdu.split_first() else {
            return Err(ErrorRsp::new(0, 0, ErrorCode::InvalidPdu));
        };
        let op = match Opcode::try_from(raw) {
            Ok(op) => op,
            Err(_) => return Err(ErrorRsp::new(raw, 0, ErrorCode::RequestNotSupported)),
        };
        let mut p = Unpacker::new(params);
        let req = match op {
            Opcode::ExchangeMtuReq => Self::ExchangeMtu { mtu: p.u16() },
            Opcode::FindInformationReq => Self::FindInformation {
                range: range(raw, &mut p)?,
            },
            Opcode::FindByTypeValueReq => {
                let range = range(raw, &mut p)?;
                Self::FindByTypeValue {
                    range,
                    typ: p.u16(),
                    value: tail(params, 6),
                }
            }
            Opcode::ReadByTypeReq | Opcode::ReadByGroupTypeReq => {
                let range = range(raw, &mut p)?;
                let typ = Uuid::try_from(tail(params, 4))
                    .map_err(|_| ErrorRsp::new(raw, 0, ErrorCode::InvalidPdu))?;
                if op == Opcode::ReadByTypeReq {
                    Self::ReadByType { range, typ }
                } else {
                    Self::ReadByGroupType { range, typ }
                }
            }
            Opcode::ReadReq => Self::Read { hdl: p.u16() },
            Opcode::ReadBlobReq => Self::ReadBlob {
                hdl: p.u16(),
                offset: p.u16(),
            },
            Opcode::WriteReq | Opcode::WriteCmd => Self::Write {
                hdl: p.u16(),
                value: tail(params, 2),
                cmd: op == Opcode::WriteCmd,
            },
            Opcode::PrepareWriteReq => Self::PrepareWrite {
                hdl: p.u16(),
                offset: p.u16(),
                value: tail(params, 4),
            },
            Opcode::ExecuteWriteReq => Self::ExecuteWrite { flags: p.u8() },
            Opcode::HandleValueCfm => Self::HandleValueCfm,
            _ => return Err(ErrorRsp::new(raw, 0, ErrorCode::RequestNotSupported)),
        };
        // Fixed fields are read through the unpacker. Trailing values are
        // sliced directly.
        if p.is_ok() {
            Ok(req)
        } else {
            Err(ErrorRsp::new(raw, 0, ErrorCode::InvalidPdu))
        }
    }

    /// Returns the request opcode.
    #[must_use]
    pub const fn opcode(&self) -> Opcode {
        match *self {
            Self::ExchangeMtu { .. } => Opcode::ExchangeMtuReq,
            Self::FindInformation { .. } => Opcode::FindInformationReq,
            Self::FindByTypeValue { .. } => Opcode::FindByTypeValueReq,
            Self::ReadByType { .. } => Opcode::ReadByTypeReq,
            Self::Read { .. } => Opcode::ReadReq,
            Self::ReadBlob { .. } => Opcode::ReadBlobReq,
            Self::ReadByGroupType { .. } => Opcode::ReadByGroupTypeReq,
            Self::Write { cmd: false, .. } => Opcode::WriteReq,
            Self::Write { cmd: true, .. } => Opcode::WriteCmd,
            Self::PrepareWrite { .. } => Opcode::PrepareWriteReq,
            Self::ExecuteWrite { .. } => Opcode::ExecuteWriteReq,
            Self::HandleValueCfm => Opcode::HandleValueCfm,
        }
    }
}

/// Unpacks start/end handle range ([Vol 3] Part F, Section 3.4.3.1). An
/// invalid range is reported with the starting handle.
fn range(op: u8, p: &mut Unpacker) -> RspResult<HandleRange> {
    let (start, end) = (p.u16(), p.u16());
    if !p.is_ok() {
        return Err(ErrorRsp::new(op, 0, ErrorCode::InvalidPdu));
    }
    Handle::new(start)
        .zip(Handle::new(end))
        .and_then(|(s, e)| HandleRange::new(s, e))
        .ok_or(ErrorRsp::new(op, start, ErrorCode::InvalidHandle))
}

/// Returns PDU parameters starting at byte `i`.
#[inline]
fn tail(params: &[u8], i: usize) -> &[u8] {
    params.get(i..).unwrap_or_default()
}

/// Returns an outbound PDU limited to `mtu` bytes, calling `f` to encode it
/// after writing the opcode.
#[inline]
pub(crate) fn pack(op: Opcode, mtu: u16, f: impl FnOnce(&mut Packer)) -> StructBuf {
    let mut pdu = StructBuf::new(usize::from(mtu));
    f(pdu.append().u8(op));
    pdu
}

#[cfg(test)]
mod tests {
    use matches::assert_matches;

    use super::*;

    #[test]
    fn parse() {
        assert_matches!(
            Request::parse(&[0x02, 0xF7, 0x00]),
            Ok(Request::ExchangeMtu { mtu: 247 })
        );
        assert_matches!(
            Request::parse(&[0x10, 0x01, 0x00, 0xFF, 0xFF, 0x00, 0x28]),
            Ok(Request::ReadByGroupType { typ, .. }) if typ.as_u16() == Some(0x2800)
        );
        assert_matches!(
            Request::parse(&[0x52, 0x03, 0x00, 0xAA, 0xBB]),
            Ok(Request::Write { hdl: 3, value: [0xAA, 0xBB], cmd: true })
        );
        assert_matches!(
            Request::parse(&[0x16, 0x03, 0x00, 0x05, 0x00]),
            Ok(Request::PrepareWrite { hdl: 3, offset: 5, value: [] })
        );
        assert_matches!(Request::parse(&[0x1E]), Ok(Request::HandleValueCfm));
    }

    #[test]
    fn parse_errors() {
        assert_eq!(Request::parse(&[]), Err(ErrorRsp::new(0, 0, ErrorCode::InvalidPdu)));
        assert_eq!(
            Request::parse(&[0x0E, 0x01, 0x00, 0x02, 0x00]),
            Err(ErrorRsp::new(0x0E, 0, ErrorCode::RequestNotSupported))
        );
        assert_eq!(
            Request::parse(&[0xFA]),
            Err(ErrorRsp::new(0xFA, 0, ErrorCode::RequestNotSupported))
        );
        assert_eq!(
            Request::parse(&[0x0A, 0x01]),
            Err(ErrorRsp::new(0x0A, 0, ErrorCode::InvalidPdu))
        );
        assert_eq!(
            Request::parse(&[0x04, 0x05, 0x00, 0x01, 0x00]),
            Err(ErrorRsp::new(0x04, 5, ErrorCode::InvalidHandle))
        );
        assert_eq!(
            Request::parse(&[0x04, 0x00, 0x00, 0x01, 0x00]),
            Err(ErrorRsp::new(0x04, 0, ErrorCode::InvalidHandle))
        );
        assert_eq!(
            Request::parse(&[0x08, 0x01, 0x00, 0xFF, 0xFF, 0x00]),
            Err(ErrorRsp::new(0x08, 0, ErrorCode::InvalidPdu))
        );
    }
}
