//! Attribute Protocol ([Vol 3] Part F).
//!
//! PDU encoding and decoding for the server role. Request processing lives in
//! [`crate::gatt::Server`].

use structbuf::{Pack, StructBuf};

pub use {consts::*, handle::*, pdu::*};

mod consts;
mod handle;
mod pdu;

/// PDU response result.
pub type RspResult<T> = std::result::Result<T, ErrorRsp>;

/// `ATT_ERROR_RSP` PDU ([Vol 3] Part F, Section 3.4.1.1).
#[derive(Clone, Copy, Debug, Eq, PartialEq, thiserror::Error)]
#[error("ATT request {req:#04X} for handle {hdl:#06X} failed with {err}")]
pub struct ErrorRsp {
    req: u8,
    hdl: u16,
    err: ErrorCode,
}

impl ErrorRsp {
    /// Creates a new error response.
    #[inline(always)]
    #[must_use]
    pub const fn new(req: u8, hdl: u16, err: ErrorCode) -> Self {
        Self { req, hdl, err }
    }

    /// Returns the raw opcode of the failed request.
    #[inline(always)]
    #[must_use]
    pub const fn req(&self) -> u8 {
        self.req
    }

    /// Returns the handle that caused the error or zero.
    #[inline(always)]
    #[must_use]
    pub const fn handle(&self) -> u16 {
        self.hdl
    }

    /// Returns the error code.
    #[inline(always)]
    #[must_use]
    pub const fn err(&self) -> ErrorCode {
        self.err
    }

    /// Returns the encoded PDU or [`None`] if the failed request was
    /// `ATT_WRITE_CMD`, which never receives a response. Unsupported commands,
    /// such as `ATT_SIGNED_WRITE_CMD`, are still rejected with an error.
    #[must_use]
    pub fn to_pdu(&self) -> Option<StructBuf> {
        if self.req == u8::from(Opcode::WriteCmd) {
            return None;
        }
        let mut pdu = StructBuf::new(5);
        pdu.append().u8(Opcode::ErrorRsp).u8(self.req).u16(self.hdl).u8(self.err);
        Some(pdu)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_rsp() {
        let e = ErrorRsp::new(Opcode::ReadReq.into(), 0x0102, ErrorCode::InvalidHandle);
        assert_eq!(e.to_pdu().unwrap().as_ref(), &[0x01, 0x0A, 0x02, 0x01, 0x01]);
        let e = ErrorRsp::new(Opcode::WriteCmd.into(), 3, ErrorCode::WriteNotPermitted);
        assert!(e.to_pdu().is_none());
        let e = ErrorRsp::new(Opcode::SignedWriteCmd.into(), 0, ErrorCode::RequestNotSupported);
        assert_eq!(e.to_pdu().unwrap().as_ref(), &[0x01, 0xD2, 0x00, 0x00, 0x06]);
        assert_eq!(
            e.to_string(),
            "ATT request 0x52 for handle 0x0003 failed with WriteNotPermitted"
        );
    }
}
