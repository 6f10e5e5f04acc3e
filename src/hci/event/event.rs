use std::time::Duration;

use smallvec::SmallVec;
use structbuf::Unpacker;

use crate::le::{Addr, RawAddr};

use super::*;

#[cfg(test)]
mod tests;

/// HCI event or LE subevent code.
#[derive(Clone, Copy, Debug, Eq, PartialEq, strum::Display)]
#[allow(clippy::exhaustive_enums)]
pub enum EventType {
    Hci(EventCode),
    Le(SubeventCode),
}

/// Decoded HCI event ([Vol 4] Part E, Section 7.7).
#[derive(Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum Event {
    DisconnectionComplete(DisconnectionComplete),
    EncryptionChange(EncryptionChange),
    EncryptionKeyRefreshComplete {
        status: Status,
        handle: ConnHandle,
    },
    CommandComplete(CommandComplete),
    CommandStatus {
        status: Status,
        cmd_quota: u8,
        opcode: Opcode,
    },
    HardwareError(u8),
    NumberOfCompletedPackets(NumberOfCompletedPackets),
    DataBufferOverflow,
    LeConnectionComplete(LeConnectionComplete),
    LeConnectionUpdateComplete(LeConnectionUpdateComplete),
    LeLongTermKeyRequest(LeLongTermKeyRequest),
}

impl Event {
    /// Unpacks and validates a received event (without the packet indicator).
    pub fn unpack(raw: &[u8]) -> Result<Self> {
        let invalid = || Error::InvalidEvent(Vec::from(raw));
        let mut p = Unpacker::new(raw);
        let (code, len) = (p.u8(), p.u8());
        if p.len() != usize::from(len) || !p.is_ok() {
            return Err(invalid());
        }
        let typ = match EventCode::try_from(code) {
            Ok(EventCode::LeMetaEvent) => {
                let subevent = p.u8();
                match SubeventCode::try_from(subevent) {
                    Ok(subevent) => EventType::Le(subevent),
                    Err(_) => {
                        return Err(Error::UnknownEvent {
                            code,
                            subevent,
                            params: Vec::from(p.into_inner()),
                        })
                    }
                }
            }
            Ok(code) => EventType::Hci(code),
            Err(_) => {
                return Err(Error::UnknownEvent {
                    code,
                    subevent: 0,
                    params: Vec::from(p.into_inner()),
                })
            }
        };
        let evt = match typ {
            EventType::Hci(EventCode::DisconnectionComplete) => {
                let (status, handle, reason) = (p.status(), p.handle(), p.status());
                Self::DisconnectionComplete(DisconnectionComplete {
                    status,
                    handle: handle.ok_or_else(invalid)?,
                    reason,
                })
            }
            EventType::Hci(EventCode::EncryptionChange) => {
                let (status, handle, enabled) = (p.status(), p.handle(), p.u8() != 0);
                Self::EncryptionChange(EncryptionChange {
                    status,
                    handle: handle.ok_or_else(invalid)?,
                    enabled,
                })
            }
            EventType::Hci(EventCode::EncryptionKeyRefreshComplete) => {
                let (status, handle) = (p.status(), p.handle());
                Self::EncryptionKeyRefreshComplete {
                    status,
                    handle: handle.ok_or_else(invalid)?,
                }
            }
            EventType::Hci(EventCode::CommandComplete) => {
                let (cmd_quota, opcode) = (p.u8(), Opcode::from(p.u16()));
                // Opcode::None completions have no return parameters
                let status = if p.is_empty() { Status::Success } else { p.status() };
                let ret = if p.is_ok() { p.into_inner().to_vec() } else { Vec::new() };
                Self::CommandComplete(CommandComplete {
                    cmd_quota,
                    opcode,
                    status,
                    ret,
                })
            }
            EventType::Hci(EventCode::CommandStatus) => Self::CommandStatus {
                status: p.status(),
                cmd_quota: p.u8(),
                opcode: Opcode::from(p.u16()),
            },
            EventType::Hci(EventCode::HardwareError) => Self::HardwareError(p.u8()),
            EventType::Hci(EventCode::NumberOfCompletedPackets) => {
                let n = p.u8();
                let mut v = NumberOfCompletedPackets::new();
                for _ in 0..n {
                    let (handle, count) = (p.handle(), p.u16());
                    v.push((handle.ok_or_else(invalid)?, count));
                }
                Self::NumberOfCompletedPackets(v)
            }
            EventType::Hci(EventCode::DataBufferOverflow) => {
                let _link_type = p.u8();
                Self::DataBufferOverflow
            }
            EventType::Le(
                sub @ (SubeventCode::ConnectionComplete
                | SubeventCode::EnhancedConnectionComplete),
            ) => {
                let (status, handle, role) = (p.status(), p.handle(), p.u8());
                let (typ, raw) = (p.u8(), p.addr());
                if sub == SubeventCode::EnhancedConnectionComplete {
                    let _local_rpa = p.addr();
                    let _peer_rpa = p.addr();
                }
                let (interval, latency, timeout, sca) = (p.u16(), p.u16(), p.u16(), p.u8());
                let (Some(handle), Ok(role), Some(peer)) =
                    (handle, Role::try_from(role), Addr::peer(typ, raw))
                else {
                    return Err(invalid());
                };
                Self::LeConnectionComplete(LeConnectionComplete {
                    status,
                    handle,
                    role,
                    peer,
                    params: ConnParams::new(interval, latency, timeout),
                    central_clock_accuracy: clock_accuracy(sca),
                })
            }
            EventType::Le(SubeventCode::ConnectionUpdateComplete) => {
                let (status, handle) = (p.status(), p.handle());
                let (interval, latency, timeout) = (p.u16(), p.u16(), p.u16());
                Self::LeConnectionUpdateComplete(LeConnectionUpdateComplete {
                    status,
                    handle: handle.ok_or_else(invalid)?,
                    params: ConnParams::new(interval, latency, timeout),
                })
            }
            EventType::Le(SubeventCode::LongTermKeyRequest) => {
                let (handle, rand, ediv) = (p.handle(), p.u64(), p.u16());
                Self::LeLongTermKeyRequest(LeLongTermKeyRequest {
                    handle: handle.ok_or_else(invalid)?,
                    rand,
                    ediv,
                })
            }
            EventType::Hci(EventCode::LeMetaEvent) => unreachable!(),
        };
        if p.is_ok() {
            Ok(evt)
        } else {
            Err(invalid())
        }
    }
}

/// `HCI_Disconnection_Complete` event parameters
/// ([Vol 4] Part E, Section 7.7.5).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DisconnectionComplete {
    pub status: Status,
    pub handle: ConnHandle,
    pub reason: Status,
}

/// `HCI_Encryption_Change` event parameters ([Vol 4] Part E, Section 7.7.8).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct EncryptionChange {
    pub status: Status,
    pub handle: ConnHandle,
    pub enabled: bool,
}

/// `HCI_Command_Complete` event parameters ([Vol 4] Part E, Section 7.7.14).
/// `ret` contains the return parameters following the status.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandComplete {
    pub cmd_quota: u8,
    pub opcode: Opcode,
    pub status: Status,
    pub ret: Vec<u8>,
}

/// `HCI_Number_Of_Completed_Packets` event parameters
/// ([Vol 4] Part E, Section 7.7.19).
pub type NumberOfCompletedPackets = SmallVec<[(ConnHandle, u16); 4]>;

/// `HCI_LE_Connection_Complete` and `HCI_LE_Enhanced_Connection_Complete` event
/// parameters ([Vol 4] Part E, Section 7.7.65.1 and 7.7.65.10).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct LeConnectionComplete {
    pub status: Status,
    pub handle: ConnHandle,
    pub role: Role,
    pub peer: Addr,
    pub params: ConnParams,
    pub central_clock_accuracy: u16,
}

/// `HCI_LE_Connection_Update_Complete` event parameters
/// ([Vol 4] Part E, Section 7.7.65.3).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct LeConnectionUpdateComplete {
    pub status: Status,
    pub handle: ConnHandle,
    pub params: ConnParams,
}

/// `HCI_LE_Long_Term_Key_Request` event parameters
/// ([Vol 4] Part E, Section 7.7.65.5).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct LeLongTermKeyRequest {
    pub handle: ConnHandle,
    pub rand: u64,
    pub ediv: u16,
}

/// Connection parameters.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ConnParams {
    pub interval: Duration,
    pub latency: u16,
    pub supervision_timeout: Duration,
}

impl ConnParams {
    /// Converts raw connection parameters.
    #[inline]
    #[must_use]
    const fn new(interval: u16, latency: u16, timeout: u16) -> Self {
        Self {
            interval: Duration::from_micros(interval as u64 * 1250),
            latency,
            supervision_timeout: Duration::from_millis(timeout as u64 * 10),
        }
    }
}

/// Converts central clock accuracy into ppm.
#[inline]
const fn clock_accuracy(v: u8) -> u16 {
    match v {
        0x00 => 500,
        0x01 => 250,
        0x02 => 150,
        0x03 => 100,
        0x04 => 75,
        0x05 => 50,
        0x06 => 30,
        0x07 => 20,
        _ => 0,
    }
}

/// Extension trait providing [`Event`]-specific [`Unpacker`] methods.
pub(crate) trait EventUnpacker {
    /// Returns the next status code.
    fn status(&mut self) -> Status;

    /// Returns the next connection handle.
    fn handle(&mut self) -> Option<ConnHandle>;

    /// Returns the next `BD_ADDR`.
    fn addr(&mut self) -> RawAddr;
}

impl EventUnpacker for Unpacker<'_> {
    #[inline(always)]
    fn status(&mut self) -> Status {
        Status::from(self.u8())
    }

    #[inline(always)]
    fn handle(&mut self) -> Option<ConnHandle> {
        ConnHandle::new(self.u16())
    }

    #[inline]
    fn addr(&mut self) -> RawAddr {
        let mut b = [0; 6];
        for v in &mut b {
            *v = self.u8();
        }
        RawAddr::from_le_bytes(b)
    }
}
