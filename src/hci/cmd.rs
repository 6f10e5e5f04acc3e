//! HCI commands issued by the host.

use blep_crypto::Key;

use super::*;

/// HCI Control and Baseband commands ([Vol 4] Part E, Section 7.3).
impl<T: Transport> Hci<T> {
    /// Resets the controller ([Vol 4] Part E, Section 7.3.2).
    #[inline]
    pub(super) fn reset(&mut self) -> Result<()> {
        self.cmd(Opcode::Reset, |_| {})
    }

    /// Configures which events can be generated by the controller
    /// ([Vol 4] Part E, Section 7.3.1).
    #[inline]
    fn set_event_mask(&mut self) -> Result<()> {
        self.cmd(Opcode::SetEventMask, |cmd| {
            cmd.put(EVENT_MASK);
        })
    }

    /// Reads the LE Supported (Host) setting
    /// ([Vol 4] Part E, Section 7.3.78).
    #[inline]
    fn read_le_host_support(&mut self) -> Result<()> {
        self.cmd(Opcode::ReadLeHostSupport, |_| {})
    }

    /// Sets the LE Supported (Host) Link Manager Protocol feature bit
    /// ([Vol 4] Part E, Section 7.3.79).
    #[inline]
    fn write_le_host_support(&mut self, enable: bool) -> Result<()> {
        self.cmd(Opcode::WriteLeHostSupport, |cmd| {
            cmd.u8(u8::from(enable)).u8(0);
        })
    }
}

/// Informational parameters commands ([Vol 4] Part E, Section 7.4).
impl<T: Transport> Hci<T> {
    /// Reads version information for the local controller
    /// ([Vol 4] Part E, Section 7.4.1).
    #[inline]
    fn read_local_version(&mut self) -> Result<()> {
        self.cmd(Opcode::ReadLocalVersionInformation, |_| {})
    }

    /// Reads the maximum size of the data portion of ACL data packets sent
    /// from the host to the controller ([Vol 4] Part E, Section 7.4.5).
    #[inline]
    pub(super) fn read_buffer_size(&mut self) -> Result<()> {
        self.cmd(Opcode::ReadBufferSize, |_| {})
    }

    /// Reads the controller's public device address
    /// ([Vol 4] Part E, Section 7.4.6).
    #[inline]
    fn read_bd_addr(&mut self) -> Result<()> {
        self.cmd(Opcode::ReadBdAddr, |_| {})
    }
}

/// Link Control and Status parameters commands
/// ([Vol 4] Part E, Sections 7.1 and 7.5).
impl<T: Transport> Hci<T> {
    /// Terminates the active connection ([Vol 4] Part E, Section 7.1.6).
    pub fn disconnect(&mut self, reason: Status) -> Result<()> {
        let hdl = self.conn.ok_or(Error::NotConnected)?.handle;
        self.cmd(Opcode::Disconnect, |cmd| {
            cmd.u16(hdl).u8(reason);
        })
    }

    /// Requests the RSSI of the active connection
    /// ([Vol 4] Part E, Section 7.5.4). The result is delivered as
    /// [`Signal::Rssi`].
    pub fn read_rssi(&mut self) -> Result<()> {
        let hdl = self.conn.ok_or(Error::NotConnected)?.handle;
        self.cmd(Opcode::ReadRssi, |cmd| {
            cmd.u16(hdl);
        })
    }
}

/// LE Controller commands ([Vol 4] Part E, Section 7.8).
impl<T: Transport> Hci<T> {
    /// Configures which LE events can be generated by the controller
    /// ([Vol 4] Part E, Section 7.8.1).
    #[inline]
    fn le_set_event_mask(&mut self) -> Result<()> {
        self.cmd(Opcode::LeSetEventMask, |cmd| {
            cmd.put(LE_EVENT_MASK);
        })
    }

    /// Reads the controller's LE ACL buffer size
    /// ([Vol 4] Part E, Section 7.8.2).
    #[inline]
    fn le_read_buffer_size(&mut self) -> Result<()> {
        self.cmd(Opcode::LeReadBufferSize, |_| {})
    }

    /// Replies to a Long Term Key request with the key to use for encryption
    /// ([Vol 4] Part E, Section 7.8.25).
    pub fn le_ltk_reply(&mut self, hdl: ConnHandle, k: &Key) -> Result<()> {
        self.cmd(Opcode::LeLongTermKeyRequestReply, |cmd| {
            cmd.u16(hdl).put(k.to_le_bytes());
        })
    }

    /// Replies to a Long Term Key request when the host has no key for the
    /// peer ([Vol 4] Part E, Section 7.8.26).
    pub fn le_ltk_negative_reply(&mut self, hdl: ConnHandle) -> Result<()> {
        self.cmd(Opcode::LeLongTermKeyRequestNegativeReply, |cmd| {
            cmd.u16(hdl);
        })
    }
}

impl<T: Transport> Hci<T> {
    /// Performs basic controller setup after a reset or when the host does not
    /// have exclusive access to the controller.
    pub(super) fn setup(&mut self) -> Result<()> {
        self.reset_buffers();
        self.set_event_mask()?;
        self.le_set_event_mask()?;
        self.read_local_version()?;
        self.write_le_host_support(true)?;
        self.read_le_host_support()?;
        self.read_bd_addr()?;
        self.le_read_buffer_size()
    }
}
