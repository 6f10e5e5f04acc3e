use tracing::{debug, info, warn};

use super::*;

/// Maximum legacy advertising or scan response data length
/// ([Vol 4] Part E, Section 7.8.7).
pub const MAX_ADV_DATA_LEN: usize = 31;

/// Host-side advertising state.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, strum::Display)]
#[non_exhaustive]
pub enum AdvState {
    #[default]
    Stopped,
    Starting,
    Started,
    /// Advertising is being re-enabled after a disconnect.
    Restarting,
    Stopping,
}

/// Legacy advertising commands ([Vol 4] Part E, Section 7.8).
impl<T: Transport> Hci<T> {
    /// Returns the current advertising state.
    #[inline(always)]
    #[must_use]
    pub const fn adv_state(&self) -> AdvState {
        self.adv
    }

    /// Sets connectable undirected advertising parameters on all primary
    /// channels ([Vol 4] Part E, Section 7.8.5).
    pub fn set_advertising_parameters(&mut self) -> Result<()> {
        let interval = adv_interval(self.adv_interval);
        self.cmd(Opcode::LeSetAdvertisingParameters, |cmd| {
            cmd.u16(interval)
                .u16(interval)
                .u8(AdvType::AdvInd)
                .u8(0x00) // Own_Address_Type: public
                .u8(0x00) // Peer_Address_Type
                .put([0; 6]) // Peer_Address
                .u8(0x07) // Advertising_Channel_Map: 37, 38, 39
                .u8(0x00); // Advertising_Filter_Policy: none
        })
    }

    /// Sets advertising data ([Vol 4] Part E, Section 7.8.7).
    #[inline]
    pub fn set_advertising_data(&mut self, data: &[u8]) -> Result<()> {
        self.adv_data(Opcode::LeSetAdvertisingData, data)
    }

    /// Sets scan response data ([Vol 4] Part E, Section 7.8.8).
    #[inline]
    pub fn set_scan_response_data(&mut self, data: &[u8]) -> Result<()> {
        self.adv_data(Opcode::LeSetScanResponseData, data)
    }

    /// Enables or disables advertising ([Vol 4] Part E, Section 7.8.9).
    #[inline]
    pub fn set_advertise_enable(&mut self, enable: bool) -> Result<()> {
        self.cmd(Opcode::LeSetAdvertisingEnable, |cmd| {
            cmd.u8(u8::from(enable));
        })
    }

    /// Starts advertising with the specified advertising and scan response
    /// data. Completion is signaled by [`Signal::AdvertisingStart`].
    pub fn start_advertising(&mut self, adv: &[u8], scan: &[u8]) -> Result<()> {
        for v in [adv, scan] {
            if v.len() > MAX_ADV_DATA_LEN {
                return Err(Error::AdvDataTooLong(v.len()));
            }
        }
        self.adv = AdvState::Starting;
        self.set_scan_response_data(scan)?;
        self.set_advertising_data(adv)?;
        self.set_advertise_enable(true)
    }

    /// Stops advertising. Completion is signaled by
    /// [`Signal::AdvertisingStop`].
    pub fn stop_advertising(&mut self) -> Result<()> {
        self.adv = AdvState::Stopping;
        self.set_advertise_enable(false)
    }

    /// Re-enables advertising after the controller stopped it to accept a
    /// connection.
    pub(super) fn restart_advertising(&mut self) -> Result<()> {
        if !matches!(self.adv, AdvState::Started | AdvState::Restarting) {
            return Ok(());
        }
        debug!("Restarting advertising");
        self.adv = AdvState::Restarting;
        self.set_advertise_enable(true)
    }

    /// Handles advertising enable command completion.
    pub(super) fn on_adv_enable(&mut self, status: Status) {
        match self.adv {
            AdvState::Starting => {
                if status.is_ok() {
                    info!("Advertising started");
                    self.adv = AdvState::Started;
                } else {
                    self.adv = AdvState::Stopped;
                }
                self.signals.push_back(Signal::AdvertisingStart(status));
            }
            AdvState::Restarting => {
                if !status.is_ok() {
                    warn!("Failed to restart advertising: {status}");
                }
                self.adv = AdvState::Started;
            }
            AdvState::Stopping => {
                info!("Advertising stopped");
                self.adv = AdvState::Stopped;
                self.signals.push_back(Signal::AdvertisingStop(status));
            }
            AdvState::Stopped | AdvState::Started => {}
        }
    }

    /// Writes an advertising or scan response data command. The data is
    /// always padded to the full 31 bytes.
    fn adv_data(&mut self, opcode: Opcode, data: &[u8]) -> Result<()> {
        if data.len() > MAX_ADV_DATA_LEN {
            return Err(Error::AdvDataTooLong(data.len()));
        }
        let mut padded = [0; MAX_ADV_DATA_LEN];
        padded[..data.len()].copy_from_slice(data);
        #[allow(clippy::cast_possible_truncation)]
        self.cmd(opcode, |cmd| {
            cmd.u8(data.len() as u8).put(padded);
        })
    }
}

/// Converts advertising interval into 0.625 ms units, clamped to the valid
/// range ([Vol 4] Part E, Section 7.8.5).
#[allow(clippy::cast_possible_truncation)]
#[inline]
fn adv_interval(d: Duration) -> u16 {
    (d.as_micros() / 625).clamp(0x0020, 0x4000) as u16
}
