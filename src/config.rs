use std::time::Duration;

use crate::att::{DEFAULT_MTU, MAX_MTU};

/// Peripheral configuration. Missing fields are filled in with defaults when
/// deserializing.
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct Config {
    /// GAP Device Name characteristic value.
    pub device_name: String,
    /// GAP Appearance characteristic value ([Assigned Numbers] Section 2.6).
    pub appearance: u16,
    /// Largest ATT_MTU accepted during MTU exchange.
    pub max_mtu: u16,
    /// Advertising interval.
    pub adv_interval: Duration,
    /// Reset the controller before setup. Set when the host has exclusive
    /// access to the controller, such as a Linux HCI user channel.
    pub user_channel: bool,
}

impl Config {
    /// Returns the maximum ATT_MTU limited to the range supported by the
    /// server.
    #[inline]
    #[must_use]
    pub fn max_mtu(&self) -> u16 {
        self.max_mtu.clamp(DEFAULT_MTU, MAX_MTU)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device_name: "blep".to_owned(),
            appearance: 0x0080, // Generic Computer
            max_mtu: 256,
            adv_interval: Duration::from_millis(100),
            user_channel: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_mtu() {
        let mut c = Config::default();
        assert_eq!(c.max_mtu(), 256);
        c.max_mtu = 0;
        assert_eq!(c.max_mtu(), 23);
        c.max_mtu = u16::MAX;
        assert_eq!(c.max_mtu(), 517);
    }
}
