//! Generic Access Profile ([Vol 3] Part C).
//!
//! Advertising and scan response payloads for the connectable undirected
//! advertising used by the peripheral.

use bitflags::bitflags;
use structbuf::StructBuf;

pub use {response_data::*, uuid::*};

use crate::hci;

mod response_data;
mod uuid;

bitflags! {
    /// Advertising data flags ([CSS] Part A, Section 1.3).
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    #[repr(transparent)]
    pub struct AdvFlag: u8 {
        const LE_LIMITED = 1 << 0;
        const LE_GENERAL = 1 << 1;
        const NO_BREDR = 1 << 2;
    }
}

/// Advertising data types ([Assigned Numbers] Section 2.3).
#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    PartialEq,
    num_enum::IntoPrimitive,
    num_enum::TryFromPrimitive,
    strum::Display,
)]
#[non_exhaustive]
#[repr(u8)]
pub enum ResponseDataType {
    Flags = 0x01,
    IncompleteServiceClass16 = 0x02,
    CompleteServiceClass16 = 0x03,
    IncompleteServiceClass32 = 0x04,
    CompleteServiceClass32 = 0x05,
    IncompleteServiceClass128 = 0x06,
    CompleteServiceClass128 = 0x07,
    ShortLocalName = 0x08,
    CompleteLocalName = 0x09,
    TxPower = 0x0A,
    Appearance = 0x19,
    ManufacturerData = 0xFF,
}

/// Returns advertising data containing discoverability flags and as many of
/// the service `uuids` as fit.
#[must_use]
pub fn advertising_data(uuids: &[Uuid]) -> StructBuf {
    let mut ad = ResponseDataMut::new();
    ad.flags(AdvFlag::LE_GENERAL | AdvFlag::NO_BREDR)
        .service_class(uuids);
    ad.get()
}

/// Returns scan response data containing the local device name, shortened
/// if the complete name does not fit.
#[must_use]
pub fn scan_response_data(name: &str) -> StructBuf {
    let mut sr = ResponseDataMut::new();
    if !name.is_empty() {
        sr.local_name(name);
    }
    sr.get()
}

/// Returns iBeacon-style advertising data. `data` is the raw manufacturer
/// specific data, starting with the company identifier.
pub fn ibeacon_data(data: &[u8]) -> hci::Result<StructBuf> {
    let mut ad = ResponseDataMut::new();
    ad.flags(AdvFlag::LE_GENERAL | AdvFlag::NO_BREDR)
        .manufacturer_data(data)?;
    Ok(ad.get())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adv_data() {
        let uuids = ["180D".parse().unwrap(), "180F".parse().unwrap()];
        let ad = advertising_data(&uuids);
        assert_eq!(
            ad.as_ref(),
            &[0x02, 0x01, 0x06, 0x05, 0x03, 0x0D, 0x18, 0x0F, 0x18]
        );
        assert_eq!(advertising_data(&[]).as_ref(), &[0x02, 0x01, 0x06]);
    }

    #[test]
    fn adv_data_incomplete() {
        let u: Uuid = "6E400001-B5A3-F393-E0A9-E50E24DCCA9E".parse().unwrap();
        let v: Uuid = "6E400002-B5A3-F393-E0A9-E50E24DCCA9E".parse().unwrap();
        let ad = advertising_data(&[u, v]);
        assert_eq!(ad.len(), 3 + 18);
        assert_eq!(ad.as_ref()[3..5], [0x11, 0x06]);
        assert_eq!(ad.as_ref()[5..], *u.to_wire());
    }

    #[test]
    fn scan_rsp() {
        assert_eq!(
            scan_response_data("blep").as_ref(),
            &[0x05, 0x09, b'b', b'l', b'e', b'p']
        );
        let long = "0123456789abcdefghijklmnopqrstuvwxyz";
        let sr = scan_response_data(long);
        assert_eq!(sr.len(), hci::MAX_ADV_DATA_LEN);
        assert_eq!(sr.as_ref()[..2], [30, 0x08]);
        assert_eq!(&sr.as_ref()[2..], &long.as_bytes()[..29]);
        assert!(scan_response_data("").as_ref().is_empty());
    }

    #[test]
    fn ibeacon() {
        let data = [0x4C, 0x00, 0x02, 0x15, 0xAA];
        let ad = ibeacon_data(&data).unwrap();
        assert_eq!(
            ad.as_ref(),
            &[0x02, 0x01, 0x06, 0x06, 0xFF, 0x4C, 0x00, 0x02, 0x15, 0xAA]
        );
        assert!(ibeacon_data(&[0; 27]).is_err());
    }
}
