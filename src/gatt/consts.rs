use bitflags::bitflags;

use crate::gap::uuid16_enum;

bitflags! {
    /// Characteristic properties ([Vol 3] Part G, Section 3.3.1.1). The same
    /// bits are used to mark which operations require an encrypted link.
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
    #[repr(transparent)]
    pub struct CharProps: u8 {
        /// Permits broadcasts of the Characteristic Value.
        const BROADCAST = 0x01;
        /// Permits reads of the Characteristic Value.
        const READ = 0x02;
        /// Permit writes of the Characteristic Value without response.
        const WRITE_WITHOUT_RESPONSE = 0x04;
        /// Permits writes of the Characteristic Value with response.
        const WRITE = 0x08;
        /// Permits notifications of a Characteristic Value without
        /// acknowledgment. If set, the Client Characteristic Configuration
        /// Descriptor shall exist.
        const NOTIFY = 0x10;
        /// Permits indications of a Characteristic Value with acknowledgment.
        /// If set, the Client Characteristic Configuration Descriptor shall
        /// exist.
        const INDICATE = 0x20;
        /// Permits signed writes to the Characteristic Value.
        const AUTHENTICATED_SIGNED_WRITES = 0x40;
        /// Additional characteristic properties are defined in the
        /// Characteristic Extended Properties Descriptor.
        const EXTENDED_PROPERTIES = 0x80;
    }
}

impl CharProps {
    /// Properties that require a Client Characteristic Configuration
    /// descriptor.
    pub const CCCD: Self = Self::NOTIFY.union(Self::INDICATE);
}

bitflags! {
    /// Client Characteristic Configuration descriptor value
    /// ([Vol 3] Part G, Section 3.3.3.3).
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    #[repr(transparent)]
    pub struct Cccd: u16 {
        /// The Characteristic Value shall be notified.
        const NOTIFY = 1 << 0;
        /// The Characteristic Value shall be indicated.
        const INDICATE = 1 << 1;
    }
}

/// GATT attribute types ([Assigned Numbers] Section 3.5).
#[derive(Clone, Copy, Debug, Eq, PartialEq, num_enum::TryFromPrimitive)]
#[non_exhaustive]
#[repr(u16)]
pub enum Declaration {
    PrimaryService = 0x2800,
    SecondaryService = 0x2801,
    Include = 0x2802,
    Characteristic = 0x2803,
}

/// GATT characteristic descriptors ([Assigned Numbers] Section 3.7).
#[derive(Clone, Copy, Debug, Eq, PartialEq, num_enum::TryFromPrimitive)]
#[non_exhaustive]
#[repr(u16)]
pub enum Descriptor {
    CharacteristicExtendedProperties = 0x2900,
    CharacteristicUserDescription = 0x2901,
    ClientCharacteristicConfiguration = 0x2902,
    CharacteristicPresentationFormat = 0x2904,
}

/// GATT services used by the built-in attribute table
/// ([Assigned Numbers] Section 3.4).
#[derive(Clone, Copy, Debug, Eq, PartialEq, num_enum::TryFromPrimitive)]
#[non_exhaustive]
#[repr(u16)]
pub enum Service {
    GenericAccess = 0x1800,
    GenericAttribute = 0x1801,
}

/// GATT characteristics used by the built-in attribute table
/// ([Assigned Numbers] Section 3.8).
#[derive(Clone, Copy, Debug, Eq, PartialEq, num_enum::TryFromPrimitive)]
#[non_exhaustive]
#[repr(u16)]
pub enum Characteristic {
    DeviceName = 0x2A00,
    Appearance = 0x2A01,
    ServiceChanged = 0x2A05,
}

uuid16_enum! { Declaration Descriptor Service Characteristic }

#[cfg(test)]
mod tests {
    use crate::gap::Uuid;

    use super::*;

    #[test]
    fn uuids() {
        assert_eq!(Declaration::Characteristic.uuid().as_u16(), Some(0x2803));
        let u: Uuid = "2902".parse().unwrap();
        assert_eq!(u, Descriptor::ClientCharacteristicConfiguration);
        assert_eq!(Uuid::from(Service::GenericAccess).to_bytes()[12..14], [0x00, 0x18]);
        assert_eq!(CharProps::CCCD.bits(), 0x30);
    }
}
