use std::sync::Arc;

use tracing::debug;

pub use builder::*;

use super::*;

mod builder;

/// Attribute table entry ([Vol 3] Part G, Section 3). Handles are implied by
/// the entry position.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum Attr {
    /// Primary service declaration.
    Service { uuid: Uuid, end: Handle },
    /// Include declaration referencing a service defined earlier.
    Include {
        uuid: Uuid,
        start: Handle,
        end: Handle,
    },
    /// Characteristic declaration. The value attribute always follows it.
    Characteristic {
        uuid: Uuid,
        props: CharProps,
        secure: CharProps,
        value_hdl: Handle,
        cap: Option<Arc<dyn Capability>>,
    },
    /// Characteristic value. Everything except the static value is taken from
    /// the preceding declaration.
    Value { value: Option<Vec<u8>> },
    /// Characteristic descriptor owned by the characteristic declared at
    /// `owner`.
    Descriptor {
        uuid: Uuid,
        props: CharProps,
        secure: CharProps,
        value: Option<Vec<u8>>,
        owner: Handle,
    },
}

impl Attr {
    /// Returns the attribute type ([Vol 3] Part F, Section 3.2.1). Values
    /// report the characteristic UUID.
    #[must_use]
    fn typ(&self, owner: Option<&Self>) -> Option<Uuid> {
        match *self {
            Self::Service { .. } => Some(Declaration::PrimaryService.uuid()),
            Self::Include { .. } => Some(Declaration::Include.uuid()),
            Self::Characteristic { .. } => Some(Declaration::Characteristic.uuid()),
            Self::Value { .. } => match owner {
                Some(&Self::Characteristic { uuid, .. }) => Some(uuid),
                _ => None,
            },
            Self::Descriptor { uuid, .. } => Some(uuid),
        }
    }

    /// Returns whether the attribute is a Client Characteristic Configuration
    /// descriptor.
    #[inline]
    #[must_use]
    pub fn is_cccd(&self) -> bool {
        matches!(*self, Self::Descriptor { uuid, .. }
            if uuid == Descriptor::ClientCharacteristicConfiguration)
    }
}

/// Flattened GATT database. Built once per service set and never resized.
#[derive(Clone, Debug, Default)]
pub struct AttributeTable {
    attr: Vec<Attr>,
}

impl AttributeTable {
    /// Returns the number of attributes.
    #[inline(always)]
    #[must_use]
    pub fn len(&self) -> usize {
        self.attr.len()
    }

    /// Returns whether the table is empty.
    #[inline(always)]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attr.is_empty()
    }

    /// Returns the attribute for a raw handle.
    #[inline]
    #[must_use]
    pub fn get(&self, hdl: u16) -> Option<&Attr> {
        Handle::new(hdl).and_then(|h| self.attr.get(h.index()))
    }

    /// Returns a mutable attribute reference.
    #[inline]
    pub(super) fn get_mut(&mut self, hdl: Handle) -> Option<&mut Attr> {
        self.attr.get_mut(hdl.index())
    }

    /// Returns all attributes within the range in handle order.
    pub fn range(&self, r: HandleRange) -> impl Iterator<Item = (Handle, &Attr)> {
        let idx = r.indices(self.attr.len());
        let start = *idx.start();
        (self.attr.get(idx).unwrap_or_default().iter().enumerate())
            .filter_map(move |(i, at)| Some((Handle::from_index(start + i)?, at)))
    }

    /// Returns all attributes in handle order.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (Handle, &Attr)> {
        self.range(HandleRange::ALL)
    }

    /// Returns the attribute type of `hdl`.
    #[must_use]
    pub fn typ(&self, hdl: Handle) -> Option<Uuid> {
        let at = self.attr.get(hdl.index())?;
        let owner = hdl.prev().and_then(|h| self.attr.get(h.index()));
        at.typ(owner)
    }

    /// Returns the characteristic declaration attribute at `hdl`.
    #[must_use]
    pub fn characteristic(&self, hdl: Handle) -> Option<Char<'_>> {
        match *self.attr.get(hdl.index())? {
            Attr::Characteristic {
                uuid,
                props,
                secure,
                value_hdl,
                ref cap,
            } => Some(Char {
                hdl,
                uuid,
                props,
                secure,
                value_hdl,
                cap: cap.as_ref(),
            }),
            _ => None,
        }
    }

    /// Returns the characteristic that owns the value at `hdl`.
    #[inline]
    #[must_use]
    pub fn value_owner(&self, hdl: Handle) -> Option<Char<'_>> {
        match self.attr.get(hdl.index())? {
            Attr::Value { .. } => self.characteristic(hdl.prev()?),
            _ => None,
        }
    }

    /// Returns the Client Characteristic Configuration descriptor handle of the
    /// characteristic with value handle `hdl`.
    #[must_use]
    pub fn cccd(&self, value_hdl: Handle) -> Option<Handle> {
        let hdl = value_hdl.next()?;
        self.attr
            .get(hdl.index())
            .filter(|at| at.is_cccd())
            .map(|_| hdl)
    }

    /// Returns the current Client Characteristic Configuration value of the
    /// characteristic with value handle `hdl`.
    #[must_use]
    pub fn subscription(&self, value_hdl: Handle) -> Cccd {
        let v = self.cccd(value_hdl).and_then(|h| match self.attr.get(h.index()) {
            Some(Attr::Descriptor {
                value: Some(v), ..
            }) if v.len() == 2 => Some(u16::from_le_bytes([v[0], v[1]])),
            _ => None,
        });
        Cccd::from_bits_truncate(v.unwrap_or_default())
    }

    /// Resets all non-zero Client Characteristic Configuration descriptors and
    /// returns the handles of their characteristic declarations.
    pub(super) fn reset_cccds(&mut self) -> Vec<Handle> {
        let mut owners = Vec::new();
        for at in &mut self.attr {
            if !at.is_cccd() {
                continue;
            }
            if let Attr::Descriptor {
                value: Some(ref mut v),
                owner,
                ..
            } = *at
            {
                if v.iter().any(|&b| b != 0) {
                    *v = vec![0; 2];
                    owners.push(owner);
                }
            }
        }
        owners
    }

    /// Logs the table contents.
    pub fn dump(&self) {
        if !tracing::enabled!(tracing::Level::DEBUG) {
            return;
        }
        for (hdl, at) in self.iter() {
            match *at {
                Attr::Service { uuid, end } => {
                    debug!("[{:#06X}] Service {uuid} (end={:#06X})", u16::from(hdl), u16::from(end));
                }
                Attr::Include { uuid, start, end } => debug!(
                    "[{:#06X}] Include {uuid} ({:#06X}..={:#06X})",
                    u16::from(hdl),
                    u16::from(start),
                    u16::from(end)
                ),
                Attr::Characteristic {
                    uuid,
                    props,
                    secure,
                    value_hdl,
                    ..
                } => debug!(
                    "[{:#06X}] Characteristic {uuid} props={props:?} secure={secure:?} value={:#06X}",
                    u16::from(hdl),
                    u16::from(value_hdl)
                ),
                Attr::Value { ref value } => {
                    debug!("[{:#06X}] Value {value:02X?}", u16::from(hdl));
                }
                Attr::Descriptor {
                    uuid,
                    props,
                    ref value,
                    ..
                } => debug!(
                    "[{:#06X}] Descriptor {uuid} props={props:?} {value:02X?}",
                    u16::from(hdl)
                ),
            }
        }
    }
}

/// Borrowed view of a characteristic declaration.
#[derive(Clone, Copy, Debug)]
pub struct Char<'a> {
    pub hdl: Handle,
    pub uuid: Uuid,
    pub props: CharProps,
    pub secure: CharProps,
    pub value_hdl: Handle,
    pub cap: Option<&'a Arc<dyn Capability>>,
}
