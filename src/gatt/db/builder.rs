use std::sync::Arc;

use super::*;

/// Error returned when a service set cannot be turned into an attribute
/// table.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum BuildError {
    #[error("characteristic {0} has a static value but is not read-only")]
    StaticValueNotReadOnly(Uuid),
    #[error("included service {0} is not defined before the including service")]
    UnknownInclude(Uuid),
    #[error("attribute table exceeds the handle space")]
    TooManyAttributes,
}

/// Attribute table build result.
pub type BuildResult<T> = std::result::Result<T, BuildError>;

/// Primary service definition.
#[derive(Clone, Debug)]
pub struct ServiceDef {
    pub uuid: Uuid,
    pub includes: Vec<Uuid>,
    pub characteristics: Vec<CharacteristicDef>,
}

impl ServiceDef {
    /// Creates an empty service definition.
    #[inline]
    #[must_use]
    pub const fn new(uuid: Uuid) -> Self {
        Self {
            uuid,
            includes: Vec::new(),
            characteristics: Vec::new(),
        }
    }

    /// Adds an include declaration for a service defined earlier in the same
    /// set.
    #[inline]
    #[must_use]
    pub fn include(mut self, uuid: Uuid) -> Self {
        self.includes.push(uuid);
        self
    }

    /// Adds a characteristic.
    #[inline]
    #[must_use]
    pub fn characteristic(mut self, c: CharacteristicDef) -> Self {
        self.characteristics.push(c);
        self
    }
}

/// Characteristic definition. Characteristics with a static value are served
/// without involving the capability.
#[derive(Clone, Debug)]
pub struct CharacteristicDef {
    pub uuid: Uuid,
    pub props: CharProps,
    /// Operations that require an encrypted link. Bits that are not also set
    /// in `props` are ignored.
    pub secure: CharProps,
    pub value: Option<Vec<u8>>,
    pub descriptors: Vec<DescriptorDef>,
    pub capability: Option<Arc<dyn Capability>>,
}

impl CharacteristicDef {
    /// Creates a characteristic definition with the specified properties.
    #[inline]
    #[must_use]
    pub const fn new(uuid: Uuid, props: CharProps) -> Self {
        Self {
            uuid,
            props,
            secure: CharProps::empty(),
            value: None,
            descriptors: Vec::new(),
            capability: None,
        }
    }

    /// Requires an encrypted link for the specified operations.
    #[inline]
    #[must_use]
    pub const fn secure(mut self, secure: CharProps) -> Self {
        self.secure = secure;
        self
    }

    /// Sets a static value.
    #[inline]
    #[must_use]
    pub fn value(mut self, v: impl Into<Vec<u8>>) -> Self {
        self.value = Some(v.into());
        self
    }

    /// Adds a read-only descriptor.
    #[inline]
    #[must_use]
    pub fn descriptor(mut self, d: DescriptorDef) -> Self {
        self.descriptors.push(d);
        self
    }

    /// Sets the capability that handles reads, writes, and subscriptions.
    #[inline]
    #[must_use]
    pub fn capability(mut self, c: Arc<dyn Capability>) -> Self {
        self.capability = Some(c);
        self
    }
}

/// Read-only descriptor with a static value.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DescriptorDef {
    pub uuid: Uuid,
    pub value: Vec<u8>,
}

impl DescriptorDef {
    /// Creates a descriptor definition.
    #[inline]
    #[must_use]
    pub fn new(uuid: Uuid, value: impl Into<Vec<u8>>) -> Self {
        Self {
            uuid,
            value: value.into(),
        }
    }
}

impl AttributeTable {
    /// Builds an attribute table from application services. The Generic
    /// Access service (device name and appearance) and the Generic Attribute
    /// service are always prepended, so application handles start after
    /// them.
    pub fn build(
        device_name: &str,
        appearance: u16,
        services: &[ServiceDef],
    ) -> BuildResult<Self> {
        for c in services.iter().flat_map(|s| &s.characteristics) {
            if c.value.is_some() && c.props != CharProps::READ {
                return Err(BuildError::StaticValueNotReadOnly(c.uuid));
            }
        }
        let base = [
            ServiceDef::new(Service::GenericAccess.uuid())
                .characteristic(
                    CharacteristicDef::new(Characteristic::DeviceName.uuid(), CharProps::READ)
                        .value(device_name.as_bytes()),
                )
                .characteristic(
                    CharacteristicDef::new(Characteristic::Appearance.uuid(), CharProps::READ)
                        .value(appearance.to_le_bytes()),
                ),
            ServiceDef::new(Service::GenericAttribute.uuid()).characteristic(
                CharacteristicDef::new(Characteristic::ServiceChanged.uuid(), CharProps::INDICATE)
                    .value([0; 4]),
            ),
        ];
        let mut b = TableBuilder::default();
        for s in base.iter().chain(services) {
            b.service(s)?;
        }
        Ok(Self { attr: b.attr })
    }
}

/// Single-pass handle allocator.
#[derive(Debug, Default)]
struct TableBuilder {
    attr: Vec<Attr>,
    /// Handle ranges of completed services.
    groups: Vec<(Uuid, Handle, Handle)>,
}

impl TableBuilder {
    /// Appends a service and all of its attributes.
    fn service(&mut self, s: &ServiceDef) -> BuildResult<()> {
        let start = self.push(Attr::Service {
            uuid: s.uuid,
            end: Handle::MIN,
        })?;
        for &inc in &s.includes {
            let Some(&(uuid, start, end)) = self.groups.iter().find(|g| g.0 == inc) else {
                return Err(BuildError::UnknownInclude(inc));
            };
            self.push(Attr::Include { uuid, start, end })?;
        }
        for c in &s.characteristics {
            self.characteristic(c)?;
        }
        let end = self.last();
        if let Some(Attr::Service { end: e, .. }) = self.attr.get_mut(start.index()) {
            *e = end;
        }
        self.groups.push((s.uuid, start, end));
        Ok(())
    }

    /// Appends a characteristic declaration, its value, the Client
    /// Characteristic Configuration descriptor when notifications or
    /// indications are supported, and all explicit descriptors.
    fn characteristic(&mut self, c: &CharacteristicDef) -> BuildResult<()> {
        let props = c.props;
        let secure = c.secure & props;
        let decl = self.next()?;
        self.push(Attr::Characteristic {
            uuid: c.uuid,
            props,
            secure,
            value_hdl: decl.next().ok_or(BuildError::TooManyAttributes)?,
            cap: c.capability.clone(),
        })?;
        self.push(Attr::Value {
            value: c.value.clone(),
        })?;
        if props.intersects(CharProps::CCCD) {
            let rw = CharProps::READ | CharProps::WRITE_WITHOUT_RESPONSE | CharProps::WRITE;
            self.push(Attr::Descriptor {
                uuid: Descriptor::ClientCharacteristicConfiguration.uuid(),
                props: rw,
                secure: if secure.contains(CharProps::NOTIFY) {
                    rw
                } else {
                    CharProps::empty()
                },
                value: Some(vec![0; 2]),
                owner: decl,
            })?;
        }
        for d in &c.descriptors {
            self.push(Attr::Descriptor {
                uuid: d.uuid,
                props: CharProps::READ,
                secure: CharProps::empty(),
                value: Some(d.value.clone()),
                owner: decl,
            })?;
        }
        Ok(())
    }

    /// Appends an attribute and returns its handle.
    fn push(&mut self, at: Attr) -> BuildResult<Handle> {
        let hdl = self.next()?;
        self.attr.push(at);
        Ok(hdl)
    }

    /// Returns the handle of the next attribute.
    fn next(&self) -> BuildResult<Handle> {
        Handle::from_index(self.attr.len()).ok_or(BuildError::TooManyAttributes)
    }

    /// Returns the handle of the last attribute.
    fn last(&self) -> Handle {
        Handle::from_index(self.attr.len().saturating_sub(1)).unwrap_or(Handle::MIN)
    }
}
