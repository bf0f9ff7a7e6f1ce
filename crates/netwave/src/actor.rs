use std::collections::HashMap;

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::stream::{ByteReader, ByteWriter, WireError};
use crate::world::WorldCommands;

/// Network identity assigned by the authoritative world. 0 means
/// unassigned.
pub type NetId = u32;

/// Wire ids of replicated property kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum PropertyKind {
    Bool = 0,
    I8 = 1,
    U8 = 2,
    I16 = 3,
    U16 = 4,
    I32 = 5,
    U32 = 6,
    I64 = 7,
    U64 = 8,
    F32 = 9,
    F64 = 10,
    Vec3 = 11,
    Quat = 12,
    String = 13,
    Custom = 14,
}

impl PropertyKind {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Bool),
            1 => Some(Self::I8),
            2 => Some(Self::U8),
            3 => Some(Self::I16),
            4 => Some(Self::U16),
            5 => Some(Self::I32),
            6 => Some(Self::U32),
            7 => Some(Self::I64),
            8 => Some(Self::U64),
            9 => Some(Self::F32),
            10 => Some(Self::F64),
            11 => Some(Self::Vec3),
            12 => Some(Self::Quat),
            13 => Some(Self::String),
            14 => Some(Self::Custom),
            _ => None,
        }
    }
}

/// The authoritative value of a replicated property. Owned by the actor's
/// property map, so a property can never outlive its actor.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Bool(bool),
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
    Vec3(Vec3),
    Quat(Quat),
    String(String),
}

impl PropertyValue {
    pub fn kind(&self) -> PropertyKind {
        match self {
            Self::Bool(_) => PropertyKind::Bool,
            Self::I8(_) => PropertyKind::I8,
            Self::U8(_) => PropertyKind::U8,
            Self::I16(_) => PropertyKind::I16,
            Self::U16(_) => PropertyKind::U16,
            Self::I32(_) => PropertyKind::I32,
            Self::U32(_) => PropertyKind::U32,
            Self::I64(_) => PropertyKind::I64,
            Self::U64(_) => PropertyKind::U64,
            Self::F32(_) => PropertyKind::F32,
            Self::F64(_) => PropertyKind::F64,
            Self::Vec3(_) => PropertyKind::Vec3,
            Self::Quat(_) => PropertyKind::Quat,
            Self::String(_) => PropertyKind::String,
        }
    }

    pub fn encode(&self, writer: &mut ByteWriter) {
        match self {
            Self::Bool(v) => writer.write_bool(*v),
            Self::I8(v) => writer.write_i8(*v),
            Self::U8(v) => writer.write_u8(*v),
            Self::I16(v) => writer.write_i16(*v),
            Self::U16(v) => writer.write_u16(*v),
            Self::I32(v) => writer.write_i32(*v),
            Self::U32(v) => writer.write_u32(*v),
            Self::I64(v) => writer.write_i64(*v),
            Self::U64(v) => writer.write_u64(*v),
            Self::F32(v) => writer.write_f32(*v),
            Self::F64(v) => writer.write_f64(*v),
            Self::Vec3(v) => writer.write_vec3(*v),
            Self::Quat(v) => writer.write_quat(*v),
            Self::String(v) => writer.write_str(v),
        }
    }

    pub fn decode(kind: PropertyKind, reader: &mut ByteReader<'_>) -> Result<Self, WireError> {
        Ok(match kind {
            PropertyKind::Bool => Self::Bool(reader.read_bool()?),
            PropertyKind::I8 => Self::I8(reader.read_i8()?),
            PropertyKind::U8 => Self::U8(reader.read_u8()?),
            PropertyKind::I16 => Self::I16(reader.read_i16()?),
            PropertyKind::U16 => Self::U16(reader.read_u16()?),
            PropertyKind::I32 => Self::I32(reader.read_i32()?),
            PropertyKind::U32 => Self::U32(reader.read_u32()?),
            PropertyKind::I64 => Self::I64(reader.read_i64()?),
            PropertyKind::U64 => Self::U64(reader.read_u64()?),
            PropertyKind::F32 => Self::F32(reader.read_f32()?),
            PropertyKind::F64 => Self::F64(reader.read_f64()?),
            PropertyKind::Vec3 => Self::Vec3(reader.read_vec3()?),
            PropertyKind::Quat => Self::Quat(reader.read_quat()?),
            PropertyKind::String => Self::String(reader.read_string()?),
            PropertyKind::Custom => {
                return Err(WireError::UnsupportedProperty(PropertyKind::Custom as u8))
            }
        })
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Self::I32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        match self {
            Self::U32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Self::F32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_vec3(&self) -> Option<Vec3> {
        match self {
            Self::Vec3(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }
}

/// A named replicated value plus the byte image it last went out (or came
/// in) as. `kind` is fixed at registration. An empty cache means "never
/// synchronized", so the first change check always reports changed.
#[derive(Debug, Clone)]
pub struct ReplicatedProperty {
    name: String,
    kind: PropertyKind,
    value: PropertyValue,
    last_value: Vec<u8>,
}

impl ReplicatedProperty {
    pub fn new(name: impl Into<String>, value: PropertyValue) -> Self {
        Self {
            name: name.into(),
            kind: value.kind(),
            value,
            last_value: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> PropertyKind {
        self.kind
    }

    pub fn value(&self) -> &PropertyValue {
        &self.value
    }

    /// Replaces the value. Kind changes are rejected: the wire contract for
    /// this property was fixed at registration.
    pub fn set_value(&mut self, value: PropertyValue) {
        if value.kind() != self.kind {
            log::warn!(
                "property `{}` keeps kind {:?}; ignoring {:?} value",
                self.name,
                self.kind,
                value.kind()
            );
            return;
        }
        self.value = value;
    }

    pub fn current_bytes(&self) -> Vec<u8> {
        let mut writer = ByteWriter::new();
        self.value.encode(&mut writer);
        writer.into_bytes()
    }

    /// Serialize-and-compare against the last transmitted image. Covers
    /// variable-width kinds with the same code path as fixed-width ones.
    pub fn has_changed(&self) -> bool {
        if self.last_value.is_empty() {
            return true;
        }
        self.current_bytes() != self.last_value
    }

    pub fn update_last_value(&mut self) {
        self.last_value = self.current_bytes();
    }

    /// Writes `name`, `kind`, `value`, in the order the receive side reads.
    pub fn encode_entry(&self, writer: &mut ByteWriter) {
        writer.write_str(&self.name);
        writer.write_u8(self.kind as u8);
        self.value.encode(writer);
    }

    /// Applies an inbound value and refreshes the cache so the receiver's
    /// own change detection stays quiet.
    pub fn apply_decoded(&mut self, value: PropertyValue) {
        self.value = value;
        self.update_last_value();
    }
}

/// Identity, transform, and replication state shared by every actor.
#[derive(Debug)]
pub struct ActorCore {
    net_id: NetId,
    replicates: bool,
    position: Vec3,
    rotation: Quat,
    scale: Vec3,
    properties: HashMap<String, ReplicatedProperty>,
}

impl Default for ActorCore {
    fn default() -> Self {
        Self::new()
    }
}

impl ActorCore {
    pub fn new() -> Self {
        Self {
            net_id: 0,
            replicates: false,
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
            properties: HashMap::new(),
        }
    }

    pub fn net_id(&self) -> NetId {
        self.net_id
    }

    pub(crate) fn set_net_id(&mut self, net_id: NetId) {
        self.net_id = net_id;
    }

    pub fn replicates(&self) -> bool {
        self.replicates
    }

    pub fn set_replicates(&mut self, replicates: bool) {
        self.replicates = replicates;
    }

    pub fn is_networked(&self) -> bool {
        self.replicates && self.net_id != 0
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
    }

    pub fn rotation(&self) -> Quat {
        self.rotation
    }

    pub fn set_rotation(&mut self, rotation: Quat) {
        self.rotation = rotation;
    }

    pub fn scale(&self) -> Vec3 {
        self.scale
    }

    pub fn set_scale(&mut self, scale: Vec3) {
        self.scale = scale;
    }

    /// Registers a replicated property. Meant to be called while
    /// constructing the actor; re-registering a name replaces the binding.
    pub fn register_property(&mut self, name: &str, initial: PropertyValue) {
        self.properties
            .insert(name.to_string(), ReplicatedProperty::new(name, initial));
    }

    pub fn property(&self, name: &str) -> Option<&ReplicatedProperty> {
        self.properties.get(name)
    }

    pub fn property_mut(&mut self, name: &str) -> Option<&mut ReplicatedProperty> {
        self.properties.get_mut(name)
    }

    /// Convenience setter; ignores unregistered names with a log.
    pub fn set_property(&mut self, name: &str, value: PropertyValue) {
        match self.properties.get_mut(name) {
            Some(prop) => prop.set_value(value),
            None => log::warn!("set_property on unregistered property `{}`", name),
        }
    }

    pub fn properties(&self) -> impl Iterator<Item = &ReplicatedProperty> {
        self.properties.values()
    }

    pub fn property_count(&self) -> usize {
        self.properties.len()
    }
}

/// A replicable game object. Implementors embed an [`ActorCore`] and
/// register their properties during construction.
pub trait Actor {
    fn core(&self) -> &ActorCore;
    fn core_mut(&mut self) -> &mut ActorCore;

    /// Stable name used to spawn this type on receivers.
    fn type_name(&self) -> &'static str;

    /// Called after the world has assigned a NetId and taken ownership.
    fn on_spawn(&mut self) {}

    /// Called during the end-of-tick destroy pass, before removal.
    fn on_destroy(&mut self) {}

    /// Called once per inbound `ActorReplication` packet, after all
    /// carried properties have been applied.
    fn on_replicated(&mut self) {}

    /// Per-frame hook. Structural changes (spawn/destroy) go through the
    /// command buffer and are applied after the hook pass.
    fn tick(&mut self, _dt: f32, _commands: &mut WorldCommands) {}
}
