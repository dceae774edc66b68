use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::Value;
use static_assertions::const_assert_eq;
use std::collections::BTreeMap;
use std::fmt;

pub const DEVICE_COUNT: usize = 9;

/// One of the fixed logical device slots monitored by the bridge.
///
/// Declaration order is the subscription order, so `Ord` follows it too.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeviceChannel {
    Washbasin1,
    Washbasin2,
    KitchenSink,
    Shower,
    Inflow,
    Outflow,
    WaterPump,
    UndergroundTank,
    OverheadTank,
}

impl DeviceChannel {
    pub const ALL: [DeviceChannel; DEVICE_COUNT] = [
        DeviceChannel::Washbasin1,
        DeviceChannel::Washbasin2,
        DeviceChannel::KitchenSink,
        DeviceChannel::Shower,
        DeviceChannel::Inflow,
        DeviceChannel::Outflow,
        DeviceChannel::WaterPump,
        DeviceChannel::UndergroundTank,
        DeviceChannel::OverheadTank,
    ];

    pub fn name(self) -> &'static str {
        match self {
            DeviceChannel::Washbasin1 => "washbasin1",
            DeviceChannel::Washbasin2 => "washbasin2",
            DeviceChannel::KitchenSink => "kitchenSink",
            DeviceChannel::Shower => "shower",
            DeviceChannel::Inflow => "inflow",
            DeviceChannel::Outflow => "outflow",
            DeviceChannel::WaterPump => "waterPump",
            DeviceChannel::UndergroundTank => "undergroundTank",
            DeviceChannel::OverheadTank => "overheadTank",
        }
    }

    /// Suffix used for the per-channel entity id environment variable.
    pub fn env_key(self) -> &'static str {
        match self {
            DeviceChannel::Washbasin1 => "WASHBASIN_1",
            DeviceChannel::Washbasin2 => "WASHBASIN_2",
            DeviceChannel::KitchenSink => "KITCHEN_SINK",
            DeviceChannel::Shower => "SHOWER",
            DeviceChannel::Inflow => "INFLOW",
            DeviceChannel::Outflow => "OUTFLOW",
            DeviceChannel::WaterPump => "WATER_PUMP",
            DeviceChannel::UndergroundTank => "UNDERGROUND_TANK",
            DeviceChannel::OverheadTank => "OVERHEAD_TANK",
        }
    }
}

const_assert_eq!(DeviceChannel::ALL.len(), DEVICE_COUNT);

impl fmt::Display for DeviceChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Opaque broker-side identifier of a device. Never blank.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Returns `None` for blank input; a blank id means "not configured".
    pub fn new(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for EntityId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        EntityId::new(raw).ok_or_else(|| de::Error::custom("entity id must not be blank"))
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Latest observed state of one device.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceState {
    pub connected: bool,
    pub data: BTreeMap<String, Value>,
}

impl DeviceState {
    /// Last-write-wins per key; keys missing from `update` are kept.
    pub fn merge(&mut self, update: BTreeMap<String, Value>) {
        self.data.extend(update);
    }
}

/// Channel → entity id mapping plus per-channel observed state.
#[derive(Debug, Clone)]
pub struct DeviceRegistry {
    entity_ids: BTreeMap<DeviceChannel, EntityId>,
    states: BTreeMap<DeviceChannel, DeviceState>,
}

impl DeviceRegistry {
    pub fn new(entity_ids: BTreeMap<DeviceChannel, EntityId>) -> Self {
        let states = DeviceChannel::ALL
            .iter()
            .map(|&channel| (channel, DeviceState::default()))
            .collect();

        Self { entity_ids, states }
    }

    pub fn entity_id(&self, channel: DeviceChannel) -> Option<&EntityId> {
        self.entity_ids.get(&channel)
    }

    /// Channels with a configured entity id, in subscription order.
    pub fn configured(&self) -> impl Iterator<Item = (DeviceChannel, &EntityId)> {
        DeviceChannel::ALL
            .iter()
            .filter_map(move |&channel| self.entity_ids.get(&channel).map(|id| (channel, id)))
    }

    pub fn state(&self, channel: DeviceChannel) -> &DeviceState {
        // Every channel is inserted at construction.
        &self.states[&channel]
    }

    pub fn states(&self) -> &BTreeMap<DeviceChannel, DeviceState> {
        &self.states
    }

    pub(crate) fn state_mut(&mut self, channel: DeviceChannel) -> &mut DeviceState {
        self.states.entry(channel).or_default()
    }

    pub(crate) fn mark_all_disconnected(&mut self) {
        for state in self.states.values_mut() {
            state.connected = false;
        }
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new(BTreeMap::new())
    }
}
