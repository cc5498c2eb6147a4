use foundation::ids::DeviceId;
use foundation::position::LngLat;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    #[default]
    Active,
    Inactive,
}

impl DeviceStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" | "online" => Some(DeviceStatus::Active),
            "inactive" | "offline" => Some(DeviceStatus::Inactive),
            _ => None,
        }
    }
}

/// Feature-capability tag: which layer family a device participates in.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureTag(String);

impl FeatureTag {
    pub const LOCATION: &'static str = "location";
    pub const WATER_DEPTH: &'static str = "water-depth";

    pub fn new(tag: impl Into<String>) -> Self {
        FeatureTag(tag.into())
    }

    pub fn location() -> Self {
        FeatureTag::new(Self::LOCATION)
    }

    pub fn water_depth() -> Self {
        FeatureTag::new(Self::WATER_DEPTH)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for FeatureTag {
    fn default() -> Self {
        FeatureTag::location()
    }
}

impl std::fmt::Display for FeatureTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Current state of one device.
///
/// `position` is serialized as a `[lng, lat]` pair; anything else (wrong
/// arity, out-of-range, non-numeric) deserializes to `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: DeviceId,
    /// Model tag; selects the 3D model and axis mapping.
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub status: DeviceStatus,
    #[serde(default, rename = "location", with = "position_pair")]
    pub position: Option<LngLat>,
    /// Degrees clockwise from north.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading: Option<f64>,
    #[serde(default)]
    pub feature: FeatureTag,
    #[serde(default)]
    pub properties: Map<String, Value>,
    /// Previous positions, oldest first.
    #[serde(default, skip_serializing_if = "Vec::is_empty", with = "history_pairs")]
    pub history: Vec<LngLat>,
}

impl Device {
    /// A fresh record with the documented defaults.
    pub fn new(id: DeviceId, feature: FeatureTag) -> Self {
        Self {
            id,
            kind: String::new(),
            status: DeviceStatus::Active,
            position: None,
            heading: None,
            feature,
            properties: Map::new(),
            history: Vec::new(),
        }
    }

    pub fn with_position(mut self, position: LngLat) -> Self {
        self.position = Some(position);
        self
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }

    /// Position, if present and valid.
    pub fn valid_position(&self) -> Option<LngLat> {
        self.position.filter(LngLat::is_valid)
    }
}

/// Partial update produced by a topic handler.
///
/// `None` fields leave the stored value alone; `properties` keys overwrite
/// the matching stored keys and leave the rest.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DevicePatch {
    pub kind: Option<String>,
    pub status: Option<DeviceStatus>,
    pub position: Option<LngLat>,
    pub heading: Option<f64>,
    pub feature: Option<FeatureTag>,
    pub properties: Map<String, Value>,
}

impl DevicePatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn position(mut self, position: LngLat) -> Self {
        self.position = Some(position);
        self
    }

    pub fn heading(mut self, heading: f64) -> Self {
        self.heading = Some(heading);
        self
    }

    pub fn status(mut self, status: DeviceStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    pub fn feature(mut self, feature: FeatureTag) -> Self {
        self.feature = Some(feature);
        self
    }

    pub fn property(mut self, key: impl Into<String>, value: Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.kind.is_none()
            && self.status.is_none()
            && self.position.is_none()
            && self.heading.is_none()
            && self.feature.is_none()
            && self.properties.is_empty()
    }
}

mod position_pair {
    use foundation::position::LngLat;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use serde_json::Value;

    pub fn serialize<S: Serializer>(v: &Option<LngLat>, s: S) -> Result<S::Ok, S::Error> {
        v.map(LngLat::to_array).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<LngLat>, D::Error> {
        let raw = Value::deserialize(d)?;
        Ok(super::lnglat_from_value(&raw))
    }
}

mod history_pairs {
    use foundation::position::LngLat;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use serde_json::Value;

    pub fn serialize<S: Serializer>(v: &[LngLat], s: S) -> Result<S::Ok, S::Error> {
        let pairs: Vec<[f64; 2]> = v.iter().map(|p| p.to_array()).collect();
        pairs.serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<LngLat>, D::Error> {
        let raw = Vec::<Value>::deserialize(d)?;
        Ok(raw.iter().filter_map(super::lnglat_from_value).collect())
    }
}

/// Reads a `[lng, lat]` JSON array into a valid position.
pub fn lnglat_from_value(v: &Value) -> Option<LngLat> {
    let arr = v.as_array()?;
    let coords: Option<Vec<f64>> = arr.iter().map(Value::as_f64).collect();
    LngLat::from_slice(&coords?)
}

#[cfg(test)]
mod tests {
    use super::{Device, DeviceStatus, FeatureTag};
    use foundation::position::LngLat;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn deserializes_device_list_entry() {
        let d: Device = serde_json::from_value(json!({
            "id": "pump-1",
            "kind": "boat",
            "status": "inactive",
            "location": [4.9, 52.37],
            "feature": "water-depth",
            "properties": { "depth": 3.5 }
        }))
        .unwrap();
        assert_eq!(d.position, Some(LngLat::new(4.9, 52.37)));
        assert_eq!(d.status, DeviceStatus::Inactive);
        assert_eq!(d.feature, FeatureTag::water_depth());
        assert!(d.history.is_empty());
    }

    #[test]
    fn malformed_location_is_dropped_not_rejected() {
        for loc in [json!([1.0]), json!([1.0, 2.0, 3.0]), json!("x"), json!(null)] {
            let d: Device = serde_json::from_value(json!({ "id": "a", "location": loc })).unwrap();
            assert_eq!(d.position, None);
            assert_eq!(d.feature, FeatureTag::location());
        }
    }

    #[test]
    fn status_parse_accepts_aliases() {
        assert_eq!(DeviceStatus::parse("Online"), Some(DeviceStatus::Active));
        assert_eq!(DeviceStatus::parse("inactive"), Some(DeviceStatus::Inactive));
        assert_eq!(DeviceStatus::parse("broken"), None);
    }
}
