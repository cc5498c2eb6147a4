//! Built-in topic handlers.

use foundation::position::LngLat;
use serde_json::{Map, Value};

use crate::device::{DevicePatch, DeviceStatus, FeatureTag, lnglat_from_value};
use crate::router::TopicHandler;
use crate::topic::{TopicError, TopicMatch, TopicPattern};

pub const DEFAULT_LOCATION_TOPIC: &str = "+/devices/+/location";
pub const DEFAULT_STATUS_TOPIC: &str = "+/devices/+/status";
pub const DEFAULT_TELEMETRY_TOPIC: &str = "+/devices/+/telemetry";
pub const DEFAULT_ENTITY_STATE_TOPIC: &str = "+/entities/+/+/state";

/// Entity type whose nested `{ data: { field: { value } } }` payload is
/// flattened into top-level properties.
pub const WATER_DEPTH_ENTITY: &str = "water_depth";

pub fn default_handlers() -> Vec<Box<dyn TopicHandler>> {
    let mut out: Vec<Box<dyn TopicHandler>> = Vec::new();
    if let Ok(h) = LocationHandler::new(DEFAULT_LOCATION_TOPIC) {
        out.push(Box::new(h));
    }
    if let Ok(h) = StatusHandler::new(DEFAULT_STATUS_TOPIC) {
        out.push(Box::new(h));
    }
    if let Ok(h) = TelemetryHandler::new(DEFAULT_TELEMETRY_TOPIC) {
        out.push(Box::new(h));
    }
    if let Ok(h) = EntityStateHandler::new(DEFAULT_ENTITY_STATE_TOPIC) {
        out.push(Box::new(h));
    }
    out
}

fn id_segment_for(pattern: &TopicPattern) -> usize {
    pattern
        .last_wildcard()
        .unwrap_or(pattern.segment_count().saturating_sub(1))
}

/// Position fixes: `{lng, lat}`, `{longitude, latitude}` or `{location: [lng, lat]}`,
/// with an optional `heading` (or `yaw`) in degrees.
#[derive(Debug, Clone)]
pub struct LocationHandler {
    pattern: TopicPattern,
    id_segment: usize,
}

impl LocationHandler {
    pub fn new(pattern: &str) -> Result<Self, TopicError> {
        let pattern = TopicPattern::parse(pattern)?;
        let id_segment = id_segment_for(&pattern);
        Ok(Self {
            pattern,
            id_segment,
        })
    }
}

impl TopicHandler for LocationHandler {
    fn name(&self) -> &'static str {
        "location"
    }

    fn pattern(&self) -> &TopicPattern {
        &self.pattern
    }

    fn id_segment(&self) -> usize {
        self.id_segment
    }

    fn handle(&self, _topic: &TopicMatch<'_>, payload: &Value) -> Option<DevicePatch> {
        let obj = payload.as_object()?;
        let mut patch = DevicePatch::new();
        if let Some(position) = position_from_object(obj) {
            patch = patch.position(position);
        }
        if let Some(heading) = obj
            .get("heading")
            .or_else(|| obj.get("yaw"))
            .and_then(Value::as_f64)
            .filter(|h| h.is_finite())
        {
            patch = patch.heading(heading);
        }
        (!patch.is_empty()).then_some(patch)
    }
}

/// `{status: "active"|"inactive"}` or `{online: bool}`.
#[derive(Debug, Clone)]
pub struct StatusHandler {
    pattern: TopicPattern,
    id_segment: usize,
}

impl StatusHandler {
    pub fn new(pattern: &str) -> Result<Self, TopicError> {
        let pattern = TopicPattern::parse(pattern)?;
        let id_segment = id_segment_for(&pattern);
        Ok(Self {
            pattern,
            id_segment,
        })
    }
}

impl TopicHandler for StatusHandler {
    fn name(&self) -> &'static str {
        "status"
    }

    fn pattern(&self) -> &TopicPattern {
        &self.pattern
    }

    fn id_segment(&self) -> usize {
        self.id_segment
    }

    fn handle(&self, _topic: &TopicMatch<'_>, payload: &Value) -> Option<DevicePatch> {
        let obj = payload.as_object()?;
        let status = match (obj.get("status"), obj.get("online")) {
            (Some(Value::String(s)), _) => DeviceStatus::parse(s)?,
            (_, Some(Value::Bool(true))) => DeviceStatus::Active,
            (_, Some(Value::Bool(false))) => DeviceStatus::Inactive,
            _ => return None,
        };
        Some(DevicePatch::new().status(status))
    }
}

/// Arbitrary telemetry values; every top-level key becomes a property.
#[derive(Debug, Clone)]
pub struct TelemetryHandler {
    pattern: TopicPattern,
    id_segment: usize,
}

impl TelemetryHandler {
    pub fn new(pattern: &str) -> Result<Self, TopicError> {
        let pattern = TopicPattern::parse(pattern)?;
        let id_segment = id_segment_for(&pattern);
        Ok(Self {
            pattern,
            id_segment,
        })
    }
}

impl TopicHandler for TelemetryHandler {
    fn name(&self) -> &'static str {
        "telemetry"
    }

    fn pattern(&self) -> &TopicPattern {
        &self.pattern
    }

    fn id_segment(&self) -> usize {
        self.id_segment
    }

    fn handle(&self, _topic: &TopicMatch<'_>, payload: &Value) -> Option<DevicePatch> {
        let obj = payload.as_object().filter(|o| !o.is_empty())?;
        Some(DevicePatch {
            properties: obj.clone(),
            ..DevicePatch::default()
        })
    }
}

/// Typed entity state: `<tenant>/entities/<type>/<id>/state`.
///
/// The entity type (the segment before the id) selects a payload
/// normalizer and becomes the device kind.
#[derive(Debug, Clone)]
pub struct EntityStateHandler {
    pattern: TopicPattern,
    id_segment: usize,
}

impl EntityStateHandler {
    pub fn new(pattern: &str) -> Result<Self, TopicError> {
        let pattern = TopicPattern::parse(pattern)?;
        let id_segment = id_segment_for(&pattern);
        Ok(Self {
            pattern,
            id_segment,
        })
    }
}

impl TopicHandler for EntityStateHandler {
    fn name(&self) -> &'static str {
        "entity-state"
    }

    fn pattern(&self) -> &TopicPattern {
        &self.pattern
    }

    fn id_segment(&self) -> usize {
        self.id_segment
    }

    fn handle(&self, topic: &TopicMatch<'_>, payload: &Value) -> Option<DevicePatch> {
        let obj = payload.as_object()?;
        let entity_type = self
            .id_segment
            .checked_sub(1)
            .and_then(|idx| topic.segment(idx));

        let mut patch = match entity_type {
            Some(WATER_DEPTH_ENTITY) => normalize_water_depth(obj),
            _ => normalize_generic(obj),
        };
        if let Some(position) = position_from_object(obj) {
            patch.position = Some(position);
        }
        if let Some(t) = entity_type {
            patch.kind = Some(t.to_string());
        }
        (!patch.is_empty()).then_some(patch)
    }
}

fn normalize_water_depth(obj: &Map<String, Value>) -> DevicePatch {
    let mut patch = DevicePatch::new().feature(FeatureTag::water_depth());
    let Some(data) = obj.get("data").and_then(Value::as_object) else {
        return patch;
    };
    for (field, v) in data {
        let flat = v
            .as_object()
            .and_then(|o| o.get("value"))
            .cloned()
            .unwrap_or_else(|| v.clone());
        patch.properties.insert(field.clone(), flat);
    }
    patch
}

fn normalize_generic(obj: &Map<String, Value>) -> DevicePatch {
    let mut patch = DevicePatch::new();
    match obj.get("properties").and_then(Value::as_object) {
        Some(props) => patch.properties = props.clone(),
        None => {
            for (k, v) in obj {
                if k != "location" {
                    patch.properties.insert(k.clone(), v.clone());
                }
            }
        }
    }
    if let Some(status) = obj
        .get("status")
        .and_then(Value::as_str)
        .and_then(DeviceStatus::parse)
    {
        patch.status = Some(status);
    }
    patch
}

fn position_from_object(obj: &Map<String, Value>) -> Option<LngLat> {
    if let Some(p) = obj.get("location").and_then(lnglat_from_value) {
        return Some(p);
    }
    let pair = |x: &str, y: &str| {
        let lng = obj.get(x).and_then(Value::as_f64)?;
        let lat = obj.get(y).and_then(Value::as_f64)?;
        LngLat::from_slice(&[lng, lat])
    };
    pair("lng", "lat").or_else(|| pair("longitude", "latitude"))
}
