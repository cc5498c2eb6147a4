use std::str::FromStr;

use cluster::ClusterOptions;
use layers::{DEFAULT_FADE_OUT_MS, DEFAULT_SPIN_DEG_PER_S, LifecycleConfig, ModelType};
use serde::{Deserialize, Serialize};
use telemetry::{DEFAULT_HISTORY_LIMIT, FeatureTag};
use tracing::warn;

/// Fallback delay before the cluster sources are installed when the host
/// never reports `style.load`.
pub const SOURCE_INIT_FALLBACK_DELAY_MS: u64 = 500;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Feature family this map clusters and renders.
    pub feature: FeatureTag,
    pub cluster: ClusterOptions,
    pub fade_out_ms: u64,
    pub source_init_delay_ms: u64,
    pub history_limit: usize,
    pub spin_deg_per_s: f64,
    pub model_type: ModelType,
    pub clusters_visible: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            feature: FeatureTag::location(),
            cluster: ClusterOptions::default(),
            fade_out_ms: DEFAULT_FADE_OUT_MS,
            source_init_delay_ms: SOURCE_INIT_FALLBACK_DELAY_MS,
            history_limit: DEFAULT_HISTORY_LIMIT,
            spin_deg_per_s: DEFAULT_SPIN_DEG_PER_S,
            model_type: ModelType::TwoD,
            clusters_visible: false,
        }
    }
}

impl EngineConfig {
    /// Defaults overlaid with `FLEET_*` environment variables.
    pub fn from_env() -> Self {
        Self::default().overlay(|key| std::env::var(key).ok())
    }

    /// Applies overrides from `lookup`. Unparseable values are logged and
    /// ignored.
    pub fn overlay(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(tag) = lookup("FLEET_FEATURE").filter(|v| !v.trim().is_empty()) {
            self.feature = FeatureTag::new(tag.trim());
        }
        env_parse(&lookup, "FLEET_MIN_ZOOM", &mut self.cluster.min_zoom);
        env_parse(&lookup, "FLEET_MAX_ZOOM", &mut self.cluster.max_zoom);
        env_parse(&lookup, "FLEET_RADIUS", &mut self.cluster.radius);
        env_parse(&lookup, "FLEET_EXTENT", &mut self.cluster.extent);
        env_parse(&lookup, "FLEET_MIN_POINTS", &mut self.cluster.min_points);
        if let Some(raw) = lookup("FLEET_SINGLETON_MAX_ZOOM") {
            match raw.trim().parse::<u8>() {
                Ok(z) => self.cluster.singleton_max_zoom = Some(z),
                Err(_) => warn!(value = %raw, "ignoring invalid FLEET_SINGLETON_MAX_ZOOM"),
            }
        }
        env_parse(&lookup, "FLEET_FADE_OUT_MS", &mut self.fade_out_ms);
        env_parse(&lookup, "FLEET_SOURCE_INIT_DELAY_MS", &mut self.source_init_delay_ms);
        env_parse(&lookup, "FLEET_HISTORY_LIMIT", &mut self.history_limit);
        env_parse(&lookup, "FLEET_SPIN_DEG_PER_S", &mut self.spin_deg_per_s);
        if let Some(raw) = lookup("FLEET_MODEL_TYPE") {
            match raw.trim() {
                "2d" => self.model_type = ModelType::TwoD,
                "3d" => self.model_type = ModelType::ThreeD,
                _ => warn!(value = %raw, "ignoring invalid FLEET_MODEL_TYPE"),
            }
        }
        env_parse(&lookup, "FLEET_CLUSTERS_VISIBLE", &mut self.clusters_visible);
        self
    }

    pub fn lifecycle(&self) -> LifecycleConfig {
        LifecycleConfig {
            fade_out_ms: self.fade_out_ms,
            spin_deg_per_s: self.spin_deg_per_s,
            ..LifecycleConfig::default()
        }
    }
}

fn env_parse<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, slot: &mut T) {
    let Some(raw) = lookup(key) else {
        return;
    };
    match raw.trim().parse::<T>() {
        Ok(v) => *slot = v,
        Err(_) => warn!(key, value = %raw, "ignoring invalid environment override"),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use layers::ModelType;
    use pretty_assertions::assert_eq;

    use super::EngineConfig;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: BTreeMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg: EngineConfig =
            serde_json::from_str(r#"{"fade_out_ms": 150, "cluster": {"max_zoom": 12}}"#).unwrap();
        assert_eq!(cfg.fade_out_ms, 150);
        assert_eq!(cfg.cluster.max_zoom, 12);
        assert_eq!(cfg.cluster.radius, 60.0);
        assert_eq!(cfg.source_init_delay_ms, 500);
        assert_eq!(cfg.feature.as_str(), "location");
    }

    #[test]
    fn overlay_applies_valid_values_only() {
        let cfg = EngineConfig::default().overlay(lookup(&[
            ("FLEET_FEATURE", "water-depth"),
            ("FLEET_MAX_ZOOM", "10"),
            ("FLEET_RADIUS", "not-a-number"),
            ("FLEET_SINGLETON_MAX_ZOOM", "8"),
            ("FLEET_MODEL_TYPE", "3d"),
            ("FLEET_CLUSTERS_VISIBLE", "true"),
        ]));
        assert_eq!(cfg.feature.as_str(), "water-depth");
        assert_eq!(cfg.cluster.max_zoom, 10);
        assert_eq!(cfg.cluster.radius, 60.0);
        assert_eq!(cfg.cluster.singleton_max_zoom, Some(8));
        assert_eq!(cfg.model_type, ModelType::ThreeD);
        assert!(cfg.clusters_visible);
    }

    #[test]
    fn lifecycle_config_carries_timing() {
        let cfg = EngineConfig {
            fade_out_ms: 42,
            ..EngineConfig::default()
        };
        assert_eq!(cfg.lifecycle().fade_out_ms, 42);
    }
}
