//! Typed key-value configuration store with an owner priority stack.
//!
//! Every setter records the value it overwrote so a later
//! `restore(owner, key)` can pop exactly one level, mirroring the way a
//! `StreamSetting` temporarily shadows an `OperatorSetting` for the
//! duration of one tune without losing it.

use std::collections::HashMap;

/// Priority of the caller setting a config value, highest first. A
/// higher-priority owner's value always wins a read regardless of
/// write order; `restore` only removes the *most recent* write, not the
/// highest-priority one, matching the one-level undo the store offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConfigOwner {
    Default,
    OperatorSetting,
    StreamSetting,
    TuneSetting,
    DevSetting,
    AppSetting,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl ConfigValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ConfigValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            ConfigValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    owner: ConfigOwner,
    value: ConfigValue,
    previous: Option<(ConfigOwner, ConfigValue)>,
}

/// The configuration store. Keys are the config's name (e.g.
/// `"NetworkTimeout"`); the four value kinds share one map since a key
/// is only ever set with one kind in practice and mixing kinds under a
/// single key is a caller bug, not something worth a second type
/// parameter to prevent.
#[derive(Debug, Default)]
pub struct AampConfig {
    entries: HashMap<String, Entry>,
}

impl AampConfig {
    pub fn new() -> Self {
        Self { entries: HashMap::new() }
    }

    /// Set `key` to `value` on behalf of `owner`. Only applied if
    /// `owner`'s priority is >= the current owner's, matching the rule
    /// that a higher-priority setting can't be silently clobbered by a
    /// lower-priority one; the previous value is always stashed so a
    /// same-or-higher-priority `restore` can undo this specific write.
    pub fn set(&mut self, owner: ConfigOwner, key: &str, value: ConfigValue) {
        let previous = self.entries.get(key).map(|e| (e.owner, e.value.clone()));
        if let Some((existing_owner, _)) = previous {
            if owner < existing_owner {
                return;
            }
        }
        self.entries.insert(key.to_string(), Entry { owner, value, previous });
    }

    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.entries.get(key).map(|e| &e.value)
    }

    pub fn owner(&self, key: &str) -> Option<ConfigOwner> {
        self.entries.get(key).map(|e| e.owner)
    }

    /// Pop one level: restore `key` to whatever it held before its most
    /// recent write, but only if that write belongs to `owner`. A no-op
    /// for an unknown key or a write owned by someone else.
    pub fn restore(&mut self, owner: ConfigOwner, key: &str) {
        let Some(entry) = self.entries.get(key) else { return };
        if entry.owner != owner {
            return;
        }
        match entry.previous.clone() {
            Some((prev_owner, prev_value)) => {
                self.entries.insert(key.to_string(), Entry { owner: prev_owner, value: prev_value, previous: None });
            }
            None => {
                self.entries.remove(key);
            }
        }
    }
}

/// A handful of hot-path keys the session caches locally rather than
/// looking up through the map on every read.
#[derive(Debug, Clone)]
pub struct CachedSettings {
    pub network_timeout_ms: u64,
    pub live_offset_seconds: f64,
    pub low_latency_min_buffer_seconds: f64,
    pub low_latency_target_buffer_seconds: f64,
}

impl CachedSettings {
    pub fn refresh(&mut self, config: &AampConfig) {
        if let Some(v) = config.get("NetworkTimeout").and_then(ConfigValue::as_float) {
            self.network_timeout_ms = (v * 1000.0) as u64;
        }
        if let Some(v) = config.get("LiveOffset").and_then(ConfigValue::as_float) {
            self.live_offset_seconds = v;
        }
        if let Some(v) = config.get("LowLatencyMinBuffer").and_then(ConfigValue::as_float) {
            self.low_latency_min_buffer_seconds = v;
        }
        if let Some(v) = config.get("LowLatencyTargetBuffer").and_then(ConfigValue::as_float) {
            self.low_latency_target_buffer_seconds = v;
        }
    }
}

impl Default for CachedSettings {
    fn default() -> Self {
        Self {
            network_timeout_ms: 10_000,
            live_offset_seconds: 15.0,
            low_latency_min_buffer_seconds: 1.0,
            low_latency_target_buffer_seconds: 3.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn higher_priority_write_wins_and_restores() {
        let mut cfg = AampConfig::new();
        cfg.set(ConfigOwner::OperatorSetting, "NetworkTimeout", ConfigValue::Float(10.0));
        cfg.set(ConfigOwner::TuneSetting, "NetworkTimeout", ConfigValue::Float(3.0));
        assert_eq!(cfg.get("NetworkTimeout").and_then(ConfigValue::as_float), Some(3.0));

        cfg.restore(ConfigOwner::TuneSetting, "NetworkTimeout");
        assert_eq!(cfg.get("NetworkTimeout").and_then(ConfigValue::as_float), Some(10.0));
        assert_eq!(cfg.owner("NetworkTimeout"), Some(ConfigOwner::OperatorSetting));
    }

    #[test]
    fn lower_priority_write_is_ignored() {
        let mut cfg = AampConfig::new();
        cfg.set(ConfigOwner::AppSetting, "LiveOffset", ConfigValue::Float(15.0));
        cfg.set(ConfigOwner::OperatorSetting, "LiveOffset", ConfigValue::Float(30.0));
        assert_eq!(cfg.get("LiveOffset").and_then(ConfigValue::as_float), Some(15.0));
    }

    #[test]
    fn restore_by_wrong_owner_is_noop() {
        let mut cfg = AampConfig::new();
        cfg.set(ConfigOwner::TuneSetting, "LowLatencyMinBuffer", ConfigValue::Float(0.5));
        cfg.restore(ConfigOwner::AppSetting, "LowLatencyMinBuffer");
        assert_eq!(cfg.get("LowLatencyMinBuffer").and_then(ConfigValue::as_float), Some(0.5));
    }

    #[test]
    fn restore_with_no_previous_value_removes_key() {
        let mut cfg = AampConfig::new();
        cfg.set(ConfigOwner::DevSetting, "GstDebugLevel", ConfigValue::Str("3".into()));
        cfg.restore(ConfigOwner::DevSetting, "GstDebugLevel");
        assert!(cfg.get("GstDebugLevel").is_none());
    }

    #[test]
    fn cached_settings_refresh_converts_seconds_to_millis() {
        let mut cfg = AampConfig::new();
        cfg.set(ConfigOwner::OperatorSetting, "NetworkTimeout", ConfigValue::Float(7.0));
        let mut cached = CachedSettings::default();
        cached.refresh(&cfg);
        assert_eq!(cached.network_timeout_ms, 7_000);
    }
}
