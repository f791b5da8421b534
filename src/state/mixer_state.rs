//! Ambience mixer state (`ambience-state`)

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

use crate::services::catalog::SoundDef;

pub const DEFAULT_CHANNEL_VOLUME: u8 = 50;
pub const DEFAULT_MASTER_VOLUME: u8 = 50;

/// Clamp any requested volume into 0..=100
pub fn clamp_volume(value: i64) -> u8 {
    value.clamp(0, 100) as u8
}

/// Gain applied to a live channel: both 0..=100 values scaled to 0..=1 and multiplied
pub fn effective_volume(channel_volume: u8, master_volume: u8) -> f32 {
    (channel_volume as f32 / 100.0) * (master_volume as f32 / 100.0)
}

/// Read any stored number and clamp it, so one bad volume cannot discard the blob
fn clamped_volume<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u8, D::Error> {
    let raw = f64::deserialize(deserializer)?;
    Ok(clamp_volume(raw.round() as i64))
}

fn default_master_volume() -> u8 {
    DEFAULT_MASTER_VOLUME
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelState {
    #[serde(deserialize_with = "clamped_volume")]
    pub volume: u8,
    pub active: bool,
}

impl Default for ChannelState {
    fn default() -> Self {
        Self {
            volume: DEFAULT_CHANNEL_VOLUME,
            active: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MixerState {
    #[serde(default)]
    pub channels: BTreeMap<String, ChannelState>,
    #[serde(default = "default_master_volume", deserialize_with = "clamped_volume")]
    pub master_volume: u8,
}

impl MixerState {
    /// Merge persisted state with the catalog.
    ///
    /// Catalog entries missing from `persisted` get the default channel state;
    /// persisted ids the catalog no longer knows are dropped.
    pub fn from_catalog(persisted: Option<MixerState>, catalog: &[SoundDef]) -> Self {
        let (mut saved, master_volume) = match persisted {
            Some(state) => (state.channels, state.master_volume),
            None => (BTreeMap::new(), DEFAULT_MASTER_VOLUME),
        };

        let channels = catalog
            .iter()
            .map(|def| {
                let channel = saved.remove(&def.id).unwrap_or_default();
                (def.id.clone(), channel)
            })
            .collect();

        if !saved.is_empty() {
            tracing::debug!("Dropping unknown persisted channels: {:?}", saved.keys().collect::<Vec<_>>());
        }

        Self {
            channels,
            master_volume,
        }
    }

    pub fn channel(&self, id: &str) -> Option<&ChannelState> {
        self.channels.get(id)
    }

    pub fn channel_mut(&mut self, id: &str) -> Option<&mut ChannelState> {
        self.channels.get_mut(id)
    }

    /// Store a clamped channel volume, returning the stored value
    pub fn set_volume(&mut self, id: &str, value: i64) -> Option<u8> {
        let channel = self.channels.get_mut(id)?;
        channel.volume = clamp_volume(value);
        Some(channel.volume)
    }

    /// Store a clamped master volume, returning the stored value
    pub fn set_master(&mut self, value: i64) -> u8 {
        self.master_volume = clamp_volume(value);
        self.master_volume
    }

    /// Effective gain for `id`, whether or not it is playing
    pub fn effective(&self, id: &str) -> Option<f32> {
        self.channels
            .get(id)
            .map(|channel| effective_volume(channel.volume, self.master_volume))
    }

    pub fn active_ids(&self) -> Vec<String> {
        self.channels
            .iter()
            .filter(|(_, channel)| channel.active)
            .map(|(id, _)| id.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::catalog::default_catalog;

    #[test]
    fn clamp_volume_bounds() {
        for (input, expected) in [(-20, 0), (0, 0), (42, 42), (100, 100), (250, 100), (i64::MIN, 0)] {
            assert_eq!(clamp_volume(input), expected);
        }
    }

    #[test]
    fn effective_volume_is_linear_product() {
        assert!((effective_volume(80, 50) - 0.4).abs() < 1e-6);
        assert_eq!(effective_volume(0, 100), 0.0);
        assert_eq!(effective_volume(100, 100), 1.0);
    }

    #[test]
    fn fresh_state_covers_whole_catalog() {
        let catalog = default_catalog();
        let state = MixerState::from_catalog(None, &catalog);
        assert_eq!(state.channels.len(), catalog.len());
        assert_eq!(state.master_volume, DEFAULT_MASTER_VOLUME);
        assert!(state
            .channels
            .values()
            .all(|c| c.volume == DEFAULT_CHANNEL_VOLUME && !c.active));
    }

    #[test]
    fn merge_keeps_known_and_drops_unknown() {
        let catalog = default_catalog();
        let mut persisted = MixerState {
            channels: BTreeMap::new(),
            master_volume: 70,
        };
        persisted.channels.insert("rain".into(), ChannelState { volume: 80, active: true });
        persisted.channels.insert("vinyl-crackle".into(), ChannelState::default());

        let state = MixerState::from_catalog(Some(persisted), &catalog);
        assert_eq!(state.master_volume, 70);
        assert_eq!(state.channel("rain"), Some(&ChannelState { volume: 80, active: true }));
        assert!(state.channel("vinyl-crackle").is_none());
        assert_eq!(state.active_ids(), vec!["rain".to_string()]);
    }

    #[test]
    fn out_of_range_saved_volumes_are_clamped_not_discarded() {
        let saved = serde_json::json!({
            "channels": {
                "rain": { "volume": 300 },
                "cafe": { "volume": 90, "active": true },
                "fan": { "volume": -12 }
            },
            "masterVolume": 20
        });
        let persisted: MixerState = serde_json::from_value(saved).unwrap();
        let state = MixerState::from_catalog(Some(persisted), &default_catalog());

        assert_eq!(state.master_volume, 20);
        assert_eq!(state.channel("rain"), Some(&ChannelState { volume: 100, active: false }));
        assert_eq!(state.channel("cafe"), Some(&ChannelState { volume: 90, active: true }));
        assert_eq!(state.channel("fan").map(|c| c.volume), Some(0));

        let huge: MixerState = serde_json::from_value(serde_json::json!({ "masterVolume": 1e12 })).unwrap();
        assert_eq!(huge.master_volume, 100);
        assert!(huge.channels.is_empty());
    }

    #[test]
    fn set_volume_clamps_and_rejects_unknown() {
        let mut state = MixerState::from_catalog(None, &default_catalog());
        assert_eq!(state.set_volume("cafe", 140), Some(100));
        assert_eq!(state.set_volume("cafe", -3), Some(0));
        assert_eq!(state.set_volume("nope", 10), None);
        assert_eq!(state.set_master(101), 100);
    }
}
