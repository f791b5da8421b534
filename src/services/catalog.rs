//! Static sound catalog

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// One loopable ambience sound
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SoundDef {
    pub id: String,
    pub display_name: String,
    /// Asset file name, resolved against the assets directory
    pub asset_ref: String,
}

impl SoundDef {
    pub fn new(id: &str, display_name: &str) -> Self {
        Self {
            id: id.to_string(),
            display_name: display_name.to_string(),
            asset_ref: format!("{}.mp3", id),
        }
    }

    pub fn asset_path(&self, assets_dir: &Path) -> PathBuf {
        assets_dir.join(&self.asset_ref)
    }
}

/// Sounds shipped with the app
pub fn default_catalog() -> Vec<SoundDef> {
    [
        ("rain", "Rain"),
        ("cafe", "Café"),
        ("fireplace", "Fireplace"),
        ("waves", "Ocean Waves"),
        ("forest", "Forest"),
        ("wind", "Wind"),
        ("thunder", "Thunder"),
        ("birds", "Birds"),
        ("city", "City"),
        ("white-noise", "White Noise"),
        ("brown-noise", "Brown Noise"),
        ("pink-noise", "Pink Noise"),
        ("fan", "Fan"),
        ("train", "Train"),
        ("library", "Library"),
    ]
    .into_iter()
    .map(|(id, name)| SoundDef::new(id, name))
    .collect()
}

/// Look up a sound by id
pub fn find<'a>(catalog: &'a [SoundDef], id: &str) -> Option<&'a SoundDef> {
    catalog.iter().find(|def| def.id == id)
}
