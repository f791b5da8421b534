//! Audio backends that turn a catalog entry into a looping, gain-controlled source

use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, AtomicU32, Ordering},
        Arc,
    },
};

use futures::future::{BoxFuture, FutureExt};
use thiserror::Error;
use tracing::{debug, warn};

use super::catalog::SoundDef;

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("Asset for '{id}' not found at {path}")]
    AssetMissing { id: String, path: PathBuf },

    #[error("Failed to read asset for '{id}': {source}")]
    AssetUnreadable {
        id: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Asset for '{id}' is empty")]
    AssetEmpty { id: String },
}

/// A started, looping source with its own gain stage
pub trait AudioSink: Send + Sync {
    /// Apply a gain in 0.0..=1.0
    fn set_gain(&self, gain: f32);
    fn gain(&self) -> f32;
    /// Stop playback and release the source
    fn stop(&self);
    fn is_stopped(&self) -> bool;
}

/// Source acquisition for mixer channels
pub trait AudioBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Fetch and decode the asset for `def` and start it looping
    fn acquire<'a>(&'a self, def: &'a SoundDef) -> BoxFuture<'a, Result<Box<dyn AudioSink>, AudioError>>;
}

/// Gain and stop flag shared by the built-in sinks
#[derive(Debug, Default)]
pub struct GainStage {
    gain_bits: AtomicU32,
    stopped: AtomicBool,
}

impl GainStage {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

impl AudioSink for Arc<GainStage> {
    fn set_gain(&self, gain: f32) {
        self.gain_bits.store(gain.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
    }

    fn gain(&self) -> f32 {
        f32::from_bits(self.gain_bits.load(Ordering::Relaxed))
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::Relaxed);
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Relaxed)
    }
}

/// Degraded mode: every acquisition succeeds, nothing is heard
#[derive(Debug, Default, Clone, Copy)]
pub struct NullBackend;

impl AudioBackend for NullBackend {
    fn name(&self) -> &'static str {
        "null"
    }

    fn acquire<'a>(&'a self, def: &'a SoundDef) -> BoxFuture<'a, Result<Box<dyn AudioSink>, AudioError>> {
        debug!("Null backend acquiring '{}'", def.id);
        async move { Ok(Box::new(GainStage::new()) as Box<dyn AudioSink>) }.boxed()
    }
}

/// Sink over a loaded asset buffer
struct AssetSink {
    stage: Arc<GainStage>,
    id: String,
    bytes: usize,
}

impl AudioSink for AssetSink {
    fn set_gain(&self, gain: f32) {
        self.stage.set_gain(gain);
    }

    fn gain(&self) -> f32 {
        self.stage.gain()
    }

    fn stop(&self) {
        if !self.stage.is_stopped() {
            debug!("Releasing '{}' ({} bytes)", self.id, self.bytes);
        }
        self.stage.stop();
    }

    fn is_stopped(&self) -> bool {
        self.stage.is_stopped()
    }
}

/// Loads loop assets from a directory on disk
#[derive(Debug, Clone)]
pub struct AssetBackend {
    assets_dir: PathBuf,
}

impl AssetBackend {
    pub fn new(assets_dir: impl Into<PathBuf>) -> Self {
        Self {
            assets_dir: assets_dir.into(),
        }
    }
}

impl AudioBackend for AssetBackend {
    fn name(&self) -> &'static str {
        "asset"
    }

    fn acquire<'a>(&'a self, def: &'a SoundDef) -> BoxFuture<'a, Result<Box<dyn AudioSink>, AudioError>> {
        async move {
            let path = def.asset_path(&self.assets_dir);
            let bytes = tokio::fs::read(&path).await.map_err(|source| {
                if source.kind() == std::io::ErrorKind::NotFound {
                    AudioError::AssetMissing {
                        id: def.id.clone(),
                        path: path.clone(),
                    }
                } else {
                    AudioError::AssetUnreadable {
                        id: def.id.clone(),
                        source,
                    }
                }
            })?;

            if bytes.is_empty() {
                return Err(AudioError::AssetEmpty { id: def.id.clone() });
            }

            debug!("Loaded '{}' from {} ({} bytes)", def.id, path.display(), bytes.len());
            Ok(Box::new(AssetSink {
                stage: GainStage::new(),
                id: def.id.clone(),
                bytes: bytes.len(),
            }) as Box<dyn AudioSink>)
        }
        .boxed()
    }
}

/// Pick the backend for the configured assets directory.
///
/// Falls back to [`NullBackend`] when audio is disabled or the directory is missing.
pub fn select_backend(assets_dir: Option<PathBuf>) -> Arc<dyn AudioBackend> {
    match assets_dir {
        Some(dir) if dir.is_dir() => Arc::new(AssetBackend::new(dir)),
        Some(dir) => {
            warn!(
                "Assets directory {} not found, ambience will be silent",
                dir.display()
            );
            Arc::new(NullBackend)
        }
        None => Arc::new(NullBackend),
    }
}
