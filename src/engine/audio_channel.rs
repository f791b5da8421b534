//! One live ambience loop owned by the mixer

use serde::Serialize;

use crate::services::{
    audio::{AudioBackend, AudioError, AudioSink},
    catalog::SoundDef,
};

/// Lifecycle events for mixer channels
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum ChannelEvent {
    Acquired { id: String, gain: f32 },
    Failed { id: String, reason: String },
    /// Source arrived after the channel was switched off and was thrown away
    Discarded { id: String },
    Released { id: String },
}

/// A started looping source plus its gain stage.
///
/// Exists only while its channel is active; dropping it stops the source.
pub struct AudioChannel {
    id: String,
    sink: Box<dyn AudioSink>,
}

impl AudioChannel {
    /// Acquire a source for `def` from `backend`
    pub async fn acquire(backend: &dyn AudioBackend, def: &SoundDef) -> Result<Self, AudioError> {
        let sink = backend.acquire(def).await?;
        Ok(Self {
            id: def.id.clone(),
            sink,
        })
    }

    pub fn set_volume(&self, effective: f32) {
        self.sink.set_gain(effective);
    }

    pub fn volume(&self) -> f32 {
        self.sink.gain()
    }

    /// Stop the source and release the handles
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for AudioChannel {
    fn drop(&mut self) {
        tracing::debug!("Stopping source for '{}'", self.id);
        self.sink.stop();
    }
}

impl std::fmt::Debug for AudioChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioChannel")
            .field("id", &self.id)
            .field("gain", &self.sink.gain())
            .finish()
    }
}
