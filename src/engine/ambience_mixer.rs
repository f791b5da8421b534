//! Multi-channel ambience mixer with a master gain stage

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use thiserror::Error;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use super::audio_channel::{AudioChannel, ChannelEvent};
use crate::{
    services::{
        audio::{AudioBackend, AudioError},
        catalog::{self, SoundDef},
        persistence::{load_as, save_as, PersistenceGateway, AMBIENCE_STATE_KEY},
    },
    state::{MixerState, Notice},
};

#[derive(Debug, Error)]
pub enum MixerError {
    #[error("Unknown ambience channel '{0}'")]
    UnknownChannel(String),

    #[error("Failed to start '{id}': {source}")]
    Acquisition {
        id: String,
        #[source]
        source: AudioError,
    },

    #[error("Failed to lock mixer state: {0}")]
    Lock(String),
}

struct MixerInner {
    state: MixerState,
    live: HashMap<String, AudioChannel>,
    /// Bumped on every toggle so late acquisitions can tell they are stale
    generations: HashMap<String, u64>,
}

impl MixerInner {
    fn bump(&mut self, id: &str) -> u64 {
        let generation = self.generations.entry(id.to_string()).or_insert(0);
        *generation += 1;
        *generation
    }

    fn generation(&self, id: &str) -> u64 {
        self.generations.get(id).copied().unwrap_or(0)
    }

    fn wants(&self, id: &str, generation: u64) -> bool {
        self.generation(id) == generation && self.state.channel(id).is_some_and(|c| c.active)
    }
}

/// Owns every live [`AudioChannel`] and the persisted [`MixerState`]
pub struct AmbienceMixer {
    inner: Mutex<MixerInner>,
    catalog: Vec<SoundDef>,
    backend: Arc<dyn AudioBackend>,
    store: Arc<dyn PersistenceGateway>,
    notices: broadcast::Sender<Notice>,
    events: broadcast::Sender<ChannelEvent>,
    updates: watch::Sender<MixerState>,
}

impl AmbienceMixer {
    /// Build the mixer from persisted state and restart channels that were playing
    pub async fn load(
        catalog: Vec<SoundDef>,
        backend: Arc<dyn AudioBackend>,
        store: Arc<dyn PersistenceGateway>,
        notices: broadcast::Sender<Notice>,
    ) -> Self {
        let persisted = load_as::<MixerState>(store.as_ref(), AMBIENCE_STATE_KEY).await;
        let mut state = MixerState::from_catalog(persisted, &catalog);

        let to_restore = state.active_ids();
        for id in &to_restore {
            if let Some(channel) = state.channel_mut(id) {
                channel.active = false;
            }
        }

        let (events, _) = broadcast::channel(64);
        let (updates, _) = watch::channel(state.clone());
        let mixer = Self {
            inner: Mutex::new(MixerInner {
                state,
                live: HashMap::new(),
                generations: HashMap::new(),
            }),
            catalog,
            backend,
            store,
            notices,
            events,
            updates,
        };

        info!(
            "Ambience mixer ready ({} backend, {} sounds, restoring {:?})",
            mixer.backend.name(),
            mixer.catalog.len(),
            to_restore
        );
        for id in to_restore {
            if let Err(e) = mixer.toggle_channel(&id).await {
                warn!("Could not restore '{}': {}", id, e);
            }
        }
        mixer
    }

    fn lock(&self) -> Result<MutexGuard<'_, MixerInner>, MixerError> {
        self.inner
            .lock()
            .map_err(|e| MixerError::Lock(e.to_string()))
    }

    /// Persist and broadcast the latest mixer state
    fn publish(&self, state: &MixerState) {
        save_as(self.store.as_ref(), AMBIENCE_STATE_KEY, state);
        self.updates.send_replace(state.clone());
    }

    fn emit(&self, event: ChannelEvent) {
        debug!("Channel event: {:?}", event);
        let _ = self.events.send(event);
    }

    pub fn catalog(&self) -> &[SoundDef] {
        &self.catalog
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ChannelEvent> {
        self.events.subscribe()
    }

    /// Watch the latest mixer state
    pub fn subscribe(&self) -> watch::Receiver<MixerState> {
        self.updates.subscribe()
    }

    /// Switch a channel on or off. Returns whether it ends up active.
    ///
    /// Activation acquires a source asynchronously; if the channel was switched
    /// off (or toggled again) before the source arrives, the source is dropped.
    pub async fn toggle_channel(&self, id: &str) -> Result<bool, MixerError> {
        let def = catalog::find(&self.catalog, id)
            .cloned()
            .ok_or_else(|| MixerError::UnknownChannel(id.to_string()))?;

        let generation = {
            let mut inner = self.lock()?;
            let was_active = inner
                .state
                .channel(id)
                .map(|c| c.active)
                .ok_or_else(|| MixerError::UnknownChannel(id.to_string()))?;
            let generation = inner.bump(id);

            if let Some(channel) = inner.state.channel_mut(id) {
                channel.active = !was_active;
            }
            self.publish(&inner.state);

            if was_active {
                if let Some(live) = inner.live.remove(id) {
                    live.release();
                    self.emit(ChannelEvent::Released { id: id.to_string() });
                }
                info!("Ambience '{}' off", id);
                return Ok(false);
            }
            generation
        };

        debug!("Acquiring source for '{}' (generation {})", id, generation);
        match AudioChannel::acquire(self.backend.as_ref(), &def).await {
            Ok(channel) => {
                let mut inner = self.lock()?;
                if !inner.wants(id, generation) {
                    debug!("Discarding late source for '{}'", id);
                    channel.release();
                    self.emit(ChannelEvent::Discarded { id: id.to_string() });
                    return Ok(inner.state.channel(id).is_some_and(|c| c.active));
                }

                let gain = inner.state.effective(id).unwrap_or(0.0);
                channel.set_volume(gain);
                inner.live.insert(id.to_string(), channel);
                info!("Ambience '{}' on at gain {:.2}", id, gain);
                self.emit(ChannelEvent::Acquired {
                    id: id.to_string(),
                    gain,
                });
                Ok(true)
            }
            Err(source) => {
                {
                    let mut inner = self.lock()?;
                    if inner.generation(id) != generation {
                        debug!("Ignoring stale failure for '{}': {}", id, source);
                        return Ok(inner.state.channel(id).is_some_and(|c| c.active));
                    }
                    if let Some(channel) = inner.state.channel_mut(id) {
                        channel.active = false;
                    }
                    self.publish(&inner.state);
                }

                warn!("Failed to start ambience '{}': {}", id, source);
                let _ = self
                    .notices
                    .send(Notice::warning(format!("Couldn't play {}", def.display_name)));
                self.emit(ChannelEvent::Failed {
                    id: id.to_string(),
                    reason: source.to_string(),
                });
                Err(MixerError::Acquisition {
                    id: id.to_string(),
                    source,
                })
            }
        }
    }

    /// Store a clamped channel volume and retune the live source if playing
    pub fn set_channel_volume(&self, id: &str, value: i64) -> Result<u8, MixerError> {
        let mut inner = self.lock()?;
        let stored = inner
            .state
            .set_volume(id, value)
            .ok_or_else(|| MixerError::UnknownChannel(id.to_string()))?;

        if let (Some(live), Some(gain)) = (inner.live.get(id), inner.state.effective(id)) {
            live.set_volume(gain);
        }
        self.publish(&inner.state);
        debug!("Ambience '{}' volume {}", id, stored);
        Ok(stored)
    }

    /// Store a clamped master volume and retune every live source
    pub fn set_master_volume(&self, value: i64) -> Result<u8, MixerError> {
        let mut inner = self.lock()?;
        let master = inner.state.set_master(value);

        let MixerInner { state, live, .. } = &*inner;
        for (id, channel) in live {
            if let Some(gain) = state.effective(id) {
                channel.set_volume(gain);
            }
        }
        self.publish(&inner.state);
        debug!("Ambience master volume {}", master);
        Ok(master)
    }

    pub fn snapshot(&self) -> Result<MixerState, MixerError> {
        Ok(self.lock()?.state.clone())
    }

    /// Gain currently applied to a playing channel
    pub fn live_gain(&self, id: &str) -> Option<f32> {
        self.lock().ok()?.live.get(id).map(|c| c.volume())
    }

    pub fn live_count(&self) -> usize {
        self.lock().map(|inner| inner.live.len()).unwrap_or(0)
    }

    /// Stop every live source. Active flags stay persisted for the next start.
    pub fn shutdown(&self) {
        match self.lock() {
            Ok(mut inner) => {
                let count = inner.live.len();
                for (_, channel) in inner.live.drain() {
                    channel.release();
                }
                info!("Ambience mixer stopped {} channels", count);
            }
            Err(e) => warn!("{}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{
        audio::{AudioSink, GainStage, NullBackend},
        catalog::default_catalog,
        persistence::MemoryStore,
    };
    use crate::state::ChannelState;
    use futures::future::{BoxFuture, FutureExt};
    use tokio::sync::Semaphore;

    /// Holds every acquisition until a permit is released
    struct GatedBackend {
        gate: Semaphore,
        sinks: std::sync::Mutex<Vec<Arc<GainStage>>>,
    }

    impl GatedBackend {
        fn new() -> Self {
            Self {
                gate: Semaphore::new(0),
                sinks: std::sync::Mutex::new(Vec::new()),
            }
        }
    }

    impl AudioBackend for GatedBackend {
        fn name(&self) -> &'static str {
            "gated"
        }

        fn acquire<'a>(&'a self, _def: &'a SoundDef) -> BoxFuture<'a, Result<Box<dyn AudioSink>, AudioError>> {
            async move {
                self.gate.acquire().await.expect("gate open").forget();
                let stage = GainStage::new();
                self.sinks.lock().unwrap().push(stage.clone());
                Ok(Box::new(stage) as Box<dyn AudioSink>)
            }
            .boxed()
        }
    }

    struct BrokenBackend;

    impl AudioBackend for BrokenBackend {
        fn name(&self) -> &'static str {
            "broken"
        }

        fn acquire<'a>(&'a self, def: &'a SoundDef) -> BoxFuture<'a, Result<Box<dyn AudioSink>, AudioError>> {
            async move { Err(AudioError::AssetEmpty { id: def.id.clone() }) }.boxed()
        }
    }

    /// First acquisition waits for the gate and then fails; later ones succeed
    struct FlakyBackend {
        gate: Semaphore,
        calls: std::sync::atomic::AtomicUsize,
    }

    impl AudioBackend for FlakyBackend {
        fn name(&self) -> &'static str {
            "flaky"
        }

        fn acquire<'a>(&'a self, def: &'a SoundDef) -> BoxFuture<'a, Result<Box<dyn AudioSink>, AudioError>> {
            async move {
                let call = self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                if call == 0 {
                    self.gate.acquire().await.expect("gate open").forget();
                    return Err(AudioError::AssetEmpty { id: def.id.clone() });
                }
                Ok(Box::new(GainStage::new()) as Box<dyn AudioSink>)
            }
            .boxed()
        }
    }

    async fn mixer_with(backend: Arc<dyn AudioBackend>, store: Arc<MemoryStore>) -> AmbienceMixer {
        let (notices, _) = broadcast::channel(16);
        AmbienceMixer::load(default_catalog(), backend, store, notices).await
    }

    async fn null_mixer() -> (AmbienceMixer, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (mixer_with(Arc::new(NullBackend), store.clone()).await, store)
    }

    fn is_active(mixer: &AmbienceMixer, id: &str) -> bool {
        mixer.snapshot().unwrap().channels[id].active
    }

    #[tokio::test]
    async fn toggle_twice_returns_to_original_state() {
        let (mixer, _) = null_mixer().await;
        assert!(mixer.toggle_channel("rain").await.unwrap());
        assert_eq!(mixer.live_count(), 1);
        assert!(!mixer.toggle_channel("rain").await.unwrap());
        assert!(!is_active(&mixer, "rain"));
        assert_eq!(mixer.live_count(), 0);
    }

    #[tokio::test]
    async fn unknown_channel_is_rejected() {
        let (mixer, _) = null_mixer().await;
        assert!(matches!(
            mixer.toggle_channel("vinyl").await,
            Err(MixerError::UnknownChannel(_))
        ));
        assert!(mixer.set_channel_volume("vinyl", 10).is_err());
    }

    #[tokio::test]
    async fn channel_and_master_volume_multiply() {
        let (mixer, _) = null_mixer().await;
        mixer.toggle_channel("cafe").await.unwrap();
        assert_eq!(mixer.set_channel_volume("cafe", 80).unwrap(), 80);
        assert_eq!(mixer.set_master_volume(50).unwrap(), 50);

        let gain = mixer.live_gain("cafe").unwrap();
        assert!((gain - 0.4).abs() < 1e-6);
    }

    #[tokio::test]
    async fn volume_is_clamped_and_does_not_activate() {
        let (mixer, store) = null_mixer().await;
        assert_eq!(mixer.set_channel_volume("fan", 175).unwrap(), 100);
        assert_eq!(mixer.set_channel_volume("fan", -5).unwrap(), 0);
        assert_eq!(mixer.set_master_volume(1_000).unwrap(), 100);
        assert!(!is_active(&mixer, "fan"));
        assert!(mixer.live_gain("fan").is_none());

        let saved = store.get(AMBIENCE_STATE_KEY).unwrap();
        assert_eq!(saved["channels"]["fan"]["volume"], 0);
        assert_eq!(saved["masterVolume"], 100);
    }

    #[tokio::test]
    async fn master_change_retunes_every_live_channel() {
        let (mixer, _) = null_mixer().await;
        mixer.toggle_channel("rain").await.unwrap();
        mixer.toggle_channel("wind").await.unwrap();
        mixer.set_channel_volume("rain", 100).unwrap();
        mixer.set_channel_volume("wind", 20).unwrap();
        mixer.set_master_volume(25).unwrap();

        assert!((mixer.live_gain("rain").unwrap() - 0.25).abs() < 1e-6);
        assert!((mixer.live_gain("wind").unwrap() - 0.05).abs() < 1e-6);
    }

    #[tokio::test]
    async fn toggle_off_during_acquisition_discards_source() {
        let backend = Arc::new(GatedBackend::new());
        let store = Arc::new(MemoryStore::new());
        let mixer = Arc::new(mixer_with(backend.clone(), store).await);

        let pending = {
            let mixer = Arc::clone(&mixer);
            tokio::spawn(async move { mixer.toggle_channel("rain").await })
        };
        while !is_active(&mixer, "rain") {
            tokio::task::yield_now().await;
        }

        assert!(!mixer.toggle_channel("rain").await.unwrap());
        backend.gate.add_permits(1);

        assert!(!pending.await.unwrap().unwrap());
        assert!(!is_active(&mixer, "rain"));
        assert_eq!(mixer.live_count(), 0);
        let sinks = backend.sinks.lock().unwrap();
        assert_eq!(sinks.len(), 1);
        assert!(sinks[0].is_stopped());
    }

    #[tokio::test]
    async fn late_failure_does_not_undo_newer_toggle() {
        let backend = Arc::new(FlakyBackend {
            gate: Semaphore::new(0),
            calls: Default::default(),
        });
        let (notices, mut notice_rx) = broadcast::channel(16);
        let mixer = Arc::new(
            AmbienceMixer::load(default_catalog(), backend.clone(), Arc::new(MemoryStore::new()), notices).await,
        );
        let mut events = mixer.subscribe_events();

        let pending = {
            let mixer = Arc::clone(&mixer);
            tokio::spawn(async move { mixer.toggle_channel("rain").await })
        };
        while !is_active(&mixer, "rain") {
            tokio::task::yield_now().await;
        }

        assert!(!mixer.toggle_channel("rain").await.unwrap());
        assert!(mixer.toggle_channel("rain").await.unwrap());
        backend.gate.add_permits(1);

        assert!(pending.await.unwrap().unwrap());
        assert!(is_active(&mixer, "rain"));
        assert_eq!(mixer.live_count(), 1);
        assert!(notice_rx.try_recv().is_err());
        while let Ok(event) = events.try_recv() {
            assert!(!matches!(event, ChannelEvent::Failed { .. }));
        }
    }

    #[tokio::test]
    async fn subscribers_see_latest_state() {
        let (mixer, _) = null_mixer().await;
        let mut updates = mixer.subscribe();

        mixer.set_master_volume(30).unwrap();
        mixer.toggle_channel("waves").await.unwrap();

        assert!(updates.has_changed().unwrap());
        let latest = updates.borrow_and_update().clone();
        assert_eq!(latest.master_volume, 30);
        assert!(latest.channels["waves"].active);
    }

    #[tokio::test]
    async fn failed_acquisition_leaves_channel_inactive_with_warning() {
        let store = Arc::new(MemoryStore::new());
        let (notices, mut notice_rx) = broadcast::channel(16);
        let mixer = AmbienceMixer::load(default_catalog(), Arc::new(BrokenBackend), store, notices).await;
        let mut events = mixer.subscribe_events();

        let result = mixer.toggle_channel("thunder").await;
        assert!(matches!(result, Err(MixerError::Acquisition { .. })));
        assert!(!is_active(&mixer, "thunder"));

        let notice = notice_rx.recv().await.unwrap();
        assert_eq!(notice.severity, crate::state::Severity::Warning);
        assert!(matches!(events.recv().await.unwrap(), ChannelEvent::Failed { .. }));
    }

    #[tokio::test]
    async fn persisted_active_channels_are_restored() {
        let store = Arc::new(MemoryStore::new());
        let mut persisted = MixerState::from_catalog(None, &default_catalog());
        persisted.channels.insert("forest".into(), ChannelState { volume: 60, active: true });
        persisted.master_volume = 50;
        save_as(store.as_ref(), AMBIENCE_STATE_KEY, &persisted);

        let mixer = mixer_with(Arc::new(NullBackend), store).await;
        assert!(is_active(&mixer, "forest"));
        assert!((mixer.live_gain("forest").unwrap() - 0.3).abs() < 1e-6);
    }

    #[tokio::test]
    async fn shutdown_stops_sources_but_keeps_flags() {
        let (mixer, _) = null_mixer().await;
        mixer.toggle_channel("birds").await.unwrap();
        mixer.shutdown();
        assert_eq!(mixer.live_count(), 0);
        assert!(is_active(&mixer, "birds"));
    }
}
