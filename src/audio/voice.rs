//! Transporte de voz real sobre songbird.

use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    input::File,
    tracks::{PlayMode, TrackHandle},
    Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::{
    audio::transport::{Completion, TrackOutcome, TransportFactory, VoiceTransport},
    error::{PlaybackError, PlaybackResult},
    library::TrackDescriptor,
};

pub struct SongbirdTransportFactory {
    manager: Arc<Songbird>,
    volume: f32,
}

impl SongbirdTransportFactory {
    pub fn new(manager: Arc<Songbird>, volume: f32) -> Self {
        Self { manager, volume }
    }
}

impl TransportFactory for SongbirdTransportFactory {
    fn create(&self, guild_id: GuildId) -> Arc<dyn VoiceTransport> {
        Arc::new(SongbirdTransport {
            guild_id,
            manager: self.manager.clone(),
            volume: self.volume,
            current: Mutex::new(None),
        })
    }
}

/// Llamada de voz de un guild.
pub struct SongbirdTransport {
    guild_id: GuildId,
    manager: Arc<Songbird>,
    volume: f32,
    current: Mutex<Option<TrackHandle>>,
}

impl SongbirdTransport {
    fn with_current(&self, action: impl FnOnce(&TrackHandle) -> songbird::error::TrackResult<()>) {
        if let Some(track) = self.current.lock().as_ref() {
            if let Err(e) = action(track) {
                debug!("Control de pista ignorado en guild {}: {:?}", self.guild_id, e);
            }
        }
    }
}

#[async_trait]
impl VoiceTransport for SongbirdTransport {
    async fn connect(&self, channel_id: ChannelId) -> PlaybackResult<()> {
        self.manager
            .join(self.guild_id, channel_id)
            .await
            .map_err(|e| PlaybackError::Transport(format!("no se pudo unir al canal: {}", e)))?;
        Ok(())
    }

    async fn play(&self, track: &TrackDescriptor) -> PlaybackResult<Completion> {
        if !track.path.exists() {
            return Err(PlaybackError::Transport(format!(
                "archivo no encontrado: {}",
                track.path.display()
            )));
        }

        let call = self
            .manager
            .get(self.guild_id)
            .ok_or_else(|| PlaybackError::Transport("sin conexión de voz".into()))?;

        let handle = {
            let mut call = call.lock().await;
            call.play_only_input(File::new(track.path.clone()).into())
        };
        if let Err(e) = handle.set_volume(self.volume) {
            warn!("🔈 No se pudo ajustar el volumen en guild {}: {:?}", self.guild_id, e);
        }

        let (tx, rx) = oneshot::channel();
        let notifier = CompletionNotifier {
            guild_id: self.guild_id,
            tx: Arc::new(Mutex::new(Some(tx))),
        };

        handle
            .add_event(Event::Track(TrackEvent::End), notifier.clone())
            .map_err(|e| PlaybackError::Transport(format!("Error al agregar event handler: {}", e)))?;
        handle
            .add_event(Event::Track(TrackEvent::Error), notifier)
            .map_err(|e| PlaybackError::Transport(format!("Error al agregar event handler: {}", e)))?;

        *self.current.lock() = Some(handle);
        Ok(rx)
    }

    async fn stop(&self) {
        self.with_current(|track| track.stop());
    }

    async fn pause(&self) {
        self.with_current(|track| track.pause());
    }

    async fn resume(&self) {
        self.with_current(|track| track.play());
    }

    async fn disconnect(&self) {
        self.current.lock().take();
        match self.manager.remove(self.guild_id).await {
            Ok(()) => info!("👋 Desconectado del canal de voz en guild {}", self.guild_id),
            Err(e) => debug!("Guild {} ya estaba desconectado: {:?}", self.guild_id, e),
        }
    }
}

/// Resuelve la finalización de una pista con el primer evento de fin o error.
#[derive(Clone)]
struct CompletionNotifier {
    guild_id: GuildId,
    tx: Arc<Mutex<Option<oneshot::Sender<TrackOutcome>>>>,
}

#[async_trait]
impl VoiceEventHandler for CompletionNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let outcome = match ctx {
            EventContext::Track(tracks) => tracks
                .iter()
                .find_map(|(state, _)| match &state.playing {
                    PlayMode::Errored(e) => Some(TrackOutcome::Failed(format!("{:?}", e))),
                    _ => None,
                })
                .unwrap_or(TrackOutcome::Finished),
            _ => TrackOutcome::Finished,
        };

        if let TrackOutcome::Failed(reason) = &outcome {
            error!("❌ Error en track para guild {}: {}", self.guild_id, reason);
        }

        if let Some(tx) = self.tx.lock().take() {
            let _ = tx.send(outcome);
        }

        Some(Event::Cancel)
    }
}
