//! Costuras hacia los colaboradores externos del reproductor: el transporte de
//! voz y el anunciador de texto a voz.

use anyhow::Result;
use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::info;

use crate::{error::PlaybackResult, library::TrackDescriptor};

/// Cómo terminó una pista según el transporte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackOutcome {
    /// Fin natural o detención forzada.
    Finished,
    Failed(String),
}

/// Finalización de una llamada a `play`: se resuelve exactamente una vez.
pub type Completion = oneshot::Receiver<TrackOutcome>;

/// Conexión de voz de un guild. La posee en exclusiva el actor de ese guild.
#[async_trait]
pub trait VoiceTransport: Send + Sync {
    async fn connect(&self, channel_id: ChannelId) -> PlaybackResult<()>;

    /// Arranca la pista, sustituyendo cualquier otra.
    async fn play(&self, track: &TrackDescriptor) -> PlaybackResult<Completion>;

    async fn stop(&self);
    async fn pause(&self);
    async fn resume(&self);
    async fn disconnect(&self);
}

pub trait TransportFactory: Send + Sync {
    fn create(&self, guild_id: GuildId) -> Arc<dyn VoiceTransport>;
}

/// Anuncio hablado antes de cada pista. Debe terminar antes de que suene la música.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Announcer: Send + Sync {
    async fn announce(&self, guild_id: GuildId, text: &str) -> Result<()>;
}

/// Anunciador por defecto cuando no hay motor de voz: sólo deja constancia en el log.
pub struct LogAnnouncer;

#[async_trait]
impl Announcer for LogAnnouncer {
    async fn announce(&self, guild_id: GuildId, text: &str) -> Result<()> {
        info!("📢 [{}] {}", guild_id, text);
        Ok(())
    }
}
