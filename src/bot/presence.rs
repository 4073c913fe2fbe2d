use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serenity::{gateway::ActivityData, model::id::GuildId, prelude::Context};
use std::{collections::BTreeMap, time::Duration};
use tracing::debug;

use crate::{
    audio::telemetry::{EventSubscriber, LifecycleEvent},
    ui::embeds::format_duration,
};

/// Actividad mostrada en el perfil del bot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceStatus {
    Listening(String),
    Watching(String),
}

impl PresenceStatus {
    fn to_activity(&self) -> ActivityData {
        match self {
            PresenceStatus::Listening(text) => ActivityData::listening(text),
            PresenceStatus::Watching(text) => ActivityData::watching(text),
        }
    }
}

#[derive(Debug, Default)]
struct GuildPresence {
    track: Option<String>,
    countdown: Option<Duration>,
}

/// Lo que sabemos de cada guild a partir de los eventos
#[derive(Debug, Default)]
struct PresenceBoard {
    guilds: BTreeMap<GuildId, GuildPresence>,
}

impl PresenceBoard {
    fn apply(&mut self, event: &LifecycleEvent) {
        let guild_id = event.guild_id();

        match event {
            LifecycleEvent::Started { track, .. } => {
                self.guilds.entry(guild_id).or_default().track = Some(track.display_name());
            }
            LifecycleEvent::Completed { .. }
            | LifecycleEvent::Skipped { .. }
            | LifecycleEvent::Failed { .. } => {
                if let Some(guild) = self.guilds.get_mut(&guild_id) {
                    guild.track = None;
                }
            }
            LifecycleEvent::AloneCountdown { remaining, .. } => {
                self.guilds.entry(guild_id).or_default().countdown = Some(*remaining);
            }
            LifecycleEvent::HumansReturned { .. } => {
                if let Some(guild) = self.guilds.get_mut(&guild_id) {
                    guild.countdown = None;
                }
            }
            LifecycleEvent::Idle { .. } => {
                self.guilds.remove(&guild_id);
            }
            LifecycleEvent::Queued { .. } => {}
        }
    }

    /// La cuenta atrás más próxima manda; después cualquier pista sonando.
    fn status(&self) -> PresenceStatus {
        if let Some(remaining) = self.guilds.values().filter_map(|g| g.countdown).min() {
            return PresenceStatus::Watching(format!("disconnect in {}", format_duration(remaining)));
        }

        match self.guilds.values().find_map(|g| g.track.as_ref()) {
            Some(track) => PresenceStatus::Listening(track.clone()),
            None => PresenceStatus::Listening("/play".to_string()),
        }
    }
}

/// Actualiza la actividad del bot según los eventos de reproducción
#[derive(Default)]
pub struct PresenceUpdater {
    ctx: RwLock<Option<Context>>,
    board: Mutex<PresenceBoard>,
    applied: Mutex<Option<PresenceStatus>>,
}

impl PresenceUpdater {
    /// Se llama en `ready`; aplica el estado actual en cuanto hay conexión.
    pub fn set_context(&self, ctx: Context) {
        *self.ctx.write() = Some(ctx);
        self.applied.lock().take();
        let status = self.board.lock().status();
        self.apply(status);
    }

    fn apply(&self, status: PresenceStatus) {
        let mut applied = self.applied.lock();
        if applied.as_ref() == Some(&status) {
            return;
        }

        if let Some(ctx) = self.ctx.read().as_ref() {
            debug!("🎧 Presencia: {:?}", status);
            ctx.set_activity(Some(status.to_activity()));
            *applied = Some(status);
        }
    }
}

#[async_trait]
impl EventSubscriber for PresenceUpdater {
    async fn handle(&self, event: &LifecycleEvent) {
        let status = {
            let mut board = self.board.lock();
            board.apply(event);
            board.status()
        };
        self.apply(status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::TrackDescriptor;
    use crate::audio::telemetry::IdleReason;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    const GUILD: GuildId = GuildId::new(1);

    fn started(guild_id: GuildId) -> LifecycleEvent {
        LifecycleEvent::Started {
            track: Arc::new(TrackDescriptor::new("/songs/ceremony.mp3", "Ceremony", "New Order", 264)),
            guild_id,
        }
    }

    #[test]
    fn test_idle_board_invites_to_play() {
        assert_eq!(PresenceBoard::default().status(), PresenceStatus::Listening("/play".into()));
    }

    #[test]
    fn test_playing_track_is_shown() {
        let mut board = PresenceBoard::default();
        board.apply(&started(GUILD));

        assert_eq!(board.status(), PresenceStatus::Listening("Ceremony - New Order".into()));

        board.apply(&LifecycleEvent::Completed { track_id: "/songs/ceremony.mp3".into(), guild_id: GUILD });
        assert_eq!(board.status(), PresenceStatus::Listening("/play".into()));
    }

    #[test]
    fn test_countdown_wins_until_humans_return() {
        let mut board = PresenceBoard::default();
        board.apply(&started(GUILD));
        board.apply(&LifecycleEvent::AloneCountdown { guild_id: GUILD, remaining: Duration::from_secs(285) });

        assert_eq!(board.status(), PresenceStatus::Watching("disconnect in 4:45".into()));

        board.apply(&LifecycleEvent::HumansReturned { guild_id: GUILD });
        assert_eq!(board.status(), PresenceStatus::Listening("Ceremony - New Order".into()));
    }

    #[test]
    fn test_idle_forgets_guild() {
        let mut board = PresenceBoard::default();
        board.apply(&started(GUILD));
        board.apply(&LifecycleEvent::AloneCountdown { guild_id: GUILD, remaining: Duration::from_secs(15) });
        board.apply(&LifecycleEvent::Idle { guild_id: GUILD, reason: IdleReason::AloneTimeout });

        assert_eq!(board.status(), PresenceStatus::Listening("/play".into()));
    }

    #[test]
    fn test_nearest_countdown_across_guilds() {
        let mut board = PresenceBoard::default();
        board.apply(&LifecycleEvent::AloneCountdown { guild_id: GUILD, remaining: Duration::from_secs(200) });
        board.apply(&LifecycleEvent::AloneCountdown { guild_id: GuildId::new(2), remaining: Duration::from_secs(60) });

        assert_eq!(board.status(), PresenceStatus::Watching("disconnect in 1:00".into()));
    }
}
