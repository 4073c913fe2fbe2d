//! # Bot Module
//!
//! Integración con Discord: comandos slash, botones y eventos de voz.
//!
//! The bot is built around the [`JukeboxBot`] struct which implements
//! Serenity's [`EventHandler`] trait. It only translates Discord events into
//! calls on the [`PlaybackManager`]; every guild decision lives in the
//! playback actors.
//!
//! - [`commands`] - registro de comandos (guild de desarrollo o global)
//! - [`handlers`] - comandos, autocompletado y botones
//! - [`presence`] - actividad del bot según los eventos de reproducción

use anyhow::Result;
use serenity::{
    all::{Context, EventHandler, GuildId, Interaction, Ready, UserId, VoiceState},
    async_trait,
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tracing::{debug, error, info, warn};

pub mod commands;
pub mod handlers;
pub mod presence;

use crate::{audio::player::PlaybackManager, config::Config, library::CatalogHandle};
use presence::PresenceUpdater;

/// Manejador de eventos de Discord del jukebox
pub struct JukeboxBot {
    pub config: Arc<Config>,
    pub manager: Arc<PlaybackManager>,
    presence: Arc<PresenceUpdater>,
    maintenance_started: AtomicBool,
}

impl JukeboxBot {
    pub fn new(config: Arc<Config>, manager: Arc<PlaybackManager>, presence: Arc<PresenceUpdater>) -> Self {
        Self {
            config,
            manager,
            presence,
            maintenance_started: AtomicBool::new(false),
        }
    }

    /// Registers slash commands with Discord.
    ///
    /// Con `GUILD_ID` los comandos se registran sólo en esa guild (se
    /// propagan al instante); sin él se registran globalmente.
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registrando comandos slash...");
        info!("🔧 Application ID: {}", self.config.application_id);

        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::new(guild_id);
                info!("🏠 Registrando comandos para guild específica: {}", guild_id);

                if !ctx.cache.guilds().contains(&guild_id) {
                    warn!("⚠️ El bot no está en la guild especificada: {}", guild_id);
                    return Ok(());
                }

                commands::register_guild_commands(ctx, guild_id).await.map_err(|e| {
                    error!("❌ Error registrando comandos de guild: {:?}", e);
                    anyhow::anyhow!("No se pudieron registrar comandos de guild. Verifica el permiso 'applications.commands'.")
                })?;
                info!("✅ Comandos de guild registrados para: {}", guild_id);
            }
            None => {
                info!("🌐 Registrando comandos globalmente");
                commands::register_global_commands(ctx).await.map_err(|e| {
                    error!("❌ Error registrando comandos globales: {:?}", e);
                    anyhow::anyhow!("No se pudieron registrar comandos globales. Verifica el permiso 'applications.commands'.")
                })?;
                info!("✅ Comandos globales registrados");
            }
        }

        Ok(())
    }
}

#[async_trait]
impl EventHandler for JukeboxBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error al registrar comandos: {:?}", e);
        }

        self.presence.set_context(ctx);

        // Iniciar tareas de mantenimiento (una sola vez aunque haya reconexiones)
        if self.maintenance_started.swap(true, Ordering::SeqCst) {
            return;
        }
        let catalog = self.manager.catalog().clone();
        let manager = self.manager.clone();
        let every = self.config.library_refresh();

        tokio::spawn(async move {
            maintenance_tasks(catalog, manager, every).await;
        });
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        match interaction {
            Interaction::Command(command) => {
                if let Err(e) = handlers::handle_command(&ctx, command, self).await {
                    error!("Error manejando comando: {:?}", e);
                }
            }
            Interaction::Autocomplete(autocomplete) => {
                if let Err(e) = handlers::handle_autocomplete(&ctx, autocomplete, self).await {
                    error!("Error manejando autocompletado: {:?}", e);
                }
            }
            Interaction::Component(component) => {
                if let Err(e) = handlers::handle_component(&ctx, component, self).await {
                    error!("Error manejando componente: {:?}", e);
                }
            }
            _ => {}
        }
    }

    /// Traduce cambios de voz en eventos de ocupación.
    ///
    /// - **Bot conectado o movido**: el actor confirma su canal
    /// - **Bot desconectado desde fuera**: se desmonta el estado del guild
    /// - **Cualquier otro cambio**: se recuentan los humanos del canal del bot
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let Some(guild_id) = new.guild_id else { return };
        let bot_id = ctx.cache.current_user().id;

        if new.user_id == bot_id {
            match new.channel_id {
                Some(channel_id) => self.manager.voice_connected(guild_id, channel_id),
                None => {
                    if let Some(old) = old {
                        info!("🔌 Bot desconectado en guild {}", guild_id);
                        self.manager.voice_disconnected(guild_id, old.channel_id);
                    }
                    return;
                }
            }
        }

        if !self.manager.is_active(guild_id) {
            return;
        }

        match count_humans(&ctx, guild_id, bot_id) {
            Some(humans) => {
                debug!("👥 {} humanos con el bot en guild {}", humans, guild_id);
                self.manager.occupancy_changed(guild_id, humans);
            }
            None => debug!("Bot sin canal en caché para guild {}", guild_id),
        }
    }
}

/// Humanos (no bots) en el canal de voz donde está el bot
fn count_humans(ctx: &Context, guild_id: GuildId, bot_id: UserId) -> Option<usize> {
    let guild = guild_id.to_guild_cached(&ctx.cache)?;
    let channel_id = guild.voice_states.get(&bot_id)?.channel_id?;

    let humans = guild
        .voice_states
        .values()
        .filter(|state| state.channel_id == Some(channel_id) && state.user_id != bot_id)
        .filter(|state| {
            let is_bot = state
                .member
                .as_ref()
                .map(|member| member.user.bot)
                .or_else(|| ctx.cache.user(state.user_id).map(|user| user.bot))
                .unwrap_or(false);
            !is_bot
        })
        .count();

    Some(humans)
}

/// Re-indexa la biblioteca cuando caduca la instantánea del catálogo.
async fn maintenance_tasks(catalog: Arc<CatalogHandle>, manager: Arc<PlaybackManager>, every: std::time::Duration) {
    let mut interval = tokio::time::interval(every);
    // El primer tick es inmediato y el catálogo ya se indexó al arrancar
    interval.tick().await;

    loop {
        interval.tick().await;

        if let Err(e) = catalog.refresh_if_stale().await {
            warn!("Error re-indexando la biblioteca: {:?}", e);
        }

        info!(
            "🧹 Tareas de mantenimiento completadas ({} guilds activos)",
            manager.active_guilds()
        );
    }
}
