use anyhow::Result;
use serenity::{
    builder::{
        CreateActionRow, CreateAttachment, CreateAutocompleteResponse, CreateEmbed, CreateInteractionResponse,
        CreateInteractionResponseMessage, EditInteractionResponse,
    },
    model::{
        application::{CommandInteraction, ComponentInteraction},
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use tracing::{debug, info, warn};

use crate::{
    audio::player::PlayOutcome,
    bot::JukeboxBot,
    error::{PlaybackError, PlaybackResult},
    library::{artwork, Catalog},
    ui::{buttons, embeds},
};

/// Límite de sugerencias que acepta Discord
const AUTOCOMPLETE_LIMIT: usize = 25;
/// Longitud máxima de nombre y valor de una sugerencia
const CHOICE_MAX_LEN: usize = 100;

/// Maneja comandos slash
pub async fn handle_command(
    ctx: &Context,
    command: CommandInteraction,
    bot: &JukeboxBot,
) -> Result<()> {
    let guild_id = command
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Comando usado fuera de un servidor"))?;

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    match command.data.name.as_str() {
        "play" => handle_play(ctx, &command, bot, guild_id).await?,
        "skip" => {
            let result = bot.manager.skip(guild_id).await.map(|_| {
                embeds::create_success_embed("Canción saltada", "⏭️ Pasando a la siguiente canción")
            });
            reply(ctx, &command, result, Vec::new()).await?;
        }
        "stop" => {
            let result = bot.manager.stop(guild_id).await.map(|_| {
                embeds::create_success_embed(
                    "Reproducción detenida",
                    "⏹️ Cola vaciada y desconectado del canal de voz",
                )
            });
            reply(ctx, &command, result, Vec::new()).await?;
        }
        "pause" => {
            let result = bot.manager.toggle_pause(guild_id).await.map(|paused| {
                if paused {
                    embeds::create_success_embed("Pausado", "⏸️ Usa `/pause` otra vez para reanudar")
                } else {
                    embeds::create_success_embed("Reanudado", "▶️ La música continúa")
                }
            });
            reply(ctx, &command, result, Vec::new()).await?;
        }
        "queue" => handle_queue(ctx, &command, bot, guild_id).await?,
        "nowplaying" => handle_nowplaying(ctx, &command, bot, guild_id).await?,
        "loop" => {
            let result = bot.manager.cycle_loop(guild_id).await.map(|mode| {
                embeds::create_success_embed("Modo de repetición", embeds::loop_mode_label(mode))
            });
            reply(ctx, &command, result, Vec::new()).await?;
        }
        "clear" => {
            let result = bot.manager.clear_queue(guild_id).await.map(|removed| {
                embeds::create_success_embed(
                    "Cola limpiada",
                    &format!("🗑️ Se eliminaron {} canciones de la cola", removed),
                )
            });
            reply(ctx, &command, result, Vec::new()).await?;
        }
        _ => {
            command
                .create_response(
                    &ctx.http,
                    CreateInteractionResponse::Message(
                        CreateInteractionResponseMessage::new()
                            .content("❌ Comando no reconocido")
                            .ephemeral(true),
                    ),
                )
                .await?;
        }
    }

    Ok(())
}

/// Sugerencias de canciones mientras se escribe `/play`
pub async fn handle_autocomplete(
    ctx: &Context,
    autocomplete: CommandInteraction,
    bot: &JukeboxBot,
) -> Result<()> {
    let query = autocomplete
        .data
        .autocomplete()
        .map(|option| option.value.to_string())
        .unwrap_or_default();

    let catalog = bot.manager.catalog().snapshot();
    let response = song_choices(&catalog, &query)
        .into_iter()
        .fold(CreateAutocompleteResponse::new(), |response, (name, value)| {
            response.add_string_choice(name, value)
        });

    autocomplete
        .create_response(&ctx.http, CreateInteractionResponse::Autocomplete(response))
        .await?;

    Ok(())
}

/// Maneja interacciones con componentes (botones)
pub async fn handle_component(
    ctx: &Context,
    component: ComponentInteraction,
    bot: &JukeboxBot,
) -> Result<()> {
    buttons::handle_music_component(ctx, &component, bot).await
}

// Handlers específicos para cada comando

async fn handle_play(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &JukeboxBot,
    guild_id: GuildId,
) -> Result<()> {
    let song = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "song")
        .and_then(|opt| opt.value.as_str())
        .ok_or_else(|| anyhow::anyhow!("Canción no proporcionada"))?
        .to_string();

    // Verificar que el usuario esté en un canal de voz
    let Some(channel_id) = get_user_voice_channel(ctx, guild_id, command.user.id) else {
        return reply(ctx, command, Err(PlaybackError::NotInVoiceChannel), Vec::new()).await;
    };

    // Defer la respuesta: el anuncio y la conexión pueden tardar
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    let edit = match bot.manager.play(guild_id, &song, channel_id, command.user.id).await {
        Ok(PlayOutcome::Started(item)) => {
            let snapshot = bot.manager.state(guild_id).await;
            let cover = artwork::load_cover(&item.track).await;
            let components = snapshot
                .as_ref()
                .map(|s| buttons::create_player_buttons(s.paused, s.loop_mode))
                .unwrap_or_default();
            let edit = EditInteractionResponse::new()
                .embed(embeds::create_now_playing_embed(&item, snapshot.as_ref(), cover.as_ref()))
                .components(components);
            attach_cover(edit, cover)
        }
        Ok(PlayOutcome::Queued { position, item }) => {
            let cover = artwork::load_cover(&item.track).await;
            let edit = EditInteractionResponse::new()
                .embed(embeds::create_track_added_embed(&item, position, cover.as_ref()));
            attach_cover(edit, cover)
        }
        Err(e) => {
            debug!("/play rechazado en guild {}: {}", guild_id, e);
            EditInteractionResponse::new().embed(error_embed(&e))
        }
    };

    command.edit_response(&ctx.http, edit).await?;
    Ok(())
}

async fn handle_queue(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &JukeboxBot,
    guild_id: GuildId,
) -> Result<()> {
    let page = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "page")
        .and_then(|opt| opt.value.as_i64())
        .unwrap_or(1)
        .max(1) as usize;

    let Some(snapshot) = bot.manager.state(guild_id).await else {
        let embed = embeds::create_info_embed(
            "Cola vacía",
            "😴 No hay nada en reproducción\n\n💡 Usa `/play <canción>` para empezar",
        );
        return reply(ctx, command, Ok(embed), Vec::new()).await;
    };

    let queue_page = snapshot.page(page, embeds::ITEMS_PER_PAGE);
    let embed = embeds::create_queue_embed(&snapshot, queue_page.current_page);
    let components = buttons::create_queue_navigation(queue_page.current_page, queue_page.total_pages);

    reply(ctx, command, Ok(embed), components).await
}

async fn handle_nowplaying(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &JukeboxBot,
    guild_id: GuildId,
) -> Result<()> {
    let snapshot = bot.manager.state(guild_id).await;

    match snapshot.as_ref().and_then(|s| s.now_playing.as_ref().map(|item| (s, item))) {
        Some((snapshot, item)) => {
            let cover = artwork::load_cover(&item.track).await;
            let embed = embeds::create_now_playing_embed(item, Some(snapshot), cover.as_ref());
            let mut message = CreateInteractionResponseMessage::new()
                .embed(embed)
                .components(buttons::create_player_buttons(snapshot.paused, snapshot.loop_mode));
            if let Some(cover) = cover {
                let file_name = cover.file_name();
                message = message.add_file(CreateAttachment::bytes(cover.data, file_name));
            }

            command
                .create_response(&ctx.http, CreateInteractionResponse::Message(message))
                .await?;
            Ok(())
        }
        None => {
            let embed = embeds::create_info_embed("Nada en reproducción", "😴 No hay nada sonando ahora mismo");
            reply(ctx, command, Ok(embed), Vec::new()).await
        }
    }
}

// Funciones auxiliares

/// Adjunta la portada a la que apunta la miniatura del embed
fn attach_cover(edit: EditInteractionResponse, cover: Option<artwork::Cover>) -> EditInteractionResponse {
    match cover {
        Some(cover) => {
            let file_name = cover.file_name();
            edit.new_attachment(CreateAttachment::bytes(cover.data, file_name))
        }
        None => edit,
    }
}

/// Responde con el embed de éxito o con el error (efímero)
async fn reply(
    ctx: &Context,
    command: &CommandInteraction,
    result: PlaybackResult<CreateEmbed>,
    components: Vec<CreateActionRow>,
) -> Result<()> {
    let message = match result {
        Ok(embed) => CreateInteractionResponseMessage::new()
            .embed(embed)
            .components(components),
        Err(e) => {
            debug!("/{} rechazado: {}", command.data.name, e);
            CreateInteractionResponseMessage::new()
                .embed(error_embed(&e))
                .ephemeral(true)
        }
    };

    command
        .create_response(&ctx.http, CreateInteractionResponse::Message(message))
        .await?;

    Ok(())
}

fn error_embed(error: &PlaybackError) -> CreateEmbed {
    let title = match error {
        PlaybackError::CatalogMiss(_) => "Canción no encontrada",
        PlaybackError::NotInVoiceChannel | PlaybackError::DifferentChannel => "Canal de voz",
        PlaybackError::QueueFull(_) => "Cola llena",
        PlaybackError::Transport(_) => "Error de reproducción",
        PlaybackError::InvalidStateTransition(_) | PlaybackError::PlayerGone => "No disponible",
    };
    embeds::create_error_embed(title, &error.to_string())
}

fn get_user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = match guild_id.to_guild_cached(&ctx.cache) {
        Some(guild) => guild,
        None => {
            warn!("Guild {} no encontrada en caché", guild_id);
            return None;
        }
    };

    guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
}

/// Pares (nombre, valor) para el autocompletado de `/play`
///
/// El valor es lo que luego recibe `Catalog::resolve`: el nombre mostrado
/// si cabe, o el id de la pista si no.
pub fn song_choices(catalog: &Catalog, query: &str) -> Vec<(String, String)> {
    catalog
        .search(query, AUTOCOMPLETE_LIMIT)
        .into_iter()
        .filter_map(|track| {
            let display = track.display_name();
            let value = if display.chars().count() <= CHOICE_MAX_LEN {
                display.clone()
            } else if track.id.chars().count() <= CHOICE_MAX_LEN {
                track.id.clone()
            } else {
                return None;
            };
            let name: String = display.chars().take(CHOICE_MAX_LEN).collect();
            Some((name, value))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::TrackDescriptor;
    use pretty_assertions::assert_eq;

    fn catalog() -> Catalog {
        Catalog::new(vec![
            TrackDescriptor::new("/songs/blue_monday.mp3", "Blue Monday", "New Order", 448),
            TrackDescriptor::new("/songs/ceremony.mp3", "Ceremony", "New Order", 264),
            TrackDescriptor::new("/songs/atmosphere.mp3", "Atmosphere", "Joy Division", 250),
        ])
    }

    #[test]
    fn test_song_choices_resolve_back() {
        let catalog = catalog();
        let choices = song_choices(&catalog, "new order");

        assert_eq!(choices.len(), 2);
        for (_, value) in &choices {
            assert!(catalog.resolve(value).is_some());
        }
    }

    #[test]
    fn test_long_names_fall_back_to_id() {
        let title = "x".repeat(120);
        let catalog = Catalog::new(vec![TrackDescriptor::new("/songs/long.mp3", &title, "Artista", 60)]);

        let choices = song_choices(&catalog, "");
        assert_eq!(choices.len(), 1);
        assert_eq!(choices[0].0.chars().count(), CHOICE_MAX_LEN);
        assert_eq!(choices[0].1, "/songs/long.mp3");
    }
}
