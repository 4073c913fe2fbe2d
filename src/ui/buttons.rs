use anyhow::Result;
use serenity::{
    all::{ButtonStyle, ComponentInteraction, Context},
    builder::{
        CreateActionRow, CreateButton, CreateInteractionResponse, CreateInteractionResponseMessage,
    },
};
use tracing::{debug, info};

use crate::{
    audio::queue::{LoopMode, QueueSnapshot},
    bot::JukeboxBot,
    error::PlaybackResult,
    ui::embeds::{self, ITEMS_PER_PAGE},
};

/// IDs personalizados para los botones
pub mod button_ids {
    pub const PLAY_PAUSE: &str = "music_play_pause";
    pub const SKIP: &str = "music_skip";
    pub const STOP: &str = "music_stop";
    pub const LOOP: &str = "music_loop";
    pub const QUEUE: &str = "music_queue";
    /// Prefijo de navegación; el número de página va detrás.
    pub const QUEUE_PAGE_PREFIX: &str = "queue_page_";
}

/// Acción asociada a un botón pulsado
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonAction {
    PlayPause,
    Skip,
    Stop,
    Loop,
    QueuePage(usize),
}

impl ButtonAction {
    pub fn parse(custom_id: &str) -> Option<Self> {
        match custom_id {
            button_ids::PLAY_PAUSE => Some(Self::PlayPause),
            button_ids::SKIP => Some(Self::Skip),
            button_ids::STOP => Some(Self::Stop),
            button_ids::LOOP => Some(Self::Loop),
            button_ids::QUEUE => Some(Self::QueuePage(1)),
            other => other
                .strip_prefix(button_ids::QUEUE_PAGE_PREFIX)
                .and_then(|page| page.parse::<usize>().ok())
                .filter(|page| *page >= 1)
                .map(Self::QueuePage),
        }
    }
}

/// Controles del reproductor que acompañan al mensaje de "Reproduciendo Ahora"
pub fn create_player_buttons(paused: bool, loop_mode: LoopMode) -> Vec<CreateActionRow> {
    let (play_pause_emoji, play_pause_style) = if paused {
        ('▶', ButtonStyle::Success)
    } else {
        ('⏸', ButtonStyle::Primary)
    };

    let (loop_emoji, loop_style) = match loop_mode {
        LoopMode::Off => ('🔁', ButtonStyle::Secondary),
        LoopMode::Single => ('🔂', ButtonStyle::Success),
        LoopMode::Queue => ('🔁', ButtonStyle::Success),
    };

    vec![CreateActionRow::Buttons(vec![
        CreateButton::new(button_ids::PLAY_PAUSE)
            .emoji(play_pause_emoji)
            .style(play_pause_style),
        CreateButton::new(button_ids::SKIP)
            .emoji('⏭')
            .style(ButtonStyle::Secondary),
        CreateButton::new(button_ids::STOP)
            .emoji('⏹')
            .style(ButtonStyle::Danger),
        CreateButton::new(button_ids::LOOP)
            .emoji(loop_emoji)
            .style(loop_style),
        CreateButton::new(button_ids::QUEUE)
            .emoji('📋')
            .style(ButtonStyle::Secondary),
    ])]
}

/// Botones anterior/siguiente para `/queue`; vacío si sólo hay una página
pub fn create_queue_navigation(current_page: usize, total_pages: usize) -> Vec<CreateActionRow> {
    if total_pages <= 1 {
        return Vec::new();
    }

    let prev = current_page.saturating_sub(1).max(1);
    let next = (current_page + 1).min(total_pages);

    vec![CreateActionRow::Buttons(vec![
        CreateButton::new(format!("{}{}", button_ids::QUEUE_PAGE_PREFIX, prev))
            .emoji('◀')
            .style(ButtonStyle::Secondary)
            .disabled(current_page <= 1),
        CreateButton::new(format!("{}{}", button_ids::QUEUE_PAGE_PREFIX, next))
            .emoji('▶')
            .style(ButtonStyle::Secondary)
            .disabled(current_page >= total_pages),
    ])]
}

/// Maneja las interacciones con los botones de música
pub async fn handle_music_component(
    ctx: &Context,
    interaction: &ComponentInteraction,
    bot: &JukeboxBot,
) -> Result<()> {
    let guild_id = interaction
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Componente usado fuera de un servidor"))?;

    let Some(action) = ButtonAction::parse(&interaction.data.custom_id) else {
        debug!("Botón desconocido: {}", interaction.data.custom_id);
        return respond_ephemeral(ctx, interaction, "❌ Acción no reconocida").await;
    };

    info!(
        "🔘 Botón {:?} presionado por {} en guild {}",
        action, interaction.user.name, guild_id
    );

    let manager = &bot.manager;
    let result: PlaybackResult<&'static str> = match action {
        ButtonAction::QueuePage(page) => {
            return match manager.state(guild_id).await {
                Some(snapshot) => show_queue_page(ctx, interaction, &snapshot, page).await,
                None => respond_ephemeral(ctx, interaction, "😴 No hay nada en reproducción").await,
            };
        }
        ButtonAction::PlayPause => manager
            .toggle_pause(guild_id)
            .await
            .map(|paused| if paused { "⏸️ Pausado" } else { "▶️ Reanudado" }),
        ButtonAction::Skip => manager.skip(guild_id).await.map(|_| "⏭️ Saltado"),
        ButtonAction::Stop => manager.stop(guild_id).await.map(|_| "⏹️ Detenido"),
        ButtonAction::Loop => manager.cycle_loop(guild_id).await.map(embeds::loop_mode_label),
    };

    match result {
        Ok(message) => {
            // Refrescar los controles con el estado resultante
            let components = match manager.state(guild_id).await {
                Some(snapshot) if snapshot.now_playing.is_some() => {
                    create_player_buttons(snapshot.paused, snapshot.loop_mode)
                }
                _ => Vec::new(),
            };

            interaction
                .create_response(
                    &ctx.http,
                    CreateInteractionResponse::UpdateMessage(
                        CreateInteractionResponseMessage::new()
                            .content(message)
                            .components(components),
                    ),
                )
                .await?;
        }
        Err(e) => {
            interaction
                .create_response(
                    &ctx.http,
                    CreateInteractionResponse::Message(
                        CreateInteractionResponseMessage::new()
                            .embed(embeds::create_error_embed("No se pudo completar", &e.to_string()))
                            .ephemeral(true),
                    ),
                )
                .await?;
        }
    }

    Ok(())
}

async fn show_queue_page(
    ctx: &Context,
    interaction: &ComponentInteraction,
    snapshot: &QueueSnapshot,
    page: usize,
) -> Result<()> {
    let queue_page = snapshot.page(page, ITEMS_PER_PAGE);
    let embed = embeds::create_queue_embed(snapshot, queue_page.current_page);
    let components = create_queue_navigation(queue_page.current_page, queue_page.total_pages);

    let message = CreateInteractionResponseMessage::new()
        .embed(embed)
        .components(components);

    // Desde los controles del reproductor se abre un mensaje nuevo
    let response = if interaction.data.custom_id == button_ids::QUEUE {
        CreateInteractionResponse::Message(message.ephemeral(true))
    } else {
        CreateInteractionResponse::UpdateMessage(message)
    };

    interaction.create_response(&ctx.http, response).await?;
    Ok(())
}

async fn respond_ephemeral(
    ctx: &Context,
    interaction: &ComponentInteraction,
    content: &str,
) -> Result<()> {
    interaction
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .content(content)
                    .ephemeral(true),
            ),
        )
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_control_buttons() {
        assert_eq!(ButtonAction::parse("music_play_pause"), Some(ButtonAction::PlayPause));
        assert_eq!(ButtonAction::parse("music_skip"), Some(ButtonAction::Skip));
        assert_eq!(ButtonAction::parse("music_stop"), Some(ButtonAction::Stop));
        assert_eq!(ButtonAction::parse("music_loop"), Some(ButtonAction::Loop));
        assert_eq!(ButtonAction::parse("music_queue"), Some(ButtonAction::QueuePage(1)));
    }

    #[test]
    fn test_parse_queue_pages() {
        assert_eq!(ButtonAction::parse("queue_page_3"), Some(ButtonAction::QueuePage(3)));
        assert_eq!(ButtonAction::parse("queue_page_0"), None);
        assert_eq!(ButtonAction::parse("queue_page_x"), None);
        assert_eq!(ButtonAction::parse("music_volume_up"), None);
    }

    #[test]
    fn test_navigation_only_with_several_pages() {
        assert!(create_queue_navigation(1, 1).is_empty());
        assert_eq!(create_queue_navigation(2, 3).len(), 1);
    }
}
