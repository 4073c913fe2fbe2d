use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};
use std::time::Duration;

use crate::{
    audio::queue::{LoopMode, QueueSnapshot, QueuedTrack},
    library::artwork::Cover,
};

/// Canciones por página en `/queue`
pub const ITEMS_PER_PAGE: usize = 10;

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const WARNING_ORANGE: Colour = Colour::from_rgb(255, 193, 7);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
}

/// Footer estandarizado para todos los embeds
const STANDARD_FOOTER: &str = "🎵 Jukebox Bot";

pub fn loop_mode_label(mode: LoopMode) -> &'static str {
    match mode {
        LoopMode::Off => "▶️ Sin repetición",
        LoopMode::Single => "🔂 Repetir canción",
        LoopMode::Queue => "🔁 Repetir cola",
    }
}

fn requester_label(item: &QueuedTrack) -> String {
    match item.requested_by {
        Some(user) => format!("<@{}>", user),
        None => "🎲 Selección aleatoria".to_string(),
    }
}

/// Crea un embed para mostrar la canción actual
///
/// Con `cover`, la miniatura apunta al adjunto que debe viajar en el mismo mensaje.
pub fn create_now_playing_embed(
    item: &QueuedTrack,
    snapshot: Option<&QueueSnapshot>,
    cover: Option<&Cover>,
) -> CreateEmbed {
    let track = &item.track;
    let mut embed = CreateEmbed::default()
        .title("🎵 Reproduciendo Ahora")
        .description(format!("**{}**", track.title))
        .color(colors::SUCCESS_GREEN)
        .field("🎤 Artista", &track.artist, true)
        .field("⏱️ Duración", format_duration(track.duration()), true)
        .field("👤 Solicitado por", requester_label(item), true);

    if let Some(cover) = cover {
        embed = embed.thumbnail(cover.attachment_url());
    }

    if let Some(snapshot) = snapshot {
        let mut status = loop_mode_label(snapshot.loop_mode).to_string();
        if snapshot.paused {
            status.push_str(" • ⏸️ En pausa");
        }
        if snapshot.alone {
            status.push_str(" • 👤 Solo en el canal");
        }

        embed = embed
            .field("Estado", status, true)
            .field("📋 En cola", snapshot.total_items().to_string(), true);

        if let Some(started) = snapshot.play_started_at {
            embed = embed.timestamp(Timestamp::from(started));
        }
    }

    embed.footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed para mostrar que se agregó una canción
pub fn create_track_added_embed(item: &QueuedTrack, position: usize, cover: Option<&Cover>) -> CreateEmbed {
    let track = &item.track;

    let embed = CreateEmbed::default()
        .title("✅ Canción Agregada")
        .description(format!("**{}** se ha agregado a la cola de reproducción", track.title))
        .color(colors::MUSIC_PURPLE)
        .field("🎤 Artista", &track.artist, true)
        .field("⏱️ Duración", format_duration(track.duration()), true)
        .field("📍 Posición", position.to_string(), true)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(
            "🎵 Las peticiones suenan antes que la selección aleatoria",
        ));

    match cover {
        Some(cover) => embed.thumbnail(cover.attachment_url()),
        None => embed,
    }
}

/// Crea un embed para mostrar la cola de reproducción
pub fn create_queue_embed(snapshot: &QueueSnapshot, page: usize) -> CreateEmbed {
    let queue_page = snapshot.page(page, ITEMS_PER_PAGE);

    let mut embed = CreateEmbed::default()
        .title("📋 Cola de Reproducción")
        .color(colors::INFO_BLUE);

    // Canción actual
    if let Some(current) = &snapshot.now_playing {
        let status = if snapshot.paused { "⏸️" } else { "▶️" };
        embed = embed.field(
            format!("{} Reproduciendo", status),
            format!("**{}**", current.track.display_name()),
            false,
        );
    }

    if snapshot.total_items() == 0 {
        return embed
            .description("😴 **La cola está vacía**\n\n💡 Usa `/play <canción>` para agregar música")
            .color(colors::NEUTRAL_GRAY)
            .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
            .timestamp(Timestamp::now());
    }

    // Próximas canciones
    let priority_len = snapshot.priority.len();
    let mut description = String::new();
    for (i, item) in queue_page.items.iter().enumerate() {
        let position = queue_page.first_position + i;
        let marker = if position <= priority_len { "⭐" } else if item.randomly_selected { "🎲" } else { "" };

        description.push_str(&format!(
            "**{}**. {} {} `[{}]`\n",
            position,
            marker,
            item.track.display_name(),
            format_duration(item.track.duration())
        ));
    }
    embed = embed.field("Próximas canciones", description, false);

    // Información adicional
    let mut info = format!(
        "**Total:** {} canciones • **Duración:** {}",
        snapshot.total_items(),
        format_duration(snapshot.total_duration())
    );
    info.push_str(&format!(" • {}", loop_mode_label(snapshot.loop_mode)));
    embed = embed.field("Información", info, false);

    // Paginación
    if queue_page.total_pages > 1 {
        embed = embed.footer(CreateEmbedFooter::new(format!(
            "Página {} de {} • Jukebox Bot",
            queue_page.current_page, queue_page.total_pages
        )));
    } else {
        embed = embed.footer(CreateEmbedFooter::new(STANDARD_FOOTER));
    }

    embed.timestamp(Timestamp::now())
}

/// Crea un embed de error
pub fn create_error_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("❌ {}", title))
        .description(description)
        .color(colors::ERROR_RED)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed de éxito
pub fn create_success_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("✅ {}", title))
        .description(description)
        .color(colors::SUCCESS_GREEN)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed de información
pub fn create_info_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("ℹ️ {}", title))
        .description(description)
        .color(colors::WARNING_ORANGE)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Formatea una duración en formato legible
pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::TrackDescriptor;
    use std::sync::Arc;

    fn item() -> QueuedTrack {
        QueuedTrack {
            track: Arc::new(TrackDescriptor::new("/songs/ceremony.mp3", "Ceremony", "New Order", 264)),
            randomly_selected: false,
            requested_by: None,
        }
    }

    fn thumbnail_url(embed: &CreateEmbed) -> Option<String> {
        let json = serde_json::to_value(embed).unwrap();
        json["thumbnail"]["url"].as_str().map(str::to_string)
    }

    #[test]
    fn test_cover_becomes_attachment_thumbnail() {
        let cover = Cover {
            data: vec![0x89, 0x50, 0x4e, 0x47],
            media_type: "image/png".into(),
        };

        let playing = create_now_playing_embed(&item(), None, Some(&cover));
        let added = create_track_added_embed(&item(), 2, Some(&cover));

        assert_eq!(thumbnail_url(&playing).as_deref(), Some("attachment://album_art.png"));
        assert_eq!(thumbnail_url(&added).as_deref(), Some("attachment://album_art.png"));
    }

    #[test]
    fn test_no_thumbnail_without_cover() {
        assert_eq!(thumbnail_url(&create_now_playing_embed(&item(), None, None)), None);
        assert_eq!(thumbnail_url(&create_track_added_embed(&item(), 1, None)), None);
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(0)), "0:00");
        assert_eq!(format_duration(Duration::from_secs(75)), "1:15");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1:02:05");
    }

    #[test]
    fn test_loop_labels_are_distinct() {
        let labels = [LoopMode::Off, LoopMode::Single, LoopMode::Queue].map(loop_mode_label);
        assert_ne!(labels[0], labels[1]);
        assert_ne!(labels[1], labels[2]);
    }
}
