use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};
use std::time::Duration;

use crate::{audio::Track, session::SearchResults};

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
}

/// Footer estandarizado para todos los embeds
const STANDARD_FOOTER: &str = "🎵 Open Queue";

/// Crea el embed con los candidatos de una búsqueda
pub fn create_search_results_embed(results: &SearchResults) -> CreateEmbed {
    let listing = results
        .tracks
        .iter()
        .enumerate()
        .map(|(i, track)| {
            let artist = track
                .author
                .as_deref()
                .map(|author| format!(" - {}", author))
                .unwrap_or_default();
            format!(
                "**{}**. {}{} `[{}]`",
                i + 1,
                truncate(&track.title, 80),
                artist,
                duration_label(track.duration)
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    CreateEmbed::default()
        .title("🔍 Resultados de Búsqueda")
        .description(format!(
            "Búsqueda: **{}**\nSelecciona una canción del menú inferior:",
            truncate(&results.query, 200)
        ))
        .color(colors::INFO_BLUE)
        .field("Canciones Encontradas", truncate(&listing, 1024), false)
        .footer(CreateEmbedFooter::new(format!(
            "{} • {}",
            STANDARD_FOOTER,
            results.source.display_name()
        )))
}

/// Crea el embed que confirma la canción seleccionada
pub fn create_track_queued_embed(track: &Track) -> CreateEmbed {
    CreateEmbed::default()
        .title("✅ Canción Agregada")
        .description(format!("**{}**", truncate(&track.title, 256)))
        .color(colors::SUCCESS_GREEN)
        .field(
            "🎤 Artista",
            track.author.as_deref().unwrap_or("Desconocido"),
            true,
        )
        .field("⏱️ Duración", duration_label(track.duration), true)
        .field("👤 Solicitado por", format!("<@{}>", track.requested_by), true)
        .url(&track.uri)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Duración legible; `None` es un stream en vivo o de duración desconocida
pub fn duration_label(duration: Option<Duration>) -> String {
    match duration {
        Some(duration) if !duration.is_zero() => format_duration(duration),
        _ => "🔴 En vivo".to_string(),
    }
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

/// Recorta a `max` caracteres (no bytes), terminando en "…" si hizo falta.
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max.saturating_sub(1)).collect();
    cut.push('…');
    cut
}
