use serenity::{
    all::ButtonStyle,
    builder::{
        CreateActionRow, CreateButton, CreateSelectMenu, CreateSelectMenuKind,
        CreateSelectMenuOption,
    },
};

use super::embeds::truncate;
use crate::{
    audio::Track,
    session::{ComponentAction, SessionKey},
};

/// Límite de Discord para etiquetas y descripciones de opciones
const OPTION_TEXT_LIMIT: usize = 100;

/// Menú de selección de candidatos; el valor de cada opción es su índice
pub fn create_selection_menu(key: &SessionKey, tracks: &[Track]) -> CreateActionRow {
    let options = tracks
        .iter()
        .enumerate()
        .map(|(i, track)| {
            let author = track.author.as_deref().unwrap_or("Desconocido");
            CreateSelectMenuOption::new(truncate(&track.title, OPTION_TEXT_LIMIT), i.to_string())
                .description(truncate(author, OPTION_TEXT_LIMIT))
        })
        .collect();

    let menu = CreateSelectMenu::new(
        ComponentAction::Select.custom_id(key),
        CreateSelectMenuKind::String { options },
    )
    .placeholder("Selecciona una canción para reproducir...")
    .min_values(1)
    .max_values(1);

    CreateActionRow::SelectMenu(menu)
}

/// Controles de la sesión tras seleccionar una canción
pub fn create_session_controls(key: &SessionKey) -> CreateActionRow {
    let add5 = CreateButton::new(ComponentAction::AddRelated5.custom_id(key))
        .label("+5 relacionadas")
        .emoji('➕')
        .style(ButtonStyle::Primary);

    let add10 = CreateButton::new(ComponentAction::AddRelated10.custom_id(key))
        .label("+10 relacionadas")
        .emoji('➕')
        .style(ButtonStyle::Primary);

    let shuffle = CreateButton::new(ComponentAction::Shuffle.custom_id(key))
        .label("Mezclar")
        .emoji('🔀')
        .style(ButtonStyle::Secondary);

    let cancel = CreateButton::new(ComponentAction::Cancel.custom_id(key))
        .label("Cancelar")
        .emoji('✖')
        .style(ButtonStyle::Danger);

    CreateActionRow::Buttons(vec![add5, add10, shuffle, cancel])
}
