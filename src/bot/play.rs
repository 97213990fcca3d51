//! `/play` adapter: renders [`PlayFlow`] outcomes on Discord.
//!
//! One `/play` response goes through two listening windows, each bounded by
//! the configured component timeout:
//!
//! 1. **Selection**: the global handler processes the menu event, while a
//!    collector only watches for the window closing without a selection.
//! 2. **Actions**: after a selection, a collector scoped to the response
//!    message handles the follow-up buttons until cancel, a terminal error or
//!    the timeout.
//!
//! Every exit path deletes the session and finalizes the message (content
//! replaced, components removed, embeds kept).

use anyhow::Result;
use futures::StreamExt;
use serenity::{
    builder::{
        CreateInteractionResponse, CreateInteractionResponseFollowup,
        CreateInteractionResponseMessage, EditInteractionResponse, EditMessage,
    },
    collector::ComponentInteractionCollector,
    model::{
        application::{CommandInteraction, ComponentInteraction, ComponentInteractionDataKind},
        id::{ChannelId, GuildId, MessageId, UserId},
    },
    prelude::Context,
};
use std::{sync::Arc, time::Duration};
use tracing::{debug, error, info, warn};

use super::{
    handlers::{ephemeral, user_voice_channel},
    OpenQueueBot,
};
use crate::{
    audio::{songbird_player::SongbirdPlayers, PlayerProvider},
    session::{
        ActionEvent, ActionOutcome, ComponentAction, FlowError, PlayFlow, SelectionEvent,
        SessionKey,
    },
    ui::{components, embeds},
};

const NOT_YOUR_MENU: &str = "❌ Este menú no es para ti.";
const SELECTION_TIMED_OUT: &str = "⌛ Tiempo agotado para seleccionar una canción.";
const CONTROLS_TIMED_OUT: &str = "⌛ Los controles expiraron.";
const SESSION_CANCELLED: &str = "❌ Sesión cancelada.";
const CONTROLS_FAILED: &str = "❌ Los controles dejaron de responder.";

/// Response message a session is bound to.
#[derive(Debug, Clone, Copy)]
struct Rendered {
    channel_id: ChannelId,
    message_id: MessageId,
}

/// `/play query:<string>`: search, then offer the candidates in a menu.
pub async fn handle_play(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &OpenQueueBot,
    guild_id: GuildId,
) -> Result<()> {
    let query = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "query")
        .and_then(|opt| opt.value.as_str())
        .ok_or_else(|| anyhow::anyhow!("Query no proporcionado"))?;

    // Defer la respuesta ya que la búsqueda puede tomar tiempo
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    let voice_channel = user_voice_channel(ctx, guild_id, command.user.id);
    let results = match bot.players.player_for(guild_id, voice_channel, false).await {
        Ok(player) => bot.flow.search(&*player, query, command.user.id).await,
        Err(e) => Err(FlowError::from(e)),
    };

    let results = match results {
        Ok(results) => results,
        Err(error) => {
            info!("🔎 /play sin sesión para {}: {}", command.user.name, error);
            command
                .edit_response(
                    &ctx.http,
                    EditInteractionResponse::new().content(error.user_message()),
                )
                .await?;
            return Ok(());
        }
    };

    // El id del mensaje de respuesta forma parte de la clave de sesión
    let message = command.get_response(&ctx.http).await?;
    let rendered = Rendered {
        channel_id: message.channel_id,
        message_id: message.id,
    };

    let embed = embeds::create_search_results_embed(&results);
    let key = bot
        .flow
        .open(guild_id, command.user.id, message.id, results.clone());

    let rendered_menu = command
        .edit_response(
            &ctx.http,
            EditInteractionResponse::new()
                .embed(embed)
                .components(vec![components::create_selection_menu(&key, &results.tracks)]),
        )
        .await;
    discard_on_failure(&bot.flow, &key, rendered_menu)?;

    tokio::spawn(watch_selection(
        ctx.clone(),
        bot.flow.clone(),
        key,
        command.user.id,
        rendered,
        bot.config().component_timeout,
    ));

    Ok(())
}

/// Closes the selection window if the owner never picks a track.
async fn watch_selection(
    ctx: Context,
    flow: Arc<PlayFlow>,
    key: SessionKey,
    owner: UserId,
    rendered: Rendered,
    timeout: Duration,
) {
    let selected = ComponentInteractionCollector::new(&ctx.shard)
        .message_id(rendered.message_id)
        .custom_ids(vec![ComponentAction::Select.custom_id(&key)])
        .author_id(owner)
        .timeout(timeout)
        .next()
        .await;

    if close_selection_window(&flow, &key, selected.is_some()) {
        finalize(&ctx, rendered, SELECTION_TIMED_OUT).await;
    }
}

/// Ends the selection window; returns whether the menu must be finalized.
///
/// The session may already be gone through its own TTL, the menu is still
/// finalized so it never stays clickable.
fn close_selection_window(flow: &PlayFlow, key: &SessionKey, selected: bool) -> bool {
    // Con selección, el handler global se encarga del resto
    if selected {
        return false;
    }

    if flow.expire(key) {
        info!("⌛ Selección expirada para {}", key);
    } else {
        debug!("⌛ Sesión {} ya no estaba en caché al cerrar el menú", key);
    }
    true
}

/// Drops the session when its response could not be rendered.
fn discard_on_failure<T, E>(
    flow: &PlayFlow,
    key: &SessionKey,
    result: Result<T, E>,
) -> Result<T, E> {
    if result.is_err() {
        warn!("❌ No se pudo mostrar el menú de {}, sesión descartada", key);
        flow.expire(key);
    }
    result
}

/// Selection menu event from the global component handler.
pub async fn handle_selection(
    ctx: &Context,
    component: &ComponentInteraction,
    bot: &OpenQueueBot,
) -> Result<()> {
    let guild_id = component
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Interacción fuera de un servidor"))?;

    let value = match &component.data.kind {
        ComponentInteractionDataKind::StringSelect { values } => {
            values.first().map(String::as_str)
        }
        _ => None,
    };

    let event = SelectionEvent {
        guild_id,
        user_id: component.user.id,
        message_id: component.message.id,
        custom_id: &component.data.custom_id,
        value,
        voice_channel: user_voice_channel(ctx, guild_id, component.user.id),
    };

    match bot.flow.authorize_selection(&event) {
        Ok(Some(_)) => {}
        Ok(None) => return Ok(()),
        Err(FlowError::OwnershipMismatch) => {
            debug!("Menú de {} usado por {}", component.data.custom_id, component.user.name);
            component
                .create_response(&ctx.http, ephemeral(NOT_YOUR_MENU))
                .await?;
            return Ok(());
        }
        Err(error) => {
            component
                .create_response(&ctx.http, ephemeral(error.user_message()))
                .await?;
            return Ok(());
        }
    }

    component
        .create_response(&ctx.http, CreateInteractionResponse::Acknowledge)
        .await?;

    match bot.flow.select(&event, &*bot.players).await {
        Ok(Some(selection)) => {
            component
                .edit_response(
                    &ctx.http,
                    EditInteractionResponse::new()
                        .content("")
                        .embed(embeds::create_track_queued_embed(&selection.track))
                        .components(vec![components::create_session_controls(&selection.key)]),
                )
                .await?;

            let rendered = Rendered {
                channel_id: component.channel_id,
                message_id: component.message.id,
            };
            tokio::spawn(run_session_controls(
                ctx.clone(),
                bot.flow.clone(),
                bot.players.clone(),
                selection.key,
                component.user.id,
                rendered,
                bot.config().component_timeout,
            ));
        }
        Ok(None) => {}
        Err(error) => {
            warn!("❌ Selección fallida para {}: {}", component.user.name, error);
            component
                .edit_response(
                    &ctx.http,
                    EditInteractionResponse::new()
                        .content(error.user_message())
                        .components(vec![]),
                )
                .await?;
        }
    }

    Ok(())
}

/// Listens for follow-up buttons on a rendered session.
async fn run_session_controls(
    ctx: Context,
    flow: Arc<PlayFlow>,
    players: Arc<SongbirdPlayers>,
    key: SessionKey,
    owner: UserId,
    rendered: Rendered,
    timeout: Duration,
) {
    let mut interactions = Box::pin(
        ComponentInteractionCollector::new(&ctx.shard)
            .message_id(rendered.message_id)
            .timeout(timeout)
            .stream(),
    );

    while let Some(interaction) = interactions.next().await {
        match handle_control(&ctx, &flow, &*players, &key, owner, &interaction).await {
            Ok(true) => {}
            Ok(false) => return,
            Err(e) => {
                error!("Error en controles de {}: {:?}", key, e);
                flow.expire(&key);
                finalize(&ctx, rendered, CONTROLS_FAILED).await;
                return;
            }
        }
    }

    flow.expire(&key);
    debug!("⌛ Controles expirados para {}", key);
    finalize(&ctx, rendered, CONTROLS_TIMED_OUT).await;
}

/// Handles one button press; returns whether to keep listening.
async fn handle_control(
    ctx: &Context,
    flow: &PlayFlow,
    players: &dyn PlayerProvider,
    key: &SessionKey,
    owner: UserId,
    interaction: &ComponentInteraction,
) -> Result<bool> {
    let guild_id = interaction
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Interacción fuera de un servidor"))?;

    let event = ActionEvent {
        guild_id,
        user_id: interaction.user.id,
        custom_id: &interaction.data.custom_id,
        voice_channel: user_voice_channel(ctx, guild_id, interaction.user.id),
    };

    if flow.route_action(event.custom_id, key).is_none() {
        return Ok(true);
    }

    // Aviso visible para otros usuarios, sin tocar la sesión
    if let Err(error) = flow.authorize_action(owner, event.user_id) {
        interaction
            .create_response(&ctx.http, ephemeral(error.user_message()))
            .await?;
        return Ok(true);
    }

    interaction
        .create_response(&ctx.http, CreateInteractionResponse::Acknowledge)
        .await?;

    let (content, keep_listening) = match flow.act(key, owner, &event, players).await {
        Ok(Some(outcome)) => (outcome_message(outcome), !outcome.is_terminal()),
        Ok(None) => return Ok(true),
        Err(error) if error.is_terminal() => {
            warn!("❌ Acción fallida en {}: {}", key, error);
            (error.user_message().to_string(), false)
        }
        Err(error) => {
            interaction
                .create_followup(
                    &ctx.http,
                    CreateInteractionResponseFollowup::new()
                        .content(error.user_message())
                        .ephemeral(true),
                )
                .await?;
            return Ok(true);
        }
    };

    let mut edit = EditInteractionResponse::new().content(content);
    if !keep_listening {
        edit = edit.components(vec![]);
    }
    interaction.edit_response(&ctx.http, edit).await?;

    Ok(keep_listening)
}

fn outcome_message(outcome: ActionOutcome) -> String {
    match outcome {
        ActionOutcome::Added(added) => {
            format!("➕ Se agregaron {} canciones relacionadas a la cola.", added)
        }
        ActionOutcome::Shuffled(shuffled) => {
            format!("🔀 Se mezclaron {} canciones de la cola.", shuffled)
        }
        ActionOutcome::Cancelled => SESSION_CANCELLED.to_string(),
    }
}

/// Replaces the message content and removes its components; embeds stay.
async fn finalize(ctx: &Context, rendered: Rendered, content: &str) {
    let edit = EditMessage::new().content(content).components(vec![]);

    if let Err(e) = rendered
        .channel_id
        .edit_message(&ctx.http, rendered.message_id, edit)
        .await
    {
        warn!("No se pudo finalizar el mensaje {}: {:?}", rendered.message_id, e);
    }
}
