use anyhow::Result;
use serenity::{
    builder::{CreateInteractionResponse, CreateInteractionResponseMessage},
    model::{
        application::{CommandInteraction, ComponentInteraction},
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use tracing::{debug, info, warn};

use super::{play, OpenQueueBot};
use crate::{
    audio::PlayerProvider,
    session::{ComponentAction, FlowError},
};

/// Maneja comandos slash
pub async fn handle_command(
    ctx: &Context,
    command: CommandInteraction,
    bot: &OpenQueueBot,
) -> Result<()> {
    let guild_id = command
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Comando usado fuera de un servidor"))?;

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    match command.data.name.as_str() {
        "join" => handle_join(ctx, &command, bot, guild_id).await?,
        "play" => play::handle_play(ctx, &command, bot, guild_id).await?,
        "skip" => handle_skip(ctx, &command, bot, guild_id).await?,
        "stop" => handle_stop(ctx, &command, bot, guild_id).await?,
        _ => {
            command
                .create_response(&ctx.http, ephemeral("❌ Comando no reconocido"))
                .await?;
        }
    }

    Ok(())
}

/// Maneja interacciones con componentes
///
/// Only selection menus are routed here. Session buttons are consumed by the
/// collector attached to their message, so answering them here would
/// acknowledge the same interaction twice.
pub async fn handle_component(
    ctx: &Context,
    component: ComponentInteraction,
    bot: &OpenQueueBot,
) -> Result<()> {
    debug!(
        "🔘 Componente {} usado por {}",
        component.data.custom_id, component.user.name
    );

    match ComponentAction::parse(&component.data.custom_id) {
        Some((action, _)) if !action.is_button() => {
            play::handle_selection(ctx, &component, bot).await
        }
        _ => Ok(()),
    }
}

async fn handle_join(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &OpenQueueBot,
    guild_id: GuildId,
) -> Result<()> {
    let voice_channel = user_voice_channel(ctx, guild_id, command.user.id);

    let content = match bot.players.player_for(guild_id, voice_channel, true).await {
        Ok(_) => "🔊 Conectado al canal de voz",
        Err(e) => {
            warn!("No se pudo conectar en guild {}: {}", guild_id, e);
            FlowError::from(e).user_message()
        }
    };

    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new().content(content),
            ),
        )
        .await?;

    Ok(())
}

async fn handle_skip(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &OpenQueueBot,
    guild_id: GuildId,
) -> Result<()> {
    let Some(player) = bot.players.existing(guild_id) else {
        command
            .create_response(&ctx.http, ephemeral(NOTHING_PLAYING))
            .await?;
        return Ok(());
    };

    let content = match player.skip().await {
        Ok(()) => "⏭️ Canción saltada",
        Err(e) => {
            warn!("Error al saltar en guild {}: {}", guild_id, e);
            FlowError::from(e).user_message()
        }
    };

    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new().content(content),
            ),
        )
        .await?;

    Ok(())
}

async fn handle_stop(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &OpenQueueBot,
    guild_id: GuildId,
) -> Result<()> {
    let Some(player) = bot.players.existing(guild_id) else {
        command
            .create_response(&ctx.http, ephemeral(NOTHING_PLAYING))
            .await?;
        return Ok(());
    };

    let result = player.destroy().await;
    bot.players.forget(guild_id);

    let content = match result {
        Ok(()) => "⏹️ Reproducción detenida",
        Err(e) => {
            warn!("Error al detener en guild {}: {}", guild_id, e);
            FlowError::from(e).user_message()
        }
    };

    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new().content(content),
            ),
        )
        .await?;

    Ok(())
}

// Funciones auxiliares

const NOTHING_PLAYING: &str = "❌ No hay nada reproduciéndose.";

/// Respuesta visible solo para quien interactuó
pub fn ephemeral(content: &str) -> CreateInteractionResponse {
    CreateInteractionResponse::Message(
        CreateInteractionResponseMessage::new()
            .content(content)
            .ephemeral(true),
    )
}

/// Canal de voz actual del usuario según la caché de la guild
pub fn user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = guild_id.to_guild_cached(&ctx.cache)?;

    guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
}
