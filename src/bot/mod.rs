//! # Bot Module
//!
//! Discord gateway glue for Open Queue.
//!
//! This module contains:
//! - Command registration (global or per-guild)
//! - Command and component routing
//! - The `/play` adapter that renders [`PlayFlow`] outcomes and bounds the
//!   selection and action windows with component collectors
//! - Voice state tracking
//!
//! ## Architecture
//!
//! [`OpenQueueBot`] implements Serenity's [`EventHandler`]. It owns no session
//! state itself: sessions live in the [`PlayFlow`] cache and playback lives in
//! [`SongbirdPlayers`]. Both are shared with the collector tasks spawned per
//! `/play` response.

use anyhow::Result;
use serenity::{
    all::{Context, EventHandler, GuildId, Interaction, Ready, VoiceState},
    async_trait,
};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tracing::{error, info, warn};

pub mod commands;
pub mod handlers;
pub mod play;

use crate::{audio::songbird_player::SongbirdPlayers, config::Config, session::PlayFlow};

/// Main Discord event handler.
///
/// ## Fields
///
/// - `config`: Bot configuration (tokens, search defaults, timeouts)
/// - `flow`: `/play` session protocol and its TTL cache
/// - `players`: Per-guild Songbird players
/// - `maintenance_started`: Set once the housekeeping loop is running
pub struct OpenQueueBot {
    config: Arc<Config>,
    pub flow: Arc<PlayFlow>,
    pub players: Arc<SongbirdPlayers>,
    maintenance_started: AtomicBool,
}

impl OpenQueueBot {
    pub fn new(config: Config, flow: Arc<PlayFlow>, players: Arc<SongbirdPlayers>) -> Self {
        Self {
            config: Arc::new(config),
            flow,
            players,
            maintenance_started: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Registers slash commands with Discord.
    ///
    /// Guild commands propagate almost immediately and are meant for
    /// development; global commands can take up to an hour.
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registrando comandos slash...");
        info!("🔧 Application ID: {}", self.config.application_id);

        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::new(guild_id);
                info!("🏠 Registrando comandos para guild específica: {}", guild_id);

                commands::register_guild_commands(ctx, guild_id)
                    .await
                    .map_err(|e| {
                        error!("❌ Error registrando comandos de guild: {:?}", e);
                        anyhow::anyhow!("No se pudieron registrar comandos de guild. Verifica que el bot tenga permisos de 'applications.commands' en la guild.")
                    })?;
                info!("✅ Comandos de guild registrados para: {}", guild_id);
            }
            None => {
                info!("🌐 Registrando comandos globalmente");
                commands::register_global_commands(ctx).await.map_err(|e| {
                    error!("❌ Error registrando comandos globales: {:?}", e);
                    anyhow::anyhow!("No se pudieron registrar comandos globales. Verifica que el bot tenga permisos de 'applications.commands'.")
                })?;
                info!("✅ Comandos globales registrados");
            }
        }

        Ok(())
    }
}

#[async_trait]
impl EventHandler for OpenQueueBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error al registrar comandos: {:?}", e);
        }

        // `ready` se repite tras cada re-identify
        if first_start(&self.maintenance_started) {
            let players = self.players.clone();
            tokio::spawn(async move {
                maintenance_tasks(players).await;
            });
        }
    }

    /// Routes interactions; errors are logged and never reach the gateway loop.
    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        match interaction {
            Interaction::Command(command_interaction) => {
                if let Err(e) = handlers::handle_command(&ctx, command_interaction, self).await {
                    error!("Error manejando comando: {:?}", e);
                }
            }
            Interaction::Component(component_interaction) => {
                if let Err(e) =
                    handlers::handle_component(&ctx, component_interaction, self).await
                {
                    error!("Error manejando componente: {:?}", e);
                }
            }
            _ => {}
        }
    }

    /// Forgets the guild player when the bot is disconnected from voice.
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let current_user_id = ctx.cache.current_user().id;
        if new.user_id != current_user_id || old.is_none() || new.channel_id.is_some() {
            return;
        }

        if let Some(guild_id) = new.guild_id {
            info!("🔌 Bot desconectado en guild {}", guild_id);
            self.players.forget(guild_id);
        }
    }
}

/// Returns `true` only for the first caller.
fn first_start(flag: &AtomicBool) -> bool {
    !flag.swap(true, Ordering::SeqCst)
}

/// Periodic housekeeping: checks that yt-dlp is still runnable.
async fn maintenance_tasks(players: Arc<SongbirdPlayers>) {
    let mut interval = tokio::time::interval(Duration::from_secs(3600)); // Cada hora

    loop {
        interval.tick().await;

        if let Err(e) = players.search().verify().await {
            warn!("Error verificando dependencias: {:?}", e);
        }

        info!("🧹 Tareas de mantenimiento completadas");
    }
}
