use async_trait::async_trait;
use dashmap::DashMap;
use rand::seq::SliceRandom;
use serenity::model::id::{ChannelId, GuildId, UserId};
use songbird::{
    input::YoutubeDl,
    tracks::{PlayMode, TrackQueue},
    Call, Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::{
    future::Future,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Weak,
    },
    time::Duration,
};
use tokio::{sync::Mutex, task::JoinHandle};
use tracing::{debug, error, info, warn};

use super::{
    ytdlp::YtDlpSearch, PlaybackError, Player, PlayerProvider, SearchSource, Track,
};

/// Time the bot stays in voice after the queue runs out.
pub const IDLE_DISCONNECT: Duration = Duration::from_secs(30);

type PlayerMap = DashMap<GuildId, Arc<SongbirdPlayer>>;

/// Guild player backed by a Songbird call and its builtin queue.
pub struct SongbirdPlayer {
    guild_id: GuildId,
    channel_id: ChannelId,
    manager: Arc<Songbird>,
    http: reqwest::Client,
    search: YtDlpSearch,
    players: Weak<PlayerMap>,
    idle: IdleWatch,
}

impl SongbirdPlayer {
    fn call(&self) -> Option<Arc<Mutex<Call>>> {
        self.manager.get(self.guild_id)
    }

    async fn ensure_call(&self) -> Result<Arc<Mutex<Call>>, PlaybackError> {
        if let Some(call) = self.call() {
            return Ok(call);
        }
        self.connect().await?;
        self.call()
            .ok_or_else(|| PlaybackError::Command("llamada de voz no disponible".to_string()))
    }

    async fn queue(&self) -> Option<TrackQueue> {
        let call = self.call()?;
        let queue = call.lock().await.queue().clone();
        Some(queue)
    }
}

#[async_trait]
impl Player for SongbirdPlayer {
    async fn search(
        &self,
        query: &str,
        source: SearchSource,
        requester: UserId,
    ) -> Result<Vec<Track>, PlaybackError> {
        self.search.search(query, source, requester).await
    }

    async fn enqueue(&self, track: Track) -> Result<(), PlaybackError> {
        let call = self.ensure_call().await?;
        let input = YoutubeDl::new(self.http.clone(), track.uri.clone());

        // Una pista nueva cancela cualquier salida por inactividad pendiente
        self.idle.touch();

        let handle = {
            let mut call = call.lock().await;
            call.enqueue_input(input.into()).await
        };

        for event in [TrackEvent::Play, TrackEvent::Error] {
            handle
                .add_event(
                    Event::Track(event),
                    TrackLogger {
                        guild_id: self.guild_id,
                        title: track.title.clone(),
                    },
                )
                .map_err(|e| PlaybackError::Command(e.to_string()))?;
        }

        handle
            .add_event(
                Event::Track(TrackEvent::End),
                IdleLeaveHandler {
                    guild_id: self.guild_id,
                    manager: Arc::downgrade(&self.manager),
                    players: self.players.clone(),
                    idle: self.idle.clone(),
                    delay: IDLE_DISCONNECT,
                },
            )
            .map_err(|e| PlaybackError::Command(e.to_string()))?;

        info!("➕ Agregado a la cola de guild {}: {}", self.guild_id, track.title);
        Ok(())
    }

    async fn shuffle(&self) -> Result<usize, PlaybackError> {
        let Some(queue) = self.queue().await else {
            return Ok(0);
        };

        // La cabeza de la cola es la pista en reproducción; solo se mezclan las siguientes
        let shuffled = queue.modify_queue(|tracks| {
            let upcoming = tracks.len().saturating_sub(1);
            if upcoming > 1 {
                tracks.make_contiguous()[1..].shuffle(&mut rand::thread_rng());
            }
            upcoming
        });

        info!("🔀 Mezcladas {} canciones en guild {}", shuffled, self.guild_id);
        Ok(shuffled)
    }

    async fn play(&self) -> Result<(), PlaybackError> {
        if let Some(queue) = self.queue().await {
            queue
                .resume()
                .map_err(|e| PlaybackError::Command(e.to_string()))?;
        }
        Ok(())
    }

    async fn is_playing(&self) -> bool {
        let Some(queue) = self.queue().await else {
            return false;
        };
        match queue.current() {
            Some(handle) => handle
                .get_info()
                .await
                .map(|info| info.playing == PlayMode::Play)
                .unwrap_or(false),
            None => false,
        }
    }

    async fn skip(&self) -> Result<(), PlaybackError> {
        let queue = self
            .queue()
            .await
            .ok_or_else(|| PlaybackError::Command("no hay reproductor activo".to_string()))?;
        queue
            .skip()
            .map_err(|e| PlaybackError::Command(e.to_string()))?;
        info!("⏭️ Canción saltada en guild {}", self.guild_id);
        Ok(())
    }

    async fn destroy(&self) -> Result<(), PlaybackError> {
        self.idle.touch();
        if let Some(queue) = self.queue().await {
            queue.stop();
        }
        self.manager
            .remove(self.guild_id)
            .await
            .map_err(|e| PlaybackError::Command(e.to_string()))?;
        info!("👋 Reproductor destruido en guild {}", self.guild_id);
        Ok(())
    }

    async fn connect(&self) -> Result<(), PlaybackError> {
        if let Some(call) = self.call() {
            if call.lock().await.current_channel().is_some() {
                return Ok(());
            }
        }

        let call = self
            .manager
            .join(self.guild_id, self.channel_id)
            .await
            .map_err(|e| PlaybackError::Command(e.to_string()))?;

        call.lock()
            .await
            .deafen(true)
            .await
            .map_err(|e| PlaybackError::Command(e.to_string()))?;

        info!("🔊 Conectado al canal de voz {} en guild {}", self.channel_id, self.guild_id);
        Ok(())
    }
}

/// Creates and tracks one [`SongbirdPlayer`] per guild.
pub struct SongbirdPlayers {
    manager: Arc<Songbird>,
    http: reqwest::Client,
    search: YtDlpSearch,
    players: Arc<PlayerMap>,
}

impl SongbirdPlayers {
    pub fn new(manager: Arc<Songbird>) -> Self {
        Self {
            manager,
            http: reqwest::Client::new(),
            search: YtDlpSearch::new(),
            players: Arc::new(DashMap::new()),
        }
    }

    pub fn search(&self) -> &YtDlpSearch {
        &self.search
    }

    /// Forgets the guild player, e.g. after the bot was disconnected externally.
    pub fn forget(&self, guild_id: GuildId) {
        if self.players.remove(&guild_id).is_some() {
            debug!("🔌 Reproductor olvidado para guild {}", guild_id);
        }
    }
}

#[async_trait]
impl PlayerProvider for SongbirdPlayers {
    async fn player_for(
        &self,
        guild_id: GuildId,
        voice_channel: Option<ChannelId>,
        connect: bool,
    ) -> Result<Arc<dyn Player>, PlaybackError> {
        let channel_id = voice_channel.ok_or(PlaybackError::NoVoiceChannel)?;

        let player = self
            .players
            .entry(guild_id)
            .or_insert_with(|| {
                Arc::new(SongbirdPlayer {
                    guild_id,
                    channel_id,
                    manager: self.manager.clone(),
                    http: self.http.clone(),
                    search: self.search.clone(),
                    players: Arc::downgrade(&self.players),
                    idle: IdleWatch::default(),
                })
            })
            .clone();

        if connect {
            player.connect().await?;
        }
        Ok(player as Arc<dyn Player>)
    }

    fn existing(&self, guild_id: GuildId) -> Option<Arc<dyn Player>> {
        self.manager.get(guild_id)?;
        self.players
            .get(&guild_id)
            .map(|player| player.clone() as Arc<dyn Player>)
    }
}

/// Logs playback start and failure of one queued track.
struct TrackLogger {
    guild_id: GuildId,
    title: String,
}

#[async_trait]
impl VoiceEventHandler for TrackLogger {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let EventContext::Track(tracks) = ctx else {
            return None;
        };

        for (state, _) in tracks.iter() {
            match &state.playing {
                PlayMode::Errored(e) => error!(
                    "❌ Error reproduciendo {} en guild {}: {:?}",
                    self.title, self.guild_id, e
                ),
                PlayMode::Play => {
                    info!("▶️ Reproduciendo en guild {}: {}", self.guild_id, self.title)
                }
                _ => {}
            }
        }
        None
    }
}

/// Schedules leaving voice once a track ends and the queue stays empty.
struct IdleLeaveHandler {
    guild_id: GuildId,
    manager: Weak<Songbird>,
    players: Weak<PlayerMap>,
    idle: IdleWatch,
    delay: Duration,
}

#[async_trait]
impl VoiceEventHandler for IdleLeaveHandler {
    async fn act(&self, _ctx: &EventContext<'_>) -> Option<Event> {
        debug!("Track terminado en guild {}", self.guild_id);

        self.idle.schedule(
            self.delay,
            leave_if_idle(self.manager.clone(), self.players.clone(), self.guild_id),
        );
        None
    }
}

/// Destroys and forgets the guild player if its queue is still empty.
async fn leave_if_idle(
    manager: Weak<Songbird>,
    players: Weak<PlayerMap>,
    guild_id: GuildId,
) -> bool {
    let (Some(manager), Some(players)) = (manager.upgrade(), players.upgrade()) else {
        return false;
    };
    let Some(call) = manager.get(guild_id) else {
        return false;
    };
    if !call.lock().await.queue().is_empty() {
        return false;
    }

    let Some(player) = players.get(&guild_id).map(|player| player.clone()) else {
        return false;
    };
    if let Err(e) = player.destroy().await {
        warn!("No se pudo salir por inactividad en guild {}: {}", guild_id, e);
        return false;
    }
    players.remove(&guild_id);

    info!("💤 Cola vacía, saliendo del canal de voz en guild {}", guild_id);
    true
}

/// Debounces idle departures for one guild.
///
/// Each [`IdleWatch::schedule`] supersedes the previous one, and
/// [`IdleWatch::touch`] cancels whatever is pending. Only the latest scheduled
/// check runs its `leave` future.
#[derive(Debug, Clone, Default)]
pub struct IdleWatch {
    generation: Arc<AtomicU64>,
}

impl IdleWatch {
    /// Invalidates pending departures.
    pub fn touch(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Runs `leave` after `delay` unless touched or rescheduled in between.
    ///
    /// The task resolves to the result of `leave`, or `false` when superseded.
    pub fn schedule<F>(&self, delay: Duration, leave: F) -> JoinHandle<bool>
    where
        F: Future<Output = bool> + Send + 'static,
    {
        let generation = self.touch();
        let current = self.generation.clone();

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if current.load(Ordering::SeqCst) != generation {
                return false;
            }
            leave.await
        })
    }
}
