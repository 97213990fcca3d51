//! Session protocol for `/play`.
//!
//! [`PlayFlow`] owns the session cache and drives every transition: opening a
//! session after a search, queueing the selected candidate, follow-up actions
//! and expiry. It never touches Discord directly; the bot layer renders the
//! returned outcomes and errors, which keeps the protocol testable with mocks.
//!
//! Each step validates before it mutates: ownership first (no cache access on
//! mismatch), then session presence, then the step-specific checks. Any failure
//! after ownership has been established deletes the session so a broken flow
//! cannot be retried against stale state.

use serenity::model::id::{ChannelId, GuildId, MessageId, UserId};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::{ComponentAction, Session, SessionKey, SessionState, SessionStore};
use crate::audio::{PlaybackError, Player, PlayerProvider, SearchSource, Track};

/// Errores del protocolo de sesión
#[derive(Debug, Error)]
pub enum FlowError {
    #[error("search returned no results")]
    NoResults,
    #[error("interaction belongs to another user")]
    OwnershipMismatch,
    #[error("session expired or was never created")]
    SessionExpired,
    #[error("selection is out of range")]
    InvalidSelection,
    #[error("session has no selected track")]
    MissingSelection,
    #[error("user is not in a voice channel")]
    NoVoiceChannel,
    #[error(transparent)]
    Playback(PlaybackError),
}

impl From<PlaybackError> for FlowError {
    fn from(error: PlaybackError) -> Self {
        match error {
            PlaybackError::NoVoiceChannel => FlowError::NoVoiceChannel,
            other => FlowError::Playback(other),
        }
    }
}

impl FlowError {
    /// Whether the rendered response should be finalized and its listener stopped.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, FlowError::OwnershipMismatch)
    }

    /// Short message shown to the user; internal detail stays in the logs.
    pub fn user_message(&self) -> &'static str {
        match self {
            FlowError::NoResults => "❌ No se encontraron resultados.",
            FlowError::OwnershipMismatch => "❌ Este control pertenece a otro usuario.",
            FlowError::SessionExpired => "⌛ Esta sesión de /play expiró.",
            FlowError::InvalidSelection => "❌ Selección inválida.",
            FlowError::MissingSelection => "❌ Falta el contexto de la canción seleccionada.",
            FlowError::NoVoiceChannel => "❌ Únete primero a un canal de voz.",
            FlowError::Playback(_) => "❌ No se pudo completar la acción.",
        }
    }
}

/// Tunables for the protocol.
#[derive(Debug, Clone)]
pub struct FlowSettings {
    /// Maximum candidates offered in the selection menu
    pub max_results: usize,
    pub default_source: SearchSource,
}

/// Successful search, ready to become a session.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResults {
    pub source: SearchSource,
    pub query: String,
    pub tracks: Vec<Track>,
}

/// A selection-menu event as seen by the protocol.
#[derive(Debug, Clone)]
pub struct SelectionEvent<'a> {
    pub guild_id: GuildId,
    pub user_id: UserId,
    /// Message the menu is attached to
    pub message_id: MessageId,
    pub custom_id: &'a str,
    /// First selected option value
    pub value: Option<&'a str>,
    pub voice_channel: Option<ChannelId>,
}

/// A button press on a session's action row.
#[derive(Debug, Clone)]
pub struct ActionEvent<'a> {
    pub guild_id: GuildId,
    pub user_id: UserId,
    pub custom_id: &'a str,
    pub voice_channel: Option<ChannelId>,
}

/// Track queued by a successful selection.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub key: SessionKey,
    pub track: Track,
}

/// Follow-up actions available once a track is selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowUp {
    AddRelated(usize),
    Shuffle,
    Cancel,
}

impl FollowUp {
    fn from_action(action: ComponentAction) -> Option<Self> {
        match action {
            ComponentAction::Select => None,
            ComponentAction::Shuffle => Some(FollowUp::Shuffle),
            ComponentAction::Cancel => Some(FollowUp::Cancel),
            related => related.related_amount().map(FollowUp::AddRelated),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    Added(usize),
    Shuffled(usize),
    Cancelled,
}

impl ActionOutcome {
    pub fn is_terminal(self) -> bool {
        self == ActionOutcome::Cancelled
    }
}

/// Splits `yt:` / `sc:` source prefixes off a raw query.
pub fn parse_query(raw: &str, default_source: SearchSource) -> (SearchSource, String) {
    let query = raw.trim();

    for (prefix, source) in [("yt:", SearchSource::YouTube), ("sc:", SearchSource::SoundCloud)] {
        let matches = query
            .get(..prefix.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(prefix));
        if matches {
            return (source, query[prefix.len()..].trim().to_string());
        }
    }

    (default_source, query.to_string())
}

/// Search query used to find tracks related to `track`.
fn related_query(track: &Track) -> String {
    format!("{} {}", track.author.as_deref().unwrap_or_default(), track.title)
        .trim()
        .to_string()
}

/// Orchestrates `/play` sessions over an owned [`SessionStore`].
pub struct PlayFlow {
    sessions: SessionStore,
    settings: FlowSettings,
}

impl PlayFlow {
    pub fn new(sessions: SessionStore, settings: FlowSettings) -> Self {
        Self { sessions, settings }
    }

    /// SEARCHING: runs the search and keeps at most `max_results` candidates.
    pub async fn search(
        &self,
        player: &dyn Player,
        raw_query: &str,
        requester: UserId,
    ) -> Result<SearchResults, FlowError> {
        let (source, query) = parse_query(raw_query, self.settings.default_source);
        if query.is_empty() {
            return Err(FlowError::NoResults);
        }

        info!("🔎 Búsqueda source={} query=\"{}\"", source, query);
        let mut tracks = player.search(&query, source, requester).await?;
        tracks.truncate(self.settings.max_results);

        if tracks.is_empty() {
            return Err(FlowError::NoResults);
        }

        Ok(SearchResults {
            source,
            query,
            tracks,
        })
    }

    /// SEARCHING → AWAITING_SELECTION: caches the candidates under the key of
    /// the response message that will carry the menu.
    pub fn open(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        message_id: MessageId,
        results: SearchResults,
    ) -> SessionKey {
        let key = SessionKey::derive(guild_id, user_id, message_id);
        let session = Session::new(results.tracks, results.source, results.query);

        self.sessions.set(key.as_str(), session);
        debug!("🗂️ Sesión abierta: {}", key);
        key
    }

    /// Checks a selection event against the key re-derived from its own ids.
    ///
    /// `Ok(None)` means the custom id is not a session menu and the event is
    /// ignored. Does not read or write the cache.
    pub fn authorize_selection(
        &self,
        event: &SelectionEvent<'_>,
    ) -> Result<Option<SessionKey>, FlowError> {
        let Some((ComponentAction::Select, key)) = ComponentAction::parse(event.custom_id) else {
            return Ok(None);
        };

        let expected = SessionKey::derive(event.guild_id, event.user_id, event.message_id);
        if key != expected {
            return Err(FlowError::OwnershipMismatch);
        }
        Ok(Some(key))
    }

    /// AWAITING_SELECTION → ACTIVE.
    ///
    /// `Ok(None)` for foreign custom ids and for menus whose session already has
    /// a selection (stale UI).
    pub async fn select(
        &self,
        event: &SelectionEvent<'_>,
        provider: &dyn PlayerProvider,
    ) -> Result<Option<Selection>, FlowError> {
        let Some(key) = self.authorize_selection(event)? else {
            return Ok(None);
        };

        let session = self
            .sessions
            .get(key.as_str())
            .ok_or(FlowError::SessionExpired)?;
        if session.state() == SessionState::Active {
            debug!("Selección repetida ignorada para {}", key);
            return Ok(None);
        }

        match self.queue_selection(&key, session, event, provider).await {
            Ok(track) => Ok(Some(Selection { key, track })),
            Err(error) => {
                self.sessions.delete(key.as_str());
                Err(error)
            }
        }
    }

    async fn queue_selection(
        &self,
        key: &SessionKey,
        session: Session,
        event: &SelectionEvent<'_>,
        provider: &dyn PlayerProvider,
    ) -> Result<Track, FlowError> {
        let track = event
            .value
            .and_then(|value| value.parse::<usize>().ok())
            .and_then(|index| session.candidate(index))
            .cloned()
            .ok_or(FlowError::InvalidSelection)?;

        let player = provider
            .player_for(event.guild_id, event.voice_channel, true)
            .await?;

        player.enqueue(track.clone()).await?;
        if !player.is_playing().await {
            player.play().await?;
        }

        let session = Session {
            selected: Some(track.clone()),
            ..session
        };
        self.sessions
            .set_with_ttl(key.as_str(), session, self.sessions.default_ttl());

        info!("✅ Seleccionado \"{}\" en sesión {}", track.title, key);
        Ok(track)
    }

    /// Maps a button custom id to a follow-up for the session `key`.
    ///
    /// Returns `None` for ids that carry another key or no recognized prefix.
    pub fn route_action(&self, custom_id: &str, key: &SessionKey) -> Option<FollowUp> {
        let (action, embedded) = ComponentAction::parse(custom_id)?;
        if &embedded != key {
            return None;
        }
        FollowUp::from_action(action)
    }

    /// Ownership check for follow-ups; `owner` is the user who made the selection.
    pub fn authorize_action(&self, owner: UserId, actor: UserId) -> Result<(), FlowError> {
        if owner == actor {
            Ok(())
        } else {
            Err(FlowError::OwnershipMismatch)
        }
    }

    /// ACTIVE: runs one follow-up action.
    ///
    /// `Ok(None)` when the custom id does not belong to this session.
    pub async fn act(
        &self,
        key: &SessionKey,
        owner: UserId,
        event: &ActionEvent<'_>,
        provider: &dyn PlayerProvider,
    ) -> Result<Option<ActionOutcome>, FlowError> {
        let Some(follow_up) = self.route_action(event.custom_id, key) else {
            return Ok(None);
        };
        self.authorize_action(owner, event.user_id)?;

        let session = self
            .sessions
            .get(key.as_str())
            .ok_or(FlowError::SessionExpired)?;

        if follow_up == FollowUp::Cancel {
            self.sessions.delete(key.as_str());
            info!("❌ Sesión cancelada: {}", key);
            return Ok(Some(ActionOutcome::Cancelled));
        }

        match self
            .run_follow_up(key, session, follow_up, event, provider)
            .await
        {
            Ok(outcome) => Ok(Some(outcome)),
            Err(error) => {
                self.sessions.delete(key.as_str());
                Err(error)
            }
        }
    }

    async fn run_follow_up(
        &self,
        key: &SessionKey,
        session: Session,
        follow_up: FollowUp,
        event: &ActionEvent<'_>,
        provider: &dyn PlayerProvider,
    ) -> Result<ActionOutcome, FlowError> {
        let player = provider
            .player_for(event.guild_id, event.voice_channel, true)
            .await?;

        match follow_up {
            FollowUp::Shuffle => {
                let shuffled = player.shuffle().await?;
                Ok(ActionOutcome::Shuffled(shuffled))
            }
            FollowUp::AddRelated(amount) => {
                let selected = session
                    .selected
                    .as_ref()
                    .ok_or(FlowError::MissingSelection)?;

                let added =
                    add_related(&*player, session.source, selected, amount, event.user_id).await?;
                if !player.is_playing().await {
                    player.play().await?;
                }

                // Uso activo: extender la vida de la sesión
                self.sessions
                    .set_with_ttl(key.as_str(), session, self.sessions.default_ttl());

                info!("➕ {} relacionadas agregadas en sesión {}", added, key);
                Ok(ActionOutcome::Added(added))
            }
            FollowUp::Cancel => Ok(ActionOutcome::Cancelled),
        }
    }

    /// Collector timeout: drops the session if it is still alive.
    pub fn expire(&self, key: &SessionKey) -> bool {
        let removed = self.sessions.delete(key.as_str());
        if removed {
            debug!("⌛ Sesión expirada por timeout: {}", key);
        }
        removed
    }

    /// Stops the session cache's background sweep and drops every session.
    pub fn shutdown(&self) {
        if !self.sessions.is_empty() {
            warn!("🛑 {} sesiones descartadas al apagar", self.sessions.len());
        }
        self.sessions.shutdown();
    }
}

/// Searches for tracks related to `selected` and enqueues up to `amount` of them.
async fn add_related(
    player: &dyn Player,
    source: SearchSource,
    selected: &Track,
    amount: usize,
    requester: UserId,
) -> Result<usize, PlaybackError> {
    let query = related_query(selected);
    let picked: Vec<Track> = player
        .search(&query, source, requester)
        .await?
        .into_iter()
        .filter(|track| track.identifier != selected.identifier)
        .take(amount)
        .collect();

    let added = picked.len();
    for track in picked {
        player.enqueue(track).await?;
    }
    Ok(added)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{MockPlayer, MockPlayerProvider};
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use std::{sync::Arc, time::Duration};
    use tokio::time::advance;

    const TTL: Duration = Duration::from_secs(180);
    const GUILD: GuildId = GuildId::new(100);
    const OWNER: UserId = UserId::new(200);
    const STRANGER: UserId = UserId::new(201);
    const MESSAGE: MessageId = MessageId::new(300);
    const VOICE: Option<ChannelId> = Some(ChannelId::new(400));

    fn track(id: &str) -> Track {
        Track::new(
            id.to_string(),
            format!("Track {}", id),
            format!("https://example.com/{}", id),
            OWNER,
        )
        .with_author("Artist".to_string())
    }

    fn flow() -> PlayFlow {
        PlayFlow::new(
            SessionStore::new(TTL, Duration::from_secs(30)),
            FlowSettings {
                max_results: 10,
                default_source: SearchSource::SoundCloud,
            },
        )
    }

    fn results(ids: &[&str]) -> SearchResults {
        SearchResults {
            source: SearchSource::SoundCloud,
            query: "lofi beats".to_string(),
            tracks: ids.iter().map(|id| track(id)).collect(),
        }
    }

    /// Player that records enqueued tracks and reports itself idle.
    fn recording_player(queue: Arc<Mutex<Vec<Track>>>) -> MockPlayer {
        let mut player = MockPlayer::new();
        player.expect_enqueue().returning(move |track| {
            queue.lock().push(track);
            Ok(())
        });
        player.expect_is_playing().returning(|| false);
        player.expect_play().returning(|| Ok(()));
        player
    }

    fn provider_for(player: MockPlayer) -> MockPlayerProvider {
        let player: Arc<dyn Player> = Arc::new(player);
        let mut provider = MockPlayerProvider::new();
        provider
            .expect_player_for()
            .returning(move |_, _, _| Ok(player.clone()));
        provider
    }

    fn untouched_provider() -> MockPlayerProvider {
        let mut provider = MockPlayerProvider::new();
        provider.expect_player_for().never();
        provider
    }

    fn selection<'a>(custom_id: &'a str, user_id: UserId, value: &'a str) -> SelectionEvent<'a> {
        SelectionEvent {
            guild_id: GUILD,
            user_id,
            message_id: MESSAGE,
            custom_id,
            value: Some(value),
            voice_channel: VOICE,
        }
    }

    fn action(custom_id: &str, user_id: UserId) -> ActionEvent<'_> {
        ActionEvent {
            guild_id: GUILD,
            user_id,
            custom_id,
            voice_channel: VOICE,
        }
    }

    /// Opens a session and selects `index` through the owner.
    async fn active_session(flow: &PlayFlow, ids: &[&str], index: &'static str) -> SessionKey {
        let key = flow.open(GUILD, OWNER, MESSAGE, results(ids));
        let queue = Arc::new(Mutex::new(Vec::new()));
        let provider = provider_for(recording_player(queue));
        let custom_id = ComponentAction::Select.custom_id(&key);

        flow.select(&selection(&custom_id, OWNER, index), &provider)
            .await
            .unwrap();
        key
    }

    #[test]
    fn parse_query_handles_source_prefixes() {
        assert_eq!(
            parse_query("  yt: lofi beats ", SearchSource::SoundCloud),
            (SearchSource::YouTube, "lofi beats".to_string())
        );
        assert_eq!(
            parse_query("SC:rain", SearchSource::YouTube),
            (SearchSource::SoundCloud, "rain".to_string())
        );
        assert_eq!(
            parse_query("ytsearch stuff", SearchSource::SoundCloud),
            (SearchSource::SoundCloud, "ytsearch stuff".to_string())
        );
        assert_eq!(
            parse_query("é", SearchSource::YouTube),
            (SearchSource::YouTube, "é".to_string())
        );
    }

    #[test]
    fn related_query_joins_author_and_title() {
        assert_eq!(related_query(&track("a")), "Artist Track a");

        let mut anonymous = track("b");
        anonymous.author = None;
        assert_eq!(related_query(&anonymous), "Track b");
    }

    #[tokio::test(start_paused = true)]
    async fn search_truncates_and_uses_parsed_source() {
        let flow = flow();
        let mut player = MockPlayer::new();
        player
            .expect_search()
            .withf(|query, source, requester| {
                query.to_string() == "lofi beats"
                    && *source == SearchSource::YouTube
                    && *requester == OWNER
            })
            .times(1)
            .returning(|_, _, _| Ok((0..15).map(|i| track(&i.to_string())).collect()));

        let results = flow.search(&player, "yt:lofi beats", OWNER).await.unwrap();

        assert_eq!(results.tracks.len(), 10);
        assert_eq!(results.source, SearchSource::YouTube);
        assert_eq!(results.tracks[0].identifier, "0");
    }

    #[tokio::test(start_paused = true)]
    async fn no_results_creates_no_session() {
        let flow = flow();
        let mut player = MockPlayer::new();
        player.expect_search().returning(|_, _, _| Ok(Vec::new()));

        let error = flow.search(&player, "nothing", OWNER).await.unwrap_err();

        assert!(matches!(error, FlowError::NoResults));
        assert!(flow.sessions.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn upstream_search_failure_is_reported() {
        let flow = flow();
        let mut player = MockPlayer::new();
        player
            .expect_search()
            .returning(|_, _, _| Err(PlaybackError::Search("boom".into())));

        let error = flow.search(&player, "x", OWNER).await.unwrap_err();

        assert!(matches!(error, FlowError::Playback(_)));
        assert_eq!(error.user_message(), "❌ No se pudo completar la acción.");
    }

    #[tokio::test(start_paused = true)]
    async fn scenario_a_search_then_select() {
        let flow = flow();
        let mut player = MockPlayer::new();
        player
            .expect_search()
            .returning(|_, _, _| Ok(vec![track("a"), track("b"), track("c")]));

        let results = flow.search(&player, "lofi beats", OWNER).await.unwrap();
        let key = flow.open(GUILD, OWNER, MESSAGE, results);

        let session = flow.sessions.get(key.as_str()).unwrap();
        assert_eq!(session.candidates.len(), 3);
        assert_eq!(session.state(), SessionState::AwaitingSelection);

        let queue = Arc::new(Mutex::new(Vec::new()));
        let provider = provider_for(recording_player(queue.clone()));
        let custom_id = ComponentAction::Select.custom_id(&key);

        let picked = flow
            .select(&selection(&custom_id, OWNER, "1"), &provider)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(picked.track, track("b"));
        assert_eq!(*queue.lock(), vec![track("b")]);

        let session = flow.sessions.get(key.as_str()).unwrap();
        assert_eq!(session.state(), SessionState::Active);
        assert_eq!(session.selected, Some(track("b")));
    }

    #[tokio::test(start_paused = true)]
    async fn selection_refreshes_ttl() {
        let flow = flow();
        let key = flow.open(GUILD, OWNER, MESSAGE, results(&["a"]));

        advance(Duration::from_secs(120)).await;
        let provider = provider_for(recording_player(Arc::new(Mutex::new(Vec::new()))));
        let custom_id = ComponentAction::Select.custom_id(&key);
        flow.select(&selection(&custom_id, OWNER, "0"), &provider)
            .await
            .unwrap();

        advance(Duration::from_secs(120)).await;
        assert!(flow.sessions.get(key.as_str()).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn scenario_b_invalid_index_consumes_session() {
        let flow = flow();
        let key = flow.open(GUILD, OWNER, MESSAGE, results(&["a", "b", "c"]));
        let custom_id = ComponentAction::Select.custom_id(&key);

        let error = flow
            .select(&selection(&custom_id, OWNER, "5"), &untouched_provider())
            .await
            .unwrap_err();
        assert!(matches!(error, FlowError::InvalidSelection));
        assert!(flow.sessions.get(key.as_str()).is_none());

        let add = ComponentAction::AddRelated5.custom_id(&key);
        let error = flow
            .act(&key, OWNER, &action(&add, OWNER), &untouched_provider())
            .await
            .unwrap_err();
        assert!(matches!(error, FlowError::SessionExpired));
    }

    #[tokio::test(start_paused = true)]
    async fn non_numeric_selection_is_invalid() {
        let flow = flow();
        let key = flow.open(GUILD, OWNER, MESSAGE, results(&["a"]));
        let custom_id = ComponentAction::Select.custom_id(&key);

        let error = flow
            .select(&selection(&custom_id, OWNER, "first"), &untouched_provider())
            .await
            .unwrap_err();

        assert!(matches!(error, FlowError::InvalidSelection));
    }

    #[tokio::test(start_paused = true)]
    async fn foreign_user_cannot_select() {
        let flow = flow();
        let key = flow.open(GUILD, OWNER, MESSAGE, results(&["a", "b"]));
        let custom_id = ComponentAction::Select.custom_id(&key);

        let error = flow
            .select(&selection(&custom_id, STRANGER, "0"), &untouched_provider())
            .await
            .unwrap_err();

        assert!(matches!(error, FlowError::OwnershipMismatch));
        assert!(!error.is_terminal());
        assert_eq!(flow.sessions.get(key.as_str()).unwrap().selected, None);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_prefix_is_ignored() {
        let flow = flow();
        flow.open(GUILD, OWNER, MESSAGE, results(&["a"]));

        let outcome = flow
            .select(&selection("music_skip", OWNER, "0"), &untouched_provider())
            .await
            .unwrap();

        assert_eq!(outcome, None);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_session_on_select() {
        let flow = flow();
        let key = flow.open(GUILD, OWNER, MESSAGE, results(&["a"]));
        let custom_id = ComponentAction::Select.custom_id(&key);

        advance(TTL).await;
        let error = flow
            .select(&selection(&custom_id, OWNER, "0"), &untouched_provider())
            .await
            .unwrap_err();

        assert!(matches!(error, FlowError::SessionExpired));
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_selection_on_active_session_is_ignored() {
        let flow = flow();
        let key = active_session(&flow, &["a", "b"], "0").await;
        let custom_id = ComponentAction::Select.custom_id(&key);

        let outcome = flow
            .select(&selection(&custom_id, OWNER, "1"), &untouched_provider())
            .await
            .unwrap();

        assert_eq!(outcome, None);
        assert_eq!(flow.sessions.get(key.as_str()).unwrap().selected, Some(track("a")));
    }

    #[tokio::test(start_paused = true)]
    async fn no_voice_channel_on_select_drops_session() {
        let flow = flow();
        let key = flow.open(GUILD, OWNER, MESSAGE, results(&["a"]));
        let custom_id = ComponentAction::Select.custom_id(&key);

        let mut provider = MockPlayerProvider::new();
        provider
            .expect_player_for()
            .returning(|_, _, _| Err(PlaybackError::NoVoiceChannel));

        let error = flow
            .select(&selection(&custom_id, OWNER, "0"), &provider)
            .await
            .unwrap_err();

        assert!(matches!(error, FlowError::NoVoiceChannel));
        assert!(flow.sessions.get(key.as_str()).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn add_related_filters_seed_and_caps_amount() {
        let flow = flow();
        let key = active_session(&flow, &["seed"], "0").await;

        let queue = Arc::new(Mutex::new(Vec::new()));
        let mut player = recording_player(queue.clone());
        player
            .expect_search()
            .withf(|query, source, _| {
                query.to_string() == "Artist Track seed" && *source == SearchSource::SoundCloud
            })
            .returning(|_, _, _| {
                Ok(["seed", "r1", "r2", "r3", "r4", "r5", "r6"]
                    .iter()
                    .map(|id| track(id))
                    .collect())
            });
        let provider = provider_for(player);
        let add5 = ComponentAction::AddRelated5.custom_id(&key);

        let outcome = flow
            .act(&key, OWNER, &action(&add5, OWNER), &provider)
            .await
            .unwrap();

        assert_eq!(outcome, Some(ActionOutcome::Added(5)));
        let queued: Vec<String> = queue.lock().iter().map(|t| t.identifier.clone()).collect();
        assert_eq!(queued, vec!["r1", "r2", "r3", "r4", "r5"]);
    }

    #[tokio::test(start_paused = true)]
    async fn add_related_refreshes_ttl() {
        let flow = flow();
        let key = active_session(&flow, &["seed"], "0").await;

        advance(Duration::from_secs(150)).await;
        let mut player = recording_player(Arc::new(Mutex::new(Vec::new())));
        player
            .expect_search()
            .returning(|_, _, _| Ok(vec![track("r1")]));
        let provider = provider_for(player);
        let add10 = ComponentAction::AddRelated10.custom_id(&key);

        flow.act(&key, OWNER, &action(&add10, OWNER), &provider)
            .await
            .unwrap();

        // Sin refresco habría expirado en t=180
        advance(Duration::from_secs(100)).await;
        assert!(flow.sessions.get(key.as_str()).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn scenario_d_non_owner_add_is_rejected_without_side_effects() {
        let flow = flow();
        let key = active_session(&flow, &["seed"], "0").await;

        advance(Duration::from_secs(100)).await;
        let add5 = ComponentAction::AddRelated5.custom_id(&key);
        let error = flow
            .act(&key, OWNER, &action(&add5, STRANGER), &untouched_provider())
            .await
            .unwrap_err();

        assert!(matches!(error, FlowError::OwnershipMismatch));
        assert!(flow.sessions.get(key.as_str()).is_some());

        // Sin refresco: la sesión sigue expirando a los 180s de la selección
        advance(Duration::from_secs(80)).await;
        assert!(flow.sessions.get(key.as_str()).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn scenario_e_cancel_then_add_reports_expired() {
        let flow = flow();
        let key = active_session(&flow, &["seed"], "0").await;

        let cancel = ComponentAction::Cancel.custom_id(&key);
        let outcome = flow
            .act(&key, OWNER, &action(&cancel, OWNER), &untouched_provider())
            .await
            .unwrap();
        assert_eq!(outcome, Some(ActionOutcome::Cancelled));
        assert!(outcome.unwrap().is_terminal());

        let add10 = ComponentAction::AddRelated10.custom_id(&key);
        let error = flow
            .act(&key, OWNER, &action(&add10, OWNER), &untouched_provider())
            .await
            .unwrap_err();
        assert!(matches!(error, FlowError::SessionExpired));
        assert!(error.is_terminal());
    }

    #[tokio::test(start_paused = true)]
    async fn shuffle_reports_count() {
        let flow = flow();
        let key = active_session(&flow, &["seed"], "0").await;

        let mut player = MockPlayer::new();
        player.expect_shuffle().times(1).returning(|| Ok(4));
        let provider = provider_for(player);
        let shuffle = ComponentAction::Shuffle.custom_id(&key);

        let outcome = flow
            .act(&key, OWNER, &action(&shuffle, OWNER), &provider)
            .await
            .unwrap();

        assert_eq!(outcome, Some(ActionOutcome::Shuffled(4)));
        assert!(flow.sessions.get(key.as_str()).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn button_for_other_session_is_ignored() {
        let flow = flow();
        let key = active_session(&flow, &["seed"], "0").await;
        let other = SessionKey::derive(GUILD, OWNER, MessageId::new(999));
        let foreign = ComponentAction::Shuffle.custom_id(&other);

        let outcome = flow
            .act(&key, OWNER, &action(&foreign, OWNER), &untouched_provider())
            .await
            .unwrap();

        assert_eq!(outcome, None);
        assert_eq!(flow.route_action("garbage", &key), None);
    }

    #[tokio::test(start_paused = true)]
    async fn playback_failure_during_action_drops_session() {
        let flow = flow();
        let key = active_session(&flow, &["seed"], "0").await;

        let mut player = MockPlayer::new();
        player
            .expect_shuffle()
            .returning(|| Err(PlaybackError::Command("lost connection".into())));
        let provider = provider_for(player);
        let shuffle = ComponentAction::Shuffle.custom_id(&key);

        let error = flow
            .act(&key, OWNER, &action(&shuffle, OWNER), &provider)
            .await
            .unwrap_err();

        assert!(matches!(error, FlowError::Playback(_)));
        assert!(flow.sessions.get(key.as_str()).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn add_related_without_selection_is_an_error() {
        let flow = flow();
        let key = flow.open(GUILD, OWNER, MESSAGE, results(&["a"]));
        let provider = provider_for(MockPlayer::new());
        let add5 = ComponentAction::AddRelated5.custom_id(&key);

        let error = flow
            .act(&key, OWNER, &action(&add5, OWNER), &provider)
            .await
            .unwrap_err();

        assert!(matches!(error, FlowError::MissingSelection));
        assert!(flow.sessions.get(key.as_str()).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn expire_deletes_once() {
        let flow = flow();
        let key = flow.open(GUILD, OWNER, MESSAGE, results(&["a"]));

        assert!(flow.expire(&key));
        assert!(!flow.expire(&key));
    }
}
