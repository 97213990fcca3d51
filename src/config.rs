use anyhow::Result;
use std::time::Duration;
use tracing::warn;

use crate::{
    audio::SearchSource,
    cache::{DEFAULT_SWEEP_INTERVAL, DEFAULT_TTL},
    session::FlowSettings,
};

/// Límite de opciones de un menú de selección en Discord
const DISCORD_MENU_LIMIT: usize = 25;

#[derive(Debug, Clone)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub application_id: u64,
    pub guild_id: Option<u64>, // Para comandos de desarrollo

    // Búsqueda
    pub search_source: SearchSource,
    pub max_menu_results: usize,

    // Sesiones
    pub session_ttl: Duration,
    pub session_sweep_interval: Duration,
    pub component_timeout: Duration,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            // Discord
            discord_token: std::env::var("DISCORD_TOKEN")?,
            application_id: std::env::var("APPLICATION_ID")?.parse()?,
            guild_id: std::env::var("GUILD_ID").ok().and_then(|s| s.parse().ok()),

            // Búsqueda
            search_source: std::env::var("SEARCH_SOURCE")
                .unwrap_or_else(|_| "scsearch".to_string())
                .parse()?,
            max_menu_results: std::env::var("MAX_MENU_RESULTS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()?,

            // Sesiones (milisegundos)
            session_ttl: millis_var("SESSION_TTL_MS", DEFAULT_TTL)?,
            session_sweep_interval: millis_var("SESSION_SWEEP_MS", DEFAULT_SWEEP_INTERVAL)?,
            component_timeout: millis_var("COMPONENT_TIMEOUT_MS", Duration::from_millis(60_000))?,
        };

        // Validate configuration before returning
        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Session TTL, sweep interval and component timeout must be non-zero
    /// - Menu results must be between 1 and 25 (Discord select menu limit)
    ///
    /// A sweep interval longer than the TTL is accepted but logged, since
    /// abandoned sessions then linger past their expiry until the next sweep.
    pub fn validate(&self) -> Result<()> {
        if self.session_ttl.is_zero() {
            anyhow::bail!("Session TTL must be greater than 0");
        }

        if self.session_sweep_interval.is_zero() {
            anyhow::bail!("Session sweep interval must be greater than 0");
        }

        if self.component_timeout.is_zero() {
            anyhow::bail!("Component timeout must be greater than 0");
        }

        if !(1..=DISCORD_MENU_LIMIT).contains(&self.max_menu_results) {
            anyhow::bail!(
                "Max menu results must be between 1 and {}, got: {}",
                DISCORD_MENU_LIMIT,
                self.max_menu_results
            );
        }

        if self.session_sweep_interval > self.session_ttl {
            warn!(
                "⚠️ El intervalo de limpieza ({:?}) supera el TTL de sesión ({:?})",
                self.session_sweep_interval, self.session_ttl
            );
        }

        Ok(())
    }

    /// Settings for the `/play` session protocol.
    pub fn flow_settings(&self) -> FlowSettings {
        FlowSettings {
            max_results: self.max_menu_results,
            default_source: self.search_source,
        }
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Excludes the token.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: App ID {} (Guild: {})\n  \
            Search: {} default, {} menu results\n  \
            Sessions: {}s TTL, {}s sweep, {}s component timeout",
            self.application_id,
            self.guild_id.map_or("global".to_string(), |id| id.to_string()),
            self.search_source.display_name(),
            self.max_menu_results,
            self.session_ttl.as_secs(),
            self.session_sweep_interval.as_secs(),
            self.component_timeout.as_secs(),
        )
    }
}

/// Reads a millisecond duration, falling back to `default` when unset or blank.
fn millis_var(name: &str, default: Duration) -> Result<Duration> {
    match std::env::var(name) {
        Ok(val) if !val.trim().is_empty() => Ok(Duration::from_millis(val.trim().parse()?)),
        _ => Ok(default),
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (no defaults - must be provided)
            discord_token: String::new(),
            application_id: 0,
            guild_id: None,

            search_source: SearchSource::SoundCloud,
            max_menu_results: 10,

            session_ttl: DEFAULT_TTL,
            session_sweep_interval: DEFAULT_SWEEP_INTERVAL,
            component_timeout: Duration::from_millis(60_000),
        }
    }
}
