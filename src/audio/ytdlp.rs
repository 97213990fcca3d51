use async_process::Command;
use serde::Deserialize;
use serenity::model::id::UserId;
use std::{sync::Arc, time::Duration};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::{PlaybackError, SearchSource, Track};

/// Resultados pedidos a yt-dlp por búsqueda; cubre el menú y los relacionados
pub const SEARCH_LIMIT: usize = 20;

/// Entrada de `yt-dlp --flat-playlist --dump-json`
#[derive(Debug, Deserialize)]
struct YtDlpEntry {
    id: String,
    title: Option<String>,
    uploader: Option<String>,
    channel: Option<String>,
    duration: Option<f64>,
    url: Option<String>,
    webpage_url: Option<String>,
}

impl YtDlpEntry {
    fn into_track(self, requester: UserId) -> Option<Track> {
        let uri = self.webpage_url.or(self.url)?;
        let title = self.title.unwrap_or_else(|| "Unknown title".to_string());

        let mut track = Track::new(self.id, title, uri, requester);
        if let Some(author) = self.uploader.or(self.channel) {
            track = track.with_author(author);
        }
        if let Some(seconds) = self.duration.filter(|s| s.is_finite() && *s > 0.0) {
            track = track.with_duration(Duration::from_secs_f64(seconds));
        }
        Some(track)
    }
}

/// Searches YouTube and SoundCloud through the `yt-dlp` binary.
#[derive(Debug, Clone)]
pub struct YtDlpSearch {
    // Limitar procesos concurrentes para evitar rate limiting
    permits: Arc<Semaphore>,
}

impl YtDlpSearch {
    pub fn new() -> Self {
        Self {
            permits: Arc::new(Semaphore::new(3)),
        }
    }

    pub async fn search(
        &self,
        query: &str,
        source: SearchSource,
        requester: UserId,
    ) -> Result<Vec<Track>, PlaybackError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| PlaybackError::Search(e.to_string()))?;

        let search_query = format!("{}{}:{}", source.search_prefix(), SEARCH_LIMIT, query);
        info!("🔍 Buscando en {}: {}", source.display_name(), query);

        let output = Command::new("yt-dlp")
            .args([
                "--flat-playlist",
                "--dump-json",
                "--skip-download",
                "--no-warnings",
                &search_query,
            ])
            .output()
            .await
            .map_err(|e| PlaybackError::Search(format!("no se pudo ejecutar yt-dlp: {}", e)))?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            return Err(PlaybackError::Search(format!("yt-dlp error: {}", error.trim())));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let tracks = parse_search_output(&stdout, requester);
        debug!("📊 yt-dlp devolvió {} resultados para '{}'", tracks.len(), query);

        Ok(tracks)
    }

    /// Checks that `yt-dlp` is installed and runnable.
    pub async fn verify(&self) -> anyhow::Result<()> {
        let output = Command::new("yt-dlp").arg("--version").output().await?;
        if !output.status.success() {
            anyhow::bail!("yt-dlp no está disponible");
        }
        info!(
            "✅ yt-dlp {}",
            String::from_utf8_lossy(&output.stdout).trim()
        );
        Ok(())
    }
}

impl Default for YtDlpSearch {
    fn default() -> Self {
        Self::new()
    }
}

/// One JSON object per line; malformed lines and entries without a URL are skipped.
fn parse_search_output(stdout: &str, requester: UserId) -> Vec<Track> {
    stdout
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match serde_json::from_str::<YtDlpEntry>(line) {
            Ok(entry) => entry.into_track(requester),
            Err(e) => {
                warn!("Línea de yt-dlp ignorada: {}", e);
                None
            }
        })
        .collect()
}
