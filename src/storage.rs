use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, path::PathBuf};
use tokio::{fs, sync::Mutex};
use tracing::{debug, error, info, warn};

use crate::audio::telemetry::{EventSubscriber, LifecycleEvent};

/// Contadores de una pista dentro de un servidor
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackStats {
    pub queued: u64,
    pub started: u64,
    pub completed: u64,
    pub skipped: u64,
    pub failed: u64,
    pub last_played: Option<DateTime<Utc>>,
}

/// Estadísticas de reproducción de un servidor, almacenadas en JSON
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GuildStats {
    pub guild_id: u64,
    pub tracks: HashMap<String, TrackStats>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Almacén de estadísticas basado en archivos JSON
///
/// Se suscribe al bus de eventos; los errores de escritura se registran y
/// nunca vuelven al reproductor.
pub struct JsonStatsStore {
    stats_dir: PathBuf,
    cache: Mutex<HashMap<u64, GuildStats>>,
}

impl JsonStatsStore {
    pub async fn new(data_dir: PathBuf) -> Result<Self> {
        let stats_dir = data_dir.join("stats");
        fs::create_dir_all(&stats_dir).await?;

        info!("📁 Estadísticas en: {}", stats_dir.display());

        let store = Self {
            stats_dir,
            cache: Mutex::new(HashMap::new()),
        };

        // Cargar estadísticas existentes
        store.load_all().await?;

        Ok(store)
    }

    /// Estadísticas actuales de un servidor
    #[cfg(test)]
    pub async fn guild_stats(&self, guild_id: u64) -> GuildStats {
        self.cache
            .lock()
            .await
            .get(&guild_id)
            .cloned()
            .unwrap_or_else(|| GuildStats {
                guild_id,
                ..Default::default()
            })
    }

    async fn record(&self, event: &LifecycleEvent) -> Result<()> {
        let guild_id = event.guild_id().get();

        let snapshot = {
            let mut cache = self.cache.lock().await;
            let stats = cache.entry(guild_id).or_insert_with(|| GuildStats {
                guild_id,
                ..Default::default()
            });

            match event {
                LifecycleEvent::Queued { track_id, .. } => counters(stats, track_id).queued += 1,
                LifecycleEvent::Started { track, .. } => {
                    let entry = counters(stats, &track.id);
                    entry.started += 1;
                    entry.last_played = Some(Utc::now());
                }
                LifecycleEvent::Completed { track_id, .. } => counters(stats, track_id).completed += 1,
                LifecycleEvent::Skipped { track_id, .. } => counters(stats, track_id).skipped += 1,
                LifecycleEvent::Failed { track_id, .. } => counters(stats, track_id).failed += 1,
                // El resto no afecta a los contadores
                _ => return Ok(()),
            }

            stats.updated_at = Some(Utc::now());
            stats.clone()
        };

        self.save(&snapshot).await
    }

    async fn save(&self, stats: &GuildStats) -> Result<()> {
        let content = serde_json::to_string_pretty(stats)?;
        fs::write(self.file_path(stats.guild_id), content).await?;
        debug!("💾 Estadísticas guardadas para guild {}", stats.guild_id);
        Ok(())
    }

    async fn load_all(&self) -> Result<()> {
        let mut files = fs::read_dir(&self.stats_dir).await?;
        let mut cache = self.cache.lock().await;

        while let Some(entry) = files.next_entry().await? {
            let path = entry.path();
            if !path.extension().map_or(false, |ext| ext == "json") {
                continue;
            }

            let guild_id = path
                .file_stem()
                .and_then(|n| n.to_str())
                .and_then(|n| n.strip_prefix("guild_"))
                .and_then(|id| id.parse::<u64>().ok());

            let Some(guild_id) = guild_id else { continue };

            match load_file(&path).await {
                Ok(stats) => {
                    cache.insert(guild_id, stats);
                }
                Err(e) => warn!("Error cargando estadísticas para guild {}: {}", guild_id, e),
            }
        }

        if !cache.is_empty() {
            info!("📂 Cargadas estadísticas de {} servidores", cache.len());
        }

        Ok(())
    }

    fn file_path(&self, guild_id: u64) -> PathBuf {
        self.stats_dir.join(format!("guild_{}.json", guild_id))
    }
}

fn counters<'a>(stats: &'a mut GuildStats, track_id: &str) -> &'a mut TrackStats {
    stats.tracks.entry(track_id.to_string()).or_default()
}

async fn load_file(path: &std::path::Path) -> Result<GuildStats> {
    let content = fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&content)?)
}

#[async_trait]
impl EventSubscriber for JsonStatsStore {
    async fn handle(&self, event: &LifecycleEvent) {
        if let Err(e) = self.record(event).await {
            error!("Error guardando estadísticas para guild {}: {:?}", event.guild_id(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{audio::queue::QueueKind, library::TrackDescriptor};
    use pretty_assertions::assert_eq;
    use serenity::model::id::GuildId;
    use std::sync::Arc;

    const GUILD: GuildId = GuildId::new(7);

    fn track() -> Arc<TrackDescriptor> {
        Arc::new(TrackDescriptor::new("/songs/a.mp3", "A", "Artista", 120))
    }

    #[tokio::test]
    async fn test_counts_lifecycle_events() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStatsStore::new(dir.path().to_path_buf()).await.unwrap();
        let id = track().id.clone();

        store
            .handle(&LifecycleEvent::Queued { track_id: id.clone(), queue: QueueKind::Regular, guild_id: GUILD })
            .await;
        store.handle(&LifecycleEvent::Started { track: track(), guild_id: GUILD }).await;
        store.handle(&LifecycleEvent::Skipped { track_id: id.clone(), guild_id: GUILD }).await;
        store.handle(&LifecycleEvent::Started { track: track(), guild_id: GUILD }).await;
        store.handle(&LifecycleEvent::Completed { track_id: id.clone(), guild_id: GUILD }).await;

        let stats = store.guild_stats(GUILD.get()).await;
        let counters = &stats.tracks[&id];
        assert_eq!(
            (counters.queued, counters.started, counters.completed, counters.skipped, counters.failed),
            (1, 2, 1, 1, 0)
        );
        assert!(counters.last_played.is_some());
        assert!(dir.path().join("stats").join("guild_7.json").exists());
    }

    #[tokio::test]
    async fn test_stats_survive_restart() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = JsonStatsStore::new(dir.path().to_path_buf()).await.unwrap();
            store
                .handle(&LifecycleEvent::Failed {
                    track_id: "/songs/x.mp3".into(),
                    guild_id: GUILD,
                    reason: "archivo ilegible".into(),
                })
                .await;
        }

        let reopened = JsonStatsStore::new(dir.path().to_path_buf()).await.unwrap();
        assert_eq!(reopened.guild_stats(GUILD.get()).await.tracks["/songs/x.mp3"].failed, 1);
    }

    #[tokio::test]
    async fn test_presence_events_are_not_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStatsStore::new(dir.path().to_path_buf()).await.unwrap();

        store
            .handle(&LifecycleEvent::AloneCountdown { guild_id: GUILD, remaining: std::time::Duration::from_secs(30) })
            .await;

        assert!(store.guild_stats(GUILD.get()).await.tracks.is_empty());
        assert!(!dir.path().join("stats").join("guild_7.json").exists());
    }
}
