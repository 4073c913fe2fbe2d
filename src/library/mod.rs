//! # Library Module
//!
//! Catálogo inmutable de la biblioteca local de canciones.
//!
//! El núcleo de reproducción sólo lee del catálogo: cada operación toma una
//! instantánea `Arc<Catalog>` de [`CatalogHandle`] y trabaja sobre ella sin
//! bloqueos. El indexador ([`scanner`]) construye un catálogo nuevo cuando la
//! instantánea caduca y lo intercambia de forma atómica.

pub mod artwork;
pub mod scanner;

use anyhow::Result;
use parking_lot::RwLock;
use std::{
    collections::HashMap,
    path::PathBuf,
    sync::Arc,
    time::{Duration, Instant},
};
use tracing::{info, warn};

/// Descriptor de una pista, producido por el indexador.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackDescriptor {
    /// Identificador estable (la ruta del archivo).
    pub id: String,
    pub path: PathBuf,
    pub title: String,
    pub artist: String,
    pub duration_secs: u64,
    /// Si puede elegirse al rellenar la cola regular.
    pub random_eligible: bool,
}

impl TrackDescriptor {
    pub fn new(path: impl Into<PathBuf>, title: &str, artist: &str, duration_secs: u64) -> Self {
        let path = path.into();
        Self {
            id: path.to_string_lossy().into_owned(),
            path,
            title: title.to_string(),
            artist: artist.to_string(),
            duration_secs,
            random_eligible: true,
        }
    }

    /// Nombre mostrado en el autocompletado: `Título - Artista`.
    pub fn display_name(&self) -> String {
        format!("{} - {}", self.title, self.artist)
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }
}

/// Catálogo de pistas indexado por id.
#[derive(Debug)]
pub struct Catalog {
    tracks: Vec<Arc<TrackDescriptor>>,
    index: HashMap<String, usize>,
    loaded_at: Instant,
}

impl Catalog {
    pub fn new(tracks: Vec<TrackDescriptor>) -> Self {
        let mut unique = Vec::with_capacity(tracks.len());
        let mut index = HashMap::with_capacity(tracks.len());

        for track in tracks {
            if index.contains_key(&track.id) {
                warn!("Pista duplicada en el catálogo, ignorada: {}", track.id);
                continue;
            }
            index.insert(track.id.clone(), unique.len());
            unique.push(Arc::new(track));
        }

        Self {
            tracks: unique,
            index,
            loaded_at: Instant::now(),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn lookup(&self, id: &str) -> Option<Arc<TrackDescriptor>> {
        self.index.get(id).map(|&i| self.tracks[i].clone())
    }

    pub fn all(&self) -> &[Arc<TrackDescriptor>] {
        &self.tracks
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Resuelve lo que devuelve el autocompletado: id o nombre mostrado exacto.
    pub fn resolve(&self, name: &str) -> Option<Arc<TrackDescriptor>> {
        self.lookup(name).or_else(|| {
            self.tracks
                .iter()
                .find(|t| t.display_name() == name)
                .cloned()
        })
    }

    /// Búsqueda para autocompletado, sin distinguir mayúsculas.
    pub fn search(&self, query: &str, limit: usize) -> Vec<Arc<TrackDescriptor>> {
        let term = query.trim().to_lowercase();

        if term.is_empty() {
            return self.tracks.iter().take(limit).cloned().collect();
        }

        self.tracks
            .iter()
            .filter(|t| {
                t.title.to_lowercase().contains(&term)
                    || t.artist.to_lowercase().contains(&term)
                    || t.display_name().to_lowercase().contains(&term)
            })
            .take(limit)
            .cloned()
            .collect()
    }

    fn is_stale(&self, max_age: Duration) -> bool {
        self.loaded_at.elapsed() > max_age
    }
}

/// Punto de acceso compartido al catálogo vigente.
pub struct CatalogHandle {
    current: RwLock<Arc<Catalog>>,
    songs_dir: PathBuf,
    max_age: Duration,
}

impl CatalogHandle {
    pub fn new(songs_dir: PathBuf, max_age: Duration) -> Self {
        Self {
            current: RwLock::new(Arc::new(Catalog::empty())),
            songs_dir,
            max_age,
        }
    }

    /// Handle con un catálogo ya resuelto (sin directorio que indexar).
    pub fn from_catalog(catalog: Catalog) -> Self {
        Self {
            current: RwLock::new(Arc::new(catalog)),
            songs_dir: PathBuf::new(),
            max_age: Duration::MAX,
        }
    }

    pub fn snapshot(&self) -> Arc<Catalog> {
        self.current.read().clone()
    }

    pub fn replace(&self, catalog: Catalog) {
        *self.current.write() = Arc::new(catalog);
    }

    /// Re-indexa el directorio de canciones en un hilo bloqueante.
    pub async fn refresh(&self) -> Result<usize> {
        let dir = self.songs_dir.clone();
        let tracks = tokio::task::spawn_blocking(move || scanner::scan(&dir)).await??;
        let catalog = Catalog::new(tracks);
        let count = catalog.len();
        self.replace(catalog);
        info!("📚 Biblioteca indexada: {} canciones", count);
        Ok(count)
    }

    /// Re-indexa sólo si la instantánea actual superó su vida útil.
    pub async fn refresh_if_stale(&self) -> Result<()> {
        if self.snapshot().is_stale(self.max_age) {
            self.refresh().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    pub(crate) fn sample_catalog(names: &[&str]) -> Catalog {
        Catalog::new(
            names
                .iter()
                .map(|n| TrackDescriptor::new(format!("/songs/{}.mp3", n), n, "Artista", 180))
                .collect(),
        )
    }

    #[test]
    fn test_lookup_and_resolve() {
        let catalog = sample_catalog(&["A", "B"]);

        assert_eq!(catalog.lookup("/songs/A.mp3").map(|t| t.title.clone()), Some("A".to_string()));
        assert_eq!(catalog.resolve("B - Artista").map(|t| t.id.clone()), Some("/songs/B.mp3".to_string()));
        assert!(catalog.resolve("C - Artista").is_none());
    }

    #[test]
    fn test_duplicate_ids_are_dropped() {
        let catalog = Catalog::new(vec![
            TrackDescriptor::new("/songs/a.mp3", "A", "X", 10),
            TrackDescriptor::new("/songs/a.mp3", "A otra vez", "X", 10),
        ]);
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.all()[0].title, "A");
    }

    #[test]
    fn test_search_matches_title_artist_and_limit() {
        let catalog = Catalog::new(vec![
            TrackDescriptor::new("/s/1.mp3", "Blue Monday", "New Order", 100),
            TrackDescriptor::new("/s/2.mp3", "Ceremony", "New Order", 100),
            TrackDescriptor::new("/s/3.mp3", "Atmosphere", "Joy Division", 100),
        ]);

        let by_artist: Vec<_> = catalog.search("new order", 25).iter().map(|t| t.title.clone()).collect();
        assert_eq!(by_artist, vec!["Blue Monday", "Ceremony"]);

        assert_eq!(catalog.search("  ", 2).len(), 2);
        assert_eq!(catalog.search("MOSPH", 25)[0].title, "Atmosphere");
        assert!(catalog.search("zzz", 25).is_empty());
    }

    #[test]
    fn test_handle_swaps_snapshots() {
        let handle = CatalogHandle::from_catalog(sample_catalog(&["A"]));
        let old = handle.snapshot();
        handle.replace(sample_catalog(&["A", "B"]));

        assert_eq!(old.len(), 1);
        assert_eq!(handle.snapshot().len(), 2);
    }
}
