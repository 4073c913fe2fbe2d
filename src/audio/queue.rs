use chrono::{DateTime, Utc};
use rand::{seq::SliceRandom, Rng};
use serenity::model::id::UserId;
use std::{
    collections::{HashSet, VecDeque},
    sync::Arc,
    time::Duration,
};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::{
    error::{PlaybackError, PlaybackResult},
    library::{Catalog, TrackDescriptor},
};

/// Pista dentro de una cola (o sonando).
#[derive(Debug, Clone)]
pub struct QueuedTrack {
    pub track: Arc<TrackDescriptor>,
    /// Añadida por el relleno automático (sólo para mostrar).
    pub randomly_selected: bool,
    pub requested_by: Option<UserId>,
}

impl QueuedTrack {
    pub fn requested(track: Arc<TrackDescriptor>, requested_by: UserId) -> Self {
        Self {
            track,
            randomly_selected: false,
            requested_by: Some(requested_by),
        }
    }

    pub fn filler(track: Arc<TrackDescriptor>) -> Self {
        Self {
            track,
            randomly_selected: true,
            requested_by: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.track.id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopMode {
    Off,
    Single,
    Queue,
}

impl LoopMode {
    /// `Off → Single → Queue → Off`
    pub fn next(self) -> Self {
        match self {
            LoopMode::Off => LoopMode::Single,
            LoopMode::Single => LoopMode::Queue,
            LoopMode::Queue => LoopMode::Off,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueKind {
    Priority,
    Regular,
}

impl QueueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueKind::Priority => "priority",
            QueueKind::Regular => "regular",
        }
    }
}

/// Motivo por el que va a dispararse el fin de la pista actual.
///
/// Lo pone skip/stop y lo consume (y limpia) el manejador de fin de pista.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransitionGuard {
    #[default]
    None,
    SkipRequested,
    StopRequested,
}

/// Estado de reproducción de un guild. Sólo lo muta el actor de ese guild.
#[derive(Debug)]
pub struct GuildPlaybackState {
    pub now_playing: Option<QueuedTrack>,
    priority: VecDeque<QueuedTrack>,
    regular: VecDeque<QueuedTrack>,
    pub loop_mode: LoopMode,
    pub user_paused: bool,
    pub occupancy_paused: bool,
    pub play_started_at: Option<DateTime<Utc>>,
    pub transition_guard: TransitionGuard,
    pub alone_since: Option<Instant>,
    /// Hay un relleno encolado en el actor y aún no se ha ejecutado.
    replenish_pending: bool,
    max_size: usize,
}

impl GuildPlaybackState {
    pub fn new(max_size: usize) -> Self {
        Self {
            now_playing: None,
            priority: VecDeque::new(),
            regular: VecDeque::new(),
            loop_mode: LoopMode::Off,
            user_paused: false,
            occupancy_paused: false,
            play_started_at: None,
            transition_guard: TransitionGuard::None,
            alone_since: None,
            replenish_pending: false,
            max_size,
        }
    }

    /// Agrega a la cola elegida y devuelve la posición (base 1) en la cola combinada.
    pub fn enqueue(&mut self, item: QueuedTrack, kind: QueueKind) -> PlaybackResult<usize> {
        if kind == QueueKind::Priority && self.priority.len() >= self.max_size {
            return Err(PlaybackError::QueueFull(self.max_size));
        }

        debug!("➕ Agregado a la cola {}: {}", kind.as_str(), item.track.title);

        match kind {
            QueueKind::Priority => {
                self.priority.push_back(item);
                Ok(self.priority.len())
            }
            QueueKind::Regular => {
                self.regular.push_back(item);
                Ok(self.priority.len() + self.regular.len())
            }
        }
    }

    /// Cabeza de la cola prioritaria; si está vacía, la de la regular.
    pub fn dequeue_next(&mut self) -> Option<QueuedTrack> {
        self.priority
            .pop_front()
            .or_else(|| self.regular.pop_front())
    }

    /// Devuelve la pista recién terminada al final de la cola regular (loop de cola).
    pub fn recycle(&mut self, item: QueuedTrack) {
        info!("🔁 Track agregado al final por loop de cola: {}", item.track.title);
        self.regular.push_back(item);
    }

    /// Rellena la cola regular hasta `min_count` con pistas aleatorias del
    /// catálogo que no estén ya sonando ni encoladas.
    ///
    /// Devuelve las pistas añadidas; nunca más de `min_count`.
    pub fn replenish<R: Rng + ?Sized>(
        &mut self,
        catalog: &Catalog,
        min_count: usize,
        rng: &mut R,
    ) -> Vec<Arc<TrackDescriptor>> {
        let needed = min_count.saturating_sub(self.regular.len());
        if needed == 0 {
            return Vec::new();
        }

        let picked: Vec<Arc<TrackDescriptor>> = {
            let in_flight = self.in_flight_ids();
            let available: Vec<&Arc<TrackDescriptor>> = catalog
                .all()
                .iter()
                .filter(|t| t.random_eligible && !in_flight.contains(t.id.as_str()))
                .collect();

            if available.is_empty() {
                debug!("📭 Nada disponible para rellenar la cola");
                return Vec::new();
            }

            available
                .choose_multiple(rng, needed.min(available.len()))
                .map(|t| Arc::clone(*t))
                .collect()
        };

        for track in &picked {
            self.regular.push_back(QueuedTrack::filler(track.clone()));
        }

        info!("🎲 Cola regular rellenada con {} canciones aleatorias", picked.len());
        picked
    }

    fn in_flight_ids(&self) -> HashSet<&str> {
        self.now_playing
            .iter()
            .chain(self.priority.iter())
            .chain(self.regular.iter())
            .map(|item| item.id())
            .collect()
    }

    /// Limpia ambas colas. Devuelve cuántas pistas se quitaron.
    pub fn clear_queues(&mut self) -> usize {
        let cleared = self.priority.len() + self.regular.len();
        self.priority.clear();
        self.regular.clear();
        info!("🗑️ Cola limpiada: {} tracks removidos", cleared);
        cleared
    }

    /// Reserva el único relleno en vuelo si la cola regular bajó de `min_depth`.
    ///
    /// Devuelve `false` si no hace falta o si ya hay uno pendiente.
    pub fn claim_replenish(&mut self, min_depth: usize) -> bool {
        if self.regular.len() >= min_depth || self.replenish_pending {
            return false;
        }
        self.replenish_pending = true;
        true
    }

    pub fn finish_replenish(&mut self) {
        self.replenish_pending = false;
    }

    pub fn is_paused(&self) -> bool {
        self.user_paused || self.occupancy_paused
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            now_playing: self.now_playing.clone(),
            priority: self.priority.iter().cloned().collect(),
            regular: self.regular.iter().cloned().collect(),
            loop_mode: self.loop_mode,
            paused: self.is_paused(),
            alone: self.alone_since.is_some(),
            play_started_at: self.play_started_at,
        }
    }
}

/// Vista de sólo lectura del estado de un guild, para la UI.
#[derive(Debug, Clone)]
pub struct QueueSnapshot {
    pub now_playing: Option<QueuedTrack>,
    pub priority: Vec<QueuedTrack>,
    pub regular: Vec<QueuedTrack>,
    pub loop_mode: LoopMode,
    pub paused: bool,
    pub alone: bool,
    pub play_started_at: Option<DateTime<Utc>>,
}

impl QueueSnapshot {
    pub fn total_items(&self) -> usize {
        self.priority.len() + self.regular.len()
    }

    pub fn total_duration(&self) -> Duration {
        self.now_playing
            .iter()
            .chain(self.priority.iter())
            .chain(self.regular.iter())
            .map(|item| item.track.duration())
            .sum()
    }

    /// Obtiene una página de la cola combinada (prioritaria y luego regular)
    pub fn page(&self, page: usize, items_per_page: usize) -> QueuePage {
        let items_per_page = items_per_page.max(1);
        let total_items = self.total_items();
        let total_pages = if total_items == 0 { 1 } else { total_items.div_ceil(items_per_page) };
        let current_page = page.clamp(1, total_pages);
        let start = (current_page - 1) * items_per_page;

        QueuePage {
            items: self
                .priority
                .iter()
                .chain(self.regular.iter())
                .skip(start)
                .take(items_per_page)
                .cloned()
                .collect(),
            first_position: start + 1,
            current_page,
            total_pages,
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueuePage {
    pub items: Vec<QueuedTrack>,
    pub first_position: usize,
    pub current_page: usize,
    pub total_pages: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::tests::sample_catalog;
    use pretty_assertions::assert_eq;
    use rand::{rngs::StdRng, SeedableRng};

    fn item(catalog: &Catalog, name: &str) -> QueuedTrack {
        let track = catalog.lookup(&format!("/songs/{}.mp3", name)).unwrap();
        QueuedTrack::requested(track, UserId::new(1))
    }

    fn titles(items: &[QueuedTrack]) -> Vec<String> {
        items.iter().map(|i| i.track.title.clone()).collect()
    }

    #[test]
    fn test_priority_strictly_precedes_regular() {
        let catalog = sample_catalog(&["A", "B", "C", "D"]);
        let mut state = GuildPlaybackState::new(100);

        state.enqueue(item(&catalog, "A"), QueueKind::Regular).unwrap();
        state.enqueue(item(&catalog, "B"), QueueKind::Regular).unwrap();
        state.enqueue(item(&catalog, "C"), QueueKind::Priority).unwrap();
        state.enqueue(item(&catalog, "D"), QueueKind::Priority).unwrap();

        let order: Vec<String> = std::iter::from_fn(|| state.dequeue_next())
            .map(|i| i.track.title.clone())
            .collect();
        assert_eq!(order, vec!["C", "D", "A", "B"]);
    }

    #[test]
    fn test_enqueue_positions() {
        let catalog = sample_catalog(&["A", "B", "C"]);
        let mut state = GuildPlaybackState::new(100);

        assert_eq!(state.enqueue(item(&catalog, "A"), QueueKind::Regular).unwrap(), 1);
        assert_eq!(state.enqueue(item(&catalog, "B"), QueueKind::Priority).unwrap(), 1);
        assert_eq!(state.enqueue(item(&catalog, "C"), QueueKind::Regular).unwrap(), 3);
        // Las peticiones manuales pueden repetir una pista ya encolada
        assert_eq!(state.enqueue(item(&catalog, "B"), QueueKind::Priority).unwrap(), 2);
    }

    #[test]
    fn test_priority_queue_limit() {
        let catalog = sample_catalog(&["A"]);
        let mut state = GuildPlaybackState::new(1);

        state.enqueue(item(&catalog, "A"), QueueKind::Priority).unwrap();
        assert_eq!(
            state.enqueue(item(&catalog, "A"), QueueKind::Priority),
            Err(PlaybackError::QueueFull(1))
        );
    }

    #[test]
    fn test_replenish_skips_in_flight_tracks() {
        let catalog = sample_catalog(&["A", "B", "C", "D", "E"]);
        let mut rng = StdRng::seed_from_u64(7);
        let mut state = GuildPlaybackState::new(100);
        state.now_playing = Some(item(&catalog, "A"));
        state.enqueue(item(&catalog, "B"), QueueKind::Priority).unwrap();

        let added = state.replenish(&catalog, 3, &mut rng);

        assert_eq!(added.len(), 3);
        let snapshot = state.snapshot();
        let mut regular = titles(&snapshot.regular);
        regular.sort();
        assert_eq!(regular, vec!["C", "D", "E"]);
        assert!(snapshot.regular.iter().all(|i| i.randomly_selected));
    }

    #[test]
    fn test_replenish_is_bounded_by_available_and_min_count() {
        let catalog = sample_catalog(&["A", "B", "C", "D", "E", "F", "G"]);
        let mut rng = StdRng::seed_from_u64(1);
        let mut state = GuildPlaybackState::new(100);

        assert_eq!(state.replenish(&catalog, 3, &mut rng).len(), 3);
        // Ya está en profundidad mínima
        assert!(state.replenish(&catalog, 3, &mut rng).is_empty());

        state.dequeue_next();
        assert_eq!(state.replenish(&catalog, 3, &mut rng).len(), 1);
        assert_eq!(state.regular.len(), 3);

        let small = sample_catalog(&["A", "B"]);
        let mut state = GuildPlaybackState::new(100);
        state.now_playing = Some(item(&small, "A"));
        assert_eq!(state.replenish(&small, 3, &mut rng).len(), 1);
        assert!(state.replenish(&small, 3, &mut rng).is_empty());
    }

    #[test]
    fn test_only_one_replenish_in_flight() {
        let catalog = sample_catalog(&["A", "B", "C", "D", "E"]);
        let mut state = GuildPlaybackState::new(100);

        assert!(state.claim_replenish(3));
        // Otro dequeue antes de que corra el relleno no programa un segundo
        assert!(!state.claim_replenish(3));
        assert!(!state.claim_replenish(3));

        state.finish_replenish();
        state.replenish(&catalog, 3, &mut StdRng::seed_from_u64(5));
        assert!(!state.claim_replenish(3));

        state.dequeue_next();
        assert!(state.claim_replenish(3));
    }

    #[test]
    fn test_replenish_respects_random_eligibility() {
        let mut tracks = vec![
            TrackDescriptor::new("/songs/A.mp3", "A", "X", 1),
            TrackDescriptor::new("/songs/B.mp3", "B", "X", 1),
        ];
        tracks[1].random_eligible = false;
        let catalog = Catalog::new(tracks);
        let mut state = GuildPlaybackState::new(100);

        state.replenish(&catalog, 3, &mut StdRng::seed_from_u64(3));
        assert_eq!(titles(&state.snapshot().regular), vec!["A"]);
    }

    #[test]
    fn test_replenish_is_deterministic_with_seed() {
        let catalog = sample_catalog(&["A", "B", "C", "D", "E", "F", "G", "H"]);
        let run = |seed| {
            let mut state = GuildPlaybackState::new(100);
            state.replenish(&catalog, 3, &mut StdRng::seed_from_u64(seed));
            titles(&state.snapshot().regular)
        };
        assert_eq!(run(42), run(42));
    }

    #[test]
    fn test_replenish_on_empty_catalog_is_noop() {
        let mut state = GuildPlaybackState::new(100);
        assert!(state.replenish(&Catalog::empty(), 3, &mut StdRng::seed_from_u64(0)).is_empty());
        assert!(state.dequeue_next().is_none());
    }

    #[test]
    fn test_loop_mode_cycle() {
        assert_eq!(LoopMode::Off.next(), LoopMode::Single);
        assert_eq!(LoopMode::Single.next(), LoopMode::Queue);
        assert_eq!(LoopMode::Queue.next(), LoopMode::Off);
    }

    #[test]
    fn test_snapshot_pages_combined_queue() {
        let names: Vec<String> = (0..12).map(|i| format!("T{:02}", i)).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let catalog = sample_catalog(&refs);
        let mut state = GuildPlaybackState::new(100);
        state.enqueue(item(&catalog, "T11"), QueueKind::Priority).unwrap();
        for name in &refs[..11] {
            state.enqueue(item(&catalog, name), QueueKind::Regular).unwrap();
        }

        let snapshot = state.snapshot();
        let first = snapshot.page(1, 10);
        assert_eq!(first.total_pages, 2);
        assert_eq!(first.items[0].track.title, "T11");
        assert_eq!(first.first_position, 1);

        let second = snapshot.page(9, 10);
        assert_eq!(second.current_page, 2);
        assert_eq!(second.first_position, 11);
        assert_eq!(titles(&second.items), vec!["T09", "T10"]);
        assert_eq!(snapshot.total_duration(), Duration::from_secs(12 * 180));
    }
}
