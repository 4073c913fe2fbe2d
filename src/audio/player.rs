use dashmap::DashMap;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serenity::model::id::{ChannelId, GuildId, UserId};
use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{
    sync::{mpsc, oneshot},
    time::Instant,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    audio::{
        occupancy::{self, OccupancyChange},
        queue::{GuildPlaybackState, LoopMode, QueueKind, QueueSnapshot, QueuedTrack, TransitionGuard},
        telemetry::{EventBus, IdleReason, LifecycleEvent},
        transport::{Announcer, Completion, TrackOutcome, TransportFactory, VoiceTransport},
    },
    config::Config,
    error::{PlaybackError, PlaybackResult},
    library::CatalogHandle,
};

const NOTHING_PLAYING: &str = "No hay nada reproduciéndose";

/// Parámetros del reproductor que salen de la configuración.
#[derive(Debug, Clone)]
pub struct PlayerSettings {
    pub min_queue_depth: usize,
    pub max_queue_size: usize,
    pub alone_timeout: Duration,
    pub alone_tick: Duration,
    pub disconnect_grace: Duration,
    pub max_consecutive_failures: u32,
}

impl PlayerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            min_queue_depth: config.min_queue_depth,
            max_queue_size: config.max_queue_size,
            alone_timeout: config.alone_timeout(),
            alone_tick: config.alone_tick(),
            disconnect_grace: config.disconnect_grace(),
            max_consecutive_failures: config.max_consecutive_failures,
        }
    }
}

/// Resultado de un `/play`.
#[derive(Debug, Clone)]
pub enum PlayOutcome {
    /// El guild estaba libre y la pista empezó a sonar.
    Started(QueuedTrack),
    /// Ya sonaba algo: la pista fue a la cola prioritaria.
    Queued { position: usize, item: QueuedTrack },
}

type Reply<T> = oneshot::Sender<PlaybackResult<T>>;

/// Mensajes que procesa el actor de un guild, uno detrás de otro.
enum PlayerCommand {
    // Comandos de usuario
    Play {
        item: QueuedTrack,
        channel_id: ChannelId,
        reply: Reply<PlayOutcome>,
    },
    Skip { reply: Reply<()> },
    Stop { reply: Reply<()> },
    TogglePause { reply: Reply<bool> },
    ClearQueue { reply: Reply<usize> },
    CycleLoop { reply: Reply<LoopMode> },
    Snapshot { reply: oneshot::Sender<QueueSnapshot> },

    // Eventos del canal de voz
    Occupancy { humans: usize },
    /// El gateway confirmó al bot en un canal.
    VoiceConnected { channel_id: ChannelId },
    /// El bot salió del canal `from` (si la caché lo sabía).
    Disconnected { from: Option<ChannelId> },

    // Continuaciones internas
    TrackEnded { generation: u64, outcome: TrackOutcome },
    Replenish,
    AloneTick { since: Instant },
    GraceExpired { token: u64 },
}

#[derive(Clone)]
struct GuildHandle {
    player_id: u64,
    tx: mpsc::UnboundedSender<PlayerCommand>,
}

/// Registro de reproductores por guild.
///
/// Cada guild con conexión de voz tiene un actor propio que es el único que
/// muta su [`GuildPlaybackState`]; el manager sólo resuelve la petición y le
/// pasa el mensaje.
pub struct PlaybackManager {
    players: Arc<DashMap<GuildId, GuildHandle>>,
    catalog: Arc<CatalogHandle>,
    transports: Arc<dyn TransportFactory>,
    announcer: Arc<dyn Announcer>,
    events: EventBus,
    settings: PlayerSettings,
    seeds: parking_lot::Mutex<StdRng>,
    next_player_id: AtomicU64,
}

impl PlaybackManager {
    pub fn new(
        catalog: Arc<CatalogHandle>,
        transports: Arc<dyn TransportFactory>,
        announcer: Arc<dyn Announcer>,
        events: EventBus,
        settings: PlayerSettings,
        seed: Option<u64>,
    ) -> Self {
        let seeds = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Self {
            players: Arc::new(DashMap::new()),
            catalog,
            transports,
            announcer,
            events,
            settings,
            seeds: parking_lot::Mutex::new(seeds),
            next_player_id: AtomicU64::new(1),
        }
    }

    pub fn catalog(&self) -> &Arc<CatalogHandle> {
        &self.catalog
    }

    /// Reproduce (o encola) una canción del catálogo.
    ///
    /// `name` puede ser el id o el nombre mostrado de la pista. Una canción
    /// desconocida se rechaza antes de tocar el estado del guild.
    pub async fn play(
        &self,
        guild_id: GuildId,
        name: &str,
        channel_id: ChannelId,
        requested_by: UserId,
    ) -> PlaybackResult<PlayOutcome> {
        let track = self
            .catalog
            .snapshot()
            .resolve(name)
            .ok_or_else(|| PlaybackError::CatalogMiss(name.to_string()))?;
        let item = QueuedTrack::requested(track, requested_by);

        // Un segundo intento si el actor estaba cerrándose
        for _ in 0..2 {
            let handle = self.handle_or_spawn(guild_id);
            let (reply, rx) = oneshot::channel();
            let command = PlayerCommand::Play {
                item: item.clone(),
                channel_id,
                reply,
            };

            if handle.tx.send(command).is_ok() {
                match rx.await {
                    Ok(Err(PlaybackError::PlayerGone)) | Err(_) => {}
                    Ok(result) => return result,
                }
            }

            debug!("🔄 Reproductor de guild {} cerrado, creando uno nuevo", guild_id);
            self.forget(guild_id, handle.player_id);
        }

        Err(PlaybackError::PlayerGone)
    }

    pub async fn skip(&self, guild_id: GuildId) -> PlaybackResult<()> {
        self.request(guild_id, |reply| PlayerCommand::Skip { reply }).await
    }

    pub async fn stop(&self, guild_id: GuildId) -> PlaybackResult<()> {
        self.request(guild_id, |reply| PlayerCommand::Stop { reply }).await
    }

    /// Alterna la pausa de usuario. Devuelve si quedó pausado.
    pub async fn toggle_pause(&self, guild_id: GuildId) -> PlaybackResult<bool> {
        self.request(guild_id, |reply| PlayerCommand::TogglePause { reply }).await
    }

    pub async fn clear_queue(&self, guild_id: GuildId) -> PlaybackResult<usize> {
        self.request(guild_id, |reply| PlayerCommand::ClearQueue { reply }).await
    }

    pub async fn cycle_loop(&self, guild_id: GuildId) -> PlaybackResult<LoopMode> {
        self.request(guild_id, |reply| PlayerCommand::CycleLoop { reply }).await
    }

    /// Vista del estado para la UI; `None` si el guild está en Idle.
    pub async fn state(&self, guild_id: GuildId) -> Option<QueueSnapshot> {
        let handle = self.handle(guild_id)?;
        let (reply, rx) = oneshot::channel();
        handle.tx.send(PlayerCommand::Snapshot { reply }).ok()?;
        rx.await.ok()
    }

    /// Nuevo recuento de humanos en el canal del bot.
    pub fn occupancy_changed(&self, guild_id: GuildId, humans: usize) {
        if let Some(handle) = self.handle(guild_id) {
            let _ = handle.tx.send(PlayerCommand::Occupancy { humans });
        }
    }

    /// El gateway informa que el bot está en `channel_id`.
    pub fn voice_connected(&self, guild_id: GuildId, channel_id: ChannelId) {
        if let Some(handle) = self.handle(guild_id) {
            let _ = handle.tx.send(PlayerCommand::VoiceConnected { channel_id });
        }
    }

    /// El bot salió del canal de voz. Puede ser el eco tardío de un stop
    /// anterior; el actor decide si va con su conexión.
    pub fn voice_disconnected(&self, guild_id: GuildId, from: Option<ChannelId>) {
        if let Some(handle) = self.handle(guild_id) {
            let _ = handle.tx.send(PlayerCommand::Disconnected { from });
        }
    }

    pub fn is_active(&self, guild_id: GuildId) -> bool {
        self.players.contains_key(&guild_id)
    }

    pub fn active_guilds(&self) -> usize {
        self.players.len()
    }

    async fn request<T>(
        &self,
        guild_id: GuildId,
        make: impl FnOnce(Reply<T>) -> PlayerCommand,
    ) -> PlaybackResult<T> {
        let idle = PlaybackError::InvalidStateTransition(NOTHING_PLAYING);
        let handle = self.handle(guild_id).ok_or_else(|| idle.clone())?;
        let (reply, rx) = oneshot::channel();

        if handle.tx.send(make(reply)).is_err() {
            return Err(idle);
        }

        rx.await.unwrap_or(Err(idle))
    }

    fn handle(&self, guild_id: GuildId) -> Option<GuildHandle> {
        self.players.get(&guild_id).map(|entry| entry.value().clone())
    }

    fn handle_or_spawn(&self, guild_id: GuildId) -> GuildHandle {
        self.players
            .entry(guild_id)
            .or_insert_with(|| self.spawn_player(guild_id))
            .value()
            .clone()
    }

    fn forget(&self, guild_id: GuildId, player_id: u64) {
        self.players
            .remove_if(&guild_id, |_, handle| handle.player_id == player_id);
    }

    fn spawn_player(&self, guild_id: GuildId) -> GuildHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let player_id = self.next_player_id.fetch_add(1, Ordering::Relaxed);
        let rng = StdRng::seed_from_u64(self.seeds.lock().gen());

        let player = GuildPlayer {
            guild_id,
            player_id,
            state: GuildPlaybackState::new(self.settings.max_queue_size),
            phase: Phase::Live,
            channel_id: None,
            voice_confirmed: false,
            generation: 0,
            consecutive_failures: 0,
            countdown: None,
            pending_idle: None,
            timer_seq: 0,
            rng,
            transport: self.transports.create(guild_id),
            announcer: self.announcer.clone(),
            catalog: self.catalog.clone(),
            events: self.events.clone(),
            settings: self.settings.clone(),
            players: self.players.clone(),
            tx: tx.clone(),
        };

        tokio::spawn(player.run(rx));
        GuildHandle { player_id, tx }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Live,
    /// Ya desconectado; sólo espera el fin de la pista detenida.
    Stopping,
    Finished,
}

/// Actor de un guild: único escritor de su estado de reproducción.
struct GuildPlayer {
    guild_id: GuildId,
    player_id: u64,
    state: GuildPlaybackState,
    phase: Phase,
    channel_id: Option<ChannelId>,
    /// El gateway ya mostró al bot en `channel_id` desde que conectamos.
    voice_confirmed: bool,
    /// Sube con cada pista arrancada; descarta finales de pistas viejas.
    generation: u64,
    consecutive_failures: u32,
    countdown: Option<CancellationToken>,
    /// Desconexión por cola vacía pendiente: (token del temporizador, motivo).
    pending_idle: Option<(u64, IdleReason)>,
    timer_seq: u64,
    rng: StdRng,
    transport: Arc<dyn VoiceTransport>,
    announcer: Arc<dyn Announcer>,
    catalog: Arc<CatalogHandle>,
    events: EventBus,
    settings: PlayerSettings,
    players: Arc<DashMap<GuildId, GuildHandle>>,
    tx: mpsc::UnboundedSender<PlayerCommand>,
}

impl GuildPlayer {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<PlayerCommand>) {
        info!("🎛️ Reproductor iniciado para guild {}", self.guild_id);

        while let Some(command) = rx.recv().await {
            self.handle(command).await;
            if self.phase == Phase::Finished {
                break;
            }
        }

        self.cancel_countdown();
        self.detach();
        info!("👋 Reproductor finalizado para guild {}", self.guild_id);
    }

    async fn handle(&mut self, command: PlayerCommand) {
        if self.phase == Phase::Stopping {
            self.handle_while_stopping(command);
            return;
        }

        match command {
            PlayerCommand::Play { item, channel_id, reply } => {
                let _ = reply.send(self.play(item, channel_id).await);
                // Si la pista pedida no arrancó, se sigue con la cola
                if self.phase == Phase::Live
                    && self.channel_id.is_some()
                    && self.state.now_playing.is_none()
                    && self.pending_idle.is_none()
                {
                    self.advance(None).await;
                }
            }
            PlayerCommand::Skip { reply } => {
                let _ = reply.send(self.skip().await);
            }
            PlayerCommand::Stop { reply } => {
                self.teardown(IdleReason::Stopped).await;
                let _ = reply.send(Ok(()));
            }
            PlayerCommand::TogglePause { reply } => {
                let _ = reply.send(self.toggle_pause().await);
            }
            PlayerCommand::ClearQueue { reply } => {
                let cleared = self.state.clear_queues();
                self.schedule_replenish_if_needed();
                let _ = reply.send(Ok(cleared));
            }
            PlayerCommand::CycleLoop { reply } => {
                self.state.loop_mode = self.state.loop_mode.next();
                info!("🔁 Modo loop en guild {}: {:?}", self.guild_id, self.state.loop_mode);
                let _ = reply.send(Ok(self.state.loop_mode));
            }
            PlayerCommand::Snapshot { reply } => {
                let _ = reply.send(self.state.snapshot());
            }
            PlayerCommand::Occupancy { humans } => self.occupancy(humans).await,
            PlayerCommand::VoiceConnected { channel_id } => self.voice_connected(channel_id),
            PlayerCommand::Disconnected { from } => {
                let ours = self.voice_confirmed && from.map_or(true, |from| Some(from) == self.channel_id);
                if !ours {
                    debug!(
                        "🔌 Salida de voz de una conexión anterior ignorada en guild {}",
                        self.guild_id
                    );
                    return;
                }
                warn!("🔌 Bot desconectado del canal de voz en guild {}", self.guild_id);
                self.teardown(IdleReason::Disconnected).await;
            }
            PlayerCommand::TrackEnded { generation, outcome } => {
                self.track_ended(generation, outcome).await;
            }
            PlayerCommand::Replenish => {
                self.state.finish_replenish();
                self.replenish_now();
            }
            PlayerCommand::AloneTick { since } => self.alone_tick(since).await,
            PlayerCommand::GraceExpired { token } => {
                if let Some((pending, reason)) = self.pending_idle {
                    if pending == token && self.state.now_playing.is_none() {
                        self.teardown(reason).await;
                    }
                }
            }
        }
    }

    /// Tras desconectar sólo queda consumir el fin de la pista detenida.
    fn handle_while_stopping(&mut self, command: PlayerCommand) {
        let idle = PlaybackError::InvalidStateTransition(NOTHING_PLAYING);
        match command {
            PlayerCommand::Play { reply, .. } => {
                let _ = reply.send(Err(PlaybackError::PlayerGone));
            }
            PlayerCommand::Stop { reply } => {
                let _ = reply.send(Ok(()));
            }
            PlayerCommand::Skip { reply } => {
                let _ = reply.send(Err(idle));
            }
            PlayerCommand::TogglePause { reply } => {
                let _ = reply.send(Err(idle));
            }
            PlayerCommand::ClearQueue { reply } => {
                let _ = reply.send(Err(idle));
            }
            PlayerCommand::CycleLoop { reply } => {
                let _ = reply.send(Err(idle));
            }
            PlayerCommand::Snapshot { reply } => {
                let _ = reply.send(self.state.snapshot());
            }
            PlayerCommand::TrackEnded { generation, .. } if generation == self.generation => {
                if std::mem::take(&mut self.state.transition_guard) == TransitionGuard::StopRequested {
                    debug!("⏹️ Fin de pista por stop consumido en guild {}", self.guild_id);
                }
                self.phase = Phase::Finished;
            }
            PlayerCommand::GraceExpired { .. } => {
                debug!("⌛ El transporte no confirmó el stop en guild {}", self.guild_id);
                self.phase = Phase::Finished;
            }
            _ => {}
        }
    }

    async fn play(&mut self, item: QueuedTrack, channel_id: ChannelId) -> PlaybackResult<PlayOutcome> {
        match self.channel_id {
            Some(current) if current != channel_id => return Err(PlaybackError::DifferentChannel),
            Some(_) => {}
            None => {
                if let Err(e) = self.transport.connect(channel_id).await {
                    error!("❌ No se pudo conectar al canal {}: {}", channel_id, e);
                    self.phase = Phase::Finished;
                    return Err(e);
                }
                info!("🔊 Conectado al canal {} en guild {}", channel_id, self.guild_id);
                self.channel_id = Some(channel_id);
            }
        }

        if self.pending_idle.take().is_some() {
            debug!("⏳ Desconexión pendiente cancelada por /play en guild {}", self.guild_id);
        }

        if self.state.now_playing.is_some() {
            let position = self.state.enqueue(item.clone(), QueueKind::Priority)?;
            self.events.emit(LifecycleEvent::Queued {
                track_id: item.id().to_string(),
                queue: QueueKind::Priority,
                guild_id: self.guild_id,
            });
            return Ok(PlayOutcome::Queued { position, item });
        }

        self.consecutive_failures = 0;
        let started = self.start_track(item.clone()).await;
        self.replenish_now();

        match started {
            Ok(()) => Ok(PlayOutcome::Started(item)),
            Err(reason) => Err(PlaybackError::Transport(reason)),
        }
    }

    async fn skip(&mut self) -> PlaybackResult<()> {
        if self.state.now_playing.is_none() {
            return Err(PlaybackError::InvalidStateTransition(NOTHING_PLAYING));
        }

        if self.state.transition_guard != TransitionGuard::None {
            debug!("⏭️ Skip ya pendiente en guild {}", self.guild_id);
            return Ok(());
        }

        self.state.transition_guard = TransitionGuard::SkipRequested;
        self.transport.stop().await;
        info!("⏭️ Skip solicitado en guild {}", self.guild_id);
        Ok(())
    }

    async fn toggle_pause(&mut self) -> PlaybackResult<bool> {
        if self.state.now_playing.is_none() {
            return Err(PlaybackError::InvalidStateTransition(NOTHING_PLAYING));
        }

        self.state.user_paused = !self.state.user_paused;
        if self.state.user_paused {
            self.transport.pause().await;
            info!("⏸️ Reproducción pausada en guild {}", self.guild_id);
        } else if !self.state.occupancy_paused {
            self.transport.resume().await;
            info!("▶️ Reproducción reanudada en guild {}", self.guild_id);
        }

        Ok(self.state.user_paused)
    }

    /// Arranca una pista: anuncio, transporte y vigilancia de su final.
    async fn start_track(&mut self, item: QueuedTrack) -> Result<(), String> {
        self.generation += 1;
        let generation = self.generation;
        let track = item.track.clone();
        self.state.now_playing = Some(item);
        self.state.play_started_at = None;

        let announcement = format!("Ahora suena: {}", track.display_name());
        if let Err(e) = self.announcer.announce(self.guild_id, &announcement).await {
            warn!("📢 Anuncio fallido en guild {}: {:?}", self.guild_id, e);
        }

        match self.transport.play(&track).await {
            Ok(completion) => {
                self.state.play_started_at = Some(chrono::Utc::now());
                if self.state.is_paused() {
                    self.transport.pause().await;
                }
                self.watch(generation, completion);
                info!("🎵 Reproduciendo: {} en guild {}", track.display_name(), self.guild_id);
                self.events.emit(LifecycleEvent::Started {
                    track,
                    guild_id: self.guild_id,
                });
                Ok(())
            }
            Err(e) => {
                let reason = e.to_string();
                warn!("❌ No se pudo reproducir {}: {}", track.display_name(), reason);
                self.state.now_playing = None;
                self.consecutive_failures += 1;
                self.events.emit(LifecycleEvent::Failed {
                    track_id: track.id.clone(),
                    guild_id: self.guild_id,
                    reason: reason.clone(),
                });
                Err(reason)
            }
        }
    }

    /// Reenvía al actor el final de la pista, una sola vez.
    fn watch(&self, generation: u64, completion: Completion) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let outcome = completion
                .await
                .unwrap_or_else(|_| TrackOutcome::Failed("el transporte soltó la pista".into()));
            let _ = tx.send(PlayerCommand::TrackEnded { generation, outcome });
        });
    }

    async fn track_ended(&mut self, generation: u64, outcome: TrackOutcome) {
        if generation != self.generation {
            debug!("Fin de pista obsoleto ignorado (gen {} != {})", generation, self.generation);
            return;
        }

        let guard = std::mem::take(&mut self.state.transition_guard);
        let Some(finished) = self.state.now_playing.take() else {
            return;
        };
        self.state.play_started_at = None;

        let track_id = finished.id().to_string();
        let guild_id = self.guild_id;
        let replay = match (guard, outcome) {
            (TransitionGuard::StopRequested, _) => return,
            (TransitionGuard::SkipRequested, _) => {
                self.events.emit(LifecycleEvent::Skipped { track_id, guild_id });
                false
            }
            (TransitionGuard::None, TrackOutcome::Finished) => {
                self.consecutive_failures = 0;
                self.events.emit(LifecycleEvent::Completed { track_id, guild_id });
                true
            }
            (TransitionGuard::None, TrackOutcome::Failed(reason)) => {
                warn!("❌ Error en track para guild {}: {}", guild_id, reason);
                self.consecutive_failures += 1;
                self.events.emit(LifecycleEvent::Failed { track_id, guild_id, reason });
                false
            }
        };

        let next = match self.state.loop_mode {
            LoopMode::Single if replay => Some(finished),
            LoopMode::Queue if replay || guard == TransitionGuard::SkipRequested => {
                self.state.recycle(finished);
                self.state.dequeue_next()
            }
            _ => self.state.dequeue_next(),
        };

        self.advance(next).await;
    }

    /// Arranca la siguiente pista disponible o programa la desconexión.
    async fn advance(&mut self, mut next: Option<QueuedTrack>) {
        loop {
            if self.consecutive_failures >= self.settings.max_consecutive_failures {
                warn!(
                    "⚠️ {} fallos seguidos en guild {}, dejando de reproducir",
                    self.consecutive_failures, self.guild_id
                );
                self.begin_idle_grace(IdleReason::TooManyFailures);
                return;
            }

            let candidate = match next.take().or_else(|| self.state.dequeue_next()) {
                Some(candidate) => candidate,
                None => {
                    self.replenish_now();
                    match self.state.dequeue_next() {
                        Some(candidate) => candidate,
                        None => {
                            self.begin_idle_grace(IdleReason::NothingToPlay);
                            return;
                        }
                    }
                }
            };

            if self.start_track(candidate).await.is_ok() {
                self.schedule_replenish_if_needed();
                return;
            }
        }
    }

    fn replenish_now(&mut self) {
        let catalog = self.catalog.snapshot();
        let added = self
            .state
            .replenish(&catalog, self.settings.min_queue_depth, &mut self.rng);

        for track in added {
            self.events.emit(LifecycleEvent::Queued {
                track_id: track.id.clone(),
                queue: QueueKind::Regular,
                guild_id: self.guild_id,
            });
        }
    }

    /// Un único relleno en vuelo por guild; se ejecuta como otro mensaje del actor.
    fn schedule_replenish_if_needed(&mut self) {
        if self.state.claim_replenish(self.settings.min_queue_depth) {
            let _ = self.tx.send(PlayerCommand::Replenish);
        }
    }

    fn begin_idle_grace(&mut self, reason: IdleReason) {
        self.state.now_playing = None;
        let token = self.arm_timer(self.settings.disconnect_grace);
        self.pending_idle = Some((token, reason));
        info!(
            "⏳ Nada que reproducir en guild {}, desconectando en {}",
            self.guild_id,
            humantime::format_duration(self.settings.disconnect_grace)
        );
    }

    fn arm_timer(&mut self, delay: Duration) -> u64 {
        self.timer_seq += 1;
        let token = self.timer_seq;
        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(PlayerCommand::GraceExpired { token });
        });
        token
    }

    /// Desconecta y descarta el estado del guild.
    ///
    /// Si había una pista sonando, el actor sigue vivo hasta consumir su fin
    /// (o hasta que venza la gracia) pero ya no está en el registro.
    async fn teardown(&mut self, reason: IdleReason) {
        let playing = self.state.now_playing.is_some();
        if playing {
            self.state.transition_guard = TransitionGuard::StopRequested;
        }

        self.cancel_countdown();
        self.pending_idle = None;
        if reason == IdleReason::Stopped {
            self.state.clear_queues();
        }

        self.transport.stop().await;
        self.state.now_playing = None;
        self.state.play_started_at = None;
        self.transport.disconnect().await;
        self.detach();

        info!("⏹️ Guild {} en reposo ({:?})", self.guild_id, reason);
        self.events.emit(LifecycleEvent::Idle {
            guild_id: self.guild_id,
            reason,
        });

        if playing {
            self.phase = Phase::Stopping;
            self.arm_timer(self.settings.disconnect_grace);
        } else {
            self.phase = Phase::Finished;
        }
    }

    fn voice_connected(&mut self, channel_id: ChannelId) {
        match self.channel_id {
            Some(current) if current == channel_id => {
                if !self.voice_confirmed {
                    debug!("🔊 Conexión confirmada en canal {} de guild {}", channel_id, self.guild_id);
                }
                self.voice_confirmed = true;
            }
            Some(current) if self.voice_confirmed => {
                info!("🔀 Bot movido del canal {} al {} en guild {}", current, channel_id, self.guild_id);
                self.channel_id = Some(channel_id);
            }
            _ => debug!("Estado de voz anterior a la conexión ignorado en guild {}", self.guild_id),
        }
    }

    async fn occupancy(&mut self, humans: usize) {
        match occupancy::classify(humans, self.state.alone_since) {
            OccupancyChange::BecameAlone => {
                let since = Instant::now();
                self.state.alone_since = Some(since);
                self.state.occupancy_paused = true;
                if self.state.now_playing.is_some() && !self.state.user_paused {
                    self.transport.pause().await;
                }

                info!(
                    "👤 Solo en el canal de guild {}, desconexión en {}",
                    self.guild_id,
                    humantime::format_duration(self.settings.alone_timeout)
                );

                let token = CancellationToken::new();
                self.countdown = Some(token.clone());
                let tx = self.tx.clone();
                occupancy::spawn_countdown(
                    token,
                    since,
                    self.settings.alone_timeout,
                    self.settings.alone_tick,
                    move |since| tx.send(PlayerCommand::AloneTick { since }).is_ok(),
                );
            }
            OccupancyChange::Returned => {
                self.state.alone_since = None;
                self.cancel_countdown();
                self.state.occupancy_paused = false;
                if self.state.now_playing.is_some() && !self.state.user_paused {
                    self.transport.resume().await;
                }
                info!("👥 Volvieron usuarios al canal de guild {}", self.guild_id);
                self.events.emit(LifecycleEvent::HumansReturned {
                    guild_id: self.guild_id,
                });
            }
            OccupancyChange::StillAlone | OccupancyChange::StillOccupied => {}
        }
    }

    async fn alone_tick(&mut self, since: Instant) {
        if self.state.alone_since != Some(since) {
            return;
        }

        let elapsed = since.elapsed();
        if elapsed >= self.settings.alone_timeout {
            info!("⌛ Tiempo a solas agotado en guild {}", self.guild_id);
            self.teardown(IdleReason::AloneTimeout).await;
        } else {
            self.events.emit(LifecycleEvent::AloneCountdown {
                guild_id: self.guild_id,
                remaining: self.settings.alone_timeout - elapsed,
            });
        }
    }

    fn cancel_countdown(&mut self) {
        if let Some(token) = self.countdown.take() {
            token.cancel();
        }
    }

    fn detach(&self) {
        self.players
            .remove_if(&self.guild_id, |_, handle| handle.player_id == self.player_id);
    }
}
