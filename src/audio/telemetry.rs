use async_trait::async_trait;
use serenity::model::id::GuildId;
use std::{sync::Arc, time::Duration};
use tracing::{debug, info};

use super::queue::QueueKind;
use crate::library::TrackDescriptor;

/// Por qué un guild volvió a `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleReason {
    /// Cola vacía incluso después de rellenar.
    NothingToPlay,
    /// Demasiados fallos de transporte seguidos.
    TooManyFailures,
    Stopped,
    AloneTimeout,
    /// El bot fue sacado del canal desde fuera.
    Disconnected,
}

/// Eventos de ciclo de vida que emite el controlador.
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleEvent {
    Queued {
        track_id: String,
        queue: QueueKind,
        guild_id: GuildId,
    },
    Started {
        track: Arc<TrackDescriptor>,
        guild_id: GuildId,
    },
    Completed {
        track_id: String,
        guild_id: GuildId,
    },
    Skipped {
        track_id: String,
        guild_id: GuildId,
    },
    Failed {
        track_id: String,
        guild_id: GuildId,
        reason: String,
    },
    Idle {
        guild_id: GuildId,
        reason: IdleReason,
    },
    AloneCountdown {
        guild_id: GuildId,
        remaining: Duration,
    },
    HumansReturned {
        guild_id: GuildId,
    },
}

impl LifecycleEvent {
    pub fn guild_id(&self) -> GuildId {
        match self {
            LifecycleEvent::Queued { guild_id, .. }
            | LifecycleEvent::Started { guild_id, .. }
            | LifecycleEvent::Completed { guild_id, .. }
            | LifecycleEvent::Skipped { guild_id, .. }
            | LifecycleEvent::Failed { guild_id, .. }
            | LifecycleEvent::Idle { guild_id, .. }
            | LifecycleEvent::AloneCountdown { guild_id, .. }
            | LifecycleEvent::HumansReturned { guild_id } => *guild_id,
        }
    }
}

/// Consumidor de eventos (estadísticas, presencia...).
#[async_trait]
pub trait EventSubscriber: Send + Sync {
    async fn handle(&self, event: &LifecycleEvent);
}

/// Entrega asíncrona de eventos: `emit` nunca bloquea al controlador.
#[derive(Clone)]
pub struct EventBus {
    tx: flume::Sender<LifecycleEvent>,
}

impl EventBus {
    /// Arranca la tarea despachadora con los suscriptores dados.
    pub fn start(subscribers: Vec<Arc<dyn EventSubscriber>>) -> Self {
        let (tx, rx) = flume::unbounded();
        tokio::spawn(dispatch(rx, subscribers));
        info!("📡 Bus de eventos iniciado");
        Self { tx }
    }

    /// Bus sin despachador; los eventos quedan en el receptor devuelto.
    #[cfg(test)]
    pub fn capture() -> (Self, flume::Receiver<LifecycleEvent>) {
        let (tx, rx) = flume::unbounded();
        (Self { tx }, rx)
    }

    pub fn emit(&self, event: LifecycleEvent) {
        if self.tx.send(event).is_err() {
            debug!("Bus de eventos cerrado, evento descartado");
        }
    }
}

async fn dispatch(rx: flume::Receiver<LifecycleEvent>, subscribers: Vec<Arc<dyn EventSubscriber>>) {
    while let Ok(event) = rx.recv_async().await {
        debug!("📡 {:?}", event);
        for subscriber in &subscribers {
            subscriber.handle(&event).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<LifecycleEvent>>,
    }

    #[async_trait]
    impl EventSubscriber for Recorder {
        async fn handle(&self, event: &LifecycleEvent) {
            self.seen.lock().push(event.clone());
        }
    }

    #[tokio::test]
    async fn test_events_reach_every_subscriber_in_order() {
        let first = Arc::new(Recorder::default());
        let second = Arc::new(Recorder::default());
        let bus = EventBus::start(vec![first.clone(), second.clone()]);
        let guild_id = GuildId::new(9);

        bus.emit(LifecycleEvent::Completed { track_id: "a".into(), guild_id });
        bus.emit(LifecycleEvent::Skipped { track_id: "b".into(), guild_id });

        for _ in 0..50 {
            if second.seen.lock().len() == 2 {
                break;
            }
            tokio::task::yield_now().await;
        }

        assert_eq!(first.seen.lock().len(), 2);
        assert!(matches!(second.seen.lock()[1], LifecycleEvent::Skipped { .. }));
        assert_eq!(second.seen.lock()[0].guild_id(), guild_id);
    }
}
