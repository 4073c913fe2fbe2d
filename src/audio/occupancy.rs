//! Vigilancia de ocupación del canal de voz.
//!
//! El actor del guild clasifica cada cambio de miembros con [`classify`] y,
//! cuando el bot se queda solo, lanza una cuenta atrás cancelable con
//! [`spawn_countdown`]. La cuenta atrás sólo envía ticks; quien decide si el
//! tick sigue vigente es el actor, comparando `alone_since` en cada uno.

use std::time::Duration;
use tokio::time::{interval_at, sleep_until, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OccupancyChange {
    /// No quedan humanos y antes los había.
    BecameAlone,
    /// Sigue sin humanos; la cuenta atrás continúa.
    StillAlone,
    /// Volvió al menos un humano durante la cuenta atrás.
    Returned,
    StillOccupied,
}

pub fn classify(humans: usize, alone_since: Option<Instant>) -> OccupancyChange {
    match (humans, alone_since) {
        (0, None) => OccupancyChange::BecameAlone,
        (0, Some(_)) => OccupancyChange::StillAlone,
        (_, Some(_)) => OccupancyChange::Returned,
        (_, None) => OccupancyChange::StillOccupied,
    }
}

/// Cuenta atrás de soledad. Llama a `on_tick(since)` cada `tick` y una última
/// vez al vencer `since + timeout`; termina al cancelarse el token o cuando
/// `on_tick` devuelve `false` (el actor ya no existe).
pub fn spawn_countdown<F>(
    token: CancellationToken,
    since: Instant,
    timeout: Duration,
    tick: Duration,
    on_tick: F,
) where
    F: Fn(Instant) -> bool + Send + 'static,
{
    tokio::spawn(async move {
        let deadline = since + timeout;
        let expiry = sleep_until(deadline);
        tokio::pin!(expiry);

        let mut ticks = interval_at(since + tick, tick);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!("⏹️ Cuenta atrás cancelada");
                    break;
                }
                _ = &mut expiry => {
                    on_tick(since);
                    break;
                }
                _ = ticks.tick() => {
                    if !on_tick(since) {
                        break;
                    }
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    #[test]
    fn test_classify() {
        let now = Instant::now();
        assert_eq!(classify(0, None), OccupancyChange::BecameAlone);
        assert_eq!(classify(0, Some(now)), OccupancyChange::StillAlone);
        assert_eq!(classify(3, Some(now)), OccupancyChange::Returned);
        assert_eq!(classify(1, None), OccupancyChange::StillOccupied);
    }

    #[tokio::test(start_paused = true)]
    async fn test_countdown_ticks_until_deadline() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = ticks.clone();

        spawn_countdown(
            CancellationToken::new(),
            Instant::now(),
            Duration::from_secs(60),
            Duration::from_secs(15),
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                true
            },
        );

        tokio::time::sleep(Duration::from_secs(120)).await;
        // 15, 30, 45 y el vencimiento a los 60 (que gana al tick simultáneo o lo sigue)
        let seen = ticks.load(Ordering::SeqCst);
        assert!((4..=5).contains(&seen), "ticks: {}", seen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_countdown_stops_ticking() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = ticks.clone();
        let token = CancellationToken::new();

        spawn_countdown(
            token.clone(),
            Instant::now(),
            Duration::from_secs(60),
            Duration::from_secs(15),
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                true
            },
        );

        tokio::time::sleep(Duration::from_secs(20)).await;
        token.cancel();
        tokio::time::sleep(Duration::from_secs(100)).await;

        assert_eq!(ticks.load(Ordering::SeqCst), 1);
    }
}
