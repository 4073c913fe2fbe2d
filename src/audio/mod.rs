//! # Audio Module
//!
//! Planificador de reproducción por guild con cola doble.
//!
//! ## Architecture
//!
//! ### [`player`] - Playback Controller
//! - Un actor por guild: único escritor de su estado
//! - Decide la siguiente pista según loop y prioridad
//! - Arbitra skip/stop contra el fin natural de la pista
//!
//! ### [`queue`] - Queue Manager
//! - Cola prioritaria (peticiones) y regular (relleno aleatorio)
//! - Relleno hasta la profundidad mínima sin duplicados en vuelo
//!
//! ### [`occupancy`] - Voice Occupancy Monitor
//! - Pausa al quedarse solo y desconecta al vencer la cuenta atrás
//!
//! ### [`telemetry`] - Lifecycle events
//! - Bus asíncrono hacia estadísticas y presencia
//!
//! ### [`transport`] / [`voice`] - Voice transport
//! - Costura hacia songbird y el anunciador
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! let outcome = manager.play(guild_id, "Blue Monday - New Order", channel_id, user_id).await?;
//! manager.skip(guild_id).await?;
//! manager.stop(guild_id).await?;
//! ```

pub mod occupancy;
pub mod player;
pub mod queue;
pub mod telemetry;
pub mod transport;
pub mod voice;
