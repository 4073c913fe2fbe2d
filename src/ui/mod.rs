//! Embeds y botones de la interfaz en Discord.

pub mod buttons;
pub mod embeds;
