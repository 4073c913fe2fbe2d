use thiserror::Error;

/// Errores del núcleo de reproducción.
///
/// Todo lo que llega aquí se rechaza en el borde del comando y nunca muta el
/// estado del guild, salvo `Transport`, que el controlador absorbe y convierte
/// en avance de la cola.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlaybackError {
    /// La canción pedida no existe en el catálogo.
    #[error("La canción `{0}` no está en la biblioteca")]
    CatalogMiss(String),

    /// Comando ilegal para el estado actual (skip sin reproducción, etc.).
    #[error("{0}")]
    InvalidStateTransition(&'static str),

    #[error("No estás conectado a un canal de voz")]
    NotInVoiceChannel,

    #[error("Ya estoy conectado a otro canal de voz")]
    DifferentChannel,

    #[error("La cola está llena (máximo {0} canciones)")]
    QueueFull(usize),

    /// Fallo del transporte de voz (conexión o arranque de pista).
    #[error("Error de transporte de voz: {0}")]
    Transport(String),

    /// El actor del guild terminó mientras el comando estaba en vuelo.
    #[error("El reproductor de este servidor ya no está activo")]
    PlayerGone,
}

pub type PlaybackResult<T> = Result<T, PlaybackError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_facing_messages() {
        assert_eq!(
            PlaybackError::CatalogMiss("Intro - Nadie".into()).to_string(),
            "La canción `Intro - Nadie` no está en la biblioteca"
        );
        assert_eq!(
            PlaybackError::InvalidStateTransition("No hay nada reproduciéndose").to_string(),
            "No hay nada reproduciéndose"
        );
    }
}
