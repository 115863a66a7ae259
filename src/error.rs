//! Typed errors returned by every playback operation.
//!
//! Validation and domain-rule failures are raised before any state is
//! touched, so a caller that receives one of these can assume the guild
//! record is exactly as it was before the call.

use thiserror::Error;

pub type MusicResult<T> = std::result::Result<T, MusicError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MusicError {
    // Validación
    #[error("Índice {index} fuera de rango (la cola tiene {len} elementos)")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("Debes estar en un canal de voz")]
    UserNotInVoice,

    // Reglas de dominio
    #[error("No se puede eliminar la canción que está sonando")]
    IsCurrentTrack,
    #[error("La cola está vacía")]
    QueueEmpty,
    #[error("No hay nada reproduciéndose")]
    NotPlaying,
    #[error("El bot no está conectado a un canal de voz")]
    NotConnected,

    // Backend
    #[error("Backend de audio no disponible: {0}")]
    BackendUnavailable(String),
    #[error("No se encontraron resultados para: {0}")]
    NotFound(String),
    #[error("No se pudo conectar al canal de voz: {0}")]
    VoiceConnectionFailed(String),
}

impl MusicError {
    /// True for failures caused by the caller's input or the guild's current
    /// state, as opposed to an external collaborator misbehaving.
    pub fn is_user_error(&self) -> bool {
        !matches!(
            self,
            MusicError::BackendUnavailable(_) | MusicError::VoiceConnectionFailed(_)
        )
    }
}
