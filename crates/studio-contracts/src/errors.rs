use thiserror::Error;

pub type StudioResult<T> = Result<T, StudioError>;

/// Failure categories surfaced by the studio.
///
/// Every variant carries a message meant for the user. Translation and
/// analysis failures are expected to be absorbed by the caller, which falls
/// back to the untranslated instruction text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StudioError {
    #[error("{0}")]
    Validation(String),

    #[error("translation failed: {0}")]
    Translation(String),

    #[error("{0}")]
    Generation(String),

    #[error("image analysis failed: {0}")]
    Analysis(String),

    #[error("{0}")]
    Store(String),

    #[error("configuration error: {0}")]
    Config(String),
}

pub const NO_IMAGE_COMPOSE_MESSAGE: &str = "The API returned no image. The request may have been blocked by the safety policy, or the model could not perform it. Try different images or change the instruction.";
pub const NO_IMAGE_RESTORE_MESSAGE: &str = "The API returned no image. The request may have been blocked by the safety policy, or it may be too complex.";
pub const COMPOSE_FAILED_MESSAGE: &str =
    "Image composition failed. Check the input images or instruction, or try again shortly.";
pub const RESTORE_FAILED_MESSAGE: &str =
    "Photo restoration failed. Check the input image or instruction, or try again shortly.";
pub const SUGGEST_FAILED_MESSAGE: &str =
    "Could not generate an instruction suggestion. Please try again shortly.";
pub const STORE_RELOAD_MESSAGE: &str = "Reload the studio and try again.";

impl StudioError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn generation(message: impl Into<String>) -> Self {
        Self::Generation(message.into())
    }

    /// Store failures carry the underlying cause plus the reload prompt.
    pub fn store(cause: impl std::fmt::Display) -> Self {
        Self::Store(format!("{cause}. {STORE_RELOAD_MESSAGE}"))
    }

    pub fn is_no_image(&self) -> bool {
        matches!(
            self,
            Self::Generation(message)
                if message == NO_IMAGE_COMPOSE_MESSAGE || message == NO_IMAGE_RESTORE_MESSAGE
        )
    }
}
