/// Convenience result type used across the crate.
pub type SpatialResult<T> = Result<T, SpatialError>;

/// Top-level error taxonomy for probing, reading, splitting and writing.
#[derive(thiserror::Error, Debug)]
pub enum SpatialError {
    /// The source has no visual track, or a helper needed an audio track that is absent.
    #[error("input track missing: {0}")]
    InputTrackMissing(String),

    /// The reader session could not start.
    #[error("reader start failure: {0}")]
    ReaderStart(String),

    /// The writer session could not start (output not creatable, encoder unavailable).
    #[error("writer start failure: {0}")]
    WriterStart(String),

    /// The requested codec/layer configuration is not supported by the writer backend.
    #[error("output settings rejected: {0}")]
    OutputSettingsRejected(String),

    /// Cropping one eye out of a side-by-side frame failed.
    #[error("pixel transfer failure: {0}")]
    PixelTransfer(String),

    /// The writer rejected a sample or tagged buffer group.
    #[error("append failure: {0}")]
    Append(String),

    /// Invalid user-provided options or media dimensions.
    #[error("validation error: {0}")]
    Validation(String),

    /// Backend process failures and illegal session state transitions.
    #[error("evaluation error: {0}")]
    Evaluation(String),

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SpatialError {
    /// Build a [`SpatialError::InputTrackMissing`] value.
    pub fn input_track_missing(msg: impl Into<String>) -> Self {
        Self::InputTrackMissing(msg.into())
    }

    /// Build a [`SpatialError::ReaderStart`] value.
    pub fn reader_start(msg: impl Into<String>) -> Self {
        Self::ReaderStart(msg.into())
    }

    /// Build a [`SpatialError::WriterStart`] value.
    pub fn writer_start(msg: impl Into<String>) -> Self {
        Self::WriterStart(msg.into())
    }

    /// Build a [`SpatialError::OutputSettingsRejected`] value.
    pub fn output_settings_rejected(msg: impl Into<String>) -> Self {
        Self::OutputSettingsRejected(msg.into())
    }

    /// Build a [`SpatialError::PixelTransfer`] value.
    pub fn pixel_transfer(msg: impl Into<String>) -> Self {
        Self::PixelTransfer(msg.into())
    }

    /// Build a [`SpatialError::Append`] value.
    pub fn append(msg: impl Into<String>) -> Self {
        Self::Append(msg.into())
    }

    /// Build a [`SpatialError::Validation`] value.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Build a [`SpatialError::Evaluation`] value.
    pub fn evaluation(msg: impl Into<String>) -> Self {
        Self::Evaluation(msg.into())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
