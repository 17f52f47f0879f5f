//! Error taxonomy for the core: an internal error returned by fallible
//! operations, and the tune-failure kinds surfaced to a caller/listener.

use thiserror::Error;

/// Errors an internal operation can fail with. Buffer Control never
/// surfaces these (its public entry points are infallible by contract,
/// per the exception-swallowing design note); everything else propagates
/// them with `?` the way `pipeline-common`'s `PipelineError` does.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("segment fetch error: {0}")]
    Fetch(String),

    #[error("ISO-BMFF parse/mutation failed for {operation} on track {track}")]
    IsobmffMutation {
        operation: &'static str,
        track: &'static str,
    },

    #[error("pssh parse error: {0}")]
    Pssh(#[from] mp4::PsshParseError),

    #[error("no stream abstraction for format {0:?}")]
    UnclassifiedFormat(String),

    #[error("operation invalid in tune state {state:?}")]
    InvalidState { state: &'static str },

    #[error("discontinuity wait cancelled")]
    DiscontinuityCancelled,

    #[error("session already torn down")]
    AlreadyTornDown,
}

/// `AAMPTuneFailure` mapped to the error kinds the core reports. A
/// `DrmMetaData` failure carries the structured DRM payload described in
/// the error handling design (sent at most once per session, when
/// `is_final` is set).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TuneFailure {
    #[error("manifest download failed")]
    ManifestDownload,
    #[error("init fragment download failed")]
    InitFragmentDownload,
    #[error("playlist download failed")]
    PlaylistDownload,
    #[error("fragment download failed")]
    FragmentDownload,
    #[error("DRM license acquisition failed: {0:?}")]
    DrmLicense(DrmMetaData),
    #[error("DRM key update failed: {0:?}")]
    DrmKeyUpdate(DrmMetaData),
    #[error("GStreamer pipeline internal error")]
    GstPipelineInternal,
    #[error("playback stalled")]
    PlaybackStalled,
    #[error("PTS error")]
    Pts,
    #[error("underflow recovery timed out")]
    UnderflowRecoveryTimeout,
    #[error("unknown tune failure")]
    Unknown,
}

impl TuneFailure {
    /// Errors the fetcher absorbs with retry rather than escalating to
    /// the tune state machine, per the propagation policy.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TuneFailure::ManifestDownload
                | TuneFailure::PlaylistDownload
                | TuneFailure::InitFragmentDownload
                | TuneFailure::FragmentDownload
        )
    }

    /// Whether this failure, once reported, requires a session-wide
    /// terminal error event rather than a seamless retune.
    pub fn is_non_recoverable_source_error(&self) -> bool {
        matches!(
            self,
            TuneFailure::ManifestDownload
                | TuneFailure::DrmLicense(_)
                | TuneFailure::DrmKeyUpdate(_)
                | TuneFailure::Unknown
        )
    }
}

/// Structured DRM failure payload, reported at most once per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrmMetaData {
    pub access_status: i32,
    pub is_final: bool,
    pub session_id: u32,
}
