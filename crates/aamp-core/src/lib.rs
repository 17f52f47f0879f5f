//! Download-driven adaptive media streaming engine core.
//!
//! Four cooperating subsystems, each usable independently:
//! - [`buffer_control`] — byte/time based download gating against sink
//!   back-pressure.
//! - [`tune`] — the tune/playback state machine and its dispatcher.
//! - [`profiler`] — bucketed tune-time accounting and telemetry JSON.
//! - [`mp4`] (re-exported) — ISO-BMFF segment mutation and PSSH parsing
//!   for trick-mode/DRM support.

pub mod buffer_control;
pub mod config;
pub mod error;
pub mod events;
pub mod fetcher;
pub mod profiler;
pub mod scheduler;
pub mod session;
pub mod session_api;
pub mod sink;
pub mod tsb;
pub mod tune;

pub use buffer_control::{BufferControlMaster, BufferingState, ExternalData, ExtraData};
pub use config::{AampConfig, CachedSettings, ConfigOwner, ConfigValue};
pub use error::{CoreError, DrmMetaData, TuneFailure};
pub use events::{AampEvent, AampEventKind, EventBus, EventListener};
pub use fetcher::{DownloadRequest, DownloadResult, Fetcher};
pub use profiler::{
    ClassicProfilerBucketType, ContentType, CountType, DiscontinuityEvent, LlDashLowBufferEvent, ProfileEventAamp,
    ProfilerBucketType, TuneEndMetrics,
};
pub use scheduler::{RETUNE_TASK_NAME, Scheduler};
pub use session::{FormatDescriptor, MediaType, Segment, StreamFormat, Track, TuneState, classify_tune_url};
pub use session_api::{PreferredTrackSelection, Session};
pub use sink::{StreamSink, StreamSinkManager, VideoRectangle};
pub use tsb::{TrackInjectionFlags, TsbSessionManager, update_local_tsb_injection};
pub use tune::{AbstractionFactory, ContentKind, PreferredTrackChangeOutcome, StreamAbstraction, TuneController, TuneType};
