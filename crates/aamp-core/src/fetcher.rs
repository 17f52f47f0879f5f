//! The fetcher contract (§6.3): a blocking-style download operation the
//! per-track fetcher threads call, with retry behaviour for init segments
//! that the core relies on rather than reimplements.

use std::time::Duration;

use bytes::Bytes;

use crate::profiler::ProfilerBucketType;
use crate::session::MediaType;

#[derive(Debug, Clone, Default)]
pub struct ByteRange {
    pub start: Option<u64>,
    pub end: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub url: String,
    pub media_type: MediaType,
    pub range: Option<ByteRange>,
    pub reset_buffer: bool,
    pub position_hint: f64,
    pub profile_bucket: ProfilerBucketType,
    pub init_max_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct DownloadResult {
    pub buffer: Bytes,
    pub effective_url: String,
    pub http_code: i32,
    pub download_time: Duration,
    pub bitrate_bps: i64,
    pub fog_error: Option<String>,
}

/// Implemented by whatever HTTP/CDN client backs segment and manifest
/// retrieval. `download` blocks the calling fetcher thread (cancellation
/// is cooperative, not preemptive) and returns `None` on exhausted retry.
///
/// For init segments the implementation is expected to keep retrying
/// while `elapsed < init_max_timeout` **or** the track already has
/// buffered duration greater than zero, giving up only when both the
/// retry budget and the existing buffer depth are exhausted — losing an
/// init segment stalls the whole track, so it is worth outlasting a
/// transient failure longer than a normal fragment would.
pub trait Fetcher: Send + Sync {
    fn download(&self, request: &DownloadRequest) -> Option<DownloadResult>;
}
