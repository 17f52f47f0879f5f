//! The data model shared by every CORE subsystem: media types, tracks,
//! segments, and the tune-state enumeration.

use std::sync::atomic::{AtomicBool, Ordering};

/// A track's media type. `Default` stands in for "not yet classified",
/// matching `eMEDIATYPE_DEFAULT` used before the first buffer-control call
/// pins a track down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaType {
    Default,
    Video,
    Audio,
    Subtitle,
    AuxAudio,
    Iframe,
}

impl MediaType {
    pub fn name(self) -> &'static str {
        match self {
            MediaType::Default => "default",
            MediaType::Video => "video",
            MediaType::Audio => "audio",
            MediaType::Subtitle => "subtitle",
            MediaType::AuxAudio => "aux-audio",
            MediaType::Iframe => "iframe",
        }
    }
}

/// The classified delivery format of a tuned URL, per the scheme/extension
/// table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamFormat {
    Dash,
    Hls,
    Progressive,
    /// `hdmiin:`, `cvbsin:`, `live:`, `tune:`, `mr:` — handled upstream of
    /// the core, never reaches a Stream Abstraction here.
    ExternalSource,
    /// `ocap://` — RMF, likewise not a core concern.
    Rmf,
    Unknown,
}

/// Classify a tune URL by scheme/extension, per §4.2.1. Operates on the
/// *recordedUrl* query parameter when present (the player-owned TSB
/// fronts a recording URL behind `?recordedUrl=...`), since that is what
/// actually determines manifest format during TSB playback.
pub fn classify_tune_url(url: &str) -> StreamFormat {
    let lower = url.to_ascii_lowercase();

    let classify_extension = |s: &str| -> StreamFormat {
        if s.contains(".mpd") {
            StreamFormat::Dash
        } else if s.contains(".m3u8") {
            StreamFormat::Hls
        } else if s.contains(".mp4") || s.contains(".mkv") || s.contains(".ts") || s.starts_with("srt:") {
            StreamFormat::Progressive
        } else {
            StreamFormat::Unknown
        }
    };

    if let Some(idx) = lower.find("recordedurl=") {
        let recorded = &lower[idx + "recordedurl=".len()..];
        let decoded = percent_decode(recorded);
        let format = classify_extension(&decoded);
        if format != StreamFormat::Unknown {
            return format;
        }
    }

    if lower.starts_with("hdmiin:")
        || lower.starts_with("cvbsin:")
        || lower.starts_with("live:")
        || lower.starts_with("tune:")
        || lower.starts_with("mr:")
    {
        return StreamFormat::ExternalSource;
    }
    if lower.starts_with("ocap://") {
        return StreamFormat::Rmf;
    }
    if lower.starts_with("srt:") {
        return StreamFormat::Progressive;
    }
    classify_extension(&lower)
}

/// Minimal percent-decoding, just enough to recover `.mpd`/`.m3u8` from a
/// `recordedUrl` query value without pulling in a full URL-encoding crate
/// for this one call site (the `url` crate is used elsewhere for full URL
/// parsing, not percent-decoding of an opaque embedded query value).
fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = String::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let Ok(byte) = u8::from_str_radix(&s[i + 1..i + 3], 16) {
                out.push(byte as char);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i] as char);
        i += 1;
    }
    out
}

/// Tune lifecycle state, per §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TuneState {
    Idle,
    Initializing,
    Initialized,
    Preparing,
    Prepared,
    Buffering,
    Seeking,
    Playing,
    Paused,
    Stopping,
    Stopped,
    Complete,
    Error,
    Released,
    BlockedDrm,
}

/// One fetched/adapted media unit, owned exclusively by whichever pipeline
/// stage currently holds it.
#[derive(Debug, Clone)]
pub struct Segment {
    pub uri: String,
    pub media_type: MediaType,
    pub fpts: f64,
    pub fdts: f64,
    pub duration: f64,
    pub bytes: bytes::Bytes,
    pub is_init: bool,
    pub is_discontinuity: bool,
    pub is_first_after_seek: bool,
}

/// Per-track format descriptor: codec, timescale, whether the init
/// segment has been applied yet.
#[derive(Debug, Clone, Default)]
pub struct FormatDescriptor {
    pub codec: Option<String>,
    pub timescale: u32,
    pub init_segment_applied: bool,
}

impl FormatDescriptor {
    pub fn is_valid(&self) -> bool {
        self.codec.is_some()
    }
}

/// A track's ordered, cullable sequence of segments plus the position
/// bookkeeping buffer control and the tune state machine depend on.
#[derive(Debug)]
pub struct Track {
    pub media_type: MediaType,
    pub format: FormatDescriptor,
    fetch_position: f64,
    inject_position: f64,
    downloads_enabled: AtomicBool,
    pub eos: bool,
    pub discontinuity_pending: bool,
    pub local_tsb_injection: bool,
}

impl Track {
    pub fn new(media_type: MediaType) -> Self {
        Self {
            media_type,
            format: FormatDescriptor::default(),
            fetch_position: 0.0,
            inject_position: 0.0,
            downloads_enabled: AtomicBool::new(true),
            eos: false,
            discontinuity_pending: false,
            local_tsb_injection: false,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.format.is_valid()
    }

    pub fn fetch_position(&self) -> f64 {
        self.fetch_position
    }

    pub fn inject_position(&self) -> f64 {
        self.inject_position
    }

    /// Advance the fetch position. Panics (debug-only invariant) if this
    /// would violate `fetchPos >= injectPos`.
    pub fn set_fetch_position(&mut self, pos: f64) {
        debug_assert!(pos >= self.inject_position, "fetch position must not precede inject position");
        self.fetch_position = pos;
    }

    /// Advance the inject position during normal play. Jumps backward are
    /// legitimate on seek/flush/discontinuity and use `reset_inject_position`
    /// instead, to make the non-monotonic case explicit at call sites.
    pub fn advance_inject_position(&mut self, pos: f64) {
        debug_assert!(pos >= self.inject_position, "use reset_inject_position for seek/flush/discontinuity jumps");
        self.inject_position = pos;
        if self.fetch_position < self.inject_position {
            self.fetch_position = self.inject_position;
        }
    }

    pub fn reset_inject_position(&mut self, pos: f64) {
        self.inject_position = pos;
        if self.fetch_position < pos {
            self.fetch_position = pos;
        }
    }

    pub fn downloads_enabled(&self) -> bool {
        self.downloads_enabled.load(Ordering::Acquire)
    }

    pub fn set_downloads_enabled(&self, enabled: bool) {
        self.downloads_enabled.store(enabled, Ordering::Release);
    }
}
