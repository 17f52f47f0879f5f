//! Bucketed tune-time profiler: wall-clock accounting for each stage of a
//! tune, serialized to the `IP_AAMP_TUNETIME` telemetry schema at
//! `TuneEnd`.

use serde::Serialize;
use serde_json::{Value, json};

/// Stages timed across a single tune. Order matches the wire schema's
/// bucket indices; `TypeCount` is a sentinel, never a real bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProfilerBucketType {
    Manifest,

    PlaylistVideo,
    PlaylistAudio,
    PlaylistSubtitle,
    PlaylistAuxiliary,

    InitVideo,
    InitAudio,
    InitSubtitle,
    InitAuxiliary,

    FragmentVideo,
    FragmentAudio,
    FragmentSubtitle,
    FragmentAuxiliary,

    DecryptVideo,
    DecryptAudio,
    DecryptSubtitle,
    DecryptAuxiliary,

    LaTotal,
    LaPreproc,
    LaNetwork,
    LaPostproc,

    FirstBuffer,
    FirstFrame,
    PlayerPreBuffered,

    DiscoTotal,
    DiscoFlush,
    DiscoFirstFrame,
}

const BUCKET_COUNT: usize = 27;

impl ProfilerBucketType {
    fn index(self) -> usize {
        use ProfilerBucketType::*;
        match self {
            Manifest => 0,
            PlaylistVideo => 1,
            PlaylistAudio => 2,
            PlaylistSubtitle => 3,
            PlaylistAuxiliary => 4,
            InitVideo => 5,
            InitAudio => 6,
            InitSubtitle => 7,
            InitAuxiliary => 8,
            FragmentVideo => 9,
            FragmentAudio => 10,
            FragmentSubtitle => 11,
            FragmentAuxiliary => 12,
            DecryptVideo => 13,
            DecryptAudio => 14,
            DecryptSubtitle => 15,
            DecryptAuxiliary => 16,
            LaTotal => 17,
            LaPreproc => 18,
            LaNetwork => 19,
            LaPostproc => 20,
            FirstBuffer => 21,
            FirstFrame => 22,
            PlayerPreBuffered => 23,
            DiscoTotal => 24,
            DiscoFlush => 25,
            DiscoFirstFrame => 26,
        }
    }
}

/// Classic (XRE-facing) tune-time buckets, kept distinct from the bucket
/// array above since they measure a coarser, legacy-compatible timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClassicProfilerBucketType {
    BaseTime,
    BeginLoad,
    PrepareToPlay,
    Play,
    DrmReady,
    StartStream,
    Streaming,
    BackToXre,
}

/// Counters incremented by playback-adjacent events for the telemetry
/// summary, not tied to a timed bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CountType {
    RateCorrection,
    BufferChange,
    BitrateChange,
}

/// Asset content classification carried in `TuneEndMetrics`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContentType {
    #[default]
    Unknown,
    Cdvr,
    Vod,
    Linear,
    Ivod,
    Eas,
    Camera,
    Dvr,
    Mdvr,
    Ipdvr,
    Ppv,
    Ott,
    Ota,
    HdmiIn,
    CompositeIn,
    Sle,
}

impl ContentType {
    fn wire_value(self) -> i32 {
        use ContentType::*;
        match self {
            Unknown => 0,
            Cdvr => 1,
            Vod => 2,
            Linear => 3,
            Ivod => 4,
            Eas => 5,
            Camera => 6,
            Dvr => 7,
            Mdvr => 8,
            Ipdvr => 9,
            Ppv => 10,
            Ott => 11,
            Ota => 12,
            HdmiIn => 13,
            CompositeIn => 14,
            Sle => 15,
        }
    }
}

/// Summary data supplied by the caller at `TuneEnd`, carrying fields the
/// profiler doesn't track itself (attempt counts, content classification,
/// timed-metadata bookkeeping).
#[derive(Debug, Clone, Default)]
pub struct TuneEndMetrics {
    pub success: bool,
    pub stream_type: i32,
    pub timed_metadata_count: i32,
    pub timed_metadata_start_time_ms: i64,
    pub timed_metadata_duration_ms: i32,
    pub tune_attempts: i32,
    pub first_tune: bool,
    pub fog_tsb_enabled: bool,
    pub total_time_ms: i64,
    pub content_type: ContentType,
}

#[derive(Debug, Clone, Copy, Default)]
struct Bucket {
    t_start: u32,
    t_finish: u32,
    error_count: i32,
    complete: bool,
    profile_started: bool,
}

impl Bucket {
    fn duration(&self) -> u32 {
        if self.complete { self.t_finish - self.t_start } else { 0 }
    }
}

/// One discontinuity-handling episode: tune time vs. flush + first-frame
/// time, and the slack between them.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct DiscontinuityEvent {
    pub tt: u32,
    pub ft: u32,
    pub fft: u32,
    pub d: i64,
}

/// One LL-DASH low-buffer occurrence: latency/buffer/playback-rate at the
/// moment the player fell under its low-buffer threshold, the bandwidth in
/// use, and the player's low-buffer counter at that instant.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct LlDashLowBufferEvent {
    pub lt: f64,
    pub buf: f64,
    pub pbr: f64,
    pub bw: i64,
    pub lbc: i32,
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Tune-time profiler. `now_ms` is injected by the caller (a monotonic
/// clock reading) rather than read internally, keeping this deterministic
/// and independent of wall-clock access.
#[derive(Debug)]
pub struct ProfileEventAamp {
    buckets: [Bucket; BUCKET_COUNT],
    tune_start_monotonic_base: i64,
    tune_start_base_utc_ms: i64,
    bandwidth_bits_per_second_video: i64,
    bandwidth_bits_per_second_audio: i64,
    drm_error_code: i32,
    enabled: bool,
    tune_fail_bucket_type: ProfilerBucketType,
    tune_fail_error_code: i32,
    rate_correction: i64,
    buffer_change: i64,
    bitrate_change: i64,
    build_id: String,
    discontinuity_events: Vec<DiscontinuityEvent>,
    ll_dash_low_buffer_events: Vec<LlDashLowBufferEvent>,
    low_buffer_count: i32,
}

impl ProfileEventAamp {
    pub fn new() -> Self {
        Self {
            buckets: [Bucket::default(); BUCKET_COUNT],
            tune_start_monotonic_base: 0,
            tune_start_base_utc_ms: 0,
            bandwidth_bits_per_second_video: 0,
            bandwidth_bits_per_second_audio: 0,
            drm_error_code: 0,
            enabled: false,
            tune_fail_bucket_type: ProfilerBucketType::Manifest,
            tune_fail_error_code: 0,
            rate_correction: 0,
            buffer_change: 0,
            bitrate_change: 0,
            build_id: String::new(),
            discontinuity_events: Vec::new(),
            ll_dash_low_buffer_events: Vec::new(),
            low_buffer_count: 0,
        }
    }

    /// Set the player build identifier reported in telemetry. Sticky across
    /// `tune_begin` calls since it describes the running binary, not a tune.
    pub fn set_build_id(&mut self, build_id: impl Into<String>) {
        self.build_id = build_id.into();
    }

    /// Reset all bucket state and arm the profiler for a new tune.
    /// `now_monotonic_ms`/`now_utc_ms` are caller-supplied clock readings.
    pub fn tune_begin(&mut self, now_monotonic_ms: i64, now_utc_ms: i64) {
        self.buckets = [Bucket::default(); BUCKET_COUNT];
        self.tune_start_base_utc_ms = now_utc_ms;
        self.tune_start_monotonic_base = now_monotonic_ms;
        self.bandwidth_bits_per_second_video = 0;
        self.bandwidth_bits_per_second_audio = 0;
        self.drm_error_code = 0;
        self.enabled = true;
        self.tune_fail_bucket_type = ProfilerBucketType::Manifest;
        self.tune_fail_error_code = 0;
        self.rate_correction = 0;
        self.buffer_change = 0;
        self.bitrate_change = 0;
        self.discontinuity_events.clear();
        self.ll_dash_low_buffer_events.clear();
        self.low_buffer_count = 0;
    }

    /// Record a discontinuity-handling episode: `tune_time` is the wall
    /// time the discontinuity tune took, `flush_time`/`first_frame_time`
    /// are the flush and post-flush first-frame components of it.
    pub fn set_discontinuity_param(&mut self, tune_time: u32, flush_time: u32, first_frame_time: u32) {
        let d = tune_time as i64 - (flush_time as i64 + first_frame_time as i64);
        self.discontinuity_events.push(DiscontinuityEvent {
            tt: tune_time,
            ft: flush_time,
            fft: first_frame_time,
            d,
        });
    }

    /// Open a new LL-DASH low-buffer telemetry slot, tagged with the
    /// low-buffer occurrence count observed so far this tune.
    pub fn add_ll_dash_low_buffer_object(&mut self) {
        self.low_buffer_count += 1;
        self.ll_dash_low_buffer_events.push(LlDashLowBufferEvent {
            lbc: self.low_buffer_count,
            ..Default::default()
        });
    }

    /// Fill in the most recently opened LL-DASH low-buffer slot. A no-op
    /// if `add_ll_dash_low_buffer_object` was never called for this tune.
    pub fn set_ll_dash_low_buffer_param(&mut self, latency_time: f64, buffer: f64, playback_rate: f64, bandwidth: i64) {
        if let Some(entry) = self.ll_dash_low_buffer_events.last_mut() {
            entry.lt = round2(latency_time);
            entry.buf = round2(buffer);
            entry.pbr = round2(playback_rate);
            entry.bw = bandwidth;
        }
    }

    /// Begin timing `kind`. A no-op if the bucket is already complete or
    /// already has a start recorded (a nested/duplicate Begin never
    /// overwrites the first one).
    pub fn profile_begin(&mut self, kind: ProfilerBucketType, now_monotonic_ms: i64) {
        let bucket = &mut self.buckets[kind.index()];
        if !bucket.complete && bucket.t_start == 0 {
            bucket.t_start = (now_monotonic_ms - self.tune_start_monotonic_base) as u32;
            bucket.t_finish = bucket.t_start;
            bucket.profile_started = true;
        }
    }

    /// Record a retry/error against `kind`'s bucket, and latch the first
    /// such failure as the tune's overall failure cause.
    pub fn profile_error(&mut self, kind: ProfilerBucketType, result: i32) {
        let started = {
            let bucket = &self.buckets[kind.index()];
            !bucket.complete && bucket.profile_started
        };
        if started {
            self.set_tune_fail_code(result, kind);
            self.buckets[kind.index()].error_count += 1;
        }
    }

    /// Mark `kind`'s bucket complete at the current time.
    pub fn profile_end(&mut self, kind: ProfilerBucketType, now_monotonic_ms: i64) {
        let bucket = &mut self.buckets[kind.index()];
        if !bucket.complete && bucket.profile_started {
            bucket.t_finish = (now_monotonic_ms - self.tune_start_monotonic_base) as u32;
            bucket.complete = true;
        }
    }

    /// Clear a bucket back to its unstarted state, for retune paths that
    /// redo a stage already profiled once.
    pub fn profile_reset(&mut self, kind: ProfilerBucketType) {
        let bucket = &mut self.buckets[kind.index()];
        *bucket = Bucket::default();
    }

    /// Mark a bucket that has no distinct begin/end pair as instantaneous
    /// and complete, for operations not worth timing individually.
    pub fn profile_performed(&mut self, kind: ProfilerBucketType, now_monotonic_ms: i64) {
        self.profile_begin(kind, now_monotonic_ms);
        self.buckets[kind.index()].complete = true;
    }

    pub fn set_bandwidth_bits_per_second(&mut self, media_type_is_audio: bool, bps: i64) {
        if media_type_is_audio {
            self.bandwidth_bits_per_second_audio = bps;
        } else {
            self.bandwidth_bits_per_second_video = bps;
        }
    }

    pub fn set_drm_error_code(&mut self, code: i32) {
        self.drm_error_code = code;
    }

    pub fn increment_count(&mut self, kind: CountType) {
        match kind {
            CountType::RateCorrection => self.rate_correction += 1,
            CountType::BufferChange => self.buffer_change += 1,
            CountType::BitrateChange => self.bitrate_change += 1,
        }
    }

    fn set_tune_fail_code(&mut self, code: i32, kind: ProfilerBucketType) {
        if self.tune_fail_error_code == 0 {
            self.tune_fail_error_code = code;
            self.tune_fail_bucket_type = kind;
        }
    }

    fn bucket(&self, kind: ProfilerBucketType) -> &Bucket {
        &self.buckets[kind.index()]
    }

    fn duration(&self, kind: ProfilerBucketType) -> u32 {
        self.bucket(kind).duration()
    }

    /// Serialize tune-end metrics to the `IP_AAMP_TUNETIME` JSON schema.
    /// `player_pre_buffered` is whether the player was resumed from a
    /// background pre-buffer rather than tuned cold; when set and the
    /// tune succeeded, `gps`/`gff` are measured relative to the
    /// pre-buffer bucket instead of from tune start.
    #[allow(clippy::too_many_arguments)]
    pub fn tune_time_metric_as_json(
        &self,
        metrics: &TuneEndMetrics,
        tune_time_str_prefix: &str,
        player_pre_buffered: bool,
        duration_seconds: u32,
        interface_wifi: bool,
        failure_reason: &str,
        app_name: &str,
    ) -> Value {
        use ProfilerBucketType::*;

        let license_acq_nw_time = self.duration(LaNetwork);
        let first_buffer_start = self.bucket(FirstBuffer).t_start;
        let first_frame_start = self.bucket(FirstFrame).t_start;
        let pre_buffer_start = self.bucket(PlayerPreBuffered).t_start;

        let gps = if player_pre_buffered && metrics.success {
            first_buffer_start.wrapping_sub(pre_buffer_start)
        } else {
            first_buffer_start
        };
        let gff = if player_pre_buffered && metrics.success {
            first_frame_start.wrapping_sub(pre_buffer_start)
        } else {
            first_frame_start
        };

        let mut value = json!({
            "pre": tune_time_str_prefix,
            "ver": 2,
            "bld": self.build_id,
            "tbu": self.tune_start_base_utc_ms,

            "mms": self.bucket(Manifest).t_start,
            "mmt": self.duration(Manifest),
            "mme": self.bucket(Manifest).error_count,

            "vps": self.bucket(PlaylistVideo).t_start,
            "vpt": self.duration(PlaylistVideo),
            "vpe": self.bucket(PlaylistVideo).error_count,

            "aps": self.bucket(PlaylistAudio).t_start,
            "apt": self.duration(PlaylistAudio),
            "ape": self.bucket(PlaylistAudio).error_count,

            "vis": self.bucket(InitVideo).t_start,
            "vit": self.duration(InitVideo),
            "vie": self.bucket(InitVideo).error_count,

            "ais": self.bucket(InitAudio).t_start,
            "ait": self.duration(InitAudio),
            "aie": self.bucket(InitAudio).error_count,

            "vfs": self.bucket(FragmentVideo).t_start,
            "vft": self.duration(FragmentVideo),
            "vfe": self.bucket(FragmentVideo).error_count,
            "vfb": self.bandwidth_bits_per_second_video,

            "afs": self.bucket(FragmentAudio).t_start,
            "aft": self.duration(FragmentAudio),
            "afe": self.bucket(FragmentAudio).error_count,
            "afb": self.bandwidth_bits_per_second_audio,

            "las": self.bucket(LaTotal).t_start,
            "lat": self.duration(LaTotal),
            "dfe": self.drm_error_code,

            "lpr": self.duration(LaPreproc),
            "lnw": license_acq_nw_time,
            "lps": self.duration(LaPostproc),

            "vdd": self.duration(DecryptVideo),
            "add": self.duration(DecryptAudio),

            "gps": gps,
            "gff": gff,

            "cnt": metrics.content_type.wire_value(),
            "stt": metrics.stream_type,
            "ftt": metrics.first_tune,

            "pbm": player_pre_buffered,
            "tpb": if player_pre_buffered { pre_buffer_start } else { 0 },

            "dus": duration_seconds,
            "ifw": interface_wifi,

            "tat": metrics.tune_attempts,
            "tst": metrics.success,
            "frs": failure_reason,
            "app": app_name,

            "tsb": metrics.fog_tsb_enabled,
            "tot": metrics.total_time_ms,
        });

        let object = value.as_object_mut().expect("tune-time telemetry is always a JSON object");
        if !self.discontinuity_events.is_empty() {
            object.insert("disc".to_string(), json!(self.discontinuity_events));
        }
        if !self.ll_dash_low_buffer_events.is_empty() {
            object.insert("lldlb".to_string(), json!(self.ll_dash_low_buffer_events));
        }

        value
    }

    /// Finalize the tune, returning the telemetry JSON. A no-op (returns
    /// `None`) if the profiler was never armed or has already been ended
    /// for this tune — `TuneEnd` fires at most once per `TuneBegin`.
    #[allow(clippy::too_many_arguments)]
    pub fn tune_end(
        &mut self,
        metrics: &TuneEndMetrics,
        tune_time_str_prefix: &str,
        player_pre_buffered: bool,
        interface_wifi: bool,
        failure_reason: &str,
        app_name: &str,
    ) -> Option<Value> {
        if !self.enabled {
            return None;
        }
        self.enabled = false;

        let total_time_ms = if metrics.success {
            let first_frame_start = self.bucket(ProfilerBucketType::FirstFrame).t_start as i64;
            let pre_buffer_start = self.bucket(ProfilerBucketType::PlayerPreBuffered).t_start as i64;
            if player_pre_buffered {
                first_frame_start - pre_buffer_start
            } else {
                first_frame_start
            }
        } else {
            metrics.total_time_ms - self.tune_start_monotonic_base
        };
        let duration_seconds = (total_time_ms.max(0) / 1000) as u32;

        let mut resolved = metrics.clone();
        resolved.total_time_ms = total_time_ms;

        Some(self.tune_time_metric_as_json(
            &resolved,
            tune_time_str_prefix,
            player_pre_buffered,
            duration_seconds,
            interface_wifi,
            failure_reason,
            app_name,
        ))
    }

    /// Gstreamer decode time excluding decryption: from first-frame back
    /// to decrypt-finish, or to first-buffer-start for clear content
    /// where no decrypt bucket ran.
    pub fn decode_time_ms(&self) -> u32 {
        let first_frame_start = self.bucket(ProfilerBucketType::FirstFrame).t_start;
        let decrypt_video_finish = self.bucket(ProfilerBucketType::DecryptVideo).t_finish;
        let first_buffer_start = self.bucket(ProfilerBucketType::FirstBuffer).t_start;
        let reference = if decrypt_video_finish != 0 { decrypt_video_finish } else { first_buffer_start };
        first_frame_start.wrapping_sub(reference)
    }

    /// Whether two completed buckets' time ranges overlap.
    pub fn buckets_overlap(&self, a: ProfilerBucketType, b: ProfilerBucketType) -> bool {
        let ba = self.bucket(a);
        let bb = self.bucket(b);
        ba.complete && bb.complete && ba.t_start <= bb.t_finish && bb.t_start <= ba.t_finish
    }
}

impl Default for ProfileEventAamp {
    fn default() -> Self {
        Self::new()
    }
}
