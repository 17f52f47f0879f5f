//! The sink capability set (§6.2): the operations the core requires from
//! whatever ultimately renders decoded media (a GStreamer pipeline in the
//! original system, something else entirely here).

use crate::session::{FormatDescriptor, MediaType};

#[derive(Debug, Clone, Copy, Default)]
pub struct VideoRectangle {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

/// Required sink operations. A concrete sink owns whatever rendering
/// pipeline it wraps; the core only ever calls through this trait so it
/// stays renderer-agnostic.
pub trait StreamSink: Send + Sync {
    fn configure(&self, formats: &[(MediaType, FormatDescriptor)]);
    fn flush(&self, position: f64, rate: f64, should_tear_down: bool);
    fn stop(&self, keep_last_frame: bool);
    fn pause(&self, enable: bool, force_stop: bool);

    fn set_video_rectangle(&self, rect: VideoRectangle);
    fn set_zoom(&self, zoom: &str);
    fn set_video_mute(&self, muted: bool);
    fn set_audio_volume(&self, volume: u8);
    fn set_subtitle_mute(&self, muted: bool);
    fn set_text_style(&self, style_json: &str);

    fn seek_stream_sink(&self, position: f64, rate: f64);
    fn set_pause_on_start_playback(&self, enable: bool);

    fn position_milliseconds(&self) -> i64;
    fn video_pts(&self) -> Option<i64>;
}

/// Asynchronous signals the sink raises per track, consumed by Buffer
/// Control (`need_data`/`enough_data`/`underflow`) and the tune state
/// machine (`first_frame`/`eos`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkSignal {
    NeedData,
    EnoughData,
    Underflow,
    FirstFrame,
    Eos,
}

/// Vends the one active sink reference, and during a teardown/retune
/// transition may additionally designate a separate "stopping" sink kept
/// alive just long enough to drain. A single mutex protects both; the
/// tune state machine must never acquire it re-entrantly (calling back
/// into the session to do so is a lock-order bug, not a lock variant to
/// add).
pub trait StreamSinkManager: Send + Sync {
    fn active_sink(&self) -> std::sync::Arc<dyn StreamSink>;
    fn stopping_sink(&self) -> Option<std::sync::Arc<dyn StreamSink>>;
    fn designate_stopping(&self, sink: std::sync::Arc<dyn StreamSink>);
    fn clear_stopping(&self);
}
