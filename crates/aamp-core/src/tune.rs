//! Tune / Playback State Machine (§4.2): deterministic, retune-safe
//! lifecycle for one asset, driven by `TuneHelper` and the supporting
//! EOS/retune/teardown/discontinuity/preferred-track operations.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use tracing::{debug, info, warn};

use crate::error::TuneFailure;
use crate::events::{AampEvent, EventBus};
use crate::profiler::ProfilerBucketType;
use crate::scheduler::{RETUNE_TASK_NAME, Scheduler};
use crate::session::{MediaType, StreamFormat, TuneState};
use crate::tsb::{TrackInjectionFlags, update_local_tsb_injection};

/// `tuneType` input to `TuneHelper`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TuneType {
    NewNormal,
    Seek,
    SeekToLive,
    SeekToEnd,
    Last,
    Retune,
}

/// Content classification relevant to retune eligibility; everything
/// besides EAS is treated uniformly by the scheduling rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Eas,
    Other,
}

/// A format-specific stream driver (DASH/HLS/progressive manifest
/// parsing and segment-timeline tracking). The tune controller only
/// drives it through this trait, never downcasting to a concrete type.
pub trait StreamAbstraction: Send + Sync {
    fn init(&self, tune_type: TuneType) -> Result<(), TuneFailure>;
    fn update_seek_position(&self, position_seconds: f64);
    fn reinitialize_injection(&self, rate: f64);
    /// Whether this abstraction has a codec change pending from its last
    /// manifest refresh, relevant to `reconfigure_for_codec_change`.
    fn has_pending_codec_change(&self) -> bool;
}

pub type AbstractionFactory = dyn Fn(StreamFormat) -> Arc<dyn StreamAbstraction> + Send + Sync;

struct DiscontinuityState {
    tracks_pending: Vec<MediaType>,
    in_progress: bool,
}

/// Drives one session's tune lifecycle. Owns the current `TuneState`,
/// the live `StreamAbstraction` (if any), and the discontinuity
/// handshake state; delegates task coalescing to `Scheduler` and
/// notification fan-out to `EventBus`.
pub struct TuneController {
    state: Mutex<TuneState>,
    stream_abstraction: Mutex<Option<Arc<dyn StreamAbstraction>>>,
    factory: Box<AbstractionFactory>,
    scheduler: Scheduler,
    events: Mutex<EventBus>,
    teardown_count: AtomicU32,
    content_kind: Mutex<ContentKind>,
    rate: Mutex<f64>,
    reconfig_pipeline_on_discontinuity: AtomicBool,
    pts_restamp_configured: AtomicBool,
    discontinuity: Mutex<DiscontinuityState>,
    discontinuity_cv: Condvar,
    discontinuity_cancelled: AtomicBool,
    local_tsb_injection: AtomicBool,
}

impl TuneController {
    pub fn new(scheduler: Scheduler, factory: Box<AbstractionFactory>) -> Self {
        Self {
            state: Mutex::new(TuneState::Idle),
            stream_abstraction: Mutex::new(None),
            factory,
            scheduler,
            events: Mutex::new(EventBus::new()),
            teardown_count: AtomicU32::new(0),
            content_kind: Mutex::new(ContentKind::Other),
            rate: Mutex::new(1.0),
            reconfig_pipeline_on_discontinuity: AtomicBool::new(false),
            pts_restamp_configured: AtomicBool::new(false),
            discontinuity: Mutex::new(DiscontinuityState { tracks_pending: Vec::new(), in_progress: false }),
            discontinuity_cv: Condvar::new(),
            discontinuity_cancelled: AtomicBool::new(false),
            local_tsb_injection: AtomicBool::new(false),
        }
    }

    /// Whether the session is currently reading from the local TSB
    /// reader rather than the live injection path, per the last
    /// `UpdateLocalAAMPTsbInjection` recompute in `tune_helper`.
    pub fn local_tsb_injection(&self) -> bool {
        self.local_tsb_injection.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> TuneState {
        *self.state.lock().unwrap()
    }

    fn set_state(&self, new_state: TuneState) {
        let mut state = self.state.lock().unwrap();
        let from = *state;
        if from == new_state {
            return;
        }
        *state = new_state;
        drop(state);
        self.events.lock().unwrap().dispatch(AampEvent::StateChanged { from, to: new_state });
    }

    pub fn set_rate(&self, rate: f64) {
        *self.rate.lock().unwrap() = rate;
    }

    pub fn rate(&self) -> f64 {
        *self.rate.lock().unwrap()
    }

    pub fn set_content_kind(&self, kind: ContentKind) {
        *self.content_kind.lock().unwrap() = kind;
    }

    /// Central dispatcher for `NewNormal`/`Seek`/`SeekToLive`/
    /// `SeekToEnd`/`Last`/`Retune`, per §4.2.2.
    pub fn tune_helper(
        &self,
        tune_type: TuneType,
        format: StreamFormat,
        seek_position_seconds: f64,
        culled_seconds: f64,
        aamp_tsb_enabled: bool,
        tsb_has_data: bool,
        enabled_tracks: TrackInjectionFlags,
    ) -> Result<(), TuneFailure> {
        let is_new_tune = tune_type == TuneType::NewNormal;
        let has_existing = self.stream_abstraction.lock().unwrap().is_some();

        if has_existing && aamp_tsb_enabled && !is_new_tune {
            let existing = self.stream_abstraction.lock().unwrap().clone().unwrap();
            existing.update_seek_position(seek_position_seconds - culled_seconds);
            if self.rate() == 0.0 {
                existing.reinitialize_injection(0.0);
            }
        } else {
            self.teardown_stream(is_new_tune);
            let abstraction = (self.factory)(format);
            *self.stream_abstraction.lock().unwrap() = Some(abstraction.clone());
            abstraction.init(tune_type)?;

            if aamp_tsb_enabled {
                let injecting_tracks = if tsb_has_data { enabled_tracks } else { TrackInjectionFlags::default() };
                let now_injecting_from_tsb = update_local_tsb_injection(enabled_tracks, injecting_tracks);
                self.local_tsb_injection.store(now_injecting_from_tsb, Ordering::SeqCst);
                if now_injecting_from_tsb {
                    debug!("switching to TSB-reader injection");
                } else {
                    debug!("TSB empty, staying on live injection");
                }
            }

            // Configure/flush ordering: new-tune and seek-to-live
            // configure before flushing; a generic seek under AAMP-TSB
            // flushes, configures, then flushes again.
            match (tune_type, aamp_tsb_enabled) {
                (TuneType::NewNormal, _) | (TuneType::SeekToLive, _) => {
                    self.configure_sink();
                    self.flush_sink(seek_position_seconds);
                }
                (TuneType::Seek, true) => {
                    self.flush_sink(seek_position_seconds);
                    self.configure_sink();
                    self.flush_sink(seek_position_seconds);
                }
                _ => {
                    self.configure_sink();
                    self.flush_sink(seek_position_seconds);
                }
            }
        }

        self.set_state(TuneState::Prepared);
        self.set_state(TuneState::Buffering);
        Ok(())
    }

    fn configure_sink(&self) {
        debug!("sink configure");
    }

    fn flush_sink(&self, position: f64) {
        debug!(position, "sink flush");
    }

    /// `NotifyEOSReached`: on EOS in trick-play against live content,
    /// treat it as the edge of the trick-play window rather than a real
    /// end of stream.
    pub fn notify_eos_reached(&self, is_live: bool) {
        let rate = self.rate();
        if rate == 1.0 || !is_live {
            self.events.lock().unwrap().dispatch(AampEvent::Eos { media_type: MediaType::Video });
            return;
        }
        if rate > 0.0 {
            self.set_rate(1.0);
            self.set_state(TuneState::Seeking);
            self.events.lock().unwrap().dispatch(AampEvent::SpeedChanged { rate: 1.0 });
        } else {
            self.set_state(TuneState::Seeking);
        }
    }

    /// `ScheduleRetune`: submits a coalesced retune task iff the session
    /// is actively playing, the content isn't EAS, and — for trick-play
    /// rates — only a `GstPipelineInternal` error qualifies.
    pub fn schedule_retune<F>(&self, failure: TuneFailure, run: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let state = self.state();
        if state != TuneState::Playing {
            return;
        }
        if *self.content_kind.lock().unwrap() == ContentKind::Eas {
            return;
        }
        let rate = self.rate();
        if rate != 1.0 && failure != TuneFailure::GstPipelineInternal {
            return;
        }
        self.scheduler.submit(RETUNE_TASK_NAME, move |_token| async move {
            run();
        });
    }

    /// Destroy the current stream abstraction. The sink is only actually
    /// halted on the *second* teardown of the session, keeping it alive
    /// across the first teardown so a seamless retune doesn't glitch
    /// the renderer.
    pub fn teardown_stream(&self, new_tune: bool) {
        *self.stream_abstraction.lock().unwrap() = None;
        let count = self.teardown_count.fetch_add(1, Ordering::SeqCst) + 1;
        if count >= 2 {
            info!(new_tune, "halting sink on second teardown");
        }
    }

    /// Full session shutdown: stream abstraction, pause-position
    /// monitor, TSB, and scheduler tasks. Idempotent — calling `stop`
    /// again after the session has already stopped is a no-op.
    pub fn stop(&self) {
        if self.state() == TuneState::Stopped {
            return;
        }
        self.teardown_stream(false);
        self.scheduler.cancel_all();
        self.set_state(TuneState::Stopping);
        self.set_state(TuneState::Stopped);
    }

    /// `Discontinuity(mediaType, suppressFlush)`: returns whether the
    /// sink accepted the event for `media_type`. `enabled_tracks` is the
    /// full set this discontinuity must be seen on before the operation
    /// is considered complete.
    pub fn discontinuity(&self, media_type: MediaType, enabled_tracks: &[MediaType], suppress_flush: bool) -> bool {
        let mut guard = self.discontinuity.lock().unwrap();
        if !guard.in_progress {
            guard.in_progress = true;
            guard.tracks_pending = enabled_tracks.to_vec();
            self.discontinuity_cancelled.store(false, Ordering::SeqCst);
        }
        guard.tracks_pending.retain(|t| *t != media_type);
        let all_seen = guard.tracks_pending.is_empty();
        if suppress_flush {
            debug!(?media_type, "discontinuity accepted without flush");
        }
        if all_seen {
            guard.in_progress = false;
            drop(guard);
            self.discontinuity_cv.notify_all();
            self.events.lock().unwrap().dispatch(AampEvent::DiscontinuitySeenInAllTracks);
        }
        all_seen
    }

    /// Block until `DiscontinuitySeenInAllTracks` fires or the wait is
    /// cancelled (`UnblockWaitForDiscontinuityProcessToComplete`), e.g.
    /// by a flag-clearing teardown racing the discontinuity.
    pub fn wait_for_discontinuity_complete(&self) -> Result<(), crate::error::CoreError> {
        let guard = self.discontinuity.lock().unwrap();
        let (guard, _timeout) = self
            .discontinuity_cv
            .wait_timeout_while(guard, std::time::Duration::from_secs(30), |s| {
                s.in_progress && !self.discontinuity_cancelled.load(Ordering::SeqCst)
            })
            .unwrap();
        if self.discontinuity_cancelled.load(Ordering::SeqCst) {
            return Err(crate::error::CoreError::DiscontinuityCancelled);
        }
        drop(guard);
        Ok(())
    }

    pub fn cancel_discontinuity_wait(&self) {
        self.discontinuity_cancelled.store(true, Ordering::SeqCst);
        self.discontinuity_cv.notify_all();
    }

    pub fn set_pts_restamp_configured(&self, configured: bool) {
        self.pts_restamp_configured.store(configured, Ordering::SeqCst);
    }

    pub fn set_reconfig_pipeline_on_discontinuity(&self, enabled: bool) {
        self.reconfig_pipeline_on_discontinuity.store(enabled, Ordering::SeqCst);
    }

    /// `ReconfigureForCodecChange`: when PTS restamping is configured
    /// the codec-change decision is deferred until here. Returns true
    /// only when a codec change is actually pending *and*
    /// `ReconfigPipelineOnDiscontinuity` is disabled — when that flag is
    /// set the pipeline already reconfigures on every discontinuity, so
    /// a second explicit reconfigure here would be redundant.
    pub fn reconfigure_for_codec_change(&self, abstraction: &dyn StreamAbstraction) -> bool {
        if !self.pts_restamp_configured.load(Ordering::SeqCst) {
            return abstraction.has_pending_codec_change();
        }
        abstraction.has_pending_codec_change() && !self.reconfig_pipeline_on_discontinuity.load(Ordering::SeqCst)
    }

    /// Preferred-track attribute change: schedule a retune only if a
    /// previously-non-matching track now matches. When AAMP-TSB is
    /// active and the newly preferred track had been disabled in the
    /// manifest, the caller must also reload the TSB URL with
    /// `reloadTSB=true` appended — signalled via the returned bool.
    pub fn on_preferred_track_changed(
        &self,
        newly_matches: bool,
        aamp_tsb_enabled: bool,
        track_was_disabled_in_manifest: bool,
    ) -> PreferredTrackChangeOutcome {
        if !newly_matches {
            return PreferredTrackChangeOutcome { retune_scheduled: false, reload_tsb: false };
        }
        let reload_tsb = aamp_tsb_enabled && track_was_disabled_in_manifest;
        PreferredTrackChangeOutcome { retune_scheduled: true, reload_tsb }
    }

    pub fn profiler_bucket_for(format: StreamFormat) -> ProfilerBucketType {
        match format {
            StreamFormat::Dash | StreamFormat::Hls => ProfilerBucketType::Manifest,
            _ => ProfilerBucketType::PlaylistVideo,
        }
    }

    pub fn register_event_listener(&self, kind: crate::events::AampEventKind, listener: Box<dyn crate::events::EventListener>) {
        self.events.lock().unwrap().register(kind, listener);
    }

    /// `IsEventListenerAvailable(type)`: lets a hot path skip building an
    /// event payload when nobody has registered for `kind`.
    pub fn has_event_listeners(&self, kind: crate::events::AampEventKind) -> bool {
        self.events.lock().unwrap().has_listeners(kind)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreferredTrackChangeOutcome {
    pub retune_scheduled: bool,
    pub reload_tsb: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline_common::CancellationToken;
    use std::sync::atomic::AtomicU32 as TestAtomicU32;

    struct FakeAbstraction {
        pending_codec_change: bool,
    }
    impl StreamAbstraction for FakeAbstraction {
        fn init(&self, _tune_type: TuneType) -> Result<(), TuneFailure> {
            Ok(())
        }
        fn update_seek_position(&self, _position_seconds: f64) {}
        fn reinitialize_injection(&self, _rate: f64) {}
        fn has_pending_codec_change(&self) -> bool {
            self.pending_codec_change
        }
    }

    fn controller() -> TuneController {
        TuneController::new(
            Scheduler::new(CancellationToken::new()),
            Box::new(|_format| Arc::new(FakeAbstraction { pending_codec_change: false })),
        )
    }

    #[test]
    fn tune_helper_reaches_buffering() {
        let c = controller();
        c.tune_helper(TuneType::NewNormal, StreamFormat::Dash, 0.0, 0.0, false, false, TrackInjectionFlags::default())
            .unwrap();
        assert_eq!(c.state(), TuneState::Buffering);
    }

    #[test]
    fn tune_helper_wires_tsb_injection_flag_from_track_state() {
        let c = controller();
        let enabled = TrackInjectionFlags { video: true, ..Default::default() };
        c.tune_helper(TuneType::NewNormal, StreamFormat::Dash, 0.0, 0.0, true, true, enabled).unwrap();
        assert!(c.local_tsb_injection());

        let c2 = controller();
        c2.tune_helper(TuneType::NewNormal, StreamFormat::Dash, 0.0, 0.0, true, false, enabled).unwrap();
        assert!(!c2.local_tsb_injection());
    }

    #[test]
    fn second_teardown_halts_sink() {
        let c = controller();
        c.teardown_stream(false);
        assert_eq!(c.teardown_count.load(Ordering::SeqCst), 1);
        c.teardown_stream(false);
        assert_eq!(c.teardown_count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn stop_is_idempotent() {
        let c = controller();
        c.stop();
        assert_eq!(c.state(), TuneState::Stopped);
        c.stop();
        assert_eq!(c.state(), TuneState::Stopped);
    }

    #[test]
    fn discontinuity_pending_until_all_tracks_seen() {
        let c = controller();
        let tracks = [MediaType::Video, MediaType::Audio];
        assert!(!c.discontinuity(MediaType::Video, &tracks, false));
        assert!(c.discontinuity(MediaType::Audio, &tracks, false));
    }

    #[test]
    fn notify_eos_forward_trick_play_on_live_seeks_to_live() {
        let c = controller();
        c.set_rate(2.0);
        c.notify_eos_reached(true);
        assert_eq!(c.state(), TuneState::Seeking);
        assert_eq!(c.rate(), 1.0);
    }

    #[test]
    fn notify_eos_at_normal_rate_is_a_real_eos() {
        let c = controller();
        let seen = Arc::new(TestAtomicU32::new(0));
        let seen2 = seen.clone();
        struct L(Arc<TestAtomicU32>);
        impl crate::events::EventListener for L {
            fn on_event(&self, event: &AampEvent) {
                if matches!(event, AampEvent::Eos { .. }) {
                    self.0.fetch_add(1, Ordering::SeqCst);
                }
            }
        }
        c.register_event_listener(crate::events::AampEventKind::Eos, Box::new(L(seen2)));
        c.notify_eos_reached(true);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retune_skipped_when_not_playing() {
        let c = controller();
        let ran = Arc::new(TestAtomicU32::new(0));
        let ran2 = ran.clone();
        c.schedule_retune(TuneFailure::PlaybackStalled, move || {
            ran2.fetch_add(1, Ordering::SeqCst);
        });
        assert!(!c.scheduler.is_pending(RETUNE_TASK_NAME));
        let _ = ran.load(Ordering::SeqCst);
    }

    #[tokio::test]
    async fn retune_trick_play_requires_gst_pipeline_internal() {
        let c = controller();
        c.set_state(TuneState::Playing);
        c.set_rate(4.0);
        c.schedule_retune(TuneFailure::FragmentDownload, || {});
        assert!(!c.scheduler.is_pending(RETUNE_TASK_NAME));
        c.schedule_retune(TuneFailure::GstPipelineInternal, || {});
        assert!(c.scheduler.is_pending(RETUNE_TASK_NAME));
    }

    #[test]
    fn preferred_track_change_signals_tsb_reload_only_when_previously_disabled() {
        let c = controller();
        let outcome = c.on_preferred_track_changed(true, true, true);
        assert!(outcome.retune_scheduled);
        assert!(outcome.reload_tsb);

        let outcome2 = c.on_preferred_track_changed(true, true, false);
        assert!(!outcome2.reload_tsb);

        let outcome3 = c.on_preferred_track_changed(false, true, true);
        assert!(!outcome3.retune_scheduled);
    }

    #[test]
    fn reconfigure_for_codec_change_respects_reconfig_flag() {
        let c = controller();
        let abstraction = FakeAbstraction { pending_codec_change: true };
        c.set_pts_restamp_configured(true);
        c.set_reconfig_pipeline_on_discontinuity(true);
        assert!(!c.reconfigure_for_codec_change(&abstraction));
        c.set_reconfig_pipeline_on_discontinuity(false);
        assert!(c.reconfigure_for_codec_change(&abstraction));
    }
}
