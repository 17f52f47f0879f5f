//! Per-track buffer control: a dual-strategy state machine that turns sink
//! back-pressure (`need_data` / `enough_data` / `underflow`) plus a
//! periodic `update` into a downloads-enabled decision.
//!
//! Every public entry point on [`BufferControlMaster`] is infallible by
//! design: internal state transitions cannot fail, and there is nothing
//! to propagate to a caller. This mirrors the source behaviour of
//! swallowing unexpected exceptions at the boundary and re-arming
//! downloads from the last known flag.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, trace, warn};

use crate::session::MediaType;

/// Hysteresis band for the time-based strategy's `FULL`/`FILLING`
/// transition: no oscillation within this margin of the target.
const TIME_BASED_HYSTERESIS_SECONDS: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferingState {
    NeedsDataSignal,
    Filling,
    Full,
}

impl BufferingState {
    fn name(self) -> &'static str {
        match self {
            BufferingState::NeedsDataSignal => "NEEDS_DATA_SIGNAL",
            BufferingState::Filling => "FILLING",
            BufferingState::Full => "FULL",
        }
    }
}

/// Data the sink/pipeline exposes and that buffer control needs. Captured
/// fresh at every call into [`BufferControlMaster`] (the `rate` and
/// `time_based_buffer_seconds` pair) with `extra` additionally sampled
/// only when the strategy is time-based, since it is comparatively
/// expensive to gather.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExternalData {
    pub rate: f64,
    time_based_buffer_seconds: f64,
    pub extra: Option<ExtraData>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ExtraData {
    pub stream_ready: bool,
    pub gst_waiting_for_data: bool,
    pub elapsed_seconds: f64,
}

impl ExternalData {
    /// `time_based_buffer_seconds_base` is the configured target before
    /// rate scaling; faster-than-normal playback (`|rate| > 1`) widens the
    /// prefetch window proportionally.
    pub fn new(rate: f64, time_based_buffer_seconds_base: f64) -> Self {
        let abs_rate = rate.abs();
        let time_based_buffer_seconds = if abs_rate > 1.0 {
            time_based_buffer_seconds_base * abs_rate
        } else {
            time_based_buffer_seconds_base
        };
        Self {
            rate,
            time_based_buffer_seconds,
            extra: None,
        }
    }

    pub fn should_be_time_based(&self) -> bool {
        self.time_based_buffer_seconds > 0.0
    }

    pub fn time_based_buffer_seconds(&self) -> f64 {
        self.time_based_buffer_seconds
    }

    pub fn with_extra(mut self, extra: ExtraData) -> Self {
        self.extra = Some(extra);
        self
    }
}

/// Resulting action a strategy transition demands. `BufferControlMaster`
/// applies it to the downloads-enabled flag; strategies themselves never
/// touch shared state directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DownloadAction {
    Resume,
    Stop,
}

#[derive(Debug)]
enum Strategy {
    ByteBased {
        state: BufferingState,
    },
    TimeBased {
        state: BufferingState,
        injected_start: f64,
        injected_end: f64,
        injected_start_set: bool,
    },
}

impl Strategy {
    fn new_byte_based() -> Self {
        Strategy::ByteBased {
            state: BufferingState::NeedsDataSignal,
        }
    }

    fn new_time_based() -> Self {
        Strategy::TimeBased {
            state: BufferingState::NeedsDataSignal,
            injected_start: 0.0,
            injected_end: 0.0,
            injected_start_set: false,
        }
    }

    fn is_time_based(&self) -> bool {
        matches!(self, Strategy::TimeBased { .. })
    }

    fn state(&self) -> BufferingState {
        match self {
            Strategy::ByteBased { state } => *state,
            Strategy::TimeBased { state, .. } => *state,
        }
    }

    fn restart_injected_seconds_count(&mut self) {
        if let Strategy::TimeBased {
            injected_start,
            injected_end,
            injected_start_set,
            ..
        } = self
        {
            *injected_start_set = false;
            *injected_start = 0.0;
            *injected_end = 0.0;
        }
    }

    fn need_data(&mut self) -> Option<DownloadAction> {
        let state = match self {
            Strategy::ByteBased { state } => state,
            Strategy::TimeBased { state, .. } => state,
        };
        if *state == BufferingState::NeedsDataSignal {
            *state = BufferingState::Filling;
            Some(DownloadAction::Resume)
        } else {
            None
        }
    }

    fn enough_data(&mut self) -> Option<DownloadAction> {
        let state = match self {
            Strategy::ByteBased { state } => state,
            Strategy::TimeBased { state, .. } => state,
        };
        let action = if *state != BufferingState::NeedsDataSignal {
            *state = BufferingState::NeedsDataSignal;
            Some(DownloadAction::Stop)
        } else {
            None
        };
        if self.is_time_based() {
            self.restart_injected_seconds_count();
        }
        action
    }

    fn underflow(&mut self) -> Option<DownloadAction> {
        match self {
            Strategy::ByteBased { .. } => None,
            Strategy::TimeBased { state, .. } => {
                *state = BufferingState::Filling;
                self.restart_injected_seconds_count();
                Some(DownloadAction::Resume)
            }
        }
    }

    fn injected_seconds(&self) -> f64 {
        match self {
            Strategy::ByteBased { .. } => 0.0,
            Strategy::TimeBased {
                injected_start,
                injected_end,
                injected_start_set,
                ..
            } => {
                if *injected_start_set {
                    (*injected_end - *injected_start).abs()
                } else {
                    0.0
                }
            }
        }
    }

    /// `update`: a no-op for byte-based (it only reacts to `needData` /
    /// `enoughData`); the time-based variant recomputes state and always
    /// returns a download action reflecting the resulting state.
    fn update(&mut self, media_type_name: &str, external: &ExternalData) -> Option<DownloadAction> {
        match self {
            Strategy::ByteBased { .. } => None,
            Strategy::TimeBased { .. } => Some(self.update_time_based(media_type_name, external)),
        }
    }

    fn update_time_based(&mut self, media_type_name: &str, external: &ExternalData) -> DownloadAction {
        let Strategy::TimeBased {
            state,
            injected_start,
            injected_end,
            injected_start_set,
        } = self
        else {
            unreachable!()
        };

        if let Some(extra) = external.extra {
            if extra.stream_ready {
                let original_state = *state;
                let injected_seconds = if *injected_start_set {
                    (*injected_end - *injected_start).abs()
                } else {
                    0.0
                };
                let elapsed_seconds_unlimited = extra.elapsed_seconds;
                // Unconditionally clipped: the media-type/rate predicate
                // below only controls whether a clip gets logged, not
                // whether it happens.
                let elapsed_seconds = injected_seconds.min(elapsed_seconds_unlimited);

                if (elapsed_seconds + 1.0) < elapsed_seconds_unlimited {
                    trace!(
                        media_type = media_type_name,
                        elapsed_seconds_unlimited,
                        injected_seconds,
                        "limiting elapsedSeconds to secondsInjected"
                    );
                }

                let buffered_seconds = injected_seconds - elapsed_seconds;
                let target = external.time_based_buffer_seconds();

                match *state {
                    BufferingState::Full => {
                        if extra.gst_waiting_for_data {
                            *state = BufferingState::Filling;
                        } else if (target - buffered_seconds) > TIME_BASED_HYSTERESIS_SECONDS {
                            *state = BufferingState::Filling;
                        }
                    }
                    BufferingState::Filling => {
                        if buffered_seconds >= target && !extra.gst_waiting_for_data {
                            *state = BufferingState::Full;
                        }
                    }
                    BufferingState::NeedsDataSignal => {}
                }

                if original_state != *state {
                    debug!(
                        media_type = media_type_name,
                        from = original_state.name(),
                        to = state.name(),
                        buffered_seconds,
                        target,
                        injected_seconds,
                        elapsed_seconds,
                        "buffer control state transition"
                    );
                }
            }
        }

        match *state {
            BufferingState::Filling => DownloadAction::Resume,
            BufferingState::NeedsDataSignal | BufferingState::Full => DownloadAction::Stop,
        }
    }

    fn notify_fragment_inject(
        &mut self,
        media_type_name: &str,
        external: &ExternalData,
        fdts: f64,
        first_buffer: bool,
    ) -> Option<DownloadAction> {
        if let Strategy::TimeBased {
            injected_start,
            injected_end,
            injected_start_set,
            ..
        } = self
        {
            // Deliberately not adding `duration`: underestimating the
            // injected window is safe (one fragment downloaded early);
            // overestimating it can interrupt playback.
            *injected_end = fdts;
            if first_buffer || !*injected_start_set {
                if !first_buffer {
                    warn!(
                        media_type = media_type_name,
                        "firstBuffer is not being used as buffer start reference"
                    );
                }
                *injected_start = fdts;
                *injected_start_set = true;
            }
        }
        self.update(media_type_name, external)
    }
}

/// Per-track buffer control. Owns exactly one strategy, lazily created
/// and replaced whenever the external `should_be_time_based` contract
/// changes.
pub struct BufferControlMaster {
    media_type: Mutex<MediaType>,
    teardown_in_progress: AtomicBool,
    downloads_should_be_enabled: AtomicBool,
    strategy: Mutex<Option<Strategy>>,
}

impl Default for BufferControlMaster {
    fn default() -> Self {
        Self::new()
    }
}

impl BufferControlMaster {
    pub fn new() -> Self {
        Self {
            media_type: Mutex::new(MediaType::Default),
            teardown_in_progress: AtomicBool::new(false),
            downloads_should_be_enabled: AtomicBool::new(true),
            strategy: Mutex::new(None),
        }
    }

    pub fn media_type(&self) -> MediaType {
        *self.media_type.lock()
    }

    fn create_or_change_strategy_if_required(strategy: &mut Option<Strategy>, external: &ExternalData) {
        let want_time_based = external.should_be_time_based();
        let needs_replace = match strategy {
            Some(s) => s.is_time_based() != want_time_based,
            None => true,
        };
        if needs_replace {
            *strategy = Some(if want_time_based {
                Strategy::new_time_based()
            } else {
                Strategy::new_byte_based()
            });
        }
    }

    fn apply_action(&self, action: Option<DownloadAction>) {
        match action {
            Some(DownloadAction::Resume) => self.downloads_should_be_enabled.store(true, Ordering::Release),
            Some(DownloadAction::Stop) => self.downloads_should_be_enabled.store(false, Ordering::Release),
            None => {}
        }
    }

    /// Lock-free read used by back-pressure polling; the only operation
    /// that does not acquire the master's mutex.
    pub fn is_buffer_full(&self) -> bool {
        !self.downloads_should_be_enabled.load(Ordering::Acquire)
    }

    pub fn downloads_should_be_enabled(&self) -> bool {
        self.downloads_should_be_enabled.load(Ordering::Acquire)
    }

    pub fn need_data(&self, media_type: MediaType, external: ExternalData) {
        *self.media_type.lock() = media_type;
        if self.teardown_in_progress.load(Ordering::Acquire) {
            // During teardown, respond directly to avoid starving the
            // pipeline while it's being reconfigured.
            let was_enabled = self.downloads_should_be_enabled.swap(true, Ordering::AcqRel);
            if !was_enabled {
                debug!(media_type = media_type.name(), "starting downloads during teardown");
            }
            return;
        }
        let mut strategy = self.strategy.lock();
        Self::create_or_change_strategy_if_required(&mut strategy, &external);
        let action = strategy.as_mut().and_then(|s| s.need_data());
        drop(strategy);
        self.apply_action(action);
    }

    pub fn enough_data(&self, media_type: MediaType, external: ExternalData) {
        *self.media_type.lock() = media_type;
        if self.teardown_in_progress.load(Ordering::Acquire) {
            let was_enabled = self.downloads_should_be_enabled.swap(false, Ordering::AcqRel);
            if was_enabled {
                debug!(media_type = media_type.name(), "disabling downloads during teardown");
            }
            return;
        }
        let mut strategy = self.strategy.lock();
        Self::create_or_change_strategy_if_required(&mut strategy, &external);
        let action = strategy.as_mut().and_then(|s| s.enough_data());
        drop(strategy);
        self.apply_action(action);
    }

    pub fn underflow(&self, media_type: MediaType) {
        *self.media_type.lock() = media_type;
        if self.teardown_in_progress.load(Ordering::Acquire) {
            return;
        }
        let mut strategy = self.strategy.lock();
        let action = strategy.as_mut().and_then(|s| s.underflow());
        drop(strategy);
        self.apply_action(action);
    }

    pub fn update(&self, media_type: MediaType, external: ExternalData) {
        *self.media_type.lock() = media_type;
        if self.teardown_in_progress.load(Ordering::Acquire) {
            return;
        }
        let mut strategy = self.strategy.lock();
        Self::create_or_change_strategy_if_required(&mut strategy, &external);
        let action = strategy
            .as_mut()
            .and_then(|s| s.update(media_type.name(), &external));
        drop(strategy);
        self.apply_action(action);
    }

    pub fn notify_fragment_inject(
        &self,
        media_type: MediaType,
        external: ExternalData,
        fdts: f64,
        first_buffer: bool,
    ) {
        *self.media_type.lock() = media_type;
        if self.teardown_in_progress.load(Ordering::Acquire) {
            return;
        }
        let mut strategy = self.strategy.lock();
        let action = strategy
            .as_mut()
            .and_then(|s| s.notify_fragment_inject(media_type.name(), &external, fdts, first_buffer));
        drop(strategy);
        self.apply_action(action);
    }

    pub fn teardown_start(&self) {
        self.teardown_in_progress.store(true, Ordering::Release);
    }

    pub fn teardown_end(&self) {
        self.downloads_should_be_enabled.store(false, Ordering::Release);
        *self.strategy.lock() = None;
        self.teardown_in_progress.store(false, Ordering::Release);
    }

    pub fn flush(&self) {
        *self.strategy.lock() = None;
    }

    /// Exposed for tests/diagnostics only.
    fn current_state(&self) -> Option<BufferingState> {
        self.strategy.lock().as_ref().map(Strategy::state)
    }

    fn injected_seconds(&self) -> f64 {
        self.strategy.lock().as_ref().map_or(0.0, Strategy::injected_seconds)
    }
}
