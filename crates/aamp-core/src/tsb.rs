//! TSB (time-shift buffer) session manager contract (§6.6) and the local
//! injection-mode bookkeeping the tune state machine drives through it
//! (§4.5).

use crate::session::MediaType;

#[derive(Debug, Clone)]
pub struct AdReservation {
    pub id: String,
    pub start_position: f64,
}

#[derive(Debug, Clone)]
pub struct AdPlacement {
    pub id: String,
    pub url: String,
}

/// Implemented by whatever stores and replays locally-recorded segments
/// while AAMP-TSB is active. Acts as an alternative fetcher/injector to
/// the live path; the manifest is never refetched while reading from it.
pub trait TsbSessionManager: Send + Sync {
    fn init(&self);
    fn flush(&self);
    fn total_store_duration(&self, media_type: MediaType) -> f64;
    fn push_next_fragment(&self, media_type: MediaType, free_slots: usize) -> bool;

    fn start_ad_reservation(&self, reservation: AdReservation);
    fn end_ad_reservation(&self, id: &str);
    fn start_ad_placement(&self, placement: AdPlacement);
    fn end_ad_placement(&self, id: &str);
    fn end_ad_placement_with_error(&self, id: &str, error: &str);
    fn shift_future_ad_events(&self, delta_seconds: f64);
}

/// Per-track injection-mode flags plus the short-circuit priority the
/// session flag follows when re-evaluated: video, then audio, then
/// subtitle, then aux audio. The first enabled-and-injecting track wins;
/// evaluation stops there rather than accumulating all four.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrackInjectionFlags {
    pub video: bool,
    pub audio: bool,
    pub subtitle: bool,
    pub aux_audio: bool,
}

impl TrackInjectionFlags {
    pub fn is_enabled(self, media_type: MediaType) -> bool {
        match media_type {
            MediaType::Video => self.video,
            MediaType::Audio => self.audio,
            MediaType::Subtitle => self.subtitle,
            MediaType::AuxAudio => self.aux_audio,
            MediaType::Default | MediaType::Iframe => false,
        }
    }
}

/// `UpdateLocalAAMPTsbInjection`: recompute the session-wide TSB
/// injection flag from per-track state, in fixed priority order.
pub fn update_local_tsb_injection(enabled: TrackInjectionFlags, injecting: TrackInjectionFlags) -> bool {
    if enabled.video && injecting.video {
        return true;
    }
    if enabled.audio && injecting.audio {
        return true;
    }
    if enabled.subtitle && injecting.subtitle {
        return true;
    }
    if enabled.aux_audio && injecting.aux_audio {
        return true;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn video_short_circuits_over_other_tracks() {
        let enabled = TrackInjectionFlags { video: true, audio: true, subtitle: true, aux_audio: true };
        let injecting = TrackInjectionFlags { video: true, audio: false, subtitle: true, aux_audio: true };
        assert!(update_local_tsb_injection(enabled, injecting));
    }

    #[test]
    fn falls_through_to_audio_when_video_not_injecting() {
        let enabled = TrackInjectionFlags { video: true, audio: true, ..Default::default() };
        let injecting = TrackInjectionFlags { video: false, audio: true, ..Default::default() };
        assert!(update_local_tsb_injection(enabled, injecting));
    }

    #[test]
    fn false_when_nothing_enabled_is_injecting() {
        let enabled = TrackInjectionFlags::default();
        let injecting = TrackInjectionFlags { video: true, ..Default::default() };
        assert!(!update_local_tsb_injection(enabled, injecting));
    }
}
