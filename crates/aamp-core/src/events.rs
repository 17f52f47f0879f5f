//! Session-level events delivered to listeners registered against the
//! caller-facing session API.

use std::collections::HashMap;

use crate::error::TuneFailure;
use crate::session::{MediaType, TuneState};

#[derive(Debug, Clone, PartialEq)]
pub enum AampEvent {
    /// The tune state machine moved from one state to another.
    StateChanged { from: TuneState, to: TuneState },
    /// Playback rate changed, e.g. after `NotifyEOSReached` pins a
    /// forward trick-play session back to normal speed at the live edge.
    SpeedChanged { rate: f64 },
    /// A non-recoverable or retry-exhausted failure ended the tune.
    TuneFailed(TuneFailure),
    /// End of stream reached on `media_type`.
    Eos { media_type: MediaType },
    /// First video frame displayed.
    FirstFrameDisplayed,
    /// A discontinuity was observed and accepted on every enabled track.
    DiscontinuitySeenInAllTracks,
    /// Buffering state changed, surfaced for UI spinners.
    BufferingChanged { buffering: bool },
}

/// The discriminant of an [`AampEvent`], carrying no payload. Used to key
/// listener registration so a hot path can check `has_listeners(kind)`
/// before paying for encoding a payload nobody will receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AampEventKind {
    StateChanged,
    SpeedChanged,
    TuneFailed,
    Eos,
    FirstFrameDisplayed,
    DiscontinuitySeenInAllTracks,
    BufferingChanged,
}

impl AampEvent {
    pub fn kind(&self) -> AampEventKind {
        match self {
            AampEvent::StateChanged { .. } => AampEventKind::StateChanged,
            AampEvent::SpeedChanged { .. } => AampEventKind::SpeedChanged,
            AampEvent::TuneFailed(_) => AampEventKind::TuneFailed,
            AampEvent::Eos { .. } => AampEventKind::Eos,
            AampEvent::FirstFrameDisplayed => AampEventKind::FirstFrameDisplayed,
            AampEvent::DiscontinuitySeenInAllTracks => AampEventKind::DiscontinuitySeenInAllTracks,
            AampEvent::BufferingChanged { .. } => AampEventKind::BufferingChanged,
        }
    }
}

/// A listener callback. Kept as a plain trait (rather than a channel)
/// since the session may have several listeners registered per event
/// type and wants synchronous delivery ordering.
pub trait EventListener: Send + Sync {
    fn on_event(&self, event: &AampEvent);
}

#[derive(Default)]
pub struct EventBus {
    listeners: HashMap<AampEventKind, Vec<Box<dyn EventListener>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self { listeners: HashMap::new() }
    }

    /// Register `listener` against a single event kind. Register the same
    /// listener under multiple kinds to subscribe to more than one.
    pub fn register(&mut self, kind: AampEventKind, listener: Box<dyn EventListener>) {
        self.listeners.entry(kind).or_default().push(listener);
    }

    pub fn dispatch(&self, event: AampEvent) {
        if let Some(listeners) = self.listeners.get(&event.kind()) {
            for listener in listeners {
                listener.on_event(&event);
            }
        }
    }

    /// Whether dispatching `kind` is worth the caller doing any encoding
    /// work first, so a hot path can skip building an event payload when
    /// nobody listens for that specific kind.
    pub fn has_listeners(&self, kind: AampEventKind) -> bool {
        self.listeners.get(&kind).is_some_and(|l| !l.is_empty())
    }
}
