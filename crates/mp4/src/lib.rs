//! Minimal MP4/fMP4 helpers: ISOBMFF box walking, init-segment codec
//! sniffing, AV1 fragment validation, and the in-place mutation + DRM
//! init-data parsing needed for CMAF trick-mode segment rewriting.

pub use media_types::Resolution;

mod box_utils;
pub mod fragment;
pub mod isobmff;
pub mod mutable;
pub mod pssh;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_support;

pub use fragment::{
    Av1MediaValidationSummary, Av1ValidationOptions, extract_av1_track_ids_from_init,
    validate_av1_media_segment_against_init, validate_av1_media_segment_against_init_with_options,
    validate_av1_media_segment_with_track_ids, validate_av1_media_segment_with_track_ids_and_options,
};
pub use isobmff::{InitSegmentInfo, ParseOptions, parse_init_segment, parse_init_segment_with_options};
pub use mutable::IsobmffMutBuffer;
pub use pssh::{PsshParseError, WidevinePssh};
