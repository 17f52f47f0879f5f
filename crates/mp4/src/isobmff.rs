//! Minimal ISOBMFF (ISO Base Media File Format) box parsing for fMP4 init segments.
//!
//! This module provides just enough parsing to detect codec types from fMP4
//! initialization segments used in HLS/CMAF delivery. It walks the box tree
//! to find sample entries in the `stsd` box and identifies codecs by FourCC.

use bytes::Bytes;
use tracing::debug;

use crate::Resolution;
use crate::box_utils::{box_at, find_first_box_payload};

#[cfg(test)]
use crate::box_utils::read_box_header;

/// Well-known ISOBMFF container box FourCCs that we descend into.
const CONTAINER_BOXES: &[[u8; 4]] = &[*b"moov", *b"trak", *b"mdia", *b"minf", *b"stbl"];

/// Bytes to skip in a visual sample entry body before child boxes begin.
///
/// Layout (ISO 14496-12 VisualSampleEntry):
///   6 reserved + 2 data_ref_idx + 16 pre-defined/reserved +
///   2 width + 2 height + 4 horiz_res + 4 vert_res + 4 reserved +
///   2 frame_count + 32 compressor_name + 2 depth + 2 pre-defined = 78 bytes
///   minus 8-byte box header already consumed by `read_box_header` = 70
const VISUAL_SAMPLE_ENTRY_HEADER: usize = 70;

/// Options for parsing and profiling fMP4 init segments.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParseOptions {
    /// If `true`, attempt to parse codec configuration data to populate
    /// [`InitSegmentInfo::video_resolution`].
    pub include_resolution: bool,
}

/// Result of parsing an fMP4 init segment for codec information.
#[derive(Debug, Clone, Default)]
pub struct InitSegmentInfo {
    pub has_av1: bool,
    pub has_h264: bool,
    pub has_h265: bool,
    pub has_aac: bool,
    pub has_ac3: bool,
    /// Raw `av1C` box payload (`AV1CodecConfigurationRecord` bytes), if found.
    pub av1c_data: Option<Bytes>,
    /// Raw `avcC` box payload (`AVCDecoderConfigurationRecord` bytes), if found.
    pub avcc_data: Option<Bytes>,
    /// Raw `hvcC` box payload (`HEVCDecoderConfigurationRecord` bytes), if found.
    pub hvcc_data: Option<Bytes>,
    /// Best-effort video resolution extracted from codec configuration, if available.
    pub video_resolution: Option<Resolution>,
}

/// Parse an fMP4 init segment.
///
/// This API is intentionally minimal and uses `Bytes` throughout to allow
/// zero-copy slicing of codec configuration boxes.
pub fn parse_init_segment(data: &Bytes) -> InitSegmentInfo {
    parse_init_segment_with_options(data, ParseOptions::default())
}

/// Parse an fMP4 init segment with options.
pub fn parse_init_segment_with_options(data: &Bytes, options: ParseOptions) -> InitSegmentInfo {
    let mut info = InitSegmentInfo::default();
    walk_boxes_bytes(data, 0, data.len(), &mut info);
    if options.include_resolution {
        info.video_resolution = info.video_resolution_from_codec_config();
    }
    info
}

fn walk_boxes_bytes(data: &Bytes, start: usize, end: usize, info: &mut InitSegmentInfo) {
    let mut offset = start;
    while offset < end {
        let Some(parsed) = box_at(data, offset, end) else {
            break;
        };

        if CONTAINER_BOXES.contains(&parsed.fourcc) {
            walk_boxes_bytes(data, parsed.body_start, parsed.body_end, info);
        } else if parsed.fourcc == *b"stsd" {
            parse_stsd_bytes(data, parsed.body_start, parsed.body_end, info);
        }

        offset = parsed.end;
    }
}

/// Parse the `stsd` (Sample Description) box to identify codec sample entries.
///
/// `stsd` is a FullBox: 4 bytes (version + flags) + 4 bytes (entry_count),
/// followed by sample entry boxes.
fn parse_stsd_bytes(data: &Bytes, start: usize, end: usize, info: &mut InitSegmentInfo) {
    if end - start < 8 {
        return;
    }

    let header = &data[start..end];
    let entry_count = u32::from_be_bytes([header[4], header[5], header[6], header[7]]) as usize;
    let mut offset = start + 8;

    for _ in 0..entry_count {
        if offset + 8 > end {
            break;
        }

        let Some(parsed) = box_at(data, offset, end) else {
            break;
        };

        debug!(
            "Found sample entry: {} (size: {})",
            fourcc_to_string(&parsed.fourcc),
            parsed.size
        );

        match &parsed.fourcc {
            b"av01" => {
                info.has_av1 = true;
                let inner_offset = parsed.header_size + VISUAL_SAMPLE_ENTRY_HEADER;
                if inner_offset < parsed.size {
                    let inner_start = offset + inner_offset;
                    let inner_end = parsed.end;
                    info.av1c_data = find_box_bytes(data, inner_start, inner_end, b"av1C");
                }
            }
            b"avc1" | b"avc3" => {
                info.has_h264 = true;
                let inner_offset = parsed.header_size + VISUAL_SAMPLE_ENTRY_HEADER;
                if inner_offset < parsed.size {
                    let inner_start = offset + inner_offset;
                    let inner_end = parsed.end;
                    info.avcc_data = find_box_bytes(data, inner_start, inner_end, b"avcC");
                }
            }
            b"hvc1" | b"hev1" => {
                info.has_h265 = true;
                let inner_offset = parsed.header_size + VISUAL_SAMPLE_ENTRY_HEADER;
                if inner_offset < parsed.size {
                    let inner_start = offset + inner_offset;
                    let inner_end = parsed.end;
                    info.hvcc_data = find_box_bytes(data, inner_start, inner_end, b"hvcC");
                }
            }
            b"mp4a" => {
                info.has_aac = true;
            }
            b"ac-3" | b"ec-3" => {
                info.has_ac3 = true;
            }
            b"Opus" => {}
            _ => {
                debug!(
                    "Unknown sample entry FourCC: {}",
                    fourcc_to_string(&parsed.fourcc)
                );
            }
        }

        offset = parsed.end;
    }
}

fn find_box_bytes(data: &Bytes, start: usize, end: usize, target: &[u8; 4]) -> Option<Bytes> {
    find_first_box_payload(data, start, end, *target)
}

fn fourcc_to_string(fourcc: &[u8; 4]) -> String {
    fourcc
        .iter()
        .map(|&b| {
            if b.is_ascii_graphic() || b == b' ' {
                b as char
            } else {
                '?'
            }
        })
        .collect()
}

impl InitSegmentInfo {
    fn video_resolution_from_codec_config(&self) -> Option<Resolution> {
        if self.has_av1 {
            let av1c = self.av1c_data.as_ref()?;
            let config_obu = av1::AV1CodecConfigurationRecord::config_obu_bytes(av1c).ok()?;
            if config_obu.is_empty() {
                return None;
            }

            let mut obu_cursor = std::io::Cursor::new(config_obu);
            let header = av1::ObuHeader::parse(&mut obu_cursor).ok()?;
            let seq = av1::seq::SequenceHeaderObu::parse(header, &mut obu_cursor).ok()?;
            return Some(Resolution::new(
                seq.max_frame_width as u32,
                seq.max_frame_height as u32,
            ));
        }

        if self.has_h265 {
            let hvcc = self.hvcc_data.as_ref()?;
            let sps_bytes =
                h265::HEVCDecoderConfigurationRecord::first_sps_nalu_bytes(hvcc).ok()?;
            let sps = h265::SpsNALUnit::parse(std::io::Cursor::new(sps_bytes.as_ref())).ok()?;
            return Some(Resolution::new(
                sps.rbsp.cropped_width() as u32,
                sps.rbsp.cropped_height() as u32,
            ));
        }

        if self.has_h264 {
            let avcc = self.avcc_data.as_ref()?;
            let sps_bytes = h264::AVCDecoderConfigurationRecord::first_sps_nalu_bytes(avcc).ok()?;
            let sps = h264::Sps::parse_with_emulation_prevention(std::io::Cursor::new(
                sps_bytes.as_ref(),
            ))
            .ok()?;
            return Some(Resolution::new(sps.width() as u32, sps.height() as u32));
        }

        None
    }
}
