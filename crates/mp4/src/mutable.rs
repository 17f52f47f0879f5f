//! In-place mutation of fragmented MP4 (CMAF) media segments.
//!
//! `box_utils` / `isobmff` parse a `Bytes` view read-only to sniff codecs out
//! of init segments. This module is the write-side counterpart: it owns a
//! mutable copy of a media segment and rewrites specific boxes in place to
//! support I-frame trick-mode, PTS restamping, and timescale override.
//!
//! The box-walking primitives here intentionally mirror `box_utils.rs`
//! (`read_box_header`, a depth-first descent into known container boxes)
//! but operate on `&mut [u8]` / `Vec<u8>` instead of `Bytes`, since every
//! operation below needs to overwrite or resize box contents.

use bytes::Bytes;
use tracing::{debug, warn};

/// Container (non-leaf) boxes this module descends into while searching
/// for a target box.
const CONTAINER_BOXES: &[[u8; 4]] = &[
    *b"moof", *b"traf", *b"moov", *b"trak", *b"mdia", *b"minf", *b"stbl",
];

const TRUN_DATA_OFFSET_PRESENT: u32 = 0x0000_0001;
const TRUN_FIRST_SAMPLE_FLAGS_PRESENT: u32 = 0x0000_0004;
const TRUN_SAMPLE_DURATION_PRESENT: u32 = 0x0000_0100;
const TRUN_SAMPLE_SIZE_PRESENT: u32 = 0x0000_0200;
const TRUN_SAMPLE_FLAGS_PRESENT: u32 = 0x0000_0400;
const TRUN_SAMPLE_CTO_PRESENT: u32 = 0x0000_0800;

#[derive(Debug, Clone, Copy)]
struct BoxLoc {
    start: usize,
    end: usize,
    header_size: usize,
    fourcc: [u8; 4],
    body_start: usize,
    body_end: usize,
}

fn read_box_header(data: &[u8]) -> Option<(usize, [u8; 4], usize)> {
    if data.len() < 8 {
        return None;
    }
    let size = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as u64;
    let fourcc: [u8; 4] = [data[4], data[5], data[6], data[7]];
    if size == 1 {
        if data.len() < 16 {
            return None;
        }
        let ext_size = u64::from_be_bytes([
            data[8], data[9], data[10], data[11], data[12], data[13], data[14], data[15],
        ]);
        Some((ext_size as usize, fourcc, 16))
    } else if size == 0 {
        Some((data.len(), fourcc, 8))
    } else {
        Some((size as usize, fourcc, 8))
    }
}

fn box_at(data: &[u8], offset: usize, end: usize) -> Option<BoxLoc> {
    if offset >= end || end > data.len() {
        return None;
    }
    let (size, fourcc, header_size) = read_box_header(&data[offset..end])?;
    if size < header_size || offset + size > end {
        return None;
    }
    Some(BoxLoc {
        start: offset,
        end: offset + size,
        header_size,
        fourcc,
        body_start: offset + header_size,
        body_end: offset + size,
    })
}

/// Depth-first search for the first box matching `path` (e.g.
/// `[b"moof", b"traf", b"tfdt"]`) anywhere under `[start, end)`.
fn find_path(data: &[u8], start: usize, end: usize, path: &[[u8; 4]]) -> Option<BoxLoc> {
    let (target, rest) = path.split_first()?;
    let mut offset = start;
    while offset < end {
        let loc = box_at(data, offset, end)?;
        if loc.fourcc == *target {
            if rest.is_empty() {
                return Some(loc);
            }
            if let Some(found) = find_path(data, loc.body_start, loc.body_end, rest) {
                return Some(found);
            }
        }
        offset = loc.end;
    }
    None
}

/// Depth-first search for *every* box with the given FourCC, not just the
/// first, descending through the standard container boxes. Used by
/// `restamp_pts` since a fragment may carry more than one `traf`/`tfdt`.
fn find_all<'a>(data: &'a [u8], start: usize, end: usize, target: [u8; 4], out: &mut Vec<BoxLoc>) {
    let mut offset = start;
    while offset < end {
        let Some(loc) = box_at(data, offset, end) else {
            break;
        };
        if loc.fourcc == target {
            out.push(loc);
        } else if CONTAINER_BOXES.contains(&loc.fourcc) {
            find_all(data, loc.body_start, loc.body_end, target, out);
        }
        offset = loc.end;
    }
}

fn write_u32_be(data: &mut [u8], offset: usize, value: u32) {
    data[offset..offset + 4].copy_from_slice(&value.to_be_bytes());
}

fn read_u32_be(data: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes(data[offset..offset + 4].try_into().unwrap())
}

fn read_u64_be(data: &[u8], offset: usize) -> u64 {
    u64::from_be_bytes(data[offset..offset + 8].try_into().unwrap())
}

fn write_u64_be(data: &mut [u8], offset: usize, value: u64) {
    data[offset..offset + 8].copy_from_slice(&value.to_be_bytes());
}

/// Owns a media segment's bytes and applies in-place box mutations.
///
/// Mirrors the shape of the original `IsoBmffBuffer` helper: a buffer is
/// wrapped, `parse_buffer` confirms it looks like a valid box stream, and
/// each operation reports whether its targeted box was found and rewritten.
pub struct IsobmffMutBuffer {
    data: Vec<u8>,
    parsed: bool,
}

impl IsobmffMutBuffer {
    pub fn new(data: Bytes) -> Self {
        Self {
            data: data.to_vec(),
            parsed: false,
        }
    }

    /// Validate that the buffer is a walkable sequence of ISOBMFF boxes.
    /// Must be called (and must return `true`) before any mutation.
    pub fn parse_buffer(&mut self) -> bool {
        let mut offset = 0usize;
        let len = self.data.len();
        if len < 8 {
            return false;
        }
        let mut saw_box = false;
        while offset < len {
            let Some(loc) = box_at(&self.data, offset, len) else {
                self.parsed = saw_box && offset == len;
                return self.parsed;
            };
            saw_box = true;
            offset = loc.end;
        }
        self.parsed = saw_box;
        self.parsed
    }

    pub fn get_size(&self) -> usize {
        self.data.len()
    }

    pub fn into_bytes(self) -> Bytes {
        Bytes::from(self.data)
    }

    /// `ConvertToKeyFrame`: truncate the buffer so only the first sample of
    /// the first `moof`/`mdat` pair remains, leaving a single key-frame
    /// segment. Requires the `trun` to carry explicit per-sample sizes
    /// (`sample_size_present`) so the first sample's byte boundary inside
    /// `mdat` is known; without that this returns `false`.
    pub fn truncate(&mut self) -> bool {
        if !self.parsed {
            warn!("IsobmffMutBuffer::truncate called before a successful parse_buffer");
            return false;
        }

        let Some(moof) = find_path(&self.data, 0, self.data.len(), &[*b"moof"]) else {
            return false;
        };
        let Some(mdat) = box_at(&self.data, moof.end, self.data.len()) else {
            return false;
        };
        if mdat.fourcc != *b"mdat" {
            return false;
        }
        let Some(trun) = find_path(&self.data, moof.body_start, moof.body_end, &[*b"traf", *b"trun"])
        else {
            return false;
        };
        let Some(traf) = find_path(&self.data, moof.body_start, moof.body_end, &[*b"traf"]) else {
            return false;
        };

        let Some(info) = TrunInfo::parse(&self.data, trun) else {
            return false;
        };
        if !info.size_present {
            warn!("IsobmffMutBuffer::truncate: trun has no per-sample size field");
            return false;
        }
        if info.sample_count <= 1 {
            // Nothing to truncate; still a valid single-sample key frame.
            return true;
        }

        let first_sample_size =
            read_u32_be(&self.data, info.samples_start + info.size_field_offset) as usize;

        let removed_sample_bytes = info.per_sample_size * (info.sample_count - 1);
        let keep_until = info.samples_start + info.per_sample_size;
        let remove_end = info.samples_start + info.per_sample_size * info.sample_count;

        let mut out = Vec::with_capacity(self.data.len());
        out.extend_from_slice(&self.data[..keep_until]);
        out.extend_from_slice(&self.data[remove_end..mdat.body_start]);
        let mdat_keep = first_sample_size.min(mdat.body_end - mdat.body_start);
        out.extend_from_slice(&self.data[mdat.body_start..mdat.body_start + mdat_keep]);

        // Patch sizes: trun/traf/moof shrank by `removed_sample_bytes`; mdat
        // now holds exactly one sample.
        write_u32_be(&mut out, trun.start, (trun.end - trun.start - removed_sample_bytes) as u32);
        write_u32_be(&mut out, traf.start, (traf.end - traf.start - removed_sample_bytes) as u32);
        write_u32_be(&mut out, moof.start, (moof.end - moof.start - removed_sample_bytes) as u32);
        write_u32_be(&mut out, trun.body_start + 4, 1); // sample_count = 1
        if let Some(data_offset_field) = info.data_offset_field {
            let old = read_u32_be(&out, data_offset_field) as i32;
            write_u32_be(&mut out, data_offset_field, (old - removed_sample_bytes as i32) as u32);
        }
        let new_mdat_start = mdat.start - removed_sample_bytes;
        write_u32_be(&mut out, new_mdat_start, (8 + mdat_keep) as u32);

        debug!(
            removed_sample_bytes,
            new_len = out.len(),
            "truncated fragment to single key frame"
        );
        self.data = out;
        true
    }

    /// `RestampPts`: add `offset_ticks` to every `tfdt` base media decode
    /// time in the buffer (both box versions). Ticks may be negative; the
    /// addition wraps the same way the original signed/unsigned arithmetic
    /// did rather than clamping at zero.
    pub fn restamp_pts(&mut self, offset_ticks: i64) -> bool {
        if !self.parsed {
            return false;
        }
        let mut tfdts = Vec::new();
        find_all(&self.data, 0, self.data.len(), *b"tfdt", &mut tfdts);
        if tfdts.is_empty() {
            return false;
        }
        for tfdt in tfdts {
            let version = self.data[tfdt.body_start];
            if version == 0 {
                let base = read_u32_be(&self.data, tfdt.body_start + 4) as i64;
                let new_base = (base.wrapping_add(offset_ticks)).max(0) as u32;
                write_u32_be(&mut self.data, tfdt.body_start + 4, new_base);
            } else {
                let base = read_u64_be(&self.data, tfdt.body_start + 4) as i64;
                let new_base = (base.wrapping_add(offset_ticks)).max(0) as u64;
                write_u64_be(&mut self.data, tfdt.body_start + 4, new_base);
            }
        }
        true
    }

    /// `SetTimescale`: overwrite the `mdhd` timescale field (used to
    /// re-scale time for trick modes).
    pub fn set_trickmode_timescale(&mut self, timescale: u32) -> bool {
        if !self.parsed {
            return false;
        }
        let Some(mdhd) = find_path(&self.data, 0, self.data.len(), &[*b"mdhd"]) else {
            return false;
        };
        let version = self.data[mdhd.body_start];
        let timescale_offset = if version == 0 {
            mdhd.body_start + 4 + 4 + 4
        } else {
            mdhd.body_start + 4 + 8 + 8
        };
        if timescale_offset + 4 > mdhd.body_end {
            return false;
        }
        write_u32_be(&mut self.data, timescale_offset, timescale);
        true
    }

    /// `SetPtsAndDuration`: rewrite the base media decode time in `tfdt`
    /// and the first sample's duration in `trun` (if present). Assumes a
    /// single-sample/single-`trun` I-frame segment, as the spec requires.
    pub fn set_pts_and_duration(&mut self, pts: u64, duration: u32) -> bool {
        if !self.parsed {
            return false;
        }
        let Some(tfdt) = find_path(&self.data, 0, self.data.len(), &[*b"moof", *b"traf", *b"tfdt"])
        else {
            return false;
        };
        let version = self.data[tfdt.body_start];
        if version == 0 {
            write_u32_be(&mut self.data, tfdt.body_start + 4, pts as u32);
        } else {
            write_u64_be(&mut self.data, tfdt.body_start + 4, pts);
        }

        if let Some(trun) = find_path(&self.data, 0, self.data.len(), &[*b"moof", *b"traf", *b"trun"])
        {
            if let Some(info) = TrunInfo::parse(&self.data, trun) {
                if info.duration_present && info.sample_count >= 1 {
                    write_u32_be(
                        &mut self.data,
                        info.samples_start + info.duration_field_offset,
                        duration,
                    );
                }
            }
        }
        true
    }
}

/// Parsed layout of a `trun` box's per-sample field offsets, enough to
/// locate the first sample's size/duration fields and to shrink the array.
struct TrunInfo {
    sample_count: usize,
    samples_start: usize,
    per_sample_size: usize,
    duration_present: bool,
    duration_field_offset: usize,
    size_present: bool,
    size_field_offset: usize,
    data_offset_field: Option<usize>,
}

impl TrunInfo {
    fn parse(data: &[u8], trun: BoxLoc) -> Option<Self> {
        if trun.body_end - trun.body_start < 8 {
            return None;
        }
        let flags = read_u32_be(data, trun.body_start) & 0x00FF_FFFF;
        let sample_count = read_u32_be(data, trun.body_start + 4) as usize;
        let mut cursor = trun.body_start + 8;

        let data_offset_field = if flags & TRUN_DATA_OFFSET_PRESENT != 0 {
            let field = cursor;
            cursor += 4;
            Some(field)
        } else {
            None
        };
        if flags & TRUN_FIRST_SAMPLE_FLAGS_PRESENT != 0 {
            cursor += 4;
        }

        let mut field_offset = 0usize;
        let duration_present = flags & TRUN_SAMPLE_DURATION_PRESENT != 0;
        let duration_field_offset = field_offset;
        if duration_present {
            field_offset += 4;
        }
        let size_present = flags & TRUN_SAMPLE_SIZE_PRESENT != 0;
        let size_field_offset = field_offset;
        if size_present {
            field_offset += 4;
        }
        if flags & TRUN_SAMPLE_FLAGS_PRESENT != 0 {
            field_offset += 4;
        }
        if flags & TRUN_SAMPLE_CTO_PRESENT != 0 {
            field_offset += 4;
        }
        let per_sample_size = field_offset;

        if cursor + per_sample_size * sample_count > trun.body_end {
            return None;
        }

        Some(Self {
            sample_count,
            samples_start: cursor,
            per_sample_size,
            duration_present,
            duration_field_offset,
            size_present,
            size_field_offset,
            data_offset_field,
        })
    }
}

#[cfg(test)]
#[cfg_attr(all(test, coverage_nightly), coverage(off))]
mod tests {
    use super::*;
    use crate::test_support::{make_box, make_full_box};

    fn make_mdhd(version: u8, timescale: u32) -> Vec<u8> {
        let mut payload = Vec::new();
        if version == 0 {
            payload.extend_from_slice(&0u32.to_be_bytes()); // creation
            payload.extend_from_slice(&0u32.to_be_bytes()); // modification
            payload.extend_from_slice(&timescale.to_be_bytes());
            payload.extend_from_slice(&0u32.to_be_bytes()); // duration
        } else {
            payload.extend_from_slice(&0u64.to_be_bytes());
            payload.extend_from_slice(&0u64.to_be_bytes());
            payload.extend_from_slice(&timescale.to_be_bytes());
            payload.extend_from_slice(&0u64.to_be_bytes());
        }
        make_full_box(b"mdhd", version, 0, &payload)
    }

    fn make_tfdt(version: u8, base_media_decode_time: u64) -> Vec<u8> {
        let mut payload = Vec::new();
        if version == 0 {
            payload.extend_from_slice(&(base_media_decode_time as u32).to_be_bytes());
        } else {
            payload.extend_from_slice(&base_media_decode_time.to_be_bytes());
        }
        make_full_box(b"tfdt", version, 0, &payload)
    }

    /// Build a `moof`/`mdat` fragment with `n` samples of `sample_len` bytes
    /// each, a `tfdt`, and a `trun` carrying explicit per-sample duration +
    /// size fields.
    fn make_fragment(n: u32, sample_len: u32, base_media_decode_time: u64) -> Vec<u8> {
        let tfdt = make_tfdt(0, base_media_decode_time);

        let trun_flags = 0x0000_0001 | 0x0000_0100 | 0x0000_0200; // data_offset + duration + size
        let mut trun_payload = Vec::new();
        trun_payload.extend_from_slice(&n.to_be_bytes());
        trun_payload.extend_from_slice(&0i32.to_be_bytes()); // data_offset placeholder
        for _ in 0..n {
            trun_payload.extend_from_slice(&1000u32.to_be_bytes()); // duration
            trun_payload.extend_from_slice(&sample_len.to_be_bytes()); // size
        }
        let mut trun = make_full_box(b"trun", 0, trun_flags, &trun_payload);

        let mut tfhd_payload = Vec::new();
        tfhd_payload.extend_from_slice(&1u32.to_be_bytes()); // track_id
        let tfhd = make_full_box(b"tfhd", 0, 0, &tfhd_payload);

        let mut traf_body = Vec::new();
        traf_body.extend_from_slice(&tfhd);
        traf_body.extend_from_slice(&tfdt);
        traf_body.extend_from_slice(&trun);
        let traf = make_box(b"traf", &traf_body);
        let moof = make_box(b"moof", &traf);

        let moof_len = moof.len();
        let data_offset = (moof_len + 8) as i32;
        // Patch data_offset inside `trun` (which is the tail of `moof`).
        let trun_offset_in_moof = moof_len - trun.len();
        let data_offset_pos = trun_offset_in_moof + 8 /* box header */ + 4 /* version+flags */ + 4 /* sample_count */;
        moof[data_offset_pos..data_offset_pos + 4].copy_from_slice(&data_offset.to_be_bytes());
        let _ = &mut trun; // silence unused warning if layout changes

        let mut mdat_payload = Vec::new();
        for i in 0..n {
            mdat_payload.extend(std::iter::repeat((i + 1) as u8).take(sample_len as usize));
        }
        let mdat = make_box(b"mdat", &mdat_payload);

        let mut out = Vec::new();
        out.extend_from_slice(&moof);
        out.extend_from_slice(&mdat);
        out
    }

    #[test]
    fn truncate_leaves_single_sample() {
        let fragment = make_fragment(3, 100, 1254400);
        let mut buf = IsobmffMutBuffer::new(Bytes::from(fragment));
        assert!(buf.parse_buffer());
        assert!(buf.truncate());

        let bytes = buf.into_bytes();
        let mut reparsed = IsobmffMutBuffer::new(bytes.clone());
        assert!(reparsed.parse_buffer());

        let moof = find_path(&bytes, 0, bytes.len(), &[*b"moof"]).unwrap();
        let mdat = box_at(&bytes, moof.end, bytes.len()).unwrap();
        assert_eq!(mdat.fourcc, *b"mdat");
        assert_eq!(mdat.body_end - mdat.body_start, 100);

        let trun = find_path(&bytes, moof.body_start, moof.body_end, &[*b"traf", *b"trun"]).unwrap();
        let info = TrunInfo::parse(&bytes, trun).unwrap();
        assert_eq!(info.sample_count, 1);

        // First sample bytes should be preserved unchanged (all 1s).
        assert!(bytes[mdat.body_start..mdat.body_end].iter().all(|&b| b == 1));
    }

    #[test]
    fn truncate_single_sample_is_noop() {
        let fragment = make_fragment(1, 42, 0);
        let mut buf = IsobmffMutBuffer::new(Bytes::from(fragment.clone()));
        assert!(buf.parse_buffer());
        assert!(buf.truncate());
        assert_eq!(buf.into_bytes().len(), fragment.len());
    }

    #[test]
    fn restamp_pts_v0_and_v1() {
        for version in [0u8, 1u8] {
            let tfdt = make_tfdt(version, 1254400);
            let traf = make_box(b"traf", &tfdt);
            let moof = make_box(b"moof", &traf);

            let mut buf = IsobmffMutBuffer::new(Bytes::from(moof));
            assert!(buf.parse_buffer());
            assert!(buf.restamp_pts(123));

            let bytes = buf.into_bytes();
            let tfdt_loc = find_path(&bytes, 0, bytes.len(), &[*b"moof", *b"traf", *b"tfdt"]).unwrap();
            let value = if version == 0 {
                read_u32_be(&bytes, tfdt_loc.body_start + 4) as u64
            } else {
                read_u64_be(&bytes, tfdt_loc.body_start + 4)
            };
            assert_eq!(value, 1254523, "version {version}");
        }
    }

    #[test]
    fn restamp_pts_missing_tfdt_fails() {
        let moof = make_box(b"moof", &make_box(b"traf", &[]));
        let mut buf = IsobmffMutBuffer::new(Bytes::from(moof));
        assert!(buf.parse_buffer());
        assert!(!buf.restamp_pts(10));
    }

    #[test]
    fn set_timescale_v0_and_v1() {
        for version in [0u8, 1u8] {
            let mdhd = make_mdhd(version, 1000);
            let minf = make_box(b"minf", &make_box(b"stbl", &[]));
            let mut mdia_body = mdhd.clone();
            mdia_body.extend_from_slice(&minf);
            let mdia = make_box(b"mdia", &mdia_body);
            let trak = make_box(b"trak", &mdia);
            let moov = make_box(b"moov", &trak);

            let mut buf = IsobmffMutBuffer::new(Bytes::from(moov));
            assert!(buf.parse_buffer());
            assert!(buf.set_trickmode_timescale(48000));

            let bytes = buf.into_bytes();
            let mdhd_loc = find_path(&bytes, 0, bytes.len(), &[*b"moov", *b"trak", *b"mdia", *b"mdhd"])
                .unwrap();
            let offset = if version == 0 {
                mdhd_loc.body_start + 12
            } else {
                mdhd_loc.body_start + 20
            };
            assert_eq!(read_u32_be(&bytes, offset), 48000);
        }
    }

    #[test]
    fn set_pts_and_duration_rewrites_tfdt_and_first_sample_duration() {
        let fragment = make_fragment(1, 64, 0);
        let mut buf = IsobmffMutBuffer::new(Bytes::from(fragment));
        assert!(buf.parse_buffer());
        assert!(buf.set_pts_and_duration(9999, 3003));

        let bytes = buf.into_bytes();
        let tfdt = find_path(&bytes, 0, bytes.len(), &[*b"moof", *b"traf", *b"tfdt"]).unwrap();
        assert_eq!(read_u32_be(&bytes, tfdt.body_start + 4), 9999);

        let trun = find_path(&bytes, 0, bytes.len(), &[*b"moof", *b"traf", *b"trun"]).unwrap();
        let info = TrunInfo::parse(&bytes, trun).unwrap();
        assert_eq!(read_u32_be(&bytes, info.samples_start + info.duration_field_offset), 3003);
    }

    #[test]
    fn parse_buffer_rejects_truncated_input() {
        let mut buf = IsobmffMutBuffer::new(Bytes::from_static(&[0, 0, 0, 20, b'm', b'o', b'o', b'f']));
        assert!(!buf.parse_buffer());
    }
}
