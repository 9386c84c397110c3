/// MJPEG AVI container utilities.
///
/// Writes a single-stream RIFF AVI whose video frames are stored as JPEG
/// chunks (`00dc`), followed by an `idx1` index. Every player that handles
/// Motion-JPEG accepts this layout without transcoding.
///
/// Layout:
/// ```text
/// RIFF 'AVI '
///   LIST 'hdrl'
///     'avih' (56)   main header
///     LIST 'strl'
///       'strh' (56) stream header: 'vids' / 'MJPG'
///       'strf' (40) BITMAPINFOHEADER
///   LIST 'movi'
///     '00dc' <jpeg> [pad byte]
///     ...
///   'idx1'  16 bytes per frame, offsets relative to the 'movi' fourcc
/// ```

/// Size of `avih` and `strh` payloads.
const STREAM_HEADER_SIZE: u32 = 56;
/// Size of the BITMAPINFOHEADER in `strf`.
const BITMAP_INFO_SIZE: u32 = 40;
/// `dwScale` of the stream header; `dwRate` is fps scaled by the same factor.
pub const RATE_SCALE: u32 = 1000;

const AVIF_HASINDEX: u32 = 0x10;
const AVIIF_KEYFRAME: u32 = 0x10;

/// Byte offset of `dwTotalFrames` in a file produced by [`write_mjpeg_avi`].
pub const TOTAL_FRAMES_OFFSET: usize = 48;
/// Byte offset of `dwRate` in the stream header.
pub const RATE_OFFSET: usize = 132;
/// Byte offset of the first `00dc` chunk.
pub const FIRST_FRAME_OFFSET: usize = 224;

/// Header fields read back from a file written by [`write_mjpeg_avi`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AviSummary {
    pub frame_count: u32,
    pub width: u32,
    pub height: u32,
    /// Frames per second times [`RATE_SCALE`].
    pub rate: u32,
}

/// Encode JPEG `frames` of `width`×`height` into an MJPEG AVI at `fps`.
pub fn write_mjpeg_avi(frames: &[Vec<u8>], width: u32, height: u32, fps: f64) -> Vec<u8> {
    let frame_count = frames.len() as u32;
    let rate = (fps * RATE_SCALE as f64).round().max(1.0) as u32;
    let micros_per_frame = (1_000_000.0 / fps.max(f64::EPSILON)).round() as u32;
    let largest = frames.iter().map(|f| padded_len(f.len())).max().unwrap_or(0) as u32;

    let movi_size: u32 = 4 + frames.iter().map(|f| 8 + padded_len(f.len()) as u32).sum::<u32>();
    let idx_size = 16 * frame_count;
    let strl_size = 4 + (8 + STREAM_HEADER_SIZE) + (8 + BITMAP_INFO_SIZE);
    let hdrl_size = 4 + (8 + STREAM_HEADER_SIZE) + (8 + strl_size);
    let riff_size = 4 + (8 + hdrl_size) + (8 + movi_size) + (8 + idx_size);

    let mut out = Vec::with_capacity(riff_size as usize + 8);

    // RIFF descriptor
    out.extend_from_slice(b"RIFF");
    put_u32(&mut out, riff_size);
    out.extend_from_slice(b"AVI ");

    // hdrl
    out.extend_from_slice(b"LIST");
    put_u32(&mut out, hdrl_size);
    out.extend_from_slice(b"hdrl");

    out.extend_from_slice(b"avih");
    put_u32(&mut out, STREAM_HEADER_SIZE);
    put_u32(&mut out, micros_per_frame);
    put_u32(&mut out, largest.saturating_mul(rate) / RATE_SCALE); // max bytes per sec
    put_u32(&mut out, 0); // padding granularity
    put_u32(&mut out, AVIF_HASINDEX);
    put_u32(&mut out, frame_count);
    put_u32(&mut out, 0); // initial frames
    put_u32(&mut out, 1); // streams
    put_u32(&mut out, largest);
    put_u32(&mut out, width);
    put_u32(&mut out, height);
    out.extend_from_slice(&[0u8; 16]); // reserved

    out.extend_from_slice(b"LIST");
    put_u32(&mut out, strl_size);
    out.extend_from_slice(b"strl");

    out.extend_from_slice(b"strh");
    put_u32(&mut out, STREAM_HEADER_SIZE);
    out.extend_from_slice(b"vids");
    out.extend_from_slice(b"MJPG");
    put_u32(&mut out, 0); // flags
    put_u16(&mut out, 0); // priority
    put_u16(&mut out, 0); // language
    put_u32(&mut out, 0); // initial frames
    put_u32(&mut out, RATE_SCALE);
    put_u32(&mut out, rate);
    put_u32(&mut out, 0); // start
    put_u32(&mut out, frame_count);
    put_u32(&mut out, largest);
    put_u32(&mut out, u32::MAX); // default quality
    put_u32(&mut out, 0); // sample size
    put_u16(&mut out, 0);
    put_u16(&mut out, 0);
    put_u16(&mut out, width.min(u16::MAX as u32) as u16);
    put_u16(&mut out, height.min(u16::MAX as u32) as u16);

    out.extend_from_slice(b"strf");
    put_u32(&mut out, BITMAP_INFO_SIZE);
    put_u32(&mut out, BITMAP_INFO_SIZE);
    put_u32(&mut out, width);
    put_u32(&mut out, height);
    put_u16(&mut out, 1); // planes
    put_u16(&mut out, 24); // bit count
    out.extend_from_slice(b"MJPG");
    put_u32(&mut out, width.saturating_mul(height).saturating_mul(3));
    out.extend_from_slice(&[0u8; 16]); // pels per meter, colors used/important

    // movi
    out.extend_from_slice(b"LIST");
    put_u32(&mut out, movi_size);
    out.extend_from_slice(b"movi");

    let mut index = Vec::with_capacity(idx_size as usize);
    let mut offset = 4u32;
    for frame in frames {
        out.extend_from_slice(b"00dc");
        put_u32(&mut out, frame.len() as u32);
        out.extend_from_slice(frame);
        if frame.len() % 2 == 1 {
            out.push(0);
        }

        index.extend_from_slice(b"00dc");
        put_u32(&mut index, AVIIF_KEYFRAME);
        put_u32(&mut index, offset);
        put_u32(&mut index, frame.len() as u32);
        offset += 8 + padded_len(frame.len()) as u32;
    }

    out.extend_from_slice(b"idx1");
    put_u32(&mut out, idx_size);
    out.extend_from_slice(&index);

    out
}

/// Read the header fields of a file written by [`write_mjpeg_avi`].
pub fn read_summary(data: &[u8]) -> Option<AviSummary> {
    if data.len() < FIRST_FRAME_OFFSET || &data[0..4] != b"RIFF" || &data[8..12] != b"AVI " {
        return None;
    }
    Some(AviSummary {
        frame_count: read_u32(data, TOTAL_FRAMES_OFFSET),
        width: read_u32(data, 64),
        height: read_u32(data, 68),
        rate: read_u32(data, RATE_OFFSET),
    })
}

fn padded_len(len: usize) -> usize {
    len + (len % 2)
}

fn put_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn put_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn read_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([data[offset], data[offset + 1], data[offset + 2], data[offset + 3]])
}
