//! Fixed, C-like layout of the shared control page.
//!
//! Two processes that memory-map the same segment must agree on this
//! layout bit-for-bit; there is no wire-level negotiation of it. Agreement
//! is checked at `acquire` time by comparing [`cookie`] values rather than
//! by comparing individual fields, so any reordering, resizing, or padding
//! change here is caught immediately instead of silently corrupting data.

use std::sync::atomic::AtomicU32;

use crate::ring::EventRingHeader;

/// Byte alignment the video and audio planes are placed on, matching the
/// original implementation's `ARCAN_SHMPAGE_UNMARK`-adjacent plane math.
pub const ALIGNMENT: usize = 64;

/// Number of interleaved audio channels.
pub const AUDIO_CHANNELS: usize = 2;

/// Audio sample rate in Hz.
pub const AUDIO_SAMPLE_RATE: u32 = 48_000;

/// Fixed size, in bytes, of the audio ring embedded in every segment.
pub const AUDIO_BUFFER_BYTES: usize = 1 << 16;

/// Bytes per video pixel (RGBA8888).
pub const BYTES_PER_PIXEL: usize = 4;

pub const R_SHIFT: u32 = 0;
pub const G_SHIFT: u32 = 8;
pub const B_SHIFT: u32 = 16;
pub const A_SHIFT: u32 = 24;

/// Largest width/height this implementation will ever negotiate or accept
/// in a resize request.
pub const MAX_W: u32 = 8192;
pub const MAX_H: u32 = 8192;

pub const VERSION_MAJOR: u16 = 0;
pub const VERSION_MINOR: u16 = 16;

/// The shared control page mapped at the base of every segment. Video and
/// audio planes follow immediately after it in the same mapping, at
/// offsets computed by [`calc_offsets`].
#[repr(C)]
pub struct ControlPage {
    pub version_major: u16,
    pub version_minor: u16,
    pub cookie: u64,

    /// Dead-man's switch: nonzero while either side considers the segment
    /// alive. Cleared by the guard thread or watchdog on peer loss.
    pub dms: AtomicU32,
    pub resized: AtomicU32,

    pub w: u32,
    pub h: u32,

    pub vready: AtomicU32,
    pub aready: AtomicU32,
    pub abufused: AtomicU32,

    pub vpts: u64,
    pub parent_pid: u32,
    pub segment_size: u64,

    pub child_to_parent: EventRingHeader,
    pub parent_to_child: EventRingHeader,
}

impl ControlPage {
    /// Returns a page with everything but `version_major`/`version_minor`
    /// zeroed; callers fill in the cookie and dimensions before publishing
    /// it through `dms`.
    pub fn zeroed() -> Self {
        // SAFETY: every field is either a plain integer or an atomic with
        // a valid all-zero bit pattern; ControlPage has no Drop impl and
        // no invalid-zero representation.
        unsafe { std::mem::zeroed() }
    }
}

/// Computes the layout cookie: a checksum of this crate's idea of the
/// control page and event record sizes, combined with the byte offsets of
/// four liveness-critical fields. Two builds with identical struct layout
/// always agree; a field reorder or size change visibly changes the
/// result so a loaded mismatch is detected instead of silently
/// misinterpreted.
pub fn cookie() -> u64 {
    use memoffset::offset_of;

    let sizes = (std::mem::size_of::<ControlPage>() + std::mem::size_of::<crate::event::RawEvent>()) as u64;

    let cookie_ofs = offset_of!(ControlPage, cookie) as u64;
    let resized_ofs = offset_of!(ControlPage, resized) as u64;
    let aready_ofs = offset_of!(ControlPage, aready) as u64;
    let abufused_ofs = offset_of!(ControlPage, abufused) as u64;

    combine(sizes, cookie_ofs, resized_ofs, aready_ofs, abufused_ofs)
}

/// The mixing step of [`cookie`], pulled out so a reordered or resized
/// layout's offsets can be fed through the same formula in a test without
/// needing a second `#[repr(C)]` struct to reorder at compile time.
fn combine(sizes: u64, cookie_ofs: u64, resized_ofs: u64, aready_ofs: u64, abufused_ofs: u64) -> u64 {
    sizes
        .wrapping_add(cookie_ofs << 8)
        .wrapping_add(resized_ofs << 16)
        .wrapping_add(aready_ofs << 24)
        .wrapping_add(abufused_ofs << 32)
}

fn align_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}

/// Byte size of the video plane for a `w`x`h` frame.
pub fn video_plane_size(w: u32, h: u32) -> usize {
    w as usize * h as usize * BYTES_PER_PIXEL
}

/// Computes `(video_offset, audio_offset)` from the base of the mapping,
/// given the header size and a negotiated `w`x`h`. Both sides must call
/// this with the same inputs; it is the single shared implementation so
/// client and server cannot independently drift.
pub fn calc_offsets(w: u32, h: u32) -> (usize, usize) {
    let header = std::mem::size_of::<ControlPage>();
    let video_offset = align_up(header, ALIGNMENT);
    let audio_offset = align_up(video_offset + video_plane_size(w, h), ALIGNMENT);
    (video_offset, audio_offset)
}

/// Total mapping size required to hold the header, video plane and audio
/// buffer for a `w`x`h` segment.
pub fn segment_size(w: u32, h: u32) -> usize {
    let (_, audio_offset) = calc_offsets(w, h);
    audio_offset + AUDIO_BUFFER_BYTES
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookie_is_stable_across_calls() {
        assert_eq!(cookie(), cookie());
    }

    #[test]
    fn cookie_changes_when_a_liveness_field_moves() {
        let (sizes, cookie_ofs, resized_ofs, aready_ofs, abufused_ofs) = (200u64, 8u64, 12u64, 16u64, 20u64);
        let baseline = combine(sizes, cookie_ofs, resized_ofs, aready_ofs, abufused_ofs);

        // Same sizes, `resized` and `aready` swapped: a build that
        // accidentally reordered those two fields must not agree.
        let reordered = combine(sizes, cookie_ofs, aready_ofs, resized_ofs, abufused_ofs);
        assert_ne!(baseline, reordered);

        // Same field order, `ControlPage` a byte larger: a build with a
        // stray padding byte or widened field must not agree either.
        let resized_struct = combine(sizes + 1, cookie_ofs, resized_ofs, aready_ofs, abufused_ofs);
        assert_ne!(baseline, resized_struct);
    }

    #[test]
    fn offsets_are_aligned_and_increasing() {
        let (video, audio) = calc_offsets(640, 480);
        assert_eq!(video % ALIGNMENT, 0);
        assert_eq!(audio % ALIGNMENT, 0);
        assert!(audio > video);
    }

    #[test]
    fn segment_size_covers_both_planes() {
        let size = segment_size(64, 64);
        let (_, audio_offset) = calc_offsets(64, 64);
        assert_eq!(size, audio_offset + AUDIO_BUFFER_BYTES);
    }
}
