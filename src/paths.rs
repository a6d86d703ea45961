//! On-card layout of timelapse output
//!
//! Every session owns one directory directly under the card root and every
//! frame lands in that directory:
//!
//! ```text
//! /lapse007/pic00042.jpg
//! ```
//!
//! The zero padding is a minimum width. Session indices from 1000 and frame
//! indices from 100000 render wider, which breaks fixed-width parsers and
//! lexicographic ordering past those points.

/// Exclusive upper bound for session directory indices.
pub const MAX_SESSIONS: u32 = 10_000;

/// First session index whose directory name is wider than three digits.
pub const SESSION_PAD_LIMIT: u32 = 1_000;

/// First frame index whose file name is wider than five digits.
pub const FRAME_PAD_LIMIT: u32 = 100_000;

const SESSION_PREFIX: &str = "/lapse";
const FRAME_PREFIX: &str = "pic";
const FRAME_EXTENSION: &str = ".jpg";

/// Directory for the given session, e.g. `/lapse007`.
pub fn session_dir(session_index: u32) -> String {
    format!("{SESSION_PREFIX}{session_index:03}")
}

/// File for one frame of one session, e.g. `/lapse007/pic00042.jpg`.
pub fn frame_path(session_index: u32, frame_index: u32) -> String {
    format!("{SESSION_PREFIX}{session_index:03}/{FRAME_PREFIX}{frame_index:05}{FRAME_EXTENSION}")
}

/// Recover the session index from a directory name such as `lapse007` or `/lapse007`.
pub fn parse_session_dir(name: &str) -> Option<u32> {
    let digits = name.trim_start_matches('/').strip_prefix("lapse")?;
    parse_padded(digits, 3)
}

/// Recover `(session_index, frame_index)` from a frame path.
pub fn parse_frame_path(path: &str) -> Option<(u32, u32)> {
    let (dir, file) = path.rsplit_once('/')?;
    let session = parse_session_dir(dir)?;
    let digits = file
        .strip_prefix(FRAME_PREFIX)?
        .strip_suffix(FRAME_EXTENSION)?;
    Some((session, parse_padded(digits, 5)?))
}

fn parse_padded(digits: &str, min_width: usize) -> Option<u32> {
    if digits.len() < min_width || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}
