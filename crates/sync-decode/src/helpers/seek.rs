// crates/sync-decode/src/helpers/seek.rs
//
// Seek helper wrapping ffmpeg's avformat seek with consistent soft-fail
// behaviour, adapted from the original decode engine's seek helper — same
// backward-seek rationale, same skip-seek-at-zero guard, now serving
// Player::seek (SPEC_FULL.md §4.12) instead of a clip encoder.

use ffmpeg_the_third as ffmpeg;

/// Seek `ictx` to `target_secs` seconds from the start of the file.
///
/// Returns `true` if the seek succeeded (or was skipped because `target_secs`
/// is at or before the start). Returns `false` if the seek failed — the
/// demuxer keeps reading from wherever it currently is, and the caller's
/// PTS-based sync logic (spec.md §4.3/§4.4) naturally skips whatever
/// pre-roll packets that leaves behind.
///
/// # Why a backward seek (`..=seek_ts`)
/// A forward seek (`seek_ts..`) lands on the keyframe at or after the
/// target. When the target falls mid-GOP, that keyframe can be seconds
/// later than asked for, which looks like a seek overshoot to the host. A
/// backward seek lands on the keyframe before the target instead; the
/// decode workers' own sync thresholds then drop the handful of pre-roll
/// packets before the target, landing the pipeline exactly where the host
/// asked.
///
/// # Why skip at the very start
/// `avformat_seek_file` can return `EPERM` on some platforms when called
/// with `max_ts == 0` on a freshly opened context. Since every source
/// starts positioned at 0 anyway, skipping the seek there is both correct
/// and sidesteps the platform quirk entirely.
pub fn seek_to_secs(ictx: &mut ffmpeg::format::context::Input, target_secs: f64, label: &str) -> bool {
    if target_secs <= 0.0 {
        return true;
    }

    let seek_ts = (target_secs * ffmpeg::ffi::AV_TIME_BASE as f64) as i64;
    match ictx.seek(seek_ts, ..=seek_ts) {
        Ok(()) => true,
        Err(e) => {
            eprintln!(
                "[seek] soft-fail in {label} at {target_secs:.3}s: {e} — \
                 continuing from current position, sync thresholds will skip pre-roll"
            );
            false
        }
    }
}
