// crates/sync-decode/src/registry.rs
//
// Process-global init/deinit guard (spec.md §4/§9): the original requires
// a `Kit_Init`/`Kit_Quit` pair around any other call, backed by a global
// "have we initialized" flag the C library never made thread-safe. `init`
// here is a one-shot `OnceLock`-backed guard instead — calling it twice is
// a programming error the host gets back as a `Result`, not silent
// corruption of shared state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;

use anyhow::{anyhow, Result};
use ffmpeg_the_third as ffmpeg;

use sync_types::MediaError;

/// Which optional subsystems to bring up. Mirrors the original's
/// `KIT_INIT_*` bitmask, minus the subsystems this crate doesn't own
/// (audio/video output — a host concern, never this library's).
#[derive(Clone, Copy, Debug, Default)]
pub struct InitFlags {
    /// Bring up the styled-subtitle rendering path. Left `false` by
    /// default since it requires the host to also supply a
    /// `SubtitleStyleEngine` — see subtitle.rs.
    pub subtitles: bool,
}

static INITIALIZED: AtomicBool = AtomicBool::new(false);
static FLAGS: OnceLock<InitFlags> = OnceLock::new();

/// `Kit_Init`: must be called once before any `Source`/`Player` is
/// constructed. Returns an error rather than panicking on a double call —
/// a host embedding this library is expected to check the result, not
/// crash on a reinit after e.g. a hot-reload.
pub fn init(flags: InitFlags) -> Result<()> {
    if INITIALIZED.swap(true, Ordering::AcqRel) {
        return Err(anyhow!("sync_decode::registry::init called while already initialized"));
    }
    ffmpeg::init().map_err(|e| anyhow!("ffmpeg init failed: {e}"))?;
    let _ = FLAGS.set(flags);
    Ok(())
}

/// `Kit_Quit`: allows a later `init` to succeed again. Does not attempt to
/// un-initialize ffmpeg itself — there's no supported way to do that, and
/// no caller in this pipeline needs to.
pub fn deinit() {
    INITIALIZED.store(false, Ordering::Release);
}

pub fn is_initialized() -> bool {
    INITIALIZED.load(Ordering::Acquire)
}

pub fn flags() -> InitFlags {
    FLAGS.get().copied().unwrap_or_default()
}

/// Guard used at the top of every constructor that touches ffmpeg state
/// (`Source::from_url`, `Player::new`, ...).
pub fn require_initialized() -> Result<(), MediaError> {
    if is_initialized() {
        Ok(())
    } else {
        Err(MediaError::NotInitialized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Only this one test in the whole crate touches the process-global
    // init flag, so it doesn't need cross-test serialization.
    #[test]
    fn double_init_is_rejected_and_deinit_allows_reinit() {
        deinit();
        assert!(!is_initialized());
        init(InitFlags::default()).expect("first init succeeds");
        assert!(init(InitFlags::default()).is_err());
        deinit();
        assert!(init(InitFlags::default()).is_ok());
        deinit();
    }
}
