// crates/sync-types/src/error.rs
//
// The error taxonomy from spec.md §7, plus the process-local last-error
// facility from spec.md §6. The source codebase documents the latter as
// "best-effort, last writer wins" — not fine-grained-safe for concurrent
// propagation, only good enough for a human debugging a startup failure.
// spec.md §9 floats promoting it to thread-local storage; done here, since
// it costs nothing and removes the one piece of cross-thread shared
// mutable state that wasn't otherwise needed.

use std::cell::RefCell;

use thiserror::Error;

/// Distinct error kinds a caller needs to branch on (spec.md §7). Queue
/// backpressure and end-of-stream are not errors — see `DecodeOutcome` in
/// sync-decode for how those are reported instead.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("allocation failed: {0}")]
    Allocation(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("codec failure decoding stream {stream_index}: {message}")]
    CodecFailure { stream_index: usize, message: String },

    #[error("library not initialized — call sync_decode::registry::init() first")]
    NotInitialized,
}

thread_local! {
    static LAST_ERROR: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// `set_error`: records a human-readable message, overwriting whatever was
/// there. Intentionally not synchronized across threads — each thread
/// keeps its own last error, which sidesteps the "last writer wins" race
/// the original design only accepted for lack of a better option.
pub fn set_error(message: impl Into<String>) {
    LAST_ERROR.with(|cell| *cell.borrow_mut() = Some(message.into()));
}

/// `get_error`: returns this thread's last recorded error message, if any.
pub fn last_error() -> Option<String> {
    LAST_ERROR.with(|cell| cell.borrow().clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_error_round_trips_on_this_thread() {
        assert_eq!(last_error(), None);
        set_error("no suitable decoder found for stream #2");
        assert_eq!(
            last_error().as_deref(),
            Some("no suitable decoder found for stream #2")
        );
        set_error("second message replaces the first");
        assert_eq!(
            last_error().as_deref(),
            Some("second message replaces the first")
        );
    }
}
