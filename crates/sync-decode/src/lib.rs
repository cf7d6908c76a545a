// crates/sync-decode/src/lib.rs
//
// ffmpeg-backed decode/synchronize engine: a `Source` handle onto an
// opened container, per-medium decoder workers behind the generic
// `DecoderWorker<H>` engine, a dedicated subtitle worker, the `DemuxWorker`
// feeding all of them, and the `Player` that ties the three pull APIs to a
// shared presentation clock.

pub mod audio;
pub mod demux;
pub mod formats;
pub mod player;
pub mod registry;
pub mod source;
pub mod subtitle;
pub mod video;
pub mod worker;
mod helpers; // internal — not re-exported

pub use player::{Player, PlayerInfo};
pub use registry::{deinit, init, InitFlags};
pub use source::{Source, StreamInfo};
pub use subtitle::SubtitleStyleEngine;
pub use worker::{DecoderWorker, Handler};
