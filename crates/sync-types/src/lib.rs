// crates/sync-types/src/lib.rs
//
// Plain data shared between the decode engine (sync-decode) and whatever
// host embeds it: stream/format descriptors, decoded-packet records, the
// bounded queue, the presentation clock, and the error taxonomy.
//
// No ffmpeg, no threads started here — just data and the synchronization
// primitives that are generic over what they carry.

pub mod clock;
pub mod error;
pub mod format;
pub mod lifecycle;
pub mod packet;
pub mod queue;
pub mod stream;

pub use clock::PresentationClock;
pub use error::{last_error, set_error, MediaError};
pub use format::{
    channel_layout_for, AudioFormat, ChannelLayout, HostPixelFormat, HostSampleFormat,
    SubtitleFormat, VideoFormat,
};
pub use lifecycle::{LifecycleCell, LifecycleState};
pub use packet::{AudioPacket, DecodedImage, OverlayRect, RingBuffer, SubtitlePacket, VideoPacket};
pub use queue::{BoundedQueue, QueueState};
pub use stream::{PlayerState, StreamType};
