// crates/sync-decode/src/source.rs
//
// Source: an opened container plus its per-stream selection state
// (spec.md §3/§4.6). The Player holds only a reference to a Source and
// the Source outlives the Player — decoder workers and the demuxer all
// need to read from the same ffmpeg input context from different
// threads, so the context is wrapped in `Arc<Mutex<_>>`: the nearest
// idiomatic stand-in for the original's informal non-owning-reference
// relationship once `thread::spawn` requires `'static` ownership.

use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context, Result};
use ffmpeg_the_third as ffmpeg;
use ffmpeg::format::context::Input;
use ffmpeg::media::Type as AvMediaType;

use sync_types::StreamType;

/// One stream's classification and demuxer index, as reported by
/// `get_source_stream_info` (spec.md §4.6).
#[derive(Clone, Copy, Debug)]
pub struct StreamInfo {
    pub index: usize,
    pub kind: StreamType,
}

fn classify(media_type: AvMediaType) -> StreamType {
    match media_type {
        AvMediaType::Video => StreamType::Video,
        AvMediaType::Audio => StreamType::Audio,
        AvMediaType::Subtitle => StreamType::Subtitle,
        AvMediaType::Data => StreamType::Data,
        AvMediaType::Attachment => StreamType::Attachment,
        _ => StreamType::Unknown,
    }
}

/// An opened media container. Cloning a `Source` clones the `Arc` — all
/// clones share the one underlying ffmpeg input context, guarded by the
/// mutex every reader (demuxer, stream-info queries) takes before
/// touching it.
#[derive(Clone)]
pub struct Source {
    inner: Arc<Mutex<Input>>,
    streams: Vec<StreamInfo>,
}

impl Source {
    /// `Kit_CreateSourceFromUrl`: open a container by path or URL.
    pub fn from_url(url: impl AsRef<Path>) -> Result<Self> {
        let ictx = ffmpeg::format::input(&url.as_ref())
            .with_context(|| format!("opening source {}", url.as_ref().display()))?;
        Self::from_input(ictx)
    }

    /// `Kit_CreateSourceFromMemory`: open a container already read into
    /// memory. ffmpeg-the-third has no direct in-memory `avio` binding at
    /// this API tier, so this goes through a temp file — documented as a
    /// known limitation rather than silently mis-supported.
    pub fn from_memory(bytes: &[u8]) -> Result<Self> {
        let tmp = std::env::temp_dir().join(format!(
            "sync-decode-src-{}.bin",
            std::process::id()
        ));
        std::fs::write(&tmp, bytes).context("staging in-memory source to a temp file")?;
        let ictx = ffmpeg::format::input(&tmp).context("opening staged in-memory source")?;
        std::fs::remove_file(&tmp).ok();
        Self::from_input(ictx)
    }

    fn from_input(ictx: Input) -> Result<Self> {
        let streams = ictx
            .streams()
            .map(|s| StreamInfo {
                index: s.index(),
                kind: classify(s.parameters().medium()),
            })
            .collect();
        Ok(Self {
            inner: Arc::new(Mutex::new(ictx)),
            streams,
        })
    }

    pub(crate) fn input(&self) -> &Mutex<Input> {
        &self.inner
    }

    /// `Kit_GetSourceStreamCount`.
    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    /// `Kit_GetSourceStreamInfo`.
    pub fn stream_info(&self, index: usize) -> Option<StreamInfo> {
        self.streams.get(index).copied()
    }

    /// `Kit_GetBestSourceStream`: ffmpeg's own "best stream" heuristic for
    /// a given media kind.
    pub fn best_stream(&self, kind: StreamType) -> Option<usize> {
        let media = match kind {
            StreamType::Video => AvMediaType::Video,
            StreamType::Audio => AvMediaType::Audio,
            StreamType::Subtitle => AvMediaType::Subtitle,
            _ => return None,
        };
        let guard = self.inner.lock().ok()?;
        guard.streams().best(media).map(|s| s.index())
    }

    /// Whole-container duration in seconds, `None` if ffmpeg couldn't
    /// determine it.
    pub fn duration(&self) -> Result<Option<f64>> {
        let guard = self.inner.lock().map_err(|_| anyhow!("source mutex poisoned"))?;
        let dur = guard.duration();
        if dur <= 0 {
            return Ok(None);
        }
        Ok(Some(dur as f64 / ffmpeg::ffi::AV_TIME_BASE as f64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_maps_every_av_media_type() {
        assert_eq!(classify(AvMediaType::Video), StreamType::Video);
        assert_eq!(classify(AvMediaType::Audio), StreamType::Audio);
        assert_eq!(classify(AvMediaType::Subtitle), StreamType::Subtitle);
        assert_eq!(classify(AvMediaType::Data), StreamType::Data);
        assert_eq!(classify(AvMediaType::Attachment), StreamType::Attachment);
        assert_eq!(classify(AvMediaType::Unknown), StreamType::Unknown);
    }
}
