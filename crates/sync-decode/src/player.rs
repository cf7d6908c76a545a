// crates/sync-decode/src/player.rs
//
// Player: the coordinator spec.md §3/§5 describes — owns the decoder
// workers and the demuxer feeding them, drives the presentation clock,
// and exposes the three pull APIs a host polls from its own audio/video/
// subtitle threads.
//
// Construction and teardown order matter (spec.md §5):
//   construct decoders first, demuxer last — the demuxer must never
//   observe a route whose queue doesn't exist yet.
//   tear down the demuxer first, decoders after — otherwise the demuxer
//   could still be pushing packets at a worker mid-join.

use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use ffmpeg_the_third as ffmpeg;
use ffmpeg::media::Type as AvMediaType;

use sync_types::{
    AudioFormat, MediaError, PlayerState, PresentationClock, SubtitleFormat, SubtitlePacket, VideoFormat,
    VideoPacket,
};

use crate::audio::{pull_audio, AudioHandler};
use crate::demux::{DemuxWorker, StreamRoute};
use crate::registry;
use crate::source::Source;
use crate::subtitle::{SubtitleStyleEngine, SubtitleWorker};
use crate::video::{pull_video, VideoHandler};
use crate::worker::DecoderWorker;

/// Queue depths from SPEC_FULL.md §4.2 — small input buffers (a handful of
/// compressed packets is plenty of lookahead), output buffers sized per
/// medium: a couple of decoded video frames is already several megabytes,
/// while decoded audio packets are cheap enough to buffer much deeper.
mod queue_sizes {
    pub const AUDIO_INPUT: usize = 3;
    pub const AUDIO_OUTPUT: usize = 64;
    pub const VIDEO_INPUT: usize = 2;
    pub const VIDEO_OUTPUT: usize = 2;
    pub const SUBTITLE_INPUT: usize = 8;
}

pub struct PlayerInfo {
    pub audio: Option<AudioFormat>,
    pub video: Option<VideoFormat>,
    pub subtitle: Option<SubtitleFormat>,
}

pub struct Player {
    source: Source,
    clock: Mutex<PresentationClock>,
    audio: Option<DecoderWorker<AudioHandler>>,
    audio_format: Option<AudioFormat>,
    video: Option<DecoderWorker<VideoHandler>>,
    video_format: Option<VideoFormat>,
    subtitle: Option<SubtitleWorker>,
    subtitle_format: Option<SubtitleFormat>,
    demux: Option<DemuxWorker>,
}

impl Player {
    /// `Kit_CreatePlayer`: opens decoders for the streams selected on
    /// `source` (one audio, one video, at most one subtitle — spec.md §3),
    /// then starts the demuxer last so it never sees a half-built routing
    /// table.
    pub fn new(
        source: Source,
        audio_stream: Option<usize>,
        video_stream: Option<usize>,
        subtitle_stream: Option<usize>,
        style_engine: Option<Arc<dyn SubtitleStyleEngine>>,
    ) -> Result<Self> {
        registry::require_initialized().map_err(anyhow::Error::from)?;

        let (audio, audio_format) = match audio_stream {
            Some(idx) => {
                let (handler, format) = open_audio_handler(&source, idx)?;
                let worker = DecoderWorker::spawn(handler, queue_sizes::AUDIO_INPUT, queue_sizes::AUDIO_OUTPUT);
                (Some(worker), Some(format))
            }
            None => (None, None),
        };

        let (video, video_format) = match video_stream {
            Some(idx) => {
                let (handler, format) = open_video_handler(&source, idx)?;
                let worker = DecoderWorker::spawn(handler, queue_sizes::VIDEO_INPUT, queue_sizes::VIDEO_OUTPUT);
                (Some(worker), Some(format))
            }
            None => (None, None),
        };

        let (subtitle, subtitle_format) = match subtitle_stream {
            Some(idx) => {
                let (decoder, time_base, w, h) = open_subtitle_decoder(&source, idx, &video_format)?;
                let worker = SubtitleWorker::spawn(
                    decoder,
                    time_base,
                    w,
                    h,
                    style_engine,
                    queue_sizes::SUBTITLE_INPUT,
                );
                (
                    Some(worker),
                    Some(SubtitleFormat {
                        stream_idx: idx as i32,
                        is_enabled: true,
                    }),
                )
            }
            None => (None, None),
        };

        let mut routes = Vec::new();
        if let (Some(idx), Some(w)) = (audio_stream, &audio) {
            routes.push(StreamRoute { stream_index: idx, queue: Arc::clone(w.input()) });
        }
        if let (Some(idx), Some(w)) = (video_stream, &video) {
            routes.push(StreamRoute { stream_index: idx, queue: Arc::clone(w.input()) });
        }
        if let (Some(idx), Some(w)) = (subtitle_stream, &subtitle) {
            routes.push(StreamRoute { stream_index: idx, queue: Arc::clone(w.input()) });
        }

        let demux = DemuxWorker::spawn(source.clone(), routes);

        Ok(Self {
            source,
            clock: Mutex::new(PresentationClock::new()),
            audio,
            audio_format,
            video,
            video_format,
            subtitle,
            subtitle_format,
            demux: Some(demux),
        })
    }

    pub fn player_info(&self) -> PlayerInfo {
        PlayerInfo {
            audio: self.audio_format,
            video: self.video_format,
            subtitle: self.subtitle_format,
        }
    }

    pub fn state(&self) -> PlayerState {
        self.clock.lock().expect("clock mutex poisoned").state()
    }

    pub fn play(&self) {
        self.clock.lock().expect("clock mutex poisoned").play();
    }

    pub fn pause(&self) {
        self.clock.lock().expect("clock mutex poisoned").pause();
    }

    pub fn stop(&self) {
        self.clock.lock().expect("clock mutex poisoned").stop();
    }

    pub fn position(&self) -> f64 {
        self.clock.lock().expect("clock mutex poisoned").position()
    }

    pub fn duration(&self) -> Option<f64> {
        self.source.duration().ok().flatten()
    }

    /// `Kit_PlayerSeek` (SPEC_FULL.md §4.12 — the synchronous resolution of
    /// spec.md §9's seek Open Question): flush every active decoder (which
    /// already clears and resumes both its queues), seek the shared
    /// `Source`, then rebase the presentation clock to land on `target`.
    /// No separate control-channel packet is needed because `Flushing`
    /// already is the clear-and-resume primitive a seek requires.
    pub fn seek(&self, target_secs: f64) -> Result<()> {
        if let Some(w) = &self.audio {
            w.request_flush();
        }
        if let Some(w) = &self.video {
            w.request_flush();
        }
        if let Some(w) = &self.subtitle {
            w.request_flush();
        }

        {
            let mut guard = self
                .source
                .input()
                .lock()
                .map_err(|_| anyhow!("source mutex poisoned"))?;
            crate::helpers::seek::seek_to_secs(&mut guard, target_secs, "Player::seek");
        }

        self.clock.lock().expect("clock mutex poisoned").rebase_to(target_secs);
        Ok(())
    }

    /// `Kit_GetAudioData`: no-op outside `Playing`, per spec.md §4.1.
    /// `cur_buf_len` is how many bytes of previously-delivered audio the
    /// host still has sitting unplayed in its own device buffer (spec.md
    /// §4.3 step 2, §6's `get_audio_data` signature).
    pub fn pull_audio(&self, cur_buf_len: usize, dst: &mut [u8]) -> usize {
        let (Some(worker), Some(format)) = (&self.audio, &self.audio_format) else {
            return 0;
        };
        if self.state() != PlayerState::Playing {
            return 0;
        }
        let clock = self.clock.lock().expect("clock mutex poisoned");
        pull_audio(worker.output(), &clock, format, cur_buf_len, dst)
    }

    /// `Kit_GetVideoData`: no-op outside `Playing`, per spec.md §4.1.
    pub fn pull_video(&self) -> Option<VideoPacket> {
        let worker = self.video.as_ref()?;
        if self.state() != PlayerState::Playing {
            return None;
        }
        let clock = self.clock.lock().expect("clock mutex poisoned");
        pull_video(worker.output(), &clock)
    }

    /// `Kit_GetSubtitleData`: no-op outside `Playing`, per spec.md §4.1.
    pub fn pull_subtitles(&self) -> Vec<SubtitlePacket> {
        let Some(worker) = &self.subtitle else {
            return Vec::new();
        };
        if self.state() != PlayerState::Playing {
            return Vec::new();
        }
        let clock = self.clock.lock().expect("clock mutex poisoned");
        worker.pull(&clock)
    }
}

impl Drop for Player {
    /// Teardown order from spec.md §5: demuxer first (it's the producer
    /// still writing into the workers' queues), then each decoder worker.
    /// Each worker's own `Drop` already does the two-phase
    /// prepare-then-join, so dropping them in order after the demuxer is
    /// enough — no extra broadcast step is needed here.
    fn drop(&mut self) {
        self.demux.take();
        self.audio.take();
        self.video.take();
        self.subtitle.take();
    }
}

fn stream_params(
    source: &Source,
    idx: usize,
) -> Result<(ffmpeg::codec::parameters::Parameters, ffmpeg::util::rational::Rational)> {
    let guard = source.input().lock().map_err(|_| anyhow!("source mutex poisoned"))?;
    let stream = guard
        .stream(idx)
        .ok_or_else(|| anyhow!("no stream at index {idx}"))?;
    Ok((stream.parameters(), stream.time_base()))
}

fn open_audio_handler(source: &Source, idx: usize) -> Result<(AudioHandler, AudioFormat)> {
    let (params, time_base) = stream_params(source, idx)?;
    if params.medium() != AvMediaType::Audio {
        return Err(MediaError::InvalidInput(format!("stream {idx} is not an audio stream")).into());
    }
    AudioHandler::new(params, time_base, idx as i32)
}

fn open_video_handler(source: &Source, idx: usize) -> Result<(VideoHandler, VideoFormat)> {
    let (params, time_base) = stream_params(source, idx)?;
    if params.medium() != AvMediaType::Video {
        return Err(MediaError::InvalidInput(format!("stream {idx} is not a video stream")).into());
    }
    VideoHandler::new(params, time_base, idx as i32)
}

fn open_subtitle_decoder(
    source: &Source,
    idx: usize,
    video_format: &Option<VideoFormat>,
) -> Result<(ffmpeg::decoder::Subtitle, ffmpeg::util::rational::Rational, u32, u32)> {
    let (params, time_base) = stream_params(source, idx)?;
    if params.medium() != AvMediaType::Subtitle {
        return Err(MediaError::InvalidInput(format!("stream {idx} is not a subtitle stream")).into());
    }
    let context = ffmpeg::codec::context::Context::from_parameters(params)?;
    let decoder = context.decoder().subtitle()?;
    let (w, h) = video_format.map(|f| (f.width, f.height)).unwrap_or((0, 0));
    Ok((decoder, time_base, w, h))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn player_info_reflects_only_the_streams_that_were_opened() {
        // constructing a Player end-to-end needs a real container; this
        // exercises the PlayerInfo projection logic in isolation instead.
        let info = PlayerInfo {
            audio: Some(AudioFormat {
                samplerate: 44100,
                channels: 2,
                bytes: 2,
                is_signed: true,
                format: sync_types::HostSampleFormat::S16Sys,
                stream_idx: 1,
                is_enabled: true,
            }),
            video: None,
            subtitle: None,
        };
        assert!(info.audio.is_some());
        assert!(info.video.is_none());
    }
}
