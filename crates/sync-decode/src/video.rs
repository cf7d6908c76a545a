// crates/sync-decode/src/video.rs
//
// Video decoder specialization (spec.md §4.4): decode -> scale to a host
// pixel format -> enqueue, plus the pull API a host's render/vsync thread
// polls on its own thread.

use std::cmp::Ordering;

use anyhow::Result;
use ffmpeg_the_third as ffmpeg;
use ffmpeg::software::scaling::{context::Context as SwsContext, flag::Flags};
use ffmpeg::util::rational::Rational;

use sync_types::{BoundedQueue, DecodedImage, PresentationClock, VideoFormat, VideoPacket};

use crate::formats::{av_pixel_format_for, host_pixel_format_for, pts_seconds};
use crate::worker::{Handler, Packet};

/// A/V sync threshold for video (spec.md §4.4) — tighter than audio's
/// because a late or early video frame is visually obvious at much smaller
/// offsets than an audible audio glitch.
pub const VIDEO_SYNC_THRESHOLD_SECS: f64 = 0.010;

pub struct VideoHandler {
    decoder: ffmpeg::decoder::Video,
    scaler: SwsContext,
    time_base: Rational,
    format: VideoFormat,
}

impl VideoHandler {
    pub fn new(
        params: ffmpeg::codec::parameters::Parameters,
        time_base: Rational,
        stream_idx: i32,
    ) -> Result<(Self, VideoFormat)> {
        let context = ffmpeg::codec::context::Context::from_parameters(params)?;
        let decoder = context.decoder().video()?;

        let host_format = host_pixel_format_for(decoder.format());
        let format = VideoFormat {
            width: decoder.width(),
            height: decoder.height(),
            format: host_format,
            stream_idx,
            is_enabled: true,
        };

        let scaler = SwsContext::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            av_pixel_format_for(host_format),
            decoder.width(),
            decoder.height(),
            Flags::BICUBIC,
        )?;

        Ok((
            Self {
                decoder,
                scaler,
                time_base,
                format,
            },
            format,
        ))
    }
}

impl Handler for VideoHandler {
    type Output = VideoPacket;

    fn handle(
        &mut self,
        packet: Packet,
        out: &BoundedQueue<VideoPacket>,
        should_continue: &dyn Fn() -> bool,
    ) -> Result<()> {
        self.decoder.send_packet(&packet)?;
        let mut decoded = ffmpeg::util::frame::video::Video::empty();
        while should_continue() && self.decoder.receive_frame(&mut decoded).is_ok() {
            let pts = pts_seconds(decoded.timestamp(), self.time_base);

            let mut scaled = ffmpeg::util::frame::video::Video::empty();
            self.scaler.run(&decoded, &mut scaled)?;

            let plane_count = if self.format.format.is_planar() { 3 } else { 1 };
            let mut planes = Vec::with_capacity(plane_count);
            let mut strides = Vec::with_capacity(plane_count);
            for i in 0..plane_count {
                strides.push(scaled.stride(i));
                planes.push(scaled.data(i).to_vec());
            }

            out.write(VideoPacket {
                pts,
                frame: DecodedImage {
                    width: self.format.width,
                    height: self.format.height,
                    planes,
                    strides,
                },
            });
        }
        Ok(())
    }

    fn flush(&mut self) {
        let _ = self.decoder.flush();
    }
}

/// `Kit_GetVideoData`: pops the next frame due for display against `clock`
/// (spec.md §4.4):
///   - If nothing is queued, or the head frame's PTS is still more than
///     `VIDEO_SYNC_THRESHOLD_SECS` ahead of the clock, there's nothing to
///     show yet — return `None` without consuming anything.
///   - If the head frame has fallen more than the threshold behind, it was
///     never going to be shown in sync: drop it and re-check the new head.
///   - Otherwise the head frame is within the sync window — dequeue and
///     return it.
pub fn pull_video(queue: &BoundedQueue<VideoPacket>, clock: &PresentationClock) -> Option<VideoPacket> {
    let now = clock.media_time_now();
    loop {
        let verdict = queue.peek_front(|head| {
            head.map(|p| {
                if p.pts < now - VIDEO_SYNC_THRESHOLD_SECS {
                    Ordering::Less
                } else if p.pts > now + VIDEO_SYNC_THRESHOLD_SECS {
                    Ordering::Greater
                } else {
                    Ordering::Equal
                }
            })
        });
        match verdict {
            None | Some(Ordering::Greater) => return None,
            Some(Ordering::Less) => {
                queue.advance();
                continue;
            }
            Some(Ordering::Equal) => return queue.read(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sync_types::{HostPixelFormat, PlayerState};

    fn image() -> DecodedImage {
        DecodedImage {
            width: 4,
            height: 4,
            planes: vec![vec![0u8; 16]],
            strides: vec![4],
        }
    }

    fn playing_clock_at(t: f64) -> PresentationClock {
        let mut c = PresentationClock::new();
        c.play();
        c.rebase_to(t);
        assert_eq!(c.state(), PlayerState::Playing);
        c
    }

    #[test]
    fn returns_none_when_queue_is_empty() {
        let q: BoundedQueue<VideoPacket> = BoundedQueue::new(2);
        let clock = playing_clock_at(0.0);
        assert!(pull_video(&q, &clock).is_none());
    }

    #[test]
    fn withholds_a_frame_that_is_still_ahead_of_the_clock() {
        let q: BoundedQueue<VideoPacket> = BoundedQueue::new(2);
        q.write(VideoPacket { pts: 5.0, frame: image() });
        let clock = playing_clock_at(0.0);
        assert!(pull_video(&q, &clock).is_none());
        assert_eq!(q.len(), 1, "frame must not be consumed while withheld");
    }

    #[test]
    fn drops_stale_frames_then_returns_the_one_in_window() {
        let q: BoundedQueue<VideoPacket> = BoundedQueue::new(4);
        q.write(VideoPacket { pts: 0.0, frame: image() });
        q.write(VideoPacket { pts: 1.0, frame: image() });
        let clock = playing_clock_at(1.0);
        let got = pull_video(&q, &clock).expect("frame in sync window");
        assert_eq!(got.pts, 1.0);
        assert!(q.is_empty());
    }

    #[test]
    fn returns_frame_exactly_at_clock_time() {
        let q: BoundedQueue<VideoPacket> = BoundedQueue::new(2);
        q.write(VideoPacket { pts: 2.0, frame: image() });
        let clock = playing_clock_at(2.0);
        let got = pull_video(&q, &clock).expect("frame exactly in window");
        assert_eq!(got.pts, 2.0);
    }

    #[test]
    fn host_pixel_format_planar_flag_selects_plane_count() {
        assert!(HostPixelFormat::Yv12.is_planar());
        assert!(!HostPixelFormat::Abgr8888.is_planar());
    }
}
