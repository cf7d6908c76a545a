// crates/sync-decode/src/audio.rs
//
// Audio decoder specialization (spec.md §4.3): decode -> resample to a
// host sample format -> enqueue, plus the pull API a host's audio device
// callback polls on its own thread.

use anyhow::{anyhow, Result};
use ffmpeg_the_third as ffmpeg;
use ffmpeg::software::resampling::Context as Resampler;
use ffmpeg::util::rational::Rational;

use sync_types::{
    channel_layout_for, AudioFormat, AudioPacket, BoundedQueue, HostSampleFormat,
    PresentationClock, RingBuffer,
};

use crate::formats::{av_channel_layout_for, av_sample_format_for, host_sample_format_for, pts_seconds};
use crate::worker::{Handler, Packet};

/// A/V sync threshold for audio (spec.md §4.3): packets behind the clock by
/// more than this are dropped; packets ahead of it by more than this pad
/// the pull buffer with silence instead of returning stale-looking data.
pub const AUDIO_SYNC_THRESHOLD_SECS: f64 = 0.050;

/// Decodes and resamples one audio stream. Channel count is clamped to
/// stereo or below before reaching the host — spec.md §4.3's downmix rule,
/// since hosts in this domain never render more than two channels.
pub struct AudioHandler {
    decoder: ffmpeg::decoder::Audio,
    resampler: Resampler,
    time_base: Rational,
    format: AudioFormat,
}

impl AudioHandler {
    pub fn new(params: ffmpeg::codec::parameters::Parameters, time_base: Rational, stream_idx: i32) -> Result<(Self, AudioFormat)> {
        let context = ffmpeg::codec::context::Context::from_parameters(params)?;
        let decoder = context.decoder().audio()?;

        let out_channels = decoder.channels().min(2).max(1);
        let out_layout = channel_layout_for(out_channels);
        let (bytes, is_signed, host_format) = host_sample_format_for(decoder.format());

        let format = AudioFormat {
            samplerate: decoder.rate(),
            channels: out_channels,
            bytes,
            is_signed,
            format: host_format,
            stream_idx,
            is_enabled: true,
        };

        let resampler = Resampler::get(
            decoder.format(),
            decoder.channel_layout(),
            decoder.rate(),
            av_sample_format_for(host_format),
            av_channel_layout_for(out_layout),
            decoder.rate(),
        )?;

        Ok((
            Self {
                decoder,
                resampler,
                time_base,
                format,
            },
            format,
        ))
    }
}

impl Handler for AudioHandler {
    type Output = AudioPacket;

    fn handle(
        &mut self,
        packet: Packet,
        out: &BoundedQueue<AudioPacket>,
        should_continue: &dyn Fn() -> bool,
    ) -> Result<()> {
        self.decoder.send_packet(&packet)?;
        let mut frame = ffmpeg::util::frame::audio::Audio::empty();
        while should_continue() && self.decoder.receive_frame(&mut frame).is_ok() {
            let pts = pts_seconds(frame.timestamp(), self.time_base);

            let mut resampled = ffmpeg::util::frame::audio::Audio::empty();
            self.resampler.run(&frame, &mut resampled)?;

            let bytes_per_sample = self.format.bytes as usize * self.format.channels as usize;
            let byte_len = resampled.samples() * bytes_per_sample;
            let data = &resampled.data(0)[..byte_len.min(resampled.data(0).len())];

            let item = AudioPacket {
                pts,
                original_size: data.len(),
                ring: RingBuffer::from_bytes(data),
            };
            out.write(item);
        }
        Ok(())
    }

    fn flush(&mut self) {
        let _ = self.decoder.flush();
    }
}

fn silence_byte(format: &AudioFormat) -> u8 {
    if format.is_signed {
        0x00
    } else {
        0x80
    }
}

/// `Kit_GetAudioDecoderData`: fills `dst` with PCM bytes synchronized to
/// `clock` (spec.md §4.3 steps 1-5). `cur_buf_len` is how many bytes of
/// previously-delivered audio the host still has sitting in its own device
/// buffer, unplayed; it shifts the media time this call sync-checks against
/// forward by that buffer's playback duration, so a host that is still
/// draining earlier audio doesn't get handed a packet that's really meant
/// for later.
///   1. If the output queue has nothing queued at all, there is nothing to
///      hand back — return 0, the same "nothing yet" signal an empty queue
///      gives every other call site.
///   2. Drop queued packets that have already fallen more than the sync
///      threshold behind the clock — they would only ever be heard late.
///   3. If the head packet is still ahead of the clock by more than the
///      threshold, pad with only as much silence as covers that lead (never
///      more than `dst` holds) and return the number of silence bytes
///      written — the packet itself stays queued for the next call.
///   4. Otherwise copy bytes out of the head packet's ring buffer,
///      advancing its PTS in place by the time those bytes represent, and
///      only dequeue it once its ring buffer is exhausted. Return the
///      number of bytes actually copied, not a silence-padded `dst.len()`.
pub fn pull_audio(
    queue: &BoundedQueue<AudioPacket>,
    clock: &PresentationClock,
    format: &AudioFormat,
    cur_buf_len: usize,
    dst: &mut [u8],
) -> usize {
    let bytes_per_sample = format.bytes as usize * format.channels as usize;
    let bytes_per_second = (format.samplerate as usize * bytes_per_sample) as f64;
    let now = clock.media_time_now() + cur_buf_len as f64 / bytes_per_second;
    let silence = silence_byte(format);

    loop {
        let behind = queue.peek_front(|head| head.map(|p| p.pts < now - AUDIO_SYNC_THRESHOLD_SECS));
        match behind {
            Some(true) => {
                queue.advance();
                continue;
            }
            _ => break,
        }
    }

    let lead = queue.peek_front(|head| head.map(|p| p.pts - now));
    let lead = match lead {
        None => return 0,
        Some(lead) => lead,
    };

    if lead > AUDIO_SYNC_THRESHOLD_SECS {
        let diff_samples = (lead * format.samplerate as f64).round().max(0.0) as usize;
        let max_samples = (dst.len() / bytes_per_sample).min(diff_samples);
        let silence_len = max_samples * bytes_per_sample;
        dst[..silence_len].fill(silence);
        return silence_len;
    }

    let mut copied = 0usize;
    queue.with_front_mut(|head| {
        if let Some(pkt) = head {
            copied = pkt.ring.read(dst);
            if copied > 0 {
                pkt.pts += copied as f64 / bytes_per_second;
            }
        }
    });

    if queue.peek_front(|head| head.map(|p| p.ring.is_empty()).unwrap_or(false)) {
        queue.advance();
    }

    copied
}

#[allow(dead_code)]
fn assert_channels_in_range(channels: u8) -> Result<()> {
    if channels == 0 {
        return Err(anyhow!("source reported zero audio channels"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sync_types::RingBuffer;

    fn make_format() -> AudioFormat {
        AudioFormat {
            samplerate: 44100,
            channels: 2,
            bytes: 2,
            is_signed: true,
            format: HostSampleFormat::S16Sys,
            stream_idx: 0,
            is_enabled: true,
        }
    }

    fn playing_clock_at(t: f64) -> PresentationClock {
        let mut c = PresentationClock::new();
        c.play();
        c.rebase_to(t);
        c
    }

    #[test]
    fn returns_zero_when_queue_is_empty() {
        let q: BoundedQueue<AudioPacket> = BoundedQueue::new(4);
        let clock = playing_clock_at(1.0);
        let format = make_format();
        let mut dst = [0xAAu8; 8];
        let n = pull_audio(&q, &clock, &format, 0, &mut dst);
        assert_eq!(n, 0);
        assert_eq!(dst, [0xAAu8; 8], "an empty queue must not touch dst");
    }

    #[test]
    fn caps_silence_to_the_lead_when_head_packet_is_ahead() {
        let q: BoundedQueue<AudioPacket> = BoundedQueue::new(4);
        // head packet is ~1ms ahead of the clock at 44100*4 bytes/sec:
        // diff_samples = round(0.001 * 44100) = 44 samples -> 176 bytes,
        // far short of the 4096-byte buffer a caller might pass in.
        q.write(AudioPacket {
            pts: 1.001,
            original_size: 4,
            ring: RingBuffer::from_bytes(&[9, 9, 9, 9]),
        });
        let clock = playing_clock_at(1.0);
        let format = make_format();
        let mut dst = [0xAAu8; 4096];
        let n = pull_audio(&q, &clock, &format, 0, &mut dst);
        assert_eq!(n, 176);
        assert!(dst[..n].iter().all(|&b| b == 0));
        assert_eq!(dst[n], 0xAA, "bytes past the capped lead must be untouched");
        assert_eq!(q.len(), 1, "the ahead packet must stay queued");
    }

    #[test]
    fn drops_packets_that_have_fallen_behind() {
        let q: BoundedQueue<AudioPacket> = BoundedQueue::new(4);
        q.write(AudioPacket {
            pts: 0.0,
            original_size: 4,
            ring: RingBuffer::from_bytes(&[1, 2, 3, 4]),
        });
        q.write(AudioPacket {
            pts: 1.0,
            original_size: 4,
            ring: RingBuffer::from_bytes(&[5, 6, 7, 8]),
        });
        let clock = playing_clock_at(1.0);
        let format = make_format();
        let mut dst = [0u8; 4];
        let n = pull_audio(&q, &clock, &format, 0, &mut dst);
        assert_eq!(n, 4);
        assert_eq!(dst, [5, 6, 7, 8]);
    }

    #[test]
    fn copies_from_head_and_advances_its_pts() {
        let q: BoundedQueue<AudioPacket> = BoundedQueue::new(4);
        q.write(AudioPacket {
            pts: 1.0,
            original_size: 8,
            ring: RingBuffer::from_bytes(&[1, 2, 3, 4, 5, 6, 7, 8]),
        });
        let clock = playing_clock_at(1.0);
        let format = make_format();
        let mut dst = [0u8; 4];
        let n = pull_audio(&q, &clock, &format, 0, &mut dst);
        assert_eq!(n, 4);
        assert_eq!(dst, [1, 2, 3, 4]);

        // bytes_per_second = 44100 * 2 * 2; 4 bytes consumed should nudge pts
        // forward by a small positive amount without dequeuing the packet.
        let still_queued = q.peek_front(|h| h.map(|p| p.pts > 1.0));
        assert_eq!(still_queued, Some(true));
    }

    #[test]
    fn short_read_from_a_draining_packet_returns_actual_bytes_copied() {
        let q: BoundedQueue<AudioPacket> = BoundedQueue::new(4);
        q.write(AudioPacket {
            pts: 1.0,
            original_size: 2,
            ring: RingBuffer::from_bytes(&[7, 8]),
        });
        let clock = playing_clock_at(1.0);
        let format = make_format();
        let mut dst = [0xAAu8; 8];
        let n = pull_audio(&q, &clock, &format, 0, &mut dst);
        assert_eq!(n, 2, "must report the 2 bytes actually drained, not dst.len()");
        assert_eq!(&dst[..2], &[7, 8]);
        assert!(q.is_empty(), "packet must be dequeued once its ring drains");
    }

    #[test]
    fn cur_buf_len_shifts_the_sync_point_forward() {
        // a packet that sits exactly at the sync threshold ahead of the raw
        // clock looks "ahead" with no buffered audio, but in-window once
        // cur_buf_len's playback time is folded into the sync point.
        let format = make_format();
        let bytes_per_second = format.samplerate as f64 * format.channels as f64 * format.bytes as f64;
        let q: BoundedQueue<AudioPacket> = BoundedQueue::new(4);
        q.write(AudioPacket {
            pts: 1.0 + AUDIO_SYNC_THRESHOLD_SECS * 2.0,
            original_size: 4,
            ring: RingBuffer::from_bytes(&[1, 2, 3, 4]),
        });
        let clock = playing_clock_at(1.0);
        let cur_buf_len = (AUDIO_SYNC_THRESHOLD_SECS * 2.0 * bytes_per_second).round() as usize;
        let mut dst = [0u8; 4];
        let n = pull_audio(&q, &clock, &format, cur_buf_len, &mut dst);
        assert_eq!(n, 4);
        assert_eq!(dst, [1, 2, 3, 4]);
    }
}
