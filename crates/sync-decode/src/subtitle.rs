// crates/sync-decode/src/subtitle.rs
//
// Subtitle decoding (spec.md §4.5) deliberately does not reuse
// `DecoderWorker<H>`: a subtitle event doesn't arrive one-per-display-slot
// the way an audio/video frame does; it has its own start/end window and
// several events can be active at once. Output is a mutex-protected
// active list a pull call filters by "is this event live at time t", not
// a FIFO a pull call dequeues from.
//
// Bitmap rects (DVD/DVB/PGS-style subtitles) are decoded in-crate by
// blitting their palette indices to RGBA. Styled-text events (ASS/SSA)
// are handed to a `SubtitleStyleEngine` implementation the host supplies —
// glyph rasterization needs a font stack this crate has no business
// owning (see SPEC_FULL.md §4.5 Non-goals).

use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::Result;
use ffmpeg_the_third as ffmpeg;
use ffmpeg::util::rational::Rational;

use sync_types::{LifecycleCell, LifecycleState, OverlayRect, PresentationClock, SubtitlePacket};

use crate::worker::Packet;

const IDLE_POLL: Duration = Duration::from_millis(2);

/// Rendering collaborator for styled-text subtitle events (ASS/SSA). The
/// host supplies an implementation backed by whatever font/text-shaping
/// stack it already has; this crate never rasterizes text itself.
pub trait SubtitleStyleEngine: Send + Sync {
    fn render(&self, text: &str, frame_width: u32, frame_height: u32) -> Option<(OverlayRect, Vec<u8>)>;
}

fn blit_bitmap(rect: &ffmpeg::util::frame::subtitle::Bitmap) -> (OverlayRect, Vec<u8>) {
    let w = rect.width();
    let h = rect.height();
    let indices = rect.data(0);
    let palette = rect.data(1);
    let mut rgba = vec![0u8; (w * h * 4) as usize];
    for i in 0..(w * h) as usize {
        let idx = *indices.get(i).unwrap_or(&0) as usize;
        let src = idx * 4;
        if src + 4 <= palette.len() {
            rgba[i * 4..i * 4 + 4].copy_from_slice(&palette[src..src + 4]);
        }
    }
    (
        OverlayRect {
            x: rect.x() as i32,
            y: rect.y() as i32,
            w,
            h,
        },
        rgba,
    )
}

/// `pts_end < 0.0` is the sentinel spec.md §4.5 uses for "valid until the
/// next event replaces it" — ffmpeg reports that case as
/// `end_display_time == u32::MAX`.
fn pts_end_for(pts_start: f64, end_display_time_ms: u32) -> f64 {
    if end_display_time_ms == u32::MAX {
        -1.0
    } else {
        pts_start + end_display_time_ms as f64 / 1000.0
    }
}

struct DecodedEvent {
    packets: Vec<SubtitlePacket>,
    is_styled_text: bool,
}

fn decode_packet(
    decoder: &mut ffmpeg::decoder::Subtitle,
    style_engine: Option<&dyn SubtitleStyleEngine>,
    packet: &Packet,
    time_base: Rational,
    frame_width: u32,
    frame_height: u32,
) -> Result<DecodedEvent> {
    let pts_start = crate::formats::pts_seconds(packet.pts(), time_base);
    let mut raw = ffmpeg::Subtitle::new();
    decoder.decode(packet, &mut raw)?;

    let mut packets = Vec::new();
    let mut is_styled_text = false;

    for rect in raw.rects() {
        match rect {
            ffmpeg::util::frame::subtitle::Rect::Bitmap(bmp) => {
                let (ov, rgba) = blit_bitmap(&bmp);
                packets.push(SubtitlePacket {
                    pts_start,
                    pts_end: pts_end_for(pts_start, raw.end()),
                    rect: ov,
                    rgba,
                });
            }
            ffmpeg::util::frame::subtitle::Rect::Ass(ass) => {
                is_styled_text = true;
                if let Some(engine) = style_engine {
                    if let Some((ov, rgba)) = engine.render(ass.get(), frame_width, frame_height) {
                        packets.push(SubtitlePacket {
                            pts_start,
                            pts_end: pts_end_for(pts_start, raw.end()),
                            rect: ov,
                            rgba,
                        });
                    }
                }
            }
            ffmpeg::util::frame::subtitle::Rect::Text(text) => {
                is_styled_text = true;
                if let Some(engine) = style_engine {
                    if let Some((ov, rgba)) = engine.render(text.get(), frame_width, frame_height) {
                        packets.push(SubtitlePacket {
                            pts_start,
                            pts_end: pts_end_for(pts_start, raw.end()),
                            rect: ov,
                            rgba,
                        });
                    }
                }
            }
            ffmpeg::util::frame::subtitle::Rect::None(_) => {}
        }
    }

    Ok(DecodedEvent {
        packets,
        is_styled_text,
    })
}

/// Replace-vs-evict rule (SPEC_FULL.md §3, carried over from the original's
/// `kitsubdecthread.c`): a styled-text event resets the whole overlay —
/// ASS cues are authored assuming only one is ever on screen for a given
/// style track. A bitmap event only evicts the entries that were open-ended
/// (`pts_end < 0.0`); bitmap formats can legitimately show several
/// differently-timed rects at once (e.g. two DVD subtitle regions).
fn apply_decoded(active: &Mutex<Vec<SubtitlePacket>>, decoded: DecodedEvent) {
    let mut guard = active.lock().expect("subtitle active-list mutex poisoned");
    if decoded.is_styled_text {
        guard.clear();
    } else {
        guard.retain(|p| p.pts_end < 0.0);
    }
    guard.extend(decoded.packets);
}

pub struct SubtitleWorker {
    input: Arc<sync_types::BoundedQueue<Packet>>,
    active: Arc<Mutex<Vec<SubtitlePacket>>>,
    state: Arc<LifecycleCell>,
    thread: Option<JoinHandle<()>>,
}

impl SubtitleWorker {
    pub fn spawn(
        mut decoder: ffmpeg::decoder::Subtitle,
        time_base: Rational,
        frame_width: u32,
        frame_height: u32,
        style_engine: Option<Arc<dyn SubtitleStyleEngine>>,
        input_capacity: usize,
    ) -> Self {
        let input = Arc::new(sync_types::BoundedQueue::new(input_capacity));
        let active = Arc::new(Mutex::new(Vec::new()));
        let state = Arc::new(LifecycleCell::new(LifecycleState::Running));

        let thread_input = Arc::clone(&input);
        let thread_active = Arc::clone(&active);
        let thread_state = Arc::clone(&state);

        let thread = thread::spawn(move || loop {
            match thread_state.load() {
                LifecycleState::Closed | LifecycleState::Closing => break,
                LifecycleState::Flushing => {
                    thread_input.clear();
                    thread_active.lock().expect("subtitle active-list mutex poisoned").clear();
                    thread_state.store(LifecycleState::Running);
                    continue;
                }
                LifecycleState::Running => {}
            }

            match thread_input.read() {
                Some(packet) => {
                    match decode_packet(
                        &mut decoder,
                        style_engine.as_deref(),
                        &packet,
                        time_base,
                        frame_width,
                        frame_height,
                    ) {
                        Ok(decoded) => apply_decoded(&thread_active, decoded),
                        Err(e) => {
                            sync_types::set_error(e.to_string());
                            eprintln!("[subtitle] decode failed: {e}");
                        }
                    }
                }
                None => thread::sleep(IDLE_POLL),
            }
        });

        Self {
            input,
            active,
            state,
            thread: Some(thread),
        }
    }

    pub fn input(&self) -> &Arc<sync_types::BoundedQueue<Packet>> {
        &self.input
    }

    pub fn state(&self) -> LifecycleState {
        self.state.load()
    }

    pub fn request_flush(&self) {
        self.state.store(LifecycleState::Flushing);
    }

    pub fn prepare_close(&self) {
        self.state.store(LifecycleState::Closing);
        self.input.notify_all();
    }

    pub fn join(&mut self) {
        if let Some(t) = self.thread.take() {
            let _ = t.join();
        }
        self.state.store(LifecycleState::Closed);
    }

    /// `Kit_GetSubtitleData`: every event active at the clock's current
    /// media time, pruning anything with a fixed end time that has passed.
    pub fn pull(&self, clock: &PresentationClock) -> Vec<SubtitlePacket> {
        pull_subtitles(&self.active, clock)
    }
}

impl Drop for SubtitleWorker {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.prepare_close();
            self.join();
        }
    }
}

pub fn pull_subtitles(active: &Mutex<Vec<SubtitlePacket>>, clock: &PresentationClock) -> Vec<SubtitlePacket> {
    let now = clock.media_time_now();
    let mut guard = active.lock().expect("subtitle active-list mutex poisoned");
    guard.retain(|p| p.pts_end < 0.0 || now < p.pts_end);
    guard.iter().filter(|p| p.is_active_at(now)).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bitmap(pts_start: f64, pts_end: f64) -> SubtitlePacket {
        SubtitlePacket {
            pts_start,
            pts_end,
            rect: OverlayRect { x: 0, y: 0, w: 10, h: 10 },
            rgba: vec![],
        }
    }

    #[test]
    fn styled_text_event_clears_open_ended_bitmap_entries() {
        let active = Mutex::new(vec![bitmap(0.0, -1.0)]);
        apply_decoded(
            &active,
            DecodedEvent {
                packets: vec![bitmap(1.0, 2.0)],
                is_styled_text: true,
            },
        );
        let guard = active.lock().unwrap();
        assert_eq!(guard.len(), 1);
        assert_eq!(guard[0].pts_start, 1.0);
    }

    #[test]
    fn bitmap_event_only_evicts_open_ended_entries() {
        let active = Mutex::new(vec![bitmap(0.0, 5.0), bitmap(0.0, -1.0)]);
        apply_decoded(
            &active,
            DecodedEvent {
                packets: vec![bitmap(1.0, 3.0)],
                is_styled_text: false,
            },
        );
        let guard = active.lock().unwrap();
        // the fixed-end entry (0.0, 5.0) survives, the open-ended one is evicted,
        // and the new entry is added.
        assert_eq!(guard.len(), 2);
        assert!(guard.iter().any(|p| p.pts_start == 0.0 && p.pts_end == 5.0));
        assert!(guard.iter().any(|p| p.pts_start == 1.0));
    }

    #[test]
    fn pull_prunes_expired_and_filters_by_time() {
        let active = Mutex::new(vec![bitmap(0.0, 1.0), bitmap(2.0, -1.0)]);
        let mut clock = PresentationClock::new();
        clock.play();
        clock.rebase_to(2.5);
        let visible = pull_subtitles(&active, &clock);
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].pts_start, 2.0);
        assert_eq!(active.lock().unwrap().len(), 1, "expired bitmap entry pruned");
    }

    #[test]
    fn pts_end_sentinel_comes_from_max_display_time() {
        assert_eq!(pts_end_for(1.0, u32::MAX), -1.0);
        assert_eq!(pts_end_for(1.0, 2500), 3.5);
    }
}
