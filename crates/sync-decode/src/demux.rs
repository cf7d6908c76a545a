// crates/sync-decode/src/demux.rs
//
// DemuxWorker (spec.md §4.1/§4.2): reads packets off the shared `Source`
// and routes each one by stream index to the matching decoder worker's
// input queue, blocking on backpressure the way the original's demux
// thread does — a decoder that falls behind slows the whole pipeline down
// rather than dropping packets silently.
//
// Only two lifecycle states apply here, not the full Running/Flushing/
// Closing/Closed machine every decoder worker goes through: the demuxer
// has no decode buffers of its own to flush, so a seek re-targets the
// shared `Source` directly (see player.rs) rather than asking this worker
// to transition.
//
// Spec.md §4.6/§5: reaching EOF ends the demuxer thread outright rather
// than idling forever — there are no more packets to route, and a thread
// that kept polling after EOF would spin on the source lock for the rest
// of the player's life.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use ffmpeg_the_third as ffmpeg;

use sync_types::{BoundedQueue, LifecycleCell, LifecycleState};

use crate::source::Source;
use crate::worker::Packet;

const IDLE_POLL: Duration = Duration::from_millis(5);

/// Where packets for one stream index get routed.
pub struct StreamRoute {
    pub stream_index: usize,
    pub queue: Arc<BoundedQueue<Packet>>,
}

pub struct DemuxWorker {
    state: Arc<LifecycleCell>,
    thread: Option<JoinHandle<()>>,
}

impl DemuxWorker {
    pub fn spawn(source: Source, routes: Vec<StreamRoute>) -> Self {
        let state = Arc::new(LifecycleCell::new(LifecycleState::Running));
        let thread_state = Arc::clone(&state);

        let thread = thread::spawn(move || loop {
            if thread_state.load() != LifecycleState::Running {
                break;
            }

            let mut packet = Packet::empty();
            let read_result = {
                let mut guard = match source.input().lock() {
                    Ok(g) => g,
                    Err(_) => break,
                };
                packet.read(&mut *guard)
            };

            match read_result {
                Ok(()) => {
                    let idx = packet.stream();
                    if let Some(route) = routes.iter().find(|r| r.stream_index == idx) {
                        let still_running = || thread_state.load() == LifecycleState::Running;
                        if route.queue.write_while(packet, still_running).is_err() {
                            // told to stop mid-write — the outer loop check
                            // above will exit on the next iteration.
                        }
                    }
                }
                Err(ffmpeg::Error::Eof) => {
                    thread_state.store(LifecycleState::Closed);
                    break;
                }
                Err(e) => {
                    sync_types::set_error(e.to_string());
                    thread::sleep(IDLE_POLL);
                }
            }
        });

        Self {
            state,
            thread: Some(thread),
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state.load()
    }

    /// Teardown phase one (spec.md §5): demuxer shuts down first, before
    /// any decoder worker, since it's the one still pushing packets at the
    /// others' input queues.
    pub fn prepare_close(&self) {
        self.state.store(LifecycleState::Closing);
    }

    pub fn join(&mut self) {
        if let Some(t) = self.thread.take() {
            let _ = t.join();
        }
        self.state.store(LifecycleState::Closed);
    }
}

impl Drop for DemuxWorker {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.prepare_close();
            self.join();
        }
    }
}
