// crates/sync-decode/src/worker.rs
//
// DecoderWorker<H>: the generic decoder-thread engine from spec.md §4.2.
// Audio, video, and subtitle specializations plug in through the
// `Handler` trait rather than through inheritance — spec.md §9 calls this
// out explicitly as the shape to prefer over the original's ad hoc
// function-pointer struct. The subtitle path doesn't fit this shape at
// all (spec.md §4.5) and gets its own dedicated worker in subtitle.rs.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::Result;
use ffmpeg_the_third as ffmpeg;

use sync_types::{BoundedQueue, LifecycleCell, LifecycleState};

pub type Packet = ffmpeg::codec::packet::Packet;

/// Idle-poll interval when a worker's input queue is empty. Spec.md §4.1
/// describes callers polling pull APIs "on a short cycle"; the decode
/// thread itself uses the same order of magnitude so it neither busy-spins
/// nor adds perceptible latency once a packet arrives.
const IDLE_POLL: Duration = Duration::from_millis(2);

/// What an audio/video specialization plugs into the generic worker loop.
/// `handle` decodes one demuxed packet and pushes zero or more outputs;
/// `flush` resets any codec-internal buffering on a `Flushing` transition.
pub trait Handler: Send + 'static {
    type Output: Send + 'static;

    fn handle(
        &mut self,
        packet: Packet,
        out: &BoundedQueue<Self::Output>,
        should_continue: &dyn Fn() -> bool,
    ) -> Result<()>;

    fn flush(&mut self);

    /// Present for parity with spec.md §4.3's per-packet PTS field; the
    /// generic loop doesn't call this itself today, only specializations
    /// that need to inspect an already-queued output's timestamp do.
    fn pts_of(_output: &Self::Output) -> f64 {
        0.0
    }
}

pub struct DecoderWorker<H: Handler> {
    input: Arc<BoundedQueue<Packet>>,
    output: Arc<BoundedQueue<H::Output>>,
    state: Arc<LifecycleCell>,
    thread: Option<JoinHandle<()>>,
}

impl<H: Handler> DecoderWorker<H> {
    pub fn spawn(mut handler: H, input_capacity: usize, output_capacity: usize) -> Self {
        let input = Arc::new(BoundedQueue::new(input_capacity));
        let output = Arc::new(BoundedQueue::new(output_capacity));
        let state = Arc::new(LifecycleCell::new(LifecycleState::Running));

        let thread_input = Arc::clone(&input);
        let thread_output = Arc::clone(&output);
        let thread_state = Arc::clone(&state);

        let thread = thread::spawn(move || loop {
            match thread_state.load() {
                LifecycleState::Closed | LifecycleState::Closing => break,
                LifecycleState::Flushing => {
                    handler.flush();
                    thread_input.clear();
                    thread_output.clear();
                    thread_state.store(LifecycleState::Running);
                    continue;
                }
                LifecycleState::Running => {}
            }

            match thread_input.read() {
                Some(packet) => {
                    let still_running = || thread_state.load() == LifecycleState::Running;
                    if let Err(e) = handler.handle(packet, &thread_output, &still_running) {
                        sync_types::set_error(e.to_string());
                        eprintln!("[decoder] handle failed: {e}");
                    }
                }
                None => thread::sleep(IDLE_POLL),
            }
        });

        Self {
            input,
            output,
            state,
            thread: Some(thread),
        }
    }

    pub fn input(&self) -> &Arc<BoundedQueue<Packet>> {
        &self.input
    }

    pub fn output(&self) -> &Arc<BoundedQueue<H::Output>> {
        &self.output
    }

    pub fn state(&self) -> LifecycleState {
        self.state.load()
    }

    /// Requests the decode loop clear both queues and reset codec state on
    /// its next iteration — the mechanism a seek (SPEC_FULL.md §4.12) reuses
    /// rather than inventing a separate control path.
    pub fn request_flush(&self) {
        self.state.store(LifecycleState::Flushing);
    }

    /// Teardown phase one (spec.md §4.2/§5): mark `Closing` and wake any
    /// writer blocked on a full queue. Must run on every worker in a group
    /// before `join` is called on any of them — a writer parked mid-`write`
    /// on one worker's queue would otherwise deadlock the whole teardown.
    pub fn prepare_close(&self) {
        self.state.store(LifecycleState::Closing);
        self.input.notify_all();
        self.output.notify_all();
    }

    /// Teardown phase two: block until the decode thread exits. Only safe
    /// to call after `prepare_close` has already run on every worker being
    /// torn down alongside this one.
    pub fn join(&mut self) {
        if let Some(t) = self.thread.take() {
            let _ = t.join();
        }
        self.state.store(LifecycleState::Closed);
    }
}

impl<H: Handler> Drop for DecoderWorker<H> {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.prepare_close();
            self.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingHandler(Arc<AtomicUsize>);

    impl Handler for CountingHandler {
        type Output = i32;

        fn handle(
            &mut self,
            packet: Packet,
            out: &BoundedQueue<i32>,
            _should_continue: &dyn Fn() -> bool,
        ) -> Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            out.write(packet.size() as i32);
            Ok(())
        }

        fn flush(&mut self) {}
    }

    #[test]
    fn processed_packets_reach_the_output_queue() {
        let counter = Arc::new(AtomicUsize::new(0));
        let worker = DecoderWorker::spawn(CountingHandler(Arc::clone(&counter)), 4, 4);
        worker.input().write(Packet::empty());
        worker.input().write(Packet::empty());

        let mut got = 0;
        for _ in 0..200 {
            if worker.output().len() == 2 {
                got = worker.output().len();
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(got, 2);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn prepare_close_then_join_does_not_deadlock_on_a_full_queue() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut worker = DecoderWorker::spawn(CountingHandler(Arc::clone(&counter)), 1, 1);
        worker.prepare_close();
        worker.join();
        assert_eq!(worker.state(), LifecycleState::Closed);
    }
}
