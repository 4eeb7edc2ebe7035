use crate::engine::FlowEngine;
use crate::pipeline::enhance;
use crate::pipeline::progress::ProgressTracker;
use crate::structs::EnhancedFlowRecord;
use crate::utils::FlowRng;

use crossbeam_channel::Sender;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

/// When a producer ceases on its own: after a fixed number of records, or
/// once its engine clock reaches a bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopCondition {
    FlowCount(u64),
    EndTimestamp(u64),
}

impl StopCondition {
    fn reached(&self, flows_emitted: u64, current_timestamp_ns: u64) -> bool {
        match *self {
            StopCondition::FlowCount(limit) => flows_emitted >= limit,
            StopCondition::EndTimestamp(end_ns) => current_timestamp_ns >= end_ns,
        }
    }
}

/// Collector-side view of one producer: its private record buffer plus the
/// `done` flag published with release semantics when the thread exits.
pub struct ProducerHandle {
    pub stream_id: u32,
    pub done: Arc<AtomicBool>,
    pub thread: thread::JoinHandle<u64>,
}

impl ProducerHandle {
    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }
}

/// Spawn one producer thread. It owns its engine and a private synthesis
/// RNG; records flow out through `buffer`, which never blocks the producer
/// (the channel is unbounded and the collector is the only reader).
///
/// Telemetry goes to `tracker` with relaxed ordering; `shutdown` is honoured
/// between records. The thread returns its emission count.
pub fn spawn_producer(
    stream_id: u32,
    mut engine: FlowEngine,
    synth_seed: u64,
    stop: StopCondition,
    buffer: Sender<EnhancedFlowRecord>,
    tracker: Arc<ProgressTracker>,
    shutdown: Arc<AtomicBool>,
) -> ProducerHandle {
    let done = Arc::new(AtomicBool::new(false));
    let done_flag = Arc::clone(&done);

    // publishes `done` on every exit path, a panic included, so the
    // collector never waits on a dead producer
    struct DoneGuard(Arc<AtomicBool>);
    impl Drop for DoneGuard {
        fn drop(&mut self) {
            self.0.store(true, Ordering::Release);
        }
    }

    let builder = thread::Builder::new().name(format!("producer-{stream_id}"));
    let thread = builder
        .spawn(move || {
            log::trace!("producer {stream_id} starts");
            let _done = DoneGuard(done_flag);
            let mut rng = FlowRng::seeded(synth_seed);
            let mut emitted: u64 = 0;
            let thread_index = (stream_id - 1) as usize;

            while !shutdown.load(Ordering::Relaxed)
                && !stop.reached(emitted, engine.current_timestamp_ns())
            {
                let record = engine.next_record();
                let enhanced = enhance::enhance(&mut rng, stream_id, &record);

                tracker.update_timestamp(thread_index, enhanced.first_timestamp);
                tracker.add_flows(1);
                tracker.add_bytes(enhanced.byte_count);

                if buffer.send(enhanced).is_err() {
                    // collector is gone, nothing left to produce for
                    log::warn!("producer {stream_id}: output buffer closed early");
                    break;
                }
                emitted += 1;
            }

            log::trace!("producer {stream_id} stops after {emitted} flows");
            emitted
        })
        .expect("cannot spawn a producer thread");

    ProducerHandle {
        stream_id,
        done,
        thread,
    }
}
