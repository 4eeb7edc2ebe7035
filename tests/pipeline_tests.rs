use flowgen::engine::{EngineConfig, FlowEngine, TrafficPattern};
use flowgen::pipeline::collector::Collector;
use flowgen::pipeline::enhance;
use flowgen::pipeline::format::{FlowFormatter, OutputFormat, SortField};
use flowgen::pipeline::producer::{spawn_producer, StopCondition};
use flowgen::pipeline::progress::ProgressTracker;
use flowgen::utils::FlowRng;

use crossbeam_channel::unbounded;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

const START_NS: u64 = 1_704_067_200_000_000_000;
const PRODUCERS: usize = 4;
const FLOWS_PER_PRODUCER: u64 = 10_000;
const STAGGER_NS: u64 = 1_000_000;

fn engine_config(seed: u64, start_offset_ns: u64) -> EngineConfig {
    EngineConfig {
        seed: Some(seed),
        start_timestamp_ns: START_NS + start_offset_ns,
        traffic_mix: vec![
            TrafficPattern::new("web_traffic", 40.0),
            TrafficPattern::new("dns_traffic", 20.0),
            TrafficPattern::new("database_traffic", 20.0),
            TrafficPattern::new("random", 20.0),
        ],
        ..EngineConfig::default()
    }
}

/// The records a producer with these seeds will emit, computed sequentially.
fn expected_stream(stream_id: u32, engine_seed: u64, synth_seed: u64) -> Vec<String> {
    let mut engine =
        FlowEngine::initialize(engine_config(engine_seed, u64::from(stream_id - 1) * STAGGER_NS))
            .unwrap();
    let mut rng = FlowRng::seeded(synth_seed);
    (0..FLOWS_PER_PRODUCER)
        .map(|_| {
            let record = engine.next_record();
            let enhanced = enhance::enhance(&mut rng, stream_id, &record);
            csv_key(
                enhanced.stream_id,
                enhanced.first_timestamp,
                enhanced.last_timestamp,
                enhanced.byte_count,
            )
        })
        .collect()
}

fn csv_key(stream_id: u32, first: u64, last: u64, bytes: u64) -> String {
    format!("{stream_id},{first},{last},{bytes}")
}

#[test]
fn staggered_producers_emit_globally_ordered_output() {
    let mut producers = Vec::new();
    let mut buffers = Vec::new();
    let tracker = Arc::new(ProgressTracker::new(
        START_NS,
        START_NS + 10_000_000_000,
        PRODUCERS,
    ));
    let shutdown = Arc::new(AtomicBool::new(false));

    for index in 0..PRODUCERS {
        let stream_id = (index + 1) as u32;
        let engine_seed = 1000 + u64::from(stream_id);
        let synth_seed = 2000 + u64::from(stream_id);
        let engine =
            FlowEngine::initialize(engine_config(engine_seed, u64::from(stream_id - 1) * STAGGER_NS))
                .unwrap();
        let (tx, rx) = unbounded();
        buffers.push(rx);
        producers.push(spawn_producer(
            stream_id,
            engine,
            synth_seed,
            StopCondition::FlowCount(FLOWS_PER_PRODUCER),
            tx,
            Arc::clone(&tracker),
            Arc::clone(&shutdown),
        ));
    }

    // wait for the parallel producers to publish done, so the window
    // completeness below is driven by data alone
    while !producers.iter().all(|p| p.is_done()) {
        std::thread::sleep(std::time::Duration::from_millis(1));
    }

    let formatter = FlowFormatter::new(OutputFormat::Csv, SortField::Timestamp, false);
    let mut out = Vec::new();
    let mut collector = Collector::new(buffers, 1_000_000, formatter, &mut out, true);
    let collected = collector.run(&producers, &shutdown).unwrap();
    assert_eq!(collected, PRODUCERS as u64 * FLOWS_PER_PRODUCER);

    for handle in producers {
        assert_eq!(handle.thread.join().unwrap(), FLOWS_PER_PRODUCER);
    }

    // emitted stream is non-decreasing in first_timestamp
    let text = String::from_utf8(out).unwrap();
    let mut observed = Vec::new();
    let mut previous = 0u64;
    for line in text.lines() {
        let fields: Vec<&str> = line.split(',').collect();
        let stream_id: u32 = fields[0].parse().unwrap();
        let first: u64 = fields[1].parse().unwrap();
        let last: u64 = fields[2].parse().unwrap();
        let bytes: u64 = fields[9].parse().unwrap();
        assert!(first >= previous, "timestamps went backwards");
        previous = first;
        observed.push(csv_key(stream_id, first, last, bytes));
    }
    assert_eq!(observed.len(), PRODUCERS * FLOWS_PER_PRODUCER as usize);

    // and is, as a multiset, exactly the union of the four producer streams
    let mut expected = Vec::new();
    for index in 0..PRODUCERS {
        let stream_id = (index + 1) as u32;
        expected.extend(expected_stream(
            stream_id,
            1000 + u64::from(stream_id),
            2000 + u64::from(stream_id),
        ));
    }
    expected.sort();
    observed.sort();
    assert_eq!(observed, expected);
}

#[test]
fn stream_id_sort_groups_producers_inside_chunks() {
    let tracker = Arc::new(ProgressTracker::new(START_NS, START_NS + 1_000_000_000, 2));
    let shutdown = Arc::new(AtomicBool::new(false));
    let mut producers = Vec::new();
    let mut buffers = Vec::new();

    for stream_id in 1..=2u32 {
        let engine = FlowEngine::initialize(engine_config(u64::from(stream_id), 0)).unwrap();
        let (tx, rx) = unbounded();
        buffers.push(rx);
        producers.push(spawn_producer(
            stream_id,
            engine,
            u64::from(stream_id) + 50,
            StopCondition::FlowCount(1_000),
            tx,
            Arc::clone(&tracker),
            Arc::clone(&shutdown),
        ));
    }

    let formatter = FlowFormatter::new(OutputFormat::Csv, SortField::StreamId, false);
    let mut out = Vec::new();
    // both producers cover well under one second, so a huge window keeps
    // every record in a single chunk
    let mut collector = Collector::new(buffers, 60_000_000_000, formatter, &mut out, true);
    collector.run(&producers, &shutdown).unwrap();
    for handle in producers {
        handle.thread.join().unwrap();
    }

    let text = String::from_utf8(out).unwrap();
    let stream_ids: Vec<u32> = text
        .lines()
        .map(|line| line.split(',').next().unwrap().parse().unwrap())
        .collect();
    assert_eq!(stream_ids.len(), 2000);
    assert_eq!(&stream_ids[..1000], vec![1; 1000].as_slice());
    assert_eq!(&stream_ids[1000..], vec![2; 1000].as_slice());
}
