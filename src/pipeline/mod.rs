//! Multi-producer aggregation: N engines feed private buffers, a single
//! collector windows, sorts and emits, and a progress thread reports on the
//! diagnostic stream.

pub mod chunker;
pub mod collector;
pub mod enhance;
pub mod format;
pub mod producer;
pub mod progress;

use crate::engine::{EngineConfig, FlowEngine};
use crate::error::{Error, Result};
use crate::pipeline::collector::Collector;
use crate::pipeline::format::{FlowFormatter, OutputFormat, SortField};
use crate::pipeline::producer::{spawn_producer, ProducerHandle, StopCondition};
use crate::pipeline::progress::{spawn_display, ProgressStyle, ProgressTracker};
use crate::utils::FlowRng;

use crossbeam_channel::unbounded;
use rand_core::RngCore;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Everything the aggregation run needs beyond the engine parameters.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub engine: EngineConfig,
    pub num_producers: usize,
    /// Records each producer emits. Zero defers to the timestamp range.
    pub flows_per_producer: u64,
    /// End of the covered range. Zero derives it from the flow budget.
    pub end_timestamp_ns: u64,
    pub chunk_duration_ns: u64,
    pub format: OutputFormat,
    pub sort_field: SortField,
    pub pretty: bool,
    pub suppress_header: bool,
    pub progress_style: ProgressStyle,
    pub progress_interval: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            engine: EngineConfig::default(),
            num_producers: 10,
            flows_per_producer: 10_000,
            end_timestamp_ns: 0,
            chunk_duration_ns: 10_000_000,
            format: OutputFormat::Text,
            sort_field: SortField::Timestamp,
            pretty: false,
            suppress_header: false,
            progress_style: ProgressStyle::Bar,
            progress_interval: Duration::from_secs(1),
        }
    }
}

/// Flow budget and timestamp range reconciled against each other: an
/// explicit end timestamp dictates the per-producer count, otherwise the
/// count dictates the end timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowBudget {
    pub flows_per_producer: u64,
    pub total_flows: u64,
    pub start_timestamp_ns: u64,
    pub end_timestamp_ns: u64,
}

pub fn resolve_flow_budget(
    config: &PipelineConfig,
    start_timestamp_ns: u64,
) -> Result<FlowBudget> {
    if config.num_producers == 0 {
        return Err(Error::Precondition(
            "the pipeline needs at least one producer".to_string(),
        ));
    }
    if config.chunk_duration_ns == 0 {
        return Err(Error::Precondition(
            "chunk duration must be positive".to_string(),
        ));
    }
    let flows_per_second = config.engine.flows_per_second();
    let producers = config.num_producers as u64;

    if config.end_timestamp_ns > 0 {
        if config.end_timestamp_ns <= start_timestamp_ns {
            return Err(Error::Precondition(
                "end timestamp must be greater than the start timestamp".to_string(),
            ));
        }
        let duration_s = (config.end_timestamp_ns - start_timestamp_ns) as f64 / 1e9;
        let total_flows = (duration_s * flows_per_second) as u64;
        if config.flows_per_producer > 0 {
            log::warn!(
                "end timestamp overrides the flow count; generating {total_flows} flows to fit the range"
            );
        }
        return Ok(FlowBudget {
            flows_per_producer: total_flows.div_ceil(producers),
            total_flows,
            start_timestamp_ns,
            end_timestamp_ns: config.end_timestamp_ns,
        });
    }

    let flows_per_producer = if config.flows_per_producer > 0 {
        config.flows_per_producer
    } else {
        10_000
    };
    let total_flows = flows_per_producer * producers;
    let duration_ns = (total_flows as f64 / flows_per_second * 1e9) as u64;
    Ok(FlowBudget {
        flows_per_producer,
        total_flows,
        start_timestamp_ns,
        end_timestamp_ns: start_timestamp_ns + duration_ns,
    })
}

/// Outcome of one aggregation run, for the summary block.
#[derive(Debug, Clone, Copy)]
pub struct PipelineSummary {
    pub producers: usize,
    pub flows_generated: u64,
    pub flows_collected: u64,
    pub start_timestamp_ns: u64,
    pub end_timestamp_ns: u64,
}

/// Run the full pipeline against a borrowed sink. The collector runs on the
/// calling thread; producers and the optional progress display get their
/// own. Returns `Cancelled` when `shutdown` tripped the run short, after
/// the output has been flushed and closed.
pub fn run<W: Write>(
    config: PipelineConfig,
    sink: &mut W,
    shutdown: Arc<AtomicBool>,
) -> Result<PipelineSummary> {
    config.engine.validate()?;

    // producers share the configured start; zero means "now", resolved once
    // so every stream covers the same range
    let start_timestamp_ns = if config.engine.start_timestamp_ns > 0 {
        config.engine.start_timestamp_ns
    } else {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as u64
    };
    let budget = resolve_flow_budget(&config, start_timestamp_ns)?;
    log::info!(
        "pipeline: {} producers, {} flows over [{}, {}]",
        config.num_producers,
        budget.total_flows,
        budget.start_timestamp_ns,
        budget.end_timestamp_ns
    );

    let tracker = Arc::new(ProgressTracker::new(
        budget.start_timestamp_ns,
        budget.end_timestamp_ns,
        config.num_producers,
    ));
    let display = spawn_display(
        Arc::clone(&tracker),
        config.progress_style,
        config.progress_interval,
    );

    // per-producer seeds come from one master draw so a seeded run is
    // reproducible regardless of the producer count
    let mut master_rng = match config.engine.seed {
        Some(seed) => FlowRng::seeded(seed),
        None => FlowRng::from_entropy(),
    };

    let mut producers = Vec::with_capacity(config.num_producers);
    let mut buffers = Vec::with_capacity(config.num_producers);
    for index in 0..config.num_producers {
        let stream_id = (index + 1) as u32;
        let engine_seed = master_rng.next_u64();
        let synth_seed = master_rng.next_u64();
        let engine = FlowEngine::initialize(EngineConfig {
            seed: Some(engine_seed),
            start_timestamp_ns: budget.start_timestamp_ns,
            ..config.engine.clone()
        })?;

        let (tx, rx) = unbounded();
        buffers.push(rx);
        producers.push(spawn_producer(
            stream_id,
            engine,
            synth_seed,
            StopCondition::FlowCount(budget.flows_per_producer),
            tx,
            Arc::clone(&tracker),
            Arc::clone(&shutdown),
        ));
    }

    let formatter = FlowFormatter::new(config.format, config.sort_field, config.pretty);
    let mut collector = Collector::new(
        buffers,
        config.chunk_duration_ns,
        formatter,
        sink,
        config.suppress_header,
    );
    let collect_result = collector.run(&producers, &shutdown);

    let mut flows_generated = 0;
    for handle in producers {
        match handle.thread.join() {
            Ok(emitted) => flows_generated += emitted,
            Err(_) => log::error!("producer {} panicked", handle.stream_id),
        }
    }
    tracker.request_shutdown();
    if let Some(handle) = display {
        let _ = handle.join();
    }

    let flows_collected = collect_result?;
    let summary = PipelineSummary {
        producers: config.num_producers,
        flows_generated,
        flows_collected,
        start_timestamp_ns: budget.start_timestamp_ns,
        end_timestamp_ns: budget.end_timestamp_ns,
    };
    if shutdown.load(Ordering::Relaxed) && flows_generated < budget.total_flows {
        return Err(Error::Cancelled);
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_from_flow_count_derives_the_end_timestamp() {
        let config = PipelineConfig {
            num_producers: 4,
            flows_per_producer: 1_562_500,
            ..PipelineConfig::default()
        };
        // 10 Gbps at 800 B is 1 562 500 flows/s, so 6.25 M flows last 4 s
        let budget = resolve_flow_budget(&config, 1_000_000_000).unwrap();
        assert_eq!(budget.total_flows, 6_250_000);
        assert_eq!(budget.end_timestamp_ns, 1_000_000_000 + 4_000_000_000);
    }

    #[test]
    fn budget_from_end_timestamp_derives_the_flow_count() {
        let config = PipelineConfig {
            num_producers: 4,
            flows_per_producer: 0,
            end_timestamp_ns: 2_000_000_000,
            ..PipelineConfig::default()
        };
        let budget = resolve_flow_budget(&config, 1_000_000_000).unwrap();
        // one second of 1 562 500 flows/s, split over 4 producers, rounded up
        assert_eq!(budget.total_flows, 1_562_500);
        assert_eq!(budget.flows_per_producer, 390_625);
    }

    #[test]
    fn budget_rejects_inverted_ranges_and_zero_producers() {
        let config = PipelineConfig {
            end_timestamp_ns: 50,
            ..PipelineConfig::default()
        };
        assert!(resolve_flow_budget(&config, 100).is_err());

        let config = PipelineConfig {
            num_producers: 0,
            ..PipelineConfig::default()
        };
        assert!(resolve_flow_budget(&config, 100).is_err());

        let config = PipelineConfig {
            chunk_duration_ns: 0,
            ..PipelineConfig::default()
        };
        assert!(resolve_flow_budget(&config, 100).is_err());
    }

    #[test]
    fn small_end_to_end_run_collects_everything() {
        let config = PipelineConfig {
            engine: EngineConfig {
                seed: Some(77),
                start_timestamp_ns: 1_704_067_200_000_000_000,
                ..EngineConfig::default()
            },
            num_producers: 3,
            flows_per_producer: 500,
            chunk_duration_ns: 1_000_000,
            format: OutputFormat::Csv,
            sort_field: SortField::Timestamp,
            suppress_header: true,
            progress_style: ProgressStyle::None,
            ..PipelineConfig::default()
        };
        let mut out = Vec::new();
        let shutdown = Arc::new(AtomicBool::new(false));
        let summary = run(config, &mut out, shutdown).unwrap();
        assert_eq!(summary.flows_generated, 1500);
        assert_eq!(summary.flows_collected, 1500);

        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().count(), 1500);
        let mut previous = 0u64;
        for line in text.lines() {
            let ts: u64 = line.split(',').nth(1).unwrap().parse().unwrap();
            assert!(ts >= previous);
            previous = ts;
        }
    }

    #[test]
    fn pre_tripped_shutdown_reports_cancellation() {
        let config = PipelineConfig {
            engine: EngineConfig {
                seed: Some(5),
                start_timestamp_ns: 1_000,
                ..EngineConfig::default()
            },
            num_producers: 2,
            flows_per_producer: 100,
            progress_style: ProgressStyle::None,
            suppress_header: true,
            format: OutputFormat::Csv,
            ..PipelineConfig::default()
        };
        let mut out = Vec::new();
        let shutdown = Arc::new(AtomicBool::new(true));
        assert!(matches!(
            run(config, &mut out, shutdown),
            Err(Error::Cancelled)
        ));
    }
}
