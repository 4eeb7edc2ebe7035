use flowgen::config::{import_config, FileConfig};
use flowgen::engine::{EngineConfig, FlowEngine};
use flowgen::error::{Error, Result};
use flowgen::export;
use flowgen::pipeline::{self, format::OutputFormat, format::SortField, progress::ProgressStyle};

mod cmd;

use clap::Parser;
use std::fs;
use std::io::{BufWriter, Write};
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = cmd::Args::parse();

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_ctrlc = Arc::clone(&shutdown);
    ctrlc::set_handler(move || {
        if shutdown_ctrlc.swap(true, Ordering::SeqCst) {
            // second interrupt: the user really means it
            process::exit(1);
        }
        log::warn!("interrupted, finishing buffered records");
    })
    .expect("Error setting Ctrl-C handler");

    let outcome = match args.command {
        cmd::Command::Generate {
            config,
            count,
            duration,
            outfile,
            start_timestamp,
            seed,
            no_header,
        } => run_generate(
            config.as_deref(),
            count,
            duration.as_deref(),
            outfile.as_deref(),
            start_timestamp,
            seed,
            no_header,
            &shutdown,
        ),
        cmd::Command::Flows {
            config,
            num_threads,
            flows_per_thread,
            total_flows,
            start_timestamp,
            end_timestamp,
            output_format,
            sort_by,
            time_window,
            outfile,
            pretty,
            no_header,
            progress_style,
            no_progress,
            seed,
        } => run_flows(FlowsInvocation {
            config,
            num_threads: num_threads.unwrap_or_else(num_cpus::get),
            flows_per_thread,
            total_flows,
            start_timestamp,
            end_timestamp,
            output_format,
            sort_by,
            time_window,
            outfile,
            pretty,
            no_header,
            progress_style,
            no_progress,
            seed,
            shutdown: Arc::clone(&shutdown),
        }),
    };

    match outcome {
        Ok(()) => {}
        Err(Error::Cancelled) => {
            log::warn!("generation cancelled; emitted records are complete");
            process::exit(130);
        }
        Err(e) => {
            log::error!("{e}");
            process::exit(1);
        }
    }
}

fn load_engine_config(path: Option<&str>) -> Result<EngineConfig> {
    let file = match path {
        Some(path) => {
            let content = fs::read_to_string(path).map_err(|e| {
                Error::Precondition(format!("cannot open the configuration file {path}: {e}"))
            })?;
            import_config(&content)?
        }
        None => FileConfig::default(),
    };
    Ok(file.into_engine_config())
}

fn open_sink(outfile: Option<&str>) -> Result<Box<dyn Write>> {
    Ok(match outfile {
        Some(path) => Box::new(BufWriter::new(fs::File::create(path)?)),
        None => Box::new(BufWriter::new(std::io::stdout())),
    })
}

#[allow(clippy::too_many_arguments)]
fn run_generate(
    config: Option<&str>,
    count: Option<u64>,
    duration: Option<&str>,
    outfile: Option<&str>,
    start_timestamp: Option<u64>,
    seed: Option<u64>,
    no_header: bool,
    shutdown: &AtomicBool,
) -> Result<()> {
    let mut engine_config = load_engine_config(config)?;
    if let Some(seed) = seed {
        engine_config.seed = Some(seed);
    }
    if let Some(start) = start_timestamp {
        engine_config.start_timestamp_ns = start;
    }

    let mut engine = FlowEngine::initialize(engine_config)?;
    let end_timestamp_ns = match duration {
        Some(text) => {
            let span = humantime::parse_duration(text)
                .map_err(|e| Error::Precondition(format!("cannot parse the duration: {e}")))?;
            Some(engine.start_timestamp_ns() + span.as_nanos() as u64)
        }
        None => None,
    };

    let mut sink = open_sink(outfile)?;
    let mut remaining = count.unwrap_or(u64::MAX);
    let records = std::iter::from_fn(|| {
        if remaining == 0 || shutdown.load(Ordering::Relaxed) {
            return None;
        }
        if let Some(end) = end_timestamp_ns {
            if engine.current_timestamp_ns() >= end {
                return None;
            }
        }
        remaining -= 1;
        Some(engine.next_record())
    });
    let written = export::export_to_csv(&mut sink, records, !no_header)?;
    log::info!("{written} flows exported");

    if shutdown.load(Ordering::Relaxed) {
        return Err(Error::Cancelled);
    }
    Ok(())
}

struct FlowsInvocation {
    config: Option<String>,
    num_threads: usize,
    flows_per_thread: u64,
    total_flows: u64,
    start_timestamp: u64,
    end_timestamp: u64,
    output_format: String,
    sort_by: String,
    time_window: u64,
    outfile: Option<String>,
    pretty: bool,
    no_header: bool,
    progress_style: String,
    no_progress: bool,
    seed: Option<u64>,
    shutdown: Arc<AtomicBool>,
}

fn run_flows(invocation: FlowsInvocation) -> Result<()> {
    let mut engine_config = load_engine_config(invocation.config.as_deref())?;
    if let Some(seed) = invocation.seed {
        engine_config.seed = Some(seed);
    }
    engine_config.start_timestamp_ns = invocation.start_timestamp;

    let format: OutputFormat = invocation.output_format.parse()?;
    let sort_field: SortField = invocation.sort_by.parse()?;
    let progress_style = if invocation.no_progress {
        ProgressStyle::None
    } else {
        invocation.progress_style.parse()?
    };

    let flows_per_producer = if invocation.total_flows > 0 {
        invocation.total_flows.div_ceil(invocation.num_threads as u64)
    } else {
        invocation.flows_per_thread
    };

    let pipeline_config = pipeline::PipelineConfig {
        engine: engine_config,
        num_producers: invocation.num_threads,
        flows_per_producer,
        end_timestamp_ns: invocation.end_timestamp,
        chunk_duration_ns: invocation.time_window * 1_000_000,
        format,
        sort_field,
        pretty: invocation.pretty,
        suppress_header: invocation.no_header,
        progress_style,
        progress_interval: Duration::from_secs(1),
    };

    let mut sink = open_sink(invocation.outfile.as_deref())?;
    let summary = pipeline::run(pipeline_config, &mut sink, invocation.shutdown)?;
    drop(sink);

    // the summary goes to the diagnostic stream, never into the records
    eprintln!();
    eprintln!("Summary:");
    eprintln!("  Threads: {}", summary.producers);
    eprintln!("  Flows generated: {}", summary.flows_generated);
    eprintln!("  Flows collected: {}", summary.flows_collected);
    eprintln!(
        "  Timestamp range: {} - {} ns",
        summary.start_timestamp_ns, summary.end_timestamp_ns
    );
    Ok(())
}
