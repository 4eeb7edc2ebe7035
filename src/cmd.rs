use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(author, version, about = "Synthetic network flow record generator", long_about = None)]
pub struct Args {
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Generate base flow records with a single engine and export them as CSV
    #[clap(group(
        clap::ArgGroup::new("stop")
            .required(true)
            .args(&["count", "duration"]),
    ))]
    Generate {
        #[arg(short, long, default_value = None, help = "Path to the YAML configuration file")]
        config: Option<String>,
        #[arg(short = 'n', long, default_value = None, help = "Number of flows to generate")]
        count: Option<u64>,
        #[arg(short, long, default_value = None, help = "Synthetic time span to cover, such as \"30s\" or \"5min\"")]
        duration: Option<String>,
        #[arg(short, long, default_value = None, help = "Output file for the records; stdout by default")]
        outfile: Option<String>,
        #[arg(long, default_value = None, help = "First timestamp in nanoseconds since the Unix epoch; current time by default")]
        start_timestamp: Option<u64>,
        #[arg(short, long, default_value = None, help = "Seed for random number generation")]
        seed: Option<u64>,
        #[arg(long, default_value_t = false, help = "Suppress the CSV header")]
        no_header: bool,
    },
    /// Generate enhanced flow records in parallel and emit them globally
    /// ordered in time windows
    Flows {
        #[arg(short, long, default_value = None, help = "Path to the YAML configuration file")]
        config: Option<String>,
        #[arg(
            short = 'n',
            long,
            default_value = None,
            help = "Number of producer threads; number of CPUs by default"
        )]
        num_threads: Option<usize>,
        #[arg(
            short = 'f',
            long,
            default_value_t = 10_000,
            help = "Number of flows per producer thread"
        )]
        flows_per_thread: u64,
        #[arg(
            short = 't',
            long,
            default_value_t = 0,
            help = "Total flows to generate (overrides --flows-per-thread)"
        )]
        total_flows: u64,
        #[arg(
            long,
            default_value_t = 1_704_067_200_000_000_000,
            help = "Start timestamp in nanoseconds since the Unix epoch"
        )]
        start_timestamp: u64,
        #[arg(
            long,
            default_value_t = 0,
            help = "End timestamp in nanoseconds (0 = derive from the flow count)"
        )]
        end_timestamp: u64,
        #[arg(
            short = 'o',
            long,
            default_value = "text",
            help = "Output format: text, csv, json"
        )]
        output_format: String,
        #[arg(
            short = 's',
            long,
            default_value = "timestamp",
            help = "Sort by: timestamp, stream_id, src_ip, dst_ip, bytes, packets"
        )]
        sort_by: String,
        #[arg(
            short = 'w',
            long,
            default_value_t = 10,
            help = "Time window for chunking, in milliseconds"
        )]
        time_window: u64,
        #[arg(long, default_value = None, help = "Output file for the records; stdout by default")]
        outfile: Option<String>,
        #[arg(long, default_value_t = false, help = "Pretty-print JSON output")]
        pretty: bool,
        #[arg(long, default_value_t = false, help = "Suppress the header in CSV/text output")]
        no_header: bool,
        #[arg(
            long,
            default_value = "bar",
            help = "Progress style: bar, simple, spinner, none"
        )]
        progress_style: String,
        #[arg(long, default_value_t = false, help = "Disable the progress display")]
        no_progress: bool,
        #[arg(long, default_value = None, help = "Seed for random number generation")]
        seed: Option<u64>,
    },
}
