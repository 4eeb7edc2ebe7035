use crate::error::{Error, Result};
use crate::patterns::{self, PatternEnv, PatternGenerator};
use crate::structs::FlowRecord;
use crate::utils::{self, AddressPools, FlowRng};

use serde::Deserialize;
use std::time::{SystemTime, UNIX_EPOCH};

/// Tolerance for percentage sums that are supposed to reach 100.
const PERCENT_EPSILON: f64 = 0.01;

/// One entry of the traffic mix: a class tag and its share of emissions.
#[derive(Debug, Clone, Deserialize)]
pub struct TrafficPattern {
    #[serde(rename = "type")]
    pub kind: String,
    pub percentage: f64,
}

impl TrafficPattern {
    pub fn new(kind: &str, percentage: f64) -> Self {
        TrafficPattern {
            kind: kind.to_string(),
            percentage,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BidirectionalMode {
    #[default]
    None,
    Random,
}

/// Immutable engine parameters. Validated once by [`FlowEngine::initialize`];
/// the engine never re-reads or mutates them afterwards.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Target rate expressed as bandwidth. Ignored when zero.
    pub bandwidth_gbps: f64,
    /// Target rate expressed directly. Used only when `bandwidth_gbps` is zero.
    pub flows_per_second: f64,
    /// First emitted timestamp. Zero means "now".
    pub start_timestamp_ns: u64,
    pub source_subnets: Vec<String>,
    pub destination_subnets: Vec<String>,
    /// Optional per-source-subnet weights; when present they must parallel
    /// `source_subnets` and sum to 100.
    pub source_weights: Vec<f64>,
    pub min_packet_size: u32,
    pub max_packet_size: u32,
    pub average_packet_size: u32,
    pub traffic_mix: Vec<TrafficPattern>,
    pub bidirectional_mode: BidirectionalMode,
    pub bidirectional_probability: f64,
    /// Master seed. `None` draws one from the process-wide source.
    pub seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            bandwidth_gbps: 10.0,
            flows_per_second: 0.0,
            start_timestamp_ns: 0,
            source_subnets: vec!["192.168.1.0/24".to_string(), "192.168.2.0/24".to_string()],
            destination_subnets: vec!["10.0.0.0/8".to_string(), "172.16.0.0/12".to_string()],
            source_weights: vec![70.0, 30.0],
            min_packet_size: 64,
            max_packet_size: 1500,
            average_packet_size: 800,
            traffic_mix: vec![
                TrafficPattern::new("web_traffic", 40.0),
                TrafficPattern::new("dns_traffic", 20.0),
                TrafficPattern::new("database_traffic", 15.0),
                TrafficPattern::new("ssh_traffic", 10.0),
                TrafficPattern::new("random", 15.0),
            ],
            bidirectional_mode: BidirectionalMode::None,
            bidirectional_probability: 0.0,
            seed: None,
        }
    }
}

impl EngineConfig {
    /// Check every precondition the engine relies on. Pattern tags are
    /// resolved here so emission never has to deal with lookup failures.
    pub fn validate(&self) -> Result<()> {
        if self.bandwidth_gbps <= 0.0 && self.flows_per_second <= 0.0 {
            return Err(Error::Precondition(
                "either bandwidth_gbps or flows_per_second must be positive".to_string(),
            ));
        }
        if self.bandwidth_gbps > 0.0 && self.average_packet_size == 0 {
            return Err(Error::Precondition(
                "average_packet_size must be positive for a bandwidth-based rate".to_string(),
            ));
        }
        if self.traffic_mix.is_empty() {
            return Err(Error::Precondition(
                "traffic mix cannot be empty".to_string(),
            ));
        }
        let total: f64 = self.traffic_mix.iter().map(|p| p.percentage).sum();
        if (total - 100.0).abs() > PERCENT_EPSILON {
            return Err(Error::Precondition(format!(
                "traffic mix percentages must sum to 100, got {total}"
            )));
        }
        for pattern in &self.traffic_mix {
            patterns::canonical_tag(&pattern.kind)?;
        }
        if !self.source_weights.is_empty() {
            let sum: f64 = self.source_weights.iter().sum();
            if (sum - 100.0).abs() > PERCENT_EPSILON {
                return Err(Error::Precondition(format!(
                    "source_weights must sum to 100, got {sum}"
                )));
            }
        }
        // the pools re-check emptiness and the weight/subnet pairing
        AddressPools::new(
            &self.source_subnets,
            &self.destination_subnets,
            &self.source_weights,
        )?;
        if self.min_packet_size > self.max_packet_size {
            return Err(Error::Precondition(format!(
                "min_packet_size {} exceeds max_packet_size {}",
                self.min_packet_size, self.max_packet_size
            )));
        }
        if !(0.0..=1.0).contains(&self.bidirectional_probability) {
            return Err(Error::Precondition(format!(
                "bidirectional_probability must be within [0, 1], got {}",
                self.bidirectional_probability
            )));
        }
        Ok(())
    }

    /// Effective rate in flows per second.
    pub fn flows_per_second(&self) -> f64 {
        if self.bandwidth_gbps > 0.0 {
            (self.bandwidth_gbps * 1e9 / 8.0) / f64::from(self.average_packet_size)
        } else {
            self.flows_per_second
        }
    }
}

/// Point-in-time counters of one engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineStats {
    pub flows_generated: u64,
    /// Synthetic time covered so far, in seconds.
    pub elapsed_seconds: f64,
    pub flows_per_second: f64,
    pub current_timestamp_ns: u64,
}

/// The rate-driven record producer. Single-owner and single-threaded:
/// parallel production uses one engine per producer.
///
/// Emission never fails and never stops on its own; callers decide when to
/// cease by count, wall time or `current_timestamp_ns()`.
pub struct FlowEngine {
    rng: FlowRng,
    patterns: Vec<Box<dyn PatternGenerator>>,
    pattern_weights: Vec<f64>,
    env: PatternEnv,
    bidirectional_mode: BidirectionalMode,
    bidirectional_probability: f64,
    flows_per_second: f64,
    inter_arrival_ns: u64,
    start_timestamp_ns: u64,
    current_timestamp_ns: u64,
    flow_count: u64,
}

impl FlowEngine {
    /// Validate the configuration and build a ready engine. No partially
    /// initialised state escapes: any error leaves nothing behind.
    pub fn initialize(config: EngineConfig) -> Result<Self> {
        config.validate()?;

        let flows_per_second = config.flows_per_second();
        let inter_arrival_ns = (1e9 / flows_per_second) as u64;

        let start_timestamp_ns = if config.start_timestamp_ns > 0 {
            config.start_timestamp_ns
        } else {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos() as u64
        };

        let mut generators = Vec::with_capacity(config.traffic_mix.len());
        let mut pattern_weights = Vec::with_capacity(config.traffic_mix.len());
        for pattern in &config.traffic_mix {
            generators.push(patterns::make_pattern(&pattern.kind)?);
            pattern_weights.push(pattern.percentage);
        }

        let env = PatternEnv {
            pools: AddressPools::new(
                &config.source_subnets,
                &config.destination_subnets,
                &config.source_weights,
            )?,
            min_packet_size: config.min_packet_size,
            max_packet_size: config.max_packet_size,
        };

        let seed = config.seed.unwrap_or_else(utils::random_seed);
        log::debug!(
            "engine ready: {flows_per_second:.0} flows/s, {inter_arrival_ns} ns inter-arrival, seed {seed}"
        );

        Ok(FlowEngine {
            rng: FlowRng::seeded(seed),
            patterns: generators,
            pattern_weights,
            env,
            bidirectional_mode: config.bidirectional_mode,
            bidirectional_probability: config.bidirectional_probability,
            flows_per_second,
            inter_arrival_ns,
            start_timestamp_ns,
            current_timestamp_ns: start_timestamp_ns,
            flow_count: 0,
        })
    }

    /// Emit one record and advance the clock by the inter-arrival quantum.
    pub fn next_record(&mut self) -> FlowRecord {
        let idx = self.select_pattern();
        let mut record =
            self.patterns[idx].generate(&mut self.rng, self.current_timestamp_ns, &self.env);

        if self.bidirectional_mode == BidirectionalMode::Random
            && self.rng.chance(self.bidirectional_probability)
        {
            record.swap_direction();
        }

        self.flow_count += 1;
        self.current_timestamp_ns += self.inter_arrival_ns;
        record
    }

    /// Pattern mix percentages are shares of a fixed 100 total, so the draw
    /// goes against that scale rather than the actual sum. Boundary hits go
    /// to the earlier class.
    fn select_pattern(&mut self) -> usize {
        let r = self.rng.uniform(0.0, 100.0);
        let mut cumsum = 0.0;
        for (idx, weight) in self.pattern_weights.iter().enumerate() {
            cumsum += weight;
            if r <= cumsum {
                return idx;
            }
        }
        self.patterns.len() - 1
    }

    pub fn current_timestamp_ns(&self) -> u64 {
        self.current_timestamp_ns
    }

    /// Fixed gap between two consecutive emissions, in nanoseconds.
    pub fn inter_arrival_ns(&self) -> u64 {
        self.inter_arrival_ns
    }

    pub fn start_timestamp_ns(&self) -> u64 {
        self.start_timestamp_ns
    }

    /// Rewind the clock to the configured start. The random state is not
    /// touched; reseed through a fresh engine for bit-identical replays.
    pub fn reset(&mut self) {
        self.current_timestamp_ns = self.start_timestamp_ns;
        self.flow_count = 0;
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            flows_generated: self.flow_count,
            elapsed_seconds: (self.current_timestamp_ns - self.start_timestamp_ns) as f64 / 1e9,
            flows_per_second: self.flows_per_second,
            current_timestamp_ns: self.current_timestamp_ns,
        }
    }
}
