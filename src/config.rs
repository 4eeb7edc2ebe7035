use crate::engine::{BidirectionalMode, EngineConfig, TrafficPattern};
use crate::error::{Error, Result};

use serde::Deserialize;

/// On-disk configuration file. Every section is optional; missing values
/// fall back to the built-in defaults so a minimal file stays minimal.
#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub generation: GenerationSection,
    #[serde(default)]
    pub network: NetworkSection,
    #[serde(default)]
    pub packets: PacketSection,
    #[serde(default)]
    pub traffic_patterns: Vec<TrafficPattern>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct GenerationSection {
    #[serde(default)]
    pub bandwidth_gbps: Option<f64>,
    #[serde(default)]
    pub flows_per_second: Option<f64>,
    #[serde(default)]
    pub start_timestamp_ns: Option<u64>,
    #[serde(default)]
    pub bidirectional_mode: Option<BidirectionalMode>,
    #[serde(default)]
    pub bidirectional_probability: Option<f64>,
    #[serde(default)]
    pub seed: Option<u64>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct NetworkSection {
    #[serde(default)]
    pub source_subnets: Option<Vec<String>>,
    #[serde(default)]
    pub destination_subnets: Option<Vec<String>>,
    #[serde(default)]
    pub source_weights: Option<Vec<f64>>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct PacketSection {
    #[serde(default)]
    pub min_size: Option<u32>,
    #[serde(default)]
    pub max_size: Option<u32>,
    #[serde(default)]
    pub average_size: Option<u32>,
}

/// Parse YAML configuration content.
pub fn import_config(content: &str) -> Result<FileConfig> {
    serde_yaml::from_str(content)
        .map_err(|e| Error::Precondition(format!("cannot parse the configuration file: {e}")))
}

impl FileConfig {
    /// Overlay the file on top of the default engine configuration. The
    /// result still goes through [`EngineConfig::validate`] downstream.
    pub fn into_engine_config(self) -> EngineConfig {
        let mut config = EngineConfig::default();
        if let Some(bandwidth) = self.generation.bandwidth_gbps {
            config.bandwidth_gbps = bandwidth;
        }
        if let Some(fps) = self.generation.flows_per_second {
            // a direct rate replaces the bandwidth default entirely
            config.bandwidth_gbps = 0.0;
            config.flows_per_second = fps;
        }
        if let Some(start) = self.generation.start_timestamp_ns {
            config.start_timestamp_ns = start;
        }
        if let Some(mode) = self.generation.bidirectional_mode {
            config.bidirectional_mode = mode;
        }
        if let Some(probability) = self.generation.bidirectional_probability {
            config.bidirectional_probability = probability;
        }
        config.seed = self.generation.seed;

        if let Some(sources) = self.network.source_subnets {
            config.source_subnets = sources;
            // weights tied to the default subnets make no sense any more
            config.source_weights = Vec::new();
        }
        if let Some(destinations) = self.network.destination_subnets {
            config.destination_subnets = destinations;
        }
        if let Some(weights) = self.network.source_weights {
            config.source_weights = weights;
        }

        if let Some(min) = self.packets.min_size {
            config.min_packet_size = min;
        }
        if let Some(max) = self.packets.max_size {
            config.max_packet_size = max;
        }
        if let Some(average) = self.packets.average_size {
            config.average_packet_size = average;
        }

        if !self.traffic_patterns.is_empty() {
            config.traffic_mix = self.traffic_patterns;
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_file_keeps_defaults() {
        let config = import_config("{}").unwrap().into_engine_config();
        assert_eq!(config.bandwidth_gbps, 10.0);
        assert_eq!(config.average_packet_size, 800);
        assert_eq!(config.traffic_mix.len(), 5);
        config.validate().unwrap();
    }

    #[test]
    fn full_file_overrides_everything() {
        let config = import_config(
            r#"
generation:
  bandwidth_gbps: 40.0
  start_timestamp_ns: 1704067200000000000
  bidirectional_mode: random
  bidirectional_probability: 0.25
  seed: 1234
network:
  source_subnets:
    - 192.168.0.0/16
  destination_subnets:
    - 10.0.0.0/8
packets:
  min_size: 128
  max_size: 1400
  average_size: 700
traffic_patterns:
  - type: web_traffic
    percentage: 60
  - type: dns_traffic
    percentage: 40
"#,
        )
        .unwrap()
        .into_engine_config();

        assert_eq!(config.bandwidth_gbps, 40.0);
        assert_eq!(config.start_timestamp_ns, 1_704_067_200_000_000_000);
        assert_eq!(config.bidirectional_mode, BidirectionalMode::Random);
        assert_eq!(config.bidirectional_probability, 0.25);
        assert_eq!(config.seed, Some(1234));
        assert_eq!(config.source_subnets, vec!["192.168.0.0/16".to_string()]);
        assert!(config.source_weights.is_empty());
        assert_eq!(config.min_packet_size, 128);
        assert_eq!(config.traffic_mix.len(), 2);
        config.validate().unwrap();
    }

    #[test]
    fn direct_rate_disables_the_bandwidth_default() {
        let config = import_config(
            r#"
generation:
  flows_per_second: 2500.0
"#,
        )
        .unwrap()
        .into_engine_config();
        assert_eq!(config.bandwidth_gbps, 0.0);
        assert_eq!(config.flows_per_second, 2500.0);
        config.validate().unwrap();
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(matches!(
            import_config("unexpected_section: {}"),
            Err(Error::Precondition(_))
        ));
    }

    #[test]
    fn malformed_yaml_is_a_precondition_error() {
        assert!(matches!(
            import_config("generation: ["),
            Err(Error::Precondition(_))
        ));
    }
}
