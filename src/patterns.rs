use crate::error::{Error, Result};
use crate::structs::*;
use crate::utils::{AddressPools, FlowRng};

/// Everything a traffic class needs to draw one record: the validated
/// address pools and the configured packet-size envelope.
#[derive(Debug, Clone)]
pub struct PatternEnv {
    pub pools: AddressPools,
    pub min_packet_size: u32,
    pub max_packet_size: u32,
}

/// A traffic-class generator. One call produces one raw flow record; the
/// class decides protocol, destination port and packet-size distribution,
/// while addressing and the ephemeral source port are shared across classes.
pub trait PatternGenerator: Send {
    /// Canonical tag of this class, as accepted by [`make_pattern`].
    fn name(&self) -> &'static str;

    fn generate(&self, rng: &mut FlowRng, timestamp_ns: u64, env: &PatternEnv) -> FlowRecord;
}

/// Source IP (weighted), destination IP (uniform) and an ephemeral source
/// port. Every class starts from this draw.
fn pick_endpoints(rng: &mut FlowRng, env: &PatternEnv) -> (u32, u32, u16) {
    let src_ip = env.pools.random_source(rng);
    let dst_ip = env.pools.random_destination(rng);
    let src_port = rng.randint(EPHEMERAL_PORT_MIN as i64, EPHEMERAL_PORT_MAX as i64) as u16;
    (src_ip, dst_ip, src_port)
}

fn random_size(rng: &mut FlowRng, min: u32, max: u32) -> u32 {
    rng.randint(min as i64, max as i64) as u32
}

/// No protocol shape at all: mostly TCP, any destination port, sizes spread
/// across the whole configured envelope.
pub struct RandomPattern;

impl PatternGenerator for RandomPattern {
    fn name(&self) -> &'static str {
        "random"
    }

    fn generate(&self, rng: &mut FlowRng, timestamp_ns: u64, env: &PatternEnv) -> FlowRecord {
        let (source_ip, destination_ip, source_port) = pick_endpoints(rng, env);
        let protocol = if rng.chance(0.7) { PROTO_TCP } else { PROTO_UDP };
        FlowRecord {
            source_ip,
            destination_ip,
            source_port,
            destination_port: rng.randint(1, 65535) as u16,
            protocol,
            timestamp: timestamp_ns,
            packet_length: random_size(rng, env.min_packet_size, env.max_packet_size),
        }
    }
}

pub struct WebPattern;

impl PatternGenerator for WebPattern {
    fn name(&self) -> &'static str {
        "web_traffic"
    }

    fn generate(&self, rng: &mut FlowRng, timestamp_ns: u64, env: &PatternEnv) -> FlowRecord {
        let (source_ip, destination_ip, source_port) = pick_endpoints(rng, env);
        // 70% HTTPS, the rest plain HTTP
        let destination_port = if rng.chance(0.7) { 443 } else { 80 };
        // bimodal sizes: request-sized small packets, response-sized large ones
        let packet_length = if rng.chance(0.4) {
            random_size(rng, 64, 200)
        } else {
            random_size(rng, 500, env.max_packet_size)
        };
        FlowRecord {
            source_ip,
            destination_ip,
            source_port,
            destination_port,
            protocol: PROTO_TCP,
            timestamp: timestamp_ns,
            packet_length,
        }
    }
}

pub struct DnsPattern;

impl PatternGenerator for DnsPattern {
    fn name(&self) -> &'static str {
        "dns_traffic"
    }

    fn generate(&self, rng: &mut FlowRng, timestamp_ns: u64, env: &PatternEnv) -> FlowRecord {
        let (source_ip, destination_ip, source_port) = pick_endpoints(rng, env);
        FlowRecord {
            source_ip,
            destination_ip,
            source_port,
            destination_port: 53,
            protocol: PROTO_UDP,
            timestamp: timestamp_ns,
            packet_length: random_size(rng, 64, 512),
        }
    }
}

pub struct SshPattern;

impl PatternGenerator for SshPattern {
    fn name(&self) -> &'static str {
        "ssh_traffic"
    }

    fn generate(&self, rng: &mut FlowRng, timestamp_ns: u64, env: &PatternEnv) -> FlowRecord {
        let (source_ip, destination_ip, source_port) = pick_endpoints(rng, env);
        FlowRecord {
            source_ip,
            destination_ip,
            source_port,
            destination_port: 22,
            protocol: PROTO_TCP,
            timestamp: timestamp_ns,
            // interactive sessions keep packets small and regular
            packet_length: random_size(rng, 100, 400),
        }
    }
}

pub const DATABASE_PORTS: [u16; 4] = [3306, 5432, 27017, 6379];

pub struct DatabasePattern;

impl PatternGenerator for DatabasePattern {
    fn name(&self) -> &'static str {
        "database_traffic"
    }

    fn generate(&self, rng: &mut FlowRng, timestamp_ns: u64, env: &PatternEnv) -> FlowRecord {
        let (source_ip, destination_ip, source_port) = pick_endpoints(rng, env);
        let destination_port = DATABASE_PORTS[rng.randint(0, 3) as usize];
        // 30% short queries, 70% result sets
        let packet_length = if rng.chance(0.3) {
            random_size(rng, 64, 300)
        } else {
            random_size(rng, 500, env.max_packet_size)
        };
        FlowRecord {
            source_ip,
            destination_ip,
            source_port,
            destination_port,
            protocol: PROTO_TCP,
            timestamp: timestamp_ns,
            packet_length,
        }
    }
}

pub const SMTP_PORTS: [u16; 3] = [25, 587, 465];

pub struct SmtpPattern;

impl PatternGenerator for SmtpPattern {
    fn name(&self) -> &'static str {
        "smtp_traffic"
    }

    fn generate(&self, rng: &mut FlowRng, timestamp_ns: u64, env: &PatternEnv) -> FlowRecord {
        let (source_ip, destination_ip, source_port) = pick_endpoints(rng, env);
        let destination_port = SMTP_PORTS[rng.randint(0, 2) as usize];
        FlowRecord {
            source_ip,
            destination_ip,
            source_port,
            destination_port,
            protocol: PROTO_TCP,
            timestamp: timestamp_ns,
            packet_length: random_size(rng, 200, env.max_packet_size),
        }
    }
}

pub struct FtpPattern;

impl PatternGenerator for FtpPattern {
    fn name(&self) -> &'static str {
        "ftp_traffic"
    }

    fn generate(&self, rng: &mut FlowRng, timestamp_ns: u64, env: &PatternEnv) -> FlowRecord {
        let (source_ip, destination_ip, source_port) = pick_endpoints(rng, env);
        let destination_port = if rng.chance(0.5) { 20 } else { 21 };
        // data channel carries bulk transfers, control channel short commands
        let packet_length = if destination_port == 20 {
            random_size(rng, 1000, env.max_packet_size)
        } else {
            random_size(rng, 64, 500)
        };
        FlowRecord {
            source_ip,
            destination_ip,
            source_port,
            destination_port,
            protocol: PROTO_TCP,
            timestamp: timestamp_ns,
            packet_length,
        }
    }
}

/// Map a case-insensitive tag (or registered alias) to a pattern instance.
pub fn make_pattern(tag: &str) -> Result<Box<dyn PatternGenerator>> {
    match tag.to_ascii_lowercase().as_str() {
        "random" => Ok(Box::new(RandomPattern)),
        "web_traffic" | "http_traffic" | "https_traffic" => Ok(Box::new(WebPattern)),
        "dns_traffic" => Ok(Box::new(DnsPattern)),
        "ssh_traffic" => Ok(Box::new(SshPattern)),
        "database_traffic" => Ok(Box::new(DatabasePattern)),
        "smtp_traffic" | "email_traffic" => Ok(Box::new(SmtpPattern)),
        "ftp_traffic" => Ok(Box::new(FtpPattern)),
        _ => Err(Error::UnknownPattern(tag.to_string())),
    }
}

/// Canonical tag for any accepted tag or alias.
pub fn canonical_tag(tag: &str) -> Result<&'static str> {
    Ok(make_pattern(tag)?.name())
}
