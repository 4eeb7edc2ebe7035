use crate::structs::*;
use crate::utils::FlowRng;

use rand_distr::{Distribution, Uniform};

/// Per-packet sizes synthesized around the representative length are kept
/// inside the Ethernet-ish envelope.
const PACKET_SIZE_FLOOR: i64 = 64;
const PACKET_SIZE_CEIL: i64 = 1500;

/// Multi-packet summary derived from a single emitted record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowStats {
    pub packet_count: u32,
    pub byte_count: u64,
    pub duration_ns: u64,
}

/// Packet count chosen per protocol and destination port: web and mail
/// exchanges are short, SSH sessions long, DNS is a query/response pair.
fn packet_count(rng: &mut FlowRng, protocol: u8, dst_port: u16) -> u32 {
    match protocol {
        PROTO_TCP => match dst_port {
            80 | 443 => rng.randint(10, 50) as u32,
            22 => rng.randint(100, 500) as u32,
            3306 | 5432 | 27017 | 6379 => rng.randint(5, 100) as u32,
            25 | 587 | 465 => rng.randint(10, 50) as u32,
            _ => rng.randint(5, 100) as u32,
        },
        PROTO_UDP => match dst_port {
            53 => 2,
            _ => rng.randint(1, 20) as u32,
        },
        _ => rng.randint(1, 10) as u32,
    }
}

/// Total flow duration. Single-packet flows take no time at all; DNS gets a
/// total round-trip draw; everything else accumulates a per-packet gap.
fn duration_ns(rng: &mut FlowRng, protocol: u8, dst_port: u16, packets: u32) -> u64 {
    if packets <= 1 {
        return 0;
    }
    let gaps = u64::from(packets - 1);
    let per_packet_gap_ns = match protocol {
        PROTO_TCP => match dst_port {
            // RTT plus server time on web exchanges
            80 | 443 => rng.randint(10_000_000, 100_000_000) as u64,
            // interactive keystrokes
            22 => rng.randint(1_000_000, 50_000_000) as u64,
            3306 | 5432 | 27017 | 6379 => rng.randint(1_000_000, 20_000_000) as u64,
            _ => rng.randint(5_000_000, 50_000_000) as u64,
        },
        PROTO_UDP => match dst_port {
            // one total draw covers the query/response pair
            53 => return rng.randint(1_000_000, 50_000_000) as u64,
            _ => rng.randint(100_000, 10_000_000) as u64,
        },
        _ => rng.randint(1_000_000, 20_000_000) as u64,
    };
    gaps * per_packet_gap_ns
}

/// Turn one record into a realistic flow summary. Byte totals vary each
/// packet by up to a fifth of the representative length, clamped to
/// `[64, 1500]`, so `64 * packets <= bytes <= 1500 * packets` always holds.
pub fn synthesize_stats(
    rng: &mut FlowRng,
    packet_length: u32,
    protocol: u8,
    dst_port: u16,
) -> FlowStats {
    let packets = packet_count(rng, protocol, dst_port);

    let variance = i64::from(packet_length) / 5;
    let offset = Uniform::new_inclusive(-variance, variance).expect("non-inverted variance bounds");
    let mut byte_count: u64 = 0;
    for _ in 0..packets {
        let size = (i64::from(packet_length) + offset.sample(rng))
            .clamp(PACKET_SIZE_FLOOR, PACKET_SIZE_CEIL);
        byte_count += size as u64;
    }

    FlowStats {
        packet_count: packets,
        byte_count,
        duration_ns: duration_ns(rng, protocol, dst_port, packets),
    }
}

/// Attach synthesized statistics and a stream identifier to a base record.
pub fn enhance(rng: &mut FlowRng, stream_id: u32, record: &FlowRecord) -> EnhancedFlowRecord {
    let stats = synthesize_stats(
        rng,
        record.packet_length,
        record.protocol,
        record.destination_port,
    );
    EnhancedFlowRecord {
        stream_id,
        source_ip: record.source_ip,
        destination_ip: record.destination_ip,
        source_port: record.source_port,
        destination_port: record.destination_port,
        protocol: record.protocol,
        first_timestamp: record.timestamp,
        last_timestamp: record.timestamp + stats.duration_ns,
        packet_count: stats.packet_count,
        byte_count: stats.byte_count,
    }
}
