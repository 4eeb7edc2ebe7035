use crate::error::{Error, Result};

use rand::Rng;
use rand_core::{RngCore, SeedableRng};
use rand_pcg::Pcg32;
use std::sync::{Mutex, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

/// Pseudo-random source used throughout the generator.
///
/// Not cryptographically strong; statistically uniform draws are all that
/// flow synthesis requires. Producers own a private instance each, seeded
/// from a master seed, which keeps parallel runs reproducible.
#[derive(Debug, Clone)]
pub struct FlowRng(Pcg32);

impl FlowRng {
    pub fn seeded(seed: u64) -> Self {
        FlowRng(Pcg32::seed_from_u64(seed))
    }

    pub fn from_entropy() -> Self {
        FlowRng(Pcg32::from_os_rng())
    }

    /// Uniform integer draw over the inclusive range `[min, max]`.
    /// Inverted bounds are a configuration bug and are rejected there;
    /// this only debug-asserts the order.
    pub fn randint(&mut self, min: i64, max: i64) -> i64 {
        debug_assert!(min <= max, "inverted randint bounds: {min} > {max}");
        self.0.random_range(min..=max)
    }

    /// Uniform real draw over the half-open range `[min, max)`.
    pub fn uniform(&mut self, min: f64, max: f64) -> f64 {
        self.0.random_range(min..max)
    }

    /// True with probability `p`.
    pub fn chance(&mut self, p: f64) -> bool {
        self.uniform(0.0, 1.0) < p
    }
}

impl RngCore for FlowRng {
    fn next_u32(&mut self) -> u32 {
        self.0.next_u32()
    }

    fn next_u64(&mut self) -> u64 {
        self.0.next_u64()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.0.fill_bytes(dest);
    }
}

// Process-wide source backing the seedless convenience paths. Seeded from
// the wall clock at first use; `reseed` replaces the state wholesale.
static GLOBAL_RNG: OnceLock<Mutex<Pcg32>> = OnceLock::new();

fn global_rng() -> &'static Mutex<Pcg32> {
    GLOBAL_RNG.get_or_init(|| {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as u64;
        Mutex::new(Pcg32::seed_from_u64(nanos))
    })
}

/// Reset the process-wide source to a known state. Engines created without
/// an explicit seed afterwards draw their seeds deterministically.
pub fn reseed(seed: u64) {
    *global_rng().lock().unwrap() = Pcg32::seed_from_u64(seed);
}

/// Draw a fresh seed from the process-wide source.
pub fn random_seed() -> u64 {
    global_rng().lock().unwrap().next_u64()
}

/// Parse a dotted-quad IPv4 address into a host-order integer.
pub fn parse_ipv4(s: &str) -> Result<u32> {
    let octets: Vec<&str> = s.split('.').collect();
    if octets.len() != 4 {
        return Err(Error::InvalidAddress(s.to_string()));
    }
    let mut ip: u32 = 0;
    for octet in octets {
        let value: u8 = octet
            .parse()
            .map_err(|_| Error::InvalidAddress(s.to_string()))?;
        ip = (ip << 8) | u32::from(value);
    }
    Ok(ip)
}

/// Format a host-order integer as a dotted-quad IPv4 address.
pub fn format_ipv4(ip: u32) -> String {
    format!(
        "{}.{}.{}.{}",
        (ip >> 24) & 0xFF,
        (ip >> 16) & 0xFF,
        (ip >> 8) & 0xFF,
        ip & 0xFF
    )
}

/// A parsed CIDR block: network base address and addressable host span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subnet {
    pub base: u32,
    pub hosts: u64,
}

impl Subnet {
    /// Parse `a.b.c.d/p` with `0 <= p <= 32`. A bare address without a
    /// prefix is a single-host subnet.
    pub fn parse(s: &str) -> Result<Subnet> {
        let Some((addr, prefix)) = s.split_once('/') else {
            return Ok(Subnet {
                base: parse_ipv4(s)?,
                hosts: 1,
            });
        };
        let prefix_len: u32 = prefix
            .parse()
            .map_err(|_| Error::InvalidAddress(s.to_string()))?;
        if prefix_len > 32 {
            return Err(Error::InvalidAddress(s.to_string()));
        }
        let host_bits = 32 - prefix_len;
        let mask = if prefix_len == 0 {
            0
        } else {
            u32::MAX << host_bits
        };
        Ok(Subnet {
            base: parse_ipv4(addr)? & mask,
            hosts: 1u64 << host_bits,
        })
    }

    /// Draw a host address from the subnet, excluding the network and
    /// broadcast addresses when the block is large enough to have them.
    pub fn random_host(&self, rng: &mut FlowRng) -> u32 {
        if self.hosts >= 4 {
            let offset = rng.randint(1, self.hosts as i64 - 2) as u32;
            self.base.wrapping_add(offset)
        } else {
            self.base.wrapping_add(1)
        }
    }
}

/// Pick an item by cumulative weight. The weights need not normalise to
/// anything in particular; their actual sum is the denominator. An empty
/// weight slice degrades to a uniform choice.
pub fn weighted_choice<'a, T>(rng: &mut FlowRng, items: &'a [T], weights: &[f64]) -> Result<&'a T> {
    if items.is_empty() {
        return Err(Error::Precondition(
            "cannot choose from an empty item list".to_string(),
        ));
    }
    if !weights.is_empty() && weights.len() != items.len() {
        return Err(Error::Precondition(format!(
            "weight count {} does not match item count {}",
            weights.len(),
            items.len()
        )));
    }
    if weights.is_empty() {
        let idx = rng.randint(0, items.len() as i64 - 1) as usize;
        return Ok(&items[idx]);
    }

    let total: f64 = weights.iter().sum();
    let r = rng.uniform(0.0, total);
    let mut cumsum = 0.0;
    for (item, weight) in items.iter().zip(weights) {
        cumsum += weight;
        if r < cumsum {
            return Ok(item);
        }
    }
    Ok(items.last().unwrap())
}

/// Validated source and destination address pools shared by every traffic
/// pattern. Construction checks the shape once so the per-record draws have
/// no failure modes.
#[derive(Debug, Clone)]
pub struct AddressPools {
    sources: Vec<Subnet>,
    destinations: Vec<Subnet>,
    source_weights: Vec<f64>,
}

impl AddressPools {
    pub fn new(sources: &[String], destinations: &[String], source_weights: &[f64]) -> Result<Self> {
        if sources.is_empty() {
            return Err(Error::Precondition(
                "source_subnets cannot be empty".to_string(),
            ));
        }
        if destinations.is_empty() {
            return Err(Error::Precondition(
                "destination_subnets cannot be empty".to_string(),
            ));
        }
        if !source_weights.is_empty() && source_weights.len() != sources.len() {
            return Err(Error::Precondition(format!(
                "source_weights count {} does not match source_subnets count {}",
                source_weights.len(),
                sources.len()
            )));
        }
        Ok(AddressPools {
            sources: sources
                .iter()
                .map(|s| Subnet::parse(s))
                .collect::<Result<_>>()?,
            destinations: destinations
                .iter()
                .map(|s| Subnet::parse(s))
                .collect::<Result<_>>()?,
            source_weights: source_weights.to_vec(),
        })
    }

    /// Weighted draw over the source subnets, then a host inside it.
    pub fn random_source(&self, rng: &mut FlowRng) -> u32 {
        let subnet = if self.source_weights.is_empty() {
            &self.sources[rng.randint(0, self.sources.len() as i64 - 1) as usize]
        } else {
            // lengths were checked at construction
            weighted_choice(rng, &self.sources, &self.source_weights)
                .expect("validated source pool")
        };
        subnet.random_host(rng)
    }

    /// Uniform draw over the destination subnets, then a host inside it.
    pub fn random_destination(&self, rng: &mut FlowRng) -> u32 {
        let idx = rng.randint(0, self.destinations.len() as i64 - 1) as usize;
        self.destinations[idx].random_host(rng)
    }
}
