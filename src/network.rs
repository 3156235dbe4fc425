//! Network Interface Throughput
//!
//! Aggregate and per-interface throughput in Mbps, computed from the
//! cumulative byte counters in `/proc/net/dev`. Loopback and virtual
//! interfaces (containers, bridges, tunnels, VPN overlays) are excluded by
//! name prefix so that traffic is not counted twice as it crosses them.
//!
//! # Examples
//!
//! ```no_run
//! use lxmon::NetworkUsageEngine;
//! use std::{thread, time::Duration};
//!
//! let mut net = NetworkUsageEngine::new();
//! net.get_usage(); // calibration
//! thread::sleep(Duration::from_secs(1));
//! for (iface, mbps) in net.get_all_usage() {
//!     println!("{}: {:.2} Mbps", iface, mbps);
//! }
//! ```

use crate::config::{Config, PathsConfig};
use crate::sampler::{counter_delta, mbps, CounterStore, Observation};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::time::Instant;

/// Cumulative byte counters of one interface
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InterfaceCounters {
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

/// Parse `/proc/net/dev`, skipping the two header lines and any interface
/// whose name starts with one of `virtual_prefixes`.
pub fn parse_proc_net_dev(
    content: &str,
    virtual_prefixes: &[String],
) -> HashMap<String, InterfaceCounters> {
    let mut out = HashMap::new();

    for line in content.lines().skip(2) {
        let Some((name, rest)) = line.split_once(':') else {
            continue;
        };
        let name = name.trim();
        if name.is_empty() || virtual_prefixes.iter().any(|p| name.starts_with(p.as_str())) {
            continue;
        }

        // rx: bytes packets errs drop fifo frame compressed multicast, then tx: bytes ...
        let fields: Vec<&str> = rest.split_whitespace().collect();
        let (Some(rx), Some(tx)) = (fields.first(), fields.get(8)) else {
            continue;
        };
        let (Ok(rx_bytes), Ok(tx_bytes)) = (rx.parse(), tx.parse()) else {
            continue;
        };
        out.insert(name.to_string(), InterfaceCounters { rx_bytes, tx_bytes });
    }

    out
}

/// Network usage engine
pub struct NetworkUsageEngine {
    paths: PathsConfig,
    virtual_prefixes: Vec<String>,
    store: CounterStore<HashMap<String, InterfaceCounters>>,
    last_all: BTreeMap<String, f64>,
    last_rx_mbps: f64,
    last_tx_mbps: f64,
}

impl NetworkUsageEngine {
    /// Create an engine reading the live `/proc`
    pub fn new() -> Self {
        Self::from_config(&Config::default())
    }

    /// Create an engine from configuration
    pub fn from_config(config: &Config) -> Self {
        Self {
            paths: config.paths.clone(),
            virtual_prefixes: config.network.virtual_prefixes.clone(),
            store: CounterStore::new(config.sampling.min_elapsed()),
            last_all: BTreeMap::new(),
            last_rx_mbps: 0.0,
            last_tx_mbps: 0.0,
        }
    }

    /// Total RX+TX throughput in Mbps across physical interfaces
    pub fn get_usage(&mut self) -> f64 {
        self.get_usage_at(Instant::now())
    }

    /// [`get_usage`](Self::get_usage) with an explicit sample time
    pub fn get_usage_at(&mut self, now: Instant) -> f64 {
        self.sample(now);
        self.total_mbps()
    }

    /// RX+TX throughput in Mbps per interface
    pub fn get_all_usage(&mut self) -> BTreeMap<String, f64> {
        self.get_all_usage_at(Instant::now())
    }

    /// [`get_all_usage`](Self::get_all_usage) with an explicit sample time
    pub fn get_all_usage_at(&mut self, now: Instant) -> BTreeMap<String, f64> {
        self.sample(now);
        self.last_all.clone()
    }

    /// Receive throughput of the last computed pass
    pub fn rx_mbps(&self) -> f64 {
        self.last_rx_mbps
    }

    /// Transmit throughput of the last computed pass
    pub fn tx_mbps(&self) -> f64 {
        self.last_tx_mbps
    }

    /// Combined throughput of the last computed pass
    pub fn total_mbps(&self) -> f64 {
        self.last_rx_mbps + self.last_tx_mbps
    }

    fn read_counters(&self) -> HashMap<String, InterfaceCounters> {
        match fs::read_to_string(self.paths.proc("net/dev")) {
            Ok(content) => parse_proc_net_dev(&content, &self.virtual_prefixes),
            Err(e) => {
                log::debug!("net: /proc/net/dev unreadable: {}", e);
                HashMap::new()
            }
        }
    }

    fn sample(&mut self, now: Instant) {
        if self.store.is_too_soon(now) {
            return;
        }
        let current = self.read_counters();
        if current.is_empty() {
            return;
        }

        let snapshot = current.clone();
        match self.store.observe(current, now) {
            Observation::TooSoon => {}
            Observation::Calibrated => {
                log::debug!("net: baseline over {} interfaces", snapshot.len());
                self.last_all = snapshot.keys().map(|k| (k.clone(), 0.0)).collect();
                self.last_rx_mbps = 0.0;
                self.last_tx_mbps = 0.0;
            }
            Observation::Delta { previous, elapsed } => {
                let mut all = BTreeMap::new();
                let mut rx_total = 0.0;
                let mut tx_total = 0.0;

                for (iface, cur) in &snapshot {
                    // Interfaces that appeared since the baseline report next pass
                    let Some(prev) = previous.get(iface) else {
                        continue;
                    };
                    let rx = mbps(counter_delta(cur.rx_bytes, prev.rx_bytes), elapsed);
                    let tx = mbps(counter_delta(cur.tx_bytes, prev.tx_bytes), elapsed);
                    rx_total += rx;
                    tx_total += tx;
                    all.insert(iface.clone(), rx + tx);
                }

                log::trace!("net: rx={:.3} tx={:.3} Mbps", rx_total, tx_total);
                self.last_all = all;
                self.last_rx_mbps = rx_total;
                self.last_tx_mbps = tx_total;
            }
        }
    }
}

impl Default for NetworkUsageEngine {
    fn default() -> Self {
        Self::new()
    }
}
