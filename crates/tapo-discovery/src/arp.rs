//! Neighbor (ARP) table enumeration

use anyhow::Result;
use async_trait::async_trait;
use std::net::Ipv4Addr;
use std::str::FromStr;
use tapo_core::MacAddress;
use tokio::process::Command;
use tracing::{debug, trace};

/// Neighbor table entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeighborEntry {
    pub ip: Ipv4Addr,
    /// Absent for INCOMPLETE/FAILED entries
    pub mac: Option<MacAddress>,
    pub interface: String,
    pub state: NeighborState,
}

impl NeighborEntry {
    pub fn new(ip: Ipv4Addr, mac: MacAddress) -> Self {
        Self {
            ip,
            mac: Some(mac),
            interface: String::new(),
            state: NeighborState::Reachable,
        }
    }
}

/// Neighbor entry state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NeighborState {
    Reachable,
    Stale,
    Delay,
    Probe,
    Failed,
    Incomplete,
    Permanent,
    Unknown,
}

/// Source of the OS-maintained address resolution table
#[async_trait]
pub trait NeighborTable: Send + Sync {
    async fn entries(&self) -> Result<Vec<NeighborEntry>>;
}

/// Reads the host's neighbor table.
///
/// Uses `ip neigh show` where available and falls back to `arp -a`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemNeighborTable;

#[async_trait]
impl NeighborTable for SystemNeighborTable {
    async fn entries(&self) -> Result<Vec<NeighborEntry>> {
        match ip_neigh().await {
            Ok(entries) => Ok(entries),
            Err(e) => {
                debug!(error = %e, "ip neigh unavailable, falling back to arp -a");
                arp_a().await
            }
        }
    }
}

async fn ip_neigh() -> Result<Vec<NeighborEntry>> {
    let output = Command::new("ip").args(["neigh", "show"]).output().await?;

    if !output.status.success() {
        anyhow::bail!("Failed to get neighbor table: {}", String::from_utf8_lossy(&output.stderr));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let entries: Vec<NeighborEntry> = stdout.lines().filter_map(parse_ip_neigh_line).collect();

    debug!("Found {} neighbor entries", entries.len());
    Ok(entries)
}

async fn arp_a() -> Result<Vec<NeighborEntry>> {
    let output = Command::new("arp").arg("-a").output().await?;

    if !output.status.success() {
        anyhow::bail!("Failed to get ARP table: {}", String::from_utf8_lossy(&output.stderr));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let entries: Vec<NeighborEntry> = stdout.lines().filter_map(parse_arp_a_line).collect();

    debug!("Found {} ARP entries", entries.len());
    Ok(entries)
}

/// Parse a line from `ip neigh show` output
fn parse_ip_neigh_line(line: &str) -> Option<NeighborEntry> {
    // Format: "192.168.1.1 dev eth0 lladdr aa:bb:cc:dd:ee:ff REACHABLE"
    let parts: Vec<&str> = line.split_whitespace().collect();

    if parts.len() < 4 {
        return None;
    }

    // IPv6 neighbors are skipped here
    let ip = Ipv4Addr::from_str(parts[0]).ok()?;

    let dev_idx = parts.iter().position(|&p| p == "dev")?;
    let interface = parts.get(dev_idx + 1)?.to_string();

    let mac = parts
        .iter()
        .position(|&p| p == "lladdr")
        .and_then(|idx| parts.get(idx + 1))
        .and_then(|s| MacAddress::parse(s));

    let state = parts.last().map(|s| parse_neighbor_state(s)).unwrap_or(NeighborState::Unknown);

    trace!(ip = %ip, state = ?state, "Parsed neighbor entry");
    Some(NeighborEntry { ip, mac, interface, state })
}

/// Parse a line from BSD-style `arp -a` output
fn parse_arp_a_line(line: &str) -> Option<NeighborEntry> {
    // Format: "? (192.168.1.1) at a:b:cc:dd:ee:ff on en0 ifscope [ethernet]"
    let parts: Vec<&str> = line.split_whitespace().collect();

    let ip_part = parts.iter().find(|p| p.starts_with('(') && p.ends_with(')'))?;
    let ip = Ipv4Addr::from_str(ip_part.trim_start_matches('(').trim_end_matches(')')).ok()?;

    let mac = parts
        .iter()
        .position(|&p| p == "at")
        .and_then(|idx| parts.get(idx + 1))
        .and_then(|s| MacAddress::parse(s));

    let interface = parts
        .iter()
        .position(|&p| p == "on")
        .and_then(|idx| parts.get(idx + 1))
        .map(|s| s.to_string())
        .unwrap_or_default();

    let state = if mac.is_some() {
        if line.contains("permanent") {
            NeighborState::Permanent
        } else {
            NeighborState::Unknown
        }
    } else {
        NeighborState::Incomplete
    };

    Some(NeighborEntry { ip, mac, interface, state })
}

/// Parse neighbor state string
fn parse_neighbor_state(s: &str) -> NeighborState {
    match s.to_uppercase().as_str() {
        "REACHABLE" => NeighborState::Reachable,
        "STALE" => NeighborState::Stale,
        "DELAY" => NeighborState::Delay,
        "PROBE" => NeighborState::Probe,
        "FAILED" => NeighborState::Failed,
        "INCOMPLETE" => NeighborState::Incomplete,
        "PERMANENT" => NeighborState::Permanent,
        _ => NeighborState::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ip_neigh_line_reachable() {
        let line = "192.168.1.100 dev eth0 lladdr AA:BB:CC:DD:EE:FF REACHABLE";
        let entry = parse_ip_neigh_line(line).unwrap();
        assert_eq!(entry.ip, Ipv4Addr::new(192, 168, 1, 100));
        assert_eq!(entry.mac.unwrap().as_str(), "aa:bb:cc:dd:ee:ff");
        assert_eq!(entry.interface, "eth0");
        assert_eq!(entry.state, NeighborState::Reachable);
    }

    #[test]
    fn test_parse_ip_neigh_line_stale() {
        let line = "192.168.1.100 dev eth0 lladdr aa:bb:cc:dd:ee:ff STALE";
        let entry = parse_ip_neigh_line(line).unwrap();
        assert_eq!(entry.state, NeighborState::Stale);
    }

    #[test]
    fn test_parse_incomplete_line() {
        let line = "192.168.1.100 dev eth0 INCOMPLETE";
        let entry = parse_ip_neigh_line(line).unwrap();
        assert_eq!(entry.ip, Ipv4Addr::new(192, 168, 1, 100));
        assert!(entry.mac.is_none());
        assert_eq!(entry.state, NeighborState::Incomplete);
    }

    #[test]
    fn test_parse_too_short() {
        assert!(parse_ip_neigh_line("192.168.1.100 dev").is_none());
    }

    #[test]
    fn test_parse_ipv6_skipped() {
        let line = "fe80::1 dev eth0 lladdr aa:bb:cc:dd:ee:ff router STALE";
        assert!(parse_ip_neigh_line(line).is_none());
    }

    #[test]
    fn test_parse_arp_a_line() {
        let line = "? (192.168.1.20) at a:b:cc:d:ee:f on en0 ifscope [ethernet]";
        let entry = parse_arp_a_line(line).unwrap();
        assert_eq!(entry.ip, Ipv4Addr::new(192, 168, 1, 20));
        assert_eq!(entry.mac.unwrap().as_str(), "0a:0b:cc:0d:ee:0f");
        assert_eq!(entry.interface, "en0");
    }

    #[test]
    fn test_parse_arp_a_incomplete() {
        let line = "? (192.168.1.21) at (incomplete) on en0 ifscope [ethernet]";
        let entry = parse_arp_a_line(line).unwrap();
        assert!(entry.mac.is_none());
        assert_eq!(entry.state, NeighborState::Incomplete);
    }

    #[test]
    fn test_parse_arp_a_windows_style_line() {
        // Windows `arp -a` rows carry no parenthesised IP
        assert!(parse_arp_a_line("  192.168.1.1   aa-bb-cc-dd-ee-ff   dynamic").is_none());
    }
}
