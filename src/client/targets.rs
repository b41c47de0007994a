//! Target resolution (§4.3 step 1): literal addresses, dotted/hextet ranges,
//! hostnames, and the `auto`/teams-directory shortcut. Grounded on the
//! original source's `util/hosts.py` and `util/teams.py`.

use std::net::IpAddr;
use std::path::Path;

use serde::Deserialize;

/// Expands a list of raw target entries (as written in `targets:`) into a
/// flat, de-duplicated (first-occurrence-preserving) list of concrete hosts.
pub fn expand_targets(entries: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut hosts = Vec::new();
    for entry in entries {
        for host in expand_entry(entry) {
            if seen.insert(host.clone()) {
                hosts.push(host);
            }
        }
    }
    hosts
}

fn expand_entry(entry: &str) -> Vec<String> {
    if entry.parse::<IpAddr>().is_ok() {
        return vec![entry.to_string()];
    }
    if is_ipv4_range(entry) {
        return expand_ipv4_range(entry);
    }
    if entry.contains(':') {
        return expand_ipv6_range(entry);
    }
    vec![entry.to_string()]
}

fn is_ipv4_range(entry: &str) -> bool {
    let parts: Vec<&str> = entry.split('.').collect();
    parts.len() == 4
        && parts.iter().all(|octet| {
            octet
                .split('-')
                .all(|bound| !bound.is_empty() && bound.chars().all(|c| c.is_ascii_digit()))
        })
}

fn expand_ipv4_range(entry: &str) -> Vec<String> {
    let octet_ranges: Vec<Vec<u32>> = entry
        .split('.')
        .map(|octet| {
            if let Some((lo, hi)) = octet.split_once('-') {
                let lo: u32 = lo.parse().unwrap_or(0);
                let hi: u32 = hi.parse().unwrap_or(lo);
                (lo..=hi).collect()
            } else {
                vec![octet.parse().unwrap_or(0)]
            }
        })
        .collect();

    cartesian_product(&octet_ranges)
        .into_iter()
        .map(|octets| {
            octets
                .iter()
                .map(u32::to_string)
                .collect::<Vec<_>>()
                .join(".")
        })
        .collect()
}

fn cartesian_product(ranges: &[Vec<u32>]) -> Vec<Vec<u32>> {
    ranges.iter().fold(vec![vec![]], |acc, range| {
        acc.into_iter()
            .flat_map(|prefix| {
                range.iter().map(move |value| {
                    let mut next = prefix.clone();
                    next.push(*value);
                    next
                })
            })
            .collect()
    })
}

/// Explodes a shorthand IPv6 range (`::` or omitted leading zeros) into its
/// full 8-hextet form, keeping `lo-hi` hextets intact.
fn explode_ipv6(ip: &str) -> String {
    let hextets: Vec<&str> = ip.split(':').collect();
    let present = hextets.iter().filter(|h| !h.is_empty()).count();
    let missing = 8usize.saturating_sub(present);

    let exploded = if ip.contains("::") {
        ip.replacen("::", &format!(":{}:", vec!["0"; missing].join(":")), 1)
    } else {
        ip.to_string()
    };
    let exploded = exploded
        .trim_start_matches(':')
        .trim_end_matches(':')
        .to_string();

    exploded
        .split(':')
        .map(|h| {
            if h.contains('-') {
                h.to_string()
            } else {
                format!("{h:0>4}")
            }
        })
        .collect::<Vec<_>>()
        .join(":")
}

fn compress_ipv6(host: &str) -> String {
    host.parse::<std::net::Ipv6Addr>()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|_| host.to_string())
}

fn expand_ipv6_range(entry: &str) -> Vec<String> {
    let exploded = explode_ipv6(entry);
    let hextet_ranges: Vec<Vec<u32>> = exploded
        .split(':')
        .map(|hextet| {
            if let Some((lo, hi)) = hextet.split_once('-') {
                let lo = u32::from_str_radix(lo, 16).unwrap_or(0);
                let hi = u32::from_str_radix(hi, 16).unwrap_or(lo);
                (lo..=hi).collect()
            } else {
                vec![u32::from_str_radix(hextet, 16).unwrap_or(0)]
            }
        })
        .collect();

    cartesian_product(&hextet_ranges)
        .into_iter()
        .map(|hextets| {
            let joined = hextets
                .iter()
                .map(|h| format!("{h:x}"))
                .collect::<Vec<_>>()
                .join(":");
            compress_ipv6(&joined)
        })
        .collect()
}

/// Optional local team directory (`.fast/teams.json`), used when a
/// definition's `targets` is the literal `auto` (§4.3 step 1, §9).
#[derive(Debug, Clone, Deserialize)]
pub struct TeamsDirectory {
    pub teams: Vec<u32>,
}

impl TeamsDirectory {
    pub fn load(path: &Path) -> Option<Self> {
        let bytes = std::fs::read(path).ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    /// Deterministic `/24`-scoped host derivation for a team id, matching
    /// this lineage's original convention.
    pub fn host_for_team(team_id: u32) -> String {
        format!("10.{}.{}.0", team_id / 255, team_id % 255)
    }

    /// Effective target list for an `auto` definition: every other team's
    /// host, excluding `own_team_id`.
    pub fn auto_targets(&self, own_team_id: u32) -> Vec<String> {
        self.teams
            .iter()
            .filter(|id| **id != own_team_id)
            .map(|id| Self::host_for_team(*id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_ipv4_passes_through() {
        assert_eq!(expand_targets(&["10.0.0.1".to_string()]), vec!["10.0.0.1"]);
    }

    #[test]
    fn hostname_passes_through() {
        assert_eq!(
            expand_targets(&["target.internal".to_string()]),
            vec!["target.internal"]
        );
    }

    #[test]
    fn ipv4_range_expands_single_octet() {
        let hosts = expand_targets(&["10.0.1-3.5".to_string()]);
        assert_eq!(hosts, vec!["10.0.1.5", "10.0.2.5", "10.0.3.5"]);
    }

    #[test]
    fn ipv4_range_expands_two_octets_as_cartesian_product() {
        let hosts = expand_targets(&["10.0.1-2.1-2".to_string()]);
        assert_eq!(
            hosts,
            vec!["10.0.1.1", "10.0.1.2", "10.0.2.1", "10.0.2.2"]
        );
    }

    #[test]
    fn dedups_preserving_first_occurrence() {
        let hosts = expand_targets(&["10.0.0.1".to_string(), "10.0.0.1".to_string(), "10.0.0.2".to_string()]);
        assert_eq!(hosts, vec!["10.0.0.1", "10.0.0.2"]);
    }

    #[test]
    fn ipv6_single_address_passes_through() {
        let hosts = expand_targets(&["fe80::1".to_string()]);
        assert_eq!(hosts, vec!["fe80::1"]);
    }

    #[test]
    fn ipv6_range_expands_last_hextet() {
        let hosts = expand_targets(&["fe80::1-3".to_string()]);
        assert_eq!(hosts.len(), 3);
    }

    #[test]
    fn auto_targets_exclude_own_team() {
        let dir = TeamsDirectory { teams: vec![1, 2, 3] };
        let targets = dir.auto_targets(2);
        assert_eq!(targets, vec![
            TeamsDirectory::host_for_team(1),
            TeamsDirectory::host_for_team(3),
        ]);
    }

    #[test]
    fn empty_target_list_expands_to_empty() {
        assert!(expand_targets(&[]).is_empty());
    }
}
