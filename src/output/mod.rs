//! Result store, CSV export and run summaries

use crate::discovery::{HostResult, HostStatus};
use crate::ScanError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

/// Column order of the exported file
pub const CSV_HEADER: [&str; 19] = [
    "ip",
    "status",
    "discovery_time",
    "icmp_echo",
    "icmp_timestamp",
    "icmp_info",
    "icmp_mask",
    "tcp_syn_80",
    "tcp_syn_443",
    "tcp_syn_0",
    "tcp_ack",
    "tcp_null",
    "tcp_fin",
    "tcp_xmas",
    "tcp_window",
    "window_size",
    "ttl",
    "mss",
    "os_guess",
];

/// One finalized record per scanned address
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultStore {
    results: HashMap<Ipv4Addr, HostResult>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record unless its address is already present
    ///
    /// Returns `false` and keeps the existing record on a duplicate.
    pub fn insert(&mut self, result: HostResult) -> bool {
        match self.results.entry(result.address) {
            std::collections::hash_map::Entry::Occupied(_) => false,
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(result);
                true
            }
        }
    }

    pub fn get(&self, address: &Ipv4Addr) -> Option<&HostResult> {
        self.results.get(address)
    }

    pub fn contains(&self, address: &Ipv4Addr) -> bool {
        self.results.contains_key(address)
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HostResult> {
        self.results.values()
    }

    /// Records ordered by address
    pub fn sorted(&self) -> Vec<&HostResult> {
        let mut results: Vec<&HostResult> = self.results.values().collect();
        results.sort_by_key(|result| result.address);
        results
    }

    /// Write every record as one CSV row under the fixed header
    pub fn export_csv(&self, path: &Path) -> crate::Result<()> {
        let file = File::create(path).map_err(|e| ScanError::export(path, ScanError::Io(e)))?;
        self.write_csv(file)
            .map_err(|e| ScanError::export(path, e))
    }

    /// Write the CSV rows to any writer
    pub fn write_csv<W: io::Write>(&self, writer: W) -> crate::Result<()> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(writer);

        writer.write_record(CSV_HEADER)?;
        for result in self.sorted() {
            writer.serialize(result)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Aggregate counts for the run
    pub fn summary(&self, output_file: impl Into<PathBuf>) -> RunSummary {
        let mut summary = RunSummary {
            total_scanned: self.len(),
            alive_hosts: 0,
            dead_hosts: 0,
            error_hosts: 0,
            detection_methods: DetectionCounts::default(),
            os_distribution: BTreeMap::new(),
            output_file: output_file.into(),
        };

        for result in self.iter() {
            match result.status {
                HostStatus::Alive => summary.alive_hosts += 1,
                HostStatus::Dead => summary.dead_hosts += 1,
                HostStatus::Error => summary.error_hosts += 1,
                HostStatus::Unknown => {}
            }

            if result.icmp_detected() {
                summary.detection_methods.icmp += 1;
            }
            if result.basic_tcp_detected() {
                summary.detection_methods.basic_tcp += 1;
            }
            if result.advanced_tcp_detected() {
                summary.detection_methods.advanced_tcp += 1;
            }

            if !result.os_guess.is_empty() {
                *summary
                    .os_distribution
                    .entry(result.os_guess.clone())
                    .or_insert(0) += 1;
            }
        }

        summary
    }
}

impl FromIterator<HostResult> for ResultStore {
    fn from_iter<I: IntoIterator<Item = HostResult>>(iter: I) -> Self {
        let mut store = ResultStore::new();
        for result in iter {
            store.insert(result);
        }
        store
    }
}

/// Read back a file written by [`ResultStore::export_csv`]
pub fn read_csv(path: &Path) -> crate::Result<Vec<HostResult>> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut results = Vec::new();
    for record in reader.deserialize() {
        results.push(record?);
    }
    Ok(results)
}

/// Hosts seen by each technique group
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionCounts {
    pub icmp: usize,
    pub basic_tcp: usize,
    pub advanced_tcp: usize,
}

/// Statistics handed back to the caller after a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total_scanned: usize,
    pub alive_hosts: usize,
    pub dead_hosts: usize,
    pub error_hosts: usize,
    pub detection_methods: DetectionCounts,
    pub os_distribution: BTreeMap<String, usize>,
    pub output_file: PathBuf,
}

impl RunSummary {
    /// Format the summary as JSON
    pub fn to_json(&self) -> crate::Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| ScanError::Io(io::Error::from(e)))
    }

    /// Percentage of scanned hosts found alive
    pub fn alive_percentage(&self) -> f64 {
        if self.total_scanned > 0 {
            (self.alive_hosts as f64 / self.total_scanned as f64) * 100.0
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alive(address: Ipv4Addr, os: &str) -> HostResult {
        let mut result = HostResult::new(address);
        result.icmp_echo = true;
        result.tcp_ack = true;
        result.ttl = 64;
        result.mark_alive();
        result.finalize();
        result.os_guess = os.to_string();
        result
    }

    #[test]
    fn test_insert_never_overwrites() {
        let address = Ipv4Addr::new(10, 0, 0, 1);
        let mut store = ResultStore::new();
        assert!(store.insert(alive(address, "Linux/Unix")));
        assert!(!store.insert(HostResult::errored(address)));
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&address).unwrap().status, HostStatus::Alive);
    }

    #[test]
    fn test_header_row() {
        let store: ResultStore = vec![HostResult::errored(Ipv4Addr::new(10, 0, 0, 2))]
            .into_iter()
            .collect();
        let mut buffer = Vec::new();
        store.write_csv(&mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next().unwrap(), CSV_HEADER.join(","));
        assert_eq!(
            lines.next().unwrap(),
            "10.0.0.2,error,,false,false,false,false,false,false,false,false,false,false,false,false,0,0,0,"
        );
    }

    #[test]
    fn test_summary_counts() {
        let mut dead = HostResult::new(Ipv4Addr::new(10, 0, 0, 3));
        dead.finalize();
        let mut window_only = alive(Ipv4Addr::new(10, 0, 0, 4), "Windows");
        window_only.icmp_echo = false;
        window_only.tcp_ack = false;
        window_only.tcp_window = true;

        let store: ResultStore = vec![
            alive(Ipv4Addr::new(10, 0, 0, 1), "Linux/Unix"),
            alive(Ipv4Addr::new(10, 0, 0, 2), "Linux/Unix"),
            window_only,
            dead,
            HostResult::errored(Ipv4Addr::new(10, 0, 0, 5)),
        ]
        .into_iter()
        .collect();

        let summary = store.summary("out.csv");
        assert_eq!(summary.total_scanned, 5);
        assert_eq!(summary.alive_hosts, 3);
        assert_eq!(summary.dead_hosts, 1);
        assert_eq!(summary.error_hosts, 1);
        assert_eq!(
            summary.detection_methods,
            DetectionCounts {
                icmp: 2,
                basic_tcp: 0,
                advanced_tcp: 3,
            }
        );
        assert_eq!(summary.os_distribution.get("Linux/Unix"), Some(&2));
        assert_eq!(summary.os_distribution.get("Windows"), Some(&1));
        assert_eq!(summary.alive_percentage(), 60.0);
        assert!(summary.to_json().unwrap().contains("\"alive_hosts\": 3"));
    }

    #[test]
    fn test_export_to_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("out.csv");
        let store: ResultStore = vec![HostResult::errored(Ipv4Addr::new(10, 0, 0, 9))]
            .into_iter()
            .collect();
        match store.export_csv(&path) {
            Err(ScanError::Export { path: failed, .. }) => assert_eq!(failed, path),
            other => panic!("expected export error, got {:?}", other),
        }
        // in-memory results are untouched
        assert_eq!(store.len(), 1);
    }
}
