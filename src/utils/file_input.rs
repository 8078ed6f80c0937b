//! Target list loading
//!
//! Target files hold one IPv4 address per line. Blank lines and lines
//! starting with `#` are ignored, unparsable lines are skipped with a
//! warning, and repeated addresses keep only their first occurrence.

use crate::config::TargetSource;
use crate::ScanError;
use log::{info, warn};
use std::collections::HashSet;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::net::Ipv4Addr;
use std::path::Path;

/// Target loading statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileInputStats {
    pub total_lines: usize,
    pub valid_targets: usize,
    pub invalid_targets: usize,
    pub duplicates_removed: usize,
}

/// Parse targets from any line source
pub fn parse_targets<I, S>(lines: I) -> (Vec<Ipv4Addr>, FileInputStats)
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut targets = Vec::new();
    let mut seen = HashSet::new();
    let mut stats = FileInputStats::default();

    for line in lines {
        stats.total_lines += 1;
        let target_str = line.as_ref().trim();

        // Skip empty lines and comments
        if target_str.is_empty() || target_str.starts_with('#') {
            continue;
        }

        match target_str.parse::<Ipv4Addr>() {
            Ok(address) => {
                if seen.insert(address) {
                    targets.push(address);
                    stats.valid_targets += 1;
                } else {
                    stats.duplicates_removed += 1;
                }
            }
            Err(_) => {
                stats.invalid_targets += 1;
                warn!("Skipping invalid target: {}", target_str);
            }
        }
    }

    (targets, stats)
}

/// Read targets from a text file
pub fn read_targets_from_file(path: &Path) -> crate::Result<(Vec<Ipv4Addr>, FileInputStats)> {
    let file = File::open(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => {
            ScanError::Config(format!("input file not found: {}", path.display()))
        }
        _ => ScanError::Config(format!(
            "error reading input file {}: {}",
            path.display(),
            e
        )),
    })?;

    let lines = BufReader::new(file)
        .lines()
        .collect::<io::Result<Vec<String>>>()
        .map_err(|e| {
            ScanError::Config(format!(
                "error reading input file {}: {}",
                path.display(),
                e
            ))
        })?;

    let (targets, stats) = parse_targets(lines);
    info!(
        "Loaded {} targets from {} ({} lines, {} invalid, {} duplicates removed)",
        stats.valid_targets,
        path.display(),
        stats.total_lines,
        stats.invalid_targets,
        stats.duplicates_removed
    );

    Ok((targets, stats))
}

/// Turn a target source into the list of addresses to scan
///
/// Fails with a configuration error when no source is given, the input
/// file is missing, or nothing valid remains.
pub fn resolve_targets(source: Option<&TargetSource>) -> crate::Result<Vec<Ipv4Addr>> {
    let targets = match source {
        None => {
            return Err(ScanError::Config(
                "either a target list or an input file must be set".to_string(),
            ))
        }
        Some(TargetSource::Addresses(addresses)) => parse_targets(addresses).0,
        Some(TargetSource::File(path)) => read_targets_from_file(path)?.0,
    };

    if targets.is_empty() {
        return Err(ScanError::Config("no IP addresses to scan".to_string()));
    }

    Ok(targets)
}

/// Drop repeated addresses, keeping first occurrences in order
pub fn dedup_targets(targets: &[Ipv4Addr]) -> Vec<Ipv4Addr> {
    let mut seen = HashSet::with_capacity(targets.len());
    targets
        .iter()
        .copied()
        .filter(|address| seen.insert(*address))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_read_target_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "# lab hosts").unwrap();
        writeln!(file, "192.168.1.1").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "  10.0.0.1  ").unwrap();
        writeln!(file, "not-an-ip").unwrap();
        writeln!(file, "192.168.1.1").unwrap();
        writeln!(file, "#10.0.0.2").unwrap();
        file.flush().unwrap();

        let (targets, stats) = read_targets_from_file(file.path()).unwrap();
        assert_eq!(
            targets,
            vec![Ipv4Addr::new(192, 168, 1, 1), Ipv4Addr::new(10, 0, 0, 1)]
        );
        assert_eq!(
            stats,
            FileInputStats {
                total_lines: 7,
                valid_targets: 2,
                invalid_targets: 1,
                duplicates_removed: 1,
            }
        );
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let source = TargetSource::File(dir.path().join("absent.txt"));
        match resolve_targets(Some(&source)) {
            Err(ScanError::Config(message)) => assert!(message.contains("absent.txt")),
            other => panic!("expected config error, got {:?}", other),
        }
    }

    #[test]
    fn test_no_source_is_config_error() {
        assert!(matches!(resolve_targets(None), Err(ScanError::Config(_))));
    }

    #[test]
    fn test_only_invalid_addresses_is_config_error() {
        let source = TargetSource::Addresses(vec!["999.1.1.1".to_string(), "# x".to_string()]);
        match resolve_targets(Some(&source)) {
            Err(ScanError::Config(message)) => assert_eq!(message, "no IP addresses to scan"),
            other => panic!("expected config error, got {:?}", other),
        }
    }

    #[test]
    fn test_dedup_keeps_first_occurrence_order() {
        let a = Ipv4Addr::new(10, 0, 0, 1);
        let b = Ipv4Addr::new(10, 0, 0, 2);
        assert_eq!(dedup_targets(&[b, a, b, a]), vec![b, a]);
    }
}
