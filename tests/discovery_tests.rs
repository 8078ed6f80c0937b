//! Host discovery behaviour against a scripted network

mod common;

use common::{addresses, icmp_reply, rst, syn_ack, ScriptedTransport};
use locus::config::{ScanConfig, ScanLevel};
use locus::discovery::host_scan::{probes_per_host, STEALTH_PORT};
use locus::discovery::{HostDiscoveryEngine, HostStatus, NoProgress};
use locus::network::{IcmpProbe, ProbeKind, TcpTechnique};
use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

fn engine(
    transport: Arc<ScriptedTransport>,
    level: ScanLevel,
    concurrency: usize,
) -> HostDiscoveryEngine<ScriptedTransport> {
    let config = ScanConfig::new()
        .with_max_level(level)
        .with_timeout(2500)
        .with_concurrency(concurrency)
        .with_output_path("unused.csv");
    HostDiscoveryEngine::new(config, transport)
        .unwrap()
        .with_observer(Arc::new(NoProgress))
}

#[tokio::test(start_paused = true)]
async fn test_echo_and_https_host_is_linux() {
    let target = Ipv4Addr::new(192, 168, 1, 10);
    let transport = Arc::new(
        ScriptedTransport::new()
            .reply(target, ProbeKind::Icmp(IcmpProbe::Echo), icmp_reply(0, 55))
            .reply(target, ProbeKind::syn(443), syn_ack(65535, Some(1460))),
    );

    let results = engine(transport, ScanLevel::BasicTcp, 4)
        .scan_targets(&[target])
        .await;
    let host = results.get(&target).unwrap();

    assert!(host.icmp_echo);
    assert!(!host.icmp_timestamp && !host.icmp_info && !host.icmp_mask);
    assert!(host.tcp_syn_443);
    assert!(!host.tcp_syn_80 && !host.tcp_syn_0);
    assert_eq!(host.status, HostStatus::Alive);
    assert_eq!(host.ttl, 55);
    assert_eq!(host.window_size, 65535);
    assert_eq!(host.mss, 1460);
    assert_eq!(host.os_guess, "Linux/Unix");
    assert!(host.discovery_time.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_silent_host_is_dead_within_timeout_bound() {
    let target = Ipv4Addr::new(192, 168, 1, 20);
    let transport = Arc::new(ScriptedTransport::new());
    let engine = engine(transport.clone(), ScanLevel::AdvancedTcp, 1);

    let started = tokio::time::Instant::now();
    let results = engine.scan_targets(&[target]).await;
    let elapsed = started.elapsed();

    let host = results.get(&target).unwrap();
    assert_eq!(host.status, HostStatus::Dead);
    assert!(!host.any_probe_succeeded());
    assert!(!host.tcp_window);
    assert_eq!(host.os_guess, "");
    assert!(elapsed <= Duration::from_millis(2500) * 11);
    assert_eq!(transport.sent_to(target).len(), probes_per_host(ScanLevel::AdvancedTcp));
}

#[tokio::test(start_paused = true)]
async fn test_recoverable_failures_count_as_no_reply() {
    let target = Ipv4Addr::new(192, 168, 1, 30);
    let transport = Arc::new(
        ScriptedTransport::new()
            .fail(target, ProbeKind::Icmp(IcmpProbe::Echo))
            .fail(target, ProbeKind::syn(80))
            .reply(target, ProbeKind::Icmp(IcmpProbe::AddressMask), icmp_reply(18, 250)),
    );

    let results = engine(transport.clone(), ScanLevel::BasicTcp, 1)
        .scan_targets(&[target])
        .await;
    let host = results.get(&target).unwrap();

    assert_eq!(host.status, HostStatus::Alive);
    assert!(host.icmp_mask);
    assert!(!host.icmp_echo);
    // TTL only comes from echo replies
    assert_eq!(host.ttl, 0);
    // every probe was still attempted
    assert_eq!(transport.sent_to(target).len(), 7);
}

#[tokio::test(start_paused = true)]
async fn test_stealth_replies_mark_alive() {
    let target = Ipv4Addr::new(192, 168, 1, 40);
    let transport = Arc::new(
        ScriptedTransport::new()
            .reply(target, ProbeKind::syn(80), rst(0))
            .reply(
                target,
                ProbeKind::stealth(TcpTechnique::Ack, STEALTH_PORT),
                rst(16384),
            )
            .reply(
                target,
                ProbeKind::stealth(TcpTechnique::Null, STEALTH_PORT),
                rst(64240),
            ),
    );

    let results = engine(transport, ScanLevel::AdvancedTcp, 1)
        .scan_targets(&[target])
        .await;
    let host = results.get(&target).unwrap();

    assert!(!host.tcp_syn_80);
    assert!(host.tcp_ack && host.tcp_null);
    assert!(host.tcp_window);
    // window comes from the ACK reply only
    assert_eq!(host.window_size, 16384);
    assert_eq!(host.status, HostStatus::Alive);
    assert_eq!(host.os_guess, "Windows");
    assert_eq!(host.detection_methods(), vec!["TCP-Advanced"]);
}

#[tokio::test(start_paused = true)]
async fn test_zero_ack_window_leaves_host_unlabeled() {
    let target = Ipv4Addr::new(192, 168, 1, 41);
    let transport = Arc::new(
        ScriptedTransport::new()
            .reply(target, ProbeKind::stealth(TcpTechnique::Ack, STEALTH_PORT), rst(0))
            .reply(target, ProbeKind::stealth(TcpTechnique::Xmas, STEALTH_PORT), rst(8192)),
    );

    let results = engine(transport, ScanLevel::AdvancedTcp, 1)
        .scan_targets(&[target])
        .await;
    let host = results.get(&target).unwrap();

    assert_eq!(host.status, HostStatus::Alive);
    assert!(host.tcp_ack && host.tcp_xmas);
    assert!(!host.tcp_window);
    assert_eq!(host.window_size, 0);
    assert_eq!(host.os_guess, "");
}

#[tokio::test(start_paused = true)]
async fn test_fault_isolated_to_one_host() {
    let targets = addresses(5);
    let faulty = targets[2];
    let mut transport = ScriptedTransport::new().fault(faulty, ProbeKind::syn(443));
    for target in &targets {
        transport = transport.reply(*target, ProbeKind::Icmp(IcmpProbe::Echo), icmp_reply(0, 64));
    }
    let transport = Arc::new(transport);

    let results = engine(transport.clone(), ScanLevel::AdvancedTcp, 5)
        .scan_targets(&targets)
        .await;

    assert_eq!(results.len(), 5);
    let broken = results.get(&faulty).unwrap();
    assert_eq!(broken.status, HostStatus::Error);
    assert!(broken.icmp_echo);
    assert!(broken.discovery_time.is_none());
    assert!(broken.os_guess.is_empty());
    // 4 ICMP, SYN/80, then the faulting SYN/443
    assert_eq!(transport.sent_to(faulty).len(), 6);

    for target in targets.iter().filter(|t| **t != faulty) {
        let host = results.get(target).unwrap();
        assert_eq!(host.status, HostStatus::Alive);
        assert_eq!(host.os_guess, "Linux/Unix");
        assert_eq!(transport.sent_to(*target).len(), 11);
    }

    let summary = results.summary("unused.csv");
    assert_eq!(summary.error_hosts, 1);
    assert_eq!(summary.alive_hosts, 4);
}

#[tokio::test(start_paused = true)]
async fn test_every_target_gets_exactly_one_record() {
    let targets = addresses(40);
    let mut transport = ScriptedTransport::new();
    for target in targets.iter().step_by(3) {
        transport = transport.reply(*target, ProbeKind::syn(80), syn_ack(29200, Some(1460)));
    }
    let transport = Arc::new(transport);

    let results = engine(transport.clone(), ScanLevel::BasicTcp, 6)
        .scan_targets(&targets)
        .await;

    assert_eq!(results.len(), targets.len());
    let stored: HashSet<Ipv4Addr> = results.iter().map(|r| r.address).collect();
    let expected: HashSet<Ipv4Addr> = targets.iter().copied().collect();
    assert_eq!(stored, expected);

    for host in results.iter() {
        assert_eq!(host.is_alive(), host.any_probe_succeeded());
        if host.status == HostStatus::Dead {
            assert!(!host.any_probe_succeeded());
        }
    }

    assert!(transport.max_in_flight() <= 6);
}

#[tokio::test(start_paused = true)]
async fn test_pool_size_bounds_concurrency() {
    let targets = addresses(10);
    let transport = Arc::new(ScriptedTransport::new());

    engine(transport.clone(), ScanLevel::Icmp, 3)
        .scan_targets(&targets)
        .await;

    assert_eq!(transport.max_in_flight(), 3);
    assert_eq!(transport.sent().len(), 10 * 4);
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_targets_scanned_once() {
    let a = Ipv4Addr::new(172, 16, 0, 1);
    let b = Ipv4Addr::new(172, 16, 0, 2);
    let transport = Arc::new(ScriptedTransport::new());

    let results = engine(transport.clone(), ScanLevel::Icmp, 4)
        .scan_targets(&[a, b, a, a, b])
        .await;

    assert_eq!(results.len(), 2);
    assert_eq!(transport.sent_to(a).len(), 4);
    assert_eq!(transport.sent_to(b).len(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_per_host_probe_order() {
    let target = Ipv4Addr::new(192, 168, 9, 9);
    let transport = Arc::new(ScriptedTransport::new());

    engine(transport.clone(), ScanLevel::AdvancedTcp, 1)
        .scan_targets(&[target])
        .await;

    let expected = vec![
        ProbeKind::Icmp(IcmpProbe::Echo),
        ProbeKind::Icmp(IcmpProbe::Timestamp),
        ProbeKind::Icmp(IcmpProbe::Information),
        ProbeKind::Icmp(IcmpProbe::AddressMask),
        ProbeKind::syn(80),
        ProbeKind::syn(443),
        ProbeKind::syn(0),
        ProbeKind::stealth(TcpTechnique::Ack, 80),
        ProbeKind::stealth(TcpTechnique::Null, 80),
        ProbeKind::stealth(TcpTechnique::Fin, 80),
        ProbeKind::stealth(TcpTechnique::Xmas, 80),
    ];
    assert_eq!(transport.sent_to(target), expected);
}
