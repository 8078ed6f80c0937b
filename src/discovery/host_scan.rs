//! Host scan orchestrator: the leveled probe sequence for one target
//!
//! Levels run strictly in order and every probe inside a level runs even
//! after the host is known to be alive, so the record always carries the
//! full picture for the configured depth.

use crate::config::{ScanConfig, ScanLevel};
use crate::discovery::HostResult;
use crate::network::{
    IcmpProbe, ProbeEngine, ProbeError, ProbeKind, ProbeOutcome, ProbeTransport, TcpTechnique,
};
use crate::ScanError;
use log::{debug, info, warn};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

/// SYN probe ports for level 2; port 0 acts as a baseline probe
pub const BASIC_TCP_PORTS: [u16; 3] = [80, 443, 0];

/// Destination port of the level 3 stealth probes
pub const STEALTH_PORT: u16 = 80;

/// Number of probes a host receives at `level`
pub fn probes_per_host(level: ScanLevel) -> usize {
    let mut count = IcmpProbe::ALL.len();
    if level >= ScanLevel::BasicTcp {
        count += BASIC_TCP_PORTS.len();
    }
    if level >= ScanLevel::AdvancedTcp {
        count += TcpTechnique::STEALTH.len();
    }
    count
}

/// Runs the level sequence against single hosts
pub struct HostScanner<T: ?Sized> {
    probes: ProbeEngine<T>,
    max_level: ScanLevel,
    timeout: Duration,
}

impl<T: ?Sized> Clone for HostScanner<T> {
    fn clone(&self) -> Self {
        Self {
            probes: self.probes.clone(),
            max_level: self.max_level,
            timeout: self.timeout,
        }
    }
}

impl<T: ProbeTransport + ?Sized> HostScanner<T> {
    pub fn new(probes: ProbeEngine<T>, max_level: ScanLevel, timeout: Duration) -> Self {
        Self {
            probes,
            max_level,
            timeout,
        }
    }

    pub fn from_config(transport: Arc<T>, config: &ScanConfig) -> Self {
        Self::new(
            ProbeEngine::new(transport),
            config.max_level,
            config.timeout_duration(),
        )
    }

    /// Scan one host through every configured level
    ///
    /// Never fails: an unrecoverable probe fault yields a record with
    /// status `error` and whatever flags were gathered before it.
    pub async fn scan(&self, target: Ipv4Addr) -> HostResult {
        let mut result = HostResult::new(target);

        match self.run_levels(target, &mut result).await {
            Ok(()) => {
                result.finalize();
                if result.is_alive() {
                    let os = if result.os_guess.is_empty() {
                        "Unknown"
                    } else {
                        result.os_guess.as_str()
                    };
                    info!(
                        "[+] {} [ALIVE] [{}] [{}]",
                        target,
                        os,
                        result.detection_methods().join(", ")
                    );
                }
            }
            Err(e) => {
                let fault = ScanError::HostScan {
                    target,
                    reason: e.to_string(),
                };
                warn!("{}", fault);
                result.mark_error();
            }
        }

        result
    }

    async fn run_levels(&self, target: Ipv4Addr, result: &mut HostResult) -> Result<(), ProbeError> {
        self.icmp_level(target, result).await?;

        if self.max_level >= ScanLevel::BasicTcp {
            self.basic_tcp_level(target, result).await?;
        }

        if self.max_level >= ScanLevel::AdvancedTcp {
            self.advanced_tcp_level(target, result).await?;
        }

        Ok(())
    }

    /// Level 1: echo, timestamp, information and address-mask queries
    async fn icmp_level(&self, target: Ipv4Addr, result: &mut HostResult) -> Result<(), ProbeError> {
        for probe in IcmpProbe::ALL {
            let outcome = self
                .probes
                .probe(target, ProbeKind::Icmp(probe), self.timeout)
                .await?;

            let ttl = match outcome {
                ProbeOutcome::Icmp { ttl } => ttl,
                _ => {
                    debug!("No {} reply from {}", probe.name(), target);
                    continue;
                }
            };

            *icmp_flag(result, probe) = true;
            result.mark_alive();
            if probe == IcmpProbe::Echo {
                result.ttl = ttl;
            }
        }

        Ok(())
    }

    /// Level 2: SYN probes, window and MSS kept only when a port is open
    async fn basic_tcp_level(
        &self,
        target: Ipv4Addr,
        result: &mut HostResult,
    ) -> Result<(), ProbeError> {
        let mut any_open = false;
        let mut max_window = 0u16;
        let mut max_mss = 0u16;

        for port in BASIC_TCP_PORTS {
            let outcome = self
                .probes
                .probe(target, ProbeKind::syn(port), self.timeout)
                .await?;

            let state = outcome.port_state();
            debug!("{}:{} is {}", target, port, state);

            if let Some(reply) = outcome.tcp() {
                max_window = max_window.max(reply.window);
                max_mss = max_mss.max(reply.mss.unwrap_or(0));
            }

            if state == crate::network::PortState::Open {
                any_open = true;
                if let Some(flag) = syn_flag(result, port) {
                    *flag = true;
                }
                result.mark_alive();
            }
        }

        if any_open {
            result.window_size = max_window;
            result.mss = max_mss;
        }

        Ok(())
    }

    /// Level 3: ACK, NULL, FIN and XMAS; any reply counts
    ///
    /// Only the ACK reply's window is observed.
    async fn advanced_tcp_level(
        &self,
        target: Ipv4Addr,
        result: &mut HostResult,
    ) -> Result<(), ProbeError> {
        let mut observed_window = 0u16;

        for technique in TcpTechnique::STEALTH {
            let outcome = self
                .probes
                .probe(target, ProbeKind::stealth(technique, STEALTH_PORT), self.timeout)
                .await?;

            let Some(reply) = outcome.tcp() else {
                debug!("No reply to {} probe from {}", technique.name(), target);
                continue;
            };

            *stealth_flag(result, technique) = true;
            result.mark_alive();
            if technique == TcpTechnique::Ack {
                observed_window = reply.window;
            }
        }

        result.tcp_window = observed_window > 0;
        if observed_window > result.window_size {
            result.window_size = observed_window;
        }

        Ok(())
    }
}

fn icmp_flag(result: &mut HostResult, probe: IcmpProbe) -> &mut bool {
    match probe {
        IcmpProbe::Echo => &mut result.icmp_echo,
        IcmpProbe::Timestamp => &mut result.icmp_timestamp,
        IcmpProbe::Information => &mut result.icmp_info,
        IcmpProbe::AddressMask => &mut result.icmp_mask,
    }
}

fn syn_flag(result: &mut HostResult, port: u16) -> Option<&mut bool> {
    match port {
        80 => Some(&mut result.tcp_syn_80),
        443 => Some(&mut result.tcp_syn_443),
        0 => Some(&mut result.tcp_syn_0),
        _ => None,
    }
}

fn stealth_flag(result: &mut HostResult, technique: TcpTechnique) -> &mut bool {
    match technique {
        TcpTechnique::Ack => &mut result.tcp_ack,
        TcpTechnique::Null => &mut result.tcp_null,
        TcpTechnique::Fin => &mut result.tcp_fin,
        // SYN never runs at this level
        TcpTechnique::Xmas | TcpTechnique::Syn => &mut result.tcp_xmas,
    }
}
