use std::net::{IpAddr, SocketAddr, UdpSocket};
use std::sync::Arc;

use crate::log::log_sink::LogSink;
use crate::sink_warn;

use super::candidate::Candidate;

/// Addresses probed to learn the primary egress interface for each
/// family. No packets are actually sent; `connect` on UDP only binds a
/// route.
const IPV4_PROBE: &str = "198.51.100.1:9";
const IPV6_PROBE: &str = "[2001:db8::1]:9";

/// One gathered host candidate together with its bound socket.
pub struct HostBinding {
    pub candidate: Candidate,
    pub socket: Arc<UdpSocket>,
}

/// Gathers host candidates: one socket per usable local address
/// (non-loopback, non-link-local), IPv4 and IPv6.
///
/// Discovery uses a route probe per family, which finds the primary
/// egress interface without enumerating the interface table.
#[must_use]
pub fn gather_host_bindings(logger: &Arc<dyn LogSink>) -> Vec<HostBinding> {
    let mut out = Vec::new();

    for probe in [IPV4_PROBE, IPV6_PROBE] {
        match discover_local_ip(probe) {
            Ok(ip) => match bind_host_socket(ip) {
                Ok(binding) => out.push(binding),
                Err(e) => {
                    sink_warn!(logger, "[ICE] cannot bind host candidate on {}: {}", ip, e);
                }
            },
            Err(_) => {
                // No route for this family; normal on v4-only or v6-only
                // hosts.
            }
        }
    }

    out
}

/// Local address the kernel would use to reach `probe`.
fn discover_local_ip(probe: &str) -> Result<IpAddr, String> {
    let bind_any = if probe.starts_with('[') { "[::]:0" } else { "0.0.0.0:0" };
    let sock = UdpSocket::bind(bind_any).map_err(|e| e.to_string())?;
    sock.connect(probe).map_err(|e| e.to_string())?;
    let ip = sock.local_addr().map_err(|e| e.to_string())?.ip();

    if ip.is_loopback() || !is_usable(ip) {
        return Err(format!("unusable local address {ip}"));
    }
    Ok(ip)
}

fn is_usable(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => !v4.is_loopback() && !v4.is_link_local() && !v4.is_unspecified(),
        IpAddr::V6(v6) => {
            // fe80::/10 is link-local.
            !v6.is_loopback() && !v6.is_unspecified() && (v6.segments()[0] & 0xFFC0) != 0xFE80
        }
    }
}

fn bind_host_socket(ip: IpAddr) -> Result<HostBinding, String> {
    let sock = UdpSocket::bind(SocketAddr::new(ip, 0)).map_err(|e| e.to_string())?;
    sock.set_nonblocking(true).map_err(|e| e.to_string())?;
    let addr = sock.local_addr().map_err(|e| e.to_string())?;
    Ok(HostBinding {
        candidate: Candidate::host(addr),
        socket: Arc::new(sock),
    })
}

/// Loopback binding for same-host tests and demos.
#[must_use]
pub fn loopback_binding() -> Option<HostBinding> {
    let sock = UdpSocket::bind("127.0.0.1:0").ok()?;
    sock.set_nonblocking(true).ok()?;
    let addr = sock.local_addr().ok()?;
    Some(HostBinding {
        candidate: Candidate::host(addr),
        socket: Arc::new(sock)
    })
}
