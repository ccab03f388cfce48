use std::net::SocketAddr;
use std::time::Duration;

/// Runtime configuration for the restreamer core.
///
/// The embedding service supplies the ingress endpoint; everything else is
/// an internal tunable with a sensible default. There is no file or
/// environment loading — all state is handed in by the embedder.
#[derive(Debug, Clone)]
pub struct RestreamerConfig {
    /// UDP endpoint the source RTP stream arrives on.
    pub rtp_listen: SocketAddr,
    /// Maximum datagram size accepted on ingress and emitted on egress.
    pub mtu: usize,
    /// Number of pooled buffers kept warm across bursts.
    pub pool_soft_cap: usize,
    /// Absolute buffer ceiling; `acquire` fails beyond this.
    pub pool_hard_cap: usize,
    /// Deadline for the DTLS handshake after ICE nominates a pair.
    pub dtls_timeout: Duration,
    /// Deadline for ICE connectivity from the first check.
    pub ice_timeout: Duration,
    /// Interval between STUN keepalive indications on the selected pair.
    pub ice_keepalive: Duration,
    /// Silence on the selected pair before the agent reports Disconnected.
    pub ice_disconnect_after: Duration,
    /// Period of the background sweep (keepalive tick + peer cleanup).
    pub sweep_period: Duration,
    /// Consecutive send failures after which a peer is marked Failed.
    pub send_failure_threshold: u32,
}

impl RestreamerConfig {
    /// Configuration with defaults for everything except the ingress endpoint.
    #[must_use]
    pub fn new(rtp_listen: SocketAddr) -> Self {
        Self {
            rtp_listen,
            mtu: 1500,
            pool_soft_cap: 256,
            pool_hard_cap: 4096,
            dtls_timeout: Duration::from_secs(30),
            ice_timeout: Duration::from_secs(30),
            ice_keepalive: Duration::from_secs(15),
            ice_disconnect_after: Duration::from_secs(6),
            sweep_period: Duration::from_secs(10),
            send_failure_threshold: 10,
        }
    }
}
