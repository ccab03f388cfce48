use super::agent::IceRole;
use super::candidate::Candidate;

/// Check state of a candidate pair (RFC 8445 §6.1.2.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidatePairState {
    Waiting,
    InProgress,
    Succeeded,
    Failed,
}

/// Pair priority per RFC 8445 §6.1.2.3:
/// 2^32·MIN(G,D) + 2·MAX(G,D) + (G>D ? 1 : 0), G = controlling side.
#[must_use]
pub fn pair_priority(local: &Candidate, remote: &Candidate, role: IceRole) -> u64 {
    let (g, d) = match role {
        IceRole::Controlling => (u64::from(local.priority), u64::from(remote.priority)),
        IceRole::Controlled => (u64::from(remote.priority), u64::from(local.priority)),
    };
    (1u64 << 32) * g.min(d) + 2 * g.max(d) + u64::from(g > d)
}
