use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::rngs::OsRng;
use rand::{Rng, RngCore};

use crate::log::log_sink::LogSink;
use crate::stun::attribute::StunAttribute;
use crate::stun::message::{MessageClass, StunMessage, verify_integrity};
use crate::{sink_debug, sink_info, sink_warn};

use super::candidate::{COMPONENT_RTP, Candidate, calculate_priority};
use super::candidate_pair::{CandidatePairState, pair_priority};
use super::candidate_type::CandidateType;
use super::demux::{Demuxed, PacketClass, classify};
use super::gathering::{HostBinding, gather_host_bindings, loopback_binding};

/// Initial retransmission timeout for connectivity checks.
const RTO_INITIAL: Duration = Duration::from_millis(500);
/// Retransmission timeout cap.
const RTO_MAX: Duration = Duration::from_millis(1600);
/// Attempts per check transaction before the pair fails.
const MAX_CHECK_ATTEMPTS: u32 = 7;

const UFRAG_LEN: usize = 16;
const PWD_LEN: usize = 48;

/// Agent role (RFC 8445 §6.1.1). The restreamer always offers, so it
/// starts Controlling; an ice-lite remote keeps it Controlling
/// unconditionally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IceRole {
    Controlling,
    Controlled,
}

/// Agent lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IceAgentState {
    Gathering,
    Checking,
    Connected,
    Completed,
    Disconnected,
    Failed,
    Closed,
}

/// Timing knobs, filled from the crate configuration.
#[derive(Debug, Clone, Copy)]
pub struct IceConfig {
    /// Deadline from the first check to a working pair.
    pub timeout: Duration,
    /// Keepalive interval on the selected pair.
    pub keepalive: Duration,
    /// Silence on the selected pair before Disconnected.
    pub disconnect_after: Duration,
}

impl Default for IceConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            keepalive: Duration::from_secs(15),
            disconnect_after: Duration::from_secs(6),
        }
    }
}

/// One entry of the checklist: a local socket paired with a remote
/// address, plus its live transaction.
struct Check {
    local_idx: usize,
    remote: SocketAddr,
    priority: u64,
    state: CandidatePairState,
    transaction_id: [u8; 12],
    in_flight: bool,
    /// The current transaction carries USE-CANDIDATE.
    nominating: bool,
    nominated: bool,
    attempts: u32,
    rto: Duration,
    next_send: Instant,
}

/// Trickle-capable ICE agent for one peer: host candidates, STUN
/// connectivity checks, nomination, keepalives, and the first-byte
/// demultiplexer for the shared socket.
///
/// Single-threaded: the owning peer's control loop calls
/// [`drive`](Self::drive) and [`handle_datagram`](Self::handle_datagram);
/// nothing here locks.
pub struct IceAgent {
    logger: Arc<dyn LogSink>,
    cfg: IceConfig,
    role: IceRole,
    ufrag: String,
    pwd: String,
    remote_ufrag: String,
    remote_pwd: String,
    bindings: Vec<HostBinding>,
    remote_candidates: Vec<Candidate>,
    checks: Vec<Check>,
    state: IceAgentState,
    /// Index into `checks` of the selected (nominated) pair.
    selected: Option<usize>,
    tie_breaker: u64,
    started_at: Option<Instant>,
    last_received: Option<Instant>,
    last_keepalive: Option<Instant>,
}

impl IceAgent {
    /// Gathers host candidates and prepares credentials. Falls back to a
    /// loopback candidate when the host has no routable address, so
    /// same-machine setups still connect.
    #[must_use]
    pub fn new(logger: Arc<dyn LogSink>, cfg: IceConfig) -> Self {
        let mut bindings = gather_host_bindings(&logger);
        if bindings.is_empty() {
            if let Some(b) = loopback_binding() {
                bindings.push(b);
            }
        }
        Self::with_bindings(logger, cfg, bindings)
    }

    /// Agent over caller-provided bindings (tests pin loopback sockets).
    #[must_use]
    pub fn with_bindings(
        logger: Arc<dyn LogSink>,
        cfg: IceConfig,
        bindings: Vec<HostBinding>,
    ) -> Self {
        Self {
            logger,
            cfg,
            role: IceRole::Controlling,
            ufrag: gen_token(UFRAG_LEN),
            pwd: gen_token(PWD_LEN),
            remote_ufrag: String::new(),
            remote_pwd: String::new(),
            bindings,
            remote_candidates: Vec::new(),
            checks: Vec::new(),
            state: IceAgentState::Gathering,
            selected: None,
            tie_breaker: OsRng.next_u64(),
            started_at: None,
            last_received: None,
            last_keepalive: None,
        }
    }

    #[must_use]
    pub fn state(&self) -> IceAgentState {
        self.state
    }

    #[must_use]
    pub fn role(&self) -> IceRole {
        self.role
    }

    /// Overrides the role. The restreamer itself always offers
    /// (Controlling); answerer-side harnesses set Controlled.
    pub fn set_role(&mut self, role: IceRole) {
        self.role = role;
    }

    /// Local `(ufrag, pwd)`.
    #[must_use]
    pub fn credentials(&self) -> (&str, &str) {
        (&self.ufrag, &self.pwd)
    }

    #[must_use]
    pub fn local_candidates(&self) -> Vec<Candidate> {
        self.bindings.iter().map(|b| b.candidate.clone()).collect()
    }

    /// The sockets the owner's receive loop must poll.
    #[must_use]
    pub fn sockets(&self) -> Vec<Arc<UdpSocket>> {
        self.bindings.iter().map(|b| Arc::clone(&b.socket)).collect()
    }

    /// Stores remote credentials. An ice-lite remote performs no checks,
    /// so the local agent stays Controlling no matter what.
    pub fn set_remote_credentials(&mut self, ufrag: &str, pwd: &str, remote_is_lite: bool) {
        self.remote_ufrag = ufrag.to_owned();
        self.remote_pwd = pwd.to_owned();
        if remote_is_lite {
            self.role = IceRole::Controlling;
        }
    }

    /// Adds a remote candidate (from the answer, or trickled later).
    /// Incompatible families/transports are skipped at pairing time.
    pub fn add_remote_candidate(&mut self, candidate: Candidate, now: Instant) {
        if self
            .remote_candidates
            .iter()
            .any(|c| c.address == candidate.address)
        {
            return;
        }
        self.remote_candidates.push(candidate.clone());
        if !matches!(self.state, IceAgentState::Gathering) {
            self.pair_with_all_locals(&candidate, now);
            self.sort_checks();
        }
    }

    /// Builds the checklist from the Cartesian product of local and
    /// remote candidates and starts transmitting.
    pub fn begin_checks(&mut self, now: Instant) {
        let remotes: Vec<Candidate> = self.remote_candidates.clone();
        for remote in &remotes {
            self.pair_with_all_locals(remote, now);
        }
        self.sort_checks();
        self.state = IceAgentState::Checking;
        self.started_at = Some(now);
        sink_info!(
            self.logger,
            "[ICE] starting connectivity checks over {} pairs",
            self.checks.len()
        );
    }

    fn pair_with_all_locals(&mut self, remote: &Candidate, now: Instant) {
        if remote.transport != "udp" {
            return;
        }
        for (local_idx, binding) in self.bindings.iter().enumerate() {
            let local = &binding.candidate;
            if local.address.is_ipv4() != remote.address.is_ipv4() {
                continue;
            }
            if self
                .checks
                .iter()
                .any(|c| c.local_idx == local_idx && c.remote == remote.address)
            {
                continue;
            }
            self.checks.push(Check {
                local_idx,
                remote: remote.address,
                priority: pair_priority(local, remote, self.role),
                state: CandidatePairState::Waiting,
                transaction_id: new_transaction_id(),
                in_flight: false,
                nominating: false,
                nominated: false,
                attempts: 0,
                rto: RTO_INITIAL,
                next_send: now,
            });
        }
    }

    /// Priority descending, foundation pair as the tie-break.
    fn sort_checks(&mut self) {
        let bindings = &self.bindings;
        self.checks.sort_by(|a, b| {
            b.priority.cmp(&a.priority).then_with(|| {
                let fa = &bindings[a.local_idx].candidate.foundation;
                let fb = &bindings[b.local_idx].candidate.foundation;
                fa.cmp(fb)
            })
        });
        // Re-point the selected index after reordering.
        if self.selected.is_some() {
            self.selected = self.checks.iter().position(|c| c.nominated);
        }
    }

    /// Periodic work: retransmissions, deadlines, keepalives, liveness.
    pub fn drive(&mut self, now: Instant) {
        match self.state {
            IceAgentState::Failed | IceAgentState::Closed | IceAgentState::Gathering => return,
            _ => {}
        }

        // Overall deadline counts from the first check until nomination.
        if self.selected.is_none() {
            if let Some(started) = self.started_at {
                if now.duration_since(started) > self.cfg.timeout {
                    sink_warn!(self.logger, "[ICE] connectivity deadline exceeded");
                    self.state = IceAgentState::Failed;
                    return;
                }
            }
        }

        // Retransmit due transactions.
        for idx in 0..self.checks.len() {
            let due = {
                let c = &self.checks[idx];
                matches!(
                    c.state,
                    CandidatePairState::Waiting | CandidatePairState::InProgress
                ) && now >= c.next_send
            };
            if !due {
                continue;
            }
            if self.checks[idx].attempts >= MAX_CHECK_ATTEMPTS {
                self.checks[idx].state = CandidatePairState::Failed;
                self.checks[idx].in_flight = false;
                continue;
            }
            self.transmit_check(idx, now);
        }

        if self.selected.is_none()
            && !self.checks.is_empty()
            && self
                .checks
                .iter()
                .all(|c| matches!(c.state, CandidatePairState::Failed))
        {
            sink_warn!(self.logger, "[ICE] every candidate pair failed");
            self.state = IceAgentState::Failed;
            return;
        }

        // A disconnect whose recheck exhausted its retransmissions is final.
        if matches!(self.state, IceAgentState::Disconnected) {
            if let Some(sel) = self.selected {
                if matches!(self.checks[sel].state, CandidatePairState::Failed) {
                    sink_warn!(self.logger, "[ICE] selected pair lost for good");
                    self.state = IceAgentState::Failed;
                    return;
                }
            }
        }

        // Selected-pair liveness and keepalives.
        if let Some(sel) = self.selected {
            let silent_for = self
                .last_received
                .map(|t| now.duration_since(t))
                .unwrap_or_default();
            if matches!(
                self.state,
                IceAgentState::Connected | IceAgentState::Completed
            ) && silent_for > self.cfg.disconnect_after
            {
                sink_warn!(
                    self.logger,
                    "[ICE] selected pair silent for {:?}, disconnected",
                    silent_for
                );
                self.state = IceAgentState::Disconnected;
                self.schedule_recheck(sel, now);
            }

            let check_in_flight = self.checks[sel].in_flight;
            let keepalive_due = self
                .last_keepalive
                .is_none_or(|t| now.duration_since(t) >= self.cfg.keepalive);
            // Keepalive suppressed while a check is in flight on the pair.
            if keepalive_due && !check_in_flight {
                self.send_keepalive(sel);
                self.last_keepalive = Some(now);
            }
        }
    }

    fn schedule_recheck(&mut self, idx: usize, now: Instant) {
        let c = &mut self.checks[idx];
        c.transaction_id = new_transaction_id();
        c.state = CandidatePairState::InProgress;
        c.in_flight = false;
        c.nominating = false;
        c.attempts = 0;
        c.rto = RTO_INITIAL;
        c.next_send = now;
    }

    fn transmit_check(&mut self, idx: usize, now: Instant) {
        let request = self.build_check_request(&self.checks[idx]);
        let c = &mut self.checks[idx];
        let sock = &self.bindings[c.local_idx].socket;
        match sock.send_to(&request, c.remote) {
            Ok(_) => {
                c.state = CandidatePairState::InProgress;
                c.in_flight = true;
                c.attempts += 1;
                c.next_send = now + c.rto;
                c.rto = (c.rto * 2).min(RTO_MAX);
            }
            Err(e) => {
                sink_warn!(
                    self.logger,
                    "[ICE] check send failed {} -> {}: {}",
                    self.bindings[c.local_idx].candidate.address,
                    c.remote,
                    e
                );
                c.state = CandidatePairState::Failed;
                c.in_flight = false;
            }
        }
    }

    fn build_check_request(&self, check: &Check) -> Vec<u8> {
        // USERNAME is "remote-ufrag:local-ufrag" from the sender's side.
        let username = format!("{}:{}", self.remote_ufrag, self.ufrag);
        // PRIORITY carries the peer-reflexive priority of the local side.
        let prflx_priority =
            calculate_priority(CandidateType::PeerReflexive, u16::MAX, COMPONENT_RTP);

        let mut msg = StunMessage::binding_request(check.transaction_id)
            .with_attribute(StunAttribute::Username(username))
            .with_attribute(StunAttribute::Priority(prflx_priority));
        msg = match self.role {
            IceRole::Controlling => {
                msg.with_attribute(StunAttribute::IceControlling(self.tie_breaker))
            }
            IceRole::Controlled => {
                msg.with_attribute(StunAttribute::IceControlled(self.tie_breaker))
            }
        };
        if check.nominating {
            msg = msg.with_attribute(StunAttribute::UseCandidate);
        }
        msg.encode(Some(self.remote_pwd.as_bytes()), true)
    }

    fn send_keepalive(&self, idx: usize) {
        let c = &self.checks[idx];
        let indication = StunMessage::binding_indication(new_transaction_id()).encode(None, true);
        let _ = self.bindings[c.local_idx].socket.send_to(&indication, c.remote);
    }

    /// Routes one inbound datagram from socket `sock_idx`. STUN is
    /// handled inside the agent; DTLS and RTP/RTCP are handed back to
    /// the owner; everything else is dropped.
    pub fn handle_datagram(
        &mut self,
        data: &[u8],
        from: SocketAddr,
        sock_idx: usize,
        now: Instant,
    ) -> Demuxed {
        if self
            .selected
            .map(|sel| self.checks[sel].remote == from)
            .unwrap_or(false)
        {
            self.last_received = Some(now);
        }

        match classify(data) {
            PacketClass::Stun => {
                self.handle_stun(data, from, sock_idx, now);
                Demuxed::Consumed
            }
            PacketClass::Dtls => Demuxed::Dtls(data.to_vec()),
            PacketClass::Rtp => Demuxed::Rtp(data.to_vec()),
            PacketClass::Drop => Demuxed::Dropped,
        }
    }

    fn handle_stun(&mut self, data: &[u8], from: SocketAddr, sock_idx: usize, now: Instant) {
        let msg = match StunMessage::decode(data) {
            Ok(m) => m,
            Err(e) => {
                sink_warn!(self.logger, "[ICE] malformed STUN from {}: {}", from, e);
                return;
            }
        };

        match msg.class {
            MessageClass::Request => self.handle_binding_request(&msg, data, from, sock_idx, now),
            MessageClass::SuccessResponse => self.handle_binding_success(&msg, data, from, now),
            MessageClass::ErrorResponse => {
                let code = msg.attributes.iter().find_map(|a| match a {
                    StunAttribute::ErrorCode { code, .. } => Some(*code),
                    _ => None,
                });
                sink_warn!(
                    self.logger,
                    "[ICE] binding error response {:?} from {}",
                    code,
                    from
                );
                if let Some(idx) = self.find_check_by_tid(msg.transaction_id, from) {
                    self.checks[idx].state = CandidatePairState::Failed;
                    self.checks[idx].in_flight = false;
                }
            }
            MessageClass::Indication => {
                // Keepalive receipt; last_received already refreshed.
                sink_debug!(self.logger, "[ICE] keepalive indication from {}", from);
            }
        }
    }

    fn handle_binding_request(
        &mut self,
        msg: &StunMessage,
        raw: &[u8],
        from: SocketAddr,
        sock_idx: usize,
        now: Instant,
    ) {
        // Requests authenticate with OUR password.
        if !verify_integrity(raw, self.pwd.as_bytes()) {
            sink_warn!(self.logger, "[ICE] request with bad integrity from {}", from);
            return;
        }
        if let Some(username) = msg.username() {
            if !username.starts_with(&format!("{}:", self.ufrag)) {
                sink_warn!(self.logger, "[ICE] request for wrong ufrag from {}", from);
                return;
            }
        }

        let response = StunMessage::binding_success(msg.transaction_id)
            .with_attribute(StunAttribute::XorMappedAddress(from))
            .encode(Some(self.pwd.as_bytes()), true);
        let _ = self.bindings[sock_idx].socket.send_to(&response, from);

        // A request is also proof of reachability for the reverse path.
        let idx = self.find_or_create_check(from, sock_idx, msg.priority(), now);
        if let Some(idx) = idx {
            if msg.has_use_candidate() && self.role == IceRole::Controlled {
                self.checks[idx].nominated = true;
                self.checks[idx].state = CandidatePairState::Succeeded;
                self.promote_selected(idx);
            } else if matches!(self.checks[idx].state, CandidatePairState::Waiting) {
                // Triggered check: answer reachability with our own check.
                self.checks[idx].next_send = now;
            }
        }
    }

    fn handle_binding_success(
        &mut self,
        msg: &StunMessage,
        raw: &[u8],
        from: SocketAddr,
        now: Instant,
    ) {
        // Responses to our requests authenticate with the REMOTE password.
        if !verify_integrity(raw, self.remote_pwd.as_bytes()) {
            sink_warn!(self.logger, "[ICE] response with bad integrity from {}", from);
            return;
        }
        let Some(idx) = self.find_check_by_tid(msg.transaction_id, from) else {
            sink_debug!(self.logger, "[ICE] stale binding response from {}", from);
            return;
        };

        let was_nominating = self.checks[idx].nominating;
        self.checks[idx].state = CandidatePairState::Succeeded;
        self.checks[idx].in_flight = false;

        if matches!(self.state, IceAgentState::Disconnected) {
            sink_info!(self.logger, "[ICE] selected pair recovered");
            self.state = IceAgentState::Connected;
        }

        if was_nominating {
            self.checks[idx].nominated = true;
            self.promote_selected(idx);
        } else if self.role == IceRole::Controlling && !self.checks[idx].nominated {
            // Nomination round: a second request carrying USE-CANDIDATE.
            let c = &mut self.checks[idx];
            c.nominating = true;
            c.transaction_id = new_transaction_id();
            c.attempts = 0;
            c.rto = RTO_INITIAL;
            c.next_send = now;
            sink_debug!(
                self.logger,
                "[ICE] nominating pair -> {} (priority {})",
                c.remote,
                c.priority
            );
        }
    }

    /// Makes `idx` the selected pair if it beats the current one.
    /// Nomination is monotonic: a selected pair is only replaced by a
    /// higher-priority nominated pair (or after keepalive failure).
    fn promote_selected(&mut self, idx: usize) {
        let better = match self.selected {
            None => true,
            Some(cur) => self.checks[idx].priority > self.checks[cur].priority,
        };
        if !better {
            return;
        }
        self.selected = Some(idx);
        self.last_received = Some(Instant::now());
        self.state = match self.role {
            IceRole::Controlling => IceAgentState::Completed,
            IceRole::Controlled => IceAgentState::Connected,
        };
        sink_info!(
            self.logger,
            "[ICE] selected pair {} -> {}",
            self.bindings[self.checks[idx].local_idx].candidate.address,
            self.checks[idx].remote
        );
    }

    fn find_check_by_tid(&self, tid: [u8; 12], from: SocketAddr) -> Option<usize> {
        self.checks
            .iter()
            .position(|c| c.in_flight && c.transaction_id == tid && c.remote == from)
    }

    /// Finds the check matching `from`, creating a peer-reflexive style
    /// entry when a request arrives from an address we never paired.
    fn find_or_create_check(
        &mut self,
        from: SocketAddr,
        sock_idx: usize,
        priority: Option<u32>,
        now: Instant,
    ) -> Option<usize> {
        if let Some(idx) = self
            .checks
            .iter()
            .position(|c| c.remote == from && c.local_idx == sock_idx)
        {
            return Some(idx);
        }
        if matches!(self.state, IceAgentState::Gathering | IceAgentState::Closed) {
            return None;
        }
        let local = &self.bindings[sock_idx].candidate;
        let mut remote = Candidate::host(from);
        remote.cand_type = CandidateType::PeerReflexive;
        remote.priority = priority.unwrap_or_else(|| {
            calculate_priority(CandidateType::PeerReflexive, u16::MAX, COMPONENT_RTP)
        });
        let pair_prio = pair_priority(local, &remote, self.role);
        self.checks.push(Check {
            local_idx: sock_idx,
            remote: from,
            priority: pair_prio,
            state: CandidatePairState::Waiting,
            transaction_id: new_transaction_id(),
            in_flight: false,
            nominating: false,
            nominated: false,
            attempts: 0,
            rto: RTO_INITIAL,
            next_send: now,
        });
        Some(self.checks.len() - 1)
    }

    /// Socket and remote address of the selected pair.
    #[must_use]
    pub fn selected_pair(&self) -> Option<(Arc<UdpSocket>, SocketAddr)> {
        let idx = self.selected?;
        let c = self.checks.get(idx)?;
        Some((
            Arc::clone(&self.bindings[c.local_idx].socket),
            c.remote,
        ))
    }

    /// Drops the checklist and marks the agent closed. Sockets die with
    /// the last Arc clone.
    pub fn close(&mut self) {
        self.checks.clear();
        self.selected = None;
        self.state = IceAgentState::Closed;
    }
}

fn gen_token(len: usize) -> String {
    const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    let mut s = String::with_capacity(len);
    for _ in 0..len {
        let idx = OsRng.gen_range(0..ALPHABET.len());
        s.push(ALPHABET[idx] as char);
    }
    s
}

fn new_transaction_id() -> [u8; 12] {
    let mut tid = [0u8; 12];
    OsRng.fill_bytes(&mut tid);
    tid
}
