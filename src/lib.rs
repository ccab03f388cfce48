//! Restreams a single H.264/RTP ingress feed to any number of browser
//! peers over WebRTC.
//!
//! One UDP socket receives the source stream; every appended client gets
//! its own ICE agent, DTLS-SRTP handshake and SRTP cipher contexts, and
//! the ingress packets are fanned out, rewritten and protected per peer.
//! The embedding service drives the crate through [`restreamer::Restreamer`]:
//! `append_client` returns an SDP offer, `process_client_answer` completes
//! the exchange, `stop` tears everything down.

/// Configuration record consumed by the facade.
pub mod config;
/// DTLS 1.2 handshake and SRTP key export (openssl-backed).
pub mod dtls;
/// ICE agent: host candidates, connectivity checks, nomination, keepalives.
pub mod ice;
/// Logging utilities (sink trait, background writer, leveled macros).
pub mod log;
/// Registry of active peers and RTP fan-out.
pub mod multiplexer;
/// Per-peer orchestration: state machine, SDP offer/answer, send pipeline.
pub mod peer;
/// Recycled packet buffers for the ingress hot path.
pub mod pool;
/// Top-level facade owned by the embedding service.
pub mod restreamer;
/// RTCP compound packet parsing and building.
pub mod rtcp;
/// RTP packet parsing and building per RFC 3550.
pub mod rtp;
/// SDP parsing and building.
pub mod sdp;
/// Ingress UDP receive loop.
pub mod source;
/// SRTP/SRTCP cryptographic contexts per RFC 3711.
pub mod srtp;
/// STUN message codec per RFC 5389 with ICE attributes.
pub mod stun;
