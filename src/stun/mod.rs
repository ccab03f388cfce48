pub mod attribute;
pub mod message;
pub mod stun_error;
pub use attribute::StunAttribute;
pub use message::{MessageClass, StunMessage};
pub use stun_error::StunError;

/// STUN magic cookie (RFC 5389 §6).
pub const MAGIC_COOKIE: u32 = 0x2112_A442;
/// Fixed STUN header length.
pub const HEADER_LEN: usize = 20;
/// The only method this agent speaks.
pub const METHOD_BINDING: u16 = 0x0001;
/// XOR applied to the CRC-32 in the FINGERPRINT attribute ("STUN").
pub const FINGERPRINT_XOR: u32 = 0x5354_554E;
