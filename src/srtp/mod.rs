pub mod constants;
pub mod endpoint_keys;
pub mod replay_window;
pub mod session_keys;
pub mod srtp_context;
pub mod srtp_error;
pub(crate) mod utils;
pub use endpoint_keys::{SrtpEndpointKeys, SrtpProfile, SrtpSessionConfig};
pub use srtp_context::{SrtpContext, SrtpContextState};
pub use srtp_error::SrtpError;
