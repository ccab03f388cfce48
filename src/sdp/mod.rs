pub mod attribute;
pub mod connection;
pub mod media;
pub mod origin;
pub mod sdp_error;
pub mod sdpc;
pub mod time_desc;
pub use attribute::Attribute;
pub use media::{Media, MediaKind};
pub use sdp_error::SdpError;
pub use sdpc::Sdp;
