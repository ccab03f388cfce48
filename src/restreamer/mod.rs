pub mod restream_error;
pub mod restreamer;
pub use restream_error::RestreamError;
pub use restreamer::Restreamer;
