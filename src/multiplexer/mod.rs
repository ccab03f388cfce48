pub mod stream_multiplexer;
pub use stream_multiplexer::StreamMultiplexer;
