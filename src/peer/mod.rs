pub mod offer;
pub mod peer_connection;
pub mod peer_error;
pub mod peer_state;
pub mod remote_description;
pub mod video_sender;
pub use peer_connection::PeerConnection;
pub use peer_error::{AnswerRejection, PeerError};
pub use peer_state::PeerState;
pub use remote_description::RemoteAnswer;
