pub mod agent;
pub mod candidate;
pub mod candidate_pair;
pub mod candidate_type;
pub mod demux;
pub mod gathering;
pub use agent::{IceAgent, IceAgentState, IceConfig, IceRole};
pub use candidate::Candidate;
pub use candidate_type::CandidateType;
pub use demux::Demuxed;
