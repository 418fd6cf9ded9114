pub mod launch;
pub mod protocol;
pub mod supervisor;

pub use protocol::{PeerStatus, ProtocolError};
pub use supervisor::{run_cluster, ClusterError, ClusterReport};
