//! Protocol Buffer / gRPC wire types for the placement driver (§6).
//!
//! This crate only holds the generated code from `pd.proto`; the
//! conversions to and from `pd`'s in-process types live in `pd-cluster`.

pub mod v1 {
    tonic::include_proto!("pd.v1");
}

pub use v1::*;

pub use v1::cluster_client::ClusterClient;
pub use v1::cluster_server::ClusterServer;
pub use v1::heartbeat_client::HeartbeatClient;
pub use v1::heartbeat_server::HeartbeatServer;
pub use v1::tso_client::TsoClient;
pub use v1::tso_server::TsoServer;
