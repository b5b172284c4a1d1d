//! gRPC plumbing around `pd`: the region-heartbeat dispatch loop, the
//! timestamp oracle stream, and the cluster admin surface (§4.8, §6).

pub mod client;
pub mod convert;
pub mod error;
pub mod server;
pub mod service;
pub mod traits;

pub use client::PdClient;
pub use error::{pd_error_to_status, status_to_pd_error};
pub use server::{ClusterServer, HeartbeatServer, TsoServer};
pub use service::PdServiceImpl;
pub use traits::PdService;
