//! Client library for talking to a placement driver leader.
//!
//! This crate is a thin re-export of `pd_cluster::PdClient`: the
//! bundled cluster/heartbeat/tso client built on one shared channel.
//! `pdctl` (this crate's bin) is the admin CLI built on top of it.

pub use pd_cluster::PdClient;
