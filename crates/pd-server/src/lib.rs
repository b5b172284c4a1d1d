//! Wires `pd::Cluster` into a running gRPC process: the three services
//! from `pd-cluster` behind one `tonic::transport::Server`, plus the
//! background loops that keep the coordinator and TSO ticking.

use chrono::Utc;
use pd::config::{ReplicationConfig, ScheduleConfig};
use pd::metadata_store::InMemoryMetadataStore;
use pd::tso::SystemClock;
use pd::Cluster;
use pd_cluster::{ClusterServer, HeartbeatServer, PdServiceImpl, TsoServer};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

/// How often the coordinator re-evaluates its schedulers and sweeps
/// timed-out operators, and the TSO refreshes its physical clock.
const TICK_INTERVAL: Duration = Duration::from_millis(100);

/// Builds a single-node cluster (in-memory metadata store, system
/// clock) and immediately activates it as leader. A real deployment
/// wires this to an actual leader-election result instead; the open
/// question of "how leadership is won" is out of scope (§9).
pub fn single_node_cluster(cluster_id: u64, schedule_config: ScheduleConfig, replication_config: ReplicationConfig) -> Result<Arc<Cluster>, pd::PdError> {
    let metadata_store = Arc::new(InMemoryMetadataStore::new());
    let clock = Arc::new(SystemClock);
    let cluster = Arc::new(Cluster::new(cluster_id, metadata_store, clock, schedule_config, replication_config));
    cluster.activate_as_leader(Utc::now())?;
    Ok(cluster)
}

/// Spawns the periodic coordinator tick and background-job sweep.
pub fn spawn_background_loops(cluster: Arc<Cluster>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(TICK_INTERVAL);
        loop {
            ticker.tick().await;
            let now = Utc::now();
            if let Err(err) = cluster.tick_schedulers(now) {
                tracing::warn!(error = %err, "scheduler tick skipped");
            }
            if let Err(err) = cluster.run_background_jobs(now) {
                tracing::warn!(error = %err, "background job sweep skipped");
            }
        }
    });
}

/// Runs the gRPC server with the cluster/heartbeat/tso services on
/// the given address until the process is killed.
pub async fn serve(addr: SocketAddr, cluster: Arc<Cluster>) -> Result<(), Box<dyn std::error::Error>> {
    let service = Arc::new(PdServiceImpl::new(cluster));
    tonic::transport::Server::builder()
        .add_service(pd_proto::ClusterServer::new(ClusterServer::new(service.clone())))
        .add_service(pd_proto::HeartbeatServer::new(HeartbeatServer::new(service.clone())))
        .add_service(pd_proto::TsoServer::new(TsoServer::new(service)))
        .serve(addr)
        .await?;
    Ok(())
}
