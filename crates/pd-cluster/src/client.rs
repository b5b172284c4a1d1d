//! Thin client wrapper bundling the three generated tonic clients
//! behind one connection, for use by `pd-server` (leader forwarding)
//! and `pd-client`.

use crate::convert::*;
use crate::error::status_to_pd_error;
use pd::config::{ReplicationConfig, ScheduleConfig};
use pd::operator::OperatorStep;
use pd::region::Region;
use pd::store::Store;
use pd::types::{RegionId, StoreId, Timestamp};
use pd::PdError;
use pd_proto::v1::cluster_client::ClusterClient as TonicClusterClient;
use pd_proto::v1::heartbeat_client::HeartbeatClient as TonicHeartbeatClient;
use pd_proto::v1::tso_client::TsoClient as TonicTsoClient;
use pd_proto::v1::*;
use tonic::transport::{Channel, Endpoint};
use tonic::Request;

#[derive(Clone)]
pub struct PdClient {
    cluster: TonicClusterClient<Channel>,
    heartbeat: TonicHeartbeatClient<Channel>,
    tso: TonicTsoClient<Channel>,
}

impl PdClient {
    pub async fn connect<D>(dst: D) -> Result<Self, PdError>
    where
        D: TryInto<Endpoint>,
        D::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let endpoint = dst.try_into().map_err(|e: D::Error| PdError::from_durable_store(e.into(), "connect"))?;
        let channel = endpoint.connect().await.map_err(|e| PdError::from_durable_store(e, "connect"))?;
        Ok(Self {
            cluster: TonicClusterClient::new(channel.clone()),
            heartbeat: TonicHeartbeatClient::new(channel.clone()),
            tso: TonicTsoClient::new(channel),
        })
    }

    pub async fn bootstrap(&mut self, store: Store, region: Region) -> Result<(), PdError> {
        let request = Request::new(BootstrapRequest { store: Some(store_to_proto(&store)), region: Some(region_to_proto(&region)) });
        self.cluster.bootstrap(request).await.map_err(status_to_pd_error)?;
        Ok(())
    }

    pub async fn is_bootstrapped(&mut self) -> Result<bool, PdError> {
        let response = self.cluster.is_bootstrapped(Request::new(Empty {})).await.map_err(status_to_pd_error)?;
        Ok(response.into_inner().bootstrapped)
    }

    pub async fn alloc_id(&mut self) -> Result<u64, PdError> {
        let response = self.cluster.alloc_id(Request::new(Empty {})).await.map_err(status_to_pd_error)?;
        Ok(response.into_inner().id)
    }

    pub async fn get_store(&mut self, store_id: StoreId) -> Result<Store, PdError> {
        let response = self
            .cluster
            .get_store(Request::new(GetStoreRequest { store_id: store_id.0 }))
            .await
            .map_err(status_to_pd_error)?;
        let store = response.into_inner().store.ok_or(PdError::StoreNotFound { store_id })?;
        Ok(store_from_proto(&store))
    }

    pub async fn put_store(&mut self, store: Store) -> Result<(), PdError> {
        self.cluster
            .put_store(Request::new(PutStoreRequest { store: Some(store_to_proto(&store)) }))
            .await
            .map_err(status_to_pd_error)?;
        Ok(())
    }

    pub async fn remove_store(&mut self, store_id: StoreId) -> Result<(), PdError> {
        self.cluster
            .remove_store(Request::new(RemoveStoreRequest { store_id: store_id.0 }))
            .await
            .map_err(status_to_pd_error)?;
        Ok(())
    }

    pub async fn get_all_stores(&mut self) -> Result<Vec<Store>, PdError> {
        let response = self.cluster.get_all_stores(Request::new(Empty {})).await.map_err(status_to_pd_error)?;
        Ok(response.into_inner().stores.iter().map(store_from_proto).collect())
    }

    pub async fn get_region_by_id(&mut self, region_id: RegionId) -> Result<Region, PdError> {
        let response = self
            .cluster
            .get_region_by_id(Request::new(GetRegionByIdRequest { region_id: region_id.0 }))
            .await
            .map_err(status_to_pd_error)?;
        let region = response.into_inner().region.ok_or(PdError::RegionNotFound { region_id })?;
        Ok(region_from_proto(&region))
    }

    pub async fn get_region_by_key(&mut self, key: Vec<u8>) -> Result<Region, PdError> {
        let response = self
            .cluster
            .get_region_by_key(Request::new(GetRegionByKeyRequest { key }))
            .await
            .map_err(status_to_pd_error)?;
        let region = response.into_inner().region.ok_or(PdError::RegionNotFound { region_id: RegionId(0) })?;
        Ok(region_from_proto(&region))
    }

    pub async fn get_cluster_config(&mut self) -> Result<(ScheduleConfig, ReplicationConfig), PdError> {
        let response = self.cluster.get_cluster_config(Request::new(Empty {})).await.map_err(status_to_pd_error)?;
        let inner = response.into_inner();
        let schedule = inner.schedule.as_ref().map(schedule_config_from_proto).unwrap_or_default();
        let replication = inner.replication.as_ref().map(replication_config_from_proto).unwrap_or_default();
        Ok((schedule, replication))
    }

    pub async fn put_cluster_config(&mut self, schedule: ScheduleConfig, replication: ReplicationConfig) -> Result<(), PdError> {
        self.cluster
            .put_cluster_config(Request::new(PutClusterConfigRequest {
                schedule: Some(schedule_config_to_proto(&schedule)),
                replication: Some(replication_config_to_proto(&replication)),
            }))
            .await
            .map_err(status_to_pd_error)?;
        Ok(())
    }

    pub async fn store_heartbeat(&mut self, store_id: StoreId, stats: pd::store::StoreStats, busy: bool) -> Result<(), PdError> {
        self.heartbeat
            .store_heartbeat(Request::new(StoreHeartbeatRequest {
                store_id: store_id.0,
                stats: Some(store_stats_to_proto(&stats)),
                busy,
            }))
            .await
            .map_err(status_to_pd_error)?;
        Ok(())
    }

    pub async fn alloc_timestamp(&mut self, count: u32) -> Result<(Timestamp, Timestamp), PdError> {
        let (tx, rx) = tokio::sync::mpsc::channel(1);
        tx.send(TsoRequest { count }).await.ok();
        drop(tx);
        let request_stream = tokio_stream::wrappers::ReceiverStream::new(rx);

        let mut response_stream = self.tso.tso(Request::new(request_stream)).await.map_err(status_to_pd_error)?.into_inner();
        let response = tokio_stream::StreamExt::next(&mut response_stream)
            .await
            .ok_or_else(|| PdError::from_durable_store("stream closed", "alloc_timestamp"))?
            .map_err(status_to_pd_error)?;

        let first = response.first.map(|t| Timestamp { physical_ms: t.physical_ms, logical: t.logical });
        let last = response.last.map(|t| Timestamp { physical_ms: t.physical_ms, logical: t.logical });
        Ok((
            first.ok_or_else(|| PdError::from_durable_store("missing first timestamp", "alloc_timestamp"))?,
            last.ok_or_else(|| PdError::from_durable_store("missing last timestamp", "alloc_timestamp"))?,
        ))
    }
}

/// Decodes a region heartbeat response step back into `pd`'s operator
/// model, for callers (the store side) that must act on it.
pub fn operator_step_from_response(response: RegionHeartbeatResponse) -> Option<OperatorStep> {
    use pd_proto::v1::region_heartbeat_response::Step;
    use pd::types::PeerId;
    match response.step? {
        Step::AddPeer(step) => {
            let peer = step.peer?;
            Some(OperatorStep::AddPeer { peer: PeerId(peer.id), store_id: StoreId(peer.store_id) })
        }
        Step::RemovePeer(step) => {
            let peer = step.peer?;
            Some(OperatorStep::RemovePeer { peer: PeerId(peer.id) })
        }
        Step::TransferLeader(step) => {
            Some(OperatorStep::TransferLeader { from: PeerId(step.from_peer_id), to: PeerId(step.to_peer_id) })
        }
        Step::BatchSplit(step) => {
            Some(OperatorStep::BatchSplit { new_region_ids: step.new_region_ids.into_iter().map(RegionId).collect() })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pd::types::PeerId;

    #[test]
    fn decodes_transfer_leader_step() {
        let response = RegionHeartbeatResponse {
            step: Some(pd_proto::v1::region_heartbeat_response::Step::TransferLeader(TransferLeaderStep {
                from_peer_id: 1,
                to_peer_id: 2,
            })),
        };
        let step = operator_step_from_response(response).unwrap();
        assert_eq!(step, OperatorStep::TransferLeader { from: PeerId(1), to: PeerId(2) });
    }

    #[test]
    fn decodes_empty_step_as_none() {
        let response = RegionHeartbeatResponse { step: None };
        assert!(operator_step_from_response(response).is_none());
    }
}
