//! tonic adapters: translate wire requests into `PdService` calls and
//! proto responses back, mirroring the teacher's `ClusterServer`
//! pattern of one thin struct per generated service trait.

use crate::convert::*;
use crate::error::pd_error_to_status;
use crate::traits::PdService;
use chrono::Utc;
use pd_proto::v1::cluster_server::Cluster;
use pd_proto::v1::heartbeat_server::Heartbeat;
use pd_proto::v1::tso_server::Tso;
use pd_proto::v1::*;
use pd::types::{RegionId, StoreId};
use std::sync::Arc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status, Streaming};

pub struct ClusterServer<S: PdService> {
    service: Arc<S>,
}

impl<S: PdService> ClusterServer<S> {
    pub fn new(service: Arc<S>) -> Self {
        Self { service }
    }
}

#[tonic::async_trait]
impl<S: PdService + 'static> Cluster for ClusterServer<S> {
    async fn bootstrap(&self, request: Request<BootstrapRequest>) -> Result<Response<BootstrapResponse>, Status> {
        let req = request.into_inner();
        let store = req.store.as_ref().map(store_from_proto).ok_or_else(|| Status::invalid_argument("missing store"))?;
        let region = req.region.as_ref().map(region_from_proto).ok_or_else(|| Status::invalid_argument("missing region"))?;
        self.service.bootstrap(store, region).await.map_err(pd_error_to_status)?;
        Ok(Response::new(BootstrapResponse {}))
    }

    async fn is_bootstrapped(&self, _request: Request<Empty>) -> Result<Response<IsBootstrappedResponse>, Status> {
        let bootstrapped = self.service.is_bootstrapped().await.map_err(pd_error_to_status)?;
        Ok(Response::new(IsBootstrappedResponse { bootstrapped }))
    }

    async fn alloc_id(&self, _request: Request<Empty>) -> Result<Response<AllocIdResponse>, Status> {
        let id = self.service.alloc_id().await.map_err(pd_error_to_status)?;
        Ok(Response::new(AllocIdResponse { id }))
    }

    async fn get_store(&self, request: Request<GetStoreRequest>) -> Result<Response<GetStoreResponse>, Status> {
        let store_id = StoreId(request.into_inner().store_id);
        let store = self.service.get_store(store_id).await.map_err(pd_error_to_status)?;
        Ok(Response::new(GetStoreResponse { store: Some(store_to_proto(&store)) }))
    }

    async fn put_store(&self, request: Request<PutStoreRequest>) -> Result<Response<PutStoreResponse>, Status> {
        let req = request.into_inner();
        let store = req.store.as_ref().map(store_from_proto).ok_or_else(|| Status::invalid_argument("missing store"))?;
        self.service.put_store(store).await.map_err(pd_error_to_status)?;
        Ok(Response::new(PutStoreResponse {}))
    }

    async fn remove_store(&self, request: Request<RemoveStoreRequest>) -> Result<Response<RemoveStoreResponse>, Status> {
        let store_id = StoreId(request.into_inner().store_id);
        self.service.remove_store(store_id).await.map_err(pd_error_to_status)?;
        Ok(Response::new(RemoveStoreResponse {}))
    }

    async fn get_all_stores(&self, _request: Request<Empty>) -> Result<Response<GetAllStoresResponse>, Status> {
        let stores = self.service.get_all_stores().await.map_err(pd_error_to_status)?;
        Ok(Response::new(GetAllStoresResponse { stores: stores.iter().map(store_to_proto).collect() }))
    }

    async fn get_region_by_key(&self, request: Request<GetRegionByKeyRequest>) -> Result<Response<GetRegionResponse>, Status> {
        let key = request.into_inner().key;
        let region = self.service.get_region_by_key(key).await.map_err(pd_error_to_status)?;
        Ok(Response::new(GetRegionResponse { region: Some(region_to_proto(&region)) }))
    }

    async fn get_region_by_id(&self, request: Request<GetRegionByIdRequest>) -> Result<Response<GetRegionResponse>, Status> {
        let region_id = RegionId(request.into_inner().region_id);
        let region = self.service.get_region_by_id(region_id).await.map_err(pd_error_to_status)?;
        Ok(Response::new(GetRegionResponse { region: Some(region_to_proto(&region)) }))
    }

    async fn scan_regions(&self, request: Request<ScanRegionsRequest>) -> Result<Response<ScanRegionsResponse>, Status> {
        let req = request.into_inner();
        let regions = self.service.scan_regions(req.start_key, req.limit).await.map_err(pd_error_to_status)?;
        Ok(Response::new(ScanRegionsResponse { regions: regions.iter().map(region_to_proto).collect() }))
    }

    async fn get_cluster_config(&self, _request: Request<Empty>) -> Result<Response<GetClusterConfigResponse>, Status> {
        let (schedule, replication) = self.service.get_cluster_config().await.map_err(pd_error_to_status)?;
        Ok(Response::new(GetClusterConfigResponse {
            schedule: Some(schedule_config_to_proto(&schedule)),
            replication: Some(replication_config_to_proto(&replication)),
        }))
    }

    async fn put_cluster_config(&self, request: Request<PutClusterConfigRequest>) -> Result<Response<PutClusterConfigResponse>, Status> {
        let req = request.into_inner();
        let schedule = req.schedule.as_ref().map(schedule_config_from_proto).unwrap_or_default();
        let replication = req.replication.as_ref().map(replication_config_from_proto).unwrap_or_default();
        self.service.put_cluster_config(schedule, replication).await.map_err(pd_error_to_status)?;
        Ok(Response::new(PutClusterConfigResponse {}))
    }

    async fn get_operator(&self, request: Request<GetOperatorRequest>) -> Result<Response<GetOperatorResponse>, Status> {
        let region_id = RegionId(request.into_inner().region_id);
        let operator = self.service.get_operator(region_id).await.map_err(pd_error_to_status)?;
        Ok(Response::new(match operator {
            Some(op) => GetOperatorResponse {
                present: true,
                operator: Some(OperatorInfo {
                    region_id: op.region_id.0,
                    kind: op.kind.label().to_string(),
                    current_step: op.current_step as u32,
                    total_steps: op.steps.len() as u32,
                }),
            },
            None => GetOperatorResponse { present: false, operator: None },
        }))
    }

    async fn scatter_region(&self, request: Request<ScatterRegionRequest>) -> Result<Response<ScatterRegionResponse>, Status> {
        let region_id = RegionId(request.into_inner().region_id);
        self.service.scatter_region(region_id, Utc::now()).await.map_err(pd_error_to_status)?;
        Ok(Response::new(ScatterRegionResponse {}))
    }

    async fn report_split(&self, request: Request<ReportSplitRequest>) -> Result<Response<ReportSplitResponse>, Status> {
        let count = request.into_inner().new_region_count;
        let ids = self.service.report_split(count).await.map_err(pd_error_to_status)?;
        Ok(Response::new(ReportSplitResponse { new_region_ids: ids.into_iter().map(|id| id.0).collect() }))
    }
}

pub struct HeartbeatServer<S: PdService> {
    service: Arc<S>,
}

impl<S: PdService> HeartbeatServer<S> {
    pub fn new(service: Arc<S>) -> Self {
        Self { service }
    }
}

#[tonic::async_trait]
impl<S: PdService + 'static> Heartbeat for HeartbeatServer<S> {
    type RegionHeartbeatStream = ReceiverStream<Result<RegionHeartbeatResponse, Status>>;

    /// One stream per store (§4.8): region heartbeats come in, operator
    /// steps go out, at most one pending step per region at a time.
    async fn region_heartbeat(
        &self,
        request: Request<Streaming<RegionHeartbeatRequest>>,
    ) -> Result<Response<Self::RegionHeartbeatStream>, Status> {
        let mut stream = request.into_inner();
        let service = Arc::clone(&self.service);
        let (tx, rx) = tokio::sync::mpsc::channel(128);

        tokio::spawn(async move {
            while let Some(result) = stream.message().await.transpose() {
                let outcome = match result {
                    Ok(req) => match req.region {
                        Some(region) => service
                            .region_heartbeat(region_from_proto(&region), Utc::now())
                            .await
                            .map_err(pd_error_to_status),
                        None => Err(Status::invalid_argument("missing region")),
                    },
                    Err(status) => Err(status),
                };

                let send_result = match outcome {
                    Ok(Some(step)) => tx.send(Ok(RegionHeartbeatResponse { step: Some(operator_step_to_proto(&step)) })).await,
                    Ok(None) => tx.send(Ok(RegionHeartbeatResponse { step: None })).await,
                    Err(status) => tx.send(Err(status)).await,
                };
                if send_result.is_err() {
                    break;
                }
            }
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }

    async fn store_heartbeat(&self, request: Request<StoreHeartbeatRequest>) -> Result<Response<StoreHeartbeatResponse>, Status> {
        let req = request.into_inner();
        let stats = req.stats.as_ref().map(store_stats_from_proto).unwrap_or_default();
        self.service
            .store_heartbeat(StoreId(req.store_id), stats, req.busy, Utc::now())
            .await
            .map_err(pd_error_to_status)?;
        Ok(Response::new(StoreHeartbeatResponse {}))
    }
}

pub struct TsoServer<S: PdService> {
    service: Arc<S>,
}

impl<S: PdService> TsoServer<S> {
    pub fn new(service: Arc<S>) -> Self {
        Self { service }
    }
}

#[tonic::async_trait]
impl<S: PdService + 'static> Tso for TsoServer<S> {
    type TsoStream = ReceiverStream<Result<TsoResponse, Status>>;

    async fn tso(&self, request: Request<Streaming<TsoRequest>>) -> Result<Response<Self::TsoStream>, Status> {
        let mut stream = request.into_inner();
        let service = Arc::clone(&self.service);
        let (tx, rx) = tokio::sync::mpsc::channel(128);

        tokio::spawn(async move {
            while let Some(result) = stream.message().await.transpose() {
                let outcome = match result {
                    Ok(req) => service.alloc_timestamp(req.count.max(1)).await.map_err(pd_error_to_status),
                    Err(status) => Err(status),
                };
                let send_result = match outcome {
                    Ok((first, last)) => {
                        tx.send(Ok(TsoResponse { first: Some(timestamp_to_proto(first)), last: Some(timestamp_to_proto(last)) }))
                            .await
                    }
                    Err(status) => tx.send(Err(status)).await,
                };
                if send_result.is_err() {
                    break;
                }
            }
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }
}

