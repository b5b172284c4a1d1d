//! Conversions between `pd::PdError` and tonic's `Status`.

use pd::PdError;
use tonic::{Code, Status};

pub fn pd_error_to_status(error: PdError) -> Status {
    match &error {
        PdError::NotBootstrapped => Status::failed_precondition(error.to_string()),
        PdError::AlreadyBootstrapped => Status::already_exists(error.to_string()),
        PdError::NotLeader { .. } => Status::unavailable(error.to_string()),
        PdError::StaleEpoch { .. } => Status::failed_precondition(error.to_string()),
        PdError::StoreTombstoned { .. } => Status::failed_precondition(error.to_string()),
        PdError::StoreNotFound { .. } => Status::not_found(error.to_string()),
        PdError::StoreAddressConflict { .. } => Status::already_exists(error.to_string()),
        PdError::RegionNotFound { .. } => Status::not_found(error.to_string()),
        PdError::RegionOverlap { .. } => Status::aborted(error.to_string()),
        PdError::OperatorDuplicate { .. } => Status::already_exists(error.to_string()),
        PdError::OperatorLimitReached { .. } => Status::resource_exhausted(error.to_string()),
        PdError::DurableStoreUnavailable { .. } => Status::unavailable(error.to_string()),
        PdError::Cancelled => Status::cancelled(error.to_string()),
    }
}

/// Best-effort reverse mapping, used by the client side. `Status` does
/// not carry enough structure to reconstruct the exact `PdError`
/// variant, so this only recovers what the gRPC status code itself
/// implies.
pub fn status_to_pd_error(status: Status) -> PdError {
    match status.code() {
        Code::NotFound => PdError::StoreNotFound { store_id: pd::types::StoreId(0) },
        Code::AlreadyExists => PdError::AlreadyBootstrapped,
        Code::Unavailable => PdError::NotLeader { leader_hint: None },
        Code::ResourceExhausted => PdError::OperatorLimitReached { kind: status.message().to_string() },
        Code::Cancelled => PdError::Cancelled,
        _ => PdError::from_durable_store(status.message(), "rpc"),
    }
}
