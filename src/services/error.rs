//! Failure taxonomy for processing a single event

use crate::domain::types::EventTimestamp;
use crate::io::repository::RepositoryError;

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("store {0} not found")]
    StoreNotFound(String),

    #[error("no geofences configured for store {0}")]
    NoGeofencesConfigured(String),

    #[error("event timestamp {event} is older than latest event timestamp {latest}")]
    StaleEvent { event: EventTimestamp, latest: EventTimestamp },

    #[error("repository failure: {0}")]
    Repository(#[from] RepositoryError),

    #[error("order write conflicted {attempts} times")]
    WriteConflict { attempts: u32 },
}

impl ProcessError {
    /// Data-setup errors that will fail again for every event of the store
    pub fn is_configuration(&self) -> bool {
        matches!(self, ProcessError::StoreNotFound(_) | ProcessError::NoGeofencesConfigured(_))
    }
}
