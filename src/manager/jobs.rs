//! In-process bootstrap job table: a `uuid::Uuid`-keyed table of running
//! and recently-finished jobs, since the manager can run more than one
//! `run_from_bootstrap_transaction` concurrently.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{broadcast, Mutex};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Running,
    Done,
    Error,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BootstrapJob {
    pub id: Uuid,
    pub bootstrap_address: String,
    pub status: JobStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload_transaction_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BootstrapJob {
    fn new(id: Uuid, bootstrap_address: &str) -> Self {
        Self {
            id,
            bootstrap_address: bootstrap_address.to_string(),
            status: JobStatus::Running,
            message: "bootstrap run started".to_string(),
            payload_transaction_id: None,
            error: None,
        }
    }
}

/// Keyed job table: one entry per in-flight or recently-finished
/// `run_from_bootstrap_transaction` call. Terminal jobs (`Done`/`Error`)
/// are evicted the next time the table is touched, rather than kept
/// around indefinitely.
pub struct JobTable {
    jobs: Mutex<HashMap<Uuid, BootstrapJob>>,
    event_tx: broadcast::Sender<BootstrapJob>,
}

impl JobTable {
    pub fn new() -> Arc<Self> {
        let (event_tx, _) = broadcast::channel(64);
        Arc::new(Self { jobs: Mutex::new(HashMap::new()), event_tx })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BootstrapJob> {
        self.event_tx.subscribe()
    }

    pub async fn start(&self, bootstrap_address: &str) -> Uuid {
        let mut jobs = self.jobs.lock().await;
        jobs.retain(|_, job| job.status == JobStatus::Running);

        let id = Uuid::new_v4();
        let job = BootstrapJob::new(id, bootstrap_address);
        jobs.insert(id, job.clone());
        let _ = self.event_tx.send(job);
        id
    }

    pub async fn complete(&self, id: Uuid, payload_transaction_id: &str) {
        let mut jobs = self.jobs.lock().await;
        if let Some(job) = jobs.get_mut(&id) {
            job.status = JobStatus::Done;
            job.payload_transaction_id = Some(payload_transaction_id.to_string());
            job.message = "bootstrap run completed".to_string();
            let _ = self.event_tx.send(job.clone());
        }
    }

    pub async fn fail(&self, id: Uuid, error: &str) {
        let mut jobs = self.jobs.lock().await;
        if let Some(job) = jobs.get_mut(&id) {
            job.status = JobStatus::Error;
            job.error = Some(error.to_string());
            job.message = format!("bootstrap run failed: {error}");
            let _ = self.event_tx.send(job.clone());
        }
    }

    pub async fn status(&self, id: Uuid) -> Option<BootstrapJob> {
        self.jobs.lock().await.get(&id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lifecycle_transitions_to_done() {
        let table = JobTable::new();
        let id = table.start("ADDR1").await;
        assert_eq!(table.status(id).await.unwrap().status, JobStatus::Running);

        table.complete(id, "PAYLOAD1").await;
        let job = table.status(id).await.unwrap();
        assert_eq!(job.status, JobStatus::Done);
        assert_eq!(job.payload_transaction_id.as_deref(), Some("PAYLOAD1"));
    }

    #[tokio::test]
    async fn lifecycle_transitions_to_error() {
        let table = JobTable::new();
        let id = table.start("ADDR2").await;
        table.fail(id, "boom").await;
        let job = table.status(id).await.unwrap();
        assert_eq!(job.status, JobStatus::Error);
        assert_eq!(job.error.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn starting_a_new_job_evicts_finished_ones() {
        let table = JobTable::new();
        let first = table.start("ADDR3").await;
        table.complete(first, "PAYLOAD2").await;

        let second = table.start("ADDR4").await;
        assert!(table.status(first).await.is_none());
        assert!(table.status(second).await.is_some());
    }
}
