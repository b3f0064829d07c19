use std::time::Duration;

use admin_ipc::{AdminRequest, AdminResponse, AdminStatus};
use anyhow::bail;
use orderbook_fetcher::{CycleOutcome, SnapshotFetcher, SourceClient};
use tracing::info;

/// What the admin socket needs to inspect and steer the refresh loop.
pub struct AdminContext<S: SourceClient> {
    pub run_id: String,
    pub fetcher: SnapshotFetcher<S>,
    pub poll_interval: Duration,
}

impl<S: SourceClient> Clone for AdminContext<S> {
    fn clone(&self) -> Self {
        Self {
            run_id: self.run_id.clone(),
            fetcher: self.fetcher.clone(),
            poll_interval: self.poll_interval,
        }
    }
}

impl<S: SourceClient> AdminContext<S> {
    pub async fn respond(&self, req: AdminRequest) -> anyhow::Result<AdminResponse> {
        match req {
            AdminRequest::Status => Ok(AdminResponse::Status(self.status())),
            AdminRequest::Pause => {
                if self.fetcher.stop() {
                    info!("refresh paused via admin socket");
                }
                Ok(AdminResponse::Ack)
            }
            AdminRequest::Resume => {
                if self.fetcher.start(self.poll_interval) {
                    info!("refresh resumed via admin socket");
                }
                Ok(AdminResponse::Ack)
            }
            AdminRequest::Refresh => match self.fetcher.run_cycle().await {
                CycleOutcome::Published(_) => Ok(AdminResponse::Status(self.status())),
                CycleOutcome::Failed { invalidated } => {
                    bail!("refresh cycle failed (invalidated: {invalidated})")
                }
            },
        }
    }

    fn status(&self) -> AdminStatus {
        let snapshot = self.fetcher.current();
        AdminStatus {
            run_id: self.run_id.clone(),
            fetch_state: self.fetcher.state().to_string(),
            refresh_running: self.fetcher.is_running(),
            markets: snapshot.market_count(),
            records: snapshot.record_count(),
            built_at_ms: snapshot.built_at_ms(),
        }
    }
}
