use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use beacon::store::{InstallationDoc, InstallationStore, INSTALLATION_ID_FIELD};
use beacon::{Reporter, ReporterConfig};
use tokio::sync::Mutex;

/// Demo store: the installation record lives for one process run only, so
/// every launch re-registers.
#[derive(Default)]
struct MemoryStore {
    record: Mutex<Option<InstallationDoc>>,
}

#[async_trait]
impl InstallationStore for MemoryStore {
    async fn count(&self) -> Result<u64> {
        Ok(u64::from(self.record.lock().await.is_some()))
    }

    async fn find(&self) -> Result<Option<InstallationDoc>> {
        Ok(self.record.lock().await.clone())
    }

    async fn insert(&self, id: &str) -> Result<()> {
        let mut doc = InstallationDoc::new();
        doc.insert(INSTALLATION_ID_FIELD.to_string(), id.into());
        *self.record.lock().await = Some(doc);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    tracing::info!("Telemetry demo starting");

    let store = Arc::new(MemoryStore::default());
    let config = ReporterConfig {
        liveness_interval: Duration::from_secs(5),
        ..ReporterConfig::default()
    };

    let reporter = Reporter::new(store, config);
    let handle = reporter.start()?;

    // A few representative emissions; all fire-and-forget.
    reporter.test_run(3, 1);
    reporter.get_apps(2);
    reporter.normalize();

    tracing::info!("Reporter running, Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;

    handle.shutdown().await;
    tracing::info!("Reporter stopped");
    Ok(())
}
