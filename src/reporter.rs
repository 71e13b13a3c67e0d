use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::collector::{Collector, HttpCollector};
use crate::config::{EscalationPolicy, ReporterConfig};
use crate::event::{Event, EventKind, Meta, RegistrationReply};
use crate::store::{installation_id, InstallationStore};

/// One queued emission: a kind tag plus zero or one metadata map.
#[derive(Debug)]
struct EmitRequest {
    kind: EventKind,
    meta: Option<Meta>,
}

/// Why one dispatch was abandoned. Never surfaced to emitting callers;
/// the worker logs and drops.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("failed to encode event: {0}")]
    Encode(serde_json::Error),
    #[error("unreadable registration reply: {0}")]
    Decode(serde_json::Error),
    #[error("telemetry store read failed: {0}")]
    Store(anyhow::Error),
    #[error("no installation record")]
    NotRegistered,
    #[error("installation record has no usable InstallationID")]
    MalformedRecord,
    #[error("collector request failed: {0}")]
    Transport(anyhow::Error),
}

#[derive(Debug, Error)]
#[error("telemetry reporter already started")]
pub struct AlreadyStarted;

/// Usage-telemetry reporter. Owns the seams to the installation store and
/// the collector; all I/O runs on background tasks started by [`Reporter::start`].
pub struct Reporter {
    shared: Arc<Shared>,
    /// None when telemetry is disabled, which makes every emission a no-op.
    tx: Option<mpsc::Sender<EmitRequest>>,
    /// Taken by the first `start`, enforcing the single-loop invariant.
    rx_slot: Mutex<Option<mpsc::Receiver<EmitRequest>>>,
}

struct Shared {
    store: Arc<dyn InstallationStore>,
    collector: Arc<dyn Collector>,
    config: ReporterConfig,
}

/// Handle to the reporter's background tasks, owned by the host.
pub struct ReporterHandle {
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl ReporterHandle {
    fn inert() -> Self {
        Self {
            cancel: CancellationToken::new(),
            tasks: Vec::new(),
        }
    }

    /// False for the handle of a disabled reporter.
    pub fn is_active(&self) -> bool {
        !self.tasks.is_empty()
    }

    /// Stops the liveness loop and the dispatch worker. An in-flight
    /// collector POST is allowed to finish; queued events are discarded.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for task in self.tasks {
            if let Err(err) = task.await {
                if err.is_panic() {
                    error!("telemetry task ended abnormally: {err}");
                }
            }
        }
    }
}

impl Reporter {
    /// Builds a reporter posting to `config.endpoint` over HTTP.
    pub fn new(store: Arc<dyn InstallationStore>, config: ReporterConfig) -> Self {
        let collector = Arc::new(HttpCollector::new(config.endpoint.clone()));
        Self::with_collector(store, collector, config)
    }

    /// Builds a reporter with a caller-supplied collector transport.
    pub fn with_collector(
        store: Arc<dyn InstallationStore>,
        collector: Arc<dyn Collector>,
        config: ReporterConfig,
    ) -> Self {
        let (tx, rx) = if config.enabled {
            let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
            (Some(tx), Some(rx))
        } else {
            (None, None)
        };

        Self {
            shared: Arc::new(Shared {
                store,
                collector,
                config,
            }),
            tx,
            rx_slot: Mutex::new(rx),
        }
    }

    pub fn enabled(&self) -> bool {
        self.shared.config.enabled
    }

    /// Starts the dispatch worker and the liveness loop.
    ///
    /// The first liveness tick runs immediately; if the store holds no
    /// installation record it performs the one-time registration, otherwise
    /// it emits a liveness ping. Disabled reporters start nothing and get an
    /// inert handle. A second call fails: the registration guard is only
    /// sound with a single loop.
    pub fn start(&self) -> Result<ReporterHandle, AlreadyStarted> {
        let Some(tx) = self.tx.clone() else {
            return Ok(ReporterHandle::inert());
        };

        let rx = {
            let mut slot = match self.rx_slot.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            slot.take().ok_or(AlreadyStarted)?
        };

        let cancel = CancellationToken::new();

        let worker = {
            let shared = self.shared.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { shared.worker_loop(rx, cancel).await })
        };

        let liveness = {
            let shared = self.shared.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { shared.liveness_loop(tx, cancel).await })
        };

        Ok(ReporterHandle {
            cancel,
            tasks: vec![worker, liveness],
        })
    }

    pub fn normalize(&self) {
        self.emit(EventKind::NormaliseTc, None);
    }

    pub fn delete_tc(&self) {
        self.emit(EventKind::DeleteTc, None);
    }

    pub fn edit_tc(&self) {
        self.emit(EventKind::EditTc, None);
    }

    pub fn test_run(&self, passed: u32, failed: u32) {
        let mut meta = Meta::new();
        meta.insert("Passed-Tests".to_string(), passed.into());
        meta.insert("Failed-Tests".to_string(), failed.into());
        self.emit(EventKind::TestRun, Some(meta));
    }

    pub fn get_apps(&self, apps: u32) {
        let mut meta = Meta::new();
        meta.insert("Apps".to_string(), apps.into());
        self.emit(EventKind::GetApps, Some(meta));
    }

    /// Fire-and-forget: enqueue and return. Backpressure is a drop, not a wait.
    fn emit(&self, kind: EventKind, meta: Option<Meta>) {
        let Some(tx) = &self.tx else {
            return;
        };

        match tx.try_send(EmitRequest { kind, meta }) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!(kind = %kind, "dispatch queue full, dropping event");
            }
            Err(TrySendError::Closed(_)) => {
                debug!(kind = %kind, "reporter stopped, dropping event");
            }
        }
    }
}

impl Shared {
    async fn worker_loop(&self, mut rx: mpsc::Receiver<EmitRequest>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                next = rx.recv() => match next {
                    Some(req) => {
                        if let Err(err) = self.dispatch(req).await {
                            self.report(err);
                        }
                    }
                    None => break,
                },
            }
        }
    }

    /// Builds, addresses, and posts one event.
    async fn dispatch(&self, req: EmitRequest) -> Result<(), DispatchError> {
        let mut event = Event::new(req.kind, req.meta);

        // The id is re-read from the store on every dispatch; the record is
        // the single source of truth.
        let doc = self
            .store
            .find()
            .await
            .map_err(DispatchError::Store)?
            .ok_or(DispatchError::NotRegistered)?;
        let id = installation_id(&doc).ok_or(DispatchError::MalformedRecord)?;
        event.installation_id = id.to_string();

        let body = serde_json::to_vec(&event).map_err(DispatchError::Encode)?;
        self.send(&body).await?;
        Ok(())
    }

    /// POST with bounded retries. Returns the raw response body.
    async fn send(&self, body: &[u8]) -> Result<Vec<u8>, DispatchError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.collector.post(body.to_vec()).await {
                Ok(reply) => return Ok(reply),
                Err(err) if attempt <= self.config.send_retries => {
                    debug!(attempt, "collector POST failed, retrying: {err:#}");
                }
                Err(err) => return Err(DispatchError::Transport(err)),
            }
        }
    }

    async fn liveness_loop(&self, tx: mpsc::Sender<EmitRequest>, cancel: CancellationToken) {
        let mut ticks = interval(self.config.liveness_interval);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticks.tick() => self.resolve_or_register(&tx).await,
            }
        }
    }

    /// One liveness tick: register if the store is empty, ping otherwise.
    async fn resolve_or_register(&self, tx: &mpsc::Sender<EmitRequest>) {
        let count = match self.store.count().await {
            Ok(count) => count,
            Err(err) => {
                self.escalate("failed to count installation records", &err);
                return;
            }
        };

        if count == 0 {
            if let Err(err) = self.register().await {
                self.report(err);
            }
        } else if tx
            .try_send(EmitRequest {
                kind: EventKind::Ping,
                meta: None,
            })
            .is_err()
        {
            warn!("dispatch queue full, skipping liveness ping");
        }
    }

    /// One-time registration: the only event posted with an empty
    /// installation id. Any abandoned attempt is re-tried on the next tick,
    /// since the store still counts zero records.
    async fn register(&self) -> Result<(), DispatchError> {
        let event = Event::new(EventKind::Ping, None);
        let body = serde_json::to_vec(&event).map_err(DispatchError::Encode)?;

        let reply = self.send(&body).await?;
        let reply: RegistrationReply =
            serde_json::from_slice(&reply).map_err(DispatchError::Decode)?;

        if let Err(err) = self.store.insert(&reply.installation_id).await {
            error!("failed to persist installation id: {err:#}");
        }
        Ok(())
    }

    fn report(&self, err: DispatchError) {
        match err {
            // Encoding problems abort silently; nothing was sent.
            DispatchError::Encode(err) => debug!("dropping unencodable event: {err}"),
            DispatchError::Decode(err) => debug!("unreadable registration reply: {err}"),
            DispatchError::Store(err) => error!("failed to read installation record: {err:#}"),
            DispatchError::NotRegistered => error!("no installation record, dropping event"),
            DispatchError::MalformedRecord => error!("InstallationID not present, dropping event"),
            DispatchError::Transport(err) => {
                self.escalate("failed to send request for analytics", &err);
            }
        }
    }

    fn escalate(&self, context: &str, err: &anyhow::Error) {
        match self.config.escalation {
            EscalationPolicy::LogAndDrop => error!("{context}: {err:#}"),
            EscalationPolicy::ExitProcess => {
                error!("{context}: {err:#}");
                std::process::exit(1);
            }
        }
    }
}
