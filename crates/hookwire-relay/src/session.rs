//! Tunnel session: live stream subscription with reconnect and local replay

use hookwire_proto::{is_valid_slug, CaptureRecord, Endpoint, Headers, LiveEvent};
use reqwest::header::{HeaderName, HeaderValue};
use std::fmt;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::api::{ApiClient, CreateEndpoint};
use crate::error::RelayError;
use crate::replay::{ReplayOutcome, Replayer};
use crate::stream::{EventStream, DEFAULT_HEADER_TIMEOUT, DEFAULT_IDLE_TIMEOUT};
use crate::target::LocalTarget;

const EPHEMERAL_DELETE_TIMEOUT: Duration = Duration::from_secs(5);

/// Tunnel session configuration
#[derive(Debug, Clone)]
pub struct TunnelConfig {
    pub slug: String,
    pub target: Option<LocalTarget>,
    pub extra_headers: Headers,
    pub ephemeral: bool,
    pub listen_only: bool,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// A connection that lasted this long resets the backoff
    pub stable_after: Duration,
    pub header_timeout: Duration,
    pub idle_timeout: Duration,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            slug: String::new(),
            target: None,
            extra_headers: Headers::new(),
            ephemeral: false,
            listen_only: false,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            stable_after: Duration::from_secs(30),
            header_timeout: DEFAULT_HEADER_TIMEOUT,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }
}

impl TunnelConfig {
    pub fn builder() -> TunnelConfigBuilder {
        TunnelConfigBuilder::default()
    }
}

/// Builder for TunnelConfig
#[derive(Default)]
pub struct TunnelConfigBuilder {
    config: TunnelConfig,
    target: Option<String>,
    headers: Vec<String>,
}

impl TunnelConfigBuilder {
    pub fn slug(mut self, slug: impl Into<String>) -> Self {
        self.config.slug = slug.into();
        self
    }

    /// Port, `host:port` or `http(s)://` URL
    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Extra header in `Name: value` form, applied after filtering
    pub fn header(mut self, line: impl Into<String>) -> Self {
        self.headers.push(line.into());
        self
    }

    pub fn ephemeral(mut self, ephemeral: bool) -> Self {
        self.config.ephemeral = ephemeral;
        self
    }

    pub fn listen_only(mut self, listen_only: bool) -> Self {
        self.config.listen_only = listen_only;
        self
    }

    pub fn backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.config.initial_backoff = initial;
        self.config.max_backoff = max;
        self
    }

    pub fn stable_after(mut self, stable_after: Duration) -> Self {
        self.config.stable_after = stable_after;
        self
    }

    pub fn header_timeout(mut self, header_timeout: Duration) -> Self {
        self.config.header_timeout = header_timeout;
        self
    }

    pub fn idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.config.idle_timeout = idle_timeout;
        self
    }

    pub fn build(self) -> Result<TunnelConfig, RelayError> {
        let mut config = self.config;

        if !is_valid_slug(&config.slug) {
            return Err(RelayError::InvalidConfig(format!(
                "invalid endpoint slug '{}'",
                config.slug
            )));
        }

        config.target = match self.target {
            Some(target) => Some(LocalTarget::parse(&target)?),
            None if config.listen_only => None,
            None => {
                return Err(RelayError::InvalidConfig(
                    "a local target is required unless listening only".to_string(),
                ))
            }
        };

        for line in &self.headers {
            let (name, value) = parse_header(line)?;
            config.extra_headers.append(name, value);
        }

        if config.initial_backoff.is_zero() || config.max_backoff < config.initial_backoff {
            return Err(RelayError::InvalidConfig(
                "backoff must start above zero and not exceed its cap".to_string(),
            ));
        }

        Ok(config)
    }
}

/// Parse a `Name: value` header line
pub fn parse_header(line: &str) -> Result<(String, String), RelayError> {
    let invalid = || {
        RelayError::InvalidConfig(format!("invalid header '{}', expected 'Name: value'", line))
    };

    let (name, value) = line.split_once(':').ok_or_else(invalid)?;
    let name = name.trim();
    let value = value.trim();

    HeaderName::from_bytes(name.as_bytes()).map_err(|_| invalid())?;
    HeaderValue::from_str(value).map_err(|_| invalid())?;

    Ok((name.to_string(), value.to_string()))
}

/// Connection state of a tunnel session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Streaming,
    Disconnected,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Streaming => "streaming",
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Exponential reconnect delay with a cap
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: initial,
        }
    }

    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = std::cmp::min(self.current * 2, self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

/// What a session reports to its owner
#[derive(Debug, Clone, PartialEq)]
pub enum RelayEvent {
    /// A request arrived on the stream
    Received(CaptureRecord),
    /// Replay finished; emitted in arrival order
    Replayed(ReplayOutcome),
}

enum StreamEnd {
    Cancelled,
    ClosedByServer,
}

pub struct TunnelSession {
    config: TunnelConfig,
    api: ApiClient,
    replayer: Option<Replayer>,
    state_tx: watch::Sender<ConnectionState>,
    events_tx: mpsc::UnboundedSender<RelayEvent>,
}

impl TunnelSession {
    pub fn new(
        config: TunnelConfig,
        api: ApiClient,
    ) -> Result<
        (
            Self,
            watch::Receiver<ConnectionState>,
            mpsc::UnboundedReceiver<RelayEvent>,
        ),
        RelayError,
    > {
        let replayer = match (&config.target, config.listen_only) {
            (Some(target), false) => Some(Replayer::new(
                target.clone(),
                config.extra_headers.clone(),
            )?),
            _ => None,
        };

        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        Ok((
            Self {
                config,
                api,
                replayer,
                state_tx,
                events_tx,
            },
            state_rx,
            events_rx,
        ))
    }

    pub fn config(&self) -> &TunnelConfig {
        &self.config
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            debug!(slug = %self.config.slug, "Tunnel {} -> {}", previous, state);
        }
    }

    /// Run until cancelled or until the stream reports a condition that
    /// reconnecting cannot fix. Returns the fatal error in the latter case.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), RelayError> {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let reporter = tokio::spawn(report_in_order(queue_rx, self.events_tx.clone()));
        let mut replays = JoinSet::new();

        let result = self.connect_loop(&cancel, &mut replays, &queue_tx).await;

        replays.abort_all();
        while replays.join_next().await.is_some() {}
        drop(queue_tx);
        if let Err(err) = reporter.await {
            warn!(error = %err, "Replay reporter ended abnormally");
        }

        if self.config.ephemeral && !matches!(result, Err(RelayError::EndpointDeleted(_))) {
            self.delete_ephemeral_endpoint().await;
        }

        self.set_state(ConnectionState::Closed);
        result
    }

    async fn connect_loop(
        &self,
        cancel: &CancellationToken,
        replays: &mut JoinSet<()>,
        queue: &mpsc::UnboundedSender<oneshot::Receiver<ReplayOutcome>>,
    ) -> Result<(), RelayError> {
        let slug = &self.config.slug;
        let mut backoff = Backoff::new(self.config.initial_backoff, self.config.max_backoff);
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            self.set_state(ConnectionState::Connecting);
            debug!(slug = %slug, attempt, "Opening event stream");

            let opened = tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                opened = self.api.open_stream(
                    slug,
                    self.config.header_timeout,
                    self.config.idle_timeout,
                ) => opened,
            };

            let err = match opened {
                Ok(mut stream) => {
                    self.set_state(ConnectionState::Streaming);
                    info!(slug = %slug, "Streaming requests");
                    let connected_at = Instant::now();

                    let ended = self.pump(&mut stream, cancel, replays, queue).await;
                    if connected_at.elapsed() >= self.config.stable_after {
                        backoff.reset();
                    }

                    match ended {
                        Ok(StreamEnd::Cancelled) => return Ok(()),
                        Ok(StreamEnd::ClosedByServer) => {
                            RelayError::Stream("closed by server".to_string())
                        }
                        Err(err) => err,
                    }
                }
                Err(err) => RelayError::Api(err),
            };

            if err.is_fatal() {
                error!(slug = %slug, error = %err, "Tunnel stopped");
                return Err(err);
            }

            self.set_state(ConnectionState::Disconnected);
            let delay = backoff.next_delay();
            warn!(
                slug = %slug,
                error = %err,
                "Stream lost, reconnecting in {}ms",
                delay.as_millis()
            );

            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn pump(
        &self,
        stream: &mut EventStream,
        cancel: &CancellationToken,
        replays: &mut JoinSet<()>,
        queue: &mpsc::UnboundedSender<oneshot::Receiver<ReplayOutcome>>,
    ) -> Result<StreamEnd, RelayError> {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(StreamEnd::Cancelled),
                Some(joined) = replays.join_next(), if !replays.is_empty() => {
                    if let Err(err) = joined {
                        if err.is_panic() {
                            error!("Replay task panicked");
                        }
                    }
                }
                event = stream.next_event() => match event? {
                    None => return Ok(StreamEnd::ClosedByServer),
                    Some(LiveEvent::Request(record)) => self.dispatch(record, replays, queue),
                    Some(LiveEvent::Connected(endpoint)) => {
                        debug!(slug = %endpoint.slug, "Stream acknowledged");
                    }
                    Some(LiveEvent::EndpointDeleted { slug }) => {
                        return Err(RelayError::EndpointDeleted(slug));
                    }
                    Some(LiveEvent::Comment) => {}
                },
            }
        }
    }

    fn dispatch(
        &self,
        record: CaptureRecord,
        replays: &mut JoinSet<()>,
        queue: &mpsc::UnboundedSender<oneshot::Receiver<ReplayOutcome>>,
    ) {
        info!(
            id = %record.id,
            size = record.size(),
            "{} {}",
            record.method,
            record.path
        );

        if let Some(replayer) = &self.replayer {
            let (done_tx, done_rx) = oneshot::channel();
            let _ = queue.send(done_rx);
            let replayer = replayer.clone();
            let record = record.clone();
            replays.spawn(async move {
                let outcome = replayer.replay(&record).await;
                let _ = done_tx.send(outcome);
            });
        }

        let _ = self.events_tx.send(RelayEvent::Received(record));
    }

    async fn delete_ephemeral_endpoint(&self) {
        let slug = &self.config.slug;
        match tokio::time::timeout(EPHEMERAL_DELETE_TIMEOUT, self.api.delete_endpoint(slug)).await
        {
            Ok(Ok(())) => info!(slug = %slug, "Deleted ephemeral endpoint"),
            Ok(Err(err)) => warn!(slug = %slug, error = %err, "Failed to delete ephemeral endpoint"),
            Err(_) => warn!(slug = %slug, "Timed out deleting ephemeral endpoint"),
        }
    }
}

/// Forward replay outcomes in the order their requests arrived
async fn report_in_order(
    mut queue: mpsc::UnboundedReceiver<oneshot::Receiver<ReplayOutcome>>,
    events: mpsc::UnboundedSender<RelayEvent>,
) {
    while let Some(pending) = queue.recv().await {
        // Dropped sender means the replay was aborted
        let Ok(outcome) = pending.await else {
            continue;
        };

        match (&outcome.status, &outcome.error) {
            (Some(status), _) => info!(
                id = %outcome.request_id,
                latency_ms = outcome.latency.as_millis() as u64,
                "{} {} -> {}",
                outcome.method,
                outcome.path,
                status
            ),
            (None, error) => warn!(
                id = %outcome.request_id,
                error = error.as_deref().unwrap_or("unknown"),
                "{} {} failed",
                outcome.method,
                outcome.path
            ),
        }

        let _ = events.send(RelayEvent::Replayed(outcome));
    }
}

/// Generated name for endpoints created by a tunnel
pub fn ephemeral_name() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("tunnel-{}", &id[..6])
}

/// Create a fresh endpoint for a tunnel started without a slug
pub async fn create_tunnel_endpoint(
    api: &ApiClient,
    ephemeral: bool,
) -> Result<Endpoint, RelayError> {
    let request = CreateEndpoint {
        name: Some(ephemeral_name()),
        ephemeral,
        ..CreateEndpoint::default()
    };
    Ok(api.create_endpoint(&request).await?)
}
