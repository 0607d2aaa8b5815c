//! `tether simulate`: a scripted watch transport driving the manager.
//!
//! Every stream the manager exposes is observed from its own task and
//! recorded in arrival order, then rendered once the run is over.

use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::{StreamExt, stream::Stream};
use secrecy::SecretString;
use serde::Serialize;
use tabled::Tabled;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use tether_config::SimulatorSettings;
use tether_core::{
    AuthEvent, ConnectionEvent, ConnectionManager, ConnectionState, CurrentToken, DeviceHandle,
    Metadata, MetadataFeed, SessionContext, SessionScope,
};

use crate::cli::{GlobalOpts, OutputFormat, SimulateArgs};
use crate::error::CliError;
use crate::output;

// ── Recorded events ─────────────────────────────────────────────────

/// One value seen by an observer.
#[derive(Debug, Clone, Serialize)]
pub struct ObservedEvent {
    pub seq: usize,
    pub at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub channel: &'static str,
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation: Option<u64>,
}

#[derive(Tabled)]
struct EventRow {
    #[tabled(rename = "#")]
    seq: usize,
    #[tabled(rename = "Time")]
    elapsed: String,
    #[tabled(rename = "Channel")]
    channel: &'static str,
    #[tabled(rename = "Value")]
    value: String,
    #[tabled(rename = "Gen")]
    generation: String,
}

impl From<&ObservedEvent> for EventRow {
    fn from(e: &ObservedEvent) -> Self {
        Self {
            seq: e.seq,
            elapsed: format!("+{}ms", e.elapsed_ms),
            channel: e.channel,
            value: e.value.clone(),
            generation: e.generation.map_or_else(String::new, |g| g.to_string()),
        }
    }
}

#[derive(Clone)]
struct Recorder {
    tx: mpsc::UnboundedSender<ObservedEvent>,
    started: Instant,
}

impl Recorder {
    fn record(&self, channel: &'static str, value: impl Into<String>, generation: Option<u64>) {
        let elapsed_ms = u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let _ = self.tx.send(ObservedEvent {
            seq: 0,
            at: Utc::now(),
            elapsed_ms,
            channel,
            value: value.into(),
            generation,
        });
    }
}

// ── Observers ───────────────────────────────────────────────────────

fn observe<S, T>(
    stream: S,
    recorder: Recorder,
    channel: &'static str,
    describe: impl Fn(T) -> (String, Option<u64>) + Send + 'static,
) -> JoinHandle<()>
where
    S: Stream<Item = T> + Send + 'static,
    T: Send + 'static,
{
    tokio::spawn(async move {
        let mut stream = pin!(stream);
        while let Some(item) = stream.next().await {
            let (value, generation) = describe(item);
            recorder.record(channel, value, generation);
        }
        debug!(channel, "observer finished");
    })
}

fn describe_connection(state: &ConnectionState) -> String {
    match state.connected_handle() {
        Some(handle) => format!("connected {}", handle.id()),
        None => state.label().to_owned(),
    }
}

fn describe_metadata(metadata: &Metadata) -> String {
    let capabilities: Vec<&str> = metadata.capabilities.iter().map(String::as_str).collect();
    format!(
        "{} {} [{}]",
        metadata.name,
        metadata.firmware_version,
        capabilities.join(", ")
    )
}

fn describe_token(token: &CurrentToken) -> String {
    if token.is_logged_in() {
        "logged_in".into()
    } else {
        "logged_out".into()
    }
}

fn describe_scope(scope: Option<&SessionScope>) -> (String, Option<u64>) {
    match scope {
        Some(scope) => (
            format!("opened for {}", scope.origin().id()),
            Some(scope.generation()),
        ),
        None => ("closed".into(), None),
    }
}

// ── Simulated transport ─────────────────────────────────────────────

fn simulated_metadata(sim: &SimulatorSettings, cycle: u32) -> Metadata {
    sim.capabilities
        .iter()
        .fold(
            Metadata::new(sim.device_name.clone(), sim.firmware.clone()),
            |meta, capability| meta.with_capability(capability.clone()),
        )
        .with_serial(format!("SIM{cycle:04}"))
        .with_hardware_platform("simulated")
}

/// Periodic session-bound work, stopped by the scope's cancellation.
async fn heartbeat(ctx: SessionContext, tick: Duration, recorder: Recorder) {
    let mut interval = tokio::time::interval(tick);
    interval.tick().await;

    let mut beats = 0_u32;
    while !ctx.is_cancelled() {
        interval.tick().await;
        beats += 1;
        recorder.record(
            "heartbeat",
            format!("{} beat {beats}", ctx.device()),
            Some(ctx.generation()),
        );
    }
}

async fn drive(
    manager: &ConnectionManager,
    sim: &SimulatorSettings,
    args: &SimulateArgs,
    recorder: &Recorder,
) -> Result<(), CliError> {
    let hold = Duration::from_millis(args.hold_ms.unwrap_or(sim.hold_ms));
    let tick = Duration::from_millis(sim.session_tick_ms);
    let metadata_delay = Duration::from_millis(sim.metadata_delay_ms);

    if !args.no_login {
        let token = format!("sim-{}", Utc::now().timestamp());
        manager.report_auth_event(AuthEvent::LoggedIn(SecretString::from(token)));
    }

    for cycle in 1..=args.cycles {
        let feed = MetadataFeed::new();
        let handle = DeviceHandle::new(format!("sim-{cycle}"), feed.clone());

        if !args.skip_connecting {
            manager.report_connection_event(ConnectionEvent::Connecting)?;
            tokio::task::yield_now().await;
        }
        manager.report_connection_event(ConnectionEvent::ConnectedWith(handle))?;
        info!(cycle, "simulated device connected");

        // The handshake delivers metadata some time after the link is up.
        let metadata = simulated_metadata(sim, cycle);
        tokio::spawn(async move {
            tokio::time::sleep(metadata_delay).await;
            feed.publish(metadata);
        });

        let scope = manager.wait_for_session().await?;
        let beats = recorder.clone();
        let _heartbeat = manager.spawn_in_session(move |ctx| heartbeat(ctx, tick, beats))?;
        debug!(generation = scope.generation(), "heartbeat started");

        tokio::time::sleep(hold).await;
        manager.report_connection_event(ConnectionEvent::Disconnected)?;
        info!(cycle, "simulated device disconnected");

        if let Err(err) = manager.spawn_in_session(|_| async {}) {
            recorder.record(
                "session",
                format!("spawn rejected: {err}"),
                Some(scope.generation()),
            );
        }
        tokio::task::yield_now().await;
    }

    if !args.no_login {
        manager.report_auth_event(AuthEvent::LoggedOut);
    }
    Ok(())
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(args: &SimulateArgs, global: &GlobalOpts) -> Result<(), CliError> {
    if args.cycles == 0 {
        return Err(CliError::Validation {
            field: "cycles".into(),
            reason: "must be at least 1".into(),
        });
    }

    let cfg = tether_config::load_config(global.config.as_deref())?;
    let mut manager_config = cfg.to_manager_config();
    manager_config.enforce_canonical_transitions |= args.strict;

    let manager = ConnectionManager::start(manager_config)?;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let recorder = Recorder {
        tx,
        started: Instant::now(),
    };

    let observers = [
        observe(
            manager.observe_connection_state(),
            recorder.clone(),
            "connection",
            |state: ConnectionState| (describe_connection(&state), None),
        ),
        observe(
            manager.observe_connected_metadata(),
            recorder.clone(),
            "metadata",
            |metadata: Arc<Metadata>| (describe_metadata(&metadata), None),
        ),
        observe(
            manager.observe_auth_token(),
            recorder.clone(),
            "token",
            |token: CurrentToken| (describe_token(&token), None),
        ),
        observe(
            manager.observe_session_scope(),
            recorder.clone(),
            "scope",
            |scope: Option<SessionScope>| describe_scope(scope.as_ref()),
        ),
    ];
    tokio::task::yield_now().await;

    let result = drive(&manager, &cfg.simulator, args, &recorder).await;

    // Streams end once the last manager handle is gone.
    manager.shutdown().await;
    drop(manager);
    for observer in observers {
        if let Err(e) = observer.await {
            warn!(error = %e, "observer task failed");
        }
    }
    drop(recorder);
    rx.close();

    result?;

    let mut events = Vec::new();
    while let Some(mut event) = rx.recv().await {
        event.seq = events.len() + 1;
        events.push(event);
    }

    let out = output::render_list(global.output, &events, |e| EventRow::from(e), |e| {
        format!("{}\t{}\t{}", e.elapsed_ms, e.channel, e.value)
    })?;
    output::print_output(&out, global.quiet);

    if matches!(global.output, OutputFormat::Table) && !global.quiet {
        let color = output::should_color(global.color);
        let count = |channel: &str| events.iter().filter(|e| e.channel == channel).count();
        let sessions = events
            .iter()
            .filter(|e| e.channel == "scope" && e.generation.is_some())
            .count();
        println!(
            "{} {}",
            output::highlight(&format!("{} cycles", args.cycles), color),
            output::muted(
                &format!(
                    "{sessions} sessions, {} metadata, {} heartbeats",
                    count("metadata"),
                    count("heartbeat")
                ),
                color,
            ),
        );
    }
    Ok(())
}
