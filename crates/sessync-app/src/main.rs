//! Headless session sync client.
//!
//! Loads configuration, connects to the configured server, requests a full
//! snapshot and keeps two demo records in sync until interrupted, the server
//! ends the session, or `--run-for` elapses.
//!
//! Run with: `cargo run -p sessync-app -- --endpoint 192.168.1.20:5556`

mod platform;
mod tick_loop;

use std::cell::{Cell, RefCell};
use std::net::SocketAddr;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use clap::Parser;
use sessync_config::{
    CliArgs, Config, ConfigError, Preferences, ServerAddressError, ServerSettings, parse_endpoint,
};
use sessync_net::{
    ClientConfig, ConnectionError, ReconnectConfig, ReconnectState, RecordHandle, SessionClient,
    SliderRecord, SliderValue, ToggleRecord, ToggleValue, TransportError, UdpConfig,
    UdpTransport, UpdateEnvelope,
};
use tracing::{error, info, warn};

use platform::{PlatformDirs, PlatformError};
use tick_loop::TickLoop;

/// Record ids of the demo records this client keeps attached.
const DEMO_SLIDER_ID: &str = "demo_slider";
const DEMO_TOGGLE_ID: &str = "demo_toggle";

/// Errors that stop the client before or while it runs.
#[derive(Debug, thiserror::Error)]
enum AppError {
    #[error(transparent)]
    Platform(#[from] PlatformError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("invalid server endpoint: {0}")]
    Address(#[from] ServerAddressError),
    #[error("failed to start I/O runtime: {0}")]
    Runtime(#[source] std::io::Error),
    #[error(transparent)]
    Connect(#[from] ConnectionError),
    #[error("server did not answer the join request")]
    Unreachable,
    #[error("connection lost to a transport fault")]
    ConnectionLost,
}

fn main() {
    let args = CliArgs::parse();
    if let Err(e) = run(args) {
        eprintln!("sessync: {e}");
        std::process::exit(1);
    }
}

fn run(args: CliArgs) -> Result<(), AppError> {
    let dirs = match &args.config {
        Some(dir) => PlatformDirs::with_config_dir(dir.clone()),
        None => PlatformDirs::resolve()?,
    };
    dirs.create_dirs()?;

    let mut config = Config::load_or_create(&dirs.config_dir)?;
    config.apply_cli_overrides(&args);

    sessync_log::init_logging(Some(&dirs.log_dir), cfg!(debug_assertions), Some(&config));
    info!("Config directory: {}", dirs.config_dir.display());

    let mut prefs = Preferences::open(&dirs.config_dir)?;
    let mut server = ServerSettings::from_prefs(&prefs);
    if let Some(endpoint) = args.endpoint {
        server.set_and_save(&mut prefs, endpoint)?;
    }
    let remote = resolve_remote(&args, &config, &server)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .thread_name("sessync-io")
        .enable_all()
        .build()
        .map_err(AppError::Runtime)?;

    let shutdown = Arc::new(AtomicBool::new(false));
    let ctrl_c = Arc::clone(&shutdown);
    runtime.spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.store(true, Ordering::SeqCst);
        }
    });

    let transport = UdpTransport::with_runtime(
        UdpConfig {
            recv_buffer_size: config.network.recv_buffer_size,
            trace_datagrams: config.debug.trace_datagrams,
            ..UdpConfig::default()
        },
        runtime.handle().clone(),
    );
    let mut client = SessionClient::new(
        Box::new(transport),
        ClientConfig {
            connect_timeout: config.network.connect_timeout(),
            heartbeat_interval: config.network.heartbeat_interval(),
            trace_datagrams: config.debug.trace_datagrams,
            request_sync_on_connect: config.client.request_sync_on_connect,
        },
    );

    let outcome = SessionOutcome::observe(&mut client);
    let demo = DemoRecords::attach(&mut client);

    client.connect(remote)?;

    let deadline = args
        .run_for
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        .map(|run_for| Instant::now() + run_for);
    let mut retry = config
        .client
        .retry_on_timeout
        .then(|| ReconnectState::new(ReconnectConfig::default()));
    let mut tick_loop = TickLoop::new(config.client.tick_rate_hz);
    let mut result = Ok(());

    loop {
        if shutdown.load(Ordering::SeqCst) {
            info!("Interrupted");
            break;
        }
        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            info!("Run time elapsed");
            break;
        }

        tick_loop.tick(|dt| {
            client.tick(dt);
            if let Some(retry) = &mut retry
                && retry.advance(dt)
                && let Err(e) = client.connect(remote)
            {
                error!("Reconnect failed: {e}");
            }
        });

        if outcome.connected.take() {
            demo.log_values();
            if let Some(retry) = &mut retry {
                retry.reset();
            }
        }
        let failure = if outcome.timed_out.take() {
            Some(AppError::Unreachable)
        } else if outcome.faulted.take() {
            Some(AppError::ConnectionLost)
        } else {
            None
        };
        if let Some(failure) = failure {
            match retry.as_mut().map(ReconnectState::arm) {
                Some(Some(_)) => {}
                Some(None) => {
                    warn!("Giving up after repeated connection failures");
                    result = Err(failure);
                    break;
                }
                None => {
                    result = Err(failure);
                    break;
                }
            }
        }
        if outcome.server_quit.take() {
            info!("Server ended the session");
            break;
        }
    }

    client.disconnect();
    demo.log_values();
    info!(
        "Stopped after {} ticks with {} records and {} keep-alives",
        tick_loop.tick_count(),
        client.store().len(),
        client.heartbeat().sent()
    );
    result
}

/// Pick the server endpoint: `--endpoint`, then `--server`/`--port`, then the
/// saved preference, then the config file.
fn resolve_remote(
    args: &CliArgs,
    config: &Config,
    server: &ServerSettings,
) -> Result<SocketAddr, ServerAddressError> {
    if let Some(endpoint) = args.endpoint {
        return Ok(endpoint);
    }
    let cli_override = args.server.is_some() || args.port.is_some();
    if !cli_override && let Some(endpoint) = server.endpoint() {
        return Ok(endpoint);
    }
    parse_endpoint(&format!(
        "{}:{}",
        config.network.server_address, config.network.server_port
    ))
}

/// Flags raised by client observers and consumed by the main loop.
#[derive(Default)]
struct SessionOutcome {
    connected: Rc<Cell<bool>>,
    timed_out: Rc<Cell<bool>>,
    faulted: Rc<Cell<bool>>,
    server_quit: Rc<Cell<bool>>,
}

impl SessionOutcome {
    fn observe(client: &mut SessionClient) -> Self {
        let outcome = Self::default();
        let observers = client.observers_mut();

        let connected = Rc::clone(&outcome.connected);
        observers.connected.add(move |_| connected.set(true));

        let timed_out = Rc::clone(&outcome.timed_out);
        observers.connect_timeout.add(move |_| {
            warn!("Join request timed out");
            timed_out.set(true);
        });

        let faulted = Rc::clone(&outcome.faulted);
        observers
            .transport_fault
            .add(move |_: &TransportError| faulted.set(true));

        // Local disconnects happen only on the way out, so any disconnect
        // seen inside the loop came from the server.
        let server_quit = Rc::clone(&outcome.server_quit);
        observers.disconnected.add(move |_| server_quit.set(true));

        observers
            .event_received
            .add(|payload: &str| info!("Event: {payload}"));
        observers
            .store_loaded
            .add(|count: &usize| info!("Full sync loaded {count} records"));
        observers.update_received.add(|update: &UpdateEnvelope| {
            info!(
                "Update '{}' from {}",
                update.session_data_id, update.sender_ip
            );
        });

        outcome
    }
}

/// A slider and a toggle bound to the store, standing in for UI controls.
struct DemoRecords {
    slider: Rc<RefCell<SliderRecord>>,
    toggle: Rc<RefCell<ToggleRecord>>,
}

impl DemoRecords {
    fn attach(client: &mut SessionClient) -> Self {
        let sink = client.change_sink();
        let slider = SliderRecord::new(DEMO_SLIDER_ID, SliderValue { value: 0.5 })
            .with_sink(sink.clone())
            .into_handle();
        let toggle = ToggleRecord::new(DEMO_TOGGLE_ID, ToggleValue::default())
            .with_sink(sink)
            .into_handle();

        let slider_handle: RecordHandle = slider.clone();
        let toggle_handle: RecordHandle = toggle.clone();
        for handle in [&slider_handle, &toggle_handle] {
            if let Err(e) = client.attach(handle) {
                warn!("Demo record not attached: {e}");
            }
        }

        Self { slider, toggle }
    }

    fn log_values(&self) {
        info!(
            "{DEMO_SLIDER_ID} = {}, {DEMO_TOGGLE_ID} = {}",
            self.slider.borrow().value().value,
            self.toggle.borrow().value().is_on
        );
    }
}
