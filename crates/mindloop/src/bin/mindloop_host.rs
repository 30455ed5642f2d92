//! # MINDLOOP Host
//!
//! Headless session runner. Plays a scripted input session against a full
//! server + client pair and logs a summary.
//!
//! ```bash
//! mindloop_host                      # defaults, single thread
//! mindloop_host world.toml           # config file
//! mindloop_host world.toml --threaded
//! RUST_LOG=mindloop=debug mindloop_host
//! ```

use std::time::Duration;

use mindloop::backend::{NullAudio, RecordingRenderer};
use mindloop::host::{spawn_server_thread, Host};
use mindloop::{ClientLoop, EngineConfig, EngineResult, Lifecycle, ServerLoop};
use mindloop_ui::{DeviceState, Key, ScriptedDevice, StatusText};
use tracing_subscriber::EnvFilter;

/// 60 fps client.
const FRAME_TIME: Duration = Duration::from_micros(16_667);

/// Upper bound on frames; the script quits through the menu before this.
const MAX_FRAMES: u64 = 600;

fn script() -> ScriptedDevice {
    let mut frames = Vec::new();
    let mut hold = |state: DeviceState, n: usize| frames.extend(std::iter::repeat(state).take(n));

    // Look around while walking, then sprint.
    hold(DeviceState::keys(&[Key::W]).with_motion(4.0, 0.0), 30);
    hold(DeviceState::keys(&[Key::W, Key::Shift]), 30);
    hold(DeviceState::keys(&[]), 2);
    // Possess the nearest bot and walk it.
    hold(DeviceState::keys(&[Key::E]), 1);
    hold(DeviceState::keys(&[]), 4);
    hold(DeviceState::keys(&[Key::W, Key::D]), 60);
    // Inventory open and closed; movement is ignored meanwhile.
    hold(DeviceState::keys(&[Key::I]), 1);
    hold(DeviceState::keys(&[Key::W]), 20);
    hold(DeviceState::keys(&[Key::I]), 1);
    // Let go, then send a bot to where we stand.
    hold(DeviceState::keys(&[Key::R]), 1);
    hold(DeviceState::keys(&[]), 4);
    hold(DeviceState::keys(&[Key::F]), 1);
    hold(DeviceState::keys(&[]), 200);
    // Pause, move to Quit, confirm.
    hold(DeviceState::keys(&[Key::Escape]), 1);
    hold(DeviceState::keys(&[Key::Down]), 1);
    hold(DeviceState::keys(&[Key::Enter]), 1);

    ScriptedDevice::new(frames)
}

fn load_config(path: Option<&str>) -> EngineResult<EngineConfig> {
    match path {
        Some(path) => {
            tracing::info!(path, "Loading config");
            Ok(EngineConfig::load(path)?)
        }
        None => Ok(EngineConfig::default()),
    }
}

fn run_single(config: &EngineConfig) -> EngineResult<()> {
    let renderer = RecordingRenderer::default();
    let draws = renderer.log.clone();
    let mut host = Host::from_config(config, Box::new(script()), Box::new(renderer), Box::new(NullAudio))?;
    host.init()?;
    host.start()?;

    let frames = host.run(MAX_FRAMES, FRAME_TIME)?;
    let stats = *host.stats();
    let totals = host.server().totals();
    let client = host.client().stats();
    host.shutdown()?;

    tracing::info!(
        frames,
        ticks = totals.ticks,
        minds_created = totals.minds_created,
        minds_released = totals.minds_released,
        tickets = client.tickets_issued,
        granted = client.tickets_granted,
        sounds = client.sounds_played,
        draws = draws.lock().len(),
        avg_frame_ms = stats.avg_frame_ms(),
        avg_ticks = stats.avg_ticks_per_frame(),
        over_budget_pct = stats.over_budget_percent(),
        "Session summary"
    );
    Ok(())
}

fn run_threaded(config: &EngineConfig) -> EngineResult<()> {
    let status = StatusText::new();
    let mut server: ServerLoop = ServerLoop::new(config, status.clone())?;
    let link = server.client_link();
    server.init()?;
    let thread = spawn_server_thread(server);

    let mut client = ClientLoop::new(
        &config.client,
        link,
        Box::new(script()),
        Box::new(RecordingRenderer::default()),
        Box::new(NullAudio),
        status,
    );
    client.init()?;
    client.start()?;

    let mut frames = 0;
    while frames < MAX_FRAMES && !thread.is_finished() {
        frames += 1;
        if !client.update(FRAME_TIME)? {
            break;
        }
        std::thread::sleep(FRAME_TIME);
    }
    client.stop()?;
    client.free()?;

    let mut server = thread.join()?;
    let totals = server.totals();
    server.free()?;

    tracing::info!(
        frames,
        ticks = totals.ticks,
        minds_created = totals.minds_created,
        tickets = client.stats().tickets_issued,
        "Threaded session summary"
    );
    Ok(())
}

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let threaded = args.iter().any(|a| a == "--threaded");
    let path = args.iter().find(|a| !a.starts_with("--")).map(String::as_str);

    let result = load_config(path).and_then(|config| {
        if threaded {
            run_threaded(&config)
        } else {
            run_single(&config)
        }
    });

    if let Err(err) = result {
        tracing::error!(%err, "Session failed");
        std::process::exit(1);
    }
}
