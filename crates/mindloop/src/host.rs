//! # Host
//!
//! Owns one server loop and one client loop and drives their lifecycles.
//!
//! Two ways to run them:
//! - [`Host::step`]: alternate both loops on the calling thread. Each step
//!   lets the server catch up on due ticks, then runs one client frame.
//! - [`spawn_server_thread`]: move the server onto its own thread; the
//!   caller keeps the client. They only share the request/event queues and
//!   the snapshot cell.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use mindloop_ui::{InputDevice, StatusText};

use crate::backend::{AudioBackend, RenderBackend};
use crate::client::ClientLoop;
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::mind::{BotMind, Mind};
use crate::server::ServerLoop;
use crate::{Lifecycle, LoopPhase};

/// Timing of one host step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepStats {
    /// Step number.
    pub frame: u64,
    /// Server ticks run in this step.
    pub ticks: u32,
    /// Server time, microseconds.
    pub server_us: u64,
    /// Client time, microseconds.
    pub client_us: u64,
}

impl StepStats {
    /// Total step time, microseconds.
    #[must_use]
    pub const fn total_us(&self) -> u64 {
        self.server_us + self.client_us
    }
}

/// Accumulates [`StepStats`] for the session summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameStatsAccumulator {
    /// Steps recorded.
    pub frames_recorded: u64,
    /// Server ticks over all steps.
    pub ticks_sum: u64,
    /// Sum of server times.
    pub server_us_sum: u64,
    /// Sum of client times.
    pub client_us_sum: u64,
    /// Shortest step.
    pub min_frame_us: u64,
    /// Longest step.
    pub max_frame_us: u64,
    /// Steps that took longer than the budget.
    pub frames_over_budget: u64,
    budget_us: u64,
}

impl FrameStatsAccumulator {
    /// Creates an accumulator with a per-step time budget.
    #[must_use]
    pub fn new(budget: Duration) -> Self {
        Self {
            frames_recorded: 0,
            ticks_sum: 0,
            server_us_sum: 0,
            client_us_sum: 0,
            min_frame_us: u64::MAX,
            max_frame_us: 0,
            frames_over_budget: 0,
            budget_us: u64::try_from(budget.as_micros()).unwrap_or(u64::MAX),
        }
    }

    /// Records one step.
    pub fn record(&mut self, stats: StepStats) {
        let total = stats.total_us();
        self.frames_recorded += 1;
        self.ticks_sum += u64::from(stats.ticks);
        self.server_us_sum += stats.server_us;
        self.client_us_sum += stats.client_us;
        self.min_frame_us = self.min_frame_us.min(total);
        self.max_frame_us = self.max_frame_us.max(total);
        if total > self.budget_us {
            self.frames_over_budget += 1;
        }
    }

    /// Average step time in milliseconds.
    #[must_use]
    pub fn avg_frame_ms(&self) -> f64 {
        if self.frames_recorded == 0 {
            return 0.0;
        }
        ((self.server_us_sum + self.client_us_sum) as f64 / self.frames_recorded as f64) / 1000.0
    }

    /// Average server ticks per step.
    #[must_use]
    pub fn avg_ticks_per_frame(&self) -> f64 {
        if self.frames_recorded == 0 {
            return 0.0;
        }
        self.ticks_sum as f64 / self.frames_recorded as f64
    }

    /// Percentage of steps over budget.
    #[must_use]
    pub fn over_budget_percent(&self) -> f64 {
        if self.frames_recorded == 0 {
            return 0.0;
        }
        (self.frames_over_budget as f64 / self.frames_recorded as f64) * 100.0
    }
}

fn elapsed_us(since: Instant) -> u64 {
    u64::try_from(since.elapsed().as_micros()).unwrap_or(u64::MAX)
}

/// Server and client composed on one thread.
#[derive(Debug)]
pub struct Host<M = BotMind> {
    server: ServerLoop<M>,
    client: ClientLoop,
    stats: FrameStatsAccumulator,
    frame: u64,
}

impl Host<BotMind> {
    /// Builds a server and a client connected to it from `config`.
    ///
    /// # Errors
    ///
    /// [`EngineError::Config`] if `config` does not validate.
    pub fn from_config(
        config: &EngineConfig,
        device: Box<dyn InputDevice>,
        render: Box<dyn RenderBackend>,
        audio: Box<dyn AudioBackend>,
    ) -> EngineResult<Self> {
        let status = StatusText::new();
        let server = ServerLoop::new(config, status.clone())?;
        let client = ClientLoop::new(&config.client, server.client_link(), device, render, audio, status);
        Ok(Self::new(server, client))
    }
}

impl<M: Mind> Host<M> {
    /// Composes an existing server and client.
    #[must_use]
    pub fn new(server: ServerLoop<M>, client: ClientLoop) -> Self {
        let budget = server.clock().quantum();
        Self { server, client, stats: FrameStatsAccumulator::new(budget), frame: 0 }
    }

    /// Initializes the server, then the client.
    ///
    /// # Errors
    ///
    /// The first lifecycle error.
    pub fn init(&mut self) -> EngineResult<()> {
        self.server.init()?;
        self.client.init()
    }

    /// Starts the server, then the client.
    ///
    /// # Errors
    ///
    /// The first lifecycle error.
    pub fn start(&mut self) -> EngineResult<()> {
        self.server.start()?;
        self.client.start()
    }

    /// Runs due server ticks for `elapsed`, then one client frame.
    /// Returns false once either loop asks to stop.
    ///
    /// # Errors
    ///
    /// Any error from either loop. All of them end the session except
    /// capacity errors, which the loops already absorb.
    pub fn step(&mut self, elapsed: Duration) -> EngineResult<bool> {
        self.frame += 1;
        let started = Instant::now();
        let advance = self.server.advance(elapsed)?;
        let server_us = elapsed_us(started);

        let started = Instant::now();
        let client_running = self.client.update(elapsed)?;
        let client_us = elapsed_us(started);

        self.stats.record(StepStats { frame: self.frame, ticks: advance.ticks, server_us, client_us });
        Ok(advance.running && client_running)
    }

    /// Steps up to `frames` times with a fixed `frame_time`. Returns how
    /// many steps ran.
    ///
    /// # Errors
    ///
    /// As [`Host::step`].
    pub fn run(&mut self, frames: u64, frame_time: Duration) -> EngineResult<u64> {
        for n in 1..=frames {
            if !self.step(frame_time)? {
                tracing::info!(frames = n, "Session ended by request");
                return Ok(n);
            }
        }
        Ok(frames)
    }

    /// Stops whatever is running, then frees both loops.
    ///
    /// # Errors
    ///
    /// The first lifecycle error.
    pub fn shutdown(&mut self) -> EngineResult<()> {
        if self.client.phase() == LoopPhase::Running {
            self.client.stop()?;
        }
        if self.server.phase() == LoopPhase::Running {
            self.server.stop()?;
        }
        if matches!(self.client.phase(), LoopPhase::Ready | LoopPhase::Stopped) {
            self.client.free()?;
        }
        if matches!(self.server.phase(), LoopPhase::Ready | LoopPhase::Stopped) {
            self.server.free()?;
        }
        Ok(())
    }

    /// The server loop.
    #[must_use]
    pub const fn server(&self) -> &ServerLoop<M> {
        &self.server
    }

    /// The server loop, mutably.
    pub fn server_mut(&mut self) -> &mut ServerLoop<M> {
        &mut self.server
    }

    /// The client loop.
    #[must_use]
    pub const fn client(&self) -> &ClientLoop {
        &self.client
    }

    /// The client loop, mutably.
    pub fn client_mut(&mut self) -> &mut ClientLoop {
        &mut self.client
    }

    /// Step statistics.
    #[must_use]
    pub const fn stats(&self) -> &FrameStatsAccumulator {
        &self.stats
    }
}

/// A server loop running on its own thread.
#[derive(Debug)]
pub struct ServerThread<M> {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<EngineResult<ServerLoop<M>>>,
}

impl<M> ServerThread<M> {
    /// Asks the thread to stop after its current tick batch.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    /// True once the thread has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Stops the thread and hands the (stopped) server back.
    ///
    /// # Errors
    ///
    /// The error that ended the loop, or
    /// [`EngineError::ThreadPanicked`].
    pub fn join(self) -> EngineResult<ServerLoop<M>> {
        self.request_stop();
        self.handle.join().map_err(|_| EngineError::ThreadPanicked { component: "server" })?
    }
}

/// Moves `server` onto its own thread and runs it in real time until
/// stopped or a shutdown request arrives. A `Ready` server is started
/// first. The returned server has been stopped.
pub fn spawn_server_thread<M>(mut server: ServerLoop<M>) -> ServerThread<M>
where
    M: Mind + Send + 'static,
{
    let stop = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&stop);
    let handle = std::thread::spawn(move || -> EngineResult<ServerLoop<M>> {
        if server.phase() == LoopPhase::Ready {
            server.start()?;
        }
        tracing::info!("Server thread running");
        let mut last = Instant::now();
        while !flag.load(Ordering::Acquire) {
            let now = Instant::now();
            let advance = server.advance(now.duration_since(last))?;
            last = now;
            if !advance.running {
                break;
            }
            std::thread::sleep(server.clock().time_until_due());
        }
        if server.phase() == LoopPhase::Running {
            server.stop()?;
        }
        tracing::info!(ticks = server.totals().ticks, "Server thread exiting");
        Ok(server)
    });
    ServerThread { stop, handle }
}
