//! Poller loop: a single-threaded state machine driving the link.
//!
//! Each [`Supervisor::step`] advances the [`Phase`] by at most one transition
//! and then runs the maintenance block: inbound toggle requests, the
//! keep-alive heartbeat, and periodic installed-set reconciliation. Nothing
//! here is fatal; faults are logged and the loop carries on.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::color::{Color, ColorAllocator, ColorStore};
use crate::config::{Config, StatePaths};
use crate::error::{LanglinkError, Result};
use crate::installed::{self, SnapshotFile};
use crate::interval::Interval;
use crate::language::{LanguageSource, LanguageState};
use crate::link::{Connection, LinkStatus, LinkSupervisor, SerialBackend};
use crate::protocol::{self, Inbound, Outbound};
use crate::reconnect::ReconnectState;

/// A language change waiting to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMessage {
    pub state: LanguageState,
    pub color: Option<Color>,
}

impl PendingMessage {
    pub fn to_outbound(&self) -> Outbound {
        Outbound::LanguageChange {
            color: self.color.clone(),
            code: self.state.code.clone(),
        }
    }
}

/// Where the loop is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    Initialize,
    /// Looking for the accessory.
    Establish,
    /// Connected; watching for a language change. `None` means the
    /// accessory's state is unknown and the next read is always sent.
    SyncCheck { baseline: Option<LanguageState> },
    Send(PendingMessage),
}

impl Phase {
    pub fn label(&self) -> &'static str {
        match self {
            Phase::Initialize => "Initialize",
            Phase::Establish => "Establish",
            Phase::SyncCheck { .. } => "SyncCheck",
            Phase::Send(_) => "Send",
        }
    }
}

/// Loop timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    pub retry_delay: Duration,
    pub keep_alive: Duration,
    pub reconcile: Duration,
    pub poll_interval: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            retry_delay: Duration::from_secs(1),
            keep_alive: Duration::from_secs(1),
            reconcile: Duration::from_secs(5),
            poll_interval: Duration::from_millis(10),
        }
    }
}

impl Timings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            retry_delay: config.retry_delay(),
            keep_alive: config.keep_alive_interval(),
            reconcile: config.reconcile_interval(),
            poll_interval: config.poll_interval(),
        }
    }
}

/// Owns the connection and every collaborator of the loop.
pub struct Supervisor<B, L> {
    link: LinkSupervisor<B>,
    languages: L,
    allocator: ColorAllocator,
    snapshot: SnapshotFile,
    phase: Phase,
    connection: Option<Connection>,
    retry: ReconnectState,
    keep_alive: Interval,
    reconcile: Interval,
    poll_interval: Duration,
}

impl<B: SerialBackend, L: LanguageSource> Supervisor<B, L> {
    pub fn new(
        link: LinkSupervisor<B>,
        languages: L,
        allocator: ColorAllocator,
        snapshot: SnapshotFile,
        timings: Timings,
    ) -> Self {
        let now = Instant::now();
        Self {
            link,
            languages,
            allocator,
            snapshot,
            phase: Phase::Initialize,
            connection: None,
            retry: ReconnectState::new(timings.retry_delay),
            keep_alive: Interval::new(timings.keep_alive, now),
            reconcile: Interval::new(timings.reconcile, now),
            poll_interval: timings.poll_interval,
        }
    }

    /// Wire a supervisor from settings and the persisted-state locations.
    pub fn from_config(
        backend: B,
        languages: L,
        config: &Config,
        paths: &StatePaths,
    ) -> Result<Self> {
        let allocator = ColorAllocator::new(ColorStore::new(&paths.colors), config.palette()?);
        Ok(Self::new(
            LinkSupervisor::new(backend, config.link_settings()),
            languages,
            allocator,
            SnapshotFile::new(&paths.snapshot),
            Timings::from_config(config),
        ))
    }

    pub fn link(&self) -> &LinkSupervisor<B> {
        &self.link
    }

    pub fn languages(&self) -> &L {
        &self.languages
    }

    pub fn allocator(&self) -> &ColorAllocator {
        &self.allocator
    }

    pub fn snapshot(&self) -> &SnapshotFile {
        &self.snapshot
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    pub fn port_name(&self) -> Option<&str> {
        self.connection.as_ref().map(Connection::port_name)
    }

    /// Run until `running` is cleared.
    pub fn run(&mut self, running: &AtomicBool) {
        while running.load(Ordering::SeqCst) {
            let pause = self.step();
            std::thread::sleep(pause);
        }
        log::info!("supervisor stopped");
    }

    pub fn step(&mut self) -> Duration {
        self.step_at(Instant::now())
    }

    /// One loop iteration at `now`. Returns the pause before the next one.
    pub fn step_at(&mut self, now: Instant) -> Duration {
        let phase = std::mem::replace(&mut self.phase, Phase::Establish);
        let from = phase.label();
        let next = self.advance(phase, now);
        self.phase = match next {
            Ok(next) => next,
            Err(e) => self.recover(e),
        };
        if self.phase.label() != from {
            log::debug!("{from} -> {}", self.phase.label());
        }

        if let Err(e) = self.maintain(now) {
            let next = self.recover(e);
            // A pending send survives faults that leave the link up.
            if !matches!(self.phase, Phase::Send(_)) || !self.is_connected() {
                self.phase = next;
            }
        }
        self.poll_interval
    }

    fn advance(&mut self, phase: Phase, now: Instant) -> Result<Phase> {
        match phase {
            Phase::Initialize => {
                log::info!(
                    "looking for a serial port matching \"{}\"",
                    self.link.settings().pattern
                );
                Ok(Phase::Establish)
            }
            Phase::Establish => Ok(self.establish(now)),
            Phase::SyncCheck { baseline } => self.sync_check(baseline),
            Phase::Send(pending) => self.send(pending),
        }
    }

    fn establish(&mut self, now: Instant) -> Phase {
        if !self.retry.should_attempt(now) {
            return Phase::Establish;
        }
        match self.link.discover_and_open() {
            LinkStatus::Available(conn) => {
                log::info!("connected on {}", conn.port_name());
                self.connection = Some(conn);
                self.retry.record_success();
                Phase::SyncCheck { baseline: None }
            }
            status => {
                let first = self.retry.consecutive_failures() == 0;
                let delay = self.retry.delay();
                match &status {
                    LinkStatus::Busy(detail) if first => {
                        log::warn!("accessory busy ({detail}); retrying every {delay:?}")
                    }
                    LinkStatus::Busy(detail) => log::debug!("accessory still busy: {detail}"),
                    other if first => log::info!(
                        "accessory {}; retrying every {delay:?}",
                        other.label().to_lowercase()
                    ),
                    _ => {}
                }
                self.retry.record_failure(now);
                Phase::Establish
            }
        }
    }

    fn sync_check(&mut self, baseline: Option<LanguageState>) -> Result<Phase> {
        let Some(conn) = self.connection.as_ref() else {
            return Ok(Phase::Establish);
        };
        if !self.link.is_present(conn.port_name()) {
            log::info!("{} disappeared", conn.port_name());
            self.connection = None;
            return Ok(Phase::Establish);
        }

        let state = self.languages.current()?;
        if baseline.as_ref() == Some(&state) {
            return Ok(Phase::SyncCheck { baseline });
        }
        let color = self.allocator.allocate(state.id)?;
        Ok(Phase::Send(PendingMessage { state, color }))
    }

    fn send(&mut self, pending: PendingMessage) -> Result<Phase> {
        let Some(conn) = self.connection.as_mut() else {
            return Ok(Phase::Establish);
        };
        let msg = pending.to_outbound();
        protocol::send(conn, &msg)?;
        log::info!("sent {:?}", msg.encode().trim_end());
        Ok(Phase::SyncCheck {
            baseline: Some(pending.state),
        })
    }

    fn maintain(&mut self, now: Instant) -> Result<()> {
        if let Some(conn) = self.connection.as_mut()
            && let Some(Inbound::LanguageToggle) = protocol::try_receive(conn)?
        {
            log::info!("language toggle requested");
            self.languages.advance();
        }

        if self.keep_alive.fire(now)
            && let Some(conn) = self.connection.as_mut()
        {
            protocol::send(conn, &Outbound::KeepAlive)?;
        }

        if self.reconcile.fire(now) {
            installed::reconcile(&self.languages, &self.allocator, &self.snapshot)?;
        }
        Ok(())
    }

    /// Log a fault and pick the phase to continue from.
    fn recover(&mut self, e: LanglinkError) -> Phase {
        if e.is_link() {
            if let Some(conn) = self.connection.take() {
                log::warn!("{}: {e}; reconnecting", conn.port_name());
            } else {
                log::warn!("{e}");
            }
            return Phase::Establish;
        }
        log::warn!("{e}");
        if self.is_connected() {
            Phase::SyncCheck { baseline: None }
        } else {
            Phase::Establish
        }
    }
}
