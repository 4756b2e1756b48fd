//! # Debugger
//!
//! The authoritative model of breakpoints, threads, and process status, and
//! the one place protocol commands turn into process-control operations.
//!
//! ## Ownership
//!
//! All mutable state lives in [`ControlState`], which sits on the Process Owner
//! thread next to the target. The only way to read or change it is an owner
//! operation, so a client command and a resync can interleave but never
//! overlap. Everything leaving the debugger is an immutable snapshot carried
//! by a [`DebuggerEvent`].
//!
//! ## Example
//!
//! ```rust
//! use ferros_core::command::Command;
//! use ferros_core::events::EventBus;
//! use ferros_core::platform::sim::{ProgramImage, SimulatedProcess};
//! use ferros_core::Debugger;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> ferros_core::error::FerrosResult<()> {
//! let image = ProgramImage::demo();
//! let debugger = Debugger::start(move || SimulatedProcess::launch(image), EventBus::default()).await?;
//! debugger.handle(Command::AddBreakPoint { location: "main.go:12".into() }).await?;
//! assert_eq!(debugger.breakpoints().await?.len(), 1);
//! debugger.shutdown().await;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::breakpoints::{BreakpointKind, BreakpointSite, BreakpointStore};
use crate::command::Command;
use crate::error::{FerrosError, FerrosResult};
use crate::events::{DebuggerEvent, EventBus, EventReceiver, Message};
use crate::handle::{SymbolResolver, Target};
use crate::owner::ProcessOwner;
use crate::types::{Address, Breakpoint, Process, ProcessState, StopReason, Thread, ThreadId};

/// How a resume request should move the current thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resume
{
    Continue,
    Step,
    StepOver,
}

/// State owned by the Process Owner thread.
pub struct ControlState
{
    target: Box<dyn Target>,
    breakpoints: BreakpointStore,
    threads: Vec<Thread>,
    current_thread: Option<ThreadId>,
    state: ProcessState,
}

impl ControlState
{
    fn new(target: Box<dyn Target>) -> Self
    {
        let current_thread = target.current_thread();
        let mut state = Self {
            target,
            breakpoints: BreakpointStore::new(),
            threads: Vec::new(),
            current_thread,
            state: ProcessState::Attached,
        };
        state.refresh_threads();
        state
    }

    /// Fail with `ProcessExited` once the process is gone.
    fn require_live(&self) -> FerrosResult<()>
    {
        match self.state {
            ProcessState::Exited(status) => Err(FerrosError::ProcessExited { status }),
            ProcessState::Detached => Err(FerrosError::InvalidArgument("process is detached".to_string())),
            _ => Ok(()),
        }
    }

    fn process_snapshot(&self) -> Process
    {
        let (status, exited) = match self.state {
            ProcessState::Exited(status) => (status, true),
            _ => (self.target.status_code(), false),
        };
        Process {
            files: self.target.source_files(),
            status,
            exited,
        }
    }

    fn emit_breakpoints(&self, events: &EventBus)
    {
        events.emit(DebuggerEvent::breakpoints(self.breakpoints.user_snapshot()));
    }

    fn emit_threads(&self, events: &EventBus)
    {
        events.emit(DebuggerEvent::threads(self.threads.clone()));
    }

    fn emit_process(&self, events: &EventBus)
    {
        events.emit(DebuggerEvent::ProcessUpdated {
            process: self.process_snapshot(),
        });
    }

    /// Re-read the thread list from the handle and rebuild the snapshot.
    ///
    /// Keeps the previous snapshot if the handle cannot enumerate threads.
    fn refresh_threads(&mut self)
    {
        if !self.state.is_controllable() {
            self.threads.clear();
            self.current_thread = None;
            return;
        }

        let states = match self.target.threads() {
            Ok(states) => states,
            Err(err) => {
                tracing::warn!("Failed to enumerate threads: {err}");
                return;
            }
        };

        let still_known = self
            .current_thread
            .is_some_and(|current| states.iter().any(|t| t.id == current));
        if !still_known {
            self.current_thread = self
                .target
                .current_thread()
                .filter(|id| states.iter().any(|t| t.id == *id))
                .or_else(|| states.first().map(|t| t.id));
        }

        let current = self.current_thread;
        let resolver = &self.target;
        self.threads = states
            .into_iter()
            .map(|t| Thread {
                id: t.id,
                status: t.status,
                current_pc: t.pc,
                current_line: resolver.location_for_pc(t.pc),
                is_current: Some(t.id) == current,
            })
            .collect();
    }

    /// Irreversible transition to `Exited`.
    fn mark_exited(&mut self, status: u32, events: &EventBus)
    {
        if self.state.has_exited() {
            return;
        }
        tracing::info!(status, "Process exited");
        self.state = ProcessState::Exited(status);
        self.threads.clear();
        self.current_thread = None;

        events.emit(DebuggerEvent::Message(Message::warning(format!(
            "Process exited with status {status}"
        ))));
        self.emit_threads(events);
        self.emit_process(events);
    }

    /// Notice an exit the handle has not reported through a resume.
    fn poll_exit(&mut self, events: &EventBus)
    {
        if self.state.has_exited() {
            return;
        }
        if let Some(status) = self.target.exit_status() {
            self.mark_exited(status, events);
        }
    }

    fn add_breakpoint(&mut self, location: &str, events: &EventBus) -> FerrosResult<Breakpoint>
    {
        self.require_live()?;

        let site = self.target.resolve_location(location)?;
        self.breakpoints.ensure_vacant(site.address)?;
        let kind = self.target.set_breakpoint(site.address)?;
        let snapshot = self.breakpoints.insert(site, kind, false)?.snapshot();
        tracing::info!(id = snapshot.id.raw(), address = %snapshot.addr, ?kind, "Breakpoint set");

        events.emit(DebuggerEvent::Message(Message::info(format!(
            "Breakpoint {} set at {} for {} {}:{}",
            snapshot.id,
            snapshot.addr,
            snapshot.function_name.as_deref().unwrap_or("?"),
            snapshot.file,
            snapshot.line
        ))));
        self.emit_breakpoints(events);
        Ok(snapshot)
    }

    fn clear_breakpoints(&mut self, events: &EventBus)
    {
        let live = self.state.is_controllable();

        // Hardware slots first, then software traps.
        for kind in [BreakpointKind::Hardware, BreakpointKind::Software] {
            for id in self.breakpoints.ids_of_kind(kind) {
                let Some(entry) = self.breakpoints.get(id) else { continue };
                if entry.temporary {
                    continue;
                }
                let address = entry.address();
                if live {
                    if let Err(err) = self.target.clear_breakpoint(address, kind) {
                        tracing::warn!("Failed to clear breakpoint {id} at {address}: {err}");
                    }
                }
                self.breakpoints.remove(id);
            }
        }

        events.emit(DebuggerEvent::Message(Message::info("Cleared all breakpoints")));
        self.emit_breakpoints(events);
    }

    fn clear(&mut self, address: Address, events: &EventBus) -> FerrosResult<Breakpoint>
    {
        let id = self.breakpoints.id_at(address).ok_or(FerrosError::NotFound(address))?;
        let kind = self.breakpoints.get(id).map_or(BreakpointKind::Software, |entry| entry.kind);

        if self.state.is_controllable() {
            self.target.clear_breakpoint(address, kind)?;
        }
        let entry = self.breakpoints.remove(id).ok_or(FerrosError::NotFound(address))?;
        let snapshot = entry.snapshot();

        events.emit(DebuggerEvent::Message(Message::info(format!(
            "Breakpoint {} cleared at {} for {} {}:{}",
            snapshot.id,
            snapshot.addr,
            snapshot.function_name.as_deref().unwrap_or("?"),
            snapshot.file,
            snapshot.line
        ))));
        self.emit_breakpoints(events);
        Ok(snapshot)
    }

    fn resume(&mut self, how: Resume, events: &EventBus) -> FerrosResult<()>
    {
        if !self.state.is_controllable() {
            tracing::debug!(state = %self.state, "Ignoring {how:?}, process is not under control");
            return Ok(());
        }

        self.state = ProcessState::Running;
        let outcome = match how {
            Resume::Continue => self.target.continue_execution(),
            Resume::Step => self.target.step(),
            Resume::StepOver => self.target.step_over(),
        };

        let reason = match outcome {
            Ok(reason) => reason,
            Err(FerrosError::ProcessExited { status }) => StopReason::Exited(status),
            Err(err) => {
                self.state = ProcessState::Stopped;
                self.poll_exit(events);
                return Err(err);
            }
        };

        if let StopReason::Exited(status) = reason {
            self.mark_exited(status, events);
            return Ok(());
        }

        self.state = ProcessState::Stopped;
        self.refresh_threads();

        let here = self.describe_current();
        let message = match reason {
            StopReason::Breakpoint(pc) => match self.breakpoints.record_hit(Address::new(pc)) {
                Some(entry) if !entry.temporary => {
                    format!("Breakpoint {} hit at {here} (hit count {})", entry.id, entry.hit_count)
                }
                _ => format!("Stopped at {here}"),
            },
            _ => format!("Stopped at {here}"),
        };
        events.emit(DebuggerEvent::Message(Message::info(message)));
        self.emit_threads(events);
        self.emit_process(events);
        Ok(())
    }

    fn describe_current(&self) -> String
    {
        let Some(thread) = self.threads.iter().find(|t| t.is_current) else {
            return "unknown location".to_string();
        };
        match &thread.current_line {
            Some(line) => format!("{}:{} ({})", line.file, line.line, thread.current_pc),
            None => thread.current_pc.to_string(),
        }
    }

    fn detach(&mut self, events: &EventBus) -> FerrosResult<()>
    {
        if !self.state.is_controllable() {
            return Ok(());
        }

        events.emit(DebuggerEvent::Message(Message::info("Detaching from process")));
        self.target.detach()?;
        self.state = ProcessState::Detached;
        self.threads.clear();
        self.current_thread = None;

        // Detaching removes every trap from the process.
        let ids: Vec<_> = self.breakpoints.iter().map(|entry| entry.id).collect();
        for id in ids {
            self.breakpoints.remove(id);
        }

        self.emit_breakpoints(events);
        self.emit_threads(events);
        self.emit_process(events);
        Ok(())
    }

    fn kill(&mut self, events: &EventBus) -> FerrosResult<()>
    {
        if self.state.has_exited() {
            return Ok(());
        }

        events.emit(DebuggerEvent::Message(Message::info("Killing process")));
        self.target.kill()?;
        self.poll_exit(events);
        Ok(())
    }

    fn switch_thread(&mut self, id: ThreadId, events: &EventBus) -> FerrosResult<()>
    {
        self.require_live()?;
        self.refresh_threads();

        if !self.threads.iter().any(|t| t.id == id) {
            return Err(FerrosError::UnknownThread(id));
        }
        self.target.switch_thread(id)?;
        self.current_thread = Some(id);
        for thread in &mut self.threads {
            thread.is_current = thread.id == id;
        }

        self.emit_threads(events);
        Ok(())
    }

    fn resync(&mut self, events: &EventBus)
    {
        if self.state.is_controllable() {
            let installed = self.target.installed_breakpoints();
            let resolver = &self.target;
            if self.breakpoints.reconcile(&installed, |address| site_for(&**resolver, address)) {
                tracing::debug!("Breakpoint collection reconciled with the process");
            }
        }
        self.poll_exit(events);
        self.refresh_threads();

        self.emit_breakpoints(events);
        self.emit_threads(events);
        self.emit_process(events);
    }
}

fn site_for<R>(resolver: &R, address: Address) -> BreakpointSite
where
    R: SymbolResolver + ?Sized,
{
    match resolver.location_for_pc(address) {
        Some(line) => BreakpointSite {
            address,
            file: line.file,
            line: line.line,
            function: line.function,
        },
        None => BreakpointSite {
            address,
            file: String::new(),
            line: 0,
            function: None,
        },
    }
}

struct Shared
{
    owner: ProcessOwner<ControlState>,
    events: EventBus,
}

/// Handle to a running debugger session.
///
/// Cheap to clone; every clone talks to the same Process Owner.
#[derive(Clone)]
pub struct Debugger
{
    shared: Arc<Shared>,
}

impl Debugger
{
    /// Start a session: spawn the Process Owner, build the target on it
    /// with `factory`, and publish events on `events`.
    ///
    /// ## Errors
    ///
    /// Whatever `factory` returns (typically `AttachFailed` or `LaunchFailed`).
    pub async fn start<F, H>(factory: F, events: EventBus) -> FerrosResult<Self>
    where
        F: FnOnce() -> FerrosResult<H> + Send + 'static,
        H: Target + 'static,
    {
        let owner = ProcessOwner::spawn(move || {
            let target = factory()?;
            tracing::info!(pid = %target.pid(), "Target ready");
            Ok(ControlState::new(Box::new(target)))
        })
        .await?;

        Ok(Self {
            shared: Arc::new(Shared { owner, events }),
        })
    }

    #[must_use]
    pub fn events(&self) -> &EventBus
    {
        &self.shared.events
    }

    #[must_use]
    pub fn subscribe(&self) -> EventReceiver
    {
        self.shared.events.subscribe()
    }

    /// Run `op` against the control state on the owner thread.
    async fn run<R, F>(&self, op: F) -> FerrosResult<R>
    where
        F: FnOnce(&mut ControlState, &EventBus) -> FerrosResult<R> + Send + 'static,
        R: Send + 'static,
    {
        let events = self.shared.events.clone();
        self.shared.owner.execute(move |state| op(state, &events)).await
    }

    /// Dispatch one protocol command.
    pub async fn handle(&self, command: Command) -> FerrosResult<()>
    {
        tracing::debug!(command = command.name(), "Handling command");
        match command {
            Command::AddBreakPoint { location } => self.add_breakpoint(location).await.map(drop),
            Command::ClearBreakPoints => self.clear_breakpoints().await,
            Command::Clear { address } => self.clear(address).await.map(drop),
            Command::Detach => self.detach().await,
            Command::Kill => self.kill().await,
            Command::SwitchThread { id } => self.switch_thread(id).await,
            Command::Continue => self.continue_execution().await,
            Command::Step => self.step().await,
            Command::Next => self.step_over().await,
        }
    }

    /// Resolve `location`, install a breakpoint there, and publish the new
    /// breakpoint set.
    ///
    /// ## Errors
    ///
    /// - `Resolution`: the location does not map to an address
    /// - `DuplicateAddress`: a breakpoint already exists at that address
    /// - `ProcessExited`: the process is gone
    pub async fn add_breakpoint(&self, location: impl Into<String>) -> FerrosResult<Breakpoint>
    {
        let location = location.into();
        self.run(move |state, events| state.add_breakpoint(&location, events)).await
    }

    /// Remove every user breakpoint. Individual failures are logged, and the
    /// (now empty) set is always published.
    pub async fn clear_breakpoints(&self) -> FerrosResult<()>
    {
        self.run(|state, events| {
            state.clear_breakpoints(events);
            Ok(())
        })
        .await
    }

    /// Remove the breakpoint at exactly `address`.
    ///
    /// ## Errors
    ///
    /// - `NotFound`: no breakpoint at that address
    pub async fn clear(&self, address: Address) -> FerrosResult<Breakpoint>
    {
        self.run(move |state, events| state.clear(address, events)).await
    }

    /// Resume the current thread. A no-op once the process has exited.
    pub async fn continue_execution(&self) -> FerrosResult<()>
    {
        self.run(|state, events| state.resume(Resume::Continue, events)).await
    }

    /// Single-step the current thread. A no-op once the process has exited.
    pub async fn step(&self) -> FerrosResult<()>
    {
        self.run(|state, events| state.resume(Resume::Step, events)).await
    }

    /// Step over calls to the next line. A no-op once the process has exited.
    pub async fn step_over(&self) -> FerrosResult<()>
    {
        self.run(|state, events| state.resume(Resume::StepOver, events)).await
    }

    /// Release the process. Idempotent.
    pub async fn detach(&self) -> FerrosResult<()>
    {
        self.run(|state, events| state.detach(events)).await
    }

    /// Terminate the process. Idempotent.
    pub async fn kill(&self) -> FerrosResult<()>
    {
        self.run(|state, events| state.kill(events)).await
    }

    /// Select the thread used for thread-relative operations.
    ///
    /// ## Errors
    ///
    /// - `UnknownThread`: no such thread; the current marker is unchanged
    pub async fn switch_thread(&self, id: ThreadId) -> FerrosResult<()>
    {
        self.run(move |state, events| state.switch_thread(id, events)).await
    }

    /// Re-read breakpoints, threads, and process status from the handle and
    /// publish all three snapshots, changed or not.
    pub async fn resync(&self) -> FerrosResult<()>
    {
        self.run(|state, events| {
            state.resync(events);
            Ok(())
        })
        .await
    }

    /// Current user-visible breakpoints, sorted by identifier.
    pub async fn breakpoints(&self) -> FerrosResult<Vec<Breakpoint>>
    {
        self.run(|state, _| Ok(state.breakpoints.user_snapshot())).await
    }

    pub async fn threads(&self) -> FerrosResult<Vec<Thread>>
    {
        self.run(|state, _| Ok(state.threads.clone())).await
    }

    pub async fn process(&self) -> FerrosResult<Process>
    {
        self.run(|state, _| Ok(state.process_snapshot())).await
    }

    pub async fn state(&self) -> FerrosResult<ProcessState>
    {
        self.run(|state, _| Ok(state.state)).await
    }

    /// Drain the Process Owner and join its thread.
    pub async fn shutdown(&self)
    {
        self.shared.owner.shutdown().await;
    }
}

/// Call [`Debugger::resync`] every `period` until `cancel` fires.
///
/// Ticks that fall behind are skipped rather than bunched up.
pub fn spawn_resync(debugger: Debugger, period: Duration, cancel: CancellationToken) -> JoinHandle<()>
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    tracing::trace!("Resync tick");
                    if let Err(err) = debugger.resync().await {
                        tracing::warn!("Resync failed: {err}");
                        if matches!(err, FerrosError::OwnerStopped) {
                            break;
                        }
                    }
                }
            }
        }
        tracing::debug!("Resync task stopped");
    })
}
