//! Simulated process handle.
//!
//! Each thread walks its trace from the image one entry at a time. Only the
//! current thread moves; the others stay where they are. The process exits
//! when the first thread (the main thread) runs off the end of its trace.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::breakpoints::{BreakpointKind, BreakpointSite, InstalledBreakpoint};
use crate::error::{FerrosError, FerrosResult};
use crate::handle::{ProcessHandle, SymbolResolver, ThreadState};
use crate::platform::sim::image::ProgramImage;
use crate::types::{Address, ProcessId, SourceLine, StopReason, ThreadId};

/// Raw wait status of a thread stopped by `SIGTRAP`.
pub const SIGTRAP_STOP: u32 = 0x57f;

/// Exit status reported after `kill` (128 + `SIGKILL`).
pub const KILLED_STATUS: u32 = 137;

static NEXT_PID: AtomicU32 = AtomicU32::new(4000);

#[derive(Debug)]
struct SimThread
{
    id: ThreadId,
    trace: Vec<Address>,
    position: usize,
}

impl SimThread
{
    fn pc(&self) -> Address
    {
        self.trace.get(self.position).copied().unwrap_or(Address::ZERO)
    }

    fn at_end(&self) -> bool
    {
        self.position + 1 >= self.trace.len()
    }
}

#[derive(Debug, Clone, Copy)]
struct Trap
{
    kind: BreakpointKind,
    temporary: bool,
}

/// Outcome of moving the current thread by one trace entry.
enum Advance
{
    Moved(Address),
    /// A non-main thread is at the end of its trace and cannot move.
    Parked,
    Exited(u32),
}

/// Process handle over a [`ProgramImage`].
#[derive(Debug)]
pub struct SimulatedProcess
{
    image: ProgramImage,
    pid: ProcessId,
    threads: Vec<SimThread>,
    current: usize,
    traps: BTreeMap<Address, Trap>,
    exited: Option<u32>,
    detached: bool,
}

impl SimulatedProcess
{
    /// Start the program described by `image`, stopped at the first entry of
    /// every thread's trace.
    ///
    /// ## Errors
    ///
    /// - `LaunchFailed`: the image has no runnable thread
    pub fn launch(image: ProgramImage) -> FerrosResult<Self>
    {
        if image.threads.is_empty() || image.threads.iter().any(|t| t.trace.is_empty()) {
            return Err(FerrosError::LaunchFailed("program image has no runnable thread".to_string()));
        }

        let threads = image
            .threads
            .iter()
            .map(|t| SimThread {
                id: t.id,
                trace: t.trace.clone(),
                position: 0,
            })
            .collect();
        let pid = ProcessId(NEXT_PID.fetch_add(1, Ordering::Relaxed));
        tracing::debug!(%pid, "Launched simulated process");

        Ok(Self {
            image,
            pid,
            threads,
            current: 0,
            traps: BTreeMap::new(),
            exited: None,
            detached: false,
        })
    }

    fn ensure_alive(&self) -> FerrosResult<()>
    {
        if let Some(status) = self.exited {
            return Err(FerrosError::ProcessExited { status });
        }
        if self.detached {
            return Err(FerrosError::InvalidArgument("process is detached".to_string()));
        }
        Ok(())
    }

    fn advance(&mut self) -> Advance
    {
        let is_main = self.current == 0;
        let Some(thread) = self.threads.get_mut(self.current) else {
            return Advance::Parked;
        };

        if thread.at_end() {
            if is_main {
                let status = self.image.exit_code;
                self.exited = Some(status);
                self.traps.clear();
                return Advance::Exited(status);
            }
            return Advance::Parked;
        }

        thread.position += 1;
        Advance::Moved(thread.pc())
    }

    fn current_pc(&self) -> Address
    {
        self.threads.get(self.current).map_or(Address::ZERO, SimThread::pc)
    }

    /// Trace index the current thread reaches when stepping over calls from
    /// its current line.
    fn next_line_address(&self) -> Option<Address>
    {
        let thread = self.threads.get(self.current)?;
        let here = self.image.line_at(thread.pc());
        let depth = here.map_or(0, |entry| entry.depth);

        thread.trace.iter().skip(thread.position + 1).copied().find(|address| {
            match self.image.line_at(*address) {
                Some(entry) => {
                    entry.depth <= depth && here.map_or(true, |h| h.line != entry.line || h.file != entry.file)
                }
                None => false,
            }
        })
    }
}

impl ProcessHandle for SimulatedProcess
{
    fn pid(&self) -> ProcessId
    {
        self.pid
    }

    fn continue_execution(&mut self) -> FerrosResult<StopReason>
    {
        self.ensure_alive()?;
        loop {
            match self.advance() {
                Advance::Exited(status) => return Ok(StopReason::Exited(status)),
                Advance::Parked => self.current = 0,
                Advance::Moved(pc) => {
                    if self.traps.contains_key(&pc) {
                        return Ok(StopReason::Breakpoint(pc.value()));
                    }
                }
            }
        }
    }

    fn step(&mut self) -> FerrosResult<StopReason>
    {
        self.ensure_alive()?;
        match self.advance() {
            Advance::Exited(status) => Ok(StopReason::Exited(status)),
            Advance::Parked | Advance::Moved(_) => Ok(StopReason::StepComplete),
        }
    }

    fn step_over(&mut self) -> FerrosResult<StopReason>
    {
        self.ensure_alive()?;
        let Some(target) = self.next_line_address() else {
            return self.continue_execution();
        };

        let temporary = !self.traps.contains_key(&target);
        if temporary {
            self.traps.insert(
                target,
                Trap {
                    kind: BreakpointKind::Software,
                    temporary: true,
                },
            );
        }
        let outcome = self.continue_execution();
        if temporary {
            self.traps.remove(&target);
        }

        match outcome? {
            StopReason::Breakpoint(pc) if temporary && pc == target.value() => Ok(StopReason::StepComplete),
            other => Ok(other),
        }
    }

    fn set_breakpoint(&mut self, address: Address) -> FerrosResult<BreakpointKind>
    {
        self.ensure_alive()?;
        if self.traps.contains_key(&address) {
            return Err(FerrosError::InvalidArgument(format!("trap already installed at {address}")));
        }

        let hardware_in_use = self
            .traps
            .values()
            .filter(|trap| trap.kind == BreakpointKind::Hardware)
            .count();
        let kind = if hardware_in_use < self.image.hardware_slots {
            BreakpointKind::Hardware
        } else {
            BreakpointKind::Software
        };
        self.traps.insert(address, Trap { kind, temporary: false });
        Ok(kind)
    }

    fn clear_breakpoint(&mut self, address: Address, _kind: BreakpointKind) -> FerrosResult<()>
    {
        self.traps.remove(&address).map(drop).ok_or(FerrosError::NotFound(address))
    }

    fn installed_breakpoints(&self) -> Vec<InstalledBreakpoint>
    {
        self.traps
            .iter()
            .map(|(address, trap)| InstalledBreakpoint {
                address: *address,
                kind: trap.kind,
                temporary: trap.temporary,
            })
            .collect()
    }

    fn threads(&self) -> FerrosResult<Vec<ThreadState>>
    {
        if let Some(status) = self.exited {
            return Err(FerrosError::ProcessExited { status });
        }
        Ok(self
            .threads
            .iter()
            .map(|t| ThreadState {
                id: t.id,
                pc: t.pc(),
                status: SIGTRAP_STOP,
            })
            .collect())
    }

    fn current_thread(&self) -> Option<ThreadId>
    {
        if self.exited.is_some() {
            return None;
        }
        self.threads.get(self.current).map(|t| t.id)
    }

    fn switch_thread(&mut self, id: ThreadId) -> FerrosResult<()>
    {
        self.ensure_alive()?;
        let index = self
            .threads
            .iter()
            .position(|t| t.id == id)
            .ok_or(FerrosError::UnknownThread(id))?;
        self.current = index;
        tracing::trace!(thread = %id, pc = %self.current_pc(), "Switched thread");
        Ok(())
    }

    fn status_code(&self) -> u32
    {
        self.exited.unwrap_or(SIGTRAP_STOP)
    }

    fn exit_status(&mut self) -> Option<u32>
    {
        self.exited
    }

    fn detach(&mut self) -> FerrosResult<()>
    {
        self.ensure_alive()?;
        self.traps.clear();
        self.detached = true;
        // Untraced, the program simply runs to completion.
        self.exited = Some(self.image.exit_code);
        Ok(())
    }

    fn kill(&mut self) -> FerrosResult<()>
    {
        if self.exited.is_none() {
            self.traps.clear();
            self.exited = Some(KILLED_STATUS);
        }
        Ok(())
    }
}

impl SymbolResolver for SimulatedProcess
{
    fn resolve_location(&self, location: &str) -> FerrosResult<BreakpointSite>
    {
        self.image.resolve_location(location)
    }

    fn location_for_pc(&self, pc: Address) -> Option<SourceLine>
    {
        self.image.location_for_pc(pc)
    }

    fn source_files(&self) -> Vec<String>
    {
        self.image.source_files()
    }

    fn functions(&self) -> Vec<String>
    {
        self.image.functions()
    }
}
