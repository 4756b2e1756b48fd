//! Breakpoint bookkeeping.
//!
//! This module centralizes breakpoint lifecycle tracking so the debugger can
//! leave the mechanics of installing / removing traps to the process handle.
//! The store assigns identifiers, enforces the one-breakpoint-per-address
//! rule, and produces the snapshots that are broadcast to clients.
//!
//! ## Identifiers
//!
//! Identifiers are assigned from a monotonically increasing counter starting
//! at 1 and are never reused within a session, even after the breakpoint they
//! named has been cleared.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{FerrosError, FerrosResult};
use crate::types::{Address, Breakpoint};

/// Unique identifier for a breakpoint managed by the debugger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BreakpointId(u64);

impl BreakpointId
{
    /// Create a new identifier from a raw value.
    #[must_use]
    pub const fn from_raw(value: u64) -> Self
    {
        Self(value)
    }

    /// Get the raw numeric representation (useful for logging / errors).
    #[must_use]
    pub const fn raw(self) -> u64
    {
        self.0
    }
}

impl fmt::Display for BreakpointId
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}", self.0)
    }
}

/// How the process handle implemented a breakpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BreakpointKind
{
    /// Software breakpoint implemented via trap instructions (BRK/INT3).
    Software,
    /// Hardware breakpoint configured via CPU debug registers.
    Hardware,
}

/// A breakpoint the process handle reports as installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstalledBreakpoint
{
    pub address: Address,
    pub kind: BreakpointKind,
    /// Installed by the handle itself (e.g. for a step-over), not by a user.
    pub temporary: bool,
}

/// Resolved source position a new breakpoint is attached to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakpointSite
{
    pub address: Address,
    pub file: String,
    pub line: u32,
    pub function: Option<String>,
}

/// Breakpoint entry tracked by the store.
#[derive(Debug, Clone)]
pub struct BreakpointEntry
{
    pub id: BreakpointId,
    pub site: BreakpointSite,
    pub kind: BreakpointKind,
    pub temporary: bool,
    pub hit_count: u64,
}

impl BreakpointEntry
{
    #[must_use]
    pub fn address(&self) -> Address
    {
        self.site.address
    }

    /// Wire-level view of this entry.
    #[must_use]
    pub fn snapshot(&self) -> Breakpoint
    {
        Breakpoint {
            id: self.id,
            function_name: self.site.function.clone(),
            file: self.site.file.clone(),
            line: self.site.line,
            addr: self.site.address,
            temporary: self.temporary,
        }
    }
}

/// Breakpoint collection owned by the debugger.
///
/// Not synchronized: the debugger only touches it from the Process Owner
/// thread.
#[derive(Debug, Default)]
pub struct BreakpointStore
{
    next_id: u64,
    by_id: BTreeMap<BreakpointId, BreakpointEntry>,
    by_address: HashMap<Address, BreakpointId>,
}

impl BreakpointStore
{
    #[must_use]
    pub fn new() -> Self
    {
        Self::default()
    }

    fn allocate_id(&mut self) -> BreakpointId
    {
        self.next_id = self.next_id.saturating_add(1);
        BreakpointId::from_raw(self.next_id)
    }

    /// Fail with `DuplicateAddress` if a breakpoint already exists at `address`.
    pub fn ensure_vacant(&self, address: Address) -> FerrosResult<()>
    {
        match self.by_address.get(&address) {
            Some(existing) => Err(FerrosError::DuplicateAddress {
                address,
                existing: *existing,
            }),
            None => Ok(()),
        }
    }

    /// Record a breakpoint the handle has just installed and assign it a fresh
    /// identifier.
    pub fn insert(&mut self, site: BreakpointSite, kind: BreakpointKind, temporary: bool) -> FerrosResult<&BreakpointEntry>
    {
        self.ensure_vacant(site.address)?;
        let id = self.allocate_id();
        self.by_address.insert(site.address, id);
        Ok(self.by_id.entry(id).or_insert(BreakpointEntry {
            id,
            site,
            kind,
            temporary,
            hit_count: 0,
        }))
    }

    pub fn get(&self, id: BreakpointId) -> Option<&BreakpointEntry>
    {
        self.by_id.get(&id)
    }

    pub fn id_at(&self, address: Address) -> Option<BreakpointId>
    {
        self.by_address.get(&address).copied()
    }

    pub fn remove(&mut self, id: BreakpointId) -> Option<BreakpointEntry>
    {
        let entry = self.by_id.remove(&id)?;
        self.by_address.remove(&entry.address());
        Some(entry)
    }

    /// Bump the hit counter of the breakpoint at `address`, if any.
    pub fn record_hit(&mut self, address: Address) -> Option<&BreakpointEntry>
    {
        let id = self.id_at(address)?;
        let entry = self.by_id.get_mut(&id)?;
        entry.hit_count = entry.hit_count.saturating_add(1);
        Some(entry)
    }

    /// Every entry, ordered by identifier.
    pub fn iter(&self) -> impl Iterator<Item = &BreakpointEntry>
    {
        self.by_id.values()
    }

    /// Identifiers of every entry of the given kind.
    #[must_use]
    pub fn ids_of_kind(&self, kind: BreakpointKind) -> Vec<BreakpointId>
    {
        self.iter().filter(|entry| entry.kind == kind).map(|entry| entry.id).collect()
    }

    /// Snapshot of user-visible breakpoints, sorted by identifier.
    ///
    /// Temporary breakpoints are excluded.
    #[must_use]
    pub fn user_snapshot(&self) -> Vec<Breakpoint>
    {
        self.iter()
            .filter(|entry| !entry.temporary)
            .map(BreakpointEntry::snapshot)
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize
    {
        self.by_id.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool
    {
        self.by_id.is_empty()
    }

    /// Bring the store in line with what the handle reports as installed.
    ///
    /// Entries whose trap is gone are dropped. Traps the store does not know
    /// about are adopted with a fresh identifier; `describe` supplies their
    /// source position. Returns `true` when anything changed.
    pub fn reconcile<F>(&mut self, installed: &[InstalledBreakpoint], mut describe: F) -> bool
    where
        F: FnMut(Address) -> BreakpointSite,
    {
        let mut changed = false;

        let stale: Vec<BreakpointId> = self
            .iter()
            .filter(|entry| !installed.iter().any(|bp| bp.address == entry.address()))
            .map(|entry| entry.id)
            .collect();
        for id in stale {
            tracing::debug!("Dropping breakpoint {} whose trap is no longer installed", id);
            self.remove(id);
            changed = true;
        }

        for bp in installed {
            if self.id_at(bp.address).is_none() {
                let site = describe(bp.address);
                // Cannot collide: the address was just checked.
                if self.insert(site, bp.kind, bp.temporary).is_ok() {
                    changed = true;
                }
            }
        }

        changed
    }
}
