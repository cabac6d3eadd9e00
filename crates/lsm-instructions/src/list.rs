//! Instruction List
//!
//! Ordered, priority-significant sequence of instructions. Lower index means higher
//! scheduling priority.
//!
//! - `append` adds at the end, `insert` places at a position and shifts the rest right
//! - Enable flags are atomics, so a UI thread can toggle them through a shared
//!   reference while a scheduler iterates
//! - `ordered_enabled` is a lazy view recomputed on every call; toggling between
//!   cycles is visible on the next call
//!
//! Topology (`append`/`insert`) needs `&mut self`; nothing an instruction receives
//! during execution can reach it.
//!
//! # Example
//!
//! ```rust
//! use lsm_instructions::{InstructionList, OperatorPrompt};
//!
//! let mut list = InstructionList::new();
//! let mount = list.append(OperatorPrompt::new("Mount sample", "Mount the sample"));
//! list.insert(0, OperatorPrompt::new("Warm up", "Switch on the lasers")).unwrap();
//!
//! list.set_enabled(mount, false).unwrap();
//! let names: Vec<_> = list.ordered_enabled().map(|e| e.name().to_string()).collect();
//! assert_eq!(names, vec!["Warm up"]);
//! ```

use crate::instruction::{Instruction, InstructionContext, InstructionKind};
use lsm_core::{AppResult, InstrumentError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Stable identity of a list entry, independent of its position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstructionId(u64);

impl std::fmt::Display for InstructionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An instruction together with its list identity and enable flag.
pub struct ScheduledInstruction {
    id: InstructionId,
    enabled: AtomicBool,
    instruction: Arc<dyn Instruction>,
}

impl ScheduledInstruction {
    /// Entry identity
    pub fn id(&self) -> InstructionId {
        self.id
    }

    /// Instruction name
    pub fn name(&self) -> &str {
        self.instruction.name()
    }

    /// Instruction category
    pub fn kind(&self) -> InstructionKind {
        self.instruction.kind()
    }

    /// Whether the scheduler should run this entry
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Shared handle to the instruction
    pub fn instruction(&self) -> &Arc<dyn Instruction> {
        &self.instruction
    }

    /// Run the instruction once.
    ///
    /// # Errors
    ///
    /// `InstructionFailure` naming this instruction and carrying the cause.
    #[instrument(skip_all, fields(instruction = %self.name()))]
    pub fn execute(&self, ctx: &InstructionContext<'_>) -> AppResult<()> {
        self.instruction
            .execute(ctx)
            .map_err(|e| InstrumentError::instruction(self.name(), e))
    }
}

impl std::fmt::Debug for ScheduledInstruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduledInstruction")
            .field("id", &self.id)
            .field("name", &self.name())
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

/// Ordered sequence of instructions.
#[derive(Debug, Default)]
pub struct InstructionList {
    entries: Vec<ScheduledInstruction>,
    next_id: u64,
}

impl InstructionList {
    /// Create an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&mut self, instruction: Arc<dyn Instruction>, enabled: bool) -> ScheduledInstruction {
        let id = InstructionId(self.next_id);
        self.next_id += 1;
        ScheduledInstruction {
            id,
            enabled: AtomicBool::new(enabled),
            instruction,
        }
    }

    /// Append an enabled instruction at the end.
    pub fn append<I: Instruction + 'static>(&mut self, instruction: I) -> InstructionId {
        self.append_shared(Arc::new(instruction), true)
    }

    /// Append an already shared instruction with an explicit enable flag.
    pub fn append_shared(
        &mut self,
        instruction: Arc<dyn Instruction>,
        enabled: bool,
    ) -> InstructionId {
        let entry = self.entry(instruction, enabled);
        let id = entry.id;
        debug!(%id, name = %entry.name(), index = self.entries.len(), "instruction appended");
        self.entries.push(entry);
        id
    }

    /// Insert an enabled instruction at `position`, shifting later entries right.
    ///
    /// # Errors
    ///
    /// `Configuration` if `position` is past the end of the list.
    pub fn insert<I: Instruction + 'static>(
        &mut self,
        position: usize,
        instruction: I,
    ) -> AppResult<InstructionId> {
        self.insert_shared(position, Arc::new(instruction), true)
    }

    /// Insert an already shared instruction with an explicit enable flag.
    pub fn insert_shared(
        &mut self,
        position: usize,
        instruction: Arc<dyn Instruction>,
        enabled: bool,
    ) -> AppResult<InstructionId> {
        if position > self.entries.len() {
            return Err(InstrumentError::Configuration(format!(
                "cannot insert instruction at {} into a list of {}",
                position,
                self.entries.len()
            )));
        }
        let entry = self.entry(instruction, enabled);
        let id = entry.id;
        debug!(%id, name = %entry.name(), index = position, "instruction inserted");
        self.entries.insert(position, entry);
        Ok(id)
    }

    /// Toggle execution eligibility without touching the order.
    ///
    /// # Errors
    ///
    /// `UnknownInstruction` if no entry has this id.
    pub fn set_enabled(&self, id: InstructionId, enabled: bool) -> AppResult<()> {
        let entry = self
            .entries
            .iter()
            .find(|e| e.id == id)
            .ok_or_else(|| InstrumentError::UnknownInstruction(id.to_string()))?;
        entry.enabled.store(enabled, Ordering::Release);
        Ok(())
    }

    /// Toggle every entry with this name. Returns how many entries matched.
    ///
    /// # Errors
    ///
    /// `UnknownInstruction` if no entry has this name.
    pub fn set_enabled_by_name(&self, name: &str, enabled: bool) -> AppResult<usize> {
        let mut matched = 0;
        for entry in self.entries.iter().filter(|e| e.name() == name) {
            entry.enabled.store(enabled, Ordering::Release);
            matched += 1;
        }
        if matched == 0 {
            return Err(InstrumentError::UnknownInstruction(name.to_string()));
        }
        Ok(matched)
    }

    /// Currently enabled entries in list order.
    ///
    /// Lazy: flags are read as the iterator advances, and each call starts over.
    pub fn ordered_enabled(&self) -> impl Iterator<Item = &ScheduledInstruction> + '_ {
        self.entries.iter().filter(|e| e.is_enabled())
    }

    /// All entries in list order, enabled or not.
    pub fn iter(&self) -> impl Iterator<Item = &ScheduledInstruction> + '_ {
        self.entries.iter()
    }

    /// Current position of an entry.
    pub fn position(&self, id: InstructionId) -> Option<usize> {
        self.entries.iter().position(|e| e.id == id)
    }

    /// Entry at `index`.
    pub fn get(&self, index: usize) -> Option<&ScheduledInstruction> {
        self.entries.get(index)
    }

    /// Entry with this name, first match in list order.
    pub fn find(&self, name: &str) -> Option<&ScheduledInstruction> {
        self.entries.iter().find(|e| e.name() == name)
    }

    /// Names in list order.
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name()).collect()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the list is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::OperatorPrompt;

    fn prompt(name: &str) -> OperatorPrompt {
        OperatorPrompt::new(name, "")
    }

    #[test]
    fn test_insert_zero_shifts_everything() {
        let mut list = InstructionList::new();
        list.append(prompt("a"));
        list.append(prompt("b"));
        let head = list.insert(0, prompt("head")).unwrap();

        assert_eq!(list.names(), vec!["head", "a", "b"]);
        assert_eq!(list.position(head), Some(0));
    }

    #[test]
    fn test_append_lands_last() {
        let mut list = InstructionList::new();
        list.insert(0, prompt("a")).unwrap();
        let tail = list.append(prompt("z"));
        list.insert(1, prompt("m")).unwrap();

        assert_eq!(list.names(), vec!["a", "m", "z"]);
        assert_eq!(list.position(tail), Some(2));
    }

    #[test]
    fn test_insert_past_end_rejected() {
        let mut list = InstructionList::new();
        list.append(prompt("a"));
        assert!(list.insert(2, prompt("x")).is_err());
        assert!(list.insert(1, prompt("x")).is_ok());
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn test_ordered_enabled_is_a_live_view() {
        let mut list = InstructionList::new();
        let a = list.append(prompt("a"));
        list.append(prompt("b"));
        list.append_shared(Arc::new(prompt("c")), false);

        let first: Vec<_> = list.ordered_enabled().map(|e| e.name()).collect();
        assert_eq!(first, vec!["a", "b"]);

        list.set_enabled(a, false).unwrap();
        list.set_enabled_by_name("c", true).unwrap();
        let second: Vec<_> = list.ordered_enabled().map(|e| e.name()).collect();
        assert_eq!(second, vec!["b", "c"]);
        assert_eq!(list.names(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_unknown_name_or_id() {
        let mut other = InstructionList::new();
        other.append(prompt("x"));
        let second = other.append(prompt("y"));

        let mut list = InstructionList::new();
        list.append(prompt("a"));

        assert!(matches!(
            list.set_enabled_by_name("missing", true),
            Err(InstrumentError::UnknownInstruction(_))
        ));
        assert!(matches!(
            list.set_enabled(second, true),
            Err(InstrumentError::UnknownInstruction(_))
        ));
    }

    #[test]
    fn test_same_operations_same_order() {
        let build = || {
            let mut list = InstructionList::new();
            list.append(prompt("a"));
            list.insert(0, prompt("b")).unwrap();
            list.append(prompt("c"));
            list.insert(1, prompt("d")).unwrap();
            list.names().into_iter().map(String::from).collect::<Vec<_>>()
        };
        assert_eq!(build(), build());
        assert_eq!(build(), vec!["b", "d", "a", "c"]);
    }
}
