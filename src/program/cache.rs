use std::collections::HashMap;
use std::collections::hash_map::Entry;

use log::debug;

use super::{CompiledProgram, ProgramKey};
use crate::error::KernelResult;

/// Per-kernel memo of compiled programs.
///
/// Append-only: entries live as long as the kernel. A failed compile leaves
/// no entry behind.
pub struct ProgramCache<P> {
    programs: HashMap<ProgramKey, CompiledProgram<P>>,
    compiles: usize,
}

impl<P> Default for ProgramCache<P> {
    fn default() -> Self {
        Self {
            programs: HashMap::new(),
            compiles: 0,
        }
    }
}

impl<P> ProgramCache<P> {
    /// Returns the program for `key`, compiling it on a miss.
    pub fn get_or_compile(
        &mut self,
        key: ProgramKey,
        compile: impl FnOnce() -> KernelResult<CompiledProgram<P>>,
    ) -> KernelResult<&CompiledProgram<P>> {
        match self.programs.entry(key) {
            Entry::Occupied(entry) => {
                debug!("program cache hit");
                Ok(entry.into_mut())
            }
            Entry::Vacant(entry) => {
                let program = compile()?;
                self.compiles += 1;
                debug!("program cache miss, {} programs compiled", self.compiles);
                Ok(entry.insert(program))
            }
        }
    }

    /// Number of successful compiles so far.
    #[must_use]
    pub fn compiles(&self) -> usize {
        self.compiles
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.programs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }
}
