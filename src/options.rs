//! Kernel configuration.
//!
//! Options are assembled through [`crate::KernelBuilder`], validated once at
//! `build()`, and never change afterwards.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::{KernelError, KernelResult};
use crate::layout;
use crate::translate::is_identifier;

/// Which backend runs a kernel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Mode {
    /// This crate's render-pass engine.
    #[default]
    Gpu,
    /// A backend registered on [`crate::Gpu`] under this name.
    Named(String),
}

impl From<&str> for Mode {
    fn from(name: &str) -> Self {
        match name {
            "" | "gpu" => Self::Gpu,
            other => Self::Named(other.to_owned()),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gpu => f.write_str("gpu"),
            Self::Named(name) => f.write_str(name),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct KernelOptions {
    /// Output shape, innermost first. Inferred per call when `None`.
    pub dimensions: Option<Vec<usize>>,
    /// Render colours through `color(..)` onto the visible surface.
    pub graphical: bool,
    /// Log the full program text and attach it to compile errors.
    pub debug: bool,
    /// Value of `LOOP_MAX` in the program.
    pub loop_max_iterations: u32,
    /// Named constants, readable as `constants.<name>`.
    pub constants: BTreeMap<String, f32>,
    /// Wrap out-of-range array reads around each dimension.
    pub wraparound: bool,
    /// Bake argument shapes into the program instead of passing uniforms.
    pub hardcode_constants: bool,
    /// Keep the result on the device as a [`crate::DeviceTensor`].
    pub output_to_texture: bool,
    pub mode: Mode,
}

impl Default for KernelOptions {
    fn default() -> Self {
        Self {
            dimensions: None,
            graphical: false,
            debug: false,
            loop_max_iterations: 100,
            constants: BTreeMap::new(),
            wraparound: false,
            hardcode_constants: false,
            output_to_texture: false,
            mode: Mode::Gpu,
        }
    }
}

impl KernelOptions {
    pub fn validate(&self) -> KernelResult<()> {
        if let Some(dims) = &self.dimensions {
            layout::validate_dims(dims)?;
            if self.graphical && dims.len() != 2 {
                return Err(KernelError::GraphicalDimension(dims.len()));
            }
        }

        if self.loop_max_iterations == 0 {
            return Err(KernelError::InvalidKernelSpec(
                "loop_max_iterations must be at least 1".into(),
            ));
        }

        for (name, value) in &self.constants {
            if !is_identifier(name) {
                return Err(KernelError::InvalidKernelSpec(format!(
                    "constant name `{name}` is not an identifier"
                )));
            }
            if !value.is_finite() {
                return Err(KernelError::InvalidKernelSpec(format!(
                    "constant `{name}` is not finite"
                )));
            }
        }

        Ok(())
    }
}
