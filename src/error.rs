//! Error taxonomy for kernel construction and execution.
//!
//! Every failure is raised synchronously at the offending call. Nothing is
//! retried internally: a program that failed to compile for one signature
//! will fail the same way for every later call with that signature.

/// Everything that can go wrong while building or running a kernel.
#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    /// The kernel source is not a function of the form `fn name(..) { .. }`.
    #[error("invalid kernel source: {0}")]
    InvalidKernelSpec(String),

    /// Output dimensions were not configured and could not be inferred,
    /// because the call did not have exactly one argument.
    #[error("auto dimensions are only supported for kernels with exactly one argument (got {0})")]
    AmbiguousDimensions(usize),

    /// An argument's shape could not be determined.
    #[error("unknown shape for argument {index}: {reason}")]
    UnknownShape {
        /// Position of the argument in the call.
        index: usize,
        /// What made the shape undeterminable.
        reason: String,
    },

    /// The argument cannot be bound to the generated program.
    #[error("unsupported argument {index}: {reason}")]
    UnsupportedArgument {
        /// Position of the argument in the call.
        index: usize,
        /// Why it was rejected.
        reason: String,
    },

    /// Graphical output was requested for an output that is not 2D.
    #[error("output must have 2 dimensions in graphical mode (got {0})")]
    GraphicalDimension(usize),

    /// The output dimensions are empty, too deep, or contain a zero extent.
    #[error("invalid output dimensions {0:?}: expected 1 to 3 non-zero extents")]
    InvalidDimensions(Vec<usize>),

    /// The call passed a different number of arguments than the kernel declares.
    #[error("kernel declares {expected} parameters but was called with {actual} arguments")]
    ArityMismatch {
        /// Declared parameter count.
        expected: usize,
        /// Arguments supplied.
        actual: usize,
    },

    /// A texture side would exceed what the device can allocate.
    #[error("texture of {side}x{side} texels exceeds the device limit of {limit}")]
    TextureTooLarge {
        /// Required side length.
        side: u32,
        /// Device maximum side length.
        limit: u32,
    },

    /// The generated shader module failed to compile.
    #[error("shader compilation failed: {log}")]
    ShaderCompile {
        /// Diagnostic reported by the shader compiler.
        log: String,
        /// Full program text, kept only when the kernel runs in debug mode.
        program_text: Option<String>,
    },

    /// The compiled stages could not be linked into a pipeline.
    #[error("shader link failed: {log}")]
    ShaderLink {
        /// Diagnostic reported when creating the pipeline.
        log: String,
        /// Full program text, kept only when the kernel runs in debug mode.
        program_text: Option<String>,
    },

    /// `mode(name)` named a backend nobody registered.
    #[error("no kernel backend registered for mode `{0}`")]
    UnsupportedMode(String),

    /// The graphics device failed outside of shader compilation.
    #[error("device error: {0}")]
    Device(String),
}

/// Convenience alias used throughout the crate.
pub type KernelResult<T> = Result<T, KernelError>;
