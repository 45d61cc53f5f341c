//! texel_kernels: per-element GPU kernels over n-dimensional data.
//!
//! A kernel is an ordinary function of its arguments that is evaluated once
//! per output element, in parallel, by rendering a full-screen quad into a
//! texture large enough to hold the output. Floats travel through `Rgba8Unorm`
//! textures using an IEEE-754 byte codec, so any device that can render to an
//! 8-bit texture can run kernels.
//!
//! # Pipeline
//!
//! 1. [`layout`] infers the output shape and the square texture holding it.
//! 2. [`program`] generates WGSL for the call signature and caches the
//!    compiled result per kernel.
//! 3. [`args`] uploads host arrays, binds device tensors and fills uniforms.
//! 4. [`dispatch`] issues one draw over the target.
//! 5. [`output`] decodes and reshapes the pixels, unless the result stays on
//!    the device as a [`DeviceTensor`].
//!
//! # Modules
//!
//! - [`codec`]: host and WGSL versions of the float codec.
//! - [`translate`]: kernel parsing and the [`BodyTranslator`] seam.
//! - [`device`]: the [`RenderDevice`] seam and its WGPU implementation.
//! - [`options`]: kernel configuration.
//!
//! # Example
//!
//! ```rust,no_run
//! use texel_kernels::{Argument, Gpu};
//!
//! let gpu = Gpu::shared()?;
//! let mut add = gpu
//!     .create_kernel("fn add(a, b) { return a[thread_id.x] + b[thread_id.x]; }")
//!     .dimensions([4])
//!     .build()?;
//!
//! let sum = add.run(&[
//!     Argument::from(vec![1.0, 2.0, 3.0, 4.0]),
//!     Argument::from(vec![10.0, 20.0, 30.0, 40.0]),
//! ])?;
//! assert_eq!(sum.into_flat(), Some(vec![11.0, 22.0, 33.0, 44.0]));
//! # Ok::<(), texel_kernels::KernelError>(())
//! ```

pub mod args;
pub mod codec;
pub mod device;
pub mod dispatch;
pub mod error;
pub mod gpu;
pub mod kernel;
pub mod layout;
pub mod options;
pub mod output;
pub mod program;
pub mod tensor;
pub mod translate;

pub use args::{ArgKind, Argument, HostArray, ParamDescriptor};
pub use codec::Endianness;
pub use device::{RenderDevice, TexSize};
#[cfg(feature = "wgpu")]
pub use device::wgpu::WgpuDevice;
pub use error::{KernelError, KernelResult};
pub use gpu::{Gpu, ModeFactory};
pub use kernel::{Kernel, KernelBuilder, KernelRunner};
pub use options::{KernelOptions, Mode};
pub use output::KernelOutput;
pub use tensor::DeviceTensor;
pub use translate::{BodyTranslator, KernelFunction, WgslTranslator};
