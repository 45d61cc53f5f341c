//! The graphics device seam.
//!
//! The engine never talks to a graphics API directly. It generates program
//! text, texel bytes and uniform blocks, then hands them to a [`RenderDevice`].
//! The default implementation is [`wgpu::WgpuDevice`]; tests drive the engine
//! with a host-side double.

#[cfg(feature = "wgpu")]
pub mod wgpu;

use crate::error::KernelResult;
pub use crate::layout::TexSize;
use crate::program::UniformBlock;

/// Program text and binding layout handed to [`RenderDevice::compile_program`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramSource {
    /// WGSL module with the `vs_main` entry point.
    pub vertex: String,
    /// WGSL module with the `fs_main` entry point.
    pub fragment: String,
    /// Size of the uniform block bound at `@binding(0)`.
    pub uniform_bytes: u64,
    /// Texture bindings in `@group(0)`, ascending.
    pub texture_bindings: Vec<u32>,
}

impl ProgramSource {
    /// Both stages, for diagnostics.
    #[must_use]
    pub fn full_text(&self) -> String {
        format!("{}\n{}", self.vertex, self.fragment)
    }
}

/// Where a draw lands.
pub enum RenderTarget<'a, T> {
    /// The device's visible surface, resized to the given size first.
    Surface(TexSize),
    /// A texture created by the caller.
    Texture(&'a T, TexSize),
}

impl<T> RenderTarget<'_, T> {
    #[must_use]
    pub fn size(&self) -> TexSize {
        match self {
            Self::Surface(size) | Self::Texture(_, size) => *size,
        }
    }
}

/// One full-screen quad draw.
pub struct DrawCall<'a, D: RenderDevice + ?Sized> {
    pub program: &'a D::Program,
    pub uniforms: &'a UniformBlock,
    /// `(binding, texture)` pairs, one per array or tensor parameter.
    pub textures: Vec<(u32, &'a D::Texture)>,
    pub target: RenderTarget<'a, D::Texture>,
}

/// Graphics operations the engine needs.
///
/// Textures are always `Rgba8Unorm`. Programs receive a uniform block at
/// `@group(0) @binding(0)` and one `texture_2d<f32>` per texture binding, and
/// draw a 4-vertex triangle strip over the whole target.
pub trait RenderDevice {
    type Texture;
    type Program;

    /// Largest texture side the device can allocate.
    fn max_texture_side(&self) -> u32;

    /// Number of textures one program can sample.
    fn max_texture_bindings(&self) -> usize;

    /// Compiles both stages and links them into a pipeline.
    fn compile_program(&self, source: &ProgramSource) -> KernelResult<Self::Program>;

    fn create_texture(&self, size: TexSize) -> KernelResult<Self::Texture>;

    /// Uploads `texels` (4 bytes per texel, rows packed tightly).
    fn write_texture(&self, texture: &Self::Texture, size: TexSize, texels: &[u8]) -> KernelResult<()>;

    fn draw(&self, call: DrawCall<'_, Self>) -> KernelResult<()>;

    /// Reads back every texel of `texture`, rows packed tightly.
    fn read_texture(&self, texture: &Self::Texture, size: TexSize) -> KernelResult<Vec<u8>>;

    /// Reads back the visible surface as last drawn.
    fn read_surface(&self) -> KernelResult<(TexSize, Vec<u8>)>;
}
