use log::trace;

use crate::codec::Endianness;
use crate::device::{DrawCall, RenderDevice, RenderTarget};
use crate::error::KernelResult;
use crate::layout::OutputShape;
use crate::output::{self, KernelOutput};
use crate::program::{CompiledProgram, UniformBlock};
use crate::tensor::DeviceTensor;

/// Where one call renders and what it hands back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    /// Draw to the visible surface and decode the pixels.
    Readback,
    /// Draw colours to the visible surface and return nothing.
    Graphical,
    /// Draw into a fresh texture owned by the returned tensor.
    Texture,
}

/// Issues the draw for one call and produces its result.
pub fn execute<D: RenderDevice>(
    device: &D,
    program: &CompiledProgram<D::Program>,
    uniforms: &UniformBlock,
    textures: Vec<(u32, &D::Texture)>,
    output: &OutputShape,
    destination: Destination,
    endianness: Endianness,
) -> KernelResult<KernelOutput<D>> {
    let size = output.tex_size;
    trace!(
        "drawing {}x{} texels for output {:?} ({destination:?})",
        size.width, size.height, output.dims
    );

    if destination == Destination::Texture {
        let texture = device.create_texture(size)?;
        device.draw(DrawCall {
            program: &program.program,
            uniforms,
            textures,
            target: RenderTarget::Texture(&texture, size),
        })?;
        return Ok(KernelOutput::Tensor(DeviceTensor::from_texture(
            texture,
            size,
            output.dims.clone(),
        )?));
    }

    device.draw(DrawCall {
        program: &program.program,
        uniforms,
        textures,
        target: RenderTarget::Surface(size),
    })?;

    if destination == Destination::Graphical {
        return Ok(KernelOutput::None);
    }

    let (surface, texels) = device.read_surface()?;
    debug_assert_eq!(surface, size);
    output::materialize(&texels, &output.dims, endianness)
}
