use std::fmt;

use log::trace;

use crate::device::RenderDevice;
use crate::error::{KernelError, KernelResult};
use crate::gpu::Gpu;
use crate::layout::{self, TexSize};
use crate::output::{self, KernelOutput};

/// Float data resident in a device texture.
///
/// Produced by kernels built with `output_to_texture(true)` and accepted as
/// an argument by any kernel on the same device, so results can be chained
/// without a readback. The texture is released when the tensor is dropped.
pub struct DeviceTensor<D: RenderDevice> {
    texture: D::Texture,
    size: TexSize,
    dims: Vec<usize>,
}

impl<D: RenderDevice> DeviceTensor<D> {
    /// Wraps a texture that already holds codec-encoded floats.
    ///
    /// `dims` are innermost first and must fit in `size`.
    pub fn from_texture(texture: D::Texture, size: TexSize, dims: Vec<usize>) -> KernelResult<Self> {
        layout::validate_dims(&dims)?;
        if layout::element_count(&dims).is_none_or(|count| count > size.texel_count()) {
            return Err(KernelError::InvalidDimensions(dims));
        }
        Ok(Self { texture, size, dims })
    }

    #[must_use]
    pub fn texture(&self) -> &D::Texture {
        &self.texture
    }

    #[must_use]
    pub fn size(&self) -> TexSize {
        self.size
    }

    /// Logical dimensions, innermost first.
    #[must_use]
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Reads the texture back and shapes it like a readback kernel result.
    ///
    /// `gpu` must wrap the device the tensor was created on.
    pub fn to_host(&self, gpu: &Gpu<D>) -> KernelResult<KernelOutput<D>> {
        trace!("reading back {}x{} tensor texture", self.size.width, self.size.height);
        let texels = gpu.device().read_texture(&self.texture, self.size)?;
        output::materialize(&texels, &self.dims, gpu.endianness())
    }

    /// Gives up ownership of the texture.
    #[must_use]
    pub fn into_texture(self) -> D::Texture {
        self.texture
    }
}

impl<D: RenderDevice> fmt::Debug for DeviceTensor<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceTensor")
            .field("size", &self.size)
            .field("dims", &self.dims)
            .finish_non_exhaustive()
    }
}
