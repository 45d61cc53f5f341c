//! Kernel results on the host side.

use std::fmt;

use crate::codec::{self, Endianness};
use crate::device::RenderDevice;
use crate::error::{KernelError, KernelResult};
use crate::layout;
use crate::tensor::DeviceTensor;

/// What a kernel call returns, shaped after its output dimensions.
pub enum KernelOutput<D: RenderDevice> {
    /// Graphical kernels draw to the surface and return nothing.
    None,
    /// Rank 1: `dims[0]` values.
    Flat(Vec<f32>),
    /// Rank 2: `dims[1]` rows of `dims[0]` values.
    Rows(Vec<Vec<f32>>),
    /// Rank 3: `dims[2]` slices of `dims[1]` rows of `dims[0]` values.
    Slices(Vec<Vec<Vec<f32>>>),
    /// Result left on the device.
    Tensor(DeviceTensor<D>),
}

impl<D: RenderDevice> KernelOutput<D> {
    #[must_use]
    pub fn into_flat(self) -> Option<Vec<f32>> {
        match self {
            Self::Flat(values) => Some(values),
            _ => None,
        }
    }

    #[must_use]
    pub fn into_rows(self) -> Option<Vec<Vec<f32>>> {
        match self {
            Self::Rows(rows) => Some(rows),
            _ => None,
        }
    }

    #[must_use]
    pub fn into_slices(self) -> Option<Vec<Vec<Vec<f32>>>> {
        match self {
            Self::Slices(slices) => Some(slices),
            _ => None,
        }
    }

    #[must_use]
    pub fn into_tensor(self) -> Option<DeviceTensor<D>> {
        match self {
            Self::Tensor(tensor) => Some(tensor),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

impl<D: RenderDevice> fmt::Debug for KernelOutput<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Flat(values) => f.debug_tuple("Flat").field(values).finish(),
            Self::Rows(rows) => f.debug_tuple("Rows").field(rows).finish(),
            Self::Slices(slices) => f.debug_tuple("Slices").field(slices).finish(),
            Self::Tensor(tensor) => f.debug_tuple("Tensor").field(tensor).finish(),
        }
    }
}

/// Decodes read-back texels and reshapes them to `dims`.
///
/// Texels past `product(dims)` are padding and are discarded.
pub fn materialize<D: RenderDevice>(
    texels: &[u8],
    dims: &[usize],
    endianness: Endianness,
) -> KernelResult<KernelOutput<D>> {
    let count = layout::element_count(dims)
        .ok_or_else(|| KernelError::InvalidDimensions(dims.to_vec()))?;
    let values = codec::decode_texels(texels, count, endianness).ok_or_else(|| {
        KernelError::Device(format!(
            "read back {} texels but the output needs {count}",
            texels.len() / 4
        ))
    })?;
    reshape(values, dims)
}

/// Splits flat row-major values into the nesting given by `dims`.
pub fn reshape<D: RenderDevice>(values: Vec<f32>, dims: &[usize]) -> KernelResult<KernelOutput<D>> {
    layout::validate_dims(dims)?;
    match *dims {
        [_] => Ok(KernelOutput::Flat(values)),
        [width, _] => Ok(KernelOutput::Rows(
            values.chunks(width).map(<[f32]>::to_vec).collect(),
        )),
        [width, height, _] => Ok(KernelOutput::Slices(
            values
                .chunks(width * height)
                .map(|slice| slice.chunks(width).map(<[f32]>::to_vec).collect())
                .collect(),
        )),
        _ => Err(KernelError::InvalidDimensions(dims.to_vec())),
    }
}
