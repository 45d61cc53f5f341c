//! Shape arithmetic shared by the compiler, marshaller and materializer.
//!
//! Dimensions are always listed innermost first: a host array of 2 rows of
//! 5 elements has dims `[5, 2]`. Everything downstream of argument
//! inspection works on dims padded to exactly three entries.

use crate::args::Argument;
use crate::device::RenderDevice;
use crate::error::{KernelError, KernelResult};

/// Width and height of a 2D texture, in texels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TexSize {
    pub width: u32,
    pub height: u32,
}

impl TexSize {
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Number of texels, each holding one encoded float.
    #[must_use]
    pub const fn texel_count(self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Largest side, used for device limit checks.
    #[must_use]
    pub fn max_side(self) -> u32 {
        self.width.max(self.height)
    }

    pub(crate) fn as_uniform(self) -> [f32; 4] {
        [self.width as f32, self.height as f32, 0.0, 0.0]
    }
}

/// Logical dimensions of an argument, innermost first.
///
/// Scalars have no shape and fail with [`KernelError::UnknownShape`].
pub fn dimensions_of<D: RenderDevice>(
    argument: &Argument<'_, D>,
    index: usize,
) -> KernelResult<Vec<usize>> {
    argument.dimensions(index)
}

/// Right-pads `dims` with ones to exactly three entries.
///
/// Callers validate the rank beforehand; entries past the third are ignored.
#[must_use]
pub fn pad_to_3(dims: &[usize]) -> [usize; 3] {
    let mut padded = [1; 3];
    for (slot, &dim) in padded.iter_mut().zip(dims) {
        *slot = dim;
    }
    padded
}

/// Number of elements in `dims`, or `None` when it overflows `usize`.
#[must_use]
pub fn element_count(dims: &[usize]) -> Option<usize> {
    dims.iter().try_fold(1usize, |count, &dim| count.checked_mul(dim))
}

/// Smallest square texture holding one texel per element of `dims`.
///
/// Counts that overflow saturate, so the side fails any device limit check.
#[must_use]
pub fn texture_size_for(dims: &[usize]) -> TexSize {
    let count = element_count(dims).unwrap_or(usize::MAX);
    let root = count.isqrt();
    let side = if root * root < count { root + 1 } else { root };
    let side = u32::try_from(side).unwrap_or(u32::MAX);
    TexSize::new(side, side)
}

/// Checks that `dims` has 1 to 3 entries, none of them zero, and that the
/// element count fits in `usize`.
pub fn validate_dims(dims: &[usize]) -> KernelResult<()> {
    if dims.is_empty() || dims.len() > 3 || dims.contains(&0) || element_count(dims).is_none() {
        return Err(KernelError::InvalidDimensions(dims.to_vec()));
    }
    Ok(())
}

/// Resolves the output dimensions for one call.
///
/// Explicit dimensions win. Otherwise the shape of the single argument is
/// used; any other argument count is ambiguous.
pub fn infer_output_dims<D: RenderDevice>(
    explicit: Option<&[usize]>,
    args: &[Argument<'_, D>],
) -> KernelResult<Vec<usize>> {
    let dims = match explicit {
        Some(dims) if !dims.is_empty() => dims.to_vec(),
        _ => match args {
            [single] => dimensions_of(single, 0)?,
            _ => return Err(KernelError::AmbiguousDimensions(args.len())),
        },
    };
    validate_dims(&dims)?;
    Ok(dims)
}

/// Output geometry of one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputShape {
    /// Dimensions as requested, innermost first.
    pub dims: Vec<usize>,
    pub padded: [usize; 3],
    pub tex_size: TexSize,
}

impl OutputShape {
    /// Graphical outputs render exactly `dims[0] x dims[1]` pixels instead of
    /// a square texture.
    pub fn new(dims: Vec<usize>, graphical: bool) -> KernelResult<Self> {
        validate_dims(&dims)?;
        let tex_size = if graphical {
            if dims.len() != 2 {
                return Err(KernelError::GraphicalDimension(dims.len()));
            }
            let side = |d: usize| u32::try_from(d).unwrap_or(u32::MAX);
            TexSize::new(side(dims[0]), side(dims[1]))
        } else {
            texture_size_for(&dims)
        };
        Ok(Self {
            padded: pad_to_3(&dims),
            dims,
            tex_size,
        })
    }

    pub(crate) fn check_limit(&self, limit: u32) -> KernelResult<()> {
        check_texture_limit(self.tex_size, limit)
    }
}

pub(crate) fn check_texture_limit(size: TexSize, limit: u32) -> KernelResult<()> {
    let side = size.max_side();
    if side > limit {
        return Err(KernelError::TextureTooLarge { side, limit });
    }
    Ok(())
}
