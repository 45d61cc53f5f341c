//! Call arguments and their conversion into GPU bindings.
//!
//! Each argument becomes exactly one of:
//!
//! - a uniform slot (`Scalar`),
//! - a texture uploaded from host memory (`Array`), reusing a per-kernel pooled
//!   texture when the position and size match the previous call,
//! - an existing texture (`Tensor`), bound without any upload.
//!
//! Texture parameters bind at `position + 1`; binding 0 is the uniform block.

use std::collections::HashMap;

use log::trace;
use rayon::prelude::*;

use crate::codec::{self, Endianness};
use crate::device::RenderDevice;
use crate::error::{KernelError, KernelResult};
use crate::layout::{self, OutputShape, TexSize};
use crate::program::{CompiledProgram, UniformBlock};
use crate::tensor::DeviceTensor;

/// Nested host data of rank 1 to 3.
///
/// Nesting is outermost first (`D2` is a list of rows), while dimensions are
/// reported innermost first.
#[derive(Debug, Clone, PartialEq)]
pub enum HostArray {
    D1(Vec<f32>),
    D2(Vec<Vec<f32>>),
    D3(Vec<Vec<Vec<f32>>>),
    /// Flat row-major data with explicit dims, innermost first.
    Shaped { dims: Vec<usize>, data: Vec<f32> },
}

impl HostArray {
    /// Dimensions innermost first.
    ///
    /// Fails for empty or ragged nesting and for ranks above 3.
    pub fn dimensions(&self, index: usize) -> KernelResult<Vec<usize>> {
        let unknown = |reason: &str| KernelError::UnknownShape {
            index,
            reason: reason.to_owned(),
        };

        let dims = match self {
            Self::D1(values) => vec![values.len()],
            Self::D2(rows) => {
                let width = rows.first().map_or(0, Vec::len);
                if rows.iter().any(|row| row.len() != width) {
                    return Err(unknown("rows have different lengths"));
                }
                vec![width, rows.len()]
            }
            Self::D3(slices) => {
                let height = slices.first().map_or(0, Vec::len);
                let width = slices
                    .first()
                    .and_then(|slice| slice.first())
                    .map_or(0, Vec::len);
                let ragged = slices.iter().any(|slice| {
                    slice.len() != height || slice.iter().any(|row| row.len() != width)
                });
                if ragged {
                    return Err(unknown("slices have different shapes"));
                }
                vec![width, height, slices.len()]
            }
            Self::Shaped { dims, data } => {
                if dims.len() > 3 {
                    return Err(KernelError::UnsupportedArgument {
                        index,
                        reason: format!("arrays of rank {} are not supported", dims.len()),
                    });
                }
                if layout::element_count(dims) != Some(data.len()) {
                    return Err(unknown("dims do not match the data length"));
                }
                dims.clone()
            }
        };

        if dims.is_empty() || dims.contains(&0) {
            return Err(unknown("array is empty"));
        }
        Ok(dims)
    }

    /// Row-major flat view of the data.
    #[must_use]
    pub fn flatten(&self) -> Vec<f32> {
        match self {
            Self::D1(values) | Self::Shaped { data: values, .. } => values.clone(),
            Self::D2(rows) => rows.concat(),
            Self::D3(slices) => slices.par_iter().flat_map_iter(|slice| slice.concat()).collect(),
        }
    }
}

impl From<Vec<f32>> for HostArray {
    fn from(values: Vec<f32>) -> Self {
        Self::D1(values)
    }
}

impl From<Vec<Vec<f32>>> for HostArray {
    fn from(rows: Vec<Vec<f32>>) -> Self {
        Self::D2(rows)
    }
}

impl From<Vec<Vec<Vec<f32>>>> for HostArray {
    fn from(slices: Vec<Vec<Vec<f32>>>) -> Self {
        Self::D3(slices)
    }
}

/// One kernel call argument.
pub enum Argument<'a, D: RenderDevice> {
    Scalar(f32),
    Array(HostArray),
    Tensor(&'a DeviceTensor<D>),
}

impl<D: RenderDevice> Argument<'_, D> {
    #[must_use]
    pub fn kind(&self) -> ArgKind {
        match self {
            Self::Scalar(_) => ArgKind::Scalar,
            Self::Array(_) => ArgKind::Array,
            Self::Tensor(_) => ArgKind::Tensor,
        }
    }

    /// Dimensions innermost first; see [`crate::layout::dimensions_of`].
    pub fn dimensions(&self, index: usize) -> KernelResult<Vec<usize>> {
        match self {
            Self::Scalar(_) => Err(KernelError::UnknownShape {
                index,
                reason: "scalars have no dimensions".into(),
            }),
            Self::Array(array) => array.dimensions(index),
            Self::Tensor(tensor) => Ok(tensor.dims().to_vec()),
        }
    }
}

impl<D: RenderDevice> std::fmt::Debug for Argument<'_, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Scalar(value) => f.debug_tuple("Scalar").field(value).finish(),
            Self::Array(array) => f.debug_tuple("Array").field(array).finish(),
            Self::Tensor(tensor) => f.debug_tuple("Tensor").field(tensor).finish(),
        }
    }
}

impl<D: RenderDevice> From<f32> for Argument<'_, D> {
    fn from(value: f32) -> Self {
        Self::Scalar(value)
    }
}

impl<D: RenderDevice> From<HostArray> for Argument<'_, D> {
    fn from(array: HostArray) -> Self {
        Self::Array(array)
    }
}

impl<D: RenderDevice> From<Vec<f32>> for Argument<'_, D> {
    fn from(values: Vec<f32>) -> Self {
        Self::Array(HostArray::D1(values))
    }
}

impl<D: RenderDevice> From<Vec<Vec<f32>>> for Argument<'_, D> {
    fn from(rows: Vec<Vec<f32>>) -> Self {
        Self::Array(HostArray::D2(rows))
    }
}

impl<D: RenderDevice> From<Vec<Vec<Vec<f32>>>> for Argument<'_, D> {
    fn from(slices: Vec<Vec<Vec<f32>>>) -> Self {
        Self::Array(HostArray::D3(slices))
    }
}

impl<'a, D: RenderDevice> From<&'a DeviceTensor<D>> for Argument<'a, D> {
    fn from(tensor: &'a DeviceTensor<D>) -> Self {
        Self::Tensor(tensor)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArgKind {
    Scalar,
    Array,
    Tensor,
}

/// Padded dims and backing texture size of an array or tensor argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArgShape {
    pub dims: [usize; 3],
    pub tex_size: TexSize,
}

/// What the program compiler needs to know about one parameter for one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamDescriptor {
    pub name: String,
    pub kind: ArgKind,
    /// `None` for scalars.
    pub shape: Option<ArgShape>,
}

/// Texture binding of the parameter at `position`.
#[must_use]
pub fn binding_for(position: usize) -> u32 {
    position as u32 + 1
}

/// Describes every argument of a call, validating arity, rank and sizes.
pub fn describe<D: RenderDevice>(
    device: &D,
    names: &[String],
    args: &[Argument<'_, D>],
) -> KernelResult<Vec<ParamDescriptor>> {
    if names.len() != args.len() {
        return Err(KernelError::ArityMismatch {
            expected: names.len(),
            actual: args.len(),
        });
    }

    let textures = args.iter().filter(|arg| arg.kind() != ArgKind::Scalar).count();
    let limit = device.max_texture_bindings();
    if textures > limit {
        let index = args
            .iter()
            .enumerate()
            .filter(|(_, arg)| arg.kind() != ArgKind::Scalar)
            .nth(limit)
            .map_or(0, |(index, _)| index);
        return Err(KernelError::UnsupportedArgument {
            index,
            reason: format!("the device samples at most {limit} textures per program"),
        });
    }

    names
        .iter()
        .zip(args)
        .enumerate()
        .map(|(index, (name, arg))| {
            let shape = match arg {
                Argument::Scalar(_) => None,
                Argument::Array(array) => {
                    let dims = array.dimensions(index)?;
                    let tex_size = layout::texture_size_for(&dims);
                    layout::check_texture_limit(tex_size, device.max_texture_side())?;
                    Some(ArgShape {
                        dims: layout::pad_to_3(&dims),
                        tex_size,
                    })
                }
                Argument::Tensor(tensor) => Some(ArgShape {
                    dims: layout::pad_to_3(tensor.dims()),
                    tex_size: tensor.size(),
                }),
            };
            Ok(ParamDescriptor {
                name: name.clone(),
                kind: arg.kind(),
                shape,
            })
        })
        .collect()
}

/// Input textures owned by one kernel, one slot per parameter position.
///
/// A slot is replaced when its argument changes size, so the pool never holds
/// more than one texture per parameter.
pub struct TexturePool<T> {
    slots: HashMap<usize, (TexSize, T)>,
}

impl<T> Default for TexturePool<T> {
    fn default() -> Self {
        Self {
            slots: HashMap::new(),
        }
    }
}

impl<T> TexturePool<T> {
    /// Returns the texture for `position`, allocating it when missing or
    /// sized differently.
    pub fn acquire(
        &mut self,
        position: usize,
        size: TexSize,
        create: impl FnOnce() -> KernelResult<T>,
    ) -> KernelResult<&T> {
        let reusable = matches!(self.slots.get(&position), Some((existing, _)) if *existing == size);
        if !reusable {
            trace!("allocating {}x{} input texture for parameter {position}", size.width, size.height);
            self.slots.insert(position, (size, create()?));
        }
        self.get(position, size).ok_or_else(|| {
            KernelError::Device(format!("input texture for parameter {position} is missing"))
        })
    }

    #[must_use]
    pub fn get(&self, position: usize, size: TexSize) -> Option<&T> {
        match self.slots.get(&position) {
            Some((existing, texture)) if *existing == size => Some(texture),
            _ => None,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Uploads host arrays and fills the uniform block for one draw.
pub fn marshal<D: RenderDevice>(
    device: &D,
    program: &CompiledProgram<D::Program>,
    params: &[ParamDescriptor],
    args: &[Argument<'_, D>],
    output: &OutputShape,
    pool: &mut TexturePool<D::Texture>,
    endianness: Endianness,
) -> KernelResult<UniformBlock> {
    let mut uniforms = program.uniforms.block();

    let [x, y, z] = output.padded.map(|d| d as f32);
    uniforms.set("output_dim", [x, y, z, 0.0]);
    uniforms.set("tex_size", output.tex_size.as_uniform());

    for (position, (param, arg)) in params.iter().zip(args).enumerate() {
        match (arg, param.shape) {
            (Argument::Scalar(value), _) => {
                uniforms.set(&format!("user_{}", param.name), [*value, 0.0, 0.0, 0.0]);
            }
            (Argument::Array(array), Some(shape)) => {
                let texels = codec::encode_texels(
                    &array.flatten(),
                    shape.tex_size.texel_count(),
                    endianness,
                );
                let texture = pool.acquire(position, shape.tex_size, || {
                    device.create_texture(shape.tex_size)
                })?;
                device.write_texture(texture, shape.tex_size, &texels)?;
                set_shape(&mut uniforms, &param.name, shape);
            }
            (Argument::Tensor(_), Some(shape)) => set_shape(&mut uniforms, &param.name, shape),
            (_, None) => {
                return Err(KernelError::UnknownShape {
                    index: position,
                    reason: "argument was described without a shape".into(),
                });
            }
        }
    }

    trace!("bound {} arguments", params.len());
    Ok(uniforms)
}

fn set_shape(uniforms: &mut UniformBlock, name: &str, shape: ArgShape) {
    let [x, y, z] = shape.dims.map(|d| d as f32);
    uniforms.set(&format!("user_{name}_dim"), [x, y, z, 0.0]);
    uniforms.set(&format!("user_{name}_size"), shape.tex_size.as_uniform());
}

/// `(binding, texture)` pairs for every array and tensor parameter.
///
/// Host arrays must have been uploaded by [`marshal`] first.
pub fn texture_bindings<'t, D: RenderDevice>(
    params: &[ParamDescriptor],
    args: &'t [Argument<'t, D>],
    pool: &'t TexturePool<D::Texture>,
) -> KernelResult<Vec<(u32, &'t D::Texture)>> {
    let mut bindings = Vec::new();
    for (position, (param, arg)) in params.iter().zip(args).enumerate() {
        let texture = match (arg, param.shape) {
            (Argument::Scalar(_), _) => continue,
            (Argument::Tensor(tensor), _) => tensor.texture(),
            (Argument::Array(_), Some(shape)) => pool.get(position, shape.tex_size).ok_or_else(|| {
                KernelError::Device(format!("parameter {position} was not uploaded"))
            })?,
            (Argument::Array(_), None) => {
                return Err(KernelError::UnknownShape {
                    index: position,
                    reason: "argument was described without a shape".into(),
                });
            }
        };
        bindings.push((binding_for(position), texture));
    }
    Ok(bindings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_dims_are_innermost_first() {
        let rows = HostArray::from(vec![vec![0.0; 5], vec![0.0; 5]]);
        assert_eq!(rows.dimensions(0).unwrap(), vec![5, 2]);

        let cube = HostArray::from(vec![vec![vec![0.0; 4]; 3]; 2]);
        assert_eq!(cube.dimensions(0).unwrap(), vec![4, 3, 2]);
    }

    #[test]
    fn ragged_and_empty_arrays_have_no_shape() {
        let ragged = HostArray::from(vec![vec![1.0, 2.0], vec![3.0]]);
        assert!(matches!(
            ragged.dimensions(2),
            Err(KernelError::UnknownShape { index: 2, .. })
        ));
        assert!(HostArray::D1(Vec::new()).dimensions(0).is_err());
        assert!(HostArray::D2(vec![Vec::new()]).dimensions(0).is_err());
    }

    #[test]
    fn deep_arrays_are_unsupported() {
        let deep = HostArray::Shaped {
            dims: vec![1, 1, 1, 2],
            data: vec![0.0, 1.0],
        };
        assert!(matches!(
            deep.dimensions(0),
            Err(KernelError::UnsupportedArgument { .. })
        ));
    }

    #[test]
    fn flatten_is_row_major() {
        let cube = HostArray::from(vec![
            vec![vec![0.0, 1.0], vec![2.0, 3.0]],
            vec![vec![4.0, 5.0], vec![6.0, 7.0]],
        ]);
        assert_eq!(cube.flatten(), (0..8).map(|v| v as f32).collect::<Vec<_>>());
    }

    #[test]
    fn pool_replaces_resized_slots() {
        let mut pool = TexturePool::default();
        let mut created = 0;
        let mut make = |id: u32| {
            created += 1;
            Ok::<u32, KernelError>(id)
        };

        assert_eq!(*pool.acquire(0, TexSize::new(2, 2), || make(1)).unwrap(), 1);
        assert_eq!(*pool.acquire(0, TexSize::new(2, 2), || make(2)).unwrap(), 1);
        assert_eq!(*pool.acquire(0, TexSize::new(3, 3), || make(3)).unwrap(), 3);
        assert_eq!(pool.len(), 1);
        assert!(pool.get(0, TexSize::new(2, 2)).is_none());
        assert_eq!(created, 2);
    }

    #[test]
    fn bindings_follow_positions() {
        assert_eq!(binding_for(0), 1);
        assert_eq!(binding_for(3), 4);
    }
}
