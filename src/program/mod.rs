//! Program generation.
//!
//! A kernel call is turned into a vertex stage that forwards a full-screen
//! quad and a fragment stage that, for every output texel:
//!
//! 1. computes its flat thread index from the interpolated texture coordinate,
//! 2. decomposes it into `thread_id` using the output dimensions,
//! 3. runs the translated kernel body,
//! 4. writes either `actual_color` (graphical) or `encode32(kernel_result)`.
//!
//! Argument shapes reach the program as uniforms, or as WGSL `const`s when
//! `hardcode_constants` is set. In the latter case the shapes are part of
//! the [`ProgramKey`], so every distinct shape compiles its own program.

pub mod cache;
mod uniforms;

use bytemuck::{Pod, Zeroable};
use log::debug;

pub use cache::ProgramCache;
pub use uniforms::{UniformBlock, UniformLayout};

use crate::args::{self, ArgKind, ArgShape, ParamDescriptor};
use crate::codec::{self, Endianness};
use crate::device::{ProgramSource, RenderDevice};
use crate::error::{KernelError, KernelResult};
use crate::layout::OutputShape;
use crate::options::KernelOptions;
use crate::translate::{BodyTranslator, KernelFunction};

/// One vertex of the full-screen quad.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct QuadVertex {
    pub position: [f32; 2],
    pub tex_coord: [f32; 2],
}

/// Triangle strip covering clip space; texture row 0 sits at the top.
pub const QUAD: [QuadVertex; 4] = [
    QuadVertex { position: [-1.0, 1.0], tex_coord: [0.0, 0.0] },
    QuadVertex { position: [1.0, 1.0], tex_coord: [1.0, 0.0] },
    QuadVertex { position: [-1.0, -1.0], tex_coord: [0.0, 1.0] },
    QuadVertex { position: [1.0, -1.0], tex_coord: [1.0, 1.0] },
];

pub const VERTEX_SHADER: &str = r"struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) tex_coord: vec2<f32>,
};

@vertex
fn vs_main(@location(0) a_position: vec2<f32>, @location(1) a_tex_coord: vec2<f32>) -> VertexOutput {
    var out: VertexOutput;
    out.position = vec4<f32>(a_position, 0.0, 1.0);
    out.tex_coord = a_tex_coord;
    return out;
}
";

/// Identity of a generated program.
///
/// Two calls with equal keys can share one compiled program.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProgramKey {
    kinds: Vec<ArgKind>,
    shapes: Vec<Option<ArgShape>>,
    output: Option<[usize; 3]>,
    flags: u8,
    constants: Vec<(String, u32)>,
}

impl ProgramKey {
    pub const WRAPAROUND: u8 = 1 << 0;
    pub const HARDCODE: u8 = 1 << 1;

    #[must_use]
    pub fn new(params: &[ParamDescriptor], options: &KernelOptions, output: &OutputShape) -> Self {
        let hardcode = options.hardcode_constants;

        let mut flags = 0;
        if options.wraparound {
            flags |= Self::WRAPAROUND;
        }
        if hardcode {
            flags |= Self::HARDCODE;
        }

        Self {
            kinds: params.iter().map(|param| param.kind).collect(),
            shapes: if hardcode {
                params.iter().map(|param| param.shape).collect()
            } else {
                Vec::new()
            },
            output: hardcode.then_some(output.padded),
            flags,
            constants: options
                .constants
                .iter()
                .map(|(name, value)| (name.clone(), value.to_bits()))
                .collect(),
        }
    }

    #[must_use]
    pub fn flags(&self) -> u8 {
        self.flags
    }
}

/// A program ready to draw, plus what the marshaller needs to feed it.
#[derive(Debug)]
pub struct CompiledProgram<P> {
    pub program: P,
    pub uniforms: UniformLayout,
    /// `(parameter position, binding)` for texture parameters.
    pub texture_bindings: Vec<(usize, u32)>,
}

/// Everything that determines one program's text.
pub struct ProgramRequest<'a> {
    pub function: &'a KernelFunction,
    pub helpers: &'a [KernelFunction],
    pub params: &'a [ParamDescriptor],
    pub options: &'a KernelOptions,
    pub output: &'a OutputShape,
    pub endianness: Endianness,
}

impl ProgramRequest<'_> {
    /// Generates both stages and the uniform layout.
    pub fn generate(
        &self,
        translator: &dyn BodyTranslator,
    ) -> KernelResult<(ProgramSource, UniformLayout, Vec<(usize, u32)>)> {
        let hardcode = self.options.hardcode_constants;

        let mut layout = UniformLayout::default();
        layout.push("output_dim");
        layout.push("tex_size");
        for param in self.params {
            match param.kind {
                ArgKind::Scalar => layout.push(format!("user_{}", param.name)),
                ArgKind::Array | ArgKind::Tensor if !hardcode => {
                    layout.push(format!("user_{}_dim", param.name));
                    layout.push(format!("user_{}_size", param.name));
                }
                _ => {}
            }
        }

        let texture_bindings: Vec<(usize, u32)> = self
            .params
            .iter()
            .enumerate()
            .filter(|(_, param)| param.kind != ArgKind::Scalar)
            .map(|(position, _)| (position, args::binding_for(position)))
            .collect();

        let mut fragment = String::new();
        fragment.push_str(&format!(
            "const LOOP_MAX: f32 = {};\nconst OUTPUT_TO_COLOR: bool = {};\n\n",
            float_literal(self.options.loop_max_iterations as f32),
            self.options.graphical,
        ));
        fragment.push_str(&layout.wgsl());
        fragment.push('\n');
        fragment.push_str(&self.output_declarations());
        fragment.push_str(&addressing_helpers(self.options.wraparound));
        fragment.push_str(&codec::wgsl_source(self.endianness));
        fragment.push('\n');
        fragment.push_str(&self.parameter_declarations()?);
        for (name, value) in &self.options.constants {
            fragment.push_str(&format!("const constants_{name}: f32 = {};\n", float_literal(*value)));
        }
        fragment.push('\n');
        for helper in self.helpers {
            fragment.push_str(&translator.translate(helper, &[], false)?);
            fragment.push('\n');
        }
        fragment.push_str(&translator.translate(self.function, self.params, true)?);
        fragment.push('\n');
        fragment.push_str(&self.entry_point());

        let source = ProgramSource {
            vertex: VERTEX_SHADER.to_owned(),
            fragment,
            uniform_bytes: layout.byte_size(),
            texture_bindings: texture_bindings.iter().map(|&(_, binding)| binding).collect(),
        };
        Ok((source, layout, texture_bindings))
    }

    fn output_declarations(&self) -> String {
        if self.options.hardcode_constants {
            format!(
                "const u_output_dim: vec3<f32> = {};\nconst u_tex_size: vec2<f32> = {};\n\n",
                vec3_literal(self.output.padded),
                vec2_literal(self.output.tex_size.width, self.output.tex_size.height),
            )
        } else {
            "var<private> u_output_dim: vec3<f32>;\nvar<private> u_tex_size: vec2<f32>;\n\n".to_owned()
        }
    }

    fn parameter_declarations(&self) -> KernelResult<String> {
        let mut text = String::new();
        for (position, param) in self.params.iter().enumerate() {
            let name = &param.name;
            if param.kind == ArgKind::Scalar {
                text.push_str(&format!("var<private> user_{name}: f32;\n\n"));
                continue;
            }

            let binding = args::binding_for(position);
            text.push_str(&format!(
                "@group(0) @binding({binding}) var user_{name}: texture_2d<f32>;\n"
            ));
            match (self.options.hardcode_constants, param.shape) {
                (true, Some(shape)) => text.push_str(&format!(
                    "const user_{name}_size: vec2<f32> = {};\nconst user_{name}_dim: vec3<f32> = {};\n",
                    vec2_literal(shape.tex_size.width, shape.tex_size.height),
                    vec3_literal(shape.dims),
                )),
                (true, None) => {
                    return Err(KernelError::UnknownShape {
                        index: position,
                        reason: "cannot bake a parameter without a shape".into(),
                    });
                }
                (false, _) => text.push_str(&format!(
                    "var<private> user_{name}_size: vec2<f32>;\nvar<private> user_{name}_dim: vec3<f32>;\n"
                )),
            }
            text.push_str(&format!(
                "fn user_{name}_1(x: f32) -> f32 {{\n    return get_1d(user_{name}, user_{name}_size, user_{name}_dim, x);\n}}\n\
                 fn user_{name}_2(y: f32, x: f32) -> f32 {{\n    return get_2d(user_{name}, user_{name}_size, user_{name}_dim, y, x);\n}}\n\
                 fn user_{name}_3(z: f32, y: f32, x: f32) -> f32 {{\n    return get_3d(user_{name}, user_{name}_size, user_{name}_dim, z, y, x);\n}}\n\n"
            ));
        }
        Ok(text)
    }

    fn entry_point(&self) -> String {
        let hardcode = self.options.hardcode_constants;
        let mut setup = String::new();
        if !hardcode {
            setup.push_str("    u_output_dim = kernel_uniforms.output_dim.xyz;\n");
            setup.push_str("    u_tex_size = kernel_uniforms.tex_size.xy;\n");
        }
        for param in self.params {
            let name = &param.name;
            match param.kind {
                ArgKind::Scalar => {
                    setup.push_str(&format!("    user_{name} = kernel_uniforms.user_{name}.x;\n"));
                }
                _ if !hardcode => {
                    setup.push_str(&format!("    user_{name}_dim = kernel_uniforms.user_{name}_dim.xyz;\n"));
                    setup.push_str(&format!("    user_{name}_size = kernel_uniforms.user_{name}_size.xy;\n"));
                }
                _ => {}
            }
        }

        format!(
            r"@fragment
fn fs_main(@location(0) v_tex_coord: vec2<f32>) -> @location(0) vec4<f32> {{
{setup}    let texel = vec2<i32>(floor(v_tex_coord * u_tex_size));
    let flat_index = texel.y * i32(u_tex_size.x + 0.5) + texel.x;
    thread_index = f32(flat_index);
    thread_id = index_to_3d(flat_index, u_output_dim);
    kernel();
    if (OUTPUT_TO_COLOR) {{
        return actual_color;
    }}
    return encode32(kernel_result);
}}
"
        )
    }
}

fn addressing_helpers(wraparound: bool) -> String {
    let wrap = if wraparound {
        "    coord = coord - tex_dim * floor(coord / tex_dim);\n"
    } else {
        ""
    };

    format!(
        r"var<private> kernel_result: f32 = 0.0;
var<private> thread_index: f32 = 0.0;
var<private> thread_id: vec3<f32>;
var<private> actual_color: vec4<f32> = vec4<f32>(0.0, 0.0, 0.0, 1.0);

fn integer_mod(x: f32, y: f32) -> f32 {{
    let res = x - y * floor(x / y);
    return select(res, 0.0, res > y - 0.5);
}}

fn integer_mod_i(x: i32, y: i32) -> i32 {{
    return ((x % y) + y) % y;
}}

fn index_to_3d(index: i32, dim: vec3<f32>) -> vec3<f32> {{
    let size = vec3<i32>(dim + 0.5);
    let x = integer_mod_i(index, size.x);
    let y = integer_mod_i(index / size.x, size.y);
    let z = index / (size.x * size.y);
    return vec3<f32>(f32(x), f32(y), f32(z));
}}

fn get_3d(tex: texture_2d<f32>, tex_size: vec2<f32>, tex_dim: vec3<f32>, z: f32, y: f32, x: f32) -> f32 {{
    var coord = floor(vec3<f32>(x, y, z) + 0.5);
{wrap}    let dim = vec3<i32>(tex_dim + 0.5);
    let at = vec3<i32>(coord);
    let index = at.x + dim.x * (at.y + dim.y * at.z);
    let width = i32(tex_size.x + 0.5);
    return decode32(textureLoad(tex, vec2<i32>(index % width, index / width), 0));
}}

fn get_2d(tex: texture_2d<f32>, tex_size: vec2<f32>, tex_dim: vec3<f32>, y: f32, x: f32) -> f32 {{
    return get_3d(tex, tex_size, tex_dim, 0.0, y, x);
}}

fn get_1d(tex: texture_2d<f32>, tex_size: vec2<f32>, tex_dim: vec3<f32>, x: f32) -> f32 {{
    return get_3d(tex, tex_size, tex_dim, 0.0, 0.0, x);
}}

fn color4(r: f32, g: f32, b: f32, a: f32) {{
    actual_color = vec4<f32>(r, g, b, a);
}}

fn color3(r: f32, g: f32, b: f32) {{
    color4(r, g, b, 1.0);
}}

"
    )
}

/// WGSL literal that round-trips `value`.
fn float_literal(value: f32) -> String {
    format!("{value:?}")
}

fn vec2_literal(x: u32, y: u32) -> String {
    format!("vec2<f32>({x}.0, {y}.0)")
}

fn vec3_literal(dims: [usize; 3]) -> String {
    let [x, y, z] = dims;
    format!("vec3<f32>({x}.0, {y}.0, {z}.0)")
}

/// Generates, compiles and links the program for one key.
///
/// In debug mode the program text is logged and attached to compile errors.
pub fn compile<D: RenderDevice>(
    device: &D,
    translator: &dyn BodyTranslator,
    request: &ProgramRequest<'_>,
) -> KernelResult<CompiledProgram<D::Program>> {
    let (source, uniforms, texture_bindings) = request.generate(translator)?;
    let debug_mode = request.options.debug;
    if debug_mode {
        debug!(
            "program for kernel `{}`:\n{}",
            request.function.name,
            source.full_text()
        );
    }

    let program = device.compile_program(&source).map_err(|err| match err {
        KernelError::ShaderCompile { log, .. } => KernelError::ShaderCompile {
            log,
            program_text: debug_mode.then(|| source.full_text()),
        },
        KernelError::ShaderLink { log, .. } => KernelError::ShaderLink {
            log,
            program_text: debug_mode.then(|| source.full_text()),
        },
        other => other,
    })?;

    debug!(
        "compiled kernel `{}` with {} uniform slots and {} textures",
        request.function.name,
        uniforms.fields().len(),
        texture_bindings.len()
    );
    Ok(CompiledProgram {
        program,
        uniforms,
        texture_bindings,
    })
}
