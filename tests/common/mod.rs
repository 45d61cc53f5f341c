#![allow(dead_code)]

use std::cell::{Cell, RefCell};

use texel_kernels::codec;
use texel_kernels::device::{DrawCall, ProgramSource, RenderDevice, RenderTarget};
use texel_kernels::program::UniformBlock;
use texel_kernels::{Endianness, KernelError, KernelResult, TexSize};

/// One emulated fragment invocation.
pub struct Invocation<'a> {
    pub index: usize,
    /// `[x, y, z]` output coordinate.
    pub thread: [usize; 3],
    inputs: &'a [(u32, Vec<f32>)],
    uniforms: &'a UniformBlock,
}

impl Invocation<'_> {
    /// Decoded contents of the texture bound at `binding`.
    pub fn input(&self, binding: u32) -> &[f32] {
        self.inputs
            .iter()
            .find(|(bound, _)| *bound == binding)
            .map(|(_, values)| values.as_slice())
            .unwrap_or_else(|| panic!("nothing bound at {binding}"))
    }

    pub fn scalar(&self, name: &str) -> f32 {
        self.uniforms
            .get(&format!("user_{name}"))
            .unwrap_or_else(|| panic!("no uniform for `{name}`"))[0]
    }
}

pub struct MockTexture {
    pub size: TexSize,
    data: RefCell<Vec<u8>>,
}

pub struct MockProgram {
    pub source: ProgramSource,
}

type Emulator = Box<dyn Fn(&Invocation<'_>) -> f32>;

/// Host-side device that runs kernels through a closure instead of WGSL.
pub struct RecordingDevice {
    emulate: Emulator,
    endianness: Endianness,
    pub max_side: u32,
    pub max_bindings: usize,
    pub reject_programs: bool,
    compiles: Cell<usize>,
    draws: Cell<usize>,
    uploads: Cell<usize>,
    textures_created: Cell<usize>,
    fragments: RefCell<Vec<String>>,
    surface: RefCell<Option<(TexSize, Vec<u8>)>>,
}

impl RecordingDevice {
    pub fn new(emulate: impl Fn(&Invocation<'_>) -> f32 + 'static) -> Self {
        Self {
            emulate: Box::new(emulate),
            endianness: Endianness::host(),
            max_side: 8192,
            max_bindings: 16,
            reject_programs: false,
            compiles: Cell::new(0),
            draws: Cell::new(0),
            uploads: Cell::new(0),
            textures_created: Cell::new(0),
            fragments: RefCell::new(Vec::new()),
            surface: RefCell::new(None),
        }
    }

    pub fn with_endianness(mut self, endianness: Endianness) -> Self {
        self.endianness = endianness;
        self
    }

    pub fn compiles(&self) -> usize {
        self.compiles.get()
    }

    pub fn draws(&self) -> usize {
        self.draws.get()
    }

    pub fn uploads(&self) -> usize {
        self.uploads.get()
    }

    pub fn textures_created(&self) -> usize {
        self.textures_created.get()
    }

    /// Fragment stage of every program compiled so far.
    pub fn fragments(&self) -> Vec<String> {
        self.fragments.borrow().clone()
    }
}

impl RenderDevice for RecordingDevice {
    type Texture = MockTexture;
    type Program = MockProgram;

    fn max_texture_side(&self) -> u32 {
        self.max_side
    }

    fn max_texture_bindings(&self) -> usize {
        self.max_bindings
    }

    fn compile_program(&self, source: &ProgramSource) -> KernelResult<MockProgram> {
        self.fragments.borrow_mut().push(source.fragment.clone());
        if self.reject_programs {
            return Err(KernelError::ShaderCompile {
                log: "rejected by test device".into(),
                program_text: None,
            });
        }
        self.compiles.set(self.compiles.get() + 1);
        Ok(MockProgram {
            source: source.clone(),
        })
    }

    fn create_texture(&self, size: TexSize) -> KernelResult<MockTexture> {
        self.textures_created.set(self.textures_created.get() + 1);
        Ok(MockTexture {
            size,
            data: RefCell::new(vec![0; size.texel_count() * 4]),
        })
    }

    fn write_texture(&self, texture: &MockTexture, size: TexSize, texels: &[u8]) -> KernelResult<()> {
        assert_eq!(texture.size, size);
        assert_eq!(texels.len(), size.texel_count() * 4);
        self.uploads.set(self.uploads.get() + 1);
        texture.data.borrow_mut().copy_from_slice(texels);
        Ok(())
    }

    fn draw(&self, call: DrawCall<'_, Self>) -> KernelResult<()> {
        self.draws.set(self.draws.get() + 1);
        for (binding, _) in &call.textures {
            assert!(call.program.source.texture_bindings.contains(binding));
        }

        let size = call.target.size();
        let output_dim = call
            .uniforms
            .get("output_dim")
            .ok_or_else(|| KernelError::Device("output_dim is not bound".into()))?;
        let [x, y, _, _] = output_dim.map(|d| d as usize);

        let inputs: Vec<(u32, Vec<f32>)> = call
            .textures
            .iter()
            .map(|&(binding, texture)| {
                let texels = texture.data.borrow();
                let values = codec::decode_texels(&texels, texture.size.texel_count(), self.endianness)
                    .unwrap_or_default();
                (binding, values)
            })
            .collect();

        let mut texels = vec![0u8; size.texel_count() * 4];
        for (index, texel) in texels.chunks_exact_mut(4).enumerate() {
            let invocation = Invocation {
                index,
                thread: [index % x, (index / x) % y, index / (x * y)],
                inputs: &inputs,
                uniforms: call.uniforms,
            };
            texel.copy_from_slice(&codec::encode((self.emulate)(&invocation), self.endianness));
        }

        match call.target {
            RenderTarget::Surface(size) => *self.surface.borrow_mut() = Some((size, texels)),
            RenderTarget::Texture(texture, _) => *texture.data.borrow_mut() = texels,
        }
        Ok(())
    }

    fn read_texture(&self, texture: &MockTexture, _size: TexSize) -> KernelResult<Vec<u8>> {
        Ok(texture.data.borrow().clone())
    }

    fn read_surface(&self) -> KernelResult<(TexSize, Vec<u8>)> {
        self.surface
            .borrow()
            .clone()
            .ok_or_else(|| KernelError::Device("nothing drawn".into()))
    }
}
