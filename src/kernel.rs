//! Kernel construction and the per-call pipeline.

use std::sync::Arc;

use log::debug;

use crate::args::{self, Argument, TexturePool};
use crate::codec::Endianness;
use crate::device::RenderDevice;
use crate::dispatch::{self, Destination};
use crate::error::{KernelError, KernelResult};
use crate::gpu::Gpu;
use crate::layout::{self, OutputShape, TexSize};
use crate::options::{KernelOptions, Mode};
use crate::output::KernelOutput;
use crate::program::{self, ProgramCache, ProgramKey, ProgramRequest};
use crate::translate::{BodyTranslator, KernelFunction};

/// A backend able to run a kernel, selected through [`KernelBuilder::mode`].
pub trait KernelRunner<D: RenderDevice> {
    fn run(&mut self, args: &[Argument<'_, D>]) -> KernelResult<KernelOutput<D>>;
}

/// Fluent kernel configuration, obtained from [`Gpu::create_kernel`].
#[must_use = "a kernel builder does nothing until `build` is called"]
pub struct KernelBuilder<'g, D: RenderDevice> {
    gpu: &'g Gpu<D>,
    source: String,
    helpers: Vec<String>,
    options: KernelOptions,
}

impl<'g, D: RenderDevice> KernelBuilder<'g, D> {
    pub(crate) fn new(gpu: &'g Gpu<D>, source: &str) -> Self {
        Self {
            gpu,
            source: source.to_owned(),
            helpers: Vec::new(),
            options: KernelOptions::default(),
        }
    }

    /// Output shape, innermost first. Without it the shape of the only
    /// argument is used.
    pub fn dimensions(mut self, dims: impl Into<Vec<usize>>) -> Self {
        self.options.dimensions = Some(dims.into());
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.options.debug = debug;
        self
    }

    pub fn graphical(mut self, graphical: bool) -> Self {
        self.options.graphical = graphical;
        self
    }

    pub fn loop_max_iterations(mut self, max: u32) -> Self {
        self.options.loop_max_iterations = max;
        self
    }

    pub fn constant(mut self, name: impl Into<String>, value: f32) -> Self {
        self.options.constants.insert(name.into(), value);
        self
    }

    pub fn constants<K: Into<String>>(mut self, constants: impl IntoIterator<Item = (K, f32)>) -> Self {
        self.options
            .constants
            .extend(constants.into_iter().map(|(name, value)| (name.into(), value)));
        self
    }

    pub fn wraparound(mut self, wraparound: bool) -> Self {
        self.options.wraparound = wraparound;
        self
    }

    pub fn hardcode_constants(mut self, hardcode: bool) -> Self {
        self.options.hardcode_constants = hardcode;
        self
    }

    pub fn output_to_texture(mut self, output_to_texture: bool) -> Self {
        self.options.output_to_texture = output_to_texture;
        self
    }

    /// `"gpu"` for this engine, or the name of a registered backend.
    pub fn mode(mut self, mode: &str) -> Self {
        self.options.mode = Mode::from(mode);
        self
    }

    /// Adds a helper function callable from the kernel body.
    pub fn function(mut self, source: &str) -> Self {
        self.helpers.push(source.to_owned());
        self
    }

    /// Replaces every option at once.
    pub fn options(mut self, options: KernelOptions) -> Self {
        self.options = options;
        self
    }

    pub fn build(self) -> KernelResult<Kernel<D>> {
        let function = KernelFunction::parse(&self.source)?;
        let helpers = self
            .helpers
            .iter()
            .map(|source| KernelFunction::parse(source))
            .collect::<KernelResult<Vec<_>>>()?;
        self.options.validate()?;

        let backend = match &self.options.mode {
            Mode::Gpu => Backend::Gpu(GpuKernel {
                device: Arc::clone(self.gpu.device()),
                translator: Arc::clone(self.gpu.translator()),
                endianness: self.gpu.endianness(),
                cache: ProgramCache::default(),
                pool: TexturePool::default(),
            }),
            Mode::Named(name) => {
                let factory = self
                    .gpu
                    .mode_factory(name)
                    .ok_or_else(|| KernelError::UnsupportedMode(name.clone()))?;
                Backend::Delegated(factory.create(&function, &helpers, &self.options)?)
            }
        };

        debug!(
            "built kernel `{}` with {} parameters in {} mode",
            function.name,
            function.params.len(),
            self.options.mode
        );
        Ok(Kernel {
            function,
            helpers,
            options: self.options,
            backend,
        })
    }
}

/// A configured kernel, callable any number of times.
pub struct Kernel<D: RenderDevice> {
    function: KernelFunction,
    helpers: Vec<KernelFunction>,
    options: KernelOptions,
    backend: Backend<D>,
}

impl<D: RenderDevice> std::fmt::Debug for Kernel<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let backend = match &self.backend {
            Backend::Gpu(_) => "gpu",
            Backend::Delegated(_) => "delegated",
        };
        f.debug_struct("Kernel")
            .field("function", &self.function.name)
            .field("params", &self.function.params)
            .field("helpers", &self.helpers.len())
            .field("options", &self.options)
            .field("backend", &backend)
            .finish()
    }
}

enum Backend<D: RenderDevice> {
    Gpu(GpuKernel<D>),
    Delegated(Box<dyn KernelRunner<D>>),
}

struct GpuKernel<D: RenderDevice> {
    device: Arc<D>,
    translator: Arc<dyn BodyTranslator>,
    endianness: Endianness,
    cache: ProgramCache<D::Program>,
    pool: TexturePool<D::Texture>,
}

impl<D: RenderDevice> Kernel<D> {
    /// Runs the kernel once per output element.
    pub fn run(&mut self, args: &[Argument<'_, D>]) -> KernelResult<KernelOutput<D>> {
        match &mut self.backend {
            Backend::Gpu(gpu) => gpu.run(&self.function, &self.helpers, &self.options, args),
            Backend::Delegated(runner) => runner.run(args),
        }
    }

    #[must_use]
    pub fn function(&self) -> &KernelFunction {
        &self.function
    }

    #[must_use]
    pub fn options(&self) -> &KernelOptions {
        &self.options
    }

    /// Programs compiled so far; always 0 for delegated backends.
    #[must_use]
    pub fn compiled_programs(&self) -> usize {
        match &self.backend {
            Backend::Gpu(gpu) => gpu.cache.compiles(),
            Backend::Delegated(_) => 0,
        }
    }

    /// Size and RGBA bytes of the visible surface, as left by the last draw.
    pub fn canvas_pixels(&self) -> KernelResult<(TexSize, Vec<u8>)> {
        match &self.backend {
            Backend::Gpu(gpu) => gpu.device.read_surface(),
            Backend::Delegated(_) => Err(KernelError::UnsupportedMode(self.options.mode.to_string())),
        }
    }
}

impl<D: RenderDevice> GpuKernel<D> {
    fn run(
        &mut self,
        function: &KernelFunction,
        helpers: &[KernelFunction],
        options: &KernelOptions,
        args: &[Argument<'_, D>],
    ) -> KernelResult<KernelOutput<D>> {
        let device = self.device.as_ref();
        let params = args::describe(device, &function.params, args)?;

        let dims = layout::infer_output_dims(options.dimensions.as_deref(), args)?;
        let output = OutputShape::new(dims, options.graphical)?;
        output.check_limit(device.max_texture_side())?;

        let key = ProgramKey::new(&params, options, &output);
        let request = ProgramRequest {
            function,
            helpers,
            params: &params,
            options,
            output: &output,
            endianness: self.endianness,
        };
        let translator = self.translator.as_ref();
        let program = self
            .cache
            .get_or_compile(key, || program::compile(device, translator, &request))?;

        let uniforms = args::marshal(
            device,
            program,
            &params,
            args,
            &output,
            &mut self.pool,
            self.endianness,
        )?;
        let textures = args::texture_bindings(&params, args, &self.pool)?;

        let destination = if options.output_to_texture {
            Destination::Texture
        } else if options.graphical {
            Destination::Graphical
        } else {
            Destination::Readback
        };
        dispatch::execute(
            device,
            program,
            &uniforms,
            textures,
            &output,
            destination,
            self.endianness,
        )
    }
}
