//! Entry point: a device plus the collaborators kernels are built with.

use std::collections::HashMap;
use std::sync::Arc;

use crate::codec::Endianness;
use crate::device::RenderDevice;
use crate::error::KernelResult;
use crate::kernel::{KernelBuilder, KernelRunner};
use crate::options::KernelOptions;
use crate::translate::{BodyTranslator, KernelFunction, WgslTranslator};

/// Creates runners for kernels built with `mode(name)`.
pub trait ModeFactory<D: RenderDevice> {
    fn create(
        &self,
        function: &KernelFunction,
        helpers: &[KernelFunction],
        options: &KernelOptions,
    ) -> KernelResult<Box<dyn KernelRunner<D>>>;
}

/// Kernel factory bound to one device.
pub struct Gpu<D: RenderDevice> {
    device: Arc<D>,
    translator: Arc<dyn BodyTranslator>,
    endianness: Endianness,
    modes: HashMap<String, Box<dyn ModeFactory<D>>>,
}

impl<D: RenderDevice> Gpu<D> {
    pub fn with_device(device: D) -> Self {
        Self::from_arc(Arc::new(device))
    }

    pub fn from_arc(device: Arc<D>) -> Self {
        Self {
            device,
            translator: Arc::new(WgslTranslator),
            endianness: Endianness::host(),
            modes: HashMap::new(),
        }
    }

    /// Replaces the default [`WgslTranslator`].
    #[must_use]
    pub fn with_translator(mut self, translator: impl BodyTranslator + 'static) -> Self {
        self.translator = Arc::new(translator);
        self
    }

    /// Overrides the detected host byte order of texel data.
    #[must_use]
    pub fn with_endianness(mut self, endianness: Endianness) -> Self {
        self.endianness = endianness;
        self
    }

    /// Makes `mode(name)` build kernels through `factory`.
    ///
    /// `"gpu"` always selects this crate's engine and cannot be overridden.
    pub fn register_mode(&mut self, name: impl Into<String>, factory: impl ModeFactory<D> + 'static) {
        self.modes.insert(name.into(), Box::new(factory));
    }

    /// Starts configuring a kernel from `fn name(params) { body }` source.
    pub fn create_kernel(&self, source: &str) -> KernelBuilder<'_, D> {
        KernelBuilder::new(self, source)
    }

    #[must_use]
    pub fn device(&self) -> &Arc<D> {
        &self.device
    }

    #[must_use]
    pub fn endianness(&self) -> Endianness {
        self.endianness
    }

    pub(crate) fn translator(&self) -> &Arc<dyn BodyTranslator> {
        &self.translator
    }

    pub(crate) fn mode_factory(&self, name: &str) -> Option<&dyn ModeFactory<D>> {
        self.modes.get(name).map(Box::as_ref)
    }
}

#[cfg(feature = "wgpu")]
impl Gpu<crate::device::wgpu::WgpuDevice> {
    /// Uses the process-wide wgpu device, creating it on first use.
    pub fn shared() -> KernelResult<Self> {
        Ok(Self::from_arc(crate::device::wgpu::WgpuDevice::shared()?))
    }
}
