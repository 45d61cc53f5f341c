//! [`RenderDevice`] on top of WGPU.
//!
//! One `WgpuDevice` owns the device, queue, the quad vertex buffer and the
//! visible surface ("canvas"). The canvas is an offscreen `Rgba8Unorm`
//! texture that is reallocated whenever a draw asks for a different size.
//!
//! Compile and link errors are captured with validation error scopes so a
//! bad program surfaces as a [`KernelError`] instead of an uncaptured panic.
//! All waiting is synchronous, via `pollster::block_on` and blocking polls.

use std::sync::Arc;
use std::sync::mpsc;

use log::{debug, warn};
use parking_lot::Mutex;
use wgpu::util::DeviceExt;

use super::{DrawCall, ProgramSource, RenderDevice, RenderTarget, TexSize};
use crate::error::{KernelError, KernelResult};
use crate::program::{QUAD, QuadVertex};

/// Format of every texture the engine creates.
pub const TEXTURE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

const QUAD_ATTRIBUTES: [wgpu::VertexAttribute; 2] =
    wgpu::vertex_attr_array![0 => Float32x2, 1 => Float32x2];

/// Basic wrapper for device bring-up errors.
#[derive(Debug)]
pub enum GpuError {
    /// No adapter matched the request.
    Adapter(wgpu::RequestAdapterError),
    /// The adapter refused to create a device.
    Device(wgpu::RequestDeviceError),
}

impl std::fmt::Display for GpuError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GpuError::Adapter(e) => write!(f, "Adapter error: {e}"),
            GpuError::Device(e) => write!(f, "Device error: {e}"),
        }
    }
}

impl std::error::Error for GpuError {}

impl From<GpuError> for KernelError {
    fn from(err: GpuError) -> Self {
        KernelError::Device(err.to_string())
    }
}

/// A linked render pipeline and the layout its bind groups must follow.
#[derive(Debug)]
pub struct WgpuProgram {
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
}

struct Canvas {
    texture: wgpu::Texture,
    size: TexSize,
}

pub struct WgpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    quad: wgpu::Buffer,
    canvas: Mutex<Option<Canvas>>,
}

lazy_static::lazy_static! {
    static ref SHARED_DEVICE: Result<Arc<WgpuDevice>, String> =
        WgpuDevice::new().map(Arc::new).map_err(|err| err.to_string());
}

impl WgpuDevice {
    /// Selects the default adapter and creates a device and queue.
    ///
    /// Requests the adapter's own limits, so large textures are available
    /// wherever the hardware supports them.
    pub fn new() -> Result<Self, GpuError> {
        let instance = wgpu::Instance::default();
        let adapter =
            pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions::default()))
                .map_err(GpuError::Adapter)?;
        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("texel_kernels_device"),
            required_features: wgpu::Features::empty(),
            required_limits: adapter.limits(),
            memory_hints: wgpu::MemoryHints::Performance,
            trace: wgpu::Trace::default(),
        }))
        .map_err(GpuError::Device)?;

        debug!("created wgpu device on {:?}", adapter.get_info().name);
        Ok(Self::from_parts(device, queue))
    }

    /// Wraps an existing device and queue.
    pub fn from_parts(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        let quad = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("texel_kernels_quad"),
            contents: bytemuck::cast_slice(&QUAD),
            usage: wgpu::BufferUsages::VERTEX,
        });
        Self {
            device,
            queue,
            quad,
            canvas: Mutex::new(None),
        }
    }

    /// The process-wide device, created on first use.
    pub fn shared() -> KernelResult<Arc<Self>> {
        SHARED_DEVICE
            .as_ref()
            .map(Arc::clone)
            .map_err(|err| KernelError::Device(err.clone()))
    }

    #[must_use]
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    #[must_use]
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    fn compile_stage(&self, label: &str, source: &str) -> KernelResult<wgpu::ShaderModule> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = load_shader(&self.device, label, source);
        let info = pollster::block_on(module.get_compilation_info());
        let scope = pollster::block_on(self.device.pop_error_scope());

        let mut log: Vec<String> = info
            .messages
            .iter()
            .filter(|message| matches!(message.message_type, wgpu::CompilationMessageType::Error))
            .map(|message| match message.location.as_ref() {
                Some(location) => format!(
                    "{}:{}: {}",
                    location.line_number, location.line_position, message.message
                ),
                None => message.message.clone(),
            })
            .collect();
        if let Some(error) = scope {
            log.push(error.to_string());
        }

        if log.is_empty() {
            Ok(module)
        } else {
            Err(KernelError::ShaderCompile {
                log: log.join("\n"),
                program_text: None,
            })
        }
    }

    fn bind_group_layout(&self, source: &ProgramSource) -> wgpu::BindGroupLayout {
        let mut entries = vec![wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: wgpu::BufferSize::new(source.uniform_bytes),
            },
            count: None,
        }];
        entries.extend(source.texture_bindings.iter().map(|&binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: false },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        }));

        self.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("texel_kernels_bgl"),
            entries: &entries,
        })
    }

    /// View of the canvas, reallocated when `size` changed.
    fn canvas_view(&self, size: TexSize) -> KernelResult<wgpu::TextureView> {
        let mut canvas = self.canvas.lock();
        let stale = canvas.as_ref().is_none_or(|canvas| canvas.size != size);
        if stale {
            debug!("resizing canvas to {}x{}", size.width, size.height);
            *canvas = Some(Canvas {
                texture: self.create_texture(size)?,
                size,
            });
        }
        canvas
            .as_ref()
            .map(|canvas| canvas.texture.create_view(&wgpu::TextureViewDescriptor::default()))
            .ok_or_else(|| KernelError::Device("canvas is unavailable".into()))
    }
}

/// Compiles WGSL into a labelled shader module.
pub fn load_shader(device: &wgpu::Device, label: &str, source: &str) -> wgpu::ShaderModule {
    device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    })
}

fn extent(size: TexSize) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width: size.width,
        height: size.height,
        depth_or_array_layers: 1,
    }
}

impl RenderDevice for WgpuDevice {
    type Texture = wgpu::Texture;
    type Program = WgpuProgram;

    fn max_texture_side(&self) -> u32 {
        self.device.limits().max_texture_dimension_2d
    }

    fn max_texture_bindings(&self) -> usize {
        self.device.limits().max_sampled_textures_per_shader_stage as usize
    }

    fn compile_program(&self, source: &ProgramSource) -> KernelResult<WgpuProgram> {
        let vertex = self.compile_stage("texel_kernels_vertex", &source.vertex)?;
        let fragment = self.compile_stage("texel_kernels_fragment", &source.fragment)?;

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let bind_group_layout = self.bind_group_layout(source);
        let layout = self.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("texel_kernels_pipeline_layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });
        let pipeline = self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("texel_kernels_pipeline"),
            layout: Some(&layout),
            vertex: wgpu::VertexState {
                module: &vertex,
                entry_point: Some("vs_main"),
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: size_of::<QuadVertex>() as wgpu::BufferAddress,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &QUAD_ATTRIBUTES,
                }],
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleStrip,
                ..wgpu::PrimitiveState::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &fragment,
                entry_point: Some("fs_main"),
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: TEXTURE_FORMAT,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            multiview: None,
            cache: None,
        });

        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(KernelError::ShaderLink {
                log: error.to_string(),
                program_text: None,
            });
        }

        Ok(WgpuProgram {
            pipeline,
            bind_group_layout,
        })
    }

    fn create_texture(&self, size: TexSize) -> KernelResult<wgpu::Texture> {
        Ok(self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("texel_kernels_texture"),
            size: extent(size),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TEXTURE_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::COPY_DST
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        }))
    }

    fn write_texture(&self, texture: &wgpu::Texture, size: TexSize, texels: &[u8]) -> KernelResult<()> {
        if texels.len() != size.texel_count() * 4 {
            return Err(KernelError::Device(format!(
                "expected {} bytes for a {}x{} texture, got {}",
                size.texel_count() * 4,
                size.width,
                size.height,
                texels.len()
            )));
        }

        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            texels,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * size.width),
                rows_per_image: Some(size.height),
            },
            extent(size),
        );
        Ok(())
    }

    fn draw(&self, call: DrawCall<'_, Self>) -> KernelResult<()> {
        let size = call.target.size();
        let target = match call.target {
            RenderTarget::Texture(texture, _) => {
                texture.create_view(&wgpu::TextureViewDescriptor::default())
            }
            RenderTarget::Surface(size) => self.canvas_view(size)?,
        };

        let uniforms = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("texel_kernels_uniforms"),
            contents: call.uniforms.as_bytes(),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let views: Vec<(u32, wgpu::TextureView)> = call
            .textures
            .iter()
            .map(|&(binding, texture)| {
                (binding, texture.create_view(&wgpu::TextureViewDescriptor::default()))
            })
            .collect();

        let mut entries = vec![wgpu::BindGroupEntry {
            binding: 0,
            resource: uniforms.as_entire_binding(),
        }];
        entries.extend(views.iter().map(|(binding, view)| wgpu::BindGroupEntry {
            binding: *binding,
            resource: wgpu::BindingResource::TextureView(view),
        }));
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("texel_kernels_bind_group"),
            layout: &call.program.bind_group_layout,
            entries: &entries,
        });

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("texel_kernels_draw"),
        });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("texel_kernels_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_viewport(0.0, 0.0, size.width as f32, size.height as f32, 0.0, 1.0);
            pass.set_pipeline(&call.program.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.set_vertex_buffer(0, self.quad.slice(..));
            pass.draw(0..QUAD.len() as u32, 0..1);
        }
        self.queue.submit(Some(encoder.finish()));
        Ok(())
    }

    fn read_texture(&self, texture: &wgpu::Texture, size: TexSize) -> KernelResult<Vec<u8>> {
        let unpadded = 4 * size.width;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded = unpadded.div_ceil(align) * align;

        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("texel_kernels_readback"),
            size: u64::from(padded) * u64::from(size.height),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("texel_kernels_readback"),
        });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &staging,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(size.height),
                },
            },
            extent(size),
        );
        self.queue.submit(Some(encoder.finish()));

        let slice = staging.slice(..);
        let (sender, receiver) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.device
            .poll(wgpu::PollType::Wait)
            .map_err(|err| KernelError::Device(err.to_string()))?;
        match receiver.recv() {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                warn!("failed to map readback buffer: {err}");
                return Err(KernelError::Device(err.to_string()));
            }
            Err(err) => return Err(KernelError::Device(err.to_string())),
        }

        let mut texels = Vec::with_capacity(size.texel_count() * 4);
        {
            let mapped = slice.get_mapped_range();
            for row in mapped.chunks_exact(padded as usize) {
                texels.extend_from_slice(&row[..unpadded as usize]);
            }
        }
        staging.unmap();
        Ok(texels)
    }

    fn read_surface(&self) -> KernelResult<(TexSize, Vec<u8>)> {
        let canvas = self.canvas.lock();
        let canvas = canvas
            .as_ref()
            .ok_or_else(|| KernelError::Device("nothing has been drawn to the canvas yet".into()))?;
        Ok((canvas.size, self.read_texture(&canvas.texture, canvas.size)?))
    }
}
