//! wgpu executor implementation
//!
//! Runs the filter programs on a headless wgpu device. Draws and copies are
//! recorded into a single command encoder that is submitted on
//! [`GpuExecutor::flush`], before texel uploads and before readbacks. wgpu's
//! resource tracking orders writes to a mip before later passes sampling it.

use std::collections::HashMap;
use std::sync::mpsc;

use half::f16;
use wgpu::util::DeviceExt;

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::passes::shaders::{self, FRAGMENT_ENTRY, VERTEX_ENTRY};
use crate::passes::ShaderProgram;
use crate::{ExecutorConfig, PowerPreference};

/// A cubemap and the descriptor it was created from
struct GpuCubemap {
    texture: wgpu::Texture,
    desc: CubemapDescriptor,
}

/// State staged by the `bind_*` calls for the next draw
#[derive(Default)]
struct StagedState {
    program: Option<ShaderProgram>,
    source: Option<SourceBinding>,
    target: Option<TextureSurface>,
    uniforms: Vec<u8>,
}

/// wgpu executor implementation
pub struct WgpuExecutor {
    device: wgpu::Device,
    queue: wgpu::Queue,
    adapter_info: Option<wgpu::AdapterInfo>,

    // Resource storage
    textures: HashMap<TextureHandle, GpuCubemap>,
    next_texture_id: u64,

    // Shared by both programs
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    sampler: wgpu::Sampler,

    // Built on first use
    shader_modules: HashMap<ShaderProgram, wgpu::ShaderModule>,
    pipelines: HashMap<(ShaderProgram, TextureFormat), wgpu::RenderPipeline>,

    staged: StagedState,
    encoder: Option<wgpu::CommandEncoder>,
}

impl WgpuExecutor {
    /// Create an executor on the default adapter, honoring `WGPU_BACKEND`.
    pub fn new() -> BackendResult<Self> {
        Self::with_config(&ExecutorConfig::from_env())
    }

    /// Create an executor on an adapter picked according to `config`.
    pub fn with_config(config: &ExecutorConfig) -> BackendResult<Self> {
        pollster::block_on(Self::new_async(config))
    }

    pub async fn new_async(config: &ExecutorConfig) -> BackendResult<Self> {
        let backends = Self::convert_graphics_apis(&config.graphics_apis);

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends,
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: Self::convert_power_preference(config.power_preference),
                compatible_surface: None,
                force_fallback_adapter: config.force_fallback_adapter,
            })
            .await
            .ok_or_else(|| {
                BackendError::InitializationFailed("No compatible GPU adapter".to_string())
            })?;

        let info = adapter.get_info();
        log::info!("wgpu adapter: {} ({:?})", info.name, info.backend);
        if !Self::backend_reads_back_layers(info.backend) {
            log::warn!("{:?} adapter: cubemap readback returns zeros", info.backend);
        }

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Reflection Probe Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::downlevel_defaults()
                        .using_resolution(adapter.limits()),
                },
                None,
            )
            .await
            .map_err(|e| BackendError::DeviceCreationFailed(e.to_string()))?;

        let mut executor = Self::from_device(device, queue);
        executor.adapter_info = Some(info);
        Ok(executor)
    }

    /// Wrap a device owned by a host renderer.
    pub fn from_device(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Cubemap Filter Bind Group Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::Cube,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Cubemap Filter Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Cubemap Filter Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            lod_min_clamp: 0.0,
            lod_max_clamp: f32::MAX,
            compare: None,
            anisotropy_clamp: 1,
            border_color: None,
        });

        Self {
            device,
            queue,
            adapter_info: None,
            textures: HashMap::new(),
            next_texture_id: 1,
            bind_group_layout,
            pipeline_layout,
            sampler,
            shader_modules: HashMap::new(),
            pipelines: HashMap::new(),
            staged: StagedState::default(),
            encoder: None,
        }
    }

    /// Info of the adapter picked by [`WgpuExecutor::with_config`]
    pub fn adapter_info(&self) -> Option<&wgpu::AdapterInfo> {
        self.adapter_info.as_ref()
    }

    /// Whether `read_surface` returns the texels of every cube face.
    ///
    /// GL adapters read six-layer textures back as zeros. Devices wrapped
    /// with `from_device` are assumed to be fine.
    pub fn reads_back_layers(&self) -> bool {
        self.adapter_info
            .as_ref()
            .map_or(true, |info| Self::backend_reads_back_layers(info.backend))
    }

    fn backend_reads_back_layers(backend: wgpu::Backend) -> bool {
        backend != wgpu::Backend::Gl
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Underlying texture, for binding a filtered probe in a renderer
    pub fn wgpu_texture(&self, texture: TextureHandle) -> Option<&wgpu::Texture> {
        self.textures.get(&texture).map(|c| &c.texture)
    }

    fn convert_graphics_apis(names: &[String]) -> wgpu::Backends {
        if names.is_empty() {
            return wgpu::Backends::all();
        }

        let mut result = wgpu::Backends::empty();
        for name in names {
            match name.as_str() {
                "vulkan" | "vk" => result |= wgpu::Backends::VULKAN,
                "metal" => result |= wgpu::Backends::METAL,
                "dx12" | "d3d12" => result |= wgpu::Backends::DX12,
                "gl" | "gles" | "opengl" => result |= wgpu::Backends::GL,
                "webgpu" => result |= wgpu::Backends::BROWSER_WEBGPU,
                other => log::warn!("Unknown graphics API '{}', ignoring", other),
            }
        }

        if result.is_empty() {
            log::warn!("No known graphics API requested, trying all of them");
            wgpu::Backends::all()
        } else {
            result
        }
    }

    fn convert_power_preference(preference: PowerPreference) -> wgpu::PowerPreference {
        match preference {
            PowerPreference::LowPower => wgpu::PowerPreference::LowPower,
            PowerPreference::HighPerformance => wgpu::PowerPreference::HighPerformance,
        }
    }

    fn convert_texture_format(format: TextureFormat) -> wgpu::TextureFormat {
        match format {
            TextureFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
            TextureFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
        }
    }

    fn convert_texture_usage(usage: TextureUsage) -> wgpu::TextureUsages {
        let mut result = wgpu::TextureUsages::empty();
        if usage.contains(TextureUsage::COPY_SRC) {
            result |= wgpu::TextureUsages::COPY_SRC;
        }
        if usage.contains(TextureUsage::COPY_DST) {
            result |= wgpu::TextureUsages::COPY_DST;
        }
        if usage.contains(TextureUsage::TEXTURE_BINDING) {
            result |= wgpu::TextureUsages::TEXTURE_BINDING;
        }
        if usage.contains(TextureUsage::RENDER_ATTACHMENT) {
            result |= wgpu::TextureUsages::RENDER_ATTACHMENT;
        }
        result
    }

    fn encode_texels(format: TextureFormat, texels: &[[f32; 4]]) -> Vec<u8> {
        let mut data = Vec::with_capacity(texels.len() * format.bytes_per_texel() as usize);
        for texel in texels {
            for &channel in texel {
                match format {
                    TextureFormat::Rgba8Unorm => {
                        data.push((channel.clamp(0.0, 1.0) * 255.0).round() as u8)
                    }
                    TextureFormat::Rgba16Float => {
                        data.extend_from_slice(&f16::from_f32(channel).to_le_bytes())
                    }
                }
            }
        }
        data
    }

    fn decode_texels(format: TextureFormat, row: &[u8], out: &mut Vec<[f32; 4]>) {
        let texel_size = format.bytes_per_texel() as usize;
        for texel in row.chunks_exact(texel_size) {
            let mut value = [0.0; 4];
            match format {
                TextureFormat::Rgba8Unorm => {
                    for (dst, &byte) in value.iter_mut().zip(texel) {
                        *dst = byte as f32 / 255.0;
                    }
                }
                TextureFormat::Rgba16Float => {
                    for (dst, bytes) in value.iter_mut().zip(texel.chunks_exact(2)) {
                        *dst = f16::from_le_bytes([bytes[0], bytes[1]]).to_f32();
                    }
                }
            }
            out.push(value);
        }
    }

    fn cubemap(&self, texture: TextureHandle) -> BackendResult<&GpuCubemap> {
        self.textures.get(&texture).ok_or_else(|| {
            BackendError::InvalidOperation(format!("unknown texture {}", texture.id()))
        })
    }

    fn checked_surface(&self, surface: TextureSurface) -> BackendResult<&GpuCubemap> {
        Self::lookup_surface(&self.textures, surface)
    }

    /// Like [`Self::checked_surface`], borrowing only the texture storage
    fn lookup_surface(
        textures: &HashMap<TextureHandle, GpuCubemap>,
        surface: TextureSurface,
    ) -> BackendResult<&GpuCubemap> {
        let cubemap = textures.get(&surface.texture).ok_or_else(|| {
            BackendError::InvalidOperation(format!("unknown texture {}", surface.texture.id()))
        })?;
        if surface.face >= 6 || surface.mip_level >= cubemap.desc.mip_level_count {
            return Err(BackendError::InvalidOperation(format!(
                "surface face {} mip {} out of range",
                surface.face, surface.mip_level
            )));
        }
        Ok(cubemap)
    }

    fn surface_copy(cubemap: &GpuCubemap, surface: TextureSurface) -> wgpu::ImageCopyTexture<'_> {
        wgpu::ImageCopyTexture {
            texture: &cubemap.texture,
            mip_level: surface.mip_level,
            origin: wgpu::Origin3d {
                x: 0,
                y: 0,
                z: surface.face,
            },
            aspect: wgpu::TextureAspect::All,
        }
    }

    /// Build the pipeline of `program` for `format` render targets if needed
    fn ensure_pipeline(&mut self, program: ShaderProgram, format: TextureFormat) -> BackendResult<()> {
        if self.pipelines.contains_key(&(program, format)) {
            return Ok(());
        }

        if !self.shader_modules.contains_key(&program) {
            // naga reports errors as values, wgpu would only hit the error handler
            shaders::validate(program)?;
            let module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(program.label()),
                source: wgpu::ShaderSource::Wgsl(program.source().into()),
            });
            self.shader_modules.insert(program, module);
        }
        let module = self.shader_modules.get(&program).ok_or_else(|| {
            BackendError::ShaderCreationFailed(format!("{} module missing", program.label()))
        })?;

        log::debug!("Creating {} pipeline for {:?}", program.label(), format);

        let pipeline = self
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(program.label()),
                layout: Some(&self.pipeline_layout),
                vertex: wgpu::VertexState {
                    module,
                    entry_point: VERTEX_ENTRY,
                    buffers: &[],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module,
                    entry_point: FRAGMENT_ENTRY,
                    targets: &[Some(wgpu::ColorTargetState {
                        format: Self::convert_texture_format(format),
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                primitive: wgpu::PrimitiveState::default(),
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
            });

        self.pipelines.insert((program, format), pipeline);
        Ok(())
    }

    fn submit_pending(&mut self) {
        if let Some(encoder) = self.encoder.take() {
            self.queue.submit(std::iter::once(encoder.finish()));
        }
    }
}

impl GpuExecutor for WgpuExecutor {
    fn name(&self) -> &'static str {
        "wgpu"
    }

    fn create_cubemap(&mut self, desc: &CubemapDescriptor) -> BackendResult<TextureHandle> {
        if desc.size == 0 || desc.mip_level_count == 0 {
            return Err(BackendError::TextureCreationFailed(format!(
                "invalid cubemap {}x{} with {} mips",
                desc.size, desc.size, desc.mip_level_count
            )));
        }

        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: desc.label.as_deref(),
            size: wgpu::Extent3d {
                width: desc.size,
                height: desc.size,
                depth_or_array_layers: 6,
            },
            mip_level_count: desc.mip_level_count,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::convert_texture_format(desc.format),
            usage: Self::convert_texture_usage(desc.usage),
            view_formats: &[],
        });
        if pollster::block_on(self.device.pop_error_scope()).is_some() {
            return Err(BackendError::OutOfMemory);
        }

        let handle = TextureHandle(self.next_texture_id);
        self.next_texture_id += 1;
        self.textures.insert(
            handle,
            GpuCubemap {
                texture,
                desc: desc.clone(),
            },
        );

        Ok(handle)
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        // Dropping keeps the texture alive until recorded work is done with it
        self.textures.remove(&texture);
    }

    fn cubemap_descriptor(&self, texture: TextureHandle) -> Option<&CubemapDescriptor> {
        self.textures.get(&texture).map(|c| &c.desc)
    }

    fn bind_program(&mut self, program: ShaderProgram) {
        self.staged.program = Some(program);
    }

    fn bind_source(&mut self, source: SourceBinding) {
        self.staged.source = Some(source);
    }

    fn bind_render_target(&mut self, target: TextureSurface) {
        self.staged.target = Some(target);
    }

    fn upload_uniforms(&mut self, data: &[u8]) {
        self.staged.uniforms = data.to_vec();
    }

    fn draw_fullscreen(&mut self) -> BackendResult<()> {
        let (Some(program), Some(source), Some(target)) =
            (self.staged.program, self.staged.source, self.staged.target)
        else {
            return Err(BackendError::InvalidOperation(
                "draw without program, source and target bound".into(),
            ));
        };

        let format = self.checked_surface(target)?.desc.format;
        self.ensure_pipeline(program, format)?;

        let source_cubemap = self.cubemap(source.texture)?;
        if source.mip_level_count == 0
            || source.base_mip_level + source.mip_level_count > source_cubemap.desc.mip_level_count
        {
            return Err(BackendError::InvalidOperation(format!(
                "mips {}..{} out of range",
                source.base_mip_level,
                source.base_mip_level + source.mip_level_count
            )));
        }
        let source_view = source_cubemap
            .texture
            .create_view(&wgpu::TextureViewDescriptor {
                label: Some("Cubemap Filter Source"),
                format: None,
                dimension: Some(wgpu::TextureViewDimension::Cube),
                aspect: wgpu::TextureAspect::All,
                base_mip_level: source.base_mip_level,
                mip_level_count: Some(source.mip_level_count),
                base_array_layer: 0,
                array_layer_count: Some(6),
            });

        let target_view = self
            .cubemap(target.texture)?
            .texture
            .create_view(&wgpu::TextureViewDescriptor {
                label: Some("Cubemap Filter Target"),
                format: None,
                dimension: Some(wgpu::TextureViewDimension::D2),
                aspect: wgpu::TextureAspect::All,
                base_mip_level: target.mip_level,
                mip_level_count: Some(1),
                base_array_layer: target.face,
                array_layer_count: Some(1),
            });

        // One buffer per draw: queue writes would all land before the encoder
        let uniform_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Cubemap Filter Params"),
                contents: &self.staged.uniforms,
                usage: wgpu::BufferUsages::UNIFORM,
            });

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Cubemap Filter Bind Group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&source_view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        });

        let pipeline = self.pipelines.get(&(program, format)).ok_or_else(|| {
            BackendError::InvalidOperation(format!("{} pipeline missing", program.label()))
        })?;

        let device = &self.device;
        let encoder = self.encoder.get_or_insert_with(|| {
            device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Cubemap Filter Encoder"),
            })
        });

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(program.label()),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &target_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.draw(0..3, 0..1);

        Ok(())
    }

    fn copy_surface(&mut self, src: TextureSurface, dst: TextureSurface) -> BackendResult<()> {
        let src_cubemap = Self::lookup_surface(&self.textures, src)?;
        let dst_cubemap = Self::lookup_surface(&self.textures, dst)?;

        let size = src_cubemap.desc.mip_size(src.mip_level);
        if size != dst_cubemap.desc.mip_size(dst.mip_level)
            || src_cubemap.desc.format != dst_cubemap.desc.format
        {
            return Err(BackendError::InvalidOperation(
                "copy between surfaces of different size or format".into(),
            ));
        }

        let device = &self.device;
        let encoder = self.encoder.get_or_insert_with(|| {
            device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Cubemap Filter Encoder"),
            })
        });

        encoder.copy_texture_to_texture(
            Self::surface_copy(src_cubemap, src),
            Self::surface_copy(dst_cubemap, dst),
            wgpu::Extent3d {
                width: size,
                height: size,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }

    fn flush(&mut self) {
        self.submit_pending();
    }

    fn write_surface(
        &mut self,
        surface: TextureSurface,
        texels: &[[f32; 4]],
    ) -> BackendResult<()> {
        // Earlier recorded work must not observe this upload
        self.submit_pending();

        let cubemap = self.checked_surface(surface)?;
        let size = cubemap.desc.mip_size(surface.mip_level);
        if texels.len() != cubemap.desc.face_texel_count(surface.mip_level) {
            return Err(BackendError::InvalidOperation(format!(
                "expected {} texels, got {}",
                cubemap.desc.face_texel_count(surface.mip_level),
                texels.len()
            )));
        }

        let format = cubemap.desc.format;
        let data = Self::encode_texels(format, texels);
        self.queue.write_texture(
            Self::surface_copy(cubemap, surface),
            &data,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(size * format.bytes_per_texel()),
                rows_per_image: Some(size),
            },
            wgpu::Extent3d {
                width: size,
                height: size,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }

    fn read_surface(&mut self, surface: TextureSurface) -> BackendResult<Vec<[f32; 4]>> {
        self.submit_pending();

        let cubemap = self.checked_surface(surface)?;
        let format = cubemap.desc.format;
        let size = cubemap.desc.mip_size(surface.mip_level);

        let unpadded_bytes_per_row = size * format.bytes_per_texel();
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded_bytes_per_row = unpadded_bytes_per_row.div_ceil(align) * align;

        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Cubemap Readback"),
            size: padded_bytes_per_row as u64 * size as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Cubemap Readback Encoder"),
            });
        encoder.copy_texture_to_buffer(
            Self::surface_copy(cubemap, surface),
            wgpu::ImageCopyBuffer {
                buffer: &buffer,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_bytes_per_row),
                    rows_per_image: Some(size),
                },
            },
            wgpu::Extent3d {
                width: size,
                height: size,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = buffer.slice(..);
        let (sender, receiver) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        let _ = self.device.poll(wgpu::Maintain::Wait);

        receiver
            .recv()
            .map_err(|e| BackendError::ReadbackFailed(e.to_string()))?
            .map_err(|e| BackendError::ReadbackFailed(e.to_string()))?;

        let mut texels = Vec::with_capacity((size * size) as usize);
        {
            let data = slice.get_mapped_range();
            for row in data.chunks_exact(padded_bytes_per_row as usize) {
                Self::decode_texels(format, &row[..unpadded_bytes_per_row as usize], &mut texels);
            }
        }
        buffer.unmap();

        Ok(texels)
    }
}
