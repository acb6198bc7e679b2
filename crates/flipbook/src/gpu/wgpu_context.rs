use wgpu::{
    Buffer, BufferDescriptor, BufferUsages, Device, DeviceDescriptor, ExperimentalFeatures,
    Extent3d, Instance, InstanceDescriptor, MemoryHints, PowerPreference, Queue,
    RequestAdapterOptions, Texture, TextureDescriptor, TextureDimension, TextureFormat,
    TextureUsages, TextureView, Trace,
};

use super::GraphicsContext;
use crate::error::{MovieError, Result};
use crate::media::Frame;

/// A published frame: a texture of its own plus a default view.
pub struct WgpuTexture {
    pub texture: Texture,
    pub view: TextureView,
}

/// Round-robin staging buffers in GPU memory. Upload writes a frame into a
/// staging buffer; present copies it into a fresh sRGB texture.
pub struct WgpuContext {
    device: Device,
    queue: Queue,
    staging: Vec<Buffer>,
    filled: Vec<bool>,
    width: u32,
    height: u32,
    padded_bytes_per_row: u32,
}

impl WgpuContext {
    pub fn new(device: Device, queue: Queue) -> Self {
        Self {
            device,
            queue,
            staging: Vec::new(),
            filled: Vec::new(),
            width: 0,
            height: 0,
            padded_bytes_per_row: 0,
        }
    }

    /// Create a device without a window or surface.
    pub fn headless() -> anyhow::Result<Self> {
        let instance = Instance::new(&InstanceDescriptor::default());

        let adapter = pollster::block_on(instance.request_adapter(&RequestAdapterOptions {
            power_preference: PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))?;

        let (device, queue) = pollster::block_on(adapter.request_device(&DeviceDescriptor {
            label: Some("flipbook-device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            experimental_features: ExperimentalFeatures::default(),
            memory_hints: MemoryHints::Performance,
            trace: Trace::Off,
        }))?;

        log::info!(
            "GPU initialized: {} ({:?})",
            adapter.get_info().name,
            adapter.get_info().backend
        );

        Ok(Self::new(device, queue))
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    fn check_slot(&self, slot: usize) -> Result<()> {
        if slot < self.staging.len() {
            Ok(())
        } else {
            Err(MovieError::Graphics(format!(
                "slot {slot} out of range ({} allocated)",
                self.staging.len()
            )))
        }
    }

    /// Copy tightly packed rows into the padded staging layout.
    fn pad_rows(&self, pixels: &[u8]) -> Vec<u8> {
        let row = (self.width * 4) as usize;
        let padded_row = self.padded_bytes_per_row as usize;
        if row == padded_row {
            return pixels.to_vec();
        }
        let mut padded = vec![0u8; padded_row * self.height as usize];
        for (src, dst) in pixels.chunks_exact(row).zip(padded.chunks_exact_mut(padded_row)) {
            dst[..row].copy_from_slice(src);
        }
        padded
    }
}

impl GraphicsContext for WgpuContext {
    type Texture = WgpuTexture;

    fn allocate_slots(&mut self, count: usize, width: u32, height: u32) -> Result<()> {
        let unpadded_bytes_per_row = width * 4;
        let padded_bytes_per_row =
            align_to(unpadded_bytes_per_row, wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);
        let size = u64::from(padded_bytes_per_row) * u64::from(height);

        self.staging = (0..count)
            .map(|i| {
                self.device.create_buffer(&BufferDescriptor {
                    label: Some(&format!("flipbook-staging-{i}")),
                    size,
                    usage: BufferUsages::COPY_SRC | BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                })
            })
            .collect();
        self.filled = vec![false; count];
        self.width = width;
        self.height = height;
        self.padded_bytes_per_row = padded_bytes_per_row;

        log::debug!("Allocated {count} staging buffer(s), {size} bytes each");
        Ok(())
    }

    fn upload(&mut self, slot: usize, frame: Frame) -> Result<()> {
        self.check_slot(slot)?;
        if (frame.width, frame.height) != (self.width, self.height) {
            return Err(MovieError::Graphics(format!(
                "frame {} is {}x{}, slots are {}x{}",
                frame.sample, frame.width, frame.height, self.width, self.height
            )));
        }
        let data = self.pad_rows(&frame.pixels);
        self.queue.write_buffer(&self.staging[slot], 0, &data);
        self.filled[slot] = true;
        Ok(())
    }

    fn present(&mut self, slot: usize) -> Result<WgpuTexture> {
        self.check_slot(slot)?;
        if !self.filled[slot] {
            return Err(MovieError::Graphics(format!("slot {slot} is empty")));
        }
        let size = Extent3d {
            width: self.width,
            height: self.height,
            depth_or_array_layers: 1,
        };
        let texture = self.device.create_texture(&TextureDescriptor {
            label: Some("flipbook-frame"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: TextureDimension::D2,
            format: TextureFormat::Rgba8UnormSrgb,
            usage: TextureUsages::TEXTURE_BINDING | TextureUsages::COPY_DST,
            view_formats: &[],
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("flipbook-present"),
            });
        encoder.copy_buffer_to_texture(
            wgpu::TexelCopyBufferInfo {
                buffer: &self.staging[slot],
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(self.padded_bytes_per_row),
                    rows_per_image: Some(self.height),
                },
            },
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            size,
        );
        self.queue.submit(Some(encoder.finish()));
        self.filled[slot] = false;

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Ok(WgpuTexture { texture, view })
    }
}

fn align_to(value: u32, alignment: u32) -> u32 {
    (value + alignment - 1) & !(alignment - 1)
}
