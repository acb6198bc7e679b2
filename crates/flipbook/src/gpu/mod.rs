//! Graphics side of the pipeline: resource slots that frames are uploaded into
//! and the textures published to the caller.

mod host;
#[cfg(feature = "gpu")]
mod wgpu_context;

pub use host::{HostContext, HostTexture};
#[cfg(feature = "gpu")]
pub use wgpu_context::{WgpuContext, WgpuTexture};

use crate::error::Result;
use crate::media::Frame;

/// Supplies upload slots and presentable textures.
///
/// Only ever called from the thread that owns the movie, inside `update()` and
/// the synchronous prebuffer.
pub trait GraphicsContext {
    type Texture;

    /// (Re)create `count` slots sized for `width` x `height` RGBA8 frames.
    fn allocate_slots(&mut self, count: usize, width: u32, height: u32) -> Result<()>;

    /// Move `frame` into `slot`. The slot is free: the frame previously
    /// uploaded into it has already been presented or discarded.
    fn upload(&mut self, slot: usize, frame: Frame) -> Result<()>;

    /// Turn the contents of `slot` into a texture the caller can hold on to.
    fn present(&mut self, slot: usize) -> Result<Self::Texture>;
}

/// The frame currently on display. Shared with the caller through an `Arc`, so
/// it stays alive for as long as anyone holds it.
#[derive(Debug)]
pub struct PresentedFrame<T> {
    pub texture: T,
    pub sample: usize,
    /// Presentation timestamp in seconds.
    pub timestamp: f64,
}
