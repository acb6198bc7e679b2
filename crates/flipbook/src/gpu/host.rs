use super::GraphicsContext;
use crate::error::{MovieError, Result};
use crate::media::Frame;

/// Pixels published by [`HostContext`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostTexture {
    pub pixels: Vec<u8>, // RGBA8
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Default)]
struct HostSlot {
    pixels: Vec<u8>,
    filled: bool,
}

/// Keeps every slot in system memory. Used headless and in tests.
#[derive(Debug, Default)]
pub struct HostContext {
    slots: Vec<HostSlot>,
    width: u32,
    height: u32,
}

impl HostContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    fn slot_mut(&mut self, slot: usize) -> Result<&mut HostSlot> {
        let count = self.slots.len();
        self.slots
            .get_mut(slot)
            .ok_or_else(|| MovieError::Graphics(format!("slot {slot} out of range ({count} allocated)")))
    }
}

impl GraphicsContext for HostContext {
    type Texture = HostTexture;

    fn allocate_slots(&mut self, count: usize, width: u32, height: u32) -> Result<()> {
        self.slots = (0..count).map(|_| HostSlot::default()).collect();
        self.width = width;
        self.height = height;
        log::debug!("Allocated {count} host slot(s) at {width}x{height}");
        Ok(())
    }

    fn upload(&mut self, slot: usize, frame: Frame) -> Result<()> {
        let (width, height) = (self.width, self.height);
        if (frame.width, frame.height) != (width, height) {
            return Err(MovieError::Graphics(format!(
                "frame {} is {}x{}, slots are {width}x{height}",
                frame.sample, frame.width, frame.height
            )));
        }
        let target = self.slot_mut(slot)?;
        target.pixels = frame.pixels;
        target.filled = true;
        Ok(())
    }

    fn present(&mut self, slot: usize) -> Result<HostTexture> {
        let (width, height) = (self.width, self.height);
        let source = self.slot_mut(slot)?;
        if !source.filled {
            return Err(MovieError::Graphics(format!("slot {slot} is empty")));
        }
        source.filled = false;
        Ok(HostTexture {
            pixels: std::mem::take(&mut source.pixels),
            width,
            height,
        })
    }
}
