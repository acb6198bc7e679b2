use image::ImageFormat;

use super::types::{Frame, Sample};
use crate::error::{MovieError, Result};

/// Turns one encoded sample into packed RGBA8 pixels.
///
/// Decoders run on the reader thread, hence `Send`.
pub trait Decoder: Send {
    fn decode(&mut self, index: usize, sample: Sample) -> Result<Frame>;
}

const JPEG_CODECS: &[&str] = &["jpeg", "mjpeg", "mjpa", "mjpb"];
const RAW_CODECS: &[&str] = &["rgba", "raw"];

/// Pick a decoder for `codec`. This is the one place an unsupported codec is
/// detected; it runs at open time, before any playback.
pub fn decoder_for(codec: &str, width: u32, height: u32) -> Result<Box<dyn Decoder>> {
    let id = codec.trim().to_ascii_lowercase();
    if JPEG_CODECS.contains(&id.as_str()) {
        Ok(Box::new(JpegDecoder::new(width, height)))
    } else if RAW_CODECS.contains(&id.as_str()) {
        Ok(Box::new(RawRgbaDecoder::new(width, height)))
    } else {
        Err(MovieError::UnsupportedCodec(codec.to_string()))
    }
}

/// Motion-JPEG samples: every sample is a standalone JPEG image.
pub struct JpegDecoder {
    width: u32,
    height: u32,
}

impl JpegDecoder {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Decoder for JpegDecoder {
    fn decode(&mut self, index: usize, sample: Sample) -> Result<Frame> {
        let img = image::load_from_memory_with_format(&sample.data, ImageFormat::Jpeg).map_err(
            |e| MovieError::Decode {
                index,
                reason: e.to_string(),
            },
        )?;
        let rgba = img.to_rgba8();
        let (w, h) = rgba.dimensions();
        if (w, h) != (self.width, self.height) {
            return Err(MovieError::Decode {
                index,
                reason: format!(
                    "image is {w}x{h}, track declares {}x{}",
                    self.width, self.height
                ),
            });
        }

        Ok(Frame {
            pixels: rgba.into_raw(),
            width: self.width,
            height: self.height,
            timestamp: sample.timestamp,
            sample: index,
        })
    }
}

/// Packed RGBA8 samples, passed through after a size check.
pub struct RawRgbaDecoder {
    width: u32,
    height: u32,
}

impl RawRgbaDecoder {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    fn expected_len(&self) -> usize {
        (self.width as usize) * (self.height as usize) * 4
    }
}

impl Decoder for RawRgbaDecoder {
    fn decode(&mut self, index: usize, sample: Sample) -> Result<Frame> {
        let expected = self.expected_len();
        if sample.data.len() != expected {
            return Err(MovieError::Decode {
                index,
                reason: format!(
                    "expected {expected} bytes of RGBA, got {}",
                    sample.data.len()
                ),
            });
        }

        Ok(Frame {
            pixels: sample.data,
            width: self.width,
            height: self.height,
            timestamp: sample.timestamp,
            sample: index,
        })
    }
}
