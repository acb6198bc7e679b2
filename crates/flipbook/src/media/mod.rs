pub mod container;
pub mod decoder;
pub mod synthetic;
pub mod types;

pub use container::{ContainerReader, ProbedContainer};
pub use decoder::{Decoder, JpegDecoder, RawRgbaDecoder, decoder_for};
pub use synthetic::{SyntheticContainer, SyntheticSpec};
pub use types::{Frame, PlaybackState, Sample, TrackDescription, TrackKind};
