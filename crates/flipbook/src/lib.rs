//! Real-time movie playback.
//!
//! A background thread decodes samples ahead of the playhead into a bounded
//! CPU-side buffer; [`Movie::update`], called once per tick by the owner of the
//! graphics context, uploads them into a ring of GPU slots and publishes one
//! frame per frame interval.
//!
//! ```no_run
//! use flipbook::{Movie, PlayerOptions};
//! use flipbook::gpu::HostContext;
//!
//! let mut movie = Movie::open("clip.mov", HostContext::new(), PlayerOptions::default())?;
//! movie.play()?;
//! movie.update();
//! if let Some(frame) = movie.current_frame() {
//!     println!("showing sample {} at {:.3}s", frame.sample, frame.timestamp);
//! }
//! # Ok::<(), flipbook::MovieError>(())
//! ```

pub mod error;
pub mod gpu;
pub mod media;
pub mod playback;
pub mod settings;

pub use error::{MovieError, Result};
pub use gpu::{GraphicsContext, PresentedFrame};
pub use media::{Frame, PlaybackState, TrackDescription};
pub use playback::Movie;
pub use settings::PlayerOptions;
