use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

fn default_true() -> bool {
    true
}

fn default_buffer_size() -> usize {
    2
}

fn default_rate() -> f32 {
    1.0
}

/// Playback options, fixed when a movie is opened (looping and rate can be
/// changed afterwards on the movie itself).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerOptions {
    /// Fill both buffers before the constructor returns.
    #[serde(default = "default_true")]
    pub prebuffer: bool,
    /// Refill both buffers synchronously inside `seek`.
    #[serde(default)]
    pub prebuffer_on_seek: bool,
    #[serde(default = "default_buffer_size")]
    pub cpu_buffer_size: usize,
    #[serde(default = "default_buffer_size")]
    pub gpu_buffer_size: usize,
    #[serde(default)]
    pub looping: bool,
    #[serde(default = "default_rate")]
    pub playback_rate: f32,
}

impl Default for PlayerOptions {
    fn default() -> Self {
        Self {
            prebuffer: true,
            prebuffer_on_seek: false,
            cpu_buffer_size: default_buffer_size(),
            gpu_buffer_size: default_buffer_size(),
            looping: false,
            playback_rate: default_rate(),
        }
    }
}

impl PlayerOptions {
    pub fn config_path() -> PathBuf {
        let config_dir = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        config_dir.join("flipbook").join("player.json")
    }

    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(options) => {
                    log::info!("Loaded player options from {}", path.display());
                    options
                }
                Err(e) => {
                    log::warn!("Failed to parse player options: {e}");
                    Self::default()
                }
            },
            Err(_) => {
                log::info!("No player options found, using defaults");
                Self::default()
            }
        }
    }

    pub fn save(&self) {
        self.save_to(&Self::config_path());
    }

    pub fn save_to(&self, path: &Path) {
        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                log::error!("Failed to create config dir: {e}");
                return;
            }
        }
        match serde_json::to_string_pretty(self) {
            Ok(json) => {
                if let Err(e) = std::fs::write(path, json) {
                    log::error!("Failed to write player options: {e}");
                } else {
                    log::debug!("Saved player options to {}", path.display());
                }
            }
            Err(e) => log::error!("Failed to serialize player options: {e}"),
        }
    }

    /// Clamp values a movie cannot run with.
    pub fn validated(mut self) -> Self {
        if self.cpu_buffer_size == 0 {
            log::warn!("cpu_buffer_size 0 is not usable, using 1");
            self.cpu_buffer_size = 1;
        }
        if self.gpu_buffer_size == 0 {
            log::warn!("gpu_buffer_size 0 is not usable, using 1");
            self.gpu_buffer_size = 1;
        }
        if self.gpu_buffer_size < 2 {
            log::warn!("A single GPU slot leaves no frame ready behind the one on display");
        }
        if !self.playback_rate.is_finite() || self.playback_rate < 0.0 {
            log::warn!("Playback rate {} rejected, using 1.0", self.playback_rate);
            self.playback_rate = 1.0;
        }
        self
    }

    pub fn with_prebuffer(mut self, prebuffer: bool) -> Self {
        self.prebuffer = prebuffer;
        self
    }

    pub fn with_prebuffer_on_seek(mut self, prebuffer_on_seek: bool) -> Self {
        self.prebuffer_on_seek = prebuffer_on_seek;
        self
    }

    pub fn with_cpu_buffer_size(mut self, size: usize) -> Self {
        self.cpu_buffer_size = size;
        self
    }

    pub fn with_gpu_buffer_size(mut self, size: usize) -> Self {
        self.gpu_buffer_size = size;
        self
    }

    pub fn with_looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    pub fn with_playback_rate(mut self, rate: f32) -> Self {
        self.playback_rate = rate;
        self
    }
}
