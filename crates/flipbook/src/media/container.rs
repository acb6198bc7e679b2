//! Container access: per-track metadata plus random access to raw samples.
//!
//! [`ProbedContainer`] leans on `ffprobe` for the parsing:
//! - `-show_streams -show_format` gives track metadata and the container brand
//! - `-show_packets` gives the byte offset, size and pts of every sample
//! - sample bytes are then read straight from the file, no ffmpeg at playback time

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::OnceLock;

use super::types::{Sample, TrackDescription, TrackKind};
use crate::error::{MovieError, Result};

/// Read side of a movie container. Lives on the reader thread once playback starts.
pub trait ContainerReader: Send {
    /// Human-readable name of the source, used in error messages.
    fn source_name(&self) -> String;

    /// Container brand, e.g. `"qt  512"`.
    fn format(&self) -> String;

    fn tracks(&self) -> &[TrackDescription];

    /// Raw bytes and timestamp of sample `index` of track `track`.
    fn read_sample(&mut self, track: usize, index: usize) -> Result<Sample>;

    /// File backing this container, if any.
    fn path(&self) -> Option<&Path> {
        None
    }
}

/// Check if ffprobe is available on the system. Cached per process.
pub fn ffprobe_available() -> bool {
    static AVAILABLE: OnceLock<bool> = OnceLock::new();
    *AVAILABLE.get_or_init(|| {
        Command::new("ffprobe")
            .arg("-version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    })
}

/// Location of one sample inside the file.
#[derive(Debug, Clone, Copy, PartialEq)]
struct PacketRef {
    offset: u64,
    size: usize,
    timestamp: f64,
}

/// Everything we keep from an ffprobe run.
#[derive(Debug, Clone)]
struct ProbeInfo {
    format: String,
    tracks: Vec<TrackDescription>,
    packets: Vec<Vec<PacketRef>>,
}

/// A container file indexed by ffprobe.
pub struct ProbedContainer {
    path: PathBuf,
    file: File,
    info: ProbeInfo,
}

impl ProbedContainer {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|source| MovieError::Open {
            path: path.to_path_buf(),
            source,
        })?;

        if !ffprobe_available() {
            return Err(MovieError::Container(
                "ffprobe not found on PATH".to_string(),
            ));
        }

        let output = Command::new("ffprobe")
            .args([
                "-v", "quiet",
                "-print_format", "json",
                "-show_streams",
                "-show_format",
                "-show_packets",
            ])
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .output()
            .map_err(|e| MovieError::Container(format!("ffprobe failed to execute: {e}")))?;

        if !output.status.success() {
            return Err(MovieError::Container(format!(
                "ffprobe could not parse {}",
                path.display()
            )));
        }

        let json: serde_json::Value = serde_json::from_slice(&output.stdout)
            .map_err(|e| MovieError::Container(format!("Failed to parse ffprobe JSON: {e}")))?;
        let info = parse_probe(&json)?;

        log::info!(
            "Probed {}: {} ({} track{})",
            path.display(),
            info.format,
            info.tracks.len(),
            if info.tracks.len() == 1 { "" } else { "s" }
        );

        Ok(Self {
            path: path.to_path_buf(),
            file,
            info,
        })
    }
}

impl ContainerReader for ProbedContainer {
    fn source_name(&self) -> String {
        self.path.display().to_string()
    }

    fn format(&self) -> String {
        self.info.format.clone()
    }

    fn tracks(&self) -> &[TrackDescription] {
        &self.info.tracks
    }

    fn read_sample(&mut self, track: usize, index: usize) -> Result<Sample> {
        let packet = self
            .info
            .packets
            .get(track)
            .and_then(|p| p.get(index))
            .copied()
            .ok_or_else(|| MovieError::Sample {
                index,
                reason: format!("no sample {index} in track {track}"),
            })?;

        let io_err = |e: std::io::Error| MovieError::Sample {
            index,
            reason: e.to_string(),
        };
        self.file
            .seek(SeekFrom::Start(packet.offset))
            .map_err(io_err)?;
        let mut data = vec![0u8; packet.size];
        self.file.read_exact(&mut data).map_err(io_err)?;

        Ok(Sample {
            data,
            timestamp: packet.timestamp,
        })
    }

    fn path(&self) -> Option<&Path> {
        Some(&self.path)
    }
}

fn parse_probe(json: &serde_json::Value) -> Result<ProbeInfo> {
    let streams = json["streams"]
        .as_array()
        .ok_or_else(|| MovieError::Container("No streams in ffprobe output".to_string()))?;

    let format = container_brand(&json["format"]);
    let format_duration = json_f64(&json["format"]["duration"]);

    let mut stream_ids = Vec::with_capacity(streams.len());
    let mut tracks = Vec::with_capacity(streams.len());
    for stream in streams {
        stream_ids.push(stream["index"].as_u64().unwrap_or(stream_ids.len() as u64));
        let kind = match stream["codec_type"].as_str() {
            Some("video") => TrackKind::Video,
            Some("audio") => TrackKind::Audio,
            _ => TrackKind::Other,
        };
        let framerate = stream["avg_frame_rate"]
            .as_str()
            .map(parse_frame_rate)
            .filter(|r| *r > 0.0)
            .or_else(|| stream["r_frame_rate"].as_str().map(parse_frame_rate))
            .unwrap_or(0.0);
        tracks.push(TrackDescription {
            kind,
            codec: stream["codec_name"]
                .as_str()
                .or_else(|| stream["codec_tag_string"].as_str())
                .unwrap_or("unknown")
                .to_string(),
            width: stream["width"].as_u64().unwrap_or(0) as u32,
            height: stream["height"].as_u64().unwrap_or(0) as u32,
            framerate: framerate as f32,
            sample_count: 0,
            duration: json_f64(&stream["duration"]).or(format_duration).unwrap_or(0.0),
        });
    }

    let mut packets: Vec<Vec<PacketRef>> = vec![Vec::new(); tracks.len()];
    for packet in json["packets"].as_array().map(Vec::as_slice).unwrap_or(&[]) {
        let Some(stream_id) = packet["stream_index"].as_u64() else {
            continue;
        };
        let Some(track) = stream_ids.iter().position(|&id| id == stream_id) else {
            continue;
        };
        let (Some(offset), Some(size)) = (json_u64(&packet["pos"]), json_u64(&packet["size"]))
        else {
            continue;
        };
        packets[track].push(PacketRef {
            offset,
            size: size as usize,
            timestamp: json_f64(&packet["pts_time"])
                .or_else(|| json_f64(&packet["dts_time"]))
                .unwrap_or(f64::NAN),
        });
    }

    for (track, list) in tracks.iter_mut().zip(packets.iter_mut()) {
        // Packets arrive in decode order; intra-only codecs share pts and dts,
        // anything else is put back into presentation order here.
        list.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
        let spf = if track.framerate > 0.0 {
            1.0 / track.framerate as f64
        } else {
            0.0
        };
        for (i, p) in list.iter_mut().enumerate() {
            if p.timestamp.is_nan() {
                p.timestamp = i as f64 * spf;
            }
        }
        track.sample_count = list.len();
        if track.framerate <= 0.0 && track.duration > 0.0 {
            track.framerate = (list.len() as f64 / track.duration) as f32;
        }
    }

    Ok(ProbeInfo {
        format,
        tracks,
        packets,
    })
}

/// `"<major brand><minor version>"` when the container carries a brand,
/// otherwise ffprobe's format name.
fn container_brand(format: &serde_json::Value) -> String {
    let tags = &format["tags"];
    match (tags["major_brand"].as_str(), tags["minor_version"].as_str()) {
        (Some(brand), Some(minor)) => format!("{brand}{minor}"),
        (Some(brand), None) => brand.to_string(),
        _ => format["format_name"]
            .as_str()
            .unwrap_or("unknown")
            .to_string(),
    }
}

/// ffprobe prints most numbers as strings.
fn json_f64(v: &serde_json::Value) -> Option<f64> {
    v.as_f64()
        .or_else(|| v.as_str().and_then(|s| s.parse::<f64>().ok()))
}

fn json_u64(v: &serde_json::Value) -> Option<u64> {
    v.as_u64()
        .or_else(|| v.as_str().and_then(|s| s.parse::<u64>().ok()))
}

fn parse_frame_rate(rate: &str) -> f64 {
    if let Some((num, den)) = rate.split_once('/') {
        let n: f64 = num.parse().unwrap_or(0.0);
        let d: f64 = den.parse().unwrap_or(1.0);
        if d > 0.0 { n / d } else { 0.0 }
    } else {
        rate.parse().unwrap_or(0.0)
    }
}
