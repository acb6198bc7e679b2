use std::io::BufRead;
use std::path::PathBuf;
use std::thread;

use clap::Parser;
use crossbeam_channel::{Receiver, bounded};

use flipbook::PlayerOptions;

#[derive(Parser, Debug)]
#[command(name = "flipbook")]
#[command(about = "Headless movie player: paces decoded frames at the track's frame rate")]
#[command(version)]
pub struct Args {
    /// Movie file to play (needs ffprobe on PATH)
    pub source: Option<PathBuf>,

    /// Play a generated track with this many samples instead of a file
    #[arg(long, conflicts_with = "source")]
    pub synthetic: Option<usize>,

    /// Frame rate of the generated track
    #[arg(long, default_value = "24")]
    pub fps: f32,

    /// Width of the generated track
    #[arg(long, default_value = "64")]
    pub width: u32,

    /// Height of the generated track
    #[arg(long, default_value = "36")]
    pub height: u32,

    /// Loop at end of stream
    #[arg(long = "loop")]
    pub looping: bool,

    /// Playback rate (1.0 = normal speed, 0 = frozen)
    #[arg(long)]
    pub rate: Option<f32>,

    /// Start position in seconds
    #[arg(long)]
    pub seek: Option<f64>,

    /// Stop after this many seconds of wall-clock time
    #[arg(long)]
    pub seconds: Option<f64>,

    /// Decoded frames buffered ahead of upload
    #[arg(long)]
    pub cpu_buffer: Option<usize>,

    /// Uploaded frames buffered ahead of display
    #[arg(long)]
    pub gpu_buffer: Option<usize>,

    /// Do not decode ahead before starting
    #[arg(long)]
    pub no_prebuffer: bool,

    /// Refill both buffers synchronously on every seek
    #[arg(long)]
    pub prebuffer_on_seek: bool,

    /// Upload into wgpu textures instead of host memory
    #[arg(long)]
    pub gpu: bool,

    /// Read commands from stdin (play, pause, stop, seek <s>, frame <n>, rate <x>, loop on|off, status, quit)
    #[arg(short, long)]
    pub interactive: bool,

    /// Options file to load instead of the default location
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Args {
    /// Command-line flags win over loaded options.
    pub fn apply_to(&self, mut options: PlayerOptions) -> PlayerOptions {
        if self.looping {
            options.looping = true;
        }
        if let Some(rate) = self.rate {
            options.playback_rate = rate;
        }
        if let Some(size) = self.cpu_buffer {
            options.cpu_buffer_size = size;
        }
        if let Some(size) = self.gpu_buffer {
            options.gpu_buffer_size = size;
        }
        if self.no_prebuffer {
            options.prebuffer = false;
        }
        if self.prebuffer_on_seek {
            options.prebuffer_on_seek = true;
        }
        options
    }
}

/// A transport command typed on stdin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    Play,
    Pause,
    Stop,
    Seek(f64),
    Frame(usize),
    Rate(f32),
    Loop(bool),
    Status,
    Quit,
}

pub fn parse_command(line: &str) -> Result<Command, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Err("empty command".into());
    };
    let arg = words.next();
    if words.next().is_some() {
        return Err(format!("too many arguments for '{verb}'"));
    }

    let need = |what: &str| arg.ok_or_else(|| format!("'{verb}' needs {what}"));
    match verb.to_ascii_lowercase().as_str() {
        "play" | "p" => Ok(Command::Play),
        "pause" => Ok(Command::Pause),
        "stop" | "s" => Ok(Command::Stop),
        "status" => Ok(Command::Status),
        "quit" | "q" | "exit" => Ok(Command::Quit),
        "seek" => need("seconds")?
            .parse()
            .map(Command::Seek)
            .map_err(|e| format!("bad time: {e}")),
        "frame" => need("a sample index")?
            .parse()
            .map(Command::Frame)
            .map_err(|e| format!("bad sample index: {e}")),
        "rate" => need("a rate")?
            .parse()
            .map(Command::Rate)
            .map_err(|e| format!("bad rate: {e}")),
        "loop" => match need("on or off")? {
            "on" | "true" | "1" => Ok(Command::Loop(true)),
            "off" | "false" | "0" => Ok(Command::Loop(false)),
            other => Err(format!("loop expects on or off, got '{other}'")),
        },
        other => Err(format!("unknown command '{other}'")),
    }
}

/// Read stdin lines on a background thread. End of input sends `Quit`.
pub fn spawn_stdin_reader() -> std::io::Result<Receiver<Command>> {
    let (tx, rx) = bounded(16);
    thread::Builder::new()
        .name("flipbook-stdin".into())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if line.trim().is_empty() {
                    continue;
                }
                match parse_command(&line) {
                    Ok(cmd) => {
                        if tx.send(cmd).is_err() {
                            return;
                        }
                    }
                    Err(e) => log::warn!("{e}"),
                }
            }
            let _ = tx.send(Command::Quit);
        })?;
    Ok(rx)
}
