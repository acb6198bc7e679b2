mod cli;

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::Parser;

use flipbook::gpu::{GraphicsContext, HostContext};
use flipbook::media::{SyntheticContainer, SyntheticSpec};
use flipbook::{Movie, PlaybackState, PlayerOptions};

use cli::{Args, Command};

const TICK: Duration = Duration::from_micros(16_667);

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = Args::parse();
    let loaded = match &args.config {
        Some(path) => PlayerOptions::load_from(path),
        None => PlayerOptions::load(),
    };
    let options = args.apply_to(loaded);

    if args.gpu {
        #[cfg(feature = "gpu")]
        {
            let context = flipbook::gpu::WgpuContext::headless()
                .context("Failed to initialize headless GPU")?;
            return run(&args, context, options);
        }
        #[cfg(not(feature = "gpu"))]
        bail!("--gpu needs a build with the `gpu` feature");
    }
    run(&args, HostContext::new(), options)
}

fn open<G: GraphicsContext>(args: &Args, context: G, options: PlayerOptions) -> Result<Movie<G>> {
    if let Some(samples) = args.synthetic {
        let spec = SyntheticSpec {
            samples,
            framerate: args.fps,
            width: args.width,
            height: args.height,
            ..Default::default()
        };
        return Ok(Movie::from_container(
            Box::new(SyntheticContainer::new(spec)),
            context,
            options,
        )?);
    }
    let Some(path) = &args.source else {
        bail!("No input: pass a movie file or --synthetic <samples>");
    };
    Movie::open(path, context, options).with_context(|| format!("Failed to open {}", path.display()))
}

fn run<G: GraphicsContext>(args: &Args, context: G, options: PlayerOptions) -> Result<()> {
    let mut movie = open(args, context, options)?;
    if let Some(time) = args.seek {
        movie.seek(time)?;
    }
    movie.play()?;

    let commands = if args.interactive {
        Some(cli::spawn_stdin_reader().context("Failed to start stdin reader")?)
    } else {
        None
    };

    let started = Instant::now();
    let limit = args.seconds.map(Duration::from_secs_f64);
    let mut last_shown = None;
    'ticks: loop {
        let tick_start = Instant::now();

        if let Some(rx) = &commands {
            while let Ok(cmd) = rx.try_recv() {
                if !apply_command(&mut movie, cmd) {
                    break 'ticks;
                }
            }
        }

        movie.update();

        if let Some(frame) = movie.current_frame() {
            let is_new = last_shown
                .as_ref()
                .is_none_or(|prev| !Arc::ptr_eq(prev, &frame));
            if is_new {
                log::info!(
                    "frame {:>5} @ {:8.3}s  (cpu {} / gpu {})",
                    frame.sample,
                    frame.timestamp,
                    movie.cpu_buffered(),
                    movie.gpu_buffered()
                );
                last_shown = Some(frame);
            }
        }

        if let Some(err) = movie.last_error() {
            log::warn!("{err}");
            movie.clear_error();
        }

        if !args.interactive && movie.state() == PlaybackState::Stopped {
            break;
        }
        if limit.is_some_and(|limit| started.elapsed() >= limit) {
            break;
        }
        std::thread::sleep(TICK.saturating_sub(tick_start.elapsed()));
    }

    movie.stop()?;
    log::info!("Played for {:.2}s", started.elapsed().as_secs_f64());
    Ok(())
}

/// Returns false when the player should exit.
fn apply_command<G: GraphicsContext>(movie: &mut Movie<G>, cmd: Command) -> bool {
    let result = match cmd {
        Command::Play => movie.play(),
        Command::Pause => {
            movie.pause();
            Ok(())
        }
        Command::Stop => movie.stop(),
        Command::Seek(time) => movie.seek(time).map(|_| ()),
        Command::Frame(n) => movie.seek_to_sample(n).map(|_| ()),
        Command::Rate(rate) => movie.set_playback_rate(rate),
        Command::Loop(on) => movie.set_looping(on),
        Command::Status => {
            log::info!(
                "{} {}: {:.3}/{:.3}s, rate {}, loop {}",
                movie.filename(),
                movie.state(),
                movie.elapsed_time(),
                movie.duration(),
                movie.playback_rate(),
                if movie.is_looping() { "on" } else { "off" }
            );
            Ok(())
        }
        Command::Quit => return false,
    };
    if let Err(e) = result {
        log::warn!("{cmd:?} failed: {e}");
    }
    true
}
