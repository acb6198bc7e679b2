use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::buffer::BoundedBuffer;
use super::scheduler::{ReadScheduler, ReadShared, SampleSource, StepOutcome};
use crate::error::{MovieError, Result};
use crate::gpu::{GraphicsContext, PresentedFrame};
use crate::media::{
    ContainerReader, PlaybackState, ProbedContainer, TrackDescription, decoder_for,
};
use crate::settings::PlayerOptions;

/// Keeps `floor` from landing one sample short on exact sample times.
const SEEK_TOLERANCE: f64 = 1e-6;

/// A frame sitting in a GPU slot, waiting to be published.
#[derive(Debug, Clone, Copy)]
struct StagedFrame {
    slot: usize,
    sample: usize,
    timestamp: f64,
}

/// A single-video-track movie.
///
/// A background reader decodes samples into the CPU buffer. [`update`](Self::update)
/// moves them into GPU slots and publishes one per frame interval. Every method
/// is meant to be called from the thread that owns the graphics context.
pub struct Movie<G: GraphicsContext> {
    filename: String,
    path: Option<PathBuf>,
    format: String,
    tracks: Vec<TrackDescription>,
    video_track: usize,
    options: PlayerOptions,

    context: G,
    reader: ReadScheduler,
    gpu: BoundedBuffer<StagedFrame>,
    next_slot: usize,

    current: Option<Arc<PresentedFrame<G::Texture>>>,
    current_sample: usize,
    state: PlaybackState,
    playback_rate: f32,
    /// Rate to restore when resuming from pause.
    resume_rate: f32,
    last_publish: Option<Instant>,
    force_refresh: bool,
}

/// Derive whichever of frame rate and duration the container left out from
/// the other one. A track with neither cannot be paced.
fn fill_in_timing(track: &mut TrackDescription, filename: &str) -> Result<()> {
    let count = track.sample_count as f64;
    let has_rate = track.framerate.is_finite() && track.framerate > 0.0;
    let has_duration = track.duration.is_finite() && track.duration > 0.0;
    match (has_rate, has_duration) {
        (true, true) => {}
        (false, true) => {
            track.framerate = (count / track.duration) as f32;
            log::warn!(
                "{filename}: no frame rate, using {:.3} fps from {} samples over {:.3}s",
                track.framerate,
                track.sample_count,
                track.duration
            );
        }
        (true, false) => {
            track.duration = count / f64::from(track.framerate);
            log::warn!("{filename}: no duration, using {:.3}s", track.duration);
        }
        (false, false) => {
            return Err(MovieError::Container(format!(
                "{filename}: video track has neither a frame rate nor a duration"
            )));
        }
    }
    Ok(())
}

impl<G: GraphicsContext> Movie<G> {
    /// Open a movie file.
    pub fn open(path: impl AsRef<Path>, context: G, options: PlayerOptions) -> Result<Self> {
        let container = ProbedContainer::open(path.as_ref())?;
        Self::from_container(Box::new(container), context, options)
    }

    /// Open a movie from any container. Fails if the container does not hold
    /// exactly one video track, the track is empty, its codec has no decoder,
    /// or its first sample cannot be read.
    pub fn from_container(
        mut container: Box<dyn ContainerReader>,
        mut context: G,
        options: PlayerOptions,
    ) -> Result<Self> {
        let options = options.validated();
        let filename = container.source_name();

        let video: Vec<usize> = container
            .tracks()
            .iter()
            .enumerate()
            .filter(|(_, t)| t.is_video())
            .map(|(i, _)| i)
            .collect();
        let video_track = match video.as_slice() {
            [] => return Err(MovieError::NoVideoTrack(filename)),
            [only] => *only,
            _ => {
                return Err(MovieError::MultipleVideoTracks {
                    source_name: filename,
                    count: video.len(),
                });
            }
        };

        let mut tracks = container.tracks().to_vec();
        if tracks[video_track].sample_count == 0 {
            return Err(MovieError::EmptyTrack);
        }
        fill_in_timing(&mut tracks[video_track], &filename)?;
        let track = &tracks[video_track];
        let decoder = decoder_for(&track.codec, track.width, track.height)?;
        container.read_sample(video_track, 0)?;
        context.allocate_slots(options.gpu_buffer_size, track.width, track.height)?;

        log::info!(
            "Opened {filename}: {}x{} {} @ {:.3} fps, {} samples, {:.3}s",
            track.width,
            track.height,
            track.codec,
            track.framerate,
            track.sample_count,
            track.duration
        );

        let format = container.format();
        let path = container.path().map(Path::to_path_buf);
        let shared = ReadShared::new(
            SampleSource {
                container,
                decoder,
                track: video_track,
            },
            options.cpu_buffer_size,
            track.sample_count,
            options.looping,
        );

        let mut movie = Self {
            filename,
            path,
            format,
            tracks,
            video_track,
            playback_rate: options.playback_rate,
            resume_rate: if options.playback_rate > 0.0 {
                options.playback_rate
            } else {
                1.0
            },
            gpu: BoundedBuffer::new(options.gpu_buffer_size),
            options,
            context,
            reader: ReadScheduler::new(shared),
            next_slot: 0,
            current: None,
            current_sample: 0,
            state: PlaybackState::Stopped,
            last_publish: None,
            force_refresh: false,
        };

        if movie.options.prebuffer {
            movie.prebuffer();
        }
        Ok(movie)
    }

    /// Open the same file again as an independent movie with the same options.
    pub fn reopen(&self, context: G) -> Result<Self> {
        let path = self.path.as_ref().ok_or(MovieError::NotFileBacked)?;
        let options = self
            .options
            .clone()
            .with_looping(self.is_looping())
            .with_playback_rate(self.playback_rate);
        Self::open(path, context, options)
    }

    fn track(&self) -> &TrackDescription {
        &self.tracks[self.video_track]
    }

    fn shared(&self) -> &ReadShared {
        self.reader.shared()
    }

    // --- Metadata ---

    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Container brand, e.g. `"qt  512"`.
    pub fn format(&self) -> &str {
        &self.format
    }

    pub fn codec(&self) -> &str {
        &self.track().codec
    }

    pub fn num_tracks(&self) -> usize {
        self.tracks.len()
    }

    pub fn track_description(&self, index: usize) -> Option<&TrackDescription> {
        self.tracks.get(index)
    }

    pub fn width(&self) -> u32 {
        self.track().width
    }

    pub fn height(&self) -> u32 {
        self.track().height
    }

    pub fn framerate(&self) -> f32 {
        self.track().framerate
    }

    pub fn sample_count(&self) -> usize {
        self.track().sample_count
    }

    pub fn duration(&self) -> f64 {
        self.track().duration
    }

    pub fn options(&self) -> &PlayerOptions {
        &self.options
    }

    // --- Position ---

    /// Sample index of the frame on display.
    pub fn elapsed_samples(&self) -> usize {
        self.current_sample
    }

    pub fn elapsed_time(&self) -> f64 {
        self.current_sample as f64 / self.sample_count() as f64 * self.duration()
    }

    pub fn remaining_time(&self) -> f64 {
        (self.duration() - self.elapsed_time()).max(0.0)
    }

    /// Read position of the background reader as a fraction of the track.
    pub fn read_progress(&self) -> f64 {
        self.shared().progress.load()
    }

    // --- State ---

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlaybackState::Playing
    }

    pub fn is_looping(&self) -> bool {
        self.shared().is_looping()
    }

    pub fn playback_rate(&self) -> f32 {
        self.playback_rate
    }

    pub fn current_frame(&self) -> Option<Arc<PresentedFrame<G::Texture>>> {
        self.current.clone()
    }

    /// The most recent per-sample or upload failure, kept until cleared.
    pub fn last_error(&self) -> Option<Arc<MovieError>> {
        self.shared().last_error()
    }

    pub fn clear_error(&self) {
        self.shared().clear_error();
    }

    pub fn cpu_buffered(&self) -> usize {
        self.shared().cpu.len()
    }

    pub fn gpu_buffered(&self) -> usize {
        self.gpu.len()
    }

    pub fn context(&self) -> &G {
        &self.context
    }

    // --- Transport ---

    pub fn play(&mut self) -> Result<()> {
        if self.state == PlaybackState::Playing {
            return Ok(());
        }
        if self.state == PlaybackState::Stopped && self.shared().progress.is_at_end() {
            self.seek_to_start()?;
        }
        if self.state == PlaybackState::Paused {
            self.playback_rate = self.resume_rate;
        }
        log::info!("{}: {} -> playing", self.filename, self.state);
        self.state = PlaybackState::Playing;
        self.last_publish = None;
        self.ensure_reader()
    }

    /// Freeze on the current frame. The reader keeps both buffers warm.
    pub fn pause(&mut self) {
        if self.state != PlaybackState::Playing {
            return;
        }
        if self.playback_rate > 0.0 {
            self.resume_rate = self.playback_rate;
        }
        self.playback_rate = 0.0;
        self.state = PlaybackState::Paused;
        log::info!("{}: paused", self.filename);
    }

    /// Stop the reader, wait for it to exit, and rewind. The frame on display
    /// is kept.
    pub fn stop(&mut self) -> Result<()> {
        self.reader.stop();
        if self.state == PlaybackState::Paused {
            self.playback_rate = self.resume_rate;
        }
        if self.state != PlaybackState::Stopped {
            log::info!("{}: {} -> stopped", self.filename, self.state);
        }
        self.state = PlaybackState::Stopped;
        self.seek_to_start().map(|_| ())
    }

    pub fn set_looping(&mut self, looping: bool) -> Result<()> {
        self.shared().set_looping(looping);
        if looping && self.shared().resume_if_finished() {
            // Idle at end of stream; make sure a thread is there to wake.
            self.ensure_reader()?;
        }
        Ok(())
    }

    /// Change the pacing rate; 0 freezes the display. Negative and non-finite
    /// rates are rejected.
    pub fn set_playback_rate(&mut self, rate: f32) -> Result<()> {
        if !rate.is_finite() || rate < 0.0 {
            return Err(MovieError::InvalidRate(rate));
        }
        self.playback_rate = rate;
        if rate > 0.0 {
            self.resume_rate = rate;
        }
        Ok(())
    }

    pub fn seek_to_start(&mut self) -> Result<usize> {
        self.seek_to_sample(0)
    }

    /// Seek to `time` seconds. Negative times clamp to 0; times past the end
    /// wrap around. Returns the sample that will be shown next.
    pub fn seek(&mut self, time: f64) -> Result<usize> {
        let duration = self.duration();
        if time.is_nan() || time <= 0.0 || duration.is_nan() || duration <= 0.0 {
            return self.seek_to_sample(0);
        }
        let t = if time >= duration {
            time.rem_euclid(duration)
        } else {
            time
        };
        let n = self.sample_count() as f64;
        let sample = (t / duration * n + SEEK_TOLERANCE).floor() as usize;
        self.seek_to_sample(sample)
    }

    /// Seek to sample `n`, clamped to the last sample. Both buffers are emptied
    /// and the next `update()` publishes without waiting for the frame interval.
    pub fn seek_to_sample(&mut self, n: usize) -> Result<usize> {
        let target = n.min(self.sample_count() - 1);
        let shared = self.reader.shared();
        shared.rewind_to(shared.progress.fraction_of(target));
        self.gpu.clear();
        self.force_refresh = true;
        log::debug!("{}: seek to sample {target}", self.filename);

        if self.state.keeps_reader_alive() {
            self.ensure_reader()?;
        }
        if self.options.prebuffer_on_seek {
            self.prebuffer();
        }
        Ok(target)
    }

    fn ensure_reader(&mut self) -> Result<()> {
        if !self.state.keeps_reader_alive() {
            return Ok(());
        }
        self.reader.start()?;
        self.reader.schedule();
        Ok(())
    }

    // --- Upload stage ---

    /// Advance the display. Call once per tick from the thread owning the
    /// graphics context; never blocks on decode.
    pub fn update(&mut self) {
        self.observe_reader();
        self.transfer_to_gpu();

        let now = Instant::now();
        let forced = self.force_refresh || self.current.is_none();
        if (forced || self.frame_due(now)) && self.publish_next() {
            self.force_refresh = false;
            self.last_publish = Some(match (self.last_publish, self.frame_interval()) {
                (Some(last), Some(interval)) if !forced => match last.checked_add(interval) {
                    // Too far behind: resync instead of bursting to catch up.
                    Some(next) if now.saturating_duration_since(next) <= interval => next,
                    _ => now,
                },
                _ => now,
            });
        }

        self.transfer_to_gpu();
    }

    /// `None` when frozen, including rates so small the interval does not fit
    /// in a `Duration`.
    fn frame_interval(&self) -> Option<Duration> {
        let fps = f64::from(self.framerate()) * f64::from(self.playback_rate);
        if fps > 0.0 && fps.is_finite() {
            Duration::try_from_secs_f64(1.0 / fps).ok()
        } else {
            None
        }
    }

    fn frame_due(&self, now: Instant) -> bool {
        if self.state != PlaybackState::Playing {
            return false;
        }
        let Some(interval) = self.frame_interval() else {
            return false;
        };
        self.last_publish
            .is_none_or(|last| now.saturating_duration_since(last) >= interval)
    }

    /// The reader idles at end of stream when not looping; once the last
    /// frames have been shown it is joined and the movie stops.
    fn observe_reader(&mut self) {
        if self.state == PlaybackState::Stopped || !self.shared().is_finished() {
            return;
        }
        if self.shared().cpu.is_empty() && self.gpu.is_empty() {
            self.reader.stop();
            log::info!("{}: reached end, stopped", self.filename);
            self.state = PlaybackState::Stopped;
        }
    }

    /// Move decoded frames into free GPU slots, round-robin.
    fn transfer_to_gpu(&mut self) {
        while !self.gpu.is_full() {
            let Some(frame) = self.reader.shared().cpu.try_pop() else {
                break;
            };
            self.reader.schedule();

            let slot = self.next_slot;
            let staged = StagedFrame {
                slot,
                sample: frame.sample,
                timestamp: frame.timestamp,
            };
            if let Err(e) = self.context.upload(slot, frame) {
                log::error!("Upload of sample {} failed: {e}", staged.sample);
                self.reader.shared().record_error(e);
                continue;
            }
            self.next_slot = (slot + 1) % self.gpu.capacity();
            if self.gpu.try_push(staged).is_err() {
                break;
            }
        }
    }

    fn publish_next(&mut self) -> bool {
        let Some(staged) = self.gpu.try_pop() else {
            return false;
        };
        match self.context.present(staged.slot) {
            Ok(texture) => {
                self.current = Some(Arc::new(PresentedFrame {
                    texture,
                    sample: staged.sample,
                    timestamp: staged.timestamp,
                }));
                self.current_sample = staged.sample;
                true
            }
            Err(e) => {
                log::error!("Present of sample {} failed: {e}", staged.sample);
                self.reader.shared().record_error(e);
                false
            }
        }
    }

    // --- Prebuffer ---

    /// Synchronously decode until both buffers are full, publishing a first
    /// frame if there is none yet (or a seek is pending).
    pub fn prebuffer(&mut self) {
        self.fill_cpu();
        self.transfer_to_gpu();
        if (self.current.is_none() || self.force_refresh) && self.publish_next() {
            self.force_refresh = false;
            self.last_publish = Some(Instant::now());
            self.fill_cpu();
            self.transfer_to_gpu();
        }
        self.fill_cpu();
    }

    fn fill_cpu(&self) {
        let shared = self.reader.shared();
        let limit = shared.progress.num_samples();
        let mut skipped = 0;
        loop {
            match shared.step(false) {
                StepOutcome::Queued | StepOutcome::Superseded | StepOutcome::Reset => {}
                StepOutcome::Skipped => {
                    skipped += 1;
                    if skipped >= limit {
                        break;
                    }
                }
                StepOutcome::Full | StepOutcome::EndOfStream | StepOutcome::Closed => break,
            }
        }
    }
}

impl<G: GraphicsContext> Drop for Movie<G> {
    fn drop(&mut self) {
        self.reader.stop();
        log::info!("Closed {}", self.filename);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{HostContext, HostTexture};
    use crate::media::{Sample, SyntheticContainer, SyntheticSpec, TrackKind};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    fn synthetic(spec: SyntheticSpec, options: PlayerOptions) -> Movie<HostContext> {
        Movie::from_container(
            Box::new(SyntheticContainer::new(spec)),
            HostContext::new(),
            options,
        )
        .unwrap()
    }

    fn movie(samples: usize, options: PlayerOptions) -> Movie<HostContext> {
        synthetic(
            SyntheticSpec {
                samples,
                ..Default::default()
            },
            options,
        )
    }

    fn shown(movie: &Movie<HostContext>) -> Option<usize> {
        movie.current_frame().map(|f| {
            let HostTexture { pixels, .. } = &f.texture;
            let sample = SyntheticContainer::sample_of(pixels).unwrap();
            assert_eq!(sample, f.sample, "texture and frame metadata disagree");
            sample
        })
    }

    /// Call `update()` until `cond` holds, or give up after a few seconds.
    fn update_until(
        movie: &mut Movie<HostContext>,
        mut cond: impl FnMut(&Movie<HostContext>) -> bool,
    ) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            movie.update();
            if cond(movie) {
                return true;
            }
            thread::sleep(Duration::from_millis(1));
        }
        false
    }

    /// Play to the end (or `limit` frames) and return the published samples.
    fn collect_published(movie: &mut Movie<HostContext>, limit: usize) -> Vec<usize> {
        let mut seen: Vec<usize> = shown(movie).into_iter().collect();
        let deadline = Instant::now() + Duration::from_secs(10);
        while seen.len() < limit && Instant::now() < deadline {
            let before = movie.current_frame();
            movie.update();
            let after = movie.current_frame();
            let changed = match (&before, &after) {
                (Some(a), Some(b)) => !Arc::ptr_eq(a, b),
                (None, Some(_)) => true,
                _ => false,
            };
            if changed {
                seen.extend(shown(movie));
            }
            if movie.state() == PlaybackState::Stopped {
                break;
            }
            thread::sleep(Duration::from_micros(200));
        }
        seen
    }

    struct FixedTracks(Vec<TrackDescription>);

    impl ContainerReader for FixedTracks {
        fn source_name(&self) -> String {
            "fixed".into()
        }
        fn format(&self) -> String {
            "test".into()
        }
        fn tracks(&self) -> &[TrackDescription] {
            &self.0
        }
        fn read_sample(&mut self, _track: usize, _index: usize) -> Result<Sample> {
            Ok(Sample {
                data: vec![0; 4],
                timestamp: 0.0,
            })
        }
    }

    fn track(kind: TrackKind, codec: &str) -> TrackDescription {
        TrackDescription {
            kind,
            codec: codec.into(),
            width: 1,
            height: 1,
            framerate: 10.0,
            sample_count: 10,
            duration: 1.0,
        }
    }

    fn open_fixed(tracks: Vec<TrackDescription>) -> Result<Movie<HostContext>> {
        Movie::from_container(
            Box::new(FixedTracks(tracks)),
            HostContext::new(),
            PlayerOptions::default(),
        )
    }

    #[test]
    fn prebuffer_at_open_fills_both_buffers() {
        let m = movie(10, PlayerOptions::default());
        assert_eq!(m.state(), PlaybackState::Stopped);
        assert_eq!(m.cpu_buffered(), 2);
        assert_eq!(m.gpu_buffered(), 2);
        assert_eq!(shown(&m), Some(0));
        assert_eq!(m.elapsed_samples(), 0);
        assert_eq!(m.context().slot_count(), 2);
    }

    #[test]
    fn without_prebuffer_nothing_is_decoded() {
        let m = movie(10, PlayerOptions::default().with_prebuffer(false));
        assert_eq!(m.cpu_buffered(), 0);
        assert_eq!(m.gpu_buffered(), 0);
        assert!(m.current_frame().is_none());
    }

    #[test]
    fn metadata_accessors() {
        let m = movie(10, PlayerOptions::default());
        assert_eq!(m.filename(), "synthetic:4x4x10");
        assert_eq!(m.format(), "synthetic");
        assert_eq!(m.codec(), "rgba");
        assert_eq!(m.num_tracks(), 1);
        assert_eq!((m.width(), m.height()), (4, 4));
        assert_eq!(m.framerate(), 10.0);
        assert_eq!(m.sample_count(), 10);
        assert!((m.duration() - 1.0).abs() < 1e-9);
        assert!((m.remaining_time() - 1.0).abs() < 1e-9);
        assert!(m.track_description(0).unwrap().is_video());
        assert!(m.track_description(1).is_none());
    }

    #[test]
    fn plays_every_sample_in_order_then_stops() {
        let mut m = movie(10, PlayerOptions::default().with_playback_rate(50.0));
        m.play().unwrap();
        let seen = collect_published(&mut m, 100);
        assert_eq!(seen, (0..10).collect::<Vec<_>>());
        assert_eq!(m.state(), PlaybackState::Stopped);
        assert_eq!(m.elapsed_samples(), 9);
    }

    #[test]
    fn play_after_reaching_end_restarts() {
        let mut m = movie(4, PlayerOptions::default().with_playback_rate(100.0));
        m.play().unwrap();
        collect_published(&mut m, 100);
        assert_eq!(m.state(), PlaybackState::Stopped);
        m.play().unwrap();
        assert!(update_until(&mut m, |m| shown(m) == Some(0)));
    }

    #[test]
    fn seek_lands_within_one_sample() {
        let mut m = movie(10, PlayerOptions::default());
        let quantum = m.duration() / m.sample_count() as f64;
        for i in 0..20 {
            let t = f64::from(i) * 0.05;
            m.seek(t).unwrap();
            m.prebuffer();
            let elapsed = m.elapsed_time();
            assert!(
                elapsed <= t + 1e-9 && t - elapsed < quantum,
                "seek({t}) shows {elapsed}"
            );
        }
    }

    #[test]
    fn seek_clamps_and_wraps() {
        let mut m = movie(10, PlayerOptions::default());
        assert_eq!(m.seek(-3.0).unwrap(), 0);
        assert_eq!(m.seek(1.25).unwrap(), 2);
        assert_eq!(m.seek(0.3).unwrap(), 3);
        assert_eq!(m.seek_to_sample(99).unwrap(), 9);
    }

    #[test]
    fn seek_with_prebuffer_on_seek_refills() {
        let mut m = movie(10, PlayerOptions::default().with_prebuffer_on_seek(true));
        m.seek_to_sample(5).unwrap();
        assert_eq!(shown(&m), Some(5));
        assert_eq!(m.gpu_buffered(), 2);
        assert_eq!(m.cpu_buffered(), 2);
    }

    #[test]
    fn seek_while_playing_shows_target_next() {
        let mut m = synthetic(
            SyntheticSpec {
                samples: 200,
                read_delay: Some(Duration::from_millis(2)),
                ..Default::default()
            },
            PlayerOptions::default(),
        );
        m.play().unwrap();
        m.update();
        m.seek_to_sample(150).unwrap();
        let before = m.current_frame();
        assert!(update_until(&mut m, |m| {
            match (&before, m.current_frame()) {
                (Some(a), Some(b)) => !Arc::ptr_eq(a, &b),
                _ => true,
            }
        }));
        assert_eq!(shown(&m), Some(150));
    }

    #[test]
    fn read_progress_never_decreases_while_playing() {
        let mut m = synthetic(
            SyntheticSpec {
                samples: 60,
                read_delay: Some(Duration::from_micros(300)),
                ..Default::default()
            },
            PlayerOptions::default().with_playback_rate(40.0),
        );
        m.play().unwrap();
        let mut last = m.read_progress();
        let deadline = Instant::now() + Duration::from_secs(10);
        while m.state() == PlaybackState::Playing && Instant::now() < deadline {
            m.update();
            let p = m.read_progress();
            assert!(p >= last, "progress went from {last} to {p}");
            last = p;
            thread::sleep(Duration::from_micros(200));
        }
        assert_eq!(m.state(), PlaybackState::Stopped);
    }

    #[test]
    fn looping_wraps_without_stalling() {
        let mut m = movie(
            5,
            PlayerOptions::default()
                .with_looping(true)
                .with_playback_rate(100.0),
        );
        m.play().unwrap();
        let seen = collect_published(&mut m, 17);
        assert_eq!(seen.len(), 17, "pipeline stalled: {seen:?}");
        for pair in seen.windows(2) {
            assert_eq!(pair[1], (pair[0] + 1) % 5, "unexpected order {seen:?}");
        }
        assert!(m.is_playing());
    }

    #[test]
    fn enabling_loop_after_end_resumes() {
        let mut m = movie(3, PlayerOptions::default());
        m.play().unwrap();
        // hold the queued frames so the reader hits the end before they drain
        m.set_playback_rate(0.0).unwrap();
        assert!(update_until(&mut m, |m| m.shared().is_finished()));
        assert!(m.is_playing());
        m.set_looping(true).unwrap();
        m.set_playback_rate(100.0).unwrap();
        assert!(m.is_looping());
        let seen = collect_published(&mut m, 8);
        assert_eq!(seen.len(), 8);
        assert!(m.is_playing());
    }

    #[test]
    fn zero_rate_freezes_display_but_buffers_fill() {
        let mut m = movie(50, PlayerOptions::default().with_prebuffer(false));
        m.play().unwrap();
        assert!(update_until(&mut m, |m| m.current_frame().is_some()));
        m.set_playback_rate(0.0).unwrap();
        let frozen = m.current_frame().unwrap();
        assert!(update_until(&mut m, |m| m.cpu_buffered() == 2
            && m.gpu_buffered() == 2));
        for _ in 0..50 {
            m.update();
            assert!(Arc::ptr_eq(&frozen, &m.current_frame().unwrap()));
            thread::sleep(Duration::from_millis(1));
        }
        m.set_playback_rate(1.0).unwrap();
        assert_eq!(m.playback_rate(), 1.0);
    }

    #[test]
    fn pause_and_resume_restore_rate() {
        let mut m = movie(10, PlayerOptions::default().with_playback_rate(2.0));
        m.play().unwrap();
        m.pause();
        assert_eq!(m.state(), PlaybackState::Paused);
        assert_eq!(m.playback_rate(), 0.0);
        m.play().unwrap();
        assert!(m.is_playing());
        assert_eq!(m.playback_rate(), 2.0);
    }

    #[test]
    fn invalid_rates_are_rejected() {
        let mut m = movie(10, PlayerOptions::default());
        assert!(matches!(
            m.set_playback_rate(-1.0),
            Err(MovieError::InvalidRate(_))
        ));
        assert!(m.set_playback_rate(f32::INFINITY).is_err());
        assert_eq!(m.playback_rate(), 1.0);
    }

    #[test]
    fn tiny_rate_freezes_instead_of_overflowing() {
        let mut m = movie(10, PlayerOptions::default());
        m.play().unwrap();
        m.set_playback_rate(1e-30).unwrap();
        let first = m.current_frame().unwrap();
        for _ in 0..20 {
            m.update();
            thread::sleep(Duration::from_millis(1));
        }
        assert!(Arc::ptr_eq(&first, &m.current_frame().unwrap()));
        assert!(m.is_playing());

        m.set_playback_rate(f32::MIN_POSITIVE).unwrap();
        m.update();
        m.set_playback_rate(100.0).unwrap();
        assert!(update_until(&mut m, |m| m.elapsed_samples() > 0));
    }

    #[test]
    fn stop_joins_reader_and_freezes_buffers() {
        let mut m = synthetic(
            SyntheticSpec {
                samples: 100,
                read_delay: Some(Duration::from_micros(500)),
                ..Default::default()
            },
            PlayerOptions::default().with_playback_rate(60.0),
        );
        m.play().unwrap();
        for _ in 0..20 {
            m.update();
            thread::sleep(Duration::from_millis(2));
        }
        let shown_before = shown(&m);
        m.stop().unwrap();
        assert_eq!(m.state(), PlaybackState::Stopped);
        assert!(!m.reader.is_running());
        assert_eq!(shown(&m), shown_before, "stop keeps the frame on display");

        let snapshot = (m.cpu_buffered(), m.gpu_buffered(), m.read_progress());
        thread::sleep(Duration::from_millis(30));
        assert_eq!(
            (m.cpu_buffered(), m.gpu_buffered(), m.read_progress()),
            snapshot
        );
        assert_eq!(m.read_progress(), 0.0, "stop rewinds");
    }

    #[test]
    fn decode_error_is_skipped_and_recorded() {
        let mut m = synthetic(
            SyntheticSpec {
                corrupt: [6].into_iter().collect(),
                ..Default::default()
            },
            PlayerOptions::default().with_playback_rate(50.0),
        );
        assert!(m.last_error().is_none());
        m.play().unwrap();
        let seen = collect_published(&mut m, 100);
        assert_eq!(seen, vec![0, 1, 2, 3, 4, 5, 7, 8, 9]);
        let err = m.last_error().unwrap();
        assert!(matches!(*err, MovieError::Decode { index: 6, .. }));
        m.clear_error();
        assert!(m.last_error().is_none());
    }

    #[test]
    fn unsupported_codec_fails_open() {
        let err = Movie::from_container(
            Box::new(SyntheticContainer::new(SyntheticSpec {
                codec: "hap1".into(),
                ..Default::default()
            })),
            HostContext::new(),
            PlayerOptions::default(),
        )
        .err()
        .unwrap();
        assert!(matches!(err, MovieError::UnsupportedCodec(c) if c == "hap1"));
    }

    #[test]
    fn empty_track_fails_open() {
        let err = Movie::from_container(
            Box::new(SyntheticContainer::new(SyntheticSpec {
                samples: 0,
                ..Default::default()
            })),
            HostContext::new(),
            PlayerOptions::default(),
        )
        .err()
        .unwrap();
        assert!(matches!(err, MovieError::EmptyTrack));
    }

    #[test]
    fn track_count_is_validated() {
        let err = open_fixed(vec![track(TrackKind::Audio, "aac")]).err().unwrap();
        assert!(matches!(err, MovieError::NoVideoTrack(_)));

        let err = open_fixed(vec![
            track(TrackKind::Video, "jpeg"),
            track(TrackKind::Video, "jpeg"),
        ])
        .err()
        .unwrap();
        assert!(matches!(err, MovieError::MultipleVideoTracks { count: 2, .. }));
    }

    #[test]
    fn video_track_is_found_among_others() {
        let m = Movie::from_container(
            Box::new(FixedTracks(vec![
                track(TrackKind::Audio, "aac"),
                track(TrackKind::Video, "rgba"),
            ])),
            HostContext::new(),
            PlayerOptions::default().with_prebuffer(false),
        )
        .unwrap();
        assert_eq!(m.num_tracks(), 2);
        assert_eq!(m.codec(), "rgba");
    }

    #[test]
    fn missing_frame_rate_is_derived_from_duration() {
        let mut video = track(TrackKind::Video, "rgba");
        video.framerate = 0.0;
        video.duration = 2.0;
        let m = open_fixed(vec![video]).unwrap();
        assert!((m.framerate() - 5.0).abs() < 1e-6);
        assert!((m.duration() - 2.0).abs() < 1e-9);

        let mut video = track(TrackKind::Video, "rgba");
        video.duration = f64::NAN;
        let m = open_fixed(vec![video]).unwrap();
        assert!((m.duration() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn track_without_timing_fails_open() {
        let err = Movie::from_container(
            Box::new(SyntheticContainer::new(SyntheticSpec {
                framerate: 0.0,
                ..Default::default()
            })),
            HostContext::new(),
            PlayerOptions::default(),
        )
        .err()
        .unwrap();
        assert!(matches!(err, MovieError::Container(_)));
    }

    /// Keep ticking until the read counter stops moving; returns its value.
    fn settled_reads(m: &mut Movie<HostContext>, reads: &AtomicUsize) -> Option<usize> {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut last = reads.load(Ordering::Relaxed);
        let mut quiet = 0;
        while Instant::now() < deadline {
            m.update();
            thread::sleep(Duration::from_millis(5));
            let now = reads.load(Ordering::Relaxed);
            if now == last {
                quiet += 1;
                if quiet >= 10 {
                    return Some(now);
                }
            } else {
                quiet = 0;
                last = now;
            }
        }
        None
    }

    #[test]
    fn looping_track_of_bad_samples_parks_the_reader() {
        let container = SyntheticContainer::new(SyntheticSpec {
            samples: 4,
            corrupt: (0..4).collect(),
            ..Default::default()
        });
        let reads = container.read_counter();
        let mut m = Movie::from_container(
            Box::new(container),
            HostContext::new(),
            PlayerOptions::default()
                .with_prebuffer(false)
                .with_looping(true),
        )
        .unwrap();
        // one read at open to validate the track
        assert_eq!(reads.load(Ordering::Relaxed), 1);

        m.play().unwrap();
        assert!(update_until(&mut m, |m| m.last_error().is_some()));
        assert!(matches!(*m.last_error().unwrap(), MovieError::Decode { .. }));
        assert_eq!(settled_reads(&mut m, &reads), Some(1 + 4));
        assert!(m.current_frame().is_none());
        assert!(m.is_playing());

        // a seek earns another full pass
        m.seek_to_sample(2).unwrap();
        assert_eq!(settled_reads(&mut m, &reads), Some(1 + 4 + 4));
    }

    #[test]
    fn reopen_needs_a_file() {
        let m = movie(10, PlayerOptions::default());
        assert!(matches!(
            m.reopen(HostContext::new()).err().unwrap(),
            MovieError::NotFileBacked
        ));
    }

    #[test]
    fn missing_file_fails_open() {
        let err = Movie::open(
            "/nonexistent/flipbook/movie.mov",
            HostContext::new(),
            PlayerOptions::default(),
        )
        .err()
        .unwrap();
        assert!(matches!(err, MovieError::Open { .. }));
    }
}
