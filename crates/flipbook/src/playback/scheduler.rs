//! Background reader: decodes samples at the playhead and feeds the CPU buffer.
//!
//! State is split between the reader thread and the controller through
//! [`ReadShared`]. Lock order is `control` before the CPU buffer; the `source`
//! lock is never held while touching either.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};

use parking_lot::{Condvar, Mutex};

use super::buffer::{BoundedBuffer, PushError};
use super::progress::ProgressTracker;
use crate::error::{MovieError, Result};
use crate::media::{ContainerReader, Decoder, Frame};

/// The container and decoder pair, only ever used by one stepper at a time.
pub struct SampleSource {
    pub container: Box<dyn ContainerReader>,
    pub decoder: Box<dyn Decoder>,
    pub track: usize,
}

impl SampleSource {
    fn read(&mut self, index: usize) -> Result<Frame> {
        let sample = self.container.read_sample(self.track, index)?;
        self.decoder.decode(index, sample)
    }
}

/// Result of one decode step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// A frame was queued and the playhead advanced.
    Queued,
    /// The sample failed to read or decode and was stepped over.
    Skipped,
    /// Another stepper queued this sample first.
    Superseded,
    /// Non-blocking step found the CPU buffer full.
    Full,
    /// Not looping and the playhead is past the last sample.
    EndOfStream,
    /// A seek happened while decoding; the frame was discarded.
    Reset,
    /// The CPU buffer was closed for shutdown.
    Closed,
}

#[derive(Debug)]
struct Control {
    work_pending: bool,
    terminate: bool,
}

pub struct ReadShared {
    pub cpu: BoundedBuffer<Frame>,
    pub progress: ProgressTracker,
    source: Mutex<SampleSource>,
    looping: AtomicBool,
    control: Mutex<Control>,
    wake: Condvar,
    last_error: Mutex<Option<Arc<MovieError>>>,
    finished: AtomicBool,
    failures: AtomicUsize,
}

impl ReadShared {
    pub fn new(source: SampleSource, cpu_capacity: usize, num_samples: usize, looping: bool) -> Self {
        Self {
            cpu: BoundedBuffer::new(cpu_capacity),
            progress: ProgressTracker::new(num_samples),
            source: Mutex::new(source),
            looping: AtomicBool::new(looping),
            control: Mutex::new(Control {
                work_pending: true,
                terminate: false,
            }),
            wake: Condvar::new(),
            last_error: Mutex::new(None),
            finished: AtomicBool::new(false),
            failures: AtomicUsize::new(0),
        }
    }

    pub fn is_looping(&self) -> bool {
        self.looping.load(Ordering::Acquire)
    }

    pub fn set_looping(&self, looping: bool) {
        self.looping.store(looping, Ordering::Release);
    }

    /// Whether the reader stopped at end of stream.
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    pub fn last_error(&self) -> Option<Arc<MovieError>> {
        self.last_error.lock().clone()
    }

    pub fn clear_error(&self) {
        *self.last_error.lock() = None;
    }

    pub fn record_error(&self, err: MovieError) {
        *self.last_error.lock() = Some(Arc::new(err));
    }

    /// Move the playhead to `fraction`, dropping everything decoded so far.
    /// In-flight pushes from before the call fail with a reset.
    pub fn rewind_to(&self, fraction: f64) {
        let _control = self.control.lock();
        let dropped = self.cpu.reset_with(|| self.progress.set(fraction));
        self.finished.store(false, Ordering::Release);
        self.failures.store(0, Ordering::Relaxed);
        log::debug!("Playhead moved to {fraction:.4}, dropped {dropped} decoded frame(s)");
    }

    /// Wake a reader that is idling at end of stream. Returns whether it was.
    pub fn resume_if_finished(&self) -> bool {
        let mut control = self.control.lock();
        if !self.finished.swap(false, Ordering::AcqRel) {
            return false;
        }
        control.work_pending = true;
        self.wake.notify_one();
        true
    }

    /// Decode the sample at the playhead and queue it.
    ///
    /// With `blocking`, waits for room in the CPU buffer; otherwise returns
    /// [`StepOutcome::Full`] instead. The frame is queued and the playhead
    /// advanced in one step under the buffer lock, and only if no seek and no
    /// other stepper moved the playhead in the meantime.
    pub fn step(&self, blocking: bool) -> StepOutcome {
        if self.progress.is_at_end() {
            if !self.is_looping() {
                return StepOutcome::EndOfStream;
            }
            self.cpu.exclusive(|| {
                if self.progress.is_at_end() {
                    self.progress.set(0.0);
                }
            });
        }
        if !blocking && self.cpu.is_full() {
            return StepOutcome::Full;
        }

        let epoch = self.cpu.epoch();
        let index = self.progress.sample_index();
        let decoded = self.source.lock().read(index);

        let frame = match decoded {
            Ok(frame) => frame,
            Err(err) => {
                log::warn!("Skipping sample {index}: {err}");
                self.record_error(err);
                let skipped = self
                    .cpu
                    .exclusive(|| self.cpu.epoch() == epoch && self.commit_advance(index));
                return if skipped {
                    self.failures.fetch_add(1, Ordering::Relaxed);
                    StepOutcome::Skipped
                } else {
                    StepOutcome::Superseded
                };
            }
        };

        let commit = || self.commit_advance(index);
        let pushed = if blocking {
            self.cpu.push_if(epoch, frame, commit)
        } else {
            self.cpu.try_push_if(epoch, frame, commit)
        };
        match pushed {
            Ok(()) => {
                self.failures.store(0, Ordering::Relaxed);
                StepOutcome::Queued
            }
            Err(PushError::Rejected(_)) => StepOutcome::Superseded,
            Err(PushError::Reset(_)) => StepOutcome::Reset,
            Err(PushError::Full(_)) => StepOutcome::Full,
            Err(PushError::Closed(_)) => StepOutcome::Closed,
        }
    }

    /// Advance past `index` if the playhead still points at it.
    /// Called with the CPU buffer lock held.
    fn commit_advance(&self, index: usize) -> bool {
        if self.progress.position() != index {
            return false;
        }
        self.progress.advance(self.progress.step());
        if self.is_looping() && self.progress.is_at_end() {
            self.progress.set(0.0);
        }
        true
    }

    /// Block until there is work or termination was requested.
    /// Returns false on termination.
    fn wait_for_work(&self) -> bool {
        let mut control = self.control.lock();
        while !control.work_pending && !control.terminate {
            self.wake.wait(&mut control);
        }
        !control.terminate
    }

    /// Idle at end of stream unless a seek or loop toggle got in first.
    fn idle_at_end(&self) {
        let mut control = self.control.lock();
        if self.progress.is_at_end() && !self.is_looping() {
            self.finished.store(true, Ordering::Release);
            control.work_pending = false;
            log::debug!("Reader reached end of stream");
        }
    }

    fn idle_after_failures(&self, limit: usize) {
        let mut control = self.control.lock();
        if self.failures.load(Ordering::Relaxed) >= limit {
            control.work_pending = false;
            log::warn!("Every sample failed to decode, reader idling until the next seek");
        }
    }

    fn idle_if_full(&self) {
        let mut control = self.control.lock();
        if self.cpu.is_full() {
            control.work_pending = false;
        }
    }

    fn schedule(&self) {
        self.control.lock().work_pending = true;
        self.wake.notify_one();
    }

    fn request_terminate(&self) {
        self.control.lock().terminate = true;
        self.wake.notify_all();
    }

    fn reset_control(&self) {
        let mut control = self.control.lock();
        control.terminate = false;
        control.work_pending = true;
    }
}

/// Runs until terminated; at end of stream it idles instead of exiting, so a
/// later seek only needs to schedule more work.
fn reader_loop(shared: &ReadShared) {
    let num_samples = shared.progress.num_samples();
    while shared.wait_for_work() {
        match shared.step(true) {
            StepOutcome::Closed => return,
            StepOutcome::EndOfStream => shared.idle_at_end(),
            StepOutcome::Skipped => shared.idle_after_failures(num_samples),
            _ => shared.idle_if_full(),
        }
    }
}

/// Owns the reader thread. Dropping it stops and joins the thread.
pub struct ReadScheduler {
    shared: Arc<ReadShared>,
    handle: Option<JoinHandle<()>>,
}

impl ReadScheduler {
    pub fn new(shared: ReadShared) -> Self {
        Self {
            shared: Arc::new(shared),
            handle: None,
        }
    }

    pub fn shared(&self) -> &ReadShared {
        &self.shared
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Spawn the reader unless it is already alive. A reader that died is
    /// reaped first.
    pub fn start(&mut self) -> Result<()> {
        if self.is_running() {
            return Ok(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        self.shared.finished.store(false, Ordering::Release);
        self.shared.reset_control();

        let shared = self.shared.clone();
        let handle = thread::Builder::new()
            .name("flipbook-reader".into())
            .spawn(move || {
                log::debug!("Reader thread started");
                if let Err(e) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    reader_loop(&shared);
                })) {
                    let msg = if let Some(s) = e.downcast_ref::<&str>() {
                        (*s).to_string()
                    } else if let Some(s) = e.downcast_ref::<String>() {
                        s.clone()
                    } else {
                        "unknown panic".into()
                    };
                    log::error!("Reader thread panicked: {msg}");
                }
                log::debug!("Reader thread exited");
            })
            .map_err(MovieError::Spawn)?;
        self.handle = Some(handle);
        Ok(())
    }

    /// Ask the reader for more frames.
    pub fn schedule(&self) {
        self.shared.schedule();
    }

    /// Terminate the reader and wait for it. Blocked pushes and idle waits are
    /// woken immediately. Returns once the thread has exited.
    pub fn stop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        self.shared.request_terminate();
        self.shared.cpu.close();
        if handle.join().is_err() {
            log::error!("Reader thread could not be joined");
        }
        self.shared.cpu.reopen();
        self.shared.reset_control();
    }
}

impl Drop for ReadScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}
