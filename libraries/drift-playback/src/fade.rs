//! Fade-controlled playback
//!
//! [`FadingPlayer`] wraps any [`Player`] and ramps its gain through a
//! [`Transition`] instead of starting and stopping abruptly. The ramp is
//! advanced by a small driver thread ticking at the configured cadence;
//! the gain math itself lives in [`fade_gain`], a pure function that
//! tests exercise without any threads.
//!
//! The wrapped player's events resurface under the fading player's own
//! identity, so listeners never see two ids for one logical sound.

use crate::config::PlaybackConfig;
use crate::error::{PlaybackError, Result};
use crate::player::{EventForwarder, Player};
use crate::transition::Transition;
use crate::volume::Gain;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use drift_core::{ListenerSet, PlaybackState, PlayerEvent, PlayerId, PlayerListener};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// How long control calls wait to reach the fade driver
const COMMAND_TIMEOUT: Duration = Duration::from_millis(250);

/// Direction of a gain ramp
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FadeDirection {
    /// Silence toward the target volume
    In,
    /// Target volume toward silence
    Out,
}

/// Where a fading player sits in its fade lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FadePhase {
    /// No fade in flight (stopped or paused)
    Idle,
    /// Gain ramping up toward the target volume
    FadingIn,
    /// Ramp finished, holding the target volume
    Steady,
    /// Gain ramping down ahead of a stop
    FadingOut,
    /// Player closed, nothing will play again
    Closed,
}

/// Gain of a fade at `elapsed` seconds
///
/// A fade-in evaluates `target * f(progress)`, a fade-out
/// `target * f(1 - progress)`. Progress saturates at both ends, so
/// ticking past the nominal end holds the endpoint volume. A
/// non-positive `duration` degenerates to an immediate step: the target
/// for a fade-in, silence for a fade-out.
pub fn fade_gain(
    transition: &Transition,
    duration: f32,
    elapsed: f32,
    target: f32,
    direction: FadeDirection,
) -> f32 {
    if duration <= 0.0 {
        return match direction {
            FadeDirection::In => target,
            FadeDirection::Out => 0.0,
        };
    }
    let progress = (elapsed / duration).clamp(0.0, 1.0);
    match direction {
        FadeDirection::In => target * transition.apply(progress),
        FadeDirection::Out => target * transition.apply(1.0 - progress),
    }
}

/// One scheduled ramp, snapshotted at the moment it was requested
struct FadeJob {
    direction: FadeDirection,
    duration: f32,
    target: f32,
    transition: Transition,
    /// Gain epoch this ramp belongs to; stale ramps must not write
    epoch: u64,
}

enum DriverCommand {
    Fade(FadeJob),
    Cancel,
    Shutdown,
}

enum FadeOutcome {
    Completed,
    Superseded(FadeJob),
    Cancelled,
    Shutdown,
}

fn set_phase(phase: &Mutex<FadePhase>, next: FadePhase) {
    let mut guard = phase.lock().unwrap_or_else(PoisonError::into_inner);
    if *guard != FadePhase::Closed {
        *guard = next;
    }
}

/// Tick one fade to completion, or until something preempts it
///
/// Every write happens under the epoch lock. A control call that bumped
/// the epoch after this ramp was scheduled wins the race: the stale tick
/// writes nothing, even if it was already past its channel wait.
fn run_fade(
    inner: &Arc<dyn Player>,
    job: &FadeJob,
    tick: Duration,
    commands: &Receiver<DriverCommand>,
    epoch: &Mutex<u64>,
) -> FadeOutcome {
    let started = Instant::now();
    loop {
        let elapsed = started.elapsed().as_secs_f32();
        let gain = fade_gain(
            &job.transition,
            job.duration,
            elapsed,
            job.target,
            job.direction,
        );
        {
            let guard = epoch.lock().unwrap_or_else(PoisonError::into_inner);
            if *guard != job.epoch {
                return FadeOutcome::Cancelled;
            }
            inner.set_fade_gain(gain);
        }
        if elapsed >= job.duration {
            return FadeOutcome::Completed;
        }
        match commands.recv_timeout(tick) {
            Ok(DriverCommand::Fade(next)) => return FadeOutcome::Superseded(next),
            Ok(DriverCommand::Cancel) => return FadeOutcome::Cancelled,
            Ok(DriverCommand::Shutdown) | Err(RecvTimeoutError::Disconnected) => {
                return FadeOutcome::Shutdown
            }
            Err(RecvTimeoutError::Timeout) => {}
        }
    }
}

fn run_driver(
    inner: &Arc<dyn Player>,
    phase: &Mutex<FadePhase>,
    target: &Gain,
    commands: &Receiver<DriverCommand>,
    tick: Duration,
    epoch: &Mutex<u64>,
) {
    let mut pending: Option<FadeJob> = None;
    loop {
        let job = match pending.take() {
            Some(job) => job,
            None => match commands.recv() {
                Ok(DriverCommand::Fade(job)) => job,
                Ok(DriverCommand::Cancel) => continue,
                Ok(DriverCommand::Shutdown) | Err(_) => break,
            },
        };

        match run_fade(inner, &job, tick, commands, epoch) {
            FadeOutcome::Completed => match job.direction {
                FadeDirection::In => {
                    // The target may have moved while the ramp ran
                    let settled = {
                        let guard = epoch.lock().unwrap_or_else(PoisonError::into_inner);
                        if *guard == job.epoch {
                            inner.set_volume(target.get());
                            true
                        } else {
                            false
                        }
                    };
                    if settled {
                        set_phase(phase, FadePhase::Steady);
                    }
                }
                FadeDirection::Out => {
                    let current = {
                        let guard = epoch.lock().unwrap_or_else(PoisonError::into_inner);
                        *guard == job.epoch
                    };
                    // A control call that intervened owns the state now
                    if current {
                        set_phase(phase, FadePhase::Idle);
                        // Stopped reaches listeners through the forwarder
                        if let Err(err) = inner.stop() {
                            warn!("fade-out could not stop the player: {}", err);
                        }
                    }
                }
            },
            FadeOutcome::Superseded(next) => pending = Some(next),
            FadeOutcome::Cancelled => {}
            FadeOutcome::Shutdown => break,
        }
    }
    debug!("fade driver stopped");
}

/// A player whose starts and stops ramp through a [`Transition`]
pub struct FadingPlayer {
    id: PlayerId,
    inner: Arc<dyn Player>,
    transition: Mutex<Transition>,
    /// Clamped volume the fade lands on
    target: Arc<Gain>,
    fade_time: Mutex<f32>,
    phase: Arc<Mutex<FadePhase>>,
    /// Serializes gain writes; bumping it invalidates in-flight ramps
    gain_epoch: Arc<Mutex<u64>>,
    driver: Sender<DriverCommand>,
    driver_done: Receiver<()>,
    driver_handle: Mutex<Option<JoinHandle<()>>>,
    driver_thread: thread::ThreadId,
    shutdown_timeout: Duration,
    listeners: Arc<ListenerSet>,
}

impl FadingPlayer {
    /// Wrap `inner` with fade control using `transition` for both ramps
    pub fn new(
        inner: Arc<dyn Player>,
        transition: Transition,
        config: &PlaybackConfig,
    ) -> Arc<Self> {
        let id = PlayerId::generate();
        let listeners = Arc::new(ListenerSet::new());
        let phase = Arc::new(Mutex::new(FadePhase::Idle));
        let target = Arc::new(Gain::new(inner.volume()));
        let gain_epoch = Arc::new(Mutex::new(0_u64));

        let (command_tx, command_rx) = bounded(8);
        let (done_tx, done_rx) = bounded(1);
        let driver_inner = Arc::clone(&inner);
        let driver_phase = Arc::clone(&phase);
        let driver_target = Arc::clone(&target);
        let driver_epoch = Arc::clone(&gain_epoch);
        let tick = config.fade_tick();
        let handle = thread::spawn(move || {
            run_driver(
                &driver_inner,
                &driver_phase,
                &driver_target,
                &command_rx,
                tick,
                &driver_epoch,
            );
            let _ = done_tx.send(());
        });
        let driver_thread = handle.thread().id();

        // Inner events resurface under this player's identity
        inner.add_listener(Arc::new(EventForwarder::new(id, Arc::clone(&listeners))));

        // The inner player stopping, explicitly or at end of stream,
        // ends any fade in flight
        let reset_phase = Arc::clone(&phase);
        let reset_epoch = Arc::clone(&gain_epoch);
        let reset_commands = command_tx.clone();
        inner.add_listener(Arc::new(move |event: &PlayerEvent| {
            if matches!(
                event,
                PlayerEvent::Stopped { .. } | PlayerEvent::EndOfStream { .. }
            ) {
                *reset_epoch.lock().unwrap_or_else(PoisonError::into_inner) += 1;
                set_phase(&reset_phase, FadePhase::Idle);
                let _ = reset_commands.try_send(DriverCommand::Cancel);
            }
        }));

        Arc::new(Self {
            id,
            inner,
            transition: Mutex::new(transition),
            target,
            fade_time: Mutex::new(1.0),
            phase,
            gain_epoch,
            driver: command_tx,
            driver_done: done_rx,
            driver_handle: Mutex::new(Some(handle)),
            driver_thread,
            shutdown_timeout: config.shutdown_timeout(),
            listeners,
        })
    }

    /// Current fade lifecycle phase
    pub fn phase(&self) -> FadePhase {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the transition used by future fades
    pub fn set_transition(&self, transition: Transition) {
        *self
            .transition
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = transition;
    }

    /// The transition driving this player's fades
    pub fn transition(&self) -> Transition {
        self.transition
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Invalidate the running ramp; returns the epoch a new ramp must carry
    fn bump_epoch(&self) -> u64 {
        let mut epoch = self
            .gain_epoch
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *epoch += 1;
        *epoch
    }

    /// Invalidate the running ramp and apply `write` as the newest gain
    ///
    /// `write` must not dispatch events or the epoch lock could re-enter.
    fn snap_gain(&self, write: impl FnOnce()) {
        let mut epoch = self
            .gain_epoch
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *epoch += 1;
        write();
    }

    fn schedule(&self, job: FadeJob) -> Result<()> {
        self.driver
            .send_timeout(DriverCommand::Fade(job), COMMAND_TIMEOUT)
            .map_err(|_| PlaybackError::ChannelDisconnected("fade"))
    }
}

impl Player for FadingPlayer {
    fn play(&self) -> Result<()> {
        if self.phase() == FadePhase::Closed {
            return Err(PlaybackError::Closed);
        }
        match self.inner.state() {
            PlaybackState::Closed => Err(PlaybackError::Closed),
            // Replay of a live player is the orchestrator's job
            PlaybackState::Playing => Ok(()),
            PlaybackState::Paused => {
                self.inner.resume()?;
                self.snap_gain(|| self.inner.set_volume(self.target.get()));
                set_phase(&self.phase, FadePhase::Steady);
                Ok(())
            }
            PlaybackState::Stopped => {
                let duration = self.fade_time();
                let transition = self.transition();
                let target = self.target.get();

                // Seed the opening gain before any audio can emerge
                let seed = fade_gain(&transition, duration, 0.0, target, FadeDirection::In);
                self.snap_gain(|| self.inner.set_fade_gain(seed));
                self.inner.play()?;

                if duration <= 0.0 {
                    self.snap_gain(|| self.inner.set_volume(target));
                    set_phase(&self.phase, FadePhase::Steady);
                    return Ok(());
                }
                set_phase(&self.phase, FadePhase::FadingIn);
                let job = FadeJob {
                    direction: FadeDirection::In,
                    duration,
                    target,
                    transition,
                    epoch: self.bump_epoch(),
                };
                if let Err(err) = self.schedule(job) {
                    // Audio is already running; do not leave it near-silent
                    self.snap_gain(|| self.inner.set_volume(target));
                    set_phase(&self.phase, FadePhase::Steady);
                    return Err(err);
                }
                Ok(())
            }
        }
    }

    fn stop(&self) -> Result<()> {
        if self.phase() == FadePhase::Closed {
            return Err(PlaybackError::Closed);
        }
        self.bump_epoch();
        let _ = self.driver.try_send(DriverCommand::Cancel);
        self.inner.stop()?;
        set_phase(&self.phase, FadePhase::Idle);
        Ok(())
    }

    fn stop_with_fade(&self) -> Result<()> {
        if self.phase() == FadePhase::Closed {
            return Err(PlaybackError::Closed);
        }
        if self.inner.state() != PlaybackState::Playing {
            return self.stop();
        }
        let duration = self.fade_time();
        if duration <= 0.0 {
            return self.stop();
        }

        let job = FadeJob {
            direction: FadeDirection::Out,
            duration,
            target: self.target.get(),
            transition: self.transition(),
            epoch: self.bump_epoch(),
        };
        set_phase(&self.phase, FadePhase::FadingOut);
        if self.schedule(job).is_err() {
            warn!(player = %self.id, "fade driver unreachable, stopping hard");
            return self.stop();
        }
        Ok(())
    }

    fn pause(&self) -> Result<()> {
        self.bump_epoch();
        let _ = self.driver.try_send(DriverCommand::Cancel);
        self.inner.pause()?;
        // The abandoned ramp leaves gain mid-curve; resume snaps it back
        set_phase(&self.phase, FadePhase::Idle);
        Ok(())
    }

    fn resume(&self) -> Result<()> {
        self.inner.resume()?;
        self.snap_gain(|| self.inner.set_volume(self.target.get()));
        set_phase(&self.phase, FadePhase::Steady);
        Ok(())
    }

    fn close(&self) -> Result<()> {
        {
            let mut guard = self.phase.lock().unwrap_or_else(PoisonError::into_inner);
            if *guard == FadePhase::Closed {
                return Ok(());
            }
            *guard = FadePhase::Closed;
        }
        self.bump_epoch();
        let _ = self
            .driver
            .send_timeout(DriverCommand::Shutdown, COMMAND_TIMEOUT);
        if thread::current().id() == self.driver_thread {
            // Closing from inside a fade callback; the driver exits on
            // its own once the callback unwinds, so do not wait for it
            drop(
                self.driver_handle
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .take(),
            );
        } else {
            let finished = self.driver_done.recv_timeout(self.shutdown_timeout).is_ok();
            let handle = self
                .driver_handle
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            if let Some(handle) = handle {
                if finished {
                    let _ = handle.join();
                } else {
                    warn!(player = %self.id, "fade driver did not stop in time, detaching");
                }
            }
        }
        // Closed reaches listeners through the forwarder
        self.inner.close()?;
        self.listeners.clear();
        Ok(())
    }

    fn set_volume(&self, volume: f32) {
        self.target.set(volume);
        // Mid-fade the driver applies the moved target at completion
        if self.phase() == FadePhase::Steady {
            self.snap_gain(|| self.inner.set_volume(self.target.get()));
        }
    }

    fn volume(&self) -> f32 {
        self.target.get()
    }

    fn set_fade_gain(&self, gain: f32) {
        self.inner.set_fade_gain(gain);
    }

    fn set_fade_time(&self, seconds: f32) {
        let mut fade_time = self
            .fade_time
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *fade_time = seconds.max(0.0);
    }

    fn fade_time(&self) -> f32 {
        *self
            .fade_time
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn set_time(&self, seconds: f32) -> Result<()> {
        self.inner.set_time(seconds)
    }

    fn time(&self) -> f32 {
        self.inner.time()
    }

    fn duration(&self) -> f32 {
        self.inner.duration()
    }

    fn state(&self) -> PlaybackState {
        if self.phase() == FadePhase::Closed {
            return PlaybackState::Closed;
        }
        self.inner.state()
    }

    fn id(&self) -> PlayerId {
        self.id
    }

    fn add_listener(&self, listener: Arc<dyn PlayerListener>) {
        self.listeners.add(listener);
    }

    fn remove_listener(&self, listener: &Arc<dyn PlayerListener>) {
        self.listeners.remove(listener);
    }
}

impl Drop for FadingPlayer {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
