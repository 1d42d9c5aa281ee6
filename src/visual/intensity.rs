//! Visual Intensity Driver
//!
//! Sole writer of the background effect's "chaos" intensity. Ramps are
//! sampled once per animation frame through the scheduler and always end on
//! exactly the requested target. Every ramp or immediate set bumps a
//! generation counter; frame callbacks carrying an older generation do
//! nothing, so two ramps never fight over the parameter.
//!
//! The effect handle is loaded asynchronously by the page. Until it is
//! attached only the latest request is remembered.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use log::debug;

use super::easing::Easing;
use crate::error::PlayerError;
use crate::scheduler::{Scheduler, TimerId};
use crate::task::Task;

/// Handle to the generative background effect
pub trait EffectHandle {
    /// Push a new intensity value to the renderer
    fn set_intensity(&mut self, value: f64);

    /// Viewport changed
    fn resize(&mut self, _width: u32, _height: u32) {}

    /// Tear the effect down
    fn destroy(&mut self) {}
}

/// A request made while no effect handle was attached
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IntensityRequest {
    Set(f64),
    Ramp {
        target: f64,
        duration_ms: u64,
        easing: Easing,
    },
}

#[derive(Debug, Clone, Copy)]
struct ActiveRamp {
    from: f64,
    target: f64,
    started_at_ms: u64,
    duration_ms: u64,
    easing: Easing,
}

/// Drives the intensity parameter of the background effect
pub struct IntensityDriver {
    handle: Option<Box<dyn EffectHandle>>,
    value: f64,
    generation: u64,
    ramp: Option<ActiveRamp>,
    frame: Option<TimerId>,
    pending: Option<IntensityRequest>,
}

impl fmt::Debug for IntensityDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntensityDriver")
            .field("attached", &self.handle.is_some())
            .field("value", &self.value)
            .field("generation", &self.generation)
            .field("ramp", &self.ramp)
            .field("pending", &self.pending)
            .finish()
    }
}

impl Default for IntensityDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl IntensityDriver {
    /// Driver at intensity 0 with no effect attached
    pub fn new() -> Self {
        Self {
            handle: None,
            value: 0.0,
            generation: 0,
            ramp: None,
            frame: None,
            pending: None,
        }
    }

    // ========================================================================
    // Requests
    // ========================================================================

    /// Animate from the current value to `target` over `duration_ms`
    ///
    /// Supersedes any ramp in flight. Queued if no effect is attached.
    pub fn ramp_to(
        &mut self,
        target: f64,
        duration_ms: u64,
        easing: Easing,
        sched: &mut Scheduler<Task>,
    ) {
        if target.is_nan() {
            return;
        }
        if self.handle.is_none() {
            self.queue(IntensityRequest::Ramp {
                target,
                duration_ms,
                easing,
            });
            return;
        }
        self.start_ramp(target, duration_ms, easing, sched);
    }

    /// Jump straight to `value`, cancelling any ramp
    pub fn set_immediate(&mut self, value: f64, sched: &mut Scheduler<Task>) {
        if value.is_nan() {
            return;
        }
        if self.handle.is_none() {
            self.queue(IntensityRequest::Set(value));
            return;
        }
        self.supersede(sched);
        self.write(value);
    }

    /// Animation frame callback
    ///
    /// Returns true if a value was written.
    pub fn on_frame(&mut self, generation: u64, sched: &mut Scheduler<Task>) -> bool {
        if generation != self.generation {
            debug!(
                "[INTENSITY] Dropping frame of superseded ramp {} (current {})",
                generation, self.generation
            );
            return false;
        }
        let Some(ramp) = self.ramp else {
            return false;
        };
        self.frame = None;

        let elapsed = sched.now().saturating_sub(ramp.started_at_ms);
        if elapsed >= ramp.duration_ms {
            self.ramp = None;
            self.write(ramp.target);
            debug!("[INTENSITY] Ramp {} complete at {}", generation, ramp.target);
            return true;
        }

        let eased = ramp
            .easing
            .apply(elapsed as f64 / ramp.duration_ms as f64);
        self.write(ramp.from + (ramp.target - ramp.from) * eased);
        self.frame = Some(sched.request_frame(Task::RampFrame { generation }));
        true
    }

    // ========================================================================
    // Effect Handle Lifecycle
    // ========================================================================

    /// Attach the effect once it has loaded and apply the pending request
    pub fn attach(&mut self, handle: Box<dyn EffectHandle>, sched: &mut Scheduler<Task>) {
        if let Some(mut old) = self.handle.take() {
            old.destroy();
        }
        self.handle = Some(handle);
        debug!("[INTENSITY] Effect attached");

        match self.pending.take() {
            Some(IntensityRequest::Set(value)) => self.set_immediate(value, sched),
            Some(IntensityRequest::Ramp {
                target,
                duration_ms,
                easing,
            }) => self.start_ramp(target, duration_ms, easing, sched),
            None => {
                let value = self.value;
                self.write(value);
            }
        }
    }

    /// Destroy and drop the effect, cancelling any ramp
    pub fn detach(&mut self, sched: &mut Scheduler<Task>) {
        self.supersede(sched);
        if let Some(mut handle) = self.handle.take() {
            handle.destroy();
        }
    }

    /// Forward a viewport resize to the effect
    pub fn resize(&mut self, width: u32, height: u32) {
        if let Some(handle) = self.handle.as_mut() {
            handle.resize(width, height);
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Last value written
    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn is_ramping(&self) -> bool {
        self.ramp.is_some()
    }

    pub fn is_attached(&self) -> bool {
        self.handle.is_some()
    }

    pub fn pending(&self) -> Option<IntensityRequest> {
        self.pending
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn queue(&mut self, request: IntensityRequest) {
        debug!(
            "[INTENSITY] {}; keeping latest request {:?}",
            PlayerError::EffectUnavailable,
            request
        );
        self.pending = Some(request);
    }

    fn start_ramp(
        &mut self,
        target: f64,
        duration_ms: u64,
        easing: Easing,
        sched: &mut Scheduler<Task>,
    ) {
        self.supersede(sched);
        self.ramp = Some(ActiveRamp {
            from: self.value,
            target,
            started_at_ms: sched.now(),
            duration_ms,
            easing,
        });
        let generation = self.generation;
        self.frame = Some(sched.request_frame(Task::RampFrame { generation }));
        debug!(
            "[INTENSITY] Ramp {} from {} to {} over {}ms",
            generation, self.value, target, duration_ms
        );
    }

    fn supersede(&mut self, sched: &mut Scheduler<Task>) {
        if let Some(frame) = self.frame.take() {
            sched.cancel(frame);
        }
        self.ramp = None;
        self.generation += 1;
    }

    fn write(&mut self, value: f64) {
        self.value = value;
        if let Some(handle) = self.handle.as_mut() {
            handle.set_intensity(value);
        }
    }
}

// ============================================================================
// Recording Effect
// ============================================================================

/// What a [`RecordingEffect`] has observed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EffectLog {
    pub writes: Vec<f64>,
    pub resizes: Vec<(u32, u32)>,
    pub destroyed: bool,
}

/// Effect handle that records every call, shared with the code that created it
#[derive(Debug, Clone, Default)]
pub struct RecordingEffect {
    log: Rc<RefCell<EffectLog>>,
}

impl RecordingEffect {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far
    pub fn log(&self) -> EffectLog {
        self.log.borrow().clone()
    }

    pub fn last_write(&self) -> Option<f64> {
        self.log.borrow().writes.last().copied()
    }
}

impl EffectHandle for RecordingEffect {
    fn set_intensity(&mut self, value: f64) {
        self.log.borrow_mut().writes.push(value);
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.log.borrow_mut().resizes.push((width, height));
    }

    fn destroy(&mut self) {
        self.log.borrow_mut().destroyed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn attached() -> (IntensityDriver, RecordingEffect, Scheduler<Task>) {
        let mut sched = Scheduler::new(16);
        let effect = RecordingEffect::new();
        let mut driver = IntensityDriver::new();
        driver.attach(Box::new(effect.clone()), &mut sched);
        (driver, effect, sched)
    }

    /// Fire frames until `until`, returning how many frames ran
    fn run_frames(driver: &mut IntensityDriver, sched: &mut Scheduler<Task>, until: u64) -> usize {
        let mut frames = 0;
        while let Some((_, task)) = sched.pop_due(until) {
            if let Task::RampFrame { generation } = task {
                driver.on_frame(generation, sched);
                frames += 1;
            }
        }
        sched.advance_to(until);
        frames
    }

    // ------------------------------------------------------------------------
    // Ramp Tests
    // ------------------------------------------------------------------------

    #[test]
    fn test_ramp_ends_exactly_on_target() {
        let (mut driver, effect, mut sched) = attached();
        driver.ramp_to(2.0, 1500, Easing::EaseOutCubic, &mut sched);
        assert!(driver.is_ramping());

        run_frames(&mut driver, &mut sched, 5000);

        assert_eq!(driver.value(), 2.0);
        assert_eq!(effect.last_write(), Some(2.0));
        assert!(!driver.is_ramping());
        assert_eq!(sched.pending(), 0);
    }

    #[test]
    fn test_ramp_values_follow_easing() {
        let (mut driver, effect, mut sched) = attached();
        driver.ramp_to(2.0, 1600, Easing::EaseOutCubic, &mut sched);

        run_frames(&mut driver, &mut sched, 800);
        assert_relative_eq!(driver.value(), 2.0 * 0.875);

        let writes = effect.log().writes;
        // attach wrote the initial 0.0, then one write per frame
        assert_eq!(writes[0], 0.0);
        assert_eq!(writes.len(), 1 + 800 / 16);
        assert!(writes.windows(2).all(|w| w[1] >= w[0]));
    }

    #[test]
    fn test_no_frames_after_completion() {
        let (mut driver, _effect, mut sched) = attached();
        driver.ramp_to(2.0, 1500, Easing::EaseOutCubic, &mut sched);
        // Frames land every 16ms; the first one at or past 1500ms is 1504
        let frames = run_frames(&mut driver, &mut sched, 1504);
        assert_eq!(frames, 1504 / 16);
        assert_eq!(driver.value(), 2.0);

        assert_eq!(run_frames(&mut driver, &mut sched, 10_000), 0);
    }

    #[test]
    fn test_zero_duration_snaps_on_first_frame() {
        let (mut driver, _effect, mut sched) = attached();
        driver.ramp_to(1.5, 0, Easing::Linear, &mut sched);
        assert_eq!(run_frames(&mut driver, &mut sched, 100), 1);
        assert_eq!(driver.value(), 1.5);
    }

    #[test]
    fn test_new_ramp_supersedes_old() {
        let (mut driver, effect, mut sched) = attached();
        driver.ramp_to(2.0, 1500, Easing::EaseOutCubic, &mut sched);
        let old_generation = driver.generation();
        run_frames(&mut driver, &mut sched, 320);

        driver.ramp_to(0.5, 400, Easing::Linear, &mut sched);
        let writes_at_switch = effect.log().writes.len();

        // A stale frame from the old ramp writes nothing
        assert!(!driver.on_frame(old_generation, &mut sched));
        assert_eq!(effect.log().writes.len(), writes_at_switch);

        run_frames(&mut driver, &mut sched, 5000);
        assert_eq!(driver.value(), 0.5);
        let tail = &effect.log().writes[writes_at_switch..];
        assert!(tail.iter().all(|v| *v <= 2.0));
        assert_eq!(*tail.last().unwrap(), 0.5);
    }

    #[test]
    fn test_set_immediate_cancels_ramp() {
        let (mut driver, _effect, mut sched) = attached();
        driver.ramp_to(2.0, 1500, Easing::EaseOutCubic, &mut sched);
        driver.set_immediate(1.0, &mut sched);
        assert!(!driver.is_ramping());
        assert_eq!(sched.pending(), 0);
        assert_eq!(driver.value(), 1.0);
    }

    // ------------------------------------------------------------------------
    // Late Handle Tests
    // ------------------------------------------------------------------------

    #[test]
    fn test_requests_before_attach_keep_latest() {
        let mut sched = Scheduler::new(16);
        let mut driver = IntensityDriver::new();
        driver.set_immediate(5.0, &mut sched);
        driver.ramp_to(2.0, 1500, Easing::EaseOutCubic, &mut sched);
        driver.set_immediate(2.0, &mut sched);

        assert_eq!(driver.pending(), Some(IntensityRequest::Set(2.0)));
        assert_eq!(driver.value(), 0.0);
        assert_eq!(sched.pending(), 0);

        let effect = RecordingEffect::new();
        driver.attach(Box::new(effect.clone()), &mut sched);
        assert_eq!(effect.log().writes, vec![2.0]);
        assert!(driver.pending().is_none());
    }

    #[test]
    fn test_pending_ramp_starts_on_attach() {
        let mut sched = Scheduler::new(16);
        let mut driver = IntensityDriver::new();
        driver.ramp_to(2.0, 1500, Easing::EaseOutCubic, &mut sched);

        sched.advance_to(400);
        let effect = RecordingEffect::new();
        driver.attach(Box::new(effect.clone()), &mut sched);
        assert!(driver.is_ramping());

        run_frames(&mut driver, &mut sched, 3000);
        assert_eq!(effect.last_write(), Some(2.0));
    }

    #[test]
    fn test_detach_destroys_and_cancels() {
        let (mut driver, effect, mut sched) = attached();
        driver.ramp_to(2.0, 1500, Easing::EaseOutCubic, &mut sched);
        driver.resize(1280, 720);
        driver.detach(&mut sched);

        let log = effect.log();
        assert!(log.destroyed);
        assert_eq!(log.resizes, vec![(1280, 720)]);
        assert!(!driver.is_attached());
        assert_eq!(sched.pending(), 0);
    }
}
