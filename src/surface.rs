//! Surface that ties the slot registries to one input backend.

use crate::builder::SurfaceBuilder;
use crate::{Error, Result};
use detent_core::{
    CoderPins, CoderRegistry, CoderTarget, EventSink, OscAddress, OscTarget, PinId, SlotHandle,
    SurfaceConfig, SwitchAction, SwitchRegistry,
};
use detent_io::{BackendKind, InputBackend, Registries};
use parking_lot::Mutex;
use std::sync::Arc;

/// A control surface: switch and coder slots fed by a runtime-selected
/// input backend.
///
/// # Example
///
/// ```ignore
/// use detent::prelude::*;
///
/// let surface = Surface::builder()
///     .switches(8)
///     .coders(4)
///     .sink(sink)
///     .backend(GpioBackend::new(gpio))
///     .build()?;
///
/// surface.register_coder(0, CoderPins::new(20, 21), CoderTarget::midi(0, 74), 64, 127, 0)?;
/// surface.register_switch(0, 5)?;
/// surface.bind_switch_action(0, SwitchAction::Note { chan: 0, num: 60, val: 100 })?;
///
/// surface.start()?;
/// ```
pub struct Surface {
    config: SurfaceConfig,
    switches: Arc<SwitchRegistry>,
    coders: Arc<CoderRegistry>,
    backend: Mutex<Option<Box<dyn InputBackend>>>,
}

impl Surface {
    pub fn builder() -> SurfaceBuilder {
        SurfaceBuilder::default()
    }

    pub(crate) fn from_parts(
        config: SurfaceConfig,
        switches: Arc<SwitchRegistry>,
        coders: Arc<CoderRegistry>,
        backend: Option<Box<dyn InputBackend>>,
    ) -> Self {
        Self {
            config,
            switches,
            coders,
            backend: Mutex::new(backend),
        }
    }

    pub fn config(&self) -> &SurfaceConfig {
        &self.config
    }

    /// Switch registry, for custom acquisition that delivers levels directly.
    pub fn switches(&self) -> &Arc<SwitchRegistry> {
        &self.switches
    }

    /// Coder registry, for custom acquisition that delivers transitions directly.
    pub fn coders(&self) -> &Arc<CoderRegistry> {
        &self.coders
    }

    // =========================================================================
    // Registration
    // =========================================================================

    pub fn register_switch(&self, index: usize, pin: impl Into<PinId>) -> Result<SlotHandle> {
        let pin = pin.into();
        let handle = self.switches.register(index, pin)?;
        if let Some(backend) = self.backend.lock().as_mut() {
            backend.attach_switch(index, pin)?;
        }
        Ok(handle)
    }

    pub fn bind_switch_action(&self, index: usize, action: SwitchAction) -> Result<()> {
        Ok(self.switches.bind_action(index, action)?)
    }

    /// Enable coder `index`. `step == 0` selects continuous, accelerated mode.
    pub fn register_coder(
        &self,
        index: usize,
        pins: CoderPins,
        target: CoderTarget,
        initial_value: u32,
        max_value: u32,
        step: u32,
    ) -> Result<SlotHandle> {
        let handle = self
            .coders
            .register(index, pins, target, initial_value, max_value, step)?;
        if let Some(backend) = self.backend.lock().as_mut() {
            backend.attach_coder(index, pins)?;
        }
        Ok(handle)
    }

    /// Coder bound to an OSC path given as `"port:path"` on localhost.
    /// Steps of 8 or more select boolean mode.
    pub fn register_osc_coder(
        &self,
        index: usize,
        pins: CoderPins,
        binding: &str,
        initial_value: u32,
        max_value: u32,
        step: u32,
    ) -> Result<SlotHandle> {
        let target = OscTarget::parse(binding, step >= 8)?;
        self.register_coder(
            index,
            pins,
            CoderTarget::Osc(target),
            initial_value,
            max_value,
            step,
        )
    }

    pub fn get_coder_value(&self, index: usize) -> Result<u32> {
        Ok(self.coders.get_value(index)?)
    }

    pub fn set_coder_value(&self, index: usize, value: u32, emit: bool) -> Result<()> {
        Ok(self.coders.set_value(index, value, emit)?)
    }

    /// See [`SwitchRegistry::get_duration`].
    pub fn get_switch_duration(&self, index: usize, long_press_threshold_us: u64) -> Result<u64> {
        Ok(self.switches.get_duration(index, long_press_threshold_us)?)
    }

    /// Sync coders bound to `Midi{chan, ctrl}` with a control change received
    /// from elsewhere (e.g. a host echoing parameter changes). Nothing is emitted.
    pub fn midi_feedback(&self, chan: u8, ctrl: u8, val: u8) -> usize {
        self.coders.apply_midi_cc(chan, ctrl, val)
    }

    // =========================================================================
    // Backend lifecycle
    // =========================================================================

    pub fn backend_kind(&self) -> Option<BackendKind> {
        self.backend.lock().as_ref().map(|b| b.kind())
    }

    pub fn is_running(&self) -> bool {
        self.backend.lock().as_ref().is_some_and(|b| b.is_running())
    }

    pub fn start(&self) -> Result<()> {
        let mut backend = self.backend.lock();
        let backend = backend.as_mut().ok_or(Error::NoBackend)?;
        backend.start(Registries::new(
            Arc::clone(&self.switches),
            Arc::clone(&self.coders),
        ))?;
        tracing::debug!("Surface started on {} backend", backend.kind());
        Ok(())
    }

    pub fn stop(&self) -> Result<()> {
        if let Some(backend) = self.backend.lock().as_mut() {
            backend.stop()?;
        }
        Ok(())
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            tracing::warn!("Failed to stop input backend: {}", e);
        }
    }
}

// =============================================================================
// Switch CC feedback
// =============================================================================

/// Sink wrapper for switch emissions: every control change is also applied
/// to coders bound to the same controller so their values stay in sync.
pub(crate) struct FeedbackSink {
    inner: Arc<dyn EventSink>,
    coders: Arc<CoderRegistry>,
}

impl FeedbackSink {
    pub(crate) fn new(inner: Arc<dyn EventSink>, coders: Arc<CoderRegistry>) -> Self {
        Self { inner, coders }
    }
}

impl EventSink for FeedbackSink {
    fn control_change(&self, chan: u8, num: u8, val: u8) {
        self.inner.control_change(chan, num, val);
        self.coders.apply_midi_cc(chan, num, val);
    }

    fn note_on(&self, chan: u8, num: u8, vel: u8) {
        self.inner.note_on(chan, num, vel);
    }

    fn note_off(&self, chan: u8, num: u8) {
        self.inner.note_off(chan, num);
    }

    fn program_change(&self, chan: u8, num: u8) {
        self.inner.program_change(chan, num);
    }

    fn osc_send_bool(&self, address: &OscAddress, path: &str, value: bool) {
        self.inner.osc_send_bool(address, path, value);
    }

    fn osc_send_int(&self, address: &OscAddress, path: &str, value: i32) {
        self.inner.osc_send_int(address, path, value);
    }
}
