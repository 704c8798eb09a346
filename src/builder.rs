//! Builder for configuring and constructing a `Surface`.

use crate::surface::{FeedbackSink, Surface};
use crate::Result;
use detent_core::{
    Clock, CoderRegistry, EventSink, MonotonicClock, NullSink, SharedAnalogInput, SurfaceConfig,
    SwitchRegistry,
};
use detent_io::InputBackend;
use std::sync::Arc;

/// Unset options fall back to [`SurfaceConfig::default`], a [`NullSink`] and
/// a [`MonotonicClock`]. When no pressed level is configured the backend's
/// wiring default is used (low for pull-up GPIO/expander, high for serial).
///
/// # Example
///
/// ```ignore
/// use detent::prelude::*;
///
/// let surface = Surface::builder()
///     .switches(36)
///     .coders(4)
///     .sink(Arc::new(sink))
///     .backend(ExpanderPollBackend::new(expander, ExpanderLayout::default()))
///     .build()?;
/// ```
#[derive(Default)]
pub struct SurfaceBuilder {
    config: SurfaceConfig,
    sink: Option<Arc<dyn EventSink>>,
    clock: Option<Arc<dyn Clock>>,
    analog: Option<SharedAnalogInput>,
    backend: Option<Box<dyn InputBackend>>,
}

impl SurfaceBuilder {
    /// Replace the whole configuration (e.g. one deserialized from a file).
    pub fn config(mut self, config: SurfaceConfig) -> Self {
        self.config = config;
        self
    }

    /// Default: 36
    pub fn switches(mut self, capacity: usize) -> Self {
        self.config.switch_capacity = capacity;
        self
    }

    /// Default: 4
    pub fn coders(mut self, capacity: usize) -> Self {
        self.config.coder_capacity = capacity;
        self
    }

    pub fn pressed_level(mut self, level: bool) -> Self {
        self.config.pressed_level = Some(level);
        self
    }

    pub fn analog_note_scale(mut self, scale: f32) -> Self {
        self.config.analog_note_scale = scale;
        self
    }

    pub fn sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Analog input sampled by `AnalogGateIn` switches.
    pub fn analog_input(mut self, input: SharedAnalogInput) -> Self {
        self.analog = Some(input);
        self
    }

    pub fn backend(self, backend: impl InputBackend + 'static) -> Self {
        self.boxed_backend(Box::new(backend))
    }

    pub fn boxed_backend(mut self, backend: Box<dyn InputBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn build(self) -> Result<Surface> {
        self.config.validate()?;

        let sink = self.sink.unwrap_or_else(|| Arc::new(NullSink));
        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(MonotonicClock::new()));
        let pressed_level = self
            .config
            .pressed_level
            .or_else(|| self.backend.as_ref().map(|b| b.default_pressed_level()))
            .unwrap_or(false);

        let coders = Arc::new(CoderRegistry::new(
            self.config.coder_capacity,
            Arc::clone(&sink),
            Arc::clone(&clock),
        ));

        let feedback = Arc::new(FeedbackSink::new(sink, Arc::clone(&coders)));
        let mut switches = SwitchRegistry::new(self.config.switch_capacity, feedback, clock)
            .with_pressed_level(pressed_level);
        if let Some(input) = self.analog {
            switches = switches.with_analog_input(input, self.config.analog_note_scale);
        }

        tracing::debug!(
            "Built surface: {} switches, {} coders, pressed level {}",
            self.config.switch_capacity,
            self.config.coder_capacity,
            if pressed_level { "high" } else { "low" }
        );

        Ok(Surface::from_parts(
            self.config,
            Arc::new(switches),
            coders,
            self.backend,
        ))
    }
}
