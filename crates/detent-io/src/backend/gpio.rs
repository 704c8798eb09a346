use super::{BackendKind, InputBackend, Registries};
use crate::driver::GpioDriver;
use crate::{Error, Result};
use detent_core::{CoderPins, PinId};
use std::sync::{Arc, Weak};

/// Direct host GPIO, one edge handler per pin.
///
/// Handlers capture their slot index and a weak driver reference, so the
/// driver never keeps itself alive through its own handler table.
pub struct GpioBackend {
    gpio: Arc<dyn GpioDriver>,
    pull_up: bool,
    registries: Option<Registries>,
    watched: Vec<PinId>,
}

impl GpioBackend {
    pub fn new(gpio: Arc<dyn GpioDriver>) -> Self {
        Self {
            gpio,
            pull_up: true,
            registries: None,
            watched: Vec::new(),
        }
    }

    /// Wiring without pull-ups (switches pull the line high when pressed).
    pub fn without_pull_up(mut self) -> Self {
        self.pull_up = false;
        self
    }

    fn watch(&mut self, pin: PinId, handler: impl Fn() + Send + Sync + 'static) -> Result<()> {
        self.gpio.configure_input(pin, self.pull_up)?;
        self.gpio.watch_edges(pin, Box::new(handler))?;
        if !self.watched.contains(&pin) {
            self.watched.push(pin);
        }
        Ok(())
    }

    fn hook_switch(&mut self, registries: &Registries, index: usize, pin: PinId) -> Result<()> {
        let gpio = Arc::downgrade(&self.gpio);
        let switches = Arc::clone(&registries.switches);
        self.watch(pin, move || {
            let Some(gpio) = gpio.upgrade() else {
                return;
            };
            match gpio.read(pin) {
                Ok(level) => switches.deliver_switch_transition(index, level),
                Err(e) => tracing::warn!("Switch {} read failed on pin {}: {}", index, pin.get(), e),
            }
        })?;

        let level = self.gpio.read(pin)?;
        registries.switches.deliver_switch_transition(index, level);
        Ok(())
    }

    fn hook_coder(&mut self, registries: &Registries, index: usize, pins: CoderPins) -> Result<()> {
        let handler = coder_handler(Arc::downgrade(&self.gpio), registries, index, pins);
        self.watch(pins.a, handler.clone())?;
        self.watch(pins.b, handler)?;

        let a = self.gpio.read(pins.a)?;
        let b = self.gpio.read(pins.b)?;
        registries.coders.prime_coder(index, a, b);
        Ok(())
    }

    fn hook_all(&mut self, registries: &Registries) -> Result<()> {
        for (index, pin) in registries.switches.enabled_pins() {
            self.hook_switch(registries, index, pin).map_err(|e| {
                Error::HardwareInit(format!("switch {index} on pin {}: {e}", pin.get()))
            })?;
        }
        for (index, pins) in registries.coders.enabled_pins() {
            self.hook_coder(registries, index, pins)
                .map_err(|e| Error::HardwareInit(format!("coder {index}: {e}")))?;
        }
        Ok(())
    }

    fn unwatch_all(&mut self) {
        for pin in self.watched.drain(..) {
            if let Err(e) = self.gpio.unwatch(pin) {
                tracing::warn!("Failed to unwatch pin {}: {}", pin.get(), e);
            }
        }
    }
}

fn coder_handler(
    gpio: Weak<dyn GpioDriver>,
    registries: &Registries,
    index: usize,
    pins: CoderPins,
) -> impl Fn() + Clone + Send + Sync + 'static {
    let coders = Arc::clone(&registries.coders);
    move || {
        let Some(gpio) = gpio.upgrade() else {
            return;
        };
        match (gpio.read(pins.a), gpio.read(pins.b)) {
            (Ok(a), Ok(b)) => coders.deliver_coder_transition(index, a, b),
            (Err(e), _) | (_, Err(e)) => {
                tracing::warn!("Coder {} read failed: {}", index, e)
            }
        }
    }
}

impl InputBackend for GpioBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Gpio
    }

    fn default_pressed_level(&self) -> bool {
        !self.pull_up
    }

    fn start(&mut self, registries: Registries) -> Result<()> {
        if self.registries.is_some() {
            return Err(Error::AlreadyRunning);
        }

        if let Err(e) = self.hook_all(&registries) {
            self.unwatch_all();
            return Err(e);
        }

        tracing::info!("GPIO backend started ({} pins watched)", self.watched.len());
        self.registries = Some(registries);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if self.registries.take().is_none() {
            return Ok(());
        }
        self.unwatch_all();
        tracing::info!("GPIO backend stopped");
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.registries.is_some()
    }

    fn attach_switch(&mut self, index: usize, pin: PinId) -> Result<()> {
        match self.registries.clone() {
            Some(registries) => self.hook_switch(&registries, index, pin),
            None => Ok(()),
        }
    }

    fn attach_coder(&mut self, index: usize, pins: CoderPins) -> Result<()> {
        match self.registries.clone() {
            Some(registries) => self.hook_coder(&registries, index, pins),
            None => Ok(()),
        }
    }
}
