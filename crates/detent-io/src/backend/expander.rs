use super::{BackendKind, InputBackend, Registries};
use crate::driver::{GpioDriver, PortExpander};
use crate::worker::Worker;
use crate::{Error, Result};
use detent_core::{CoderPins, PinId};
use parking_lot::Mutex;
use smallvec::{smallvec, SmallVec};
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Mapping of expander pins into the logical pin space:
/// `pin = base_pin + bank * 8 + bit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpanderLayout {
    pub base_pin: u16,
    pub banks: u8,
}

impl Default for ExpanderLayout {
    fn default() -> Self {
        Self {
            base_pin: 100,
            banks: 2,
        }
    }
}

impl ExpanderLayout {
    /// `(bank, bit)` of a logical pin, `None` when it is not on the expander.
    pub fn locate(&self, pin: PinId) -> Option<(u8, u8)> {
        let offset = pin.get().checked_sub(self.base_pin)?;
        let bank = offset / 8;
        (bank < self.banks as u16).then_some((bank as u8, (offset % 8) as u8))
    }

    pub fn pin(&self, bank: u8, bit: u8) -> PinId {
        PinId(self.base_pin + bank as u16 * 8 + (bit & 7) as u16)
    }
}

// =============================================================================
// Bank scanner
// =============================================================================

/// Reads banks and dispatches per-slot changes against a cache of the last
/// bank values. Scans of one backend instance are serialized by the cache lock.
struct BankScanner {
    expander: Arc<dyn PortExpander>,
    layout: ExpanderLayout,
    registries: Registries,
    cache: Mutex<SmallVec<[u8; 4]>>,
}

impl BankScanner {
    fn new(expander: Arc<dyn PortExpander>, layout: ExpanderLayout, registries: Registries) -> Self {
        Self {
            expander,
            layout,
            registries,
            cache: Mutex::new(smallvec![0; layout.banks as usize]),
        }
    }

    fn bit(&self, banks: &[u8], pin: PinId) -> Option<bool> {
        let (bank, bit) = self.layout.locate(pin)?;
        Some((banks[bank as usize] >> bit) & 1 == 1)
    }

    /// Re-read `bank` and deliver every slot whose bit(s) changed.
    fn scan_bank(&self, bank: u8) {
        let mut cache = self.cache.lock();
        self.scan_locked(&mut cache, bank);
    }

    fn scan_all(&self) {
        let mut cache = self.cache.lock();
        for bank in 0..self.layout.banks {
            self.scan_locked(&mut cache, bank);
        }
    }

    /// Load the cache from hardware without dispatching anything.
    fn refresh(&self) -> Result<()> {
        let mut cache = self.cache.lock();
        for bank in 0..self.layout.banks {
            cache[bank as usize] = self.expander.read_bank(bank)?;
        }
        Ok(())
    }

    fn scan_locked(&self, cache: &mut SmallVec<[u8; 4]>, bank: u8) {
        let value = match self.expander.read_bank(bank) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("Expander bank {} read failed: {}", bank, e);
                return;
            }
        };

        let previous = std::mem::replace(&mut cache[bank as usize], value);
        if previous == value {
            return;
        }
        let mut before: SmallVec<[u8; 4]> = cache.clone();
        before[bank as usize] = previous;
        let in_bank = |pin: PinId| self.layout.locate(pin).is_some_and(|(b, _)| b == bank);

        for (index, pin) in self.registries.switches.enabled_pins() {
            if !in_bank(pin) {
                continue;
            }
            let (Some(old), Some(new)) = (self.bit(&before, pin), self.bit(cache, pin)) else {
                continue;
            };
            if old != new {
                self.registries.switches.deliver_switch_transition(index, new);
            }
        }

        for (index, pins) in self.registries.coders.enabled_pins() {
            if !in_bank(pins.a) && !in_bank(pins.b) {
                continue;
            }
            let old = (self.bit(&before, pins.a), self.bit(&before, pins.b));
            let new = (self.bit(cache, pins.a), self.bit(cache, pins.b));
            if let (Some(a), Some(b)) = new {
                if old != new {
                    self.registries.coders.deliver_coder_transition(index, a, b);
                }
            }
        }
    }

    /// Rescan every bank, then align a newly attached switch with its pin.
    fn sync_switch(&self, index: usize, pin: PinId) -> Result<()> {
        if self.layout.locate(pin).is_none() {
            return Err(Error::Driver(format!(
                "pin {} is outside the expander range",
                pin.get()
            )));
        }
        self.scan_all();
        let level = self.bit(&self.cache.lock(), pin);
        if let Some(level) = level {
            self.registries.switches.deliver_switch_transition(index, level);
        }
        Ok(())
    }

    fn sync_coder(&self, index: usize, pins: CoderPins) -> Result<()> {
        for pin in [pins.a, pins.b] {
            if self.layout.locate(pin).is_none() {
                return Err(Error::Driver(format!(
                    "pin {} is outside the expander range",
                    pin.get()
                )));
            }
        }
        self.scan_all();
        let bits = {
            let cache = self.cache.lock();
            (self.bit(&cache, pins.a), self.bit(&cache, pins.b))
        };
        if let (Some(a), Some(b)) = bits {
            self.registries.coders.prime_coder(index, a, b);
        }
        Ok(())
    }

    fn sync_enabled(&self) -> Result<()> {
        self.refresh()
            .map_err(|e| Error::HardwareInit(format!("initial bank read: {e}")))?;
        for (index, pin) in self.registries.switches.enabled_pins() {
            if let Err(e) = self.sync_switch(index, pin) {
                tracing::warn!("Switch {}: {}", index, e);
            }
        }
        for (index, pins) in self.registries.coders.enabled_pins() {
            if let Err(e) = self.sync_coder(index, pins) {
                tracing::warn!("Coder {}: {}", index, e);
            }
        }
        Ok(())
    }
}

fn bring_up(expander: &dyn PortExpander) -> Result<()> {
    expander
        .init()
        .map_err(|e| Error::HardwareInit(format!("port expander: {e}")))
}

// =============================================================================
// Interrupt-driven variant
// =============================================================================

/// Port expander with one host interrupt line per bank.
pub struct ExpanderInterruptBackend {
    expander: Arc<dyn PortExpander>,
    gpio: Arc<dyn GpioDriver>,
    layout: ExpanderLayout,
    interrupt_pins: SmallVec<[PinId; 4]>,
    scanner: Option<Arc<BankScanner>>,
}

impl ExpanderInterruptBackend {
    /// `interrupt_pins[bank]` is the host GPIO wired to that bank's INT line.
    pub fn new(
        expander: Arc<dyn PortExpander>,
        gpio: Arc<dyn GpioDriver>,
        layout: ExpanderLayout,
        interrupt_pins: &[PinId],
    ) -> Result<Self> {
        if interrupt_pins.len() != layout.banks as usize {
            return Err(Error::Core(detent_core::Error::InvalidConfig(format!(
                "{} interrupt pins for {} banks",
                interrupt_pins.len(),
                layout.banks
            ))));
        }
        Ok(Self {
            expander,
            gpio,
            layout,
            interrupt_pins: interrupt_pins.iter().copied().collect(),
            scanner: None,
        })
    }

    fn release_lines(&self) {
        for pin in &self.interrupt_pins {
            if let Err(e) = self.gpio.unwatch(*pin) {
                tracing::warn!("Failed to release interrupt pin {}: {}", pin.get(), e);
            }
        }
    }

    fn hook_lines(&self, scanner: &Arc<BankScanner>) -> Result<()> {
        for (bank, &pin) in self.interrupt_pins.iter().enumerate() {
            let scanner = Arc::clone(scanner);
            let bank = bank as u8;
            self.gpio.configure_input(pin, false)?;
            self.gpio
                .watch_edges(pin, Box::new(move || scanner.scan_bank(bank)))?;
        }
        Ok(())
    }
}

impl InputBackend for ExpanderInterruptBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::ExpanderInterrupt
    }

    fn default_pressed_level(&self) -> bool {
        false
    }

    fn start(&mut self, registries: Registries) -> Result<()> {
        if self.scanner.is_some() {
            return Err(Error::AlreadyRunning);
        }
        bring_up(self.expander.as_ref())?;

        let scanner = Arc::new(BankScanner::new(
            Arc::clone(&self.expander),
            self.layout,
            registries,
        ));
        scanner.sync_enabled()?;
        if let Err(e) = self.hook_lines(&scanner) {
            self.release_lines();
            return Err(Error::HardwareInit(format!("interrupt lines: {e}")));
        }

        tracing::info!(
            "Expander interrupt backend started ({} banks at pin {})",
            self.layout.banks,
            self.layout.base_pin
        );
        self.scanner = Some(scanner);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if self.scanner.take().is_none() {
            return Ok(());
        }
        self.release_lines();
        tracing::info!("Expander interrupt backend stopped");
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.scanner.is_some()
    }

    fn attach_switch(&mut self, index: usize, pin: PinId) -> Result<()> {
        match &self.scanner {
            Some(scanner) => scanner.sync_switch(index, pin),
            None => Ok(()),
        }
    }

    fn attach_coder(&mut self, index: usize, pins: CoderPins) -> Result<()> {
        match &self.scanner {
            Some(scanner) => scanner.sync_coder(index, pins),
            None => Ok(()),
        }
    }
}

// =============================================================================
// Polled variant
// =============================================================================

/// Port expander scanned by a background thread at a fixed interval.
pub struct ExpanderPollBackend {
    expander: Arc<dyn PortExpander>,
    layout: ExpanderLayout,
    interval: Duration,
    scanner: Option<Arc<BankScanner>>,
    worker: Option<Worker>,
}

impl ExpanderPollBackend {
    pub fn new(expander: Arc<dyn PortExpander>, layout: ExpanderLayout) -> Self {
        Self {
            expander,
            layout,
            interval: DEFAULT_POLL_INTERVAL,
            scanner: None,
            worker: None,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    #[inline]
    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl InputBackend for ExpanderPollBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::ExpanderPoll
    }

    fn default_pressed_level(&self) -> bool {
        false
    }

    fn start(&mut self, registries: Registries) -> Result<()> {
        if self.worker.is_some() {
            return Err(Error::AlreadyRunning);
        }
        bring_up(self.expander.as_ref())?;

        let scanner = Arc::new(BankScanner::new(
            Arc::clone(&self.expander),
            self.layout,
            registries,
        ));
        scanner.sync_enabled()?;

        let interval = self.interval;
        let polled = Arc::clone(&scanner);
        let worker = Worker::spawn("detent-expander-poll", move |shutdown| {
            while !shutdown.wait(interval) {
                polled.scan_all();
            }
        })
        .map_err(|e| Error::HardwareInit(format!("poll thread: {e}")))?;

        tracing::info!(
            "Expander poll backend started ({} banks, every {:?})",
            self.layout.banks,
            interval
        );
        self.scanner = Some(scanner);
        self.worker = Some(worker);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        let Some(mut worker) = self.worker.take() else {
            return Ok(());
        };
        worker.stop();
        self.scanner = None;
        tracing::info!("Expander poll backend stopped");
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    fn attach_switch(&mut self, index: usize, pin: PinId) -> Result<()> {
        match &self.scanner {
            Some(scanner) => scanner.sync_switch(index, pin),
            None => Ok(()),
        }
    }

    fn attach_coder(&mut self, index: usize, pins: CoderPins) -> Result<()> {
        match &self.scanner {
            Some(scanner) => scanner.sync_coder(index, pins),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_locate() {
        let layout = ExpanderLayout::default();
        assert_eq!(layout.locate(PinId(100)), Some((0, 0)));
        assert_eq!(layout.locate(PinId(107)), Some((0, 7)));
        assert_eq!(layout.locate(PinId(108)), Some((1, 0)));
        assert_eq!(layout.locate(PinId(115)), Some((1, 7)));
        assert_eq!(layout.locate(PinId(116)), None);
        assert_eq!(layout.locate(PinId(99)), None);
        assert_eq!(layout.pin(1, 3), PinId(111));
    }
}
