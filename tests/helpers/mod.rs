//! Test helpers and fixtures for detent integration tests
//!
//! In-memory drivers that stand in for the GPIO controller and the serial
//! link, plus surface fixtures wired to a `ChannelSink`.

#![allow(dead_code)]

use crossbeam_channel::{unbounded, Receiver, Sender};
use detent::io::{EdgeHandler, Error, Result};
use detent::prelude::*;
use detent::{ByteSource, GpioDriver, ManualClock, SurfaceBuilder};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io;
use std::time::Duration;

/// Generous timeout for events produced on background threads.
pub const EVENT_WAIT: Duration = Duration::from_secs(2);

/// Clock start time; far enough from zero that no tick looks spurious.
pub const CLOCK_START_US: u64 = 1_000_000;

/// GPIO controller whose pins read high (pull-up idle) until driven.
#[derive(Default)]
pub struct MockGpio {
    levels: Mutex<HashMap<u16, bool>>,
    handlers: Mutex<HashMap<u16, Arc<dyn Fn() + Send + Sync>>>,
}

impl MockGpio {
    /// Drive `pin` and run its edge handler, as the interrupt would.
    pub fn set_level(&self, pin: u16, level: bool) {
        self.levels.lock().insert(pin, level);
        let handler = self.handlers.lock().get(&pin).cloned();
        if let Some(handler) = handler {
            handler();
        }
    }

    pub fn watched(&self) -> usize {
        self.handlers.lock().len()
    }
}

impl GpioDriver for MockGpio {
    fn configure_input(&self, _pin: PinId, _pull_up: bool) -> Result<()> {
        Ok(())
    }

    fn read(&self, pin: PinId) -> Result<bool> {
        Ok(self.levels.lock().get(&pin.get()).copied().unwrap_or(true))
    }

    fn watch_edges(&self, pin: PinId, handler: EdgeHandler) -> Result<()> {
        self.handlers.lock().insert(pin.get(), Arc::from(handler));
        Ok(())
    }

    fn unwatch(&self, pin: PinId) -> Result<()> {
        self.handlers
            .lock()
            .remove(&pin.get())
            .map(|_| ())
            .ok_or_else(|| Error::Driver(format!("pin {} not watched", pin.get())))
    }
}

/// Serial byte source fed from a channel.
pub struct ChannelSource {
    bytes: Receiver<u8>,
}

impl ByteSource for ChannelSource {
    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        Ok(self.bytes.recv_timeout(Duration::from_millis(5)).ok())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub fn channel_source() -> (Box<dyn ByteSource>, Sender<u8>) {
    let (tx, rx) = unbounded();
    (Box::new(ChannelSource { bytes: rx }), tx)
}

/// Route `tracing` output through the test harness. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Builder preloaded with a subscribed sink and a manual clock.
pub fn surface_builder() -> (SurfaceBuilder, Receiver<ControlEvent>, Arc<ManualClock>) {
    init_tracing();
    let mut sink = ChannelSink::new();
    let events = sink.subscribe();
    let clock = Arc::new(ManualClock::new(CLOCK_START_US));
    let builder = Surface::builder()
        .sink(Arc::new(sink))
        .clock(clock.clone());
    (builder, events, clock)
}

/// Surface on a mock GPIO controller (pressed = low).
pub fn gpio_surface() -> (Surface, Arc<MockGpio>, Receiver<ControlEvent>, Arc<ManualClock>) {
    let gpio = Arc::new(MockGpio::default());
    let (builder, events, clock) = surface_builder();
    let surface = builder
        .backend(GpioBackend::new(gpio.clone()))
        .build()
        .expect("Failed to build GPIO surface");
    (surface, gpio, events, clock)
}
