//! Backend integration tests against in-memory drivers.
//!
//! Run with:
//! ```bash
//! cargo test -p detent-io --test integration
//! ```

use crossbeam_channel::{unbounded, Receiver, Sender};
use detent_core::{
    ChannelSink, CoderPins, CoderRegistry, CoderTarget, ControlEvent, ManualClock, PinId,
    SwitchAction, SwitchRegistry,
};
use detent_io::{
    BackendKind, ByteSource, EdgeHandler, Error, ExpanderInterruptBackend, ExpanderLayout,
    ExpanderPollBackend, GpioBackend, GpioDriver, InputBackend, PortExpander, Registries, Result,
    ReadSource, SerialBackend, SerialLayout,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const WAIT: Duration = Duration::from_secs(2);

// =============================================================================
// Mock drivers
// =============================================================================

/// Pins read high (pull-up idle) until set otherwise.
#[derive(Default)]
struct MockGpio {
    levels: Mutex<HashMap<u16, bool>>,
    handlers: Mutex<HashMap<u16, Arc<dyn Fn() + Send + Sync>>>,
    configured: Mutex<Vec<(u16, bool)>>,
    fail_configure: AtomicBool,
}

impl MockGpio {
    fn set_level(&self, pin: u16, level: bool) {
        self.levels.lock().insert(pin, level);
        self.fire(pin);
    }

    fn fire(&self, pin: u16) {
        let handler = self.handlers.lock().get(&pin).cloned();
        if let Some(handler) = handler {
            handler();
        }
    }

    fn watched(&self) -> usize {
        self.handlers.lock().len()
    }
}

impl GpioDriver for MockGpio {
    fn configure_input(&self, pin: PinId, pull_up: bool) -> Result<()> {
        if self.fail_configure.load(Ordering::SeqCst) {
            return Err(Error::Driver(format!("pin {} busy", pin.get())));
        }
        self.configured.lock().push((pin.get(), pull_up));
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
        self.handlers.lock().remove(&pin.get());
        Ok(())
    }
}

struct MockExpander {
    banks: Mutex<[u8; 2]>,
    inits: AtomicUsize,
    fail_init: AtomicBool,
}

impl MockExpander {
    fn new() -> Self {
        Self {
            banks: Mutex::new([0xFF; 2]),
            inits: AtomicUsize::new(0),
            fail_init: AtomicBool::new(false),
        }
    }

    fn set_bank(&self, bank: usize, value: u8) {
        self.banks.lock()[bank] = value;
    }
}

impl PortExpander for MockExpander {
    fn init(&self) -> Result<()> {
        if self.fail_init.load(Ordering::SeqCst) {
            return Err(Error::Driver("no ACK at 0x20".into()));
        }
        self.inits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn read_bank(&self, bank: u8) -> Result<u8> {
        self.banks
            .lock()
            .get(bank as usize)
            .copied()
            .ok_or_else(|| Error::Driver(format!("no bank {bank}")))
    }
}

/// Byte source fed from a channel; flushes are counted, not applied.
struct ChannelSource {
    bytes: Receiver<u8>,
    flushes: Arc<AtomicUsize>,
}

impl ByteSource for ChannelSource {
    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        Ok(self.bytes.recv_timeout(Duration::from_millis(5)).ok())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn channel_source() -> (Box<dyn ByteSource>, Sender<u8>, Arc<AtomicUsize>) {
    let (tx, rx) = unbounded();
    let flushes = Arc::new(AtomicUsize::new(0));
    let source = ChannelSource {
        bytes: rx,
        flushes: Arc::clone(&flushes),
    };
    (Box::new(source), tx, flushes)
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn registries(pressed_level: bool) -> (Registries, Receiver<ControlEvent>) {
    init_tracing();
    let mut sink = ChannelSink::new();
    let rx = sink.subscribe();
    let sink = Arc::new(sink);
    let clock = Arc::new(ManualClock::new(0));
    let switches = SwitchRegistry::new(8, sink.clone(), clock.clone()).with_pressed_level(pressed_level);
    let coders = CoderRegistry::new(4, sink, clock);
    (Registries::new(Arc::new(switches), Arc::new(coders)), rx)
}

fn note_switch(registries: &Registries, index: usize, pin: u16) {
    registries.switches.register(index, PinId(pin)).unwrap();
    registries
        .switches
        .bind_action(index, SwitchAction::Note { chan: 1, num: 64, val: 100 })
        .unwrap();
}

// =============================================================================
// Direct GPIO
// =============================================================================

#[test]
fn test_gpio_switch_edges() {
    let gpio = Arc::new(MockGpio::default());
    let mut backend = GpioBackend::new(gpio.clone());
    let (regs, rx) = registries(backend.default_pressed_level());
    note_switch(&regs, 3, 5);

    backend.start(regs.clone()).unwrap();
    assert_eq!(backend.kind(), BackendKind::Gpio);
    assert_eq!(gpio.configured.lock().as_slice(), &[(5, true)]);
    assert!(rx.try_recv().is_err());

    gpio.set_level(5, false);
    gpio.set_level(5, true);

    let events: Vec<_> = rx.try_iter().collect();
    assert_eq!(
        events,
        vec![
            ControlEvent::NoteOn { chan: 1, num: 64, vel: 100 },
            ControlEvent::NoteOff { chan: 1, num: 64 },
        ]
    );
}

#[test]
fn test_gpio_coder_quadrature() {
    let gpio = Arc::new(MockGpio::default());
    let mut backend = GpioBackend::new(gpio.clone());
    let (regs, _rx) = registries(false);
    regs.coders
        .register(0, CoderPins::new(20, 21), CoderTarget::midi(0, 74), 10, 127, 1)
        .unwrap();

    backend.start(regs.clone()).unwrap();
    assert_eq!(gpio.watched(), 2);

    // Resting at 11, one full clockwise cycle.
    gpio.set_level(20, false);
    gpio.set_level(21, false);
    gpio.set_level(20, true);
    gpio.set_level(21, true);
    assert_eq!(regs.coders.get_value(0).unwrap(), 14);

    // And back.
    gpio.set_level(21, false);
    gpio.set_level(20, false);
    assert_eq!(regs.coders.get_value(0).unwrap(), 12);
}

#[test]
fn test_gpio_attach_and_stop() {
    let gpio = Arc::new(MockGpio::default());
    let mut backend = GpioBackend::new(gpio.clone());
    let (regs, rx) = registries(false);

    backend.start(regs.clone()).unwrap();
    assert!(matches!(backend.start(regs.clone()), Err(Error::AlreadyRunning)));
    assert_eq!(gpio.watched(), 0);

    note_switch(&regs, 0, 7);
    backend.attach_switch(0, PinId(7)).unwrap();
    gpio.set_level(7, false);
    assert_eq!(rx.try_iter().count(), 1);

    backend.stop().unwrap();
    assert!(!backend.is_running());
    assert_eq!(gpio.watched(), 0);
    gpio.set_level(7, true);
    assert!(rx.try_recv().is_err());

    backend.stop().unwrap();
}

#[test]
fn test_gpio_configure_failure_is_init_error() {
    let gpio = Arc::new(MockGpio::default());
    gpio.fail_configure.store(true, Ordering::SeqCst);
    let mut backend = GpioBackend::new(gpio.clone());
    let (regs, _rx) = registries(false);
    note_switch(&regs, 0, 4);

    assert!(matches!(backend.start(regs), Err(Error::HardwareInit(_))));
    assert!(!backend.is_running());
}

// =============================================================================
// Port expander
// =============================================================================

#[test]
fn test_expander_interrupt_dispatches_only_its_bank() {
    let expander = Arc::new(MockExpander::new());
    let gpio = Arc::new(MockGpio::default());
    let layout = ExpanderLayout::default();
    let mut backend =
        ExpanderInterruptBackend::new(expander.clone(), gpio.clone(), layout, &[PinId(2), PinId(3)])
            .unwrap();
    let (regs, rx) = registries(backend.default_pressed_level());
    regs.coders
        .register(0, CoderPins::new(100, 101), CoderTarget::midi(0, 20), 50, 127, 1)
        .unwrap();
    note_switch(&regs, 1, 108);

    backend.start(regs.clone()).unwrap();
    assert_eq!(expander.inits.load(Ordering::SeqCst), 1);
    assert_eq!(gpio.watched(), 2);

    // A = 0, B = 1 on bank 0: up from the resting 11.
    expander.set_bank(0, 0b1111_1110);
    gpio.fire(3);
    assert_eq!(regs.coders.get_value(0).unwrap(), 50);
    gpio.fire(2);
    assert_eq!(regs.coders.get_value(0).unwrap(), 51);

    expander.set_bank(1, 0b1111_1110);
    gpio.fire(3);
    assert!(!regs.switches.level(1).unwrap());

    let events: Vec<_> = rx.try_iter().collect();
    assert_eq!(
        events,
        vec![
            ControlEvent::ControlChange { chan: 0, num: 20, val: 51 },
            ControlEvent::NoteOn { chan: 1, num: 64, vel: 100 },
        ]
    );

    backend.stop().unwrap();
    assert_eq!(gpio.watched(), 0);
}

#[test]
fn test_expander_interrupt_requires_line_per_bank() {
    let expander = Arc::new(MockExpander::new());
    let gpio = Arc::new(MockGpio::default());
    let result = ExpanderInterruptBackend::new(expander, gpio, ExpanderLayout::default(), &[PinId(2)]);
    assert!(matches!(
        result,
        Err(Error::Core(detent_core::Error::InvalidConfig(_)))
    ));
}

#[test]
fn test_expander_init_failure() {
    let expander = Arc::new(MockExpander::new());
    expander.fail_init.store(true, Ordering::SeqCst);
    let mut backend = ExpanderPollBackend::new(expander, ExpanderLayout::default());
    let (regs, _rx) = registries(false);

    assert!(matches!(backend.start(regs), Err(Error::HardwareInit(_))));
    assert!(!backend.is_running());
}

#[test]
fn test_expander_poll_scans_in_background() {
    let expander = Arc::new(MockExpander::new());
    let mut backend = ExpanderPollBackend::new(expander.clone(), ExpanderLayout::default())
        .with_interval(Duration::from_millis(1));
    let (regs, rx) = registries(backend.default_pressed_level());
    regs.switches.register(0, PinId(109)).unwrap();
    regs.switches
        .bind_action(0, SwitchAction::ControlChange { chan: 2, num: 80, val: 127 })
        .unwrap();

    backend.start(regs.clone()).unwrap();
    assert!(backend.is_running());

    expander.set_bank(1, 0b1111_1101);
    assert_eq!(
        rx.recv_timeout(WAIT).unwrap(),
        ControlEvent::ControlChange { chan: 2, num: 80, val: 127 }
    );

    expander.set_bank(1, 0xFF);
    assert_eq!(
        rx.recv_timeout(WAIT).unwrap(),
        ControlEvent::ControlChange { chan: 2, num: 80, val: 0 }
    );

    backend.stop().unwrap();
    assert!(!backend.is_running());
    expander.set_bank(1, 0b1111_1101);
    assert!(rx.recv_timeout(Duration::from_millis(30)).is_err());
}

// =============================================================================
// Framed serial
// =============================================================================

fn send(tx: &Sender<u8>, bytes: &[u8]) {
    for &b in bytes {
        tx.send(b).unwrap();
    }
}

#[test]
fn test_serial_frames_drive_slots() {
    let (source, tx, flushes) = channel_source();
    let layout = SerialLayout::default();
    let mut backend = SerialBackend::new(source, layout);
    let stats = backend.stats();
    let (regs, rx) = registries(backend.default_pressed_level());
    regs.switches.register(0, layout.switch_pin(0)).unwrap();
    regs.switches
        .bind_action(0, SwitchAction::ProgramChange { chan: 0, num: 12 })
        .unwrap();
    regs.coders
        .register(0, layout.coder_pins(1), CoderTarget::midi(0, 7), 64, 127, 2)
        .unwrap();

    backend.start(regs.clone()).unwrap();
    assert_eq!(flushes.load(Ordering::SeqCst), 1);

    // Button of group 0 plus clockwise on group 1.
    send(&tx, &[0xEA, 0b0010_0001, 0x00, 0xFB]);
    assert_eq!(
        rx.recv_timeout(WAIT).unwrap(),
        ControlEvent::ControlChange { chan: 0, num: 7, val: 66 }
    );
    assert_eq!(
        rx.recv_timeout(WAIT).unwrap(),
        ControlEvent::ProgramChange { chan: 0, num: 12 }
    );

    // Corrupt payload, a window of noise, then a good counter-clockwise frame.
    send(&tx, &[0xEA, 0xFF, 0x00, 0xFB]);
    send(&tx, &[0x11, 0x22, 0x33, 0x44]);
    send(&tx, &[0xEA, 0b0001_0000, 0x00, 0xFB]);
    assert_eq!(
        rx.recv_timeout(WAIT).unwrap(),
        ControlEvent::ControlChange { chan: 0, num: 7, val: 64 }
    );

    assert_eq!(stats.frames(), 2);
    assert_eq!(stats.corrupt(), 1);
    assert!(stats.resyncs() >= 1);
    assert!(flushes.load(Ordering::SeqCst) >= 3);

    backend.stop().unwrap();
    assert!(!backend.is_running());
}

#[test]
fn test_serial_restart_after_stop() {
    let (source, tx, _) = channel_source();
    let mut backend = SerialBackend::new(source, SerialLayout::default());
    let (regs, rx) = registries(true);
    regs.switches.register(0, PinId(0)).unwrap();
    regs.switches
        .bind_action(0, SwitchAction::ControlChange { chan: 0, num: 1, val: 100 })
        .unwrap();

    backend.start(regs.clone()).unwrap();
    assert!(matches!(backend.start(regs.clone()), Err(Error::AlreadyRunning)));
    backend.stop().unwrap();

    backend.start(regs).unwrap();
    send(&tx, &[0xEA, 0x01, 0x00, 0xFB]);
    assert_eq!(
        rx.recv_timeout(WAIT).unwrap(),
        ControlEvent::ControlChange { chan: 0, num: 1, val: 100 }
    );
}

/// Reader at end of stream that counts how often it is polled.
struct Exhausted {
    reads: Arc<AtomicUsize>,
}

impl io::Read for Exhausted {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(0)
    }
}

#[test]
fn test_serial_backs_off_on_exhausted_source() {
    let reads = Arc::new(AtomicUsize::new(0));
    let source = ReadSource::new(Exhausted {
        reads: Arc::clone(&reads),
    });
    let mut backend = SerialBackend::new(Box::new(source), SerialLayout::default());
    let (regs, _rx) = registries(true);

    backend.start(regs).unwrap();
    std::thread::sleep(Duration::from_millis(50));

    let started = Instant::now();
    backend.stop().unwrap();
    assert!(started.elapsed() < Duration::from_millis(500));
    assert!(!backend.is_running());

    // One read per idle pause, not a busy loop.
    let polled = reads.load(Ordering::SeqCst);
    assert!(polled > 0);
    assert!(polled < 1_000, "{polled} reads in 50ms");
}
