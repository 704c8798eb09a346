use super::{payload_bit, BackendKind, InputBackend, Registries};
use crate::driver::ByteSource;
use crate::frame::{Extract, FrameRing};
use crate::worker::{Shutdown, Worker};
use crate::{Error, Result};
use detent_core::{CoderPins, Motion, PinId};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

const READ_ERROR_BACKOFF: Duration = Duration::from_millis(10);
/// Pause after a read that returned nothing (timeout or EOF).
const IDLE_BACKOFF: Duration = Duration::from_millis(1);

/// Bit layout of the serial payload. Encoder group `g` occupies three bits:
/// button at `3g`, counter-clockwise at `3g + 1`, clockwise at `3g + 2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerialLayout {
    pub payload_len: usize,
}

impl Default for SerialLayout {
    fn default() -> Self {
        Self { payload_len: 2 }
    }
}

impl SerialLayout {
    /// Number of complete encoder groups the payload carries.
    pub fn groups(&self) -> usize {
        self.payload_len * 8 / 3
    }

    pub fn switch_pin(&self, group: u16) -> PinId {
        PinId(group * 3)
    }

    /// Pin A reports counter-clockwise (down), pin B clockwise (up).
    pub fn coder_pins(&self, group: u16) -> CoderPins {
        CoderPins::new(group * 3 + 1, group * 3 + 2)
    }
}

/// Link counters, readable while the backend runs.
#[derive(Debug, Default)]
pub struct SerialStats {
    frames: AtomicU64,
    corrupt: AtomicU64,
    resyncs: AtomicU64,
}

impl SerialStats {
    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    pub fn corrupt(&self) -> u64 {
        self.corrupt.load(Ordering::Relaxed)
    }

    pub fn resyncs(&self) -> u64 {
        self.resyncs.load(Ordering::Relaxed)
    }
}

/// Framed serial link from an input microcontroller.
pub struct SerialBackend {
    source: Arc<Mutex<Box<dyn ByteSource>>>,
    layout: SerialLayout,
    stats: Arc<SerialStats>,
    worker: Option<Worker>,
}

impl SerialBackend {
    pub fn new(source: Box<dyn ByteSource>, layout: SerialLayout) -> Self {
        Self {
            source: Arc::new(Mutex::new(source)),
            layout,
            stats: Arc::new(SerialStats::default()),
            worker: None,
        }
    }

    #[inline]
    pub fn layout(&self) -> SerialLayout {
        self.layout
    }

    pub fn stats(&self) -> Arc<SerialStats> {
        Arc::clone(&self.stats)
    }
}

/// Deliver one payload to every enabled slot.
pub(crate) fn dispatch(registries: &Registries, payload: &[u8]) {
    for (index, pins) in registries.coders.enabled_pins() {
        let down = payload_bit(payload, pins.a.get());
        let up = payload_bit(payload, pins.b.get());
        if up {
            registries.coders.deliver_coder_motion(index, Motion::Up);
        } else if down {
            registries.coders.deliver_coder_motion(index, Motion::Down);
        }
    }

    for (index, pin) in registries.switches.enabled_pins() {
        registries
            .switches
            .deliver_switch_transition(index, payload_bit(payload, pin.get()));
    }
}

fn run_link(
    shutdown: Shutdown,
    source: Arc<Mutex<Box<dyn ByteSource>>>,
    registries: Registries,
    stats: Arc<SerialStats>,
    mut ring: FrameRing,
) {
    while !shutdown.requested() {
        let byte = source.lock().read_byte();
        let byte = match byte {
            Ok(Some(byte)) => byte,
            Ok(None) => {
                if shutdown.wait(IDLE_BACKOFF) {
                    break;
                }
                continue;
            }
            Err(e) => {
                tracing::warn!("Serial read failed: {}", e);
                if shutdown.wait(READ_ERROR_BACKOFF) {
                    break;
                }
                continue;
            }
        };

        ring.push(byte);
        let extract = ring.try_extract();
        match &extract {
            Extract::Payload(payload) => {
                stats.frames.fetch_add(1, Ordering::Relaxed);
                dispatch(&registries, payload);
            }
            Extract::Corrupt => {
                stats.corrupt.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("Corrupt serial frame discarded");
            }
            Extract::Desync => {
                stats.resyncs.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("Serial framing lost, resynchronizing");
            }
            Extract::Incomplete => {}
        }

        if extract.needs_source_flush() {
            if let Err(e) = source.lock().flush() {
                tracing::warn!("Serial flush failed: {}", e);
            }
        }
    }
}

impl InputBackend for SerialBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Serial
    }

    fn default_pressed_level(&self) -> bool {
        true
    }

    fn start(&mut self, registries: Registries) -> Result<()> {
        if self.worker.is_some() {
            return Err(Error::AlreadyRunning);
        }
        if self.layout.payload_len == 0 {
            return Err(Error::HardwareInit("serial payload length is 0".into()));
        }

        self.source
            .lock()
            .flush()
            .map_err(|e| Error::HardwareInit(format!("serial flush: {e}")))?;

        let source = Arc::clone(&self.source);
        let stats = Arc::clone(&self.stats);
        let ring = FrameRing::new(self.layout.payload_len);
        let worker = Worker::spawn("detent-serial", move |shutdown| {
            run_link(shutdown, source, registries, stats, ring)
        })
        .map_err(|e| Error::HardwareInit(format!("serial thread: {e}")))?;

        tracing::info!(
            "Serial backend started ({}-byte payload)",
            self.layout.payload_len
        );
        self.worker = Some(worker);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        let Some(mut worker) = self.worker.take() else {
            return Ok(());
        };
        worker.stop();
        tracing::info!("Serial backend stopped");
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    // The link reports every slot in every frame, so attaching needs no work.
    fn attach_switch(&mut self, _index: usize, _pin: PinId) -> Result<()> {
        Ok(())
    }

    fn attach_coder(&mut self, _index: usize, _pins: CoderPins) -> Result<()> {
        Ok(())
    }
}
