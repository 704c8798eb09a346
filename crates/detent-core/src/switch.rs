//! Switch slot registry: level tracking, press/release emission and
//! press-duration measurement.

use crate::action::{PinId, SwitchAction};
use crate::clock::Clock;
use crate::config::DEFAULT_ANALOG_NOTE_SCALE;
use crate::sink::EventSink;
use crate::slot::{SlotArena, SlotHandle, DEBOUNCE_US};
use crate::Result;
use parking_lot::Mutex;
use std::sync::Arc;

/// Single-sample reader of an analog input subsystem.
pub trait AnalogInput: Send {
    fn read_sample(&mut self, channel_index: u8) -> i32;
}

/// Analog input guarded by the lock its owning subsystem also uses.
pub type SharedAnalogInput = Arc<Mutex<dyn AnalogInput>>;

#[derive(Debug, Default)]
struct SwitchSlot {
    enabled: bool,
    pin: PinId,
    level: bool,
    pressed_at: Option<u64>,
    last_duration: Option<u64>,
    action: SwitchAction,
    gate_note: Option<u8>,
}

/// Event computed under the slot lock and sent after it is released.
#[derive(Debug, Clone, Copy)]
enum Emission {
    ControlChange { chan: u8, num: u8, val: u8 },
    NoteOn { chan: u8, num: u8, vel: u8 },
    NoteOff { chan: u8, num: u8 },
    ProgramChange { chan: u8, num: u8 },
}

impl Emission {
    fn send(self, sink: &dyn EventSink) {
        match self {
            Emission::ControlChange { chan, num, val } => sink.control_change(chan, num, val),
            Emission::NoteOn { chan, num, vel } => sink.note_on(chan, num, vel),
            Emission::NoteOff { chan, num } => sink.note_off(chan, num),
            Emission::ProgramChange { chan, num } => sink.program_change(chan, num),
        }
    }
}

/// Fixed-capacity registry of push buttons.
///
/// Every accepted level change emits the bound action. The press duration is
/// measured separately and a sub-millisecond press is discarded as contact
/// bounce without suppressing the emission.
pub struct SwitchRegistry {
    slots: SlotArena<SwitchSlot>,
    sink: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
    pressed_level: bool,
    analog: Option<SharedAnalogInput>,
    analog_note_scale: f32,
}

impl SwitchRegistry {
    /// All slots start disabled. Pressed level defaults to low (pull-up wiring).
    pub fn new(capacity: usize, sink: Arc<dyn EventSink>, clock: Arc<dyn Clock>) -> Self {
        Self {
            slots: SlotArena::new(capacity),
            sink,
            clock,
            pressed_level: false,
            analog: None,
            analog_note_scale: DEFAULT_ANALOG_NOTE_SCALE,
        }
    }

    pub fn with_pressed_level(mut self, level: bool) -> Self {
        self.pressed_level = level;
        self
    }

    pub fn with_analog_input(mut self, input: SharedAnalogInput, note_scale: f32) -> Self {
        self.analog = Some(input);
        self.analog_note_scale = note_scale;
        self
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.capacity()
    }

    #[inline]
    pub fn pressed_level(&self) -> bool {
        self.pressed_level
    }

    /// Enable slot `index` on `pin`, starting released with no pending timing.
    pub fn register(&self, index: usize, pin: PinId) -> Result<SlotHandle> {
        let mut slot = self.slots.checked(index)?.lock();
        slot.enabled = true;
        slot.pin = pin;
        slot.level = !self.pressed_level;
        slot.pressed_at = None;
        slot.last_duration = None;
        tracing::debug!("Registered switch {} on pin {}", index, pin.get());
        Ok(SlotHandle::new(index))
    }

    pub fn bind_action(&self, index: usize, action: SwitchAction) -> Result<()> {
        let mut slot = self.slots.checked(index)?.lock();
        slot.action = action;
        slot.gate_note = None;
        Ok(())
    }

    pub fn action(&self, index: usize) -> Result<SwitchAction> {
        Ok(self.slots.checked(index)?.lock().action)
    }

    pub fn is_enabled(&self, index: usize) -> Result<bool> {
        Ok(self.slots.checked(index)?.lock().enabled)
    }

    /// Last delivered level.
    pub fn level(&self, index: usize) -> Result<bool> {
        Ok(self.slots.checked(index)?.lock().level)
    }

    /// `(index, pin)` of every enabled slot.
    pub fn enabled_pins(&self) -> Vec<(usize, PinId)> {
        self.slots
            .iter()
            .filter_map(|(index, cell)| {
                let slot = cell.lock();
                slot.enabled.then_some((index, slot.pin))
            })
            .collect()
    }

    /// Hardware entry point. Ignores out-of-range or disabled slots and
    /// repeated levels.
    pub fn deliver_switch_transition(&self, index: usize, level: bool) {
        let Some(cell) = self.slots.get(index) else {
            return;
        };

        let emission = {
            let mut slot = cell.lock();
            if !slot.enabled || slot.level == level {
                return;
            }
            slot.level = level;

            let now = self.clock.now_us();
            let pressed = level == self.pressed_level;
            if pressed {
                slot.pressed_at = Some(now);
            } else if let Some(start) = slot.pressed_at.take() {
                let delta = now.saturating_sub(start);
                if delta < DEBOUNCE_US {
                    tracing::trace!("Switch {} bounce ignored ({}us)", index, delta);
                } else {
                    slot.last_duration = Some(delta);
                }
            }

            self.emission_for(&mut slot, pressed)
        };

        if let Some(emission) = emission {
            emission.send(self.sink.as_ref());
        }
    }

    /// Completed press duration in microseconds, or the time held so far once
    /// it exceeds `long_press_threshold_us`. Both are consumed; 0 means
    /// nothing to report.
    pub fn get_duration(&self, index: usize, long_press_threshold_us: u64) -> Result<u64> {
        let mut slot = self.slots.checked(index)?.lock();
        if let Some(duration) = slot.last_duration.take() {
            return Ok(duration);
        }
        if let Some(start) = slot.pressed_at {
            let held = self.clock.now_us().saturating_sub(start);
            if held > long_press_threshold_us {
                slot.pressed_at = None;
                return Ok(held);
            }
        }
        Ok(0)
    }

    fn emission_for(&self, slot: &mut SwitchSlot, pressed: bool) -> Option<Emission> {
        match slot.action {
            SwitchAction::None => None,
            SwitchAction::ControlChange { chan, num, val } => Some(Emission::ControlChange {
                chan,
                num,
                val: if pressed { val } else { 0 },
            }),
            SwitchAction::Note { chan, num, val } => Some(if pressed {
                Emission::NoteOn {
                    chan,
                    num,
                    vel: val,
                }
            } else {
                Emission::NoteOff { chan, num }
            }),
            SwitchAction::ProgramChange { chan, num } => {
                pressed.then_some(Emission::ProgramChange { chan, num })
            }
            SwitchAction::AnalogGateIn {
                chan,
                channel_index,
                velocity,
            } => {
                if pressed {
                    let note = self.sample_note(channel_index)?;
                    slot.gate_note = Some(note);
                    Some(Emission::NoteOn {
                        chan,
                        num: note,
                        vel: velocity,
                    })
                } else {
                    slot.gate_note
                        .take()
                        .map(|num| Emission::NoteOff { chan, num })
                }
            }
        }
    }

    fn sample_note(&self, channel_index: u8) -> Option<u8> {
        let analog = self.analog.as_ref()?;
        let raw = analog.lock().read_sample(channel_index);
        Some(scale_to_note(raw, self.analog_note_scale))
    }
}

/// Linear map of a raw analog sample onto a MIDI note number.
pub fn scale_to_note(raw: i32, scale: f32) -> u8 {
    (raw as f32 * scale).clamp(0.0, 127.0) as u8
}
