//! Rotary encoder slot registry.
//!
//! Quadrature transitions are classified from a 4-bit window (previous and
//! current gray code). In continuous mode each accepted tick moves a
//! fixed-point accumulator by an amount that grows as the rotation speeds up;
//! the discretized value is `accumulator / TICKS_PER_RETENT`. In stepped mode
//! every tick moves the value by a fixed step.

use crate::action::{CoderTarget, PinId};
use crate::clock::Clock;
use crate::sink::EventSink;
use crate::slot::{SlotArena, SlotHandle, DEBOUNCE_US};
use crate::Result;
use std::sync::Arc;

/// Fixed-point subdivisions per detent.
pub const TICKS_PER_RETENT: u32 = 4;

const INTERVAL_DEPTH: usize = TICKS_PER_RETENT as usize;

/// Direction of one accepted quadrature tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Motion {
    Up,
    Down,
}

/// Pin pair of a rotary encoder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct CoderPins {
    pub a: PinId,
    pub b: PinId,
}

impl CoderPins {
    pub fn new(a: impl Into<PinId>, b: impl Into<PinId>) -> Self {
        Self {
            a: a.into(),
            b: b.into(),
        }
    }
}

/// Classify the transition from `previous` to `current` (both 2-bit gray codes,
/// A in bit 1, B in bit 0). Windows that skip a state or do not move are noise.
#[inline]
pub fn classify(previous: u8, current: u8) -> Option<Motion> {
    match ((previous & 0b11) << 2) | (current & 0b11) {
        0b1101 | 0b0100 | 0b0010 | 0b1011 => Some(Motion::Up),
        0b1110 | 0b0111 | 0b0001 | 0b1000 => Some(Motion::Down),
        _ => None,
    }
}

/// Accumulator increment for an average inter-tick interval, in `[1, 2N]`.
/// Shorter intervals give larger increments.
#[inline]
pub fn step_increment(average_dtus: u32) -> u32 {
    (10_000 * TICKS_PER_RETENT / average_dtus.max(1)).clamp(1, 2 * TICKS_PER_RETENT)
}

#[derive(Debug, Default)]
struct CoderSlot {
    enabled: bool,
    pins: CoderPins,
    gray: u8,
    accumulator: u32,
    value: u32,
    max_value: u32,
    step: u32,
    intervals: [u32; INTERVAL_DEPTH],
    last_tick_us: u64,
    target: Option<Arc<CoderTarget>>,
}

impl CoderSlot {
    #[inline]
    fn max_accumulator(&self) -> u32 {
        self.max_value.saturating_mul(TICKS_PER_RETENT)
    }

    /// Mean of `dtus` and the recorded intervals, then record `dtus`.
    fn push_interval(&mut self, dtus: u32) -> u32 {
        let sum = self
            .intervals
            .iter()
            .fold(dtus as u64, |acc, &d| acc + d as u64);
        let average = sum / (INTERVAL_DEPTH as u64 + 1);
        self.intervals.rotate_left(1);
        self.intervals[INTERVAL_DEPTH - 1] = dtus;
        average as u32
    }

    fn emission(&self) -> Option<(Arc<CoderTarget>, u32)> {
        self.target.clone().map(|target| (target, self.value))
    }
}

/// Fixed-capacity registry of rotary encoders.
pub struct CoderRegistry {
    slots: SlotArena<CoderSlot>,
    sink: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
}

impl CoderRegistry {
    pub fn new(capacity: usize, sink: Arc<dyn EventSink>, clock: Arc<dyn Clock>) -> Self {
        Self {
            slots: SlotArena::new(capacity),
            sink,
            clock,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.capacity()
    }

    /// Enable (or re-bind) slot `index`.
    ///
    /// `step == 0` selects continuous, accelerated mode. Decoder history and
    /// tick timing restart when the slot was disabled or its pins change; the
    /// first tick is timed from registration.
    pub fn register(
        &self,
        index: usize,
        pins: CoderPins,
        target: CoderTarget,
        initial_value: u32,
        max_value: u32,
        step: u32,
    ) -> Result<SlotHandle> {
        let mut slot = self.slots.checked(index)?.lock();

        slot.target = Some(Arc::new(target));
        slot.step = step;
        slot.max_value = max_value;
        slot.value = initial_value.min(max_value);
        slot.accumulator = if step == 0 {
            slot.value
                .saturating_mul(TICKS_PER_RETENT)
                .min(slot.max_accumulator())
        } else {
            0
        };

        if !slot.enabled || slot.pins != pins {
            slot.enabled = true;
            slot.pins = pins;
            slot.gray = 0;
            slot.intervals = [0; INTERVAL_DEPTH];
            slot.last_tick_us = self.clock.now_us();
        }

        tracing::debug!(
            "Registered coder {} on pins ({}, {}) max={} step={}",
            index,
            pins.a.get(),
            pins.b.get(),
            max_value,
            step
        );
        Ok(SlotHandle::new(index))
    }

    pub fn get_value(&self, index: usize) -> Result<u32> {
        Ok(self.slots.checked(index)?.lock().value)
    }

    pub fn max_value(&self, index: usize) -> Result<u32> {
        Ok(self.slots.checked(index)?.lock().max_value)
    }

    pub fn is_enabled(&self, index: usize) -> Result<bool> {
        Ok(self.slots.checked(index)?.lock().enabled)
    }

    /// Overwrite the value (clamped to the maximum), optionally emitting it.
    /// Disabled slots are left untouched.
    pub fn set_value(&self, index: usize, value: u32, emit: bool) -> Result<()> {
        let emission = {
            let mut slot = self.slots.checked(index)?.lock();
            if !slot.enabled {
                return Ok(());
            }
            if slot.step == 0 {
                slot.accumulator = value
                    .saturating_mul(TICKS_PER_RETENT)
                    .min(slot.max_accumulator());
                slot.value = slot.accumulator / TICKS_PER_RETENT;
            } else {
                slot.value = value.min(slot.max_value);
            }
            if emit {
                slot.emission()
            } else {
                None
            }
        };

        if let Some((target, value)) = emission {
            self.send(&target, value);
        }
        Ok(())
    }

    /// `(index, pins)` of every enabled slot.
    pub fn enabled_pins(&self) -> Vec<(usize, CoderPins)> {
        self.slots
            .iter()
            .filter_map(|(index, cell)| {
                let slot = cell.lock();
                slot.enabled.then_some((index, slot.pins))
            })
            .collect()
    }

    /// Hardware entry point for a new pin pair reading.
    pub fn deliver_coder_transition(&self, index: usize, bit_a: bool, bit_b: bool) {
        let Some(cell) = self.slots.get(index) else {
            return;
        };

        let emission = {
            let mut slot = cell.lock();
            if !slot.enabled {
                return;
            }
            let current = ((bit_a as u8) << 1) | bit_b as u8;
            let motion = classify(slot.gray, current);
            slot.gray = current;
            match motion {
                Some(motion) => self.apply_motion(index, &mut slot, motion),
                None => None,
            }
        };

        if let Some((target, value)) = emission {
            self.send(&target, value);
        }
    }

    /// Record the current pin pair as decoder history without classifying it.
    /// Used when a backend first attaches to an encoder resting mid-cycle.
    pub fn prime_coder(&self, index: usize, bit_a: bool, bit_b: bool) {
        if let Some(cell) = self.slots.get(index) {
            let mut slot = cell.lock();
            if slot.enabled {
                slot.gray = ((bit_a as u8) << 1) | bit_b as u8;
            }
        }
    }

    /// Hardware entry point for links that report direction directly.
    pub fn deliver_coder_motion(&self, index: usize, motion: Motion) {
        let Some(cell) = self.slots.get(index) else {
            return;
        };

        let emission = {
            let mut slot = cell.lock();
            if !slot.enabled {
                return;
            }
            self.apply_motion(index, &mut slot, motion)
        };

        if let Some((target, value)) = emission {
            self.send(&target, value);
        }
    }

    /// Sync every coder bound to `Midi{chan, ctrl}` with a control change seen
    /// elsewhere. Nothing is emitted. Returns the number of coders updated.
    pub fn apply_midi_cc(&self, chan: u8, ctrl: u8, val: u8) -> usize {
        let mut updated = 0;
        for (_, cell) in self.slots.iter() {
            let mut slot = cell.lock();
            let bound = slot
                .target
                .as_deref()
                .is_some_and(|t| t.is_midi_cc(chan, ctrl));
            if !slot.enabled || !bound {
                continue;
            }
            slot.value = (val as u32).min(slot.max_value);
            if slot.step == 0 {
                slot.accumulator = slot.value * TICKS_PER_RETENT;
            }
            updated += 1;
        }
        updated
    }

    fn apply_motion(
        &self,
        index: usize,
        slot: &mut CoderSlot,
        motion: Motion,
    ) -> Option<(Arc<CoderTarget>, u32)> {
        let value = if slot.step == 0 {
            let now = self.clock.now_us();
            let dtus = now.saturating_sub(slot.last_tick_us);
            if dtus < DEBOUNCE_US {
                tracing::trace!("Coder {} spurious tick ignored ({}us)", index, dtus);
                return None;
            }

            let average = slot.push_interval(dtus.min(u32::MAX as u64) as u32);
            let increment = step_increment(average);
            let value = match motion {
                Motion::Up => {
                    slot.accumulator = slot
                        .accumulator
                        .saturating_add(increment)
                        .min(slot.max_accumulator());
                    slot.accumulator / TICKS_PER_RETENT
                }
                Motion::Down => {
                    slot.accumulator = slot.accumulator.saturating_sub(increment);
                    slot.accumulator.div_ceil(TICKS_PER_RETENT)
                }
            };
            slot.last_tick_us = now;
            value
        } else {
            match motion {
                Motion::Up => slot.value.saturating_add(slot.step).min(slot.max_value),
                Motion::Down => slot.value.saturating_sub(slot.step),
            }
        };

        if value == slot.value {
            return None;
        }
        slot.value = value;
        slot.emission()
    }

    fn send(&self, target: &CoderTarget, value: u32) {
        match target {
            CoderTarget::Midi { chan, ctrl } => {
                self.sink.control_change(*chan, *ctrl, value.min(127) as u8)
            }
            CoderTarget::Osc(osc) if osc.boolean_mode => {
                self.sink.osc_send_bool(&osc.address, &osc.path, value >= 64)
            }
            CoderTarget::Osc(osc) => {
                self.sink
                    .osc_send_int(&osc.address, &osc.path, value.min(i32::MAX as u32) as i32)
            }
        }
    }
}
