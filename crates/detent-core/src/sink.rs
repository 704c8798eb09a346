//! Outbound event interface and a channel-based fan-out sink.
//!
//! The registries call the sink once per logical event. Delivering that event
//! to more than one consumer (routing engine, UI notifications) is the sink's
//! responsibility; [`ChannelSink`] does it with one bounded channel per
//! subscriber.

use crate::action::OscAddress;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use midi_msg::{Channel, ChannelVoiceMsg, ControlChange, MidiMsg};
use smallvec::SmallVec;

const DEFAULT_CAPACITY: usize = 256;

/// Receiver of control events produced by the switch and coder registries.
///
/// Called from interrupt handlers and background threads, never while a slot
/// lock is held, so implementations may call back into the registries.
pub trait EventSink: Send + Sync {
    fn control_change(&self, chan: u8, num: u8, val: u8);

    fn note_on(&self, chan: u8, num: u8, vel: u8);

    fn note_off(&self, chan: u8, num: u8);

    fn program_change(&self, chan: u8, num: u8);

    fn osc_send_bool(&self, address: &OscAddress, path: &str, value: bool);

    fn osc_send_int(&self, address: &OscAddress, path: &str, value: i32);
}

/// A single emitted event, as seen by [`ChannelSink`] subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlEvent {
    ControlChange { chan: u8, num: u8, val: u8 },
    NoteOn { chan: u8, num: u8, vel: u8 },
    NoteOff { chan: u8, num: u8 },
    ProgramChange { chan: u8, num: u8 },
    OscBool {
        address: OscAddress,
        path: String,
        value: bool,
    },
    OscInt {
        address: OscAddress,
        path: String,
        value: i32,
    },
}

impl ControlEvent {
    pub fn is_midi(&self) -> bool {
        !matches!(self, ControlEvent::OscBool { .. } | ControlEvent::OscInt { .. })
    }

    /// Raw MIDI 1.0 channel-voice bytes, `None` for OSC events.
    pub fn to_midi_bytes(&self) -> Option<Vec<u8>> {
        let (chan, msg) = match *self {
            ControlEvent::ControlChange { chan, num, val } => (
                chan,
                ChannelVoiceMsg::ControlChange {
                    control: ControlChange::CC {
                        control: num & 0x7F,
                        value: val & 0x7F,
                    },
                },
            ),
            ControlEvent::NoteOn { chan, num, vel } => (
                chan,
                ChannelVoiceMsg::NoteOn {
                    note: num & 0x7F,
                    velocity: vel & 0x7F,
                },
            ),
            ControlEvent::NoteOff { chan, num } => (
                chan,
                ChannelVoiceMsg::NoteOff {
                    note: num & 0x7F,
                    velocity: 0,
                },
            ),
            ControlEvent::ProgramChange { chan, num } => (
                chan,
                ChannelVoiceMsg::ProgramChange {
                    program: num & 0x7F,
                },
            ),
            ControlEvent::OscBool { .. } | ControlEvent::OscInt { .. } => return None,
        };
        let msg = MidiMsg::ChannelVoice {
            channel: Channel::from_u8(chan.min(15)),
            msg,
        };
        Some(msg.to_midi())
    }
}

/// Sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn control_change(&self, _chan: u8, _num: u8, _val: u8) {}
    fn note_on(&self, _chan: u8, _num: u8, _vel: u8) {}
    fn note_off(&self, _chan: u8, _num: u8) {}
    fn program_change(&self, _chan: u8, _num: u8) {}
    fn osc_send_bool(&self, _address: &OscAddress, _path: &str, _value: bool) {}
    fn osc_send_int(&self, _address: &OscAddress, _path: &str, _value: i32) {}
}

/// Fans every event out to all subscribers.
///
/// Sends never block: a full subscriber drops the event (logged at debug
/// level) so a stalled consumer cannot stall an interrupt handler.
#[derive(Debug, Default)]
pub struct ChannelSink {
    subscribers: SmallVec<[Sender<ControlEvent>; 2]>,
}

impl ChannelSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subscriber with the default queue depth.
    pub fn subscribe(&mut self) -> Receiver<ControlEvent> {
        self.subscribe_with_capacity(DEFAULT_CAPACITY)
    }

    pub fn subscribe_with_capacity(&mut self, capacity: usize) -> Receiver<ControlEvent> {
        let (tx, rx) = bounded(capacity);
        self.subscribers.push(tx);
        rx
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    fn publish(&self, event: ControlEvent) {
        for subscriber in &self.subscribers {
            match subscriber.try_send(event.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(dropped)) => {
                    tracing::debug!("Control event subscriber full, dropping {:?}", dropped);
                }
                Err(TrySendError::Disconnected(_)) => {}
            }
        }
    }
}

impl EventSink for ChannelSink {
    fn control_change(&self, chan: u8, num: u8, val: u8) {
        self.publish(ControlEvent::ControlChange { chan, num, val });
    }

    fn note_on(&self, chan: u8, num: u8, vel: u8) {
        self.publish(ControlEvent::NoteOn { chan, num, vel });
    }

    fn note_off(&self, chan: u8, num: u8) {
        self.publish(ControlEvent::NoteOff { chan, num });
    }

    fn program_change(&self, chan: u8, num: u8) {
        self.publish(ControlEvent::ProgramChange { chan, num });
    }

    fn osc_send_bool(&self, address: &OscAddress, path: &str, value: bool) {
        self.publish(ControlEvent::OscBool {
            address: address.clone(),
            path: path.to_string(),
            value,
        });
    }

    fn osc_send_int(&self, address: &OscAddress, path: &str, value: i32) {
        self.publish(ControlEvent::OscInt {
            address: address.clone(),
            path: path.to_string(),
            value,
        });
    }
}
