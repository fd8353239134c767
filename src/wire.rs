//! Radio wire format: one ASCII line per frame, comma-separated fields,
//! first field is the message tag.
//!
//! | Tag | Fields | Direction |
//! |---|---|---|
//! | `VOTE` | device_id, choice | terminal to bridge |
//! | `SENS` | device_id, button | terminal to bridge |
//! | `ACK` | device_id | bridge to terminal |
//! | `MODE_REQUEST` | device_id | terminal to bridge |
//! | `MODE` | target (device_id or `ALL`), mode | bridge to terminal |
//!
//! Decoding fails silently: a line with an unknown tag, the wrong field
//! count for its tag, or an unparsable field yields no message, and the
//! caller treats the receive attempt as empty. The format has no escaping;
//! field values must never contain a comma. That constraint is a
//! precondition on encoding, checked in debug builds, and unreachable
//! through the typed constructors.

use crate::mode::Mode;
use crate::{DeviceId, RADIO_FRAME_SIZE};
use core::fmt::Write;

/// One line on the air: fixed-size buffer plus the used length.
///
/// The fields are public for zero-copy hand-off to radio hardware
/// interfaces, the same way raw packet buffers usually are.
#[derive(Clone)]
#[cfg_attr(feature = "std", derive(Debug))]
pub struct RadioFrame {
    pub data: [u8; RADIO_FRAME_SIZE],
    pub length: usize,
}

impl RadioFrame {
    pub const fn empty() -> Self {
        RadioFrame {
            data: [0; RADIO_FRAME_SIZE],
            length: 0,
        }
    }

    /// Wraps an already-formed line. `None` if it does not fit the buffer.
    pub fn from_line(line: &str) -> Option<Self> {
        let mut frame = RadioFrame::empty();
        frame.write_str(line).ok()?;
        Some(frame)
    }

    /// The carried line, or `None` for a frame that is not valid UTF-8
    /// (garbage off the air decodes to nothing, it never panics).
    pub fn as_str(&self) -> Option<&str> {
        core::str::from_utf8(&self.data[..self.length]).ok()
    }
}

impl core::fmt::Write for RadioFrame {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        let bytes = s.as_bytes();
        if self.length + bytes.len() > RADIO_FRAME_SIZE {
            return Err(core::fmt::Error);
        }
        self.data[self.length..self.length + bytes.len()].copy_from_slice(bytes);
        self.length += bytes.len();
        Ok(())
    }
}

/// A vote choice: one printable ASCII symbol (the terminals cycle through
/// `a` to `d`).
#[derive(Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "std", derive(Debug))]
pub struct Choice(u8);

impl Choice {
    /// The no-comma/printable precondition of the wire format, checked
    /// loudly in debug builds.
    pub fn new(symbol: u8) -> Self {
        debug_assert!(symbol.is_ascii_graphic() && symbol != b',', "choice symbol must be printable, non-comma ASCII");
        Choice(symbol)
    }

    pub(crate) fn parse(field: &str) -> Option<Self> {
        match field.as_bytes() {
            [symbol] if symbol.is_ascii_graphic() && *symbol != b',' => Some(Choice(*symbol)),
            _ => None,
        }
    }

    pub fn symbol(&self) -> u8 {
        self.0
    }
}

impl core::fmt::Display for Choice {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0 as char)
    }
}

/// One of the terminal's two input buttons; doubles as the sensor-event
/// payload on the wire.
#[derive(Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "std", derive(Debug))]
pub enum Button {
    A,
    B,
}

impl Button {
    pub fn as_str(&self) -> &'static str {
        match self {
            Button::A => "A",
            Button::B => "B",
        }
    }

    pub(crate) fn parse(field: &str) -> Option<Self> {
        match field {
            "A" => Some(Button::A),
            "B" => Some(Button::B),
            _ => None,
        }
    }
}

/// Addressee of a mode announcement.
#[derive(Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "std", derive(Debug))]
pub enum AnnounceTarget {
    /// Every terminal (`ALL` on the wire)
    All,
    /// A single terminal, answered to its mode request
    Device(DeviceId),
}

impl AnnounceTarget {
    pub fn matches(&self, device_id: DeviceId) -> bool {
        match self {
            AnnounceTarget::All => true,
            AnnounceTarget::Device(target) => *target == device_id,
        }
    }
}

/// A decoded radio message.
#[derive(Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "std", derive(Debug))]
pub enum RadioMessage {
    Vote { device_id: DeviceId, choice: Choice },
    SensorReading { device_id: DeviceId, button: Button },
    Ack { device_id: DeviceId },
    ModeRequest { device_id: DeviceId },
    ModeAnnounce { target: AnnounceTarget, mode: Mode },
}

impl RadioMessage {
    /// Renders the line for transmission. The fixed field order per tag is
    /// the strict inverse of `decode`.
    pub fn encode(&self) -> RadioFrame {
        let mut frame = RadioFrame::empty();
        let written = match self {
            RadioMessage::Vote { device_id, choice } => write!(frame, "VOTE,{},{}", device_id, choice),
            RadioMessage::SensorReading { device_id, button } => write!(frame, "SENS,{},{}", device_id, button.as_str()),
            RadioMessage::Ack { device_id } => write!(frame, "ACK,{}", device_id),
            RadioMessage::ModeRequest { device_id } => write!(frame, "MODE_REQUEST,{}", device_id),
            RadioMessage::ModeAnnounce { target, mode } => match target {
                AnnounceTarget::All => write!(frame, "MODE,ALL,{}", mode.as_str()),
                AnnounceTarget::Device(device_id) => write!(frame, "MODE,{},{}", device_id, mode.as_str()),
            },
        };
        debug_assert!(written.is_ok(), "encoded line exceeds the frame buffer");
        frame
    }

    /// Decodes one received line. Anything malformed is no message: an
    /// unknown tag, a missing or extra field, a non-hex identifier, an
    /// unknown mode name, a multi-byte choice symbol.
    pub fn decode(line: &str) -> Option<RadioMessage> {
        let mut fields = line.split(',');
        let tag = fields.next()?;
        let message = match tag {
            "VOTE" => RadioMessage::Vote {
                device_id: DeviceId::from_hex(fields.next()?)?,
                choice: Choice::parse(fields.next()?)?,
            },
            "SENS" => RadioMessage::SensorReading {
                device_id: DeviceId::from_hex(fields.next()?)?,
                button: Button::parse(fields.next()?)?,
            },
            "ACK" => RadioMessage::Ack {
                device_id: DeviceId::from_hex(fields.next()?)?,
            },
            "MODE_REQUEST" => RadioMessage::ModeRequest {
                device_id: DeviceId::from_hex(fields.next()?)?,
            },
            "MODE" => {
                let target_field = fields.next()?;
                let target = if target_field == "ALL" {
                    AnnounceTarget::All
                } else {
                    AnnounceTarget::Device(DeviceId::from_hex(target_field)?)
                };
                RadioMessage::ModeAnnounce {
                    target,
                    mode: Mode::parse(fields.next()?)?,
                }
            }
            _ => return None,
        };
        if fields.next().is_some() {
            return None; // trailing fields: wrong arity for the tag
        }
        Some(message)
    }
}
