//! Host-facing serial line protocol.
//!
//! Newline framing belongs to the serial driver collaborator; this module
//! deals in whole lines. Bridge to host: `BRIDGE:READY` at startup,
//! `BRIDGE:MODE_CHANGED:<MODE>` after a mode change, and `VOTE:<raw>` /
//! `SENS:<raw>` relays carrying the original radio line. Host to bridge:
//! `MODE:VOTING` or `MODE:SENSOR`; anything else is ignored.

use crate::mode::Mode;
use crate::SERIAL_LINE_SIZE;
use core::fmt::Write;

/// One line on the host serial link.
#[derive(Clone)]
#[cfg_attr(feature = "std", derive(Debug))]
pub struct SerialLine {
    pub data: [u8; SERIAL_LINE_SIZE],
    pub length: usize,
}

impl SerialLine {
    pub const fn empty() -> Self {
        SerialLine {
            data: [0; SERIAL_LINE_SIZE],
            length: 0,
        }
    }

    /// Wraps an already-formed line. `None` if it does not fit the buffer.
    pub fn from_line(line: &str) -> Option<Self> {
        let mut serial_line = SerialLine::empty();
        serial_line.write_str(line).ok()?;
        Some(serial_line)
    }

    pub fn as_str(&self) -> Option<&str> {
        core::str::from_utf8(&self.data[..self.length]).ok()
    }
}

impl core::fmt::Write for SerialLine {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        let bytes = s.as_bytes();
        if self.length + bytes.len() > SERIAL_LINE_SIZE {
            return Err(core::fmt::Error);
        }
        self.data[self.length..self.length + bytes.len()].copy_from_slice(bytes);
        self.length += bytes.len();
        Ok(())
    }
}

/// A recognized command from the host.
#[derive(Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "std", derive(Debug))]
pub(crate) enum HostCommand {
    SetMode(Mode),
}

/// Parses one host line. Unrecognized lines are no command at all; the
/// bridge ignores them without comment. Surrounding whitespace (a trailing
/// `\r` from the host terminal, typically) is tolerated.
pub(crate) fn parse_host_command(line: &str) -> Option<HostCommand> {
    let line = line.trim();
    let mode_name = line.strip_prefix("MODE:")?;
    Mode::parse(mode_name).map(HostCommand::SetMode)
}

pub(crate) fn ready_line() -> SerialLine {
    let mut line = SerialLine::empty();
    let written = line.write_str("BRIDGE:READY");
    debug_assert!(written.is_ok());
    line
}

pub(crate) fn mode_changed_line(mode: Mode) -> SerialLine {
    let mut line = SerialLine::empty();
    let written = write!(line, "BRIDGE:MODE_CHANGED:{}", mode.as_str());
    debug_assert!(written.is_ok());
    line
}

/// Wraps a relayed radio line for the host, e.g. `VOTE:VOTE,<id>,<choice>`.
/// `None` if prefix plus raw line exceed the serial buffer.
pub(crate) fn relay_line(prefix: &str, raw: &str) -> Option<SerialLine> {
    let mut line = SerialLine::empty();
    line.write_str(prefix).ok()?;
    line.write_str(raw).ok()?;
    Some(line)
}
