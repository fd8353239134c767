//! Cluster-wide operating mode.
//!
//! The mode is soft state: the bridge holds the authoritative value and each
//! terminal caches a copy it picked up at boot or from a later broadcast.
//! There is no version number, so a stale cache is indistinguishable from a
//! current one; propagation is last-write-wins with no delivery guarantee.

/// Operating mode governing which message kinds are valid on the air.
#[derive(Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "std", derive(Debug))]
pub enum Mode {
    Voting,
    Sensor,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Voting => "VOTING",
            Mode::Sensor => "SENSOR",
        }
    }

    /// Parses the wire name; anything else is not a mode.
    pub fn parse(field: &str) -> Option<Mode> {
        match field {
            "VOTING" => Some(Mode::Voting),
            "SENSOR" => Some(Mode::Sensor),
            _ => None,
        }
    }
}

/// The bridge's authoritative mode store.
///
/// Exactly one writer: the bridge task mutates it on a recognized host
/// command and nothing else touches it, so no locking is needed.
pub(crate) struct ModeController {
    mode: Mode,
}

impl ModeController {
    pub(crate) const fn new(initial: Mode) -> Self {
        ModeController { mode: initial }
    }

    pub(crate) fn current(&self) -> Mode {
        self.mode
    }

    pub(crate) fn set(&mut self, mode: Mode) {
        self.mode = mode;
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;

    #[test]
    fn wire_names_round_trip() {
        assert_eq!(Mode::parse(Mode::Voting.as_str()), Some(Mode::Voting));
        assert_eq!(Mode::parse(Mode::Sensor.as_str()), Some(Mode::Sensor));
    }

    #[test]
    fn unknown_names_are_rejected() {
        assert_eq!(Mode::parse("voting"), None);
        assert_eq!(Mode::parse("VOTING "), None);
        assert_eq!(Mode::parse(""), None);
    }

    #[test]
    fn controller_holds_last_written_value() {
        let mut controller = ModeController::new(Mode::Voting);
        assert_eq!(controller.current(), Mode::Voting);
        controller.set(Mode::Sensor);
        assert_eq!(controller.current(), Mode::Sensor);
        // setting the same value again is a plain overwrite
        controller.set(Mode::Sensor);
        assert_eq!(controller.current(), Mode::Sensor);
    }
}
