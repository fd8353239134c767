//! Terminal role: a single handheld device's state machine.
//!
//! Two states, no exit: `AcquiringMode` until the bridge answers a mode
//! request, then `Active` forever. In `Active` the terminal runs one body
//! per cycle: drain button input, idle until its own slot, transmit the
//! queued report (votes wait for an ACK, sensor events do not), take one
//! opportunistic receive for mode broadcasts, idle until the cycle
//! boundary. Vote delivery is at-most-once: a lost ACK surfaces as a local
//! failure indication and the vote is never retried.

use embassy_time::Timer;
use log::{log, Level};

use crate::mode::Mode;
use crate::slot_clock::{begin_cycle, wait_until, Timestamp};
use crate::wire::{AnnounceTarget, Button, Choice, RadioFrame, RadioMessage};
use crate::{ButtonEventQueueReceiver, IndicationQueueSender, RxFrameQueueReceiver, TxFrameQueueSender};
use crate::{DeviceId, ProtocolConfiguration, MAX_NODE_COUNT, SLOT_COUNT};

/// The options a voting terminal cycles through with button A.
pub(crate) const VOTE_OPTIONS: [u8; 4] = [b'a', b'b', b'c', b'd'];

/// Sampling cadence while waiting for a mode announcement at boot.
const MODE_POLL_INTERVAL_MS: u64 = 10;

/// Sampling cadence while waiting for the ACK of a transmitted vote.
const ACK_POLL_INTERVAL_MS: u64 = 1;

/// Event for the display collaborator. Rendering is entirely its business;
/// the protocol only reports what happened.
#[derive(Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "std", derive(Debug))]
pub enum Indication {
    /// Boot-time mode acquisition attempt started
    AcquiringMode,
    /// The bridge answered; the terminal is active in this mode
    ModeAcquired(Mode),
    /// No answer within the window; will retry after the pause
    ModeAcquireTimeout,
    /// Button A moved the selection to this option
    OptionSelected(Choice),
    /// A transmitted vote was acknowledged
    VoteAccepted,
    /// No ACK arrived within the timeout; the vote is gone
    VoteLost,
    /// A sensor event went out (fire-and-forget)
    SensorEventSent(Button),
    /// A mode broadcast was applied; selection state was reset
    ModeChanged(Mode),
}

/// What the terminal has queued for its next slot. At most one report is
/// pending at a time; a newer one replaces it.
#[derive(Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "std", derive(Debug))]
enum PendingReport {
    Vote(Choice),
    Sensor(Button),
}

impl PendingReport {
    fn to_message(self, device_id: DeviceId) -> RadioMessage {
        match self {
            PendingReport::Vote(choice) => RadioMessage::Vote { device_id, choice },
            PendingReport::Sensor(button) => RadioMessage::SensorReading { device_id, button },
        }
    }
}

/// Local state of an active terminal: the cached mode, the selection
/// cursor, and the report queued for the next slot. The mode cache and the
/// selection are coupled; `apply_announce` resets the selection atomically
/// with the mode switch.
struct TerminalState {
    device_id: DeviceId,
    mode: Mode,
    selected_option: usize,
    pending: Option<PendingReport>,
}

impl TerminalState {
    fn new(device_id: DeviceId, mode: Mode) -> Self {
        TerminalState {
            device_id,
            mode,
            selected_option: 0,
            pending: None,
        }
    }

    fn selected_choice(&self) -> Choice {
        Choice::new(VOTE_OPTIONS[self.selected_option])
    }

    /// One button edge from the input collaborator.
    fn handle_button(&mut self, button: Button) -> Option<Indication> {
        match self.mode {
            Mode::Voting => match button {
                Button::A => {
                    self.selected_option = (self.selected_option + 1) % VOTE_OPTIONS.len();
                    Some(Indication::OptionSelected(self.selected_choice()))
                }
                Button::B => {
                    self.pending = Some(PendingReport::Vote(self.selected_choice()));
                    None
                }
            },
            Mode::Sensor => {
                self.pending = Some(PendingReport::Sensor(button));
                None
            }
        }
    }

    /// Applies a mode announcement if it is addressed to this terminal.
    /// The announcement is applied even when it carries the current mode:
    /// the selection reset and the transition indication still happen.
    fn apply_announce(&mut self, target: AnnounceTarget, mode: Mode) -> Option<Indication> {
        if !target.matches(self.device_id) {
            return None;
        }
        self.mode = mode;
        self.selected_option = 0;
        self.pending = None;
        Some(Indication::ModeChanged(mode))
    }
}

fn send_frame(tx_frame_queue_sender: &TxFrameQueueSender, frame: RadioFrame) {
    if tx_frame_queue_sender.try_send(frame).is_err() {
        log!(Level::Warn, "TX frame queue full, dropping outgoing frame");
    }
}

fn indicate(indication_queue_sender: &IndicationQueueSender, indication: Indication) {
    if indication_queue_sender.try_send(indication).is_err() {
        log!(Level::Warn, "Indication queue full, display collaborator is behind");
    }
}

fn announce_in(frame: &RadioFrame) -> Option<(AnnounceTarget, Mode)> {
    match RadioMessage::decode(frame.as_str()?) {
        Some(RadioMessage::ModeAnnounce { target, mode }) => Some((target, mode)),
        _ => None,
    }
}

/// Polls the radio for a mode announcement addressed to this terminal.
/// Frames that are not a matching announcement are consumed and discarded.
async fn poll_for_announce(rx_frame_queue_receiver: &RxFrameQueueReceiver, device_id: DeviceId, timeout_ms: u32) -> Option<Mode> {
    let window_start = Timestamp::now();
    loop {
        while let Ok(frame) = rx_frame_queue_receiver.try_receive() {
            if let Some((target, mode)) = announce_in(&frame) {
                if target.matches(device_id) {
                    return Some(mode);
                }
            }
        }
        if window_start.elapsed_ms() >= timeout_ms {
            return None;
        }
        Timer::after_millis(MODE_POLL_INTERVAL_MS).await;
    }
}

/// Waits for the ACK closing this terminal's outstanding vote. An ACK
/// carrying a different identifier never closes the wait; any other frame
/// arriving in the window is consumed and discarded.
async fn await_ack(rx_frame_queue_receiver: &RxFrameQueueReceiver, device_id: DeviceId, timeout_ms: u32) -> bool {
    let window_start = Timestamp::now();
    loop {
        while let Ok(frame) = rx_frame_queue_receiver.try_receive() {
            if let Some(line) = frame.as_str() {
                if let Some(RadioMessage::Ack { device_id: acked }) = RadioMessage::decode(line) {
                    if acked == device_id {
                        return true;
                    }
                }
            }
        }
        if window_start.elapsed_ms() >= timeout_ms {
            return false;
        }
        Timer::after_millis(ACK_POLL_INTERVAL_MS).await;
    }
}

/// Boot-time mode acquisition. Retries forever with fixed pacing; there is
/// no retry cap and no fatal path.
async fn acquire_mode(
    config: &ProtocolConfiguration,
    device_id: DeviceId,
    tx_frame_queue_sender: &TxFrameQueueSender,
    rx_frame_queue_receiver: &RxFrameQueueReceiver,
    indication_queue_sender: &IndicationQueueSender,
) -> Mode {
    loop {
        indicate(indication_queue_sender, Indication::AcquiringMode);
        send_frame(tx_frame_queue_sender, RadioMessage::ModeRequest { device_id }.encode());
        if let Some(mode) = poll_for_announce(rx_frame_queue_receiver, device_id, config.mode_request_timeout_ms).await {
            indicate(indication_queue_sender, Indication::ModeAcquired(mode));
            return mode;
        }
        indicate(indication_queue_sender, Indication::ModeAcquireTimeout);
        Timer::after_millis(config.mode_retry_pause_ms as u64).await;
    }
}

#[embassy_executor::task(pool_size = MAX_NODE_COUNT)]
pub(crate) async fn terminal_task(
    config: ProtocolConfiguration,
    device_id: DeviceId,
    tx_frame_queue_sender: TxFrameQueueSender,
    rx_frame_queue_receiver: RxFrameQueueReceiver,
    button_event_queue_receiver: ButtonEventQueueReceiver,
    indication_queue_sender: IndicationQueueSender,
) -> ! {
    log!(
        Level::Info,
        "[{}] Terminal task started, slot {} of {}",
        device_id,
        device_id.slot_index(),
        SLOT_COUNT
    );

    let mode = acquire_mode(
        &config,
        device_id,
        &tx_frame_queue_sender,
        &rx_frame_queue_receiver,
        &indication_queue_sender,
    )
    .await;
    log!(Level::Info, "[{}] Mode acquired: {}", device_id, mode.as_str());

    let mut state = TerminalState::new(device_id, mode);
    let slot_offset_ms = device_id.slot_index() as u32 * config.slot_duration_ms;
    let cycle_ms = SLOT_COUNT as u32 * config.slot_duration_ms;

    loop {
        let cycle_start = begin_cycle();

        // 1. Sample input
        while let Ok(button) = button_event_queue_receiver.try_receive() {
            if let Some(indication) = state.handle_button(button) {
                indicate(&indication_queue_sender, indication);
            }
        }

        // 2. Own slot
        wait_until(cycle_start, slot_offset_ms).await;

        // 3. Transmit the queued report, if any
        if let Some(report) = state.pending.take() {
            send_frame(&tx_frame_queue_sender, report.to_message(device_id).encode());
            match report {
                PendingReport::Vote(_) => {
                    let acked = await_ack(&rx_frame_queue_receiver, device_id, config.ack_timeout_ms).await;
                    if acked {
                        indicate(&indication_queue_sender, Indication::VoteAccepted);
                    } else {
                        log!(Level::Debug, "[{}] Vote unacknowledged, dropping", device_id);
                        indicate(&indication_queue_sender, Indication::VoteLost);
                    }
                }
                PendingReport::Sensor(button) => {
                    indicate(&indication_queue_sender, Indication::SensorEventSent(button));
                }
            }
        }

        // 4. Opportunistic receive for mode broadcasts
        if let Ok(frame) = rx_frame_queue_receiver.try_receive() {
            if let Some((target, mode)) = announce_in(&frame) {
                if let Some(indication) = state.apply_announce(target, mode) {
                    log!(Level::Info, "[{}] Mode changed: {}", device_id, mode.as_str());
                    indicate(&indication_queue_sender, indication);
                }
            }
        }

        // 5. Cycle boundary
        wait_until(cycle_start, cycle_ms).await;
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;
    use crate::RxFrameQueue;
    use embassy_sync::channel::Channel;
    use futures::executor::block_on;

    fn leaked_rx_queue() -> &'static RxFrameQueue {
        Box::leak(Box::new(Channel::new()))
    }

    #[test]
    fn button_a_cycles_the_options_in_voting_mode() {
        let mut state = TerminalState::new(DeviceId::new(5), Mode::Voting);
        assert_eq!(state.selected_choice(), Choice::new(b'a'));
        assert_eq!(state.handle_button(Button::A), Some(Indication::OptionSelected(Choice::new(b'b'))));
        assert_eq!(state.handle_button(Button::A), Some(Indication::OptionSelected(Choice::new(b'c'))));
        assert_eq!(state.handle_button(Button::A), Some(Indication::OptionSelected(Choice::new(b'd'))));
        // wraps back around
        assert_eq!(state.handle_button(Button::A), Some(Indication::OptionSelected(Choice::new(b'a'))));
        assert_eq!(state.pending, None);
    }

    #[test]
    fn button_b_queues_the_selected_vote() {
        let mut state = TerminalState::new(DeviceId::new(5), Mode::Voting);
        state.handle_button(Button::A);
        assert_eq!(state.handle_button(Button::B), None);
        assert_eq!(state.pending, Some(PendingReport::Vote(Choice::new(b'b'))));
        // a later press replaces the queued vote
        state.handle_button(Button::A);
        state.handle_button(Button::B);
        assert_eq!(state.pending, Some(PendingReport::Vote(Choice::new(b'c'))));
    }

    #[test]
    fn either_button_queues_a_sensor_event_in_sensor_mode() {
        let mut state = TerminalState::new(DeviceId::new(5), Mode::Sensor);
        assert_eq!(state.handle_button(Button::A), None);
        assert_eq!(state.pending, Some(PendingReport::Sensor(Button::A)));
        assert_eq!(state.handle_button(Button::B), None);
        assert_eq!(state.pending, Some(PendingReport::Sensor(Button::B)));
    }

    #[test]
    fn announce_for_another_terminal_is_ignored() {
        let mut state = TerminalState::new(DeviceId::new(5), Mode::Voting);
        state.handle_button(Button::A);
        let other = AnnounceTarget::Device(DeviceId::new(6));
        assert_eq!(state.apply_announce(other, Mode::Sensor), None);
        assert_eq!(state.mode, Mode::Voting);
        assert_eq!(state.selected_option, 1);
    }

    #[test]
    fn applied_announce_resets_selection_and_pending() {
        let mut state = TerminalState::new(DeviceId::new(5), Mode::Voting);
        state.handle_button(Button::A);
        state.handle_button(Button::B);
        let applied = state.apply_announce(AnnounceTarget::All, Mode::Sensor);
        assert_eq!(applied, Some(Indication::ModeChanged(Mode::Sensor)));
        assert_eq!(state.mode, Mode::Sensor);
        assert_eq!(state.selected_option, 0);
        assert_eq!(state.pending, None);
    }

    #[test]
    fn same_mode_announce_is_still_applied() {
        let mut state = TerminalState::new(DeviceId::new(5), Mode::Voting);
        state.handle_button(Button::A);
        let applied = state.apply_announce(AnnounceTarget::Device(DeviceId::new(5)), Mode::Voting);
        assert_eq!(applied, Some(Indication::ModeChanged(Mode::Voting)));
        assert_eq!(state.selected_option, 0);
    }

    #[test]
    fn matching_ack_closes_the_wait() {
        let rx = leaked_rx_queue();
        let me = DeviceId::new(17);
        rx.sender()
            .try_send(RadioMessage::Ack { device_id: me }.encode())
            .expect("queue has room");
        assert!(block_on(await_ack(&rx.receiver(), me, 200)));
    }

    #[test]
    fn foreign_ack_never_closes_the_wait() {
        let rx = leaked_rx_queue();
        let me = DeviceId::new(17);
        rx.sender()
            .try_send(RadioMessage::Ack { device_id: DeviceId::new(18) }.encode())
            .expect("queue has room");
        // zero window: one drain pass, then timeout
        assert!(!block_on(await_ack(&rx.receiver(), me, 0)));
    }

    #[test]
    fn non_ack_traffic_is_consumed_but_does_not_ack() {
        let rx = leaked_rx_queue();
        let me = DeviceId::new(17);
        let sender = rx.sender();
        sender
            .try_send(
                RadioMessage::ModeAnnounce {
                    target: AnnounceTarget::All,
                    mode: Mode::Voting,
                }
                .encode(),
            )
            .expect("queue has room");
        sender
            .try_send(RadioMessage::Ack { device_id: me }.encode())
            .expect("queue has room");
        assert!(block_on(await_ack(&rx.receiver(), me, 200)));
        // both frames were consumed
        assert!(rx.receiver().try_receive().is_err());
    }

    #[test]
    fn ack_timeout_reports_failure_exactly_once() {
        let rx = leaked_rx_queue();
        assert!(!block_on(await_ack(&rx.receiver(), DeviceId::new(17), 0)));
    }

    #[test]
    fn announce_poll_matches_wildcard_and_own_id() {
        let me = DeviceId::new(17);

        let rx = leaked_rx_queue();
        rx.sender()
            .try_send(
                RadioMessage::ModeAnnounce {
                    target: AnnounceTarget::All,
                    mode: Mode::Sensor,
                }
                .encode(),
            )
            .expect("queue has room");
        assert_eq!(block_on(poll_for_announce(&rx.receiver(), me, 1000)), Some(Mode::Sensor));

        let rx = leaked_rx_queue();
        rx.sender()
            .try_send(
                RadioMessage::ModeAnnounce {
                    target: AnnounceTarget::Device(me),
                    mode: Mode::Voting,
                }
                .encode(),
            )
            .expect("queue has room");
        assert_eq!(block_on(poll_for_announce(&rx.receiver(), me, 1000)), Some(Mode::Voting));
    }

    #[test]
    fn announce_poll_ignores_other_targets_and_times_out() {
        let me = DeviceId::new(17);
        let rx = leaked_rx_queue();
        let sender = rx.sender();
        sender
            .try_send(
                RadioMessage::ModeAnnounce {
                    target: AnnounceTarget::Device(DeviceId::new(99)),
                    mode: Mode::Sensor,
                }
                .encode(),
            )
            .expect("queue has room");
        sender
            .try_send(RadioMessage::ModeRequest { device_id: me }.encode())
            .expect("queue has room");
        assert_eq!(block_on(poll_for_announce(&rx.receiver(), me, 0)), None);
    }
}
