//! Bridge role: the coordinator's per-cycle dispatcher.
//!
//! Each cycle walks the slot table with exactly one non-blocking receive
//! per slot, so at most one inbound message is observed per slot no matter
//! how many were transmitted inside that window; an airtime collision
//! within a slot goes unresolved by design. After the slot walk the bridge
//! polls the host link once for a mode command, and on a recognized one
//! updates the authoritative mode, notifies the host, and broadcasts the
//! announcement exactly once, unacknowledged and unretried.

use log::{log, Level};

use crate::host_link::{mode_changed_line, parse_host_command, ready_line, relay_line, HostCommand, SerialLine};
use crate::mode::{Mode, ModeController};
use crate::slot_clock::{begin_cycle, wait_until, Timestamp};
use crate::wire::{AnnounceTarget, RadioFrame, RadioMessage};
use crate::{DeviceId, ProtocolConfiguration, MAX_NODE_COUNT, SLOT_COUNT};
use crate::{HostRxQueueReceiver, HostTxQueueSender, RxFrameQueueReceiver, TxFrameQueueSender};

/// What one slot's inbound frame amounts to under the current mode.
#[derive(Clone)]
#[cfg_attr(feature = "std", derive(Debug))]
pub(crate) enum SlotAction {
    /// Answer a mode request, addressed to the asking terminal
    ReplyMode(DeviceId),
    /// Acknowledge a vote and relay the raw line to the host
    AckAndRelay(DeviceId, SerialLine),
    /// Relay a sensor event to the host, no acknowledgement
    Relay(SerialLine),
    /// Malformed or inconsistent with the current mode: drop silently
    Ignore,
}

/// Pure dispatch: decoded line plus current mode, nothing else. Mode
/// requests are always answered; votes count only while VOTING, sensor
/// events only while SENSOR; everything else is dropped without a trace.
pub(crate) fn classify(current_mode: Mode, line: &str) -> SlotAction {
    match RadioMessage::decode(line) {
        Some(RadioMessage::ModeRequest { device_id }) => SlotAction::ReplyMode(device_id),
        Some(RadioMessage::Vote { device_id, .. }) if current_mode == Mode::Voting => match relay_line("VOTE:", line) {
            Some(serial_line) => SlotAction::AckAndRelay(device_id, serial_line),
            None => SlotAction::Ignore,
        },
        Some(RadioMessage::SensorReading { .. }) if current_mode == Mode::Sensor => match relay_line("SENS:", line) {
            Some(serial_line) => SlotAction::Relay(serial_line),
            None => SlotAction::Ignore,
        },
        _ => SlotAction::Ignore,
    }
}

fn send_frame(tx_frame_queue_sender: &TxFrameQueueSender, frame: RadioFrame) {
    if tx_frame_queue_sender.try_send(frame).is_err() {
        log!(Level::Warn, "TX frame queue full, dropping outgoing frame");
    }
}

fn send_host_line(host_tx_queue_sender: &HostTxQueueSender, line: SerialLine) {
    if host_tx_queue_sender.try_send(line).is_err() {
        log!(Level::Warn, "Host TX queue full, dropping serial line");
    }
}

#[embassy_executor::task(pool_size = MAX_NODE_COUNT)]
pub(crate) async fn bridge_task(
    config: ProtocolConfiguration,
    tx_frame_queue_sender: TxFrameQueueSender,
    rx_frame_queue_receiver: RxFrameQueueReceiver,
    host_tx_queue_sender: HostTxQueueSender,
    host_rx_queue_receiver: HostRxQueueReceiver,
) -> ! {
    log!(Level::Info, "Bridge task started, {} slots of {} ms", SLOT_COUNT, config.slot_duration_ms);
    send_host_line(&host_tx_queue_sender, ready_line());

    let mut mode_controller = ModeController::new(Mode::Voting);
    let cycle_ms = SLOT_COUNT as u32 * config.slot_duration_ms;

    loop {
        let cycle_start = begin_cycle();

        for _slot in 0..SLOT_COUNT {
            let slot_start = Timestamp::now();

            // One receive attempt per slot, no more.
            if let Ok(frame) = rx_frame_queue_receiver.try_receive() {
                if let Some(line) = frame.as_str() {
                    match classify(mode_controller.current(), line) {
                        SlotAction::ReplyMode(device_id) => {
                            let announce = RadioMessage::ModeAnnounce {
                                target: AnnounceTarget::Device(device_id),
                                mode: mode_controller.current(),
                            };
                            send_frame(&tx_frame_queue_sender, announce.encode());
                        }
                        SlotAction::AckAndRelay(device_id, serial_line) => {
                            send_frame(&tx_frame_queue_sender, RadioMessage::Ack { device_id }.encode());
                            send_host_line(&host_tx_queue_sender, serial_line);
                        }
                        SlotAction::Relay(serial_line) => {
                            send_host_line(&host_tx_queue_sender, serial_line);
                        }
                        SlotAction::Ignore => {}
                    }
                }
            }

            wait_until(slot_start, config.slot_duration_ms).await;
        }

        // One host poll per cycle.
        if let Ok(line) = host_rx_queue_receiver.try_receive() {
            if let Some(HostCommand::SetMode(new_mode)) = line.as_str().and_then(parse_host_command) {
                mode_controller.set(new_mode);
                log!(Level::Info, "Mode set by host: {}", new_mode.as_str());
                send_host_line(&host_tx_queue_sender, mode_changed_line(new_mode));
                let announce = RadioMessage::ModeAnnounce {
                    target: AnnounceTarget::All,
                    mode: new_mode,
                };
                send_frame(&tx_frame_queue_sender, announce.encode());
            }
        }

        wait_until(cycle_start, cycle_ms).await;
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;

    #[test]
    fn vote_in_voting_mode_is_acked_and_relayed() {
        match classify(Mode::Voting, "VOTE,AAAABBBBCCCCDDDD,b") {
            SlotAction::AckAndRelay(device_id, serial_line) => {
                assert_eq!(device_id, DeviceId::new(0xAAAA_BBBB_CCCC_DDDD));
                // the ACK the bridge transmits carries the voter's identifier
                let ack = RadioMessage::Ack { device_id }.encode();
                assert_eq!(ack.as_str(), Some("ACK,AAAABBBBCCCCDDDD"));
                assert_eq!(serial_line.as_str(), Some("VOTE:VOTE,AAAABBBBCCCCDDDD,b"));
            }
            other => panic!("Expected AckAndRelay, got {:?}", other),
        }
    }

    #[test]
    fn vote_in_sensor_mode_is_dropped_without_ack_or_relay() {
        match classify(Mode::Sensor, "VOTE,AAAABBBBCCCCDDDD,b") {
            SlotAction::Ignore => {}
            other => panic!("Expected Ignore, got {:?}", other),
        }
    }

    #[test]
    fn sensor_event_in_sensor_mode_is_relayed_without_ack() {
        match classify(Mode::Sensor, "SENS,0000000000000011,A") {
            SlotAction::Relay(serial_line) => {
                assert_eq!(serial_line.as_str(), Some("SENS:SENS,0000000000000011,A"));
            }
            other => panic!("Expected Relay, got {:?}", other),
        }
    }

    #[test]
    fn sensor_event_in_voting_mode_is_dropped() {
        match classify(Mode::Voting, "SENS,0000000000000011,A") {
            SlotAction::Ignore => {}
            other => panic!("Expected Ignore, got {:?}", other),
        }
    }

    #[test]
    fn mode_request_is_answered_in_either_mode() {
        for mode in [Mode::Voting, Mode::Sensor] {
            match classify(mode, "MODE_REQUEST,0000000000000011") {
                SlotAction::ReplyMode(device_id) => assert_eq!(device_id, DeviceId::new(0x11)),
                other => panic!("Expected ReplyMode, got {:?}", other),
            }
        }
    }

    #[test]
    fn malformed_and_foreign_lines_are_ignored() {
        for line in ["", "garbage", "VOTE,zz,b", "ACK,0000000000000011", "MODE,ALL,VOTING"] {
            match classify(Mode::Voting, line) {
                SlotAction::Ignore => {}
                other => panic!("Expected Ignore for {:?}, got {:?}", line, other),
            }
        }
    }

    #[test]
    fn one_receive_per_slot_observes_at_most_one_colliding_frame() {
        // Two terminals sharing a slot both get their frame on the air; the
        // single per-slot receive picks up one and leaves the other queued
        // for a later slot, where it reads as that slot's traffic.
        let rx_frame_queue: &'static crate::RxFrameQueue = Box::leak(Box::new(embassy_sync::channel::Channel::new()));
        let sender = rx_frame_queue.sender();
        sender
            .try_send(
                RadioMessage::Vote {
                    device_id: DeviceId::new(5),
                    choice: crate::wire::Choice::new(b'a'),
                }
                .encode(),
            )
            .expect("queue has room");
        sender
            .try_send(
                RadioMessage::Vote {
                    device_id: DeviceId::new(17),
                    choice: crate::wire::Choice::new(b'b'),
                }
                .encode(),
            )
            .expect("queue has room");

        let receiver = rx_frame_queue.receiver();
        let observed = receiver.try_receive().expect("first frame present");
        assert_eq!(observed.as_str(), Some("VOTE,0000000000000005,a"));
        // the colliding frame was not consumed in this slot
        assert!(receiver.try_receive().is_ok());
        assert!(receiver.try_receive().is_err());
    }

    #[test]
    fn repeated_malformed_input_classifies_identically() {
        for _ in 0..50 {
            match classify(Mode::Voting, "VOTE,not-hex,b") {
                SlotAction::Ignore => {}
                other => panic!("Expected Ignore, got {:?}", other),
            }
        }
    }
}
