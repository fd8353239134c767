#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(all(feature = "radio-device-echo", feature = "radio-device-simulator"))]
compile_error!("Only one radio device feature can be enabled at a time");

#[cfg(all(not(test), not(any(feature = "radio-device-echo", feature = "radio-device-simulator"))))]
compile_error!("At least one radio device feature must be enabled");

mod bridge;
mod host_link;
mod mode;
pub mod radio_devices;
mod slot_clock;
mod terminal;
mod wire;

#[cfg(any(feature = "radio-device-echo", feature = "radio-device-simulator"))]
use crate::radio_devices::{radio_device_task, RadioDevice};

use crate::bridge::bridge_task;
use crate::terminal::terminal_task;

use embassy_executor::Spawner;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use log::{log, Level};
use rand_core::RngCore;
use rand_core::SeedableRng;
use rand_wyrand::WyRand;

pub use host_link::SerialLine;
pub use mode::Mode;
pub use terminal::Indication;
pub use wire::{AnnounceTarget, Button, Choice, RadioFrame, RadioMessage};

/// Number of time slots in one polling cycle, one nominally per terminal.
///
/// Fixed at build time; the protocol has no dynamic enrollment, so every
/// deployment shares the same slot table.
pub const SLOT_COUNT: usize = 12;

//Wire-level constants. One ASCII line per frame; the longest radio line is
//"MODE_REQUEST," plus a 16-digit identifier, well inside the buffer.
pub const RADIO_FRAME_SIZE: usize = 64;
pub const SERIAL_LINE_SIZE: usize = 80;

#[cfg(feature = "radio-device-simulator")]
pub(crate) const MAX_NODE_COUNT: usize = 16;

#[cfg(not(feature = "radio-device-simulator"))]
pub(crate) const MAX_NODE_COUNT: usize = 1;

/// Deploy-time protocol configuration.
///
/// All timing contracts of the access protocol live here. The values are
/// fixed at build/deploy time and never negotiated over the air; every
/// terminal and the bridge must be flashed with the same slot geometry.
#[derive(Clone)]
#[cfg_attr(feature = "std", derive(Debug))]
pub struct ProtocolConfiguration {
    /// Duration of one transmission slot in milliseconds
    pub slot_duration_ms: u32,
    /// How long a terminal waits for the ACK of a transmitted vote
    pub ack_timeout_ms: u32,
    /// How long a terminal waits for a mode announcement at boot
    pub mode_request_timeout_ms: u32,
    /// Pause between unanswered mode requests at boot
    pub mode_retry_pause_ms: u32,
    /// Radio channel group, handed to the hardware radio initialization
    pub radio_group: u8,
    /// Radio transmit power, handed to the hardware radio initialization
    pub radio_power: u8,
}

impl Default for ProtocolConfiguration {
    fn default() -> Self {
        ProtocolConfiguration {
            slot_duration_ms: 100,
            ack_timeout_ms: 200,
            mode_request_timeout_ms: 1000,
            mode_retry_pause_ms: 500,
            radio_group: 1,
            radio_power: 1,
        }
    }
}

/// Fixed-width device identifier, derived once from hardware at boot.
///
/// Immutable for the device's lifetime; used both as the protocol
/// correlation key and as the slot-assignment input. The wire form is
/// zero-padded 16-digit hex.
#[derive(Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "std", derive(Debug))]
pub struct DeviceId(u64);

impl DeviceId {
    pub const fn new(value: u64) -> Self {
        DeviceId(value)
    }

    pub const fn value(&self) -> u64 {
        self.0
    }

    /// The slot this identifier transmits in. Pure and stable: the same
    /// identifier always maps to the same index, across restarts. Distinct
    /// identifiers may share a slot; the protocol does not detect or resolve
    /// that collision.
    pub const fn slot_index(&self) -> usize {
        (self.0 % SLOT_COUNT as u64) as usize
    }

    /// Parses the hex wire form. Case-insensitive, 1 to 16 hex digits,
    /// nothing else (no sign, no whitespace).
    pub fn from_hex(field: &str) -> Option<Self> {
        if field.is_empty() || field.len() > 16 || !field.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        u64::from_str_radix(field, 16).ok().map(DeviceId)
    }
}

impl core::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:016X}", self.0)
    }
}

pub enum SendError {
    ChannelFull,
    NotInited,
}

pub enum ReceiveError {
    NotInited,
}

const TX_FRAME_QUEUE_SIZE: usize = 8;
pub(crate) type TxFrameQueue = Channel<CriticalSectionRawMutex, RadioFrame, TX_FRAME_QUEUE_SIZE>;
pub(crate) type TxFrameQueueReceiver = embassy_sync::channel::Receiver<'static, CriticalSectionRawMutex, RadioFrame, TX_FRAME_QUEUE_SIZE>;
pub(crate) type TxFrameQueueSender = embassy_sync::channel::Sender<'static, CriticalSectionRawMutex, RadioFrame, TX_FRAME_QUEUE_SIZE>;

#[cfg(feature = "embedded")]
static TX_FRAME_QUEUE: TxFrameQueue = Channel::new();

const RX_FRAME_QUEUE_SIZE: usize = 8;
pub(crate) type RxFrameQueue = Channel<CriticalSectionRawMutex, RadioFrame, RX_FRAME_QUEUE_SIZE>;
pub(crate) type RxFrameQueueReceiver = embassy_sync::channel::Receiver<'static, CriticalSectionRawMutex, RadioFrame, RX_FRAME_QUEUE_SIZE>;
pub(crate) type RxFrameQueueSender = embassy_sync::channel::Sender<'static, CriticalSectionRawMutex, RadioFrame, RX_FRAME_QUEUE_SIZE>;

#[cfg(feature = "embedded")]
static RX_FRAME_QUEUE: RxFrameQueue = Channel::new();

const BUTTON_EVENT_QUEUE_SIZE: usize = 4;
pub(crate) type ButtonEventQueue = Channel<CriticalSectionRawMutex, Button, BUTTON_EVENT_QUEUE_SIZE>;
pub(crate) type ButtonEventQueueReceiver = embassy_sync::channel::Receiver<'static, CriticalSectionRawMutex, Button, BUTTON_EVENT_QUEUE_SIZE>;
pub(crate) type ButtonEventQueueSender = embassy_sync::channel::Sender<'static, CriticalSectionRawMutex, Button, BUTTON_EVENT_QUEUE_SIZE>;

#[cfg(feature = "embedded")]
static BUTTON_EVENT_QUEUE: ButtonEventQueue = Channel::new();

const INDICATION_QUEUE_SIZE: usize = 8;
pub(crate) type IndicationQueue = Channel<CriticalSectionRawMutex, Indication, INDICATION_QUEUE_SIZE>;
pub(crate) type IndicationQueueReceiver = embassy_sync::channel::Receiver<'static, CriticalSectionRawMutex, Indication, INDICATION_QUEUE_SIZE>;
pub(crate) type IndicationQueueSender = embassy_sync::channel::Sender<'static, CriticalSectionRawMutex, Indication, INDICATION_QUEUE_SIZE>;

#[cfg(feature = "embedded")]
static INDICATION_QUEUE: IndicationQueue = Channel::new();

const HOST_TX_QUEUE_SIZE: usize = 8;
pub(crate) type HostTxQueue = Channel<CriticalSectionRawMutex, SerialLine, HOST_TX_QUEUE_SIZE>;
pub(crate) type HostTxQueueReceiver = embassy_sync::channel::Receiver<'static, CriticalSectionRawMutex, SerialLine, HOST_TX_QUEUE_SIZE>;
pub(crate) type HostTxQueueSender = embassy_sync::channel::Sender<'static, CriticalSectionRawMutex, SerialLine, HOST_TX_QUEUE_SIZE>;

#[cfg(feature = "embedded")]
static HOST_TX_QUEUE: HostTxQueue = Channel::new();

const HOST_RX_QUEUE_SIZE: usize = 4;
pub(crate) type HostRxQueue = Channel<CriticalSectionRawMutex, SerialLine, HOST_RX_QUEUE_SIZE>;
pub(crate) type HostRxQueueReceiver = embassy_sync::channel::Receiver<'static, CriticalSectionRawMutex, SerialLine, HOST_RX_QUEUE_SIZE>;
pub(crate) type HostRxQueueSender = embassy_sync::channel::Sender<'static, CriticalSectionRawMutex, SerialLine, HOST_RX_QUEUE_SIZE>;

#[cfg(feature = "embedded")]
static HOST_RX_QUEUE: HostRxQueue = Channel::new();

enum TerminalNodeState {
    Uninitialized,
    Initialized {
        button_event_queue_sender: ButtonEventQueueSender,
        indication_queue_receiver: IndicationQueueReceiver,
    },
}

/// A single handheld terminal: the role task plus its radio device task.
///
/// The input collaborator (button-edge detection) feeds events in through
/// `report_button`; the display collaborator drains `next_indication`. Both
/// are external to the protocol.
pub struct TerminalNode {
    state: TerminalNodeState,
}

impl TerminalNode {
    pub const fn new() -> Self {
        TerminalNode {
            state: TerminalNodeState::Uninitialized,
        }
    }

    #[cfg(all(feature = "embedded", any(feature = "radio-device-echo", feature = "radio-device-simulator")))]
    pub fn initialize(
        &mut self,
        config: ProtocolConfiguration,
        spawner: Spawner,
        radio_device: RadioDevice,
        device_id: DeviceId,
        rng_seed: u64,
    ) -> Result<(), ()> {
        return self.initialize_common(
            config,
            spawner,
            radio_device,
            &TX_FRAME_QUEUE,
            &RX_FRAME_QUEUE,
            &BUTTON_EVENT_QUEUE,
            &INDICATION_QUEUE,
            device_id,
            rng_seed,
        );
    }

    #[cfg(all(feature = "std", any(feature = "radio-device-echo", feature = "radio-device-simulator")))]
    pub fn initialize(
        &mut self,
        config: ProtocolConfiguration,
        spawner: Spawner,
        radio_device: RadioDevice,
        device_id: DeviceId,
        rng_seed: u64,
    ) -> Result<(), ()> {
        let tx_frame_queue: &'static TxFrameQueue = Box::leak(Box::new(Channel::new()));
        let rx_frame_queue: &'static RxFrameQueue = Box::leak(Box::new(Channel::new()));
        let button_event_queue: &'static ButtonEventQueue = Box::leak(Box::new(Channel::new()));
        let indication_queue: &'static IndicationQueue = Box::leak(Box::new(Channel::new()));
        return self.initialize_common(
            config,
            spawner,
            radio_device,
            tx_frame_queue,
            rx_frame_queue,
            button_event_queue,
            indication_queue,
            device_id,
            rng_seed,
        );
    }

    #[cfg(any(feature = "radio-device-echo", feature = "radio-device-simulator"))]
    fn initialize_common(
        &mut self,
        config: ProtocolConfiguration,
        spawner: Spawner,
        radio_device: RadioDevice,
        tx_frame_queue: &'static TxFrameQueue,
        rx_frame_queue: &'static RxFrameQueue,
        button_event_queue: &'static ButtonEventQueue,
        indication_queue: &'static IndicationQueue,
        device_id: DeviceId,
        rng_seed: u64,
    ) -> Result<(), ()> {
        let mut rng = WyRand::seed_from_u64(rng_seed);

        let radio_device_task_result = spawner.spawn(radio_device_task(
            radio_device,
            tx_frame_queue.receiver(),
            rx_frame_queue.sender(),
            device_id.value() as u32,
            rng.next_u64(),
        ));
        if radio_device_task_result.is_err() {
            return Err(());
        }
        log!(Level::Debug, "Radio device task spawned");

        let terminal_task_result = spawner.spawn(terminal_task(
            config,
            device_id,
            tx_frame_queue.sender(),
            rx_frame_queue.receiver(),
            button_event_queue.receiver(),
            indication_queue.sender(),
        ));
        if terminal_task_result.is_err() {
            return Err(());
        }
        log!(Level::Info, "[{}] Terminal node initialized", device_id);

        self.state = TerminalNodeState::Initialized {
            button_event_queue_sender: button_event_queue.sender(),
            indication_queue_receiver: indication_queue.receiver(),
        };
        Ok(())
    }

    /// Feeds one button edge from the input collaborator into the protocol.
    pub fn report_button(&self, button: Button) -> Result<(), SendError> {
        let button_event_queue_sender = match &self.state {
            TerminalNodeState::Uninitialized => {
                return Err(SendError::NotInited);
            }
            TerminalNodeState::Initialized {
                button_event_queue_sender, ..
            } => button_event_queue_sender,
        };
        button_event_queue_sender.try_send(button).map_err(|_| SendError::ChannelFull)?;
        Ok(())
    }

    /// Next display indication for the rendering collaborator.
    pub async fn next_indication(&self) -> Result<Indication, ReceiveError> {
        let indication_queue_receiver = match &self.state {
            TerminalNodeState::Uninitialized => {
                return Err(ReceiveError::NotInited);
            }
            TerminalNodeState::Initialized {
                indication_queue_receiver, ..
            } => indication_queue_receiver,
        };
        Ok(indication_queue_receiver.receive().await)
    }
}

impl Default for TerminalNode {
    fn default() -> Self {
        Self::new()
    }
}

enum BridgeNodeState {
    Uninitialized,
    Initialized {
        host_rx_queue_sender: HostRxQueueSender,
        host_tx_queue_receiver: HostTxQueueReceiver,
    },
}

/// The coordinating bridge: the role task plus its radio device task.
///
/// The host serial driver is an external collaborator: it pushes received
/// command lines in through `push_host_line` and drains outbound report
/// lines from `next_host_line`.
pub struct BridgeNode {
    state: BridgeNodeState,
}

impl BridgeNode {
    pub const fn new() -> Self {
        BridgeNode {
            state: BridgeNodeState::Uninitialized,
        }
    }

    #[cfg(all(feature = "embedded", any(feature = "radio-device-echo", feature = "radio-device-simulator")))]
    pub fn initialize(&mut self, config: ProtocolConfiguration, spawner: Spawner, radio_device: RadioDevice, rng_seed: u64) -> Result<(), ()> {
        return self.initialize_common(
            config,
            spawner,
            radio_device,
            &TX_FRAME_QUEUE,
            &RX_FRAME_QUEUE,
            &HOST_TX_QUEUE,
            &HOST_RX_QUEUE,
            rng_seed,
        );
    }

    #[cfg(all(feature = "std", any(feature = "radio-device-echo", feature = "radio-device-simulator")))]
    pub fn initialize(&mut self, config: ProtocolConfiguration, spawner: Spawner, radio_device: RadioDevice, rng_seed: u64) -> Result<(), ()> {
        let tx_frame_queue: &'static TxFrameQueue = Box::leak(Box::new(Channel::new()));
        let rx_frame_queue: &'static RxFrameQueue = Box::leak(Box::new(Channel::new()));
        let host_tx_queue: &'static HostTxQueue = Box::leak(Box::new(Channel::new()));
        let host_rx_queue: &'static HostRxQueue = Box::leak(Box::new(Channel::new()));
        return self.initialize_common(
            config,
            spawner,
            radio_device,
            tx_frame_queue,
            rx_frame_queue,
            host_tx_queue,
            host_rx_queue,
            rng_seed,
        );
    }

    #[cfg(any(feature = "radio-device-echo", feature = "radio-device-simulator"))]
    fn initialize_common(
        &mut self,
        config: ProtocolConfiguration,
        spawner: Spawner,
        radio_device: RadioDevice,
        tx_frame_queue: &'static TxFrameQueue,
        rx_frame_queue: &'static RxFrameQueue,
        host_tx_queue: &'static HostTxQueue,
        host_rx_queue: &'static HostRxQueue,
        rng_seed: u64,
    ) -> Result<(), ()> {
        let mut rng = WyRand::seed_from_u64(rng_seed);

        // The bridge never puts an identifier of its own on the air; 0 is
        // only a log label for its radio device task.
        let radio_device_task_result = spawner.spawn(radio_device_task(
            radio_device,
            tx_frame_queue.receiver(),
            rx_frame_queue.sender(),
            0,
            rng.next_u64(),
        ));
        if radio_device_task_result.is_err() {
            return Err(());
        }
        log!(Level::Debug, "Radio device task spawned");

        let bridge_task_result = spawner.spawn(bridge_task(
            config,
            tx_frame_queue.sender(),
            rx_frame_queue.receiver(),
            host_tx_queue.sender(),
            host_rx_queue.receiver(),
        ));
        if bridge_task_result.is_err() {
            return Err(());
        }
        log!(Level::Info, "Bridge node initialized");

        self.state = BridgeNodeState::Initialized {
            host_rx_queue_sender: host_rx_queue.sender(),
            host_tx_queue_receiver: host_tx_queue.receiver(),
        };
        Ok(())
    }

    /// Feeds one line received from the host into the bridge.
    pub fn push_host_line(&self, line: SerialLine) -> Result<(), SendError> {
        let host_rx_queue_sender = match &self.state {
            BridgeNodeState::Uninitialized => {
                return Err(SendError::NotInited);
            }
            BridgeNodeState::Initialized { host_rx_queue_sender, .. } => host_rx_queue_sender,
        };
        host_rx_queue_sender.try_send(line).map_err(|_| SendError::ChannelFull)?;
        Ok(())
    }

    /// Next outbound line for the host serial driver to transmit.
    pub async fn next_host_line(&self) -> Result<SerialLine, ReceiveError> {
        let host_tx_queue_receiver = match &self.state {
            BridgeNodeState::Uninitialized => {
                return Err(ReceiveError::NotInited);
            }
            BridgeNodeState::Initialized { host_tx_queue_receiver, .. } => host_tx_queue_receiver,
        };
        Ok(host_tx_queue_receiver.receive().await)
    }
}

impl Default for BridgeNode {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;
    use futures::executor::block_on;

    #[test]
    fn slot_index_is_deterministic_and_in_range() {
        for value in [0u64, 1, 11, 12, 13, 0xAAAA_BBBB_CCCC_DDDD, u64::MAX] {
            let id = DeviceId::new(value);
            let first = id.slot_index();
            assert!(first < SLOT_COUNT);
            assert_eq!(first, id.slot_index());
            assert_eq!(first, DeviceId::new(value).slot_index());
        }
    }

    #[test]
    fn distinct_ids_may_share_a_slot() {
        let a = DeviceId::new(5);
        let b = DeviceId::new(5 + SLOT_COUNT as u64);
        assert_ne!(a, b);
        assert_eq!(a.slot_index(), b.slot_index());
    }

    #[test]
    fn device_id_hex_round_trip() {
        let id = DeviceId::new(0xAAAA_BBBB_CCCC_DDDD);
        let rendered = format!("{}", id);
        assert_eq!(rendered, "AAAABBBBCCCCDDDD");
        assert_eq!(DeviceId::from_hex(&rendered), Some(id));
        // parsing is case-insensitive
        assert_eq!(DeviceId::from_hex("aaaabbbbccccdddd"), Some(id));
    }

    #[test]
    fn device_id_rejects_non_hex_fields() {
        assert_eq!(DeviceId::from_hex(""), None);
        assert_eq!(DeviceId::from_hex("ALL"), None);
        assert_eq!(DeviceId::from_hex("+5"), None);
        assert_eq!(DeviceId::from_hex(" 5"), None);
        assert_eq!(DeviceId::from_hex("12345678901234567"), None);
    }

    #[test]
    fn default_configuration_matches_deployment() {
        let config = ProtocolConfiguration::default();
        assert_eq!(config.slot_duration_ms, 100);
        assert_eq!(config.slot_duration_ms * SLOT_COUNT as u32, 1200);
        assert_eq!(config.ack_timeout_ms, 200);
        assert_eq!(config.mode_request_timeout_ms, 1000);
        assert_eq!(config.mode_retry_pause_ms, 500);
    }

    #[test]
    fn terminal_node_not_inited() {
        let node = TerminalNode::new();
        match node.report_button(Button::A) {
            Err(SendError::NotInited) => {}
            _ => panic!("Expected NotInited"),
        }
        match block_on(node.next_indication()) {
            Err(ReceiveError::NotInited) => {}
            _ => panic!("Expected NotInited"),
        }
    }

    #[test]
    fn bridge_node_not_inited() {
        let node = BridgeNode::new();
        let line = SerialLine::from_line("MODE:VOTING").expect("line fits");
        match node.push_host_line(line) {
            Err(SendError::NotInited) => {}
            _ => panic!("Expected NotInited"),
        }
        match block_on(node.next_host_line()) {
            Err(ReceiveError::NotInited) => {}
            _ => panic!("Expected NotInited"),
        }
    }
}
