//! Simulated radio device for multi-node testing without hardware.
//!
//! The device owns two channel endpoints into an external network hub: an
//! uplink carrying this node's transmissions out, and a downlink carrying
//! other nodes' transmissions in. The hub (part of the test harness) owns
//! the topology: a broadcast hub forwards every uplinked frame to every
//! other node's downlink. The shared medium is unreliable by contract, so
//! the device can drop a configurable percentage of its own transmissions
//! on the floor, seeded deterministically for reproducible runs.
//!
//! There is no carrier sensing and no collision model beyond loss: the
//! protocol arbitrates the medium purely by its fixed time slots, and a
//! lossy downlink is exactly what the ACK timeout and the unbounded
//! mode-request retry exist for.

use crate::RadioFrame;
use crate::RxFrameQueueSender;
use crate::TxFrameQueueReceiver;
use crate::MAX_NODE_COUNT;
use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use log::{log, Level};
use rand_core::RngCore;
use rand_core::SeedableRng;
use rand_wyrand::WyRand;

/// Frames buffered on each hub link before the hub or node falls behind.
const RADIO_LINK_QUEUE_SIZE: usize = 16;

/// Channel carrying frames between a simulated node and the network hub.
pub type RadioLinkQueue = embassy_sync::channel::Channel<CriticalSectionRawMutex, RadioFrame, RADIO_LINK_QUEUE_SIZE>;
pub type RadioLinkQueueReceiver = embassy_sync::channel::Receiver<'static, CriticalSectionRawMutex, RadioFrame, RADIO_LINK_QUEUE_SIZE>;
pub type RadioLinkQueueSender = embassy_sync::channel::Sender<'static, CriticalSectionRawMutex, RadioFrame, RADIO_LINK_QUEUE_SIZE>;

/// Simulated radio device - one node's endpoint on the hub.
#[cfg_attr(feature = "std", derive(Debug))]
pub struct RadioDevice {
    /// This node's transmissions, toward the hub
    uplink_sender: RadioLinkQueueSender,
    /// Other nodes' transmissions, from the hub
    downlink_receiver: RadioLinkQueueReceiver,
    /// Percentage of this node's transmissions silently lost (0-100)
    loss_percent: u8,
}

impl RadioDevice {
    pub const fn with(uplink_sender: RadioLinkQueueSender, downlink_receiver: RadioLinkQueueReceiver, loss_percent: u8) -> Self {
        RadioDevice {
            uplink_sender,
            downlink_receiver,
            loss_percent,
        }
    }
}

#[embassy_executor::task(pool_size = MAX_NODE_COUNT)]
pub async fn radio_device_task(
    radio_device: RadioDevice,
    tx_frame_queue_receiver: TxFrameQueueReceiver,
    rx_frame_queue_sender: RxFrameQueueSender,
    node_label: u32,
    rng_seed: u64,
) -> ! {
    log!(
        Level::Info,
        "[{}] Simulated radio device task started, loss {}%",
        node_label,
        radio_device.loss_percent
    );
    let mut rng = WyRand::seed_from_u64(rng_seed);
    loop {
        match select(radio_device.downlink_receiver.receive(), tx_frame_queue_receiver.receive()).await {
            Either::First(frame) => {
                if rx_frame_queue_sender.try_send(frame).is_err() {
                    log!(Level::Warn, "[{}] RX frame queue full, dropping received frame", node_label);
                }
            }
            Either::Second(frame) => {
                if radio_device.loss_percent > 0 && (rng.next_u32() % 100) < radio_device.loss_percent as u32 {
                    log!(Level::Trace, "[{}] Simulated loss, frame not transmitted", node_label);
                    continue;
                }
                if radio_device.uplink_sender.try_send(frame).is_err() {
                    log!(Level::Warn, "[{}] Uplink queue full, dropping transmitted frame", node_label);
                }
            }
        }
    }
}
