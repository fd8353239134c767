//! Loopback radio device for single-node testing.
//!
//! Every transmitted frame is played straight back to the receive queue.
//! No timing, no loss, no network: useful for exercising the codec and the
//! queue plumbing without simulation or hardware. A node talking only to
//! itself can of course never complete a mode-request exchange; multi-node
//! behavior needs the simulator device.

use crate::RxFrameQueueSender;
use crate::TxFrameQueueReceiver;
use crate::MAX_NODE_COUNT;
use log::{log, Level};

#[embassy_executor::task(pool_size = MAX_NODE_COUNT)]
pub async fn radio_device_task(
    mut radio_device: RadioDevice,
    tx_frame_queue_receiver: TxFrameQueueReceiver,
    rx_frame_queue_sender: RxFrameQueueSender,
    node_label: u32,
    _rng_seed: u64,
) -> ! {
    log!(Level::Info, "[{}] Echo radio device task started", node_label);
    radio_device.run(tx_frame_queue_receiver, rx_frame_queue_sender, node_label).await
}

/// Zero-sized, stateless loopback device.
#[cfg_attr(feature = "std", derive(Debug))]
pub struct RadioDevice {}

impl Default for RadioDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl RadioDevice {
    pub const fn new() -> Self {
        RadioDevice {}
    }

    async fn run(&mut self, tx_frame_queue_receiver: TxFrameQueueReceiver, rx_frame_queue_sender: RxFrameQueueSender, node_label: u32) -> ! {
        loop {
            let frame = tx_frame_queue_receiver.receive().await;
            if rx_frame_queue_sender.try_send(frame).is_err() {
                // Backpressure: drop the echoed frame rather than stall
                log!(Level::Warn, "[{}] RX frame queue full, dropping echoed frame", node_label);
            }
        }
    }
}
