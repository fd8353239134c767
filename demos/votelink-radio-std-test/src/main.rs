// Multi-node simulation: one bridge and two terminals on a broadcast hub.
// Scripted button presses cast a vote, then the "host" switches the cluster
// to sensor mode and a terminal reports a button event.

use embassy_executor::Spawner;
use embassy_futures::select::select_array;
use embassy_time::{Duration, Timer};
use env_logger::Builder;
use log::{info, warn, LevelFilter};
use votelink_radio_lib::radio_devices::simulator::{RadioDevice, RadioLinkQueue, RadioLinkQueueReceiver, RadioLinkQueueSender};
use votelink_radio_lib::{BridgeNode, Button, DeviceId, ProtocolConfiguration, SerialLine, TerminalNode};

const NODE_COUNT: usize = 3;

/// Broadcast hub: every frame uplinked by one node is forwarded to every
/// other node's downlink. The sender never hears its own transmission.
#[embassy_executor::task]
async fn radio_hub_task(uplinks: [RadioLinkQueueReceiver; NODE_COUNT], downlinks: [RadioLinkQueueSender; NODE_COUNT]) {
    loop {
        let (frame, origin) = select_array([uplinks[0].receive(), uplinks[1].receive(), uplinks[2].receive()]).await;
        for (index, downlink) in downlinks.iter().enumerate() {
            if index != origin && downlink.try_send(frame.clone()).is_err() {
                warn!("hub: downlink {} full, frame lost", index);
            }
        }
    }
}

#[embassy_executor::task]
async fn host_serial_task(bridge: &'static BridgeNode) {
    loop {
        match bridge.next_host_line().await {
            Ok(line) => info!("host <- {}", line.as_str().unwrap_or("<non-ascii>")),
            Err(_) => Timer::after(Duration::from_secs(1)).await,
        }
    }
}

#[embassy_executor::task(pool_size = 2)]
async fn display_task(label: u32, terminal: &'static TerminalNode) {
    loop {
        match terminal.next_indication().await {
            Ok(indication) => info!("[{}] display: {:?}", label, indication),
            Err(_) => Timer::after(Duration::from_secs(1)).await,
        }
    }
}

#[embassy_executor::task]
async fn script_task(terminal_1: &'static TerminalNode, terminal_2: &'static TerminalNode, bridge: &'static BridgeNode) {
    // Let both terminals finish their mode-request exchange first.
    Timer::after(Duration::from_secs(3)).await;

    info!("script: selecting option b and casting a vote on terminal 1");
    let _ = terminal_1.report_button(Button::A);
    Timer::after(Duration::from_secs(2)).await;
    let _ = terminal_1.report_button(Button::B);
    Timer::after(Duration::from_secs(4)).await;

    info!("script: host switches the cluster to sensor mode");
    if let Some(line) = SerialLine::from_line("MODE:SENSOR") {
        let _ = bridge.push_host_line(line);
    }
    Timer::after(Duration::from_secs(4)).await;

    info!("script: terminal 2 reports a button event");
    let _ = terminal_2.report_button(Button::A);
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    Builder::new().filter_level(LevelFilter::Info).init();
    info!("Starting simulated network: 1 bridge, 2 terminals");

    let mut uplink_receivers = Vec::new();
    let mut uplink_senders = Vec::new();
    let mut downlink_receivers = Vec::new();
    let mut downlink_senders = Vec::new();
    for _ in 0..NODE_COUNT {
        let uplink: &'static RadioLinkQueue = Box::leak(Box::new(RadioLinkQueue::new()));
        let downlink: &'static RadioLinkQueue = Box::leak(Box::new(RadioLinkQueue::new()));
        uplink_receivers.push(uplink.receiver());
        uplink_senders.push(uplink.sender());
        downlink_receivers.push(downlink.receiver());
        downlink_senders.push(downlink.sender());
    }

    // Node 0 is the bridge; nodes 1 and 2 are terminals in slots 5 and 10.
    let config = ProtocolConfiguration::default();

    let mut bridge_temp = BridgeNode::new();
    let bridge_device = RadioDevice::with(uplink_senders[0], downlink_receivers[0], 0);
    if bridge_temp.initialize(config.clone(), spawner, bridge_device, 1).is_err() {
        panic!("failed to initialize bridge node");
    }
    let bridge: &'static BridgeNode = Box::leak(Box::new(bridge_temp));

    let terminal_1_id = DeviceId::new(0x11); // slot 5
    let mut terminal_1_temp = TerminalNode::new();
    let terminal_1_device = RadioDevice::with(uplink_senders[1], downlink_receivers[1], 0);
    if terminal_1_temp.initialize(config.clone(), spawner, terminal_1_device, terminal_1_id, 2).is_err() {
        panic!("failed to initialize terminal 1");
    }
    let terminal_1: &'static TerminalNode = Box::leak(Box::new(terminal_1_temp));

    let terminal_2_id = DeviceId::new(0x16); // slot 10
    let mut terminal_2_temp = TerminalNode::new();
    let terminal_2_device = RadioDevice::with(uplink_senders[2], downlink_receivers[2], 0);
    if terminal_2_temp.initialize(config, spawner, terminal_2_device, terminal_2_id, 3).is_err() {
        panic!("failed to initialize terminal 2");
    }
    let terminal_2: &'static TerminalNode = Box::leak(Box::new(terminal_2_temp));

    let uplinks = [uplink_receivers[0], uplink_receivers[1], uplink_receivers[2]];
    let downlinks = [downlink_senders[0], downlink_senders[1], downlink_senders[2]];
    spawner.spawn(radio_hub_task(uplinks, downlinks)).unwrap();
    spawner.spawn(host_serial_task(bridge)).unwrap();
    spawner.spawn(display_task(1, terminal_1)).unwrap();
    spawner.spawn(display_task(2, terminal_2)).unwrap();
    spawner.spawn(script_task(terminal_1, terminal_2, bridge)).unwrap();

    loop {
        Timer::after(Duration::from_secs(60)).await;
    }
}
