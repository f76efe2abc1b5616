// 20 Hz motion loop
// Every tick drains the uplink socket, runs one MotionCore cycle, publishes the
// snapshot and services the power-control channel. Nothing inside the tick waits
// on I/O; startup failures are fatal, per-tick failures are logged.

use std::io::ErrorKind;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use tokio::net::UdpSocket;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};

use crate::accessory::ServoLink;
use crate::can::CanBus;
use crate::config::{
    LOOP_HZ, MAX_POWER_DRAIN, MAX_UPLINK_DRAIN, RuntimeConfig, TOPIC_MOTION_STATUS, TOPIC_POWER_REQUEST,
};
use crate::messages::PowerEvent;
use crate::motion::MotionCore;
use crate::power::{self, CMD_CONNECT, PowerAction, PowerControl};
use crate::uplink::UplinkPacket;

/// Largest datagram we bother reading; anything longer is truncated and rejected by the parsers
const DATAGRAM_BUF_LEN: usize = 512;

/// Pull every queued uplink datagram (bounded), oldest first
fn drain_uplink(socket: &UdpSocket, buf: &mut [u8], out: &mut Vec<UplinkPacket>) {
    out.clear();
    while out.len() < MAX_UPLINK_DRAIN {
        match socket.try_recv_from(buf) {
            Ok((len, from)) => match UplinkPacket::parse(&buf[..len]) {
                Ok(packet) => out.push(packet),
                Err(e) => warn!("Bad uplink datagram from {}: {}", from, e),
            },
            Err(e) if e.kind() == ErrorKind::WouldBlock => return,
            Err(e) => {
                warn!("Uplink receive failed: {}", e);
                return;
            }
        }
    }
    debug!("Uplink drain hit the {} datagram limit", MAX_UPLINK_DRAIN);
}

/// Ground-station power socket; events are handed back for publishing
struct PowerChannel {
    socket: UdpSocket,
    ground_station: SocketAddr,
    control: PowerControl,
}

impl PowerChannel {
    /// Handle queued datagrams (bounded) and announce ourselves if due.
    /// Returns how many datagrams were read.
    fn service(&mut self, now: Instant, buf: &mut [u8], events: &mut Vec<PowerEvent>) -> usize {
        let mut count = 0;
        while count < MAX_POWER_DRAIN {
            let (len, from) = match self.socket.try_recv_from(buf) {
                Ok(received) => received,
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => {
                    warn!("Power receive failed: {}", e);
                    break;
                }
            };
            count += 1;
            match self.control.handle(&buf[..len]) {
                Ok(PowerAction::Event(event)) => {
                    info!("Power request from {}: {:?}", from, event);
                    events.push(event);
                }
                Ok(PowerAction::Echo) => {
                    if let Err(e) = self.socket.try_send_to(&buf[..len], self.ground_station) {
                        warn!("Power keepalive echo failed: {}", e);
                    }
                }
                Ok(PowerAction::Ignore) => {}
                Err(e) => debug!("Bad power datagram from {}: {}", from, e),
            }
        }
        if count == MAX_POWER_DRAIN {
            debug!("Power drain hit the {} datagram limit", MAX_POWER_DRAIN);
        }

        if self.control.connect_due(now) {
            let packet = power::build_packet(CMD_CONNECT);
            if let Err(e) = self.socket.try_send_to(&packet, self.ground_station) {
                debug!("CONNECT to {} failed: {}", self.ground_station, e);
            }
        }
        count
    }
}

pub async fn run(config: RuntimeConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let dialect = config.dialect;
    info!(
        "Firmware dialect: duty /{}, traction control {}, lights {}, servo {}",
        dialect.duty_divisor, dialect.traction_control, dialect.lights, dialect.servo
    );

    let bus = CanBus::open(&config.can_interface)?;
    let servo = if dialect.servo {
        Some(ServoLink::open(&config.servo_port, config.servo_baudrate)?)
    } else {
        None
    };

    let uplink = UdpSocket::bind(("0.0.0.0", config.uplink_port)).await?;
    info!("Listening for uplink on {}", uplink.local_addr()?);

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;
    let pub_status = session.declare_publisher(TOPIC_MOTION_STATUS).await?;

    let pub_power = session.declare_publisher(TOPIC_POWER_REQUEST).await?;

    let mut power = PowerChannel {
        socket: UdpSocket::bind(("0.0.0.0", config.power_port)).await?,
        ground_station: config.ground_station_addr()?,
        control: PowerControl::default(),
    };
    info!(
        "Power control on {}, ground station {}",
        power.socket.local_addr()?,
        power.ground_station
    );

    let mut tick = interval(Duration::from_millis(1000 / LOOP_HZ));
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut core = MotionCore::new(&config, bus, servo, Instant::now());
    let mut buf = [0u8; DATAGRAM_BUF_LEN];
    let mut packets = Vec::with_capacity(MAX_UPLINK_DRAIN);
    let mut power_events = Vec::new();

    info!(
        "Runtime started: {}Hz loop, {}ms uplink timeout",
        LOOP_HZ,
        config.uplink_timeout().as_millis()
    );
    info!("Publishing to: {}, {}", TOPIC_MOTION_STATUS, TOPIC_POWER_REQUEST);

    loop {
        // Scheduled tick time, not wall time, so timing stays on the 50 ms grid
        let now = tick.tick().await.into_std();

        drain_uplink(&uplink, &mut buf, &mut packets);
        let snapshot = core.tick(now, &packets);

        match serde_json::to_string(&snapshot) {
            Ok(json) => {
                if let Err(e) = pub_status.put(json).await {
                    error!("Failed to publish status: {}", e);
                }
            }
            Err(e) => error!("Failed to encode status: {}", e),
        }

        power_events.clear();
        power.service(now, &mut buf, &mut power_events);
        for event in &power_events {
            match serde_json::to_string(event) {
                Ok(json) => {
                    if let Err(e) = pub_power.put(json).await {
                        error!("Failed to publish power event: {}", e);
                    }
                }
                Err(e) => error!("Failed to encode power event: {}", e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::power::{CMD_KEEPALIVE, CMD_REBOOT};

    async fn channel(ground_station: SocketAddr) -> PowerChannel {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        PowerChannel {
            socket,
            ground_station,
            control: PowerControl::default(),
        }
    }

    async fn recv_within(socket: &UdpSocket, buf: &mut [u8]) -> (usize, SocketAddr) {
        tokio::time::timeout(Duration::from_secs(1), socket.recv_from(buf))
            .await
            .expect("no datagram within 1s")
            .unwrap()
    }

    #[tokio::test]
    async fn test_power_flood_is_bounded_per_tick() {
        let station = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let mut power = channel(station.local_addr().unwrap()).await;
        let target = power.socket.local_addr().unwrap();

        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let keepalive = power::build_packet(CMD_KEEPALIVE);
        for _ in 0..MAX_POWER_DRAIN + 10 {
            sender.send_to(&keepalive, target).await.unwrap();
        }
        sender.send_to(&power::build_packet(CMD_REBOOT), target).await.unwrap();

        power.socket.readable().await.unwrap();
        power.socket.writable().await.unwrap();
        let mut buf = [0u8; DATAGRAM_BUF_LEN];
        let mut events = Vec::new();

        assert_eq!(power.service(Instant::now(), &mut buf, &mut events), MAX_POWER_DRAIN);
        assert!(events.is_empty());

        // The rest waits for the next tick
        assert_eq!(power.service(Instant::now(), &mut buf, &mut events), 11);
        assert_eq!(events, vec![PowerEvent::RebootRequested]);
    }

    #[tokio::test]
    async fn test_keepalive_echoed_to_ground_station() {
        let station = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let mut power = channel(station.local_addr().unwrap()).await;
        let target = power.socket.local_addr().unwrap();

        // Sent from somewhere other than the ground station
        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let keepalive = power::build_packet(CMD_KEEPALIVE);
        sender.send_to(&keepalive, target).await.unwrap();

        power.socket.readable().await.unwrap();
        power.socket.writable().await.unwrap();
        let mut buf = [0u8; DATAGRAM_BUF_LEN];
        assert_eq!(power.service(Instant::now(), &mut buf, &mut Vec::new()), 1);
        assert!(power.control.connected());

        let mut echo = [0u8; DATAGRAM_BUF_LEN];
        let (len, from) = recv_within(&station, &mut echo).await;
        assert_eq!(&echo[..len], &keepalive[..]);
        assert_eq!(from, target);
    }

    #[tokio::test]
    async fn test_connect_announced_until_answered() {
        let station = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let mut power = channel(station.local_addr().unwrap()).await;
        power.socket.writable().await.unwrap();

        let mut buf = [0u8; DATAGRAM_BUF_LEN];
        assert_eq!(power.service(Instant::now(), &mut buf, &mut Vec::new()), 0);

        let mut got = [0u8; DATAGRAM_BUF_LEN];
        let (len, _) = recv_within(&station, &mut got).await;
        assert_eq!(power::parse_packet(&got[..len]), Ok(CMD_CONNECT));
    }
}
