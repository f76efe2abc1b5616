// Keyboard uplink: W/S speed, A/D steer, arrows pan/tilt, L headlight, Space free, Q quit
//
// Usage: cargo run --example uplink_teleop -- [rover_addr]
// Example: cargo run --example uplink_teleop -- 192.168.50.2:5565
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use rover_motion_runtime::uplink::{Axis, BUTTON_FREE, Pov, UplinkPacket};
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tracing::info;

const STICK_STEPS: [f32; 3] = [0.25, 0.5, 1.0];
const INPUT_TIMEOUT_MS: u64 = 150; // Sticks spring back after this much time with no input
const SEND_PERIOD_MS: u64 = 20; // 50 Hz

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let target = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:5565".to_string());
    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    socket.connect(&target).await?;

    info!("Sending uplink to {}", target);
    info!("Controls: WASD=drive, arrows=pan/tilt, C=recenter, L=headlight, Space=free, R/F=step, Q=quit");

    enable_raw_mode()?;
    let result = run_teleop(&socket).await;
    disable_raw_mode()?;

    result
}

async fn run_teleop(socket: &UdpSocket) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut step_idx: usize = 1;
    let mut packet = UplinkPacket::default();
    let mut headlight = false;
    let mut last_input = Instant::now();

    loop {
        let mut free = false;
        let mut pov = Pov::Centered;

        if event::poll(Duration::from_millis(SEND_PERIOD_MS))? {
            if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
                let pressed = kind == KeyEventKind::Press || kind == KeyEventKind::Repeat;
                let step = STICK_STEPS[step_idx];

                match code {
                    KeyCode::Char('w') if pressed => {
                        packet.set_axis(Axis::Speed, step);
                        last_input = Instant::now();
                    }
                    KeyCode::Char('s') if pressed => {
                        packet.set_axis(Axis::Speed, -step);
                        last_input = Instant::now();
                    }
                    KeyCode::Char('a') if pressed => {
                        packet.set_axis(Axis::Steering, -step);
                        last_input = Instant::now();
                    }
                    KeyCode::Char('d') if pressed => {
                        packet.set_axis(Axis::Steering, step);
                        last_input = Instant::now();
                    }

                    // Camera head
                    KeyCode::Left if pressed => packet.set_axis(Axis::Pan, -1.0),
                    KeyCode::Right if pressed => packet.set_axis(Axis::Pan, 1.0),
                    KeyCode::Up if pressed => packet.set_axis(Axis::Tilt, 1.0),
                    KeyCode::Down if pressed => packet.set_axis(Axis::Tilt, -1.0),
                    KeyCode::Char('c') if pressed => pov = Pov::Up,

                    KeyCode::Char('l') if pressed => {
                        headlight = !headlight;
                        info!("Headlight: {}", if headlight { "ON" } else { "OFF" });
                    }
                    KeyCode::Char(' ') if pressed => {
                        free = true;
                        info!("Free requested");
                    }

                    KeyCode::Char('r') if pressed => {
                        step_idx = (step_idx + 1).min(STICK_STEPS.len() - 1);
                        info!("Stick step: {}", STICK_STEPS[step_idx]);
                    }
                    KeyCode::Char('f') if pressed => {
                        step_idx = step_idx.saturating_sub(1);
                        info!("Stick step: {}", STICK_STEPS[step_idx]);
                    }

                    KeyCode::Char('q') | KeyCode::Esc if pressed => break,

                    _ => {}
                }
            }
        }

        if last_input.elapsed() > Duration::from_millis(INPUT_TIMEOUT_MS) {
            packet.set_axis(Axis::Speed, 0.0);
            packet.set_axis(Axis::Steering, 0.0);
        }

        packet.set_axis(Axis::Headlight, if headlight { 1.0 } else { 0.0 });
        packet.buttons = if free { BUTTON_FREE } else { 0 };
        packet.pov = pov;
        socket.send(&packet.encode()).await?;

        // Pan/tilt are rates; only hold them for the cycle the key was seen
        packet.set_axis(Axis::Pan, 0.0);
        packet.set_axis(Axis::Tilt, 0.0);
        packet.seqno = packet.seqno.wrapping_add(1);
    }

    Ok(())
}
