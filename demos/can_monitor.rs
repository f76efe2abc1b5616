// CAN monitor: READ-ONLY view of drive telemetry
//
// Nothing is written to the bus, so it is safe to run next to the runtime.
//
// Usage: cargo run --example can_monitor -- [iface] [dialect]
// Example: cargo run --example can_monitor -- can0 v5

use rover_motion_runtime::can::{CanBus, CanTransport, Received};
use rover_motion_runtime::config::FirmwareDialect;
use rover_motion_runtime::motor::{DriveTelemetry, FrameOutcome};
use std::time::{Duration, Instant};

const REFRESH: Duration = Duration::from_secs(1);

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let iface = std::env::args().nth(1).unwrap_or_else(|| "can0".to_string());
    let dialect = match std::env::args().nth(2) {
        Some(name) => FirmwareDialect::by_name(&name)?,
        None => FirmwareDialect::default(),
    };

    println!("CAN monitor (read-only)");
    println!("Interface: {}, duty divisor: {}", iface, dialect.duty_divisor);
    println!();

    let mut bus = match CanBus::open(&iface) {
        Ok(bus) => bus,
        Err(e) => {
            println!("Failed to open {}: {}", iface, e);
            println!();
            println!("Troubleshooting:");
            println!("  - ip link set {} up type can bitrate 500000", iface);
            println!("  - or for testing: ip link add dev vcan0 type vcan");
            return Err(e.into());
        }
    };

    let mut telemetry = DriveTelemetry::new(dialect.duty_divisor);
    let mut frames = 0u64;
    let mut stray = 0u64;
    let mut last_print = Instant::now();

    loop {
        while let Some(received) = bus.try_recv() {
            frames += 1;
            let Received::Frame(frame) = received else {
                stray += 1;
                continue;
            };
            match telemetry.handle_frame(&frame) {
                FrameOutcome::UnknownNode | FrameOutcome::Ignored => stray += 1,
                _ => {}
            }
        }

        if last_print.elapsed() >= REFRESH {
            last_print = Instant::now();
            println!("{} frames ({} stray)", frames, stray);
            println!("  id      rpm   current     duty    v_in  t_fet  t_mot");
            for (id, drive) in telemetry.drives().iter().enumerate() {
                println!(
                    "  {:>2} {:>8} {:>8.1}A {:>7.3} {:>6.1}V {:>5.1}C {:>5.1}C",
                    id,
                    drive.rpm,
                    drive.current_amps(),
                    drive.duty(dialect.duty_divisor),
                    drive.voltage_in(),
                    f64::from(drive.temp_fet_deci_c) / 10.0,
                    f64::from(drive.temp_motor_deci_c) / 10.0,
                );
            }
            println!();
        }

        std::thread::sleep(Duration::from_millis(5));
    }
}
