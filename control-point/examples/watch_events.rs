//! Watch a device's events
//!
//! Loads the device description, prints the service catalog, subscribes to
//! every service and prints events until Ctrl+C.
//!
//! ```text
//! UPNP_LOG_MODE=development cargo run --example watch_events -- \
//!     http://192.168.1.50:1400/xml/device_description.xml
//! ```

use upnp_control::logging::init_logging_from_env;
use upnp_control::{ControlPoint, ControlPointConfig, ControlPointEvent};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging_from_env()?;

    let Some(location) = std::env::args().nth(1) else {
        eprintln!("Usage: watch_events <device description URL>");
        std::process::exit(2);
    };

    let (control_point, mut events) = ControlPoint::new(&location, ControlPointConfig::default())?;

    let device = control_point.resolve_device(false).await?;
    println!(
        "📟 {} ({})",
        device.friendly_name.as_deref().unwrap_or("unnamed device"),
        device.device_type.as_deref().unwrap_or("unknown type")
    );

    let service_types: Vec<String> = device.service_types().map(str::to_string).collect();
    for service_type in &service_types {
        match control_point.resolve_service(service_type, false).await {
            Ok(entry) => {
                println!("  {}", service_type);
                for action in entry.action_names() {
                    println!("    • {}", action);
                }
            }
            Err(e) => println!("  {} (no SCPD: {})", service_type, e),
        }
    }

    let callback_url = control_point.start_listener().await?;
    println!("\n👂 Listening on {}", callback_url);

    for service_type in &service_types {
        if let Err(e) = control_point.subscribe(service_type).await {
            println!("❌ Could not subscribe to {}: {}", service_type, e);
        }
    }

    println!("Waiting for events... (Ctrl+C to stop)\n");
    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                match event {
                    ControlPointEvent::Event(notification) => {
                        println!("📨 {} #{}", notification.service_type, notification.seq);
                        for (name, value) in &notification.properties {
                            println!("    {} = {}", name, value);
                        }
                    }
                    ControlPointEvent::Subscribed { service_type, timeout, .. } => {
                        println!("✅ Subscribed to {} for {}s", service_type, timeout.as_secs());
                    }
                    ControlPointEvent::Unsubscribed { service_type, .. } => {
                        println!("🔌 Unsubscribed from {}", service_type);
                    }
                    ControlPointEvent::Error(notice) => {
                        println!("⚠️  {:?}: {}", notice.source, notice.message);
                    }
                    ControlPointEvent::ListeningStateChanged { .. } => {}
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    println!("\nShutting down...");
    control_point.shutdown().await?;
    Ok(())
}
