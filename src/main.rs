use serial_link::config::{Config, ProtocolConfig};
use serial_link::{Engine, EngineEvent};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

// Not a CLI -- no argument parsing. A config file path is the only
// thing this binary takes, the same way `tw_ctrl`'s original `run()`
// read everything else from `Config`.
fn main() {
    let path = std::env::args().nth(1).unwrap_or_else(|| "config".to_string());
    let proto = match Config::new(&path) {
        Ok(config) => ProtocolConfig::from_config(&config),
        Err(e) => {
            serial_link::log::warn(&format!("could not read {}: {}, using defaults", path, e));
            ProtocolConfig::default()
        }
    };

    let (tx, rx) = mpsc::channel();
    let engine = Engine::new(proto.clone(), tx);

    if let Err(e) = engine.choose_port(&proto.serial_device) {
        serial_link::log::error(&format!("failed to open {}: {}", proto.serial_device, e));
        return;
    }

    thread::spawn(move || {
        for event in rx {
            match event {
                EngineEvent::PayloadReceived(bytes) => {
                    serial_link::log::info(&format!("received {} bytes", bytes.len()));
                }
                EngineEvent::PacketSent => {
                    serial_link::log::debug("data frame sent");
                }
            }
        }
    });

    loop {
        thread::sleep(Duration::from_secs(1));
    }
}
