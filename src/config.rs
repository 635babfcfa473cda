//! Module used for parsing the config file
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufRead};

#[derive(Debug)]
pub struct Config {
    kv_pairs: HashMap<String, String>,
}

struct KVPair {
    key: String,
    value: String,
}
impl Config {
    /// Retuns a Config parsed from the file path provided
    pub fn new(path: &str) -> Result<Config, std::io::Error> {
        let file = File::open(path)?;
        let mut config = Config {
            kv_pairs: HashMap::new(),
        };

        let reader = io::BufReader::new(file);
        for line in reader.lines() {
            match parse_line(String::from(line?)) {
                None => None,
                Some(pair) => config.kv_pairs.insert(pair.key, pair.value),
            };
        }

        return Ok(config);
    }
    ///Return a value for a key if it exists.
    pub fn get(&self, key: &str) -> Option<&String> {
        self.kv_pairs.get(key)
    }
}

/// Typed, defaulted view over a `Config` for the knobs this protocol
/// cares about. Every field has the default `spec.md` specifies;
/// a config file only needs to mention the ones it wants to override.
#[derive(Debug, Clone)]
pub struct ProtocolConfig {
    pub serial_device: String,
    pub serial_baud: u32,
    pub log_path: String,
    pub max_retransmits: u32,
    pub max_tx_frames_per_burst: u32,
    pub nominal_timeout_ms: u64,
    pub long_timeout_ms: u64,
    pub rewind_on_eof: bool,
}

impl Default for ProtocolConfig {
    fn default() -> ProtocolConfig {
        ProtocolConfig {
            serial_device: "/dev/ttyUSB0".to_string(),
            serial_baud: 9600,
            log_path: "serial_link.log".to_string(),
            max_retransmits: 3,
            max_tx_frames_per_burst: 10,
            nominal_timeout_ms: 2000,
            long_timeout_ms: 6000,
            rewind_on_eof: true,
        }
    }
}

impl ProtocolConfig {
    /// Build a `ProtocolConfig` from a parsed `Config`, falling back
    /// to the default for any key that is absent or unparsable.
    pub fn from_config(config: &Config) -> ProtocolConfig {
        let defaults = ProtocolConfig::default();
        ProtocolConfig {
            serial_device: config
                .get("serial.device")
                .cloned()
                .unwrap_or(defaults.serial_device),
            serial_baud: config
                .get("serial.baud")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.serial_baud),
            log_path: config.get("log.path").cloned().unwrap_or(defaults.log_path),
            max_retransmits: config
                .get("protocol.max_retransmits")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_retransmits),
            max_tx_frames_per_burst: config
                .get("protocol.max_tx_frames_per_burst")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_tx_frames_per_burst),
            nominal_timeout_ms: config
                .get("protocol.nominal_timeout_ms")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.nominal_timeout_ms),
            long_timeout_ms: config
                .get("protocol.long_timeout_ms")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.long_timeout_ms),
            rewind_on_eof: config
                .get("file.rewind_on_eof")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.rewind_on_eof),
        }
    }
}

fn filter_comments(line: &str) -> String {
    let comment_pos = match line.find("#") {
        Some(i) => i,
        None => return line.to_string(),
    };
    //TODO:  Maybe a better way to do this?
    let filtered = line[..comment_pos].to_string();
    filtered.trim().to_string()
}

fn parse_line(line: String) -> Option<KVPair> {
    let filtered = filter_comments(&line);
    // TODO: Find works fine here with ASCII text
    // but fails to work with unicode. Need
    // to find a better way to do this
    let sep_position = match filtered.find("=") {
        Some(i) => i,
        None => return None,
    };
    if !filtered[..sep_position].is_empty() && !filtered[sep_position + 1..].is_empty() {
        return Some(KVPair {
            key: filtered[..sep_position].to_string(),
            value: filtered[sep_position + 1..].to_string(),
        });
    }
    return None;
}
