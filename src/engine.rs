//! The protocol engine: the flag set, timers, counters, retransmission
//! bookkeeping, and the decision ladder that drives the serial
//! adapter. See `spec.md` (now `SPEC_FULL.md`) section 4.5 for the
//! semantics this module implements; the ladder below is a literal
//! transcription of that section's nested conditions and MUST keep
//! its ordering.
use rand::Rng;
use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::classifier::ReceiveBuffer;
use crate::config::ProtocolConfig;
use crate::file_source::FileSource;
use crate::framer::{self, build_data_frame, ControlKind};
use crate::log;
use crate::serialport::{self, BaudRate, SerialPort};

/// Events the engine reports upward, per `spec.md` section 6.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// A validated 512-byte payload was received.
    PayloadReceived(Vec<u8>),
    /// A data frame was written to the port.
    PacketSent,
}

#[derive(Debug)]
pub enum Error {
    Io(io::Error),
    SerialPort(serialport::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "{}", e),
            Error::SerialPort(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Error {
        Error::Io(e)
    }
}

impl From<serialport::Error> for Error {
    fn from(e: serialport::Error) -> Error {
        Error::SerialPort(e)
    }
}

/// Cumulative telemetry, per `spec.md` section 6: counts of ACKs and
/// data frames sent, and a running bit-error rate.
#[derive(Debug, Default, Clone, Copy)]
pub struct Telemetry {
    pub acks_sent: u64,
    pub frames_sent: u64,
    error_bytes: u64,
    valid_bytes: u64,
}

impl Telemetry {
    /// `error_bytes / (error_bytes + valid_bytes) * 100`, or 0 if no
    /// data frame has been classified yet.
    pub fn bit_error_rate(&self) -> f64 {
        let total = self.error_bytes + self.valid_bytes;
        if total == 0 {
            0.0
        } else {
            (self.error_bytes as f64 / total as f64) * 100.0
        }
    }
}

/// The engine's flag set, counters, timer, and last received payload.
/// Required flags per `spec.md` section 4.5.1.
#[derive(Clone, Copy)]
struct FlagState {
    rts: bool,
    fin: bool,
    rcv_enq: bool,
    rcv_ack: bool,
    rcv_data: bool,
    rcv_eot: bool,
    rcv_err: bool,
    rcv_rvi: bool,
    sent_enq: bool,
    sent_ack: bool,
    sent_data: bool,
    sent_eot: bool,
    send_rvi: bool,
    tor: bool,
    tx_frame_count: u32,
    rtx_count: u32,
    deadline: Instant,
    last_received_payload: Option<[u8; 512]>,
}

impl FlagState {
    fn new() -> FlagState {
        FlagState {
            rts: false,
            fin: true,
            rcv_enq: false,
            rcv_ack: false,
            rcv_data: false,
            rcv_eot: false,
            rcv_err: false,
            rcv_rvi: false,
            sent_enq: false,
            sent_ack: false,
            sent_data: false,
            sent_eot: false,
            send_rvi: false,
            tor: false,
            tx_frame_count: 0,
            rtx_count: 0,
            deadline: Instant::now(),
            last_received_payload: None,
        }
    }

    /// Clear every flag except `RTS` (preserved if set); set `FIN`.
    /// Used by both "reset (with timeout)" and "reset-without-timeout"
    /// -- the caller decides whether to `arm()` afterward.
    fn reset_preserving_rts(&mut self) {
        let rts = self.rts;
        *self = FlagState::new();
        self.rts = rts;
    }

    /// `deadline := now + ms + jitter`, jitter uniform in
    /// `{0, 100, ..., 900}` ms. Sets `TOR`.
    fn arm(&mut self, ms: u64) {
        let jitter_steps = rand::thread_rng().gen_range(0..10u64);
        self.deadline = Instant::now() + Duration::from_millis(ms + jitter_steps * 100);
        self.tor = true;
    }

    /// Clear `TOR` if the deadline has passed.
    fn tick(&mut self) {
        if self.tor && Instant::now() >= self.deadline {
            self.tor = false;
        }
    }
}

struct SharedState {
    flags: FlagState,
    buffer: ReceiveBuffer,
    telemetry: Telemetry,
}

impl SharedState {
    fn new() -> SharedState {
        SharedState {
            flags: FlagState::new(),
            buffer: ReceiveBuffer::new(),
            telemetry: Telemetry::default(),
        }
    }
}

fn count_non_nul(payload: &[u8]) -> u64 {
    payload.iter().filter(|&&b| b != 0).count() as u64
}

fn write_port(port: &Mutex<Option<SerialPort>>, bytes: &[u8]) {
    if let Ok(guard) = port.lock() {
        if let Some(p) = guard.as_ref() {
            if let Err(e) = p.write(bytes) {
                log::error(&format!("write failed: {:?}", e));
            }
        }
    }
}

/// Map a configured baud rate to the nearest `nix` `BaudRate`,
/// defaulting to 9600 (the rate `spec.md` section 6 mandates).
fn baud_rate(n: u32) -> BaudRate {
    match n {
        1200 => BaudRate::B1200,
        2400 => BaudRate::B2400,
        4800 => BaudRate::B4800,
        19200 => BaudRate::B19200,
        38400 => BaudRate::B38400,
        57600 => BaudRate::B57600,
        115200 => BaudRate::B115200,
        _ => BaudRate::B9600,
    }
}

/// Called from the serial adapter's reader thread whenever bytes
/// arrive. Implements the classifier of `spec.md` section 4.4 by
/// delegating to `ReceiveBuffer`, then latches the resulting flags.
fn on_readable(state: &Arc<Mutex<SharedState>>, bytes: &[u8], config: &ProtocolConfig) {
    let mut st = state.lock().unwrap();
    let result = st.buffer.append_and_scan(bytes);

    if result.ack {
        st.flags.rcv_ack = true;
        st.flags.tor = false;
    }
    if result.enq {
        st.flags.rcv_enq = true;
    }
    if result.eot {
        st.flags.rcv_eot = true;
    }
    if result.rvi {
        st.flags.rcv_rvi = true;
    }
    if let Some(payload) = result.data_ok {
        st.flags.rcv_data = true;
        st.flags.last_received_payload = Some(payload);
        st.telemetry.valid_bytes += count_non_nul(&payload);
    }
    if result.data_err {
        st.flags.rcv_data = true;
        st.flags.rcv_err = true;
        if let Some(payload) = result.data_err_payload {
            st.telemetry.error_bytes += count_non_nul(&payload);
        }
        st.flags.arm(config.long_timeout_ms);
    }
}

fn send_enq(state: &Mutex<SharedState>, port: &Mutex<Option<SerialPort>>, config: &ProtocolConfig) {
    write_port(port, &framer::control_frame(ControlKind::Enq));
    let mut st = state.lock().unwrap();
    st.flags.sent_enq = true;
    st.flags.arm(config.nominal_timeout_ms);
}

fn send_ack(state: &Mutex<SharedState>, port: &Mutex<Option<SerialPort>>, config: &ProtocolConfig) {
    write_port(port, &framer::control_frame(ControlKind::Ack));
    let mut st = state.lock().unwrap();
    st.flags.sent_ack = true;
    st.flags.rcv_data = false;
    st.telemetry.acks_sent += 1;
    st.flags.arm(config.long_timeout_ms);
}

fn send_eot(state: &Mutex<SharedState>, port: &Mutex<Option<SerialPort>>, config: &ProtocolConfig) {
    write_port(port, &framer::control_frame(ControlKind::Eot));
    let mut st = state.lock().unwrap();
    st.flags.sent_eot = true;
    st.flags.fin = true;
    st.flags.sent_enq = false;
    st.flags.tx_frame_count = 0;
    st.flags.arm(config.nominal_timeout_ms);
}

fn perform_send_rvi(state: &Mutex<SharedState>, port: &Mutex<Option<SerialPort>>) {
    write_port(port, &framer::control_frame(ControlKind::Rvi));
    let mut st = state.lock().unwrap();
    st.flags.send_rvi = false;
    st.flags.reset_preserving_rts();
}

fn send_frame(
    state: &Mutex<SharedState>,
    port: &Mutex<Option<SerialPort>>,
    file: &Mutex<FileSource>,
    config: &ProtocolConfig,
    events: &Sender<EngineEvent>,
) {
    let under_cap = {
        let st = state.lock().unwrap();
        st.flags.tx_frame_count < config.max_tx_frames_per_burst
    };
    if !under_cap {
        send_eot(state, port, config);
        return;
    }

    {
        let mut st = state.lock().unwrap();
        st.flags.rtx_count = 0;
    }

    let at_end = {
        let mut f = file.lock().unwrap();
        f.at_end()
    };

    if at_end {
        {
            let mut st = state.lock().unwrap();
            st.flags.rts = false;
        }
        send_eot(state, port, config);
        return;
    }

    let block = {
        let mut f = file.lock().unwrap();
        f.next_block()
    };
    let frame = build_data_frame(&block);
    write_port(port, &frame);

    {
        let mut st = state.lock().unwrap();
        st.flags.sent_data = true;
        st.flags.rcv_ack = false;
        st.flags.tx_frame_count += 1;
        st.flags.arm(config.nominal_timeout_ms);
        st.telemetry.frames_sent += 1;
    }
    let _ = events.send(EngineEvent::PacketSent);
}

fn resend_frame(
    state: &Mutex<SharedState>,
    port: &Mutex<Option<SerialPort>>,
    file: &Mutex<FileSource>,
    config: &ProtocolConfig,
) {
    let can_retry = {
        let st = state.lock().unwrap();
        st.flags.rtx_count < config.max_retransmits
    };
    if !can_retry {
        reset_with_timeout(state, config);
        return;
    }

    {
        let mut st = state.lock().unwrap();
        st.flags.rtx_count += 1;
    }

    let block = {
        let f = file.lock().unwrap();
        f.previous_block()
    };
    let frame = build_data_frame(&block);
    write_port(port, &frame);

    let mut st = state.lock().unwrap();
    st.flags.sent_data = true;
    st.flags.rcv_ack = false;
    st.flags.arm(config.nominal_timeout_ms);
}

fn reset_with_timeout(state: &Mutex<SharedState>, config: &ProtocolConfig) {
    let mut st = state.lock().unwrap();
    st.flags.reset_preserving_rts();
    st.flags.arm(config.nominal_timeout_ms);
}

fn reset_without_timeout(state: &Mutex<SharedState>) {
    let mut st = state.lock().unwrap();
    st.flags.reset_preserving_rts();
}

/// The decision ladder of `spec.md` section 4.5.4. Nested conditions,
/// first match fires; ordering is load-bearing and must not change.
fn run_ladder(
    state: &Mutex<SharedState>,
    port: &Mutex<Option<SerialPort>>,
    file: &Mutex<FileSource>,
    config: &ProtocolConfig,
    events: &Sender<EngineEvent>,
) {
    let rcv_enq = state.lock().unwrap().flags.rcv_enq;

    if rcv_enq {
        let fin = state.lock().unwrap().flags.fin;
        if !fin {
            state.lock().unwrap().flags.rcv_enq = false;
            return;
        }

        let sent_ack = state.lock().unwrap().flags.sent_ack;
        if !sent_ack {
            send_ack(state, port, config);
            return;
        }

        let rcv_eot = state.lock().unwrap().flags.rcv_eot;
        if rcv_eot {
            reset_without_timeout(state);
            return;
        }

        let rcv_data = state.lock().unwrap().flags.rcv_data;
        if rcv_data {
            let rcv_err = state.lock().unwrap().flags.rcv_err;
            if rcv_err {
                let mut st = state.lock().unwrap();
                st.flags.rcv_err = false;
                st.flags.rcv_data = false;
            } else {
                let payload = state.lock().unwrap().flags.last_received_payload;
                send_ack(state, port, config);
                if let Some(p) = payload {
                    let _ = events.send(EngineEvent::PayloadReceived(p.to_vec()));
                }
            }
            return;
        }

        let tor = state.lock().unwrap().flags.tor;
        if !tor {
            reset_without_timeout(state);
        }
        return;
    }

    let rcv_rvi = state.lock().unwrap().flags.rcv_rvi;
    if rcv_rvi {
        reset_with_timeout(state, config);
        return;
    }

    let rts = state.lock().unwrap().flags.rts;
    if rts {
        let fin = state.lock().unwrap().flags.fin;
        if fin {
            let tor = state.lock().unwrap().flags.tor;
            if tor {
                return;
            }
            state.lock().unwrap().flags.fin = false;
            return;
        }

        let sent_enq = state.lock().unwrap().flags.sent_enq;
        if sent_enq {
            let rcv_ack = state.lock().unwrap().flags.rcv_ack;
            if rcv_ack {
                send_frame(state, port, file, config, events);
                return;
            }

            let sent_data = state.lock().unwrap().flags.sent_data;
            if sent_data {
                let tor = state.lock().unwrap().flags.tor;
                if !tor {
                    resend_frame(state, port, file, config);
                }
            } else {
                let tor = state.lock().unwrap().flags.tor;
                if !tor {
                    reset_with_timeout(state, config);
                }
            }
        } else {
            send_enq(state, port, config);
        }
    }
}

fn run_loop(
    state: Arc<Mutex<SharedState>>,
    port: Arc<Mutex<Option<SerialPort>>>,
    file: Arc<Mutex<FileSource>>,
    config: ProtocolConfig,
    events: Sender<EngineEvent>,
    running: Arc<AtomicBool>,
) {
    while running.load(Ordering::Relaxed) {
        state.lock().unwrap().flags.tick();

        let send_rvi = state.lock().unwrap().flags.send_rvi;
        if send_rvi {
            perform_send_rvi(&state, &port);
        }

        run_ladder(&state, &port, &file, &config, &events);

        thread::sleep(Duration::from_millis(100));
    }
}

/// Owns the flag set, timers, counters, file source, and serial
/// adapter for one transfer session, and drives them from its own
/// loop thread. See `spec.md` section 6 for the downward API.
pub struct Engine {
    state: Arc<Mutex<SharedState>>,
    port: Arc<Mutex<Option<SerialPort>>>,
    file: Arc<Mutex<FileSource>>,
    config: ProtocolConfig,
    running: Arc<AtomicBool>,
    loop_handle: Option<JoinHandle<()>>,
}

impl Engine {
    pub fn new(config: ProtocolConfig, events: Sender<EngineEvent>) -> Engine {
        let state = Arc::new(Mutex::new(SharedState::new()));
        let port: Arc<Mutex<Option<SerialPort>>> = Arc::new(Mutex::new(None));
        let file = Arc::new(Mutex::new(FileSource::new(config.rewind_on_eof)));
        let running = Arc::new(AtomicBool::new(true));

        let loop_handle = {
            let state = Arc::clone(&state);
            let port = Arc::clone(&port);
            let file = Arc::clone(&file);
            let running = Arc::clone(&running);
            let config = config.clone();
            thread::spawn(move || run_loop(state, port, file, config, events, running))
        };

        Engine {
            state,
            port,
            file,
            config,
            running,
            loop_handle: Some(loop_handle),
        }
    }

    /// Open `path` as the file source.
    pub fn select_file(&self, path: &str) -> Result<(), Error> {
        self.file.lock().unwrap().select_file(path)?;
        Ok(())
    }

    /// Raise `RTS`: queue the selected file for sending.
    pub fn send_file(&self) {
        self.state.lock().unwrap().flags.rts = true;
    }

    /// Raise `SEND_RVI`: ask the peer for the line.
    pub fn request_reverse_interrupt(&self) {
        self.state.lock().unwrap().flags.send_rvi = true;
    }

    /// Close any open port and open `name` in read/write mode,
    /// starting its reader thread.
    pub fn choose_port(&self, name: &str) -> Result<(), Error> {
        let mut guard = self.port.lock().unwrap();
        if let Some(mut old) = guard.take() {
            let _ = old.close();
        }

        let mut new_port = SerialPort::new(name, baud_rate(self.config.serial_baud), Duration::from_secs(2))?;
        new_port.open()?;

        let cb_state = Arc::clone(&self.state);
        let cb_config = self.config.clone();
        new_port.start_reader(move |bytes| on_readable(&cb_state, bytes, &cb_config))?;

        *guard = Some(new_port);
        Ok(())
    }

    /// A snapshot of the running telemetry counters.
    pub fn telemetry(&self) -> Telemetry {
        self.state.lock().unwrap().telemetry
    }

    /// Stop the loop (finishing the current iteration) and close the
    /// port.
    pub fn shutdown(self) {
        if let Some(mut p) = self.port.lock().unwrap().take() {
            let _ = p.close();
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.loop_handle.take() {
            let _ = handle.join();
        }
    }
}
