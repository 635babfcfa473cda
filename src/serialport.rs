//!
use crate::log::debug;
use crate::termios;
use nix::fcntl::{self, OFlag};
use nix::sys::stat::Mode;
pub use nix::sys::termios::BaudRate;
use std::os::unix::io::RawFd;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::termios::{get_termios, set_termios};
use std::error::Error as stderr;
use std::fmt;

//TODO: Add the kinds of errors
#[derive(Debug, Copy, Clone)]
pub enum ErrorKind {
    Unknown,
    PortClosed,
    Errno(nix::errno::Errno),
}

#[derive(Debug)]
pub struct Error {
    /// Kind of error
    kind: ErrorKind,
    /// Long description of error
    description: String,
}

impl stderr for Error {
    fn description(&self) -> &str {
        &self.description
    }
}

impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> std::result::Result<(), fmt::Error> {
        fmt.write_str(&self.description)
    }
}

impl Error {
    pub fn new(kind: ErrorKind, description: &str) -> Error {
        Error {
            kind,
            description: description.to_string(),
        }
    }
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn desc(&self) -> &String {
        &self.description
    }
}
impl From<nix::errno::Errno> for Error {
    fn from(e: nix::errno::Errno) -> Error {
        Error::new(ErrorKind::Errno(e), e.desc())
    }
}

/// A byte-oriented, full-duplex serial transport. Performs no framing
/// logic and no timing of its own -- it is a pure byte pipe with one
/// asynchronous upcall (`on_readable`, via `start_reader`) and one
/// non-blocking write.
pub struct SerialPort {
    fd: Option<RawFd>,
    path: String,
    baud: BaudRate,
    timeout: Duration,
    running: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
}
pub type Result<T> = std::result::Result<T, Error>;

impl Drop for SerialPort {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

impl SerialPort {
    pub fn new(path: &str, baud: BaudRate, timeout: Duration) -> Result<SerialPort> {
        Ok(SerialPort {
            path: path.into(),
            fd: None,
            baud,
            timeout,
            running: Arc::new(AtomicBool::new(false)),
            reader: None,
        })
    }

    /// Write bytes from arr to the open serial port. Fire-and-forget:
    /// the protocol engine never waits on this call.
    pub fn write(&self, arr: &[u8]) -> Result<usize> {
        use nix::unistd::write;
        match self.fd {
            Some(fd) => match write(fd, arr) {
                Ok(n) => Ok(n),
                Err(e) => Err(e.into()),
            },
            None => Err(Error::new(ErrorKind::PortClosed, "Serial port is not open")),
        }
    }

    /// Close the serial port and join its reader thread, if any.
    pub fn close(&mut self) -> Result<()> {
        use nix::unistd::close;
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.reader.take() {
            let _ = handle.join();
        }
        match self.fd.take() {
            Some(fd) => match close(fd) {
                Ok(_) => Ok(()),
                Err(e) => Err(e.into()),
            },
            None => Ok(()),
        }
    }

    pub fn flush(&self) -> Result<()> {
        use nix::sys::termios::{tcflush, FlushArg};
        match self.fd {
            Some(fd) => match tcflush(fd, FlushArg::TCIOFLUSH) {
                Ok(_) => Ok(()),
                Err(e) => Err(e.into()),
            },
            None => Err(Error::new(ErrorKind::PortClosed, "Serial port is not open")),
        }
    }

    /// Open the serial port and configure it: 9600-8N1, no parity, no
    /// hardware flow control. The protocol is the only flow control.
    pub fn open(&mut self) -> Result<()> {
        use nix::fcntl::fcntl;
        use nix::fcntl::FcntlArg::F_SETFL;
        use nix::sys::termios::{
            cfsetispeed, cfsetospeed, ControlFlags, InputFlags, LocalFlags, OutputFlags,
            SpecialCharacterIndices,
        };
        let mut fd = match fcntl::open(
            Path::new(&self.path),
            OFlag::O_NOCTTY | OFlag::O_RDWR,
            Mode::empty(),
        ) {
            Ok(n) => n,
            Err(e) => {
                debug(&format!("Serial: {:?}", e));
                return Err(e.into());
            }
        };
        let mut settings = get_termios(&fd)?;

        settings.control_flags &= !ControlFlags::PARENB;
        settings.control_flags &= !ControlFlags::CSTOPB;
        settings.control_flags &= !ControlFlags::CSIZE;
        settings.control_flags |= ControlFlags::CS8;
        settings.control_flags &= !ControlFlags::CRTSCTS;
        settings.control_flags |= ControlFlags::CREAD | ControlFlags::CLOCAL;
        settings.local_flags &= !LocalFlags::ICANON;
        settings.local_flags &= !LocalFlags::ECHO;
        settings.local_flags &= !LocalFlags::ECHOE;
        settings.local_flags &= !LocalFlags::ECHONL;
        settings.local_flags &= !LocalFlags::ISIG;
        settings.input_flags &= !(InputFlags::IXON | InputFlags::IXOFF | InputFlags::IXANY);
        settings.input_flags &= !(InputFlags::IGNBRK
            | InputFlags::BRKINT
            | InputFlags::PARMRK
            | InputFlags::ISTRIP
            | InputFlags::INLCR
            | InputFlags::ICRNL);
        settings.output_flags &= !OutputFlags::OPOST;
        settings.output_flags &= !OutputFlags::ONLCR;
        // Block the reader thread for up to VTIME deciseconds waiting
        // for at least one byte, so `start_reader`'s loop can poll
        // `running` periodically instead of blocking forever.
        settings.control_chars[SpecialCharacterIndices::VTIME as usize] = 5;
        settings.control_chars[SpecialCharacterIndices::VMIN as usize] = 0;
        cfsetospeed(&mut settings, self.baud)?;
        cfsetispeed(&mut settings, self.baud)?;
        set_termios(&mut fd, &settings)?;
        fcntl(fd, F_SETFL(nix::fcntl::OFlag::empty()))?;
        self.fd = Some(fd);
        Ok(())
    }

    /// Spawn the background thread that reads from the port and
    /// invokes `on_readable` with whatever bytes arrived, in order.
    /// `on_readable` MUST NOT block for long; it is called from the
    /// reader thread, not the engine thread.
    pub fn start_reader<F>(&mut self, mut on_readable: F) -> Result<()>
    where
        F: FnMut(&[u8]) + Send + 'static,
    {
        let fd = self
            .fd
            .ok_or_else(|| Error::new(ErrorKind::PortClosed, "Serial port is not open"))?;
        self.running.store(true, Ordering::Relaxed);
        let running = Arc::clone(&self.running);
        let handle = thread::spawn(move || {
            use nix::unistd::read;
            let mut buf = [0u8; 1024];
            while running.load(Ordering::Relaxed) {
                match read(fd, &mut buf) {
                    Ok(0) => continue,
                    Ok(n) => on_readable(&buf[..n]),
                    Err(nix::errno::Errno::EAGAIN) => continue,
                    Err(nix::errno::Errno::EINTR) => continue,
                    Err(_) => break,
                }
            }
        });
        self.reader = Some(handle);
        Ok(())
    }

    ///Set the baud rate.
    ///
    ///Calling this will set the rate immediately if
    ///the port is open. Otherwise it will be set once open
    ///is called.
    pub fn set_baud(&mut self, baud: BaudRate) -> Result<()> {
        use nix::sys::termios::{cfsetispeed, cfsetospeed};
        match self.fd {
            None => {
                self.baud = baud;
                Ok(())
            }
            Some(mut fd) => {
                self.baud = baud;
                let mut settings = get_termios(&fd)?;

                cfsetospeed(&mut settings, self.baud)?;
                cfsetispeed(&mut settings, self.baud)?;
                set_termios(&mut fd, &settings)?;
                Ok(())
            }
        }
    }
}
