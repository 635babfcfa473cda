//! Module responsible for reading a file as a sequence of fixed-size
//! payload blocks for the protocol engine to transmit.
use std::fs::File;
use std::io::{self, Read};
use std::path::PathBuf;

use crate::framer::DATA_LENGTH;

/// Reads a file one up-to-512-byte block at a time, retaining the
/// last block returned so it can be replayed for retransmission.
pub struct FileSource {
    path: Option<PathBuf>,
    file: Option<File>,
    replay: Vec<u8>,
    at_end: bool,
    rewind_on_eof: bool,
}

impl FileSource {
    /// A source with no file selected yet. `at_end()` is true until
    /// `select_file` succeeds, matching the "no file selected" no-op
    /// behavior documented for `send_file()`.
    pub fn new(rewind_on_eof: bool) -> FileSource {
        FileSource {
            path: None,
            file: None,
            replay: Vec::new(),
            at_end: true,
            rewind_on_eof,
        }
    }

    /// Open `path` as the source, from the beginning.
    pub fn select_file(&mut self, path: &str) -> io::Result<()> {
        let file = File::open(path)?;
        self.path = Some(PathBuf::from(path));
        self.file = Some(file);
        self.replay.clear();
        self.at_end = false;
        Ok(())
    }

    /// Read the next block (up to 512 bytes), advancing the file
    /// position and caching the block for `previous_block`. Returns an
    /// empty block once the end of the file (or no file at all) has
    /// been reached.
    pub fn next_block(&mut self) -> Vec<u8> {
        let file = match &mut self.file {
            Some(f) => f,
            None => {
                self.at_end = true;
                self.replay.clear();
                return Vec::new();
            }
        };

        let mut buf = vec![0u8; DATA_LENGTH];
        let mut total = 0usize;
        let mut eof_hit = false;
        while total < DATA_LENGTH {
            match file.read(&mut buf[total..]) {
                Ok(0) => {
                    eof_hit = true;
                    break;
                }
                Ok(n) => total += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
        buf.truncate(total);

        // A regular file's read() returns 0 immediately at EOF (it
        // never blocks), so hitting it here -- even after a partial,
        // nonempty block -- means this was the last block.
        if eof_hit {
            self.at_end = true;
        }

        self.replay = buf.clone();
        buf
    }

    /// Return the same bytes the most recent `next_block` returned.
    /// Idempotent.
    pub fn previous_block(&self) -> Vec<u8> {
        self.replay.clone()
    }

    /// True once all bytes have been emitted. If `rewind_on_eof` was
    /// set, observing end-of-file here rewinds the file so a new
    /// session can resend it from the start.
    pub fn at_end(&mut self) -> bool {
        if self.at_end && self.rewind_on_eof {
            if let Some(file) = &mut self.file {
                use std::io::Seek;
                let _ = file.seek(io::SeekFrom::Start(0));
                self.at_end = false;
            }
        }
        self.at_end
    }
}
