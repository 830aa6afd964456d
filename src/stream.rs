//! Byte-stream transport and timer abstractions
//!
//! The engine consumes an abstract duplex byte channel and an abstract
//! clock. `StdioStream` is the local-TTY transport: raw-mode stdin pumped
//! by a reader thread into a channel, stdout as the sink.

use std::io::{self, Read, Write};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use crossterm::terminal;
use crossterm::tty::IsTty;
use thiserror::Error;

use crate::core::emulation::Encoding;

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("failed to read from stream: {0}")]
    Read(#[source] io::Error),

    #[error("failed to write to stream: {0}")]
    Write(#[source] io::Error),

    #[error("stream closed")]
    Closed,
}

/// Abstract duplex byte channel.
///
/// Reads are pull-based: the read loop calls `read_chunk` with the
/// remaining deadline and gets back the next raw chunk, `None` on
/// deadline expiry, or an error when the channel is gone.
pub trait ByteStream {
    fn read_chunk(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>, StreamError>;

    fn write_all(&mut self, bytes: &[u8]) -> Result<(), StreamError>;

    fn flush(&mut self) -> Result<(), StreamError>;

    /// Called when the emulation profile changes the session encoding.
    /// Transports that transcode may reconfigure; the default is a no-op.
    fn set_encoding(&mut self, _encoding: Encoding) {}
}

/// Abstract timer used for deadlines and pacing delays.
pub trait Clock {
    fn now(&self) -> Instant;
    fn sleep(&mut self, duration: Duration);
}

/// Wall-clock implementation.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&mut self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// Local-TTY transport over stdin/stdout.
///
/// A reader thread pumps raw stdin bytes into a channel so the read loop
/// can block with a deadline. Raw mode is enabled while the stream lives
/// when stdin is an actual TTY.
pub struct StdioStream {
    rx: Receiver<Vec<u8>>,
    stdout: io::Stdout,
    raw: bool,
}

impl StdioStream {
    pub fn new() -> Result<Self, StreamError> {
        let raw = io::stdin().is_tty();
        if raw {
            terminal::enable_raw_mode().map_err(StreamError::Read)?;
        }

        let (tx, rx) = mpsc::channel::<Vec<u8>>();
        thread::spawn(move || {
            let mut stdin = io::stdin();
            let mut buffer = [0u8; 1024];
            loop {
                match stdin.read(&mut buffer) {
                    Ok(0) => break,
                    Ok(n) => {
                        if tx.send(buffer[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
        });

        Ok(Self {
            rx,
            stdout: io::stdout(),
            raw,
        })
    }
}

impl ByteStream for StdioStream {
    fn read_chunk(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>, StreamError> {
        match self.rx.recv_timeout(timeout) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(StreamError::Closed),
        }
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<(), StreamError> {
        self.stdout.write_all(bytes).map_err(StreamError::Write)
    }

    fn flush(&mut self) -> Result<(), StreamError> {
        self.stdout.flush().map_err(StreamError::Write)
    }
}

impl Drop for StdioStream {
    fn drop(&mut self) {
        if self.raw {
            let _ = terminal::disable_raw_mode();
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Deterministic doubles for session and form tests.

    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;
    use std::rc::Rc;
    use std::time::{Duration, Instant};

    use super::{ByteStream, Clock, StreamError};

    /// One scripted input step.
    #[derive(Clone, Debug)]
    pub enum Step {
        /// Deliver a raw chunk.
        Chunk(&'static [u8]),
        /// Report a deadline expiry (idle timeout).
        Idle,
    }

    /// Scripted byte stream capturing everything written and every
    /// deadline the read loop waited with.
    pub struct ScriptedStream {
        steps: VecDeque<Step>,
        pub written: Rc<RefCell<Vec<u8>>>,
        pub waits: Rc<RefCell<Vec<Duration>>>,
        pub fail_writes: bool,
    }

    impl ScriptedStream {
        pub fn new(steps: Vec<Step>) -> (Self, Rc<RefCell<Vec<u8>>>) {
            let written = Rc::new(RefCell::new(Vec::new()));
            (
                Self {
                    steps: steps.into(),
                    written: written.clone(),
                    waits: Rc::new(RefCell::new(Vec::new())),
                    fail_writes: false,
                },
                written,
            )
        }
    }

    impl ByteStream for ScriptedStream {
        fn read_chunk(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>, StreamError> {
            self.waits.borrow_mut().push(timeout);
            match self.steps.pop_front() {
                Some(Step::Chunk(bytes)) => Ok(Some(bytes.to_vec())),
                Some(Step::Idle) | None => Ok(None),
            }
        }

        fn write_all(&mut self, bytes: &[u8]) -> Result<(), StreamError> {
            if self.fail_writes {
                return Err(StreamError::Write(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "sink gone",
                )));
            }
            self.written.borrow_mut().extend_from_slice(bytes);
            Ok(())
        }

        fn flush(&mut self) -> Result<(), StreamError> {
            Ok(())
        }
    }

    /// Clock advanced manually through a shared offset.
    pub struct FakeClock {
        base: Instant,
        offset: Rc<Cell<Duration>>,
    }

    impl FakeClock {
        pub fn new() -> (Self, Rc<Cell<Duration>>) {
            let offset = Rc::new(Cell::new(Duration::ZERO));
            (
                Self {
                    base: Instant::now(),
                    offset: offset.clone(),
                },
                offset,
            )
        }
    }

    impl Clock for FakeClock {
        fn now(&self) -> Instant {
            self.base + self.offset.get()
        }

        fn sleep(&mut self, duration: Duration) {
            self.offset.set(self.offset.get() + duration);
        }
    }
}
