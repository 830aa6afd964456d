//! Terminal session
//!
//! `Session` owns the byte stream, the clock, the attribute renderer and
//! the key decoder, and drives the read loop: idle and session-duration
//! deadlines, the warning-bell retry policy, cancel fallback, and the
//! modem-style hangup sequence.

use std::mem;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::attr::{Directive, Renderer, BRIGHT, FAINT, OFF, RESET};
use super::decoder::{Decoder, Echo, Key, ReadSetup};
use super::emulation::{encode, Emulation, Encoding};
use crate::config::Config;
use crate::stream::{ByteStream, Clock};

/// Largest representable idle deadline (no timeout configured).
const FOREVER_MS: u64 = i32::MAX as u64;

/// A character-mode terminal session over an abstract byte stream.
pub struct Session {
    stream: Box<dyn ByteStream>,
    clock: Box<dyn Clock>,
    term: Renderer,
    decoder: Decoder,
    encoding: Encoding,
    pending: Vec<u8>,

    carrier: bool,
    hung: bool,
    modem: bool,
    reason: String,
    ondrop: Option<Box<dyn FnOnce(&str)>>,

    session_start: Instant,
    session_allowed: u64,
    default_timeout: u64,
    default_warn: bool,

    // armed per read cycle
    cancel: String,
    eraser: char,
}

impl Session {
    pub fn new(stream: Box<dyn ByteStream>, clock: Box<dyn Clock>, config: &Config) -> Self {
        let session_start = clock.now();
        let mut session = Self {
            stream,
            clock,
            term: Renderer::new(config.emulation, config.default_color),
            decoder: Decoder::default(),
            encoding: config.emulation.encoding(),
            pending: Vec::new(),
            carrier: true,
            hung: false,
            modem: config.modem,
            reason: String::new(),
            ondrop: None,
            session_start,
            session_allowed: config.session_allowed,
            default_timeout: config.default_timeout,
            default_warn: config.default_warn,
            cancel: String::new(),
            eraser: ' ',
        };
        session.set_emulation(config.emulation);
        info!(emulation = config.emulation.as_str(), "session started");
        session
    }

    /// Switch emulation, reconfiguring source and sink encoding together.
    pub fn set_emulation(&mut self, emulation: Emulation) {
        self.term.set_emulation(emulation);
        self.encoding = emulation.encoding();
        self.stream.set_encoding(self.encoding);
        self.pending.clear();
    }

    pub fn emulation(&self) -> Emulation {
        self.term.emulation()
    }

    pub fn carrier(&self) -> bool {
        self.carrier
    }

    /// True once `hangup` has completed; the session is finished.
    pub fn hung_up(&self) -> bool {
        self.hung
    }

    pub fn set_modem(&mut self, modem: bool) {
        self.modem = modem;
    }

    pub fn set_session_allowed(&mut self, seconds: u64) {
        self.session_allowed = seconds;
    }

    pub fn set_default_timeout(&mut self, seconds: u64) {
        self.default_timeout = seconds;
    }

    pub fn default_timeout(&self) -> u64 {
        self.default_timeout
    }

    pub fn default_warn(&self) -> bool {
        self.default_warn
    }

    /// Register the drop collaborator, fired exactly once on hangup.
    pub fn on_drop(&mut self, f: impl FnOnce(&str) + 'static) {
        self.ondrop = Some(Box::new(f));
    }

    /// Record the disconnect cause; the first writer wins.
    pub fn set_reason(&mut self, reason: &str) {
        if self.reason.is_empty() {
            self.reason = reason.to_string();
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// Last committed entry.
    pub fn entry(&self) -> &str {
        &self.decoder.entry
    }

    pub fn set_entry(&mut self, entry: String) {
        self.decoder.entry = entry;
    }

    /// How the last read cycle ended.
    pub fn terminator(&self) -> Option<&Key> {
        self.decoder.terminator.as_ref()
    }

    /// Drop any unconsumed typeahead.
    pub fn drain(&mut self) {
        self.decoder.drain();
    }

    /// Render directives and write them out, honoring pacing delays.
    /// A sink failure drops carrier; every later write is a no-op.
    pub fn out(&mut self, parts: &[Directive]) {
        if !self.carrier {
            return;
        }
        for segment in self.term.render(parts) {
            if !segment.text.is_empty() {
                let bytes = encode(&segment.text, self.encoding);
                if !self.write_bytes(&bytes) {
                    return;
                }
            }
            if segment.pause_ms > 0 && self.carrier {
                self.clock.sleep(Duration::from_millis(segment.pause_ms));
            }
        }
    }

    /// `out` plus a style reset and newline.
    pub fn outln(&mut self, parts: &[Directive]) {
        let mut all = parts.to_vec();
        all.push(RESET.into());
        all.push("\n".into());
        self.out(&all);
    }

    pub fn beep(&mut self) {
        self.out(&["\x07".into()]);
    }

    /// Move the cursor to a 1-based row/column.
    pub fn plot(&mut self, row: u16, col: u16) {
        self.out(&[format!("\x1B[{row};{col}H").into()]);
        self.term.set_position(row, col);
    }

    pub fn save_cursor(&mut self) {
        let esc = self.term.save();
        self.write_raw(esc);
    }

    pub fn restore_cursor(&mut self) {
        let esc = self.term.restore();
        self.write_raw(esc);
    }

    /// Erase the last `n` echoed columns, when echo is on.
    pub fn rubout(&mut self, n: usize) {
        let erase = self.decoder.echo;
        self.rubout_opt(n, erase);
    }

    /// Erase unconditionally (pause prompts are never echoed).
    pub fn rubout_erase(&mut self, n: usize) {
        self.rubout_opt(n, true);
    }

    fn rubout_opt(&mut self, n: usize, erase: bool) {
        if erase && n > 0 {
            let one = format!("\u{8}{}\u{8}", self.eraser);
            self.out(&[one.repeat(n).into()]);
        }
    }

    /// Glyph accessors for the active emulation.
    pub fn draw(&self) -> [&'static str; 11] {
        self.emulation().draw()
    }

    pub fn lgradient(&self) -> &'static str {
        self.emulation().lgradient()
    }

    pub fn rgradient(&self) -> &'static str {
        self.emulation().rgradient()
    }

    pub fn empty_cell(&self) -> &'static str {
        self.emulation().empty()
    }

    /// One read cycle: block until the decoder commits a terminator, a
    /// deadline fires, or the session is torn down. On return either a
    /// terminator is set (cancel synthesis counts as a commit) or the
    /// session is gone.
    pub fn read_cycle(&mut self, setup: ReadSetup) {
        self.decoder.arm(&setup);
        self.cancel = setup.cancel.clone();
        self.eraser = setup.eraser;
        let mut warn = setup.warn;

        // session-duration policy trumps the per-field idle deadline
        if self.carrier && self.session_allowed > 0 {
            let elapsed = self.clock.now().duration_since(self.session_start).as_secs();
            if elapsed > self.session_allowed {
                self.outln(&[
                    OFF.into(),
                    " ** ".into(),
                    BRIGHT.into(),
                    "your session expired".into(),
                    OFF.into(),
                    " ** ".into(),
                ]);
                self.set_reason("got exhausted");
                self.carrier = false;
            }
        }

        // computed once: with warn enabled both the wait before the
        // bell and the retry after it are half-length
        let idle_ms = if setup.timeout > 0 {
            setup.timeout * if warn { 500 } else { 1000 }
        } else {
            FOREVER_MS
        };
        let idle = Duration::from_millis(idle_ms);

        let mut retry = true;
        while self.carrier && retry && self.decoder.terminator.is_none() {
            let committed = self.pump(idle);
            if self.hung {
                return;
            }
            if !committed {
                if self.decoder.terminator.is_none() && warn {
                    // halfway warning: bell, then one more half-length wait
                    self.beep();
                    warn = false;
                } else {
                    retry = false;
                }
            }
        }
        self.out(&[RESET.into()]);

        if !self.carrier || !retry {
            if self.cancel.is_empty() {
                if !retry {
                    self.outln(&[
                        OFF.into(),
                        " ** ".into(),
                        FAINT.into(),
                        "timeout".into(),
                        OFF.into(),
                        " ** ".into(),
                    ]);
                    self.set_reason("fallen asleep");
                }
                self.beep();
                self.hangup();
                return;
            }
            self.decoder.terminator = Some(Key::Esc);
        }

        if !self.cancel.is_empty() && self.decoder.terminator == Some(Key::Esc) {
            let n = self.decoder.input.chars().count();
            self.rubout(n);
            self.decoder.input.clear();
            let cancel = self.cancel.clone();
            self.out(&[cancel.clone().into()]);
            self.decoder.entry = cancel;
            self.decoder.terminator = Some(Key::Enter);
        }

        self.decoder.disarm();
    }

    /// Tear the session down: fire the drop collaborator once, play the
    /// retro modem farewell when enabled, and clear carrier.
    pub fn hangup(&mut self) {
        if self.hung {
            return;
        }
        self.hung = true;
        if let Some(ondrop) = self.ondrop.take() {
            ondrop(&self.reason);
        }

        // 1.5 seconds of nostalgia
        if self.carrier && self.modem {
            self.out(&[
                OFF.into(),
                "+".into(),
                Directive::Pause(125),
                "+".into(),
                Directive::Pause(125),
                "+".into(),
                Directive::Pause(250),
            ]);
            self.outln(&["\nOK".into()]);
            self.out(&[Directive::Pause(400), "ATH\r".into(), Directive::Pause(300)]);
            self.beep();
            self.outln(&["\n".into(), Directive::Pause(200), "NO CARRIER".into()]);
            self.clock.sleep(Duration::from_millis(100));
        }

        self.carrier = false;
        info!(reason = %self.reason, "session closed");
    }

    /// Feed stream chunks into the decoder until a terminator commits or
    /// the deadline passes. Returns true on commit.
    fn pump(&mut self, idle: Duration) -> bool {
        let deadline = self.clock.now() + idle;
        loop {
            if !self.decoder.typeahead.is_empty() {
                if self.feed_chunk("") {
                    return true;
                }
                if self.hung || !self.carrier {
                    return false;
                }
            }
            let now = self.clock.now();
            if now >= deadline {
                return false;
            }
            match self.stream.read_chunk(deadline - now) {
                Ok(Some(bytes)) => {
                    let text = self.decode_input(&bytes);
                    if !text.is_empty() && self.feed_chunk(&text) {
                        return true;
                    }
                    if self.hung || !self.carrier {
                        return false;
                    }
                }
                Ok(None) => return false,
                Err(e) => {
                    debug!(error = %e, "input stream failed");
                    self.carrier = false;
                    return false;
                }
            }
        }
    }

    fn feed_chunk(&mut self, chunk: &str) -> bool {
        let mut fx = Vec::new();
        let done = self.decoder.feed(chunk, &mut fx);
        for effect in fx {
            match effect {
                Echo::Text(s) => self.out(&[s.into()]),
                Echo::Rubout(n) => self.rubout(n),
                Echo::Bell => self.beep(),
                Echo::Disconnect => {
                    self.outln(&[OFF.into(), " ** disconnect ** ".into()]);
                    self.set_reason("manual disconnect");
                    self.hangup();
                }
            }
        }
        done
    }

    /// Decode a raw chunk for the active profile. An incomplete UTF-8
    /// tail is carried to the next chunk; a malformed chunk is dropped.
    fn decode_input(&mut self, bytes: &[u8]) -> String {
        match self.encoding {
            Encoding::Ascii => bytes.iter().map(|&b| b as char).collect(),
            Encoding::Utf8 => {
                let mut raw = mem::take(&mut self.pending);
                raw.extend_from_slice(bytes);
                match std::str::from_utf8(&raw) {
                    Ok(s) => s.to_string(),
                    Err(e) if e.error_len().is_none() => {
                        let valid = e.valid_up_to();
                        let head = std::str::from_utf8(&raw[..valid])
                            .map(str::to_string)
                            .unwrap_or_default();
                        self.pending = raw[valid..].to_vec();
                        head
                    }
                    Err(_) => {
                        warn!("malformed UTF-8 input chunk discarded");
                        String::new()
                    }
                }
            }
        }
    }

    fn write_raw(&mut self, s: &str) {
        if self.carrier {
            let bytes = encode(s, self.encoding);
            self.write_bytes(&bytes);
        }
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> bool {
        if let Err(e) = self.stream.write_all(bytes).and_then(|_| self.stream.flush()) {
            debug!(error = %e, "output stream failed");
            self.carrier = false;
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;
    use std::time::Duration;

    use super::*;
    use crate::stream::testing::{FakeClock, ScriptedStream, Step};

    fn session(steps: Vec<Step>, config: &Config) -> (Session, Rc<RefCell<Vec<u8>>>) {
        let (stream, written) = ScriptedStream::new(steps);
        let (clock, _) = FakeClock::new();
        (
            Session::new(Box::new(stream), Box::new(clock), config),
            written,
        )
    }

    fn text(written: &Rc<RefCell<Vec<u8>>>) -> String {
        String::from_utf8_lossy(&written.borrow()).to_string()
    }

    #[test]
    fn commit_on_enter() {
        let (mut s, _) = session(vec![Step::Chunk(b"alice\r")], &Config::default());
        s.read_cycle(ReadSetup::default());
        assert_eq!(s.entry(), "alice");
        assert_eq!(s.terminator(), Some(&Key::Enter));
        assert!(s.carrier());
    }

    #[test]
    fn input_registers_reset_after_cycle() {
        let (mut s, _) = session(vec![Step::Chunk(b"alice\r")], &Config::default());
        s.read_cycle(ReadSetup {
            echo: false,
            eol: false,
            max: 5,
            ..ReadSetup::default()
        });
        assert_eq!(s.entry(), "alice");
        assert!(s.decoder.input.is_empty());
        assert!(s.decoder.echo);
        assert!(s.decoder.eol());
    }

    #[test]
    fn timeout_without_cancel_hangs_up() {
        let (mut s, written) = session(vec![Step::Idle, Step::Idle], &Config::default());
        s.read_cycle(ReadSetup {
            timeout: 10,
            warn: true,
            ..ReadSetup::default()
        });
        assert!(s.hung_up());
        assert!(!s.carrier());
        assert_eq!(s.reason(), "fallen asleep");
        let out = text(&written);
        assert!(out.contains("timeout"));
        // warn bell at half-expiry plus the hangup bell
        assert!(out.matches('\x07').count() >= 2);
    }

    #[test]
    fn warn_retry_waits_are_both_half_length() {
        let (stream, _) = ScriptedStream::new(vec![Step::Idle, Step::Idle]);
        let waits = stream.waits.clone();
        let (clock, _) = FakeClock::new();
        let mut s = Session::new(Box::new(stream), Box::new(clock), &Config::default());
        s.read_cycle(ReadSetup {
            timeout: 10,
            warn: true,
            cancel: "x".into(),
            ..ReadSetup::default()
        });
        assert_eq!(
            *waits.borrow(),
            vec![Duration::from_millis(5000), Duration::from_millis(5000)]
        );
    }

    #[test]
    fn timeout_with_cancel_synthesizes_entry() {
        let (mut s, written) = session(vec![Step::Idle, Step::Idle], &Config::default());
        s.read_cycle(ReadSetup {
            timeout: 10,
            cancel: "CANCEL".into(),
            ..ReadSetup::default()
        });
        assert!(s.carrier());
        assert!(!s.hung_up());
        assert_eq!(s.entry(), "CANCEL");
        assert_eq!(s.terminator(), Some(&Key::Enter));
        assert!(text(&written).contains("CANCEL"));
    }

    #[test]
    fn escape_key_substitutes_cancel() {
        let (mut s, written) = session(vec![Step::Chunk(b"ab\x1B")], &Config::default());
        s.read_cycle(ReadSetup {
            cancel: "quit".into(),
            ..ReadSetup::default()
        });
        assert_eq!(s.entry(), "quit");
        assert_eq!(s.terminator(), Some(&Key::Enter));
        // the partial input was rubbed out before the substitution
        assert!(text(&written).contains("\u{8} \u{8}"));
    }

    #[test]
    fn session_expiry_takes_precedence_over_idle() {
        let (stream, written) = ScriptedStream::new(vec![Step::Chunk(b"x\r")]);
        let (clock, offset) = FakeClock::new();
        let config = Config {
            session_allowed: 1,
            ..Config::default()
        };
        let mut s = Session::new(Box::new(stream), Box::new(clock), &config);
        offset.set(Duration::from_secs(5));
        s.read_cycle(ReadSetup {
            timeout: 100,
            ..ReadSetup::default()
        });
        assert!(s.hung_up());
        assert_eq!(s.reason(), "got exhausted");
        assert!(text(&written).contains("your session expired"));
    }

    #[test]
    fn expiry_still_allows_cancel_default() {
        let (stream, _) = ScriptedStream::new(vec![]);
        let (clock, offset) = FakeClock::new();
        let config = Config {
            session_allowed: 1,
            ..Config::default()
        };
        let mut s = Session::new(Box::new(stream), Box::new(clock), &config);
        offset.set(Duration::from_secs(5));
        s.read_cycle(ReadSetup {
            cancel: "bye".into(),
            ..ReadSetup::default()
        });
        assert!(!s.hung_up());
        assert!(!s.carrier());
        assert_eq!(s.entry(), "bye");
        assert_eq!(s.reason(), "got exhausted");
    }

    #[test]
    fn disconnect_key_tears_down_once() {
        let fired = Rc::new(Cell::new(0));
        let count = fired.clone();
        let (mut s, written) = session(vec![Step::Chunk(b"\x04")], &Config::default());
        s.on_drop(move |_| count.set(count.get() + 1));
        s.read_cycle(ReadSetup::default());
        assert!(s.hung_up());
        assert_eq!(s.reason(), "manual disconnect");
        assert!(text(&written).contains(" ** disconnect ** "));
        s.hangup();
        assert_eq!(fired.get(), 1);
    }

    #[test]
    fn modem_hangup_plays_farewell() {
        let config = Config {
            modem: true,
            ..Config::default()
        };
        let (mut s, written) = session(vec![], &config);
        s.set_reason("testing");
        s.hangup();
        let out = text(&written);
        assert!(out.contains("+++"));
        assert!(out.contains("OK"));
        assert!(out.contains("ATH\r"));
        assert!(out.contains("NO CARRIER"));
        assert!(!s.carrier());
    }

    #[test]
    fn write_failure_drops_carrier_silently() {
        let (mut stream, written) = ScriptedStream::new(vec![]);
        stream.fail_writes = true;
        let (clock, _) = FakeClock::new();
        let mut s = Session::new(Box::new(stream), Box::new(clock), &Config::default());
        s.out(&["hello".into()]);
        assert!(!s.carrier());
        assert!(written.borrow().is_empty());
        // further writes are no-ops, not errors
        s.out(&["more".into()]);
    }

    #[test]
    fn utf8_input_reassembles_split_sequences() {
        let (mut s, _) = session(
            vec![
                Step::Chunk(&[0xC3]),
                Step::Chunk(&[0xA9]),
                Step::Chunk(b"\r"),
            ],
            &Config::default(),
        );
        s.read_cycle(ReadSetup::default());
        assert_eq!(s.entry(), "\u{E9}");
    }

    #[test]
    fn reason_is_first_write_wins() {
        let (mut s, _) = session(vec![], &Config::default());
        s.set_reason("first");
        s.set_reason("second");
        assert_eq!(s.reason(), "first");
    }

    #[test]
    fn pacing_directive_sleeps_on_the_clock() {
        let (stream, written) = ScriptedStream::new(vec![]);
        let (clock, offset) = FakeClock::new();
        let mut s = Session::new(Box::new(stream), Box::new(clock), &Config::default());
        s.out(&["a".into(), Directive::Pause(125), "b".into()]);
        assert_eq!(offset.get(), Duration::from_millis(125));
        assert!(text(&written).contains("ab"));
    }
}
