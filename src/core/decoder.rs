//! Key decoding
//!
//! Turns a possibly-fragmented stream of decoded input characters into
//! logical terminator events: printable runs, control keys, named special
//! keys, and line-editing operations. Bytes not consumed by a pass are
//! carried forward in FIFO order as typeahead.

use std::fmt;
use std::mem;

/// Logical key token that ended a read cycle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Key {
    /// Printable character that completed a fixed-length entry.
    Char(char),
    Enter,
    Esc,
    Up,
    Down,
    Right,
    Left,
    Home,
    End,
    Insert,
    Delete,
    PageUp,
    PageDown,
    F(u8),
    /// Generic control key, caret-named (`^C`, `^T`, ..).
    Ctrl(char),
}

impl Key {
    /// Token for a raw character, caret-naming control characters.
    pub fn from_char(c: char) -> Key {
        match c {
            '\r' => Key::Enter,
            '\x1B' => Key::Esc,
            c if c < ' ' => Key::Ctrl((c as u8 + 64) as char),
            c => Key::Char(c),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Char(c) => write!(f, "{c}"),
            Key::Enter => write!(f, "\r"),
            Key::Esc => write!(f, "[ESC]"),
            Key::Up => write!(f, "[UP]"),
            Key::Down => write!(f, "[DOWN]"),
            Key::Right => write!(f, "[RIGHT]"),
            Key::Left => write!(f, "[LEFT]"),
            Key::Home => write!(f, "[HOME]"),
            Key::End => write!(f, "[END]"),
            Key::Insert => write!(f, "[INSERT]"),
            Key::Delete => write!(f, "[DELETE]"),
            Key::PageUp => write!(f, "[PGUP]"),
            Key::PageDown => write!(f, "[PGDN]"),
            Key::F(n) => write!(f, "[F{n}]"),
            Key::Ctrl(c) => write!(f, "^{c}"),
        }
    }
}

/// Escape-suffix cookbook: byte suffix after `ESC` mapped to its token.
///
/// Synonym sequences share a token; function keys accept the legacy
/// SS3 / `CSI 1 X` encodings and the modern `CSI nn ~` form. Longer
/// suffixes are listed first so prefix matching consumes the right
/// byte count.
const COOKBOOK: &[(&str, Key)] = &[
    ("[11~", Key::F(1)),
    ("[12~", Key::F(2)),
    ("[13~", Key::F(3)),
    ("[14~", Key::F(4)),
    ("[15~", Key::F(5)),
    ("[17~", Key::F(6)),
    ("[18~", Key::F(7)),
    ("[19~", Key::F(8)),
    ("[20~", Key::F(9)),
    ("[21~", Key::F(10)),
    ("[23~", Key::F(11)),
    ("[24~", Key::F(12)),
    ("[1P", Key::F(1)),
    ("[1Q", Key::F(2)),
    ("[1R", Key::F(3)),
    ("[1S", Key::F(4)),
    ("[1~", Key::Home),
    ("[2~", Key::Insert),
    ("[3~", Key::Delete),
    ("[4~", Key::End),
    ("[5~", Key::PageUp),
    ("[6~", Key::PageDown),
    ("[7~", Key::Home),
    ("[8~", Key::End),
    ("[A", Key::Up),
    ("[B", Key::Down),
    ("[C", Key::Right),
    ("[D", Key::Left),
    ("[H", Key::Home),
    ("[F", Key::End),
    ("OP", Key::F(1)),
    ("OQ", Key::F(2)),
    ("OR", Key::F(3)),
    ("OS", Key::F(4)),
];

/// Match the text following an escape character against the cookbook.
/// Returns the token and the number of suffix characters consumed.
fn cook(tail: &str) -> Option<(Key, usize)> {
    COOKBOOK
        .iter()
        .find(|(seq, _)| tail.starts_with(seq))
        .map(|(seq, key)| (key.clone(), seq.len()))
}

/// Screen side effect requested by a decode pass. The decoder performs
/// no I/O itself; the session applies these in order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Echo {
    /// Echo literal text (echo was enabled when requested).
    Text(String),
    /// Erase the last `n` echoed columns.
    Rubout(usize),
    Bell,
    /// A disconnect key was pressed; tear the session down.
    Disconnect,
}

/// Per-read registers armed by the session before each read cycle.
#[derive(Clone, Debug)]
pub struct ReadSetup {
    pub echo: bool,
    pub eol: bool,
    pub min: usize,
    /// Maximum entry length; 0 means unbounded (line mode only).
    pub max: usize,
    /// Substituted on an empty commit.
    pub enter: String,
    /// Substituted on escape/timeout; empty disables cancellation.
    pub cancel: String,
    /// Masking character used when erasing echoed input.
    pub eraser: char,
    /// Capture the next chunk verbatim (terminal capability probe).
    pub enq: bool,
    /// Multi-line entry: total line count (0 = single line) and the
    /// index of the line being collected.
    pub lines: u16,
    pub line: u16,
    /// Pre-loaded buffer content when re-editing a multi-line slot.
    pub prefill: String,
    /// Idle timeout in seconds (0 = none) and the warn-at-half flag.
    pub timeout: u64,
    pub warn: bool,
}

impl Default for ReadSetup {
    fn default() -> Self {
        Self {
            echo: true,
            eol: true,
            min: 0,
            max: 0,
            enter: String::new(),
            cancel: String::new(),
            eraser: ' ',
            enq: false,
            lines: 0,
            line: 0,
            prefill: String::new(),
            timeout: 0,
            warn: true,
        }
    }
}

/// Input decoder state machine.
#[derive(Debug, Default)]
pub struct Decoder {
    /// Unconsumed characters carried to the next pass, FIFO.
    pub typeahead: String,
    /// In-progress buffer, not yet committed.
    pub input: String,
    /// Last committed entry.
    pub entry: String,
    /// How the entry was committed; `None` means more data is needed.
    pub terminator: Option<Key>,
    pub echo: bool,
    eol: bool,
    min: usize,
    max: usize,
    enter: String,
    enq: bool,
    lines: u16,
    line: u16,
}

impl Decoder {
    /// Arm the per-read registers for a new read cycle.
    pub fn arm(&mut self, setup: &ReadSetup) {
        self.echo = setup.echo;
        self.eol = setup.eol;
        self.min = setup.min;
        self.max = setup.max;
        self.enter = setup.enter.clone();
        self.enq = setup.enq;
        self.lines = setup.lines;
        self.line = setup.line;
        self.input = setup.prefill.clone();
        self.entry.clear();
        self.terminator = None;
    }

    /// Reset registers to field-neutral defaults after a cycle.
    pub fn disarm(&mut self) {
        self.echo = true;
        self.eol = true;
        self.min = 0;
        self.max = 0;
        self.enter.clear();
        self.enq = false;
        self.lines = 0;
        self.line = 0;
        self.input.clear();
    }

    /// Drop any unconsumed typeahead.
    pub fn drain(&mut self) {
        self.typeahead.clear();
    }

    /// True when the decoder is collecting a whole line.
    pub fn eol(&self) -> bool {
        self.eol
    }

    /// Consume leftover typeahead plus a fresh chunk, producing at most
    /// one committed terminator. Returns true when an entry committed;
    /// requested side effects are appended to `fx` in order.
    pub fn feed(&mut self, fresh: &str, fx: &mut Vec<Echo>) -> bool {
        let mut fresh = Some(fresh);
        loop {
            let mut k = mem::take(&mut self.typeahead);
            if let Some(f) = fresh.take() {
                k.push_str(f);
            }
            let Some(mut k0) = k.chars().next() else {
                return false;
            };
            self.terminator = None;

            // enquiry result: capture the whole pending chunk verbatim
            if self.enq {
                self.entry = match k.find('\x1B') {
                    Some(i) => k[i..].to_string(),
                    None => k.clone(),
                };
                self.terminator = Some(Key::from_char(k0));
                return true;
            }

            // load a printable run up to, but not including, the max
            // (or the first control character)
            if k.chars().count() > 1 && k0 >= ' ' {
                let cap = if self.max > 0 { self.max } else { k.chars().count() };
                let room = cap.saturating_sub(self.input.chars().count());
                if room > 1 {
                    let mut load: String = k.chars().take(room - 1).collect();
                    if let Some(i) = load.find(|c: char| c < ' ') {
                        load.truncate(i);
                    }
                    if !load.is_empty() {
                        if self.echo {
                            fx.push(Echo::Text(load.clone()));
                        }
                        self.input.push_str(&load);
                        k = k[load.len()..].to_string();
                    }
                    match k.chars().next() {
                        Some(c) => k0 = c,
                        None => continue,
                    }
                }
            }
            self.typeahead = k[k0.len_utf8()..].to_string();

            // ctrl-d or ctrl-z disconnects the session
            if k0 == '\x04' || k0 == '\x1A' {
                fx.push(Echo::Disconnect);
                return false;
            }

            // rubout / delete
            if k0 == '\u{8}' || k0 == '\x7F' {
                if self.eol && !self.input.is_empty() {
                    self.input.pop();
                    fx.push(Echo::Rubout(1));
                } else if self.lines > 0 && self.line > 0 && self.input.is_empty() {
                    self.entry.clear();
                    self.terminator = Some(Key::Up);
                    return true;
                } else {
                    fx.push(Echo::Bell);
                }
                continue;
            }

            // ctrl-u or ctrl-x erases the in-progress buffer
            if k0 == '\x15' || k0 == '\x18' {
                fx.push(Echo::Rubout(self.input.chars().count()));
                self.input.clear();
                continue;
            }

            // any other control character cooks into a terminator
            if k0 < ' ' {
                let mut term = Key::from_char(k0);
                let mut consumed = 1;
                if k0 == '\x1B' {
                    match cook(&k[1..]) {
                        Some((key, len)) => {
                            term = key;
                            consumed = 1 + len;
                        }
                        None => {
                            tracing::debug!(tail = ?&k[1..], "unmapped escape suffix");
                            term = Key::Esc;
                        }
                    }
                }
                self.typeahead = k.chars().skip(consumed).collect();

                if self.input.is_empty() && !self.enter.is_empty() {
                    self.input = self.enter.clone();
                    if self.echo {
                        fx.push(Echo::Text(self.input.clone()));
                    }
                } else if self.input.chars().count() < self.min {
                    fx.push(Echo::Bell);
                    fx.push(Echo::Rubout(self.input.chars().count()));
                    self.input.clear();
                    continue;
                }

                self.entry = mem::take(&mut self.input);
                self.terminator = Some(term);
                return true;
            }

            // line mode: don't exceed the maximum input allowed
            if (self.eol || self.lines > 0) && self.max > 0 {
                let len = self.input.chars().count();
                if len >= self.max {
                    fx.push(Echo::Bell);
                    if self.lines > 0 && self.line + 1 < self.lines {
                        self.entry = self.input.clone();
                        // word-wrap: carry the tail past the last space
                        // into the next line instead of splitting a word
                        if k0 != ' ' {
                            if let Some(i) = self.input.rfind(' ') {
                                if i > 0 {
                                    fx.push(Echo::Rubout(self.input[i..].chars().count()));
                                    self.entry = self.input[..i].to_string();
                                    self.typeahead = format!(
                                        "{}{}{}",
                                        &self.input[i + 1..],
                                        k0,
                                        self.typeahead
                                    );
                                }
                            }
                        }
                        self.input.clear();
                        self.terminator = Some(Key::Enter);
                        return true;
                    }
                    continue;
                }
            }

            // character mode input
            if self.echo {
                fx.push(Echo::Text(k0.to_string()));
            }
            self.input.push(k0);

            // fixed-length entry commits when the size is met
            if !self.eol && self.max > 0 && self.input.chars().count() >= self.max {
                self.entry = mem::take(&mut self.input);
                self.terminator = Some(Key::Char(k0));
                return true;
            }
        }
    }
}
