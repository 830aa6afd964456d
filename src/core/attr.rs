//! Attribute rendering
//!
//! Tracks the current text-style state and emits only the escape-sequence
//! deltas needed to reach the requested style. SGR parameters are coalesced
//! into a single `ESC [ p1;p2;..;pn m` sequence that opens lazily on the
//! first parameter and closes before the next literal.

use std::borrow::Cow;
use std::mem;

use bitflags::bitflags;
use unicode_width::UnicodeWidthChar;

use super::emulation::Emulation;

// SGR attribute codes
// https://en.wikipedia.org/wiki/ANSI_escape_code#SGR
pub const RESET: u16 = 0; // all attributes off, default color
pub const BRIGHT: u16 = 1;
pub const FAINT: u16 = 2;
pub const ULINE: u16 = 4;
pub const BLINK: u16 = 5; // not widely supported, unfortunately
pub const REVERSE: u16 = 7;
pub const OFF: u16 = 20; // force reset
pub const NOBRIGHT: u16 = 21; // not widely supported: cancels bold only
pub const NORMAL: u16 = 22; // cancels bold and faint
pub const NOULINE: u16 = 24;
pub const NOBLINK: u16 = 25;
pub const NOREVERSE: u16 = 27;

// foreground colors
pub const BLACK: u16 = 30;
pub const RED: u16 = 31;
pub const GREEN: u16 = 32;
pub const YELLOW: u16 = 33;
pub const BLUE: u16 = 34;
pub const MAGENTA: u16 = 35;
pub const CYAN: u16 = 36;
pub const WHITE: u16 = 37;

// background colors
pub const BG_BLACK: u16 = 40;
pub const BG_RED: u16 = 41;
pub const BG_GREEN: u16 = 42;
pub const BG_YELLOW: u16 = 43;
pub const BG_BLUE: u16 = 44;
pub const BG_MAGENTA: u16 = 45;
pub const BG_CYAN: u16 = 46;
pub const BG_WHITE: u16 = 47;

// brighter foreground colors
pub const LT_BLACK: u16 = 90;
pub const LT_RED: u16 = 91;
pub const LT_GREEN: u16 = 92;
pub const LT_YELLOW: u16 = 93;
pub const LT_BLUE: u16 = 94;
pub const LT_MAGENTA: u16 = 95;
pub const LT_CYAN: u16 = 96;
pub const LT_WHITE: u16 = 97;

// brighter background colors
pub const BG_LT_BLACK: u16 = 100;
pub const BG_LT_RED: u16 = 101;
pub const BG_LT_GREEN: u16 = 102;
pub const BG_LT_YELLOW: u16 = 103;
pub const BG_LT_BLUE: u16 = 104;
pub const BG_LT_MAGENTA: u16 = 105;
pub const BG_LT_CYAN: u16 = 106;
pub const BG_LT_WHITE: u16 = 107;

// cursor operations
pub const CLL: u16 = 254; // clear to end of line
pub const CLEAR: u16 = 255; // clear screen and home

/// A single output directive.
///
/// Literal text is appended verbatim with cursor tracking, an attribute
/// code updates the style state, and a pacing directive flushes pending
/// output and delays for the given number of milliseconds.
#[derive(Clone, Debug)]
pub enum Directive {
    Text(Cow<'static, str>),
    Attr(u16),
    Pause(u64),
}

impl From<&'static str> for Directive {
    fn from(s: &'static str) -> Self {
        Directive::Text(Cow::Borrowed(s))
    }
}

impl From<String> for Directive {
    fn from(s: String) -> Self {
        Directive::Text(Cow::Owned(s))
    }
}

impl From<u16> for Directive {
    fn from(code: u16) -> Self {
        Directive::Attr(code)
    }
}

/// A flushed run of rendered text, delayed by `pause_ms` after the write.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Segment {
    pub text: String,
    pub pause_ms: u64,
}

bitflags! {
    /// Decoration flags of the attribute state.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct Style: u8 {
        const BOLD    = 0b00001;
        const DIM     = 0b00010;
        const ULINE   = 0b00100;
        const BLINK   = 0b01000;
        const REVERSE = 0b10000;
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct Snapshot {
    color: u16,
    style: Style,
    row: u16,
    col: u16,
}

/// Attribute/emulation renderer.
///
/// Pure state plus encoder: no I/O happens here. `render` returns the
/// text segments to write; the session owns the sink and the pacing.
pub struct Renderer {
    emulation: Emulation,
    pub row: u16,
    pub col: u16,
    color: u16,
    style: Style,
    default_color: u16,
    sgr: String,
    buf: String,
    saved: Snapshot,
}

impl Renderer {
    pub fn new(emulation: Emulation, default_color: u16) -> Self {
        Self {
            emulation,
            row: 0,
            col: 0,
            color: 0,
            style: Style::empty(),
            default_color,
            sgr: String::new(),
            buf: String::new(),
            saved: Snapshot::default(),
        }
    }

    pub fn emulation(&self) -> Emulation {
        self.emulation
    }

    pub fn set_emulation(&mut self, emulation: Emulation) {
        self.emulation = emulation;
    }

    pub fn color(&self) -> u16 {
        self.color
    }

    pub fn style(&self) -> Style {
        self.style
    }

    /// Render a directive sequence into flushable segments.
    pub fn render(&mut self, parts: &[Directive]) -> Vec<Segment> {
        let mut segments = Vec::new();
        for part in parts {
            match part {
                Directive::Text(s) => self.text(s),
                Directive::Attr(code) => self.apply(*code),
                Directive::Pause(ms) => {
                    self.close_sgr();
                    segments.push(Segment {
                        text: mem::take(&mut self.buf),
                        pause_ms: *ms,
                    });
                }
            }
        }
        self.close_sgr();
        if !self.buf.is_empty() {
            segments.push(Segment {
                text: mem::take(&mut self.buf),
                pause_ms: 0,
            });
        }
        segments
    }

    /// Snapshot the attribute state; returns the cursor-save escape.
    pub fn save(&mut self) -> &'static str {
        self.saved = Snapshot {
            color: self.color,
            style: self.style,
            row: self.row,
            col: self.col,
        };
        if self.emulation == Emulation::VT {
            "\x1B7"
        } else {
            "\x1B[s"
        }
    }

    /// Restore the last snapshot; returns the cursor-restore escape.
    pub fn restore(&mut self) -> &'static str {
        self.color = self.saved.color;
        self.style = self.saved.style;
        self.row = self.saved.row;
        self.col = self.saved.col;
        if self.emulation == Emulation::VT {
            "\x1B8"
        } else {
            "\x1B[u"
        }
    }

    pub fn set_position(&mut self, row: u16, col: u16) {
        self.row = row;
        self.col = col;
    }

    fn apply(&mut self, code: u16) {
        if self.emulation == Emulation::Dumb {
            // styling is suppressed entirely; clear degrades to form feed
            if code == CLEAR {
                self.emit("\x0C");
                self.row = 1;
                self.col = 1;
            }
            return;
        }

        match code {
            CLL => self.emit("\x1B[K"),
            CLEAR => {
                self.emit("\x1B[H\x1B[J");
                self.row = 1;
                self.col = 1;
            }
            RESET | OFF => {
                if code == OFF {
                    self.color = self.default_color;
                }
                if self.color != 0 || !self.style.is_empty() {
                    self.sgr.clear();
                    self.emit("\x1B[m");
                }
                self.color = 0;
                self.style = Style::empty();
            }
            BRIGHT => {
                // bright and faint intensity are mutually exclusive
                if self.style.contains(Style::DIM) {
                    self.push_sgr(NORMAL);
                    self.style.remove(Style::BOLD | Style::DIM);
                }
                if !self.style.contains(Style::BOLD) {
                    self.push_sgr(BRIGHT);
                    if self.color == 0 {
                        self.color = self.default_color;
                        self.push_sgr(self.color);
                    }
                }
                self.style.insert(Style::BOLD);
            }
            FAINT => {
                if self.style.contains(Style::BOLD) {
                    self.push_sgr(NORMAL);
                    self.style.remove(Style::BOLD | Style::DIM);
                }
                if !self.style.contains(Style::DIM) {
                    self.push_sgr(FAINT);
                }
                self.style.insert(Style::DIM);
            }
            NOBRIGHT => {
                if self.style.contains(Style::BOLD) {
                    self.push_sgr(NOBRIGHT);
                }
                self.style.remove(Style::BOLD);
            }
            NORMAL => {
                if self.style.intersects(Style::BOLD | Style::DIM) {
                    self.push_sgr(NORMAL);
                    self.style.remove(Style::BOLD | Style::DIM);
                }
            }
            ULINE => {
                if !self.style.contains(Style::ULINE) {
                    self.push_sgr(ULINE);
                }
                self.style.insert(Style::ULINE);
            }
            NOULINE => {
                if self.style.contains(Style::ULINE) {
                    self.push_sgr(NOULINE);
                }
                self.style.remove(Style::ULINE);
            }
            BLINK => {
                if !self.style.contains(Style::BLINK) {
                    self.push_sgr(BLINK);
                }
                self.style.insert(Style::BLINK);
            }
            NOBLINK => {
                if self.style.contains(Style::BLINK) {
                    self.push_sgr(NOBLINK);
                }
                self.style.remove(Style::BLINK);
            }
            REVERSE => {
                if !self.style.contains(Style::REVERSE) {
                    self.push_sgr(REVERSE);
                }
                self.style.insert(Style::REVERSE);
            }
            NOREVERSE => {
                if self.style.contains(Style::REVERSE) {
                    self.push_sgr(NOREVERSE);
                }
                self.style.remove(Style::REVERSE);
            }
            _ => {
                if code == self.color {
                    return;
                }
                self.color = code;
                let fg = (BLACK..=WHITE).contains(&code) || (LT_BLACK..=LT_WHITE).contains(&code);
                let bg =
                    (BG_BLACK..=BG_WHITE).contains(&code) || (BG_LT_BLACK..=BG_LT_WHITE).contains(&code);
                if fg && self.emulation != Emulation::VT {
                    self.push_sgr(code);
                }
                if bg {
                    if self.emulation != Emulation::VT {
                        self.push_sgr(code);
                    } else {
                        // VT100 has no background SGR: synthesize with
                        // reverse video, keep the color for bookkeeping
                        if !self.style.contains(Style::REVERSE) {
                            self.push_sgr(REVERSE);
                        }
                        self.style.insert(Style::REVERSE);
                    }
                }
            }
        }
    }

    /// Append a literal, advancing the cursor registers.
    fn text(&mut self, s: &str) {
        self.close_sgr();
        self.buf.push_str(s);
        for c in s.chars() {
            match c {
                '\n' => {
                    self.row = self.row.saturating_add(1);
                    self.col = 1;
                }
                '\r' => self.col = 1,
                '\u{8}' => self.col = self.col.saturating_sub(1),
                _ => self.col = self.col.saturating_add(c.width().unwrap_or(0) as u16),
            }
        }
    }

    /// Append an escape sequence without cursor tracking.
    fn emit(&mut self, s: &str) {
        self.close_sgr();
        self.buf.push_str(s);
    }

    fn push_sgr(&mut self, param: u16) {
        if self.sgr.is_empty() {
            self.sgr.push_str("\x1B[");
        } else {
            self.sgr.push(';');
        }
        self.sgr.push_str(&param.to_string());
    }

    fn close_sgr(&mut self) {
        if !self.sgr.is_empty() {
            self.buf.push_str(&self.sgr);
            self.buf.push('m');
            self.sgr.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat(segments: &[Segment]) -> String {
        segments.iter().map(|s| s.text.as_str()).collect()
    }

    #[test]
    fn bright_twice_emits_once() {
        let mut r = Renderer::new(Emulation::XT, WHITE);
        let out = r.render(&[BRIGHT.into(), BRIGHT.into(), "x".into()]);
        // first bright also installs the default color
        assert_eq!(flat(&out), "\x1B[1;37mx");
    }

    #[test]
    fn bright_and_faint_are_exclusive() {
        let mut r = Renderer::new(Emulation::XT, WHITE);
        let out = r.render(&[BRIGHT.into(), FAINT.into()]);
        assert_eq!(flat(&out), "\x1B[1;37;22;2m");
        assert_eq!(r.style(), Style::DIM);
    }

    #[test]
    fn repeated_color_is_suppressed() {
        let mut r = Renderer::new(Emulation::XT, WHITE);
        let out = r.render(&[RED.into(), RED.into(), "x".into()]);
        assert_eq!(flat(&out), "\x1B[31mx");
    }

    #[test]
    fn reset_is_a_noop_when_nothing_is_active() {
        let mut r = Renderer::new(Emulation::XT, WHITE);
        assert!(r.render(&[RESET.into()]).is_empty());
        r.render(&[BRIGHT.into()]);
        assert_eq!(flat(&r.render(&[RESET.into()])), "\x1B[m");
    }

    #[test]
    fn off_forces_a_reset() {
        let mut r = Renderer::new(Emulation::XT, WHITE);
        assert_eq!(flat(&r.render(&[OFF.into()])), "\x1B[m");
        assert_eq!(r.color(), 0);
    }

    #[test]
    fn vt_background_synthesizes_reverse() {
        let mut r = Renderer::new(Emulation::VT, WHITE);
        let out = r.render(&[BG_RED.into(), "x".into()]);
        assert_eq!(flat(&out), "\x1B[7mx");
        assert!(r.style().contains(Style::REVERSE));
        assert_eq!(r.color(), BG_RED);
    }

    #[test]
    fn vt_foreground_is_recorded_but_not_emitted() {
        let mut r = Renderer::new(Emulation::VT, WHITE);
        let out = r.render(&[RED.into(), "x".into()]);
        assert_eq!(flat(&out), "x");
        assert_eq!(r.color(), RED);
    }

    #[test]
    fn dumb_suppresses_styling() {
        let mut r = Renderer::new(Emulation::Dumb, WHITE);
        let out = r.render(&[BRIGHT.into(), RED.into(), "hi".into(), CLEAR.into()]);
        assert_eq!(flat(&out), "hi\x0C");
        assert_eq!((r.row, r.col), (1, 1));
    }

    #[test]
    fn pacing_splits_segments() {
        let mut r = Renderer::new(Emulation::XT, WHITE);
        let out = r.render(&["a".into(), Directive::Pause(100), "b".into()]);
        assert_eq!(
            out,
            vec![
                Segment { text: "a".into(), pause_ms: 100 },
                Segment { text: "b".into(), pause_ms: 0 },
            ]
        );
    }

    #[test]
    fn cursor_tracks_newlines_and_backspace() {
        let mut r = Renderer::new(Emulation::XT, WHITE);
        r.set_position(1, 1);
        r.render(&["ab\ncd".into()]);
        assert_eq!((r.row, r.col), (2, 3));
        r.render(&["\u{8}".into()]);
        assert_eq!(r.col, 2);
    }

    #[test]
    fn clear_homes_the_cursor() {
        let mut r = Renderer::new(Emulation::XT, WHITE);
        r.set_position(10, 20);
        r.render(&[CLEAR.into()]);
        assert_eq!((r.row, r.col), (1, 1));
    }

    #[test]
    fn save_restore_round_trip() {
        let mut r = Renderer::new(Emulation::XT, WHITE);
        r.render(&[BRIGHT.into()]);
        r.set_position(3, 7);
        assert_eq!(r.save(), "\x1B[s");
        r.render(&[RESET.into(), "move".into()]);
        assert_eq!(r.restore(), "\x1B[u");
        assert_eq!((r.row, r.col), (3, 7));
        assert!(r.style().contains(Style::BOLD));

        let mut vt = Renderer::new(Emulation::VT, WHITE);
        assert_eq!(vt.save(), "\x1B7");
        assert_eq!(vt.restore(), "\x1B8");
    }
}
