//! Terminal emulation profiles
//!
//! Each profile selects a byte encoding and a set of glyph tables for
//! line drawing, gradient ramps, and the empty-cell placeholder.

use serde::{Deserialize, Serialize};

/// Supported terminal emulations.
///
/// - `Dumb`: plain ASCII, no styling
/// - `VT`: VT100 with DEC Special Graphics
/// - `PC`: ANSI with the CP437 glyph set
/// - `XT`: modern ANSI with UTF-8 box drawing
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emulation {
    Dumb,
    VT,
    PC,
    #[default]
    XT,
}

/// Byte encoding for the session's source and sink.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Encoding {
    /// One byte per character, low 8 bits of the code point.
    /// CP437 glyphs in the 0x80..0xFF range pass through unchanged.
    Ascii,
    Utf8,
}

impl Emulation {
    /// The encoding this profile requires on both source and sink.
    pub fn encoding(self) -> Encoding {
        match self {
            Emulation::XT => Encoding::Utf8,
            _ => Encoding::Ascii,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Emulation::Dumb => "dumb",
            Emulation::VT => "VT",
            Emulation::PC => "PC",
            Emulation::XT => "XT",
        }
    }

    /// Line-drawing set, 11 symbols in fixed index order:
    /// horizontal, bottom-left, bottom-tee, bottom-right, left-tee,
    /// cross, right-tee, top-left, top-tee, top-right, vertical.
    pub fn draw(self) -> [&'static str; 11] {
        match self {
            Emulation::VT => ["q", "m", "v", "j", "t", "n", "u", "l", "w", "k", "x"],
            Emulation::PC => [
                "\u{C4}", "\u{C0}", "\u{C1}", "\u{D9}", "\u{C3}", "\u{C5}", "\u{B4}",
                "\u{DA}", "\u{C2}", "\u{BF}", "\u{B3}",
            ],
            Emulation::XT => [
                "\u{2500}", "\u{2514}", "\u{2534}", "\u{2518}", "\u{251C}", "\u{253C}",
                "\u{2524}", "\u{250C}", "\u{252C}", "\u{2510}", "\u{2502}",
            ],
            Emulation::Dumb => ["-", "+", "^", "+", ">", "+", "<", "+", "v", "+", "|"],
        }
    }

    /// Gradient ramp, light to dark.
    pub fn lgradient(self) -> &'static str {
        match self {
            Emulation::VT => "\x1B(0\x1B[2ma\x1B[ma\x1B[7m \x1B[1m \x1B[27m\x1B(B",
            Emulation::PC => "\u{B0}\u{B1}\u{B2}\u{DB}",
            Emulation::XT => "\u{2591}\u{2592}\u{2593}\u{2588}",
            Emulation::Dumb => " :: ",
        }
    }

    /// Gradient ramp, dark to light.
    pub fn rgradient(self) -> &'static str {
        match self {
            Emulation::VT => "\x1B(0\x1B[1;7m \x1B[22m \x1B[ma\x1B[2ma\x1B[m\x1B(B",
            Emulation::PC => "\u{DB}\u{B2}\u{B1}\u{B0}",
            Emulation::XT => "\u{2588}\u{2593}\u{2592}\u{2591}",
            Emulation::Dumb => " :: ",
        }
    }

    /// Empty-cell placeholder glyph.
    pub fn empty(self) -> &'static str {
        match self {
            Emulation::VT => "\x1B(0\x7E\x1B(B",
            Emulation::PC => "\u{FA}",
            Emulation::XT => "\u{B7}",
            Emulation::Dumb => ".",
        }
    }
}

/// Encode rendered text for the sink.
pub fn encode(text: &str, encoding: Encoding) -> Vec<u8> {
    match encoding {
        Encoding::Utf8 => text.as_bytes().to_vec(),
        Encoding::Ascii => text.chars().map(|c| (c as u32 & 0xFF) as u8).collect(),
    }
}
