//! Core session engine components.
//!
//! This module contains the low-level terminal session logic:
//!
//! - **emulation**: emulation profiles, encodings and glyph tables
//! - **attr**: attribute state and minimal-diff escape rendering
//! - **decoder**: raw keystrokes cooked into logical key tokens
//! - **session**: the session context and its timed read loop
//!
//! # Architecture
//!
//! ```text
//! Session
//! ├── ByteStream + Clock (transport and deadlines)
//! ├── Renderer (style registers + SGR accumulator)
//! └── Decoder (typeahead, input buffer, escape cookbook)
//! ```

pub mod attr;
pub mod decoder;
pub mod emulation;
pub mod session;
