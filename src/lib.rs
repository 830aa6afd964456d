//! ttyform - a form-driven terminal session engine
//!
//! Drives character-mode interactive sessions over a raw byte stream:
//! styled output with minimal escape-sequence overhead across four
//! emulation profiles, raw keystrokes cooked into logical key tokens,
//! and a field-focus form engine that prompts, validates, times out and
//! dispatches per-field actions.
//!
//! ```no_run
//! use ttyform::{Config, Engine, Field, Flow, Form, Session};
//! use ttyform::stream::{StdioStream, SystemClock};
//!
//! # fn main() -> Result<(), ttyform::stream::StreamError> {
//! let config = Config::load();
//! let mut session = Session::new(
//!     Box::new(StdioStream::new()?),
//!     Box::new(SystemClock),
//!     &config,
//! );
//!
//! let mut form = Form::new("hello");
//! form.insert(
//!     "name",
//!     Field::new("What's your name? ").min(1).on_done(
//!         |session: &mut Session, _: &mut Form| {
//!             let name = session.entry().to_string();
//!             session.outln(&[format!("\nHello, {name}!").into()]);
//!             Flow::Quit
//!         },
//!     ),
//! );
//! Engine::new(form).run(&mut session, "name");
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod form;
pub mod stream;

pub use crate::config::{Config, ConfigError};
pub use crate::core::attr::{Directive, Renderer, Segment};
pub use crate::core::decoder::{Decoder, Echo, Key, ReadSetup};
pub use crate::core::emulation::{Emulation, Encoding};
pub use crate::core::session::Session;
pub use crate::form::{Engine, Field, FieldAction, FieldId, Flow, Form};

/// Attribute code constants (`RESET`, `BRIGHT`, colors, ..) for building
/// directive sequences.
pub mod attrs {
    pub use crate::core::attr::*;
}
