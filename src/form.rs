//! Field-focus form engine
//!
//! A `Form` maps field identifiers to `Field` prompt specifications; the
//! `Engine` walks it one focus at a time, rendering the prompt, collecting
//! validated input through the session read loop, and dispatching the
//! field's action, which returns the next `Flow` step.

use std::collections::HashMap;
use std::fmt;
use std::mem;

use regex::Regex;

use crate::core::attr::{Directive, BRIGHT, CLL, CYAN, FAINT, NORMAL, RESET, REVERSE, WHITE};
use crate::core::decoder::{Key, ReadSetup};
use crate::core::session::Session;

const DEFAULT_PROMPT_STYLE: &[u16] = &[CYAN];
const DEFAULT_INPUT_STYLE: &[u16] = &[BRIGHT, WHITE];
const PAUSE_PROMPT: &str = "-pause-";

/// Field identifier: forms address fields by name or by index.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum FieldId {
    Name(String),
    Index(u32),
}

impl From<&str> for FieldId {
    fn from(s: &str) -> Self {
        FieldId::Name(s.to_string())
    }
}

impl From<String> for FieldId {
    fn from(s: String) -> Self {
        FieldId::Name(s)
    }
}

impl From<u32> for FieldId {
    fn from(n: u32) -> Self {
        FieldId::Index(n)
    }
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldId::Name(s) => write!(f, "{s}"),
            FieldId::Index(n) => write!(f, "{n}"),
        }
    }
}

/// Next step returned by a field action.
pub enum Flow {
    /// Move focus to another field of the active form.
    Focus(FieldId),
    /// Re-prompt the field that just completed.
    Refocus,
    /// Swap in a one-shot form, saving the active form and focus.
    Push(Form, FieldId),
    /// Restore the saved form and focus the given field in it.
    Pop(FieldId),
    /// Leave the engine loop.
    Quit,
}

/// Completion callback of a field.
pub trait FieldAction {
    fn done(&mut self, session: &mut Session, form: &mut Form) -> Flow;
}

impl<F> FieldAction for F
where
    F: FnMut(&mut Session, &mut Form) -> Flow,
{
    fn done(&mut self, session: &mut Session, form: &mut Form) -> Flow {
        self(session, form)
    }
}

/// A prompt specification.
pub struct Field {
    prompt: String,
    row: u16,
    col: u16,
    prompt_style: Vec<u16>,
    input_style: Vec<u16>,
    echo: bool,
    eol: bool,
    min: usize,
    max: usize,
    enter: String,
    cancel: String,
    eraser: char,
    pattern: Option<Regex>,
    enq: bool,
    pause: bool,
    lines: u16,
    timeout: Option<u64>,
    warn: Option<bool>,
    action: Option<Box<dyn FieldAction>>,
}

impl Field {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            row: 0,
            col: 0,
            prompt_style: Vec::new(),
            input_style: Vec::new(),
            echo: true,
            eol: true,
            min: 0,
            max: 0,
            enter: String::new(),
            cancel: String::new(),
            eraser: ' ',
            pattern: None,
            enq: false,
            pause: false,
            lines: 0,
            timeout: None,
            warn: None,
            action: None,
        }
    }

    /// Place the prompt at a fixed 1-based position (formatted mode).
    pub fn at(mut self, row: u16, col: u16) -> Self {
        self.row = row;
        self.col = col;
        self
    }

    pub fn prompt_style(mut self, attrs: &[u16]) -> Self {
        self.prompt_style = attrs.to_vec();
        self
    }

    pub fn input_style(mut self, attrs: &[u16]) -> Self {
        self.input_style = attrs.to_vec();
        self
    }

    pub fn echo(mut self, on: bool) -> Self {
        self.echo = on;
        self
    }

    /// Line mode (terminated by Enter) vs fixed-length character mode.
    pub fn eol(mut self, on: bool) -> Self {
        self.eol = on;
        self
    }

    pub fn min(mut self, n: usize) -> Self {
        self.min = n;
        self
    }

    pub fn max(mut self, n: usize) -> Self {
        self.max = n;
        self
    }

    /// Substituted when Enter is pressed on an empty buffer.
    pub fn enter(mut self, default: impl Into<String>) -> Self {
        self.enter = default.into();
        self
    }

    /// Substituted on escape or timeout; empty keeps cancellation fatal.
    pub fn cancel(mut self, default: impl Into<String>) -> Self {
        self.cancel = default.into();
        self
    }

    pub fn eraser(mut self, c: char) -> Self {
        self.eraser = c;
        self
    }

    /// Entries must match this pattern or the field re-prompts.
    pub fn matches(mut self, pattern: Regex) -> Self {
        self.pattern = Some(pattern);
        self
    }

    /// Send the prompt as a raw capability probe and capture the reply.
    pub fn enq(mut self, on: bool) -> Self {
        self.enq = on;
        self
    }

    /// Any-key-to-continue field.
    pub fn pause(mut self, on: bool) -> Self {
        self.pause = on;
        self
    }

    /// Multi-line entry with this many line slots.
    pub fn lines(mut self, n: u16) -> Self {
        self.lines = n;
        self
    }

    pub fn timeout(mut self, seconds: u64) -> Self {
        self.timeout = Some(seconds);
        self
    }

    pub fn warn(mut self, on: bool) -> Self {
        self.warn = Some(on);
        self
    }

    pub fn on_done(mut self, action: impl FieldAction + 'static) -> Self {
        self.action = Some(Box::new(action));
        self
    }

    pub fn prompt_text(&self) -> &str {
        &self.prompt
    }

    pub fn set_prompt(&mut self, prompt: impl Into<String>) {
        self.prompt = prompt.into();
    }
}

/// Unique-key field table.
pub struct Form {
    name: String,
    fields: HashMap<FieldId, Field>,
}

impl Form {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn insert(&mut self, id: impl Into<FieldId>, field: Field) {
        self.fields.insert(id.into(), field);
    }

    pub fn contains(&self, id: &FieldId) -> bool {
        self.fields.contains_key(id)
    }

    pub fn get(&self, id: &FieldId) -> Option<&Field> {
        self.fields.get(id)
    }

    pub fn get_mut(&mut self, id: &FieldId) -> Option<&mut Field> {
        self.fields.get_mut(id)
    }

    /// One-shot "press any key" form meant for `Flow::Push`; its single
    /// field pops back to `next` in the saved form.
    pub fn pause_gate(next: impl Into<FieldId>, timeout: u64) -> Form {
        let next = next.into();
        let mut form = Form::new("pause");
        form.insert(
            0u32,
            Field::new("")
                .pause(true)
                .timeout(timeout)
                .on_done(move |_: &mut Session, _: &mut Form| Flow::Pop(next.clone())),
        );
        form
    }
}

/// Focus-driven prompt/collect/validate/dispatch loop.
pub struct Engine {
    form: Form,
    focus: Option<FieldId>,
    saved: Option<(Form, Option<FieldId>)>,
}

impl Engine {
    pub fn new(form: Form) -> Self {
        Self {
            form,
            focus: None,
            saved: None,
        }
    }

    pub fn form(&self) -> &Form {
        &self.form
    }

    pub fn form_mut(&mut self) -> &mut Form {
        &mut self.form
    }

    /// Drive the form from `start` until an action quits or the session
    /// is torn down.
    pub fn run(&mut self, session: &mut Session, start: impl Into<FieldId>) {
        let mut pending = Some(start.into());
        while let Some(id) = pending.take() {
            if session.hung_up() {
                break;
            }

            if !self.form.contains(&id) {
                session.beep();
                session.outln(&[format!(
                    "?ERROR in {} :: field '{}' undefined",
                    self.form.name(),
                    id
                )
                .into()]);
                match self.focus.clone() {
                    Some(prev) => {
                        pending = Some(prev);
                        continue;
                    }
                    None => break,
                }
            }
            self.focus = Some(id.clone());

            if !self.prompt_and_read(session, &id) {
                if session.hung_up() || !session.carrier() {
                    break;
                }
                // validation miss: re-enter the same field
                pending = Some(id);
                continue;
            }
            if session.hung_up() {
                break;
            }

            // take the action out so it may freely mutate the form,
            // then put it back unless the field was replaced
            let mut action = self.form.get_mut(&id).and_then(|f| f.action.take());
            let flow = match action.as_mut() {
                Some(action) => action.done(session, &mut self.form),
                None => Flow::Quit,
            };
            if let Some(action) = action {
                if let Some(field) = self.form.get_mut(&id) {
                    if field.action.is_none() {
                        field.action = Some(action);
                    }
                }
            }

            pending = match flow {
                Flow::Focus(next) => Some(next),
                Flow::Refocus => Some(id),
                Flow::Push(form, next) => {
                    self.saved = Some((mem::replace(&mut self.form, form), self.focus.take()));
                    Some(next)
                }
                Flow::Pop(next) => {
                    if let Some((form, focus)) = self.saved.take() {
                        self.form = form;
                        self.focus = focus;
                    }
                    Some(next)
                }
                Flow::Quit => None,
            };
        }
    }

    /// Prompt the field and run its read cycle(s). Returns false when the
    /// entry failed validation (or the session died mid-read) and the
    /// field must not dispatch.
    fn prompt_and_read(&self, session: &mut Session, id: &FieldId) -> bool {
        let Some(field) = self.form.get(id) else {
            return false;
        };

        // capability probe: raw prompt, short fixed deadline, reply
        // captured verbatim
        if field.enq {
            session.out(&[field.prompt.clone().into()]);
            session.read_cycle(ReadSetup {
                enq: true,
                echo: false,
                eol: false,
                enter: field.enter.clone(),
                cancel: field.cancel.clone(),
                timeout: 5,
                warn: false,
                ..ReadSetup::default()
            });
            return session.terminator().is_some();
        }

        session.out(&[RESET.into()]);
        if field.row > 0 && field.col > 0 {
            session.plot(field.row, field.col);
        } else {
            session.out(&["\n".into()]);
        }

        let timeout = field.timeout.unwrap_or_else(|| session.default_timeout());
        let warn = field.warn.unwrap_or_else(|| session.default_warn());

        if field.pause {
            let prompt = if field.prompt.is_empty() {
                PAUSE_PROMPT.to_string()
            } else {
                field.prompt.clone()
            };
            session.out(&[REVERSE.into(), prompt.clone().into(), RESET.into()]);
            session.drain();
            session.read_cycle(ReadSetup {
                echo: false,
                eol: false,
                max: 1,
                enter: " ".into(),
                cancel: " ".into(),
                eraser: field.eraser,
                timeout,
                warn,
                ..ReadSetup::default()
            });
            session.rubout_erase(prompt.chars().count());
            return session.terminator().is_some();
        }

        let lines = if field.lines > 1 { field.lines } else { 0 };
        let max = if field.max > 0 {
            field.max
        } else if lines > 0 {
            72
        } else if field.eol {
            0
        } else {
            1
        };
        // a bare Enter in character mode must never be ambiguous
        let enter = if !field.eol && field.enter.is_empty() {
            " ".to_string()
        } else {
            field.enter.clone()
        };

        let prompt_style = if field.prompt_style.is_empty() {
            DEFAULT_PROMPT_STYLE
        } else {
            &field.prompt_style
        };
        let input_style = if field.input_style.is_empty() {
            DEFAULT_INPUT_STYLE
        } else {
            &field.input_style
        };

        let mut parts: Vec<Directive> = Vec::new();
        parts.extend(prompt_style.iter().map(|&a| Directive::Attr(a)));
        parts.push(field.prompt.clone().into());
        parts.extend(input_style.iter().map(|&a| Directive::Attr(a)));
        session.out(&parts);

        // formatted input slot: pre-paint with the eraser, re-home
        if field.row > 0 && field.col > 0 && field.echo && max > 0 {
            session.out(&[
                field.eraser.to_string().repeat(max).into(),
                "\u{8}".repeat(max).into(),
            ]);
        }

        if lines > 0 {
            return self.collect_lines(session, field, input_style, lines, max, timeout, warn);
        }

        session.read_cycle(ReadSetup {
            echo: field.echo,
            eol: field.eol,
            min: field.min,
            max,
            enter,
            cancel: field.cancel.clone(),
            eraser: field.eraser,
            timeout,
            warn,
            ..ReadSetup::default()
        });
        if session.terminator().is_none() {
            return false;
        }

        if let Some(pattern) = &field.pattern {
            if !pattern.is_match(session.entry()) {
                session.beep();
                session.drain();
                return false;
            }
        }
        true
    }

    /// Multi-line collection: one read cycle per line slot, `[UP]` moves
    /// back to re-edit an earlier slot, an empty line or the last slot
    /// ends collection.
    #[allow(clippy::too_many_arguments)]
    fn collect_lines(
        &self,
        session: &mut Session,
        field: &Field,
        input_style: &[u16],
        lines: u16,
        max: usize,
        timeout: u64,
        warn: bool,
    ) -> bool {
        let mut slots: Vec<String> = vec![String::new(); lines as usize];
        let mut line: u16 = 0;
        session.out(&["\n".into()]);
        loop {
            let prefill = slots[line as usize].clone();
            let mut parts: Vec<Directive> = vec![
                BRIGHT.into(),
                format!("{}", line + 1).into(),
                NORMAL.into(),
                "/".into(),
                format!("{lines}").into(),
                FAINT.into(),
                "] ".into(),
                NORMAL.into(),
            ];
            // each read cycle ends with a reset, so the input style has
            // to be re-armed per line
            parts.extend(input_style.iter().map(|&a| Directive::Attr(a)));
            session.out(&parts);
            if !prefill.is_empty() {
                session.out(&[prefill.clone().into(), CLL.into()]);
            }
            session.read_cycle(ReadSetup {
                echo: field.echo,
                eol: true,
                min: 0,
                max,
                cancel: field.cancel.clone(),
                eraser: field.eraser,
                lines,
                line,
                prefill,
                timeout,
                warn,
                ..ReadSetup::default()
            });
            let Some(terminator) = session.terminator().cloned() else {
                return false;
            };

            if terminator == Key::Up {
                // keep whatever was typed on this line before moving up
                slots[line as usize] = session.entry().to_string();
                if line > 0 {
                    line -= 1;
                    session.out(&["\x1B[A\r".into()]);
                } else {
                    session.out(&["\r".into()]);
                }
                continue;
            }

            let entry = session.entry().to_string();
            slots[line as usize] = entry.clone();
            session.out(&["\n".into()]);
            line += 1;
            if entry.is_empty() || line >= lines {
                break;
            }
        }

        // blank out unused trailing slots, on screen and in the buffer
        for slot in slots.iter_mut().skip(line as usize) {
            if !slot.is_empty() {
                slot.clear();
                session.out(&[CLL.into(), "\n".into()]);
            }
        }

        let mut joined = slots.join("\n");
        while joined.ends_with('\n') {
            joined.pop();
        }
        session.set_entry(joined);
        true
    }
}
