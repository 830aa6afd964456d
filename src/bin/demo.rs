//! ttyform demo - an interactive tour of the session engine
//!
//! Paints a styled banner, probes the terminal with a device-status
//! query, shows the glyph tables of every emulation profile, inspects
//! cooked keys, then runs a small username/password form. Drop the
//! session with Ctrl-D or Ctrl-Z at any prompt.

use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use ttyform::attrs::{
    BLACK, BLINK, BLUE, BRIGHT, CYAN, FAINT, GREEN, MAGENTA, NOBLINK, NOREVERSE, NORMAL, RED,
    RESET, REVERSE,
};
use ttyform::stream::{StdioStream, SystemClock};
use ttyform::{Config, Directive, Emulation, Engine, Field, Flow, Form, Key, Session};

fn main() -> Result<()> {
    init_logging();

    let mut config = Config::load();
    config.default_timeout = 20;
    config.modem = true;
    config.session_allowed = 120;

    let mut session = Session::new(
        Box::new(StdioStream::new()?),
        Box::new(SystemClock),
        &config,
    );
    session.on_drop(|reason| {
        info!(reason, "session dropped");
    });

    banner(&mut session);

    let mut form = Form::new("demo");
    form.insert(
        "enq",
        Field::new("\x1B[5n")
            .enq(true)
            .cancel("\x05")
            .on_done(enq_done),
    );
    form.insert(
        "cook",
        Field::new("")
            .echo(false)
            .eol(false)
            .enter("DEFAULT")
            .cancel("CANCEL")
            .timeout(20)
            .on_done(cook_done),
    );
    form.insert(
        "username",
        Field::new("Username: ").min(3).max(10).on_done(login),
    );
    form.insert(
        "password",
        Field::new("password: ")
            .echo(false)
            .min(4)
            .timeout(15)
            .on_done(password),
    );

    session.out(&["Request terminal device status ".into()]);
    Engine::new(form).run(&mut session, "enq");

    if !session.hung_up() {
        session.hangup();
    }
    Ok(())
}

fn banner(session: &mut Session) {
    session.outln(&[]);
    session.outln(&[
        BLACK.into(),
        BRIGHT.into(),
        "demo".into(),
        RESET.into(),
        " running on ".into(),
        GREEN.into(),
        "Rust".into(),
        CYAN.into(),
        FAINT.into(),
        " (".into(),
        NORMAL.into(),
        std::env::consts::OS.into(),
        FAINT.into(),
        ")".into(),
    ]);
    session.outln(&[
        RED.into(),
        env!("CARGO_PKG_NAME").into(),
        format!(" v{}", env!("CARGO_PKG_VERSION")).into(),
        RESET.into(),
        format!(" - {}", env!("CARGO_PKG_DESCRIPTION")).into(),
    ]);
    session.outln(&[]);
    session.outln(&["Testing ttyform outputs:".into()]);
    session.outln(&[]);

    let lgradient = session.lgradient();
    let rgradient = session.rgradient();
    session.outln(&[
        MAGENTA.into(),
        lgradient.into(),
        REVERSE.into(),
        "BANNER".into(),
        NOREVERSE.into(),
        rgradient.into(),
    ]);
    session.out(&[
        RED.into(),
        "R".into(),
        Directive::Pause(200),
        GREEN.into(),
        "G".into(),
        Directive::Pause(200),
        BLUE.into(),
        "B".into(),
        Directive::Pause(200),
        RESET.into(),
        " - ".into(),
    ]);
    session.outln(&[
        BRIGHT.into(),
        "bold ".into(),
        Directive::Pause(200),
        NORMAL.into(),
        "normal ".into(),
        Directive::Pause(200),
        BLINK.into(),
        "flash ".into(),
        NOBLINK.into(),
        Directive::Pause(200),
        FAINT.into(),
        "dim".into(),
        Directive::Pause(200),
    ]);
}

fn enq_done(session: &mut Session, _form: &mut Form) -> Flow {
    let codes: Vec<u32> = session.entry().chars().map(|c| c as u32).collect();
    session.outln(&[format!("ENQ response = {codes:?}").into()]);

    for emulation in [Emulation::PC, Emulation::VT, Emulation::Dumb, Emulation::XT] {
        session.set_emulation(emulation);
        let line = format!(
            "\n{}: {} {}",
            emulation.as_str(),
            session.empty_cell(),
            session.draw().join(" ")
        );
        session.outln(&[line.into()]);
    }

    session.outln(&[]);
    session.outln(&["Press any key including function and control keys.".into()]);
    session.outln(&["Ctrl-D (soft) or Ctrl-Z (hard) disconnect, anytime".into()]);
    session.outln(&["RETURN (\"DEFAULT\") or ESCape (\"CANCEL\") when done.".into()]);
    Flow::Push(Form::pause_gate("cook", 5), 0u32.into())
}

fn cook_done(session: &mut Session, _form: &mut Form) -> Flow {
    let terminator = session.terminator().cloned();
    let display = match &terminator {
        Some(Key::Enter) => "[CR]".to_string(),
        Some(key) => key.to_string(),
        None => String::new(),
    };
    let codes: Vec<u32> = session.entry().chars().map(|c| c as u32).collect();
    session.outln(&[format!("You pressed '{display}' = {codes:?}").into()]);

    // Enter covers the cancel substitution too: escape commits "CANCEL"
    // with an Enter terminator
    match terminator {
        Some(Key::Enter) => Flow::Focus("username".into()),
        _ => Flow::Refocus,
    }
}

fn login(session: &mut Session, form: &mut Form) -> Flow {
    let username = session.entry().to_uppercase();
    if let Some(field) = form.get_mut(&"password".into()) {
        field.set_prompt(format!("Enter {username} password: "));
    }
    Flow::Focus("password".into())
}

fn password(session: &mut Session, _form: &mut Form) -> Flow {
    let entry = session.entry().to_string();
    session.out(&[format!("\nPassword entered was \"{entry}\"\n").into()]);
    Flow::Quit
}

/// Log to a file, never to the session's own terminal.
fn init_logging() {
    let log_path = std::env::var_os("HOME")
        .map(|home| PathBuf::from(home).join(".ttyform").join("demo.log"))
        .unwrap_or_else(|| PathBuf::from("ttyform-demo.log"));
    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .ok();

    if let Some(file) = log_file {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter)
            .with_writer(Mutex::new(file))
            .with_ansi(false)
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    }
}
