mod command;
mod render;
mod templates;

use std::future::Future;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use command::Command;
use rustyline::error::ReadlineError;
use situator_core::config::SituatorCfg;
use situator_core::types::{MessageKind, ScenarioTemplate};
use situator_core::{SessionContext, chat, scenario};
use situator_llm::{DebugRecorder, Gateway};
use tokio::sync::mpsc;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

const DEFAULT_TEMPLATE_DIR: &str = "templates";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Tracing: write to file when RUST_LOG is set so stdout stays readable
    if std::env::var("RUST_LOG").is_ok() {
        let file = std::fs::File::create(std::env::temp_dir().join("situator.log"))?;
        tracing_subscriber::registry()
            .with(EnvFilter::from_default_env())
            .with(fmt::layer().json().with_target(true).with_writer(file))
            .init();
    }

    let template_dir = template_dir_from_args(std::env::args().skip(1))?;
    let mut startup_notice: Option<String> = None;
    let templates = match templates::load_dir(&template_dir) {
        Ok(t) => t,
        Err(e) => {
            tracing::warn!(dir = %template_dir.display(), error = %e, "no templates loaded");
            startup_notice = Some(format!("Could not load templates from {}: {e}", template_dir.display()));
            Vec::new()
        }
    };

    let cfg = SituatorCfg::from_env();
    let recorder = Arc::new(DebugRecorder::new(cfg.debug_capacity));
    recorder.set_enabled(cfg.debug_enabled);
    let gateway = Gateway::http(recorder.clone());
    let provider = cfg.active_provider();
    tracing::info!(provider = provider.kind.tag(), model = %provider.model, "situator starting");

    let app = App {
        ctx: SessionContext::new(cfg),
        gateway,
        recorder,
        templates,
        shown_session: None,
        shown: 0,
    };
    run_repl(app, startup_notice).await
}

fn template_dir_from_args(mut args: impl Iterator<Item = String>) -> anyhow::Result<PathBuf> {
    let mut dir = std::env::var("SITUATOR_TEMPLATES").unwrap_or_else(|_| DEFAULT_TEMPLATE_DIR.into());
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--templates" => {
                dir = args
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--templates needs a directory"))?;
            }
            other => anyhow::bail!("unknown argument: {other}\nusage: situator [--templates DIR]"),
        }
    }
    Ok(PathBuf::from(dir))
}

struct App {
    ctx: SessionContext,
    gateway: Gateway,
    recorder: Arc<DebugRecorder>,
    templates: Vec<ScenarioTemplate>,
    /// Session whose transcript is on screen, and how much of it.
    shown_session: Option<Uuid>,
    shown: usize,
}

impl App {
    /// Print transcript lines added since the last call. A new session
    /// restarts from its first message.
    fn flush_messages(&mut self) {
        if self.shown_session != Some(self.ctx.session_id()) {
            self.shown_session = Some(self.ctx.session_id());
            self.shown = 0;
        }
        let messages = self.ctx.messages();
        for msg in messages.iter().skip(self.shown) {
            // the player's own line is already on screen
            if msg.kind != MessageKind::User {
                println!("{}", render::message(msg));
            }
        }
        self.shown = messages.len();
    }

    /// Returns false when the REPL should exit.
    async fn handle(&mut self, cmd: Command) -> anyhow::Result<bool> {
        match cmd {
            Command::Quit => return Ok(false),
            Command::Help => println!("{}", command::HELP),
            Command::Templates => println!("{}", render::templates(&self.templates)),
            Command::People => println!("{}", render::people(&self.ctx.people)),
            Command::Start(n) => match self.templates.get(n - 1).cloned() {
                Some(template) => {
                    let outcome =
                        with_spinner(scenario::select_and_start(&mut self.ctx, &self.gateway, template)).await?;
                    tracing::debug!(?outcome, "start finished");
                }
                None => println!("No template {n}. Use /templates to list them."),
            },
            Command::Restart => {
                if self.ctx.template.is_none() {
                    scenario::request_template_choice(&mut self.ctx);
                } else {
                    let outcome =
                        with_spinner(scenario::start_new_scenario(&mut self.ctx, &self.gateway)).await?;
                    tracing::debug!(?outcome, "restart finished");
                }
            }
            Command::Debug(n) => {
                if !self.recorder.is_enabled() {
                    println!("Debug logging is off (SITUATOR_DEBUG=false).");
                } else if self.recorder.is_empty() {
                    println!("No debug entries yet.");
                } else {
                    for entry in self.recorder.entries().iter().take(n) {
                        println!("{}\n", render::debug_entry(entry, self.ctx.cfg.debug_pretty));
                    }
                }
            }
            Command::DebugClear => {
                self.recorder.clear();
                println!("Debug log cleared.");
            }
            Command::Reset => {
                self.ctx.reset();
                println!("Scenario cleared.");
            }
            Command::Say(text) => {
                let outcome = with_spinner(chat::send_message(&mut self.ctx, &self.gateway, &text)).await?;
                tracing::debug!(?outcome, "turn finished");
            }
            Command::Unknown(text) => println!("Unknown command: {text} (try /help)"),
        }

        self.flush_messages();
        self.show_template_picker();
        Ok(true)
    }

    fn show_template_picker(&mut self) {
        if !self.ctx.awaiting_template {
            return;
        }
        println!("Choose a scenario:\n{}", render::templates(&self.templates));
        println!("Start one with /start <n>.");
        self.ctx.awaiting_template = false;
    }
}

async fn run_repl(mut app: App, startup_notice: Option<String>) -> anyhow::Result<()> {
    if let Some(notice) = startup_notice {
        println!("{notice}");
    }
    println!("{}\n", command::HELP);
    scenario::request_template_choice(&mut app.ctx);
    app.show_template_picker();

    let (line_tx, mut line_rx) = mpsc::unbounded_channel::<InputEvent>();
    let (ready_tx, ready_rx) = std::sync::mpsc::channel::<()>();
    spawn_input_thread(line_tx, ready_rx);
    request_next_prompt(&ready_tx);

    while let Some(event) = line_rx.recv().await {
        match event {
            InputEvent::Line(line) => {
                let Some(cmd) = Command::parse(&line) else {
                    request_next_prompt(&ready_tx);
                    continue;
                };
                if !app.handle(cmd).await? {
                    break;
                }
                request_next_prompt(&ready_tx);
            }
            InputEvent::Interrupted | InputEvent::Eof => break,
            InputEvent::Error(err) => {
                eprintln!("input error: {err}");
                break;
            }
        }
    }
    drop(ready_tx);
    println!();
    Ok(())
}

/// Drive `fut` to completion while drawing a spinner on the current line.
async fn with_spinner<F: Future>(fut: F) -> anyhow::Result<F::Output> {
    const SPINNER: [&str; 4] = ["-", "\\", "|", "/"];

    tokio::pin!(fut);
    let mut spinner_idx: usize = 0;
    let mut spinner_interval = tokio::time::interval(Duration::from_millis(100));
    spinner_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            out = &mut fut => {
                clear_current_line()?;
                return Ok(out);
            }
            _ = spinner_interval.tick() => {
                draw_thinking_frame(SPINNER[spinner_idx])?;
                spinner_idx = (spinner_idx + 1) % SPINNER.len();
            }
        }
    }
}

fn draw_thinking_frame(frame: &str) -> anyhow::Result<()> {
    print!("\rthinking... {frame}");
    io::stdout().flush()?;
    Ok(())
}

fn clear_current_line() -> anyhow::Result<()> {
    print!("\r\x1b[2K");
    io::stdout().flush()?;
    Ok(())
}

fn request_next_prompt(ready_tx: &std::sync::mpsc::Sender<()>) {
    let _ = ready_tx.send(());
}

/// rustyline blocks, so it lives on its own thread and only reads a line
/// after the REPL signals it is ready for one.
fn spawn_input_thread(line_tx: mpsc::UnboundedSender<InputEvent>, ready_rx: std::sync::mpsc::Receiver<()>) {
    std::thread::spawn(move || {
        let mut editor = match rustyline::DefaultEditor::new() {
            Ok(editor) => editor,
            Err(e) => {
                let _ = line_tx.send(InputEvent::Error(e.to_string()));
                return;
            }
        };

        while ready_rx.recv().is_ok() {
            match editor.readline("You> ") {
                Ok(line) => {
                    if !line.trim().is_empty() {
                        let _ = editor.add_history_entry(line.as_str());
                    }
                    if line_tx.send(InputEvent::Line(line)).is_err() {
                        break;
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    let _ = line_tx.send(InputEvent::Interrupted);
                    break;
                }
                Err(ReadlineError::Eof) => {
                    let _ = line_tx.send(InputEvent::Eof);
                    break;
                }
                Err(e) => {
                    let _ = line_tx.send(InputEvent::Error(e.to_string()));
                    break;
                }
            }
        }
    });
}

enum InputEvent {
    Line(String),
    Interrupted,
    Eof,
    Error(String),
}
