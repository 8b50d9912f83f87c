use std::path::PathBuf;

use tokio::signal::unix::{signal, SignalKind};

use dcmon::cli::{self, DEFAULT_TAIL};
use dcmon::config::MonConfig;
use dcmon::filter;
use dcmon::history::History;
use dcmon::logline;
use dcmon::logstream::{LogStream, StreamCommand};
use dcmon::script::Value;
use dcmon::status::{StatusEvent, StatusPoller};

#[tokio::main]
async fn main() {
    let args = match cli::parse_args() {
        Ok(a) => a,
        Err(e) => {
            eprintln!("dcmon: {e}");
            eprintln!(
                "Usage: dcmon [--tail <n>] [--no-lua] [--view <name>] [--list-views] [--] [<path>]"
            );
            std::process::exit(1);
        }
    };

    // ── Resolve the start path: argument, else most recent file ──────────
    let mut history = History::open_default();
    let start: PathBuf = match args.start {
        Some(p) => p,
        None => match history.as_ref().and_then(|h| h.most_recent()) {
            Some(p) => p.to_path_buf(),
            None => PathBuf::from("."),
        },
    };

    // ── Load configuration (compose file + dcmon.lua) ────────────────────
    let config = if args.no_lua {
        MonConfig::load_without_script(&start)
    } else {
        MonConfig::load(&start)
    };
    let config = match config {
        Ok(c) => c,
        Err(e) => {
            eprintln!("dcmon: {e}");
            std::process::exit(1);
        }
    };

    if let Some(h) = history.as_mut() {
        let remembered = config.script_file.clone().unwrap_or_else(|| config.compose_file.clone());
        if let Err(e) = h.remember(&remembered) {
            eprintln!("dcmon: warning: cannot save file history: {e}");
        }
    }

    if args.list_views {
        for name in config.view_names() {
            println!("{name}");
        }
        return;
    }

    let view = match &args.view {
        Some(name) => match config.view(name) {
            Some(v) => Some(v.clone()),
            None => {
                eprintln!("dcmon: unknown view: {name}");
                std::process::exit(1);
            }
        },
        None => None,
    };

    // ── Start the pollers ────────────────────────────────────────────────
    let tail = args.tail.unwrap_or(DEFAULT_TAIL);
    let mut logs = LogStream::spawn(StreamCommand::compose_logs(&config.compose_file, tail));
    let mut statuses = StatusPoller::spawn(config.compose_file.clone());

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("dcmon: {e}");
            std::process::exit(1);
        }
    };

    // ── Main loop: filter and print until interrupted ────────────────────
    let mut last_status_line = String::new();
    loop {
        tokio::select! {
            line = logs.events.recv() => {
                let Some(raw) = line else { break };
                if config.is_hidden(&raw.container) {
                    continue;
                }
                let message = logline::clean_message(&raw.message);
                if message.is_empty() {
                    continue;
                }
                let outcome = filter::run(config.log_filter(&raw.container), &message);
                if let Some(err) = outcome.error {
                    println!("{} | {err}", raw.container);
                }
                let Some(message) = outcome.message else { continue };

                let group = view.as_ref().and_then(|v| {
                    let result = v.call([
                        Value::Str(raw.container.clone()),
                        Value::Str(message.clone()),
                    ]);
                    match result {
                        Ok(Value::Str(label)) => Some(label),
                        Ok(_) => None,
                        Err(e) => {
                            eprintln!("dcmon: warning: error in view: {e}");
                            None
                        }
                    }
                });

                match group {
                    Some(label) => println!("[{label}] {} | {message}", raw.container),
                    None => println!("{} | {message}", raw.container),
                }
            }
            status = statuses.events.recv() => {
                let Some(event) = status else { break };
                let line = match event {
                    StatusEvent::Changed { container, status } => {
                        format!("== {container}: {status}")
                    }
                    StatusEvent::AllStopped => "== all containers stopped".to_owned(),
                    StatusEvent::Started => "== containers running".to_owned(),
                };
                if line != last_status_line {
                    eprintln!("{line}");
                    last_status_line = line;
                }
            }
            _ = tokio::signal::ctrl_c() => break,
            _ = sigterm.recv() => break,
        }
    }

    logs.terminate();
    statuses.terminate();
}
