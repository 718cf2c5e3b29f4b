//! Watch command implementation.
//!
//! Runs a monitor against the backend and forwards commands typed on
//! stdin until the user quits, Ctrl-C is pressed, or (with
//! `--exit-when-done`) training finishes.

use std::sync::Arc;

use anyhow::{Context, Result};
use console::style;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;

use trainscope_api::{Channel, JobId};
use trainscope_monitor::{Command, Monitor, MonitorConfig};

use super::common::connect;
use crate::config::Settings;
use crate::surface::TerminalSurface;

const HELP: &str = "commands: r refresh | c cancel | i <minutes> interval | \
                    t scalars|images tab | s <group> <index> step | q quit";

/// A line typed by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Command(Command),
    Help,
    Empty,
}

/// Parse one line of interactive input.
pub fn parse_input(line: &str) -> Result<Input, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(Input::Empty);
    };
    let args: Vec<&str> = words.collect();

    let command = match (verb, args.as_slice()) {
        ("r" | "refresh", []) => Command::Refresh,
        ("c" | "cancel", []) => Command::Cancel,
        ("q" | "quit" | "exit", []) => Command::Shutdown,
        ("h" | "help" | "?", _) => return Ok(Input::Help),
        ("i" | "interval", [minutes]) => Command::SetInterval(
            minutes
                .parse()
                .map_err(|_| format!("invalid interval '{minutes}'"))?,
        ),
        ("t" | "tab", [tab]) => Command::ShowTab(tab.parse::<Channel>()?),
        ("s" | "step", [group, index]) => Command::SelectStep {
            group: group
                .parse()
                .map_err(|_| format!("invalid group '{group}'"))?,
            index: index
                .parse()
                .map_err(|_| format!("invalid index '{index}'"))?,
        },
        _ => return Err(format!("unrecognized input '{}'", line.trim())),
    };
    Ok(Input::Command(command))
}

/// Execute the watch command.
pub async fn execute(settings: &Settings, model: &str, images: bool) -> Result<()> {
    let api = Arc::new(connect(settings)?);
    let config = MonitorConfig::default()
        .with_interval(settings.refresh_interval_minutes)
        .with_exit_when_done(settings.exit_when_done)
        .with_charts_visible(!images);

    let (monitor, handle) = Monitor::new(api, JobId::new(model), TerminalSurface::stdout(), config)
        .context("Invalid monitor configuration")?;

    println!(
        "{} Watching {} at {}",
        style("→").cyan().bold(),
        style(model).dim(),
        settings.endpoint
    );
    println!("  {}", style(HELP).dim());

    let mut task = tokio::spawn(monitor.run());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            finished = &mut task => {
                finished.context("Monitor task failed")?;
                println!("{} Monitor stopped", style("✓").green().bold());
                return Ok(());
            }
            _ = &mut ctrl_c => break,
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => match parse_input(&line) {
                    Ok(Input::Command(Command::Shutdown)) => break,
                    Ok(Input::Command(command)) => {
                        if handle.send(command).is_err() {
                            break;
                        }
                    }
                    Ok(Input::Help) => println!("  {}", style(HELP).dim()),
                    Ok(Input::Empty) => {}
                    Err(message) => println!("  {} {message}", style("?").yellow()),
                },
                Ok(None) => stdin_open = false,
                Err(e) => {
                    warn!(error = %e, "stdin closed");
                    stdin_open = false;
                }
            },
        }
    }

    // The monitor may already have exited on its own.
    let _ = handle.shutdown();
    task.await.context("Monitor task failed")?;
    println!("\n{} Stopped watching {}", style("✓").green().bold(), model);
    Ok(())
}
