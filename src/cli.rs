// SPDX-License-Identifier: MIT

use std::io::IsTerminal;
use std::process::{Child, Command, Stdio};

use clap::Args;
use termcolor::{ColorChoice, StandardStream, WriteColor};

#[derive(Debug, Clone, Default, Args)]
pub struct Options {
    /// Whether the output should be run through a pager ($PAGER, or less)
    #[clap(long)]
    pub pager: Option<bool>,

    /// Whether the output should be colored (honors NO_COLOR)
    #[clap(long)]
    pub color: Option<bool>,
}

fn spawn_pager() -> Option<Child> {
    let command = std::env::var("PAGER")
        .ok()
        .filter(|pager| !pager.trim().is_empty())
        .unwrap_or_else(|| "less -FR".to_string());
    let mut words = command.split_whitespace();
    let program = words.next()?;

    match Command::new(program)
        .args(words)
        .stdin(Stdio::piped())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .spawn()
    {
    Ok(child) => Some(child),
    Err(err) => {
        log::debug!("cannot start pager {:?}: {}", command, err);
        None
    }
    }
}

/// Terminal output, optionally colored and optionally piped through a pager.
pub struct Cli {
    stream: Box<dyn WriteColor>,
    pager: Option<Child>,
}
impl Cli {
    pub fn new(options: Options) -> Cli {
        let is_terminal = std::io::stdout().is_terminal();
        let no_color = std::env::var_os("NO_COLOR").is_some_and(|v| !v.is_empty());

        let use_pager = options.pager.unwrap_or(is_terminal);
        let use_color = options.color.unwrap_or(is_terminal && !no_color);

        let mut pager = if use_pager { spawn_pager() } else { None };
        let pager_stdin = pager.as_mut().and_then(|pager| pager.stdin.take());

        let stream: Box<dyn WriteColor> = match pager_stdin {
            Some(stdin) if use_color => Box::new(termcolor::Ansi::new(stdin)),
            Some(stdin) => Box::new(termcolor::NoColor::new(stdin)),
            None => {
                let color = if use_color { ColorChoice::Always } else { ColorChoice::Never };
                Box::new(StandardStream::stdout(color))
            }
        };

        Cli { stream, pager }
    }

    pub fn stream(&mut self) -> &mut dyn WriteColor {
        self.stream.as_mut()
    }
}

impl Drop for Cli {
    fn drop(&mut self) {
        // Close the pipe so the pager sees EOF.
        self.stream = Box::new(termcolor::NoColor::new(std::io::sink()));

        // Wait for the pager to exit, otherwise it ends up killed by the shell
        // and leaves the terminal in a bad state.
        if let Some(pager) = &mut self.pager {
            pager.wait().unwrap_or_default();
        }
    }
}
