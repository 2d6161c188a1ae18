//! Numbered interactive front door over the same operations as the subcommands.
use std::{
    io::{self, Write},
    path::PathBuf,
};

use anyhow::{Result, bail};
use rotor_model::MemoryLimit;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::error;

use crate::app::App;

const ENTRIES: &[&str] = &[
    "Build worker image",
    "Start workers",
    "Stop all workers",
    "Restart a worker",
    "List workers",
    "Change a worker's identity",
    "Add a worker",
    "Show worker logs",
    "Deploy rotation schedule",
    "Resource stats",
    "Rotate now",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Choice {
    Run(usize),
    Exit,
}

fn parse_choice(raw: &str) -> Option<Choice> {
    match raw.trim().parse::<usize>().ok()? {
        0 => Some(Choice::Exit),
        n if n <= ENTRIES.len() => Some(Choice::Run(n)),
        _ => None,
    }
}

fn is_yes(raw: &str) -> bool {
    matches!(raw.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

struct Prompt {
    lines: Lines<BufReader<Stdin>>,
}

impl Prompt {
    fn new() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }

    /// Next line, or an error on end of input.
    async fn raw(&mut self, label: &str) -> Result<String> {
        print!("{label}: ");
        io::stdout().flush()?;
        match self.lines.next_line().await? {
            Some(line) => Ok(line.trim().to_string()),
            None => bail!("input closed"),
        }
    }

    /// Re-asks until a non-empty answer is given.
    async fn required(&mut self, label: &str) -> Result<String> {
        loop {
            let answer = self.raw(label).await?;
            if !answer.is_empty() {
                return Ok(answer);
            }
            println!("a value is required");
        }
    }

    async fn optional(&mut self, label: &str) -> Result<Option<String>> {
        let answer = self.raw(label).await?;
        Ok((!answer.is_empty()).then_some(answer))
    }

    async fn memory(&mut self) -> Result<Option<MemoryLimit>> {
        loop {
            let Some(raw) = self.optional("Memory limit (e.g. 2g, unlimited; empty keeps current)").await? else {
                return Ok(None);
            };
            match raw.parse() {
                Ok(limit) => return Ok(Some(limit)),
                Err(e) => println!("{e}"),
            }
        }
    }

    async fn number<T: std::str::FromStr>(&mut self, label: &str) -> Result<T> {
        loop {
            match self.required(label).await?.parse() {
                Ok(v) => return Ok(v),
                Err(_) => println!("not a valid number"),
            }
        }
    }

    async fn confirm(&mut self, question: &str) -> Result<bool> {
        Ok(is_yes(&self.raw(&format!("{question} [y/N]")).await?))
    }
}

pub async fn run(app: &App) -> Result<()> {
    let mut prompt = Prompt::new();
    loop {
        println!();
        println!("rotor ({} on {})", app.config().image, app.config().home.display());
        for (i, entry) in ENTRIES.iter().enumerate() {
            println!("{:>3}) {entry}", i + 1);
        }
        println!("  0) Exit");

        let raw = prompt.required("Choice").await?;
        let Some(choice) = parse_choice(&raw) else {
            println!("unknown choice {raw:?}");
            continue;
        };
        let n = match choice {
            Choice::Exit => return Ok(()),
            Choice::Run(n) => n,
        };

        // A failed action returns to the menu.
        if let Err(e) = run_entry(app, &mut prompt, n).await {
            error!(error = %e, "menu action failed");
            println!("error: {e:#}");
        }
    }
}

async fn run_entry(app: &App, prompt: &mut Prompt, n: usize) -> Result<()> {
    match n {
        1 => {
            let context = prompt.optional("Build context [.]").await?.unwrap_or_else(|| ".".into());
            app.build(&PathBuf::from(context)).await
        }
        2 => {
            let count: u32 = prompt.number("How many workers").await?;
            let memory = prompt.memory().await?;
            app.start(count, memory).await
        }
        3 => {
            if prompt.confirm("Remove every managed worker?").await? {
                app.stop_all().await
            } else {
                println!("cancelled");
                Ok(())
            }
        }
        4 => {
            let slot = prompt.required("Slot").await?;
            let memory = prompt.memory().await?;
            app.restart(&slot, memory).await
        }
        5 => app.list().await,
        6 => {
            let slot = prompt.required("Slot").await?;
            let identity = prompt.required("New identity").await?;
            App::check_identity(&identity)?;
            let memory = prompt.memory().await?;
            if prompt.confirm(&format!("Replace the worker in {slot}?")).await? {
                app.change_id(&slot, &identity, memory).await
            } else {
                println!("cancelled");
                Ok(())
            }
        }
        7 => {
            let identity = prompt.required("Identity").await?;
            App::check_identity(&identity)?;
            let memory = prompt.memory().await?;
            app.add(&identity, memory).await
        }
        8 => {
            let slot = prompt.required("Slot").await?;
            app.logs(&slot, 50, false).await
        }
        9 => {
            let hours: u8 = prompt.number("Rotate every N hours (1-24)").await?;
            if prompt.confirm("Write the rotation schedule?").await? {
                app.deploy(hours, 120).await
            } else {
                println!("cancelled");
                Ok(())
            }
        }
        10 => app.stats().await,
        11 => {
            if prompt.confirm("Rotate every slot now?").await? {
                app.rotate().await
            } else {
                println!("cancelled");
                Ok(())
            }
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn choices() {
        assert_eq!(parse_choice("0"), Some(Choice::Exit));
        assert_eq!(parse_choice(" 5 "), Some(Choice::Run(5)));
        assert_eq!(parse_choice("11"), Some(Choice::Run(11)));
        assert_eq!(parse_choice("12"), None);
        assert_eq!(parse_choice(""), None);
        assert_eq!(parse_choice("list"), None);
    }

    #[test]
    fn confirmation_defaults_to_no() {
        assert!(is_yes("y"));
        assert!(is_yes(" YES "));
        assert!(!is_yes(""));
        assert!(!is_yes("n"));
        assert!(!is_yes("sure"));
    }
}
