// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Interactive shell running each input line as a `run` job.

use std::io::Write;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::job::{JobEngine, JobRequest, JoinOptions, JoinOutcome};
use crate::types::{TargetDescriptor, Task};

/// RPC method each shell line is sent as.
pub const RUN_METHOD: &str = "run";

/// Poll interval used while waiting for a shell command.
pub const SHELL_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Default prompt.
pub const PROMPT: &str = "(♀)~> ";

/// One read from the input side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellInput {
    /// A line, without its terminator.
    Line(String),
    /// The read was interrupted; the shell keeps going.
    Interrupted,
    /// No more input.
    Eof,
}

/// Source of shell input lines.
#[async_trait]
pub trait LineSource: Send {
    /// Show `prompt` and read the next line.
    async fn read_line(&mut self, prompt: &str) -> std::io::Result<ShellInput>;

    /// Token that fires when the user interrupts a running command.
    ///
    /// The shell drops its clone once the command is done. The default never
    /// fires.
    fn interrupt(&self) -> CancellationToken {
        CancellationToken::new()
    }
}

/// Reads lines from stdin; Ctrl-C interrupts the pending read or command.
pub struct StdinLines {
    lines: Lines<BufReader<Stdin>>,
}

impl StdinLines {
    pub fn new() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }
}

impl Default for StdinLines {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LineSource for StdinLines {
    async fn read_line(&mut self, prompt: &str) -> std::io::Result<ShellInput> {
        {
            let mut stdout = std::io::stdout();
            write!(stdout, "{}", prompt)?;
            stdout.flush()?;
        }

        tokio::select! {
            line = self.lines.next_line() => Ok(match line? {
                Some(line) => ShellInput::Line(line),
                None => ShellInput::Eof,
            }),
            _ = tokio::signal::ctrl_c() => Ok(ShellInput::Interrupted),
        }
    }

    fn interrupt(&self) -> CancellationToken {
        let token = CancellationToken::new();
        let watched = token.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => watched.cancel(),
                _ = watched.cancelled() => {}
            }
        });
        token
    }
}

#[derive(Debug, PartialEq, Eq)]
enum LineKind<'a> {
    Empty,
    Exit,
    Escape(&'a str),
    Run(&'a str),
}

fn classify(line: &str) -> LineKind<'_> {
    if line.trim().is_empty() {
        return LineKind::Empty;
    }
    if line == "exit" {
        return LineKind::Exit;
    }
    match line.trim_start().strip_prefix('!') {
        Some(command) => LineKind::Escape(command),
        None => LineKind::Run(line),
    }
}

/// Output options for [`Shell`].
#[derive(Debug, Clone)]
pub struct ShellOptions {
    /// Do not print task output.
    pub quiet: bool,
    /// Omit the `[device_id]` header before each task's output.
    pub raw: bool,
    /// Prompt shown before each read.
    pub prompt: String,
}

impl Default for ShellOptions {
    fn default() -> Self {
        Self {
            quiet: false,
            raw: false,
            prompt: PROMPT.to_string(),
        }
    }
}

/// Read-eval loop against a fixed target.
///
/// Task output goes to `out`; job errors go to `err` and do not stop the loop.
pub struct Shell<O, E> {
    engine: JobEngine,
    target: TargetDescriptor,
    options: ShellOptions,
    out: O,
    err: E,
    submitted: usize,
}

impl<O: Write, E: Write> Shell<O, E> {
    /// Create a shell writing to `out` and `err`.
    pub fn new(engine: JobEngine, target: TargetDescriptor, out: O, err: E) -> Self {
        Self {
            engine,
            target,
            options: ShellOptions::default(),
            out,
            err,
            submitted: 0,
        }
    }

    /// Set output options.
    pub fn with_options(mut self, options: ShellOptions) -> Self {
        self.options = options;
        self
    }

    /// Number of jobs submitted so far.
    pub fn submitted(&self) -> usize {
        self.submitted
    }

    /// Release the writers.
    pub fn into_writers(self) -> (O, E) {
        (self.out, self.err)
    }

    /// Run until `exit` or end of input.
    pub async fn run(&mut self, input: &mut dyn LineSource) -> Result<()> {
        loop {
            let line = match input.read_line(&self.options.prompt).await? {
                ShellInput::Line(line) => line,
                ShellInput::Interrupted => {
                    writeln!(self.out)?;
                    continue;
                }
                ShellInput::Eof => {
                    writeln!(self.out)?;
                    break;
                }
            };

            match classify(&line) {
                LineKind::Empty => continue,
                LineKind::Exit => break,
                LineKind::Escape(command) => {
                    if command.trim().is_empty() {
                        writeln!(self.out, "Shell command missing")?;
                    } else {
                        writeln!(self.out, "THIS IS A SHELL ESCAPE: {}", command)?;
                    }
                }
                LineKind::Run(command) => {
                    let interrupt = input.interrupt();
                    let _guard = interrupt.clone().drop_guard();
                    if let Err(e) = self.execute(command, Some(interrupt)).await {
                        warn!(error = %e, "Shell command failed");
                        writeln!(self.err, "error: {}", e)?;
                    }
                }
            }
        }

        debug!(submitted = self.submitted, "Shell finished");
        Ok(())
    }

    /// Run one command, wait for it and print its output.
    pub async fn run_once(&mut self, command: &str) -> Result<Vec<Task>> {
        Ok(self.execute(command, None).await?.unwrap_or_default())
    }

    /// Returns `None` when `interrupt` fired before the job completed. The
    /// remote job keeps running.
    async fn execute(
        &mut self,
        command: &str,
        interrupt: Option<CancellationToken>,
    ) -> Result<Option<Vec<Task>>> {
        let mut job = JobRequest::new(self.target.clone(), RUN_METHOD)
            .with_arg(command)
            .submit(&self.engine)
            .await?;
        self.submitted += 1;

        let mut options = JoinOptions::default().with_poll_interval(SHELL_POLL_INTERVAL);
        if let Some(token) = interrupt {
            options = options.with_cancel(token);
        }

        if let JoinOutcome::Cancelled(_) = self.engine.join(&mut job, options).await? {
            info!(job_id = %job.job_id(), "Shell command interrupted");
            writeln!(
                self.err,
                "interrupted: job {} keeps running remotely",
                job.job_id()
            )?;
            return Ok(None);
        }

        let tasks = self.engine.tasks(&job).await?;
        self.print_tasks(&tasks)?;
        Ok(Some(tasks))
    }

    fn print_tasks(&mut self, tasks: &[Task]) -> std::io::Result<()> {
        if self.options.quiet {
            return Ok(());
        }

        for task in tasks {
            if !self.options.raw {
                writeln!(self.out, "[{}]", task.device_id())?;
            }
            for text in [task.stdout(), task.stderr()].into_iter().flatten() {
                writeln!(self.out, "{}", text.trim_end_matches('\n'))?;
            }
        }
        self.out.flush()
    }
}
