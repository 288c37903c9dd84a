use std::io::IsTerminal;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use mvcp_client::{ClientError, Response};
use mvcp_frame::parse_status_line;
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// Result of one command, flattened for printing.
#[derive(Debug, Serialize)]
pub struct CommandOutcome {
    pub command: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<u16>,
    pub status: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub body: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CommandOutcome {
    pub fn new(command: String, result: Result<Response, ClientError>) -> Self {
        match result {
            Ok(Response { code, reason, body }) => Self {
                command,
                ok: true,
                code: Some(code),
                status: reason,
                body,
                error: None,
            },
            Err(ClientError::Protocol(failure)) => {
                let status = match parse_status_line(&failure.reason) {
                    Some((_, reason)) => reason.to_string(),
                    None => failure.reason.clone(),
                };
                Self {
                    command,
                    ok: false,
                    code: failure.code,
                    status,
                    body: Vec::new(),
                    error: Some(failure.to_string()),
                }
            }
            Err(err) => Self {
                command,
                ok: false,
                code: None,
                status: String::new(),
                body: Vec::new(),
                error: Some(err.to_string()),
            },
        }
    }

    /// Reply status line as the engine sent it, when there was one.
    fn status_line(&self) -> Option<String> {
        self.code.map(|code| format!("{code} {}", self.status))
    }
}

pub fn print_outcomes(outcomes: &[CommandOutcome], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            for outcome in outcomes {
                println!(
                    "{}",
                    serde_json::to_string(outcome).unwrap_or_else(|_| "{}".to_string())
                );
            }
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["COMMAND", "CODE", "STATUS", "BODY"]);
            for outcome in outcomes {
                table.add_row(vec![
                    outcome.command.clone(),
                    outcome
                        .code
                        .map(|code| code.to_string())
                        .unwrap_or_else(|| "-".to_string()),
                    summary(outcome),
                    outcome.body.join("\n"),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for outcome in outcomes {
                let mark = if outcome.ok { "ok" } else { "FAILED" };
                println!("{} -> {mark}: {}", outcome.command, summary(outcome));
                for line in &outcome.body {
                    println!("    {line}");
                }
            }
        }
        OutputFormat::Raw => {
            for outcome in outcomes {
                match outcome.status_line() {
                    Some(line) => println!("{line}"),
                    None => eprintln!(
                        "{}: {}",
                        outcome.command,
                        outcome.error.as_deref().unwrap_or("failed")
                    ),
                }
                for line in &outcome.body {
                    println!("{line}");
                }
            }
        }
    }
}

fn summary(outcome: &CommandOutcome) -> String {
    match (&outcome.error, outcome.code) {
        (Some(error), None) => error.clone(),
        _ => outcome.status.clone(),
    }
}
