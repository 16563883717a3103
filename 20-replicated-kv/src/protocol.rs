//! Console command parsing for the interactive client.
//!
//! Turns lines like `APPEND foo bar` into [`ConsoleCommand`] values. The
//! REPL maps them onto [`Clerk`](crate::clerk::Clerk) calls.

use anyhow::{Result, anyhow};

/// Commands accepted at the client prompt.
#[derive(Debug, PartialEq)]
pub enum ConsoleCommand {
    Get { key: String },
    Put { key: String, value: String },
    Append { key: String, value: String },
    Help,
    Exit,
}

pub const HELP_TEXT: &str = "commands: GET/g <key>, PUT/p <key> <value>, APPEND/a <key> <value>, HELP/h, EXIT/e";

impl ConsoleCommand {
    /// Parses one line of user input. Keywords are case-insensitive and
    /// accept one-letter aliases; keys and values are taken verbatim.
    pub fn parse(line: &str) -> Result<Self> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        let Some(first) = parts.first() else {
            return Err(anyhow!("empty command"));
        };

        let cmd = first.to_uppercase();
        let normalized_cmd = match cmd.as_str() {
            "G" => "GET",
            "P" => "PUT",
            "A" => "APPEND",
            "H" => "HELP",
            "E" => "EXIT",
            other => other,
        };

        match (normalized_cmd, parts.len()) {
            ("EXIT", _) => Ok(ConsoleCommand::Exit),
            ("HELP", _) => Ok(ConsoleCommand::Help),
            ("GET", 2) => Ok(ConsoleCommand::Get {
                key: parts[1].to_string(),
            }),
            ("PUT", 3) => Ok(ConsoleCommand::Put {
                key: parts[1].to_string(),
                value: parts[2].to_string(),
            }),
            ("APPEND", 3) => Ok(ConsoleCommand::Append {
                key: parts[1].to_string(),
                value: parts[2].to_string(),
            }),
            ("GET", _) => Err(anyhow!("GET requires exactly one argument: GET <key>")),
            ("PUT", _) => Err(anyhow!("PUT requires exactly two arguments: PUT <key> <value>")),
            ("APPEND", _) => Err(anyhow!(
                "APPEND requires exactly two arguments: APPEND <key> <value>"
            )),
            _ => Err(anyhow!("invalid command. Try: {HELP_TEXT}")),
        }
    }
}
