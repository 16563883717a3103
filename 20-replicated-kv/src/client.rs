use anyhow::Result;
use tokio::io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::warn;

use crate::{
    clerk::Clerk,
    cli::ClientArgs,
    protocol::{ConsoleCommand, HELP_TEXT},
};

/// Rounds over the server list before a console command reports failure.
const MAX_ROUNDS: usize = 20;

/// Reads commands from stdin and runs them through a [`Clerk`] until `EXIT`,
/// end of input, or ctrl-c.
pub async fn run(args: ClientArgs) -> Result<()> {
    let mut clerk = Clerk::new(args.server).with_max_rounds(MAX_ROUNDS);
    let mut stdin = BufReader::new(tokio::io::stdin());
    let mut input = String::new();

    write_stdout(HELP_TEXT).await?;
    loop {
        input.clear();
        tokio::select! {
            bytes_read = stdin.read_line(&mut input) => {
                if bytes_read? == 0 {
                    break;
                }
            }
            ctrl_c = tokio::signal::ctrl_c() => {
                if let Err(error) = ctrl_c {
                    warn!(?error, "ctrl-c handler failed");
                }
                break;
            }
        }

        if input.trim().is_empty() {
            continue;
        }
        let command = match ConsoleCommand::parse(&input) {
            Ok(command) => command,
            Err(err) => {
                write_stderr(&format!("!!! {err}")).await?;
                continue;
            }
        };
        if !execute(&mut clerk, command).await? {
            break;
        }
    }

    Ok(())
}

async fn execute(clerk: &mut Clerk, command: ConsoleCommand) -> Result<bool> {
    let outcome = match command {
        ConsoleCommand::Get { key } => clerk.get(&key).await.map(|value| format!("{key} = {value:?}")),
        ConsoleCommand::Put { key, value } => clerk.put(&key, &value).await.map(|()| "OK".to_string()),
        ConsoleCommand::Append { key, value } => {
            clerk.append(&key, &value).await.map(|()| "OK".to_string())
        }
        ConsoleCommand::Help => Ok(HELP_TEXT.to_string()),
        ConsoleCommand::Exit => return Ok(false),
    };

    match outcome {
        Ok(line) => write_stdout(&line).await?,
        Err(err) => write_stderr(&format!("!!! {err:#}")).await?,
    }
    Ok(true)
}

async fn write_stdout(line: &str) -> io::Result<()> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(line.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await
}

async fn write_stderr(line: &str) -> io::Result<()> {
    let mut stderr = tokio::io::stderr();
    stderr.write_all(line.as_bytes()).await?;
    stderr.write_all(b"\n").await?;
    stderr.flush().await
}
