use std::fs;
use std::time::Duration;

use mvcp_client::{Client, ClientConfig, ClientError};
use mvcp_transport::Endpoint;
use tracing::{debug, warn};

use crate::cmd::{parse_duration, ConnectionArgs, SendArgs};
use crate::exit::{
    client_error, io_error, transport_error, CliError, CliResult, FAILURE, INTERRUPTED, SUCCESS,
    USAGE,
};
use crate::output::{print_outcomes, CommandOutcome, OutputFormat};

pub fn run(args: SendArgs, connection: &ConnectionArgs, format: OutputFormat) -> CliResult<i32> {
    let commands = resolve_commands(&args)?;
    if commands.is_empty() {
        return Err(CliError::new(USAGE, "no commands to send"));
    }
    let endpoint: Endpoint = connection
        .endpoint
        .parse()
        .map_err(|err| transport_error("invalid endpoint", err))?;
    let timeout = parse_duration(&connection.timeout)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .map_err(|err| io_error("failed to start runtime", err))?;

    let outcomes = runtime.block_on(async {
        tokio::select! {
            result = exchange(endpoint, timeout, commands) => result,
            _ = tokio::signal::ctrl_c() => Err(CliError::new(INTERRUPTED, "interrupted")),
        }
    })?;

    print_outcomes(&outcomes, format);
    if outcomes.iter().all(|outcome| outcome.ok) {
        Ok(SUCCESS)
    } else {
        Ok(FAILURE)
    }
}

/// Connect, pipeline every command, then collect replies in order.
async fn exchange(
    endpoint: Endpoint,
    timeout: Duration,
    commands: Vec<String>,
) -> CliResult<Vec<CommandOutcome>> {
    let config = ClientConfig {
        connect_timeout: timeout,
        greeting_timeout: timeout,
        ..ClientConfig::default()
    };
    let client = Client::with_config(endpoint, config);
    client
        .connect()
        .await
        .map_err(|err| client_error("connect failed", err))?;

    let completions: Vec<_> = commands
        .into_iter()
        .map(|command| {
            let completion = client.submit(command.as_str());
            (command, completion)
        })
        .collect();
    debug!(count = completions.len(), "commands submitted");

    let mut outcomes = Vec::with_capacity(completions.len());
    for (command, completion) in completions {
        let result = match tokio::time::timeout(timeout, completion).await {
            Ok(result) => result,
            Err(_) => {
                // Later replies can no longer be trusted; drop the connection
                // so the remaining commands settle right away.
                warn!(%command, ?timeout, "no reply before timeout");
                if let Err(err) = client.disconnect().await {
                    debug!(%err, "disconnect after timeout failed");
                }
                Err(ClientError::Timeout(timeout))
            }
        };
        outcomes.push(CommandOutcome::new(command, result));
    }

    client
        .disconnect()
        .await
        .map_err(|err| client_error("disconnect failed", err))?;
    Ok(outcomes)
}

fn resolve_commands(args: &SendArgs) -> CliResult<Vec<String>> {
    let Some(path) = &args.file else {
        return Ok(args.commands.clone());
    };
    let text = fs::read_to_string(path)
        .map_err(|err| io_error(&format!("failed reading {}", path.display()), err))?;
    Ok(parse_command_file(&text))
}

fn parse_command_file(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}
