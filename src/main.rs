use std::time::Duration;

use color_eyre::eyre::{
    Result,
    eyre,
};
use tracing_appender::rolling;
use tracing_subscriber::EnvFilter;

use fable_tui::client;

fn print_usage_and_exit() -> ! {
    println!(
        "Usage: fable-tui [--server-url <url>] [--player-name <name>] [--role <role>]\n\
         [--timeout-secs <secs>]\n\
         \n\
         Flags:\n\
           --server-url <url>    Backend base URL (default {})\n\
           --player-name <name>  Display name for the tracked player (default {})\n\
           --role <role>         Scenario role to join as (defaults to the first role)\n\
           --timeout-secs <secs> Per-request deadline in seconds (default {})",
        client::DEFAULT_SERVER_URL,
        client::DEFAULT_DISPLAY_NAME,
        client::DEFAULT_REQUEST_TIMEOUT_SECS,
    );
    std::process::exit(0);
}

fn parse_cli_args() -> Result<client::AppConfig> {
    let mut args = std::env::args().skip(1);
    let mut server_url: Option<String> = None;
    let mut player_name: Option<String> = None;
    let mut role: Option<String> = None;
    let mut timeout_secs: Option<u64> = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--server-url" => {
                let url = args
                    .next()
                    .ok_or_else(|| eyre!("--server-url requires a URL argument"))?;
                if server_url.is_some() {
                    return Err(eyre!("--server-url may only be specified once"));
                }
                server_url = Some(url);
            }
            "--player-name" => {
                let name = args
                    .next()
                    .ok_or_else(|| eyre!("--player-name requires a name argument"))?;
                if player_name.is_some() {
                    return Err(eyre!("--player-name may only be specified once"));
                }
                player_name = Some(name);
            }
            "--role" => {
                let name = args
                    .next()
                    .ok_or_else(|| eyre!("--role requires a role name"))?;
                if role.is_some() {
                    return Err(eyre!("--role may only be specified once"));
                }
                role = Some(name);
            }
            "--timeout-secs" => {
                let secs = args
                    .next()
                    .ok_or_else(|| eyre!("--timeout-secs requires a number of seconds"))?;
                if timeout_secs.is_some() {
                    return Err(eyre!("--timeout-secs may only be specified once"));
                }
                timeout_secs = Some(
                    secs.parse()
                        .map_err(|_| eyre!("--timeout-secs must be a whole number"))?,
                );
            }
            "--help" | "-h" => print_usage_and_exit(),
            other => return Err(eyre!("Unknown argument: {other}")),
        }
    }

    let defaults = client::AppConfig::default();
    Ok(client::AppConfig {
        server_url: server_url.unwrap_or(defaults.server_url),
        display_name: player_name.unwrap_or(defaults.display_name),
        player_id: defaults.player_id,
        role,
        request_timeout: timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(defaults.request_timeout),
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    // The TUI owns stdout, so logs go to a rolling file instead
    let file_appender = rolling::daily("logs", "fable-tui.log");
    let (writer, _guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(writer)
        .with_ansi(false)
        .init();
    tracing::info!("starting fable-tui");
    let app_config = parse_cli_args()?;
    client::run_app(app_config).await
}
