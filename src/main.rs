//! shell-bot binary entry point.

use std::process::ExitCode;
use std::sync::Arc;

use shell_bot::cli::{self, Args};
use shell_bot::config::Config;
use shell_bot::transport::telegram::TelegramTransport;
use shell_bot::{logging, Bot};
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    let args = match cli::parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("error: {}", e);
            eprintln!("Try 'shell-bot --help' for more information.");
            return ExitCode::FAILURE;
        }
    };

    if args.help {
        cli::print_help();
        return ExitCode::SUCCESS;
    }
    if args.version {
        cli::print_version();
        return ExitCode::SUCCESS;
    }

    match run(&args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load(args)?;
    config.validate()?;
    logging::init_with(config.log_filter());

    info!("shell-bot v{}", env!("CARGO_PKG_VERSION"));

    let owner = config.owner()?;
    let token = config.auth_token.clone().unwrap_or_default();
    let transport = TelegramTransport::connect(&token).await?;
    info!(%owner, bot = %transport.username(), "bot is ready");

    let (bot, rx) = Bot::new(
        Arc::new(transport.clone()),
        owner,
        config.context_defaults(),
    );
    let bot = bot.skip_queued(config.skip_queued);
    let events = bot.events();

    tokio::select! {
        () = bot.run(rx) => {}
        () = transport.listen(events) => {}
    }

    info!("shell-bot stopped");
    Ok(())
}
