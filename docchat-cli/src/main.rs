use anyhow::{Context, Result};
use clap::Parser;
use docchat_cli::{App, AppConfig, Cli, Command, telemetry};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    telemetry::init(cli.log_level.as_deref())?;

    let mut config = AppConfig::load(&cli.config).context("failed to load configuration")?;
    config.apply_process_env();
    let mut app = App::from_config(config).await.context("failed to initialise docchat")?;

    match cli.command {
        Some(Command::Load { file, chat }) => {
            app.load(&file).await?;
            if chat {
                app.chat().await?;
            }
        }
        Some(Command::Chat) => app.chat().await?,
        Some(Command::Collections) => app.print_collections().await?,
        Some(Command::Reset { name }) => app.reset(&name).await?,
        Some(Command::Delete { name }) => app.delete(&name).await?,
        None => app.menu().await?,
    }
    Ok(())
}
