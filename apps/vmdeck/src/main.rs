use clap::Parser;

use vmdeck_console::app;
use vmdeck_console::cli::Cli;
use vmdeck_console::config::Config;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    if let Err(err) = app::init_logging(&cli) {
        eprintln!("❌ {err}");
        std::process::exit(1);
    }

    let config = Config::from_env();
    if let Err(err) = app::run(cli, config).await {
        tracing::error!(target: "vmdeck::app", error = %err, "command failed");
        eprintln!("❌ {err}");
        std::process::exit(1);
    }
}
