use clap::Parser;
use colored::Colorize;

use dbsmoke_cli::cli::Cli;
use dbsmoke_cli::commands;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    let code = match commands::dispatch(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {}", "error:".red().bold(), e);
            e.exit_code()
        }
    };

    std::process::exit(code);
}
