use clap::Parser;
use log::error;

use rfbterm::app::App;
use rfbterm::config::{Cli, Config};

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => Config::load(path),
        None => Config::default(),
    };
    config.apply_cli(&cli);
    rfbterm::logger::init(cli.verbose, config.log_file.as_deref());

    match App::run(config) {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            error!("fatal: {e}");
            std::process::ExitCode::FAILURE
        }
    }
}
