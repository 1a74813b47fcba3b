use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use hourly_bot_core::{app::App, runner::RunnerOptions};

/// Runs hourly animal bots on Telegram.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Settings file of a bot, repeat to run several bots.
    #[arg(
        short = 'c',
        long = "config",
        value_name = "PATH",
        default_values = ["conf/test.json", "conf/test2.json"]
    )]
    config_paths: Vec<PathBuf>,
}

fn init_logger() {
    let mut builder = pretty_env_logger::formatted_timed_builder();
    builder.filter_level(log::LevelFilter::Info);
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }
    builder.init();
}

fn main() -> ExitCode {
    init_logger();
    let args = Args::parse();

    let app = App::new(RunnerOptions::default());
    if let Err(err) = app.run(args.config_paths.as_slice()) {
        log::error!("{}", err);
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
