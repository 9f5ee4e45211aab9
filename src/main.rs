use std::error::Error;

use clap::Parser;
use gitsplit::{
    cli::{
        args::{CliArgs, Command},
        command_handlers::{do_check, do_clear_cache},
    },
    GitsplitSettings,
};

fn run() -> Result<(), Box<dyn Error>> {
    let cli_args: CliArgs = CliArgs::parse();
    let settings = GitsplitSettings::load()?;

    match cli_args.cmd {
        Command::Check => do_check(&cli_args.config, settings),
        Command::ClearCache => do_clear_cache(&cli_args.config, settings),
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run() {
        log::error!("{}", e);
        std::process::exit(1);
    }
}
