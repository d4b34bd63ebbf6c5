//! Entry point for the command-line interface.
#![forbid(unsafe_code)]

use geointake_cli::CliError;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();
    match geointake_cli::run() {
        Ok(()) => {}
        Err(CliError::ArgumentParsing(err)) => err.exit(),
        Err(err) => {
            eprintln!("geointake: {err}");
            std::process::exit(1);
        }
    }
}
