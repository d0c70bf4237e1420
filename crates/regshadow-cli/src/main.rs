use clap::Parser;

mod args;
mod batch;
mod exit_codes;
mod run;
mod version_info;

use args::Cli;

fn main() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::init();
    let cli = Cli::parse();
    let code = run::run(cli);
    std::process::exit(code);
}
