use clap::Parser;
use structrader::cli::{run, Cli};

fn main() -> std::process::ExitCode {
    run(Cli::parse())
}
