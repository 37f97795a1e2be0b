//! # git-vendor CLI
//!
//! Binary entry point for the `git-vendor` command-line tool. It parses
//! arguments with `clap`, runs the selected command and maps the outcome to
//! a process exit code (see [`git_vendor::exit_codes`]).
//!
//! All engine logic lives in the `git_vendor` library; the binary is a thin
//! wrapper around it.

mod cli;
mod commands;

use std::process::ExitCode;

use clap::Parser;
use git_vendor::exit_codes;

fn main() -> ExitCode {
    let cli = cli::Cli::parse();
    match cli.execute() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:?}", e);
            ExitCode::from(exit_codes::FAILURE)
        }
    }
}
