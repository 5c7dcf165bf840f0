//! gemchat server binary.
//! Run with: cargo run --bin gemchat-server

use std::process::ExitCode;

use gemchat::start_gemchat;

fn main() -> ExitCode {
    start_gemchat::run()
}
