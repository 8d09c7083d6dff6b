//! slated - recurring and movable tasks in dated markdown notes

use std::process::ExitCode;

fn main() -> ExitCode {
    if let Err(e) = slated::cli::run() {
        eprintln!("Error: {:#}", e);
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
