use std::io::{self, Write};
use std::process::ExitCode;

use bulkd::LaunchError;

fn main() -> ExitCode {
    match bulkd::run_server() {
        Ok(()) => ExitCode::SUCCESS,
        Err(LaunchError::Config(error)) if error.is_informational() => {
            let _ = error.print();
            ExitCode::SUCCESS
        }
        Err(LaunchError::Config(error)) => {
            let _ = error.print();
            ExitCode::from(2)
        }
        Err(error) => {
            let _ = writeln!(io::stderr().lock(), "bulkd: {error}");
            ExitCode::FAILURE
        }
    }
}
