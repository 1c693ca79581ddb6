use std::process::ExitCode;

use contagion::runner::run_with_args;

fn main() -> ExitCode {
    match run_with_args(|_, _| Ok(())) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
