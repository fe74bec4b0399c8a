#![forbid(unsafe_code)]

use std::process::ExitCode;

fn main() -> ExitCode {
    git_wt::cli::main()
}
