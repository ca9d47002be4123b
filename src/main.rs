//! Thin CLI driver: parses boot-time options the way the real client binary
//! would, then prints the argv it would hand off to the long-lived server
//! (starting that server is out of scope here).

use std::env;

use blaze_rc::{OptionProcessor, OptionsError, ProcessEnvironment, TerminalInfo};

/// The main entry point. Parses CLI arguments and reports the resolved
/// server-bound argv, or a diagnostic and the matching exit code on failure.
pub fn main() {
    let exit_code = main_inner();
    std::process::exit(exit_code);
}

fn main_inner() -> i32 {
    env_logger::init();

    let argv: Vec<String> = env::args().collect();
    let workspace = match env::current_dir() {
        Ok(dir) => dir,
        Err(e) => {
            eprintln!("ERROR: could not determine working directory: {}", e);
            return blaze_rc::ExitCode::InternalError as i32;
        }
    };

    let environment = ProcessEnvironment::capture();
    let terminal = TerminalInfo::detect();

    match OptionProcessor::parse(&argv, &workspace, environment, terminal, workspace.clone()) {
        Ok(processor) => {
            for arg in processor.build_server_argv() {
                println!("{}", arg);
            }
            0
        }
        Err(err) => {
            eprintln!("ERROR: {}", err);
            exit_code_for(&err)
        }
    }
}

fn exit_code_for(err: &OptionsError) -> i32 {
    err.exit_code() as i32
}
