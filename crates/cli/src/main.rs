use std::process::ExitCode;

fn main() -> ExitCode {
    storedesk_cli::run()
}
