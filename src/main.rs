use std::process::ExitCode;

fn main() -> ExitCode {
    match midas_nowcast::app::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::from(err.exit_code())
        }
    }
}
