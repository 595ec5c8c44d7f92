use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    vyx::logging::init();

    match vyx::run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("vyx: {err:#}");
            ExitCode::from(2)
        }
    }
}
