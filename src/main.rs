use clap::Parser;
use timetable_desk::Cli;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "timetable_desk=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(error) = timetable_desk::run(Cli::parse()).await {
        eprintln!("{error}");
        std::process::exit(1);
    }
}
