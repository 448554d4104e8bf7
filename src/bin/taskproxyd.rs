use clap::Parser;
use taskproxy::cli::ServeArgs;
use taskproxy::config::Config;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = ServeArgs::parse();
    let config: Config = args.into();

    if let Err(e) = taskproxy::server::run(config).await {
        tracing::error!(error = %e, "task proxy failed");
        eprintln!("taskproxyd: {e}");
        std::process::exit(1);
    }
}
