use clap::Parser;
use taskproxy::cli::ClientArgs;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = ClientArgs::parse();
    if let Err(e) = taskproxy::client::run(&args.socket_path, args.command).await {
        eprintln!("taskproxyctl: {e}");
        std::process::exit(1);
    }
}
