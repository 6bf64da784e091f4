use clap::Parser;
use tracing_subscriber::EnvFilter;
use xlpatch::cli::{Cli, Commands};
use xlpatch::server;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if matches!(cli.command, Commands::Serve) {
        if let Err(e) = server::stdio::serve() {
            tracing::error!(error = %e, "stdio server terminated");
            std::process::exit(1);
        }
        return;
    }

    let code = xlpatch::cli::run(cli);
    std::process::exit(code);
}
