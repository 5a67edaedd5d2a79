//! tfport CLI: Terraform-style modules in, TypeScript out.

use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "tfport",
    version,
    about = "Translate Terraform-style module trees into TypeScript programs"
)]
struct Cli {
    #[command(subcommand)]
    command: tfport::cli::Commands,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "tfport=warn".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = tfport::cli::dispatch(cli.command) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
