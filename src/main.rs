use clap::Parser;
use ora_wallet::cli::{exit_code, Cli};
use ora_wallet::logging::init_logger;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logger(cli.verbose);

    if let Err(err) = cli.run().await {
        eprintln!("Error: {:#}", err);
        std::process::exit(exit_code(&err));
    }
}
