use anyhow::Result;
use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Fetch the public YC company listing and append unseen companies to
/// `yc_companies_master.csv` in the working directory.
#[derive(Debug, Parser)]
#[command(name = "ycl-cli", version)]
#[command(about = "YC company ledger sync")]
struct Cli {}

fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn,ycl_sync=info,ycl_storage=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let _cli = Cli::parse();
    init_logging();

    let summary = ycl_sync::run_sync_once().await?;
    println!("{}", summary.summary_line());

    Ok(())
}
