use std::net::Ipv4Addr;
use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use crab_printer_sim::{
    AddressProvider, Config, DEFAULT_PORT, ImageBitmaps, JobClassifier, JobConsumer,
    LocalAddressProvider, LogSink, PrinterServer, StartResult, TestPrintClient, escpos, logger,
};

/// Network thermal printer simulator
#[derive(Debug, Parser)]
#[command(name = "crab-printer-sim", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the simulator until Ctrl-C (default)
    Serve {
        /// Listen port
        #[arg(long, env = "PRINTER_PORT")]
        port: Option<u16>,
        /// Save decoded raster receipts here
        #[arg(long, env = "PRINTER_OUTPUT_DIR")]
        output_dir: Option<PathBuf>,
    },
    /// Send the test ticket to a printer
    TestPrint {
        /// Target host, defaults to this machine's LAN address
        #[arg(long)]
        host: Option<Ipv4Addr>,
        #[arg(long, default_value_t = DEFAULT_PORT)]
        port: u16,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    let mut config = Config::from_env();
    logger::init_logger(&config.log_level, config.log_dir.as_deref());

    match cli.command.unwrap_or(Command::Serve {
        port: None,
        output_dir: None,
    }) {
        Command::Serve { port, output_dir } => {
            if let Some(port) = port {
                config.server.port = port;
            }
            if output_dir.is_some() {
                config.output_dir = output_dir;
            }
            serve(config).await
        }
        Command::TestPrint { host, port } => test_print(host, port).await,
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    tracing::info!("🦀 Crab printer simulator starting...");

    let server = PrinterServer::new(config.server.clone(), LocalAddressProvider);
    let jobs = server.take_jobs().context("job queue already taken")?;

    match server.start().await {
        StartResult::Started | StartResult::AlreadyRunning => {}
        StartResult::NoAddressAvailable => bail!("Not connected to network"),
        StartResult::Error(e) => return Err(e).context("failed to start printer server"),
        StartResult::Cancelled => return Ok(()),
    }

    let mut consumer = JobConsumer::new(
        JobClassifier::new(ImageBitmaps),
        LogSink::new(config.output_dir.clone()),
    );

    tokio::select! {
        result = consumer.run(&server, jobs) => {
            result.context("Something went wrong while printing")?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Ctrl-C received, shutting down");
        }
    }

    server.stop().await;
    let stats = consumer.stats();
    tracing::info!(
        text = stats.text,
        raster = stats.raster,
        dropped = stats.dropped,
        "printer simulator stopped"
    );
    Ok(())
}

async fn test_print(host: Option<Ipv4Addr>, port: u16) -> anyhow::Result<()> {
    let ip = host
        .or_else(|| LocalAddressProvider.local_address())
        .context("Not connected to network")?;

    let client = TestPrintClient::new(&ip.to_string(), port)?;
    client
        .send(&escpos::test_page(&ip.to_string(), port))
        .await
        .with_context(|| format!("failed to send test ticket to {ip}:{port}"))?;

    tracing::info!(%ip, port, "test ticket sent");
    Ok(())
}
