use anyhow::Result;
use clap::Parser;
use ctxbridge::mcp::McpServer;
use ctxbridge::util::mask_sensitive_data;
use ctxbridge::{IndexManager, Settings};
use std::io::Write;

const MIN_WEB_PORT: u16 = 1024;

#[derive(Parser, Debug)]
#[command(name = "ctxbridge")]
#[command(about = "MCP server bridging local codebases to a remote semantic retrieval API")]
struct Args {
    /// Override the configured API base URL
    #[arg(long)]
    base_url: Option<String>,

    /// Override the configured API token
    #[arg(long)]
    token: Option<String>,

    /// Port for the web management interface (runs as a companion service)
    #[arg(long)]
    web_port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr (stdout is the MCP channel). Every record passes
    // through the sensitive-data mask before it is written anywhere.
    env_logger::Builder::from_env(env_logger::Env::default().filter_or("RUST_LOG", "info"))
        .format(|buf, record| {
            let message = mask_sensitive_data(&record.args().to_string());
            writeln!(
                buf,
                "{} [{:<5}] {}",
                buf.timestamp_seconds(),
                record.level(),
                message
            )
        })
        .target(env_logger::Target::Stderr)
        .init();

    let args = Args::parse();

    let settings = Settings::load(args.base_url, args.token)?;
    log::info!(
        "configuration: index_dir={}, batch_size={}, token={}",
        settings.index_dir.display(),
        settings.batch_size,
        settings.masked_token()
    );
    log::info!("API base_url={}", settings.base_url);
    if settings.token_is_unconfigured() {
        log::warn!("token is not configured; search_context calls will be refused until it is set");
    }

    if let Some(port) = args.web_port {
        if port < MIN_WEB_PORT {
            anyhow::bail!("--web-port must be between {} and 65535, got {}", MIN_WEB_PORT, port);
        }
        log::warn!(
            "--web-port {} requested; the web management interface ships as a companion service and is not part of this binary",
            port
        );
    }

    let manager = IndexManager::new(settings)?;
    let server = McpServer::new(manager);
    server.run().await?;

    Ok(())
}
