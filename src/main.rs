use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use nsecwalk::error::{ConfigError, InputError};
use nsecwalk::input::feed_seeds;
use nsecwalk::{Discovery, DnsClient, ResolverPool, WalkConfig, Walker};
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Dump the names of DNSSEC zones by walking their NSEC chains.
///
/// Zones are read one per line from stdin unless DOMAIN is given.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about=None)]
struct Args {
    domain: Option<String>,

    /// Workers per pool
    #[arg(short, long, default_value_t = 20)]
    concurrency: usize,

    /// Log progress and errors to stderr
    #[arg(short, long)]
    verbose: bool,

    /// Use only this resolver (IP, IP:PORT or hostname)
    #[arg(short, long)]
    resolver: Option<String>,

    /// File with one resolver IP per line to rotate through
    #[arg(long, conflicts_with = "resolver")]
    resolvers: Option<PathBuf>,

    #[arg(short, long, default_value_t = 53)]
    port: u16,

    /// Transport failures tolerated per step
    #[arg(long, default_value_t = 5)]
    retries: u32,

    /// Seconds to wait for each answer
    #[arg(long, default_value_t = 5)]
    timeout: u64,
}

impl Args {
    fn config(&self) -> WalkConfig {
        WalkConfig {
            concurrency: self.concurrency,
            port: self.port,
            max_retries: self.retries,
            timeout: Duration::from_secs(self.timeout),
            ..WalkConfig::default()
        }
    }

    async fn pool(&self) -> Result<ResolverPool, ConfigError> {
        match (&self.resolver, &self.resolvers) {
            (Some(addr), _) => ResolverPool::fixed(addr, self.port).await,
            (None, Some(path)) => ResolverPool::from_file(path, self.port),
            (None, None) => ResolverPool::system(self.port),
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "nsecwalk=debug" } else { "off" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

/// Prints names as they come. Returning drops `rx`, which stops the walk.
async fn print_names(mut rx: mpsc::Receiver<Discovery>) -> io::Result<()> {
    let mut out = tokio::io::stdout();
    while let Some(found) = rx.recv().await {
        let mut line = found.name;
        line.push('\n');
        out.write_all(line.as_bytes()).await?;
        out.flush().await?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    let config = args.config();
    if let Err(e) = config.validate() {
        eprintln!("{e}");
        return ExitCode::FAILURE;
    }
    let pool = match args.pool().await {
        Ok(pool) => pool,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };
    info!(resolvers = ?pool.addrs(), fixed = pool.is_fixed(), "resolvers ready");

    let (sink, names) = mpsc::channel(config.queue_capacity);
    let printer = tokio::spawn(print_names(names));

    let (walker, seeds) = Walker::new(DnsClient::new(&config), pool, config, sink);
    let cancel = walker.cancellation_token();
    let walk = tokio::spawn(walker.run());

    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted, stopping");
                cancel.cancel();
            }
        }
    });

    let feed = async {
        match &args.domain {
            Some(domain) => feed_seeds(domain.as_bytes(), &seeds).await,
            None => feed_seeds(BufReader::new(tokio::io::stdin()), &seeds).await,
        }
    };
    // Workers stop draining seeds once cancelled; reading more would block.
    let fed = tokio::select! {
        fed = feed => fed,
        _ = cancel.cancelled() => Ok(0),
    };
    drop(seeds);

    let status = match fed {
        Ok(count) => {
            info!(zones = count, "input read");
            ExitCode::SUCCESS
        }
        Err(InputError(e)) => {
            eprintln!("Failed to get user input: {e}");
            cancel.cancel();
            ExitCode::FAILURE
        }
    };

    if let Err(e) = walk.await {
        eprintln!("walk failed: {e}");
        return ExitCode::FAILURE;
    }
    match printer.await {
        Ok(Err(e)) if e.kind() != io::ErrorKind::BrokenPipe => {
            eprintln!("cannot write output: {e}");
            ExitCode::FAILURE
        }
        _ => status,
    }
}
