//! ethrpc CLI — exercise a JSON-RPC endpoint through the provider core.
//!
//! Usage:
//! ```bash
//! # Test an RPC endpoint
//! ethrpc test --url https://cloudflare-eth.com
//!
//! # Send a raw JSON-RPC call
//! ethrpc call --url https://cloudflare-eth.com --method eth_getBalance \
//!     --params '["0x0000000000000000000000000000000000000000","latest"]'
//!
//! # Fire a burst of requests and report admission outcomes
//! ethrpc bench --url https://cloudflare-eth.com --requests 50 --concurrency 10
//! ```

mod telemetry;

use std::env;
use std::process;
use std::time::Instant;

use anyhow::{anyhow, bail, Context};
use futures::stream::{self, StreamExt};
use serde::Deserialize;
use serde_json::Value;

use ethrpc_core::{Provider, ProviderConfig, RpcProvider, TransportError};
use ethrpc_http::http_provider;
use telemetry::{init_tracing, LogConfig};

/// Contents of a `--config` file.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CliConfig {
    provider: ProviderConfig,
    log: LogConfig,
}

#[tokio::main]
async fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    let config = match load_config(&args[2..]) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {e:#}");
            process::exit(1);
        }
    };
    init_tracing(&config.log);

    let result = match args[1].as_str() {
        "test" => cmd_test(&args[2..], config.provider).await,
        "call" => cmd_call(&args[2..], config.provider).await,
        "bench" => cmd_bench(&args[2..], config.provider).await,
        "version" | "--version" | "-V" => {
            println!("ethrpc {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {other}");
            print_usage();
            process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn print_usage() {
    println!("ethrpc {}", env!("CARGO_PKG_VERSION"));
    println!("Exercise an Ethereum JSON-RPC endpoint\n");
    println!("USAGE:");
    println!("    ethrpc <COMMAND> [FLAGS]\n");
    println!("COMMANDS:");
    println!("    test       Test an RPC endpoint (latency, block number)");
    println!("    call       Send a raw JSON-RPC call");
    println!("    bench      Send a burst of requests and report outcomes");
    println!("    version    Print version");
    println!("    help       Print this help\n");
    println!("FLAGS:");
    println!("    --url <URL>            RPC endpoint URL  [required]");
    println!("    --method <NAME>        Method for call/bench");
    println!("    --params <JSON>        JSON params array for call (default [])");
    println!("    --requests <N>         bench: total requests (default 100)");
    println!("    --concurrency <N>      bench: requests in flight (default 10)");
    println!("    --config <FILE>        JSON file with `provider` and `log` sections");
    println!("    --log-level <LEVEL>    Override the log level");
    println!("    --json-logs            Emit JSON logs on stderr");
}

fn load_config(args: &[String]) -> anyhow::Result<CliConfig> {
    let mut config = match parse_flag(args, "--config") {
        Some(path) => {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("reading config file {path}"))?;
            serde_json::from_str(&text).with_context(|| format!("parsing config file {path}"))?
        }
        None => CliConfig::default(),
    };
    if let Some(level) = parse_flag(args, "--log-level") {
        config.log.level = level;
    }
    if args.iter().any(|a| a == "--json-logs") {
        config.log.json = true;
    }
    Ok(config)
}

fn connect(args: &[String], config: ProviderConfig) -> anyhow::Result<Provider> {
    let url = parse_flag(args, "--url").ok_or_else(|| anyhow!("--url is required"))?;
    Ok(http_provider(url, config)?)
}

async fn cmd_test(args: &[String], config: ProviderConfig) -> anyhow::Result<()> {
    let provider = connect(args, config)?;

    println!("Testing {}...", provider.url());

    let start = Instant::now();
    let block: String = provider
        .call(provider.next_id(), "eth_blockNumber", Value::Null)
        .await?;
    let latency = start.elapsed();

    let block_num = u64::from_str_radix(block.trim_start_matches("0x"), 16)
        .with_context(|| format!("node returned a non-hex block number {block:?}"))?;
    let chain_id: String = provider
        .call(provider.next_id(), "eth_chainId", Value::Null)
        .await?;

    println!("  Status:       OK");
    println!("  Block number: {block_num} ({block})");
    println!("  Chain id:     {chain_id}");
    println!("  Latency:      {}ms", latency.as_millis());

    provider.close().await;
    Ok(())
}

async fn cmd_call(args: &[String], config: ProviderConfig) -> anyhow::Result<()> {
    let method = parse_flag(args, "--method").ok_or_else(|| anyhow!("--method is required"))?;
    let params: Value = match parse_flag(args, "--params") {
        Some(raw) => serde_json::from_str(&raw).context("--params must be valid JSON")?,
        None => Value::Null,
    };
    let provider = connect(args, config)?;

    let resp = provider.request(&method, params, provider.next_id()).await?;
    match resp.into_result() {
        Ok(result) => println!("{}", serde_json::to_string_pretty(&result)?),
        Err(err) => bail!("node returned {err}"),
    }

    provider.close().await;
    Ok(())
}

#[derive(Debug, Default)]
struct BenchTally {
    ok: usize,
    node_errors: usize,
    rate_limited: usize,
    pool_exhausted: usize,
    network: usize,
    other: usize,
}

async fn cmd_bench(args: &[String], config: ProviderConfig) -> anyhow::Result<()> {
    let method = parse_flag(args, "--method").unwrap_or_else(|| "eth_blockNumber".into());
    let requests: usize = parse_flag(args, "--requests")
        .map(|v| v.parse())
        .transpose()
        .context("--requests must be a number")?
        .unwrap_or(100);
    let concurrency: usize = parse_flag(args, "--concurrency")
        .map(|v| v.parse())
        .transpose()
        .context("--concurrency must be a number")?
        .unwrap_or(10)
        .max(1);
    let provider = connect(args, config)?;

    println!("Sending {requests} x {method} to {} ({concurrency} in flight)...", provider.url());

    let start = Instant::now();
    let outcomes: Vec<_> = stream::iter(0..requests)
        .map(|_| provider.request(&method, Value::Null, provider.next_id()))
        .buffer_unordered(concurrency)
        .collect()
        .await;
    let elapsed = start.elapsed();

    let mut tally = BenchTally::default();
    for outcome in outcomes {
        match outcome {
            Ok(resp) if resp.is_ok() => tally.ok += 1,
            Ok(_) => tally.node_errors += 1,
            Err(TransportError::RateLimited) => tally.rate_limited += 1,
            Err(TransportError::PoolExhausted { .. }) => tally.pool_exhausted += 1,
            Err(e) if e.is_network() => tally.network += 1,
            Err(_) => tally.other += 1,
        }
    }

    println!("  Elapsed:        {}ms", elapsed.as_millis());
    println!("  OK:             {}", tally.ok);
    println!("  Node errors:    {}", tally.node_errors);
    println!("  Rate limited:   {}", tally.rate_limited);
    println!("  Pool exhausted: {}", tally.pool_exhausted);
    println!("  Network errors: {}", tally.network);
    println!("  Other errors:   {}", tally.other);

    provider.close().await;
    Ok(())
}

fn parse_flag(args: &[String], flag: &str) -> Option<String> {
    let pos = args.iter().position(|a| a == flag)?;
    args.get(pos + 1).cloned()
}
