use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser;
use env_logger::{Env, Target};
use log::{error, info, warn};
use sigv4_proxy::aws::{self, SigningAlgorithm};
use sigv4_proxy::{default_context, Args, Relay, SigningTransport};
use sigv4_proxy_http_send_reqwest::ReqwestHttpSend;
use tokio::io::BufReader;

mod signal;

#[tokio::main]
async fn main() -> ExitCode {
    // stdout carries protocol messages, so logs go to stderr.
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .target(Target::Stderr)
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> anyhow::Result<()> {
    info!("AWS SigV4 signing proxy for MCP v{}", env!("CARGO_PKG_VERSION"));

    let config = Args::parse()
        .into_config()
        .context("configuration error")?;
    info!("target URL: {}", config.target_url);
    info!("region: {}", config.region);
    info!("service: {}", config.service_name);
    info!("signature version: {}", config.algorithm);
    info!("profile: {}", config.profile);
    info!("prefer event streams: {}", config.enable_sse);
    if let Some(timeout) = config.timeout {
        info!("request timeout: {}s", timeout.as_secs());
    }
    if !config.headers.is_empty() {
        info!(
            "extra headers: {:?}",
            config.headers.keys().collect::<Vec<_>>()
        );
    }

    let mut builder = reqwest::Client::builder();
    if let Some(timeout) = config.timeout {
        builder = builder.timeout(timeout);
    }
    let client = builder.build().context("failed to build HTTP client")?;

    let signer = aws::default_signer(default_context(), &config);
    let cred = signer.load_credential().await.context(
        "failed to load AWS credentials (configure them with AWS_ACCESS_KEY_ID and \
         AWS_SECRET_ACCESS_KEY, or in ~/.aws/credentials)",
    )?;
    info!(
        "AWS credentials loaded (access key: {})",
        cred.masked_access_key_id()
    );
    if cred.session_token.is_some() {
        info!("session token present");
    }
    if config.algorithm == SigningAlgorithm::V4a {
        warn!("SigV4a signing is not available, requests will fail until v4 is selected");
    }

    let transport = SigningTransport::new(signer, ReqwestHttpSend::new(client))
        .with_headers(config.headers.clone());
    let mut relay = Relay::new(transport, config.target_url.clone(), config.enable_sse);

    info!("proxy is ready to accept MCP messages on stdin");
    relay
        .run(
            BufReader::new(tokio::io::stdin()),
            tokio::io::stdout(),
            signal::shutdown(),
        )
        .await
        .context("relay failed")?;

    info!("proxy stopped");
    Ok(())
}
