//! WalletConnect Interceptor CLI
//!
//! Command-line tool for inspecting pairing URIs and namespace grants, and for
//! exercising the interceptor against the in-memory relay or a relay bridge.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{Level, info, warn};
use tracing_subscriber::FmtSubscriber;
use wc_interceptor_core::transport::{BridgeConfig, BridgeTransport, MemoryTransport, PeerScript};
use wc_interceptor_core::{
    ActionRequest, EIP155_NAMESPACE, ErrorReason, InterceptorConfig, Metadata, PairingUri,
    Proposal, ProposalNamespace, RequestOutcome, Session, WalletConnectInterceptor,
    build_approved_namespaces,
};

const DEMO_TOPIC: &str = "7f6e504bfad60b485450578e05678ed3e8e8c4751d3c6160be17160d63ec90f9";
const DEMO_SYM_KEY: &str = "587d5484ce2a2a6ee3ba1962fdd7e8588e06200c46823bd18fbd67def96ad303";

#[derive(Parser)]
#[command(name = "wc-interceptor")]
#[command(about = "WalletConnect session interceptor CLI", version)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a pairing URI and print its parts
    ParseUri {
        /// Pairing URI (wc:...)
        uri: String,
    },

    /// Print the namespaces that would be granted to a proposal
    Namespaces {
        /// Connected account address
        #[arg(short, long)]
        account: String,

        /// Supported chain ids
        #[arg(short, long, value_delimiter = ',', default_value = "1,137")]
        chains: Vec<u64>,

        /// Methods the proposal requires
        #[arg(
            short,
            long,
            value_delimiter = ',',
            default_value = "eth_sendTransaction,personal_sign"
        )]
        methods: Vec<String>,
    },

    /// Run a full session lifecycle on the in-memory relay
    Simulate {
        /// Name the simulated dApp advertises
        #[arg(long, default_value = "Snapshot")]
        peer_name: String,

        /// Peer name the connection must match
        #[arg(long)]
        expect: Option<String>,

        /// Active chain id
        #[arg(long, default_value_t = 1)]
        chain: u64,

        /// Delay before the dApp proposes, in milliseconds
        #[arg(long, default_value_t = 1500)]
        propose_after_ms: u64,
    },

    /// Connect to a dApp through a relay bridge and print its requests
    Connect {
        /// Relay bridge WebSocket URL
        #[arg(long, env = "WC_BRIDGE_URL")]
        bridge_url: String,

        /// Relay project id
        #[arg(long, env = "WC_PROJECT_ID")]
        project_id: String,

        /// Pairing URI copied from the dApp
        #[arg(long)]
        uri: String,

        /// DAO account address
        #[arg(long)]
        account: String,

        /// Active chain id
        #[arg(long, default_value_t = 1)]
        chain: u64,

        /// Peer name the connection must match
        #[arg(long)]
        expect: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    FmtSubscriber::builder()
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .pretty()
        .init();

    match cli.command {
        Commands::ParseUri { uri } => parse_uri(&uri)?,
        Commands::Namespaces {
            account,
            chains,
            methods,
        } => print_namespaces(&account, &chains, methods)?,
        Commands::Simulate {
            peer_name,
            expect,
            chain,
            propose_after_ms,
        } => {
            simulate(
                &peer_name,
                expect.as_deref(),
                chain,
                Duration::from_millis(propose_after_ms),
            )
            .await?
        }
        Commands::Connect {
            bridge_url,
            project_id,
            uri,
            account,
            chain,
            expect,
        } => connect(&bridge_url, &project_id, &uri, &account, chain, expect.as_deref()).await?,
    }

    Ok(())
}

fn parse_uri(uri: &str) -> Result<()> {
    let parsed = PairingUri::parse(uri)?;
    if parsed.is_expired() {
        warn!(topic = %parsed.topic, "Pairing URI has expired");
    }
    println!("{}", serde_json::to_string_pretty(&parsed)?);
    Ok(())
}

fn print_namespaces(account: &str, chains: &[u64], methods: Vec<String>) -> Result<()> {
    let proposal = Proposal::new(0, "cli", Metadata::default()).with_required(
        EIP155_NAMESPACE,
        ProposalNamespace {
            chains: vec![],
            methods,
            events: vec![],
        },
    );
    let granted = build_approved_namespaces(&proposal, account, chains)?;
    println!("{}", serde_json::to_string_pretty(&granted)?);
    Ok(())
}

fn print_sessions(sessions: &[Session]) {
    info!(count = sessions.len(), "Session list updated");
    for session in sessions {
        info!(topic = %session.topic, peer = %session.peer_metadata.name, "  active session");
    }
}

fn print_request(request: &ActionRequest) {
    let summary = json!({
        "id": request.id,
        "topic": request.topic,
        "chainId": request.chain_id,
        "method": request.request.method,
        "transaction": request.transaction(),
        "params": request.request.params,
    });
    match serde_json::to_string_pretty(&summary) {
        Ok(text) => println!("{text}"),
        Err(e) => warn!(error = %e, "Failed to render request"),
    }
}

async fn simulate(
    peer_name: &str,
    expect: Option<&str>,
    chain: u64,
    propose_after: Duration,
) -> Result<()> {
    info!("Running session lifecycle on the in-memory relay...");

    let relay = MemoryTransport::new();
    let mut chains = vec![1, 137];
    if !chains.contains(&chain) {
        chains.push(chain);
    }
    let config = InterceptorConfig::new("simulation").with_supported_chains(chains);
    let interceptor = WalletConnectInterceptor::new(config, Arc::new(relay.clone()))?;
    interceptor.initialize().await?;

    let account = "0x1234567890123456789012345678901234567890";
    interceptor.context().set_account(Some(account));
    interceptor.context().set_active_chain(Some(chain));

    let handle = interceptor.handle(print_sessions);
    let _requests = handle.on_action_request(print_request);

    let peer = Metadata::new(
        peer_name,
        "Simulated dApp",
        format!("https://{}.example", peer_name.to_lowercase().replace(' ', "-")),
    );
    relay.script_peer(DEMO_TOPIC, PeerScript::new(peer).with_delay(propose_after));

    let uri = format!("wc:{DEMO_TOPIC}@2?relay-protocol=irn&symKey={DEMO_SYM_KEY}");
    info!(peer = peer_name, expect = ?expect, "Connecting");
    let session = handle.connect(&uri, expect).await?;
    info!(topic = %session.topic, "Connected");

    let request_id = relay.emit_request(
        session.topic.as_str(),
        format!("eip155:{chain}"),
        "eth_sendTransaction",
        json!([{
            "from": account,
            "to": "0x00000000000000000000000000000000000000ff",
            "data": "0x",
            "value": "0x0"
        }]),
    );
    relay.emit_request(
        session.topic.as_str(),
        "eip155:999999",
        "personal_sign",
        json!(["0xdeadbeef", account]),
    );
    tokio::time::sleep(Duration::from_millis(100)).await;

    interceptor
        .client()
        .respond_request(
            &session.topic,
            request_id,
            RequestOutcome::Error(ErrorReason::user_rejected()),
        )
        .await?;
    info!(request_id, "Declined request");

    handle.disconnect(&session.topic).await;
    info!(remaining = handle.sessions().len(), "Disconnected");

    Ok(())
}

async fn connect(
    bridge_url: &str,
    project_id: &str,
    uri: &str,
    account: &str,
    chain: u64,
    expect: Option<&str>,
) -> Result<()> {
    let transport = BridgeTransport::connect(BridgeConfig::new(bridge_url))
        .await
        .context("failed to reach relay bridge")?;

    let interceptor =
        WalletConnectInterceptor::new(InterceptorConfig::new(project_id), Arc::new(transport))?;
    interceptor.initialize().await?;
    if !interceptor.context().supported_chains().contains(&chain) {
        bail!("chain {chain} is not supported");
    }
    interceptor.context().set_account(Some(account));
    interceptor.context().set_active_chain(Some(chain));

    let handle = interceptor.handle(print_sessions);
    let _requests = handle.on_action_request(print_request);

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let session = handle
        .connect_with_cancel(uri, expect, cancel.clone())
        .await?;
    info!(
        topic = %session.topic,
        peer = %session.peer_metadata.name,
        "Connected; waiting for requests (Ctrl-C to disconnect)"
    );

    cancel.cancelled().await;
    handle.disconnect(&session.topic).await;
    info!("Disconnected");
    Ok(())
}
