//! Webhook HTTP server: provider routes, health, and the message pipeline.
//!
//! Each inbound message runs the full pipeline sequentially: agent init (wallet
//! restore + persist), streamed agent turn, mint, delivery. Requests are
//! independent tasks; there are no timeouts and no inbound authentication.

use crate::agent;
use crate::chain::{reply_token_id, EvmClient, NftContract};
use crate::channels::{
    ChannelRegistry, InboundMessage, SmsChannel, TwilioClient, WhatsAppChannel,
};
use crate::config::{self, Config, Secrets};
use crate::llm::GaiaClient;
use crate::session::{thread_key, SessionStore};
use crate::tools::WalletToolset;
use crate::wallet::{AgentWallet, WalletStore};
use anyhow::{Context, Result};
use axum::{
    extract::{Form, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use ethers_signers::{LocalWallet, Signer};
use serde::Deserialize;
use serde_json::json;
use std::str::FromStr;
use std::sync::Arc;

/// Fixed TwiML acknowledgment returned on both the success and the error path.
pub const ACK_BODY: &str = "<Response></Response>";

/// Message that clears the sender's conversation thread.
const NEW_THREAD_TRIGGER: &str = "/new";

/// Shared state for the webhook server.
#[derive(Clone)]
pub struct GatewayState {
    pub config: Arc<Config>,
    pub secrets: Arc<Secrets>,
    pub gaia: GaiaClient,
    pub model: String,
    pub network_id: String,
    pub evm: EvmClient,
    pub contract: NftContract,
    pub mint_signer: LocalWallet,
    pub wallet_store: WalletStore,
    pub session_store: Arc<SessionStore>,
    pub channels: Arc<ChannelRegistry>,
}

/// Provider webhook form body. Missing fields pass through as empty strings, uninspected.
#[derive(Debug, Deserialize)]
struct WebhookForm {
    #[serde(default, rename = "From")]
    from: String,
    #[serde(default, rename = "Body")]
    body: String,
}

/// Run the webhook server until SIGINT/SIGTERM.
pub async fn run_gateway(config: Config, secrets: Secrets) -> Result<()> {
    let gaia = GaiaClient::new(config.agent.base_url.clone(), secrets.agent_api_key.clone());
    let model = config::resolve_model(&config.agent);
    let network_id = config::resolve_network_id(&config.agent);
    let evm = EvmClient::new(secrets.chain_rpc_url.clone());

    let contract_address = config::resolve_contract_address(&config.chain);
    let contract_address = contract_address
        .parse()
        .with_context(|| format!("parsing contract address {}", contract_address))?;
    let fallback_gas = config.chain.gas_limit.unwrap_or(300_000);
    let contract = NftContract::new(contract_address, evm.clone(), fallback_gas);

    let mint_signer = LocalWallet::from_str(secrets.mint_private_key.trim_start_matches("0x"))
        .context("parsing mint private key")?;
    let wallet_store = WalletStore::new(config::resolve_wallet_file(&config.agent));

    let twilio = Arc::new(TwilioClient::new(
        config::resolve_twilio_api_base(&config.channels.twilio),
        secrets.twilio_account_sid.clone(),
        secrets.twilio_auth_token.clone(),
        secrets.twilio_phone_number.clone(),
    ));
    let channels = Arc::new(ChannelRegistry::new());
    channels
        .register("sms".to_string(), Arc::new(SmsChannel::new(twilio.clone())))
        .await;
    channels
        .register(
            "whatsapp".to_string(),
            Arc::new(WhatsAppChannel::new(twilio)),
        )
        .await;

    let bind = config.gateway.bind.trim().to_string();
    let port = config::resolve_port(&config);

    let state = GatewayState {
        config: Arc::new(config),
        secrets: Arc::new(secrets),
        gaia,
        model,
        network_id,
        evm,
        contract,
        mint_signer,
        wallet_store,
        session_store: Arc::new(SessionStore::new()),
        channels,
    };

    let app = Router::new()
        .route("/", get(health_http))
        .route("/sms", post(sms_webhook))
        .route("/whatsapp", post(whatsapp_webhook))
        .with_state(state);

    let bind_addr = format!("{}:{}", bind, port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("listening for messages on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("webhook server exited")?;
    log::info!("webhook server stopped");
    Ok(())
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received, draining connections");
}

/// GET / returns a simple health JSON (for probes).
async fn health_http(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    Json(json!({
        "runtime": "running",
        "port": config::resolve_port(&state.config),
    }))
}

/// POST /sms — inbound SMS webhook.
async fn sms_webhook(
    State(state): State<GatewayState>,
    Form(form): Form<WebhookForm>,
) -> (StatusCode, &'static str) {
    log::info!("received sms message from {}: {}", form.from, form.body);
    handle_webhook(state, "sms", form).await
}

/// POST /whatsapp — inbound WhatsApp webhook.
async fn whatsapp_webhook(
    State(state): State<GatewayState>,
    Form(form): Form<WebhookForm>,
) -> (StatusCode, &'static str) {
    log::info!("received whatsapp message from {}: {}", form.from, form.body);
    handle_webhook(state, "whatsapp", form).await
}

/// Run the pipeline; any error collapses to a logged 500 with the same fixed body.
async fn handle_webhook(
    state: GatewayState,
    channel_id: &str,
    form: WebhookForm,
) -> (StatusCode, &'static str) {
    let msg = InboundMessage {
        channel_id: channel_id.to_string(),
        from: form.from,
        body: form.body,
    };
    match process_inbound_message(&state, msg).await {
        Ok(()) => (StatusCode::OK, ACK_BODY),
        Err(e) => {
            log::error!("handling {} message failed: {:#}", channel_id, e);
            (StatusCode::INTERNAL_SERVER_ERROR, ACK_BODY)
        }
    }
}

/// The pipeline for one inbound message: agent init → streamed turn → mint → deliver.
async fn process_inbound_message(state: &GatewayState, msg: InboundMessage) -> Result<()> {
    let thread_id = thread_key(&msg.channel_id, &msg.from);

    if msg.body.trim().eq_ignore_ascii_case(NEW_THREAD_TRIGGER) {
        state.session_store.reset(&thread_id).await;
        deliver(state, &msg, "Started a new conversation.").await?;
        return Ok(());
    }

    // Agent init is redone per request: restore the wallet from the persisted blob,
    // rewrite the file, build the toolset.
    let (wallet, toolset) = initialize_agent(state)
        .map_err(|e| {
            log::error!("failed to initialize agent: {:#}", e);
            e
        })?;
    log::debug!(
        "agent wallet {:?} on {}",
        wallet.address(),
        wallet.network_id()
    );

    state.session_store.get_or_create(&thread_id).await;
    state
        .session_store
        .append_message(&thread_id, "user", &msg.body)
        .await
        .map_err(anyhow::Error::msg)?;

    let mut sink = |_: &str| {};
    let reply = agent::run_turn(
        &state.session_store,
        &thread_id,
        &state.gaia,
        &state.model,
        Some(WalletToolset::definitions()),
        Some(&toolset),
        Some(&mut sink),
    )
    .await
    .context("agent turn failed")?;

    // Mint the reply as token metadata before delivering it.
    let token_id = reply_token_id();
    let tx_hash = state
        .contract
        .mint(&state.mint_signer, state.mint_signer.address(), token_id, &reply)
        .await
        .context("minting reply failed")?;
    log::info!("minted nft {} with transaction hash {:?}", token_id, tx_hash);

    deliver(state, &msg, &reply).await
}

/// Build the agent's wallet and toolset; the wallet file is rewritten exactly once.
fn initialize_agent(state: &GatewayState) -> Result<(AgentWallet, WalletToolset)> {
    let blob = state.wallet_store.load()?;
    let wallet = AgentWallet::restore(
        blob.as_deref(),
        &state.network_id,
        &state.secrets.agent_wallet_key,
    )?;
    state.wallet_store.persist(&wallet.export()?)?;
    let toolset = WalletToolset::new(wallet.address(), wallet.network_id(), state.evm.clone());
    Ok((wallet, toolset))
}

/// Send the reply back over the originating channel.
async fn deliver(state: &GatewayState, msg: &InboundMessage, text: &str) -> Result<()> {
    let channel = state
        .channels
        .get(&msg.channel_id)
        .await
        .with_context(|| format!("no channel registered for {}", msg.channel_id))?;
    channel
        .send_message(&msg.from, text)
        .await
        .map_err(anyhow::Error::msg)
        .with_context(|| format!("delivering reply to {}", msg.from))?;
    log::info!("{} reply sent to {}", msg.channel_id, msg.from);
    Ok(())
}
