//! End-to-end pipeline test: the webhook server runs against in-test mock
//! collaborators (Gaia SSE endpoint, EVM JSON-RPC node, Twilio API) and one
//! inbound SMS drives the whole pipeline — agent turn, mint, delivery.

use axum::{
    extract::{Form, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use ethers_core::utils::hex;
use ethers_signers::{LocalWallet, Signer};
use lib::config::{Config, Secrets};
use lib::gateway::{self, ACK_BODY};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const TEST_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
const AGENT_REPLY: &str = "Hello from the agent";
const SENDER: &str = "+15551234567";

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind free port");
    listener.local_addr().expect("local_addr").port()
}

fn temp_wallet_file() -> PathBuf {
    std::env::temp_dir().join(format!("mintline-e2e-wallet-{}.json", uuid::Uuid::new_v4()))
}

async fn spawn_mock(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

/// Gaia mock: streams the reply in two SSE deltas so accumulation is exercised.
async fn spawn_gaia_mock() -> String {
    async fn completions() -> impl IntoResponse {
        let body = format!(
            "data: {}\n\ndata: {}\n\ndata: [DONE]\n\n",
            json!({"choices": [{"delta": {"content": "Hello from"}}]}),
            json!({"choices": [{"delta": {"content": " the agent"}}]}),
        );
        ([(header::CONTENT_TYPE, "text/event-stream")], body)
    }
    spawn_mock(Router::new().route("/chat/completions", post(completions))).await
}

type RawTxLog = Arc<Mutex<Vec<String>>>;

/// EVM mock: answers the mint's RPC sequence and records raw transactions.
async fn spawn_evm_mock(raw_txs: RawTxLog) -> String {
    async fn rpc(State(raw_txs): State<RawTxLog>, Json(req): Json<Value>) -> Json<Value> {
        let method = req.get("method").and_then(|m| m.as_str()).unwrap_or("");
        let result = match method {
            "eth_chainId" => json!("0x14a34"),
            "eth_getTransactionCount" => json!("0x0"),
            "eth_gasPrice" => json!("0x3b9aca00"),
            "eth_estimateGas" => json!("0x30d40"),
            "eth_getBalance" => json!("0xde0b6b3a7640000"),
            "eth_sendRawTransaction" => {
                let raw = req["params"][0].as_str().unwrap_or("").to_string();
                raw_txs.lock().unwrap().push(raw);
                json!("0x1111111111111111111111111111111111111111111111111111111111111111")
            }
            other => json!({ "unexpected": other }),
        };
        Json(json!({ "jsonrpc": "2.0", "id": req.get("id"), "result": result }))
    }
    spawn_mock(
        Router::new()
            .route("/", post(rpc))
            .with_state(raw_txs),
    )
    .await
}

type DeliveryLog = Arc<Mutex<Vec<HashMap<String, String>>>>;

/// Twilio mock: records message-create form posts.
async fn spawn_twilio_mock(deliveries: DeliveryLog) -> String {
    async fn create_message(
        State(deliveries): State<DeliveryLog>,
        Form(params): Form<HashMap<String, String>>,
    ) -> impl IntoResponse {
        deliveries.lock().unwrap().push(params);
        (StatusCode::CREATED, Json(json!({ "sid": "SM123" })))
    }
    spawn_mock(
        Router::new()
            .route(
                "/2010-04-01/Accounts/:sid/Messages.json",
                post(create_message),
            )
            .with_state(deliveries),
    )
    .await
}

#[tokio::test]
async fn sms_webhook_mints_the_reply_and_delivers_it_to_the_sender() {
    let raw_txs: RawTxLog = Arc::new(Mutex::new(Vec::new()));
    let deliveries: DeliveryLog = Arc::new(Mutex::new(Vec::new()));

    let gaia_base = spawn_gaia_mock().await;
    let evm_base = spawn_evm_mock(raw_txs.clone()).await;
    let twilio_base = spawn_twilio_mock(deliveries.clone()).await;

    let wallet_file = temp_wallet_file();
    let mut config = Config::default();
    config.gateway.port = free_port();
    config.gateway.bind = "127.0.0.1".to_string();
    config.agent.base_url = Some(gaia_base);
    config.agent.wallet_file = Some(wallet_file.clone());
    config.channels.twilio.api_base_url = Some(twilio_base);

    let secrets = Secrets {
        agent_api_key: "gaia".to_string(),
        agent_wallet_key: TEST_KEY.to_string(),
        twilio_account_sid: "AC00000000000000000000000000000000".to_string(),
        twilio_auth_token: "token".to_string(),
        twilio_phone_number: "+15550000000".to_string(),
        chain_rpc_url: evm_base,
        mint_private_key: TEST_KEY.to_string(),
    };

    let port = config.gateway.port;
    tokio::spawn(async move {
        let _ = gateway::run_gateway(config, secrets).await;
    });

    let base = format!("http://127.0.0.1:{}", port);
    let client = reqwest::Client::new();
    for _ in 0..100 {
        if let Ok(resp) = client.get(&base).send().await {
            if resp.status().is_success() {
                break;
            }
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    let resp = client
        .post(format!("{}/sms", base))
        .form(&[("From", SENDER), ("Body", "hello")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    assert_eq!(resp.text().await.unwrap(), ACK_BODY);

    // Delivery went to the sender, from the configured SMS number, with the
    // accumulated (not last-chunk) agent reply.
    let recorded = deliveries.lock().unwrap().clone();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].get("To").map(String::as_str), Some(SENDER));
    assert_eq!(
        recorded[0].get("From").map(String::as_str),
        Some("+15550000000")
    );
    assert_eq!(
        recorded[0].get("Body").map(String::as_str),
        Some(AGENT_REPLY)
    );

    // The mint transaction carries the reply as metadata, addressed to the
    // mint wallet's own address.
    let txs = raw_txs.lock().unwrap().clone();
    assert_eq!(txs.len(), 1);
    let raw = txs[0].trim_start_matches("0x");
    assert!(raw.contains(&hex::encode(AGENT_REPLY.as_bytes())));
    let mint_wallet = LocalWallet::from_str(TEST_KEY.trim_start_matches("0x")).unwrap();
    let recipient_hex = hex::encode(mint_wallet.address().as_bytes());
    assert!(raw.contains(&recipient_hex));

    // Agent init persisted the wallet record.
    assert!(wallet_file.exists());

    // A second message a few milliseconds later mints a different token.
    tokio::time::sleep(Duration::from_millis(5)).await;
    let resp = client
        .post(format!("{}/sms", base))
        .form(&[("From", SENDER), ("Body", "again")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let txs = raw_txs.lock().unwrap().clone();
    assert_eq!(txs.len(), 2);
    assert_ne!(txs[0], txs[1], "token ids from different milliseconds differ");

    let _ = std::fs::remove_file(&wallet_file);
}

#[tokio::test]
async fn whatsapp_webhook_replies_from_the_sandbox_number() {
    let raw_txs: RawTxLog = Arc::new(Mutex::new(Vec::new()));
    let deliveries: DeliveryLog = Arc::new(Mutex::new(Vec::new()));

    let gaia_base = spawn_gaia_mock().await;
    let evm_base = spawn_evm_mock(raw_txs.clone()).await;
    let twilio_base = spawn_twilio_mock(deliveries.clone()).await;

    let wallet_file = temp_wallet_file();
    let mut config = Config::default();
    config.gateway.port = free_port();
    config.gateway.bind = "127.0.0.1".to_string();
    config.agent.base_url = Some(gaia_base);
    config.agent.wallet_file = Some(wallet_file.clone());
    config.channels.twilio.api_base_url = Some(twilio_base);

    let secrets = Secrets {
        agent_api_key: "gaia".to_string(),
        agent_wallet_key: TEST_KEY.to_string(),
        twilio_account_sid: "AC00000000000000000000000000000000".to_string(),
        twilio_auth_token: "token".to_string(),
        twilio_phone_number: "+15550000000".to_string(),
        chain_rpc_url: evm_base,
        mint_private_key: TEST_KEY.to_string(),
    };

    let port = config.gateway.port;
    tokio::spawn(async move {
        let _ = gateway::run_gateway(config, secrets).await;
    });

    let base = format!("http://127.0.0.1:{}", port);
    let client = reqwest::Client::new();
    for _ in 0..100 {
        if let Ok(resp) = client.get(&base).send().await {
            if resp.status().is_success() {
                break;
            }
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    let resp = client
        .post(format!("{}/whatsapp", base))
        .form(&[("From", "whatsapp:+15551234567"), ("Body", "hello")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    assert_eq!(resp.text().await.unwrap(), ACK_BODY);

    let recorded = deliveries.lock().unwrap().clone();
    assert_eq!(recorded.len(), 1);
    // WhatsApp replies go to the prefixed sender, from the fixed sandbox number.
    assert_eq!(
        recorded[0].get("To").map(String::as_str),
        Some("whatsapp:+15551234567")
    );
    assert_eq!(
        recorded[0].get("From").map(String::as_str),
        Some("whatsapp:+14155238886")
    );

    let _ = std::fs::remove_file(&wallet_file);
}
