//! In-process JSON-RPC node for unit tests.
//!
//! Serves the slice of the Anvil API the fixtures use over wiremock:
//! accounts, balances, clock and block control, unsigned
//! `eth_sendTransaction` with receipts, and canned `eth_call` results keyed
//! by selector. Every request is recorded in arrival order.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use alloy::primitives::{Address, B256, Bytes, U256, keccak256};
use serde_json::{Value, json};
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

use crate::chain::ForkChain;

pub const GENESIS_BLOCK: u64 = 14_000_000;
pub const GENESIS_TIMESTAMP: u64 = 1_640_000_000;

/// Methods issued by receipt and block polling rather than by fixture code.
const POLLING: [&str; 4] = [
    "eth_blockNumber",
    "eth_chainId",
    "eth_getBlockByNumber",
    "eth_getTransactionReceipt",
];

/// A transaction the node accepted.
#[derive(Debug, Clone)]
pub struct SentTx {
    pub hash: B256,
    pub from: Address,
    /// `None` for contract creation.
    pub to: Option<Address>,
    pub input: Bytes,
    pub value: U256,
    pub success: bool,
    pub created: Option<Address>,
}

impl SentTx {
    pub fn selector(&self) -> [u8; 4] {
        let mut selector = [0u8; 4];
        selector.copy_from_slice(&self.input[..4]);
        selector
    }
}

struct NodeState {
    block_number: u64,
    timestamp: u64,
    pending_seconds: u64,
    accounts: Vec<Address>,
    balance: U256,
    calls: HashMap<[u8; 4], Bytes>,
    reverting: Vec<[u8; 4]>,
    sent: Vec<SentTx>,
    receipts: HashMap<B256, Value>,
    requests: Vec<(String, Value)>,
}

impl NodeState {
    fn mine(&mut self, blocks: u64) {
        self.block_number += blocks;
        self.timestamp += self.pending_seconds + blocks;
        self.pending_seconds = 0;
    }

    fn handle(&mut self, method: &str, params: &Value) -> Result<Value, (i64, String)> {
        self.requests.push((method.to_string(), params.clone()));
        match method {
            "eth_accounts" => Ok(json!(self.accounts)),
            "eth_getBalance" => Ok(json!(self.balance)),
            "anvil_impersonateAccount" | "anvil_setBalance" => Ok(Value::Null),
            "evm_increaseTime" => {
                let seconds = params[0].as_u64().unwrap_or_default();
                self.pending_seconds += seconds;
                Ok(json!(seconds))
            }
            "anvil_mine" => {
                let blocks = params[0]
                    .as_str()
                    .and_then(|hex| u64::from_str_radix(hex.trim_start_matches("0x"), 16).ok())
                    .unwrap_or(1);
                self.mine(blocks);
                Ok(Value::Null)
            }
            "eth_chainId" => Ok(json!("0x1")),
            "eth_blockNumber" => Ok(json!(format!("{:#x}", self.block_number))),
            "eth_getBlockByNumber" => Ok(block_json(self.block_number, self.timestamp)),
            "eth_call" => {
                let input = tx_input(&params[0]);
                input
                    .get(..4)
                    .and_then(|s| self.calls.get(s))
                    .map(|output| json!(output))
                    .ok_or((3, "execution reverted".to_string()))
            }
            "eth_sendTransaction" => Ok(json!(self.send(&params[0]))),
            "eth_getTransactionReceipt" => {
                let hash: B256 = serde_json::from_value(params[0].clone()).unwrap();
                Ok(self.receipts.get(&hash).cloned().unwrap_or(Value::Null))
            }
            other => Err((-32601, format!("method {other} not supported"))),
        }
    }

    fn send(&mut self, tx: &Value) -> B256 {
        let from: Address = serde_json::from_value(tx["from"].clone()).unwrap();
        let to: Option<Address> = tx
            .get("to")
            .filter(|v| !v.is_null())
            .map(|v| serde_json::from_value(v.clone()).unwrap());
        let value: U256 = tx
            .get("value")
            .map(|v| serde_json::from_value(v.clone()).unwrap())
            .unwrap_or_default();
        let input = tx_input(tx);

        self.mine(1);
        let nonce = self.sent.len() as u64 + 1;
        let hash = B256::from(U256::from(nonce).to_be_bytes::<32>());
        let success = input
            .get(..4)
            .is_none_or(|s| !self.reverting.iter().any(|r| r.as_slice() == s));
        let created = (to.is_none() && success).then(|| Address::from_word(keccak256(hash)));

        let sent = SentTx {
            hash,
            from,
            to,
            input,
            value,
            success,
            created,
        };
        self.receipts
            .insert(hash, receipt_json(&sent, self.block_number));
        self.sent.push(sent);
        hash
    }
}

fn tx_input(tx: &Value) -> Bytes {
    tx.get("input")
        .or_else(|| tx.get("data"))
        .map(|v| serde_json::from_value(v.clone()).unwrap())
        .unwrap_or_default()
}

/// Receipt in the shape `eth_getTransactionReceipt` returns.
pub fn receipt_json(tx: &SentTx, block_number: u64) -> Value {
    json!({
        "type": "0x2",
        "status": if tx.success { "0x1" } else { "0x0" },
        "cumulativeGasUsed": "0x5208",
        "logs": [],
        "logsBloom": format!("0x{}", "00".repeat(256)),
        "transactionHash": tx.hash,
        "transactionIndex": "0x0",
        "blockHash": B256::from(U256::from(block_number).to_be_bytes::<32>()),
        "blockNumber": format!("{block_number:#x}"),
        "gasUsed": "0x5208",
        "effectiveGasPrice": "0x1",
        "from": tx.from,
        "to": tx.to,
        "contractAddress": tx.created,
    })
}

fn block_json(number: u64, timestamp: u64) -> Value {
    let zero = B256::ZERO;
    json!({
        "hash": B256::from(U256::from(number).to_be_bytes::<32>()),
        "parentHash": zero,
        "sha3Uncles": zero,
        "miner": Address::ZERO,
        "stateRoot": zero,
        "transactionsRoot": zero,
        "receiptsRoot": zero,
        "logsBloom": format!("0x{}", "00".repeat(256)),
        "difficulty": "0x0",
        "number": format!("{number:#x}"),
        "gasLimit": "0x1c9c380",
        "gasUsed": "0x0",
        "timestamp": format!("{timestamp:#x}"),
        "extraData": "0x",
        "mixHash": zero,
        "nonce": "0x0000000000000000",
        "baseFeePerGas": "0x1",
        "uncles": [],
        "transactions": [],
    })
}

/// One ABI word holding `value`.
pub fn word(value: U256) -> Bytes {
    Bytes::from(value.to_be_bytes::<32>().to_vec())
}

pub struct TestNode {
    server: MockServer,
    state: Arc<Mutex<NodeState>>,
}

impl TestNode {
    /// Ten dev accounts `0x0101..01` through `0x0a0a..0a`, 100 ETH each.
    pub async fn start() -> Self {
        let state = Arc::new(Mutex::new(NodeState {
            block_number: GENESIS_BLOCK,
            timestamp: GENESIS_TIMESTAMP,
            pending_seconds: 0,
            accounts: (1..=10u8).map(|i| Address::from([i; 20])).collect(),
            balance: U256::from(100u64) * U256::from(10u64).pow(U256::from(18)),
            calls: HashMap::new(),
            reverting: Vec::new(),
            sent: Vec::new(),
            receipts: HashMap::new(),
            requests: Vec::new(),
        }));

        let server = MockServer::start().await;
        let handler = state.clone();
        Mock::given(method("POST"))
            .respond_with(move |req: &Request| {
                let body: Value = serde_json::from_slice(&req.body).unwrap();
                let method = body["method"].as_str().unwrap_or_default().to_string();
                let outcome = handler.lock().unwrap().handle(&method, &body["params"]);
                let response = match outcome {
                    Ok(result) => json!({"jsonrpc": "2.0", "id": body["id"], "result": result}),
                    Err((code, message)) => json!({
                        "jsonrpc": "2.0",
                        "id": body["id"],
                        "error": {"code": code, "message": message},
                    }),
                };
                ResponseTemplate::new(200).set_body_json(response)
            })
            .mount(&server)
            .await;

        Self { server, state }
    }

    pub fn chain(&self) -> ForkChain {
        ForkChain::connect(&self.server.uri()).unwrap()
    }

    pub fn account(&self, index: usize) -> Address {
        self.state.lock().unwrap().accounts[index]
    }

    /// Answer `eth_call`s with this selector with `output`.
    pub fn on_call(&self, selector: [u8; 4], output: Bytes) {
        self.state.lock().unwrap().calls.insert(selector, output);
    }

    /// Mine transactions with this selector with a failed status.
    pub fn revert_on(&self, selector: [u8; 4]) {
        self.state.lock().unwrap().reverting.push(selector);
    }

    pub fn set_balance(&self, wei: U256) {
        self.state.lock().unwrap().balance = wei;
    }

    pub fn sent(&self) -> Vec<SentTx> {
        self.state.lock().unwrap().sent.clone()
    }

    /// Requests in arrival order, without receipt and block polling.
    pub fn requests(&self) -> Vec<(String, Value)> {
        self.state
            .lock()
            .unwrap()
            .requests
            .iter()
            .filter(|(method, _)| !POLLING.contains(&method.as_str()))
            .cloned()
            .collect()
    }

    pub fn methods(&self) -> Vec<String> {
        self.requests().into_iter().map(|(method, _)| method).collect()
    }
}
