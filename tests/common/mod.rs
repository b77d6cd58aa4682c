#![allow(dead_code)]

use std::sync::Arc;

use alloy::{
    primitives::{Address, TxHash, address},
    sol,
};
use evm_trigger::{
    MemoryStateStore, StateStore, StreamKind, StreamSettings, Trigger, test_utils::MockChain,
};
use serde_json::{Value, json};

pub const WATCHED: Address = address!("0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa");
pub const OTHER: Address = address!("0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb");
pub const TOKEN: Address = address!("0xcccccccccccccccccccccccccccccccccccccccc");

sol! {
    #[allow(missing_docs)]
    contract TestToken {
        event Transfer(address indexed from, address indexed to, uint256 value);
        event Approval(address indexed owner, address indexed spender, uint256 value);
    }
}

pub const TOKEN_ABI: &str = r#"[
    {"type":"event","name":"Transfer","anonymous":false,"inputs":[
        {"name":"from","type":"address","indexed":true},
        {"name":"to","type":"address","indexed":true},
        {"name":"value","type":"uint256","indexed":false}]},
    {"type":"event","name":"Approval","anonymous":false,"inputs":[
        {"name":"owner","type":"address","indexed":true},
        {"name":"spender","type":"address","indexed":true},
        {"name":"value","type":"uint256","indexed":false}]}
]"#;

/// Mock chain and in-memory state shared by one test.
pub struct Setup {
    pub chain: Arc<MockChain>,
    pub store: Arc<MemoryStateStore>,
}

impl Setup {
    #[must_use]
    pub fn new(head: u64) -> Self {
        Self { chain: Arc::new(MockChain::new(head)), store: Arc::new(MemoryStateStore::new()) }
    }

    #[must_use]
    pub fn trigger(&self, settings: StreamSettings) -> Trigger {
        Trigger::new(self.chain.clone(), self.store.clone(), settings)
    }

    /// Stores a cursor for `stream` as if a previous cycle had finished at `height`.
    pub async fn seed_cursor(&self, stream: StreamKind, height: u64) -> anyhow::Result<()> {
        let record = match stream {
            StreamKind::Transaction => {
                json!({ "lastBlockHeight": height.to_string(), "recentHashes": [] })
            }
            _ => json!({ "lastBlockHeight": height.to_string() }),
        };
        self.store.set(stream.state_key(), record).await?;
        Ok(())
    }

    pub async fn stored(&self, stream: StreamKind) -> Value {
        self.store.snapshot().await.get(stream.state_key()).cloned().unwrap_or(Value::Null)
    }

    pub async fn stored_height(&self, stream: StreamKind) -> Option<String> {
        self.stored(stream).await["lastBlockHeight"].as_str().map(str::to_string)
    }

    pub async fn stored_hashes(&self) -> anyhow::Result<Vec<TxHash>> {
        let hashes = self.stored(StreamKind::Transaction).await["recentHashes"].clone();
        Ok(serde_json::from_value(hashes)?)
    }
}
