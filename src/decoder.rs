//! ABI decoding of contract logs into named, JSON-ready arguments.

use alloy::{
    dyn_abi::{DynSolValue, EventExt},
    json_abi::{Event, JsonAbi},
    primitives::{Address, B256, BlockNumber, Bytes, hex},
    rpc::types::Log,
};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::error::TriggerError;

/// Why a log could not be decoded against the configured event.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("expected {expected} topics, log has {actual}")]
    TopicCount { expected: usize, actual: usize },

    #[error("{0}")]
    Abi(String),
}

/// A contract log ready for emission.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEvent {
    #[serde(serialize_with = "crate::types::checksum::serialize")]
    pub address: Address,
    #[serde(serialize_with = "crate::types::decimal::option::serialize")]
    pub block_number: Option<BlockNumber>,
    pub block_hash: Option<B256>,
    pub transaction_hash: Option<B256>,
    pub transaction_index: Option<u64>,
    pub log_index: Option<u64>,
    pub removed: bool,
    #[serde(flatten)]
    pub payload: LogPayload,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum LogPayload {
    Decoded {
        #[serde(rename = "eventName")]
        event_name: String,
        args: Map<String, Value>,
    },
    /// Undecoded log contents. `decode_error` is set when decoding was attempted
    /// and failed.
    Raw {
        data: Bytes,
        topics: Vec<B256>,
        #[serde(rename = "decodeError", skip_serializing_if = "Option::is_none")]
        decode_error: Option<String>,
    },
}

impl LogEvent {
    /// Wraps `log` without decoding it.
    #[must_use]
    pub fn raw(log: &Log, decode_error: Option<String>) -> Self {
        Self::with_payload(
            log,
            LogPayload::Raw {
                data: log.data().data.clone(),
                topics: log.topics().to_vec(),
                decode_error,
            },
        )
    }

    fn with_payload(log: &Log, payload: LogPayload) -> Self {
        Self {
            address: log.address(),
            block_number: log.block_number,
            block_hash: log.block_hash,
            transaction_hash: log.transaction_hash,
            transaction_index: log.transaction_index,
            log_index: log.log_index,
            removed: log.removed,
            payload,
        }
    }

    #[must_use]
    pub fn is_decoded(&self) -> bool {
        matches!(self.payload, LogPayload::Decoded { .. })
    }
}

/// Decodes logs of a single ABI event.
#[derive(Clone, Debug)]
pub struct EventDecoder {
    event: Event,
}

impl EventDecoder {
    #[must_use]
    pub fn new(event: Event) -> Self {
        Self { event }
    }

    /// Looks up `event_name` in a JSON ABI. The ABI may be given either as a
    /// JSON array or as a string holding one.
    ///
    /// # Errors
    ///
    /// Returns [`TriggerError::Configuration`] if the ABI is malformed or does not
    /// declare the event.
    pub fn from_abi(abi: &Value, event_name: &str) -> Result<Self, TriggerError> {
        let abi: JsonAbi = match abi {
            Value::String(raw) => serde_json::from_str(raw),
            other => serde_json::from_value(other.clone()),
        }
        .map_err(|e| TriggerError::config(format!("Invalid ABI JSON: {e}")))?;

        let event = abi
            .event(event_name)
            .and_then(|overloads| overloads.first())
            .ok_or_else(|| TriggerError::config(format!("Event \"{event_name}\" not found in ABI")))?;

        Ok(Self::new(event.clone()))
    }

    #[must_use]
    pub fn event(&self) -> &Event {
        &self.event
    }

    /// Topic0 of logs emitted by this event.
    #[must_use]
    pub fn selector(&self) -> B256 {
        self.event.selector()
    }

    /// Decodes `log`, falling back to a raw record when decoding fails.
    #[must_use]
    pub fn decode(&self, log: &Log) -> LogEvent {
        match self.decode_args(log) {
            Ok(args) => LogEvent::with_payload(
                log,
                LogPayload::Decoded { event_name: self.event.name.clone(), args },
            ),
            Err(err) => LogEvent::raw(log, Some(err.to_string())),
        }
    }

    /// Decodes the log's arguments keyed by parameter name, or by position for
    /// unnamed parameters.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError`] when the log does not fit the event's layout.
    pub fn decode_args(&self, log: &Log) -> Result<Map<String, Value>, DecodeError> {
        let indexed_count = self.event.inputs.iter().filter(|input| input.indexed).count();
        let expected = indexed_count + usize::from(!self.event.anonymous);
        let actual = log.topics().len();
        if expected != actual {
            return Err(DecodeError::TopicCount { expected, actual });
        }

        let decoded = self
            .event
            .decode_log_parts(log.topics().iter().copied(), &log.data().data)
            .map_err(|e| DecodeError::Abi(e.to_string()))?;

        let mut indexed = decoded.indexed.into_iter();
        let mut body = decoded.body.into_iter();
        let mut args = Map::new();
        for (position, input) in self.event.inputs.iter().enumerate() {
            let value = if input.indexed { indexed.next() } else { body.next() };
            let Some(value) = value else {
                return Err(DecodeError::Abi(format!("missing value for parameter {position}")));
            };
            let key = if input.name.is_empty() { position.to_string() } else { input.name.clone() };
            args.insert(key, sol_value_to_json(&value));
        }
        Ok(args)
    }
}

/// Converts a decoded ABI value into JSON.
///
/// Integers become decimal strings, byte values become `0x` hex, and addresses
/// are rendered with their checksum.
#[must_use]
pub fn sol_value_to_json(value: &DynSolValue) -> Value {
    match value {
        DynSolValue::Bool(b) => Value::Bool(*b),
        DynSolValue::Int(i, _) => Value::String(i.to_string()),
        DynSolValue::Uint(u, _) => Value::String(u.to_string()),
        DynSolValue::Address(a) => Value::String(a.to_checksum(None)),
        DynSolValue::Function(f) => Value::String(hex::encode_prefixed(f.as_slice())),
        DynSolValue::FixedBytes(word, size) => {
            Value::String(hex::encode_prefixed(&word.as_slice()[..*size]))
        }
        DynSolValue::Bytes(bytes) => Value::String(hex::encode_prefixed(bytes)),
        DynSolValue::String(s) => Value::String(s.clone()),
        DynSolValue::Array(items)
        | DynSolValue::FixedArray(items)
        | DynSolValue::Tuple(items) => Value::Array(items.iter().map(sol_value_to_json).collect()),
        #[allow(unreachable_patterns)]
        _ => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::{
        primitives::{LogData, U256, address, b256},
        sol,
        sol_types::SolEvent,
    };
    use serde_json::json;

    sol! {
        event Transfer(address indexed from, address indexed to, uint256 value);
    }

    const TOKEN: Address = address!("0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48");
    const FROM: Address = address!("0x1111111111111111111111111111111111111111");
    const TO: Address = address!("0x2222222222222222222222222222222222222222");

    fn transfer_abi() -> Value {
        json!([{
            "type": "event",
            "name": "Transfer",
            "anonymous": false,
            "inputs": [
                {"name": "from", "type": "address", "indexed": true},
                {"name": "to", "type": "address", "indexed": true},
                {"name": "value", "type": "uint256", "indexed": false}
            ]
        }])
    }

    fn rpc_log(topics: Vec<B256>, data: Bytes) -> Log {
        Log {
            inner: alloy::primitives::Log {
                address: TOKEN,
                data: LogData::new_unchecked(topics, data),
            },
            block_number: Some(101),
            block_hash: Some(B256::repeat_byte(0xbb)),
            transaction_hash: Some(B256::repeat_byte(0xaa)),
            transaction_index: Some(3),
            log_index: Some(7),
            ..Default::default()
        }
    }

    fn transfer_log(value: u64) -> Log {
        let event = Transfer { from: FROM, to: TO, value: U256::from(value) };
        let data = event.encode_log_data();
        rpc_log(data.topics().to_vec(), data.data)
    }

    #[test]
    fn decodes_named_arguments() -> anyhow::Result<()> {
        let decoder = EventDecoder::from_abi(&transfer_abi(), "Transfer")?;
        assert_eq!(decoder.selector(), Transfer::SIGNATURE_HASH);

        let event = decoder.decode(&transfer_log(1_000));
        assert_eq!(
            event.payload,
            LogPayload::Decoded {
                event_name: "Transfer".into(),
                args: serde_json::from_value(json!({
                    "from": FROM.to_checksum(None),
                    "to": TO.to_checksum(None),
                    "value": "1000",
                }))?,
            }
        );
        Ok(())
    }

    #[test]
    fn decoded_event_serializes_flat() -> anyhow::Result<()> {
        let decoder = EventDecoder::from_abi(&transfer_abi(), "Transfer")?;
        let json = serde_json::to_value(decoder.decode(&transfer_log(5)))?;

        assert_eq!(json["eventName"], "Transfer");
        assert_eq!(json["address"], "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48");
        assert_eq!(json["blockNumber"], "101");
        assert_eq!(json["logIndex"], 7);
        assert_eq!(json["removed"], false);
        assert_eq!(json["args"]["value"], "5");
        assert!(json.get("decodeError").is_none());
        Ok(())
    }

    #[test]
    fn abi_given_as_string_is_accepted() -> anyhow::Result<()> {
        let raw = Value::String(transfer_abi().to_string());
        let decoder = EventDecoder::from_abi(&raw, "Transfer")?;
        assert_eq!(decoder.event().name, "Transfer");
        Ok(())
    }

    #[test]
    fn unknown_event_is_configuration_error() {
        let err = EventDecoder::from_abi(&transfer_abi(), "Approval").unwrap_err();
        assert_eq!(err.to_string(), "Configuration error: Event \"Approval\" not found in ABI");
    }

    #[test]
    fn malformed_abi_is_configuration_error() {
        let err = EventDecoder::from_abi(&json!("{not an abi"), "Transfer").unwrap_err();
        assert!(err.to_string().starts_with("Configuration error: Invalid ABI JSON"), "{err}");
    }

    #[test]
    fn topic_count_mismatch_falls_back_to_raw() -> anyhow::Result<()> {
        let decoder = EventDecoder::from_abi(&transfer_abi(), "Transfer")?;
        let log = rpc_log(vec![Transfer::SIGNATURE_HASH], Bytes::new());

        let event = decoder.decode(&log);
        assert!(!event.is_decoded());
        match event.payload {
            LogPayload::Raw { topics, decode_error, .. } => {
                assert_eq!(topics, vec![Transfer::SIGNATURE_HASH]);
                assert_eq!(decode_error.as_deref(), Some("expected 3 topics, log has 1"));
            }
            LogPayload::Decoded { .. } => panic!("expected raw fallback"),
        }
        Ok(())
    }

    #[test]
    fn short_data_falls_back_to_raw() -> anyhow::Result<()> {
        let decoder = EventDecoder::from_abi(&transfer_abi(), "Transfer")?;
        let mut log = transfer_log(1);
        log.inner.data = LogData::new_unchecked(log.topics().to_vec(), Bytes::from(vec![0u8; 4]));

        let event = decoder.decode(&log);
        assert!(matches!(event.payload, LogPayload::Raw { decode_error: Some(_), .. }));
        assert_eq!(event.block_number, Some(101));
        Ok(())
    }

    #[test]
    fn unnamed_parameters_use_positions() -> anyhow::Result<()> {
        let abi = json!([{
            "type": "event",
            "name": "Ping",
            "anonymous": false,
            "inputs": [
                {"name": "", "type": "uint8", "indexed": true},
                {"name": "", "type": "bytes4", "indexed": false}
            ]
        }]);
        let decoder = EventDecoder::from_abi(&abi, "Ping")?;
        let topics = vec![decoder.selector(), B256::with_last_byte(9)];
        let data = Bytes::from(
            b256!("0xdeadbeef00000000000000000000000000000000000000000000000000000000").to_vec(),
        );

        let event = decoder.decode(&rpc_log(topics, data));
        let LogPayload::Decoded { args, .. } = event.payload else {
            panic!("expected decoded payload");
        };
        assert_eq!(args["0"], "9");
        assert_eq!(args["1"], "0xdeadbeef");
        Ok(())
    }

    #[test]
    fn raw_record_keeps_metadata() {
        let log = transfer_log(1);
        let event = LogEvent::raw(&log, None);
        assert_eq!(event.address, TOKEN);
        assert_eq!(event.transaction_index, Some(3));
        assert!(matches!(event.payload, LogPayload::Raw { decode_error: None, .. }));
    }
}
