mod common;

use alloy::{
    primitives::{Address, Bytes, U256},
    rpc::types::Log,
    sol_types::SolEvent,
};
use common::{OTHER, Setup, TOKEN, TOKEN_ABI, TestToken, WATCHED};
use config::FileFormat;
use evm_trigger::{
    ContractEventSettings, EventDecoder, FromBlock, LogEvent, LogFilter, LogPayload, PollStatus,
    StreamKind, StreamSettings, Trigger, TriggerConfig, TriggerItem, test_utils::log,
};
use serde_json::json;

fn transfer_log(from: Address, value: u64, block: u64, index: u64) -> Log {
    let event = TestToken::Transfer { from, to: WATCHED, value: U256::from(value) };
    log(
        TOKEN,
        vec![TestToken::Transfer::SIGNATURE_HASH, from.into_word(), WATCHED.into_word()],
        Bytes::from(event.encode_data()),
        block,
        index,
    )
}

fn approval_log(spender: Address, block: u64, index: u64) -> Log {
    let event = TestToken::Approval { owner: OTHER, spender, value: U256::from(1) };
    log(
        TOKEN,
        vec![TestToken::Approval::SIGNATURE_HASH, OTHER.into_word(), spender.into_word()],
        Bytes::from(event.encode_data()),
        block,
        index,
    )
}

fn decoded_transfers() -> anyhow::Result<StreamSettings> {
    let decoder = EventDecoder::from_abi(&serde_json::from_str(TOKEN_ABI)?, "Transfer")?;
    let filter = LogFilter::new().with_contract_address(TOKEN);
    Ok(StreamSettings::ContractEvent(ContractEventSettings::new(filter).with_decoder(decoder)))
}

fn events(items: &[TriggerItem]) -> Vec<&LogEvent> {
    items
        .iter()
        .map(|item| match item {
            TriggerItem::Event(event) => event,
            other => panic!("unexpected item {other:?}"),
        })
        .collect()
}

#[tokio::test]
async fn logs_are_fetched_per_range_and_decoded() -> anyhow::Result<()> {
    let setup = Setup::new(103);
    setup.seed_cursor(StreamKind::ContractEvent, 100).await?;
    setup.chain.add_log(transfer_log(OTHER, 1_000, 103, 0));
    setup.chain.add_log(transfer_log(OTHER, 5, 101, 2));
    setup.chain.add_log(approval_log(WATCHED, 102, 0));

    let trigger = setup.trigger(decoded_transfers()?).with_block_limit(2);
    let outcome = trigger.poll().await?;

    assert_eq!(setup.chain.log_requests(), vec![101..=102, 103..=103]);
    let events = events(outcome.items());
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].block_number, Some(101));
    assert_eq!(events[1].block_number, Some(103));

    let LogPayload::Decoded { event_name, args } = &events[1].payload else {
        panic!("expected decoded payload, got {:?}", events[1].payload);
    };
    assert_eq!(event_name, "Transfer");
    assert_eq!(args["value"], "1000");
    assert_eq!(args["from"], OTHER.to_checksum(None));
    assert_eq!(args["to"], WATCHED.to_checksum(None));

    assert_eq!(outcome.cursor(), 103);
    assert_eq!(setup.stored_height(StreamKind::ContractEvent).await.as_deref(), Some("103"));
    Ok(())
}

#[tokio::test]
async fn undecodable_log_is_emitted_raw() -> anyhow::Result<()> {
    let setup = Setup::new(101);
    setup.seed_cursor(StreamKind::ContractEvent, 100).await?;
    // topic0 matches Transfer but the indexed `to` topic is missing
    setup.chain.add_log(log(
        TOKEN,
        vec![TestToken::Transfer::SIGNATURE_HASH, OTHER.into_word()],
        Bytes::from(U256::from(1).to_be_bytes::<32>().to_vec()),
        101,
        0,
    ));

    let outcome = setup.trigger(decoded_transfers()?).poll().await?;

    let [TriggerItem::Event(event)] = outcome.items() else {
        panic!("expected one event, got {:?}", outcome.items());
    };
    assert!(!event.is_decoded());
    let json = serde_json::to_value(event)?;
    assert_eq!(json["decodeError"], "expected 3 topics, log has 2");
    assert_eq!(json["topics"].as_array().map(Vec::len), Some(2));
    assert_eq!(json["blockNumber"], "101");
    assert_eq!(outcome.cursor(), 101);
    Ok(())
}

#[tokio::test]
async fn topics_filter_emits_raw_matching_logs() -> anyhow::Result<()> {
    let setup = Setup::new(101);
    setup.seed_cursor(StreamKind::ContractEvent, 100).await?;
    setup.chain.add_log(approval_log(WATCHED, 101, 0));
    setup.chain.add_log(approval_log(OTHER, 101, 1));
    setup.chain.add_log(transfer_log(OTHER, 1, 101, 2));

    let filter = LogFilter::new().with_topics_json(&json!([
        TestToken::Approval::SIGNATURE_HASH,
        null,
        WATCHED.into_word()
    ]))?;
    let settings = StreamSettings::ContractEvent(ContractEventSettings::new(filter));
    let outcome = setup.trigger(settings).poll().await?;

    let events = events(outcome.items());
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].log_index, Some(0));
    let LogPayload::Raw { topics, decode_error, .. } = &events[0].payload else {
        panic!("expected raw payload");
    };
    assert_eq!(topics[2], WATCHED.into_word());
    assert!(decode_error.is_none());
    Ok(())
}

#[tokio::test]
async fn earliest_start_backfills_from_genesis() -> anyhow::Result<()> {
    let setup = Setup::new(4);
    setup.chain.add_log(transfer_log(OTHER, 1, 0, 0));
    setup.chain.add_log(transfer_log(OTHER, 2, 3, 0));

    let decoder = EventDecoder::from_abi(&serde_json::from_str(TOKEN_ABI)?, "Transfer")?;
    let settings = ContractEventSettings::new(LogFilter::new())
        .with_decoder(decoder)
        .with_from_block(FromBlock::Earliest);
    let outcome =
        setup.trigger(StreamSettings::ContractEvent(settings)).with_block_limit(3).poll().await?;

    assert_eq!(setup.chain.log_requests(), vec![0..=2, 3..=4]);
    assert_eq!(outcome.status(), PollStatus::Initialized { baseline: 4 });
    assert_eq!(events(outcome.items()).len(), 2);
    Ok(())
}

#[tokio::test]
async fn custom_start_beyond_head_waits_for_the_chain() -> anyhow::Result<()> {
    let setup = Setup::new(10);
    let settings = ContractEventSettings::new(LogFilter::new().with_contract_address(TOKEN))
        .with_from_block(FromBlock::Custom(20));
    let trigger = setup.trigger(StreamSettings::ContractEvent(settings));

    let outcome = trigger.poll().await?;
    assert_eq!(outcome.status(), PollStatus::Initialized { baseline: 19 });
    assert!(setup.chain.log_requests().is_empty());

    setup.chain.add_log(transfer_log(OTHER, 1, 20, 0));
    setup.chain.set_head(21);
    let outcome = trigger.poll().await?;

    assert_eq!(setup.chain.log_requests(), vec![20..=21]);
    assert_eq!(events(outcome.items()).len(), 1);
    Ok(())
}

#[tokio::test]
async fn trigger_built_from_configuration() -> anyhow::Result<()> {
    let config = TriggerConfig::parse(
        &format!(
            r#"
            rpc:
              url: "http://localhost:8545"
            stream:
              event: contract_event
              addresses: "{TOKEN}"
              abi: '{abi}'
              event_name: Transfer
            block_limit: 1
            "#,
            abi = TOKEN_ABI.replace('\n', " ")
        ),
        FileFormat::Yaml,
    )?;

    let setup = Setup::new(102);
    setup.seed_cursor(StreamKind::ContractEvent, 100).await?;
    setup.chain.add_log(transfer_log(OTHER, 9, 102, 0));

    let trigger = Trigger::from_config(&config, setup.chain.clone(), setup.store.clone())?;
    let outcome = trigger.poll().await?;

    assert_eq!(setup.chain.log_requests(), vec![101..=101, 102..=102]);
    assert!(events(outcome.items())[0].is_decoded());
    Ok(())
}

#[tokio::test]
async fn triggers_for_different_streams_share_a_store() -> anyhow::Result<()> {
    let setup = Setup::new(10);
    let events = setup.trigger(decoded_transfers()?);
    let blocks = Trigger::new(setup.chain.clone(), setup.store.clone(), StreamSettings::NewBlock);

    events.poll().await?;
    setup.chain.set_head(12);
    blocks.poll().await?;

    assert_eq!(setup.stored_height(StreamKind::ContractEvent).await.as_deref(), Some("10"));
    assert_eq!(setup.stored_height(StreamKind::NewBlock).await.as_deref(), Some("12"));
    Ok(())
}
