//! # Exchange Flows
//!
//! Drives `ExchangeService` synchronously through the inbound ports, without
//! background workers:
//!
//! 1. **Serving**: want → queue → send → ledger
//! 2. **Local wants**: cancel, block arrival, provide buffer
//! 3. **Duplicates and accounting**
//! 4. **Retry and fairness**
//! 5. **Command layer binding**

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use qc_18_block_exchange::commands::{self, CommandError, ErrorKind, NodeContext};
    use qc_18_block_exchange::{
        BlockExchangeApi, Exchange, ExchangeConfig, ExchangeConfigBuilder, ExchangeEvents,
        ServeOutcome, WantDecision,
    };

    use super::super::{key, peer, Harness};

    fn harness() -> Harness {
        Harness::new(ExchangeConfig::default()).expect("default config is valid")
    }

    // =============================================================================
    // SERVING
    // =============================================================================

    #[test]
    fn test_served_block_is_charged_to_peer() {
        let h = harness();
        let x = peer(1);
        let block = h.hold(0xAA, 100);

        h.service.on_want(x, block.key(), 1);
        assert!(h.service.engine().has_task(&x, &block.key()));

        h.service.engine().mark_sent(x, block.key(), 100);

        let receipt = h.service.ledger_for_peer(&x);
        assert_eq!(receipt.bytes_sent, 100);
        assert_eq!(receipt.exchange_count, 1);
        assert!(!h.service.engine().has_task(&x, &block.key()));
        assert!(h.service.wantlist_for_peer(&x).is_empty());
    }

    #[tokio::test]
    async fn test_serve_round_sends_and_accounts() {
        let h = harness();
        let x = peer(1);
        let block = h.hold(0x01, 64);
        h.service.on_want(x, block.key(), 3);

        let outcomes = h.service.engine().serve_round(h.transport.as_ref()).await;
        assert_eq!(
            outcomes,
            vec![(
                x,
                ServeOutcome::Sent {
                    key: block.key(),
                    size: 64
                }
            )]
        );
        assert_eq!(h.transport.sent(), vec![(x, block.key())]);

        let stats = h.service.stats();
        assert_eq!(stats.blocks_sent, 1);
        assert_eq!(stats.data_sent, 64);
        assert_eq!(stats.pending_tasks, 0);
    }

    #[test]
    fn test_want_for_missing_block_waits_for_arrival() {
        let h = harness();
        let x = peer(2);
        let block = shared_types::Block::new(b"not yet here".to_vec());

        assert_eq!(
            h.service.engine().receive_want(x, block.key(), 1),
            WantDecision::Deferred
        );
        assert_eq!(h.service.stats().pending_tasks, 0);

        h.store.insert(block.clone());
        assert!(h.service.has_block(block.key()));

        assert!(h.service.engine().has_task(&x, &block.key()));
        assert_eq!(h.service.try_next_provide(), Some(block.key()));
    }

    #[tokio::test]
    async fn test_cancel_before_send_never_sends() {
        let h = harness();
        let x = peer(3);
        let block = h.hold(0x03, 10);

        h.service.on_want(x, block.key(), 1);
        h.service.on_cancel(x, block.key());

        let outcome = h.service.engine().serve_next(&x, h.transport.as_ref()).await;
        assert_eq!(outcome, ServeOutcome::Idle);
        assert!(h.transport.sent().is_empty());
        assert_eq!(h.service.ledger_for_peer(&x).bytes_sent, 0);
    }

    #[test]
    fn test_disconnect_drops_wants_but_keeps_ledger() {
        let h = harness();
        let x = peer(4);
        let block = h.hold(0x04, 8);
        h.service.peer_connected(x);
        h.service.on_block(x, key(0x40), 32);
        h.service.on_want(x, block.key(), 1);

        h.service.peer_disconnected(x);

        assert!(h.service.wantlist_for_peer(&x).is_empty());
        assert!(h.service.engine().pending_tasks(&x).is_empty());
        assert_eq!(h.service.ledger_for_peer(&x).bytes_received, 32);
        assert_eq!(h.service.stats().peers, vec![x]);
    }

    // =============================================================================
    // LOCAL WANTS
    // =============================================================================

    #[test]
    fn test_cancel_keeps_unrelated_wants() {
        let h = harness();
        let k = key(0x10);
        let j = key(0x11);
        h.service.want_block(k, 1);
        h.service.want_block(j, 1);

        h.service.cancel_wants(&[k]);

        assert_eq!(h.service.wantlist(), vec![j]);
    }

    #[test]
    fn test_local_wantlist_priority_order() {
        let h = harness();
        h.service.want_block(key(1), 1);
        h.service.want_block(key(2), 5);
        h.service.want_block(key(3), 3);
        h.service.want_block(key(1), 9);

        assert_eq!(h.service.wantlist(), vec![key(1), key(2), key(3)]);
    }

    #[test]
    fn test_block_arrival_satisfies_local_want() {
        let h = harness();
        let block = shared_types::Block::new(b"wanted".to_vec());
        h.service.want_block(block.key(), 2);

        let y = peer(5);
        h.service.on_block(y, block.key(), block.len() as u64);
        h.store.insert(block.clone());
        h.service.has_block(block.key());

        assert!(h.service.wantlist().is_empty());
        let stats = h.service.stats();
        assert_eq!(stats.blocks_received, 1);
        assert_eq!(stats.dup_blks_received, 0);
        assert_eq!(stats.provide_buf_len, 1);
    }

    #[test]
    fn test_provide_buffer_overflow_is_counted() -> anyhow::Result<()> {
        let config = ExchangeConfigBuilder::new()
            .provide_buffer_capacity(1)
            .build()?;
        let h = Harness::new(config)?;

        assert!(h.service.has_block(key(1)));
        assert!(!h.service.has_block(key(2)));

        let stats = h.service.stats();
        assert_eq!(stats.provide_buf_len, 1);
        assert_eq!(stats.provide_buf_capacity, 1);
        assert_eq!(stats.provides_dropped, 1);
        Ok(())
    }

    // =============================================================================
    // DUPLICATES AND ACCOUNTING
    // =============================================================================

    #[test]
    fn test_duplicate_block_still_charged() {
        let h = harness();
        let y = peer(6);
        let block = h.hold(0x06, 300);
        let before = h.service.stats();

        h.service.on_block(y, block.key(), 300);

        let after = h.service.stats();
        assert_eq!(after.dup_blks_received, before.dup_blks_received + 1);
        assert_eq!(after.dup_data_received, before.dup_data_received + 300);
        assert_eq!(h.service.ledger_for_peer(&y).bytes_received, 300);
    }

    #[test]
    fn test_unknown_peer_queries_are_empty() {
        let h = harness();
        let stranger = peer(0xEE);

        assert!(h.service.wantlist_for_peer(&stranger).is_empty());
        let receipt = h.service.ledger_for_peer(&stranger);
        assert_eq!(receipt.peer, stranger);
        assert_eq!(receipt.exchange_count, 0);
        assert_eq!(receipt.debt_ratio, 0.0);
    }

    #[test]
    fn test_debt_ratio_follows_transfers() {
        let h = harness();
        let x = peer(7);
        h.service.on_block(x, key(1), 100);
        h.service.engine().mark_sent(x, key(2), 250);

        let receipt = h.service.ledger_for_peer(&x);
        assert_eq!(receipt.debt_ratio, 2.5);
        assert_eq!(receipt.exchange_count, 2);
    }

    // =============================================================================
    // RETRY AND FAIRNESS
    // =============================================================================

    #[tokio::test]
    async fn test_failed_send_retried_once_then_dropped() {
        let h = harness();
        let x = peer(8);
        let block = h.hold(0x08, 20);
        h.service.on_want(x, block.key(), 1);
        h.transport.fail_next_sends(2);

        let engine = h.service.engine();
        let first = engine.serve_next(&x, h.transport.as_ref()).await;
        assert_eq!(
            first,
            ServeOutcome::Retrying {
                key: block.key(),
                attempts: 1
            }
        );
        let second = engine.serve_next(&x, h.transport.as_ref()).await;
        assert_eq!(
            second,
            ServeOutcome::Dropped {
                key: block.key(),
                attempts: 2
            }
        );

        assert!(h.transport.sent().is_empty());
        let stats = h.service.stats();
        assert_eq!(stats.send_retries, 1);
        assert_eq!(stats.send_failures, 1);
        assert_eq!(stats.pending_tasks, 0);
        assert_eq!(h.service.ledger_for_peer(&x).bytes_sent, 0);
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_transient_failure() {
        let h = harness();
        let x = peer(9);
        let block = h.hold(0x09, 5);
        h.service.on_want(x, block.key(), 1);
        h.transport.fail_next_sends(1);

        let engine = h.service.engine();
        engine.serve_next(&x, h.transport.as_ref()).await;
        let outcome = engine.serve_next(&x, h.transport.as_ref()).await;

        assert_eq!(
            outcome,
            ServeOutcome::Sent {
                key: block.key(),
                size: 5
            }
        );
        assert_eq!(h.service.ledger_for_peer(&x).bytes_sent, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_indebted_peer_served_after_fair_peer() {
        let h = harness();
        let debtor = peer(10);
        let fair = peer(11);
        let block = h.hold(0x0A, 4);

        h.service.ledgers().record_received(&debtor, 100);
        h.service.ledgers().record_sent(&debtor, 1_000);
        h.service.on_want(debtor, block.key(), 1);
        h.service.on_want(fair, block.key(), 1);

        assert_eq!(h.service.engine().service_order(), vec![fair, debtor]);

        let outcomes = h.service.engine().serve_round(h.transport.as_ref()).await;
        let order: Vec<_> = outcomes.iter().map(|(p, _)| *p).collect();
        assert_eq!(order, vec![fair, debtor]);
        // Throttled, not starved.
        assert_eq!(h.transport.sent_to(&debtor), vec![block.key()]);
    }

    #[test]
    fn test_priority_update_reorders_peer_queue() {
        let h = harness();
        let x = peer(12);
        let low = h.hold(0x0C, 1);
        let high = h.hold(0x0D, 1);
        h.service.on_want(x, low.key(), 1);
        h.service.on_want(x, high.key(), 2);
        h.service.on_want(x, low.key(), 7);

        assert_eq!(
            h.service.engine().pending_tasks(&x),
            vec![low.key(), high.key()]
        );
    }

    // =============================================================================
    // COMMAND LAYER
    // =============================================================================

    struct NotABlockExchange;

    impl Exchange for NotABlockExchange {
        fn name(&self) -> &'static str {
            "stub"
        }
    }

    #[test]
    fn test_commands_require_online_block_exchange() {
        let offline = NodeContext::offline();
        let err = commands::stat(&offline).unwrap_err();
        assert!(matches!(err, CommandError::NotOnline));
        assert_eq!(err.kind(), ErrorKind::Client);

        let wrong = NodeContext::online(Arc::new(NotABlockExchange));
        let err = commands::wantlist(&wrong, None).unwrap_err();
        assert!(matches!(err, CommandError::UnsupportedExchange { .. }));
        assert_eq!(err.kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_command_outputs_use_wire_names() -> anyhow::Result<()> {
        let h = harness();
        let x = peer(13);
        h.service.on_block(x, key(1), 10);
        h.service.want_block(key(2), 1);
        let node = NodeContext::online(Arc::clone(&h.service) as Arc<dyn Exchange>);

        let stat = serde_json::to_value(commands::stat(&node)?)?;
        assert_eq!(stat["BlocksReceived"], 1);
        assert_eq!(stat["DupBlksReceived"], 0);
        assert_eq!(stat["Wantlist"][0], key(2).to_hex());
        assert_eq!(stat["Peers"][0], x.to_hex());

        let receipt = serde_json::to_value(commands::ledger(&node, &x.to_hex())?)?;
        assert_eq!(receipt["Recv"], 10);
        assert_eq!(receipt["Sent"], 0);
        assert_eq!(receipt["Exchanged"], 1);

        let list = serde_json::to_value(commands::wantlist(&node, None)?)?;
        assert_eq!(list["Keys"][0], key(2).to_hex());
        Ok(())
    }

    #[test]
    fn test_unwant_command_broadcasts_cancel() -> anyhow::Result<()> {
        let h = harness();
        h.service.want_block(key(1), 1);
        let node = NodeContext::online(Arc::clone(&h.service) as Arc<dyn Exchange>);

        commands::unwant(&node, &[key(1).to_hex()])?;
        assert!(commands::wantlist(&node, None)?.keys.is_empty());

        let err = commands::ledger(&node, "xyz").unwrap_err();
        assert!(matches!(err, CommandError::MalformedPeerId { .. }));
        Ok(())
    }
}
