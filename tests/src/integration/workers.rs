//! # Background Workers
//!
//! Flows that rely on `ExchangeService::start`: per-peer send workers and
//! the want broadcast pump.

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use qc_18_block_exchange::{
        BlockExchangeApi, ExchangeConfig, ExchangeConfigBuilder, ExchangeError, ExchangeEvents,
        FairnessPolicy, WantMessage,
    };

    use super::super::{key, peer, Harness};

    const WAIT: Duration = Duration::from_secs(2);

    fn started() -> anyhow::Result<Harness> {
        let config = ExchangeConfigBuilder::new().worker_idle_poll_ms(20).build()?;
        let h = Harness::new(config)?;
        h.service.start()?;
        Ok(h)
    }

    #[tokio::test]
    async fn test_worker_serves_queued_want() -> anyhow::Result<()> {
        let h = started()?;
        let x = peer(1);
        let block = h.hold(0x01, 128);

        h.service.on_want(x, block.key(), 1);

        assert!(h.transport.wait_for_sends(1, WAIT).await);
        assert_eq!(h.transport.sent(), vec![(x, block.key())]);

        h.service.shutdown().await;
        let receipt = h.service.ledger_for_peer(&x);
        assert_eq!(receipt.bytes_sent, 128);
        assert_eq!(h.service.stats().pending_tasks, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_worker_serves_block_once_it_arrives() -> anyhow::Result<()> {
        let h = started()?;
        let x = peer(2);
        let block = shared_types::Block::new(b"late block".to_vec());

        h.service.on_want(x, block.key(), 1);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(h.transport.sent().is_empty());

        h.store.insert(block.clone());
        h.service.has_block(block.key());

        assert!(h.transport.wait_for_sends(1, WAIT).await);
        assert_eq!(h.transport.sent_to(&x), vec![block.key()]);
        assert_eq!(h.service.next_provide().await, block.key());

        h.service.shutdown().await;
        Ok(())
    }

    #[tokio::test]
    async fn test_slow_peer_does_not_block_others() -> anyhow::Result<()> {
        let h = started()?;
        let slow = peer(3);
        let quick = peer(4);
        let block = h.hold(0x03, 16);
        h.transport.set_latency(slow, Duration::from_millis(800));

        h.service.on_want(slow, block.key(), 1);
        h.service.on_want(quick, block.key(), 1);

        assert!(
            h.transport
                .wait_for_sends(1, Duration::from_millis(400))
                .await
        );
        assert_eq!(h.transport.sent(), vec![(quick, block.key())]);

        assert!(h.transport.wait_for_sends(2, WAIT).await);
        h.service.shutdown().await;
        Ok(())
    }

    #[tokio::test]
    async fn test_worker_retries_transient_failure() -> anyhow::Result<()> {
        let h = started()?;
        let x = peer(5);
        let block = h.hold(0x05, 8);
        h.transport.fail_next_sends(1);

        h.service.on_want(x, block.key(), 1);

        assert!(h.transport.wait_for_sends(1, WAIT).await);
        h.service.shutdown().await;

        let stats = h.service.stats();
        assert_eq!(stats.send_retries, 1);
        assert_eq!(stats.send_failures, 0);
        assert_eq!(stats.blocks_sent, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_disconnected_peer_task_is_dropped() -> anyhow::Result<()> {
        let h = started()?;
        let gone = peer(6);
        let block = h.hold(0x06, 8);
        h.transport.disconnect(gone);

        h.service.on_want(gone, block.key(), 1);

        let deadline = tokio::time::Instant::now() + WAIT;
        while h.service.stats().send_failures == 0 {
            assert!(tokio::time::Instant::now() < deadline, "task never dropped");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        h.service.shutdown().await;

        assert!(h.transport.sent().is_empty());
        assert_eq!(h.transport.attempts(), 2);
        assert_eq!(h.service.ledger_for_peer(&gone).bytes_sent, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_local_wants_are_broadcast_in_order() -> anyhow::Result<()> {
        let h = started()?;
        h.service.want_block(key(1), 1);
        h.service.want_block(key(2), 2);
        h.service.cancel_wants(&[key(1)]);

        let cancel = WantMessage::Cancel { keys: vec![key(1)] };
        let deadline = tokio::time::Instant::now() + WAIT;
        while !h.transport.broadcasts().contains(&cancel) {
            assert!(tokio::time::Instant::now() < deadline, "cancel never broadcast");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        h.service.shutdown().await;

        // The want for key(1) may be skipped as stale if the pump saw it
        // after the cancel.
        let broadcasts = h.transport.broadcasts();
        assert_eq!(broadcasts.last(), Some(&cancel));
        assert!(broadcasts.contains(&WantMessage::Want {
            key: key(2),
            priority: 2
        }));
        Ok(())
    }

    #[tokio::test]
    async fn test_lifecycle() -> anyhow::Result<()> {
        let h = Harness::new(ExchangeConfig::default())?;
        assert!(!h.service.is_running());

        h.service.start()?;
        assert!(h.service.is_running());
        assert!(matches!(
            h.service.start(),
            Err(ExchangeError::AlreadyStarted)
        ));

        h.service.shutdown().await;
        assert!(!h.service.is_running());
        Ok(())
    }

    #[tokio::test]
    async fn test_shutdown_not_held_by_stuck_send() -> anyhow::Result<()> {
        let config = ExchangeConfigBuilder::new()
            .worker_idle_poll_ms(20)
            .shutdown_grace_ms(50)
            .build()?;
        let h = Harness::new(config)?;
        h.service.start()?;
        let stuck = peer(7);
        let block = h.hold(0x07, 8);
        h.transport.set_latency(stuck, Duration::from_secs(3_600));

        h.service.on_want(stuck, block.key(), 1);
        let deadline = tokio::time::Instant::now() + WAIT;
        while h.transport.attempts() == 0 {
            assert!(tokio::time::Instant::now() < deadline, "send never started");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        tokio::time::timeout(WAIT, h.service.shutdown()).await?;
        assert!(!h.service.is_running());
        assert_eq!(h.service.stats().pending_tasks, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_shutdown_not_held_by_throttled_peer() -> anyhow::Result<()> {
        let config = ExchangeConfigBuilder::new()
            .fairness(FairnessPolicy {
                debt_ratio_ceiling: 1.0,
                throttle_step_ms: 60_000,
                max_delay_ms: 60_000,
                ..FairnessPolicy::default()
            })
            .build()?;
        let h = Harness::new(config)?;
        h.service.start()?;
        let debtor = peer(8);
        let block = h.hold(0x08, 8);
        h.service.ledgers().record_sent(&debtor, 1_000);

        h.service.on_want(debtor, block.key(), 1);
        tokio::time::sleep(Duration::from_millis(50)).await;

        tokio::time::timeout(WAIT, h.service.shutdown()).await?;
        assert!(h.transport.sent().is_empty());
        assert_eq!(h.service.stats().pending_tasks, 1);
        Ok(())
    }
}
