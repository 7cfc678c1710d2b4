use safety_gateway::alerts::ChannelSink;
use safety_gateway::breakers::BreakerState;
use safety_gateway::clock::ManualClock;
use safety_gateway::drift::DriftStatus;
use safety_gateway::execution::PaperBroker;
use safety_gateway::*;
use std::sync::Arc;
use std::time::Duration;

fn setup(config: GatewayConfig) -> (SafetyGateway, Arc<PaperBroker>, ManualClock) {
    let _ = tracing_subscriber::fmt::try_init();

    let broker = Arc::new(PaperBroker::new());
    let clock = ManualClock::default();
    let gateway = SafetyGateway::with_clock(config, broker.clone(), Arc::new(clock.clone()))
        .expect("valid config");
    (gateway, broker, clock)
}

fn feed(gateway: &SafetyGateway, broker: &PaperBroker, symbol: &str, start: f64, step: f64) {
    for i in 0..20 {
        let price = start + step * i as f64;
        gateway.update_price(symbol, price);
        broker.set_price(symbol, price);
    }
}

#[tokio::test]
async fn test_correlated_position_halves_executed_size() {
    let (gateway, broker, _) = setup(GatewayConfig::default());
    feed(&gateway, &broker, "BTCUSD", 60000.0, 100.0);
    feed(&gateway, &broker, "ETHUSD", 3000.0, 5.0);

    let request = TradeRequest::new("ETHUSD", TradeSide::Buy, 400.0, 10000.0)
        .with_positions(vec![PositionView::new("BTCUSD", TradeSide::Buy, 100.0)]);
    let outcome = gateway.submit_trade(request).await;

    match outcome {
        TradeOutcome::Executed { order } => {
            assert_eq!(order.filled_size, 200.0);
            assert_eq!(order.fill_price, Some(3095.0));
        }
        other => panic!("expected execution, got {:?}", other),
    }
}

#[tokio::test]
async fn test_slow_broker_times_out_then_trips_latency_breaker() {
    let mut config = GatewayConfig::default();
    config.breakers.max_latency_seconds = 0.05;
    let (gateway, broker, clock) = setup(config);
    broker.set_price("SOL", 150.0);
    broker.set_latency(Duration::from_millis(250));

    for _ in 0..3 {
        let outcome = gateway
            .submit_trade(TradeRequest::new("SOL", TradeSide::Buy, 100.0, 10000.0))
            .await;
        assert!(matches!(
            outcome,
            TradeOutcome::Blocked {
                reason: BlockReason::Timeout { .. }
            }
        ));
    }
    assert_eq!(
        gateway.breakers().breaker_state("latency_breaker"),
        Some(BreakerState::Open)
    );

    // Broker recovers but the breaker holds until its cooldown passes
    broker.set_latency(Duration::ZERO);
    let outcome = gateway
        .submit_trade(TradeRequest::new("SOL", TradeSide::Buy, 100.0, 10000.0))
        .await;
    assert_eq!(
        outcome,
        TradeOutcome::blocked(BlockReason::Breaker("latency_breaker".to_string()))
    );

    clock.advance(chrono::Duration::seconds(300));
    let outcome = gateway
        .submit_trade(TradeRequest::new("SOL", TradeSide::Buy, 100.0, 10000.0))
        .await;
    assert!(outcome.is_executed());
    assert_eq!(
        gateway.breakers().breaker_state("latency_breaker"),
        Some(BreakerState::Closed)
    );
}

#[tokio::test]
async fn test_broker_errors_fail_then_block() {
    let (gateway, broker, _) = setup(GatewayConfig::default());
    broker.set_price("SOL", 150.0);
    broker.set_failing(true);

    for _ in 0..3 {
        let outcome = gateway
            .submit_trade(TradeRequest::new("SOL", TradeSide::Sell, 100.0, 10000.0))
            .await;
        assert!(outcome.is_failed());
    }

    let outcome = gateway
        .submit_trade(TradeRequest::new("SOL", TradeSide::Sell, 100.0, 10000.0))
        .await;
    assert_eq!(
        outcome,
        TradeOutcome::blocked(BlockReason::Breaker("api_breaker".to_string()))
    );
}

#[tokio::test]
async fn test_emergency_halt_notifies_and_needs_manual_clear() {
    let (gateway, broker, clock) = setup(GatewayConfig::default());
    let (sink, mut rx) = ChannelSink::new();
    gateway.alerts().register(Arc::new(sink));
    broker.set_price("SOL", 150.0);

    gateway.trigger_emergency_halt("operator request");

    let alert = rx.recv().await.expect("halt alert delivered");
    assert_eq!(alert.severity, Severity::Critical);
    assert_eq!(alert.source, "EMERGENCY");

    clock.advance(chrono::Duration::hours(6));
    let outcome = gateway
        .submit_trade(TradeRequest::new("SOL", TradeSide::Buy, 100.0, 10000.0))
        .await;
    assert!(matches!(
        outcome,
        TradeOutcome::Blocked {
            reason: BlockReason::EmergencyHalt(_)
        }
    ));
    assert!(gateway.status().breakers.system_halted);

    gateway.clear_emergency_halt();
    let outcome = gateway
        .submit_trade(TradeRequest::new("SOL", TradeSide::Buy, 100.0, 10000.0))
        .await;
    assert!(outcome.is_executed());
}

#[tokio::test]
async fn test_live_drift_pause_and_recovery() {
    let config = GatewayConfig {
        trading_mode: TradingMode::Live,
        ..Default::default()
    };
    let (gateway, broker, _) = setup(config);
    broker.set_price("SOL", 150.0);

    for _ in 0..5 {
        gateway.record_outcome(false, -20.0);
    }
    assert_eq!(gateway.drift_status(), DriftStatus::DriftDetected);

    let outcome = gateway
        .submit_trade(TradeRequest::new("SOL", TradeSide::Buy, 100.0, 10000.0))
        .await;
    assert!(matches!(
        outcome,
        TradeOutcome::Blocked {
            reason: BlockReason::DriftPaused(_)
        }
    ));
    assert!(gateway
        .alerts()
        .history()
        .iter()
        .any(|a| a.source == "drift_guard" && a.severity == Severity::Critical));

    assert_eq!(gateway.reset_baseline(0.55), DriftStatus::WarmingUp);
    let outcome = gateway
        .submit_trade(TradeRequest::new("SOL", TradeSide::Buy, 100.0, 10000.0))
        .await;
    assert!(outcome.is_executed());
}

#[tokio::test]
async fn test_acknowledge_drift_resumes_live_trading() {
    let config = GatewayConfig {
        trading_mode: TradingMode::Live,
        ..Default::default()
    };
    let (gateway, broker, _) = setup(config);
    broker.set_price("SOL", 150.0);

    gateway.force_pause("exchange maintenance");
    assert!(!gateway.status().trading_allowed);

    gateway.acknowledge_drift();
    assert_eq!(gateway.drift_status(), DriftStatus::Healthy);

    let outcome = gateway
        .submit_trade(TradeRequest::new("SOL", TradeSide::Buy, 100.0, 10000.0))
        .await;
    assert!(outcome.is_executed());
}

#[tokio::test]
async fn test_semantic_collapse_blocks_trades() {
    let mut config = GatewayConfig::default();
    config.breakers.semantic_window = 10;
    config.breakers.max_failures = 1;
    let (gateway, broker, _) = setup(config);
    broker.set_price("SOL", 150.0);

    for _ in 0..10 {
        gateway.record_dialectic(true);
    }

    let outcome = gateway
        .submit_trade(TradeRequest::new("SOL", TradeSide::Buy, 100.0, 10000.0))
        .await;
    assert_eq!(
        outcome,
        TradeOutcome::blocked(BlockReason::Breaker("semantic_drift_breaker".to_string()))
    );
}

#[tokio::test]
async fn test_shared_gateway_across_tasks() {
    let (gateway, broker, _) = setup(GatewayConfig::default());
    broker.set_price("SOL", 150.0);
    let gateway = Arc::new(gateway);

    let mut handles = Vec::new();
    for _ in 0..8 {
        let gateway = Arc::clone(&gateway);
        handles.push(tokio::spawn(async move {
            gateway
                .submit_trade(TradeRequest::new("SOL", TradeSide::Buy, 50.0, 10000.0))
                .await
        }));
    }

    for handle in handles {
        assert!(handle.await.unwrap().is_executed());
    }
    assert_eq!(broker.orders_filled(), 8);
    assert_eq!(gateway.status().daily.trades, 8);
}
