use std::sync::Arc;
use std::time::Duration;

use modelhub_core::{same_connection, ConnectionState, PoolConfig, PoolEvent};
use modelhub_errors::HubError;
use modelhub_pool::ConnectionPoolManager;
use modelhub_testing_utils::{
    as_shared, provider_config, MockConnectionFactory, PoolConfigBuilder, TestEnv,
};
use tokio::sync::broadcast::error::{RecvError, TryRecvError};

fn manager() -> ConnectionPoolManager {
    ConnectionPoolManager::new(PoolConfig::default()).unwrap()
}

async fn next_event(rx: &mut tokio::sync::broadcast::Receiver<PoolEvent>) -> PoolEvent {
    tokio::time::timeout(Duration::from_secs(3), rx.recv())
        .await
        .expect("event should arrive")
        .expect("channel should be open")
}

#[tokio::test]
async fn test_second_acquirer_waits_for_release() {
    let manager = Arc::new(manager());
    let factory = Arc::new(MockConnectionFactory::new());
    manager
        .initialize_provider(provider_config("ollama", 1), factory.clone())
        .await
        .unwrap();

    let first = manager.acquire_connection("ollama").await.unwrap();

    let waiter = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.acquire_connection("ollama").await })
    };

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(!waiter.is_finished(), "second acquire should block");
    assert_eq!(manager.pool_stats("ollama").await.unwrap().waiting_acquirers, 1);

    manager.release_connection("ollama", &first).await;
    let second = tokio::time::timeout(Duration::from_secs(1), waiter)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    assert!(same_connection(&first, &second));
    assert_eq!(factory.created_count(), 1);

    let stats = manager.pool_stats("ollama").await.unwrap();
    assert_eq!(stats.total_connections, 1);
    assert_eq!(stats.active_connections, 1);
    assert_eq!(stats.waiting_acquirers, 0);
}

#[tokio::test]
async fn test_waiters_served_in_fifo_order() {
    let manager = Arc::new(manager());
    manager
        .initialize_provider(provider_config("p", 1), Arc::new(MockConnectionFactory::new()))
        .await
        .unwrap();

    let held = manager.acquire_connection("p").await.unwrap();
    let (order_tx, mut order_rx) = tokio::sync::mpsc::unbounded_channel();

    let mut handles = Vec::new();
    for label in ["first", "second"] {
        let manager = Arc::clone(&manager);
        let order_tx = order_tx.clone();
        handles.push(tokio::spawn(async move {
            let connection = manager.acquire_connection("p").await.unwrap();
            order_tx.send(label).unwrap();
            manager.release_connection("p", &connection).await;
        }));
        // 保证排队顺序
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    manager.release_connection("p", &held).await;
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(order_rx.recv().await, Some("first"));
    assert_eq!(order_rx.recv().await, Some("second"));
}

#[tokio::test]
async fn test_acquire_before_initialize_fails() {
    let manager = manager();
    let result = manager.acquire_connection("unknown").await;
    assert!(matches!(
        result,
        Err(HubError::ProviderNotInitialized { ref provider_id }) if provider_id == "unknown"
    ));
    assert!(manager.check_provider_health("unknown").await.is_err());
    assert!(manager.pool_stats("unknown").await.is_none());
}

#[tokio::test]
async fn test_acquire_after_dispose_provider_fails() {
    let manager = manager();
    let factory = Arc::new(MockConnectionFactory::new());
    manager
        .initialize_provider(provider_config("p", 2), factory.clone())
        .await
        .unwrap();

    let connection = manager.acquire_connection("p").await.unwrap();
    assert!(manager.dispose_provider("p").await);

    assert!(matches!(
        manager.acquire_connection("p").await,
        Err(HubError::ProviderNotInitialized { .. })
    ));
    assert_eq!(factory.connections()[0].disconnect_count(), 1);

    // 未知 Provider 的归还静默忽略
    manager.release_connection("p", &connection).await;
}

#[tokio::test]
async fn test_health_reflects_connections() {
    let manager = manager();
    let factory = Arc::new(MockConnectionFactory::new());
    manager
        .initialize_provider(provider_config("p", 2), factory.clone())
        .await
        .unwrap();

    // 没有连接时不健康
    let health = manager.check_provider_health("p").await.unwrap();
    assert!(!health.is_healthy);
    assert!(health.connections.is_empty());
    assert!(health.average_latency_ms.is_none());

    let a = manager.acquire_connection("p").await.unwrap();
    let _b = manager.acquire_connection("p").await.unwrap();
    manager.release_connection("p", &a).await;

    factory.connections()[0].set_healthy(false);
    let health = manager.check_provider_health("p").await.unwrap();
    assert!(health.is_healthy);
    assert_eq!(health.connections.len(), 2);
    assert_eq!(health.healthy_count(), 1);
    assert!(health.average_latency_ms.is_some());

    factory.set_all_healthy(false);
    let health = manager.check_provider_health("p").await.unwrap();
    assert!(!health.is_healthy);
    assert!(health.average_latency_ms.is_none());
}

#[tokio::test]
async fn test_probe_error_counts_as_unhealthy() {
    let manager = manager();
    let factory = Arc::new(MockConnectionFactory::new());
    manager
        .initialize_provider(provider_config("p", 1), factory.clone())
        .await
        .unwrap();

    manager.acquire_connection("p").await.unwrap();
    factory.connections()[0].set_probe_error(true);

    let health = manager.check_provider_health("p").await.unwrap();
    assert!(!health.is_healthy);
    assert!(health.connections[0].error.is_some());
}

#[tokio::test]
async fn test_health_probes_run_concurrently() {
    let manager = manager();
    let factory =
        Arc::new(MockConnectionFactory::new().with_connection_latency(Duration::from_millis(100)));
    manager
        .initialize_provider(provider_config("p", 3), factory.clone())
        .await
        .unwrap();
    for _ in 0..3 {
        manager.acquire_connection("p").await.unwrap();
    }

    let started = std::time::Instant::now();
    let health = manager.check_provider_health("p").await.unwrap();
    assert!(health.is_healthy);
    assert!(started.elapsed() < Duration::from_millis(250));
    assert!(health.average_latency_ms.unwrap() >= 100.0);
}

#[tokio::test]
async fn test_released_connection_reused_at_capacity() {
    let manager = Arc::new(manager());
    let factory = Arc::new(MockConnectionFactory::new());
    manager
        .initialize_provider(provider_config("p", 2), factory.clone())
        .await
        .unwrap();

    let a = manager.acquire_connection("p").await.unwrap();
    let b = manager.acquire_connection("p").await.unwrap();
    assert!(!same_connection(&a, &b));

    let third = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.acquire_connection("p").await })
    };
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(!third.is_finished(), "third acquire should block at capacity");

    manager.release_connection("p", &a).await;
    let c = tokio::time::timeout(Duration::from_secs(1), third)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    assert!(same_connection(&a, &c));
    assert!(same_connection(&c, &as_shared(&factory.connections()[0])));
    assert_eq!(factory.created_count(), 2);
}

#[tokio::test]
async fn test_release_unknown_connection_is_noop() {
    let manager = manager();
    let factory = Arc::new(MockConnectionFactory::new());
    manager
        .initialize_provider(provider_config("p", 1), factory.clone())
        .await
        .unwrap();

    let held = manager.acquire_connection("p").await.unwrap();
    let stranger = as_shared(&Arc::new(modelhub_testing_utils::MockConnection::new(99)));
    manager.release_connection("p", &stranger).await;

    let stats = manager.pool_stats("p").await.unwrap();
    assert_eq!(stats.active_connections, 1);
    assert_eq!(stats.total_connections, 1);

    manager.release_connection("p", &held).await;
    assert_eq!(manager.pool_stats("p").await.unwrap().idle_connections, 1);
}

#[tokio::test]
async fn test_factory_failure_propagates() {
    let manager = manager();
    let factory = Arc::new(MockConnectionFactory::failing());
    manager
        .initialize_provider(provider_config("p", 1), factory.clone())
        .await
        .unwrap();
    let mut events = manager.subscribe().await;

    let result = manager.acquire_connection("p").await;
    assert!(matches!(result, Err(HubError::ConnectionFactory(_))));
    assert_eq!(manager.pool_stats("p").await.unwrap().total_connections, 0);

    match next_event(&mut events).await {
        PoolEvent::ConnectionStateChanged { state, .. } => {
            assert!(matches!(state, ConnectionState::Error(_)))
        }
        other => panic!("unexpected event: {other:?}"),
    }

    // 创建名额已归还，恢复后可以正常获取
    factory.set_failing(false);
    assert!(manager.acquire_connection("p").await.is_ok());
    assert_eq!(factory.attempt_count(), 2);
}

#[tokio::test]
async fn test_waiter_retries_after_failed_creation() {
    let manager = Arc::new(manager());
    let factory =
        Arc::new(MockConnectionFactory::new().with_creation_delay(Duration::from_millis(100)));
    factory.set_failing(true);
    manager
        .initialize_provider(provider_config("p", 1), factory.clone())
        .await
        .unwrap();

    let creator = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.acquire_connection("p").await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    // 唯一的名额正在创建中，第二个获取者排队
    let waiter = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.acquire_connection("p").await })
    };
    tokio::time::sleep(Duration::from_millis(130)).await;
    factory.set_failing(false);

    assert!(matches!(
        creator.await.unwrap(),
        Err(HubError::ConnectionFactory(_))
    ));
    let connection = tokio::time::timeout(Duration::from_secs(1), waiter)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    assert!(same_connection(&connection, &as_shared(&factory.connections()[0])));
    assert_eq!(factory.attempt_count(), 2);
    assert_eq!(factory.created_count(), 1);
}

#[tokio::test]
async fn test_reinitialize_disposes_previous_pool() {
    let manager = manager();
    let old_factory = Arc::new(MockConnectionFactory::new());
    manager
        .initialize_provider(provider_config("p", 2), old_factory.clone())
        .await
        .unwrap();
    manager.acquire_connection("p").await.unwrap();
    manager.acquire_connection("p").await.unwrap();

    let new_factory = Arc::new(MockConnectionFactory::new());
    manager
        .initialize_provider(provider_config("p", 1), new_factory.clone())
        .await
        .unwrap();

    assert_eq!(old_factory.total_disconnects(), 2);
    let stats = manager.pool_stats("p").await.unwrap();
    assert_eq!(stats.max_size, 1);
    assert_eq!(stats.total_connections, 0);

    manager.acquire_connection("p").await.unwrap();
    assert_eq!(new_factory.created_count(), 1);
    assert_eq!(manager.provider_ids().await, vec!["p"]);
}

#[tokio::test]
async fn test_acquire_times_out_when_saturated() {
    let config = PoolConfigBuilder::new().with_acquire_timeout_ms(50).build();
    let manager = ConnectionPoolManager::new(config).unwrap();
    manager
        .initialize_provider(provider_config("p", 1), Arc::new(MockConnectionFactory::new()))
        .await
        .unwrap();

    let held = manager.acquire_connection("p").await.unwrap();
    let started = std::time::Instant::now();
    let result = manager.acquire_connection("p").await;

    assert!(matches!(
        result,
        Err(HubError::AcquireTimeout { timeout_ms: 50, .. })
    ));
    assert!(started.elapsed() >= Duration::from_millis(50));

    // 超时的等待者不会吞掉后续归还的连接
    manager.release_connection("p", &held).await;
    let again = manager.acquire_connection("p").await.unwrap();
    assert!(same_connection(&held, &again));
}

#[tokio::test]
async fn test_events_emitted_for_lifecycle() {
    let manager = manager();
    let factory = Arc::new(MockConnectionFactory::new());
    let mut events = manager.subscribe().await;
    manager
        .initialize_provider(provider_config("p", 1), factory.clone())
        .await
        .unwrap();

    manager.acquire_connection("p").await.unwrap();
    match next_event(&mut events).await {
        PoolEvent::ConnectionStateChanged { provider_id, state, .. } => {
            assert_eq!(provider_id, "p");
            assert_eq!(state, ConnectionState::Connected);
        }
        other => panic!("unexpected event: {other:?}"),
    }

    manager.check_provider_health("p").await.unwrap();
    match next_event(&mut events).await {
        PoolEvent::HealthCheck { provider_id, health, .. } => {
            assert_eq!(provider_id, "p");
            assert!(health.is_healthy);
        }
        other => panic!("unexpected event: {other:?}"),
    }

    manager.dispose_provider("p").await;
    match next_event(&mut events).await {
        PoolEvent::ConnectionStateChanged { state, .. } => {
            assert_eq!(state, ConnectionState::Disconnected)
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn test_periodic_health_check_emits_events() {
    let manager = manager();
    let mut events = manager.subscribe().await;
    manager
        .initialize_provider(
            provider_config("p", 1).with_health_check_interval(1),
            Arc::new(MockConnectionFactory::new()),
        )
        .await
        .unwrap();

    // 初始化时不立即检查
    assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));

    match next_event(&mut events).await {
        PoolEvent::HealthCheck { provider_id, health, .. } => {
            assert_eq!(provider_id, "p");
            assert!(!health.is_healthy);
        }
        other => panic!("unexpected event: {other:?}"),
    }

    manager.dispose().await;
}

#[tokio::test]
async fn test_dispose_disconnects_best_effort() {
    let manager = Arc::new(manager());
    let factory = Arc::new(MockConnectionFactory::new());
    manager
        .initialize_provider(provider_config("p", 3), factory.clone())
        .await
        .unwrap();
    for _ in 0..3 {
        manager.acquire_connection("p").await.unwrap();
    }
    factory.connections()[1].set_fail_disconnect(true);

    let waiter = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.acquire_connection("p").await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    let mut events = manager.subscribe().await;
    manager.dispose().await;

    // 一个连接断开失败不影响其余连接
    for connection in factory.connections() {
        assert_eq!(connection.disconnect_count(), 1);
    }
    assert!(matches!(
        waiter.await.unwrap(),
        Err(HubError::PoolClosed { .. })
    ));

    assert!(matches!(
        events.recv().await,
        Ok(PoolEvent::ConnectionStateChanged {
            state: ConnectionState::Disconnected,
            ..
        })
    ));
    assert!(matches!(events.recv().await, Err(RecvError::Closed)));

    let mut late = manager.subscribe().await;
    assert!(matches!(late.recv().await, Err(RecvError::Closed)));
    assert!(manager.provider_ids().await.is_empty());
}

#[tokio::test]
async fn test_stats_track_waiters_and_reuse() {
    let manager = Arc::new(manager());
    manager
        .initialize_provider(provider_config("p", 1), Arc::new(MockConnectionFactory::new()))
        .await
        .unwrap();

    let held = manager.acquire_connection("p").await.unwrap();
    let waiter = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.acquire_connection("p").await })
    };

    let probe = Arc::clone(&manager);
    assert!(
        TestEnv::wait_for(
            move || {
                let probe = Arc::clone(&probe);
                async move { probe.pool_stats("p").await.unwrap().waiting_acquirers == 1 }
            },
            Duration::from_secs(1),
        )
        .await
    );

    manager.release_connection("p", &held).await;
    waiter.await.unwrap().unwrap();

    let stats = manager.pool_stats("p").await.unwrap();
    assert_eq!(stats.created_count, 1);
    assert_eq!(stats.reused_count, 1);
    assert_eq!(stats.waiting_acquirers, 0);
}
