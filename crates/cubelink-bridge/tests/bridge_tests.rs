//! End-to-end bridge tests over mock links
//!
//! These drive a running `CubeBridge` through its handle the way the socket
//! transport does, with the radio replaced by scriptable mock peripherals.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use cubelink_bridge::test_utils::{MockLink, MockScanner};
use cubelink_bridge::{gatt, BridgeConfigBuilder, CubeBridge, PublishCallback};

fn collecting_publish() -> (PublishCallback, Arc<Mutex<Vec<String>>>) {
    let published = Arc::new(Mutex::new(Vec::new()));
    let sink = published.clone();
    let callback: PublishCallback = Arc::new(move |text| {
        sink.lock().unwrap().push(text);
        Ok(())
    });
    (callback, published)
}

/// Poll until `predicate` holds or a test-sized deadline passes.
async fn wait_until(mut predicate: impl FnMut() -> bool) {
    for _ in 0..200 {
        if predicate() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached within deadline");
}

#[tokio::test]
async fn discovery_then_fan_out() {
    let (publish, published) = collecting_publish();
    let config = BridgeConfigBuilder::new()
        .scan_window(Duration::from_millis(10))
        .build();

    let scanner = MockScanner::new();
    let motorized = Arc::new(
        MockLink::new(0xA1)
            .with_writable(gatt::MOTOR)
            .with_readable(gatt::BATTERY, vec![80]),
    );
    let lightweight = Arc::new(MockLink::new(0xB2).with_writable(gatt::LIGHT));
    scanner.enqueue(motorized.clone());
    scanner.enqueue(lightweight.clone());

    let (bridge, handle) = CubeBridge::new(&config, scanner, publish);
    let registry = bridge.registry();
    let runner = tokio::spawn(bridge.run());

    // discovery trigger adopts both cubes and announces each exactly once
    handle
        .inbound_text(r#"{"uuid": "", "data": []}"#)
        .await
        .unwrap();
    wait_until(|| published.lock().unwrap().len() == 2).await;
    assert_eq!(registry.count(), 2);
    {
        let texts = published.lock().unwrap();
        assert!(texts.contains(&r#"{"serial":1}"#.to_string()));
        assert!(texts.contains(&r#"{"serial":2}"#.to_string()));
    }

    // a motor command reaches the cube that supports it and skips the other
    handle
        .inbound_text(
            r#"{"uuid": "10B20102-5B3B-4571-9508-CF3EFCD7BBAE", "data": [1, 1, 1, 50, 2, 2, 80]}"#,
        )
        .await
        .unwrap();
    wait_until(|| !motorized.writes().is_empty()).await;
    assert_eq!(
        motorized.writes(),
        vec![(gatt::MOTOR, vec![1, 1, 1, 50, 2, 2, 80])]
    );
    assert!(lightweight.writes().is_empty());

    let stats = handle.stats().await.unwrap();
    assert_eq!(stats.cubes_discovered, 2);
    assert_eq!(stats.writes_issued, 1);
    assert_eq!(stats.writes_skipped, 1);

    handle.shutdown().await.unwrap();
    runner.await.unwrap().unwrap();
}

#[tokio::test]
async fn repeated_discovery_never_duplicates_addresses() {
    let (publish, published) = collecting_publish();
    let config = BridgeConfigBuilder::new()
        .scan_window(Duration::from_millis(10))
        .build();

    let scanner = MockScanner::new();
    scanner.enqueue(Arc::new(MockLink::new(0xA1).with_writable(gatt::MOTOR)));
    // the same address advertised again within one window
    scanner.enqueue(Arc::new(MockLink::new(0xA1).with_writable(gatt::MOTOR)));

    let (bridge, handle) = CubeBridge::new(&config, scanner, publish);
    let registry = bridge.registry();
    let runner = tokio::spawn(bridge.run());

    handle
        .inbound_text(r#"{"uuid": "", "data": []}"#)
        .await
        .unwrap();
    wait_until(|| published.lock().unwrap().len() == 1).await;
    assert_eq!(registry.count(), 1);

    // a second scan with nothing new stays quiet
    handle
        .inbound_text(r#"{"uuid": ""}"#)
        .await
        .unwrap();
    let stats_after = handle.stats().await.unwrap();
    assert_eq!(stats_after.scans_started, 2);
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(registry.count(), 1);
    assert_eq!(published.lock().unwrap().len(), 1);

    handle.shutdown().await.unwrap();
    runner.await.unwrap().unwrap();
}

#[tokio::test]
async fn notifications_are_relayed_as_uppercase_json() {
    let (publish, published) = collecting_publish();
    let config = BridgeConfigBuilder::new()
        .scan_window(Duration::from_millis(10))
        .build();

    let scanner = MockScanner::new();
    let cube_link = Arc::new(
        MockLink::new(0xC3)
            .with_notifiable(gatt::BUTTON)
            .with_writable(gatt::MOTOR),
    );
    scanner.enqueue(cube_link.clone());

    let (bridge, handle) = CubeBridge::new(&config, scanner, publish);
    let runner = tokio::spawn(bridge.run());

    handle
        .inbound_text(r#"{"uuid": "", "data": []}"#)
        .await
        .unwrap();
    wait_until(|| published.lock().unwrap().len() == 1).await;

    cube_link.push_notification(gatt::BUTTON, vec![1, 128]);
    wait_until(|| published.lock().unwrap().len() == 2).await;

    let texts = published.lock().unwrap().clone();
    assert_eq!(texts[1], r#"{"data":[1,128],"serial":1,"uuid":"10B20107-5B3B-4571-9508-CF3EFCD7BBAE"}"#);

    let stats = handle.stats().await.unwrap();
    assert_eq!(stats.notifications_relayed, 1);

    handle.shutdown().await.unwrap();
    runner.await.unwrap().unwrap();
}

#[tokio::test]
async fn malformed_and_unsupported_input_is_absorbed() {
    let (publish, published) = collecting_publish();
    let config = BridgeConfigBuilder::new()
        .scan_window(Duration::from_millis(10))
        .build();

    let (bridge, handle) = CubeBridge::new(&config, MockScanner::new(), publish);
    let runner = tokio::spawn(bridge.run());

    // none of these produce output, errors, or writes
    handle.inbound_text("C#").await.unwrap();
    handle.inbound_text("[]").await.unwrap();
    handle.inbound_text(r#"{"data": [1, 2]}"#).await.unwrap();
    handle
        .inbound_text(r#"{"uuid": "10b20102-5b3b-4571-9508-cf3efcd7bbae", "data": [0]}"#)
        .await
        .unwrap();

    let stats = handle.stats().await.unwrap();
    assert_eq!(stats.commands_dropped, 3);
    // decoded fine, but there are no cubes to write to
    assert_eq!(stats.commands_decoded, 1);
    assert_eq!(stats.writes_issued, 0);
    assert!(published.lock().unwrap().is_empty());

    handle.shutdown().await.unwrap();
    runner.await.unwrap().unwrap();
}
