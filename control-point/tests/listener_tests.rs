//! Event delivery through the embedded listener, using real HTTP NOTIFY
//! requests against the loopback callback URL.

mod support;

use std::time::Duration;

use support::*;
use tokio::sync::mpsc;
use tokio::time::timeout;
use upnp_control::{ControlPoint, ControlPointEvent, ErrorSource};

const SID: &str = "uuid:RINCON_000E58A0123401400_sub0000000042";

const VOLUME_EVENT: &str = r#"<?xml version="1.0"?>
<e:propertyset xmlns:e="urn:schemas-upnp-org:event-1-0">
  <e:property><Volume>37</Volume></e:property>
  <e:property><Mute>0</Mute></e:property>
</e:propertyset>"#;

async fn subscribed(
    device: &std::sync::Arc<FakeDevice>,
) -> (ControlPoint, mpsc::UnboundedReceiver<ControlPointEvent>, String) {
    device.respond("SUBSCRIBE", RENDERING_EVENT_URL, granted(SID, 1800));
    device.respond("UNSUBSCRIBE", RENDERING_EVENT_URL, status(200));
    let (control_point, mut events) = control_point(device, test_config());

    let callback_url = control_point.start_listener().await.unwrap();
    control_point.subscribe(RENDERING).await.unwrap();
    drain(&mut events);
    (control_point, events, callback_url)
}

async fn notify(url: &str, sid: Option<&str>, seq: Option<&str>, body: &str) -> reqwest::Response {
    let method = reqwest::Method::from_bytes(b"NOTIFY").unwrap();
    let mut request = reqwest::Client::new()
        .request(method, url)
        .header("NT", "upnp:event")
        .header("NTS", "upnp:propchange")
        .header("Content-Type", "text/xml; charset=\"utf-8\"")
        .body(body.to_string());
    if let Some(sid) = sid {
        request = request.header("SID", sid);
    }
    if let Some(seq) = seq {
        request = request.header("SEQ", seq);
    }
    request.send().await.unwrap()
}

async fn next_event(events: &mut mpsc::UnboundedReceiver<ControlPointEvent>) -> ControlPointEvent {
    timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("events channel closed")
}

#[tokio::test]
async fn test_notification_becomes_event() {
    let device = FakeDevice::with_descriptions();
    let (control_point, mut events, callback_url) = subscribed(&device).await;

    let response = notify(&callback_url, Some(SID), Some("0"), VOLUME_EVENT).await;
    assert_eq!(response.status(), 200);

    match next_event(&mut events).await {
        ControlPointEvent::Event(notification) => {
            assert_eq!(notification.service_type, RENDERING);
            assert_eq!(notification.sid, SID);
            assert_eq!(notification.seq, 0);
            assert_eq!(
                notification.properties,
                vec![
                    ("Volume".to_string(), "37".to_string()),
                    ("Mute".to_string(), "0".to_string()),
                ]
            );
            assert_eq!(notification.raw_body, VOLUME_EVENT);
        }
        other => panic!("Expected event, got {other:?}"),
    }

    control_point.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_notifications_keep_delivery_order() {
    let device = FakeDevice::with_descriptions();
    let (control_point, mut events, callback_url) = subscribed(&device).await;

    for seq in 0..3 {
        let body = format!(
            r#"<e:propertyset xmlns:e="urn:schemas-upnp-org:event-1-0"><e:property><Volume>{seq}</Volume></e:property></e:propertyset>"#
        );
        notify(&callback_url, Some(SID), Some(&seq.to_string()), &body).await;
    }

    for expected in 0..3u32 {
        match next_event(&mut events).await {
            ControlPointEvent::Event(notification) => {
                assert_eq!(notification.seq, expected);
                assert_eq!(notification.get("Volume"), Some(expected.to_string().as_str()));
            }
            other => panic!("Expected event, got {other:?}"),
        }
    }

    control_point.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_notification_without_seq_is_reported() {
    let device = FakeDevice::with_descriptions();
    let (control_point, mut events, callback_url) = subscribed(&device).await;

    let response = notify(&callback_url, Some(SID), None, VOLUME_EVENT).await;
    assert_eq!(response.status(), 200);

    match next_event(&mut events).await {
        ControlPointEvent::Error(notice) => {
            assert_eq!(notice.source, ErrorSource::MalformedNotification);
            assert!(notice.message.contains("SEQ"));
        }
        other => panic!("Expected error, got {other:?}"),
    }

    control_point.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_undecodable_property_set_is_reported() {
    let device = FakeDevice::with_descriptions();
    let (control_point, mut events, callback_url) = subscribed(&device).await;

    let response = notify(&callback_url, Some(SID), Some("1"), "<html>nope</html>").await;
    assert_eq!(response.status(), 200);

    match next_event(&mut events).await {
        ControlPointEvent::Error(notice) => {
            assert_eq!(notice.source, ErrorSource::MalformedPropertySet);
            assert!(notice.message.contains(SID));
        }
        other => panic!("Expected error, got {other:?}"),
    }

    control_point.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_unknown_sid_is_acknowledged_and_ignored() {
    let device = FakeDevice::with_descriptions();
    let (control_point, mut events, callback_url) = subscribed(&device).await;

    let response = notify(&callback_url, Some("uuid:stranger"), Some("0"), VOLUME_EVENT).await;
    assert_eq!(response.status(), 200);

    // A known SID afterwards is the first thing delivered
    notify(&callback_url, Some(SID), Some("5"), VOLUME_EVENT).await;
    match next_event(&mut events).await {
        ControlPointEvent::Event(notification) => assert_eq!(notification.seq, 5),
        other => panic!("Expected event, got {other:?}"),
    }

    control_point.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_no_events_after_unsubscribe() {
    let device = FakeDevice::with_descriptions();
    let (control_point, mut events, callback_url) = subscribed(&device).await;

    control_point.unsubscribe(RENDERING).await.unwrap();
    assert!(matches!(
        next_event(&mut events).await,
        ControlPointEvent::Unsubscribed { .. }
    ));

    let response = notify(&callback_url, Some(SID), Some("1"), VOLUME_EVENT).await;
    assert_eq!(response.status(), 200);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(drain(&mut events).is_empty());

    control_point.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_listener_refuses_connections_after_stop() {
    let device = FakeDevice::new();
    let (control_point, _events) = control_point(&device, test_config());

    let callback_url = control_point.start_listener().await.unwrap();
    control_point.stop_listener().await.unwrap();

    let method = reqwest::Method::from_bytes(b"NOTIFY").unwrap();
    let result = reqwest::Client::new()
        .request(method, &callback_url)
        .timeout(Duration::from_secs(2))
        .send()
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_notification_racing_the_subscribe_response_is_kept() {
    let device = FakeDevice::with_descriptions();
    device.respond("SUBSCRIBE", RENDERING_EVENT_URL, granted(SID, 1800));
    let (control_point, mut events) = control_point(&device, test_config());

    let callback_url = control_point.start_listener().await.unwrap();
    control_point.resolve_device(false).await.unwrap();
    drain(&mut events);

    // The device notifies before its SUBSCRIBE response arrives
    device.set_delay(Duration::from_millis(500));
    let (subscribed, response) = tokio::join!(control_point.subscribe(RENDERING), async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        notify(&callback_url, Some(SID), Some("0"), VOLUME_EVENT).await
    });
    subscribed.unwrap();
    assert_eq!(response.status(), 200);

    let received = [next_event(&mut events).await, next_event(&mut events).await];
    assert!(received
        .iter()
        .any(|event| matches!(event, ControlPointEvent::Subscribed { .. })));
    let initial = received.iter().find_map(|event| match event {
        ControlPointEvent::Event(notification) => Some(notification),
        _ => None,
    });
    let initial = initial.expect("initial event was lost");
    assert_eq!(initial.seq, 0);
    assert_eq!(initial.service_type, RENDERING);
    assert_eq!(initial.get("Volume"), Some("37"));

    control_point.shutdown().await.unwrap();
}
