use aquabus::link::{FrameOutcome, TelemetryLink};
use aquabus::protocol::{OutboundRequest, SubscriptionId};
use aquabus::transport::{MemoryConnector, MemoryPeer, MemorySink};
use aquabus::{DeviceChannel, EntityId, LinkConfig};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use tokio::sync::mpsc::UnboundedReceiver;

fn config_for(channels: &[DeviceChannel]) -> LinkConfig {
    let entity_ids: BTreeMap<_, _> = channels
        .iter()
        .map(|&channel| (channel, EntityId::new(format!("{}-id", channel)).unwrap()))
        .collect();

    LinkConfig {
        ws_url: "ws://broker/api/ws".to_string(),
        token: "tok".to_string(),
        api_url: "http://broker".to_string(),
        entity_ids,
    }
}

fn build_link(config: &LinkConfig) -> (TelemetryLink, UnboundedReceiver<MemoryPeer>, MemorySink) {
    let (connector, peers) = MemoryConnector::new();
    let sink = MemorySink::new();
    let link = TelemetryLink::new(config, Box::new(connector), Box::new(sink.clone()));
    (link, peers, sink)
}

/// Connects, lets the broker accept, and processes the subscriptions.
fn connect_and_open(link: &mut TelemetryLink, peers: &mut UnboundedReceiver<MemoryPeer>) -> MemoryPeer {
    link.connect();
    let peer = peers.try_recv().expect("connector should hand out a peer");
    assert!(peer.accept());
    link.drain_events();
    peer
}

fn subscription_ids(frames: &[String]) -> Vec<(u64, String)> {
    frames
        .iter()
        .map(|frame| {
            let value: Value = serde_json::from_str(frame).unwrap();
            let sub = &value["subscriptions"][0];
            (
                sub["subscriptionId"].as_u64().unwrap(),
                sub["entityId"].as_str().unwrap().to_string(),
            )
        })
        .collect()
}

fn telemetry_frame(id: u32, data: Value) -> String {
    json!({ "subscriptionId": id, "data": data }).to_string()
}

#[test]
fn test_connect_uses_token_endpoint() {
    let config = config_for(&DeviceChannel::ALL);
    let (mut link, mut peers, _sink) = build_link(&config);

    link.connect();
    let peer = peers.try_recv().unwrap();
    assert_eq!(peer.endpoint, "ws://broker/api/ws?token=tok");

    // Nothing is subscribed until the broker accepts.
    assert!(link.has_connection());
    assert!(!link.is_connected());
    assert_eq!(link.subscription_count(), 0);
}

#[test]
fn test_subscribe_all_assigns_ids_in_channel_order() {
    let config = config_for(&DeviceChannel::ALL);
    let (mut link, mut peers, _sink) = build_link(&config);
    let mut peer = connect_and_open(&mut link, &mut peers);

    let frames = peer.drain_frames();
    let ids = subscription_ids(&frames);
    assert_eq!(ids.len(), 9);

    for (index, channel) in DeviceChannel::ALL.iter().enumerate() {
        let expected_id = index as u64 + 1;
        assert_eq!(ids[index], (expected_id, format!("{}-id", channel)));
        assert_eq!(link.channel_for(SubscriptionId(expected_id as u32)), Some(*channel));
        assert!(link.device_state(*channel).connected);
    }

    let value: Value = serde_json::from_str(&frames[0]).unwrap();
    assert_eq!(value["subscriptions"][0]["entityType"], "DEVICE");
    assert_eq!(value["subscriptions"][0]["scope"], "LATEST_TELEMETRY");
    assert!(link.is_connected());
}

#[test]
fn test_unconfigured_channels_are_skipped() {
    let config = config_for(&[DeviceChannel::Shower, DeviceChannel::OverheadTank]);
    let (mut link, mut peers, _sink) = build_link(&config);
    let mut peer = connect_and_open(&mut link, &mut peers);

    let ids = subscription_ids(&peer.drain_frames());
    assert_eq!(
        ids,
        vec![(1, "shower-id".to_string()), (2, "overheadTank-id".to_string())]
    );

    assert!(link.device_state(DeviceChannel::Shower).connected);
    assert!(!link.device_state(DeviceChannel::Washbasin1).connected);
    assert_eq!(link.subscription_count(), 2);
}

#[test]
fn test_frame_updates_only_bound_channel() {
    let config = config_for(&DeviceChannel::ALL);
    let (mut link, mut peers, _sink) = build_link(&config);
    let _peer = connect_and_open(&mut link, &mut peers);

    // Id 7 is the water pump in channel order.
    let outcome = link.handle_frame(&telemetry_frame(7, json!({ "status": [[1700, "true"]] })));
    assert_eq!(outcome, FrameOutcome::Applied(DeviceChannel::WaterPump));

    for channel in DeviceChannel::ALL {
        let data = &link.device_state(channel).data;
        if channel == DeviceChannel::WaterPump {
            assert_eq!(data["status"], json!("true"));
        } else {
            assert!(data.is_empty(), "{} should be untouched", channel);
        }
    }
}

#[test]
fn test_frame_merge_preserves_previous_keys() {
    let config = config_for(&DeviceChannel::ALL);
    let (mut link, mut peers, _sink) = build_link(&config);
    let peer = connect_and_open(&mut link, &mut peers);

    peer.push_frame(telemetry_frame(1, json!({ "status": [[1, true]], "flow": [[1, 8]] })));
    peer.push_frame(telemetry_frame(1, json!({ "flow": [[2, 0], [1, 8]] })));
    link.drain_events();

    let data = &link.device_state(DeviceChannel::Washbasin1).data;
    assert_eq!(data["status"], json!(true));
    assert_eq!(data["flow"], json!(0));
}

#[test]
fn test_unknown_subscription_id_is_dropped() {
    let config = config_for(&[DeviceChannel::Inflow]);
    let (mut link, mut peers, _sink) = build_link(&config);
    let _peer = connect_and_open(&mut link, &mut peers);
    let before = link.devices().clone();

    let outcome = link.handle_frame(&telemetry_frame(42, json!({ "flow": [[1, 50]] })));

    assert_eq!(outcome, FrameOutcome::Discarded);
    assert_eq!(link.devices(), &before);
    assert_eq!(link.get_stats().frames_discarded, 1);
}

#[test]
fn test_frames_without_id_or_data_are_dropped() {
    let config = config_for(&DeviceChannel::ALL);
    let (mut link, mut peers, _sink) = build_link(&config);
    let _peer = connect_and_open(&mut link, &mut peers);

    assert_eq!(link.handle_frame(r#"{"data":{"flow":[[1,2]]}}"#), FrameOutcome::Discarded);
    assert_eq!(link.handle_frame(r#"{"subscriptionId":1}"#), FrameOutcome::Discarded);
    assert_eq!(link.handle_frame("not json"), FrameOutcome::Malformed);

    assert!(link.device_state(DeviceChannel::Washbasin1).data.is_empty());
    assert!(link.is_connected());
}

#[test]
fn test_disconnect_clears_ids_and_connected_flags() {
    let config = config_for(&DeviceChannel::ALL);
    let (mut link, mut peers, _sink) = build_link(&config);
    let peer = connect_and_open(&mut link, &mut peers);
    assert_eq!(link.subscription_count(), 9);

    link.close();

    assert_eq!(link.subscription_count(), 0);
    assert!(!link.is_connected());
    assert!(peer.is_dropped());
    for channel in DeviceChannel::ALL {
        assert!(!link.device_state(channel).connected);
    }
    assert_eq!(
        link.handle_frame(&telemetry_frame(1, json!({ "flow": [[1, 8]] }))),
        FrameOutcome::Discarded
    );
}

#[test]
fn test_broker_close_marks_all_disconnected() {
    let config = config_for(&DeviceChannel::ALL);
    let (mut link, mut peers, _sink) = build_link(&config);
    let peer = connect_and_open(&mut link, &mut peers);

    assert!(peer.close());
    link.drain_events();

    assert!(!link.has_connection());
    assert_eq!(link.subscription_count(), 0);
    assert!(link.devices().values().all(|state| !state.connected));
}

#[test]
fn test_dropped_event_queue_counts_as_close() {
    let config = config_for(&DeviceChannel::ALL);
    let (mut link, mut peers, _sink) = build_link(&config);
    let peer = connect_and_open(&mut link, &mut peers);

    drop(peer);
    link.drain_events();

    assert!(!link.has_connection());
    assert!(link.devices().values().all(|state| !state.connected));
}

#[test]
fn test_transport_error_is_not_fatal() {
    let config = config_for(&DeviceChannel::ALL);
    let (mut link, mut peers, _sink) = build_link(&config);
    let peer = connect_and_open(&mut link, &mut peers);

    assert!(peer.fail("socket hiccup"));
    link.drain_events();

    assert!(link.is_connected());
    assert_eq!(link.subscription_count(), 9);
}

#[test]
fn test_reconnect_restarts_ids_and_discards_stale_frames() {
    let config = config_for(&DeviceChannel::ALL);
    let (mut link, mut peers, _sink) = build_link(&config);
    let old_peer = connect_and_open(&mut link, &mut peers);

    // Queued on the old connection but never processed.
    old_peer.push_frame(telemetry_frame(1, json!({ "status": [[1, true]] })));

    let mut new_peer = connect_and_open(&mut link, &mut peers);

    assert!(old_peer.is_dropped());
    assert!(!old_peer.push_frame(telemetry_frame(1, json!({ "status": [[2, true]] }))));
    assert!(link.device_state(DeviceChannel::Washbasin1).data.is_empty());

    let ids = subscription_ids(&new_peer.drain_frames());
    assert_eq!(ids.first().map(|(id, _)| *id), Some(1));
    assert_eq!(ids.last().map(|(id, _)| *id), Some(9));
    assert_eq!(link.get_stats().connects, 2);
}

#[test]
fn test_publish_command_requires_live_connection() {
    let config = config_for(&DeviceChannel::ALL);
    let (mut link, mut peers, sink) = build_link(&config);

    let mut params = Map::new();
    params.insert("status".to_string(), json!(true));

    link.publish_command(DeviceChannel::WaterPump, params.clone());
    assert!(sink.is_empty());

    link.connect();
    link.publish_command(DeviceChannel::WaterPump, params.clone());
    assert!(sink.is_empty(), "connection not open yet");

    let peer = peers.try_recv().unwrap();
    peer.accept();
    link.drain_events();
    link.publish_command(DeviceChannel::WaterPump, params);

    let requests = sink.take();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].path(), "/api/plugins/rpc/twoway/waterPump-id");
    assert_eq!(
        requests[0].body().unwrap(),
        json!({ "method": "setDeviceState", "params": { "status": true } })
    );
}

#[test]
fn test_publish_skips_unconfigured_channel() {
    let config = config_for(&[DeviceChannel::Shower]);
    let (mut link, mut peers, sink) = build_link(&config);
    let _peer = connect_and_open(&mut link, &mut peers);

    link.publish_command(DeviceChannel::WaterPump, Map::new());
    link.publish_telemetry(DeviceChannel::Inflow, Map::new());

    assert!(sink.is_empty());
}

#[test]
fn test_publish_telemetry_works_without_connection() {
    let config = config_for(&[DeviceChannel::UndergroundTank]);
    let (mut link, _peers, sink) = build_link(&config);

    let mut payload = Map::new();
    payload.insert("level".to_string(), json!(500));
    link.publish_telemetry(DeviceChannel::UndergroundTank, payload.clone());

    let requests = sink.requests();
    assert_eq!(requests.len(), 1);
    match &requests[0] {
        OutboundRequest::Telemetry { entity_id, payload: sent } => {
            assert_eq!(entity_id.as_str(), "undergroundTank-id");
            assert_eq!(sent, &payload);
        }
        other => panic!("expected telemetry request, got {:?}", other),
    }
    assert_eq!(
        requests[0].path(),
        "/api/plugins/telemetry/DEVICE/undergroundTank-id/timeseries/ANY"
    );
}

#[test]
fn test_blank_file_ids_are_never_subscribed_or_published() {
    let path = std::env::temp_dir().join(format!("aquabus-link-blank-{}.json", std::process::id()));
    std::fs::write(&path, r#"{"ws_url":"ws://b","entity_ids":{"shower":"","washbasin1":"wb1"}}"#).unwrap();
    let config = LinkConfig::from_file(&path).unwrap();
    std::fs::remove_file(&path).ok();

    let (mut link, mut peers, sink) = build_link(&config);
    let mut peer = connect_and_open(&mut link, &mut peers);

    assert_eq!(subscription_ids(&peer.drain_frames()), vec![(1, "wb1".to_string())]);
    assert!(!link.device_state(DeviceChannel::Shower).connected);

    link.publish_telemetry(DeviceChannel::Shower, Map::new());
    assert!(sink.is_empty());
}
