use agv_fleet_gateway::transport::parse_mqtt_url;
use agv_fleet_gateway::{
    command_channel, Command, CommandOutcome, Gateway, GatewayConfig, OrderCommand, SqliteStore,
};
use agv_fleet_proto::Category;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::timeout;
use uuid::Uuid;

async fn spawn_eventloop(mut eventloop: EventLoop) {
    loop {
        if eventloop.poll().await.is_err() {
            break;
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn mqtt_gateway_roundtrip() {
    if std::env::var("FLEET_INTEGRATION").is_err() {
        eprintln!("Skipping integration test; set FLEET_INTEGRATION=1 to run");
        return;
    }

    let broker = std::env::var("FLEET_MQTT_BROKER")
        .unwrap_or_else(|_| "tcp://localhost:1883".to_string());
    let (host, port) = parse_mqtt_url(&broker).unwrap();

    let mut config = GatewayConfig::default();
    config.mqtt.broker = broker;
    config.identity.manufacturer = format!("it-{}", Uuid::new_v4().simple());
    config.identity.serial_number = "agv-it".to_string();
    let manufacturer = config.identity.manufacturer.clone();
    let order_topic = config.identity.vehicle_topic(Category::Order);
    let state_topic = config.identity.vehicle_topic(Category::State);

    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let gateway = Gateway::with_store(config, store.clone()).unwrap();
    let (handle, commands) = command_channel(4);
    let runtime = tokio::spawn(gateway.run(commands));

    // Vehicle side: receives orders, sends state.
    let mut vehicle_opts = MqttOptions::new(format!("vehicle-{}", Uuid::new_v4()), host, port);
    vehicle_opts.set_keep_alive(Duration::from_secs(5));
    let (vehicle, mut vehicle_eventloop) = AsyncClient::new(vehicle_opts, 10);
    vehicle
        .subscribe(&order_topic, QoS::AtLeastOnce)
        .await
        .unwrap();

    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
        loop {
            match vehicle_eventloop.poll().await {
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    let _ = tx.send(publish.payload.to_vec());
                    break;
                }
                Ok(_) => {}
                Err(_) => break,
            }
        }
        spawn_eventloop(vehicle_eventloop).await;
    });

    tokio::time::sleep(Duration::from_millis(500)).await;

    let outcome = handle
        .submit(Command::Order(OrderCommand::Publish))
        .await
        .unwrap();
    assert!(matches!(outcome, CommandOutcome::Published(p) if p.header_id == 1));

    let received = timeout(Duration::from_secs(5), rx)
        .await
        .expect("timeout waiting for order")
        .expect("vehicle dropped");
    let order: serde_json::Value = serde_json::from_slice(&received).unwrap();
    assert_eq!(order["headerId"], 1);
    assert_eq!(order["manufacturer"], manufacturer.as_str());

    let state = json!({
        "headerId": 1,
        "timestamp": "2024-01-01T08:00:00.000Z",
        "version": "2.0.0",
        "manufacturer": manufacturer,
        "serialNumber": "agv-it",
        "orderId": "order_001",
        "lastNodeId": "node_1",
        "driving": false,
        "operatingMode": "AUTOMATIC"
    });
    vehicle
        .publish(
            &state_topic,
            QoS::AtLeastOnce,
            false,
            serde_json::to_vec(&state).unwrap(),
        )
        .await
        .unwrap();

    timeout(Duration::from_secs(5), async {
        while store.count(Category::State).unwrap() == 0 {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .expect("timeout waiting for stored state");

    runtime.abort();
}
