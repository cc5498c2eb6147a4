use std::time::{Duration, Instant};

use anyhow::Result;
use engine::FleetMap;
use foundation::{DeviceId, Time};
use layers::RecordingHost;
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use tracing::{debug, info, warn};

use crate::pump;

/// Frame cadence for timers and fades.
const TICK: Duration = Duration::from_millis(50);
const RECONNECT_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct Options {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub report_every_s: u64,
}

/// Periodic summary line. Reads the store once per field, never holding
/// the lock across calls.
#[derive(Debug, Clone, PartialEq)]
struct Report {
    devices: usize,
    clusters: usize,
    points: usize,
    messages: u64,
    decode_errors: u64,
    selected: Option<DeviceId>,
}

impl Report {
    fn from_map(map: &FleetMap<RecordingHost>) -> Self {
        let devices = map.device_count();
        let selected = map.selected();
        let partition = map.partition();
        let stats = map.router().stats();
        Self {
            devices,
            clusters: partition.clusters.len(),
            points: partition.points.len(),
            messages: stats.messages,
            decode_errors: stats.decode_errors,
            selected,
        }
    }
}

async fn subscribe_all(client: &AsyncClient, topics: &[String]) {
    for topic in topics {
        if let Err(err) = client.subscribe(topic.as_str(), QoS::AtLeastOnce).await {
            warn!(%topic, %err, "subscribe failed");
        }
    }
}

/// Runs until ctrl-c, feeding broker messages into `map`.
pub async fn run(map: &mut FleetMap<RecordingHost>, opts: Options) -> Result<()> {
    let mut mqtt = MqttOptions::new(opts.client_id.clone(), opts.host.clone(), opts.port);
    mqtt.set_keep_alive(Duration::from_secs(15));
    let (client, mut eventloop) = AsyncClient::new(mqtt, 64);

    let started = Instant::now();
    map.attach(Time::ZERO);
    pump(map);
    let topics = map.subscriptions();
    info!(host = %opts.host, port = opts.port, topics = ?topics, "connecting to broker");

    let mut frame = tokio::time::interval(TICK);
    let mut report = tokio::time::interval(Duration::from_secs(opts.report_every_s.max(1)));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            polled = eventloop.poll() => match polled {
                // Clean sessions drop subscriptions, so every ConnAck resubscribes.
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    info!("connected");
                    subscribe_all(&client, &topics).await;
                }
                Ok(Event::Incoming(Incoming::Publish(p))) => {
                    let updated = map.on_message(&p.topic, &p.payload);
                    debug!(topic = %p.topic, updated, "message");
                    pump(map);
                }
                Ok(_) => {}
                Err(err) => {
                    warn!(%err, "mqtt connection error, retrying");
                    tokio::time::sleep(RECONNECT_DELAY).await;
                }
            },
            _ = frame.tick() => {
                map.tick(Time(started.elapsed().as_secs_f64()));
                pump(map);
            }
            _ = report.tick() => {
                let r = Report::from_map(map);
                info!(
                    devices = r.devices,
                    clusters = r.clusters,
                    points = r.points,
                    messages = r.messages,
                    decode_errors = r.decode_errors,
                    selected = ?r.selected,
                    "fleet summary"
                );
            }
            _ = &mut shutdown => {
                info!("shutting down");
                break;
            }
        }
    }

    map.detach();
    if let Err(err) = client.disconnect().await {
        debug!(%err, "disconnect failed");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use engine::{EngineConfig, FleetMap};
    use foundation::{DeviceId, Time};
    use layers::RecordingHost;

    use super::Report;

    #[test]
    fn report_with_a_selected_device() {
        let mut host = RecordingHost::new();
        host.set_style_loaded(true);
        let mut map = FleetMap::new(host, EngineConfig::default());
        map.attach(Time::ZERO);
        map.on_message("acme/devices/a/location", br#"{"lng": 3, "lat": 4}"#);
        map.on_message("acme/devices/b/location", br#"{"lng": -60, "lat": 20}"#);
        map.on_message("acme/devices/b/location", b"{oops");
        map.select(Some(DeviceId::new("a")));

        let r = Report::from_map(&map);
        assert_eq!(r.devices, 2);
        assert_eq!(r.selected, Some(DeviceId::new("a")));
        assert_eq!(r.messages, 3);
        assert_eq!(r.decode_errors, 1);
        assert_eq!(r.clusters + r.points, 2);
    }
}
