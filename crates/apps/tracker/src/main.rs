mod live;
mod replay;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use engine::{EngineConfig, FleetMap};
use foundation::LngLatBounds;
use layers::{ModelType, RecordingHost};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "tracker", about = "Fleet map core against a headless host")]
struct Args {
    /// JSON engine config; `FLEET_*` variables override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Initial viewport as `west,south,east,north`.
    #[arg(long, default_value = "-180,-90,180,90")]
    bbox: String,

    #[arg(long, default_value_t = 0.0)]
    zoom: f64,

    /// `2d` or `3d`.
    #[arg(long)]
    model_type: Option<String>,

    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Replays a JSON-lines recording and prints the final partition.
    Replay { path: PathBuf },
    /// Subscribes to an MQTT broker and logs partition changes.
    Mqtt {
        #[arg(long, default_value = "localhost")]
        host: String,
        #[arg(long, default_value_t = 1883)]
        port: u16,
        #[arg(long, default_value = "fleet-tracker")]
        client_id: String,
        /// JSON array of devices loaded before connecting.
        #[arg(long)]
        devices: Option<PathBuf>,
        /// Seconds between summary log lines.
        #[arg(long, default_value_t = 10)]
        report_every: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;
    let bounds = parse_bbox(&args.bbox)?;
    let model_type = match args.model_type.as_deref() {
        None => None,
        Some("2d") => Some(ModelType::TwoD),
        Some("3d") => Some(ModelType::ThreeD),
        Some(other) => bail!("unknown model type `{other}`, expected 2d or 3d"),
    };

    let mut host = RecordingHost::new();
    host.set_viewport(bounds, args.zoom);
    host.set_style_loaded(true);
    let mut map = FleetMap::new(host, config);
    if let Some(model_type) = model_type {
        map.set_model_type(model_type);
    }

    match args.mode {
        Mode::Replay { path } => {
            let summary = replay::run(&mut map, &path)?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Mode::Mqtt {
            host,
            port,
            client_id,
            devices,
            report_every,
        } => {
            if let Some(path) = devices {
                let list = replay::read_devices(&path)?;
                map.bulk_set(list);
            }
            let opts = live::Options {
                host,
                port,
                client_id,
                report_every_s: report_every,
            };
            live::run(&mut map, opts).await?;
        }
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    let base = match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            serde_json::from_str(&text).with_context(|| format!("parsing config {}", path.display()))?
        }
        None => EngineConfig::default(),
    };
    Ok(base.overlay(|key| std::env::var(key).ok()))
}

fn parse_bbox(raw: &str) -> Result<LngLatBounds> {
    let parts: Vec<f64> = raw
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .with_context(|| format!("invalid bbox `{raw}`"))?;
    let [west, south, east, north] = parts[..] else {
        bail!("bbox needs four values, got {}", parts.len());
    };
    Ok(LngLatBounds::new(west, south, east, north))
}

/// Feeds queued host events back into the engine.
pub(crate) fn pump(map: &mut FleetMap<RecordingHost>) {
    for kind in map.host_mut().take_events() {
        map.handle_host_event(kind);
    }
}

#[cfg(test)]
mod tests {
    use super::parse_bbox;
    use foundation::LngLatBounds;

    #[test]
    fn bbox_parsing() {
        assert_eq!(parse_bbox("-10, 35,5,50").unwrap(), LngLatBounds::new(-10.0, 35.0, 5.0, 50.0));
        assert!(parse_bbox("1,2,3").is_err());
        assert!(parse_bbox("a,b,c,d").is_err());
    }
}
