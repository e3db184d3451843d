use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use clap_verbosity_flag::{InfoLevel, Verbosity};
use haptinav_core::config::GuidanceConfig;
use haptinav_core::geo::GeoPoint;
use haptinav_core::session::RoutingTarget;

use crate::device::DeviceTarget;
use crate::location::FixSource;

pub const DEFAULT_ROUTING_URL: &str = "https://graphhopper.com/api/1/route";

#[derive(Parser, Clone, Debug)]
#[command(version, about = "Turn-by-turn guidance for a haptic navigation device")]
pub struct Cli {
    #[command(flatten)]
    pub verbose: Verbosity<InfoLevel>,

    /// Guidance tunables as a JSON document
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Route endpoint of a GraphHopper compatible service
    #[arg(long, default_value = DEFAULT_ROUTING_URL)]
    pub routing_url: String,

    #[arg(long)]
    pub api_key: Option<String>,

    /// Destination as "lat,lon"
    #[arg(long, value_parser = parse_geo_point)]
    pub destination: GeoPoint,

    /// Vehicle profile passed to the routing service
    #[arg(long, default_value = "bike")]
    pub profile: String,

    #[arg(long, default_value = "fastest")]
    pub weighting: String,

    /// Language of instruction texts
    #[arg(long, default_value = "en")]
    pub locale: String,

    /// Where fixes come from: "-" for stdin, "tcp:host:port" or a file
    #[arg(long, default_value = "-")]
    pub fixes: FixSource,

    /// Pace fixes from a file by their timestamps
    #[arg(long, default_value_t = false)]
    pub replay: bool,

    /// Device link: "-" for stdout, "tcp:host:port" or a serial device path
    #[arg(long, default_value = "-")]
    pub device: DeviceTarget,

    /// Override of the off-route threshold in meters
    #[arg(long)]
    pub off_route_threshold: Option<f64>,
}

impl Cli {
    /// Guidance configuration from `--config`, with command line overrides
    pub fn guidance_config(&self) -> anyhow::Result<GuidanceConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let json = std::fs::read_to_string(path)
                    .with_context(|| format!("Cannot read config file {}", path.display()))?;
                GuidanceConfig::from_json(&json)
                    .with_context(|| format!("Invalid config file {}", path.display()))?
            }
            None => GuidanceConfig::default(),
        };
        if let Some(threshold) = self.off_route_threshold {
            if !(threshold > 0.0) {
                anyhow::bail!("Off-route threshold must be positive, got {}", threshold);
            }
            config.off_route_threshold_m = threshold;
        }
        log::debug!("Guidance config {:?}", config);
        Ok(config)
    }

    pub fn routing_target(&self) -> RoutingTarget {
        RoutingTarget {
            destination: self.destination,
            vehicle_profile: self.profile.clone(),
            weighting: self.weighting.clone(),
            locale: self.locale.clone(),
        }
    }
}

pub fn parse_geo_point(s: &str) -> Result<GeoPoint, String> {
    let (lat, lon) = s
        .split_once(',')
        .ok_or_else(|| format!("expected \"lat,lon\", got \"{}\"", s))?;
    let point = GeoPoint::new(
        lat.trim()
            .parse()
            .map_err(|e| format!("latitude \"{}\": {}", lat, e))?,
        lon.trim()
            .parse()
            .map_err(|e| format!("longitude \"{}\": {}", lon, e))?,
    );
    if !point.is_valid() {
        return Err(format!("\"{}\" is not a valid position", s));
    }
    Ok(point)
}
