//! Service configuration: the typed view of `configuration.toml`,
//! the flat name/value form exchanged with the registry, and the
//! frequency parser used for schedules.

use edgeline_api::{client::NvPairs, Error, Result};
use serde_derive::Deserialize;
use std::collections::HashMap;
use toml::value;

fn def_host() -> String {
    String::from("localhost")
}

fn def_port() -> u16 {
    49990
}

fn def_timeout() -> u64 {
    5000
}

fn def_retries() -> u32 {
    3
}

fn def_log_level() -> String {
    String::from("info")
}

fn def_true() -> bool {
    true
}

#[derive(Clone, Deserialize)]
pub struct ServiceConfig {
    #[serde(rename = "Host", default = "def_host")]
    pub host: String,
    #[serde(rename = "Port", default = "def_port")]
    pub port: u16,
    /// Spacing between connection attempts to peer services, in
    /// milliseconds.
    #[serde(rename = "Timeout", default = "def_timeout")]
    pub timeout: u64,
    #[serde(rename = "ConnectRetries", default = "def_retries")]
    pub connect_retries: u32,
    /// Health-check interval handed to the registry, e.g. "10s". An
    /// empty value disables registry health checking.
    #[serde(rename = "CheckInterval", default)]
    pub check_interval: String,
    #[serde(rename = "Labels", default)]
    pub labels: Vec<String>,
    #[serde(rename = "StartupMsg", default)]
    pub startup_msg: String,
    #[serde(rename = "LogLevel", default = "def_log_level")]
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        ServiceConfig {
            host: def_host(),
            port: def_port(),
            timeout: def_timeout(),
            connect_retries: def_retries(),
            check_interval: String::new(),
            labels: vec![],
            startup_msg: String::new(),
            log_level: def_log_level(),
        }
    }
}

#[derive(Clone, Deserialize)]
pub struct Endpoint {
    #[serde(rename = "Host", default = "def_host")]
    pub host: String,
    #[serde(rename = "Port", default)]
    pub port: u16,
}

impl Endpoint {
    pub fn url(&self) -> String {
        format!("http://{}:{}", &self.host, self.port)
    }
}

fn def_data_endpoint() -> Endpoint {
    Endpoint {
        host: def_host(),
        port: 48080,
    }
}

fn def_metadata_endpoint() -> Endpoint {
    Endpoint {
        host: def_host(),
        port: 48081,
    }
}

#[derive(Clone, Deserialize)]
pub struct ClientsConfig {
    #[serde(rename = "Data", default = "def_data_endpoint")]
    pub data: Endpoint,
    #[serde(rename = "Metadata", default = "def_metadata_endpoint")]
    pub metadata: Endpoint,
}

impl Default for ClientsConfig {
    fn default() -> Self {
        ClientsConfig {
            data: def_data_endpoint(),
            metadata: def_metadata_endpoint(),
        }
    }
}

#[derive(Clone, Deserialize)]
pub struct DeviceConfig {
    /// When false, profile transforms are skipped and raw driver
    /// values flow through to readings.
    #[serde(rename = "DataTransform", default = "def_true")]
    pub data_transform: bool,
    /// Directory holding profile YAML files. Defaults to the
    /// configuration directory when unset.
    #[serde(rename = "ProfilesDir", default)]
    pub profiles_dir: Option<String>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            data_transform: true,
            profiles_dir: None,
        }
    }
}

#[derive(Clone, Default, Deserialize)]
pub struct LoggingConfig {
    #[serde(rename = "File", default)]
    pub file: Option<String>,
    #[serde(rename = "RemoteURL", default)]
    pub remote_url: Option<String>,
}

#[derive(Clone, Deserialize)]
pub struct ScheduleConfig {
    #[serde(rename = "Name")]
    pub name: String,
    /// ISO-8601 duration, e.g. "PT15S".
    #[serde(rename = "Frequency")]
    pub frequency: String,
}

#[derive(Clone, Deserialize)]
pub struct ScheduleEventConfig {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Schedule")]
    pub schedule: String,
    /// Either the discovery path or a device-command path.
    #[serde(rename = "Path")]
    pub path: String,
}

#[derive(Clone, Default, Deserialize)]
pub struct AddressableConfig {
    #[serde(rename = "Name", default)]
    pub name: Option<String>,
    #[serde(rename = "Protocol", default)]
    pub protocol: Option<String>,
    #[serde(rename = "Method", default)]
    pub method: Option<String>,
    #[serde(rename = "Address", default)]
    pub address: Option<String>,
    #[serde(rename = "Port", default)]
    pub port: u16,
    #[serde(rename = "Path", default)]
    pub path: Option<String>,
}

/// A device declared in the configuration file, registered at
/// startup if not already known to metadata.
#[derive(Clone, Deserialize)]
pub struct DeviceListEntry {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Profile")]
    pub profile: String,
    #[serde(rename = "Description", default)]
    pub description: Option<String>,
    #[serde(rename = "Labels", default)]
    pub labels: Vec<String>,
    #[serde(rename = "Addressable", default)]
    pub addressable: Option<AddressableConfig>,
}

#[derive(Clone, Default, Deserialize)]
pub struct Config {
    #[serde(rename = "Service", default)]
    pub service: ServiceConfig,
    #[serde(rename = "Clients", default)]
    pub clients: ClientsConfig,
    #[serde(rename = "Device", default)]
    pub device: DeviceConfig,
    #[serde(rename = "Logging", default)]
    pub logging: LoggingConfig,
    #[serde(rename = "Schedules", default)]
    pub schedules: Vec<ScheduleConfig>,
    #[serde(rename = "ScheduleEvents", default)]
    pub schedule_events: Vec<ScheduleEventConfig>,
    #[serde(rename = "Driver", default)]
    pub driver: value::Table,
    #[serde(rename = "DeviceList", default)]
    pub device_list: Vec<DeviceListEntry>,
}

impl Config {
    /// Parses configuration text and applies the semantic checks.
    pub fn parse(contents: &str) -> Result<Config> {
        let cfg: Config = toml::from_str(contents)
            .map_err(|e| Error::BadConfig(format!("{}", e)))?;

        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        if self.service.host.is_empty() {
            return Err(Error::BadConfig("Service.Host is empty".into()));
        }
        if self.service.port == 0 {
            return Err(Error::BadConfig("Service.Port is zero".into()));
        }
        if self.service.timeout == 0 {
            return Err(Error::BadConfig("Service.Timeout is zero".into()));
        }
        if self.service.connect_retries == 0 {
            return Err(Error::BadConfig(
                "Service.ConnectRetries is zero".into(),
            ));
        }

        for sched in &self.schedules {
            if let Err(e) = parse_iso8601_duration(&sched.frequency) {
                return Err(Error::BadConfig(format!(
                    "schedule {}: {}",
                    &sched.name, e
                )));
            }
        }

        for ev in &self.schedule_events {
            if !self.schedules.iter().any(|s| s.name == ev.schedule) {
                return Err(Error::BadConfig(format!(
                    "schedule event {} references unknown schedule {}",
                    &ev.name, &ev.schedule
                )));
            }
        }
        Ok(())
    }

    /// The file name holding this configuration: `configuration.toml`
    /// or `configuration-<profile>.toml`.
    pub fn file_name(profile: Option<&str>) -> String {
        match profile {
            Some(p) if !p.is_empty() => format!("configuration-{}.toml", p),
            _ => String::from("configuration.toml"),
        }
    }

    /// Reads and parses the configuration file in `conf_dir`.
    pub async fn load(
        conf_dir: &str,
        profile: Option<&str>,
    ) -> Result<Config> {
        let path = format!("{}/{}", conf_dir, Config::file_name(profile));
        let contents = tokio::fs::read_to_string(&path).await.map_err(|e| {
            Error::BadConfig(format!("can't read {}: {}", &path, e))
        })?;

        Config::parse(&contents)
    }

    /// The driver table as the string pairs handed to the driver's
    /// `init` callback.
    pub fn driver_pairs(&self) -> HashMap<String, String> {
        self.driver
            .iter()
            .map(|(k, v)| {
                let v = match v {
                    value::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };

                (k.clone(), v)
            })
            .collect()
    }

    /// Applies a registry overlay onto this configuration. Scalar
    /// sections and the `Driver` table are covered; the list sections
    /// only exist in file form. Unknown names are ignored so newer
    /// registry contents don't break older services.
    pub fn apply_nvpairs(&mut self, pairs: &NvPairs) -> Result<()> {
        for (name, val) in pairs {
            match name.as_str() {
                "Service.Host" => self.service.host = val.clone(),
                "Service.Port" => self.service.port = parse_field(name, val)?,
                "Service.Timeout" => {
                    self.service.timeout = parse_field(name, val)?
                }
                "Service.ConnectRetries" => {
                    self.service.connect_retries = parse_field(name, val)?
                }
                "Service.CheckInterval" => {
                    self.service.check_interval = val.clone()
                }
                "Service.Labels" => {
                    self.service.labels = split_labels(val);
                }
                "Service.StartupMsg" => {
                    self.service.startup_msg = val.clone()
                }
                "Service.LogLevel" => self.service.log_level = val.clone(),
                "Clients.Data.Host" => self.clients.data.host = val.clone(),
                "Clients.Data.Port" => {
                    self.clients.data.port = parse_field(name, val)?
                }
                "Clients.Metadata.Host" => {
                    self.clients.metadata.host = val.clone()
                }
                "Clients.Metadata.Port" => {
                    self.clients.metadata.port = parse_field(name, val)?
                }
                "Device.DataTransform" => {
                    self.device.data_transform = parse_field(name, val)?
                }
                "Device.ProfilesDir" => {
                    self.device.profiles_dir = Some(val.clone())
                }
                "Logging.File" => self.logging.file = Some(val.clone()),
                "Logging.RemoteURL" => {
                    self.logging.remote_url = Some(val.clone())
                }
                _ => {
                    if let Some(key) = name.strip_prefix("Driver.") {
                        self.driver.insert(
                            key.to_string(),
                            value::Value::String(val.clone()),
                        );
                    }
                }
            }
        }
        Ok(())
    }

    /// The flat name/value representation pushed to the registry and
    /// served by the `/config` handler.
    pub fn to_nvpairs(&self) -> NvPairs {
        let mut pairs: NvPairs = vec![
            ("Service.Host".into(), self.service.host.clone()),
            ("Service.Port".into(), self.service.port.to_string()),
            ("Service.Timeout".into(), self.service.timeout.to_string()),
            (
                "Service.ConnectRetries".into(),
                self.service.connect_retries.to_string(),
            ),
            (
                "Service.CheckInterval".into(),
                self.service.check_interval.clone(),
            ),
            ("Service.Labels".into(), self.service.labels.join(",")),
            ("Service.StartupMsg".into(), self.service.startup_msg.clone()),
            ("Service.LogLevel".into(), self.service.log_level.clone()),
            ("Clients.Data.Host".into(), self.clients.data.host.clone()),
            (
                "Clients.Data.Port".into(),
                self.clients.data.port.to_string(),
            ),
            (
                "Clients.Metadata.Host".into(),
                self.clients.metadata.host.clone(),
            ),
            (
                "Clients.Metadata.Port".into(),
                self.clients.metadata.port.to_string(),
            ),
            (
                "Device.DataTransform".into(),
                self.device.data_transform.to_string(),
            ),
        ];

        if let Some(dir) = &self.device.profiles_dir {
            pairs.push(("Device.ProfilesDir".into(), dir.clone()));
        }
        if let Some(file) = &self.logging.file {
            pairs.push(("Logging.File".into(), file.clone()));
        }
        if let Some(url) = &self.logging.remote_url {
            pairs.push(("Logging.RemoteURL".into(), url.clone()));
        }

        for (k, v) in &self.driver {
            let v = match v {
                value::Value::String(s) => s.clone(),
                other => other.to_string(),
            };

            pairs.push((format!("Driver.{}", k), v));
        }
        pairs
    }

    pub fn log_level(&self) -> tracing::Level {
        match self.service.log_level.as_str() {
            "error" => tracing::Level::ERROR,
            "warn" => tracing::Level::WARN,
            "debug" => tracing::Level::DEBUG,
            "trace" => tracing::Level::TRACE,
            _ => tracing::Level::INFO,
        }
    }
}

fn parse_field<T: std::str::FromStr>(name: &str, val: &str) -> Result<T> {
    val.parse().map_err(|_| {
        Error::BadConfig(format!("bad value '{}' for {}", val, name))
    })
}

fn split_labels(val: &str) -> Vec<String> {
    val.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Parses an ISO-8601 duration (`PnYnMnDTnHnMnS`) into a whole number
/// of seconds. Calendar components use the platform's fixed factors
/// (365-day years, 30-day months).
pub fn parse_iso8601_duration(freq: &str) -> std::result::Result<u64, String> {
    const YEAR: u64 = 365 * 86400;
    const MONTH: u64 = 30 * 86400;

    let dur = iso8601::duration(freq)?;

    let secs = match dur {
        iso8601::Duration::YMDHMS {
            year,
            month,
            day,
            hour,
            minute,
            second,
            millisecond: _,
        } => {
            u64::from(year) * YEAR
                + u64::from(month) * MONTH
                + u64::from(day) * 86400
                + u64::from(hour) * 3600
                + u64::from(minute) * 60
                + u64::from(second)
        }
        iso8601::Duration::Weeks(w) => u64::from(w) * 7 * 86400,
    };

    if secs == 0 {
        return Err(format!("{}: frequency must be at least one second", freq));
    }
    Ok(secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = Config::parse("").unwrap();

        assert_eq!(cfg.service.host, "localhost");
        assert_eq!(cfg.service.port, 49990);
        assert_eq!(cfg.service.connect_retries, 3);
        assert_eq!(cfg.clients.data.port, 48080);
        assert_eq!(cfg.clients.metadata.port, 48081);
        assert!(cfg.device.data_transform);
        assert!(cfg.device.profiles_dir.is_none());
        assert!(cfg.schedules.is_empty());
        assert_eq!(cfg.log_level(), tracing::Level::INFO);
    }

    #[test]
    fn test_sections() {
        let cfg = Config::parse(
            r#"
[Service]
Host = "10.0.0.5"
Port = 49991
Labels = ["modbus", "hvac"]
StartupMsg = "device service started"
LogLevel = "debug"

[Clients.Data]
Host = "edgex-core-data"
Port = 48080

[Device]
DataTransform = false
ProfilesDir = "./profiles"

[[Schedules]]
Name = "5sec"
Frequency = "PT5S"

[[ScheduleEvents]]
Name = "readtemp"
Schedule = "5sec"
Path = "/api/v1/device/name/thermostat/temperature"

[Driver]
DefaultSensorPort = 502

[[DeviceList]]
Name = "thermostat"
Profile = "thermo-profile"
"#,
        )
        .unwrap();

        assert_eq!(cfg.service.host, "10.0.0.5");
        assert_eq!(cfg.service.labels, vec!["modbus", "hvac"]);
        assert_eq!(cfg.log_level(), tracing::Level::DEBUG);
        assert_eq!(cfg.clients.data.host, "edgex-core-data");
        assert!(!cfg.device.data_transform);
        assert_eq!(cfg.schedules[0].frequency, "PT5S");
        assert_eq!(cfg.schedule_events[0].schedule, "5sec");
        assert_eq!(
            cfg.driver_pairs().get("DefaultSensorPort"),
            Some(&String::from("502"))
        );
        assert_eq!(cfg.device_list[0].profile, "thermo-profile");
    }

    #[test]
    fn test_bad_config() {
        assert!(Config::parse("[Service]\nPort = 0\n").is_err());
        assert!(Config::parse("[Service]\nHost = \"\"\n").is_err());

        // A schedule with an unparseable frequency.
        assert!(Config::parse(
            "[[Schedules]]\nName = \"x\"\nFrequency = \"5 seconds\"\n"
        )
        .is_err());

        // An event referencing an undefined schedule.
        assert!(Config::parse(
            "[[ScheduleEvents]]\nName = \"x\"\nSchedule = \"none\"\nPath = \"/api/v1/discovery\"\n"
        )
        .is_err());
    }

    #[test]
    fn test_file_name() {
        assert_eq!(Config::file_name(None), "configuration.toml");
        assert_eq!(
            Config::file_name(Some("docker")),
            "configuration-docker.toml"
        );
    }

    #[test]
    fn test_nvpairs_round_trip() {
        let mut cfg = Config::default();
        let overlay: NvPairs = vec![
            ("Service.Host".into(), "edge-1".into()),
            ("Service.Port".into(), "49992".into()),
            ("Service.Labels".into(), "a, b".into()),
            ("Device.DataTransform".into(), "false".into()),
            ("Driver.Serial".into(), "/dev/ttyUSB0".into()),
            ("Future.Unknown".into(), "ignored".into()),
        ];

        cfg.apply_nvpairs(&overlay).unwrap();

        assert_eq!(cfg.service.host, "edge-1");
        assert_eq!(cfg.service.port, 49992);
        assert_eq!(cfg.service.labels, vec!["a", "b"]);
        assert!(!cfg.device.data_transform);

        let flat = cfg.to_nvpairs();

        assert!(flat.contains(&("Service.Host".into(), "edge-1".into())));
        assert!(flat
            .contains(&("Driver.Serial".into(), "/dev/ttyUSB0".into())));

        // A bad numeric field is rejected.
        let bad: NvPairs = vec![("Service.Port".into(), "high".into())];

        assert!(cfg.apply_nvpairs(&bad).is_err());
    }

    #[test]
    fn test_parse8601() {
        assert_eq!(parse_iso8601_duration("PT5S"), Ok(5));
        assert_eq!(parse_iso8601_duration("PT1H30M"), Ok(5400));
        assert_eq!(parse_iso8601_duration("P1D"), Ok(86400));
        assert_eq!(parse_iso8601_duration("P2W"), Ok(1_209_600));
        assert_eq!(
            parse_iso8601_duration("P1Y2M3DT4H5M6S"),
            Ok(365 * 86400 + 2 * 30 * 86400 + 3 * 86400 + 4 * 3600 + 5 * 60 + 6)
        );
        assert!(parse_iso8601_duration("PT0S").is_err());
        assert!(parse_iso8601_duration("every 5 seconds").is_err());
    }
}
