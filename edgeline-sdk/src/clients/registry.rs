//! A Consul-backed implementation of the registry client: flat
//! configuration in the KV store, health checks via the agent API.

use super::RestClient;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use edgeline_api::{
    client::{NvPairs, RegistryClient},
    Error, Result,
};
use serde_derive::{Deserialize, Serialize};

const KV_ROOT: &str = "edgeline/v1";

/// Builds a registry client for the given URL. `consul://host:port`
/// is the supported scheme.
pub fn for_url(url: &str) -> Result<ConsulClient> {
    match url.strip_prefix("consul://") {
        Some(authority) if !authority.is_empty() => {
            Ok(ConsulClient::new(authority))
        }
        _ => Err(Error::InvalidArg(format!(
            "unsupported registry URL: {}",
            url
        ))),
    }
}

pub struct ConsulClient {
    rest: RestClient,
}

#[derive(Deserialize)]
struct KvEntry {
    #[serde(rename = "Key")]
    key: String,
    #[serde(rename = "Value")]
    value: Option<String>,
}

#[derive(Serialize)]
struct AgentCheck {
    #[serde(rename = "HTTP")]
    http: String,
    #[serde(rename = "Interval")]
    interval: String,
}

#[derive(Serialize)]
struct AgentRegistration {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Address")]
    address: String,
    #[serde(rename = "Port")]
    port: u16,
    #[serde(rename = "Check")]
    check: AgentCheck,
}

impl ConsulClient {
    pub fn new(authority: &str) -> Self {
        ConsulClient {
            rest: RestClient::new(format!("http://{}/v1", authority)),
        }
    }

    fn prefix(service: &str, profile: Option<&str>) -> String {
        match profile {
            Some(p) if !p.is_empty() => {
                format!("{}/{};{}", KV_ROOT, service, p)
            }
            _ => format!("{}/{}", KV_ROOT, service),
        }
    }
}

#[async_trait]
impl RegistryClient for ConsulClient {
    async fn ping(&self) -> Result<()> {
        self.rest.get_text("/status/leader").await.map(|_| ())
    }

    async fn get_config(
        &self,
        service: &str,
        profile: Option<&str>,
    ) -> Result<NvPairs> {
        let prefix = ConsulClient::prefix(service, profile);
        let entries: Option<Vec<KvEntry>> = self
            .rest
            .get_json(&format!("/kv/{}?recurse=true", &prefix))
            .await?;

        let mut pairs = vec![];

        for entry in entries.unwrap_or_default() {
            let name = match entry.key.strip_prefix(&prefix) {
                Some(rest) => rest.trim_start_matches('/').replace('/', "."),
                None => continue,
            };
            let value = match entry.value {
                Some(v) => STANDARD.decode(v).map_err(|e| {
                    Error::ServerError(format!("bad KV encoding: {}", e))
                })?,
                None => vec![],
            };

            pairs.push((name, String::from_utf8_lossy(&value).into_owned()));
        }
        Ok(pairs)
    }

    async fn put_config(
        &self,
        service: &str,
        profile: Option<&str>,
        pairs: &NvPairs,
    ) -> Result<()> {
        let prefix = ConsulClient::prefix(service, profile);

        for (name, value) in pairs {
            let key = format!("{}/{}", &prefix, name.replace('.', "/"));

            self.rest
                .put_text(&format!("/kv/{}", key), value.clone())
                .await?;
        }
        Ok(())
    }

    async fn register_service(
        &self,
        name: &str,
        host: &str,
        port: u16,
        check_interval: &str,
    ) -> Result<()> {
        let reg = AgentRegistration {
            name: name.to_string(),
            address: host.to_string(),
            port,
            check: AgentCheck {
                http: format!("http://{}:{}/api/v1/ping", host, port),
                interval: check_interval.to_string(),
            },
        };

        self.rest.put_json("/agent/service/register", &reg).await
    }
}
