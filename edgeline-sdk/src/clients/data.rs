//! The core-data REST client.

use super::RestClient;
use async_trait::async_trait;
use edgeline_api::{
    client::CoreDataClient,
    types::event::Event,
    Error, Result,
};

pub struct DataClient {
    rest: RestClient,
}

impl DataClient {
    /// `base` is the service authority, e.g. `http://localhost:48080`.
    pub fn new(base: &str) -> Self {
        DataClient {
            rest: RestClient::new(format!("{}/api/v1", base)),
        }
    }
}

#[async_trait]
impl CoreDataClient for DataClient {
    async fn ping(&self) -> Result<()> {
        let body = self.rest.get_text("/ping").await?;

        if body.trim() == "pong" {
            Ok(())
        } else {
            Err(Error::RemoteServerDown(format!(
                "core-data ping answered '{}'",
                body.trim()
            )))
        }
    }

    async fn add_event(&self, event: &Event) -> Result<()> {
        self.rest.post_json("/event", event).await.map(|_| ())
    }
}
