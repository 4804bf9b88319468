//! Concrete REST clients for the platform's collaborating services.
//! The service core only consumes the traits in
//! `edgeline_api::client`; everything here can be swapped for test
//! doubles.

use edgeline_api::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

pub mod data;
pub mod metadata;
pub mod registry;

pub(crate) fn net_err(e: reqwest::Error) -> Error {
    Error::ServerError(format!("http: {}", e))
}

/// A thin JSON-over-HTTP helper shared by the client modules. `base`
/// carries the scheme, authority and API prefix.
pub(crate) struct RestClient {
    http: reqwest::Client,
    base: String,
}

impl RestClient {
    pub fn new(base: String) -> Self {
        RestClient {
            http: reqwest::Client::new(),
            base,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", &self.base, path)
    }

    /// GET returning the decoded body; a 404 becomes `None`.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<Option<T>> {
        let resp = self
            .http
            .get(self.url(path))
            .send()
            .await
            .map_err(net_err)?;
        let status = resp.status();

        if status.as_u16() == 404 {
            return Ok(None);
        }
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();

            return Err(Error::from_status(status.as_u16(), &text));
        }
        resp.json().await.map(Some).map_err(net_err)
    }

    /// GET returning the raw body text.
    pub async fn get_text(&self, path: &str) -> Result<String> {
        let resp = self
            .http
            .get(self.url(path))
            .send()
            .await
            .map_err(net_err)?;
        let status = resp.status();

        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();

            return Err(Error::from_status(status.as_u16(), &text));
        }
        resp.text().await.map_err(net_err)
    }

    /// POST with a JSON body. The platform answers creations with the
    /// new object's id as the body text.
    pub async fn post_json<B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<String> {
        let resp = self
            .http
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(net_err)?;
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(Error::from_status(status.as_u16(), &text));
        }
        Ok(text)
    }

    pub async fn put_json<B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<()> {
        let resp = self
            .http
            .put(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(net_err)?;
        let status = resp.status();

        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();

            return Err(Error::from_status(status.as_u16(), &text));
        }
        Ok(())
    }

    pub async fn put_text(&self, path: &str, body: String) -> Result<()> {
        let resp = self
            .http
            .put(self.url(path))
            .body(body)
            .send()
            .await
            .map_err(net_err)?;
        let status = resp.status();

        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();

            return Err(Error::from_status(status.as_u16(), &text));
        }
        Ok(())
    }

    pub async fn delete(&self, path: &str) -> Result<()> {
        let resp = self
            .http
            .delete(self.url(path))
            .send()
            .await
            .map_err(net_err)?;
        let status = resp.status();

        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();

            return Err(Error::from_status(status.as_u16(), &text));
        }
        Ok(())
    }
}
