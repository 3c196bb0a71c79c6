use std::time::Duration;

use reqwest::{
    Client, ClientBuilder,
    header::{self, HeaderMap, HeaderValue},
};

use crate::{Error, Result};

const USER_AGENT: &str = concat!("untis-ics/", env!("CARGO_PKG_VERSION"));

/// Shared HTTP plumbing for timetable sources
pub struct BaseProviderBuilder {
    pub client_builder: ClientBuilder,
    pub info: ProviderInfo,
}

pub struct BaseProvider {
    pub client: Client,
    pub info: ProviderInfo,
}

#[derive(Debug, Clone)]
pub struct ProviderInfo {
    pub name: String,
    pub description: String,
}

impl BaseProviderBuilder {
    pub fn new(info: ProviderInfo) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );

        let client_builder = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .default_headers(headers);

        Self {
            client_builder,
            info,
        }
    }

    pub fn build(self) -> Result<BaseProvider> {
        let client = self.client_builder.build()?;

        Ok(BaseProvider {
            client,
            info: self.info,
        })
    }
}

impl BaseProvider {
    pub fn handle_error_req(&self, error: reqwest::Error) -> Error {
        if error.is_timeout() {
            Error::Timeout
        } else if error.is_request() || error.is_connect() {
            Error::Provider {
                provider: self.info.name.clone(),
                message: format!("Request failed: {}", error),
            }
        } else {
            Error::Http(error)
        }
    }

    pub fn custom_error(&self, message: impl Into<String>) -> Error {
        Error::Provider {
            provider: self.info.name.clone(),
            message: message.into(),
        }
    }
}
