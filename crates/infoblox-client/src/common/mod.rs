//! Common utilities for the Infoblox WAPI client
//!
//! Provides the authenticated HTTP wrapper shared by all object helpers.

use crate::error::IpamError;
use crate::models::WapiError;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use tracing::debug;

/// HTTP client wrapper with basic authentication and WAPI path handling
pub struct HttpClient {
    client: Client,
    base_url: String,
    wapi_version: String,
    username: String,
    password: String,
}

impl HttpClient {
    /// Create a new HTTP client wrapper
    pub fn new(
        client: Client,
        base_url: String,
        wapi_version: String,
        username: String,
        password: String,
    ) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            wapi_version: wapi_version.trim_start_matches('v').to_string(),
            username,
            password,
        }
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build the full URL of a WAPI object path or reference
    pub fn build_url(&self, path: &str, query: &[(&str, &str)]) -> String {
        let mut url = format!(
            "{}/wapi/v{}/{}",
            self.base_url,
            self.wapi_version,
            path.trim_start_matches('/')
        );
        let query_string = Self::build_query_string(query);
        if !query_string.is_empty() {
            url = format!("{}?{}", url, query_string);
        }
        url
    }

    /// Build query string from filters
    pub fn build_query_string(query: &[(&str, &str)]) -> String {
        query
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&")
    }

    /// Make a GET request
    pub async fn get<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, IpamError> {
        let url = self.build_url(path, query);
        debug!("GET {}", url);

        let response = self.client
            .get(&url)
            .basic_auth(&self.username, Some(&self.password))
            .header("Accept", "application/json")
            .send()
            .await?;

        let response = Self::check_status(response, "GET", path).await?;
        response.json().await.map_err(IpamError::Http)
    }

    /// Make a POST request
    pub async fn post<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        query: &[(&str, &str)],
        body: &serde_json::Value,
    ) -> Result<T, IpamError> {
        let url = self.build_url(path, query);
        debug!("POST {} with body: {}", url, body);

        let response = self.client
            .post(&url)
            .basic_auth(&self.username, Some(&self.password))
            .header("Accept", "application/json")
            .json(body)
            .send()
            .await?;

        let response = Self::check_status(response, "POST", path).await?;
        response.json().await.map_err(IpamError::Http)
    }

    /// Make a DELETE request against an object reference
    pub async fn delete(&self, reference: &str) -> Result<(), IpamError> {
        let url = self.build_url(reference, &[]);
        debug!("DELETE {}", url);

        let response = self.client
            .delete(&url)
            .basic_auth(&self.username, Some(&self.password))
            .header("Accept", "application/json")
            .send()
            .await?;

        Self::check_status(response, "DELETE", reference).await?;
        Ok(())
    }

    /// Map non-success responses onto `IpamError`
    async fn check_status(response: Response, method: &str, path: &str) -> Result<Response, IpamError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(Self::error_for_status(status, method, path, &body))
    }

    /// Translate a failed WAPI response into an error, keeping the WAPI text when present
    pub fn error_for_status(status: StatusCode, method: &str, path: &str, body: &str) -> IpamError {
        let detail = serde_json::from_str::<WapiError>(body)
            .map(|e| e.message().to_string())
            .unwrap_or_else(|_| body.to_string());

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => IpamError::Authentication(format!(
                "{} {} rejected: {} - {}",
                method, path, status, detail
            )),
            StatusCode::NOT_FOUND => IpamError::NotFound(format!("{} {} - {}", method, path, detail)),
            _ => IpamError::Api(format!("{} {} failed: {} - {}", method, path, status, detail)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn http() -> HttpClient {
        HttpClient::new(
            Client::new(),
            "https://infoblox.example.com/".to_string(),
            "v2.10".to_string(),
            "admin".to_string(),
            "secret".to_string(),
        )
    }

    #[test]
    fn test_build_url_normalizes_version_and_slashes() {
        let http = http();
        assert_eq!(http.base_url(), "https://infoblox.example.com");
        assert_eq!(
            http.build_url("grid", &[]),
            "https://infoblox.example.com/wapi/v2.10/grid"
        );
        assert_eq!(
            http.build_url("/fixedaddress/ZG5z:10.0.0.5/default", &[]),
            "https://infoblox.example.com/wapi/v2.10/fixedaddress/ZG5z:10.0.0.5/default"
        );
    }

    #[test]
    fn test_build_url_encodes_query() {
        let url = http().build_url(
            "fixedaddress",
            &[("network", "10.0.0.0/24"), ("network_view", "test view")],
        );
        assert_eq!(
            url,
            "https://infoblox.example.com/wapi/v2.10/fixedaddress?network=10.0.0.0%2F24&network_view=test%20view"
        );
    }

    #[test]
    fn test_error_for_status_mapping() {
        let body = r#"{"Error": "AdmConProtoError: no", "code": "Client.Ibap.Proto", "text": "Cannot find 1 available IP address(es) in this network"}"#;

        match HttpClient::error_for_status(StatusCode::BAD_REQUEST, "POST", "fixedaddress", body) {
            IpamError::Api(msg) => assert!(msg.contains("Cannot find 1 available IP")),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(matches!(
            HttpClient::error_for_status(StatusCode::UNAUTHORIZED, "GET", "grid", "denied"),
            IpamError::Authentication(_)
        ));
        assert!(matches!(
            HttpClient::error_for_status(StatusCode::NOT_FOUND, "DELETE", "fixedaddress/x", ""),
            IpamError::NotFound(_)
        ));
    }
}
