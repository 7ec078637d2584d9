//! CLI command implementations.

pub mod deploys;
pub mod projects;

use anyhow::{Result, bail};
use serde_json::Value;

/// Thin HTTP client for the Shipit API.
pub struct Client {
    http: reqwest::Client,
    api_url: String,
    email: Option<String>,
}

impl Client {
    pub fn new(api_url: &str, email: Option<&str>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_url: api_url.trim_end_matches('/').to_string(),
            email: email.map(String::from),
        }
    }

    pub async fn get(&self, path: &str) -> Result<Value> {
        let request = self.http.get(format!("{}{}", self.api_url, path));
        self.send(request).await
    }

    pub async fn post(&self, path: &str, body: Option<Value>) -> Result<Value> {
        let mut request = self.http.post(format!("{}{}", self.api_url, path));
        if let Some(body) = body {
            request = request.json(&body);
        }
        self.send(request).await
    }

    pub async fn delete(&self, path: &str) -> Result<Value> {
        let request = self.http.delete(format!("{}{}", self.api_url, path));
        self.send(request).await
    }

    async fn send(&self, mut request: reqwest::RequestBuilder) -> Result<Value> {
        if let Some(email) = &self.email {
            request = request.header("X-Shipit-Email", email);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        let body: Value = if text.is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text)?
        };

        if !status.is_success() {
            let message = body
                .get("error")
                .and_then(|e| e.as_str())
                .unwrap_or("unknown error");
            bail!("{status}: {message}");
        }
        Ok(body)
    }
}

pub fn validate(path: &str) -> Result<()> {
    let content = std::fs::read_to_string(path)?;
    match shipit_config::parse_system_config(&content) {
        Ok(_) => {
            println!("Configuration is valid");
            Ok(())
        }
        Err(e) => {
            println!("Configuration error: {e}");
            std::process::exit(1);
        }
    }
}
