//! Responses client configuration

use crate::config::ModelSettings;

/// Configuration for the Responses API client
#[derive(Debug, Clone)]
pub struct ResponsesClientConfig {
    /// Model ID to use for API calls
    pub model: String,
    /// Base URL up to and including the API version (e.g. `.../v1`)
    pub base_url: String,
    pub api_key: Option<String>,
}

impl ResponsesClientConfig {
    pub fn from_settings(settings: &ModelSettings, api_key: Option<String>) -> Self {
        Self {
            model: settings.model.clone(),
            base_url: settings.base_url.clone(),
            api_key,
        }
    }

    /// Get the API URL to use
    pub fn api_url(&self) -> String {
        format!("{}/responses", self.base_url.trim_end_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_url_trims_trailing_slash() {
        let mut settings = ModelSettings::default();
        settings.base_url = "http://localhost:4000/v1/".into();
        let config = ResponsesClientConfig::from_settings(&settings, None);
        assert_eq!(config.api_url(), "http://localhost:4000/v1/responses");
    }
}
