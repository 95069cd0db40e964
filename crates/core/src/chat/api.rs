use reqwest::{Client, Response, header::ACCEPT};

pub const TWITCH_API_URL: &str = "https://api.twitch.tv";
const TWITCH_V5_ACCEPT: &str = "application/vnd.twitchtv.v5+json";

/// Thin Twitch API client carrying the Client-ID every request needs.
#[derive(Clone)]
pub struct TwitchApi {
    client: Client,
    base_url: String,
    client_id: String,
}

impl TwitchApi {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self::with_base_url(client_id, TWITCH_API_URL)
    }

    pub fn with_base_url(client_id: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client_id: client_id.into(),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub async fn get(&self, url: &str, query: &[(&str, &str)]) -> reqwest::Result<Response> {
        self.client
            .get(url)
            .header("Client-ID", &self.client_id)
            .header(ACCEPT, TWITCH_V5_ACCEPT)
            .query(query)
            .send()
            .await
    }
}
