use async_trait::async_trait;

use crate::{
    chat::{ChannelResolver, TwitchApi},
    error::ResolveError,
    types::UserList,
};

pub struct TwitchChannelResolver {
    api: TwitchApi,
}

impl TwitchChannelResolver {
    pub fn new(api: TwitchApi) -> Self {
        Self { api }
    }
}

#[async_trait]
impl ChannelResolver for TwitchChannelResolver {
    async fn resolve_id(&self, channel_name: &str) -> Result<String, ResolveError> {
        let url = self.api.url("kraken/users");
        let response = self.api.get(&url, &[("login", channel_name)]).await?;
        if !response.status().is_success() {
            return Err(ResolveError::Status {
                url,
                status: response.status().as_u16(),
            });
        }

        let users: UserList = response.json().await?;
        users
            .users
            .into_iter()
            .next()
            .map(|user| user.id)
            .ok_or_else(|| ResolveError::NotFound {
                channel: channel_name.to_string(),
            })
    }
}
