use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Client;
use serde::Deserialize;

use crate::core::leveling::{ImportError, ImportedPlayer, LeaderboardSource};

pub const MEE6_API_URL: &str = "https://mee6.xyz/api/plugins/levels/leaderboard";

/// Biggest page the leaderboard endpoint hands out.
const PAGE_SIZE: usize = 1000;

/// Stop paging after this many pages even if the API keeps answering.
const MAX_PAGES: usize = 100;

/// Reads the public Mee6 leaderboard of a guild.
pub struct Mee6Client {
    client: Client,
    base_url: String,
}

impl Mee6Client {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ImportError> {
        let mut headers = HeaderMap::new();
        headers.insert("Accept", HeaderValue::from_static("application/json"));
        headers.insert("User-Agent", HeaderValue::from_static("beepbot/1.0"));

        let client = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| ImportError::Http(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn fetch_page(&self, guild_id: u64, page: usize) -> Result<Vec<ApiPlayer>, ImportError> {
        let url = format!("{}/{}", self.base_url, guild_id);
        let response = self
            .client
            .get(&url)
            .query(&[("page", page), ("limit", PAGE_SIZE)])
            .send()
            .await
            .map_err(|e| ImportError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ImportError::Status(status.as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| ImportError::Http(e.to_string()))?;

        parse_page(&body)
    }
}

#[async_trait]
impl LeaderboardSource for Mee6Client {
    async fn fetch_leaderboard(&self, guild_id: u64) -> Result<Vec<ImportedPlayer>, ImportError> {
        let mut players = Vec::new();

        for page in 0..MAX_PAGES {
            let batch = self.fetch_page(guild_id, page).await?;
            let last_page = batch.len() < PAGE_SIZE;
            tracing::debug!(guild_id, page, entries = batch.len(), "Fetched Mee6 page");

            for player in batch {
                match player.into_imported() {
                    Some(imported) => players.push(imported),
                    None => tracing::warn!(guild_id, "Skipping Mee6 entry with unreadable ID"),
                }
            }

            if last_page {
                break;
            }
        }

        Ok(players)
    }
}

#[derive(Debug, Deserialize)]
struct ApiLeaderboard {
    #[serde(default)]
    players: Vec<ApiPlayer>,
}

#[derive(Debug, Deserialize)]
struct ApiPlayer {
    id: String,
    username: Option<String>,
    discriminator: Option<String>,
    #[serde(default)]
    xp: u64,
    #[serde(default)]
    message_count: u64,
}

impl ApiPlayer {
    fn into_imported(self) -> Option<ImportedPlayer> {
        let user_id = self.id.parse::<u64>().ok()?;
        let display_name = match (self.username, self.discriminator.as_deref()) {
            (Some(name), Some(tag)) if !tag.is_empty() && tag != "0" => {
                Some(format!("{name}#{tag}"))
            }
            (name, _) => name,
        };

        Some(ImportedPlayer {
            user_id,
            display_name,
            xp: self.xp,
            message_count: self.message_count,
        })
    }
}

fn parse_page(body: &str) -> Result<Vec<ApiPlayer>, ImportError> {
    serde_json::from_str::<ApiLeaderboard>(body)
        .map(|leaderboard| leaderboard.players)
        .map_err(|e| ImportError::Decode(e.to_string()))
}
