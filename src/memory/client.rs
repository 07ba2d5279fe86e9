use anyhow::{anyhow, Result};
use reqwest;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::debug;

/// User id under which reference books are stored.
pub const REFERENCE_USER: &str = "reference_materials";

/// User id under which episode memories are stored.
pub const EPISODE_USER: &str = "episodes";

/// User id under which character information is stored.
pub const CHARACTER_USER: &str = "characters";

/// User id under which story structures are stored.
pub const STORY_USER: &str = "story_structures";

/// User id under which voice registry entries are stored.
pub const VOICE_REGISTRY_USER: &str = "voice_registry";

/// Memory categories used to partition stored content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryKind {
    ReferenceMaterial,
    EpisodeMemory,
    CharacterInfo,
    VoiceMetadata,
    StoryStructure,
}

impl MemoryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryKind::ReferenceMaterial => "reference_material",
            MemoryKind::EpisodeMemory => "episode_memory",
            MemoryKind::CharacterInfo => "character_info",
            MemoryKind::VoiceMetadata => "voice_metadata",
            MemoryKind::StoryStructure => "story_structure",
        }
    }
}

/// Memory service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub timeout_seconds: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.mem0.ai".to_string(),
            api_key: None,
            timeout_seconds: 30,
        }
    }
}

/// A stored memory returned from search
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: String,
    pub memory: String,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Client for the semantic memory service.
///
/// Content is partitioned by user id and tagged with a [`MemoryKind`] in its
/// metadata, so searches can be narrowed to one category.
#[derive(Debug, Clone)]
pub struct MemoryClient {
    config: MemoryConfig,
    client: reqwest::Client,
}

impl MemoryClient {
    pub fn new(config: MemoryConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self { config, client })
    }

    fn api_key(&self) -> Result<&str> {
        self.config
            .api_key
            .as_deref()
            .ok_or_else(|| anyhow!("Memory API key not configured"))
    }

    /// Store content and return the new memory id.
    pub async fn add(
        &self,
        content: &str,
        user_id: &str,
        kind: MemoryKind,
        metadata: serde_json::Value,
    ) -> Result<String> {
        let api_key = self.api_key()?;

        let mut metadata = match metadata {
            serde_json::Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        metadata.insert("memory_type".to_string(), json!(kind.as_str()));

        let body = json!({
            "messages": [{"role": "user", "content": content}],
            "user_id": user_id,
            "metadata": metadata,
        });

        let url = format!("{}/v1/memories/", self.config.endpoint);
        debug!("💾 Adding {} memory for user {}", kind.as_str(), user_id);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Token {}", api_key))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!("Memory API error {}: {}", status, text));
        }

        let value: serde_json::Value = response.json().await?;
        let first = value
            .get("results")
            .and_then(|r| r.as_array())
            .and_then(|r| r.first())
            .or_else(|| value.as_array().and_then(|r| r.first()));

        first
            .and_then(|m| m.get("id"))
            .and_then(|id| id.as_str())
            .map(|id| id.to_string())
            .ok_or_else(|| anyhow!("Memory service returned no id"))
    }

    /// Search stored memories, optionally narrowed to one kind.
    pub async fn search(
        &self,
        query: &str,
        user_id: &str,
        kind: Option<MemoryKind>,
        limit: usize,
    ) -> Result<Vec<MemoryRecord>> {
        let api_key = self.api_key()?;

        let body = json!({
            "query": query,
            "user_id": user_id,
            "limit": limit,
        });

        let url = format!("{}/v1/memories/search/", self.config.endpoint);
        debug!("🔍 Searching memories for user {}: {}", user_id, query);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Token {}", api_key))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!("Memory API error {}: {}", status, text));
        }

        let value: serde_json::Value = response.json().await?;
        let raw = value
            .get("results")
            .and_then(|r| r.as_array())
            .cloned()
            .or_else(|| value.as_array().cloned())
            .unwrap_or_default();

        let records = raw
            .into_iter()
            .filter_map(|record| serde_json::from_value::<MemoryRecord>(record).ok())
            .filter(|record| match kind {
                Some(kind) => {
                    record
                        .metadata
                        .get("memory_type")
                        .and_then(|k| k.as_str())
                        .map(|k| k == kind.as_str())
                        .unwrap_or(false)
                }
                None => true,
            })
            .take(limit)
            .collect();

        Ok(records)
    }

    /// Check whether the memory service is reachable
    pub async fn is_available(&self) -> bool {
        let api_key = match &self.config.api_key {
            Some(key) => key,
            None => return false,
        };

        let url = format!("{}/v1/memories/?user_id={}", self.config.endpoint, REFERENCE_USER);
        match self
            .client
            .get(&url)
            .header("Authorization", format!("Token {}", api_key))
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    /// Store a section of reference material, tagged with its source.
    pub async fn add_reference_material(
        &self,
        content: &str,
        source: &str,
        metadata: serde_json::Value,
    ) -> Result<String> {
        let metadata = with_fields(
            metadata,
            &[
                ("source", json!(source)),
                ("added_at", json!(chrono::Utc::now().timestamp())),
            ],
        );
        self.add(content, REFERENCE_USER, MemoryKind::ReferenceMaterial, metadata)
            .await
    }

    /// Search stored reference material.
    pub async fn search_references(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<MemoryRecord>> {
        self.search(query, REFERENCE_USER, Some(MemoryKind::ReferenceMaterial), limit)
            .await
    }

    /// Store a plot point or event from a generated episode.
    pub async fn add_episode_memory(
        &self,
        content: &str,
        episode_id: &str,
        metadata: serde_json::Value,
    ) -> Result<String> {
        let metadata = with_fields(
            metadata,
            &[
                ("episode_id", json!(episode_id)),
                ("added_at", json!(chrono::Utc::now().timestamp())),
            ],
        );
        self.add(content, EPISODE_USER, MemoryKind::EpisodeMemory, metadata)
            .await
    }

    /// Store information about a character.
    pub async fn add_character_info(
        &self,
        character_name: &str,
        info: &str,
        metadata: serde_json::Value,
    ) -> Result<String> {
        let metadata = with_fields(
            metadata,
            &[
                ("character_name", json!(character_name)),
                ("updated_at", json!(chrono::Utc::now().timestamp())),
            ],
        );
        self.add(info, CHARACTER_USER, MemoryKind::CharacterInfo, metadata)
            .await
    }

    /// Store a serialized episode structure for future retrieval.
    pub async fn add_story_structure(
        &self,
        structure: &serde_json::Value,
        episode_id: &str,
    ) -> Result<String> {
        let metadata = json!({
            "episode_id": episode_id,
            "added_at": chrono::Utc::now().timestamp(),
        });
        let content = serde_json::to_string(structure)?;
        self.add(&content, STORY_USER, MemoryKind::StoryStructure, metadata)
            .await
    }
}

fn with_fields(
    metadata: serde_json::Value,
    fields: &[(&str, serde_json::Value)],
) -> serde_json::Value {
    let mut map = match metadata {
        serde_json::Value::Object(map) => map,
        _ => serde_json::Map::new(),
    };
    for (key, value) in fields {
        map.insert(key.to_string(), value.clone());
    }
    serde_json::Value::Object(map)
}
