//! Video search capability for explaining difficult terms.
//!
//! Queries a YouTube-compatible search API for short educational videos
//! about a term, biased by the term's category. Unconfigured or
//! unavailable search degrades to an empty result list.

use serde::Deserialize;

use crate::config::VideoConfig;
use crate::models::VideoResult;
use crate::retry::{classify_reqwest, classify_status, with_retry, RetryPolicy};

/// Category-specific keyword hints that make search results noticeably
/// more relevant than the bare term.
fn category_hint(category: Option<&str>) -> &'static str {
    match category {
        Some("Legal") => "law explained",
        Some("Financial") => "finance explained",
        Some("Medical") => "medical term",
        Some("Technical") => "how it works",
        Some("Insurance") => "insurance explained",
        Some("Real Estate") => "real estate",
        Some("Banking") => "banking",
        Some("Tax") => "tax explained",
        _ => "explained simply",
    }
}

/// Build an optimized search query for a term.
pub fn build_search_query(term: &str, category: Option<&str>) -> String {
    format!("{} {}", term, category_hint(category))
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: ItemId,
    snippet: Snippet,
}

#[derive(Debug, Deserialize)]
struct ItemId {
    #[serde(rename = "videoId", default)]
    video_id: String,
}

#[derive(Debug, Deserialize)]
struct Snippet {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(rename = "channelTitle", default)]
    channel_title: String,
    #[serde(default)]
    thumbnails: Thumbnails,
}

#[derive(Debug, Default, Deserialize)]
struct Thumbnails {
    #[serde(default)]
    medium: Option<Thumbnail>,
}

#[derive(Debug, Deserialize)]
struct Thumbnail {
    #[serde(default)]
    url: String,
}

/// Search for educational videos about a term.
///
/// Returns at most `max_results` videos; an unconfigured API key or an
/// unavailable endpoint yields an empty list, never an error.
pub async fn search_videos(
    cfg: &VideoConfig,
    policy: &RetryPolicy,
    term: &str,
    category: Option<&str>,
) -> Vec<VideoResult> {
    let Some(api_key) = cfg.api_key.as_deref().filter(|k| !k.is_empty()) else {
        tracing::debug!("video search skipped: no API key configured");
        return Vec::new();
    };

    let query = build_search_query(term, category);
    let endpoint = cfg.endpoint.as_str();
    let max_results = cfg.max_results.to_string();
    let params: &[(&str, &str)] = &[
        ("part", "snippet"),
        ("q", &query),
        ("type", "video"),
        ("maxResults", &max_results),
        ("key", api_key),
        ("relevanceLanguage", "en"),
        ("safeSearch", "strict"),
        ("videoDuration", "medium"),
        ("order", "relevance"),
    ];

    let outcome = with_retry(policy, "video-search", move || async move {
        let client = reqwest::Client::new();
        let response = client
            .get(endpoint)
            .query(params)
            .send()
            .await
            .map_err(classify_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, body, "video search"));
        }
        response
            .json::<SearchResponse>()
            .await
            .map_err(|e| crate::retry::CallError::Terminal(e.into()))
    })
    .await;

    let parsed = outcome.unwrap_or_else_default("video-search", || SearchResponse {
        items: Vec::new(),
    });

    parsed
        .items
        .into_iter()
        .filter(|item| !item.id.video_id.is_empty())
        .map(|item| VideoResult {
            url: format!("https://www.youtube.com/watch?v={}", item.id.video_id),
            id: item.id.video_id,
            title: item.snippet.title,
            description: item.snippet.description,
            thumbnail: item
                .snippet
                .thumbnails
                .medium
                .map(|t| t.url)
                .unwrap_or_default(),
            channel: item.snippet.channel_title,
        })
        .collect()
}
