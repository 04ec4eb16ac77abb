//! Web search providers and page fetching.
//!
//! Providers: SerpAPI and Bing (JSON APIs) and DuckDuckGo (HTML scrape).
//! The core normalizes redirector URLs, rejects non-HTTP(S) schemes, and
//! enforces a per-fetch timeout regardless of provider.

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use scraper::{Html, Selector};
use tracing::{debug, warn};

use spaces_core::{Error, Result, Settings, WebHit, WebSearch};

const USER_AGENT: &str = "SpacesAI-DeepResearch/1.0 (+https://github.com/integrolabs/spacesai)";

/// Maximum HTML bytes considered per fetched page.
const MAX_PAGE_BYTES: usize = 200_000;

// ============================================================================
// URL handling
// ============================================================================

/// Percent-decode a URL component (strict enough for redirector params).
fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).unwrap_or("");
                match u8::from_str_radix(hex, 16) {
                    Ok(b) => {
                        out.push(b);
                        i += 3;
                    }
                    Err(_) => {
                        out.push(bytes[i]);
                        i += 1;
                    }
                }
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Normalize a result URL: unwrap known redirectors, require HTTP(S), drop
/// the fragment. Returns `None` for anything unusable.
pub fn normalize_url(raw: &str) -> Option<String> {
    let mut candidate = raw.trim().to_string();
    if candidate.is_empty() {
        return None;
    }

    // DuckDuckGo wraps results as //duckduckgo.com/l/?uddg=<encoded>.
    if let Some(pos) = candidate.find("uddg=") {
        let tail = &candidate[pos + 5..];
        let end = tail.find('&').unwrap_or(tail.len());
        candidate = percent_decode(&tail[..end]);
    }

    if candidate.starts_with("//") {
        candidate = format!("https:{candidate}");
    }
    if !candidate.contains("://") {
        candidate = format!("https://{candidate}");
    }

    let parsed = url::Url::parse(&candidate).ok()?;
    match parsed.scheme() {
        "http" | "https" => {}
        _ => return None,
    }

    let mut parsed = parsed;
    parsed.set_fragment(None);
    Some(parsed.to_string())
}

// ============================================================================
// Providers
// ============================================================================

fn web_client(timeout: Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .expect("HTTP client construction is infallible with static config")
}

/// DuckDuckGo HTML results (no API key required).
pub struct DdgSearch {
    client: Client,
}

impl DdgSearch {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: web_client(timeout),
        }
    }
}

#[async_trait]
impl WebSearch for DdgSearch {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<WebHit>> {
        let response = self
            .client
            .get("https://duckduckgo.com/html/")
            .query(&[("q", query), ("kl", "us-en")])
            .send()
            .await
            .map_err(|e| Error::Transient(format!("ddg request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::Transient(format!(
                "ddg returned {}",
                response.status()
            )));
        }
        let body = response.text().await.map_err(Error::from)?;

        // DOM lifetime stays inside this block; the parsed tree is not Send.
        let hits = {
            let document = Html::parse_document(&body);
            let link_sel = Selector::parse("a.result__a").unwrap();
            let snippet_sel = Selector::parse(".result__snippet").unwrap();

            let snippets: Vec<String> = document
                .select(&snippet_sel)
                .map(|el| el.text().collect::<String>().trim().to_string())
                .collect();

            document
                .select(&link_sel)
                .enumerate()
                .filter_map(|(i, el)| {
                    let href = el.value().attr("href")?;
                    let url = normalize_url(href)?;
                    let title = el.text().collect::<String>().trim().to_string();
                    if title.is_empty() {
                        return None;
                    }
                    Some(WebHit {
                        title,
                        url,
                        snippet: snippets.get(i).cloned().unwrap_or_default(),
                    })
                })
                .take(k)
                .collect::<Vec<_>>()
        };

        debug!(
            subsystem = "research",
            component = "web",
            op = "search",
            provider = "ddg",
            result_count = hits.len(),
            "Web search complete"
        );
        Ok(hits)
    }

    async fn fetch(&self, url: &str) -> Result<String> {
        fetch_page_text(&self.client, url).await
    }

    fn provider(&self) -> &str {
        "ddg"
    }
}

/// SerpAPI (Google results via JSON).
pub struct SerpApiSearch {
    client: Client,
    api_key: String,
}

impl SerpApiSearch {
    pub fn new(api_key: String, timeout: Duration) -> Self {
        Self {
            client: web_client(timeout),
            api_key,
        }
    }
}

#[async_trait]
impl WebSearch for SerpApiSearch {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<WebHit>> {
        let response = self
            .client
            .get("https://serpapi.com/search.json")
            .query(&[("q", query), ("api_key", &self.api_key)])
            .send()
            .await
            .map_err(|e| Error::Transient(format!("serpapi request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::Transient(format!(
                "serpapi returned {}",
                response.status()
            )));
        }
        let body: serde_json::Value = response.json().await.map_err(Error::from)?;

        let hits = body["organic_results"]
            .as_array()
            .map(|results| {
                results
                    .iter()
                    .filter_map(|item| {
                        let url = normalize_url(item["link"].as_str()?)?;
                        Some(WebHit {
                            title: item["title"].as_str().unwrap_or_default().to_string(),
                            url,
                            snippet: item["snippet"].as_str().unwrap_or_default().to_string(),
                        })
                    })
                    .take(k)
                    .collect()
            })
            .unwrap_or_default();
        Ok(hits)
    }

    async fn fetch(&self, url: &str) -> Result<String> {
        fetch_page_text(&self.client, url).await
    }

    fn provider(&self) -> &str {
        "serpapi"
    }
}

/// Bing Web Search API.
pub struct BingSearch {
    client: Client,
    api_key: String,
}

impl BingSearch {
    pub fn new(api_key: String, timeout: Duration) -> Self {
        Self {
            client: web_client(timeout),
            api_key,
        }
    }
}

#[async_trait]
impl WebSearch for BingSearch {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<WebHit>> {
        let response = self
            .client
            .get("https://api.bing.microsoft.com/v7.0/search")
            .header("Ocp-Apim-Subscription-Key", &self.api_key)
            .query(&[("q", query), ("count", &k.to_string())])
            .send()
            .await
            .map_err(|e| Error::Transient(format!("bing request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::Transient(format!(
                "bing returned {}",
                response.status()
            )));
        }
        let body: serde_json::Value = response.json().await.map_err(Error::from)?;

        let hits = body["webPages"]["value"]
            .as_array()
            .map(|results| {
                results
                    .iter()
                    .filter_map(|item| {
                        let url = normalize_url(item["url"].as_str()?)?;
                        Some(WebHit {
                            title: item["name"].as_str().unwrap_or_default().to_string(),
                            url,
                            snippet: item["snippet"].as_str().unwrap_or_default().to_string(),
                        })
                    })
                    .take(k)
                    .collect()
            })
            .unwrap_or_default();
        Ok(hits)
    }

    async fn fetch(&self, url: &str) -> Result<String> {
        fetch_page_text(&self.client, url).await
    }

    fn provider(&self) -> &str {
        "bing"
    }
}

// ============================================================================
// Page fetch
// ============================================================================

fn strip_nontext_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)<(?:script|style|noscript|nav|header|footer)\b[^>]*>.*?</(?:script|style|noscript|nav|header|footer)\s*>")
            .unwrap()
    })
}

/// Fetch a page and return its visible text (HTML only, size-capped).
async fn fetch_page_text(client: &Client, url: &str) -> Result<String> {
    let url = normalize_url(url)
        .ok_or_else(|| Error::Validation(format!("unfetchable URL: {url}")))?;

    let response = client
        .get(&url)
        .send()
        .await
        .map_err(|e| Error::Transient(format!("page fetch failed: {e}")))?;

    if !response.status().is_success() {
        return Err(Error::Transient(format!(
            "page fetch returned {}",
            response.status()
        )));
    }
    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if !content_type.contains("text/html") && !content_type.contains("application/xhtml") {
        return Err(Error::Unsupported(format!(
            "non-HTML content type: {content_type}"
        )));
    }

    let mut body = response.text().await.map_err(Error::from)?;
    if body.len() > MAX_PAGE_BYTES {
        let mut cut = MAX_PAGE_BYTES;
        while cut > 0 && !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }

    let cleaned = strip_nontext_re().replace_all(&body, " ");
    let text = {
        let document = Html::parse_document(&cleaned);
        document
            .root_element()
            .text()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    };
    Ok(spaces_core::textnorm::normalize_whitespace(&text))
}

// ============================================================================
// Construction
// ============================================================================

/// Build the configured web search provider; `None` disables web research.
pub fn build_web_search(settings: &Settings) -> Option<std::sync::Arc<dyn WebSearch>> {
    let timeout = Duration::from_secs(settings.research_web_timeout_secs);
    match settings.web_provider.as_str() {
        "serpapi" => match settings.serpapi_key.clone() {
            Some(key) => Some(std::sync::Arc::new(SerpApiSearch::new(key, timeout))),
            None => {
                warn!("WEB_SEARCH_PROVIDER=serpapi but SERPAPI_KEY unset; web search disabled");
                None
            }
        },
        "bing" => match settings.bing_key.clone() {
            Some(key) => Some(std::sync::Arc::new(BingSearch::new(key, timeout))),
            None => {
                warn!("WEB_SEARCH_PROVIDER=bing but BING_SEARCH_KEY unset; web search disabled");
                None
            }
        },
        "ddg" => Some(std::sync::Arc::new(DdgSearch::new(timeout))),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_adds_https() {
        assert_eq!(
            normalize_url("example.com/page").as_deref(),
            Some("https://example.com/page")
        );
    }

    #[test]
    fn normalize_strips_fragment() {
        assert_eq!(
            normalize_url("https://example.com/doc#section-2").as_deref(),
            Some("https://example.com/doc")
        );
    }

    #[test]
    fn normalize_rejects_non_http_schemes() {
        assert!(normalize_url("ftp://example.com/file").is_none());
        assert!(normalize_url("javascript:alert(1)").is_none());
        assert!(normalize_url("file:///etc/passwd").is_none());
    }

    #[test]
    fn normalize_unwraps_ddg_redirector() {
        let wrapped = "//duckduckgo.com/l/?uddg=https%3A%2F%2Fexample.com%2Fdoc&rut=abc";
        assert_eq!(
            normalize_url(wrapped).as_deref(),
            Some("https://example.com/doc")
        );
    }

    #[test]
    fn normalize_rejects_empty() {
        assert!(normalize_url("").is_none());
        assert!(normalize_url("   ").is_none());
    }

    #[test]
    fn percent_decode_handles_plus_and_hex() {
        assert_eq!(percent_decode("a%20b+c"), "a b c");
        assert_eq!(percent_decode("100%"), "100%");
    }

    #[test]
    fn build_none_provider_disables_web() {
        let settings = Settings::default();
        assert!(build_web_search(&settings).is_none());
    }

    #[test]
    fn build_ddg_provider() {
        let settings = Settings {
            web_provider: "ddg".into(),
            ..Default::default()
        };
        let ws = build_web_search(&settings).unwrap();
        assert_eq!(ws.provider(), "ddg");
    }

    #[test]
    fn build_serpapi_without_key_disables() {
        let settings = Settings {
            web_provider: "serpapi".into(),
            ..Default::default()
        };
        assert!(build_web_search(&settings).is_none());
    }
}
