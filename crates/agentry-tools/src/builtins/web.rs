//! Web search and page fetching. `web_search` scrapes a third-party HTML
//! endpoint — treat every field as best-effort, never assume a stable shape.

use std::collections::HashMap;
use std::time::Duration;

use agentry_core::{Role, ToolSpec};
use anyhow::Result;
use serde_json::{json, Value};
use async_trait::async_trait;

use crate::builtins::fs::truncate_byte_boundary;
use crate::{roles_at_or_above, Tool, ToolContext};

pub struct WebSearchTool;

#[async_trait]
impl Tool for WebSearchTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "web_search".to_string(),
            description: "Search the web via DuckDuckGo's Instant Answers API.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string"},
                    "max_results": {"type": "integer", "description": "default 5"}
                },
                "required": ["query"]
            }),
            required_roles: roles_at_or_above(Role::Readonly),
            safe_for_production: true,
        }
    }

    async fn run(&self, args: &HashMap<String, Value>, _ctx: &ToolContext) -> Result<Value> {
        let query = args
            .get("query")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("missing required param: query"))?;
        let max_results = args.get("max_results").and_then(|v| v.as_u64()).unwrap_or(5) as usize;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent("agentry/0.1")
            .build()?;

        let resp = client
            .get("https://api.duckduckgo.com/")
            .query(&[("q", query), ("format", "json"), ("no_html", "1"), ("skip_disambig", "1")])
            .send()
            .await?;
        let body: Value = resp.json().await?;

        let abstract_text = body["AbstractText"].as_str().unwrap_or("").trim().to_string();
        let abstract_source = body["AbstractSource"].as_str().unwrap_or("").trim().to_string();

        let mut topics = Vec::new();
        if let Some(related) = body["RelatedTopics"].as_array() {
            for topic in related.iter().take(max_results) {
                if let Some(text) = topic["Text"].as_str() {
                    if !text.trim().is_empty() {
                        topics.push(text.trim().to_string());
                    }
                }
            }
        }

        Ok(json!({
            "query": query,
            "abstract": abstract_text,
            "abstract_source": abstract_source,
            "related_topics": topics,
        }))
    }
}

pub struct WebFetchJsonTool;

#[async_trait]
impl Tool for WebFetchJsonTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "web_fetch_json".to_string(),
            description: "Fetch a URL and return the parsed JSON body.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {"url": {"type": "string"}},
                "required": ["url"]
            }),
            required_roles: roles_at_or_above(Role::Readonly),
            safe_for_production: true,
        }
    }

    async fn run(&self, args: &HashMap<String, Value>, _ctx: &ToolContext) -> Result<Value> {
        let url = args
            .get("url")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("missing required param: url"))?;
        let parsed = url::Url::parse(url).map_err(|e| anyhow::anyhow!("invalid url: {e}"))?;

        let client = reqwest::Client::builder().timeout(Duration::from_secs(10)).build()?;
        let resp = client.get(parsed).send().await?;
        if !resp.status().is_success() {
            anyhow::bail!("fetch failed: {}", resp.status());
        }
        let body: Value = resp.json().await?;
        Ok(body)
    }
}

pub struct WebFetchTextTool;

#[async_trait]
impl Tool for WebFetchTextTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "web_fetch_text".to_string(),
            description: "Fetch a URL and return a plain-text excerpt, stripping HTML markup."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "url": {"type": "string"},
                    "max_chars": {"type": "integer", "description": "default 4000"}
                },
                "required": ["url"]
            }),
            required_roles: roles_at_or_above(Role::Readonly),
            safe_for_production: true,
        }
    }

    async fn run(&self, args: &HashMap<String, Value>, _ctx: &ToolContext) -> Result<Value> {
        let url = args
            .get("url")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("missing required param: url"))?;
        let max_chars = args.get("max_chars").and_then(|v| v.as_u64()).unwrap_or(4000) as usize;

        let client = reqwest::Client::builder().timeout(Duration::from_secs(10)).build()?;
        let resp = client.get(url).header("Accept", "text/html").send().await?;
        if !resp.status().is_success() {
            anyhow::bail!("fetch failed: {}", resp.status());
        }
        let body = resp.text().await?;
        Ok(json!({"url": url, "text": html_to_text(&body, max_chars)}))
    }
}

/// Minimal HTML-to-text: strips tags, drops script/style blocks, collapses
/// whitespace. No third-party HTML parser dependency for this path.
fn html_to_text(html: &str, max_chars: usize) -> String {
    let document = scraper::Html::parse_document(html);
    let skip = scraper::Selector::parse("script, style, nav, header, footer, noscript").unwrap();
    let skip_set: std::collections::HashSet<_> = document
        .select(&skip)
        .flat_map(|el| el.descendants().map(|n| n.id()))
        .collect();

    let mut out = String::new();
    for node in document.root_element().descendants() {
        if skip_set.contains(&node.id()) {
            continue;
        }
        if let Some(text) = node.value().as_text() {
            out.push_str(text);
            out.push(' ');
        }
    }

    let collapsed: String = out.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.len() > max_chars {
        let end = truncate_byte_boundary(&collapsed, max_chars);
        format!("{}…", &collapsed[..end])
    } else {
        collapsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_to_text_strips_script_and_style() {
        let html = "<html><body><script>evil()</script><style>.a{}</style><p>Hello world</p></body></html>";
        let text = html_to_text(html, 1000);
        assert_eq!(text, "Hello world");
    }

    #[test]
    fn html_to_text_truncates_to_max_chars() {
        let html = "<p>abcdefghij</p>";
        let text = html_to_text(html, 5);
        assert!(text.starts_with("abcde"));
        assert!(text.ends_with('…'));
    }
}
