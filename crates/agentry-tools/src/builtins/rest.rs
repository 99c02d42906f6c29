//! Generic REST connector tools.

use std::collections::HashMap;
use std::time::Duration;

use agentry_core::{Role, ToolSpec};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::{roles_at_or_above, Tool, ToolContext};

fn required_str<'a>(args: &'a HashMap<String, Value>, key: &str) -> Result<&'a str> {
    args.get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow::anyhow!("missing required param: {key}"))
}

pub struct RestRequestTool;

#[async_trait]
impl Tool for RestRequestTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "rest_request".to_string(),
            description: "Issue an HTTP request against an external REST endpoint.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "method": {"type": "string", "enum": ["GET", "POST", "PUT", "PATCH", "DELETE"]},
                    "url": {"type": "string"},
                    "headers": {"type": "object"},
                    "body": {}
                },
                "required": ["method", "url"]
            }),
            required_roles: roles_at_or_above(Role::Dev),
            safe_for_production: false,
        }
    }

    async fn run(&self, args: &HashMap<String, Value>, _ctx: &ToolContext) -> Result<Value> {
        let method_str = required_str(args, "method")?;
        let url = required_str(args, "url")?;
        let method = reqwest::Method::from_bytes(method_str.as_bytes())
            .map_err(|_| anyhow::anyhow!("unsupported method: {method_str}"))?;

        let client = reqwest::Client::builder().timeout(Duration::from_secs(15)).build()?;
        let mut request = client.request(method, url);

        if let Some(headers) = args.get("headers").and_then(|v| v.as_object()) {
            for (k, v) in headers {
                if let Some(v_str) = v.as_str() {
                    request = request.header(k, v_str);
                }
            }
        }
        if let Some(body) = args.get("body") {
            request = request.json(body);
        }

        let resp = request.send().await?;
        let status = resp.status().as_u16();
        let body: Value = resp.json().await.unwrap_or(Value::Null);
        Ok(json!({"status": status, "body": body}))
    }
}
