//! Filter list download.
//!
//! Every configured list is fetched concurrently. A list that cannot be
//! fetched becomes a failed [`ListInput`] so the build carries on without it.

use std::time::Duration;

use ep_compiler::{ListInput, ListSpec};

const USER_AGENT: &str = concat!("echo-privacy/", env!("CARGO_PKG_VERSION"));

async fn fetch_one(client: reqwest::Client, spec: ListSpec) -> ListInput {
    let response = match client.get(&spec.url).send().await {
        Ok(response) => response,
        Err(e) => return ListInput::failed(spec, e),
    };
    if !response.status().is_success() {
        let reason = format!("HTTP {}", response.status());
        return ListInput::failed(spec, reason);
    }
    match response.text().await {
        Ok(body) => {
            log::info!("Fetched '{}' ({} bytes)", spec.name, body.len());
            ListInput::fetched(spec, body)
        }
        Err(e) => ListInput::failed(spec, e),
    }
}

/// Fetch every list, keeping configured order.
pub async fn fetch_lists(lists: &[ListSpec], timeout: Duration) -> Result<Vec<ListInput>, String> {
    let client = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .map_err(|e| format!("Failed to build HTTP client: {}", e))?;

    let handles: Vec<_> = lists
        .iter()
        .map(|spec| tokio::spawn(fetch_one(client.clone(), spec.clone())))
        .collect();

    let mut inputs = Vec::with_capacity(lists.len());
    for (spec, handle) in lists.iter().zip(handles) {
        let input = match handle.await {
            Ok(input) => input,
            Err(e) => ListInput::failed(spec.clone(), e),
        };
        if let Err(err) = &input.body {
            log::warn!("Fetch failed: {err}");
        }
        inputs.push(input);
    }
    Ok(inputs)
}

/// Blocking wrapper for the synchronous command handlers.
pub fn fetch_lists_blocking(lists: &[ListSpec], timeout: Duration) -> Result<Vec<ListInput>, String> {
    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| format!("Failed to start tokio runtime: {}", e))?;
    runtime.block_on(fetch_lists(lists, timeout))
}
