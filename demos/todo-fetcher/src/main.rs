//! # Todo Fetcher Demo
//!
//! Runs the sample sagas against a real HTTP endpoint.
//! The `fetch` call target is plain `reqwest`; the sagas never see it,
//! they only yield `invoke!(fetch, url)`.

use anyhow::{Context, Result};
use effectsaga_core::sagas::{
    root_saga, FetchOnRequest, DEFAULT_TODOS_URL, FETCH_FAILED, FETCH_REQUESTED, FETCH_SUCCEEDED,
    INCREMENT, INCREMENT_ASYNC, TODOS_RECEIVED, TODOS_REQUEST_FAILED,
};
use effectsaga_core::{request, Action, ActionBus, Args, Driver, Func, RuntimeBuilder};
use serde_json::{json, Value};
use std::env;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

// ============================================================================
// Call targets
// ============================================================================

/// `fetch(url)`: GET the URL and parse the body as JSON.
fn http_fetch(client: reqwest::Client) -> Func {
    Func::new("fetch", move |args: Args| {
        let client = client.clone();
        async move {
            let url = args
                .first()
                .and_then(Value::as_str)
                .context("fetch expects a url")?
                .to_string();

            let response = client.get(&url).send().await?;
            let status = response.status();
            if !status.is_success() {
                anyhow::bail!("GET {} returned HTTP {}", url, status.as_u16());
            }
            Ok(response.json::<Value>().await?)
        }
    })
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let todos_url = env::var("TODOS_URL").unwrap_or_else(|_| DEFAULT_TODOS_URL.to_string());
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()?;
    let fetch = http_fetch(client);

    let bus = ActionBus::new();

    // One-off: drive the todos saga directly, dispatching onto the bus.
    let mut answers = bus.subscribe();
    let driver = Driver::new(Arc::new(bus.clone()));
    driver
        .run(&mut FetchOnRequest::todos(fetch.clone(), todos_url.clone()))
        .await?;
    let outcome = answers.recv().await?;
    match outcome.kind.as_str() {
        TODOS_RECEIVED => {
            let count = outcome.get("todos").and_then(Value::as_array).map_or(0, Vec::len);
            println!("{}: {} todos", TODOS_RECEIVED, count);
        }
        TODOS_REQUEST_FAILED => println!("{}: {:?}", TODOS_REQUEST_FAILED, outcome.get("error")),
        other => println!("unexpected {}", other),
    }

    // Watched: the root saga reacts to actions emitted on the bus.
    let handle = root_saga(RuntimeBuilder::new(bus.clone()), fetch)
        .build()
        .start();

    println!("Waiting for {}...", INCREMENT);
    let increment = request(&bus, Action::new(INCREMENT_ASYNC), |a| a.is(INCREMENT)).await?;
    println!("Got {:?}", increment);

    let trigger = Action::new(FETCH_REQUESTED).with("payload", json!({ "url": todos_url }));
    let fetched = request(&bus, trigger, |a| a.is(FETCH_SUCCEEDED) || a.is(FETCH_FAILED)).await?;
    info!(kind = %fetched.kind, "fetch finished");

    handle.shutdown();
    handle.wait_idle().await;
    println!("All sagas complete!");

    Ok(())
}
