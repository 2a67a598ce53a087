#![cfg(feature = "server-tests")]

//! Exercises a running `mbaal-server` over HTTP (`MBAAL_URL`, default
//! `http://localhost:3000`).

use mbaal_catalog_integration::{init_tracing, server_url, unique_suffix};
use serde_json::{json, Value};

async fn post(client: &reqwest::Client, path: &str, body: Value) -> (u16, Value) {
    let resp = client
        .post(format!("{}{path}", server_url()))
        .json(&body)
        .send()
        .await
        .expect("request");
    let status = resp.status().as_u16();
    (status, resp.json().await.unwrap_or(Value::Null))
}

async fn get(client: &reqwest::Client, path: &str) -> (u16, Value) {
    let resp = client
        .get(format!("{}{path}", server_url()))
        .send()
        .await
        .expect("request");
    let status = resp.status().as_u16();
    (status, resp.json().await.unwrap_or(Value::Null))
}

#[tokio::test]
async fn server_health() {
    init_tracing();
    let client = reqwest::Client::new();
    let (status, body) = get(&client, "/health").await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn server_hierarchy_and_counts() {
    init_tracing();
    let client = reqwest::Client::new();
    let suffix = unique_suffix();

    let (status, food) = post(
        &client,
        "/categories",
        json!({ "name": "Food", "slug": format!("food-{suffix}") }),
    )
    .await;
    assert_eq!(status, 201);
    let (_, grains) = post(
        &client,
        "/categories",
        json!({ "name": "Grains", "slug": format!("grains-{suffix}"), "parent": food["id"] }),
    )
    .await;
    assert_eq!(grains["level"], 1);
    let grains_id = grains["id"].as_str().unwrap().to_string();

    let (status, _) = post(
        &client,
        "/products",
        json!({
            "name": "Millet",
            "slug": format!("millet-{suffix}"),
            "description": "Pearl millet",
            "category": grains_id,
            "pricing": { "base_price": 900 },
            "status": "published"
        }),
    )
    .await;
    assert_eq!(status, 201);

    let (_, grains) = get(&client, &format!("/categories/{grains_id}")).await;
    assert_eq!(grains["stats"]["product_count"], 1);

    let (_, path) = get(&client, &format!("/categories/{grains_id}/path")).await;
    assert_eq!(path["path"], "Food > Grains");
}
