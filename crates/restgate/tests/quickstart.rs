//! Wiring a pipeline from a configuration file, the way a host does.

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use restgate::prelude::*;
use serde_json::json;
use std::sync::Arc;

const CONFIG: &str = r#"
extensions = ["json"]

[auth]
keyword = "TRUEREST"

[log]
enabled = true
dump = false

[rate_limit]
ident_field = "apikey"

[rate_limit.class_limits]
Customer = { window = "-1 day", max_requests = 1 }
"#;

fn request() -> Request {
    let mut request = http::Request::builder()
        .method("POST")
        .uri("/users/add.json")
        .header("authorization", "TRUEREST apikey=k1&class=Customer")
        .body(Full::new(Bytes::from_static(br#"{"name":"john"}"#)))
        .unwrap();
    request
        .extensions_mut()
        .insert(RouteInfo::new("Users", "add", "User").with_extension("json"));
    request
}

#[tokio::test]
async fn test_configured_pipeline_limits_second_request() {
    let config = ConfigLoader::new()
        .with_string(CONFIG, "toml")
        .unwrap()
        .load()
        .unwrap();
    let store = Arc::new(MemoryAuditStore::new());
    let pipeline = Pipeline::builder(config).audit_store(store.clone()).build();

    let first = pipeline
        .process(request(), |_ctx, _req| Box::pin(async { Ok(None) }))
        .await;
    assert_eq!(first.status(), http::StatusCode::OK);
    let body = first.into_body().collect().await.unwrap().to_bytes();
    let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["data"], json!({"User": {"name": "john"}}));

    let second = pipeline
        .process(request(), |_ctx, _req| Box::pin(async { Ok(None) }))
        .await;
    assert_eq!(second.status(), http::StatusCode::FORBIDDEN);
    assert_eq!(store.len(), 2);
    assert!(store.records()[1].ratelimited);
}
