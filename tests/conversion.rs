// Conversion endpoints, stored base configs and message localization
#[cfg(test)]
mod test {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use async_trait::async_trait;
    use axum::{
        Router,
        body::Body,
        http::{Request, Response, StatusCode, header},
    };
    use base64::Engine;
    use serde_json::{Value, json};
    use sublink::{
        adapters::{FileSystemAdapter, HttpHandler, MemoryStore, builders, router},
        config::ServerConfig,
        core::{BuilderRegistry, SublinkService},
        ports::{
            config_builder::{BuildError, BuildRequest, BuiltConfig, ConfigBuilder},
            http_client::{HttpClient, HttpClientError, HttpClientResult},
        },
    };
    use tower::ServiceExt;

    const TROJAN: &str = "trojan://pw@t.example.com:443?sni=t.example.com#TR";

    struct OfflineClient;

    #[async_trait]
    impl HttpClient for OfflineClient {
        async fn get_text(&self, url: &str, _user_agent: &str) -> HttpClientResult<String> {
            Err(HttpClientError::ConnectionError(url.to_string()))
        }
    }

    #[derive(Default)]
    struct CountingBuilder {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ConfigBuilder for CountingBuilder {
        async fn build(&self, request: BuildRequest) -> Result<BuiltConfig, BuildError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(BuiltConfig::Json(json!({ "nodes": request.subscription })))
        }
    }

    fn app_with(config: ServerConfig, builders: BuilderRegistry) -> Router {
        let config = Arc::new(config);
        let service = Arc::new(SublinkService::new(
            &config,
            Arc::new(MemoryStore::new()),
            Arc::new(OfflineClient),
            builders,
        ));
        router(Arc::new(HttpHandler::new(
            service,
            Arc::new(FileSystemAdapter::new()),
            config,
        )))
    }

    fn app() -> Router {
        app_with(ServerConfig::default(), builders::reference_registry())
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header(header::HOST, "sub.example.com")
            .body(Body::empty())
            .unwrap()
    }

    async fn send(app: &Router, request: Request<Body>) -> Response<Body> {
        app.clone().oneshot(request).await.unwrap()
    }

    async fn text(response: Response<Body>) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn content_type(response: &Response<Body>) -> &str {
        response.headers()[header::CONTENT_TYPE].to_str().unwrap()
    }

    fn encode(value: &str) -> String {
        urlencoding::encode(value).into_owned()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_missing_config_never_reaches_builders() {
        let builder = Arc::new(CountingBuilder::default());
        let registry = BuilderRegistry::new(builder.clone(), builder.clone(), builder.clone());
        let app = app_with(ServerConfig::default(), registry);

        for uri in ["/singbox", "/clash?config=", "/surge?selectedRules=minimal"] {
            let response = send(&app, get(uri)).await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        }
        assert_eq!(builder.calls.load(Ordering::SeqCst), 0);

        let response = send(&app, get(&format!("/singbox?config={}", encode(TROJAN)))).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(builder.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_each_format_has_its_content_type() {
        let app = app();
        let config = encode(TROJAN);

        let response = send(&app, get(&format!("/singbox?config={config}"))).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(content_type(&response), "application/json; charset=utf-8");
        let body: Value = serde_json::from_str(&text(response).await).unwrap();
        assert_eq!(body["route"]["final"], "Fall Back");

        let response = send(&app, get(&format!("/clash?config={config}"))).await;
        assert_eq!(content_type(&response), "text/yaml; charset=utf-8");
        let body: Value = serde_yaml::from_str(&text(response).await).unwrap();
        assert_eq!(body["proxies"][0]["name"], "TR");

        let response = send(&app, get(&format!("/surge?config={config}"))).await;
        assert_eq!(content_type(&response), "text/plain; charset=utf-8");
        assert!(response.headers().contains_key("subscription-userinfo"));
        assert!(text(response).await.starts_with("#!MANAGED-CONFIG "));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_xray_reencodes_descriptors() {
        let app = app();
        let raw = format!("{TROJAN}\nss://example");

        let response = send(&app, get(&format!("/xray?config={}", encode(&raw)))).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(content_type(&response), "application/json; charset=utf-8");
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(text(response).await)
            .unwrap();
        assert_eq!(String::from_utf8(decoded).unwrap(), raw);

        let response = send(&app, get("/xray?lang=en")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(text(response).await, "Missing config parameter");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_stored_base_config_is_used() {
        let app = app();

        let upload = json!({
            "type": "clash",
            "content": "port: 1080\nmode: global\nrules:\n  - DOMAIN,example.org,DIRECT\n"
        });
        let request = Request::builder()
            .method("POST")
            .uri("/config")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(upload.to_string()))
            .unwrap();
        let response = send(&app, request).await;
        assert_eq!(response.status(), StatusCode::OK);
        let id = text(response).await;
        assert!(id.starts_with("clash_"));

        let uri = format!("/clash?config={}&configId={id}", encode(TROJAN));
        let body: Value = serde_yaml::from_str(&text(send(&app, get(&uri)).await).await).unwrap();
        assert_eq!(body["port"], 1080);
        assert_eq!(body["mode"], "global");
        assert_eq!(body["rules"][0], "DOMAIN,example.org,DIRECT");
        assert_eq!(
            body["rules"].as_array().unwrap().last().unwrap(),
            "MATCH,Fall Back"
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_unknown_config_id_builds_without_base() {
        let app = app();
        let uri = format!("/clash?config={}&configId=clash_nothere", encode(TROJAN));

        let response = send(&app, get(&uri)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = serde_yaml::from_str(&text(response).await).unwrap();
        assert_eq!(body["port"], 7890);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_short_code_named_like_config_id_keeps_both() {
        let app = app();
        let request = Request::builder()
            .method("POST")
            .uri("/config")
            .body(Body::from(
                json!({"type": "singbox", "content": {"log": {"level": "error"}}}).to_string(),
            ))
            .unwrap();
        let id = text(send(&app, request).await).await;
        assert!(id.starts_with("singbox_"));

        let shorten = format!(
            "/shorten-v2?url={}&shortCode={id}",
            encode("https://h/singbox?config=x")
        );
        let response = send(&app, get(&shorten)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(text(response).await, id);

        let uri = format!("/singbox?config={}&configId={id}", encode(TROJAN));
        let response = send(&app, get(&uri)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = serde_json::from_str(&text(response).await).unwrap();
        assert_eq!(body["log"]["level"], "error");

        let response = send(&app, get(&format!("/b/{id}"))).await;
        assert_eq!(response.status(), StatusCode::FOUND);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_config_id_naming_a_short_code_builds_without_base() {
        let app = app();
        let shorten = format!(
            "/shorten-v2?url={}&shortCode=clash_taken",
            encode("https://h/clash?config=x")
        );
        assert_eq!(send(&app, get(&shorten)).await.status(), StatusCode::OK);

        let uri = format!("/clash?config={}&configId=clash_taken", encode(TROJAN));
        let response = send(&app, get(&uri)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = serde_yaml::from_str(&text(response).await).unwrap();
        assert_eq!(body["port"], 7890);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_inline_base64_subscription_is_expanded() {
        let builder = Arc::new(CountingBuilder::default());
        let registry = BuilderRegistry::new(builder.clone(), builder.clone(), builder.clone());
        let app = app_with(ServerConfig::default(), registry);

        let second = "trojan://pw@u.example.com:443#TR2";
        let blob = base64::engine::general_purpose::STANDARD.encode(format!("{TROJAN}\n{second}\n"));

        let response = send(&app, get(&format!("/singbox?config={}", encode(&blob)))).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = serde_json::from_str(&text(response).await).unwrap();
        assert_eq!(body["nodes"], json!([TROJAN, second]));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_store_config_rejects_invalid_content() {
        let app = app();
        let request = Request::builder()
            .method("POST")
            .uri("/config")
            .header(header::ACCEPT_LANGUAGE, "en-US,en;q=0.9")
            .body(Body::from(r#"{"type":"singbox","content":"{broken"}"#))
            .unwrap();

        let response = send(&app, request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(text(response).await.starts_with("Invalid format: "));

        // GET /config is not an endpoint
        let response = send(&app, get("/config?lang=en")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_language_negotiation() {
        let app = app();

        let response = send(&app, get("/singbox")).await;
        assert_eq!(text(response).await, "缺少配置参数");

        let request = Request::builder()
            .uri("/singbox")
            .header(header::ACCEPT_LANGUAGE, "de-DE, ru;q=0.8, en;q=0.5")
            .body(Body::empty())
            .unwrap();
        assert_eq!(text(send(&app, request).await).await, "Отсутствует параметр config");

        let request = Request::builder()
            .uri("/singbox?lang=fa")
            .header(header::ACCEPT_LANGUAGE, "ru")
            .body(Body::empty())
            .unwrap();
        assert_eq!(
            text(send(&app, request).await).await,
            "پارامتر پیکربندی وجود ندارد"
        );

        let english_default = app_with(
            ServerConfig::builder().default_language("en-US").build(),
            builders::reference_registry(),
        );
        let response = send(&english_default, get("/nowhere?lang=xx")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(text(response).await, "Not Found");
    }
}
