use std::{collections::HashMap, sync::Arc};

use axum::{
    Router,
    body::Body as AxumBody,
    extract::Request as AxumRequest,
    http::{HeaderMap, Request, Response, StatusCode, header},
    middleware,
    routing::any,
};
use eyre::WrapErr;
use serde::Deserialize;
use serde_json::{Value, json};
use tower_http::catch_panic::CatchPanicLayer;

use crate::{
    adapters::{
        FileSystemAdapter, cors_middleware, home_page, request_id_middleware,
        request_timing_middleware,
    },
    config::ServerConfig,
    core::{
        ConversionRequest, SublinkService,
        config_store::ConfigBlobError,
        i18n::{Language, Message},
        routing::{Endpoint, redirect_code},
        short_link::{ShortLinkError, ShortLinkPrefix},
        subscription::SubscriptionError,
    },
    ports::{config_builder::TargetFormat, file_system::FileSystem, http_server::HandlerError},
};

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";
const APPLICATION_JSON: &str = "application/json; charset=utf-8";
const TEXT_HTML: &str = "text/html; charset=utf-8";

/// Quota header Surge clients read from managed profiles
const SUBSCRIPTION_USERINFO: &str = "upload=0; download=0; total=10737418240; expire=2546249531";

/// Asset served for both favicon paths
const FAVICON_FILE: &str = "favicon.png";

type HandlerResult = Result<Response<AxumBody>, HandlerError>;

/// Per-request values resolved once before dispatch
struct RequestContext {
    language: Language,
    /// `{scheme}://{host}` used for generated links
    origin: String,
    /// Query parameters; the first occurrence of a name wins
    query: HashMap<String, String>,
}

impl RequestContext {
    /// Non-empty query parameter
    fn param(&self, name: &str) -> Option<&str> {
        self.query
            .get(name)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }

    fn text(&self, message: Message) -> String {
        message.text(self.language).to_string()
    }

    fn bad_request(&self, message: Message) -> HandlerError {
        HandlerError::BadRequest(self.text(message))
    }

    /// 400 with the localized "invalid format" prefix followed by `detail`
    fn invalid_format(&self, detail: impl std::fmt::Display) -> HandlerError {
        HandlerError::BadRequest(format!("{}{detail}", self.text(Message::InvalidFormat)))
    }
}

#[derive(Deserialize)]
struct ConfigUpload {
    #[serde(rename = "type")]
    kind: Option<String>,
    content: Option<Value>,
}

/// HTTP handler for the sublink service.
///
/// Every request yields exactly one response: failures are converted to
/// localized error responses here and never escape.
#[derive(Clone)]
pub struct HttpHandler {
    service: Arc<SublinkService>,
    file_system: Arc<FileSystemAdapter>,
    config: Arc<ServerConfig>,
}

impl HttpHandler {
    pub fn new(
        service: Arc<SublinkService>,
        file_system: Arc<FileSystemAdapter>,
        config: Arc<ServerConfig>,
    ) -> Self {
        Self {
            service,
            file_system,
            config,
        }
    }

    /// Classify, dispatch and convert the outcome into the response
    pub async fn handle_request(&self, req: Request<AxumBody>) -> Response<AxumBody> {
        let ctx = self.context(&req);
        let endpoint = Endpoint::classify(req.method(), req.uri().path());
        // Owned: no borrow of the request may live across an await
        let path_and_query = req
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| req.uri().path().to_string());

        tracing::debug!(
            "Dispatching {} {} as {:?} (lang: {})",
            req.method(),
            req.uri().path(),
            endpoint,
            ctx.language
        );

        let result = match endpoint {
            Some(Endpoint::Home) => self.handle_home(&ctx),
            Some(Endpoint::Convert(format)) => {
                self.handle_convert(&ctx, format, &path_and_query).await
            },
            Some(Endpoint::Shorten) => self.handle_shorten(&ctx).await,
            Some(Endpoint::ShortenV2) => self.handle_shorten_v2(&ctx).await,
            Some(Endpoint::Redirect(prefix)) => {
                let code = redirect_code(req.uri().path(), prefix)
                    .unwrap_or_default()
                    .to_string();
                self.handle_redirect(&ctx, prefix, &code).await
            }
            Some(Endpoint::Xray) => self.handle_xray(&ctx).await,
            Some(Endpoint::Favicon) => self.handle_favicon(&ctx, req).await,
            Some(Endpoint::StoreConfig) => self.handle_store_config(&ctx, req).await,
            Some(Endpoint::Resolve) => self.handle_resolve(&ctx).await,
            None => Err(HandlerError::NotFound(ctx.text(Message::NotFound))),
        };

        result.unwrap_or_else(|e| e.into_localized_response(ctx.language))
    }

    fn context(&self, req: &Request<AxumBody>) -> RequestContext {
        let query: HashMap<String, String> = req
            .uri()
            .query()
            .map(|q| {
                url::form_urlencoded::parse(q.as_bytes())
                    .into_owned()
                    .fold(HashMap::new(), |mut params, (name, value)| {
                        params.entry(name).or_insert(value);
                        params
                    })
            })
            .unwrap_or_default();

        let accept_language = req
            .headers()
            .get(header::ACCEPT_LANGUAGE)
            .and_then(|v| v.to_str().ok());
        let fallback: Language = self
            .config
            .default_language
            .parse()
            .unwrap_or_default();
        let language = Language::negotiate(
            query.get("lang").map(String::as_str),
            accept_language,
            fallback,
        );

        RequestContext {
            language,
            origin: self.origin(req.headers(), req.uri().authority().map(|a| a.as_str())),
            query,
        }
    }

    /// `public_origin` when configured, otherwise derived from forwarding
    /// headers and `Host`
    fn origin(&self, headers: &HeaderMap, authority: Option<&str>) -> String {
        if let Some(origin) = &self.config.public_origin {
            return origin.trim_end_matches('/').to_string();
        }

        let scheme = headers
            .get("x-forwarded-proto")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or("http");
        let host = headers
            .get(header::HOST)
            .and_then(|v| v.to_str().ok())
            .or(authority)
            .unwrap_or("localhost");

        format!("{scheme}://{host}")
    }

    fn handle_home(&self, ctx: &RequestContext) -> HandlerResult {
        respond(
            StatusCode::OK,
            TEXT_HTML,
            home_page::render(&ctx.origin, ctx.language),
        )
    }

    async fn handle_convert(
        &self,
        ctx: &RequestContext,
        format: TargetFormat,
        path_and_query: &str,
    ) -> HandlerResult {
        let Some(config) = ctx.param("config") else {
            return Err(ctx.bad_request(Message::MissingConfig));
        };

        let request = ConversionRequest {
            config: config.to_string(),
            selected_rules: ctx.param("selectedRules").map(str::to_string),
            custom_rules: ctx.param("customRules").map(str::to_string),
            config_id: ctx.param("configId").map(str::to_string),
            user_agent: ctx.param("ua").map(str::to_string),
            language: ctx.language,
            request_url: format!("{}{path_and_query}", ctx.origin),
        };

        let body = self
            .service
            .convert(format, request)
            .await?
            .into_body()
            .wrap_err_with(|| format!("Failed to serialize {format} config"))?;

        let mut response = respond(StatusCode::OK, format.content_type(), body)?;
        if format == TargetFormat::Surge {
            response.headers_mut().insert(
                "subscription-userinfo",
                header::HeaderValue::from_static(SUBSCRIPTION_USERINFO),
            );
        }
        Ok(response)
    }

    async fn handle_xray(&self, ctx: &RequestContext) -> HandlerResult {
        let raw = ctx.param("config").unwrap_or_default();
        match self.service.aggregate(raw, ctx.param("ua")).await {
            Ok(encoded) => respond(StatusCode::OK, APPLICATION_JSON, encoded),
            Err(SubscriptionError::Empty) => Err(ctx.bad_request(Message::MissingConfig)),
        }
    }

    async fn handle_shorten(&self, ctx: &RequestContext) -> HandlerResult {
        let Some(url) = ctx.param("url") else {
            return Err(ctx.bad_request(Message::MissingUrl));
        };

        let code = self
            .service
            .short_links()
            .shorten_url(url)
            .await
            .wrap_err("Failed to store short link")?;

        let short_url = format!("{}/{}/{code}", ctx.origin, ShortLinkPrefix::Surge);
        respond_json(&json!({ "shortUrl": short_url }))
    }

    async fn handle_shorten_v2(&self, ctx: &RequestContext) -> HandlerResult {
        let Some(url) = ctx.param("url") else {
            return Err(ctx.bad_request(Message::MissingUrl));
        };

        match self
            .service
            .short_links()
            .shorten_query(url, ctx.param("shortCode"))
            .await
        {
            Ok(code) => respond(StatusCode::OK, TEXT_PLAIN, code),
            Err(e @ (ShortLinkError::InvalidUrl(_) | ShortLinkError::InvalidCode(_))) => {
                Err(ctx.invalid_format(e))
            }
            Err(e) => Err(eyre::Report::new(e)
                .wrap_err("Failed to store short link")
                .into()),
        }
    }

    async fn handle_redirect(
        &self,
        ctx: &RequestContext,
        prefix: ShortLinkPrefix,
        code: &str,
    ) -> HandlerResult {
        let target = self
            .service
            .short_links()
            .resolve(&ctx.origin, prefix, code)
            .await
            .wrap_err_with(|| format!("Failed to resolve short code {code}"))?;

        let Some(target) = target else {
            return Err(HandlerError::NotFound(ctx.text(Message::ShortUrlNotFound)));
        };

        tracing::debug!("Redirecting /{}/{} to {}", prefix, code, target);
        Response::builder()
            .status(StatusCode::FOUND)
            .header(header::LOCATION, target)
            .body(AxumBody::empty())
            .wrap_err("Failed to build redirect response")
            .map_err(HandlerError::from)
    }

    async fn handle_resolve(&self, ctx: &RequestContext) -> HandlerResult {
        let Some(short_url) = ctx.param("url") else {
            return Err(ctx.bad_request(Message::MissingUrl));
        };

        match self
            .service
            .short_links()
            .resolve_short_url(&ctx.origin, short_url)
            .await
        {
            Ok(Some(original_url)) => respond_json(&json!({ "originalUrl": original_url })),
            Ok(None) => Err(HandlerError::NotFound(ctx.text(Message::ShortUrlNotFound))),
            Err(ShortLinkError::InvalidShortUrl(_)) => {
                Err(ctx.bad_request(Message::InvalidShortUrl))
            }
            Err(e) => Err(eyre::Report::new(e)
                .wrap_err("Failed to resolve short URL")
                .into()),
        }
    }

    async fn handle_favicon(&self, ctx: &RequestContext, req: Request<AxumBody>) -> HandlerResult {
        let response = self
            .file_system
            .serve_asset(&self.config.static_dir, FAVICON_FILE, req)
            .await
            .wrap_err("Failed to serve favicon")?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(HandlerError::NotFound(ctx.text(Message::NotFound)));
        }
        Ok(response)
    }

    async fn handle_store_config(
        &self,
        ctx: &RequestContext,
        req: Request<AxumBody>,
    ) -> HandlerResult {
        let bytes = axum::body::to_bytes(req.into_body(), self.config.max_body_bytes)
            .await
            .map_err(|e| ctx.invalid_format(e))?;

        let upload: ConfigUpload =
            serde_json::from_slice(&bytes).map_err(|e| ctx.invalid_format(e))?;
        let kind = upload
            .kind
            .ok_or_else(|| ctx.invalid_format(ConfigBlobError::MissingType))?;
        let content = upload
            .content
            .ok_or_else(|| ctx.invalid_format("Config content is required"))?;

        match self.service.config_blobs().create(&kind, &content).await {
            Ok(id) => respond(StatusCode::OK, TEXT_PLAIN, id),
            Err(e @ (ConfigBlobError::InvalidContent(_) | ConfigBlobError::MissingType)) => {
                tracing::debug!("Rejected {} config upload: {}", kind, e);
                Err(ctx.invalid_format(e))
            }
            Err(e) => Err(eyre::Report::new(e)
                .wrap_err("Failed to store base config")
                .into()),
        }
    }
}

fn respond(status: StatusCode, content_type: &str, body: impl Into<AxumBody>) -> HandlerResult {
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, content_type)
        .body(body.into())
        .wrap_err("Failed to build response")
        .map_err(HandlerError::from)
}

fn respond_json(value: &Value) -> HandlerResult {
    let body = serde_json::to_string(value).wrap_err("Failed to serialize JSON response")?;
    respond(StatusCode::OK, APPLICATION_JSON, body)
}

/// Build the application router: every path goes through [`HttpHandler`],
/// wrapped in the request middleware and a panic guard.
///
/// The panic guard answers in the configured `default_language`; the request's
/// negotiated language is gone by the time a panic is caught.
pub fn router(handler: Arc<HttpHandler>) -> Router {
    let make_route = |handler: Arc<HttpHandler>| {
        any(move |req: AxumRequest| {
            let handler = handler.clone();
            async move { handler.handle_request(req).await }
        })
    };

    let fallback_language: Language = handler
        .config
        .default_language
        .parse()
        .unwrap_or_default();
    let cors_enabled = handler.config.cors_enabled;

    let mut app = Router::new()
        .route("/", make_route(handler.clone()))
        .route("/{*path}", make_route(handler));

    if cors_enabled {
        app = app.layer(middleware::from_fn(cors_middleware));
    }

    app.layer(middleware::from_fn(request_id_middleware))
        .layer(middleware::from_fn(request_timing_middleware))
        .layer(CatchPanicLayer::custom(
            move |_panic: Box<dyn std::any::Any + Send + 'static>| {
                tracing::error!("Request handler panicked");
                let mut response = Response::new(AxumBody::from(
                    Message::InternalError.text(fallback_language),
                ));
                *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                response.headers_mut().insert(
                    header::CONTENT_TYPE,
                    header::HeaderValue::from_static(TEXT_PLAIN),
                );
                response
            },
        ))
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use tower::ServiceExt;

    use super::*;
    use crate::{
        adapters::{MemoryStore, builders::reference_registry},
        ports::http_client::{HttpClient, HttpClientError, HttpClientResult},
    };

    struct OfflineClient;

    #[async_trait]
    impl HttpClient for OfflineClient {
        async fn get_text(&self, url: &str, _user_agent: &str) -> HttpClientResult<String> {
            Err(HttpClientError::ConnectionError(url.to_string()))
        }
    }

    fn create_test_handler(config: ServerConfig) -> HttpHandler {
        let config = Arc::new(config);
        let service = Arc::new(SublinkService::new(
            &config,
            Arc::new(MemoryStore::new()),
            Arc::new(OfflineClient),
            reference_registry(),
        ));
        HttpHandler::new(service, Arc::new(FileSystemAdapter::new()), config)
    }

    fn get(uri: &str) -> Request<AxumBody> {
        Request::builder()
            .uri(uri)
            .header(header::HOST, "sub.example.com")
            .body(AxumBody::empty())
            .unwrap()
    }

    async fn body_text(response: Response<AxumBody>) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_request_future_is_send() {
        fn assert_send<T: Send>(value: T) -> T {
            value
        }

        let handler = create_test_handler(ServerConfig::default());
        let request = get("/singbox?config=trojan%3A%2F%2Fpw%40h%3A443%23T");
        let future = assert_send(handler.handle_request(request));
        assert_eq!(future.await.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unknown_path_is_localized_404() {
        let handler = create_test_handler(ServerConfig::default());
        let response = handler.handle_request(get("/nothing?lang=en-US")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_text(response).await, "Not Found");
    }

    #[tokio::test]
    async fn test_origin_detection() {
        let handler = create_test_handler(ServerConfig::default());
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, "sub.example.com:8080".parse().unwrap());
        assert_eq!(handler.origin(&headers, None), "http://sub.example.com:8080");

        headers.insert("x-forwarded-proto", "https, http".parse().unwrap());
        assert_eq!(handler.origin(&headers, None), "https://sub.example.com:8080");

        let pinned = create_test_handler(
            ServerConfig::builder()
                .public_origin("https://links.example.org/")
                .build(),
        );
        assert_eq!(pinned.origin(&headers, None), "https://links.example.org");
    }

    #[tokio::test]
    async fn test_first_query_value_wins() {
        let handler = create_test_handler(ServerConfig::default());
        let ctx = handler.context(&get("/singbox?lang=ru&lang=en&config=a+b&ua="));
        assert_eq!(ctx.language, Language::Ru);
        assert_eq!(ctx.param("config"), Some("a b"));
        assert_eq!(ctx.param("ua"), None);
    }

    #[tokio::test]
    async fn test_home_page() {
        let handler = create_test_handler(ServerConfig::default());
        let response = handler.handle_request(get("/")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], TEXT_HTML);
        assert!(body_text(response).await.contains("http://sub.example.com"));
    }

    #[tokio::test]
    async fn test_surge_headers() {
        let handler = create_test_handler(ServerConfig::default());
        let response = handler
            .handle_request(get("/surge?config=trojan%3A%2F%2Fpw%40h.example.com%3A443%23T"))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], TEXT_PLAIN);
        assert_eq!(
            response.headers()["subscription-userinfo"],
            SUBSCRIPTION_USERINFO
        );
        let body = body_text(response).await;
        assert!(body.starts_with(
            "#!MANAGED-CONFIG http://sub.example.com/surge?config=trojan%3A%2F%2Fpw%40h.example.com%3A443%23T interval=43200"
        ));
    }

    #[tokio::test]
    async fn test_store_config_errors() {
        let handler = create_test_handler(ServerConfig::default());
        let post = |body: &str| {
            Request::builder()
                .method("POST")
                .uri("/config?lang=en")
                .header(header::CONTENT_TYPE, "application/json")
                .body(AxumBody::from(body.to_string()))
                .unwrap()
        };

        let response = handler
            .handle_request(post(r#"{"type":"singbox","content":"not json"}"#))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_text(response).await.starts_with("Invalid format: "));

        let response = handler.handle_request(post(r#"{"content":{}}"#)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = handler.handle_request(post("{")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_store_config_body_limit() {
        let mut config = ServerConfig::default();
        config.max_body_bytes = 16;
        let handler = create_test_handler(config);

        let request = Request::builder()
            .method("POST")
            .uri("/config")
            .body(AxumBody::from(
                r#"{"type":"clash","content":{"port":7890,"mode":"rule"}}"#,
            ))
            .unwrap();
        let response = handler.handle_request(request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_router_answers_preflight_and_tags_requests() {
        let app = router(Arc::new(create_test_handler(ServerConfig::default())));
        let response = app
            .oneshot(
                Request::builder()
                    .method("OPTIONS")
                    .uri("/shorten")
                    .body(AxumBody::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(response.headers().contains_key("X-Request-ID"));
    }
}
