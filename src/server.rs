use crate::cache::{MokaStore, ResponseCache};
use crate::config::Config;
use crate::fetcher::{Fetch, OriginFetcher};
use crate::home::HomePage;
use crate::router::{self, Route};
use crate::tls::load_rustls_config;
use crate::util::{ProxyError, Result};
use crate::{playlist, stream};

use actix_web::{middleware::Logger, web, App, HttpRequest, HttpResponse, HttpServer};
use http::header::ACCESS_CONTROL_ALLOW_ORIGIN;
use log::{error, info, warn};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// per-deployment knobs the handlers need
#[derive(Debug, Clone)]
pub struct ProxyPolicy {
    pub stream_ttl: Duration,
    pub playlist_ttl: Duration,
    pub cache_object_max_bytes: usize,
    /// overrides the origin derived from each request when rewriting
    pub public_origin: Option<String>,
}

impl ProxyPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            stream_ttl: config.stream_ttl(),
            playlist_ttl: config.playlist_ttl(),
            cache_object_max_bytes: config.cache_object_max_bytes(),
            public_origin: config.public_origin.clone(),
        }
    }
}

pub struct AppState {
    pub fetcher: Arc<dyn Fetch>,
    pub cache: ResponseCache,
    pub policy: ProxyPolicy,
    pub home: HomePage,
}

impl AppState {
    /// the full request url as the client addressed it
    pub fn cache_key(&self, req: &HttpRequest) -> String {
        let info = req.connection_info();
        let path_and_query = req.uri().path_and_query().map_or("/", |pq| pq.as_str());
        format!("{}://{}{}", info.scheme(), info.host(), path_and_query)
    }

    /// scheme and host that rewritten playlist urls point back to
    pub fn proxy_origin(&self, req: &HttpRequest) -> String {
        match &self.policy.public_origin {
            Some(origin) => origin.clone(),
            None => {
                let info = req.connection_info();
                format!("{}://{}", info.scheme(), info.host())
            }
        }
    }
}

fn health(state: &AppState) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "cache": state.cache.stats(),
    }))
}

async fn channels(req: &HttpRequest, state: &AppState, target: &url::Url) -> Result<HttpResponse> {
    let key = state.cache_key(req);
    let (entry, cache_status) = playlist::load(req, state, target, key).await?;
    let list = crate::channels::parse(&String::from_utf8_lossy(&entry.body));
    Ok(HttpResponse::Ok()
        .insert_header((ACCESS_CONTROL_ALLOW_ORIGIN, "*"))
        .insert_header((crate::headers::CACHE_STATUS_HEADER, cache_status.as_str()))
        .json(list))
}

pub(crate) async fn dispatch(
    req: HttpRequest,
    state: web::Data<AppState>,
) -> std::result::Result<HttpResponse, ProxyError> {
    let start_time = Instant::now();
    let route = router::classify(req.path(), req.query_string());

    let result = handle(&route, &req, &state).await;

    let elapsed = start_time.elapsed().as_millis();
    match &result {
        Ok(resp) => info!(
            "{} {} -> {} {}ms ({})",
            req.method(),
            req.uri(),
            resp.status(),
            elapsed,
            route_name(&route)
        ),
        Err(e @ (ProxyError::Usage | ProxyError::InvalidTarget { .. } | ProxyError::OriginStatus { .. })) => {
            warn!("{} {} -> {} {}ms", req.method(), req.uri(), e, elapsed)
        }
        Err(e) => error!("{} {} -> {} {}ms", req.method(), req.uri(), e, elapsed),
    }
    result
}

async fn handle(route: &Route, req: &HttpRequest, state: &AppState) -> Result<HttpResponse> {
    match route {
        Route::Home => Ok(state.home.serve(req)),
        Route::Health => Ok(health(state)),
        Route::Channels(raw) => channels(req, state, &router::target_url(raw)?).await,
        Route::Stream(raw) => stream::serve(req, state, &router::target_url(raw)?).await,
        Route::Playlist(raw) => playlist::serve(req, state, &router::target_url(raw)?).await,
        Route::Fallback => Err(ProxyError::Usage),
    }
}

fn route_name(route: &Route) -> &'static str {
    match route {
        Route::Home => "home",
        Route::Health => "health",
        Route::Channels(_) => "channels",
        Route::Stream(_) => "stream",
        Route::Playlist(_) => "playlist",
        Route::Fallback => "fallback",
    }
}

pub async fn run(config: Config) -> Result<()> {
    let fetcher: Arc<dyn Fetch> = Arc::new(OriginFetcher::new(&config)?);
    let cache = ResponseCache::new(Arc::new(MokaStore::new(config.cache_size_mb)));

    // appstate is constructed once and cloned by actix for each worker thread
    let app_state = web::Data::new(AppState {
        fetcher,
        cache: cache.clone(),
        policy: ProxyPolicy::from_config(&config),
        home: HomePage::new(),
    });

    let workers = config.workers();
    info!("streamgate starting on {} with {} workers", config.listen_addr, workers);
    match &config.public_origin {
        Some(origin) => info!("rewriting playlists to {}", origin),
        None => info!("rewriting playlists to the requesting host"),
    }

    let mut server = HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .wrap(Logger::new("%r %s %b %D ms"))
            .default_service(web::to(dispatch))
    })
    .keep_alive(Duration::from_secs(75))
    .workers(workers)
    .shutdown_timeout(config.shutdown_timeout_seconds);

    server = server.bind(&config.listen_addr)?;

    match load_rustls_config(&config)? {
        Some(tls_config) => {
            info!("tls enabled on {}", config.tls_listen_addr);
            server = server.bind_rustls(&config.tls_listen_addr, tls_config)?;
        }
        None => info!("tls is disabled (http only)"),
    }

    server.run().await?;

    let timeout = Duration::from_secs(config.shutdown_timeout_seconds);
    if !cache.drain(timeout).await {
        warn!("background cache writes still running after {}s, dropping them", timeout.as_secs());
    }
    info!("streamgate stopped");
    Ok(())
}
