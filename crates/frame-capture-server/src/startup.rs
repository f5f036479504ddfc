//! Actix server startup + app wiring.
//!
//! Resolves configuration, builds the shared state, and mounts the capture
//! socket, inspection routes, and OpenAPI endpoints.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::task::{Context, Poll};

use actix_web::dev::{Service, ServiceRequest, ServiceResponse};
use actix_web::{App, Error, HttpServer, web};
use anyhow::{Context as _, Result};
use futures_util::future::{LocalBoxFuture, Ready, ok};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api;
use crate::assembler::FfmpegAssembler;
use crate::config::{self, CaptureConfig};
use crate::openapi;
use crate::session_registry::SessionRegistry;
use crate::state::AppState;

/// Build server state and start the Actix HTTP server.
pub(crate) async fn run(args: crate::Args) -> Result<()> {
    let cfg = load_config(args.config.as_ref())?;
    let capture = resolve_capture_config(&args, &cfg)?;
    std::fs::create_dir_all(&capture.output_dir)
        .with_context(|| format!("create output dir {:?}", capture.output_dir))?;
    tracing::info!(
        bind = %capture.bind,
        output_dir = %capture.output_dir.display(),
        max_frame_bytes = capture.max_frame_bytes,
        ffmpeg = %capture.encoder.ffmpeg_path.display(),
        probe_dimensions = capture.encoder.probe_dimensions,
        "starting frame-capture-server"
    );

    let bind = capture.bind;
    let config = Arc::new(capture);
    let assembler = Arc::new(FfmpegAssembler::new(config.encoder.clone()));
    let state = web::Data::new(AppState::new(config, SessionRegistry::new(), assembler));
    setup_shutdown();

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(FilteredLogger)
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-doc/openapi.json", openapi::ApiDoc::openapi()),
            )
            .service(api::capture_ws)
            .service(api::health::health)
            .service(api::sessions_list)
            .service(api::sessions_get)
    })
    .bind(bind)?
    .run()
    .await?;

    Ok(())
}

/// How a finished request is logged.
#[derive(Debug, PartialEq, Eq)]
enum RequestLog {
    Skip,
    Http,
    /// Websocket upgrade; logged with the session id it opened.
    CaptureUpgrade,
}

fn request_log_for(path: &str) -> RequestLog {
    match path {
        "/health" => RequestLog::Skip,
        "/capture/ws" => RequestLog::CaptureUpgrade,
        _ => RequestLog::Http,
    }
}

/// Actix middleware that logs requests, tagging capture upgrades with their
/// session id and skipping health polls.
struct FilteredLogger;

impl<S, B> actix_web::dev::Transform<S, ServiceRequest> for FilteredLogger
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = FilteredLoggerMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(FilteredLoggerMiddleware { service })
    }
}

struct FilteredLoggerMiddleware<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for FilteredLoggerMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&self, ctx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(ctx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let path = req.path().to_string();
        let kind = request_log_for(&path);
        let method = req.method().clone();
        let peer = req
            .connection_info()
            .realip_remote_addr()
            .unwrap_or("-")
            .to_string();
        let start = std::time::Instant::now();
        let fut = self.service.call(req);
        Box::pin(async move {
            let res = fut.await?;
            match kind {
                RequestLog::Skip => {}
                RequestLog::Http => tracing::info!(
                    method = %method,
                    path = %path,
                    status = %res.status().as_u16(),
                    peer = %peer,
                    elapsed_ms = %start.elapsed().as_millis(),
                    "http request"
                ),
                RequestLog::CaptureUpgrade => {
                    let session_id = res
                        .headers()
                        .get(api::capture::CAPTURE_SESSION_HEADER)
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("-");
                    tracing::info!(
                        session_id,
                        status = %res.status().as_u16(),
                        peer = %peer,
                        "capture socket upgrade"
                    );
                }
            }
            Ok(res)
        })
    }
}

/// Load server config from `--config`, a `config.toml` next to the binary,
/// or fall back to defaults.
fn load_config(path: Option<&PathBuf>) -> Result<config::ServerConfig> {
    if let Some(path) = path {
        return config::ServerConfig::load(path);
    }
    let auto_path = std::env::current_exe()
        .ok()
        .and_then(|path| path.parent().map(|dir| dir.join("config.toml")));
    match auto_path {
        Some(path) if path.exists() => {
            tracing::info!(path = %path.display(), "using config next to executable");
            config::ServerConfig::load(&path)
        }
        _ => {
            tracing::info!("no config file; using defaults");
            Ok(config::ServerConfig::default())
        }
    }
}

/// Resolve the final bind address from args + config.
fn resolve_bind(
    bind: Option<SocketAddr>,
    port: Option<u16>,
    cfg: &config::ServerConfig,
) -> Result<SocketAddr> {
    if let Some(addr) = bind {
        return Ok(addr);
    }
    if let Some(port) = port {
        return Ok(SocketAddr::from(([0, 0, 0, 0], port)));
    }
    match config::bind_from_config(cfg)? {
        Some(addr) => Ok(addr),
        None => config::DEFAULT_BIND
            .parse()
            .with_context(|| format!("parse default bind {}", config::DEFAULT_BIND)),
    }
}

/// Merge CLI overrides with the config file.
fn resolve_capture_config(args: &crate::Args, cfg: &config::ServerConfig) -> Result<CaptureConfig> {
    Ok(CaptureConfig {
        bind: resolve_bind(args.bind, args.port, cfg)?,
        output_dir: args
            .output_dir
            .clone()
            .unwrap_or_else(|| config::output_dir_from_config(cfg)),
        max_frame_bytes: config::max_frame_bytes_from_config(cfg)?,
        encoder: config::encoder_from_config(cfg)?,
    })
}

/// Install Ctrl+C handler that stops the actix system.
fn setup_shutdown() {
    let _ = ctrlc::set_handler(move || {
        tracing::info!("shutdown requested");
        if let Some(system) = actix_web::rt::System::try_current() {
            system.stop();
        } else {
            std::process::exit(0);
        }
    });
}
