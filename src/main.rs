use pingora::services::{background::background_service, listening::Service};
use pingora_core::server::{configuration::Opt, Server};
use sentry::IntoDsn;

use lanebridge::{
    config::{Config, Prometheus, Sentry, Status},
    core::{BridgeContainer, Readiness},
    logging,
    service::{http::GatewayHttpApp, status::StatusHttpApp},
};

const BRIDGE_SERVICE: &str = "lanebridge";

fn main() {
    // Load configuration and command-line arguments
    let opt = Opt::parse_args();
    let config = match Config::load_yaml_with_opt_override(&opt) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    // Initialize logging
    let logger = logging::init(config.log.as_ref());

    let container = match BridgeContainer::from_config(&config) {
        Ok(container) => container,
        Err(e) => {
            log::error!("Failed to build bridge components: {e}");
            std::process::exit(1);
        }
    };

    // The topology must exist before any lane starts consuming
    log::info!("Declaring broker topology...");
    let declared = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| e.to_string())
        .and_then(|rt| {
            rt.block_on(container.declare_topology())
                .map_err(|e| e.to_string())
        });
    if let Err(e) = declared {
        log::error!("Failed to declare broker topology: {e}");
        std::process::exit(1);
    }

    let mut server = Server::new_with_opt_and_conf(Some(opt), config.pingora);

    if let Some(log_service) = logger {
        log::info!("Adding log sync service...");
        server.add_service(log_service);
    }

    add_optional_services(
        &mut server,
        config.sentry.as_ref(),
        config.status.as_ref(),
        config.prometheus.as_ref(),
        container.readiness(),
    );

    log::info!("Bootstrapping...");
    server.bootstrap();
    log::info!("Bootstrapped. Adding Services...");

    server.add_service(background_service(
        "knowledge lane",
        container.knowledge_consumer(),
    ));
    server.add_service(background_service(
        "action lane",
        container.action_consumer(),
    ));
    server.add_service(background_service(
        "correlation reaper",
        container.reaper(),
    ));

    log::info!("Adding gateway listener on {}...", config.gateway.address);
    server.add_service(GatewayHttpApp::gateway_http_service(
        &config.gateway,
        container.orchestrator(),
    ));

    log::info!("Starting {BRIDGE_SERVICE}...");
    server.run_forever();
}

/// Add optional services (Sentry, Status, Prometheus)
fn add_optional_services(
    server: &mut Server,
    sentry_cfg: Option<&Sentry>,
    status_cfg: Option<&Status>,
    prometheus_cfg: Option<&Prometheus>,
    readiness: Readiness,
) {
    if let Some(sentry_cfg) = sentry_cfg {
        log::info!("Adding Sentry config...");
        match sentry_cfg.dsn.clone().into_dsn() {
            Ok(Some(dsn)) => {
                server.sentry = Some(sentry::ClientOptions {
                    dsn: Some(dsn),
                    ..Default::default()
                });
            }
            Ok(None) => log::warn!("Sentry DSN is empty or invalid, Sentry disabled."),
            Err(e) => log::error!("Error parsing Sentry DSN: {e}"),
        }
    }

    if let Some(status_cfg) = status_cfg {
        log::info!("Adding Status HTTP...");
        server.add_service(StatusHttpApp::status_http_service(status_cfg, readiness));
    }

    if let Some(prometheus_cfg) = prometheus_cfg {
        log::info!("Adding Prometheus HTTP...");
        let mut prometheus_service_http = Service::prometheus_http_service();
        prometheus_service_http.add_tcp(&prometheus_cfg.address.to_string());
        server.add_service(prometheus_service_http);
    }
}
