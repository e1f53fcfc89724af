use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use triplegate::protocol::TransportServer;
use triplegate::sparql::SparqlHttpEndpoint;
use triplegate::{BackendRegistry, Config};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(2);
        }
    };

    println!("triplegate server v{}", triplegate::version());
    println!("==========================================");

    if let Err(e) = run(config).await {
        error!("server error: {}", e);
        eprintln!("Server error: {}", e);
        std::process::exit(1);
    }
}

fn load_config() -> triplegate::Result<Config> {
    let path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("TRIPLEGATE_CONFIG").ok());
    match path {
        Some(path) => {
            info!("loading configuration from {}", path);
            Config::load(path)
        }
        None => Ok(Config::default()),
    }
}

async fn run(config: Config) -> triplegate::Result<()> {
    let registry = BackendRegistry::with_defaults();
    let backend = registry.get(&config.backend.name).cloned();
    let model = registry.create_model(&config.backend.name, &config.backend.settings)?;
    let features = backend.map(|b| b.supported_features().bits()).unwrap_or_default();

    if let Some(endpoint) = &config.endpoint {
        let endpoint_server = SparqlHttpEndpoint::new(Arc::clone(&model));
        let (address, port) = (endpoint.address.clone(), endpoint.port);
        tokio::spawn(async move {
            if let Err(e) = endpoint_server.start(&address, port).await {
                error!("SPARQL endpoint stopped: {}", e);
            }
        });
    }

    let server = TransportServer::new(config.server.clone(), model).with_features(features);
    println!(
        "Backend '{}' ready, transport on {}:{}. Press Ctrl+C to stop.",
        config.backend.name, config.server.address, config.server.port
    );

    tokio::select! {
        result = server.start() => result,
        _ = tokio::signal::ctrl_c() => {
            info!("shutting down");
            Ok(())
        }
    }
}
