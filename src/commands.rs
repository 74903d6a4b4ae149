use std::sync::Arc;
use tracing::{info, warn};

use molnus::api::{self, models::FetchResponse};
use molnus::config::Config;
use molnus::observability::Metrics;
use molnus::registry::{EntryRegistry, FetchTrigger};

use crate::cli::{ConfigArgs, FetchArgs, ServeArgs};

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

fn load_config(args: &ConfigArgs) -> Result<Config, AnyError> {
    let config = match &args.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };
    Ok(config)
}

pub async fn serve(args: ServeArgs) -> Result<(), AnyError> {
    let config = load_config(&args.config)?;
    let address = args.address.unwrap_or(config.server.bind_addr);
    api::run(config, address).await
}

pub async fn fetch(args: FetchArgs) -> Result<(), AnyError> {
    let config = load_config(&args.config)?;
    let registry = EntryRegistry::from_config(&config, Arc::new(Metrics::new()))?;

    let trigger = FetchTrigger {
        entry_id: args.entry,
        camera_id: args.camera,
        offset: args.offset,
        limit: args.limit,
        wildlife_required: args.wildlife_required,
    };
    let (entry, request) = registry.resolve_trigger(&trigger)?;
    let camera_id = request.camera_id.clone();

    let result = entry
        .coordinator()
        .run_cycle(request)
        .await
        .map_err(|e| e.user_message())?;

    let response = FetchResponse {
        entry_id: entry.id().to_string(),
        camera_id,
        result,
    };
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

/// Validate, then log in once per entry
pub async fn check(args: ConfigArgs) -> Result<(), AnyError> {
    let config = load_config(&args)?;
    let registry = EntryRegistry::from_config(&config, Arc::new(Metrics::new()))?;
    info!(entries = registry.len(), "Configuration valid");

    let mut failed = Vec::new();
    for entry in registry.iter() {
        match entry.session().login().await {
            Ok(credential) => {
                let expiry = credential
                    .expires_at()
                    .map(|at| at.to_rfc3339())
                    .unwrap_or_else(|| "unknown".to_string());
                println!("{}: login ok (token expires {expiry})", entry.id());
            }
            Err(e) => {
                warn!(entry_id = %entry.id(), error = %e, "Login check failed");
                println!("{}: login failed: {e}", entry.id());
                failed.push(entry.id().to_string());
            }
        }
    }

    if failed.is_empty() {
        Ok(())
    } else {
        Err(format!("login failed for: {}", failed.join(", ")).into())
    }
}
