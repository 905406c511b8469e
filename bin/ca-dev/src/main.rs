//! Catalog Audit Development Binary
//!
//! Runs a short product scenario through the audited catalog and logs the
//! resulting audit trail:
//! - insert two products
//! - change a price
//! - delete a product

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};

use ca_config::{AppConfig, AuditConfig, ConfigLoader};
use ca_data::{
    CatalogContext, ExecutionContext, MemoryStore, Product, SaveError, SaveOptions, SqliteStore,
    Store, UnitOfWork,
};

#[derive(Parser, Debug)]
#[command(name = "ca-dev")]
#[command(about = "Catalog Audit development runner")]
struct Args {
    /// Configuration file (TOML)
    #[arg(long, env = "CATALOG_CONFIG")]
    config: Option<PathBuf>,

    /// Database URL, overrides the configuration file
    #[arg(long, env = "CATALOG_DATABASE_URL")]
    database_url: Option<String>,

    /// Store type: sqlite, memory
    #[arg(long, env = "CATALOG_STORE", default_value = "sqlite")]
    store: String,

    /// Username recorded in the audit trail
    #[arg(long, env = "CATALOG_ACTOR", default_value = "dev")]
    actor: String,

    /// Print an example configuration file and exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging (JSON if LOG_FORMAT=json, text otherwise)
    ca_common::logging::init_logging("ca-dev");

    let args = Args::parse();

    if args.print_config {
        println!("{}", AppConfig::example_toml());
        return Ok(());
    }

    let loader = match &args.config {
        Some(path) => ConfigLoader::with_path(path),
        None => ConfigLoader::new(),
    };
    let mut config = loader.load()?;
    if let Some(url) = args.database_url {
        config.database.url = url;
    }
    if config.dev_mode {
        info!("Development mode enabled");
    }

    let ctx = ExecutionContext::create(args.actor);
    info!(
        store = %args.store,
        actor = ctx.principal().unwrap_or("anonymous"),
        audit_enabled = config.audit.enabled,
        "Starting Catalog Audit dev runner"
    );

    match args.store.as_str() {
        "memory" => run_scenario(Arc::new(MemoryStore::new()), config.audit, &ctx).await,
        "sqlite" => {
            let store = SqliteStore::connect(&config.database).await?;
            if config.database.create_schema {
                store
                    .init_schema(&CatalogContext::<SqliteStore>::models())
                    .await?;
            }
            run_scenario(Arc::new(store), config.audit, &ctx).await
        }
        other => anyhow::bail!("Unknown store type: {} (expected sqlite or memory)", other),
    }
}

async fn run_scenario<S: Store + 'static>(
    store: Arc<S>,
    audit: AuditConfig,
    ctx: &ExecutionContext,
) -> Result<()> {
    let mut catalog = CatalogContext::new(store, audit);

    let widget = catalog.products().add(Product::new("Widget").with_price(9.99))?;
    let gadget = catalog.products().add(Product::new("Gadget").with_price(24.5))?;
    save(&mut catalog, ctx, "insert").await?;

    if let Some(product) = catalog.products().get_mut(widget) {
        product.price = 12.49;
    }
    save(&mut catalog, ctx, "update").await?;

    catalog.products().remove(gadget)?;
    save(&mut catalog, ctx, "delete").await?;

    let mut trail = catalog.audit_log().find_recent(100).await?;
    trail.reverse();
    for audit in &trail {
        info!(
            id = audit.id,
            table = %audit.table_name,
            action = %audit.action,
            username = audit.username.as_deref().unwrap_or("-"),
            key_values = %audit.key_values,
            old_values = audit.old_values.as_deref().unwrap_or("-"),
            new_values = audit.new_values.as_deref().unwrap_or("-"),
            "Audit row"
        );
    }
    info!(audit_rows = trail.len(), "Scenario complete");
    Ok(())
}

async fn save<S: Store + 'static>(
    catalog: &mut CatalogContext<S>,
    ctx: &ExecutionContext,
    step: &str,
) -> Result<()> {
    match catalog.save_changes(ctx, SaveOptions::default()).await {
        Ok(rows) => {
            info!(step, rows, "Saved changes");
            Ok(())
        }
        Err(e @ SaveError::AuditNotWritten { .. }) => {
            warn!(step, error = %e, "Changes saved without audit trail");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
