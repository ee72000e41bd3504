//! Boot sequence: open the store, register modules, migrate, serve.

use anyhow::Context;
use axum::Router;
use stacks_db::Database;
use stacks_kernel::{settings::Settings, InitCtx, ModuleRegistry};

use crate::modules;

/// A booted application: migrated store plus started modules.
pub struct App {
    pub db: Database,
    pub registry: ModuleRegistry,
    settings: Settings,
}

impl App {
    /// Register every module, then init, migrate and start them in order.
    pub async fn boot(settings: &Settings) -> anyhow::Result<Self> {
        let db = Database::open(settings.database.name.clone());
        let mut registry = ModuleRegistry::new();
        modules::register_all(&mut registry, &db, settings);

        let ctx = InitCtx {
            settings,
            db: &db,
        };
        registry
            .init_core_modules(&ctx)
            .await
            .context("core module init failed")?;
        registry
            .init_custom_modules(&ctx)
            .await
            .context("custom module init failed")?;

        let applied = registry.run_migrations(&db)?;
        tracing::info!(
            applied,
            core = registry.core_module_count(),
            custom = registry.custom_module_count(),
            "modules registered"
        );

        registry
            .start_core_modules(&ctx)
            .await
            .context("core module start failed")?;
        registry
            .start_custom_modules(&ctx)
            .await
            .context("custom module start failed")?;

        Ok(Self {
            db,
            registry,
            settings: settings.clone(),
        })
    }

    pub fn router(&self) -> Router {
        stacks_http::build_router(&self.registry, &self.settings)
    }

    /// Stop custom modules before the core modules they depend on.
    pub async fn shutdown(&self) -> anyhow::Result<()> {
        self.registry.stop_custom_modules().await?;
        self.registry.stop_core_modules().await?;
        tracing::info!(locked_rows = self.db.locked_rows(), "application stopped");
        Ok(())
    }
}

/// Boot and serve until shutdown is requested.
pub async fn run(settings: Settings) -> anyhow::Result<()> {
    let app = App::boot(&settings).await?;
    stacks_http::start_server(&app.registry, &settings).await?;
    app.shutdown().await
}
