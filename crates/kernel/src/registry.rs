use anyhow::Context;
use std::sync::Arc;

use stacks_db::Database;

use crate::module::{InitCtx, Migration, Module};

/// Core module initialization order. Core modules own the reference
/// tables that custom modules point into.
const CORE_MODULE_ORDER: &[&str] = &[
    "users",  // Book owners
    "genres", // Seeded genre catalog
];

/// Module registry for managing module lifecycle with core/custom separation
pub struct ModuleRegistry {
    core_modules: Vec<Arc<dyn Module>>,
    custom_modules: Vec<Arc<dyn Module>>,
}

impl ModuleRegistry {
    /// Create a new module registry
    pub fn new() -> Self {
        Self {
            core_modules: Vec::new(),
            custom_modules: Vec::new(),
        }
    }

    /// Register a core module with the registry
    pub fn register_core(&mut self, module: Arc<dyn Module>) {
        self.core_modules.push(module);
    }

    /// Register a custom module with the registry
    pub fn register_custom(&mut self, module: Arc<dyn Module>) {
        self.custom_modules.push(module);
    }

    /// Get all registered modules (core in initialization order, then custom)
    pub fn modules(&self) -> Vec<&Arc<dyn Module>> {
        let mut all_modules: Vec<&Arc<dyn Module>> = self.ordered_core().collect();
        all_modules.extend(self.custom_modules.iter());
        all_modules
    }

    /// Get a module by name (searches both core and custom modules)
    pub fn get_module(&self, name: &str) -> Option<&Arc<dyn Module>> {
        self.core_modules
            .iter()
            .find(|module| module.name() == name)
            .or_else(|| {
                self.custom_modules
                    .iter()
                    .find(|module| module.name() == name)
            })
    }

    /// Get the number of core modules
    pub fn core_module_count(&self) -> usize {
        self.core_modules.len()
    }

    /// Get the number of custom modules
    pub fn custom_module_count(&self) -> usize {
        self.custom_modules.len()
    }

    fn ordered_core(&self) -> impl Iterator<Item = &Arc<dyn Module>> {
        CORE_MODULE_ORDER.iter().filter_map(|&name| {
            self.core_modules
                .iter()
                .find(|module| module.name() == name)
        })
    }

    /// Initialize core modules in the correct order
    pub async fn init_core_modules(&self, ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        tracing::info!(
            "initializing core modules in order: {:?}",
            CORE_MODULE_ORDER
        );

        for module in self.ordered_core() {
            tracing::info!(module = module.name(), "initializing core module");

            module.init(ctx).await.with_context(|| {
                format!("failed to initialize core module '{}'", module.name())
            })?;
        }

        Ok(())
    }

    /// Initialize custom modules
    pub async fn init_custom_modules(&self, ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        tracing::info!("initializing {} custom modules", self.custom_modules.len());

        for module in &self.custom_modules {
            tracing::info!(module = module.name(), "initializing custom module");

            module.init(ctx).await.with_context(|| {
                format!("failed to initialize custom module '{}'", module.name())
            })?;
        }

        Ok(())
    }

    /// Start core modules in the correct order
    pub async fn start_core_modules(&self, ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        tracing::info!("starting core modules in order: {:?}", CORE_MODULE_ORDER);

        for module in self.ordered_core() {
            tracing::info!(module = module.name(), "starting core module");

            module
                .start(ctx)
                .await
                .with_context(|| format!("failed to start core module '{}'", module.name()))?;
        }

        Ok(())
    }

    /// Start custom modules
    pub async fn start_custom_modules(&self, ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        tracing::info!("starting {} custom modules", self.custom_modules.len());

        for module in &self.custom_modules {
            tracing::info!(module = module.name(), "starting custom module");

            module
                .start(ctx)
                .await
                .with_context(|| format!("failed to start custom module '{}'", module.name()))?;
        }

        Ok(())
    }

    /// Stop custom modules first (reverse order)
    pub async fn stop_custom_modules(&self) -> anyhow::Result<()> {
        tracing::info!("stopping {} custom modules", self.custom_modules.len());

        for module in self.custom_modules.iter().rev() {
            tracing::info!(module = module.name(), "stopping custom module");

            module
                .stop()
                .await
                .with_context(|| format!("failed to stop custom module '{}'", module.name()))?;
        }

        Ok(())
    }

    /// Stop core modules in reverse order
    pub async fn stop_core_modules(&self) -> anyhow::Result<()> {
        tracing::info!("stopping core modules in reverse order");

        let core: Vec<_> = self.ordered_core().collect();
        for module in core.into_iter().rev() {
            tracing::info!(module = module.name(), "stopping core module");

            module
                .stop()
                .await
                .with_context(|| format!("failed to stop core module '{}'", module.name()))?;
        }

        Ok(())
    }

    /// Collect all migrations, core modules first, each module's in the
    /// order it returns them
    pub fn collect_migrations(&self) -> Vec<(String, Migration)> {
        self.modules()
            .into_iter()
            .flat_map(|module| {
                let name = module.name().to_string();
                module
                    .migrations()
                    .into_iter()
                    .map(move |migration| (name.clone(), migration))
            })
            .collect()
    }

    /// Apply every pending migration against the store.
    ///
    /// Already-applied migrations are skipped, so this is safe to call on
    /// every boot. Returns the number of migrations that ran.
    pub fn run_migrations(&self, db: &Database) -> anyhow::Result<usize> {
        let mut applied = 0;
        for (module, migration) in self.collect_migrations() {
            let ran = db
                .apply_migration(&module, migration.id, migration.up)
                .with_context(|| format!("migration '{}/{}' failed", module, migration.id))?;
            if ran {
                applied += 1;
            }
        }

        tracing::info!(applied, "migrations complete");
        Ok(applied)
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Settings;
    use stacks_db::IsolationLevel;

    struct TestModule {
        name: &'static str,
    }

    fn seed_genre(db: &Database) -> anyhow::Result<()> {
        let mut txn = db.begin(IsolationLevel::ReadCommitted);
        txn.insert_genre("Fiction")?;
        txn.commit()?;
        Ok(())
    }

    #[async_trait::async_trait]
    impl Module for TestModule {
        fn name(&self) -> &'static str {
            self.name
        }

        fn migrations(&self) -> Vec<Migration> {
            vec![Migration {
                id: "001_init",
                up: seed_genre,
            }]
        }
    }

    #[test]
    fn test_module_registry_creation() {
        let registry = ModuleRegistry::new();
        assert!(registry.modules().is_empty()); // No modules registered yet
    }

    #[test]
    fn test_migration_collection() {
        let registry = ModuleRegistry::new();
        let migrations = registry.collect_migrations();
        assert!(migrations.is_empty()); // No modules registered yet
    }

    #[test]
    fn test_core_modules_follow_declared_order() {
        let mut registry = ModuleRegistry::new();
        registry.register_custom(Arc::new(TestModule { name: "books" }));
        registry.register_core(Arc::new(TestModule { name: "genres" }));
        registry.register_core(Arc::new(TestModule { name: "users" }));

        let names: Vec<_> = registry.modules().iter().map(|m| m.name()).collect();
        assert_eq!(names, vec!["users", "genres", "books"]);

        let migrations: Vec<_> = registry
            .collect_migrations()
            .into_iter()
            .map(|(module, migration)| format!("{module}/{}", migration.id))
            .collect();
        assert_eq!(
            migrations,
            vec!["users/001_init", "genres/001_init", "books/001_init"]
        );
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let mut registry = ModuleRegistry::new();
        registry.register_core(Arc::new(TestModule { name: "genres" }));
        let db = Database::open("test");

        assert_eq!(registry.run_migrations(&db).unwrap(), 1);
        assert_eq!(registry.run_migrations(&db).unwrap(), 0);
        assert_eq!(db.genres().len(), 1);
    }

    #[tokio::test]
    async fn test_module_lifecycle() {
        let mut registry = ModuleRegistry::new();
        let settings = Settings::default();
        let db = Database::open("test");
        let ctx = InitCtx {
            settings: &settings,
            db: &db,
        };

        // Register a test module
        let test_module = Arc::new(TestModule { name: "test" });
        registry.register_custom(test_module);

        // These should not fail with the test module
        registry.init_core_modules(&ctx).await.unwrap();
        registry.init_custom_modules(&ctx).await.unwrap();
        registry.start_core_modules(&ctx).await.unwrap();
        registry.start_custom_modules(&ctx).await.unwrap();
        registry.stop_custom_modules().await.unwrap();
        registry.stop_core_modules().await.unwrap();
    }
}
