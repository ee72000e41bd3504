pub mod books;
pub mod genres;
pub mod users;

use stacks_db::Database;
use stacks_kernel::{settings::Settings, ModuleRegistry};

/// Register all project-specific modules with the registry
pub fn register_all(registry: &mut ModuleRegistry, db: &Database, settings: &Settings) {
    registry.register_core(users::create_module(db.clone()));
    registry.register_core(genres::create_module(
        db.clone(),
        settings.database.seed_genres,
    ));
    registry.register_custom(books::create_module(db.clone()));
}
