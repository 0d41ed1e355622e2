pub mod toml_loader;

pub use toml_loader::{load_all_plan_files, load_level_plan, load_plan_table};
