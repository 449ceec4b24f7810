use std::path::{Path, PathBuf};

pub const BRIGADE_DIR: &str = ".brigade";
pub const CONFIG_FILE: &str = ".brigade/config.yaml";
pub const TEMPLATES_FILE: &str = ".brigade/templates.yaml";
pub const RECIPES_FILE: &str = ".brigade/recipes.yaml";
pub const RUNS_DB: &str = ".brigade/runs.db";

pub fn brigade_dir(root: &Path) -> PathBuf {
    root.join(BRIGADE_DIR)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn templates_path(root: &Path) -> PathBuf {
    root.join(TEMPLATES_FILE)
}

pub fn recipes_path(root: &Path) -> PathBuf {
    root.join(RECIPES_FILE)
}

pub fn runs_db_path(root: &Path) -> PathBuf {
    root.join(RUNS_DB)
}
