use anyhow::Context;
use brigade_core::{
    config::BrigadeConfig,
    paths,
    recipe::RecipeBook,
    store::{templates, FileRepository},
};
use std::path::Path;

pub fn run(root: &Path) -> anyhow::Result<()> {
    println!("Initializing brigade in: {}", root.display());

    let dir = paths::brigade_dir(root);
    std::fs::create_dir_all(&dir).with_context(|| format!("failed to create {}", dir.display()))?;

    // 1. Engine config
    if paths::config_path(root).exists() {
        println!("  exists:  {}", paths::CONFIG_FILE);
    } else {
        BrigadeConfig::default()
            .save(root)
            .context("failed to write config.yaml")?;
        println!("  created: {}", paths::CONFIG_FILE);
    }

    // 2. Scenario templates
    if paths::templates_path(root).exists() {
        println!("  exists:  {}", paths::TEMPLATES_FILE);
    } else {
        templates::save_templates(root, &templates::default_templates())
            .context("failed to write templates.yaml")?;
        println!("  created: {}", paths::TEMPLATES_FILE);
    }

    // 3. Recipe book
    if paths::recipes_path(root).exists() {
        println!("  exists:  {}", paths::RECIPES_FILE);
    } else {
        RecipeBook::sample()
            .save(root)
            .context("failed to write recipes.yaml")?;
        println!("  created: {}", paths::RECIPES_FILE);
    }

    // 4. Run store
    FileRepository::open(root).context("failed to open run store")?;
    println!("  ready:   {}", paths::RUNS_DB);

    println!("\nbrigade initialized. Next: brigade run --template basic-cooking");
    Ok(())
}
