use std::path::Path;

use anyhow::{bail, Context, Result};
use node_image_builder::pipeline::runs;
use node_image_builder::{preflight, ImageManifest, Pipeline, PipelineConfig};

fn usage() -> &'static str {
    "Usage:\n  node-image-builder build <config.toml>\n  node-image-builder dockerfile <config.toml>\n  node-image-builder runs list <config.toml>\n  node-image-builder runs prune <config.toml> <keep>"
}

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    match args.as_slice() {
        [cmd, config] if cmd == "build" => build(Path::new(config)),
        [cmd, config] if cmd == "dockerfile" => print_dockerfile(Path::new(config)),
        [runs_cmd, list, config] if runs_cmd == "runs" && list == "list" => {
            runs_list(Path::new(config))
        }
        [runs_cmd, prune, config, keep] if runs_cmd == "runs" && prune == "prune" => {
            let keep: usize = keep
                .parse()
                .with_context(|| format!("invalid keep count '{}'", keep))?;
            runs_prune(Path::new(config), keep)
        }
        _ => bail!(usage()),
    }
}

fn build(config_path: &Path) -> Result<()> {
    let config = PipelineConfig::load(config_path)?;
    preflight::check_host_tools(config.image.engine)?;

    let outcome = Pipeline::new(config).run()?;
    println!(
        "[done] image {} from run {} (context: {})",
        outcome.image.tag,
        outcome.run_id,
        outcome.staged.dir.display()
    );
    Ok(())
}

fn print_dockerfile(config_path: &Path) -> Result<()> {
    let config = PipelineConfig::load(config_path)?;
    let manifest = ImageManifest::from_config(
        &config.image,
        config.source.binary_name(),
        &config.chain_spec.spec_file_name(),
    )?;
    print!("{}", node_image_builder::image::dockerfile::render(&manifest));
    Ok(())
}

fn runs_list(config_path: &Path) -> Result<()> {
    let config = PipelineConfig::load(config_path)?;
    let mut recorded = runs::load_runs_metadata(&config.runs.root)?;
    recorded.sort_by(|a, b| b.created_at_utc.cmp(&a.created_at_utc));

    if recorded.is_empty() {
        println!("no recorded runs under {}", config.runs.root.display());
        return Ok(());
    }
    let latest = runs::latest_successful_run_id(&config.runs.root)?;
    for run in recorded {
        let marker = if latest.as_deref() == Some(run.run_id.as_str()) {
            "  (latest successful)"
        } else {
            ""
        };
        println!(
            "{}  {}  {}  {}{}",
            run.run_id,
            run.status,
            run.state,
            run.finished_at_utc.as_deref().unwrap_or("-"),
            marker
        );
    }
    Ok(())
}

fn runs_prune(config_path: &Path, keep: usize) -> Result<()> {
    let config = PipelineConfig::load(config_path)?;
    runs::prune_old_runs(&config.runs.root, keep)?;
    println!("kept the newest {} runs", keep);
    Ok(())
}
