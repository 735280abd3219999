use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use catcorr::{exchange, Correlator, CorrelatorConfig};

const USAGE: &str = "usage: catcorr <config.yml> <catalogue-a> <catalogue-b> <matched-a> <matched-b>";

fn main() -> Result<()> {
    let args: Vec<PathBuf> = std::env::args_os().skip(1).map(PathBuf::from).collect();
    let [config_path, path_a, path_b, out_a, out_b] = args.as_slice() else {
        bail!("{USAGE}");
    };

    common::log_setup::setup_logging("catcorr", "info", Path::new("logs"))?;

    let config = CorrelatorConfig::from_yaml_file(config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;
    let catalogue_a = exchange::read_catalogue(path_a)
        .with_context(|| format!("Failed to read {}", path_a.display()))?;
    let catalogue_b = exchange::read_catalogue(path_b)
        .with_context(|| format!("Failed to read {}", path_b.display()))?;

    let correlator = Correlator::from_config(&config, catalogue_a, catalogue_b)?;
    let (matched_a, matched_b) = correlator.correlate()?;

    let (mag_a, mag_b) = correlator.magnitude_types();
    exchange::write_catalogue(out_a, &matched_a, mag_a)
        .with_context(|| format!("Failed to write {}", out_a.display()))?;
    exchange::write_catalogue(out_b, &matched_b, mag_b)
        .with_context(|| format!("Failed to write {}", out_b.display()))?;

    tracing::info!(
        "Wrote {} matched pairs to {} and {}",
        matched_a.len(),
        out_a.display(),
        out_b.display()
    );
    Ok(())
}
