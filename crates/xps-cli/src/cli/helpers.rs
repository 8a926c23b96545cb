use super::CliError;
use anyhow::Context;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::Path;

/// On-disk spectrum format shared by every command: parallel energy and
/// intensity arrays in eV and arbitrary counts.
#[derive(Debug, Clone, Serialize, serde::Deserialize)]
pub(super) struct SpectrumFile {
    pub(super) energy: Vec<f64>,
    pub(super) intensity: Vec<f64>,
}

pub(super) fn read_spectrum(path: &Path) -> Result<SpectrumFile, CliError> {
    let spectrum: SpectrumFile = read_json(path)?;
    if spectrum.energy.len() != spectrum.intensity.len() {
        return Err(CliError::Usage(format!(
            "spectrum {} has {} energies but {} intensities",
            path.display(),
            spectrum.energy.len(),
            spectrum.intensity.len()
        )));
    }
    if spectrum.energy.len() < 2 {
        return Err(CliError::Usage(format!(
            "spectrum {} needs at least 2 samples",
            path.display()
        )));
    }
    Ok(spectrum)
}

pub(super) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, CliError> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let value = serde_json::from_str(&text)
        .with_context(|| format!("parsing {}", path.display()))?;
    Ok(value)
}

/// Writes pretty JSON to the given path (creating parent directories) or
/// to stdout when no path is given.
pub(super) fn write_json<T: Serialize>(value: &T, output: Option<&Path>) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)
        .context("serializing report")?;
    match output {
        Some(path) => {
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
            fs::write(path, rendered + "\n")
                .with_context(|| format!("writing {}", path.display()))?;
        }
        None => println!("{rendered}"),
    }
    Ok(())
}
