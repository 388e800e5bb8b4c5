use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use walkdir::WalkDir;

/// A partial read from disk.
#[derive(Debug, Clone)]
pub struct PartialFile {
    pub name: String,
    pub source: String,
}

/// Recursively reads every file under `dir` whose extension is `extension`
/// (with or without the leading dot), in file-name order.
pub fn load_dir(dir: &Path, extension: &str) -> Result<Vec<PartialFile>> {
    let extension = extension.trim_start_matches('.');
    if !dir.is_dir() {
        anyhow::bail!("Partial directory not found: {}", dir.display());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.with_context(|| format!("Failed to walk {}", dir.display()))?;
        let path = entry.path();
        if !path.is_file() || path.extension().is_none_or(|ext| ext != extension) {
            continue;
        }
        let source = fs::read_to_string(path)
            .with_context(|| format!("Failed to read partial: {}", path.display()))?;
        files.push(PartialFile {
            name: partial_name(dir, path)?,
            source,
        });
    }
    Ok(files)
}

/// `dir/layout/header.hbs` becomes `layout/header`.
fn partial_name(dir: &Path, path: &Path) -> Result<String> {
    let relative = path
        .strip_prefix(dir)
        .with_context(|| format!("{} is not under {}", path.display(), dir.display()))?
        .with_extension("");
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Ok(parts.join("/"))
}
