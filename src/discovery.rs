//! Template discovery and parallel cache warm-up.

use rayon::prelude::*;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::compile::Compiler;
use crate::component::ComponentDefinition;

#[derive(Debug, Default)]
pub struct WarmReport {
    pub compiled: usize,
    pub failed: Vec<(PathBuf, String)>,
}

/// Recursively find template files with the given extension, sorted by path.
pub fn discover_templates(dir: &Path, extension: &str) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(Result::ok)
        .map(|entry| entry.into_path())
        .filter(|path| path.is_file() && path.extension().map_or(false, |ext| ext == extension))
        .collect();
    files.sort();
    files
}

/// Compiles every template under `dir` so later compiles hit the cache. Each file is
/// compiled independently; one failure never stops the others.
pub fn warm_cache(compiler: &Compiler, dir: &Path) -> WarmReport {
    let files = discover_templates(dir, &compiler.options().template_extension);
    tracing::debug!(dir = %dir.display(), files = files.len(), "warming compile cache");

    let results: Vec<(PathBuf, Result<(), String>)> = files
        .par_iter()
        .map(|path| {
            let name = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_string();
            let definition = ComponentDefinition::new(name);
            let result = compiler
                .compile_file(path, Some(&definition))
                .map(|_| ())
                .map_err(|e| e.to_string());
            (path.clone(), result)
        })
        .collect();

    let mut report = WarmReport::default();
    for (path, result) in results {
        match result {
            Ok(()) => report.compiled += 1,
            Err(message) => {
                tracing::warn!(path = %path.display(), error = %message, "failed to compile template");
                report.failed.push((path, message));
            }
        }
    }
    report
}
