use std::path::{Path, PathBuf};
use tracing::debug;

/// Co-located index paths for a local primary file, in the order they are tried.
pub fn index_candidates(path: &Path, suffixes: &[&str]) -> Vec<PathBuf> {
    let mut candidates = Vec::with_capacity(suffixes.len() * 2);
    for idx_ext in suffixes {
        // Appended (file.bam.bai) before replaced (file.bai)
        candidates.push(PathBuf::from(format!("{}.{}", path.display(), idx_ext)));
        if path.extension().is_some() {
            candidates.push(path.with_extension(idx_ext));
        }
    }
    candidates
}

/// Find the first existing co-located index.
pub fn find_index(path: &Path, suffixes: &[&str]) -> Option<PathBuf> {
    let found = index_candidates(path, suffixes)
        .into_iter()
        .find(|candidate| candidate.is_file());
    if let Some(index) = &found {
        debug!(primary = %path.display(), index = %index.display(), "found local index");
    }
    found
}
