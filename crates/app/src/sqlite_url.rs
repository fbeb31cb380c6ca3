use std::path::{Path, PathBuf};

use anyhow::{Context, bail};

const MEMORY_URL: &str = "sqlite::memory:";

/// Turn a bare path or `sqlite:` path into an absolute `sqlite://` URL.
/// In-memory and already-absolute URLs pass through.
pub fn normalize(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed == MEMORY_URL || trimmed.starts_with("sqlite://") || is_memory_uri(trimmed) {
        return trimmed.to_owned();
    }

    let path = Path::new(trimmed.strip_prefix("sqlite:").unwrap_or(trimmed));
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

/// Create the database file and its parent directories so the first
/// connection does not fail on a fresh checkout.
pub fn prepare_file(db_url: &str) -> anyhow::Result<()> {
    if db_url == MEMORY_URL || is_memory_uri(db_url) {
        return Ok(());
    }

    let Some(path) = db_url.strip_prefix("sqlite://") else {
        bail!("invalid database url: {db_url}");
    };
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        bail!("invalid database url: {db_url}");
    }

    let path = Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)
            .with_context(|| format!("creating {}", path.display()))?;
    }
    Ok(())
}

fn is_memory_uri(url: &str) -> bool {
    url.starts_with("sqlite:file:") && url.contains("mode=memory")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_urls_pass_through() {
        assert_eq!(normalize("sqlite::memory:"), "sqlite::memory:");
        let shared = "sqlite:file:demo?mode=memory&cache=shared";
        assert_eq!(normalize(shared), shared);
        assert!(prepare_file(shared).is_ok());
    }

    #[test]
    fn relative_paths_become_absolute() {
        let url = normalize("sqlite:data/dev.sqlite3");
        assert!(url.starts_with("sqlite:///"));
        assert!(url.ends_with("data/dev.sqlite3"));
        assert_eq!(normalize("sqlite:///tmp/x.db"), "sqlite:///tmp/x.db");
    }

    #[test]
    fn prepare_rejects_unknown_schemes() {
        assert!(prepare_file("postgres://localhost/db").is_err());
        assert!(prepare_file("sqlite://").is_err());
    }
}
