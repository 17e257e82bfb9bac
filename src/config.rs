use std::path::PathBuf;

/// Configuration for building and opening a catalogue.
#[derive(Debug, Clone)]
pub struct CatalogConfig {
    /// Directory containing the delimited text inputs (default: entrada/)
    pub input_dir: PathBuf,

    /// Directory for the persisted catalogue and query outputs (default: saida/)
    pub output_dir: PathBuf,

    /// File name of the accounts input (default: users-g3.csv)
    pub accounts_file: String,

    /// File name of the commits input (default: commits-g3.csv)
    pub commits_file: String,

    /// File name of the repositories input (default: repos-g3.csv)
    pub repos_file: String,

    /// Number of 1024-byte frames held by the block cache (default: 2^20, ~1 GiB)
    pub cache_frames: usize,

    /// Maximum entries per in-memory sort run (default: 2^23, 128 MiB of entries)
    pub sort_run_entries: usize,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("entrada"),
            output_dir: PathBuf::from("saida"),
            accounts_file: "users-g3.csv".to_string(),
            commits_file: "commits-g3.csv".to_string(),
            repos_file: "repos-g3.csv".to_string(),
            cache_frames: 1 << 20,
            sort_run_entries: 1 << 23,
        }
    }
}

impl CatalogConfig {
    /// Create a new config with the given input and output directories
    pub fn new(input_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            input_dir: input_dir.into(),
            output_dir: output_dir.into(),
            ..Default::default()
        }
    }

    /// Set the accounts input file name
    pub fn accounts_file(mut self, name: impl Into<String>) -> Self {
        self.accounts_file = name.into();
        self
    }

    /// Set the commits input file name
    pub fn commits_file(mut self, name: impl Into<String>) -> Self {
        self.commits_file = name.into();
        self
    }

    /// Set the repositories input file name
    pub fn repos_file(mut self, name: impl Into<String>) -> Self {
        self.repos_file = name.into();
        self
    }

    /// Set the number of cache frames
    pub fn cache_frames(mut self, frames: usize) -> Self {
        self.cache_frames = frames;
        self
    }

    /// Set the maximum entries per sort run
    pub fn sort_run_entries(mut self, entries: usize) -> Self {
        self.sort_run_entries = entries;
        self
    }

    pub(crate) fn input_path(&self, name: &str) -> PathBuf {
        self.input_dir.join(name)
    }

    pub(crate) fn output_path(&self, name: &str) -> PathBuf {
        self.output_dir.join(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CatalogConfig::default();
        assert_eq!(config.input_dir, PathBuf::from("entrada"));
        assert_eq!(config.output_dir, PathBuf::from("saida"));
        assert_eq!(config.cache_frames, 1 << 20);
        assert_eq!(config.sort_run_entries, 1 << 23);
    }

    #[test]
    fn test_config_builder() {
        let config = CatalogConfig::new("/tmp/in", "/tmp/out")
            .accounts_file("users.csv")
            .cache_frames(64)
            .sort_run_entries(1024);

        assert_eq!(config.input_dir, PathBuf::from("/tmp/in"));
        assert_eq!(config.accounts_file, "users.csv");
        assert_eq!(config.cache_frames, 64);
        assert_eq!(config.sort_run_entries, 1024);
        assert_eq!(config.input_path("users.csv"), PathBuf::from("/tmp/in/users.csv"));
    }
}
