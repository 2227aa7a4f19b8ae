use std::io::ErrorKind;
use std::path::PathBuf;
use tokio::fs;

/// Page used when the document root has no index file of its own.
pub const DEFAULT_INDEX: &str = include_str!("../templates/index.html");

#[derive(Clone, Debug)]
pub struct DocumentRoot {
    root: PathBuf,
    index_file: String,
}

impl DocumentRoot {
    /// Create a new DocumentRoot for the web server.
    /// `root` is the directory searched for page templates, and
    /// `index_file` is the query page inside it (e.g., "index.html").
    pub fn new(root: PathBuf, index_file: String) -> Self {
        Self { root, index_file }
    }

    /// Returns the full path to the index document under the document root.
    pub fn index_path(&self) -> PathBuf {
        self.root.join(&self.index_file)
    }

    /// Read the index template, falling back to the built-in page if the file is absent.
    pub async fn read_index(&self) -> std::io::Result<String> {
        match fs::read_to_string(self.index_path()).await {
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(DEFAULT_INDEX.to_string()),
            res => res,
        }
    }
}
