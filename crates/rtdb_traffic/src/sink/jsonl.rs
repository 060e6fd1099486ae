use std::path::{Path, PathBuf};

use tokio::{fs, fs::OpenOptions, io::AsyncWriteExt};

use super::{Destination, DynInsert, EventSink};
use crate::error::SinkError;
use crate::event::EventRow;

/// Appends batches as JSON lines to `<root>/<dataset>/<table>.jsonl`.
#[derive(Debug, Clone)]
pub struct JsonlDirSink {
    root: PathBuf,
}

impl JsonlDirSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn table_path(&self, destination: &Destination) -> PathBuf {
        self.root
            .join(&destination.dataset)
            .join(format!("{}.jsonl", destination.table))
    }
}

impl EventSink for JsonlDirSink {
    fn insert(&self, destination: Destination, rows: Vec<EventRow>) -> DynInsert {
        let path = self.table_path(&destination);
        Box::pin(async move { append_rows(&path, &rows).await })
    }
}

async fn append_rows(path: &Path, rows: &[EventRow]) -> Result<(), SinkError> {
    // One write per batch keeps concurrent deliveries from interleaving rows.
    let mut bytes = Vec::new();
    for row in rows {
        serde_json::to_writer(&mut bytes, row)?;
        bytes.push(b'\n');
    }

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .await
                .map_err(|source| SinkError::PrepareDirectory {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }
    }

    let write_err = |source| SinkError::Write {
        path: path.to_path_buf(),
        source,
    };
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(write_err)?;
    file.write_all(&bytes).await.map_err(write_err)?;
    file.flush().await.map_err(write_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Operation;

    fn row(path: &str, bytes: u64) -> EventRow {
        EventRow {
            op: Operation::Read,
            path: path.to_string(),
            bytes,
            time: 1.5,
            tag: Some("edge".to_string()),
        }
    }

    #[tokio::test]
    async fn batches_append_to_the_dated_table_file() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonlDirSink::new(dir.path());
        let destination = Destination {
            dataset: "traffic".to_string(),
            table: "raw2024315".to_string(),
        };

        sink.insert(destination.clone(), vec![row("/a", 1), row("/b", 2)])
            .await
            .unwrap();
        sink.insert(destination.clone(), vec![row("/c", 3)])
            .await
            .unwrap();

        let path = dir.path().join("traffic").join("raw2024315.jsonl");
        assert_eq!(sink.table_path(&destination), path);

        let text = std::fs::read_to_string(path).unwrap();
        let paths: Vec<String> = text
            .lines()
            .map(|line| {
                let value: serde_json::Value = serde_json::from_str(line).unwrap();
                assert_eq!(value["tag"], "edge");
                value["path"].as_str().unwrap().to_string()
            })
            .collect();
        assert_eq!(paths, vec!["/a", "/b", "/c"]);
    }

    #[tokio::test]
    async fn unwritable_root_reports_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"x").unwrap();

        let sink = JsonlDirSink::new(&blocker);
        let destination = Destination {
            dataset: "traffic".to_string(),
            table: "raw2024315".to_string(),
        };

        let err = sink
            .insert(destination, vec![row("/a", 1)])
            .await
            .unwrap_err();
        assert!(matches!(err, SinkError::PrepareDirectory { .. }));
    }
}
