use std::{io, path::PathBuf, sync::Arc};

use futures::future::BoxFuture;
use tracing::info;

use crate::{
    collaborators::{BoardStore, CollaboratorResult},
    error::CollaboratorError,
    state::game::Board,
};

/// Stores each board as `<dir>/<name>.json`.
#[derive(Clone)]
pub struct FileBoardStore {
    dir: Arc<PathBuf>,
}

impl FileBoardStore {
    /// Store rooted at `dir`; the directory is created on first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Arc::new(dir.into()),
        }
    }

    fn path_for(&self, name: &str) -> CollaboratorResult<PathBuf> {
        let valid = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(CollaboratorError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid board name `{name}`"),
            )));
        }
        Ok(self.dir.join(format!("{name}.json")))
    }
}

impl BoardStore for FileBoardStore {
    fn load(&self, name: &str) -> BoxFuture<'static, CollaboratorResult<Board>> {
        let path = self.path_for(name);
        Box::pin(async move {
            let path = path?;
            let bytes = tokio::fs::read(&path).await?;
            let board = serde_json::from_slice(&bytes).map_err(|source| {
                CollaboratorError::ProtocolParse {
                    service: "board store",
                    message: format!("{}: {source}", path.display()),
                }
            })?;
            info!(path = %path.display(), "board loaded");
            Ok(board)
        })
    }

    fn save(&self, name: &str, board: Board) -> BoxFuture<'static, CollaboratorResult<()>> {
        let path = self.path_for(name);
        let dir = self.dir.clone();
        Box::pin(async move {
            let path = path?;
            let contents = serde_json::to_vec_pretty(&board).map_err(|source| {
                CollaboratorError::ProtocolParse {
                    service: "board store",
                    message: source.to_string(),
                }
            })?;
            tokio::fs::create_dir_all(dir.as_ref()).await?;
            tokio::fs::write(&path, contents).await?;
            info!(path = %path.display(), "board saved");
            Ok(())
        })
    }

    fn list(&self) -> BoxFuture<'static, CollaboratorResult<Vec<String>>> {
        let dir = self.dir.clone();
        Box::pin(async move {
            let mut entries = match tokio::fs::read_dir(dir.as_ref()).await {
                Ok(entries) => entries,
                Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
                Err(err) => return Err(err.into()),
            };
            let mut names = Vec::new();
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if path.extension().is_none_or(|ext| ext != "json") {
                    continue;
                }
                if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                    names.push(stem.to_string());
                }
            }
            names.sort();
            Ok(names)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::game::{BoardCategory, BoardQuestion, FinalClue};

    fn scratch_dir(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("quiz-host-{tag}-{}", uuid::Uuid::new_v4()))
    }

    #[tokio::test]
    async fn save_then_load_keeps_used_flags() {
        let dir = scratch_dir("roundtrip");
        let store = FileBoardStore::new(&dir);
        let board = Board {
            contestants: Vec::new(),
            categories: vec![BoardCategory {
                name: "Rivers".into(),
                questions: vec![BoardQuestion {
                    clue: "Flows through Cairo".into(),
                    answer: "Nile".into(),
                    value: 200,
                    daily_double: true,
                    used: true,
                }],
            }],
            final_clue: Some(FinalClue {
                category: "Deserts".into(),
                clue: "Largest hot desert".into(),
                answer: "Sahara".into(),
            }),
        };

        store.save("generated", board.clone()).await.unwrap();
        let raw = tokio::fs::read_to_string(dir.join("generated.json"))
            .await
            .unwrap();
        assert!(raw.contains("\"dailyDouble\": true"));
        assert!(raw.contains("\"final\""));
        assert_eq!(store.load("generated").await.unwrap(), board);

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn missing_board_is_io_error() {
        let store = FileBoardStore::new(scratch_dir("missing"));
        assert!(matches!(
            store.load("default").await,
            Err(CollaboratorError::Io(_))
        ));
    }

    #[tokio::test]
    async fn malformed_board_is_parse_error() {
        let dir = scratch_dir("malformed");
        tokio::fs::create_dir_all(&dir).await.unwrap();
        tokio::fs::write(dir.join("broken.json"), b"{ not json")
            .await
            .unwrap();
        let store = FileBoardStore::new(&dir);
        assert!(matches!(
            store.load("broken").await,
            Err(CollaboratorError::ProtocolParse { .. })
        ));
        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn list_names_json_documents_only() {
        let dir = scratch_dir("list");
        let store = FileBoardStore::new(&dir);
        assert!(store.list().await.unwrap().is_empty());

        tokio::fs::create_dir_all(&dir).await.unwrap();
        for file in ["zoo.json", "default.json", "notes.txt"] {
            tokio::fs::write(dir.join(file), b"{}").await.unwrap();
        }
        assert_eq!(store.list().await.unwrap(), vec!["default", "zoo"]);

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn path_traversal_is_rejected() {
        let store = FileBoardStore::new(scratch_dir("names"));
        assert!(store.load("../etc/passwd").await.is_err());
    }
}
