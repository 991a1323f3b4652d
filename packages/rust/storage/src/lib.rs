//! libSQL-backed conversation index plus on-disk JSON artifacts.
//!
//! The [`Storage`] struct owns a root directory: an `index.db` database holds
//! one metadata row per conversation, and the full graph artifacts live next
//! to it under `artifacts/` as JSON files. The database indexes; the files
//! are the source of truth for graph content.

mod migrations;

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use libsql::{Connection, Database, params};

use threadline_shared::{ConversationArtifact, ConversationMeta, Result, ThreadlineError};

const INDEX_DB_NAME: &str = "index.db";
const ARTIFACTS_DIR_NAME: &str = "artifacts";

/// Storage handle rooted at the configured output directory.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    root: PathBuf,
}

impl Storage {
    /// Open or create the storage root, running pending migrations.
    pub async fn open(root: &Path) -> Result<Self> {
        std::fs::create_dir_all(root.join(ARTIFACTS_DIR_NAME))
            .map_err(|e| ThreadlineError::io(root, e))?;

        let db = libsql::Builder::new_local(root.join(INDEX_DB_NAME))
            .build()
            .await
            .map_err(|e| ThreadlineError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| ThreadlineError::Storage(e.to_string()))?;

        let storage = Self {
            db,
            conn,
            root: root.to_path_buf(),
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    ThreadlineError::Storage(format!(
                        "migration v{} failed: {e}",
                        migration.version
                    ))
                })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    // -----------------------------------------------------------------------
    // Conversation operations
    // -----------------------------------------------------------------------

    /// Persist a finished conversation: write the artifact JSON, then index it.
    /// Returns the metadata row that was inserted.
    pub async fn save_conversation(
        &self,
        artifact: &ConversationArtifact,
    ) -> Result<ConversationMeta> {
        let file = self
            .root
            .join(ARTIFACTS_DIR_NAME)
            .join(format!("{}.json", artifact.conversation_id));

        let json = serde_json::to_vec_pretty(artifact)
            .map_err(|e| ThreadlineError::Storage(format!("artifact serialization: {e}")))?;
        std::fs::write(&file, json).map_err(|e| ThreadlineError::io(&file, e))?;

        let meta = ConversationMeta {
            id: artifact.conversation_id.to_string(),
            file_name: artifact.file_name.clone(),
            no_of_nodes: artifact.node_count(),
            storage_path: file.to_string_lossy().into_owned(),
            created_at: Utc::now(),
        };
        self.insert_conversation(&meta).await?;
        Ok(meta)
    }

    /// Insert a conversation metadata row.
    pub async fn insert_conversation(&self, meta: &ConversationMeta) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO conversations (id, file_name, no_of_nodes, storage_path, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    meta.id.as_str(),
                    meta.file_name.as_str(),
                    meta.no_of_nodes as i64,
                    meta.storage_path.as_str(),
                    meta.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| ThreadlineError::Storage(e.to_string()))?;
        Ok(())
    }

    /// List all conversations, most recent first.
    pub async fn list_conversations(&self) -> Result<Vec<ConversationMeta>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, file_name, no_of_nodes, storage_path, created_at
                 FROM conversations ORDER BY created_at DESC",
                params![],
            )
            .await
            .map_err(|e| ThreadlineError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_meta(&row)?);
        }
        Ok(results)
    }

    /// Get a conversation's metadata by id.
    pub async fn get_conversation(&self, id: &str) -> Result<Option<ConversationMeta>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, file_name, no_of_nodes, storage_path, created_at
                 FROM conversations WHERE id = ?1",
                params![id],
            )
            .await
            .map_err(|e| ThreadlineError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_meta(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(ThreadlineError::Storage(e.to_string())),
        }
    }

    /// Load the full artifact for a conversation id.
    pub async fn load_artifact(&self, id: &str) -> Result<ConversationArtifact> {
        let meta = self
            .get_conversation(id)
            .await?
            .ok_or_else(|| ThreadlineError::Storage(format!("conversation {id} not found")))?;
        self.read_artifact(&meta)
    }

    /// Read the artifact file behind an already-fetched metadata row, so
    /// callers holding the row don't query it a second time.
    pub fn read_artifact(&self, meta: &ConversationMeta) -> Result<ConversationArtifact> {
        let path = Path::new(&meta.storage_path);
        let content = std::fs::read_to_string(path).map_err(|e| ThreadlineError::io(path, e))?;
        serde_json::from_str(&content)
            .map_err(|e| ThreadlineError::Storage(format!("artifact {} unreadable: {e}", meta.id)))
    }
}

fn row_to_meta(row: &libsql::Row) -> Result<ConversationMeta> {
    let created_at_raw = row
        .get::<String>(4)
        .map_err(|e| ThreadlineError::Storage(e.to_string()))?;
    let created_at = DateTime::parse_from_rfc3339(&created_at_raw)
        .map_err(|e| ThreadlineError::Storage(format!("bad created_at: {e}")))?
        .with_timezone(&Utc);

    Ok(ConversationMeta {
        id: row
            .get::<String>(0)
            .map_err(|e| ThreadlineError::Storage(e.to_string()))?,
        file_name: row
            .get::<String>(1)
            .map_err(|e| ThreadlineError::Storage(e.to_string()))?,
        no_of_nodes: row
            .get::<u64>(2)
            .map_err(|e| ThreadlineError::Storage(e.to_string()))? as usize,
        storage_path: row
            .get::<String>(3)
            .map_err(|e| ThreadlineError::Storage(e.to_string()))?,
        created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use threadline_shared::{ConversationId, Node};
    use uuid::Uuid;

    fn temp_root(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("threadline-{tag}-{}", Uuid::now_v7()))
    }

    fn sample_artifact(name: &str) -> ConversationArtifact {
        ConversationArtifact {
            file_name: name.into(),
            conversation_id: ConversationId::new(),
            chunks: HashMap::from([("c1".to_string(), "hello there".to_string())]),
            graph_data: vec![vec![Node::thread("greeting"), Node::thread("weather")]],
        }
    }

    #[tokio::test]
    async fn save_and_reload_roundtrip() {
        let root = temp_root("roundtrip");
        let storage = Storage::open(&root).await.unwrap();

        let artifact = sample_artifact("standup.txt");
        let meta = storage.save_conversation(&artifact).await.unwrap();
        assert_eq!(meta.no_of_nodes, 2);
        assert_eq!(meta.file_name, "standup.txt");

        let loaded = storage.load_artifact(&meta.id).await.unwrap();
        assert_eq!(loaded.conversation_id, artifact.conversation_id);
        assert_eq!(loaded.graph_data[0].len(), 2);
        assert_eq!(loaded.chunks["c1"], "hello there");

        // A fetched metadata row resolves to the same artifact directly.
        let fetched = storage.get_conversation(&meta.id).await.unwrap().unwrap();
        let direct = storage.read_artifact(&fetched).unwrap();
        assert_eq!(direct.conversation_id, artifact.conversation_id);

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn list_orders_most_recent_first() {
        let root = temp_root("list");
        let storage = Storage::open(&root).await.unwrap();

        let older = ConversationMeta {
            id: Uuid::now_v7().to_string(),
            file_name: "first.txt".into(),
            no_of_nodes: 1,
            storage_path: "unused".into(),
            created_at: Utc::now() - chrono::Duration::hours(1),
        };
        let newer = ConversationMeta {
            id: Uuid::now_v7().to_string(),
            file_name: "second.txt".into(),
            no_of_nodes: 3,
            storage_path: "unused".into(),
            created_at: Utc::now(),
        };
        storage.insert_conversation(&older).await.unwrap();
        storage.insert_conversation(&newer).await.unwrap();

        let all = storage.list_conversations().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].file_name, "second.txt");
        assert_eq!(all[1].file_name, "first.txt");

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn missing_conversation_is_none() {
        let root = temp_root("missing");
        let storage = Storage::open(&root).await.unwrap();
        let got = storage
            .get_conversation(&Uuid::now_v7().to_string())
            .await
            .unwrap();
        assert!(got.is_none());

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn reopen_preserves_index() {
        let root = temp_root("reopen");
        {
            let storage = Storage::open(&root).await.unwrap();
            storage
                .save_conversation(&sample_artifact("kept.txt"))
                .await
                .unwrap();
        }
        let storage = Storage::open(&root).await.unwrap();
        let all = storage.list_conversations().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].file_name, "kept.txt");

        let _ = std::fs::remove_dir_all(&root);
    }
}
