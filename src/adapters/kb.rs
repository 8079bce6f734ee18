//! 知識庫：讀取 KB 文件、切塊、向量化並存成本地 JSON collection，
//! 查詢時以平方 L2 距離排序取前 top_k 筆。

use crate::config::{EmbeddingConfig, KbConfig};
use crate::core::chunker::TextSplitter;
use crate::domain::model::KbHit;
use crate::domain::ports::{Embedder, Retriever};
use crate::utils::error::{Result, TriageError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const KB_EXTENSIONS: [&str; 2] = ["md", "txt"];

#[derive(Debug, Clone, PartialEq)]
pub struct KbDocument {
    pub source: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct KbChunk {
    pub source: String,
    pub chunk_id: usize,
    pub text: String,
}

fn is_kb_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| KB_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn collect_files(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_files(&path, files)?;
        } else if is_kb_file(&path) {
            files.push(path);
        }
    }
    Ok(())
}

/// 遞迴讀取 .md / .txt，依路徑排序；source 為檔名
pub fn load_kb_docs(dir: &Path) -> Result<Vec<KbDocument>> {
    if !dir.is_dir() {
        return Err(TriageError::RetrievalError {
            message: format!("KB directory not found: {}", dir.display()),
        });
    }

    let mut files = Vec::new();
    collect_files(dir, &mut files)?;
    files.sort();

    files
        .into_iter()
        .map(|path| {
            let bytes = std::fs::read(&path)?;
            let source = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            Ok(KbDocument {
                source,
                text: String::from_utf8_lossy(&bytes).into_owned(),
            })
        })
        .collect()
}

pub fn chunk_docs(docs: &[KbDocument], splitter: &TextSplitter) -> Vec<KbChunk> {
    docs.iter()
        .flat_map(|doc| {
            splitter
                .split_text(&doc.text)
                .into_iter()
                .enumerate()
                .map(move |(chunk_id, text)| KbChunk {
                    source: doc.source.clone(),
                    chunk_id,
                    text,
                })
        })
        .collect()
}

/// 平方 L2 距離；單位向量時等於 `2 * (1 - cos)`
pub fn squared_l2_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    pub id: String,
    pub text: String,
    pub source: Option<String>,
    pub chunk_id: Option<usize>,
    pub embedding: Vec<f32>,
}

/// 單一 collection 的持久化格式
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VectorIndex {
    pub collection: String,
    pub embedding_model: String,
    pub entries: Vec<IndexEntry>,
}

impl VectorIndex {
    /// collection 不存在時回傳 None
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string(self)?)?;
        Ok(())
    }

    pub fn search(&self, query: &[f32], top_k: usize) -> Vec<KbHit> {
        let mut scored: Vec<(f32, &IndexEntry)> = self
            .entries
            .iter()
            .map(|entry| (squared_l2_distance(query, &entry.embedding), entry))
            .collect();
        scored.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));

        scored
            .into_iter()
            .take(top_k)
            .map(|(distance, entry)| KbHit {
                text: entry.text.clone(),
                source: entry.source.clone(),
                chunk_id: entry.chunk_id,
                distance,
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestReport {
    pub documents: usize,
    pub chunks: usize,
}

pub struct KnowledgeBase {
    embedder: Arc<dyn Embedder>,
    persist_dir: PathBuf,
    collection: String,
    embedding_model: String,
    splitter: TextSplitter,
}

impl KnowledgeBase {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        persist_dir: impl Into<PathBuf>,
        collection: &str,
        embedding_model: &str,
        splitter: TextSplitter,
    ) -> Self {
        Self {
            embedder,
            persist_dir: persist_dir.into(),
            collection: collection.to_string(),
            embedding_model: embedding_model.to_string(),
            splitter,
        }
    }

    pub fn from_config(
        embedder: Arc<dyn Embedder>,
        kb: &KbConfig,
        embeddings: &EmbeddingConfig,
    ) -> Self {
        Self::new(
            embedder,
            &kb.persist_dir,
            &kb.collection,
            &embeddings.model,
            TextSplitter::new(kb.chunk_size, kb.chunk_overlap),
        )
    }

    pub fn index_path(&self) -> PathBuf {
        self.persist_dir.join(format!("{}.json", self.collection))
    }

    /// 重建 collection：舊資料全部刪除後重新寫入
    pub async fn ingest(&self, docs_dir: &Path) -> Result<IngestReport> {
        let docs = load_kb_docs(docs_dir)?;
        let chunks = chunk_docs(&docs, &self.splitter);
        tracing::info!(
            documents = docs.len(),
            chunks = chunks.len(),
            "📚 Loaded KB documents from {}",
            docs_dir.display()
        );

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let embeddings = if texts.is_empty() {
            Vec::new()
        } else {
            self.embedder.embed(&texts).await?
        };
        if embeddings.len() != chunks.len() {
            return Err(TriageError::RetrievalError {
                message: format!(
                    "embedder returned {} vectors for {} chunks",
                    embeddings.len(),
                    chunks.len()
                ),
            });
        }

        let entries = chunks
            .into_iter()
            .zip(embeddings)
            .enumerate()
            .map(|(idx, (chunk, embedding))| IndexEntry {
                id: format!("kb_{}", idx),
                text: chunk.text,
                source: Some(chunk.source),
                chunk_id: Some(chunk.chunk_id),
                embedding,
            })
            .collect::<Vec<_>>();
        let chunk_count = entries.len();

        let path = self.index_path();
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        VectorIndex {
            collection: self.collection.clone(),
            embedding_model: self.embedding_model.clone(),
            entries,
        }
        .save(&path)?;

        tracing::info!(
            "✅ Ingested {} chunks into collection '{}'",
            chunk_count,
            self.collection
        );
        Ok(IngestReport {
            documents: docs.len(),
            chunks: chunk_count,
        })
    }
}

#[async_trait]
impl Retriever for KnowledgeBase {
    async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<KbHit>> {
        let Some(index) = VectorIndex::load(&self.index_path())? else {
            tracing::warn!(collection = %self.collection, "⚠️ KB collection missing, no snippets retrieved");
            return Ok(Vec::new());
        };
        if index.entries.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let vectors = self.embedder.embed(&[query.to_string()]).await?;
        let query_vector = vectors.into_iter().next().ok_or_else(|| TriageError::RetrievalError {
            message: "embedder returned no vector for query".to_string(),
        })?;

        Ok(index.search(&query_vector, top_k))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// 依關鍵字產生固定向量
    struct KeywordEmbedder {
        calls: Mutex<usize>,
    }

    impl KeywordEmbedder {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(0),
            })
        }
    }

    #[async_trait]
    impl Embedder for KeywordEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            *self.calls.lock().unwrap() += 1;
            Ok(texts
                .iter()
                .map(|text| {
                    let lower = text.to_lowercase();
                    vec![
                        if lower.contains("refund") { 1.0 } else { 0.0 },
                        if lower.contains("shipping") { 1.0 } else { 0.0 },
                        0.1,
                    ]
                })
                .collect())
        }
    }

    fn write(dir: &Path, name: &str, content: &str) {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn test_load_kb_docs_filters_and_sorts() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "b_refunds.md", "Refund policy");
        write(dir.path(), "a_notes.TXT", "Notes");
        write(dir.path(), "nested/c_shipping.md", "Shipping policy");
        write(dir.path(), "image.png", "binary");

        let docs = load_kb_docs(dir.path()).unwrap();
        let sources: Vec<_> = docs.iter().map(|d| d.source.as_str()).collect();

        assert_eq!(sources, vec!["a_notes.TXT", "b_refunds.md", "c_shipping.md"]);
    }

    #[test]
    fn test_missing_kb_dir() {
        let dir = TempDir::new().unwrap();
        let err = load_kb_docs(&dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, TriageError::RetrievalError { .. }));
    }

    #[test]
    fn test_chunk_ids_restart_per_document() {
        let docs = vec![
            KbDocument {
                source: "a.md".to_string(),
                text: "one two three four five six".to_string(),
            },
            KbDocument {
                source: "b.md".to_string(),
                text: "seven".to_string(),
            },
        ];
        let chunks = chunk_docs(&docs, &TextSplitter::new(10, 0));

        assert!(chunks.len() >= 3);
        assert_eq!(chunks[0].chunk_id, 0);
        assert_eq!(chunks[1].chunk_id, 1);
        let last = chunks.last().unwrap();
        assert_eq!((last.source.as_str(), last.chunk_id), ("b.md", 0));
    }

    #[test]
    fn test_squared_l2_distance() {
        assert_eq!(squared_l2_distance(&[1.0, 0.0], &[1.0, 0.0]), 0.0);
        // 正交單位向量：2 * (1 - 0)
        assert!((squared_l2_distance(&[1.0, 0.0], &[0.0, 1.0]) - 2.0).abs() < 1e-6);
        assert!((squared_l2_distance(&[3.0, 4.0], &[0.0, 0.0]) - 25.0).abs() < 1e-6);
    }

    #[test]
    fn test_search_orders_by_ascending_distance() {
        let entry = |id: &str, embedding: Vec<f32>| IndexEntry {
            id: id.to_string(),
            text: id.to_string(),
            source: Some(format!("{}.md", id)),
            chunk_id: Some(0),
            embedding,
        };
        let index = VectorIndex {
            collection: "support_kb".to_string(),
            embedding_model: "test-embed".to_string(),
            entries: vec![
                entry("far", vec![0.0, 1.0]),
                entry("near", vec![1.0, 0.0]),
                entry("mid", vec![0.6, 0.8]),
            ],
        };

        let hits = index.search(&[1.0, 0.0], 2);
        let texts: Vec<_> = hits.iter().map(|h| h.text.as_str()).collect();
        assert_eq!(texts, vec!["near", "mid"]);
        assert_eq!(hits[0].distance, 0.0);
        assert!((hits[1].distance - 0.8).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_ingest_then_retrieve() {
        let docs = TempDir::new().unwrap();
        let store = TempDir::new().unwrap();
        write(docs.path(), "refunds.md", "Refund requests are processed in 5 days.");
        write(docs.path(), "shipping.md", "Standard shipping takes 3-5 days.");

        let embedder = KeywordEmbedder::new();
        let kb = KnowledgeBase::new(
            embedder.clone(),
            store.path(),
            "support_kb",
            "test-embed",
            TextSplitter::new(800, 120),
        );

        let report = kb.ingest(docs.path()).await.unwrap();
        assert_eq!(report, IngestReport { documents: 2, chunks: 2 });
        assert!(kb.index_path().ends_with("support_kb.json"));

        let hits = kb.retrieve("where is my refund", 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].source.as_deref(), Some("refunds.md"));
        assert_eq!(hits[0].chunk_id, Some(0));

        let index = VectorIndex::load(&kb.index_path()).unwrap().unwrap();
        let ids: Vec<_> = index.entries.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["kb_0", "kb_1"]);
        assert_eq!(index.embedding_model, "test-embed");
    }

    #[tokio::test]
    async fn test_reingest_replaces_collection() {
        let docs = TempDir::new().unwrap();
        let store = TempDir::new().unwrap();
        write(docs.path(), "refunds.md", "Refund policy");
        write(docs.path(), "shipping.md", "Shipping policy");

        let kb = KnowledgeBase::new(
            KeywordEmbedder::new(),
            store.path(),
            "support_kb",
            "test-embed",
            TextSplitter::new(800, 120),
        );
        kb.ingest(docs.path()).await.unwrap();

        std::fs::remove_file(docs.path().join("shipping.md")).unwrap();
        kb.ingest(docs.path()).await.unwrap();

        let index = VectorIndex::load(&kb.index_path()).unwrap().unwrap();
        assert_eq!(index.entries.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_collection_returns_no_hits() {
        let store = TempDir::new().unwrap();
        let embedder = KeywordEmbedder::new();
        let kb = KnowledgeBase::new(
            embedder.clone(),
            store.path(),
            "absent",
            "test-embed",
            TextSplitter::new(800, 120),
        );

        let hits = kb.retrieve("refund", 5).await.unwrap();
        assert!(hits.is_empty());
        assert_eq!(*embedder.calls.lock().unwrap(), 0);
    }
}
