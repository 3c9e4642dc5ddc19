//! Durable snapshot lifecycle and the long-lived engine handle.
//!
//! A snapshot is the triple {vector index, chunk list, image map}. It is
//! created by one full build pass, loaded wholesale for querying, and never
//! partially mutated: a rebuild replaces the whole thing. Queries run
//! against an immutable `Arc<Snapshot>`, so any number of them can proceed
//! in parallel while a swap stays atomic from their point of view.

use std::{
    collections::BTreeMap,
    io::{BufReader, BufWriter},
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError, RwLock},
};

use tracing::{debug, info};

use crate::{
    chunker::{self, Chunk},
    config::EngineConfig,
    data_dir::DataDir,
    embed::{Embedder, EmbeddingGateway},
    error::{Error, Result},
    images::{self, ImageDescriptor},
    ingest,
    search::{self, SearchResult},
    vector_db::VectorDb,
    vector_index::FlatIndex,
};

/// The complete, immutable state of a built index.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub index: FlatIndex,
    pub chunks: Vec<Chunk>,
    pub images: BTreeMap<u32, Vec<ImageDescriptor>>,
}

impl Snapshot {
    /// Row alignment is the core invariant: vector row *i* is chunk *i*.
    fn check_alignment(&self) -> Result<()> {
        if self.chunks.len() != self.index.row_count() {
            return Err(Error::Corruption(format!(
                "chunk list has {} entries but vector index has {} rows",
                self.chunks.len(),
                self.index.row_count()
            )));
        }
        Ok(())
    }
}

/// The retrieval engine: owns the durable snapshot and answers queries.
///
/// Intended to be created once by the orchestration layer and shared by
/// reference; there is no ambient global instance.
pub struct Engine {
    dir: DataDir,
    config: EngineConfig,
    gateway: EmbeddingGateway,
    snapshot: RwLock<Option<Arc<Snapshot>>>,
    build_lock: Mutex<()>,
}

impl Engine {
    /// Create an engine. Fails on an inconsistent configuration before any
    /// I/O happens.
    pub fn new(dir: DataDir, config: EngineConfig, embedder: Arc<dyn Embedder>) -> Result<Self> {
        config.validate()?;
        let gateway = EmbeddingGateway::new(embedder, config.embed_batch_size);
        Ok(Self {
            dir,
            config,
            gateway,
            snapshot: RwLock::new(None),
            build_lock: Mutex::new(()),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn data_dir(&self) -> &DataDir {
        &self.dir
    }

    pub fn is_ready(&self) -> bool {
        self.read_snapshot().is_some()
    }

    fn read_snapshot(&self) -> Option<Arc<Snapshot>> {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn swap_snapshot(&self, snapshot: Arc<Snapshot>) {
        *self
            .snapshot
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(snapshot);
    }

    /// The currently loaded snapshot, or [`Error::NotReady`].
    pub fn snapshot(&self) -> Result<Arc<Snapshot>> {
        self.read_snapshot().ok_or(Error::NotReady)
    }

    /// Build the index for `document`, or load it if one already exists.
    ///
    /// An existing durable snapshot is treated as authoritative: `build`
    /// short-circuits to `load` and touches the document again only when
    /// image metadata is missing (a narrow repair, not a rebuild). Only one
    /// build may run at a time; a concurrent attempt is rejected.
    pub fn build(&self, document: &Path) -> Result<()> {
        let _guard = self
            .build_lock
            .try_lock()
            .map_err(|_| Error::BuildInProgress)?;

        if self.dir.vectors_db().exists() && self.dir.chunks_file().exists() {
            info!("existing index found, loading instead of rebuilding");
            self.load()?;

            let snapshot = self.snapshot()?;
            if !self.dir.images_file().exists() || snapshot.images.is_empty() {
                info!("image metadata missing, extracting from document");
                let images = ingest::extract_image_metadata(document)?;
                write_json_atomic(&self.dir.images_file(), &images)?;
                self.swap_snapshot(Arc::new(Snapshot {
                    index: snapshot.index.clone(),
                    chunks: snapshot.chunks.clone(),
                    images,
                }));
            }
            return Ok(());
        }

        let ingested = ingest::ingest(document)?;
        let chunks = chunker::chunk_pages(
            &ingested.pages,
            self.config.chunk_size,
            self.config.chunk_overlap,
        )?;
        debug!(chunks = chunks.len(), "chunked document");

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.gateway.embed_all(&texts)?;

        let mut index = FlatIndex::new(vectors.first().map_or(0, Vec::len));
        if !vectors.is_empty() {
            index.add(&vectors)?;
        }

        let snapshot = Snapshot {
            index,
            chunks,
            images: ingested.images,
        };
        snapshot.check_alignment()?;

        self.persist(&snapshot)?;
        self.swap_snapshot(Arc::new(snapshot));
        info!("index built and saved");
        Ok(())
    }

    /// Persist the currently loaded snapshot.
    pub fn save(&self) -> Result<()> {
        let snapshot = self.snapshot()?;
        self.persist(&snapshot)
    }

    /// Load the durable snapshot into memory and make it current.
    ///
    /// Page keys of the image artifact arrive as JSON strings and are
    /// normalized to integers here; stringly-typed keys never leak past
    /// this boundary. A missing image artifact means "no images". A
    /// chunk/row count mismatch is a corruption error, never silently
    /// truncated.
    pub fn load(&self) -> Result<()> {
        let chunks_path = self.dir.chunks_file();
        if !chunks_path.exists() {
            return Err(Error::NotFound {
                kind: "chunk metadata artifact",
                name: chunks_path.display().to_string(),
            });
        }
        let vectors_path = self.dir.vectors_db();
        if !vectors_path.exists() {
            return Err(Error::NotFound {
                kind: "vector index artifact",
                name: vectors_path.display().to_string(),
            });
        }

        let index = VectorDb::open(&vectors_path)?.load_index()?;

        let reader = BufReader::new(std::fs::File::open(&chunks_path)?);
        let chunks: Vec<Chunk> = serde_json::from_reader(reader)?;

        let images = self.load_images()?;

        let snapshot = Snapshot {
            index,
            chunks,
            images,
        };
        snapshot.check_alignment()?;

        info!(
            chunks = snapshot.chunks.len(),
            image_pages = snapshot.images.len(),
            "index loaded"
        );
        self.swap_snapshot(Arc::new(snapshot));
        Ok(())
    }

    fn load_images(&self) -> Result<BTreeMap<u32, Vec<ImageDescriptor>>> {
        let path = self.dir.images_file();
        if !path.exists() {
            return Ok(BTreeMap::new());
        }

        let reader = BufReader::new(std::fs::File::open(&path)?);
        let raw: BTreeMap<String, Vec<ImageDescriptor>> = serde_json::from_reader(reader)?;

        let mut images = BTreeMap::new();
        for (key, descriptors) in raw {
            let page: u32 = key.parse().map_err(|_| {
                Error::Corruption(format!("image metadata has non-numeric page key {key:?}"))
            })?;
            images.insert(page, descriptors);
        }
        Ok(images)
    }

    /// Write all three artifacts, each via write-then-rename so readers see
    /// either the old file or the new one, never a torn write.
    fn persist(&self, snapshot: &Snapshot) -> Result<()> {
        let vectors_tmp = tmp_path(&self.dir.vectors_db());
        if vectors_tmp.exists() {
            std::fs::remove_file(&vectors_tmp)?;
        }
        VectorDb::open(&vectors_tmp)?.store_index(&snapshot.index)?;
        std::fs::rename(&vectors_tmp, self.dir.vectors_db())?;

        write_json_atomic(&self.dir.chunks_file(), &snapshot.chunks)?;
        write_json_atomic(&self.dir.images_file(), &snapshot.images)?;
        Ok(())
    }

    /// Semantic-only search, thresholded by the configured similarity floor.
    pub fn search_semantic(&self, query: &str, top_k: usize) -> Result<Vec<SearchResult>> {
        let snapshot = self.snapshot()?;
        search::search_semantic(
            &snapshot.index,
            &snapshot.chunks,
            &self.gateway,
            query,
            top_k,
            self.config.similarity_threshold,
        )
    }

    /// Keyword-only search.
    pub fn search_keyword(&self, query: &str, top_k: usize) -> Result<Vec<SearchResult>> {
        let snapshot = self.snapshot()?;
        search::search_keyword(&snapshot.chunks, query, top_k)
    }

    /// Fused search; the primary entry point.
    pub fn search_hybrid(&self, query: &str, top_k: usize) -> Result<Vec<SearchResult>> {
        let snapshot = self.snapshot()?;
        search::search_hybrid(
            &snapshot.index,
            &snapshot.chunks,
            &self.gateway,
            &self.config,
            query,
            top_k,
        )
    }

    /// Diagram descriptors for a page. Total: a page without images (or an
    /// engine without a loaded snapshot) yields an empty list, never an
    /// error.
    pub fn images_for_page(&self, page: u32) -> Vec<ImageDescriptor> {
        self.read_snapshot()
            .and_then(|s| s.images.get(&page).cloned())
            .unwrap_or_default()
    }

    /// Extract one image's raw bytes by re-opening the source document.
    pub fn extract_image_bytes(&self, document: &Path, page: u32, xref: u32) -> Result<Vec<u8>> {
        images::extract_image_bytes(document, page, xref)
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("dir", &self.dir)
            .field("config", &self.config)
            .field("ready", &self.is_ready())
            .finish_non_exhaustive()
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_os_string();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

fn write_json_atomic<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let tmp = tmp_path(path);
    {
        let writer = BufWriter::new(std::fs::File::create(&tmp)?);
        serde_json::to_writer_pretty(writer, value)?;
    }
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        embed::HashEmbedder,
        testutil::{PdfPage, write_pdf},
    };

    fn test_engine(root: &Path) -> Engine {
        let dir = DataDir::resolve(Some(root)).unwrap();
        let config = EngineConfig {
            chunk_size: 50,
            chunk_overlap: 10,
            similarity_threshold: 0.0,
            ..EngineConfig::default()
        };
        // A roomy dimension: at 64 slots the short fixture texts can lose
        // their shared-token signal to hash collisions.
        Engine::new(dir, config, Arc::new(HashEmbedder::new(512))).unwrap()
    }

    fn sample_manual(path: &Path) {
        write_pdf(
            path,
            &[
                PdfPage::text("Engine oil capacity is 4.5 liters with filter change."),
                PdfPage::with_images(
                    "Coolant system diagram and bleed procedure.",
                    &[[120.0, 0.0, 0.0, 90.0, 40.0, 100.0]],
                ),
                PdfPage::text("Torque the wheel lug nuts to 110 Nm in a star pattern."),
            ],
        );
    }

    #[test]
    fn build_produces_an_aligned_queryable_snapshot() {
        let tmp = tempfile::tempdir().unwrap();
        let pdf = tmp.path().join("manual.pdf");
        sample_manual(&pdf);

        let engine = test_engine(&tmp.path().join("store"));
        assert!(!engine.is_ready());

        engine.build(&pdf).unwrap();
        assert!(engine.is_ready());

        let snapshot = engine.snapshot().unwrap();
        assert_eq!(snapshot.chunks.len(), snapshot.index.row_count());
        assert!(!snapshot.chunks.is_empty());

        let results = engine.search_hybrid("oil capacity", 5).unwrap();
        assert!(!results.is_empty());
        assert_eq!(results[0].page, 1);
        assert!(results[0].text.contains("oil capacity"));
    }

    #[test]
    fn load_restores_an_identical_snapshot() {
        let tmp = tempfile::tempdir().unwrap();
        let pdf = tmp.path().join("manual.pdf");
        sample_manual(&pdf);
        let store = tmp.path().join("store");

        let built = test_engine(&store);
        built.build(&pdf).unwrap();
        let before = built.snapshot().unwrap();
        let probe_before = built.search_hybrid("coolant bleed", 5).unwrap();

        let loaded = test_engine(&store);
        loaded.load().unwrap();
        let after = loaded.snapshot().unwrap();

        assert_eq!(before.chunks, after.chunks);
        assert_eq!(before.index, after.index);
        assert_eq!(before.images, after.images);
        // Image page keys are integers again after the JSON round trip.
        assert!(after.images.contains_key(&2));

        let probe_after = loaded.search_hybrid("coolant bleed", 5).unwrap();
        assert_eq!(probe_before.len(), probe_after.len());
        for (a, b) in probe_before.iter().zip(&probe_after) {
            assert_eq!(a.page, b.page);
            assert_eq!(a.text, b.text);
            assert_eq!(a.similarity, b.similarity);
        }
    }

    #[test]
    fn build_short_circuits_to_load_when_snapshot_exists() {
        let tmp = tempfile::tempdir().unwrap();
        let pdf = tmp.path().join("manual.pdf");
        sample_manual(&pdf);
        let store = tmp.path().join("store");

        test_engine(&store).build(&pdf).unwrap();

        // Replace the document with garbage: a true rebuild would now fail,
        // so succeeding proves build() loaded the existing snapshot instead.
        std::fs::write(&pdf, b"no longer a pdf").unwrap();

        let engine = test_engine(&store);
        engine.build(&pdf).unwrap();
        assert!(engine.is_ready());
    }

    #[test]
    fn build_repairs_missing_image_metadata() {
        let tmp = tempfile::tempdir().unwrap();
        let pdf = tmp.path().join("manual.pdf");
        sample_manual(&pdf);
        let store = tmp.path().join("store");

        let engine = test_engine(&store);
        engine.build(&pdf).unwrap();
        std::fs::remove_file(engine.data_dir().images_file()).unwrap();

        let repaired = test_engine(&store);
        repaired.build(&pdf).unwrap();

        assert!(repaired.data_dir().images_file().exists());
        let descriptors = repaired.images_for_page(2);
        assert_eq!(descriptors.len(), 1);
    }

    #[test]
    fn load_rejects_misaligned_artifacts() {
        let tmp = tempfile::tempdir().unwrap();
        let pdf = tmp.path().join("manual.pdf");
        sample_manual(&pdf);
        let store = tmp.path().join("store");

        let engine = test_engine(&store);
        engine.build(&pdf).unwrap();

        // Drop one chunk from the metadata artifact.
        let chunks_path = engine.data_dir().chunks_file();
        let mut chunks: Vec<Chunk> =
            serde_json::from_reader(BufReader::new(std::fs::File::open(&chunks_path).unwrap()))
                .unwrap();
        chunks.pop();
        std::fs::write(&chunks_path, serde_json::to_vec(&chunks).unwrap()).unwrap();

        let reloaded = test_engine(&store);
        assert!(matches!(reloaded.load(), Err(Error::Corruption(_))));
        assert!(!reloaded.is_ready(), "corrupt snapshot must not be swapped in");
    }

    #[test]
    fn missing_image_artifact_means_no_images() {
        let tmp = tempfile::tempdir().unwrap();
        let pdf = tmp.path().join("manual.pdf");
        write_pdf(&pdf, &[PdfPage::text("Plain text page, no diagrams.")]);
        let store = tmp.path().join("store");

        let engine = test_engine(&store);
        engine.build(&pdf).unwrap();
        // No images were found, so no artifact content matters; remove it.
        let _ = std::fs::remove_file(engine.data_dir().images_file());

        let reloaded = test_engine(&store);
        reloaded.load().unwrap();
        assert!(reloaded.images_for_page(1).is_empty());
    }

    #[test]
    fn queries_before_load_are_not_ready() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = test_engine(&tmp.path().join("store"));

        assert!(matches!(
            engine.search_semantic("anything", 5),
            Err(Error::NotReady)
        ));
        assert!(matches!(
            engine.search_hybrid("anything", 5),
            Err(Error::NotReady)
        ));
        // Image lookup stays total.
        assert!(engine.images_for_page(1).is_empty());
    }

    #[test]
    fn concurrent_build_is_rejected() {
        use std::sync::mpsc;

        // An embedder that blocks until released, holding the build lock.
        struct GatedEmbedder {
            started: mpsc::Sender<()>,
            release: Mutex<mpsc::Receiver<()>>,
        }
        impl Embedder for GatedEmbedder {
            fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
                let _ = self.started.send(());
                let _ = self
                    .release
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .recv();
                Ok(texts.iter().map(|_| vec![0.0; 8]).collect())
            }
        }

        let tmp = tempfile::tempdir().unwrap();
        let pdf = tmp.path().join("manual.pdf");
        write_pdf(&pdf, &[PdfPage::text("Single page manual for lock test.")]);

        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let dir = DataDir::resolve(Some(&tmp.path().join("store"))).unwrap();
        let config = EngineConfig {
            similarity_threshold: 0.0,
            ..EngineConfig::default()
        };
        let engine = Arc::new(
            Engine::new(
                dir,
                config,
                Arc::new(GatedEmbedder {
                    started: started_tx,
                    release: Mutex::new(release_rx),
                }),
            )
            .unwrap(),
        );

        let background = {
            let engine = Arc::clone(&engine);
            let pdf = pdf.clone();
            std::thread::spawn(move || engine.build(&pdf))
        };

        // Wait until the background build holds the lock inside embedding.
        started_rx.recv().unwrap();
        assert!(matches!(engine.build(&pdf), Err(Error::BuildInProgress)));

        release_tx.send(()).unwrap();
        background.join().unwrap().unwrap();
        assert!(engine.is_ready());
    }
}
