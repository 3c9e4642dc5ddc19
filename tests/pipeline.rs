//! End-to-end pipeline tests: synthesize a small PDF, build an index,
//! and query it through the engine the way the CLI does.

use std::{path::Path, sync::Arc};

use manualrag::{
    DataDir, Engine, EngineConfig, Error, HashEmbedder, SearchKind,
    testutil::{PdfPage, write_pdf},
};

fn engine_with(root: &Path, config: EngineConfig) -> Engine {
    let dir = DataDir::resolve(Some(root)).unwrap();
    // Roomy dimension so short fixture texts keep their shared-token signal.
    Engine::new(dir, config, Arc::new(HashEmbedder::new(512))).unwrap()
}

fn small_chunks_config() -> EngineConfig {
    EngineConfig {
        chunk_size: 50,
        chunk_overlap: 10,
        similarity_threshold: 0.0,
        ..EngineConfig::default()
    }
}

fn three_page_manual(path: &Path) {
    write_pdf(
        path,
        &[
            PdfPage::text(
                "Chapter one covers routine maintenance. Check the engine oil \
                 level weekly and change the oil filter every ten thousand \
                 kilometers.",
            ),
            PdfPage::text(
                "Chapter two covers the cooling system. Bleed trapped air from \
                 the radiator after refilling the coolant reservoir.",
            ),
            PdfPage::text(
                "Chapter three covers wheels and tires. Torque the lug nuts to \
                 one hundred ten newton meters in a star pattern.",
            ),
        ],
    );
}

#[test]
fn chunking_is_deterministic_across_rebuilds() {
    let tmp = tempfile::tempdir().unwrap();
    let pdf = tmp.path().join("manual.pdf");
    three_page_manual(&pdf);

    let first = engine_with(&tmp.path().join("store_a"), small_chunks_config());
    first.build(&pdf).unwrap();
    let a = first.snapshot().unwrap();

    let second = engine_with(&tmp.path().join("store_b"), small_chunks_config());
    second.build(&pdf).unwrap();
    let b = second.snapshot().unwrap();

    assert!(!a.chunks.is_empty());
    assert_eq!(a.chunks, b.chunks);
    for chunk in &a.chunks {
        assert!(chunk.start_pos < chunk.end_pos);
        assert!((1..=3).contains(&chunk.page));
        assert!(!chunk.text.trim().is_empty());
    }
    // Page 1's first chunk starts at the page origin.
    assert_eq!(a.chunks[0].page, 1);
    assert_eq!(a.chunks[0].start_pos, 0);
}

#[test]
fn keyword_search_with_no_overlap_is_empty_not_an_error() {
    let tmp = tempfile::tempdir().unwrap();
    let pdf = tmp.path().join("manual.pdf");
    three_page_manual(&pdf);

    let engine = engine_with(&tmp.path().join("store"), small_chunks_config());
    engine.build(&pdf).unwrap();

    let results = engine.search_keyword("zygote quasar", 10).unwrap();
    assert!(results.is_empty());
}

#[test]
fn searching_an_empty_index_is_not_ready() {
    let tmp = tempfile::tempdir().unwrap();
    let pdf = tmp.path().join("blank.pdf");
    // Whitespace-only pages produce no chunks.
    write_pdf(&pdf, &[PdfPage::text("   "), PdfPage::text(" \t ")]);

    let engine = engine_with(&tmp.path().join("store"), small_chunks_config());
    engine.build(&pdf).unwrap();

    assert!(matches!(
        engine.search_semantic("anything", 5),
        Err(Error::NotReady)
    ));
    assert!(matches!(
        engine.search_hybrid("anything", 5),
        Err(Error::NotReady)
    ));
}

#[test]
fn overlapping_image_placements_each_get_a_descriptor() {
    let tmp = tempfile::tempdir().unwrap();
    let pdf = tmp.path().join("manual.pdf");
    write_pdf(
        &pdf,
        &[PdfPage::with_images(
            "Wiring diagram for the main relay box.",
            &[
                [200.0, 0.0, 0.0, 100.0, 50.0, 400.0],
                [200.0, 0.0, 0.0, 100.0, 150.0, 450.0],
            ],
        )],
    );

    let engine = engine_with(&tmp.path().join("store"), small_chunks_config());
    engine.build(&pdf).unwrap();

    let descriptors = engine.images_for_page(1);
    assert_eq!(descriptors.len(), 2);

    let first = &descriptors[0];
    assert_eq!(first.width, 8);
    assert_eq!(first.height, 8);
    assert!((first.rect.x0 - 50.0).abs() < 1e-4);
    assert!((first.rect.y0 - 400.0).abs() < 1e-4);
    assert!((first.rect.x1 - 250.0).abs() < 1e-4);
    assert!((first.rect.y1 - 500.0).abs() < 1e-4);
    assert!((first.area - 20_000.0).abs() < 1e-2);

    let second = &descriptors[1];
    assert!((second.rect.x0 - 150.0).abs() < 1e-4);
    assert!((second.rect.y0 - 450.0).abs() < 1e-4);
}

#[test]
fn hybrid_results_are_bounded_sorted_and_unique() {
    let tmp = tempfile::tempdir().unwrap();
    let pdf = tmp.path().join("manual.pdf");
    three_page_manual(&pdf);

    let engine = engine_with(&tmp.path().join("store"), small_chunks_config());
    engine.build(&pdf).unwrap();

    let results = engine.search_hybrid("engine oil filter change", 5).unwrap();
    assert!(!results.is_empty());
    assert!(results.len() <= 5);

    for pair in results.windows(2) {
        assert!(pair[0].similarity >= pair[1].similarity);
    }

    let mut keys: Vec<(u32, String)> = results
        .iter()
        .map(|r| (r.page, r.text.chars().take(100).collect()))
        .collect();
    keys.sort();
    keys.dedup();
    assert_eq!(keys.len(), results.len(), "results must be deduplicated");

    // The oil maintenance page should rank first for this query.
    assert_eq!(results[0].page, 1);
}

#[test]
fn semantic_threshold_filters_weak_matches() {
    let tmp = tempfile::tempdir().unwrap();
    let pdf = tmp.path().join("manual.pdf");
    three_page_manual(&pdf);

    let strict = EngineConfig {
        similarity_threshold: 0.9999,
        ..small_chunks_config()
    };
    let engine = engine_with(&tmp.path().join("store"), strict);
    engine.build(&pdf).unwrap();

    // Nothing embeds identically to this query, so the floor removes all.
    let results = engine.search_semantic("radiator coolant", 10).unwrap();
    assert!(results.is_empty());
}

#[test]
fn persisted_index_answers_queries_after_reload() {
    let tmp = tempfile::tempdir().unwrap();
    let pdf = tmp.path().join("manual.pdf");
    three_page_manual(&pdf);
    let store = tmp.path().join("store");

    let builder = engine_with(&store, small_chunks_config());
    builder.build(&pdf).unwrap();
    let before = builder.search_hybrid("torque lug nuts", 5).unwrap();

    let reader = engine_with(&store, small_chunks_config());
    reader.load().unwrap();
    let after = reader.search_hybrid("torque lug nuts", 5).unwrap();

    assert_eq!(before.len(), after.len());
    for (a, b) in before.iter().zip(&after) {
        assert_eq!(a.page, b.page);
        assert_eq!(a.text, b.text);
        assert_eq!(a.similarity, b.similarity);
        assert_eq!(a.kind, b.kind);
    }
    assert_eq!(after[0].page, 3);
}

#[test]
fn keyword_only_matches_are_marked_and_down_weighted() {
    let tmp = tempfile::tempdir().unwrap();
    let pdf = tmp.path().join("manual.pdf");
    // The part number shares no embedding tokens with the filler pages.
    write_pdf(
        &pdf,
        &[
            PdfPage::text("Replacement bracket part number 54321-ABC fits all trims."),
            PdfPage::text("General safety precautions for lifting the vehicle."),
        ],
    );

    let config = EngineConfig {
        similarity_threshold: 0.9999,
        ..small_chunks_config()
    };
    let engine = engine_with(&tmp.path().join("store"), config);
    engine.build(&pdf).unwrap();

    let results = engine.search_hybrid("54321-abc", 10).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].kind, SearchKind::Keyword);
    assert_eq!(results[0].page, 1);
    // Full keyword overlap scores 1.0 before the fusion down-weight.
    let expected = engine.config().keyword_weight;
    assert!((results[0].similarity - expected).abs() < 1e-6);
}

#[test]
fn extracting_a_known_image_returns_its_bytes() {
    let tmp = tempfile::tempdir().unwrap();
    let pdf = tmp.path().join("manual.pdf");
    write_pdf(
        &pdf,
        &[PdfPage::with_images(
            "Exploded view of the alternator assembly.",
            &[[100.0, 0.0, 0.0, 100.0, 30.0, 300.0]],
        )],
    );

    let engine = engine_with(&tmp.path().join("store"), small_chunks_config());
    engine.build(&pdf).unwrap();

    let descriptors = engine.images_for_page(1);
    assert_eq!(descriptors.len(), 1);

    let bytes = engine
        .extract_image_bytes(&pdf, 1, descriptors[0].xref)
        .unwrap();
    assert_eq!(bytes.len(), 64);

    // A bogus object number is a lookup failure, not a panic.
    assert!(matches!(
        engine.extract_image_bytes(&pdf, 1, 9999),
        Err(Error::NotFound { .. })
    ));
}
