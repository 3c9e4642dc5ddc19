use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use manualrag::{
    DataDir, Engine, EngineConfig, Error, HashEmbedder, SearchResult,
    cli::{Cli, Command, SearchMode},
    error::Result,
};

fn init_tracing(verbose: u8) {
    let filter = if let Ok(env) = std::env::var("MANUALRAG_LOG") {
        EnvFilter::new(env)
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let data_dir = DataDir::resolve(cli.data_dir.as_deref())?;
    let mut config = EngineConfig::from_env()?;

    if let Command::Search {
        threshold: Some(t), ..
    } = &cli.command
    {
        config.similarity_threshold = *t;
    }

    let engine = Engine::new(data_dir, config, Arc::new(HashEmbedder::default()))?;

    match cli.command {
        Command::Build { document } => {
            engine.build(&document)?;
            let snapshot = engine.snapshot()?;
            println!(
                "Indexed {} chunks across {} pages with images.",
                snapshot.chunks.len(),
                snapshot.images.len()
            );
        }
        Command::Search {
            query,
            count,
            mode,
            json,
            ..
        } => {
            engine.load()?;
            let count = count.unwrap_or(engine.config().top_k);
            let results = match mode {
                SearchMode::Hybrid => engine.search_hybrid(&query, count)?,
                SearchMode::Semantic => engine.search_semantic(&query, count)?,
                SearchMode::Keyword => engine.search_keyword(&query, count)?,
            };
            if json {
                format_json(&results)?;
            } else {
                format_human(&results);
            }
        }
        Command::Images { page, json } => {
            engine.load()?;
            let descriptors = engine.images_for_page(page);
            if json {
                println!("{}", serde_json::to_string_pretty(&descriptors)?);
            } else if descriptors.is_empty() {
                println!("No images recorded on page {page}.");
            } else {
                for d in &descriptors {
                    println!(
                        "xref {} ({}x{}) at ({:.1}, {:.1})-({:.1}, {:.1}), area {:.1}",
                        d.xref, d.width, d.height, d.rect.x0, d.rect.y0, d.rect.x1, d.rect.y1,
                        d.area
                    );
                }
            }
        }
        Command::Extract {
            document,
            page,
            xref,
            output,
        } => {
            let bytes = engine.extract_image_bytes(&document, page, xref)?;
            let path = match output {
                Some(path) => path,
                None => engine
                    .data_dir()
                    .images_dir()?
                    .join(format!("page_{page}_img_{xref}.bin")),
            };
            std::fs::write(&path, &bytes)?;
            println!("Wrote {} bytes to {}", bytes.len(), path.display());
        }
        Command::Status { json } => {
            let loaded = engine.load();
            cmd_status(&engine, loaded, json)?;
        }
    }

    Ok(())
}

fn cmd_status(engine: &Engine, loaded: Result<()>, json: bool) -> Result<()> {
    let root = engine.data_dir().root().display().to_string();
    match loaded {
        Ok(()) => {
            let snapshot = engine.snapshot()?;
            if json {
                println!(
                    "{}",
                    serde_json::json!({
                        "data_dir": root,
                        "ready": true,
                        "chunks": snapshot.chunks.len(),
                        "dimension": snapshot.index.dimension(),
                        "image_pages": snapshot.images.len(),
                    })
                );
            } else {
                println!("Data directory: {root}");
                println!("Chunks: {}", snapshot.chunks.len());
                println!("Vector dimension: {}", snapshot.index.dimension());
                println!("Pages with images: {}", snapshot.images.len());
            }
        }
        Err(Error::NotFound { .. }) => {
            if json {
                println!(
                    "{}",
                    serde_json::json!({ "data_dir": root, "ready": false })
                );
            } else {
                println!("Data directory: {root}");
                println!("No index built yet.");
            }
        }
        Err(e) => return Err(e),
    }
    Ok(())
}

fn format_human(results: &[SearchResult]) {
    if results.is_empty() {
        println!("No results.");
        return;
    }
    for (i, r) in results.iter().enumerate() {
        println!(
            "{}. p.{} [{}] {:.3}",
            i + 1,
            r.page,
            match r.kind {
                manualrag::SearchKind::Semantic => "semantic",
                manualrag::SearchKind::Keyword => "keyword",
            },
            r.similarity
        );
        for line in r.text.lines().take(3) {
            println!("   {line}");
        }
        println!();
    }
}

fn format_json(results: &[SearchResult]) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(results)?);
    Ok(())
}
