use pretty_assertions::assert_eq;
use std::sync::Arc;
use unified_code_chunker::{
    ChunkType, Chunker, ChunkingMode, ConfigManager, FixedMemoryProvider, OptionsOverride,
    ProcessingResult, SourceUnit, MAX_COMPLEXITY_SCORE,
};

const SOURCES: &[(&str, &str)] = &[
    ("linked_list.go", include_str!("fixtures/linked_list.go")),
    (
        "shapes.py",
        r#"import math


class Circle:
    """A circle."""

    def __init__(self, radius):
        self.radius = radius

    def area(self):
        return math.pi * self.radius ** 2


def describe(shape):
    if shape.area() > 10:
        return "big"
    return "small"
"#,
    ),
    (
        "app.js",
        r"function greet(name) {
  return `hello ${name}`;
}

class Counter {
  constructor() {
    this.count = 0;
  }

  increment() {
    this.count += 1;
    return this.count;
  }
}
",
    ),
    (
        "broken.rs",
        "fn ok() {\n    let x = 1;\n}\n\nfn broken( {\n    let = ;\n\nstruct {{{\n",
    ),
    (
        "notes.md",
        "# Notes\n\nFirst section body text.\n\n## Details\n\nSecond section body text goes here.\n",
    ),
    (
        "script.sh",
        "#!/bin/bash\nset -e\n\nbuild() {\n  cargo build --release\n}\n\nbuild\n",
    ),
];

fn modes() -> Vec<ConfigManager> {
    let mut configs: Vec<_> = [
        ChunkingMode::Default,
        ChunkingMode::HighPerformance,
        ChunkingMode::HighQuality,
        ChunkingMode::LanguageSpecific,
    ]
    .into_iter()
    .map(|mode| ConfigManager::new(mode).expect("valid mode"))
    .collect();
    configs.push(
        ConfigManager::custom(OptionsOverride {
            min_chunk_size: Some(10),
            max_chunk_size: Some(120),
            max_lines: Some(8),
            line_window: Some(4),
            overlap_lines: Some(1),
            ..Default::default()
        })
        .expect("valid custom preset"),
    );
    configs
}

fn run(config: &ConfigManager, path: &str, content: &str) -> ProcessingResult {
    Chunker::builder(config.clone())
        .memory_provider(Arc::new(FixedMemoryProvider::new(10.0)))
        .build()
        .expect("valid config")
        .process_file(&SourceUnit::new(path, content))
        .expect("memory is normal")
}

#[test]
fn chunks_respect_bounds_for_every_mode_and_language() {
    for config in modes() {
        for (path, content) in SOURCES {
            let result = run(&config, path, content);
            let options = config
                .resolve(result.language, None)
                .expect("resolved options");
            let label = format!("{path} in {:?}", config.mode());

            assert!(result.success, "{label}");
            assert!(!result.chunks.is_empty(), "{label}");
            for (i, chunk) in result.chunks.iter().enumerate() {
                assert!(chunk.start_line >= 1, "{label}");
                assert!(chunk.start_line <= chunk.end_line, "{label}");
                assert!(chunk.complexity_score <= MAX_COMPLEXITY_SCORE, "{label}");
                if let Some(parent) = chunk.parent_index {
                    assert!(parent < i, "{label}: parent must precede child");
                }
                if chunk.chunk_type != ChunkType::FullContent {
                    let chars = chunk.char_len();
                    assert!(chars >= options.min_chunk_size, "{label}: {chars} chars");
                    assert!(chars <= options.max_chunk_size, "{label}: {chars} chars");
                }
            }
        }
    }
}

#[test]
fn fallback_only_moves_forward() {
    for config in modes() {
        for (path, content) in SOURCES {
            let result = run(&config, path, content);
            let label = format!("{path} in {:?}", config.mode());

            for pair in result.transitions.windows(2) {
                assert_eq!(pair[0].to, pair[1].from, "{label}");
            }
            for transition in &result.transitions {
                assert!(transition.from < transition.to, "{label}");
            }
            if let Some(last) = result.transitions.last() {
                assert_eq!(result.strategy_used, last.to, "{label}");
                assert!(result.fallback_reason.is_some(), "{label}");
            } else {
                assert_eq!(result.fallback_reason, None, "{label}");
            }
        }
    }
}

#[test]
fn chunking_is_deterministic() {
    for config in modes() {
        let chunker = Chunker::builder(config.clone())
            .memory_provider(Arc::new(FixedMemoryProvider::new(10.0)))
            .build()
            .unwrap();
        for (path, content) in SOURCES {
            let unit = SourceUnit::new(*path, *content);
            let first = chunker.process_file(&unit).unwrap();
            // Second pass may be served from the cache
            let second = chunker.process_file(&unit).unwrap();
            // Fresh chunker, cold cache
            let third = run(&config, path, content);

            assert_eq!(first.chunks, second.chunks, "{path}");
            assert_eq!(first.chunks, third.chunks, "{path}");
            assert_eq!(first.strategy_used, third.strategy_used, "{path}");
        }
    }
}

#[test]
fn whole_file_chunk_covers_the_trimmed_source() {
    let content = "\n\n  x = 1  \n\n";
    let result = run(&ConfigManager::default(), "tiny.rs", content);
    assert_eq!(result.chunks.len(), 1);
    let chunk = &result.chunks[0];
    assert_eq!(chunk.chunk_type, ChunkType::FullContent);
    assert_eq!(chunk.content, content.trim());
    assert_eq!((chunk.start_line, chunk.end_line), (3, 3));
}
