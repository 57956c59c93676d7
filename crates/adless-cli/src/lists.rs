//! Block-list sources: local files or http(s) URLs.

use std::path::Path;
use std::time::{Duration, Instant};

use adless_compiler::{compile_lists, Compilation};

use crate::fetch::Fetcher;

/// One loaded block-list.
#[derive(Debug, Clone)]
pub struct LoadedList {
    pub source: String,
    pub text: String,
}

fn is_remote(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

/// Load every source in order. Any failure fails the whole load.
pub async fn load_sources(sources: &[String], fetcher: &Fetcher, timeout: Duration) -> Result<Vec<LoadedList>, String> {
    if sources.is_empty() {
        return Err("No block-list sources specified".to_string());
    }

    let mut lists = Vec::with_capacity(sources.len());
    for source in sources {
        let text = if is_remote(source) {
            fetcher
                .fetch_text(source, timeout)
                .await
                .map_err(|e| format!("Failed to fetch '{}': {}", source, e))?
        } else {
            tokio::fs::read_to_string(source)
                .await
                .map_err(|e| format!("Failed to read '{}': {}", source, e))?
        };
        lists.push(LoadedList {
            source: source.clone(),
            text,
        });
    }
    Ok(lists)
}

/// Compile loaded lists; list ids follow source order.
pub fn compile_loaded(lists: &[LoadedList], verbose: bool) -> Result<Compilation, String> {
    let start = Instant::now();
    let inputs: Vec<(u16, &str)> = lists
        .iter()
        .enumerate()
        .map(|(id, list)| (id.min(u16::MAX as usize) as u16, list.text.as_str()))
        .collect();

    if verbose {
        for (id, list) in lists.iter().enumerate() {
            let name = Path::new(&list.source)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| list.source.clone());
            println!("  [{}] {} - {} lines", id, name, list.text.lines().count());
        }
    }

    let compilation = compile_lists(&inputs).map_err(|e| e.to_string())?;
    log::debug!("compiled {} list(s) in {:.1}ms", lists.len(), start.elapsed().as_secs_f64() * 1000.0);
    Ok(compilation)
}
