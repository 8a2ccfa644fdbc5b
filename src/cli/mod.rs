//! Operator subcommands. Each opens its own store from the loaded config.

pub mod ask;
pub mod backfill;
pub mod conversations;
pub mod doctor;
pub mod reset;
pub mod search;
pub mod stats;

use anyhow::{Context, Result};

use parley::config::ParleyConfig;
use parley::history::Store;

fn open_store(config: &ParleyConfig) -> Result<Store> {
    let db_path = config.resolved_db_path();
    Store::open(&db_path).with_context(|| format!("failed to open database at {}", db_path.display()))
}

/// First `max` characters of `text` on one line, with an ellipsis when cut.
fn preview(text: &str, max: usize) -> String {
    let flat = text.replace('\n', " ");
    if flat.chars().count() > max {
        let cut: String = flat.chars().take(max).collect();
        format!("{cut}...")
    } else {
        flat
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_truncates_on_char_boundary() {
        assert_eq!(preview("short", 10), "short");
        assert_eq!(preview("ééééé", 3), "ééé...");
        assert_eq!(preview("a\nb", 10), "a b");
    }
}
