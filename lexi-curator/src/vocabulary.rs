//! Vocabulary input for the `run` command
//!
//! Accepts a JSON array of items, or a directory of lesson CSV files
//! (`word,translation` with a header line, lesson id = file stem).

use lexi_common::{Error, Result};
use std::path::Path;

use crate::models::VocabularyItem;
use crate::services::query_builder::category_for_lesson;

/// Load vocabulary from a JSON file or a directory of lesson CSVs
///
/// Items without a category get the one implied by their lesson id.
pub async fn load_vocabulary(path: &Path) -> Result<Vec<VocabularyItem>> {
    let metadata = tokio::fs::metadata(path).await?;
    let mut items = if metadata.is_dir() {
        load_csv_dir(path).await?
    } else {
        let bytes = tokio::fs::read(path).await?;
        serde_json::from_slice::<Vec<VocabularyItem>>(&bytes)?
    };

    for item in &mut items {
        if item.category.is_none() && !item.lesson_id.is_empty() {
            item.category = Some(category_for_lesson(&item.lesson_id).to_string());
        }
    }

    tracing::info!(path = %path.display(), words = items.len(), "Loaded vocabulary");
    Ok(items)
}

async fn load_csv_dir(dir: &Path) -> Result<Vec<VocabularyItem>> {
    let mut files = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().is_some_and(|e| e.eq_ignore_ascii_case("csv")) {
            files.push(path);
        }
    }
    files.sort();

    let mut items = Vec::new();
    for file in files {
        let Some(lesson_id) = file.file_stem().map(|s| s.to_string_lossy().to_string()) else {
            continue;
        };
        let text = tokio::fs::read_to_string(&file).await?;
        let parsed = parse_lesson_csv(&lesson_id, &text);
        if parsed.is_empty() {
            tracing::warn!(file = %file.display(), "Lesson file has no vocabulary rows");
        }
        items.extend(parsed);
    }

    if items.is_empty() {
        return Err(Error::InvalidInput(format!(
            "No vocabulary found in {}",
            dir.display()
        )));
    }
    Ok(items)
}

/// Rows of `word,translation[,...]` after a header line
pub fn parse_lesson_csv(lesson_id: &str, text: &str) -> Vec<VocabularyItem> {
    text.lines()
        .skip(1)
        .filter_map(|line| {
            let mut parts = line.split(',').map(str::trim);
            let word = parts.next().filter(|w| !w.is_empty())?;
            let translation = parts.next().filter(|t| !t.is_empty())?;
            Some(VocabularyItem {
                word_id: None,
                word: word.to_string(),
                translation: translation.to_string(),
                lesson_id: lesson_id.to_string(),
                category: None,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_lesson_csv_skips_header_and_short_rows() {
        let items = parse_lesson_csv(
            "lesson_02_numbers",
            "portuguese,english\num,one\ndois , two\nbroken\n\ntrês,three,extra\n",
        );
        let words: Vec<_> = items.iter().map(|i| (i.word.as_str(), i.translation.as_str())).collect();
        assert_eq!(words, vec![("um", "one"), ("dois", "two"), ("três", "three")]);
        assert!(items.iter().all(|i| i.lesson_id == "lesson_02_numbers"));
    }

    #[tokio::test]
    async fn test_load_csv_dir_assigns_categories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("lesson_01_greetings.csv"), "pt,en\nolá,hello\n").unwrap();
        std::fs::write(dir.path().join("lesson_02_numbers.csv"), "pt,en\ntrês,three\n").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let items = load_vocabulary(dir.path()).await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].word, "olá");
        assert_eq!(items[0].category.as_deref(), Some(category_for_lesson("lesson_01_greetings")));
        assert_eq!(items[1].category.as_deref(), Some(category_for_lesson("lesson_02_numbers")));
    }

    #[tokio::test]
    async fn test_load_json_keeps_explicit_category() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vocab.json");
        std::fs::write(
            &path,
            r#"[{"word":"três","translation":"three","lesson_id":"lesson_02_numbers","category":"custom"},
                {"word":"gato","translation":"cat"}]"#,
        )
        .unwrap();

        let items = load_vocabulary(&path).await.unwrap();
        assert_eq!(items[0].category.as_deref(), Some("custom"));
        assert_eq!(items[1].category, None, "no lesson, no implied category");
    }

    #[tokio::test]
    async fn test_empty_csv_dir_is_invalid_input() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_vocabulary(dir.path()).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }
}
