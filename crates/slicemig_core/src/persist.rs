use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use log::info;

use crate::document::Document;

pub fn document_path(output_dir: &Path, document_id: &str) -> Result<PathBuf> {
    if document_id.trim().is_empty()
        || document_id.contains(['/', '\\'])
        || document_id == "."
        || document_id == ".."
    {
        bail!("document id is not usable as a file name: {document_id:?}");
    }
    Ok(output_dir.join(format!("{document_id}.json")))
}

/// Writes `{output_dir}/{id}.json`, creating the directory if needed and
/// replacing any previous file for the same document.
pub fn save_document(output_dir: &Path, document: &Document) -> Result<PathBuf> {
    let path = document_path(output_dir, &document.id)?;
    fs::create_dir_all(output_dir)
        .with_context(|| format!("failed to create {}", output_dir.display()))?;
    let rendered = serde_json::to_string_pretty(document)
        .with_context(|| format!("failed to serialize document {}", document.id))?;
    fs::write(&path, rendered).with_context(|| format!("failed to write {}", path.display()))?;
    info!("saved document {} to {}", document.id, path.display());
    Ok(path)
}

pub fn save_documents(output_dir: &Path, documents: &[Document]) -> Result<Vec<PathBuf>> {
    documents
        .iter()
        .map(|document| save_document(output_dir, document))
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};
    use tempfile::tempdir;

    use super::*;

    fn document(id: &str, title: &str) -> Document {
        serde_json::from_value(json!({
            "id": id,
            "lang": "fr-fr",
            "data": { "title": title, "body": [] }
        }))
        .expect("document")
    }

    #[test]
    fn save_document_creates_directory_and_pretty_prints() {
        let temp = tempdir().expect("tempdir");
        let output_dir = temp.path().join("updated_documents");

        let path = save_document(&output_dir, &document("X1", "Accueil")).expect("save");
        assert_eq!(path, output_dir.join("X1.json"));

        let content = fs::read_to_string(&path).expect("read");
        assert!(content.starts_with("{\n  \""));
        assert!(content.contains("\n    \"title\": \"Accueil\""));
        let parsed: Value = serde_json::from_str(&content).expect("parse");
        assert_eq!(parsed["id"], "X1");
    }

    #[test]
    fn save_document_overwrites_existing_file() {
        let temp = tempdir().expect("tempdir");
        let output_dir = temp.path().join("out");

        save_document(&output_dir, &document("X1", "first")).expect("first save");
        let path = save_document(&output_dir, &document("X1", "second")).expect("second save");

        let parsed: Value =
            serde_json::from_str(&fs::read_to_string(path).expect("read")).expect("parse");
        assert_eq!(parsed["data"]["title"], "second");
        assert_eq!(fs::read_dir(&output_dir).expect("list").count(), 1);
    }

    #[test]
    fn save_documents_writes_one_file_each() {
        let temp = tempdir().expect("tempdir");
        let output_dir = temp.path().join("out");
        let paths = save_documents(
            &output_dir,
            &[document("A", "a"), document("B", "b")],
        )
        .expect("save");
        assert_eq!(paths, vec![output_dir.join("A.json"), output_dir.join("B.json")]);
        assert!(paths.iter().all(|path| path.exists()));
    }

    #[test]
    fn document_path_rejects_path_like_ids() {
        let dir = Path::new("out");
        assert!(document_path(dir, "../escape").is_err());
        assert!(document_path(dir, "a\\b").is_err());
        assert!(document_path(dir, " ").is_err());
        assert_eq!(
            document_path(dir, "YxQ2").expect("path"),
            dir.join("YxQ2.json")
        );
    }
}
