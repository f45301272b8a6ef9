//! Filesystem-based adapter definitions repository

use async_trait::async_trait;
use crosspost_domain::{AdapterDefinition, AdapterSpec, DefinitionError, DefinitionsRepo};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Loads `*.yaml`, `*.yml` and `*.json` definitions from one directory
pub struct FsDefinitionsRepo {
    definitions_dir: PathBuf,
}

impl FsDefinitionsRepo {
    /// Create a new filesystem definitions repo
    pub fn new(definitions_dir: impl AsRef<Path>) -> Result<Self, DefinitionError> {
        let definitions_dir = definitions_dir.as_ref().to_path_buf();

        if !definitions_dir.is_dir() {
            return Err(DefinitionError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!(
                    "Definitions directory not found: {}",
                    definitions_dir.display()
                ),
            )));
        }

        Ok(Self { definitions_dir })
    }

    pub fn dir(&self) -> &Path {
        &self.definitions_dir
    }

    /// Definition files sorted by filename
    fn definition_files(&self) -> std::io::Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(&self.definitions_dir)? {
            let path = entry?.path();
            if path.is_file() && Format::of(&path).is_some() {
                files.push(path);
            }
        }
        files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
        Ok(files)
    }

    fn load_file(path: &Path) -> Result<AdapterDefinition, DefinitionError> {
        let file = path.display().to_string();
        let content = std::fs::read_to_string(path)?;

        let spec: AdapterSpec = match Format::of(path) {
            Some(Format::Json) => serde_json::from_str(&content).map_err(|e| {
                DefinitionError::Parse {
                    file: file.clone(),
                    message: e.to_string(),
                }
            })?,
            _ => serde_yaml::from_str(&content).map_err(|e| DefinitionError::Parse {
                file: file.clone(),
                message: e.to_string(),
            })?,
        };

        AdapterDefinition::try_from(spec)
    }
}

#[derive(Clone, Copy)]
enum Format {
    Yaml,
    Json,
}

impl Format {
    fn of(path: &Path) -> Option<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Some(Format::Yaml),
            Some("json") => Some(Format::Json),
            _ => None,
        }
    }
}

#[async_trait]
impl DefinitionsRepo for FsDefinitionsRepo {
    async fn load_all(&self) -> Vec<Result<AdapterDefinition, DefinitionError>> {
        let files = match self.definition_files() {
            Ok(files) => files,
            Err(error) => return vec![Err(DefinitionError::Io(error))],
        };

        let mut ids_seen: HashMap<String, String> = HashMap::new();
        let mut results = Vec::with_capacity(files.len());

        for path in files {
            let file = path.display().to_string();
            let result = Self::load_file(&path).and_then(|definition| {
                if let Some(existing_file) = ids_seen.get(&definition.id) {
                    return Err(DefinitionError::DuplicateId {
                        id: definition.id,
                        files: vec![existing_file.clone(), file.clone()],
                    });
                }
                ids_seen.insert(definition.id.clone(), file.clone());
                Ok(definition)
            });

            match &result {
                Ok(definition) => {
                    tracing::debug!(platform = %definition.id, file = %file, "Loaded adapter definition")
                }
                Err(error) => tracing::debug!(file = %file, error = %error, "Rejected adapter definition"),
            }
            results.push(result);
        }

        tracing::info!(
            dir = %self.definitions_dir.display(),
            total = results.len(),
            valid = results.iter().filter(|r| r.is_ok()).count(),
            "Loaded adapter definitions"
        );

        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const DEMO_YAML: &str = r#"
id: demo
name: Demo
homepage: https://demo.test
capabilities: [article, draft]
auth:
  url: https://demo.test/api/me
  response:
    success: "$.login == true"
endpoints:
  create_draft:
    url: https://demo.test/api/drafts
    method: POST
    body:
      title: "{{article.title}}"
    response:
      extract:
        draft_id: "$.id"
draft_url: "https://demo.test/edit/{{draft_id}}"
"#;

    fn setup_test_dir() -> TempDir {
        TempDir::new().unwrap()
    }

    #[tokio::test]
    async fn test_load_yaml_definition() {
        let dir = setup_test_dir();
        std::fs::write(dir.path().join("demo.yaml"), DEMO_YAML).unwrap();

        let repo = FsDefinitionsRepo::new(dir.path()).unwrap();
        let definitions = repo.load().await;

        assert_eq!(definitions.len(), 1);
        assert_eq!(definitions[0].id, "demo");
        assert!(definitions[0].endpoint("create_draft").is_some());
        assert_eq!(
            definitions[0].draft_url_template.as_deref(),
            Some("https://demo.test/edit/{{draft_id}}")
        );
    }

    #[tokio::test]
    async fn test_load_json_definition_with_camel_case_keys() {
        let dir = setup_test_dir();
        let json = r#"{
            "id": "jsondemo",
            "displayName": "Json Demo",
            "homepage": "https://json.test",
            "authCheck": { "url": "https://json.test/me", "response": { "successExpr": "$.ok" } },
            "draftUrlTemplate": "https://json.test/d/{{draft_id}}"
        }"#;
        std::fs::write(dir.path().join("jsondemo.json"), json).unwrap();

        let repo = FsDefinitionsRepo::new(dir.path()).unwrap();
        let definitions = repo.load().await;

        assert_eq!(definitions.len(), 1);
        assert_eq!(definitions[0].display_name, "Json Demo");
    }

    #[tokio::test]
    async fn test_invalid_definition_does_not_block_others() {
        let dir = setup_test_dir();
        std::fs::write(dir.path().join("a_demo.yaml"), DEMO_YAML).unwrap();
        std::fs::write(
            dir.path().join("b_broken.yaml"),
            DEMO_YAML.replace("id: demo", "id: broken").replace("$.login == true", "$.a <= 1"),
        )
        .unwrap();
        std::fs::write(dir.path().join("c_garbage.yml"), "id: [unclosed").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let repo = FsDefinitionsRepo::new(dir.path()).unwrap();
        let results = repo.load_all().await;

        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(DefinitionError::Expression { .. })));
        assert!(matches!(results[2], Err(DefinitionError::Parse { .. })));

        let valid = repo.load().await;
        assert_eq!(valid.len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_id_rejects_later_file() {
        let dir = setup_test_dir();
        std::fs::write(dir.path().join("one.yaml"), DEMO_YAML).unwrap();
        std::fs::write(dir.path().join("two.yaml"), DEMO_YAML).unwrap();

        let repo = FsDefinitionsRepo::new(dir.path()).unwrap();
        let results = repo.load_all().await;

        assert!(results[0].is_ok());
        match &results[1] {
            Err(DefinitionError::DuplicateId { id, files }) => {
                assert_eq!(id, "demo");
                assert!(files[0].ends_with("one.yaml"));
                assert!(files[1].ends_with("two.yaml"));
            }
            other => panic!("expected duplicate id error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_directory_loads_nothing() {
        let dir = setup_test_dir();

        let repo = FsDefinitionsRepo::new(dir.path()).unwrap();

        assert!(repo.load_all().await.is_empty());
    }

    #[tokio::test]
    async fn test_nonexistent_directory() {
        let result = FsDefinitionsRepo::new("/nonexistent/path");
        assert!(result.is_err());
    }
}
