use crate::models::{Candidate, Consulta};
use log::debug;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

/// Catalog loading is the one fatal startup path: a missing or malformed
/// document aborts initialization, unlike remote-tally errors which are
/// always non-fatal.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read catalog document at {path}: {source}")]
    Unreachable {
        path: String,
        source: std::io::Error,
    },
    #[error("malformed catalog document at {path}: {source}")]
    Malformed {
        path: String,
        source: serde_json::Error,
    },
    #[error("catalog document at {path} contains no candidates")]
    Empty { path: String },
}

#[derive(Debug, Deserialize)]
struct CatalogDocument {
    records: Vec<Candidate>,
    consultas: Vec<Consulta>,
}

/// Read-only registry of candidates and their consulta membership.
/// Loaded once at startup and never mutated.
#[derive(Debug)]
pub struct Catalog {
    records: Vec<Candidate>,
    consultas: Vec<Consulta>,
    by_slug: HashMap<String, usize>,
    consulta_by_candidate: HashMap<String, String>,
}

impl Catalog {
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let raw = std::fs::read_to_string(path).map_err(|source| CatalogError::Unreachable {
            path: path.display().to_string(),
            source,
        })?;
        let document: CatalogDocument =
            serde_json::from_str(&raw).map_err(|source| CatalogError::Malformed {
                path: path.display().to_string(),
                source,
            })?;
        if document.records.is_empty() {
            return Err(CatalogError::Empty {
                path: path.display().to_string(),
            });
        }
        Ok(Self::from_parts(document.records, document.consultas))
    }

    pub fn from_parts(records: Vec<Candidate>, consultas: Vec<Consulta>) -> Self {
        let by_slug: HashMap<String, usize> = records
            .iter()
            .enumerate()
            .map(|(i, r)| (r.slug.clone(), i))
            .collect();

        // Candidate display name -> consulta title, used to attribute a
        // chosen value back to its ballot section. Unresolved slugs are
        // skipped, matching how they are treated everywhere else.
        let mut consulta_by_candidate = HashMap::new();
        for consulta in &consultas {
            for slug in &consulta.candidates {
                match by_slug.get(slug) {
                    Some(&i) => {
                        consulta_by_candidate
                            .insert(records[i].name.clone(), consulta.title.clone());
                    }
                    None => debug!(
                        "consulta '{}' references unknown candidate slug '{}', skipping",
                        consulta.title, slug
                    ),
                }
            }
        }

        Self {
            records,
            consultas,
            by_slug,
            consulta_by_candidate,
        }
    }

    pub fn candidate(&self, slug: &str) -> Option<&Candidate> {
        self.by_slug.get(slug).map(|&i| &self.records[i])
    }

    pub fn consultas(&self) -> &[Consulta] {
        &self.consultas
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.records
    }

    pub fn consulta_title_for(&self, candidate_name: &str) -> Option<&str> {
        self.consulta_by_candidate
            .get(candidate_name)
            .map(String::as_str)
    }

    /// Resolved candidates of one consulta, in document order, with
    /// unresolved slugs dropped.
    pub fn members_of<'a>(&'a self, consulta: &'a Consulta) -> impl Iterator<Item = &'a Candidate> {
        consulta
            .candidates
            .iter()
            .filter_map(move |slug| self.candidate(slug))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(name: &str, slug: &str) -> Candidate {
        Candidate {
            name: name.to_string(),
            slug: slug.to_string(),
            photo: String::new(),
            logo: String::new(),
        }
    }

    fn consulta(title: &str, slugs: &[&str]) -> Consulta {
        Consulta {
            title: title.to_string(),
            subtitle: None,
            candidates: slugs.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn indexes_candidates_by_slug() {
        let catalog = Catalog::from_parts(
            vec![candidate("Ana", "ana"), candidate("Berta", "berta")],
            vec![consulta("Primera", &["ana", "berta"])],
        );
        assert_eq!(catalog.candidate("ana").unwrap().name, "Ana");
        assert!(catalog.candidate("nadie").is_none());
        assert_eq!(catalog.consulta_title_for("Berta"), Some("Primera"));
    }

    #[test]
    fn unresolved_slugs_are_skipped_not_errors() {
        let catalog = Catalog::from_parts(
            vec![candidate("Ana", "ana")],
            vec![consulta("Primera", &["ana", "fantasma"])],
        );
        let first = catalog.consultas()[0].clone();
        let members: Vec<_> = catalog
            .members_of(&first)
            .map(|c| c.name.clone())
            .collect();
        assert_eq!(members, vec!["Ana"]);
    }

    #[test]
    fn malformed_document_is_a_fatal_error() {
        let path = std::env::temp_dir().join(format!("catalog-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(&path, "{ not json").unwrap();
        let err = Catalog::load(&path).unwrap_err();
        assert!(matches!(err, CatalogError::Malformed { .. }));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn unreachable_document_is_a_fatal_error() {
        let path = std::env::temp_dir().join("does-not-exist-urna-viva.json");
        let err = Catalog::load(&path).unwrap_err();
        assert!(matches!(err, CatalogError::Unreachable { .. }));
    }

    #[test]
    fn load_parses_the_document_shape() {
        let path = std::env::temp_dir().join(format!("catalog-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(
            &path,
            r#"{
                "records": [
                    {"name": "Ana", "slug": "ana", "photo": "a.png", "logo": "l.png"}
                ],
                "consultas": [
                    {"title": "Primera", "subtitle": "Salud", "candidates": ["ana"]}
                ]
            }"#,
        )
        .unwrap();
        let catalog = Catalog::load(&path).unwrap();
        assert_eq!(catalog.candidates().len(), 1);
        assert_eq!(
            catalog.consultas()[0].subtitle.as_deref(),
            Some("Salud")
        );
        std::fs::remove_file(&path).ok();
    }
}
