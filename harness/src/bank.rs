//! QuestionBank: questions grouped by category, loaded from JSON, TOML or YAML.
//!
//! Accepted shapes are a bare list of `{id, text, category}` records or a
//! table wrapping that list under `questions` (the only shape TOML allows).

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::Deserialize;

use crate::error::BankError;
use crate::types::{Category, Question};

/// Serialization format of a question bank source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BankFormat {
    Json,
    Toml,
    Yaml,
}

impl BankFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "json" => Some(Self::Json),
            "toml" => Some(Self::Toml),
            "yaml" | "yml" => Some(Self::Yaml),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct QuestionRecord {
    id: String,
    text: String,
    category: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BankSource {
    List(Vec<QuestionRecord>),
    Wrapped { questions: Vec<QuestionRecord> },
}

impl BankSource {
    fn into_records(self) -> Vec<QuestionRecord> {
        match self {
            BankSource::List(records) | BankSource::Wrapped { questions: records } => records,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuestionBank {
    by_category: BTreeMap<Category, Vec<Question>>,
}

impl QuestionBank {
    /// Load from a file; the format follows the extension
    pub fn load(path: impl AsRef<Path>) -> Result<Self, BankError> {
        let path = path.as_ref();
        let format =
            BankFormat::from_path(path).ok_or_else(|| BankError::UnsupportedFormat(path.into()))?;
        let content = std::fs::read_to_string(path).map_err(|source| BankError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let bank = Self::parse(&content, format).map_err(|err| match err {
            BankError::Parse { reason, .. } => BankError::Parse {
                path: path.to_path_buf(),
                reason,
            },
            other => other,
        })?;
        tracing::info!(
            path = %path.display(),
            questions = bank.len(),
            "Loaded question bank"
        );
        Ok(bank)
    }

    pub fn parse(content: &str, format: BankFormat) -> Result<Self, BankError> {
        let parse_error = |reason: String| BankError::Parse {
            path: Default::default(),
            reason,
        };
        let source: BankSource = match format {
            BankFormat::Json => {
                serde_json::from_str(content).map_err(|e| parse_error(e.to_string()))?
            }
            BankFormat::Toml => toml::from_str(content).map_err(|e| parse_error(e.to_string()))?,
            BankFormat::Yaml => {
                serde_yaml::from_str(content).map_err(|e| parse_error(e.to_string()))?
            }
        };

        let questions = source
            .into_records()
            .into_iter()
            .enumerate()
            .map(|(position, record)| {
                let category = Category::from_string(&record.category).ok_or_else(|| {
                    BankError::InvalidQuestion {
                        position,
                        reason: format!("unknown category '{}'", record.category),
                    }
                })?;
                Ok(Question::new(record.id, record.text, category))
            })
            .collect::<Result<Vec<_>, BankError>>()?;

        Self::from_questions(questions)
    }

    /// Build from already-typed questions, keeping their relative order
    pub fn from_questions(questions: Vec<Question>) -> Result<Self, BankError> {
        let mut seen = HashSet::new();
        let mut by_category: BTreeMap<Category, Vec<Question>> = BTreeMap::new();
        for (position, question) in questions.into_iter().enumerate() {
            if question.id.trim().is_empty() {
                return Err(BankError::InvalidQuestion {
                    position,
                    reason: "empty id".to_string(),
                });
            }
            if question.text.trim().is_empty() {
                return Err(BankError::InvalidQuestion {
                    position,
                    reason: format!("question '{}' has empty text", question.id),
                });
            }
            if !seen.insert(question.id.clone()) {
                return Err(BankError::DuplicateId(question.id));
            }
            by_category
                .entry(question.category)
                .or_default()
                .push(question);
        }
        Ok(Self { by_category })
    }

    /// Questions of one category in source order
    pub fn get(&self, category: Category) -> &[Question] {
        self.by_category
            .get(&category)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Every question: category order, then source order within a category
    pub fn all(&self) -> impl Iterator<Item = &Question> {
        self.by_category.values().flatten()
    }

    pub fn find(&self, id: &str) -> Option<&Question> {
        self.all().find(|q| q.id == id)
    }

    /// Categories holding at least one question
    pub fn categories(&self) -> impl Iterator<Item = Category> + '_ {
        self.by_category.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.by_category.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
