//! SuiteBuilder: deterministic question selection

use std::collections::HashSet;

use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::bank::QuestionBank;
use crate::error::BankError;
use crate::types::{Category, Question};

/// Which questions a suite draws from the bank
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum SelectionPolicy {
    All,
    Category { category: Category },
    /// Seeded sample without replacement; same seed, same sample
    Sample { size: usize, seed: u64 },
}

impl std::fmt::Display for SelectionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SelectionPolicy::All => write!(f, "all"),
            SelectionPolicy::Category { category } => write!(f, "category:{category}"),
            SelectionPolicy::Sample { size, seed } => write!(f, "sample:{size}@{seed}"),
        }
    }
}

/// Ordered questions a run executes
#[derive(Debug, Clone, PartialEq)]
pub struct Suite {
    pub name: String,
    pub selection: SelectionPolicy,
    questions: Vec<Question>,
}

impl Suite {
    /// Ad-hoc suite outside any bank; ids must be unique
    pub fn from_questions(
        name: impl Into<String>,
        questions: Vec<Question>,
    ) -> Result<Self, BankError> {
        let mut seen = HashSet::new();
        if let Some(dup) = questions.iter().find(|q| !seen.insert(q.id.as_str())) {
            return Err(BankError::DuplicateId(dup.id.clone()));
        }
        Ok(Self {
            name: name.into(),
            selection: SelectionPolicy::All,
            questions,
        })
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }
}

pub struct SuiteBuilder {
    name: String,
}

impl SuiteBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn build(&self, bank: &QuestionBank, policy: SelectionPolicy) -> Result<Suite, BankError> {
        let questions = select(bank, &policy)?;
        tracing::debug!(
            suite = %self.name,
            selection = %policy,
            questions = questions.len(),
            "Built suite"
        );
        Ok(Suite {
            name: self.name.clone(),
            selection: policy,
            questions,
        })
    }
}

/// Ordered questions for `policy`; samples keep bank order
pub fn select(bank: &QuestionBank, policy: &SelectionPolicy) -> Result<Vec<Question>, BankError> {
    match policy {
        SelectionPolicy::All => Ok(bank.all().cloned().collect()),
        SelectionPolicy::Category { category } => Ok(bank.get(*category).to_vec()),
        SelectionPolicy::Sample { size, seed } => {
            let pool: Vec<&Question> = bank.all().collect();
            if *size > pool.len() {
                return Err(BankError::SampleTooLarge {
                    requested: *size,
                    available: pool.len(),
                });
            }
            let mut rng = StdRng::seed_from_u64(*seed);
            let mut picked = rand::seq::index::sample(&mut rng, pool.len(), *size).into_vec();
            picked.sort_unstable();
            Ok(picked.into_iter().map(|i| pool[i].clone()).collect())
        }
    }
}
