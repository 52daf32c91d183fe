//! Task categories - the closed, typed set of things a sprint can generate.
//!
//! Categories are defined at startup (builtin per sprint kind, or from
//! config) and never mutated afterwards. The catalog fixes a stable order
//! that weighted selection walks deterministically.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SwarmError};

/// What shape of artifact a category produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    /// Structured JSON payload, parsed best-effort after generation
    Json,
    /// Markdown document
    Markdown,
    /// Plain text
    Text,
}

/// One immutable task category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskCategory {
    /// Stable identifier, unique within a catalog
    pub key: String,
    /// System prompt sent with every task of this category
    pub system_prompt: String,
    /// User prompt template; `{seq}` is replaced with the task sequence id
    pub user_prompt_template: String,
    /// Expected artifact shape
    pub output_kind: OutputKind,
    /// Initial selection weight (must be > 0)
    pub weight_seed: f64,
    /// Rough value-per-artifact in USD, used by evaluators as a signal
    pub estimated_value: f64,
}

impl TaskCategory {
    /// Render the user prompt for a concrete task instance.
    pub fn render_user_prompt(&self, sequence_id: u64) -> String {
        self.user_prompt_template
            .replace("{seq}", &sequence_id.to_string())
    }
}

/// Which builtin category mix a sprint runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SprintKind {
    /// Long-form and social content artifacts
    Content,
    /// Outbound messaging artifacts
    Outreach,
    /// Both mixes combined
    Mixed,
}

impl std::fmt::Display for SprintKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SprintKind::Content => write!(f, "content"),
            SprintKind::Outreach => write!(f, "outreach"),
            SprintKind::Mixed => write!(f, "mixed"),
        }
    }
}

/// Validated, immutable set of categories in a fixed stable order.
#[derive(Debug, Clone)]
pub struct Catalog {
    categories: Vec<TaskCategory>,
}

impl Catalog {
    /// Build a catalog from explicit categories.
    ///
    /// Rejects empty catalogs, duplicate keys, and non-positive seed
    /// weights - all of which are startup errors, not task failures.
    pub fn new(categories: Vec<TaskCategory>) -> Result<Self> {
        if categories.is_empty() {
            return Err(SwarmError::Catalog("catalog has no categories".to_string()));
        }

        let mut seen = std::collections::HashSet::new();
        for category in &categories {
            if category.key.trim().is_empty() {
                return Err(SwarmError::Catalog("category with empty key".to_string()));
            }
            if !seen.insert(category.key.clone()) {
                return Err(SwarmError::Catalog(format!(
                    "duplicate key: {}",
                    category.key
                )));
            }
            if !(category.weight_seed > 0.0) {
                return Err(SwarmError::Catalog(format!(
                    "category {} has non-positive weight seed {}",
                    category.key, category.weight_seed
                )));
            }
        }

        Ok(Self { categories })
    }

    /// Builtin catalog for a sprint kind.
    pub fn for_sprint_kind(kind: SprintKind) -> Self {
        let categories = match kind {
            SprintKind::Content => content_categories(),
            SprintKind::Outreach => outreach_categories(),
            SprintKind::Mixed => {
                let mut all = content_categories();
                all.extend(outreach_categories());
                all
            }
        };

        // Builtin sets are well-formed by construction
        Self::new(categories).expect("builtin catalog must be valid")
    }

    /// Categories in their stable order.
    pub fn categories(&self) -> &[TaskCategory] {
        &self.categories
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// Look up a category by key.
    pub fn get(&self, key: &str) -> Option<&TaskCategory> {
        self.categories.iter().find(|c| c.key == key)
    }
}

fn content_categories() -> Vec<TaskCategory> {
    vec![
        TaskCategory {
            key: "blog_post".to_string(),
            system_prompt: "You write concise, well-structured blog posts for a technical audience."
                .to_string(),
            user_prompt_template:
                "Write a blog post draft (post #{seq} in this batch). Return markdown with a title line."
                    .to_string(),
            output_kind: OutputKind::Markdown,
            weight_seed: 3.0,
            estimated_value: 0.50,
        },
        TaskCategory {
            key: "social_thread".to_string(),
            system_prompt: "You write punchy social media threads that summarize one idea."
                .to_string(),
            user_prompt_template:
                "Write a 5-part social thread (thread #{seq}). Return JSON: {\"posts\": [..]}."
                    .to_string(),
            output_kind: OutputKind::Json,
            weight_seed: 2.0,
            estimated_value: 0.20,
        },
        TaskCategory {
            key: "newsletter_blurb".to_string(),
            system_prompt: "You write short newsletter blurbs with a single clear call to action."
                .to_string(),
            user_prompt_template: "Write a newsletter blurb (blurb #{seq}), 80-120 words."
                .to_string(),
            output_kind: OutputKind::Text,
            weight_seed: 1.0,
            estimated_value: 0.10,
        },
    ]
}

fn outreach_categories() -> Vec<TaskCategory> {
    vec![
        TaskCategory {
            key: "cold_email".to_string(),
            system_prompt: "You write short, personalized cold outreach emails.".to_string(),
            user_prompt_template:
                "Write a cold email (email #{seq}). Return JSON: {\"subject\": .., \"body\": ..}."
                    .to_string(),
            output_kind: OutputKind::Json,
            weight_seed: 3.0,
            estimated_value: 0.40,
        },
        TaskCategory {
            key: "follow_up".to_string(),
            system_prompt: "You write polite, brief follow-up messages that reference prior context."
                .to_string(),
            user_prompt_template:
                "Write a follow-up email (message #{seq}). Return JSON: {\"subject\": .., \"body\": ..}."
                    .to_string(),
            output_kind: OutputKind::Json,
            weight_seed: 2.0,
            estimated_value: 0.25,
        },
    ]
}
