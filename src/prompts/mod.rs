//! 提示词注册表 - 按类别管理模板并进行变量校验与渲染

use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::Serialize;
use thiserror::Error;
use tracing::warn;

mod templates;

use templates::{BUILTIN_TEMPLATES, CHAIN_OF_THOUGHT};

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([a-z_][a-z0-9_]*)\}").unwrap());

/// Text substituted for optional variables the caller did not supply.
const NOT_PROVIDED: &str = "Not provided";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptCategory {
    Research,
    Analysis,
    Reporting,
}

impl PromptCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            PromptCategory::Research => "research",
            PromptCategory::Analysis => "analysis",
            PromptCategory::Reporting => "reporting",
        }
    }
}

impl fmt::Display for PromptCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PromptError {
    #[error("Prompt '{category}.{name}' not found")]
    UnknownPrompt {
        category: PromptCategory,
        name: String,
    },
    #[error("Missing required variables for {prompt}: {missing:?}")]
    MissingVariables { prompt: String, missing: Vec<String> },
    #[error("Unresolved placeholders in {prompt}: {placeholders:?}")]
    UnresolvedPlaceholders {
        prompt: String,
        placeholders: Vec<String>,
    },
}

/// 提示词模板
#[derive(Debug, Clone, Copy)]
pub struct PromptTemplate {
    pub category: PromptCategory,
    pub name: &'static str,
    pub body: &'static str,
    pub role: &'static str,
    pub expertise: &'static [&'static str],
    pub required: &'static [&'static str],
    pub optional: &'static [&'static str],
}

impl PromptTemplate {
    fn qualified_name(&self) -> String {
        format!("{}.{}", self.category, self.name)
    }

    /// Body followed by the reasoning instructions and the role context.
    pub fn enhanced(&self) -> String {
        let expertise = self
            .expertise
            .iter()
            .map(|item| format!("- {}", item))
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            "{}\n{}\nROLE CONTEXT:\nYou are acting as a {} with expertise in:\n{}\n\nKeep this professional perspective throughout the analysis.\n",
            self.body, CHAIN_OF_THOUGHT, self.role, expertise
        )
    }

    fn accepts(&self, variable: &str) -> bool {
        self.required.contains(&variable) || self.optional.contains(&variable)
    }
}

/// 提示词注册表
#[derive(Debug, Clone)]
pub struct PromptRegistry {
    templates: Vec<PromptTemplate>,
}

impl Default for PromptRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptRegistry {
    pub fn new() -> Self {
        Self {
            templates: BUILTIN_TEMPLATES.to_vec(),
        }
    }

    pub fn get(&self, category: PromptCategory, name: &str) -> Result<&PromptTemplate, PromptError> {
        self.templates
            .iter()
            .find(|t| t.category == category && t.name == name)
            .ok_or_else(|| PromptError::UnknownPrompt {
                category,
                name: name.to_string(),
            })
    }

    pub fn list(&self, category: PromptCategory) -> Vec<&'static str> {
        self.templates
            .iter()
            .filter(|t| t.category == category)
            .map(|t| t.name)
            .collect()
    }

    /// 渲染模板
    ///
    /// Missing optional variables render as "Not provided". Values are inserted
    /// verbatim and never rescanned, so JSON in a value is safe.
    pub fn render(
        &self,
        category: PromptCategory,
        name: &str,
        variables: &BTreeMap<String, String>,
    ) -> Result<String, PromptError> {
        let template = self.get(category, name)?;

        let missing: Vec<String> = template
            .required
            .iter()
            .filter(|var| !variables.contains_key(**var))
            .map(|var| var.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(PromptError::MissingVariables {
                prompt: template.qualified_name(),
                missing,
            });
        }

        let unknown: Vec<&str> = variables
            .keys()
            .map(String::as_str)
            .filter(|var| !template.accepts(var))
            .collect();
        if !unknown.is_empty() {
            warn!(
                "⚠️ 提示词 {} 收到未声明的变量: {:?}",
                template.qualified_name(),
                unknown
            );
        }

        let enhanced = template.enhanced();
        let mut unresolved = Vec::new();
        let rendered = PLACEHOLDER.replace_all(&enhanced, |caps: &Captures| {
            let var = &caps[1];
            match variables.get(var) {
                Some(value) => value.clone(),
                None if template.optional.contains(&var) => NOT_PROVIDED.to_string(),
                None => {
                    unresolved.push(var.to_string());
                    caps[0].to_string()
                }
            }
        });
        let rendered = rendered.into_owned();

        if !unresolved.is_empty() {
            return Err(PromptError::UnresolvedPlaceholders {
                prompt: template.qualified_name(),
                placeholders: unresolved,
            });
        }

        Ok(rendered)
    }
}
