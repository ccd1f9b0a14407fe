// src/taxonomy.rs
//! Closed keyword vocabulary: categories → keywords → synonyms, each keyword
//! carrying a polarity, a severity weight and a principle delta.
//!
//! The taxonomy is built once at startup (embedded `config/taxonomy.toml`, or
//! `TAXONOMY_PATH`), validated, and then shared read-only behind an `Arc`.

use anyhow::{anyhow, bail, Context};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

pub const ENV_TAXONOMY_PATH: &str = "TAXONOMY_PATH";

static BUILTIN_TAXONOMY: &str = include_str!("../config/taxonomy.toml");

/// The five CPTED principles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Principle {
    NaturalSurveillance,
    AccessControl,
    Territoriality,
    Maintenance,
    ActivitySupport,
}

impl Principle {
    pub const ALL: [Principle; 5] = [
        Principle::NaturalSurveillance,
        Principle::AccessControl,
        Principle::Territoriality,
        Principle::Maintenance,
        Principle::ActivitySupport,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Principle::NaturalSurveillance => "natural_surveillance",
            Principle::AccessControl => "access_control",
            Principle::Territoriality => "territoriality",
            Principle::Maintenance => "maintenance",
            Principle::ActivitySupport => "activity_support",
        }
    }
}

impl fmt::Display for Principle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    Favorable,
    Unfavorable,
}

/// How a keyword moves the principle scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrincipleDelta {
    Single {
        principle: Principle,
        amount: f64,
    },
    Distributed {
        distributed: BTreeMap<Principle, f64>,
    },
}

impl PrincipleDelta {
    /// (principle, amount) pairs in principle order.
    pub fn components(&self) -> Vec<(Principle, f64)> {
        match self {
            PrincipleDelta::Single { principle, amount } => vec![(*principle, *amount)],
            PrincipleDelta::Distributed { distributed } => {
                distributed.iter().map(|(p, a)| (*p, *a)).collect()
            }
        }
    }

    /// Sum of all sub-deltas (the category's running delta contribution).
    pub fn net(&self) -> f64 {
        match self {
            PrincipleDelta::Single { amount, .. } => *amount,
            PrincipleDelta::Distributed { distributed } => distributed.values().sum(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordDef {
    pub keyword: String,
    pub polarity: Polarity,
    pub weight: u8,
    #[serde(default)]
    pub synonyms: Vec<String>,
    pub delta: PrincipleDelta,
}

impl KeywordDef {
    /// Canonical form first, then synonyms in declaration order.
    pub fn variants(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.keyword.as_str()).chain(self.synonyms.iter().map(String::as_str))
    }

    pub fn is_favorable(&self) -> bool {
        self.polarity == Polarity::Favorable
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    #[serde(default)]
    pub label: String,
    pub keywords: Vec<KeywordDef>,
}

impl Category {
    pub fn keyword(&self, keyword: &str) -> Option<&KeywordDef> {
        self.keywords.iter().find(|k| k.keyword == keyword)
    }
}

/// A (category, keyword) reference as chosen by a user or produced by a suggester.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeywordRef {
    pub category: String,
    pub keyword: String,
}

impl KeywordRef {
    pub fn new(category: impl Into<String>, keyword: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            keyword: keyword.into(),
        }
    }
}

/// Result of resolving a `KeywordRef` against the taxonomy.
#[derive(Debug, Clone, Copy)]
pub enum Lookup<'a> {
    Found(&'a Category, &'a KeywordDef),
    UnknownCategory,
    UnknownKeyword(&'a Category),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Taxonomy {
    categories: Vec<Category>,
}

impl Taxonomy {
    /// The vocabulary compiled into the binary.
    pub fn builtin() -> anyhow::Result<Self> {
        Self::from_toml_str(BUILTIN_TAXONOMY).context("parsing built-in taxonomy")
    }

    /// `TAXONOMY_PATH` if set, otherwise the built-in vocabulary.
    pub fn load() -> anyhow::Result<Self> {
        match std::env::var(ENV_TAXONOMY_PATH) {
            Ok(p) => Self::from_path(&PathBuf::from(p)),
            Err(_) => Self::builtin(),
        }
    }

    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading taxonomy from {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("parsing taxonomy at {}", path.display()))
    }

    pub fn from_toml_str(toml_str: &str) -> anyhow::Result<Self> {
        let tax: Taxonomy = toml::from_str(toml_str)?;
        tax.validate()?;
        Ok(tax)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.categories.is_empty() {
            bail!("taxonomy has no categories");
        }
        let mut seen = HashSet::new();
        for cat in &self.categories {
            if cat.name.trim().is_empty() {
                bail!("category with empty name");
            }
            if !seen.insert(cat.name.as_str()) {
                bail!("duplicate category `{}`", cat.name);
            }
            if cat.keywords.is_empty() {
                bail!("category `{}` has no keywords", cat.name);
            }
            let mut kws = HashSet::new();
            for kw in &cat.keywords {
                if !kws.insert(kw.keyword.as_str()) {
                    bail!("duplicate keyword `{}` in `{}`", kw.keyword, cat.name);
                }
                if !(1..=5).contains(&kw.weight) {
                    bail!(
                        "keyword `{}/{}` weight {} outside 1..=5",
                        cat.name,
                        kw.keyword,
                        kw.weight
                    );
                }
                let parts = kw.delta.components();
                if parts.is_empty() {
                    bail!("keyword `{}/{}` has an empty delta", cat.name, kw.keyword);
                }
                if parts.iter().any(|(_, a)| !a.is_finite()) {
                    return Err(anyhow!(
                        "keyword `{}/{}` has a non-finite delta",
                        cat.name,
                        kw.keyword
                    ));
                }
            }
        }
        Ok(())
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn category(&self, name: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.name == name)
    }

    pub fn keyword(&self, category: &str, keyword: &str) -> Option<&KeywordDef> {
        self.category(category).and_then(|c| c.keyword(keyword))
    }

    pub fn lookup(&self, r: &KeywordRef) -> Lookup<'_> {
        match self.category(&r.category) {
            None => Lookup::UnknownCategory,
            Some(cat) => match cat.keyword(&r.keyword) {
                Some(kw) => Lookup::Found(cat, kw),
                None => Lookup::UnknownKeyword(cat),
            },
        }
    }

    pub fn keyword_count(&self) -> usize {
        self.categories.iter().map(|c| c.keywords.len()).sum()
    }
}
