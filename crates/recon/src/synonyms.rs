//! Static section-name and field-name equivalences.
//!
//! Both kinds of rule are stored under normalized keys (lowercase,
//! whitespace-collapsed), so lookups are insensitive to case and spacing.
//! Equivalence is symmetric: a rule `a ≡ b` answers both `(a, b)` and `(b, a)`.

use std::collections::BTreeMap;

use crate::config::{EquivalenceConfig, RuleConfig};
use crate::normalize::{label_key, lookup_key};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    Section,
    Field,
}

/// One `(source_pattern, destination_pattern) -> weight` entry.
#[derive(Debug, Clone, PartialEq)]
pub struct EquivalenceRule {
    pub kind: RuleKind,
    pub source: String,
    pub destination: String,
    pub weight: f64,
}

/// Built-in section equivalences (source wording, destination wording, weight).
const DEFAULT_SECTIONS: &[(&str, &str, f64)] = &[
    ("revenue by application", "end market breakdown", 1.0),
    ("revenue by product", "segment breakdown", 1.0),
    ("revenue by region", "region breakdown", 1.0),
    ("revenue by region", "segment breakdown", 0.8),
    ("revenue by region (% of total)", "region mix (%)", 1.0),
    ("revenue by application (% of total)", "end market mix (%)", 1.0),
    ("revenue by product (% of total)", "segment mix (%)", 1.0),
    ("key metrics", "segment information", 1.0),
    ("income statement", "consolidated income statement", 1.0),
    ("balance sheet", "consolidated balance sheet", 1.0),
    ("cash flows", "consolidated cash flow statement", 1.0),
    ("long-lived assets by region", "property, plant, and equipment", 0.9),
    ("employees by region", "employees", 0.8),
    ("employees by function", "employees", 0.8),
    ("total backlog of orders", "backlog", 1.0),
    ("revenue from five largest customers", "supplement information", 0.8),
];

/// Built-in field equivalences.
const DEFAULT_FIELDS: &[(&str, &str, f64)] = &[
    ("north america", "united states and other north america", 1.0),
    ("other europe", "other including eastern europe/cis", 1.0),
    ("other asia", "other asian countries", 1.0),
    ("operating income (loss)", "operating income", 1.0),
    ("income (loss) before provision for income taxes", "income before provision for income taxes", 1.0),
    ("net income (loss)", "net income", 1.0),
    ("other applications", "other application, of which", 0.9),
    ("laser and non-laser systems", "systems", 0.9),
    ("research and development", "r&d", 1.0),
    // Deliberate misspelling: reported templates carry the label this way.
    ("general and administrative", "general and administraative", 1.0),
];

#[derive(Debug, Clone, Default)]
pub struct EquivalenceTable {
    sections: BTreeMap<(String, String), f64>,
    fields: BTreeMap<(String, String), f64>,
}

impl EquivalenceTable {
    pub fn empty() -> Self {
        Self::default()
    }

    /// The built-in table.
    pub fn builtin() -> Self {
        let mut table = Self::default();
        for &(s, d, w) in DEFAULT_SECTIONS {
            table.insert(RuleKind::Section, s, d, w);
        }
        for &(s, d, w) in DEFAULT_FIELDS {
            table.insert(RuleKind::Field, s, d, w);
        }
        table
    }

    /// Built-in table (unless disabled) overlaid with configured rules.
    /// A configured rule replaces a built-in rule for the same pair.
    pub fn from_config(config: &EquivalenceConfig) -> Self {
        let mut table = if config.use_defaults { Self::builtin() } else { Self::default() };
        let apply = |table: &mut Self, kind, rules: &[RuleConfig]| {
            for r in rules {
                table.insert(kind, &r.source, &r.destination, r.weight);
            }
        };
        apply(&mut table, RuleKind::Section, &config.sections);
        apply(&mut table, RuleKind::Field, &config.fields);
        table
    }

    pub fn insert(&mut self, kind: RuleKind, source: &str, destination: &str, weight: f64) {
        let key = (lookup_key(source), lookup_key(destination));
        let map = match kind {
            RuleKind::Section => &mut self.sections,
            RuleKind::Field => &mut self.fields,
        };
        map.insert(key, weight.clamp(0.0, 1.0));
    }

    pub fn rules(&self) -> Vec<EquivalenceRule> {
        let to_rules = |kind, map: &BTreeMap<(String, String), f64>| {
            map.iter()
                .map(|((s, d), w)| EquivalenceRule {
                    kind,
                    source: s.clone(),
                    destination: d.clone(),
                    weight: *w,
                })
                .collect::<Vec<_>>()
        };
        let mut rules = to_rules(RuleKind::Section, &self.sections);
        rules.extend(to_rules(RuleKind::Field, &self.fields));
        rules
    }

    pub fn len(&self) -> usize {
        self.sections.len() + self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Weight relating two section headers: 1.0 when they read the same,
    /// the rule weight when a rule relates them, otherwise 0.
    pub fn section_weight(&self, source: Option<&str>, destination: Option<&str>) -> f64 {
        match (source, destination) {
            (Some(s), Some(d)) => lookup(&self.sections, &lookup_key(s), &lookup_key(d)),
            _ => 0.0,
        }
    }

    /// Weight relating two field labels. Accepts raw labels or cleaned
    /// (`Net_Sales`) names.
    pub fn field_weight(&self, source: &str, destination: &str) -> f64 {
        let direct = lookup(&self.fields, &lookup_key(source), &lookup_key(destination));
        if direct > 0.0 {
            return direct;
        }
        lookup(&self.fields, &label_key(source), &label_key(destination))
    }
}

fn lookup(map: &BTreeMap<(String, String), f64>, a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }
    let forward = map.get(&(a.to_string(), b.to_string())).copied();
    let backward = map.get(&(b.to_string(), a.to_string())).copied();
    forward.or(backward).unwrap_or(0.0)
}
