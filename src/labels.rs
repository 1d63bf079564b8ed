use std::collections::HashMap;

/// Raw model labels paired with the canonical category each folds into.
/// The key set doubles as the candidate label set offered to the classifier,
/// so the mapping and the model's label universe cannot drift apart.
const CIVIC_CATEGORIES: &[(&str, &str)] = &[
    ("Water", "Water"),
    ("Drainage", "Water"),
    ("Power", "Power"),
    ("Streetlight", "Power"),
    ("Road", "Road"),
    ("Pothole", "Road"),
    ("Sanitation", "Sanitation"),
    ("Garbage", "Sanitation"),
    ("Health", "Health"),
    ("Spam", "Spam"),
];

/// Immutable raw-label -> canonical-category table, built once at startup.
pub struct CategoryMap {
    table: HashMap<String, String>,
    default_category: String,
    candidates: Vec<String>,
    canonical: Vec<String>,
}

impl CategoryMap {
    pub fn new(entries: &[(&str, &str)], default_category: impl Into<String>) -> Self {
        let mut table = HashMap::with_capacity(entries.len());
        let mut candidates = Vec::with_capacity(entries.len());
        for (raw, canonical) in entries {
            if table.insert((*raw).to_owned(), (*canonical).to_owned()).is_none() {
                candidates.push((*raw).to_owned());
            }
        }

        let mut canonical: Vec<String> = table.values().cloned().collect();
        canonical.sort();
        canonical.dedup();

        Self {
            table,
            default_category: default_category.into(),
            candidates,
            canonical,
        }
    }

    pub fn civic_defaults(default_category: impl Into<String>) -> Self {
        Self::new(CIVIC_CATEGORIES, default_category)
    }

    /// Exact, case-sensitive lookup; unknown labels fold into the default
    /// category. Total over all strings.
    pub fn normalize<'a>(&'a self, raw_label: &str) -> &'a str {
        self.table
            .get(raw_label)
            .map(String::as_str)
            .unwrap_or(&self.default_category)
    }

    /// Labels offered to the classifier, deduplicated, in table order.
    pub fn candidate_labels(&self) -> &[String] {
        &self.candidates
    }

    /// Sorted, deduplicated set of categories clients can observe.
    pub fn canonical_categories(&self) -> &[String] {
        &self.canonical
    }
}
