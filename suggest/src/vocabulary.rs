//! Static reference list of procedure names.

/// Common surgical procedures offered before any history exists.
pub const SURGICAL_PROCEDURES: &[&str] = &[
    "Appendectomy",
    "Cholecystectomy",
    "Inguinal Hernia Repair",
    "Umbilical Hernia Repair",
    "Colectomy",
    "Mastectomy",
    "Thyroidectomy",
    "CABG",
    "Aortic Valve Replacement",
    "Total Hip Replacement",
    "Total Knee Replacement",
    "Laminectomy",
    "Craniotomy",
    "Cystectomy",
    "Nephrectomy",
    "Prostatectomy",
    "Hysterectomy",
    "Gastric Bypass",
    "Splenectomy",
    "Rhinoplasty",
    "Breast Augmentation",
    "C-Section",
    "Whipple Procedure",
    "Pancreatectomy",
    "Liver Resection",
    "Gastrectomy",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vocabulary {
    entries: Vec<String>,
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self::builtin()
    }
}

impl Vocabulary {
    #[must_use]
    pub fn builtin() -> Self {
        Self {
            entries: SURGICAL_PROCEDURES.iter().map(|s| (*s).to_string()).collect(),
        }
    }

    /// Built-in list followed by user-defined procedures, deduplicated.
    #[must_use]
    pub fn with_custom<I, S>(custom: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut vocabulary = Self::builtin();
        for entry in custom {
            let entry: String = entry.into();
            let entry = entry.trim();
            if entry.is_empty() || vocabulary.contains(entry) {
                continue;
            }
            vocabulary.entries.push(entry.to_string());
        }
        vocabulary
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.eq_ignore_ascii_case(name))
    }

    pub fn matching<'a>(&'a self, needle: &str) -> impl Iterator<Item = &'a str> + use<'a> {
        let needle = needle.to_lowercase();
        self.entries
            .iter()
            .filter(move |e| e.to_lowercase().contains(&needle))
            .map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
