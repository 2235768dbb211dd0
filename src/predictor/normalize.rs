//! Seat-type and sub-category synonym maps.
//!
//! Cutoff data uses several labels for the same category (`GEN`, `General`,
//! `OPEN`, ...). Each map collapses them into one canonical bucket; queries
//! match every raw label of the bucket. Labels outside the map form a bucket
//! of their own. Matching ignores ASCII case.

/// Many-to-one label map
pub struct SynonymMap {
    buckets: &'static [(&'static str, &'static [&'static str])],
}

pub static SEAT_TYPES: SynonymMap = SynonymMap {
    buckets: &[
        ("OPEN", &["OPEN", "GEN", "General", "UR"]),
        ("OBC-NCL", &["OBC-NCL", "OBC", "BC"]),
        ("EWS", &["EWS", "GEN-EWS"]),
        ("SC", &["SC"]),
        ("ST", &["ST"]),
        ("OPEN (PwD)", &["OPEN (PwD)", "OPEN-PwD", "GEN-PwD", "PwD"]),
        ("OBC-NCL (PwD)", &["OBC-NCL (PwD)", "OBC-NCL-PwD", "OBC-PwD"]),
        ("EWS (PwD)", &["EWS (PwD)", "EWS-PwD", "GEN-EWS-PwD"]),
        ("SC (PwD)", &["SC (PwD)", "SC-PwD"]),
        ("ST (PwD)", &["ST (PwD)", "ST-PwD"]),
    ],
};

pub static SUB_CATEGORIES: SynonymMap = SynonymMap {
    buckets: &[
        ("Gender-Neutral", &["Gender-Neutral", "Neutral", "All"]),
        (
            "Female-only (including Supernumerary)",
            &[
                "Female-only (including Supernumerary)",
                "Female",
                "Female-Only",
                "Female-only",
            ],
        ),
    ],
};

impl SynonymMap {
    fn bucket(&self, raw: &str) -> Option<&(&'static str, &'static [&'static str])> {
        let raw = raw.trim();
        self.buckets
            .iter()
            .find(|(_, labels)| labels.iter().any(|l| l.eq_ignore_ascii_case(raw)))
    }

    /// Canonical label for `raw`; unknown labels map to themselves (trimmed)
    pub fn canonical(&self, raw: &str) -> String {
        match self.bucket(raw) {
            Some((canonical, _)) => (*canonical).to_string(),
            None => raw.trim().to_string(),
        }
    }

    /// Every stored label that belongs to the same bucket as `raw`
    pub fn labels(&self, raw: &str) -> Vec<String> {
        match self.bucket(raw) {
            Some((_, labels)) => labels.iter().map(|l| (*l).to_string()).collect(),
            None => vec![raw.trim().to_string()],
        }
    }
}
