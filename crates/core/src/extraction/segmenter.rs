//! Text → ordered, typed `Section`s (§4.11).

use regex::Regex;

/// Closed set of section types a paper's body can be decomposed into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SectionType {
    Abstract,
    Introduction,
    RelatedWork,
    Background,
    Method,
    Experiments,
    Results,
    Discussion,
    Limitations,
    FutureWork,
    Conclusion,
    References,
    Appendix,
    Unknown,
}

impl SectionType {
    /// Low-integer priority scale used by downstream extractors to
    /// decide what to process: lower means more important.
    pub fn priority(self) -> u32 {
        match self {
            SectionType::Limitations => 1,
            SectionType::FutureWork => 2,
            SectionType::Discussion => 3,
            SectionType::Conclusion => 4,
            SectionType::Introduction => 5,
            SectionType::Background => 20,
            SectionType::Method => 25,
            SectionType::Experiments => 30,
            SectionType::Results => 35,
            SectionType::RelatedWork => 40,
            SectionType::Abstract => 50,
            SectionType::Unknown => 80,
            SectionType::Appendix => 90,
            SectionType::References => 100,
        }
    }

    /// Match a heading line against the closed set of known section
    /// names. Headings are matched regardless of numbering/casing style
    /// (numbered, all-caps, title-case).
    fn from_heading(heading: &str) -> Option<SectionType> {
        let normalized = heading
            .trim()
            .trim_start_matches(|c: char| c.is_ascii_digit() || c == '.' || c.is_whitespace())
            .to_lowercase();
        let normalized = normalized.trim();

        let table: &[(&[&str], SectionType)] = &[
            (&["abstract"], SectionType::Abstract),
            (&["introduction"], SectionType::Introduction),
            (&["related work", "related works", "prior work", "background and related work"], SectionType::RelatedWork),
            (&["background"], SectionType::Background),
            (&["method", "methods", "methodology", "approach"], SectionType::Method),
            (&["experiments", "experimental setup", "experimental results"], SectionType::Experiments),
            (&["results"], SectionType::Results),
            (&["discussion"], SectionType::Discussion),
            (&["limitations", "limitation"], SectionType::Limitations),
            (&["future work", "future directions"], SectionType::FutureWork),
            (&["conclusion", "conclusions", "concluding remarks"], SectionType::Conclusion),
            (&["references", "bibliography"], SectionType::References),
            (&["appendix", "appendices", "supplementary material"], SectionType::Appendix),
        ];

        table
            .iter()
            .find(|(names, _)| names.iter().any(|n| *n == normalized))
            .map(|(_, kind)| *kind)
    }
}

#[derive(Debug, Clone)]
pub struct Section {
    pub section_type: SectionType,
    pub title: String,
    pub content: String,
    pub word_count: usize,
    pub priority: u32,
}

struct HeadingMatchers {
    numbered: Regex,
    all_caps: Regex,
    title_case: Regex,
}

impl HeadingMatchers {
    fn new() -> Self {
        Self {
            numbered: Regex::new(r"(?m)^\s*(\d+(\.\d+)*\.?)\s+([A-Za-z][A-Za-z \-]{2,60})\s*$").unwrap(),
            all_caps: Regex::new(r"(?m)^\s*([A-Z][A-Z \-]{2,60})\s*$").unwrap(),
            title_case: Regex::new(r"(?m)^\s*([A-Z][a-z]+(?: [A-Z][a-z]+){0,5})\s*$").unwrap(),
        }
    }

    fn find_headings<'a>(&self, text: &'a str) -> Vec<(usize, &'a str)> {
        let mut found = Vec::new();
        for m in self.numbered.captures_iter(text) {
            let group = m.get(3).unwrap();
            found.push((m.get(0).unwrap().start(), group.as_str()));
        }
        for m in self.all_caps.captures_iter(text) {
            let group = m.get(1).unwrap();
            found.push((m.get(0).unwrap().start(), group.as_str()));
        }
        for m in self.title_case.captures_iter(text) {
            let group = m.get(1).unwrap();
            if SectionType::from_heading(group.as_str()).is_some() {
                found.push((m.get(0).unwrap().start(), group.as_str()));
            }
        }
        found.sort_by_key(|(pos, _)| *pos);
        found.dedup_by_key(|(pos, _)| *pos);
        found
    }
}

/// Segment `text` into an ordered list of typed sections. Any heading
/// that doesn't match the closed set of known names becomes `Unknown`
/// rather than being dropped, so no body text is silently discarded.
pub fn segment(text: &str) -> Vec<Section> {
    let matchers = HeadingMatchers::new();
    let headings = matchers.find_headings(text);

    if headings.is_empty() {
        let word_count = text.split_whitespace().count();
        return vec![Section {
            section_type: SectionType::Unknown,
            title: "Unknown".to_string(),
            content: text.trim().to_string(),
            word_count,
            priority: SectionType::Unknown.priority(),
        }];
    }

    let mut sections = Vec::with_capacity(headings.len());
    for (i, (start, title)) in headings.iter().enumerate() {
        let content_start = start + title.len();
        let content_end = headings.get(i + 1).map(|(next_start, _)| *next_start).unwrap_or(text.len());
        let content = text[content_start.min(text.len())..content_end.min(text.len())].trim().to_string();
        let section_type = SectionType::from_heading(title).unwrap_or(SectionType::Unknown);
        let word_count = content.split_whitespace().count();
        sections.push(Section {
            priority: section_type.priority(),
            section_type,
            title: title.trim().to_string(),
            content,
            word_count,
        });
    }
    sections
}
