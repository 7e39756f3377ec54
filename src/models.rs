use crate::decode::TableEncoding;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use unicode_normalization::UnicodeNormalization;

static YEAR_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?i)(?:(ssc|hsc)[_ -]?)?(\d{4})$").expect("year label pattern is valid")
});

/// GPA value that counts as a perfect result.
pub const GPA_MAX: f64 = 5.0;

/// Years between an HSC examination and the same cohort's SSC examination.
pub const SSC_TO_HSC_OFFSET: u16 = 2;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Data source configuration
    pub data_source_mode: DataSourceMode,
    pub data_directory: Option<String>,
    pub base_url: Option<String>,
    pub summary_encoding: TableEncoding,
    pub subject_encoding: TableEncoding,
    pub xor_key: Option<String>,
    // Institution ranking
    pub top_rank_threshold: usize,
    pub min_institution_size: usize,
    pub top_institutions_limit: usize,
    // Persistence and reports
    pub link_store_path: Option<String>,
    pub output_directory: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataSourceMode {
    #[serde(rename = "local")]
    Local,
    #[serde(rename = "internet")]
    Internet,
    #[serde(rename = "both")]
    Both,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_source_mode: DataSourceMode::Local,
            data_directory: Some("data-source".to_string()),
            base_url: Some("https://example.com/rank/".to_string()),
            summary_encoding: TableEncoding::Auto,
            subject_encoding: TableEncoding::Plain,
            xor_key: None,
            top_rank_threshold: 1000,
            min_institution_size: 20,
            top_institutions_limit: 100,
            link_store_path: Some("links.json".to_string()),
            output_directory: Some("output".to_string()),
        }
    }
}

impl Config {
    pub fn load_from_file(file_path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(file_path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to_file(&self, file_path: &str) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(file_path, content)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ExamType {
    #[serde(rename = "ssc")]
    Ssc,
    #[serde(rename = "hsc")]
    Hsc,
}

impl fmt::Display for ExamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExamType::Ssc => write!(f, "SSC"),
            ExamType::Hsc => write!(f, "HSC"),
        }
    }
}

/// Academic track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Group {
    Science,
    Commerce,
    Arts,
}

impl Group {
    pub const ALL: [Group; 3] = [Group::Science, Group::Commerce, Group::Arts];

    /// Lowercase name used in dataset file names.
    pub fn file_slug(&self) -> &'static str {
        match self {
            Group::Science => "science",
            Group::Commerce => "commerce",
            Group::Arts => "arts",
        }
    }
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Group::Science => write!(f, "Science"),
            Group::Commerce => write!(f, "Commerce"),
            Group::Arts => write!(f, "Arts"),
        }
    }
}

impl FromStr for Group {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "science" | "sci" => Ok(Group::Science),
            "commerce" | "business" | "com" => Ok(Group::Commerce),
            "arts" | "humanities" | "hum" => Ok(Group::Arts),
            other => Err(format!("unknown group: {}", other)),
        }
    }
}

/// One (exam, year, group) dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatasetId {
    pub exam: ExamType,
    pub year: u16,
    pub group: Group,
}

impl DatasetId {
    pub fn new(exam: ExamType, year: u16, group: Group) -> Self {
        Self { exam, year, group }
    }

    /// Year tag as it appears in file names: `2023` for SSC, `hsc_2025` for HSC.
    pub fn year_tag(&self) -> String {
        match self.exam {
            ExamType::Ssc => self.year.to_string(),
            ExamType::Hsc => format!("hsc_{}", self.year),
        }
    }

    pub fn summary_file(&self) -> String {
        format!("data_{}_{}.txt", self.year_tag(), self.group.file_slug())
    }

    pub fn subject_file(&self) -> String {
        format!("data_{}_{}_individual.txt", self.year_tag(), self.group.file_slug())
    }

    pub fn layout(&self) -> SubjectLayout {
        SubjectLayout::new(self.exam, self.group)
    }

    /// Parse a year label such as `2023`, `ssc_2023` or `hsc_2025`.
    pub fn parse_year_label(label: &str) -> Option<(ExamType, u16)> {
        let caps = YEAR_LABEL.captures(label.trim())?;
        let exam = match caps.get(1).map(|m| m.as_str().to_lowercase()) {
            Some(tag) if tag == "hsc" => ExamType::Hsc,
            _ => ExamType::Ssc,
        };
        let year = caps.get(2)?.as_str().parse::<u16>().ok()?;
        Some((exam, year))
    }
}

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.exam, self.year, self.group)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Subject {
    Bangla,
    English,
    Math,
    Bgs,
    Science,
    Religion,
    Physics,
    Chemistry,
    Accounting,
    Finance,
    BusinessStudies,
    Geography,
    Civics,
    History,
    Compulsory,
    Ict,
    Optional,
    Physical,
    Career,
}

impl Subject {
    pub fn label(&self) -> &'static str {
        match self {
            Subject::Bangla => "Bangla",
            Subject::English => "English",
            Subject::Math => "Math",
            Subject::Bgs => "BGS",
            Subject::Science => "Science",
            Subject::Religion => "Religion",
            Subject::Physics => "Physics",
            Subject::Chemistry => "Chemistry",
            Subject::Accounting => "Accounting",
            Subject::Finance => "Finance",
            Subject::BusinessStudies => "Business Studies",
            Subject::Geography => "Geography",
            Subject::Civics => "Civics",
            Subject::History => "History",
            Subject::Compulsory => "Compulsory",
            Subject::Ict => "ICT",
            Subject::Optional => "Optional",
            Subject::Physical => "Physical",
            Subject::Career => "Career",
        }
    }
}

/// Column layout of a per-subject table, resolved once per dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubjectLayout {
    pub exam: ExamType,
    pub group: Group,
}

impl SubjectLayout {
    pub fn new(exam: ExamType, group: Group) -> Self {
        Self { exam, group }
    }

    /// Subjects in column order, following the roll column.
    pub fn columns(&self) -> &'static [Subject] {
        use Subject::*;
        match (self.exam, self.group) {
            (ExamType::Ssc, Group::Science) => &[
                Bangla, English, Math, Bgs, Religion, Physics, Chemistry, Compulsory, Ict,
                Optional, Physical, Career,
            ],
            (ExamType::Ssc, Group::Commerce) => &[
                Bangla, English, Math, Science, Religion, Accounting, Finance, Compulsory, Ict,
                Optional, Physical, Career,
            ],
            (ExamType::Ssc, Group::Arts) => &[
                Bangla, English, Math, Science, Religion, Geography, Civics, Compulsory, Ict,
                Optional, Physical, Career,
            ],
            (ExamType::Hsc, Group::Science) => {
                &[Bangla, English, Ict, Physics, Chemistry, Compulsory, Optional]
            }
            (ExamType::Hsc, Group::Commerce) => {
                &[Bangla, English, Ict, Accounting, Finance, BusinessStudies, Optional]
            }
            (ExamType::Hsc, Group::Arts) => {
                &[Bangla, English, Ict, Geography, Civics, History, Optional]
            }
        }
    }

    /// Subjects used as the third, fourth and fifth ranking keys.
    pub fn tie_breakers(&self) -> [Subject; 3] {
        use Subject::*;
        match (self.exam, self.group) {
            (ExamType::Ssc, Group::Science) => [Physics, Chemistry, Compulsory],
            (ExamType::Ssc, Group::Commerce) => [Accounting, Finance, Compulsory],
            (ExamType::Ssc, Group::Arts) => [Geography, Civics, Compulsory],
            (ExamType::Hsc, Group::Science) => [Physics, Chemistry, Compulsory],
            (ExamType::Hsc, Group::Commerce) => [Accounting, Finance, BusinessStudies],
            (ExamType::Hsc, Group::Arts) => [Geography, Civics, History],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentRecord {
    /// Blank or non-numeric serials are kept as `None`; they never decide whether a row counts.
    pub serial: Option<u32>,
    pub name: String,
    /// Numeric roll when the roll column parses as one.
    pub roll: Option<u64>,
    /// Roll exactly as it appears in the summary table. Used for joining and lookups.
    pub roll_raw: String,
    pub gpa: f64,
    pub total: u32,
    pub institution: String,
    pub subject_marks: BTreeMap<Subject, u32>,
}

impl StudentRecord {
    pub fn mark(&self, subject: Subject) -> Option<u32> {
        self.subject_marks.get(&subject).copied()
    }

    pub fn has_max_gpa(&self) -> bool {
        self.gpa == GPA_MAX
    }

    pub fn get_normalized_roll(&self) -> String {
        normalize_roll(&self.roll_raw)
    }
}

/// Normalize a roll by trimming it and stripping leading zeros.
pub fn normalize_roll(roll: &str) -> String {
    let stripped = roll.trim().trim_start_matches('0');
    if stripped.is_empty() {
        "0".to_string()
    } else {
        stripped.to_string()
    }
}

/// Normalize a name for cross-dataset matching: NFKC, lowercase, letters/digits only,
/// single spaces between words.
pub fn normalize_name(name: &str) -> String {
    name.nfkc()
        .flat_map(char::to_lowercase)
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
