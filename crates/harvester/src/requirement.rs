//! Requirement tags and the flag dispatch table
//!
//! Each scraping requirement owns exactly one boolean completion column on
//! either the person marking table (`requirement_1..4`) or the subject
//! marking table (`requirement_5..7`). Everything that needs to turn a tag
//! into a column, a scope, or a default filter goes through [`Requirement`].

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::Url;

/// Error type for requirement and kind parsing
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequirementError {
    /// Tag is not one of `requirement_1..7`
    #[error("invalid configuration: unknown requirement tag '{0}'")]
    UnknownRequirement(String),

    /// Kind is not one of movie, book, music
    #[error("invalid configuration: unknown subject kind '{0}'")]
    UnknownSubjectKind(String),
}

/// Which marking table a requirement lives on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityScope {
    /// Person markings (`marking` table)
    Person,
    /// Subject markings (`subject_marking` table)
    Subject,
}

/// Kind of a subject, fixed when the subject marking is seeded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectKind {
    Movie,
    Book,
    Music,
}

impl SubjectKind {
    /// Stored string form
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Movie => "movie",
            Self::Book => "book",
            Self::Music => "music",
        }
    }

    /// Derive the kind from a subject URL
    ///
    /// The host name carries the catalogue section (`movie.`, `book.`);
    /// everything else is treated as music.
    pub fn from_subject_url(url: &str) -> Self {
        if url.contains("movie") {
            Self::Movie
        } else if url.contains("book") {
            Self::Book
        } else {
            Self::Music
        }
    }
}

impl std::fmt::Display for SubjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubjectKind {
    type Err = RequirementError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "movie" => Ok(Self::Movie),
            "book" => Ok(Self::Book),
            "music" => Ok(Self::Music),
            other => Err(RequirementError::UnknownSubjectKind(other.to_string())),
        }
    }
}

/// One of the seven independently scheduled scraping requirements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Requirement {
    /// `requirement_1`: person profile page
    PersonProfile,
    /// `requirement_2`: person works (filmmaker, musician, writer lists)
    PersonWorks,
    /// `requirement_3`: person awards
    PersonAwards,
    /// `requirement_4`: person collaborations
    PersonCollaborations,
    /// `requirement_5`: subject detail (movie, book, or music page)
    SubjectDetail,
    /// `requirement_6`: subject cast list
    SubjectCast,
    /// `requirement_7`: subject awards
    SubjectAwards,
}

impl Requirement {
    /// All requirements in tag order
    pub const ALL: [Requirement; 7] = [
        Self::PersonProfile,
        Self::PersonWorks,
        Self::PersonAwards,
        Self::PersonCollaborations,
        Self::SubjectDetail,
        Self::SubjectCast,
        Self::SubjectAwards,
    ];

    /// Requirement number (1..=7)
    pub fn number(&self) -> u8 {
        match self {
            Self::PersonProfile => 1,
            Self::PersonWorks => 2,
            Self::PersonAwards => 3,
            Self::PersonCollaborations => 4,
            Self::SubjectDetail => 5,
            Self::SubjectCast => 6,
            Self::SubjectAwards => 7,
        }
    }

    /// Look a requirement up by number
    pub fn from_number(number: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.number() == number)
    }

    /// Completion column on the owning marking table
    pub fn column(&self) -> &'static str {
        match self {
            Self::PersonProfile => "requirement_1",
            Self::PersonWorks => "requirement_2",
            Self::PersonAwards => "requirement_3",
            Self::PersonCollaborations => "requirement_4",
            Self::SubjectDetail => "requirement_5",
            Self::SubjectCast => "requirement_6",
            Self::SubjectAwards => "requirement_7",
        }
    }

    /// Marking table this requirement's flag lives on
    pub fn scope(&self) -> EntityScope {
        match self {
            Self::PersonProfile
            | Self::PersonWorks
            | Self::PersonAwards
            | Self::PersonCollaborations => EntityScope::Person,
            Self::SubjectDetail | Self::SubjectCast | Self::SubjectAwards => EntityScope::Subject,
        }
    }

    /// Kind filter applied when claiming work for this requirement
    ///
    /// Cast and subject-award pages are only scraped for movies.
    pub fn default_kind_filter(&self) -> Option<SubjectKind> {
        match self {
            Self::SubjectCast | Self::SubjectAwards => Some(SubjectKind::Movie),
            _ => None,
        }
    }

    /// Whether the pages behind this requirement sit behind a login wall
    pub fn requires_credentials(&self) -> bool {
        matches!(self, Self::PersonWorks | Self::PersonAwards)
    }
}

impl std::fmt::Display for Requirement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.column())
    }
}

impl FromStr for Requirement {
    type Err = RequirementError;

    /// Accepts `requirement_3` or a bare `3`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let number = trimmed.strip_prefix("requirement_").unwrap_or(trimmed);
        number
            .parse::<u8>()
            .ok()
            .and_then(Self::from_number)
            .ok_or_else(|| RequirementError::UnknownRequirement(s.to_string()))
    }
}

/// Extract the entity identifier from a catalogue URL
///
/// Identifiers are the last non-empty path segment, so
/// `https://www.douban.com/personage/27246769/` yields `27246769`.
/// Returns `None` for anything that is not an absolute URL.
pub fn entity_id_from_url(raw: &str) -> Option<String> {
    let url = Url::parse(raw.trim()).ok()?;
    url.path_segments()?
        .filter(|segment| !segment.is_empty())
        .last()
        .map(str::to_string)
}
