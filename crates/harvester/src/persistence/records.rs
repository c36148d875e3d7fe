//! Result records produced by successful extractions
//!
//! Records are immutable, append-only facts. Each shape references the
//! marking it was scraped for through `person_id` or `subject_id`.

use serde::{Deserialize, Serialize};

use crate::requirement::{Requirement, SubjectKind};

/// Person profile page (`requirement_1`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersonProfile {
    pub person_id: String,
    pub page_url: String,
    pub display_name: Option<String>,
    pub gender: Option<String>,
    pub birth_date: Option<String>,
    pub birth_place: Option<String>,
    pub foreign_names: Option<String>,
    pub family_members: Option<String>,
    pub imdb_id: Option<String>,
    pub occupation: Option<String>,
    pub followers: Option<String>,
    pub introduction: Option<String>,
    pub picture_count: Option<String>,
    pub works_count: Option<String>,
    pub awards_count: Option<String>,
    pub partner_count: Option<String>,
    pub contributor_count: Option<String>,
}

/// One entry of a person's work lists (`requirement_2`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersonWork {
    pub person_id: String,
    pub list_url: Option<String>,
    /// filmmaker, musician, or writer
    pub work_type: Option<String>,
    pub title: Option<String>,
    pub work_url: Option<String>,
    pub year: Option<String>,
    pub status: Option<String>,
    pub role: Option<String>,
    pub director: Option<String>,
    pub actors: Option<String>,
    pub author: Option<String>,
    pub publisher: Option<String>,
    pub performer: Option<String>,
    pub rating: Option<String>,
    pub rating_count: Option<String>,
}

/// One award won or nominated by a person (`requirement_3`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersonAward {
    pub person_id: String,
    pub awards_url: Option<String>,
    pub year: Option<String>,
    pub award_name: Option<String>,
    pub award_url: Option<String>,
    pub specific_award: Option<String>,
    pub work_title: Option<String>,
    pub work_url: Option<String>,
}

/// One collaborator of a person (`requirement_4`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Collaboration {
    pub person_id: String,
    pub partners_url: Option<String>,
    pub collaborator_name: Option<String>,
    pub collaborator_url: Option<String>,
    pub collaborator_profession: Option<String>,
    pub collaboration_count: Option<i64>,
    #[serde(default)]
    pub works: Vec<String>,
    #[serde(default)]
    pub work_urls: Vec<String>,
    pub collaborator_followers: Option<i64>,
}

/// Subject detail page (`requirement_5`)
///
/// The page layout differs per kind, so fields that only exist for some
/// kinds live in `attributes` keyed by their label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectDetail {
    pub subject_id: String,
    pub kind: SubjectKind,
    pub subject_url: String,
    pub title: Option<String>,
    pub year: Option<String>,
    pub rating: Option<String>,
    pub rating_count: Option<String>,
    /// People credited on the page (directors, authors, performers)
    #[serde(default)]
    pub credits: Vec<String>,
    #[serde(default)]
    pub synopsis: Vec<String>,
    #[serde(default)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

/// One credited cast or crew member of a movie (`requirement_6`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CastMember {
    pub subject_id: String,
    pub title: Option<String>,
    pub cast_list_url: Option<String>,
    pub role_category: Option<String>,
    pub name: Option<String>,
    pub person_url: Option<String>,
    pub order: Option<String>,
    pub specific_role: Option<String>,
    pub representative_works: Option<String>,
    pub representative_work_urls: Option<String>,
}

/// One award entry of a movie (`requirement_7`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubjectAward {
    pub subject_id: String,
    pub title: Option<String>,
    pub awards_url: Option<String>,
    pub year: Option<String>,
    pub award_name: Option<String>,
    pub award_url: Option<String>,
    pub specific_award: Option<String>,
    pub winner: Option<String>,
    pub winner_url: Option<String>,
}

/// A fact produced by one successful extraction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResultRecord {
    PersonProfile(PersonProfile),
    PersonWork(PersonWork),
    PersonAward(PersonAward),
    Collaboration(Collaboration),
    SubjectDetail(SubjectDetail),
    CastMember(CastMember),
    SubjectAward(SubjectAward),
}

impl ResultRecord {
    /// Requirement whose extraction produces this shape
    pub fn requirement(&self) -> Requirement {
        match self {
            Self::PersonProfile(_) => Requirement::PersonProfile,
            Self::PersonWork(_) => Requirement::PersonWorks,
            Self::PersonAward(_) => Requirement::PersonAwards,
            Self::Collaboration(_) => Requirement::PersonCollaborations,
            Self::SubjectDetail(_) => Requirement::SubjectDetail,
            Self::CastMember(_) => Requirement::SubjectCast,
            Self::SubjectAward(_) => Requirement::SubjectAwards,
        }
    }

    /// Identifier of the marking this record belongs to
    pub fn entity_id(&self) -> &str {
        match self {
            Self::PersonProfile(r) => &r.person_id,
            Self::PersonWork(r) => &r.person_id,
            Self::PersonAward(r) => &r.person_id,
            Self::Collaboration(r) => &r.person_id,
            Self::SubjectDetail(r) => &r.subject_id,
            Self::CastMember(r) => &r.subject_id,
            Self::SubjectAward(r) => &r.subject_id,
        }
    }
}

impl From<PersonProfile> for ResultRecord {
    fn from(record: PersonProfile) -> Self {
        Self::PersonProfile(record)
    }
}

impl From<PersonWork> for ResultRecord {
    fn from(record: PersonWork) -> Self {
        Self::PersonWork(record)
    }
}

impl From<PersonAward> for ResultRecord {
    fn from(record: PersonAward) -> Self {
        Self::PersonAward(record)
    }
}

impl From<Collaboration> for ResultRecord {
    fn from(record: Collaboration) -> Self {
        Self::Collaboration(record)
    }
}

impl From<SubjectDetail> for ResultRecord {
    fn from(record: SubjectDetail) -> Self {
        Self::SubjectDetail(record)
    }
}

impl From<CastMember> for ResultRecord {
    fn from(record: CastMember) -> Self {
        Self::CastMember(record)
    }
}

impl From<SubjectAward> for ResultRecord {
    fn from(record: SubjectAward) -> Self {
        Self::SubjectAward(record)
    }
}
