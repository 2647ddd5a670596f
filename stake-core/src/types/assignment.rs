use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StakeError};

pub const MIN_COURSE_GROUP: i64 = 1;
pub const MAX_COURSE_GROUP: i64 = 4;
pub const MIN_TEAM_NUMBER: i64 = 1;
pub const MAX_TEAM_NUMBER: i64 = 20;
pub const MAX_STUDENTS: usize = 25;

static EMAIL_RE: OnceLock<Regex> = OnceLock::new();

fn email_re() -> &'static Regex {
    EMAIL_RE.get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    #[serde(alias = "studentId")]
    pub student_id: String,
    #[serde(alias = "studentName")]
    pub student_name: String,
}

/// Identity of a claiming group; unique across the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClaimantId {
    pub course_group: u8,
    pub team_number: u8,
}

impl std::fmt::Display for ClaimantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "group {} team {}", self.course_group, self.team_number)
    }
}

/// Claimant details as submitted, before validation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClaimantForm {
    #[serde(default, alias = "courseGroup")]
    pub course_group: Option<i64>,
    #[serde(default, alias = "teamNumber")]
    pub team_number: Option<i64>,
    #[serde(default, alias = "leaderName")]
    pub leader_name: Option<String>,
    #[serde(default, alias = "leaderEmail")]
    pub leader_email: Option<String>,
    #[serde(default, alias = "leaderPhone")]
    pub leader_phone: Option<String>,
    #[serde(default)]
    pub students: Vec<Student>,
}

impl ClaimantForm {
    /// Validates every field and returns the cleaned payload.
    ///
    /// All problems are reported together, space separated.
    pub fn validate(&self) -> Result<ClaimantPayload> {
        let mut errors: Vec<&str> = Vec::new();

        let course_group = match self.course_group {
            None => Some(MIN_COURSE_GROUP as u8),
            Some(g) if (MIN_COURSE_GROUP..=MAX_COURSE_GROUP).contains(&g) => Some(g as u8),
            Some(_) => {
                errors.push("Course group must be a number between 1 and 4.");
                None
            }
        };

        let team_number = match self.team_number {
            Some(n) if (MIN_TEAM_NUMBER..=MAX_TEAM_NUMBER).contains(&n) => Some(n as u8),
            _ => {
                errors.push("Team number must be a number between 1 and 20.");
                None
            }
        };

        let leader_name = clean(self.leader_name.as_deref());
        if leader_name.is_empty() {
            errors.push("Leader name is required.");
        }

        let leader_email = clean(self.leader_email.as_deref()).to_lowercase();
        if !email_re().is_match(&leader_email) {
            errors.push("A valid leader email is required.");
        }

        let leader_phone = clean(self.leader_phone.as_deref());
        if leader_phone.is_empty() {
            errors.push("Leader phone is required.");
        }

        let students: Vec<Student> = self
            .students
            .iter()
            .map(|s| Student {
                student_id: s.student_id.trim().to_string(),
                student_name: s.student_name.trim().to_string(),
            })
            .filter(|s| !s.student_id.is_empty() && !s.student_name.is_empty())
            .collect();
        if students.is_empty() {
            errors.push("Add at least one student (ID + name).");
        } else if students.len() > MAX_STUDENTS {
            errors.push("Maximum 25 students per team.");
        }

        match (course_group, team_number) {
            (Some(course_group), Some(team_number)) if errors.is_empty() => Ok(ClaimantPayload {
                claimant: ClaimantId {
                    course_group,
                    team_number,
                },
                leader_name,
                leader_email,
                leader_phone,
                students,
            }),
            _ => Err(StakeError::Invalid(errors.join(" "))),
        }
    }
}

fn clean(value: Option<&str>) -> String {
    value.unwrap_or_default().trim().to_string()
}

/// Validated claimant details carried into a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimantPayload {
    #[serde(flatten)]
    pub claimant: ClaimantId,
    pub leader_name: String,
    pub leader_email: String,
    pub leader_phone: String,
    pub students: Vec<Student>,
}

/// A permanent, uniquely-constrained claim of a resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub id: String,
    pub resource_key: String,
    /// Resource display name at commit time
    pub resource_name: String,
    #[serde(flatten)]
    pub payload: ClaimantPayload,
    pub created_at: u64,
}

impl Assignment {
    pub fn new(resource_key: String, resource_name: String, payload: ClaimantPayload, now: u64) -> Self {
        Self {
            id: nanoid::nanoid!(),
            resource_key,
            resource_name,
            payload,
            created_at: now,
        }
    }

    pub fn claimant(&self) -> ClaimantId {
        self.payload.claimant
    }
}
