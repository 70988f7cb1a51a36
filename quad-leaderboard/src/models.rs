use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::schema::{points, task_completions};

/// How often a challenge list resets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cadence {
    Daily,
    Weekly,
}

impl Cadence {
    pub const ALL: [Cadence; 2] = [Cadence::Daily, Cadence::Weekly];

    pub fn as_str(&self) -> &'static str {
        match self {
            Cadence::Daily => "daily",
            Cadence::Weekly => "weekly",
        }
    }

    /// Weekly challenges need a photo before they count.
    pub fn requires_proof(&self) -> bool {
        matches!(self, Cadence::Weekly)
    }
}

impl fmt::Display for Cadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Cadence {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown cadence: {s}"))
    }
}

// --- Points ---

#[derive(Debug, Clone, Queryable, Identifiable, Serialize)]
#[diesel(table_name = points, primary_key(user_id))]
pub struct Points {
    pub user_id: Uuid,
    pub score: i32,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = points)]
pub struct NewPoints {
    pub user_id: Uuid,
}

// --- Task completions ---

#[derive(Debug, Clone, Queryable, Identifiable, Serialize)]
#[diesel(table_name = task_completions)]
pub struct TaskCompletion {
    pub id: Uuid,
    pub user_id: Uuid,
    pub cadence: String,
    pub title: String,
    pub content: String,
    pub points: i32,
    pub proof_url: Option<String>,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = task_completions)]
pub struct NewTaskCompletion<'a> {
    pub user_id: Uuid,
    pub cadence: &'a str,
    pub title: &'a str,
    pub content: &'a str,
    pub points: i32,
    pub proof_url: Option<&'a str>,
    pub completed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cadence_round_trips_through_str() {
        for cadence in Cadence::ALL {
            assert_eq!(cadence.as_str().parse::<Cadence>().unwrap(), cadence);
        }
        assert!("monthly".parse::<Cadence>().is_err());
    }

    #[test]
    fn only_weekly_needs_proof() {
        assert!(!Cadence::Daily.requires_proof());
        assert!(Cadence::Weekly.requires_proof());
    }
}
