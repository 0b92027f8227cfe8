//! Student model and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use validator::{Validate, ValidationError};

use super::{contains_ci, Entity};

/// Student model from database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: i32,
    pub name: String,
    pub matric_number: String,
    pub level: String,
    pub department: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for Student {
    const NAME: &'static str = "Student";

    type Create = CreateStudent;
    type Update = UpdateStudent;
    type Filter = StudentFilter;

    fn id(&self) -> i32 {
        self.id
    }
}

/// Create student request
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateStudent {
    #[validate(length(min = 1, message = "Name must not be empty"))]
    pub name: String,
    #[validate(custom(function = "validate_matric_number"))]
    pub matric_number: String,
    /// Level in the university, e.g. "300"
    #[validate(length(min = 1, message = "Level must not be empty"))]
    pub level: String,
    #[validate(length(min = 1, message = "Department must not be empty"))]
    pub department: String,
}

/// Partial student update
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStudent {
    #[validate(length(min = 1, message = "Name must not be empty"))]
    pub name: Option<String>,
    #[validate(custom(function = "validate_matric_number"))]
    pub matric_number: Option<String>,
    #[validate(length(min = 1, message = "Level must not be empty"))]
    pub level: Option<String>,
    #[validate(length(min = 1, message = "Department must not be empty"))]
    pub department: Option<String>,
}

/// Student list filters
#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct StudentFilter {
    pub name: Option<String>,
    pub matric_number: Option<String>,
    pub level: Option<String>,
    pub department: Option<String>,
}

impl StudentFilter {
    pub fn matches(&self, student: &Student) -> bool {
        self.name.as_deref().map_or(true, |n| contains_ci(&student.name, n))
            && self
                .matric_number
                .as_deref()
                .map_or(true, |m| contains_ci(&student.matric_number, m))
            && self.level.as_deref().map_or(true, |l| contains_ci(&student.level, l))
            && self
                .department
                .as_deref()
                .map_or(true, |d| contains_ci(&student.department, d))
    }
}

pub fn validate_matric_number(matric_number: &str) -> Result<(), ValidationError> {
    if !matric_number.is_empty() && matric_number.chars().all(|c| c.is_ascii_alphanumeric()) {
        Ok(())
    } else {
        let mut error = ValidationError::new("matric_number");
        error.message = Some("Matric number must be alphanumeric".into());
        Err(error)
    }
}
