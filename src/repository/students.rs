//! Students repository for database operations

use async_trait::async_trait;
use sqlx::{Pool, Postgres, QueryBuilder};

use crate::{
    error::AppResult,
    models::{CreateStudent, Entity, Student, StudentFilter, UpdateStudent},
};

use super::{like_pattern, map_write_error, CrudRepository};

const STUDENT_COLUMNS: &str = "id, name, matric_number, level, department, created_at, updated_at";

#[derive(Clone)]
pub struct StudentsRepository {
    pool: Pool<Postgres>,
}

impl StudentsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CrudRepository<Student> for StudentsRepository {
    async fn create(&self, data: &CreateStudent) -> AppResult<Student> {
        sqlx::query_as::<_, Student>(&format!(
            r#"
            INSERT INTO students (name, matric_number, level, department)
            VALUES ($1, $2, $3, $4)
            RETURNING {}
            "#,
            STUDENT_COLUMNS
        ))
        .bind(&data.name)
        .bind(&data.matric_number)
        .bind(&data.level)
        .bind(&data.department)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_write_error(Student::NAME, e))
    }

    async fn find_by_id(&self, id: i32) -> AppResult<Option<Student>> {
        let student = sqlx::query_as::<_, Student>(&format!(
            "SELECT {} FROM students WHERE id = $1",
            STUDENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(student)
    }

    async fn find_all(&self, filter: &StudentFilter) -> AppResult<Vec<Student>> {
        let mut query =
            QueryBuilder::<Postgres>::new(format!("SELECT {} FROM students WHERE 1=1", STUDENT_COLUMNS));

        let text_filters = [
            ("name", &filter.name),
            ("matric_number", &filter.matric_number),
            ("level", &filter.level),
            ("department", &filter.department),
        ];
        for (column, value) in text_filters {
            if let Some(value) = value {
                query
                    .push(format!(" AND {} ILIKE ", column))
                    .push_bind(like_pattern(value));
            }
        }
        query.push(" ORDER BY id");

        let students = query.build_query_as::<Student>().fetch_all(&self.pool).await?;
        Ok(students)
    }

    async fn update(&self, id: i32, data: &UpdateStudent) -> AppResult<Option<Student>> {
        sqlx::query_as::<_, Student>(&format!(
            r#"
            UPDATE students SET
                name = COALESCE($2, name),
                matric_number = COALESCE($3, matric_number),
                level = COALESCE($4, level),
                department = COALESCE($5, department),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            STUDENT_COLUMNS
        ))
        .bind(id)
        .bind(&data.name)
        .bind(&data.matric_number)
        .bind(&data.level)
        .bind(&data.department)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_write_error(Student::NAME, e))
    }

    async fn delete(&self, id: i32) -> AppResult<Option<Student>> {
        sqlx::query_as::<_, Student>(&format!(
            "DELETE FROM students WHERE id = $1 RETURNING {}",
            STUDENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_write_error(Student::NAME, e))
    }
}
