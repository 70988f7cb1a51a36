use std::collections::HashMap;

use chrono::{DateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde::Serialize;
use uuid::Uuid;

use quad_shared::errors::{AppError, AppResult, ErrorCode};

use crate::models::{Cadence, NewPoints, NewTaskCompletion, Points, TaskCompletion};
use crate::schema::{points, task_completions};
use crate::services::windows::Window;
use crate::templates::TaskTemplate;

#[derive(Debug, Clone, Serialize)]
pub struct TaskView {
    pub idx: usize,
    #[serde(flatten)]
    pub template: TaskTemplate,
    pub completion: Option<TaskCompletion>,
}

#[derive(Debug, Serialize)]
pub struct TaskBoard {
    pub cadence: Cadence,
    pub window: Window,
    pub todo: Vec<TaskView>,
    pub done: Vec<TaskView>,
    pub points: i32,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ToggleOutcome {
    pub idx: usize,
    /// True when the call completed the task, false when it undid it.
    pub completed: bool,
    pub points: i32,
}

/// Split templates into not-yet-done and done, matching completions by title.
pub fn split(templates: &[TaskTemplate], completions: Vec<TaskCompletion>) -> (Vec<TaskView>, Vec<TaskView>) {
    let mut by_title: HashMap<String, TaskCompletion> = HashMap::new();
    for completion in completions {
        by_title.entry(completion.title.clone()).or_insert(completion);
    }

    let mut todo = Vec::new();
    let mut done = Vec::new();
    for (idx, template) in templates.iter().enumerate() {
        let view = TaskView { idx, template: template.clone(), completion: by_title.get(&template.title).cloned() };
        if view.completion.is_some() {
            done.push(view);
        } else {
            todo.push(view);
        }
    }
    (todo, done)
}

fn ensure_points_row(conn: &mut PgConnection, user_id: Uuid) -> AppResult<()> {
    diesel::insert_into(points::table)
        .values(&NewPoints { user_id })
        .on_conflict(points::user_id)
        .do_nothing()
        .execute(conn)?;
    Ok(())
}

/// The user's points row, created at zero on first use.
pub fn points_of(conn: &mut PgConnection, user_id: Uuid) -> AppResult<Points> {
    ensure_points_row(conn, user_id)?;
    Ok(points::table.find(user_id).first::<Points>(conn)?)
}

fn lock_points(conn: &mut PgConnection, user_id: Uuid) -> AppResult<Points> {
    ensure_points_row(conn, user_id)?;
    Ok(points::table.find(user_id).for_update().first::<Points>(conn)?)
}

fn window_filter(
    user_id: Uuid,
    cadence: Cadence,
    window: Window,
) -> task_completions::BoxedQuery<'static, diesel::pg::Pg> {
    task_completions::table
        .filter(task_completions::user_id.eq(user_id))
        .filter(task_completions::cadence.eq(cadence.as_str()))
        .filter(task_completions::completed_at.ge(window.start))
        .filter(task_completions::completed_at.lt(window.end))
        .into_boxed()
}

pub fn completions_in(
    conn: &mut PgConnection,
    user_id: Uuid,
    cadence: Cadence,
    window: Window,
) -> AppResult<Vec<TaskCompletion>> {
    Ok(window_filter(user_id, cadence, window)
        .order(task_completions::completed_at.asc())
        .load::<TaskCompletion>(conn)?)
}

pub fn list_tasks(
    conn: &mut PgConnection,
    user_id: Uuid,
    cadence: Cadence,
    templates: &[TaskTemplate],
    window: Window,
) -> AppResult<TaskBoard> {
    let completions = completions_in(conn, user_id, cadence, window)?;
    let (todo, done) = split(templates, completions);
    let points = points_of(conn, user_id)?;
    Ok(TaskBoard { cadence, window, todo, done, points: points.score })
}

/// Complete the template at `idx`, or undo it if already completed in the
/// current window. Points move with the completion in one transaction.
#[allow(clippy::too_many_arguments)]
pub fn toggle_task(
    conn: &mut PgConnection,
    user_id: Uuid,
    cadence: Cadence,
    templates: &[TaskTemplate],
    window: Window,
    now: DateTime<Utc>,
    idx: usize,
    proof_url: Option<&str>,
) -> AppResult<ToggleOutcome> {
    let template = templates
        .get(idx)
        .ok_or_else(|| AppError::new(ErrorCode::TaskNotFound, format!("no {cadence} task at index {idx}")))?;

    conn.transaction::<_, AppError, _>(|conn| {
        let current = lock_points(conn, user_id)?;

        let existing = window_filter(user_id, cadence, window)
            .filter(task_completions::title.eq(template.title.clone()))
            .first::<TaskCompletion>(conn)
            .optional()?;

        let (completed, delta) = match existing {
            Some(completion) => {
                diesel::delete(task_completions::table.find(completion.id)).execute(conn)?;
                (false, -completion.points)
            }
            None => {
                let proof_url = proof_url.map(str::trim).filter(|p| !p.is_empty());
                if cadence.requires_proof() && proof_url.is_none() {
                    return Err(AppError::new(
                        ErrorCode::ProofRequired,
                        "weekly challenges need a photo proof",
                    ));
                }
                diesel::insert_into(task_completions::table)
                    .values(&NewTaskCompletion {
                        user_id,
                        cadence: cadence.as_str(),
                        title: &template.title,
                        content: &template.content,
                        points: template.points,
                        proof_url,
                        completed_at: now,
                    })
                    .execute(conn)?;
                (true, template.points)
            }
        };

        let score = current.score + delta;
        diesel::update(points::table.find(user_id))
            .set((points::score.eq(score), points::updated_at.eq(now)))
            .execute(conn)?;

        tracing::info!(user_id = %user_id, cadence = %cadence, idx, completed, delta, score, "task toggled");
        Ok(ToggleOutcome { idx, completed, points: score })
    })
}

/// Scores for the given users; users without a points row are absent.
pub fn scores_for(conn: &mut PgConnection, user_ids: &[Uuid]) -> AppResult<HashMap<Uuid, i64>> {
    if user_ids.is_empty() {
        return Ok(HashMap::new());
    }
    Ok(points::table
        .filter(points::user_id.eq_any(user_ids))
        .select((points::user_id, points::score))
        .load::<(Uuid, i32)>(conn)?
        .into_iter()
        .map(|(id, score)| (id, score as i64))
        .collect())
}

pub fn top_scores(conn: &mut PgConnection, limit: i64) -> AppResult<Vec<(Uuid, i64)>> {
    Ok(points::table
        .order((points::score.desc(), points::user_id.asc()))
        .limit(limit.max(1))
        .select((points::user_id, points::score))
        .load::<(Uuid, i32)>(conn)?
        .into_iter()
        .map(|(id, score)| (id, score as i64))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template(title: &str, points: i32) -> TaskTemplate {
        TaskTemplate { title: title.into(), content: String::new(), points }
    }

    fn completion(title: &str, points: i32) -> TaskCompletion {
        TaskCompletion {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            cadence: "daily".into(),
            title: title.into(),
            content: String::new(),
            points,
            proof_url: None,
            completed_at: Utc::now(),
        }
    }

    #[test]
    fn split_keeps_template_order_and_indices() {
        let templates = [template("a", 5), template("b", 10), template("c", 5)];
        let (todo, done) = split(&templates, vec![completion("b", 10)]);

        assert_eq!(todo.iter().map(|t| t.idx).collect::<Vec<_>>(), vec![0, 2]);
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].idx, 1);
        assert_eq!(done[0].completion.as_ref().unwrap().points, 10);
    }

    #[test]
    fn completions_for_retired_templates_are_ignored() {
        let templates = [template("a", 5)];
        let (todo, done) = split(&templates, vec![completion("gone", 50)]);
        assert_eq!(todo.len(), 1);
        assert!(done.is_empty());
    }

    #[test]
    fn nothing_done_means_everything_todo() {
        let templates = [template("a", 5), template("b", 10)];
        let (todo, done) = split(&templates, Vec::new());
        assert_eq!(todo.len(), 2);
        assert!(done.is_empty());
    }
}
