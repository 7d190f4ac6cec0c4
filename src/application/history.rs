use crate::domain::models::{HistoryPage, PomodoroTask};
use crate::infrastructure::api_client::PomodoroApi;
use crate::infrastructure::error::InfraError;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::task::JoinSet;

pub const MAX_HISTORY_LIMIT: u32 = 100;
const TASK_FETCH_CONCURRENCY: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskFetchError {
    pub session_id: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryView {
    pub page: HistoryPage,
    pub has_more: bool,
    pub task_errors: Vec<TaskFetchError>,
}

/// `0` means "use the configured page size"; anything else is capped.
pub fn normalize_limit(requested: u32, page_size: u32) -> u32 {
    let limit = if requested == 0 { page_size } else { requested };
    limit.clamp(1, MAX_HISTORY_LIMIT)
}

/// One page of past sessions with their tasks filled in.
///
/// Task lists are fetched in parallel. A failure for one session leaves its
/// tasks empty and is reported in `task_errors`; it never fails the page.
pub async fn load_history<A>(
    api: Arc<A>,
    access_token: &str,
    offset: u32,
    limit: u32,
) -> Result<HistoryView, InfraError>
where
    A: PomodoroApi + ?Sized + 'static,
{
    let mut page = api.get_history(access_token, offset, limit).await?;

    let targets: Vec<(usize, String)> = page
        .items
        .iter()
        .enumerate()
        .map(|(index, session)| (index, session.id.clone()))
        .collect();
    // Fetches not yet joined successfully, by page index.
    let mut outstanding: BTreeMap<usize, String> = targets.iter().cloned().collect();
    let mut fetches: JoinSet<(usize, Result<Vec<PomodoroTask>, InfraError>)> = JoinSet::new();
    let mut task_errors = Vec::new();
    let access_token = access_token.to_string();

    for (index, session_id) in targets {
        let api = Arc::clone(&api);
        let access_token = access_token.clone();

        fetches.spawn(async move {
            let tasks = api.list_session_tasks(&access_token, &session_id).await;
            (index, tasks)
        });

        if fetches.len() >= TASK_FETCH_CONCURRENCY {
            collect_tasks(&mut fetches, &mut page, &mut outstanding, &mut task_errors).await;
        }
    }

    while !fetches.is_empty() {
        collect_tasks(&mut fetches, &mut page, &mut outstanding, &mut task_errors).await;
    }

    for (index, session_id) in outstanding {
        if let Some(session) = page.items.get_mut(index) {
            session.tasks.clear();
        }
        task_errors.push(TaskFetchError {
            session_id,
            message: "task fetch did not finish".to_string(),
        });
    }

    task_errors.sort_by(|left, right| left.session_id.cmp(&right.session_id));
    let has_more = page.has_more();
    Ok(HistoryView {
        page,
        has_more,
        task_errors,
    })
}

async fn collect_tasks(
    fetches: &mut JoinSet<(usize, Result<Vec<PomodoroTask>, InfraError>)>,
    page: &mut HistoryPage,
    outstanding: &mut BTreeMap<usize, String>,
    task_errors: &mut Vec<TaskFetchError>,
) {
    let Some(join_result) = fetches.join_next().await else {
        return;
    };
    let (index, tasks) = match join_result {
        Ok(result) => result,
        Err(error) => {
            log::error!("task fetch join failed: {error}");
            return;
        }
    };
    let Some(session_id) = outstanding.remove(&index) else {
        return;
    };

    match tasks {
        Ok(tasks) => {
            if let Some(session) = page.items.get_mut(index) {
                session.tasks = tasks;
            }
        }
        Err(error) => {
            log::warn!("failed to load tasks for session {session_id}: {error}");
            if let Some(session) = page.items.get_mut(index) {
                session.tasks.clear();
            }
            task_errors.push(TaskFetchError {
                session_id,
                message: error.to_string(),
            });
        }
    }
}
