//! 研究记录存储 - 进程内保存每次研究的状态、任务进度与结果

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::research::{
    ANALYSIS_TASK, DATA_COLLECTION_TASK, REPORT_TASK, ResearchRequest, TASKS, TaskDefinition,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResearchStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Waiting,
    Running,
    Completed,
    Failed,
}

/// 研究阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResearchPhase {
    Initializing,
    DataCollection,
    Analysis,
    Reporting,
    Completed,
    Failed,
}

impl ResearchPhase {
    fn for_task(task_name: &str) -> Option<Self> {
        match task_name {
            DATA_COLLECTION_TASK => Some(ResearchPhase::DataCollection),
            ANALYSIS_TASK => Some(ResearchPhase::Analysis),
            REPORT_TASK => Some(ResearchPhase::Reporting),
            _ => None,
        }
    }
}

/// 单个任务的进度
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskProgress {
    pub task_name: String,
    pub agent: String,
    pub status: TaskStatus,
    pub tools_used: Vec<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub output_preview: Option<String>,
}

impl TaskProgress {
    fn waiting(task: &TaskDefinition) -> Self {
        Self {
            task_name: task.name.to_string(),
            agent: task.agent.title().to_string(),
            status: TaskStatus::Waiting,
            tools_used: task.chains.iter().map(|kind| kind.to_string()).collect(),
            started_at: None,
            completed_at: None,
            output_preview: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchProgress {
    pub phase: ResearchPhase,
    pub tasks: Vec<TaskProgress>,
    pub current_task: Option<String>,
    /// Share of completed tasks, 0-100
    pub percentage: u8,
}

impl ResearchProgress {
    fn new() -> Self {
        Self {
            phase: ResearchPhase::Initializing,
            tasks: TASKS.iter().map(TaskProgress::waiting).collect(),
            current_task: None,
            percentage: 0,
        }
    }

    fn recompute(&mut self) {
        let total = self.tasks.len().max(1);
        let done = self
            .tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Completed)
            .count();
        self.percentage = ((done * 100) / total) as u8;
    }
}

/// 研究记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchRecord {
    pub id: String,
    pub request: ResearchRequest,
    pub status: ResearchStatus,
    pub progress: ResearchProgress,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result: Option<String>,
    pub report_path: Option<PathBuf>,
    pub error: Option<String>,
}

const PREVIEW_CHARS: usize = 200;

fn preview(output: &str) -> String {
    let mut text: String = output.chars().take(PREVIEW_CHARS).collect();
    if output.chars().count() > PREVIEW_CHARS {
        text.push_str("...");
    }
    text
}

/// 研究记录存储，所有访问经过同一把锁
#[derive(Debug, Default)]
pub struct ResearchStore {
    records: Mutex<HashMap<String, ResearchRecord>>,
}

impl ResearchStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, ResearchRecord>> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn update<F>(&self, id: &str, f: F) -> bool
    where
        F: FnOnce(&mut ResearchRecord),
    {
        match self.lock().get_mut(id) {
            Some(record) => {
                f(record);
                true
            }
            None => {
                debug!("研究记录不存在: {}", id);
                false
            }
        }
    }

    /// 创建待执行的研究记录
    pub fn create(&self, id: &str, request: ResearchRequest) -> ResearchRecord {
        let record = ResearchRecord {
            id: id.to_string(),
            request,
            status: ResearchStatus::Pending,
            progress: ResearchProgress::new(),
            created_at: Utc::now(),
            completed_at: None,
            result: None,
            report_path: None,
            error: None,
        };
        self.lock().insert(id.to_string(), record.clone());
        record
    }

    pub fn get(&self, id: &str) -> Option<ResearchRecord> {
        self.lock().get(id).cloned()
    }

    pub fn mark_running(&self, id: &str) -> bool {
        self.update(id, |record| record.status = ResearchStatus::Running)
    }

    pub fn task_started(&self, id: &str, task_name: &str) -> bool {
        self.update(id, |record| {
            record.progress.current_task = Some(task_name.to_string());
            if let Some(phase) = ResearchPhase::for_task(task_name) {
                record.progress.phase = phase;
            }
            if let Some(task) = record
                .progress
                .tasks
                .iter_mut()
                .find(|t| t.task_name == task_name)
            {
                task.status = TaskStatus::Running;
                task.started_at = Some(Utc::now());
            }
        })
    }

    pub fn task_completed(&self, id: &str, task_name: &str, output: &str) -> bool {
        self.update(id, |record| {
            if let Some(task) = record
                .progress
                .tasks
                .iter_mut()
                .find(|t| t.task_name == task_name)
            {
                task.status = TaskStatus::Completed;
                task.completed_at = Some(Utc::now());
                task.output_preview = Some(preview(output));
            }
            record.progress.recompute();
        })
    }

    pub fn task_failed(&self, id: &str, task_name: &str) -> bool {
        self.update(id, |record| {
            if let Some(task) = record
                .progress
                .tasks
                .iter_mut()
                .find(|t| t.task_name == task_name)
            {
                task.status = TaskStatus::Failed;
                task.completed_at = Some(Utc::now());
            }
        })
    }

    pub fn complete(&self, id: &str, result: String, report_path: PathBuf) -> bool {
        self.update(id, |record| {
            record.status = ResearchStatus::Completed;
            record.completed_at = Some(Utc::now());
            record.result = Some(result);
            record.report_path = Some(report_path);
            record.progress.phase = ResearchPhase::Completed;
            record.progress.current_task = None;
            record.progress.recompute();
        })
    }

    /// Marks the run failed. Tasks still running are closed as failed too.
    pub fn fail(&self, id: &str, error: String) -> bool {
        self.update(id, |record| {
            let now = Utc::now();
            record.status = ResearchStatus::Failed;
            record.completed_at = Some(now);
            record.error = Some(error);
            record.progress.phase = ResearchPhase::Failed;
            record.progress.current_task = None;
            for task in record
                .progress
                .tasks
                .iter_mut()
                .filter(|t| t.status == TaskStatus::Running)
            {
                task.status = TaskStatus::Failed;
                task.completed_at = Some(now);
            }
        })
    }

    /// One page of records, newest first, with the total before paging.
    ///
    /// `user_id` restricts the history to runs requested by that user.
    pub fn history(
        &self,
        user_id: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> (usize, Vec<ResearchRecord>) {
        let mut records: Vec<ResearchRecord> = self
            .lock()
            .values()
            .filter(|record| user_id.is_none_or(|user| record.request.user_id == user))
            .cloned()
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = records.len();
        (total, records.into_iter().skip(offset).take(limit).collect())
    }

    pub fn delete(&self, id: &str) -> Option<ResearchRecord> {
        self.lock().remove(id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
