//! 批次运行记录（断点）
//!
//! 每个任务结束后整体落盘。`completed` 只增不减，
//! `resume_from` 永远指向按规划顺序的第一个未完成任务。

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::models::{Artifact, DateRange, Job, JobId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

/// 失败类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// 会话打开失败（登录态缺失等）
    SessionOpenFailed,
    /// 步骤判定页面不可恢复
    StepFatal,
    /// 恢复次数用尽
    RecoveryExhausted,
    /// 其他内部错误
    Internal,
}

/// 失败详情
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFailure {
    pub job_id: JobId,
    pub account: String,
    pub kind: FailureKind,
    /// 失败的步骤名
    pub step: Option<String>,
    pub attempts: u32,
    pub reason: String,
}

/// 单个任务最近一次的结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobRecord {
    Succeeded {
        artifacts: usize,
        finished_at: DateTime<Local>,
    },
    Failed {
        failure: JobFailure,
        finished_at: DateTime<Local>,
    },
    Cancelled,
    Skipped {
        reason: String,
    },
}

/// 批次运行记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRun {
    pub run_id: String,
    pub created_at: DateTime<Local>,
    pub updated_at: DateTime<Local>,
    pub date_range: DateRange,
    pub concurrency: usize,
    pub status: RunStatus,
    /// 规划顺序
    pub jobs: Vec<Job>,
    pub completed: BTreeSet<JobId>,
    pub resume_from: Option<JobId>,
    /// 规划顺序中最靠前的未解决失败
    pub failure: Option<JobFailure>,
    #[serde(default)]
    pub records: BTreeMap<JobId, JobRecord>,
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
}

impl BatchRun {
    pub fn new(jobs: Vec<Job>, date_range: DateRange, concurrency: usize) -> Self {
        let now = Local::now();
        let mut run = Self {
            run_id: Self::make_id(&now),
            created_at: now,
            updated_at: now,
            date_range,
            concurrency: concurrency.max(1),
            status: RunStatus::Pending,
            jobs,
            completed: BTreeSet::new(),
            resume_from: None,
            failure: None,
            records: BTreeMap::new(),
            artifacts: Vec::new(),
        };
        run.refresh_resume_from();
        run
    }

    pub fn make_id(at: &DateTime<Local>) -> String {
        at.format("run-%Y%m%d-%H%M%S").to_string()
    }

    /// 规划顺序中的位置（从 0 开始）
    pub fn position(&self, id: &JobId) -> Option<usize> {
        self.jobs.iter().position(|j| &j.id == id)
    }

    /// 尚未完成的任务，保持规划顺序
    pub fn pending_jobs(&self) -> Vec<Job> {
        self.jobs
            .iter()
            .filter(|j| !self.completed.contains(&j.id))
            .cloned()
            .collect()
    }

    pub fn completed_count(&self) -> usize {
        self.completed.len()
    }

    pub fn is_complete(&self) -> bool {
        self.jobs.iter().all(|j| self.completed.contains(&j.id))
    }

    /// 开始（或继续）执行：清掉上次的失败，等重跑结果重新写入
    pub fn begin(&mut self) {
        self.status = RunStatus::Running;
        self.failure = None;
        self.touch();
    }

    pub fn record_success(&mut self, job_id: &JobId, artifacts: Vec<Artifact>) {
        self.records.insert(
            job_id.clone(),
            JobRecord::Succeeded {
                artifacts: artifacts.len(),
                finished_at: Local::now(),
            },
        );
        self.artifacts.extend(artifacts);
        self.completed.insert(job_id.clone());
        self.refresh_resume_from();
    }

    pub fn record_failure(&mut self, failure: JobFailure) {
        self.records.insert(
            failure.job_id.clone(),
            JobRecord::Failed {
                failure: failure.clone(),
                finished_at: Local::now(),
            },
        );
        let earlier = match &self.failure {
            None => true,
            Some(current) => self.position(&failure.job_id) < self.position(&current.job_id),
        };
        if earlier {
            self.failure = Some(failure);
        }
        self.refresh_resume_from();
    }

    pub fn record_cancelled(&mut self, job_id: &JobId) {
        self.records.insert(job_id.clone(), JobRecord::Cancelled);
        self.refresh_resume_from();
    }

    pub fn record_skipped(&mut self, job_id: &JobId, reason: impl Into<String>) {
        self.records.insert(
            job_id.clone(),
            JobRecord::Skipped {
                reason: reason.into(),
            },
        );
        self.refresh_resume_from();
    }

    /// 收尾：根据完成情况决定最终状态
    pub fn finish(&mut self) {
        self.refresh_resume_from();
        self.status = if self.is_complete() {
            RunStatus::Succeeded
        } else if self.failure.is_some() {
            RunStatus::Failed
        } else {
            RunStatus::Cancelled
        };
    }

    pub fn refresh_resume_from(&mut self) {
        self.resume_from = self
            .jobs
            .iter()
            .find(|j| !self.completed.contains(&j.id))
            .map(|j| j.id.clone());
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Local::now();
    }
}
