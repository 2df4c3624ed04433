use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{SchedulerError, SchedulerResult};

/// 本节点的告警调度状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlertingStatus {
    #[serde(rename = "READY")]
    Ready,
    #[serde(rename = "SCHEDULING")]
    Scheduling,
    #[serde(rename = "PROCESSING")]
    Processing,
}

/// 正在处理的工作类别
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunType {
    #[default]
    #[serde(rename = "NORMAL")]
    Normal,
    #[serde(rename = "MISSING")]
    Missing,
}

impl RunType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunType::Normal => "NORMAL",
            RunType::Missing => "MISSING",
        }
    }
}

impl fmt::Display for RunType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for AlertingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AlertingStatus::Ready => "READY",
            AlertingStatus::Scheduling => "SCHEDULING",
            AlertingStatus::Processing => "PROCESSING",
        };
        f.write_str(s)
    }
}

/// 集群告警状态机
///
/// 正常循环 READY -> SCHEDULING -> PROCESSING -> READY。只由协调器的单个循环修改。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertingState {
    pub status: AlertingStatus,
    pub run_type: RunType,
    pub last_processed_interval: i64,
    /// 正在处理的任务对应的心跳区间
    pub current_interval: Option<i64>,
}

impl Default for AlertingState {
    fn default() -> Self {
        Self {
            status: AlertingStatus::Ready,
            run_type: RunType::Normal,
            last_processed_interval: 0,
            current_interval: None,
        }
    }
}

impl AlertingState {
    pub fn is_ready(&self) -> bool {
        self.status == AlertingStatus::Ready
    }

    /// READY -> SCHEDULING；NORMAL 运行同时推进 `last_processed_interval`
    pub fn begin_scheduling(&mut self, run_type: RunType, interval: i64) -> SchedulerResult<()> {
        if self.status != AlertingStatus::Ready {
            return Err(SchedulerError::InvariantViolated(format!(
                "cannot schedule {run_type} run for interval {interval} while {}",
                self.status
            )));
        }
        self.status = AlertingStatus::Scheduling;
        self.run_type = run_type;
        self.current_interval = Some(interval);
        if run_type == RunType::Normal {
            self.last_processed_interval = interval;
        }
        Ok(())
    }

    /// 处理分发任务的回报：成功 SCHEDULING -> PROCESSING，失败 SCHEDULING -> READY
    pub fn apply_task_status(
        &mut self,
        status: &DispatcherTaskStatus,
    ) -> SchedulerResult<AlertingStatus> {
        if self.status != AlertingStatus::Scheduling {
            return Err(SchedulerError::InvariantViolated(format!(
                "received {} task status while {}",
                status.task_type, self.status
            )));
        }
        if status.task_type != self.run_type {
            return Err(SchedulerError::InvariantViolated(format!(
                "received {} task status during {} run",
                status.task_type, self.run_type
            )));
        }

        if status.success {
            self.status = AlertingStatus::Processing;
        } else {
            self.status = AlertingStatus::Ready;
            self.current_interval = None;
        }
        Ok(self.status)
    }

    /// PROCESSING -> READY
    pub fn finish_processing(&mut self) -> SchedulerResult<Option<i64>> {
        if self.status != AlertingStatus::Processing {
            return Err(SchedulerError::InvariantViolated(format!(
                "cannot finish processing while {}",
                self.status
            )));
        }
        self.status = AlertingStatus::Ready;
        Ok(self.current_interval.take())
    }
}

/// 某个心跳区间上本节点的分区信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub node_id: String,
    pub heartbeat: i64,
    pub partition_no: u32,
    pub node_count: u32,
}

/// 应执行但未完成的分区运行
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AlertRecord {
    /// 原本负责该分区的节点
    pub node_id: String,
    pub heartbeat: i64,
    pub partition_no: u32,
    pub node_count: u32,
}

/// 节点认领缺失告警时写入的登记记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingAlertsCheckIn {
    pub node_id: String,
    pub run_type: RunType,
    pub interval: i64,
    pub records: Vec<AlertRecord>,
}

/// 分发任务的种类
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DispatcherTaskKind {
    Partition { partition_no: u32, node_count: u32 },
    MissingAlerts { records: Vec<AlertRecord> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatcherTask {
    pub interval: i64,
    pub kind: DispatcherTaskKind,
}

impl DispatcherTask {
    pub fn partition(partition_no: u32, node_count: u32, interval: i64) -> Self {
        Self {
            interval,
            kind: DispatcherTaskKind::Partition {
                partition_no,
                node_count,
            },
        }
    }

    pub fn missing_alerts(records: Vec<AlertRecord>, interval: i64) -> Self {
        Self {
            interval,
            kind: DispatcherTaskKind::MissingAlerts { records },
        }
    }

    pub fn task_type(&self) -> RunType {
        match self.kind {
            DispatcherTaskKind::Partition { .. } => RunType::Normal,
            DispatcherTaskKind::MissingAlerts { .. } => RunType::Missing,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatcherTaskStatus {
    pub success: bool,
    pub error_message: Option<String>,
    pub task_type: RunType,
    pub interval: i64,
}

impl DispatcherTaskStatus {
    pub fn succeeded(task: &DispatcherTask) -> Self {
        Self {
            success: true,
            error_message: None,
            task_type: task.task_type(),
            interval: task.interval,
        }
    }

    pub fn failed(task: &DispatcherTask, error_message: impl Into<String>) -> Self {
        Self {
            success: false,
            error_message: Some(error_message.into()),
            task_type: task.task_type(),
            interval: task.interval,
        }
    }
}
