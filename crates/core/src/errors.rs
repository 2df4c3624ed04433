use thiserror::Error;

/// 调度器错误类型定义
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("调度定义存储错误: {0}")]
    ScheduleStore(String),

    #[error("调度偏移存储错误: {0}")]
    OffsetStore(String),

    #[error("集群节点注册表错误: {0}")]
    ClusterRegistry(String),

    #[error("消息总线错误: {0}")]
    MessageBus(String),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("无效的检查表达式: {expr} - {message}")]
    InvalidExpression { expr: String, message: String },

    #[error("时序查询失败: {query} - {message}")]
    Query { query: String, message: String },

    #[error("检查评估超时: {seconds}s")]
    EvaluationTimeout { seconds: u64 },

    #[error("不变量被破坏: {0}")]
    InvariantViolated(String),

    #[error("协调器循环 {loop_name} 发生panic: {message}")]
    CoordinatorPanic { loop_name: String, message: String },

    #[error("操作已取消")]
    Cancelled,

    #[error("内部错误: {0}")]
    Internal(String),
}

impl SchedulerError {
    /// 配置类错误：表达式本应在持久化前完成校验，出现即视为程序/配置缺陷
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            SchedulerError::Configuration(_) | SchedulerError::InvalidExpression { .. }
        )
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, SchedulerError::Cancelled)
    }

    pub fn invalid_expression(expr: impl Into<String>, message: impl Into<String>) -> Self {
        SchedulerError::InvalidExpression {
            expr: expr.into(),
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for SchedulerError {
    fn from(e: serde_json::Error) -> Self {
        SchedulerError::Serialization(e.to_string())
    }
}

/// 统一的Result类型
pub type SchedulerResult<T> = std::result::Result<T, SchedulerError>;
