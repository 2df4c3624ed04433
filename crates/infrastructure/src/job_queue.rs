//! 有界、满则丢弃的作业队列
//!
//! `put` 从不阻塞生产者：缓冲区满时丢弃新作业并累加溢出计数。
//! 消费端共享同一个接收端，按 FIFO 顺序取出。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use alerting_core::{Job, StructuredLogger};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

use crate::observability::MetricsCollector;

#[derive(Debug, Clone)]
pub struct JobQueue {
    name: Arc<str>,
    capacity: usize,
    sender: mpsc::Sender<Job>,
    /// 使用 Arc 包装接收端，支持多个消费者
    receiver: Arc<Mutex<mpsc::Receiver<Job>>>,
    overflow: Arc<AtomicU64>,
    enqueued: Arc<AtomicU64>,
    metrics: MetricsCollector,
}

impl JobQueue {
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        Self::with_metrics(name, capacity, MetricsCollector::new())
    }

    pub fn with_metrics(name: impl Into<String>, capacity: usize, metrics: MetricsCollector) -> Self {
        let capacity = capacity.max(1);
        let (sender, receiver) = mpsc::channel(capacity);
        let name: String = name.into();
        debug!("创建作业队列 {} (容量 {})", name, capacity);

        Self {
            name: name.into(),
            capacity,
            sender,
            receiver: Arc::new(Mutex::new(receiver)),
            overflow: Arc::new(AtomicU64::new(0)),
            enqueued: Arc::new(AtomicU64::new(0)),
            metrics,
        }
    }

    /// 非阻塞入队，返回作业是否被接受
    pub fn put(&self, job: Job) -> bool {
        match self.sender.try_send(job) {
            Ok(()) => {
                self.enqueued.fetch_add(1, Ordering::Relaxed);
                self.metrics.record_job_enqueued(&self.name);
                true
            }
            Err(mpsc::error::TrySendError::Full(job)) => {
                let total = self.overflow.fetch_add(1, Ordering::Relaxed) + 1;
                self.metrics.record_job_dropped(&self.name);
                StructuredLogger::log_job_dropped(&self.name, &job, total);
                false
            }
            Err(mpsc::error::TrySendError::Closed(job)) => {
                warn!("作业队列 {} 已关闭，丢弃作业 {}", self.name, job.key);
                false
            }
        }
    }

    /// 取出下一个作业；队列关闭且排空后返回 `None`
    pub async fn recv(&self) -> Option<Job> {
        let mut receiver = self.receiver.lock().await;
        receiver.recv().await
    }

    /// 非阻塞地取出一个作业
    pub async fn try_recv(&self) -> Option<Job> {
        let mut receiver = self.receiver.lock().await;
        receiver.try_recv().ok()
    }

    pub fn len(&self) -> usize {
        self.capacity - self.sender.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 因队列已满被丢弃的作业总数
    pub fn overflow_count(&self) -> u64 {
        self.overflow.load(Ordering::Relaxed)
    }

    pub fn enqueued_count(&self) -> u64 {
        self.enqueued.load(Ordering::Relaxed)
    }
}
