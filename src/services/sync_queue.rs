//! 身份同步队列
//!
//! 成员变更后为受影响的 (订阅, 集群) 组合排队同步任务，请求本身不等待任务完成。
//! 同一组合在排队期间重复调度会合并为一个任务，以最后一次调度的触发者为准；
//! 处理中再次调度时，由同一个 worker 在当前任务结束后接着处理。

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::{mapref::entry::Entry, DashMap};
use tokio::sync::{mpsc, Mutex, Notify};

use crate::config::SyncConfig;
use crate::models::{SyncStatus, SyncedIdentity};
use crate::store::{ModelStore, StoreResult};

/// 幂等键：(订阅 uuid, 集群 id)
pub type SyncKey = (String, String);

/// 单个同步任务
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncTask {
    pub subscription_uuid: String,
    pub cluster_id: String,
    pub org_id: String,
    /// 触发成员变更的身份
    pub actor_id: String,
    /// 订阅所有者
    pub owner_id: String,
}

impl SyncTask {
    pub fn key(&self) -> SyncKey {
        (self.subscription_uuid.clone(), self.cluster_id.clone())
    }

    /// 只有所有者触发的同步才可归属
    pub fn is_owner_attributed(&self) -> bool {
        self.actor_id == self.owner_id
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("identity sync channel unavailable: {0}")]
    Unavailable(String),
}

/// 下游身份同步通道
#[async_trait]
pub trait IdentitySyncer: Send + Sync {
    async fn sync(&self, task: &SyncTask) -> Result<(), SyncError>;
}

/// 默认同步通道：下游未接入，所有尝试均失败
#[derive(Debug, Default)]
pub struct UnavailableSyncer;

#[async_trait]
impl IdentitySyncer for UnavailableSyncer {
    async fn sync(&self, _task: &SyncTask) -> Result<(), SyncError> {
        Err(SyncError::Unavailable(
            "no identity sync channel is configured".to_string(),
        ))
    }
}

/// 任务处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SyncOutcome {
    Synced,
    Failed,
    /// 非所有者触发，不写入记录
    Unattributed,
    /// 集群已不在订阅可达范围内
    Unreachable,
    Error,
}

impl SyncOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            SyncOutcome::Synced => "synced",
            SyncOutcome::Failed => "failed",
            SyncOutcome::Unattributed => "unattributed",
            SyncOutcome::Unreachable => "unreachable",
            SyncOutcome::Error => "error",
        }
    }
}

struct Shared {
    store: Arc<dyn ModelStore>,
    syncer: Arc<dyn IdentitySyncer>,
    /// 每个键最多一个槽位：存在即表示排队或处理中，值为尚未取走的最新任务
    slots: DashMap<SyncKey, Option<SyncTask>>,
    /// 槽位数
    outstanding: AtomicUsize,
    idle: Notify,
}

impl Shared {
    /// 取走键的下一个任务；没有待处理任务时释放槽位
    fn next_task(&self, key: &SyncKey) -> Option<SyncTask> {
        match self.slots.entry(key.clone()) {
            Entry::Occupied(mut slot) => {
                if let Some(task) = slot.get_mut().take() {
                    return Some(task);
                }
                slot.remove();
                None
            }
            Entry::Vacant(_) => None,
        }
    }

    fn release(&self, key: &SyncKey) {
        if self.slots.remove(key).is_some() {
            self.finish_one();
        }
    }

    fn finish_one(&self) {
        if self.outstanding.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.idle.notify_waiters();
        }
    }
}

pub struct SyncQueue {
    tx: mpsc::Sender<SyncKey>,
    shared: Arc<Shared>,
}

impl SyncQueue {
    /// 创建队列并启动 worker
    pub fn start(
        store: Arc<dyn ModelStore>,
        syncer: Arc<dyn IdentitySyncer>,
        config: &SyncConfig,
    ) -> Arc<Self> {
        let (tx, rx) = mpsc::channel(config.queue_capacity);
        let rx = Arc::new(Mutex::new(rx));
        let shared = Arc::new(Shared {
            store,
            syncer,
            slots: DashMap::new(),
            outstanding: AtomicUsize::new(0),
            idle: Notify::new(),
        });

        for worker_id in 0..config.worker_count {
            tokio::spawn(run_worker(worker_id, rx.clone(), shared.clone()));
        }

        tracing::info!(
            workers = config.worker_count,
            capacity = config.queue_capacity,
            "Identity sync queue started"
        );

        Arc::new(Self { tx, shared })
    }

    /// 调度同步任务（不等待执行）
    pub fn schedule(&self, task: SyncTask) {
        let key = task.key();

        match self.shared.slots.entry(key.clone()) {
            Entry::Occupied(mut slot) => {
                // 同一键已排队或处理中：替换为最新任务，不再投递
                let coalesced = slot.get_mut().replace(task).is_some();
                if coalesced {
                    metrics::counter!("sync_tasks_coalesced_total").increment(1);
                }
                tracing::debug!(
                    subscription = %key.0,
                    cluster_id = %key.1,
                    coalesced,
                    "Sync task deferred to the current holder"
                );
                return;
            }
            Entry::Vacant(slot) => {
                slot.insert(Some(task));
            }
        }

        self.shared.outstanding.fetch_add(1, Ordering::AcqRel);
        metrics::counter!("sync_tasks_scheduled_total").increment(1);

        match self.tx.try_send(key) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(key)) => {
                // 队列已满时转入后台等待，不阻塞请求
                let tx = self.tx.clone();
                let shared = self.shared.clone();
                tokio::spawn(async move {
                    if let Err(mpsc::error::SendError(key)) = tx.send(key).await {
                        shared.release(&key);
                    }
                });
            }
            Err(mpsc::error::TrySendError::Closed(key)) => {
                tracing::error!(
                    subscription = %key.0,
                    cluster_id = %key.1,
                    "Sync queue closed, task dropped"
                );
                self.shared.release(&key);
            }
        }
    }

    /// 订阅是否仍有排队或处理中的同步任务
    pub fn propagation_pending(&self, subscription_uuid: &str) -> bool {
        self.shared
            .slots
            .iter()
            .any(|entry| entry.key().0 == subscription_uuid)
    }

    pub fn outstanding(&self) -> usize {
        self.shared.outstanding.load(Ordering::Acquire)
    }

    /// 等待所有已调度任务处理完毕
    pub async fn await_propagation(&self) {
        loop {
            let notified = self.shared.idle.notified();
            tokio::pin!(notified);
            // 先注册再检查，避免错过通知
            notified.as_mut().enable();
            if self.outstanding() == 0 {
                return;
            }
            notified.await;
        }
    }
}

async fn run_worker(
    worker_id: usize,
    rx: Arc<Mutex<mpsc::Receiver<SyncKey>>>,
    shared: Arc<Shared>,
) {
    loop {
        let key = {
            let mut rx = rx.lock().await;
            rx.recv().await
        };
        let Some(key) = key else {
            tracing::debug!(worker_id, "Sync worker stopped");
            return;
        };

        // 槽位在处理期间保留，同键的新调度只更新槽位中的任务
        while let Some(task) = shared.next_task(&key) {
            handle(worker_id, &shared, &task).await;
        }
        shared.finish_one();
    }
}

async fn handle(worker_id: usize, shared: &Shared, task: &SyncTask) {
    let outcome = match process(shared, task).await {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::error!(
                worker_id,
                org_id = %task.org_id,
                subscription = %task.subscription_uuid,
                cluster_id = %task.cluster_id,
                error = %e,
                "Sync task failed"
            );
            SyncOutcome::Error
        }
    };

    metrics::counter!("sync_tasks_total", "outcome" => outcome.as_str()).increment(1);
    tracing::debug!(
        worker_id,
        org_id = %task.org_id,
        subscription = %task.subscription_uuid,
        cluster_id = %task.cluster_id,
        actor_id = %task.actor_id,
        outcome = outcome.as_str(),
        "Sync task processed"
    );
}

/// 集群是否仍可经由订阅的分组到达
async fn reachable(store: &dyn ModelStore, task: &SyncTask) -> StoreResult<bool> {
    let Some(subscription) = store
        .find_subscription(&task.org_id, &task.subscription_uuid)
        .await?
    else {
        return Ok(false);
    };
    let Some(cluster) = store.find_cluster(&task.org_id, &task.cluster_id).await? else {
        return Ok(false);
    };

    let groups = store
        .find_groups_by_name(&task.org_id, &subscription.groups)
        .await?;
    Ok(groups.iter().any(|g| cluster.in_group(&g.uuid)))
}

/// 所有者的其他订阅是否仍到达该集群
async fn owner_still_reaches(store: &dyn ModelStore, task: &SyncTask) -> StoreResult<bool> {
    let Some(cluster) = store.find_cluster(&task.org_id, &task.cluster_id).await? else {
        return Ok(false);
    };
    let group_names: Vec<String> = cluster.groups.iter().map(|g| g.name.clone()).collect();
    let subscriptions = store
        .subscriptions_for_groups(&task.org_id, &group_names)
        .await?;
    Ok(subscriptions
        .iter()
        .any(|s| s.owner == task.owner_id && s.uuid != task.subscription_uuid))
}

async fn process(shared: &Shared, task: &SyncTask) -> StoreResult<SyncOutcome> {
    let store = shared.store.as_ref();

    // 不可达的清理与触发者无关
    if !reachable(store, task).await? {
        if !owner_still_reaches(store, task).await? {
            store
                .remove_synced_identity(&task.org_id, &task.cluster_id, &task.owner_id)
                .await?;
        }
        return Ok(SyncOutcome::Unreachable);
    }

    if !task.is_owner_attributed() {
        return Ok(SyncOutcome::Unattributed);
    }

    store
        .upsert_synced_identity(
            &task.org_id,
            &task.cluster_id,
            SyncedIdentity::new(&task.owner_id, SyncStatus::Pending, None),
        )
        .await?;

    let record = match shared.syncer.sync(task).await {
        Ok(()) => SyncedIdentity::new(&task.owner_id, SyncStatus::Synced, None),
        Err(e) => {
            tracing::warn!(
                org_id = %task.org_id,
                cluster_id = %task.cluster_id,
                error = %e,
                "Identity sync attempt failed"
            );
            SyncedIdentity::new(&task.owner_id, SyncStatus::Failed, Some(e.to_string()))
        }
    };
    let outcome = if record.sync_status == SyncStatus::Synced {
        SyncOutcome::Synced
    } else {
        SyncOutcome::Failed
    };

    store
        .upsert_synced_identity(&task.org_id, &task.cluster_id, record)
        .await?;
    Ok(outcome)
}
