use std::collections::{BTreeMap, HashMap};

use modelhub_core::{TaskId, TaskPriority};

type QueueKey = (u8, u64);

/// 待派发任务队列：先按优先级（High → Normal → Low），同级按入队顺序
#[derive(Debug, Default)]
pub struct PriorityTaskQueue {
    entries: BTreeMap<QueueKey, TaskId>,
    index: HashMap<TaskId, QueueKey>,
    next_seq: u64,
}

impl PriorityTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// 入队；任务已在队列中时返回 false
    pub fn push(&mut self, task_id: TaskId, priority: TaskPriority) -> bool {
        if self.index.contains_key(&task_id) {
            return false;
        }
        let key = (priority.rank(), self.next_seq);
        self.next_seq += 1;
        self.index.insert(task_id.clone(), key);
        self.entries.insert(key, task_id);
        true
    }

    pub fn remove(&mut self, task_id: &str) -> bool {
        match self.index.remove(task_id) {
            Some(key) => {
                self.entries.remove(&key);
                true
            }
            None => false,
        }
    }

    /// 按派发顺序遍历
    pub fn iter(&self) -> impl Iterator<Item = &TaskId> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
