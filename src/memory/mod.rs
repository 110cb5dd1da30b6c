use std::collections::{BTreeMap, HashMap};

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::chains::{ChainKind, ChainOutput};

pub const CHAIN_SCOPE: &str = "chain";
pub const TASK_SCOPE: &str = "task";

/// Memory元数据
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryMetadata {
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub access_counts: HashMap<String, u64>,
    pub data_sizes: HashMap<String, usize>,
    pub total_size: usize,
}

impl Default for MemoryMetadata {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            created_at: now,
            last_updated: now,
            access_counts: HashMap::new(),
            data_sizes: HashMap::new(),
            total_size: 0,
        }
    }
}

/// 单次研究运行的内存
///
/// Holds typed chain outputs and task texts so later tasks receive earlier
/// results explicitly. Dropped when the run ends.
#[derive(Debug, Default)]
pub struct ResearchMemory {
    data: HashMap<String, Value>,
    metadata: MemoryMetadata,
}

impl ResearchMemory {
    pub fn new() -> Self {
        Self::default()
    }

    fn put(&mut self, full_key: String, value: Value) {
        let size = value.to_string().len();
        if let Some(old_size) = self.metadata.data_sizes.insert(full_key.clone(), size) {
            self.metadata.total_size -= old_size;
        }
        self.metadata.total_size += size;
        self.metadata.last_updated = Utc::now();
        self.data.insert(full_key, value);
    }

    fn read(&mut self, full_key: &str) -> Option<&Value> {
        *self
            .metadata
            .access_counts
            .entry(full_key.to_string())
            .or_insert(0) += 1;
        self.data.get(full_key)
    }

    /// 保存链输出，同类型输出会被覆盖
    pub fn store_output<T: ChainOutput>(&mut self, output: &T) -> Result<()> {
        let value = serde_json::to_value(output)?;
        self.put(format!("{}:{}", CHAIN_SCOPE, T::KIND), value);
        Ok(())
    }

    pub fn output<T: ChainOutput>(&mut self) -> Option<T> {
        let value = self.read(&format!("{}:{}", CHAIN_SCOPE, T::KIND))?;
        serde_json::from_value(value.clone()).ok()
    }

    pub fn has_output(&self, kind: ChainKind) -> bool {
        self.data.contains_key(&format!("{}:{}", CHAIN_SCOPE, kind))
    }

    pub fn store_task_output(&mut self, task_name: &str, text: &str) {
        self.put(
            format!("{}:{}", TASK_SCOPE, task_name),
            Value::String(text.to_string()),
        );
    }

    pub fn task_output(&mut self, task_name: &str) -> Option<String> {
        self.read(&format!("{}:{}", TASK_SCOPE, task_name))
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    /// Stored outputs of the given chains as one pretty-printed JSON object,
    /// keyed by chain name. Chains without output are left out.
    pub fn context_for(&mut self, kinds: &[ChainKind]) -> String {
        let mut context = Map::new();
        for kind in kinds {
            if let Some(value) = self.read(&format!("{}:{}", CHAIN_SCOPE, kind)) {
                context.insert(kind.to_string(), value.clone());
            }
        }
        serde_json::to_string_pretty(&Value::Object(context)).unwrap_or_default()
    }

    pub fn list_keys(&self, scope: &str) -> Vec<String> {
        let prefix = format!("{}:", scope);
        let mut keys: Vec<String> = self
            .data
            .keys()
            .filter_map(|key| key.strip_prefix(&prefix))
            .map(str::to_string)
            .collect();
        keys.sort();
        keys
    }

    /// 获取内存使用统计（按作用域汇总字节数）
    pub fn usage_stats(&self) -> BTreeMap<String, usize> {
        let mut stats = BTreeMap::new();
        for (key, size) in &self.metadata.data_sizes {
            let scope = key.split(':').next().unwrap_or("unknown").to_string();
            *stats.entry(scope).or_insert(0) += size;
        }
        stats
    }

    pub fn metadata(&self) -> &MemoryMetadata {
        &self.metadata
    }
}
