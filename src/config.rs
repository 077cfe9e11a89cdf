//! 配置模块，负责加载JSON格式的实体/关系映射配置

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::compiler::DEFAULT_MAX_DEPTH;
use crate::error::ConfigError;

/// 一条关系映射：`实体.属性` 到目标实体的连接方式
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationConfig {
    /// 目标实体名
    pub target: String,
    /// 当前表上的连接列
    pub join_column: String,
    /// 目标表上的连接列
    #[serde(default = "default_target_column")]
    pub target_column: String,
    /// 一对多关系（分页时可能产生重复行）
    #[serde(default)]
    pub to_many: bool,
}

fn default_target_column() -> String {
    "id".to_string()
}

fn default_max_depth() -> usize {
    DEFAULT_MAX_DEPTH
}

/// 关系型后端使用的模式配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaConfig {
    /// 实体名到数据库表名的映射
    #[serde(default)]
    pub tables: HashMap<String, String>,
    /// 键为 `Entity.segment`
    #[serde(default)]
    pub relations: HashMap<String, RelationConfig>,
    /// 条件嵌套的最大深度
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

impl SchemaConfig {
    /// 从JSON文件加载配置
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();

        // 检查文件是否存在
        if !path_ref.exists() {
            return Err(ConfigError::NotFound(path_ref.display().to_string()));
        }

        let content = fs::read_to_string(path_ref).map_err(|source| ConfigError::Read {
            path: path_ref.display().to_string(),
            source,
        })?;

        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path_ref.display().to_string(),
            source,
        })
    }

    /// 从JSON字符串加载配置
    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(content).map_err(|source| ConfigError::Parse {
            path: "<inline>".to_string(),
            source,
        })
    }

    /// 获取实体对应的表名，如果不存在则返回小写的实体名
    pub fn table_name(&self, entity: &str) -> String {
        self.tables
            .get(entity)
            .cloned()
            .unwrap_or_else(|| entity.to_lowercase())
    }

    /// 查找 `entity.segment` 关系
    pub fn relation(&self, entity: &str, segment: &str) -> Option<&RelationConfig> {
        self.relations.get(&format!("{}.{}", entity, segment))
    }

    pub fn with_table(mut self, entity: impl Into<String>, table: impl Into<String>) -> Self {
        self.tables.insert(entity.into(), table.into());
        self
    }

    pub fn with_relation(
        mut self,
        entity: &str,
        segment: &str,
        relation: RelationConfig,
    ) -> Self {
        self.relations.insert(format!("{}.{}", entity, segment), relation);
        self
    }
}

/// 默认配置（用于测试或fallback）
impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            tables: HashMap::new(),
            relations: HashMap::new(),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}
