//! 配置模块，负责加载实体元数据的JSON配置文件
//!
//! 配置在构造时注入，加载后不可变；没有全局单例。

use crate::metadata::{EdmType, EntityMetadata};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// 元数据配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("配置文件不存在: {}", .0.display())]
    NotFound(PathBuf),

    #[error("无法读取配置文件 {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("无法解析JSON配置文件 {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("未知实体: {0}")]
    UnknownEntity(String),
}

/// 元数据配置结构
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataConfig {
    /// 实体名到实体元数据的映射
    #[serde(flatten)]
    pub entities: BTreeMap<String, EntityMetadata>,
}

impl MetadataConfig {
    /// 从JSON文件加载元数据配置
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();

        if !path_ref.exists() {
            return Err(ConfigError::NotFound(path_ref.to_path_buf()));
        }

        let content = fs::read_to_string(path_ref).map_err(|source| ConfigError::Read {
            path: path_ref.to_path_buf(),
            source,
        })?;

        let config: MetadataConfig = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path_ref.to_path_buf(),
            source,
        })?;

        tracing::debug!(path = %path_ref.display(), entities = config.entities.len(), "metadata config loaded");
        Ok(config)
    }

    /// 获取实体元数据
    pub fn entity(&self, name: &str) -> Result<&EntityMetadata, ConfigError> {
        self.entities
            .get(name)
            .ok_or_else(|| ConfigError::UnknownEntity(name.to_string()))
    }

    /// 获取实体对应的实体集名，如果不存在则返回实体名本身
    pub fn entity_set(&self, name: &str) -> String {
        self.entities
            .get(name)
            .map(|meta| meta.entity_set.clone())
            .unwrap_or_else(|| name.to_string())
    }
}

/// 内置的应用实体（用于测试或fallback）
impl Default for MetadataConfig {
    fn default() -> Self {
        use EdmType::*;

        let mut entities = BTreeMap::new();
        entities.insert(
            "Customers".to_string(),
            EntityMetadata::new("Customers")
                .with_property("ID", Guid)
                .with_property("name", String)
                .with_property("city", String)
                .with_property("country", String)
                .with_property("industry", String)
                .with_property("revenue", Decimal)
                .with_property("active", Boolean)
                .with_property("createdAt", DateTimeOffset)
                .with_search_fields(["name", "city"]),
        );
        entities.insert(
            "Employees".to_string(),
            EntityMetadata::new("Employees")
                .with_property("ID", Guid)
                .with_property("firstName", String)
                .with_property("lastName", String)
                .with_property("email", String)
                .with_property("department", String)
                .with_property("hireDate", Date)
                .with_search_fields(["firstName", "lastName", "email"]),
        );
        entities.insert(
            "Projects".to_string(),
            EntityMetadata::new("Projects")
                .with_property("ID", Guid)
                .with_property("name", String)
                .with_property("status", String)
                .with_property("budget", Decimal)
                .with_property("startDate", Date)
                .with_property("endDate", Date)
                .with_property("customer_ID", Guid),
        );
        entities.insert(
            "Opportunities".to_string(),
            EntityMetadata::new("Opportunities")
                .with_property("ID", Guid)
                .with_property("title", String)
                .with_property("stage", String)
                .with_property("probability", Int32)
                .with_property("amount", Decimal)
                .with_property("closeDate", Date),
        );
        entities.insert(
            "Demands".to_string(),
            EntityMetadata::new("Demands")
                .with_property("ID", Guid)
                .with_property("role", String)
                .with_property("skill", String)
                .with_property("hours", Int32)
                .with_property("project_ID", Guid),
        );
        entities.insert(
            "Allocations".to_string(),
            EntityMetadata::new("Allocations")
                .with_property("ID", Guid)
                .with_property("employee_ID", Guid)
                .with_property("demand_ID", Guid)
                .with_property("percentage", Int32)
                .with_property("validFrom", Date)
                .with_property("validTo", Date),
        );

        Self { entities }
    }
}
