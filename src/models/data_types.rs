use std::collections::HashMap;

use super::enums::PlcDataType;
use crate::utils::config::DataTypeSettings;
use crate::utils::error::{AppError, AppResult};

/// 数据类型注册表
///
/// 把调用方传入的类型名称（大小写不敏感）映射为 [`PlcDataType`]。
/// 默认包含标准名称与常见的 S7 / IEC 名称，可通过配置追加别名。
#[derive(Debug, Clone)]
pub struct DataTypeRegistry {
    names: HashMap<String, PlcDataType>,
    string_capacity: usize,
}

const BUILTIN_ALIASES: [(&str, PlcDataType); 17] = [
    ("bit", PlcDataType::Bool),
    ("boolean", PlcDataType::Bool),
    ("uint8", PlcDataType::Byte),
    ("usint", PlcDataType::Byte),
    ("short", PlcDataType::Int16),
    ("int", PlcDataType::Int16),
    ("ushort", PlcDataType::UInt16),
    ("uint", PlcDataType::UInt16),
    ("word", PlcDataType::UInt16),
    ("dint", PlcDataType::Int32),
    ("udint", PlcDataType::UInt32),
    ("dword", PlcDataType::UInt32),
    ("real", PlcDataType::Float32),
    ("float", PlcDataType::Float32),
    ("lreal", PlcDataType::Float64),
    ("double", PlcDataType::Float64),
    ("str", PlcDataType::String),
];

impl DataTypeRegistry {
    pub fn new(settings: &DataTypeSettings) -> AppResult<Self> {
        let mut registry = Self::builtin(settings.string_capacity);

        for (alias, target) in &settings.aliases {
            let data_type = registry.parse(target)?;
            registry.register_alias(alias, data_type);
        }

        Ok(registry)
    }

    /// 标准名称加内置别名，不含配置别名
    fn builtin(string_capacity: usize) -> Self {
        let mut names = HashMap::new();
        for data_type in PlcDataType::ALL {
            names.insert(data_type.name().to_lowercase(), data_type);
        }
        for (alias, data_type) in BUILTIN_ALIASES {
            names.insert(alias.to_string(), data_type);
        }
        Self {
            names,
            string_capacity,
        }
    }

    /// 注册别名，已存在的同名别名会被覆盖
    pub fn register_alias(&mut self, alias: &str, data_type: PlcDataType) {
        self.names.insert(alias.trim().to_lowercase(), data_type);
    }

    /// 解析类型名称
    pub fn parse(&self, name: &str) -> AppResult<PlcDataType> {
        self.names
            .get(&name.trim().to_lowercase())
            .copied()
            .ok_or_else(|| AppError::unsupported_type_error(name, "未注册的数据类型名称"))
    }

    /// S7 STRING 的最大字符数
    pub fn string_capacity(&self) -> usize {
        self.string_capacity
    }
}

impl Default for DataTypeRegistry {
    fn default() -> Self {
        Self::builtin(DataTypeSettings::default().string_capacity)
    }
}
