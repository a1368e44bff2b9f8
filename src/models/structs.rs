use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::enums::{AddressScheme, ModbusRegisterType, PlcDataType, PlcProtocol, S7Area};
use crate::utils::error::{AppError, AppResult};

/// 连接句柄
///
/// 标识与一个命名PLC端点之间的逻辑会话。单一所有者，不做引用计数。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionHandle {
    /// 句柄ID（UUID v4）
    pub handle_id: String,
    /// 端点名称
    pub plc: String,
    /// 通信协议
    pub protocol: PlcProtocol,
    /// 创建时间
    pub created_at: DateTime<Utc>,
    /// 最后活动时间
    pub last_activity: DateTime<Utc>,
}

impl ConnectionHandle {
    pub fn new(plc: impl Into<String>, protocol: PlcProtocol) -> Self {
        let now = Utc::now();
        Self {
            handle_id: uuid::Uuid::new_v4().to_string(),
            plc: plc.into(),
            protocol,
            created_at: now,
            last_activity: now,
        }
    }

    /// 刷新最后活动时间
    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }
}

/// 解析后的物理地址
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AddressLocation {
    /// S7 区域地址；`bit` 仅对位访问有意义
    S7 {
        area: S7Area,
        db_number: u16,
        byte_offset: u32,
        bit: u8,
    },
    /// Modbus 协议地址（0基偏移）
    Modbus {
        register_type: ModbusRegisterType,
        offset: u16,
    },
}

impl AddressLocation {
    pub fn scheme(&self) -> AddressScheme {
        match self {
            AddressLocation::S7 { .. } => AddressScheme::S7,
            AddressLocation::Modbus { .. } => AddressScheme::Modbus,
        }
    }

    /// 是否允许写入
    pub fn is_writable(&self) -> bool {
        match self {
            AddressLocation::S7 { .. } => true,
            AddressLocation::Modbus { register_type, .. } => register_type.is_writable(),
        }
    }

    /// 起始位序号（按位寻址时使用）
    pub fn bit_index(&self) -> u32 {
        match self {
            AddressLocation::S7 { byte_offset, bit, .. } => byte_offset * 8 + *bit as u32,
            AddressLocation::Modbus { offset, .. } => *offset as u32,
        }
    }
}

/// 节点地址
///
/// 每次调用解析一次，不做缓存。`length` 只对读取有意义，写入时由值的形状决定。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeAddress {
    /// 端点标识
    pub plc: String,
    /// 原始地址文本
    pub address: String,
    /// 声明的数据类型
    pub data_type: PlcDataType,
    /// 元素个数
    pub length: usize,
    /// 地址中声明的跨度（`[n]` 后缀）
    pub span: Option<usize>,
    /// 解析后的物理位置
    pub location: AddressLocation,
}

/// 单个PLC数值
///
/// 序列化为裸JSON值（bool / number / string）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PlcValue {
    Bool(bool),
    Byte(u8),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Float32(f32),
    Float64(f64),
    String(String),
}

impl PlcValue {
    pub fn data_type(&self) -> PlcDataType {
        match self {
            PlcValue::Bool(_) => PlcDataType::Bool,
            PlcValue::Byte(_) => PlcDataType::Byte,
            PlcValue::Int16(_) => PlcDataType::Int16,
            PlcValue::UInt16(_) => PlcDataType::UInt16,
            PlcValue::Int32(_) => PlcDataType::Int32,
            PlcValue::UInt32(_) => PlcDataType::UInt32,
            PlcValue::Float32(_) => PlcDataType::Float32,
            PlcValue::Float64(_) => PlcDataType::Float64,
            PlcValue::String(_) => PlcDataType::String,
        }
    }

    /// 数值类型转为 f64；Bool 与 String 返回 None
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PlcValue::Byte(v) => Some(*v as f64),
            PlcValue::Int16(v) => Some(*v as f64),
            PlcValue::UInt16(v) => Some(*v as f64),
            PlcValue::Int32(v) => Some(*v as f64),
            PlcValue::UInt32(v) => Some(*v as f64),
            PlcValue::Float32(v) => Some(*v as f64),
            PlcValue::Float64(v) => Some(*v),
            PlcValue::Bool(_) | PlcValue::String(_) => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PlcValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PlcValue::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// 将数值转换为目标数据类型
    ///
    /// 数值类型之间可以互相转换，但必须落在目标类型的取值范围内；
    /// 浮点数转整数时要求没有小数部分。Bool 与 String 只接受同类型的值。
    pub fn coerce(&self, target: PlcDataType) -> AppResult<PlcValue> {
        match (self, target) {
            (PlcValue::Bool(b), PlcDataType::Bool) => Ok(PlcValue::Bool(*b)),
            (PlcValue::String(s), PlcDataType::String) => Ok(PlcValue::String(s.clone())),
            (PlcValue::Bool(_), _)
            | (PlcValue::String(_), _)
            | (_, PlcDataType::Bool)
            | (_, PlcDataType::String) => Err(AppError::invalid_argument_error(format!(
                "值 {:?} 无法转换为 {}",
                self, target
            ))),
            (value, target) => match value.as_f64() {
                Some(n) => Self::from_number(n, target),
                None => Err(AppError::invalid_argument_error(format!(
                    "值 {:?} 不是数值",
                    value
                ))),
            },
        }
    }

    fn from_number(n: f64, target: PlcDataType) -> AppResult<PlcValue> {
        let out_of_range = || {
            AppError::invalid_argument_error(format!("数值 {} 超出 {} 的取值范围", n, target))
        };

        match target {
            PlcDataType::Float64 => Ok(PlcValue::Float64(n)),
            PlcDataType::Float32 => {
                if n.is_finite() && n.abs() > f32::MAX as f64 {
                    return Err(out_of_range());
                }
                Ok(PlcValue::Float32(n as f32))
            }
            _ => {
                if !n.is_finite() || n.fract() != 0.0 {
                    return Err(AppError::invalid_argument_error(format!(
                        "数值 {} 不是整数，无法写入 {}",
                        n, target
                    )));
                }
                let (min, max) = match target {
                    PlcDataType::Byte => (u8::MIN as f64, u8::MAX as f64),
                    PlcDataType::Int16 => (i16::MIN as f64, i16::MAX as f64),
                    PlcDataType::UInt16 => (u16::MIN as f64, u16::MAX as f64),
                    PlcDataType::Int32 => (i32::MIN as f64, i32::MAX as f64),
                    _ => (u32::MIN as f64, u32::MAX as f64),
                };
                if n < min || n > max {
                    return Err(out_of_range());
                }
                Ok(match target {
                    PlcDataType::Byte => PlcValue::Byte(n as u8),
                    PlcDataType::Int16 => PlcValue::Int16(n as i16),
                    PlcDataType::UInt16 => PlcValue::UInt16(n as u16),
                    PlcDataType::Int32 => PlcValue::Int32(n as i32),
                    _ => PlcValue::UInt32(n as u32),
                })
            }
        }
    }

    /// 从JSON值构造目标类型的数值
    pub fn from_json(value: &Value, target: PlcDataType) -> AppResult<PlcValue> {
        let raw = match value {
            Value::Bool(b) => PlcValue::Bool(*b),
            Value::Number(n) => match n.as_f64() {
                Some(f) => PlcValue::Float64(f),
                None => return Err(AppError::invalid_argument_error(format!("无效的数值: {}", n))),
            },
            Value::String(s) => PlcValue::String(s.clone()),
            other => {
                return Err(AppError::invalid_argument_error(format!(
                    "不支持的JSON值: {}",
                    other
                )))
            }
        };
        raw.coerce(target)
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

macro_rules! impl_plc_value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for PlcValue {
                fn from(v: $ty) -> Self {
                    PlcValue::$variant(v)
                }
            }
        )*
    };
}

impl_plc_value_from!(
    bool => Bool,
    u8 => Byte,
    i16 => Int16,
    u16 => UInt16,
    i32 => Int32,
    u32 => UInt32,
    f32 => Float32,
    f64 => Float64,
    String => String,
);

impl From<&str> for PlcValue {
    fn from(v: &str) -> Self {
        PlcValue::String(v.to_string())
    }
}

/// 写入值：标量或序列
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WriteValue {
    Scalar(PlcValue),
    Sequence(Vec<PlcValue>),
}

impl WriteValue {
    /// 元素个数
    pub fn len(&self) -> usize {
        match self {
            WriteValue::Scalar(_) => 1,
            WriteValue::Sequence(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_elements(self) -> Vec<PlcValue> {
        match self {
            WriteValue::Scalar(v) => vec![v],
            WriteValue::Sequence(values) => values,
        }
    }

    /// 从JSON构造写入值，数组视为序列
    pub fn from_json(value: &Value, target: PlcDataType) -> AppResult<WriteValue> {
        match value {
            Value::Array(items) => items
                .iter()
                .map(|item| PlcValue::from_json(item, target))
                .collect::<AppResult<Vec<_>>>()
                .map(WriteValue::Sequence),
            other => PlcValue::from_json(other, target).map(WriteValue::Scalar),
        }
    }
}

impl From<PlcValue> for WriteValue {
    fn from(v: PlcValue) -> Self {
        WriteValue::Scalar(v)
    }
}

impl From<Vec<PlcValue>> for WriteValue {
    fn from(values: Vec<PlcValue>) -> Self {
        WriteValue::Sequence(values)
    }
}

macro_rules! impl_write_value_from {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for WriteValue {
                fn from(v: $ty) -> Self {
                    WriteValue::Scalar(PlcValue::from(v))
                }
            }

            impl From<Vec<$ty>> for WriteValue {
                fn from(values: Vec<$ty>) -> Self {
                    WriteValue::Sequence(values.into_iter().map(PlcValue::from).collect())
                }
            }
        )*
    };
}

impl_write_value_from!(bool, u8, i16, u16, i32, u32, f32, f64, String);

impl From<&str> for WriteValue {
    fn from(v: &str) -> Self {
        WriteValue::Scalar(PlcValue::from(v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_coerce_checks_range() {
        assert_eq!(PlcValue::Int32(100).coerce(PlcDataType::Int16).unwrap(), PlcValue::Int16(100));
        assert!(PlcValue::Int32(70000).coerce(PlcDataType::Int16).is_err());
        assert!(PlcValue::Int32(-1).coerce(PlcDataType::UInt16).is_err());
        assert!(PlcValue::Float64(1.5).coerce(PlcDataType::Int32).is_err());
        assert_eq!(PlcValue::Float64(2.0).coerce(PlcDataType::Byte).unwrap(), PlcValue::Byte(2));
        assert!(PlcValue::Bool(true).coerce(PlcDataType::Int16).is_err());
        assert!(PlcValue::Int16(1).coerce(PlcDataType::Bool).is_err());
    }

    #[test]
    fn test_from_json() {
        assert_eq!(PlcValue::from_json(&json!(true), PlcDataType::Bool).unwrap(), PlcValue::Bool(true));
        assert_eq!(PlcValue::from_json(&json!(12), PlcDataType::Float32).unwrap(), PlcValue::Float32(12.0));
        assert_eq!(PlcValue::from_json(&json!(3.25), PlcDataType::Float64).unwrap(), PlcValue::Float64(3.25));
        assert_eq!(
            PlcValue::from_json(&json!("abc"), PlcDataType::String).unwrap(),
            PlcValue::String("abc".to_string())
        );
        assert!(PlcValue::from_json(&json!(1), PlcDataType::Bool).is_err());
        assert!(PlcValue::from_json(&json!(null), PlcDataType::Int16).is_err());

        let seq = WriteValue::from_json(&json!([1, 2, 3]), PlcDataType::Int16).unwrap();
        assert_eq!(seq.len(), 3);
    }

    #[test]
    fn test_values_serialize_as_bare_json() {
        let values = vec![PlcValue::Bool(true), PlcValue::Int16(-5), PlcValue::String("x".into())];
        assert_eq!(serde_json::to_value(&values).unwrap(), json!([true, -5, "x"]));
    }

    #[test]
    fn test_s7_bit_index() {
        let location = AddressLocation::S7 {
            area: S7Area::DataBlock,
            db_number: 1,
            byte_offset: 45,
            bit: 3,
        };
        assert_eq!(location.bit_index(), 363);
    }
}
