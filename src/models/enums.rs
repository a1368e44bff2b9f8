use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// PLC通信协议类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlcProtocol {
    /// 西门子 S7（ISO-on-TCP, RFC 1006）
    SiemensS7,
    /// Modbus TCP
    ModbusTcp,
    /// 进程内模拟PLC，用于测试和离线调试
    Simulated,
}

impl Default for PlcProtocol {
    fn default() -> Self {
        PlcProtocol::SiemensS7
    }
}

impl Display for PlcProtocol {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PlcProtocol::SiemensS7 => "SiemensS7",
            PlcProtocol::ModbusTcp => "ModbusTcp",
            PlcProtocol::Simulated => "Simulated",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for PlcProtocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "siemenss7" | "s7" | "profinet" => Ok(PlcProtocol::SiemensS7),
            "modbustcp" | "modbus" => Ok(PlcProtocol::ModbusTcp),
            "simulated" | "mock" => Ok(PlcProtocol::Simulated),
            _ => Err(format!("无效的PLC协议: {}", s)),
        }
    }
}

/// 地址语法方案
///
/// S7 协议使用 `DB1.DBX0.0` 一类的区域地址；Modbus 使用 `40001` 一类的寄存器引用。
/// 模拟PLC默认使用 S7 语法，可在端点配置中改为 Modbus 语法。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AddressScheme {
    S7,
    Modbus,
}

impl Display for AddressScheme {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            AddressScheme::S7 => write!(f, "S7"),
            AddressScheme::Modbus => write!(f, "Modbus"),
        }
    }
}

/// 字节序枚举
///
/// 多寄存器数值（32/64位）在 Modbus 设备上的排列方式。
/// 字母表示大端字节序下的字节位置，按16位字分组。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ByteOrder {
    /// 大端序：高字在前，高字节在前 (AB CD)
    ABCD,
    /// 低字在前，高字节在前 (CD AB) - 默认值
    CDAB,
    /// 高字在前，低字节在前 (BA DC)
    BADC,
    /// 小端序：低字在前，低字节在前 (DC BA)
    DCBA,
}

impl Default for ByteOrder {
    fn default() -> Self {
        ByteOrder::CDAB
    }
}

impl Display for ByteOrder {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ByteOrder::ABCD => "ABCD",
            ByteOrder::CDAB => "CDAB",
            ByteOrder::BADC => "BADC",
            ByteOrder::DCBA => "DCBA",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for ByteOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "ABCD" => Ok(ByteOrder::ABCD),
            "CDAB" => Ok(ByteOrder::CDAB),
            "BADC" => Ok(ByteOrder::BADC),
            "DCBA" => Ok(ByteOrder::DCBA),
            _ => Err(format!("无效的字节序: {}，有效值: ABCD, CDAB, BADC, DCBA", s)),
        }
    }
}

impl ByteOrder {
    /// 是否需要交换字的顺序（低字在前）
    pub fn swaps_words(&self) -> bool {
        matches!(self, ByteOrder::CDAB | ByteOrder::DCBA)
    }

    /// 是否需要交换字内的字节
    pub fn swaps_bytes(&self) -> bool {
        matches!(self, ByteOrder::BADC | ByteOrder::DCBA)
    }
}

/// PLC数据类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlcDataType {
    Bool,
    Byte,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Float32,
    Float64,
    String,
}

impl PlcDataType {
    pub const ALL: [PlcDataType; 9] = [
        PlcDataType::Bool,
        PlcDataType::Byte,
        PlcDataType::Int16,
        PlcDataType::UInt16,
        PlcDataType::Int32,
        PlcDataType::UInt32,
        PlcDataType::Float32,
        PlcDataType::Float64,
        PlcDataType::String,
    ];

    /// 标准名称（与枚举变体同名）
    pub fn name(&self) -> &'static str {
        match self {
            PlcDataType::Bool => "Bool",
            PlcDataType::Byte => "Byte",
            PlcDataType::Int16 => "Int16",
            PlcDataType::UInt16 => "UInt16",
            PlcDataType::Int32 => "Int32",
            PlcDataType::UInt32 => "UInt32",
            PlcDataType::Float32 => "Float32",
            PlcDataType::Float64 => "Float64",
            PlcDataType::String => "String",
        }
    }

    /// 数值类型占用的字节数；Bool 按位寻址，String 由容量决定
    pub fn fixed_size(&self) -> Option<usize> {
        match self {
            PlcDataType::Bool | PlcDataType::String => None,
            PlcDataType::Byte => Some(1),
            PlcDataType::Int16 | PlcDataType::UInt16 => Some(2),
            PlcDataType::Int32 | PlcDataType::UInt32 | PlcDataType::Float32 => Some(4),
            PlcDataType::Float64 => Some(8),
        }
    }
}

impl Display for PlcDataType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// 连接句柄的生命周期状态
///
/// `Unopened -> Open -> Closed`，Closed 为终止状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    Unopened,
    Open,
    Closed,
}

impl Display for ConnectionState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnectionState::Unopened => "Unopened",
            ConnectionState::Open => "Open",
            ConnectionState::Closed => "Closed",
        };
        write!(f, "{}", s)
    }
}

/// S7 存储区
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum S7Area {
    /// 过程输入 (I/E)
    Inputs,
    /// 过程输出 (Q/A)
    Outputs,
    /// 位存储区 (M)
    Merkers,
    /// 数据块 (DB)
    DataBlock,
}

impl S7Area {
    /// 报文中的区域标识
    pub fn area_code(&self) -> u8 {
        match self {
            S7Area::Inputs => 0x81,
            S7Area::Outputs => 0x82,
            S7Area::Merkers => 0x83,
            S7Area::DataBlock => 0x84,
        }
    }
}

/// Modbus 寄存器类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModbusRegisterType {
    /// 线圈 (0x)
    Coil,
    /// 离散量输入 (1x)
    DiscreteInput,
    /// 输入寄存器 (3x)
    InputRegister,
    /// 保持寄存器 (4x)
    HoldingRegister,
}

impl ModbusRegisterType {
    /// 位类型（线圈/离散量输入）
    pub fn is_bit(&self) -> bool {
        matches!(self, ModbusRegisterType::Coil | ModbusRegisterType::DiscreteInput)
    }

    /// 是否可写
    pub fn is_writable(&self) -> bool {
        matches!(self, ModbusRegisterType::Coil | ModbusRegisterType::HoldingRegister)
    }
}
