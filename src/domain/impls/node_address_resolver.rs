//! # 节点地址解析模块
//!
//! ## 业务作用
//! 把调用方传入的 `(plc, address, data_type, length)` 解析为可直接下发的 [`NodeAddress`]：
//! - 按端点的地址语法（S7 / Modbus）解析地址文本
//! - 校验数据类型与地址宽度是否匹配
//! - 校验 `[n]` 跨度后缀与请求长度是否一致
//!
//! 解析结果不做缓存，每次读写都重新解析。
//!
//! ## 地址语法
//! - S7: `DB<n>.DBX<byte>.<bit>`、`DB<n>.DBB|DBW|DBD|DBL<byte>`、
//!   `M|I|E|Q|A<byte>.<bit>`、`MB|MW|MD|ML<byte>` 等；`L` 为8字节宽度，仅用于 Float64
//! - Modbus: `0xxxx` 线圈、`1xxxx` 离散输入、`3xxxx` 输入寄存器、`4xxxx` 保持寄存器，
//!   不足5位按线圈处理；默认1基，可在端点上配置为0基
//! - 任意地址可带 `[n]` 后缀声明元素个数

use std::collections::HashMap;

use crate::models::{
    AddressLocation, AddressScheme, DataTypeRegistry, ModbusRegisterType, NodeAddress,
    PlcDataType, S7Area, WriteValue,
};
use crate::utils::config::EndpointConfig;
use crate::utils::error::{AppError, AppResult};

/// 单次请求允许的最大元素个数
pub const MAX_ELEMENTS: usize = 65_535;

/// 端点的寻址方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressingProfile {
    pub scheme: AddressScheme,
    pub zero_based: bool,
}

impl Default for AddressingProfile {
    fn default() -> Self {
        Self {
            scheme: AddressScheme::S7,
            zero_based: false,
        }
    }
}

impl From<&EndpointConfig> for AddressingProfile {
    fn from(endpoint: &EndpointConfig) -> Self {
        Self {
            scheme: endpoint.effective_address_scheme(),
            zero_based: endpoint.zero_based_address,
        }
    }
}

/// S7 地址的访问宽度
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum S7Width {
    Bit,
    Byte,
    Word,
    DWord,
    LWord,
}

impl S7Width {
    fn accepts(&self, data_type: PlcDataType) -> bool {
        match self {
            S7Width::Bit => data_type == PlcDataType::Bool,
            S7Width::Byte => matches!(data_type, PlcDataType::Byte | PlcDataType::String),
            S7Width::Word => matches!(data_type, PlcDataType::Int16 | PlcDataType::UInt16),
            S7Width::DWord => matches!(
                data_type,
                PlcDataType::Int32 | PlcDataType::UInt32 | PlcDataType::Float32
            ),
            S7Width::LWord => data_type == PlcDataType::Float64,
        }
    }

    fn from_letter(letter: char) -> Option<Self> {
        match letter {
            'X' => Some(S7Width::Bit),
            'B' => Some(S7Width::Byte),
            'W' => Some(S7Width::Word),
            'D' => Some(S7Width::DWord),
            'L' => Some(S7Width::LWord),
            _ => None,
        }
    }
}

/// 节点地址解析器
#[derive(Debug, Clone)]
pub struct NodeAddressResolver {
    profiles: HashMap<String, AddressingProfile>,
    registry: DataTypeRegistry,
}

impl NodeAddressResolver {
    pub fn new(registry: DataTypeRegistry) -> Self {
        Self {
            profiles: HashMap::new(),
            registry,
        }
    }

    /// 根据端点配置列表创建解析器
    pub fn with_endpoints(registry: DataTypeRegistry, endpoints: &[EndpointConfig]) -> Self {
        let mut resolver = Self::new(registry);
        for endpoint in endpoints {
            resolver.register_endpoint(endpoint);
        }
        resolver
    }

    /// 登记端点的寻址方式，同名端点会被覆盖
    pub fn register_endpoint(&mut self, endpoint: &EndpointConfig) {
        self.profiles
            .insert(endpoint.name.clone(), AddressingProfile::from(endpoint));
    }

    /// 端点的寻址方式；未登记的端点按 S7 语法处理
    pub fn profile(&self, plc: &str) -> AddressingProfile {
        self.profiles.get(plc).copied().unwrap_or_default()
    }

    pub fn registry(&self) -> &DataTypeRegistry {
        &self.registry
    }

    /// 按类型名称解析
    pub fn resolve_named(
        &self,
        plc: &str,
        address: &str,
        type_name: &str,
        length: usize,
    ) -> AppResult<NodeAddress> {
        let data_type = self.registry.parse(type_name)?;
        self.resolve(plc, address, data_type, length)
    }

    /// 解析节点地址
    ///
    /// 校验顺序：数据类型 -> 长度 -> 地址语法 -> 跨度后缀。
    pub fn resolve(
        &self,
        plc: &str,
        address: &str,
        data_type: PlcDataType,
        length: usize,
    ) -> AppResult<NodeAddress> {
        let profile = self.profile(plc);

        if profile.scheme == AddressScheme::Modbus
            && matches!(data_type, PlcDataType::Byte | PlcDataType::String)
        {
            return Err(AppError::unsupported_type_error(
                data_type.name(),
                "Modbus 地址不支持该数据类型",
            ));
        }

        if length == 0 {
            return Err(AppError::invalid_argument_error("读取长度必须大于等于1"));
        }
        if length > MAX_ELEMENTS {
            return Err(AppError::invalid_argument_error(format!(
                "读取长度超出上限 {}: {}",
                MAX_ELEMENTS, length
            )));
        }

        let (body, span) = split_span(address)?;

        let location = match profile.scheme {
            AddressScheme::S7 => parse_s7_location(body, address, data_type)?,
            AddressScheme::Modbus => {
                let location = parse_modbus_location(body, address, profile.zero_based, data_type)?;
                check_modbus_range(&location, data_type, length)?;
                location
            }
        };

        if let Some(span) = span {
            if span != length {
                return Err(AppError::length_mismatch_error(span, length));
            }
        }

        Ok(NodeAddress {
            plc: plc.to_string(),
            address: address.to_string(),
            data_type,
            length,
            span,
            location,
        })
    }

    /// 为写入解析地址，元素个数取自写入值
    ///
    /// 空序列视为长度不匹配。
    pub fn resolve_for_write(
        &self,
        plc: &str,
        address: &str,
        data_type: PlcDataType,
        value: &WriteValue,
    ) -> AppResult<NodeAddress> {
        if value.is_empty() {
            let (_, span) = split_span(address)?;
            return Err(AppError::length_mismatch_error(span.unwrap_or(1), 0));
        }
        self.resolve(plc, address, data_type, value.len())
    }
}

/// 拆分 `[n]` 跨度后缀
fn split_span(address: &str) -> AppResult<(&str, Option<usize>)> {
    let trimmed = address.trim();
    if trimmed.is_empty() {
        return Err(AppError::malformed_address_error(address, "地址不能为空"));
    }

    if !trimmed.ends_with(']') {
        return Ok((trimmed, None));
    }

    let open = trimmed
        .rfind('[')
        .ok_or_else(|| AppError::malformed_address_error(address, "跨度后缀缺少 '['"))?;
    let span_text = &trimmed[open + 1..trimmed.len() - 1];
    let span: usize = parse_digits(span_text, address)?;
    if span == 0 {
        return Err(AppError::malformed_address_error(address, "跨度必须大于等于1"));
    }
    Ok((trimmed[..open].trim_end(), Some(span)))
}

/// 解析纯数字文本
fn parse_digits<T: std::str::FromStr>(text: &str, address: &str) -> AppResult<T> {
    if text.is_empty() || !text.chars().all(|c| c.is_ascii_digit()) {
        return Err(AppError::malformed_address_error(
            address,
            format!("无效的数字: '{}'", text),
        ));
    }
    text.parse::<T>()
        .map_err(|_| AppError::malformed_address_error(address, format!("数值超出范围: {}", text)))
}

/// 解析 `<byte>.<bit>` 形式的位地址
fn parse_bit_offset(text: &str, address: &str) -> AppResult<(u32, u8)> {
    let (byte_text, bit_text) = text
        .split_once('.')
        .ok_or_else(|| AppError::malformed_address_error(address, "位地址缺少位号"))?;
    let byte_offset: u16 = parse_digits(byte_text, address)?;
    let bit: u8 = parse_digits(bit_text, address)?;
    if bit > 7 {
        return Err(AppError::malformed_address_error(
            address,
            format!("位号必须在 0..=7 之间: {}", bit),
        ));
    }
    Ok((byte_offset as u32, bit))
}

fn parse_s7_location(body: &str, address: &str, data_type: PlcDataType) -> AppResult<AddressLocation> {
    let upper = body.to_uppercase();

    let (area, db_number, rest) = if let Some(after_db) = upper.strip_prefix("DB") {
        let (db_text, member) = after_db
            .split_once('.')
            .ok_or_else(|| AppError::malformed_address_error(address, "DB地址缺少成员部分"))?;
        let db_number: u16 = parse_digits(db_text, address)?;
        if db_number == 0 {
            return Err(AppError::malformed_address_error(address, "DB号必须大于0"));
        }
        let member = member
            .strip_prefix("DB")
            .ok_or_else(|| AppError::malformed_address_error(address, "DB成员必须以 DBX/DBB/DBW/DBD/DBL 开头"))?;
        (S7Area::DataBlock, db_number, member.to_string())
    } else {
        let mut chars = upper.chars();
        let area = match chars.next() {
            Some('M') => S7Area::Merkers,
            Some('I') | Some('E') => S7Area::Inputs,
            Some('Q') | Some('A') => S7Area::Outputs,
            _ => {
                return Err(AppError::malformed_address_error(address, "无法识别的S7存储区"));
            }
        };
        (area, 0, chars.as_str().to_string())
    };

    // 区域地址省略宽度字母时按位地址处理，如 M10.1
    let (width, offset_text) = match rest.chars().next() {
        Some(c) if c.is_ascii_digit() && area != S7Area::DataBlock => (S7Width::Bit, rest.as_str()),
        Some(c) => {
            let width = S7Width::from_letter(c).ok_or_else(|| {
                AppError::malformed_address_error(address, format!("无法识别的访问宽度: '{}'", c))
            })?;
            (width, &rest[1..])
        }
        None => return Err(AppError::malformed_address_error(address, "缺少偏移量")),
    };

    if !width.accepts(data_type) {
        return Err(AppError::malformed_address_error(
            address,
            format!("地址宽度与数据类型 {} 不匹配", data_type),
        ));
    }

    let (byte_offset, bit) = if width == S7Width::Bit {
        parse_bit_offset(offset_text, address)?
    } else {
        let byte_offset: u16 = parse_digits(offset_text, address)?;
        (byte_offset as u32, 0)
    };

    Ok(AddressLocation::S7 {
        area,
        db_number,
        byte_offset,
        bit,
    })
}

/// 解析Modbus地址，返回寄存器类型与协议偏移
pub fn parse_modbus_address_ex(address: &str, zero_based: bool) -> AppResult<(ModbusRegisterType, u16)> {
    if address.is_empty() {
        return Err(AppError::malformed_address_error(address, "地址不能为空"));
    }

    // 不足5位，默认认为省略了首位'0'，按线圈(Coils)处理
    let (register_type, offset_text) = if address.len() < 5 {
        (ModbusRegisterType::Coil, address)
    } else {
        let register_type = match address.chars().next() {
            Some('0') => ModbusRegisterType::Coil,
            Some('1') => ModbusRegisterType::DiscreteInput,
            Some('3') => ModbusRegisterType::InputRegister,
            Some('4') => ModbusRegisterType::HoldingRegister,
            Some(other) => {
                return Err(AppError::malformed_address_error(
                    address,
                    format!("不支持的地址类型前缀: '{}'", other),
                ));
            }
            None => return Err(AppError::malformed_address_error(address, "地址不能为空")),
        };
        (register_type, &address[1..])
    };

    let offset: u16 = parse_digits(offset_text, address)?;
    let protocol_offset = if zero_based {
        offset
    } else {
        offset
            .checked_sub(1)
            .ok_or_else(|| AppError::malformed_address_error(address, "1基地址的偏移量不能为0"))?
    };

    Ok((register_type, protocol_offset))
}

fn parse_modbus_location(
    body: &str,
    address: &str,
    zero_based: bool,
    data_type: PlcDataType,
) -> AppResult<AddressLocation> {
    if !body.is_ascii() {
        return Err(AppError::malformed_address_error(address, "Modbus地址只能包含数字"));
    }
    let (register_type, offset) = parse_modbus_address_ex(body, zero_based).map_err(|e| match e {
        AppError::MalformedAddressError { message, .. } => {
            AppError::malformed_address_error(address, message)
        }
        other => other,
    })?;

    let is_bool = data_type == PlcDataType::Bool;
    if is_bool != register_type.is_bit() {
        return Err(AppError::malformed_address_error(
            address,
            format!("寄存器类型 {:?} 不能存放 {} 数据", register_type, data_type),
        ));
    }

    Ok(AddressLocation::Modbus {
        register_type,
        offset,
    })
}

/// 检查读写范围是否越过 65535
fn check_modbus_range(location: &AddressLocation, data_type: PlcDataType, length: usize) -> AppResult<()> {
    let per_element = match data_type.fixed_size() {
        Some(size) => (size / 2).max(1),
        None => 1,
    };
    let end = location.bit_index() as usize + per_element * length;
    if end > u16::MAX as usize + 1 {
        return Err(AppError::invalid_argument_error(format!(
            "访问范围超出Modbus地址空间: 起始 {}, 共 {} 个单元",
            location.bit_index(),
            per_element * length
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PlcValue;

    fn resolver() -> NodeAddressResolver {
        let mut modbus = EndpointConfig::modbus("MB", "127.0.0.1", 0, 1);
        modbus.zero_based_address = false;
        let mut modbus_zero = EndpointConfig::modbus("MB0", "127.0.0.1", 0, 1);
        modbus_zero.zero_based_address = true;
        NodeAddressResolver::with_endpoints(
            DataTypeRegistry::default(),
            &[EndpointConfig::s7("S7", "127.0.0.1", 0, 1), modbus, modbus_zero],
        )
    }

    #[test]
    fn test_s7_bit_address() {
        let node = resolver().resolve("S7", "DB1.DBX0.3", PlcDataType::Bool, 1).unwrap();
        assert_eq!(
            node.location,
            AddressLocation::S7 {
                area: S7Area::DataBlock,
                db_number: 1,
                byte_offset: 0,
                bit: 3
            }
        );
        assert_eq!(node.span, None);
    }

    #[test]
    fn test_s7_word_and_area_addresses() {
        let r = resolver();
        let node = r.resolve("S7", "db10.dbd4", PlcDataType::Float32, 2).unwrap();
        assert_eq!(
            node.location,
            AddressLocation::S7 {
                area: S7Area::DataBlock,
                db_number: 10,
                byte_offset: 4,
                bit: 0
            }
        );

        let node = r.resolve("S7", "MW20", PlcDataType::Int16, 1).unwrap();
        assert!(matches!(
            node.location,
            AddressLocation::S7 { area: S7Area::Merkers, byte_offset: 20, .. }
        ));

        let node = r.resolve("S7", "Q0.1", PlcDataType::Bool, 1).unwrap();
        assert!(matches!(node.location, AddressLocation::S7 { area: S7Area::Outputs, bit: 1, .. }));

        let node = r.resolve("S7", "EB3", PlcDataType::Byte, 1).unwrap();
        assert!(matches!(node.location, AddressLocation::S7 { area: S7Area::Inputs, .. }));
    }

    #[test]
    fn test_unknown_plc_uses_s7_syntax() {
        let node = resolver().resolve("Unknown", "DB2.DBW0", PlcDataType::UInt16, 1).unwrap();
        assert_eq!(node.location.scheme(), AddressScheme::S7);
    }

    #[test]
    fn test_s7_malformed_addresses() {
        let r = resolver();
        for address in ["", "DB1", "DB0.DBX0.0", "DB1.DBX0.8", "DB1.DBQ0", "Z10", "DB1.DBWabc", "M1.2.3"] {
            let err = r.resolve("S7", address, PlcDataType::Bool, 1).unwrap_err();
            assert_eq!(err.error_code(), "MALFORMED_ADDRESS_ERROR", "address {}", address);
        }
    }

    #[test]
    fn test_width_type_mismatch_is_malformed() {
        let r = resolver();
        let err = r.resolve("S7", "DB1.DBW0", PlcDataType::Float32, 1).unwrap_err();
        assert_eq!(err.error_code(), "MALFORMED_ADDRESS_ERROR");

        // DBD 只有4字节，不能承载 Float64
        let err = r.resolve("S7", "DB1.DBD0", PlcDataType::Float64, 1).unwrap_err();
        assert_eq!(err.error_code(), "MALFORMED_ADDRESS_ERROR");
        let err = r.resolve("S7", "DB1.DBL0", PlcDataType::Float32, 1).unwrap_err();
        assert_eq!(err.error_code(), "MALFORMED_ADDRESS_ERROR");
    }

    #[test]
    fn test_s7_lword_address() {
        let r = resolver();
        let node = r.resolve("S7", "DB3.DBL8", PlcDataType::Float64, 1).unwrap();
        assert_eq!(
            node.location,
            AddressLocation::S7 {
                area: S7Area::DataBlock,
                db_number: 3,
                byte_offset: 8,
                bit: 0
            }
        );
        let node = r.resolve_named("S7", "ML16", "lreal", 1).unwrap();
        assert!(matches!(
            node.location,
            AddressLocation::S7 { area: S7Area::Merkers, byte_offset: 16, .. }
        ));
    }

    #[test]
    fn test_span_suffix() {
        let r = resolver();
        let node = r.resolve("S7", "DB1.DBW0[4]", PlcDataType::Int16, 4).unwrap();
        assert_eq!(node.span, Some(4));
        assert_eq!(node.address, "DB1.DBW0[4]");

        let err = r.resolve("S7", "DB1.DBW0[4]", PlcDataType::Int16, 3).unwrap_err();
        assert_eq!(err, AppError::length_mismatch_error(4, 3));

        let err = r.resolve("S7", "DB1.DBW0[0]", PlcDataType::Int16, 1).unwrap_err();
        assert_eq!(err.error_code(), "MALFORMED_ADDRESS_ERROR");
    }

    #[test]
    fn test_zero_length_is_invalid_argument() {
        let err = resolver().resolve("S7", "DB1.DBW0", PlcDataType::Int16, 0).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_ARGUMENT_ERROR");
    }

    #[test]
    fn test_modbus_addresses() {
        let r = resolver();
        let node = r.resolve("MB", "40001", PlcDataType::Float32, 1).unwrap();
        assert_eq!(
            node.location,
            AddressLocation::Modbus {
                register_type: ModbusRegisterType::HoldingRegister,
                offset: 0
            }
        );

        let node = r.resolve("MB0", "40001", PlcDataType::UInt16, 1).unwrap();
        assert!(matches!(node.location, AddressLocation::Modbus { offset: 1, .. }));

        let node = r.resolve("MB", "12", PlcDataType::Bool, 1).unwrap();
        assert_eq!(
            node.location,
            AddressLocation::Modbus {
                register_type: ModbusRegisterType::Coil,
                offset: 11
            }
        );

        let node = r.resolve("MB", "30010", PlcDataType::Int32, 1).unwrap();
        assert!(matches!(
            node.location,
            AddressLocation::Modbus { register_type: ModbusRegisterType::InputRegister, offset: 9 }
        ));
    }

    #[test]
    fn test_modbus_errors() {
        let r = resolver();
        assert_eq!(
            r.resolve("MB", "40001", PlcDataType::String, 1).unwrap_err().error_code(),
            "UNSUPPORTED_TYPE_ERROR"
        );
        assert_eq!(
            r.resolve("MB", "40001", PlcDataType::Bool, 1).unwrap_err().error_code(),
            "MALFORMED_ADDRESS_ERROR"
        );
        assert_eq!(
            r.resolve("MB", "20001", PlcDataType::UInt16, 1).unwrap_err().error_code(),
            "MALFORMED_ADDRESS_ERROR"
        );
        assert_eq!(
            r.resolve("MB", "40000", PlcDataType::UInt16, 1).unwrap_err().error_code(),
            "MALFORMED_ADDRESS_ERROR"
        );
        assert_eq!(
            r.resolve("MB", "465535", PlcDataType::Int32, 2).unwrap_err().error_code(),
            "INVALID_ARGUMENT_ERROR"
        );
    }

    #[test]
    fn test_resolve_named_and_for_write() {
        let r = resolver();
        let node = r.resolve_named("S7", "DB1.DBD0", "real", 1).unwrap();
        assert_eq!(node.data_type, PlcDataType::Float32);

        let value = WriteValue::from(vec![1i16, 2, 3]);
        let node = r.resolve_for_write("S7", "DB1.DBW0", PlcDataType::Int16, &value).unwrap();
        assert_eq!(node.length, 3);

        let err = r
            .resolve_for_write("S7", "DB1.DBW0[2]", PlcDataType::Int16, &value)
            .unwrap_err();
        assert_eq!(err, AppError::length_mismatch_error(2, 3));

        let empty = WriteValue::Sequence(Vec::<PlcValue>::new());
        let err = r
            .resolve_for_write("S7", "DB1.DBW0", PlcDataType::Int16, &empty)
            .unwrap_err();
        assert_eq!(err.error_code(), "LENGTH_MISMATCH_ERROR");
    }
}
