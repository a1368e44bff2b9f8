//! # 数值编解码模块
//!
//! 在 [`PlcValue`] 与设备原始字节之间转换：
//! - 多字节数值以大端为基准，再按端点字节序调整字序/字内字节序
//! - S7 STRING 布局为 `[最大长度, 实际长度, 字符...]`，字符按 Latin-1 编码
//! - 布尔值按位读写，不经过字节转换

use crate::models::{ByteOrder, PlcDataType, PlcValue};
use crate::utils::error::{AppError, AppResult};

/// 数值编解码器
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueCodec {
    byte_order: ByteOrder,
    string_capacity: usize,
}

impl ValueCodec {
    pub fn new(byte_order: ByteOrder, string_capacity: usize) -> Self {
        Self {
            byte_order,
            string_capacity,
        }
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    /// 单个元素占用的字节数；Bool 按位寻址，返回 0
    pub fn element_size(&self, data_type: PlcDataType) -> usize {
        match data_type {
            PlcDataType::Bool => 0,
            PlcDataType::String => self.string_capacity + 2,
            other => other.fixed_size().unwrap_or(0),
        }
    }

    /// `count` 个元素占用的总字节数
    pub fn byte_len(&self, data_type: PlcDataType, count: usize) -> usize {
        self.element_size(data_type) * count
    }

    /// 把设备字节解码为 `count` 个数值
    pub fn decode(&self, data_type: PlcDataType, bytes: &[u8], count: usize) -> AppResult<Vec<PlcValue>> {
        if data_type == PlcDataType::Bool {
            return Err(AppError::invalid_argument_error("布尔值按位读取，不能从字节解码"));
        }

        let size = self.element_size(data_type);
        let expected = size * count;
        if bytes.len() != expected {
            return Err(AppError::plc_communication_error(
                -1,
                format!("设备返回 {} 字节，期望 {} 字节", bytes.len(), expected),
            ));
        }

        bytes
            .chunks_exact(size)
            .map(|chunk| self.decode_element(data_type, chunk))
            .collect()
    }

    /// 把数值编码为设备字节；数值须已转换为目标类型
    pub fn encode(&self, data_type: PlcDataType, values: &[PlcValue]) -> AppResult<Vec<u8>> {
        if data_type == PlcDataType::Bool {
            return Err(AppError::invalid_argument_error("布尔值按位写入，不能编码为字节"));
        }

        let mut bytes = Vec::with_capacity(self.byte_len(data_type, values.len()));
        for value in values {
            self.encode_element(data_type, value, &mut bytes)?;
        }
        Ok(bytes)
    }

    /// 位序列转换为布尔数值
    pub fn decode_bits(bits: &[bool]) -> Vec<PlcValue> {
        bits.iter().map(|b| PlcValue::Bool(*b)).collect()
    }

    /// 布尔数值转换为位序列
    pub fn encode_bits(values: &[PlcValue]) -> AppResult<Vec<bool>> {
        values
            .iter()
            .map(|v| {
                v.as_bool().ok_or_else(|| {
                    AppError::invalid_argument_error(format!("值 {:?} 不是布尔类型", v))
                })
            })
            .collect()
    }

    /// 寄存器数组按大端展开为字节
    pub fn registers_to_bytes(registers: &[u16]) -> Vec<u8> {
        registers.iter().flat_map(|r| r.to_be_bytes()).collect()
    }

    /// 字节按大端合并为寄存器，字节数必须为偶数
    pub fn bytes_to_registers(bytes: &[u8]) -> AppResult<Vec<u16>> {
        if bytes.len() % 2 != 0 {
            return Err(AppError::invalid_argument_error(format!(
                "寄存器数据长度必须为偶数: {}",
                bytes.len()
            )));
        }
        Ok(bytes
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect())
    }

    fn decode_element(&self, data_type: PlcDataType, chunk: &[u8]) -> AppResult<PlcValue> {
        if data_type == PlcDataType::String {
            return Ok(PlcValue::String(self.decode_string(chunk)));
        }

        let mut raw = chunk.to_vec();
        self.reorder(&mut raw);

        let value = match data_type {
            PlcDataType::Byte => PlcValue::Byte(raw[0]),
            PlcDataType::Int16 => PlcValue::Int16(i16::from_be_bytes(fixed(&raw)?)),
            PlcDataType::UInt16 => PlcValue::UInt16(u16::from_be_bytes(fixed(&raw)?)),
            PlcDataType::Int32 => PlcValue::Int32(i32::from_be_bytes(fixed(&raw)?)),
            PlcDataType::UInt32 => PlcValue::UInt32(u32::from_be_bytes(fixed(&raw)?)),
            PlcDataType::Float32 => PlcValue::Float32(f32::from_be_bytes(fixed(&raw)?)),
            PlcDataType::Float64 => PlcValue::Float64(f64::from_be_bytes(fixed(&raw)?)),
            PlcDataType::Bool | PlcDataType::String => {
                return Err(AppError::invalid_argument_error(format!(
                    "数据类型 {} 不能按数值解码",
                    data_type
                )));
            }
        };
        Ok(value)
    }

    fn encode_element(&self, data_type: PlcDataType, value: &PlcValue, out: &mut Vec<u8>) -> AppResult<()> {
        let mut raw = match (data_type, value) {
            (PlcDataType::String, PlcValue::String(s)) => {
                out.extend(self.encode_string(s)?);
                return Ok(());
            }
            (PlcDataType::Byte, PlcValue::Byte(v)) => vec![*v],
            (PlcDataType::Int16, PlcValue::Int16(v)) => v.to_be_bytes().to_vec(),
            (PlcDataType::UInt16, PlcValue::UInt16(v)) => v.to_be_bytes().to_vec(),
            (PlcDataType::Int32, PlcValue::Int32(v)) => v.to_be_bytes().to_vec(),
            (PlcDataType::UInt32, PlcValue::UInt32(v)) => v.to_be_bytes().to_vec(),
            (PlcDataType::Float32, PlcValue::Float32(v)) => v.to_be_bytes().to_vec(),
            (PlcDataType::Float64, PlcValue::Float64(v)) => v.to_be_bytes().to_vec(),
            (target, other) => {
                return Err(AppError::invalid_argument_error(format!(
                    "值 {:?} 与数据类型 {} 不匹配",
                    other, target
                )));
            }
        };
        self.reorder(&mut raw);
        out.extend(raw);
        Ok(())
    }

    /// 在大端与设备字节序之间转换
    ///
    /// 字序反转与字内字节交换都是自反的，编码和解码共用同一变换。
    fn reorder(&self, raw: &mut [u8]) {
        if raw.len() < 2 {
            return;
        }
        if self.byte_order.swaps_words() {
            let words: Vec<[u8; 2]> = raw.chunks_exact(2).rev().map(|w| [w[0], w[1]]).collect();
            for (slot, word) in raw.chunks_exact_mut(2).zip(words) {
                slot.copy_from_slice(&word);
            }
        }
        if self.byte_order.swaps_bytes() {
            for word in raw.chunks_exact_mut(2) {
                word.swap(0, 1);
            }
        }
    }

    fn decode_string(&self, chunk: &[u8]) -> String {
        let actual = (chunk[1] as usize)
            .min(chunk[0] as usize)
            .min(self.string_capacity)
            .min(chunk.len() - 2);
        chunk[2..2 + actual].iter().map(|b| *b as char).collect()
    }

    fn encode_string(&self, text: &str) -> AppResult<Vec<u8>> {
        let mut chars = Vec::with_capacity(text.len());
        for c in text.chars() {
            let code = c as u32;
            if code > 0xFF {
                return Err(AppError::invalid_argument_error(format!(
                    "字符 '{}' 无法按 Latin-1 编码",
                    c
                )));
            }
            chars.push(code as u8);
        }
        if chars.len() > self.string_capacity {
            return Err(AppError::invalid_argument_error(format!(
                "字符串长度 {} 超出容量 {}",
                chars.len(),
                self.string_capacity
            )));
        }

        let mut out = vec![0u8; self.string_capacity + 2];
        out[0] = self.string_capacity as u8;
        out[1] = chars.len() as u8;
        out[2..2 + chars.len()].copy_from_slice(&chars);
        Ok(out)
    }
}

fn fixed<const N: usize>(raw: &[u8]) -> AppResult<[u8; N]> {
    raw.try_into()
        .map_err(|_| AppError::plc_communication_error(-1, format!("数据长度错误: {}", raw.len())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float32_byte_orders() {
        // 1.0f32 = 0x3F800000
        let cases = [
            (ByteOrder::ABCD, [0x3F, 0x80, 0x00, 0x00]),
            (ByteOrder::CDAB, [0x00, 0x00, 0x3F, 0x80]),
            (ByteOrder::BADC, [0x80, 0x3F, 0x00, 0x00]),
            (ByteOrder::DCBA, [0x00, 0x00, 0x80, 0x3F]),
        ];
        for (order, bytes) in cases {
            let codec = ValueCodec::new(order, 254);
            let encoded = codec.encode(PlcDataType::Float32, &[PlcValue::Float32(1.0)]).unwrap();
            assert_eq!(encoded, bytes.to_vec(), "order {}", order);
            let decoded = codec.decode(PlcDataType::Float32, &bytes, 1).unwrap();
            assert_eq!(decoded, vec![PlcValue::Float32(1.0)]);
        }
    }

    #[test]
    fn test_float64_word_swap() {
        let codec = ValueCodec::new(ByteOrder::CDAB, 254);
        let be = 1.5f64.to_be_bytes();
        let encoded = codec.encode(PlcDataType::Float64, &[PlcValue::Float64(1.5)]).unwrap();
        assert_eq!(&encoded[0..2], &be[6..8]);
        assert_eq!(&encoded[6..8], &be[0..2]);
        assert_eq!(
            codec.decode(PlcDataType::Float64, &encoded, 1).unwrap(),
            vec![PlcValue::Float64(1.5)]
        );
    }

    #[test]
    fn test_int16_sequence_big_endian() {
        let codec = ValueCodec::new(ByteOrder::ABCD, 254);
        let values = vec![PlcValue::Int16(-2), PlcValue::Int16(258)];
        let encoded = codec.encode(PlcDataType::Int16, &values).unwrap();
        assert_eq!(encoded, vec![0xFF, 0xFE, 0x01, 0x02]);
        assert_eq!(codec.decode(PlcDataType::Int16, &encoded, 2).unwrap(), values);
    }

    #[test]
    fn test_decode_length_mismatch() {
        let codec = ValueCodec::new(ByteOrder::ABCD, 254);
        assert!(codec.decode(PlcDataType::Int32, &[0, 1, 2], 1).is_err());
    }

    #[test]
    fn test_string_layout() {
        let codec = ValueCodec::new(ByteOrder::ABCD, 8);
        assert_eq!(codec.element_size(PlcDataType::String), 10);

        let encoded = codec
            .encode(PlcDataType::String, &[PlcValue::String("Pümp".into())])
            .unwrap();
        assert_eq!(encoded.len(), 10);
        assert_eq!(encoded[0], 8);
        assert_eq!(encoded[1], 4);
        assert_eq!(encoded[3], 0xFC);

        let decoded = codec.decode(PlcDataType::String, &encoded, 1).unwrap();
        assert_eq!(decoded, vec![PlcValue::String("Pümp".into())]);
    }

    #[test]
    fn test_string_rejections() {
        let codec = ValueCodec::new(ByteOrder::ABCD, 4);
        let too_long = codec.encode(PlcDataType::String, &[PlcValue::String("hello".into())]);
        assert_eq!(too_long.unwrap_err().error_code(), "INVALID_ARGUMENT_ERROR");

        let not_latin1 = codec.encode(PlcDataType::String, &[PlcValue::String("泵".into())]);
        assert_eq!(not_latin1.unwrap_err().error_code(), "INVALID_ARGUMENT_ERROR");
    }

    #[test]
    fn test_mismatched_value_variant() {
        let codec = ValueCodec::new(ByteOrder::ABCD, 254);
        let err = codec.encode(PlcDataType::Int16, &[PlcValue::Float32(1.0)]).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_ARGUMENT_ERROR");
    }

    #[test]
    fn test_bits_and_registers() {
        let bits = ValueCodec::encode_bits(&[PlcValue::Bool(true), PlcValue::Bool(false)]).unwrap();
        assert_eq!(bits, vec![true, false]);
        assert!(ValueCodec::encode_bits(&[PlcValue::Int16(1)]).is_err());
        assert_eq!(ValueCodec::decode_bits(&[true]), vec![PlcValue::Bool(true)]);

        let bytes = ValueCodec::registers_to_bytes(&[0x1234, 0xABCD]);
        assert_eq!(bytes, vec![0x12, 0x34, 0xAB, 0xCD]);
        assert_eq!(ValueCodec::bytes_to_registers(&bytes).unwrap(), vec![0x1234, 0xABCD]);
        assert!(ValueCodec::bytes_to_registers(&[1, 2, 3]).is_err());
    }
}
