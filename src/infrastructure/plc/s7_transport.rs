//! # Siemens S7 传输 (ISO-on-TCP)
//!
//! ## 协议分层
//! - **TPKT** (RFC 1006): 4字节头 `03 00 len_hi len_lo`
//! - **COTP**: 连接阶段使用 CR/CC 报文，数据阶段使用 `02 F0 80` 数据报文头
//! - **S7**: 作业报文头 10 字节，应答报文头 12 字节（含错误类别/错误码）
//!
//! ## 连接流程
//! 1. TCP 连接到 102 端口
//! 2. 发送 COTP 连接请求，远端 TSAP = `(连接类型 << 8) + 机架 * 0x20 + 槽号`
//! 3. 协商 PDU 长度（请求 480 字节），后续读写按协商结果分片
//!
//! 位访问每次请求只读写一个位，字节访问按 PDU 容量分片。
//!
//! 每个作业报文带递增的 PDU 引用号，应答必须回显同一引用号。请求在等待应答期间被取消
//! （例如调用方超时）时，下一次操作前会先重建连接，避免读到上一个请求的迟到应答。

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::domain::services::PlcTransport;
use crate::models::{AddressLocation, PlcProtocol, S7Area};
use crate::utils::config::EndpointConfig;
use crate::utils::error::{AppError, AppResult};

const TPKT_HEADER_LEN: usize = 4;
const COTP_DATA_LEN: usize = 3;
const ISO_CR_LEN: usize = 22;
const PDU_NEGOTIATE_LEN: usize = 25;
const READ_REQUEST_LEN: usize = 31;
const WRITE_HEADER_LEN: usize = 35;

/// 请求的 PDU 长度
const REQUESTED_PDU: u16 = 480;
/// 协商前使用的最小 PDU 长度
const MIN_PDU: u16 = 240;

/// PDU 引用号在请求帧中的偏移（TPKT + COTP + S7 头前4字节）
const REQUEST_REF_OFFSET: usize = TPKT_HEADER_LEN + COTP_DATA_LEN + 4;
/// PDU 引用号在应答 S7 报文中的偏移
const RESPONSE_REF_OFFSET: usize = 4;

/// 读应答中数据项返回码的偏移（相对 S7 报文头）
const RESULT_OFFSET: usize = 14;
/// 读应答中数据的偏移
const READ_DATA_OFFSET: usize = 18;
/// 读/写应答报文在数据之外的开销
const READ_OVERHEAD: usize = 18;
const WRITE_OVERHEAD: usize = 28;

const WORDLEN_BIT: u8 = 0x01;
const WORDLEN_BYTE: u8 = 0x02;
const TRANSPORT_BIT: u8 = 0x03;
const TRANSPORT_BYTE: u8 = 0x04;

const LOCAL_TSAP: u16 = 0x0100;

/// 设备返回码：成功
const RC_SUCCESS: u8 = 0xFF;
/// 设备返回码：地址无效
const RC_INVALID_ADDRESS: u8 = 0x05;
/// 设备返回码：对象不存在
const RC_NOT_FOUND: u8 = 0x0A;

/// S7 传输
pub struct S7TcpTransport {
    endpoint: EndpointConfig,
    stream: Option<TcpStream>,
    pdu_length: u16,
    pdu_ref: u16,
    /// 请求已发出但应答尚未读完
    in_flight: bool,
}

impl S7TcpTransport {
    pub fn new(endpoint: EndpointConfig) -> Self {
        Self {
            endpoint,
            stream: None,
            pdu_length: MIN_PDU,
            pdu_ref: 0,
            in_flight: false,
        }
    }

    /// 协商得到的 PDU 长度
    pub fn pdu_length(&self) -> u16 {
        self.pdu_length
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn remote_tsap(&self) -> u16 {
        (self.endpoint.connection_type << 8) + self.endpoint.rack * 0x20 + self.endpoint.slot
    }

    fn not_connected(&self) -> AppError {
        AppError::connection_error(self.endpoint.name.clone(), "S7连接未建立")
    }

    fn next_pdu_ref(&mut self) -> u16 {
        self.pdu_ref = self.pdu_ref.wrapping_add(1);
        if self.pdu_ref == 0 {
            self.pdu_ref = 1;
        }
        self.pdu_ref
    }

    /// 发送一帧并接收完整应答，返回去掉 TPKT 头后的内容
    ///
    /// 返回前被取消时 `in_flight` 保持为真，流上可能残留迟到的应答。
    async fn exchange_raw(&mut self, request: &[u8]) -> AppResult<Vec<u8>> {
        let result = {
            let stream = match self.stream.as_mut() {
                Some(stream) => stream,
                None => return Err(self.not_connected()),
            };
            self.in_flight = true;
            send_and_receive(stream, request).await
        };
        self.in_flight = false;
        if result.is_err() {
            // 连接状态未知，丢弃流
            self.stream = None;
        }
        result
    }

    /// 发送数据报文，返回 S7 报文部分（去掉 TPKT 与 COTP 头）
    async fn exchange(&mut self, mut request: Vec<u8>) -> AppResult<Vec<u8>> {
        let pdu_ref = self.next_pdu_ref();
        request[REQUEST_REF_OFFSET..REQUEST_REF_OFFSET + 2].copy_from_slice(&pdu_ref.to_be_bytes());

        let response = self.exchange_raw(&request).await?;
        if response.len() < COTP_DATA_LEN
            || response[0] != 0x02
            || response[1] != 0xF0
            || response[2] != 0x80
        {
            self.stream = None;
            return Err(AppError::plc_communication_error(-1, "无效的ISO数据报文头"));
        }
        let frame = response[COTP_DATA_LEN..].to_vec();
        if let Err(e) = check_reference(&frame, pdu_ref) {
            self.stream = None;
            return Err(e);
        }
        Ok(frame)
    }

    /// 建立 TCP 连接并完成 ISO 握手与 PDU 协商
    async fn open_stream(&mut self) -> AppResult<()> {
        self.stream = None;
        self.in_flight = false;
        self.pdu_length = MIN_PDU;

        let address = self.endpoint.socket_address();
        let stream = TcpStream::connect(&address).await.map_err(|e| {
            AppError::connection_error(self.endpoint.name.clone(), format!("TCP连接 {} 失败: {}", address, e))
        })?;
        let _ = stream.set_nodelay(true);
        self.stream = Some(stream);

        if let Err(e) = self.handshake().await {
            self.stream = None;
            return Err(match e {
                AppError::ConnectionError { .. } => e,
                other => AppError::connection_error(self.endpoint.name.clone(), other.to_string()),
            });
        }

        log::debug!("S7连接已建立: {} (TSAP 0x{:04X})", address, self.remote_tsap());
        Ok(())
    }

    /// 上一个请求未收完应答时重建连接
    async fn recover_stream(&mut self) -> AppResult<()> {
        if !self.in_flight || self.stream.is_none() {
            return Ok(());
        }
        log::warn!(
            "S7请求在等待应答时被取消，重建连接: {}",
            self.endpoint.socket_address()
        );
        self.open_stream().await
    }

    async fn iso_connect(&mut self) -> AppResult<()> {
        let local = LOCAL_TSAP.to_be_bytes();
        let remote = self.remote_tsap().to_be_bytes();
        let request: [u8; ISO_CR_LEN] = [
            0x03, 0x00, 0x00, ISO_CR_LEN as u8, // TPKT
            0x11, 0xE0, // COTP 长度, 连接请求
            0x00, 0x00, 0x00, 0x01, 0x00, // 目的引用, 源引用, 类别
            0xC0, 0x01, 0x0A, // TPDU 大小
            0xC1, 0x02, local[0], local[1], // 本地 TSAP
            0xC2, 0x02, remote[0], remote[1], // 远端 TSAP
        ];

        let response = self.exchange_raw(&request).await?;
        if response.len() < 2 || response[1] != 0xD0 {
            return Err(AppError::connection_error(
                self.endpoint.name.clone(),
                "ISO连接被拒绝，请检查机架/槽号",
            ));
        }
        Ok(())
    }

    async fn negotiate_pdu(&mut self) -> AppResult<()> {
        let pdu = REQUESTED_PDU.to_be_bytes();
        let request = vec![
            0x03, 0x00, 0x00, PDU_NEGOTIATE_LEN as u8, // TPKT
            0x02, 0xF0, 0x80, // COTP 数据
            0x32, 0x01, 0x00, 0x00, 0x04, 0x00, 0x00, 0x08, 0x00, 0x00, // S7 作业头
            0xF0, 0x00, 0x00, 0x01, 0x00, 0x01, pdu[0], pdu[1], // 建立通讯
        ];

        let frame = self.exchange(request).await?;
        if frame.len() < 20 || frame[10] != 0 || frame[11] != 0 {
            return Err(AppError::connection_error(
                self.endpoint.name.clone(),
                "S7 PDU协商失败",
            ));
        }
        let negotiated = u16::from_be_bytes([frame[18], frame[19]]);
        if negotiated == 0 {
            return Err(AppError::connection_error(
                self.endpoint.name.clone(),
                "S7 PDU协商失败: 长度为0",
            ));
        }
        self.pdu_length = negotiated;
        log::debug!("S7 PDU长度协商结果: {}", negotiated);
        Ok(())
    }

    async fn handshake(&mut self) -> AppResult<()> {
        self.iso_connect().await?;
        self.negotiate_pdu().await
    }

    async fn read_area(&mut self, item: &S7Item, wordlen: u8, address: u32, count: u16) -> AppResult<Vec<u8>> {
        let request = build_read_request(item, wordlen, address, count);
        let frame = self.exchange(request).await?;
        check_header(&frame)?;
        check_result(&frame, item)?;

        let end = READ_DATA_OFFSET + count as usize;
        if frame.len() < end {
            return Err(AppError::plc_communication_error(
                -1,
                format!("S7读应答长度不足: {} < {}", frame.len(), end),
            ));
        }
        Ok(frame[READ_DATA_OFFSET..end].to_vec())
    }

    async fn write_area(&mut self, item: &S7Item, wordlen: u8, address: u32, data: &[u8]) -> AppResult<()> {
        let request = build_write_request(item, wordlen, address, data);
        let frame = self.exchange(request).await?;
        check_header(&frame)?;
        check_result(&frame, item)
    }

    fn max_read_chunk(&self) -> usize {
        (self.pdu_length as usize).saturating_sub(READ_OVERHEAD).max(1)
    }

    fn max_write_chunk(&self) -> usize {
        (self.pdu_length as usize).saturating_sub(WRITE_OVERHEAD).max(1)
    }
}

/// 请求中的存储区信息
struct S7Item {
    area: S7Area,
    db_number: u16,
    byte_offset: u32,
    bit: u8,
}

impl S7Item {
    fn from_location(location: AddressLocation) -> AppResult<Self> {
        match location {
            AddressLocation::S7 {
                area,
                db_number,
                byte_offset,
                bit,
            } => Ok(Self {
                area,
                db_number,
                byte_offset,
                bit,
            }),
            AddressLocation::Modbus { .. } => Err(AppError::malformed_address_error(
                format!("{:?}", location),
                "S7 传输不能访问 Modbus 地址",
            )),
        }
    }

    fn describe(&self) -> String {
        match self.area {
            S7Area::DataBlock => format!("DB{}.{}", self.db_number, self.byte_offset),
            other => format!("{:?}.{}", other, self.byte_offset),
        }
    }
}

async fn send_and_receive(stream: &mut TcpStream, request: &[u8]) -> AppResult<Vec<u8>> {
    stream.write_all(request).await?;

    let mut header = [0u8; TPKT_HEADER_LEN];
    stream.read_exact(&mut header).await?;
    if header[0] != 0x03 {
        return Err(AppError::plc_communication_error(-1, "无效的TPKT报文头"));
    }
    let total = u16::from_be_bytes([header[2], header[3]]) as usize;
    if total <= TPKT_HEADER_LEN {
        return Err(AppError::plc_communication_error(
            -1,
            format!("无效的TPKT长度: {}", total),
        ));
    }

    let mut body = vec![0u8; total - TPKT_HEADER_LEN];
    stream.read_exact(&mut body).await?;
    Ok(body)
}

fn push_item(request: &mut Vec<u8>, item: &S7Item, wordlen: u8, address: u32, count: u16) {
    request.extend_from_slice(&[0x12, 0x0A, 0x10, wordlen]);
    request.extend_from_slice(&count.to_be_bytes());
    request.extend_from_slice(&item.db_number.to_be_bytes());
    request.push(item.area.area_code());
    request.extend_from_slice(&address.to_be_bytes()[1..]);
}

fn build_read_request(item: &S7Item, wordlen: u8, address: u32, count: u16) -> Vec<u8> {
    let mut request = Vec::with_capacity(READ_REQUEST_LEN);
    request.extend_from_slice(&[0x03, 0x00, 0x00, READ_REQUEST_LEN as u8]);
    request.extend_from_slice(&[0x02, 0xF0, 0x80]);
    request.extend_from_slice(&[0x32, 0x01, 0x00, 0x00, 0x05, 0x00, 0x00, 0x0E, 0x00, 0x00]);
    request.extend_from_slice(&[0x04, 0x01]);
    push_item(&mut request, item, wordlen, address, count);
    request
}

fn build_write_request(item: &S7Item, wordlen: u8, address: u32, data: &[u8]) -> Vec<u8> {
    let total = (WRITE_HEADER_LEN + data.len()) as u16;
    let data_len = (data.len() + 4) as u16;
    let (transport, payload_len) = if wordlen == WORDLEN_BIT {
        (TRANSPORT_BIT, data.len() as u16)
    } else {
        (TRANSPORT_BYTE, (data.len() * 8) as u16)
    };

    let mut request = Vec::with_capacity(total as usize);
    request.extend_from_slice(&[0x03, 0x00]);
    request.extend_from_slice(&total.to_be_bytes());
    request.extend_from_slice(&[0x02, 0xF0, 0x80]);
    request.extend_from_slice(&[0x32, 0x01, 0x00, 0x00, 0x05, 0x00, 0x00, 0x0E]);
    request.extend_from_slice(&data_len.to_be_bytes());
    request.extend_from_slice(&[0x05, 0x01]);
    push_item(&mut request, item, wordlen, address, data.len() as u16);
    request.push(0x00);
    request.push(transport);
    request.extend_from_slice(&payload_len.to_be_bytes());
    request.extend_from_slice(data);
    request
}

/// 检查应答回显的 PDU 引用号
fn check_reference(frame: &[u8], expected: u16) -> AppResult<()> {
    if frame.len() < RESPONSE_REF_OFFSET + 2 {
        return Err(AppError::plc_communication_error(-1, "无效的S7应答报文"));
    }
    let actual = u16::from_be_bytes([frame[RESPONSE_REF_OFFSET], frame[RESPONSE_REF_OFFSET + 1]]);
    if actual != expected {
        return Err(AppError::plc_communication_error(
            -1,
            format!("S7应答引用号不匹配: 期望 {}, 实际 {}", expected, actual),
        ));
    }
    Ok(())
}

/// 检查应答报文头中的错误类别/错误码
fn check_header(frame: &[u8]) -> AppResult<()> {
    if frame.len() <= RESULT_OFFSET || frame[0] != 0x32 {
        return Err(AppError::plc_communication_error(-1, "无效的S7应答报文"));
    }
    let error = u16::from_be_bytes([frame[10], frame[11]]);
    if error != 0 {
        return Err(AppError::plc_communication_error(
            error as i32,
            format!("S7应答错误: 0x{:04X}", error),
        ));
    }
    Ok(())
}

/// 检查数据项返回码
fn check_result(frame: &[u8], item: &S7Item) -> AppResult<()> {
    match frame[RESULT_OFFSET] {
        RC_SUCCESS => Ok(()),
        RC_INVALID_ADDRESS => Err(AppError::plc_communication_error(
            RC_INVALID_ADDRESS as i32,
            format!("S7地址无效: {}", item.describe()),
        )),
        RC_NOT_FOUND => Err(AppError::plc_communication_error(
            RC_NOT_FOUND as i32,
            format!("S7对象不存在: {}", item.describe()),
        )),
        other => Err(AppError::plc_communication_error(
            other as i32,
            format!("S7返回错误码 0x{:02X}: {}", other, item.describe()),
        )),
    }
}

#[async_trait]
impl PlcTransport for S7TcpTransport {
    fn protocol(&self) -> PlcProtocol {
        PlcProtocol::SiemensS7
    }

    async fn connect(&mut self) -> AppResult<()> {
        self.open_stream().await
    }

    async fn probe(&mut self) -> AppResult<bool> {
        if self.stream.is_none() {
            return Ok(false);
        }
        self.recover_stream().await?;
        let item = S7Item {
            area: S7Area::Merkers,
            db_number: 0,
            byte_offset: 0,
            bit: 0,
        };
        self.read_area(&item, WORDLEN_BYTE, 0, 1).await.map(|_| true)
    }

    async fn read_bits(&mut self, location: AddressLocation, count: usize) -> AppResult<Vec<bool>> {
        let item = S7Item::from_location(location)?;
        self.recover_stream().await?;
        let start = item.byte_offset * 8 + item.bit as u32;

        let mut bits = Vec::with_capacity(count);
        for index in 0..count as u32 {
            let data = self.read_area(&item, WORDLEN_BIT, start + index, 1).await?;
            bits.push(data[0] & 0x01 != 0);
        }
        Ok(bits)
    }

    async fn read_bytes(&mut self, location: AddressLocation, count: usize) -> AppResult<Vec<u8>> {
        let item = S7Item::from_location(location)?;
        self.recover_stream().await?;
        let chunk_size = self.max_read_chunk();

        let mut bytes = Vec::with_capacity(count);
        let mut offset = 0usize;
        while offset < count {
            let size = (count - offset).min(chunk_size);
            let address = (item.byte_offset + offset as u32) << 3;
            let chunk = self.read_area(&item, WORDLEN_BYTE, address, size as u16).await?;
            bytes.extend(chunk);
            offset += size;
        }
        Ok(bytes)
    }

    async fn write_bits(&mut self, location: AddressLocation, values: Vec<bool>) -> AppResult<()> {
        let item = S7Item::from_location(location)?;
        self.recover_stream().await?;
        let start = item.byte_offset * 8 + item.bit as u32;

        for (index, value) in values.iter().enumerate() {
            self.write_area(&item, WORDLEN_BIT, start + index as u32, &[*value as u8])
                .await?;
        }
        Ok(())
    }

    async fn write_bytes(&mut self, location: AddressLocation, data: Vec<u8>) -> AppResult<()> {
        let item = S7Item::from_location(location)?;
        self.recover_stream().await?;
        let chunk_size = self.max_write_chunk();

        for (index, chunk) in data.chunks(chunk_size).enumerate() {
            let address = (item.byte_offset + (index * chunk_size) as u32) << 3;
            self.write_area(&item, WORDLEN_BYTE, address, chunk).await?;
        }
        Ok(())
    }

    async fn close(&mut self) -> AppResult<()> {
        self.in_flight = false;
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
            log::debug!("S7连接已关闭: {}", self.endpoint.socket_address());
        }
        Ok(())
    }
}
