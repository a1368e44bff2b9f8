use std::collections::HashMap;
use std::future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_modbus::prelude::{ExceptionCode, Request, Response};
use tokio_modbus::server::tcp::{accept_tcp_connection, Server};
use tokio_modbus::server::Service;

use super::*;
use crate::domain::services::{PlcTransport, TransportFactory};
use crate::models::{
    AddressLocation, ErrorCode, ModbusRegisterType, PlcDataType, PlcProtocol, PlcValue, S7Area,
};
use crate::services::PlcClient;
use crate::utils::config::{AppConfig, EndpointConfig};
use crate::utils::error::AppError;

type FakeMemory = Arc<Mutex<HashMap<(u8, u16), Vec<u8>>>>;

/// 返回“对象不存在”的DB号
const MISSING_DB: u16 = 99;

/// 延迟应答的等待时间
const LATE_REPLY: Duration = Duration::from_millis(300);

/// 启动一个本地回环的最小S7服务端
async fn spawn_fake_s7(pdu: u16) -> (SocketAddr, FakeMemory) {
    spawn_fake_s7_with_delay(pdu, Arc::new(AtomicBool::new(false))).await
}

/// `delay` 置位时，下一个读请求的应答按请求时刻的数据生成，但延迟 [`LATE_REPLY`] 才发出
async fn spawn_fake_s7_with_delay(pdu: u16, delay: Arc<AtomicBool>) -> (SocketAddr, FakeMemory) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let memory: FakeMemory = Arc::new(Mutex::new(HashMap::new()));
    let shared = memory.clone();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(serve_fake_s7(stream, shared.clone(), pdu, delay.clone()));
        }
    });
    (addr, memory)
}

async fn read_frame(stream: &mut TcpStream) -> Option<Vec<u8>> {
    let mut header = [0u8; 4];
    stream.read_exact(&mut header).await.ok()?;
    let total = u16::from_be_bytes([header[2], header[3]]) as usize;
    let mut body = vec![0u8; total - 4];
    stream.read_exact(&mut body).await.ok()?;
    Some(body)
}

fn tpkt(payload: &[u8]) -> Vec<u8> {
    let mut frame = vec![0x03, 0x00];
    frame.extend_from_slice(&((payload.len() + 4) as u16).to_be_bytes());
    frame.extend_from_slice(payload);
    frame
}

fn ack(job: &[u8], params: &[u8], data: &[u8]) -> Vec<u8> {
    let mut payload = vec![0x02, 0xF0, 0x80, 0x32, 0x03, 0x00, 0x00, job[4], job[5]];
    payload.extend_from_slice(&(params.len() as u16).to_be_bytes());
    payload.extend_from_slice(&(data.len() as u16).to_be_bytes());
    payload.extend_from_slice(&[0x00, 0x00]);
    payload.extend_from_slice(params);
    payload.extend_from_slice(data);
    tpkt(&payload)
}

async fn serve_fake_s7(mut stream: TcpStream, memory: FakeMemory, pdu: u16, delay: Arc<AtomicBool>) {
    while let Some(body) = read_frame(&mut stream).await {
        let response = if body[1] == 0xE0 {
            tpkt(&[
                0x11, 0xD0, 0x00, 0x01, 0x00, 0x01, 0x00, 0xC0, 0x01, 0x0A, 0xC1, 0x02, 0x01, 0x00,
                0xC2, 0x02, 0x01, 0x01,
            ])
        } else {
            let job = &body[3..];
            match job[10] {
                0xF0 => {
                    let p = pdu.to_be_bytes();
                    ack(job, &[0xF0, 0x00, 0x00, 0x01, 0x00, 0x01, p[0], p[1]], &[])
                }
                0x04 => {
                    let response = handle_read(job, &memory);
                    if delay.swap(false, Ordering::SeqCst) {
                        tokio::time::sleep(LATE_REPLY).await;
                    }
                    response
                }
                0x05 => handle_write(job, &memory),
                _ => return,
            }
        };
        if stream.write_all(&response).await.is_err() {
            return;
        }
    }
}

fn item_fields(job: &[u8]) -> (u8, usize, u16, u8, usize) {
    let wordlen = job[15];
    let count = u16::from_be_bytes([job[16], job[17]]) as usize;
    let db = u16::from_be_bytes([job[18], job[19]]);
    let area = job[20];
    let address = u32::from_be_bytes([0, job[21], job[22], job[23]]) as usize;
    (wordlen, count, db, area, address)
}

fn handle_read(job: &[u8], memory: &FakeMemory) -> Vec<u8> {
    let (wordlen, count, db, area, address) = item_fields(job);
    if db == MISSING_DB {
        return ack(job, &[0x04, 0x01], &[0x0A, 0x00, 0x00, 0x00]);
    }

    let memory = memory.lock().unwrap();
    let region = memory.get(&(area, db)).cloned().unwrap_or_default();
    let byte_at = |i: usize| region.get(i).copied().unwrap_or(0);

    let (transport, bit_len, data) = if wordlen == 0x01 {
        let bit = byte_at(address / 8) >> (address % 8) & 0x01;
        (0x03u8, 1u16, vec![bit])
    } else {
        let start = address >> 3;
        let data: Vec<u8> = (start..start + count).map(byte_at).collect();
        (0x04u8, (count * 8) as u16, data)
    };

    let mut item = vec![0xFF, transport];
    item.extend_from_slice(&bit_len.to_be_bytes());
    item.extend_from_slice(&data);
    ack(job, &[0x04, 0x01], &item)
}

fn handle_write(job: &[u8], memory: &FakeMemory) -> Vec<u8> {
    let (wordlen, count, db, area, address) = item_fields(job);
    if db == MISSING_DB {
        return ack(job, &[0x05, 0x01], &[0x0A]);
    }

    let data = &job[28..28 + count];
    let mut memory = memory.lock().unwrap();
    let region = memory.entry((area, db)).or_default();
    if wordlen == 0x01 {
        let (byte, bit) = (address / 8, address % 8);
        if region.len() <= byte {
            region.resize(byte + 1, 0);
        }
        if data[0] != 0 {
            region[byte] |= 1 << bit;
        } else {
            region[byte] &= !(1 << bit);
        }
    } else {
        let start = address >> 3;
        if region.len() < start + count {
            region.resize(start + count, 0);
        }
        region[start..start + count].copy_from_slice(data);
    }
    ack(job, &[0x05, 0x01], &[0xFF])
}

fn s7_endpoint(addr: SocketAddr) -> EndpointConfig {
    let mut endpoint = EndpointConfig::s7("FakeS7", "127.0.0.1", 0, 1);
    endpoint.port = addr.port();
    endpoint
}

fn db(db_number: u16, byte_offset: u32, bit: u8) -> AddressLocation {
    AddressLocation::S7 {
        area: S7Area::DataBlock,
        db_number,
        byte_offset,
        bit,
    }
}

#[tokio::test]
async fn test_s7_connect_negotiates_pdu() {
    let (addr, _) = spawn_fake_s7(240).await;
    let mut transport = S7TcpTransport::new(s7_endpoint(addr));
    transport.connect().await.unwrap();
    assert!(transport.is_connected());
    assert_eq!(transport.pdu_length(), 240);
    assert!(transport.probe().await.unwrap());

    transport.close().await.unwrap();
    assert!(!transport.probe().await.unwrap());
}

#[tokio::test]
async fn test_s7_byte_round_trip() {
    let (addr, memory) = spawn_fake_s7(240).await;
    let mut transport = S7TcpTransport::new(s7_endpoint(addr));
    transport.connect().await.unwrap();

    transport.write_bytes(db(1, 4, 0), vec![1, 2, 3, 4]).await.unwrap();
    assert_eq!(
        memory.lock().unwrap().get(&(0x84, 1)).unwrap()[4..8],
        [1, 2, 3, 4]
    );
    assert_eq!(transport.read_bytes(db(1, 4, 0), 4).await.unwrap(), vec![1, 2, 3, 4]);
}

#[tokio::test]
async fn test_s7_large_transfer_is_chunked() {
    let (addr, _) = spawn_fake_s7(240).await;
    let mut transport = S7TcpTransport::new(s7_endpoint(addr));
    transport.connect().await.unwrap();

    let data: Vec<u8> = (0..600).map(|i| (i % 251) as u8).collect();
    transport.write_bytes(db(2, 0, 0), data.clone()).await.unwrap();
    assert_eq!(transport.read_bytes(db(2, 0, 0), 600).await.unwrap(), data);
}

#[tokio::test]
async fn test_s7_bits() {
    let (addr, memory) = spawn_fake_s7(240).await;
    let mut transport = S7TcpTransport::new(s7_endpoint(addr));
    transport.connect().await.unwrap();

    transport
        .write_bits(db(1, 0, 6), vec![true, false, true])
        .await
        .unwrap();
    // 位 6、7 在字节0，位 8 跨入字节1
    assert_eq!(memory.lock().unwrap().get(&(0x84, 1)).unwrap()[..2], [0x40, 0x01]);
    assert_eq!(
        transport.read_bits(db(1, 0, 6), 3).await.unwrap(),
        vec![true, false, true]
    );
}

#[tokio::test]
async fn test_s7_missing_object() {
    let (addr, _) = spawn_fake_s7(240).await;
    let mut transport = S7TcpTransport::new(s7_endpoint(addr));
    transport.connect().await.unwrap();

    let err = transport.read_bytes(db(MISSING_DB, 0, 0), 2).await.unwrap_err();
    assert!(matches!(err, crate::utils::error::AppError::PlcCommunicationError { code: 10, .. }));
    assert!(transport.is_connected());
}

#[tokio::test]
async fn test_s7_connection_refused() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let mut transport = S7TcpTransport::new(s7_endpoint(addr));
    let err = transport.connect().await.unwrap_err();
    assert_eq!(err.error_code(), "CONNECTION_ERROR");
    assert!(!transport.is_connected());
}

#[tokio::test]
async fn test_s7_late_reply_after_timeout_is_not_consumed() {
    let delay = Arc::new(AtomicBool::new(false));
    let (addr, memory) = spawn_fake_s7_with_delay(240, delay.clone()).await;
    memory.lock().unwrap().insert((0x84, 1), vec![1, 2]);

    let mut transport = S7TcpTransport::new(s7_endpoint(addr));
    transport.connect().await.unwrap();

    delay.store(true, Ordering::SeqCst);
    let timed_out = tokio::time::timeout(
        Duration::from_millis(100),
        transport.read_bytes(db(1, 0, 0), 2),
    )
    .await;
    assert!(timed_out.is_err());

    memory.lock().unwrap().insert((0x84, 1), vec![3, 4]);
    // 等旧请求的应答 [1, 2] 到达
    tokio::time::sleep(LATE_REPLY + Duration::from_millis(100)).await;

    assert_eq!(transport.read_bytes(db(1, 0, 0), 2).await.unwrap(), vec![3, 4]);
    assert_eq!(transport.read_bytes(db(1, 0, 0), 2).await.unwrap(), vec![3, 4]);
    assert!(transport.is_connected());
}

#[tokio::test]
async fn test_client_read_after_timeout_returns_current_value() {
    let delay = Arc::new(AtomicBool::new(false));
    let (addr, memory) = spawn_fake_s7_with_delay(240, delay.clone()).await;
    memory.lock().unwrap().insert((0x84, 1), vec![0x00, 0x07]);

    let mut endpoint = s7_endpoint(addr);
    endpoint.timeout_ms = Some(100);
    let client = PlcClient::new(AppConfig {
        endpoints: vec![endpoint],
        ..Default::default()
    })
    .unwrap();
    client.open_endpoint("FakeS7").await.unwrap();

    delay.store(true, Ordering::SeqCst);
    let envelope = client.read_node_values("FakeS7", "DB1.DBW0", PlcDataType::Int16, 1).await;
    assert!(!envelope.is_success);
    assert_eq!(envelope.error_code, ErrorCode::TIMEOUT);

    memory.lock().unwrap().insert((0x84, 1), vec![0x00, 0x2A]);
    tokio::time::sleep(LATE_REPLY + Duration::from_millis(100)).await;

    for _ in 0..2 {
        let envelope = client.read_node_values("FakeS7", "DB1.DBW0", PlcDataType::Int16, 1).await;
        assert!(envelope.is_success, "{}", envelope.message);
        assert_eq!(envelope.content, Some(vec![PlcValue::Int16(42)]));
    }
    client.dispose().await.unwrap();
}

/// 起始地址不低于该值的访问返回“非法数据地址”异常
const MODBUS_EXCEPTION_START: u16 = 5000;

/// 最小 Modbus TCP 从站，记录收到的每个请求
#[derive(Clone, Default)]
struct FakeModbus {
    holding: Arc<Mutex<HashMap<u16, u16>>>,
    coils: Arc<Mutex<HashMap<u16, bool>>>,
    requests: Arc<Mutex<Vec<(&'static str, u16, usize)>>>,
}

impl FakeModbus {
    fn holding_register(&self, address: u16) -> u16 {
        self.holding.lock().unwrap().get(&address).copied().unwrap_or(0)
    }

    fn coil(&self, address: u16) -> bool {
        self.coils.lock().unwrap().get(&address).copied().unwrap_or(false)
    }

    fn requests(&self, function: &str) -> Vec<(u16, usize)> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, _, _)| *name == function)
            .map(|(_, address, quantity)| (*address, *quantity))
            .collect()
    }

    fn handle(&self, request: Request<'static>) -> Result<Response, ExceptionCode> {
        let (function, address, quantity) = match &request {
            Request::ReadCoils(address, quantity) => ("ReadCoils", *address, *quantity as usize),
            Request::WriteSingleCoil(address, _) => ("WriteSingleCoil", *address, 1),
            Request::WriteMultipleCoils(address, coils) => ("WriteMultipleCoils", *address, coils.len()),
            Request::ReadHoldingRegisters(address, quantity) => {
                ("ReadHoldingRegisters", *address, *quantity as usize)
            }
            Request::WriteSingleRegister(address, _) => ("WriteSingleRegister", *address, 1),
            Request::WriteMultipleRegisters(address, words) => {
                ("WriteMultipleRegisters", *address, words.len())
            }
            _ => return Err(ExceptionCode::IllegalFunction),
        };
        self.requests.lock().unwrap().push((function, address, quantity));
        if address >= MODBUS_EXCEPTION_START {
            return Err(ExceptionCode::IllegalDataAddress);
        }

        let span = (0..quantity as u16).map(|i| address + i);
        let response = match request {
            Request::ReadCoils(_, _) => {
                let coils = self.coils.lock().unwrap();
                Response::ReadCoils(span.map(|a| coils.get(&a).copied().unwrap_or(false)).collect())
            }
            Request::WriteSingleCoil(address, value) => {
                self.coils.lock().unwrap().insert(address, value);
                Response::WriteSingleCoil(address, value)
            }
            Request::WriteMultipleCoils(address, values) => {
                let mut coils = self.coils.lock().unwrap();
                for (a, value) in span.zip(values.iter()) {
                    coils.insert(a, *value);
                }
                Response::WriteMultipleCoils(address, quantity as u16)
            }
            Request::ReadHoldingRegisters(_, _) => {
                let holding = self.holding.lock().unwrap();
                Response::ReadHoldingRegisters(span.map(|a| holding.get(&a).copied().unwrap_or(0)).collect())
            }
            Request::WriteSingleRegister(address, value) => {
                self.holding.lock().unwrap().insert(address, value);
                Response::WriteSingleRegister(address, value)
            }
            Request::WriteMultipleRegisters(address, words) => {
                let mut holding = self.holding.lock().unwrap();
                for (a, word) in span.zip(words.iter()) {
                    holding.insert(a, *word);
                }
                Response::WriteMultipleRegisters(address, quantity as u16)
            }
            _ => return Err(ExceptionCode::IllegalFunction),
        };
        Ok(response)
    }
}

impl Service for FakeModbus {
    type Request = Request<'static>;
    type Response = Response;
    type Exception = ExceptionCode;
    type Future = future::Ready<Result<Response, ExceptionCode>>;

    fn call(&self, request: Self::Request) -> Self::Future {
        future::ready(self.handle(request))
    }
}

/// 启动一个本地回环的 Modbus TCP 从站
async fn spawn_fake_modbus() -> (SocketAddr, FakeModbus) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let device = FakeModbus::default();
    let shared = device.clone();
    tokio::spawn(async move {
        let server = Server::new(listener);
        let new_service = move |_peer: SocketAddr| Ok::<_, std::io::Error>(Some(shared.clone()));
        let on_connected = |stream: TcpStream, peer: SocketAddr| {
            let new_service = new_service.clone();
            async move { accept_tcp_connection(stream, peer, new_service) }
        };
        let on_process_error = |err: std::io::Error| log::debug!("Modbus测试从站连接结束: {}", err);
        let _ = server.serve(&on_connected, on_process_error).await;
    });
    (addr, device)
}

fn modbus_endpoint(addr: SocketAddr) -> EndpointConfig {
    EndpointConfig::modbus("FakeMB", "127.0.0.1", addr.port(), 1)
}

fn coil(offset: u16) -> AddressLocation {
    AddressLocation::Modbus {
        register_type: ModbusRegisterType::Coil,
        offset,
    }
}

#[tokio::test]
async fn test_modbus_register_access_is_chunked() {
    let (addr, device) = spawn_fake_modbus().await;
    {
        let mut holding = device.holding.lock().unwrap();
        for address in 0..260u16 {
            holding.insert(address, address * 3);
        }
    }

    let mut transport = ModbusTcpTransport::new(modbus_endpoint(addr));
    transport.connect().await.unwrap();
    assert!(transport.probe().await.unwrap());

    let bytes = transport.read_bytes(holding(0), 520).await.unwrap();
    let registers: Vec<u16> = bytes.chunks(2).map(|b| u16::from_be_bytes([b[0], b[1]])).collect();
    assert_eq!(registers, (0..260u16).map(|a| a * 3).collect::<Vec<_>>());
    // 第一项来自 probe
    assert_eq!(
        device.requests("ReadHoldingRegisters"),
        vec![(0, 1), (0, 125), (125, 125), (250, 10)]
    );

    transport.write_bytes(holding(5), vec![0x12, 0x34]).await.unwrap();
    assert_eq!(device.requests("WriteSingleRegister"), vec![(5, 1)]);
    assert_eq!(device.holding_register(5), 0x1234);

    let data: Vec<u8> = (0..250u16).flat_map(|v| (v + 1000).to_be_bytes()).collect();
    transport.write_bytes(holding(1000), data).await.unwrap();
    assert_eq!(
        device.requests("WriteMultipleRegisters"),
        vec![(1000, 123), (1123, 123), (1246, 4)]
    );
    assert_eq!(device.holding_register(1249), 1249);
    transport.close().await.unwrap();
}

#[tokio::test]
async fn test_modbus_coil_access() {
    let (addr, device) = spawn_fake_modbus().await;
    let mut transport = ModbusTcpTransport::new(modbus_endpoint(addr));
    transport.connect().await.unwrap();

    transport.write_bits(coil(3), vec![true]).await.unwrap();
    assert_eq!(device.requests("WriteSingleCoil"), vec![(3, 1)]);
    assert!(device.coil(3));

    let values: Vec<bool> = (0..2000).map(|i| i % 3 == 0).collect();
    transport.write_bits(coil(10), values.clone()).await.unwrap();
    assert_eq!(device.requests("WriteMultipleCoils"), vec![(10, 1968), (1978, 32)]);

    assert_eq!(transport.read_bits(coil(10), 2000).await.unwrap(), values);
    let tail = transport.read_bits(coil(2000), 100).await.unwrap();
    assert_eq!(tail.len(), 100);
    assert_eq!(device.requests("ReadCoils"), vec![(10, 2000), (2000, 100)]);
}

#[tokio::test]
async fn test_modbus_exception_keeps_code() {
    let (addr, _) = spawn_fake_modbus().await;
    let mut transport = ModbusTcpTransport::new(modbus_endpoint(addr));
    transport.connect().await.unwrap();

    let err = transport.read_bytes(holding(MODBUS_EXCEPTION_START), 2).await.unwrap_err();
    assert!(matches!(err, AppError::PlcCommunicationError { code: 2, .. }));
    // 异常响应不影响连接
    assert!(transport.is_connected());
    assert!(transport.probe().await.unwrap());
}

#[tokio::test]
async fn test_client_modbus_float_and_exception() {
    let (addr, device) = spawn_fake_modbus().await;
    let client = PlcClient::new(AppConfig {
        endpoints: vec![modbus_endpoint(addr)],
        ..Default::default()
    })
    .unwrap();
    client.open_endpoint("FakeMB").await.unwrap();

    let flag = client
        .write_node_values("FakeMB", "40011", PlcDataType::Float32, 1234.5f32)
        .await;
    assert!(flag.is_success);
    // 默认 CDAB：低字在前
    let bits = 1234.5f32.to_bits();
    assert_eq!(device.holding_register(10), (bits & 0xFFFF) as u16);
    assert_eq!(device.holding_register(11), (bits >> 16) as u16);

    let envelope = client.read_node_values("FakeMB", "40011", PlcDataType::Float32, 1).await;
    assert!(envelope.is_success, "{}", envelope.message);
    assert_eq!(envelope.content, Some(vec![PlcValue::Float32(1234.5)]));

    let envelope = client.read_node_values("FakeMB", "45001", PlcDataType::UInt16, 1).await;
    assert!(!envelope.is_success);
    assert_eq!(envelope.error_code, ErrorCode(2));
    assert_eq!(envelope.content, Some(vec![]));

    let before = device.requests("WriteMultipleRegisters").len();
    let err = client
        .try_write_node_values("FakeMB", "30001", PlcDataType::UInt16, 1u16)
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "INVALID_ARGUMENT_ERROR");
    assert_eq!(device.requests("WriteMultipleRegisters").len(), before);
    assert!(device.requests("WriteSingleRegister").is_empty());
    client.dispose().await.unwrap();
}

fn holding(offset: u16) -> AddressLocation {
    AddressLocation::Modbus {
        register_type: ModbusRegisterType::HoldingRegister,
        offset,
    }
}

#[tokio::test]
async fn test_simulated_read_write() {
    let device = SimulatedDevice::new();
    device.preset_bytes(holding(10), &[0x12, 0x34]);

    let mut transport = SimulatedTransport::new("Sim", device.clone());
    transport.connect().await.unwrap();
    assert_eq!(transport.read_bytes(holding(10), 4).await.unwrap(), vec![0x12, 0x34, 0, 0]);

    transport.write_bytes(holding(11), vec![0xAB, 0xCD]).await.unwrap();
    assert_eq!(device.peek_bytes(holding(10), 4), vec![0x12, 0x34, 0xAB, 0xCD]);
    assert_eq!(device.write_count(), 1);
    assert_eq!(device.write_log()[0].location, holding(11));
}

#[tokio::test]
async fn test_simulated_bits_cross_bytes() {
    let device = SimulatedDevice::new();
    let mut transport = SimulatedTransport::new("Sim", device.clone());
    transport.connect().await.unwrap();

    let start = db(5, 0, 7);
    transport.write_bits(start, vec![true, true, false, true]).await.unwrap();
    assert_eq!(transport.read_bits(start, 4).await.unwrap(), vec![true, true, false, true]);
    assert_eq!(device.peek_bytes(db(5, 0, 0), 2), vec![0x80, 0x05]);
}

#[tokio::test]
async fn test_simulated_offline_and_errors() {
    let device = SimulatedDevice::new();
    device.set_offline(true);
    let mut transport = SimulatedTransport::new("Sim", device.clone());
    assert_eq!(transport.connect().await.unwrap_err().error_code(), "CONNECTION_ERROR");

    device.set_offline(false);
    transport.connect().await.unwrap();
    assert!(transport.probe().await.unwrap());
    device.set_offline(true);
    assert!(!transport.probe().await.unwrap());

    device.set_offline(false);
    device.set_error_simulation(true, 1.0);
    let err = transport.read_bytes(holding(0), 2).await.unwrap_err();
    assert_eq!(err.error_code(), "PLC_COMMUNICATION_ERROR");

    device.set_error_simulation(false, 0.0);
    transport.close().await.unwrap();
    assert_eq!(
        transport.read_bytes(holding(0), 2).await.unwrap_err().error_code(),
        "CONNECTION_ERROR"
    );
}

#[test]
fn test_factory_shares_simulated_device() {
    let factory = DefaultTransportFactory::new();
    let endpoint = EndpointConfig::simulated("Shared");

    let mut first = factory.create(&endpoint).unwrap();
    let mut second = factory.create(&endpoint).unwrap();
    assert_eq!(first.protocol(), PlcProtocol::Simulated);

    tokio_test::block_on(async {
        first.connect().await.unwrap();
        second.connect().await.unwrap();
        first.write_bytes(db(1, 0, 0), vec![7]).await.unwrap();
        assert_eq!(second.read_bytes(db(1, 0, 0), 1).await.unwrap(), vec![7]);
    });

    let device = factory.simulated_device("Shared").unwrap();
    assert_eq!(device.write_count(), 1);

    let s7 = factory.create(&EndpointConfig::s7("S7", "10.0.0.1", 0, 1)).unwrap();
    assert_eq!(s7.protocol(), PlcProtocol::SiemensS7);
    let modbus = factory.create(&EndpointConfig::modbus("MB", "10.0.0.2", 0, 1)).unwrap();
    assert_eq!(modbus.protocol(), PlcProtocol::ModbusTcp);
}
