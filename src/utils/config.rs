use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use crate::models::{AddressScheme, ByteOrder, PlcDataType, PlcProtocol};
use crate::utils::error::{AppError, AppResult};

/// 环境变量前缀，例如 `LEC_PLC__CLIENT__TIMEOUT_MS=500`
pub const ENV_PREFIX: &str = "LEC_PLC";

/// 应用程序主配置结构
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// 客户端通用设置
    pub client: ClientSettings,
    /// 预先配置的PLC端点
    pub endpoints: Vec<EndpointConfig>,
    /// 数据类型注册表设置
    pub data_types: DataTypeSettings,
    /// 日志配置
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// 按名称查找端点
    pub fn endpoint(&self, name: &str) -> Option<&EndpointConfig> {
        self.endpoints.iter().find(|e| e.name == name)
    }
}

/// 客户端通用设置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    /// 单次读写/探测的超时时间（毫秒）
    pub timeout_ms: u64,
    /// 建立连接的超时时间（毫秒）
    pub connect_timeout_ms: u64,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            timeout_ms: 3000,
            connect_timeout_ms: 5000,
        }
    }
}

/// PLC端点配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// 端点名称（调用方使用的PLC标识）
    pub name: String,
    /// 通信协议
    pub protocol: PlcProtocol,
    /// PLC IP地址
    pub host: String,
    /// PLC端口；为 0 时按协议取默认端口（S7: 102, Modbus: 502）
    pub port: u16,
    /// S7 机架号
    pub rack: u16,
    /// S7 槽号
    pub slot: u16,
    /// S7 连接类型 (1 = PG, 2 = OP, 3 = S7 Basic)
    pub connection_type: u16,
    /// Modbus 从站ID
    pub unit_id: u8,
    /// 多寄存器数值的字节序（仅 Modbus 使用，S7 固定为大端）
    pub byte_order: ByteOrder,
    /// Modbus 地址是否使用 0 基
    pub zero_based_address: bool,
    /// 地址语法；为空时由协议决定，模拟PLC默认使用 S7 语法
    pub address_scheme: Option<AddressScheme>,
    /// 覆盖客户端的读写超时（毫秒）
    pub timeout_ms: Option<u64>,
    /// 覆盖客户端的连接超时（毫秒）
    pub connect_timeout_ms: Option<u64>,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            name: "PLC1".to_string(),
            protocol: PlcProtocol::SiemensS7,
            host: "127.0.0.1".to_string(),
            port: 0,
            rack: 0,
            slot: 1,
            connection_type: 1,
            unit_id: 1,
            byte_order: ByteOrder::default(),
            zero_based_address: false,
            address_scheme: None,
            timeout_ms: None,
            connect_timeout_ms: None,
        }
    }
}

impl EndpointConfig {
    /// S7 端点
    pub fn s7(name: impl Into<String>, host: impl Into<String>, rack: u16, slot: u16) -> Self {
        Self {
            name: name.into(),
            protocol: PlcProtocol::SiemensS7,
            host: host.into(),
            rack,
            slot,
            ..Default::default()
        }
    }

    /// Modbus TCP 端点
    pub fn modbus(name: impl Into<String>, host: impl Into<String>, port: u16, unit_id: u8) -> Self {
        Self {
            name: name.into(),
            protocol: PlcProtocol::ModbusTcp,
            host: host.into(),
            port,
            unit_id,
            ..Default::default()
        }
    }

    /// 模拟PLC端点
    pub fn simulated(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            protocol: PlcProtocol::Simulated,
            host: String::new(),
            ..Default::default()
        }
    }

    /// 实际使用的端口
    pub fn effective_port(&self) -> u16 {
        if self.port != 0 {
            return self.port;
        }
        match self.protocol {
            PlcProtocol::SiemensS7 => 102,
            PlcProtocol::ModbusTcp => 502,
            PlcProtocol::Simulated => 0,
        }
    }

    /// 实际使用的地址语法
    pub fn effective_address_scheme(&self) -> AddressScheme {
        match self.protocol {
            PlcProtocol::SiemensS7 => AddressScheme::S7,
            PlcProtocol::ModbusTcp => AddressScheme::Modbus,
            PlcProtocol::Simulated => self.address_scheme.unwrap_or(AddressScheme::S7),
        }
    }

    /// 实际使用的字节序；S7 数据总是大端
    pub fn effective_byte_order(&self) -> ByteOrder {
        match self.effective_address_scheme() {
            AddressScheme::S7 => ByteOrder::ABCD,
            AddressScheme::Modbus => self.byte_order,
        }
    }

    pub fn effective_timeout_ms(&self, client: &ClientSettings) -> u64 {
        self.timeout_ms.unwrap_or(client.timeout_ms)
    }

    pub fn effective_connect_timeout_ms(&self, client: &ClientSettings) -> u64 {
        self.connect_timeout_ms.unwrap_or(client.connect_timeout_ms)
    }

    /// `host:port` 形式的地址，用于日志与连接
    pub fn socket_address(&self) -> String {
        format!("{}:{}", self.host, self.effective_port())
    }

    /// 校验单个端点
    pub fn validate(&self) -> AppResult<()> {
        if self.name.trim().is_empty() {
            return Err(AppError::configuration_error("端点名称不能为空"));
        }
        if self.protocol != PlcProtocol::Simulated && self.host.trim().is_empty() {
            return Err(AppError::configuration_error(format!(
                "端点 {} 的主机地址不能为空",
                self.name
            )));
        }
        if self.timeout_ms == Some(0) || self.connect_timeout_ms == Some(0) {
            return Err(AppError::configuration_error(format!(
                "端点 {} 的超时时间必须大于0",
                self.name
            )));
        }
        if self.protocol == PlcProtocol::SiemensS7 && (self.rack > 7 || self.slot > 31) {
            return Err(AppError::configuration_error(format!(
                "端点 {} 的机架/槽号无效: rack={}, slot={}",
                self.name, self.rack, self.slot
            )));
        }
        Ok(())
    }
}

/// 数据类型注册表设置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataTypeSettings {
    /// S7 STRING 的最大字符数（存储占用 容量+2 字节）
    pub string_capacity: usize,
    /// 额外的类型别名（别名 -> 标准类型名）
    pub aliases: HashMap<String, String>,
}

impl Default for DataTypeSettings {
    fn default() -> Self {
        Self {
            string_capacity: 254,
            aliases: HashMap::new(),
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 日志级别 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 日志文件路径
    pub log_file_path: Option<PathBuf>,
    /// 是否启用控制台输出
    pub console_output: bool,
    /// 是否启用文件输出
    pub file_output: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_file_path: Some(PathBuf::from("logs/lec_plc.log")),
            console_output: true,
            file_output: false,
        }
    }
}

/// 配置管理器
/// 负责加载、保存和管理客户端配置
pub struct ConfigManager {
    config: AppConfig,
    config_file_path: PathBuf,
}

impl ConfigManager {
    /// 创建新的配置管理器
    pub fn new(config_file_path: PathBuf) -> Self {
        Self {
            config: AppConfig::default(),
            config_file_path,
        }
    }

    /// 使用给定配置创建（不关联磁盘文件内容）
    pub fn with_config(config_file_path: PathBuf, config: AppConfig) -> Self {
        Self {
            config,
            config_file_path,
        }
    }

    /// 从文件加载配置
    pub async fn load_from_file(&mut self) -> AppResult<()> {
        if !self.config_file_path.exists() {
            // 如果配置文件不存在，创建默认配置文件
            self.save_to_file().await?;
            return Ok(());
        }

        let content = tokio::fs::read_to_string(&self.config_file_path)
            .await
            .map_err(|e| AppError::io_error(format!("读取配置文件失败: {}", e), e.kind().to_string()))?;

        self.config = serde_json::from_str(&content)
            .map_err(|e| AppError::configuration_error(format!("解析配置文件失败: {}", e)))?;

        Ok(())
    }

    /// 将配置保存到文件
    pub async fn save_to_file(&self) -> AppResult<()> {
        if let Some(parent) = self.config_file_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    AppError::io_error(format!("创建配置目录失败: {}", e), e.kind().to_string())
                })?;
            }
        }

        let content = serde_json::to_string_pretty(&self.config)
            .map_err(|e| AppError::json_error(format!("序列化配置失败: {}", e)))?;

        tokio::fs::write(&self.config_file_path, content)
            .await
            .map_err(|e| AppError::io_error(format!("写入配置文件失败: {}", e), e.kind().to_string()))?;

        Ok(())
    }

    /// 从环境变量覆盖配置
    ///
    /// 以当前配置为底，叠加 `LEC_PLC__<节>__<字段>` 形式的环境变量。
    pub fn override_from_env(&mut self) -> AppResult<()> {
        let merged = config::Config::builder()
            .add_source(config::Config::try_from(&self.config)?)
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        self.config = merged.try_deserialize()?;
        Ok(())
    }

    /// 获取配置的只读引用
    pub fn get_config(&self) -> &AppConfig {
        &self.config
    }

    /// 获取配置的可变引用
    pub fn get_config_mut(&mut self) -> &mut AppConfig {
        &mut self.config
    }

    /// 验证配置的有效性
    pub fn validate_config(&self) -> AppResult<()> {
        validate_config(&self.config)
    }

    /// 重置为默认配置
    pub fn reset_to_default(&mut self) {
        self.config = AppConfig::default();
    }
}

/// 验证配置的有效性
pub fn validate_config(config: &AppConfig) -> AppResult<()> {
    if config.client.timeout_ms == 0 || config.client.connect_timeout_ms == 0 {
        return Err(AppError::configuration_error("超时时间必须大于0"));
    }

    let mut names = HashSet::new();
    for endpoint in &config.endpoints {
        endpoint.validate()?;
        if !names.insert(endpoint.name.as_str()) {
            return Err(AppError::configuration_error(format!(
                "端点名称重复: {}",
                endpoint.name
            )));
        }
    }

    let capacity = config.data_types.string_capacity;
    if capacity == 0 || capacity > 254 {
        return Err(AppError::configuration_error(format!(
            "无效的字符串容量: {}，有效范围: 1-254",
            capacity
        )));
    }

    for (alias, target) in &config.data_types.aliases {
        let known = PlcDataType::ALL
            .iter()
            .any(|t| t.name().eq_ignore_ascii_case(target.trim()));
        if !known {
            return Err(AppError::configuration_error(format!(
                "类型别名 {} 指向未知类型: {}",
                alias, target
            )));
        }
    }

    let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_log_levels.contains(&config.logging.log_level.to_lowercase().as_str()) {
        return Err(AppError::configuration_error(format!(
            "无效的日志级别: {}，有效值: {:?}",
            config.logging.log_level, valid_log_levels
        )));
    }

    Ok(())
}

/// 全局配置管理器实例
use std::sync::Mutex;
use std::sync::OnceLock;

static GLOBAL_CONFIG: OnceLock<Mutex<AppConfig>> = OnceLock::new();

/// 初始化全局配置
///
/// 依次执行：从文件加载、环境变量覆盖、校验。
pub async fn init_global_config(config_path: Option<PathBuf>) -> AppResult<AppConfig> {
    let config_path = config_path.unwrap_or_else(|| PathBuf::from("config/lec_plc.json"));
    let mut config_manager = ConfigManager::new(config_path);

    config_manager.load_from_file().await?;
    config_manager.override_from_env()?;
    config_manager.validate_config()?;

    let config = config_manager.get_config().clone();
    GLOBAL_CONFIG
        .set(Mutex::new(config.clone()))
        .map_err(|_| AppError::configuration_error("全局配置已经初始化"))?;

    Ok(config)
}

/// 获取全局配置的只读访问
pub fn get_global_config() -> AppResult<AppConfig> {
    let config = GLOBAL_CONFIG
        .get()
        .ok_or_else(|| AppError::configuration_error("全局配置未初始化"))?
        .lock()
        .map_err(|_| AppError::concurrency_error("获取全局配置锁失败"))?;

    Ok(config.clone())
}
