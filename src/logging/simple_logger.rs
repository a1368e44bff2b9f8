/// 简化版Logger实现
/// 同时输出到控制台和文件，每条日志带毫秒级时间戳

use super::*;
use chrono::Local;
use log::{Log, Metadata, Record};
use std::fs::OpenOptions;
use std::io::{BufWriter, Write as IoWrite};
use std::sync::{Arc, Mutex};

/// 简化版Logger - 实现log::Log trait
pub struct SimpleLogger {
    config: LoggerConfig,
    file_writer: Arc<Mutex<Option<BufWriter<std::fs::File>>>>,
}

impl SimpleLogger {
    pub fn new(config: LoggerConfig) -> Self {
        Self {
            config,
            file_writer: Arc::new(Mutex::new(None)),
        }
    }

    /// 打开文件目标（如有）
    pub fn open_file_target(&self) -> std::io::Result<()> {
        if let Some(path) = self.config.file_path() {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }

            let file = OpenOptions::new().create(true).append(true).open(path)?;

            if let Ok(mut writer_guard) = self.file_writer.lock() {
                *writer_guard = Some(BufWriter::new(file));
            }
        }
        Ok(())
    }

    /// 格式化单条日志
    pub fn format_record(record: &Record) -> String {
        format!(
            "[{}] [{}] [{}] - {}",
            Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            record.level(),
            record.target(),
            record.args()
        )
    }

    fn write_to_console(&self, record: &Record) {
        let message = Self::format_record(record);

        match record.level() {
            log::Level::Error => {
                eprintln!("\x1b[31m{}\x1b[0m", message);
            }
            log::Level::Warn => {
                eprintln!("\x1b[33m{}\x1b[0m", message);
            }
            _ => {
                println!("{}", message);
            }
        }
    }

    fn write_to_file(&self, record: &Record) {
        if let Ok(mut writer_guard) = self.file_writer.lock() {
            if let Some(writer) = writer_guard.as_mut() {
                let message = format!("{}\n", Self::format_record(record));
                if let Err(e) = writer.write_all(message.as_bytes()) {
                    eprintln!("写入日志文件失败: {}", e);
                } else {
                    let _ = writer.flush();
                }
            }
        }
    }
}

impl Log for SimpleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        for target in &self.config.targets {
            match target {
                LogTarget::Console => self.write_to_console(record),
                LogTarget::File { .. } => self.write_to_file(record),
            }
        }
    }

    fn flush(&self) {
        let _ = std::io::stdout().flush();
        let _ = std::io::stderr().flush();

        if let Ok(mut writer_guard) = self.file_writer.lock() {
            if let Some(writer) = writer_guard.as_mut() {
                let _ = writer.flush();
            }
        }
    }
}
