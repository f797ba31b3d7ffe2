use std::io::{self, Write};

use async_trait::async_trait;
use env_logger::Builder;
use log::LevelFilter;
use pingora::{
    server::{ListenFds, ShutdownWatch},
    services::Service,
};
use tokio::{
    fs::{create_dir_all, metadata, File, OpenOptions},
    io::{AsyncWriteExt, BufWriter},
    sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender},
};

use crate::config;

/// `Write` sink handing formatted log lines to the file service.
pub struct AsyncWriter {
    sender: UnboundedSender<Vec<u8>>,
}

impl Write for AsyncWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.sender
            .send(buf.to_vec())
            .map_err(|e| io::Error::new(io::ErrorKind::BrokenPipe, e))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Background service appending log output to `log.path`.
pub struct Logger {
    sender: UnboundedSender<Vec<u8>>,
    receiver: UnboundedReceiver<Vec<u8>>,
    config: config::Log,
}

impl Logger {
    pub fn new(config: config::Log) -> Self {
        let (sender, receiver) = unbounded_channel::<Vec<u8>>();
        Self {
            sender,
            receiver,
            config,
        }
    }

    pub fn writer(&self) -> AsyncWriter {
        AsyncWriter {
            sender: self.sender.clone(),
        }
    }

    pub fn init_env_logger(&self) {
        Builder::from_env(env_logger::Env::default())
            .filter(None, LevelFilter::Info)
            .target(env_logger::Target::Pipe(Box::new(self.writer())))
            .init();
    }

    async fn open(&self) -> io::Result<BufWriter<File>> {
        let path = std::path::Path::new(&self.config.path);
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && metadata(parent).await.is_err() {
                create_dir_all(parent).await?;
            }
        }
        let file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(path)
            .await?;
        Ok(BufWriter::new(file))
    }
}

/// Route `log` output to stderr, or to the file service when a log path
/// is configured. The returned logger must be added to the server.
pub fn init(cfg: Option<&config::Log>) -> Option<Logger> {
    match cfg {
        Some(log_cfg) => {
            let logger = Logger::new(log_cfg.clone());
            logger.init_env_logger();
            Some(logger)
        }
        None => {
            env_logger::init();
            None
        }
    }
}

#[async_trait]
impl Service for Logger {
    async fn start_service(&mut self, _fds: Option<ListenFds>, mut shutdown: ShutdownWatch) {
        let mut file = match self.open().await {
            Ok(file) => file,
            Err(e) => {
                eprintln!("Failed to open log file {}: {e}", self.config.path);
                return;
            }
        };

        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        log::info!("Shutdown signal received, stopping write log");
                        break;
                    }
                },

                data = self.receiver.recv() => {
                    match data {
                        Some(data) => {
                            if let Err(e) = file.write_all(&data).await {
                                eprintln!("Failed to write to log file: {e}");
                            }
                        }
                        None => break,
                    }
                }
            }
        }

        // keep whatever was queued before shutdown
        while let Ok(data) = self.receiver.try_recv() {
            let _ = file.write_all(&data).await;
        }
        if let Err(e) = file.flush().await {
            eprintln!("Failed to flush log file: {e}");
        }
    }

    fn name(&self) -> &'static str {
        "log sync"
    }

    fn threads(&self) -> Option<usize> {
        Some(1)
    }
}
