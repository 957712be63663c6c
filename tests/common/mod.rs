use async_trait::async_trait;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::sync::mpsc;

use kafka_viewer::consumer::{
    AssignmentStrategy, BrokerAdmin, BrokerConnection, BrokerConnector, BrokerEvent,
    ConsumerError, ConsumerOptions, PartitionWatermarks, SeekEntry, SubscribeOptions,
};

#[allow(dead_code)]
pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}

/// Connector whose connections accept everything and log what they were asked.
#[allow(dead_code)]
#[derive(Clone, Default)]
pub struct LoggingConnector {
    pub log: Arc<Mutex<Vec<String>>>,
    pub senders: Arc<Mutex<Vec<mpsc::UnboundedSender<BrokerEvent>>>>,
}

#[allow(dead_code)]
impl LoggingConnector {
    pub fn entries(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn emit(&self, event: BrokerEvent) {
        for sender in self.senders.lock().unwrap().iter() {
            let _ = sender.send(event.clone());
        }
    }
}

struct LoggingConnection {
    log: Arc<Mutex<Vec<String>>>,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<BrokerEvent>>>,
}

#[async_trait]
impl BrokerConnector for LoggingConnector {
    async fn connect(
        &self,
        options: &ConsumerOptions,
        strategy: &AssignmentStrategy,
    ) -> Result<Box<dyn BrokerConnection>, ConsumerError> {
        self.log.lock().unwrap().push(format!(
            "connect {} {} {}",
            options.cluster.id,
            options.consumer_group_id,
            strategy.protocol_name()
        ));
        let (sender, receiver) = mpsc::unbounded_channel();
        self.senders.lock().unwrap().push(sender);
        Ok(Box::new(LoggingConnection {
            log: Arc::clone(&self.log),
            receiver: Mutex::new(Some(receiver)),
        }))
    }
}

#[async_trait]
impl BrokerAdmin for LoggingConnection {
    async fn fetch_topic_offsets(
        &self,
        topic: &str,
    ) -> Result<Vec<PartitionWatermarks>, ConsumerError> {
        self.log.lock().unwrap().push(format!("offsets {}", topic));
        Ok((0..3)
            .map(|partition| PartitionWatermarks {
                partition,
                low: 10 * i64::from(partition),
                high: 100 + i64::from(partition),
            })
            .collect())
    }

    async fn fetch_topic_partitions(&self, topic: &str) -> Result<Vec<i32>, ConsumerError> {
        self.log.lock().unwrap().push(format!("partitions {}", topic));
        Ok(vec![0, 1, 2])
    }
}

#[async_trait]
impl BrokerConnection for LoggingConnection {
    async fn subscribe(&self, options: &SubscribeOptions) -> Result<(), ConsumerError> {
        self.log
            .lock()
            .unwrap()
            .push(format!("subscribe {} {:?}", options.topic, options.from_beginning));
        Ok(())
    }

    fn run(&self) -> Result<mpsc::UnboundedReceiver<BrokerEvent>, ConsumerError> {
        self.log.lock().unwrap().push("run".to_string());
        self.receiver
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| ConsumerError::Connection("already running".to_string()))
    }

    async fn seek(&self, entry: &SeekEntry) -> Result<(), ConsumerError> {
        self.log
            .lock()
            .unwrap()
            .push(format!("seek {} {} {}", entry.topic, entry.partition, entry.offset));
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), ConsumerError> {
        self.log.lock().unwrap().push("disconnect".to_string());
        Ok(())
    }
}
