//! Testing utilities
//!
//! [`MockLink`] is a scriptable in-memory GATT peripheral: it records
//! writes, serves canned reads, and lets tests push notifications into the
//! stream a cube's pump consumes. [`MockScanner`] adopts pre-built mock
//! links through the same registration sequence the real scanner uses, so
//! bridge tests exercise the production discovery path without a radio.

use async_trait::async_trait;
use futures::channel::mpsc as stream_mpsc;
use futures::stream::BoxStream;
use futures::StreamExt;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::device::{Capabilities, CharacteristicHandle, CubeEvent};
use crate::error::{BridgeError, Result};
use crate::link::GattLink;
use crate::registry::CubeRegistry;
use crate::scanner::{register_link, DeviceScanner};

/// Scriptable [`GattLink`] for tests
pub struct MockLink {
    address: u64,
    handles: Vec<CharacteristicHandle>,
    reads: HashMap<Uuid, Vec<u8>>,
    writes: Mutex<Vec<(Uuid, Vec<u8>)>>,
    subscriptions: Mutex<Vec<Uuid>>,
    fail_writes: bool,
    fail_subscribe: HashSet<Uuid>,
    notify_tx: Mutex<Option<stream_mpsc::UnboundedSender<(Uuid, Vec<u8>)>>>,
    notify_rx: Mutex<Option<stream_mpsc::UnboundedReceiver<(Uuid, Vec<u8>)>>>,
}

impl MockLink {
    /// Create a mock peripheral with the given radio address
    pub fn new(address: u64) -> Self {
        let (tx, rx) = stream_mpsc::unbounded();
        Self {
            address,
            handles: Vec::new(),
            reads: HashMap::new(),
            writes: Mutex::new(Vec::new()),
            subscriptions: Mutex::new(Vec::new()),
            fail_writes: false,
            fail_subscribe: HashSet::new(),
            notify_tx: Mutex::new(Some(tx)),
            notify_rx: Mutex::new(Some(rx)),
        }
    }

    /// Add a writable characteristic
    pub fn with_writable(mut self, uuid: Uuid) -> Self {
        self.handles.push(CharacteristicHandle {
            uuid,
            capabilities: Capabilities {
                write: true,
                ..Default::default()
            },
        });
        self
    }

    /// Add a readable characteristic with a canned value
    pub fn with_readable(mut self, uuid: Uuid, value: Vec<u8>) -> Self {
        self.handles.push(CharacteristicHandle {
            uuid,
            capabilities: Capabilities {
                read: true,
                ..Default::default()
            },
        });
        self.reads.insert(uuid, value);
        self
    }

    /// Add a notifiable characteristic
    pub fn with_notifiable(mut self, uuid: Uuid) -> Self {
        self.handles.push(CharacteristicHandle {
            uuid,
            capabilities: Capabilities {
                notify: true,
                ..Default::default()
            },
        });
        self
    }

    /// Make every write fail with a radio error
    pub fn failing_writes(mut self) -> Self {
        self.fail_writes = true;
        self
    }

    /// Make subscription to one characteristic fail
    pub fn failing_subscribe(mut self, uuid: Uuid) -> Self {
        self.fail_subscribe.insert(uuid);
        self
    }

    /// The scripted characteristic handles
    pub fn handles(&self) -> Vec<CharacteristicHandle> {
        self.handles.clone()
    }

    /// Writes recorded so far, in order
    pub fn writes(&self) -> Vec<(Uuid, Vec<u8>)> {
        self.writes.lock().unwrap().clone()
    }

    /// Successfully subscribed characteristics
    pub fn subscriptions(&self) -> Vec<Uuid> {
        self.subscriptions.lock().unwrap().clone()
    }

    /// Push a notification into the stream the cube's pump consumes
    pub fn push_notification(&self, uuid: Uuid, value: Vec<u8>) {
        if let Some(tx) = self.notify_tx.lock().unwrap().as_ref() {
            let _ = tx.unbounded_send((uuid, value));
        }
    }

    /// Close the notification stream, ending the cube's pump task
    pub fn close_notifications(&self) {
        self.notify_tx.lock().unwrap().take();
    }
}

#[async_trait]
impl GattLink for MockLink {
    fn address(&self) -> u64 {
        self.address
    }

    async fn discover_characteristics(&self, _service: Uuid) -> Result<Vec<CharacteristicHandle>> {
        if self.handles.is_empty() {
            return Err(BridgeError::ServiceNotFound {
                address: self.address,
            });
        }
        Ok(self.handles.clone())
    }

    async fn write(&self, characteristic: Uuid, payload: &[u8]) -> Result<()> {
        if self.fail_writes {
            return Err(BridgeError::Ble(btleplug::Error::NotConnected));
        }
        self.writes
            .lock()
            .unwrap()
            .push((characteristic, payload.to_vec()));
        Ok(())
    }

    async fn read(&self, characteristic: Uuid) -> Result<Vec<u8>> {
        self.reads
            .get(&characteristic)
            .cloned()
            .ok_or(BridgeError::CharacteristicNotFound(characteristic))
    }

    async fn subscribe(&self, characteristic: Uuid) -> Result<()> {
        if self.fail_subscribe.contains(&characteristic) {
            return Err(BridgeError::Ble(btleplug::Error::NotConnected));
        }
        self.subscriptions.lock().unwrap().push(characteristic);
        Ok(())
    }

    async fn notifications(&self) -> Result<BoxStream<'static, (Uuid, Vec<u8>)>> {
        let rx = self
            .notify_rx
            .lock()
            .unwrap()
            .take()
            .ok_or(BridgeError::ChannelClosed)?;
        Ok(rx.boxed())
    }
}

/// [`DeviceScanner`] that adopts pre-built mock links
///
/// Each scan drains the pending links through the production registration
/// sequence (resolve, subscribe, bootstrap battery read, insert, announce).
/// It does not suspend for the scan window.
#[derive(Default)]
pub struct MockScanner {
    pending: Mutex<Vec<Arc<MockLink>>>,
}

impl MockScanner {
    /// Create a scanner with no pending links
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a link for adoption on the next scan
    pub fn enqueue(&self, link: Arc<MockLink>) {
        self.pending.lock().unwrap().push(link);
    }
}

#[async_trait]
impl DeviceScanner for MockScanner {
    async fn scan(
        &self,
        _window: Duration,
        registry: Arc<CubeRegistry>,
        events: mpsc::Sender<CubeEvent>,
    ) -> Result<usize> {
        let links: Vec<_> = self.pending.lock().unwrap().drain(..).collect();
        let mut found = 0;
        for link in links {
            if registry.contains_address(link.address()) {
                continue;
            }
            if let Ok(Some(_serial)) = register_link(link, &registry, &events).await {
                found += 1;
            }
        }
        Ok(found)
    }
}
