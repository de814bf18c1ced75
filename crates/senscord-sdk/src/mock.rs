//! An in-memory `SensorCore` used by integration tests and by the
//! `senscord-server` binary's demo mode. Streams never produce frames on
//! their own; tests push frames explicitly via [`MockStream::push_frame`] to
//! keep behavior deterministic.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};

use crate::core::SensorCore;
use crate::error::SdkError;
use crate::publisher::{FrameReleased, Publisher};
use crate::stream::{LockResourceId, Stream};
use crate::types::{Arguments, SdkEvent, SdkFrame, StreamCatalogEntry, VersionRecord};

fn next_resource_id() -> u64 {
    static NEXT: AtomicU64 = AtomicU64::new(1);
    NEXT.fetch_add(1, Ordering::Relaxed)
}

struct StreamState {
    started: bool,
    properties: HashMap<String, Vec<u8>>,
    locks: HashMap<LockResourceId, Vec<String>>,
    registered_events: Vec<String>,
    arrived: VecDeque<SdkFrame>,
    pending_events: VecDeque<SdkEvent>,
}

pub struct MockStream {
    resource_id: u64,
    state: Mutex<StreamState>,
    frame_ready: Arc<Notify>,
    event_ready: Arc<Notify>,
}

impl MockStream {
    pub fn new(initial_properties: HashMap<String, Vec<u8>>) -> Arc<Self> {
        Arc::new(Self {
            resource_id: next_resource_id(),
            state: Mutex::new(StreamState {
                started: false,
                properties: initial_properties,
                locks: HashMap::new(),
                registered_events: Vec::new(),
                arrived: VecDeque::new(),
                pending_events: VecDeque::new(),
            }),
            frame_ready: Arc::new(Notify::new()),
            event_ready: Arc::new(Notify::new()),
        })
    }

    /// Test/demo hook: enqueue a frame as if the sensor had just produced it.
    pub async fn push_frame(&self, frame: SdkFrame) {
        let mut state = self.state.lock().await;
        state.arrived.push_back(frame);
        self.frame_ready.notify_waiters();
    }

    /// Test/demo hook: enqueue an event as if the sensor core had just
    /// raised it. Only delivered if `event_type` is currently registered.
    pub async fn push_event(&self, event: SdkEvent) {
        let mut state = self.state.lock().await;
        if !state.registered_events.contains(&event.event_type) {
            return;
        }
        state.pending_events.push_back(event);
        self.event_ready.notify_waiters();
    }

    pub async fn is_started(&self) -> bool {
        self.state.lock().await.started
    }
}

#[async_trait]
impl Stream for MockStream {
    fn resource_id(&self) -> u64 {
        self.resource_id
    }

    async fn start(&self) -> Result<(), SdkError> {
        let mut state = self.state.lock().await;
        if state.started {
            return Err(SdkError::AlreadyStarted);
        }
        state.started = true;
        Ok(())
    }

    async fn stop(&self) -> Result<(), SdkError> {
        let mut state = self.state.lock().await;
        if !state.started {
            return Err(SdkError::NotStarted);
        }
        state.started = false;
        state.arrived.clear();
        Ok(())
    }

    async fn get_property(&self, key: &str) -> Result<Vec<u8>, SdkError> {
        self.state
            .lock()
            .await
            .properties
            .get(key)
            .cloned()
            .ok_or_else(|| SdkError::UnknownProperty(key.to_owned()))
    }

    async fn set_property(&self, key: &str, value: Vec<u8>) -> Result<Vec<u8>, SdkError> {
        let mut state = self.state.lock().await;
        state.properties.insert(key.to_owned(), value.clone());
        Ok(value)
    }

    async fn property_keys(&self) -> Vec<String> {
        self.state.lock().await.properties.keys().cloned().collect()
    }

    async fn lock_properties(
        &self,
        keys: &[String],
        _timeout_msec: i32,
    ) -> Result<LockResourceId, SdkError> {
        let id = next_resource_id();
        self.state.lock().await.locks.insert(id, keys.to_vec());
        Ok(id)
    }

    async fn unlock_properties(&self, resource_id: LockResourceId) -> Result<(), SdkError> {
        let mut state = self.state.lock().await;
        state
            .locks
            .remove(&resource_id)
            .map(|_| ())
            .ok_or(SdkError::UnknownLockResource(resource_id))
    }

    async fn register_event(&self, event_type: &str) {
        self.state.lock().await.registered_events.push(event_type.to_owned());
    }

    async fn unregister_event(&self, event_type: &str) {
        self.state
            .lock()
            .await
            .registered_events
            .retain(|e| e != event_type);
    }

    fn event_ready(&self) -> Arc<Notify> {
        self.event_ready.clone()
    }

    async fn take_event(&self) -> Option<SdkEvent> {
        self.state.lock().await.pending_events.pop_front()
    }

    fn frame_ready(&self) -> Arc<Notify> {
        self.frame_ready.clone()
    }

    async fn arrived_frame_count(&self) -> usize {
        self.state.lock().await.arrived.len()
    }

    async fn take_frame(&self) -> Option<SdkFrame> {
        self.state.lock().await.arrived.pop_front()
    }

    async fn clear_arrived_frames(&self) {
        self.state.lock().await.arrived.clear();
    }

    async fn release_frame(&self, _sequence_number: u64, _unused: bool) -> Result<(), SdkError> {
        Ok(())
    }
}

pub struct MockPublisher {
    resource_id: u64,
    published: Mutex<Vec<SdkFrame>>,
    releases: Mutex<VecDeque<FrameReleased>>,
    release_ready: Arc<Notify>,
}

impl MockPublisher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            resource_id: next_resource_id(),
            published: Mutex::new(Vec::new()),
            releases: Mutex::new(VecDeque::new()),
            release_ready: Arc::new(Notify::new()),
        })
    }

    pub async fn published_frames(&self) -> Vec<SdkFrame> {
        self.published.lock().await.clone()
    }

    /// Test hook: simulate the SDK finishing with a published frame.
    pub async fn simulate_release(&self, sequence_number: u64, any_channel_shared: bool) {
        self.releases.lock().await.push_back(FrameReleased {
            sequence_number,
            any_channel_shared,
        });
        self.release_ready.notify_waiters();
    }
}

#[async_trait]
impl Publisher for MockPublisher {
    fn resource_id(&self) -> u64 {
        self.resource_id
    }

    async fn publish_frames(&self, frames: Vec<SdkFrame>) -> Result<(), SdkError> {
        self.published.lock().await.extend(frames);
        Ok(())
    }

    fn release_ready(&self) -> Arc<Notify> {
        self.release_ready.clone()
    }

    async fn take_release(&self) -> Option<FrameReleased> {
        self.releases.lock().await.pop_front()
    }
}

pub struct MockSensorCore {
    version: VersionRecord,
    catalog: Vec<StreamCatalogEntry>,
    streams: Mutex<HashMap<u64, Arc<MockStream>>>,
    publishers: Mutex<HashMap<u64, Arc<MockPublisher>>>,
}

impl MockSensorCore {
    pub fn new(version: VersionRecord, catalog: Vec<StreamCatalogEntry>) -> Self {
        Self {
            version,
            catalog,
            streams: Mutex::new(HashMap::new()),
            publishers: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl SensorCore for MockSensorCore {
    async fn version(&self) -> VersionRecord {
        self.version.clone()
    }

    async fn stream_list(&self) -> Vec<StreamCatalogEntry> {
        self.catalog.clone()
    }

    async fn server_config(&self) -> Option<Vec<(String, String)>> {
        None
    }

    async fn open_stream(
        &self,
        stream_key: &str,
        _arguments: &Arguments,
    ) -> Result<Arc<dyn Stream>, SdkError> {
        if !self.catalog.iter().any(|e| e.key == stream_key) {
            return Err(SdkError::UnknownStream(stream_key.to_owned()));
        }
        let stream = MockStream::new(HashMap::new());
        self.streams.lock().await.insert(stream.resource_id(), stream.clone());
        Ok(stream)
    }

    async fn close_stream(&self, resource_id: u64) -> Result<(), SdkError> {
        self.streams.lock().await.remove(&resource_id);
        Ok(())
    }

    async fn open_publisher(&self, _key: &str) -> Result<Arc<dyn Publisher>, SdkError> {
        let publisher = MockPublisher::new();
        self.publishers
            .lock()
            .await
            .insert(publisher.resource_id(), publisher.clone());
        Ok(publisher)
    }

    async fn close_publisher(&self, resource_id: u64) -> Result<(), SdkError> {
        self.publishers.lock().await.remove(&resource_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_core() -> MockSensorCore {
        MockSensorCore::new(
            VersionRecord {
                name: "mock-core".into(),
                major: 1,
                minor: 0,
                patch: 0,
                description: "test double".into(),
                stream_versions: vec![],
            },
            vec![StreamCatalogEntry {
                key: "camera_0".into(),
                r#type: "image".into(),
            }],
        )
    }

    #[tokio::test]
    async fn open_unknown_stream_is_rejected() {
        let core = sample_core();
        let result = core.open_stream("missing", &Arguments::new()).await;
        assert!(matches!(result, Err(SdkError::UnknownStream(_))));
    }

    #[tokio::test]
    async fn start_stop_and_frame_lifecycle() {
        let stream = MockStream::new(HashMap::new());
        stream.start().await.unwrap();
        assert!(matches!(stream.start().await, Err(SdkError::AlreadyStarted)));

        stream
            .push_frame(SdkFrame {
                sequence_number: 1,
                sent_time: 0,
                user_data: vec![],
                channels: vec![],
            })
            .await;
        assert_eq!(stream.arrived_frame_count().await, 1);
        let frame = stream.take_frame().await.unwrap();
        assert_eq!(frame.sequence_number, 1);
        assert_eq!(stream.arrived_frame_count().await, 0);

        stream.stop().await.unwrap();
        assert!(!stream.is_started().await);
    }

    #[tokio::test]
    async fn pushed_event_is_delivered_only_once_registered() {
        let stream = MockStream::new(HashMap::new());
        stream
            .push_event(SdkEvent { event_type: "error".into(), args: HashMap::new() })
            .await;
        assert_eq!(stream.take_event().await, None);

        stream.register_event("error").await;
        stream
            .push_event(SdkEvent { event_type: "error".into(), args: HashMap::new() })
            .await;
        let event = stream.take_event().await.unwrap();
        assert_eq!(event.event_type, "error");
        assert!(stream.take_event().await.is_none());
    }

    #[tokio::test]
    async fn lock_unlock_round_trip() {
        let stream = MockStream::new(HashMap::new());
        let id = stream
            .lock_properties(&["exposure".to_owned()], 1000)
            .await
            .unwrap();
        stream.unlock_properties(id).await.unwrap();
        assert!(matches!(
            stream.unlock_properties(id).await,
            Err(SdkError::UnknownLockResource(_))
        ));
    }

    #[tokio::test]
    async fn publisher_publish_and_release_round_trip() {
        let publisher = MockPublisher::new();
        publisher
            .publish_frames(vec![SdkFrame {
                sequence_number: 7,
                sent_time: 0,
                user_data: vec![],
                channels: vec![],
            }])
            .await
            .unwrap();

        publisher.simulate_release(7, true).await;
        let released = publisher.take_release().await.unwrap();
        assert_eq!(released.sequence_number, 7);
        assert!(released.any_channel_shared);
    }
}
