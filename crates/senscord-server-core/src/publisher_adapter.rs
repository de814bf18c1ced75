//! Publisher resource adapter (spec §4.7): a single Standard worker that
//! ingests client-sent frames and republishes them to the SDK publisher.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use senscord_proto::{
    Cause, DataType, Header, Message, MessageStatus, MessageType, Payload, SendFramePayload,
    SendFrameReply, StandardReply,
};
use senscord_sdk::{Publisher, SdkChannel, SdkFrame, SensorCore};
use senscord_shmem::{AllocatorError, MappedBlock, SharedMemoryAllocator};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;

use crate::allocator_cache::{AllocatorCache, DEFAULT_ALLOCATOR_KEY};
use crate::error::AdapterError;
use crate::queue::ResourceQueue;
use crate::resource::{OutboundSink, ResourceAdapter};

fn allocator_cause(err: &AllocatorError) -> Cause {
    match err {
        AllocatorError::InvalidArgument(_) => Cause::InvalidArgument,
        AllocatorError::ResourceExhausted => Cause::ResourceExhausted,
        AllocatorError::NotFound(_) => Cause::NotFound,
        AllocatorError::Io(_) => Cause::Unknown,
    }
}

/// One inbound channel's shared memory, kept around between `SendFrame` and
/// the matching `ReleaseFrame` so it can be unmapped locally (spec §4.7: "on
/// SDK release, unmap ... when is_memory_shared").
struct SharedChannelMapping {
    allocator: Arc<SharedMemoryAllocator>,
    block: MappedBlock,
}

pub struct PublisherResourceAdapter {
    resource_id: u64,
    publisher: Arc<dyn Publisher>,
    standard_queue: ResourceQueue,
    workers: AsyncMutex<Vec<JoinHandle<()>>>,
    ending: Arc<AtomicBool>,
    stop_notify: Arc<tokio::sync::Notify>,
    allocator_cache: AllocatorCache,
    shared_mappings: AsyncMutex<HashMap<u64, Vec<SharedChannelMapping>>>,
}

impl PublisherResourceAdapter {
    pub fn new(resource_id: u64, publisher: Arc<dyn Publisher>, allocator_base_dir: impl Into<std::path::PathBuf>) -> Arc<Self> {
        Arc::new(Self {
            resource_id,
            publisher,
            standard_queue: ResourceQueue::new(),
            workers: AsyncMutex::new(Vec::new()),
            ending: Arc::new(AtomicBool::new(false)),
            stop_notify: Arc::new(tokio::sync::Notify::new()),
            allocator_cache: AllocatorCache::new(allocator_base_dir),
            shared_mappings: AsyncMutex::new(HashMap::new()),
        })
    }

    async fn handle_send_frame(&self, header: Header, payload: SendFramePayload, outbound: &Arc<dyn OutboundSink>) {
        let mut sdk_frames = Vec::with_capacity(payload.frames.len());
        let mut completed_all_data = Vec::new();

        for frame in payload.frames {
            let mut channels = Vec::with_capacity(frame.channels.len());
            let mut all_data = true;
            let mut shared_for_frame = Vec::new();
            let mut mapping_error = None;

            for channel in frame.channels {
                let allocator_key = channel.allocator_key.clone();
                let rawdata = match channel.raw_data_info {
                    senscord_proto::RawDataInfo::AllData(bytes) => bytes,
                    senscord_proto::RawDataInfo::AddressSizeOnly(info) => {
                        all_data = false;
                        let key = if allocator_key.is_empty() { DEFAULT_ALLOCATOR_KEY } else { allocator_key.as_str() };
                        match self.allocator_cache.get_or_open(key).and_then(|allocator| {
                            let block = allocator.map(&info.encode())?;
                            Ok((allocator, block))
                        }) {
                            Ok((allocator, block)) => {
                                let bytes = allocator.read(&block);
                                shared_for_frame.push(SharedChannelMapping { allocator, block });
                                bytes
                            }
                            Err(e) => {
                                mapping_error = Some(e);
                                Vec::new()
                            }
                        }
                    }
                };
                channels.push(SdkChannel {
                    channel_id: channel.channel_id,
                    allocator_key,
                    rawdata,
                    rawdata_type: channel.rawdata_type,
                    timestamp: channel.timestamp,
                    properties: channel
                        .properties
                        .into_iter()
                        .map(|p| (p.key, p.value))
                        .collect(),
                    updated_property_keys: channel.updated_property_keys,
                });
            }

            if let Some(e) = mapping_error {
                let status = MessageStatus::error(allocator_cause(&e), "publisher_adapter", e.to_string());
                let reply = Message::new(
                    Header::new(header.server_stream_id, header.request_id, MessageType::Reply, DataType::SendFrame),
                    Payload::StandardReply(StandardReply { status }),
                );
                let _ = outbound.send_message_to_client(reply).await;
                return;
            }

            if all_data {
                completed_all_data.push(frame.sequence_number);
            } else {
                self.shared_mappings.lock().await.insert(frame.sequence_number, shared_for_frame);
            }
            sdk_frames.push(SdkFrame {
                sequence_number: frame.sequence_number,
                sent_time: frame.sent_time,
                user_data: frame.user_data,
                channels,
            });
        }

        let result = self.publisher.publish_frames(sdk_frames).await;
        let status = match result {
            Ok(()) => MessageStatus::ok(),
            Err(e) => MessageStatus::error(crate::error::sdk_cause(&e), "publisher_adapter", e.to_string()),
        };

        if status.ok && !completed_all_data.is_empty() {
            let reply = Message::new(
                Header::new(header.server_stream_id, header.request_id, MessageType::Reply, DataType::SendFrame),
                Payload::SendFrameReply(SendFrameReply { sequence_numbers: completed_all_data }),
            );
            if let Err(e) = outbound.send_message_to_client(reply).await {
                tracing::warn!(resource_id = self.resource_id, error = %e, "failed to ack received frames");
            }
        } else if !status.ok {
            let reply = Message::new(
                Header::new(header.server_stream_id, header.request_id, MessageType::Reply, DataType::SendFrame),
                Payload::StandardReply(StandardReply { status }),
            );
            let _ = outbound.send_message_to_client(reply).await;
        }
    }

    async fn release_poll_loop(self: Arc<Self>, outbound: Arc<dyn OutboundSink>) {
        loop {
            if self.ending.load(Ordering::Acquire) {
                return;
            }
            let ready = self.publisher.release_ready();
            tokio::select! {
                () = ready.notified() => {}
                () = self.stop_notify.notified() => {}
            }
            if self.ending.load(Ordering::Acquire) {
                return;
            }
            while let Some(released) = self.publisher.take_release().await {
                let mappings = self.shared_mappings.lock().await.remove(&released.sequence_number);
                if let Some(mappings) = mappings {
                    for mapping in mappings {
                        if let Err(e) = mapping.allocator.free(&mapping.block) {
                            tracing::warn!(resource_id = self.resource_id, error = %e, "failed to unmap released frame memory");
                        }
                    }
                }
                if released.any_channel_shared {
                    let msg = Message::new(
                        Header::new(
                            self.resource_id,
                            released.sequence_number,
                            MessageType::Request,
                            DataType::ReleaseFrame,
                        ),
                        Payload::ReleaseFrameRequest(senscord_proto::ReleaseFrameRequest {
                            sequence_number: released.sequence_number,
                            rawdata_accessed: true,
                        }),
                    );
                    if let Err(e) = outbound.send_message_to_client(msg).await {
                        tracing::warn!(resource_id = self.resource_id, error = %e, "failed to send ReleaseFrame upstream");
                    }
                }
            }
        }
    }
}

#[async_trait]
impl ResourceAdapter for PublisherResourceAdapter {
    fn resource_id(&self) -> u64 {
        self.resource_id
    }

    async fn close(&self, core: &dyn SensorCore) -> Result<(), AdapterError> {
        core.close_publisher(self.resource_id).await?;
        Ok(())
    }

    async fn start_monitoring(self: Arc<Self>, outbound: Arc<dyn OutboundSink>) {
        let mut workers = self.workers.lock().await;

        let standard_self = self.clone();
        let standard_outbound = outbound.clone();
        workers.push(tokio::spawn(async move {
            while let Some(msg) = standard_self.standard_queue.pop().await {
                let header = msg.header;
                match (header.data_type, msg.payload) {
                    (DataType::SendFrame, Payload::SendFrame(payload)) => {
                        standard_self.handle_send_frame(header, payload, &standard_outbound).await;
                    }
                    (DataType::ReleaseFrame, _) => {
                        // ReleaseFrame replies from the peer are ignored (spec §4.7).
                    }
                    (data_type, _) => {
                        tracing::warn!(
                            resource_id = standard_self.resource_id,
                            ?data_type,
                            "publisher adapter: unhandled message"
                        );
                    }
                }
            }
        }));

        let release_self = self.clone();
        workers.push(tokio::spawn(release_self.release_poll_loop(outbound)));
    }

    async fn stop_monitoring(&self) {
        self.standard_queue.begin_end();
        self.ending.store(true, Ordering::Release);
        self.stop_notify.notify_waiters();

        let mut workers = self.workers.lock().await;
        for handle in workers.drain(..) {
            let _ = handle.await;
        }
        for _ in self.standard_queue.drain() {}
    }

    async fn push_message(&self, msg: Message) {
        self.standard_queue.push(msg);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use senscord_proto::{Channel, DataType, Header, MessageType, Payload, RawDataInfo};
    use senscord_sdk::mock::MockPublisher;
    use senscord_transport::TransportError;
    use std::sync::Mutex as StdMutex;

    struct RecordingSink {
        sent: StdMutex<Vec<Message>>,
    }

    impl RecordingSink {
        fn new() -> Arc<Self> {
            Arc::new(Self { sent: StdMutex::new(Vec::new()) })
        }
    }

    #[async_trait]
    impl OutboundSink for RecordingSink {
        async fn send_message_to_client(&self, msg: Message) -> Result<(), TransportError> {
            self.sent.lock().unwrap().push(msg);
            Ok(())
        }

        fn raw_data_for_channel(&self, _channel_hint: &Channel, bytes: Vec<u8>) -> RawDataInfo {
            RawDataInfo::AllData(bytes)
        }
    }

    #[tokio::test]
    async fn all_data_send_frame_acks_with_sequence_numbers() {
        let publisher = MockPublisher::new();
        let resource_id = publisher.resource_id();
        let dir = tempfile::tempdir().unwrap();
        let adapter = PublisherResourceAdapter::new(resource_id, publisher.clone(), dir.path());
        let sink = RecordingSink::new();
        let dyn_sink: Arc<dyn OutboundSink> = sink.clone();
        adapter.clone().start_monitoring(dyn_sink).await;

        let frame = senscord_proto::Frame {
            sequence_number: 5,
            sent_time: 0,
            user_data: vec![],
            channels: vec![Channel {
                channel_id: 0,
                allocator_key: String::new(),
                raw_data_info: RawDataInfo::AllData(vec![0xDE, 0xAD]),
                rawdata_type: "raw".into(),
                timestamp: 0,
                properties: vec![],
                updated_property_keys: vec![],
            }],
        };
        adapter
            .push_message(Message::new(
                Header::new(resource_id, 1, MessageType::SendFrame, DataType::SendFrame),
                Payload::SendFrame(SendFramePayload { frames: vec![frame] }),
            ))
            .await;

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        adapter.stop_monitoring().await;

        let published = publisher.published_frames().await;
        assert_eq!(published.len(), 1);
        let sent = sink.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        match &sent[0].payload {
            Payload::SendFrameReply(reply) => assert_eq!(reply.sequence_numbers, vec![5]),
            other => panic!("unexpected payload: {:?}", other),
        }
    }

    #[tokio::test]
    async fn shared_release_sends_release_frame_upstream() {
        let publisher = MockPublisher::new();
        let resource_id = publisher.resource_id();
        let dir = tempfile::tempdir().unwrap();
        let adapter = PublisherResourceAdapter::new(resource_id, publisher.clone(), dir.path());
        let sink = RecordingSink::new();
        let dyn_sink: Arc<dyn OutboundSink> = sink.clone();
        adapter.clone().start_monitoring(dyn_sink).await;

        publisher.simulate_release(9, true).await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        adapter.stop_monitoring().await;

        let sent = sink.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        match &sent[0].payload {
            Payload::ReleaseFrameRequest(req) => {
                assert_eq!(req.sequence_number, 9);
                assert!(req.rawdata_accessed);
            }
            other => panic!("unexpected payload: {:?}", other),
        }
    }

    #[tokio::test]
    async fn shared_descriptor_channel_is_mapped_and_unmapped_on_release() {
        let dir = tempfile::tempdir().unwrap();
        // Matches the region size `AllocatorCache::get_or_open` requests, so
        // the adapter's later open of the same name attaches without a size
        // mismatch (`SharedRegion::open`: later opens never resize).
        let source = SharedMemoryAllocator::open(dir.path(), "camera_0", senscord_shmem::recommended_region_size(16 * 1024 * 1024)).unwrap();
        let block = source.allocate(4).unwrap();
        source.write(&block, &[1, 2, 3, 4]);
        let wire = source.serialize(&block);

        let publisher = MockPublisher::new();
        let resource_id = publisher.resource_id();
        let adapter = PublisherResourceAdapter::new(resource_id, publisher.clone(), dir.path());
        let sink = RecordingSink::new();
        let dyn_sink: Arc<dyn OutboundSink> = sink.clone();
        adapter.clone().start_monitoring(dyn_sink).await;

        let frame = senscord_proto::Frame {
            sequence_number: 11,
            sent_time: 0,
            user_data: vec![],
            channels: vec![Channel {
                channel_id: 0,
                allocator_key: "camera_0".into(),
                raw_data_info: RawDataInfo::AddressSizeOnly(
                    senscord_shmem::SharedAddressInfo::decode(&wire).unwrap(),
                ),
                rawdata_type: "raw".into(),
                timestamp: 0,
                properties: vec![],
                updated_property_keys: vec![],
            }],
        };
        adapter
            .push_message(Message::new(
                Header::new(resource_id, 1, MessageType::SendFrame, DataType::SendFrame),
                Payload::SendFrame(SendFramePayload { frames: vec![frame] }),
            ))
            .await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let published = publisher.published_frames().await;
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].channels[0].rawdata, vec![1, 2, 3, 4]);

        publisher.simulate_release(11, true).await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        adapter.stop_monitoring().await;

        let sent = sink.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert!(matches!(sent[0].payload, Payload::ReleaseFrameRequest(_)));
    }
}
