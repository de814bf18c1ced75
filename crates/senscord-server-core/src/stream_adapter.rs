//! Stream resource adapter (spec §4.6): Standard + LockUnlock workers, frame
//! publishing, and the pending-release table.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use senscord_proto::{
    Cause, Channel, DataType, EventArgValue, GetPropertyListReply, Header, LockPropertyReply,
    LockPropertyRequest, Message, MessageStatus, MessageType, Payload, PropertyEntry,
    PropertyReqReply, RegisterEventRequest, ReleaseFrameRequest, SendEventPayload,
    SendFramePayload, SendFrameReply, StandardReply, UnlockPropertyRequest,
    UnregisterEventRequest,
};
use senscord_sdk::{SdkChannel, SdkEvent, SdkEventArgValue, SdkFrame, SensorCore, Stream};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;

use crate::error::AdapterError;
use crate::queue::ResourceQueue;
use crate::resource::{OutboundSink, ResourceAdapter};

struct PendingFrame {
    rawdata_accessed: bool,
}

pub struct StreamResourceAdapter {
    resource_id: u64,
    stream: Arc<dyn Stream>,
    standard_queue: ResourceQueue,
    lockunlock_queue: ResourceQueue,
    pending: Mutex<HashMap<u64, PendingFrame>>,
    event_send_count: AtomicU64,
    workers: AsyncMutex<Vec<JoinHandle<()>>>,
    ending: Arc<AtomicBool>,
    stop_notify: Arc<tokio::sync::Notify>,
}

impl StreamResourceAdapter {
    pub fn new(resource_id: u64, stream: Arc<dyn Stream>) -> Arc<Self> {
        Arc::new(Self {
            resource_id,
            stream,
            standard_queue: ResourceQueue::new(),
            lockunlock_queue: ResourceQueue::new(),
            pending: Mutex::new(HashMap::new()),
            event_send_count: AtomicU64::new(0),
            workers: AsyncMutex::new(Vec::new()),
            ending: Arc::new(AtomicBool::new(false)),
            stop_notify: Arc::new(tokio::sync::Notify::new()),
        })
    }

    async fn handle_standard(&self, msg: Message, outbound: &Arc<dyn OutboundSink>) {
        let header = msg.header;
        match (header.r#type, header.data_type, msg.payload) {
            (MessageType::Reply, DataType::SendFrame, Payload::SendFrameReply(reply)) => {
                self.handle_send_frame_reply(reply).await;
            }
            (MessageType::Request, DataType::Start, _) => {
                let result = self.stream.start().await;
                self.reply_status(&header, DataType::Start, result.err(), outbound).await;
            }
            (MessageType::Request, DataType::Stop, _) => {
                let result = self.stream.stop().await;
                self.stream.clear_arrived_frames().await;
                self.reply_status(&header, DataType::Stop, result.err(), outbound).await;
            }
            (MessageType::Request, DataType::GetProperty, Payload::PropertyReqReply(req)) => {
                match self.stream.get_property(&req.key).await {
                    Ok(value) => {
                        self.send(
                            outbound,
                            header.request_id,
                            DataType::GetProperty,
                            Payload::PropertyReqReply(PropertyReqReply {
                                status: MessageStatus::ok(),
                                key: req.key,
                                property: value,
                            }),
                        )
                        .await;
                    }
                    Err(e) => {
                        self.send(
                            outbound,
                            header.request_id,
                            DataType::GetProperty,
                            Payload::PropertyReqReply(PropertyReqReply {
                                status: status_for(&e.into()),
                                key: req.key,
                                property: Vec::new(),
                            }),
                        )
                        .await;
                    }
                }
            }
            (MessageType::Request, DataType::SetProperty, Payload::PropertyReqReply(req)) => {
                match self.stream.set_property(&req.key, req.property).await {
                    Ok(_) => self.reply_status(&header, DataType::SetProperty, None, outbound).await,
                    Err(e) => {
                        self.reply_status(&header, DataType::SetProperty, Some(e.into()), outbound)
                            .await;
                    }
                }
            }
            (MessageType::Request, DataType::GetPropertyList, _) => {
                let keys = self.stream.property_keys().await;
                self.send(
                    outbound,
                    header.request_id,
                    DataType::GetPropertyList,
                    Payload::GetPropertyListReply(GetPropertyListReply {
                        status: MessageStatus::ok(),
                        keys,
                    }),
                )
                .await;
            }
            (
                MessageType::Request,
                DataType::ReleaseFrame,
                Payload::ReleaseFrameRequest(req),
            ) => {
                self.handle_release_frame(req, &header, outbound).await;
            }
            (
                MessageType::Request,
                DataType::RegisterEvent,
                Payload::RegisterEventRequest(req),
            ) => {
                self.stream.register_event(&req.event_type).await;
                self.reply_status(&header, DataType::RegisterEvent, None, outbound).await;
            }
            (
                MessageType::Request,
                DataType::UnregisterEvent,
                Payload::UnregisterEventRequest(req),
            ) => {
                self.stream.unregister_event(&req.event_type).await;
                self.reply_status(&header, DataType::UnregisterEvent, None, outbound).await;
            }
            (msg_type, data_type, _) => {
                tracing::warn!(
                    resource_id = self.resource_id,
                    ?msg_type,
                    ?data_type,
                    "stream adapter: unhandled message on standard queue"
                );
            }
        }
    }

    async fn handle_lockunlock(&self, msg: Message, outbound: &Arc<dyn OutboundSink>) {
        let header = msg.header;
        match (header.data_type, msg.payload) {
            (DataType::LockProperty, Payload::LockPropertyRequest(req)) => {
                self.handle_lock(req, &header, outbound).await;
            }
            (DataType::UnlockProperty, Payload::UnlockPropertyRequest(req)) => {
                let result = self.stream.unlock_properties(req.resource_id).await;
                self.reply_status(&header, DataType::UnlockProperty, result.err(), outbound)
                    .await;
            }
            (data_type, _) => {
                tracing::warn!(
                    resource_id = self.resource_id,
                    ?data_type,
                    "stream adapter: unhandled message on lock/unlock queue"
                );
            }
        }
    }

    async fn handle_lock(
        &self,
        req: LockPropertyRequest,
        header: &Header,
        outbound: &Arc<dyn OutboundSink>,
    ) {
        match self.stream.lock_properties(&req.keys, req.timeout_msec).await {
            Ok(lock_id) => {
                self.send(
                    outbound,
                    header.request_id,
                    DataType::LockProperty,
                    Payload::LockPropertyReply(LockPropertyReply {
                        status: MessageStatus::ok(),
                        resource_id: lock_id,
                    }),
                )
                .await;
            }
            Err(e) => {
                self.send(
                    outbound,
                    header.request_id,
                    DataType::LockProperty,
                    Payload::LockPropertyReply(LockPropertyReply {
                        status: status_for(&e.into()),
                        resource_id: 0,
                    }),
                )
                .await;
            }
        }
    }

    async fn handle_release_frame(
        &self,
        req: ReleaseFrameRequest,
        header: &Header,
        outbound: &Arc<dyn OutboundSink>,
    ) {
        let merged_accessed = {
            let mut pending = self.pending.lock().expect("pending mutex poisoned");
            match pending.remove(&req.sequence_number) {
                Some(p) => Some(p.rawdata_accessed || req.rawdata_accessed),
                None => None,
            }
        };
        if let Some(accessed) = merged_accessed {
            let _ = self.stream.release_frame(req.sequence_number, !accessed).await;
        }
        // Unknown sequence numbers are OK (spec §8 boundary behavior): no
        // entry removed, no error surfaced.
        self.reply_status(header, DataType::ReleaseFrame, None, outbound).await;
    }

    async fn handle_send_frame_reply(&self, reply: SendFrameReply) {
        for seq in reply.sequence_numbers {
            let entry = self.pending.lock().expect("pending mutex poisoned").remove(&seq);
            if entry.is_some() {
                let _ = self.stream.release_frame(seq, false).await;
            }
        }
    }

    async fn reply_status(
        &self,
        request: &Header,
        data_type: DataType,
        err: Option<AdapterErrorLike>,
        outbound: &Arc<dyn OutboundSink>,
    ) {
        let status = match err {
            None => MessageStatus::ok(),
            Some(e) => status_for(&e),
        };
        let reply = Message::new(
            Header::new(request.server_stream_id, request.request_id, MessageType::Reply, data_type),
            Payload::StandardReply(StandardReply { status }),
        );
        if let Err(e) = outbound.send_message_to_client(reply).await {
            tracing::warn!(resource_id = self.resource_id, error = %e, "failed to send reply");
        }
    }

    async fn send(&self, outbound: &Arc<dyn OutboundSink>, request_id: u64, data_type: DataType, payload: Payload) {
        let msg = Message::new(
            Header::new(self.resource_id, request_id, MessageType::Reply, data_type),
            payload,
        );
        if let Err(e) = outbound.send_message_to_client(msg).await {
            tracing::warn!(resource_id = self.resource_id, error = %e, "failed to send reply");
        }
    }

    /// Emits a SendEvent message using the monotonic event-send counter as
    /// `request_id` (spec §4.6).
    pub async fn send_event(&self, outbound: &Arc<dyn OutboundSink>, payload: SendEventPayload) {
        let request_id = self.event_send_count.fetch_add(1, Ordering::Relaxed);
        let msg = Message::new(
            Header::new(self.resource_id, request_id, MessageType::SendEvent, DataType::SendEvent),
            Payload::SendEvent(payload),
        );
        if let Err(e) = outbound.send_message_to_client(msg).await {
            tracing::warn!(resource_id = self.resource_id, error = %e, "failed to send event");
        }
    }

    async fn frame_publisher_loop(self: Arc<Self>, outbound: Arc<dyn OutboundSink>) {
        loop {
            if self.ending.load(Ordering::Acquire) {
                return;
            }
            if self.stream.arrived_frame_count().await == 0 {
                let ready = self.stream.frame_ready();
                tokio::select! {
                    () = ready.notified() => {}
                    () = self.stop_notify.notified() => {}
                }
                if self.ending.load(Ordering::Acquire) {
                    return;
                }
            }

            let mut batch: Vec<SdkFrame> = Vec::new();
            while let Some(frame) = self.stream.take_frame().await {
                batch.push(frame);
            }
            if batch.is_empty() {
                continue;
            }
            self.publish_batch(batch, &outbound).await;
        }
    }

    async fn event_publisher_loop(self: Arc<Self>, outbound: Arc<dyn OutboundSink>) {
        loop {
            if self.ending.load(Ordering::Acquire) {
                return;
            }
            let ready = self.stream.event_ready();
            tokio::select! {
                () = ready.notified() => {}
                () = self.stop_notify.notified() => {}
            }
            if self.ending.load(Ordering::Acquire) {
                return;
            }
            while let Some(event) = self.stream.take_event().await {
                self.send_event(&outbound, to_wire_event(event)).await;
            }
        }
    }

    async fn publish_batch(&self, batch: Vec<SdkFrame>, outbound: &Arc<dyn OutboundSink>) {
        let first_seq = batch[0].sequence_number;
        let mut wire_frames = Vec::with_capacity(batch.len());
        let mut to_pend: Vec<(u64, bool)> = Vec::new();

        for frame in &batch {
            let mut channels = Vec::with_capacity(frame.channels.len());
            let mut frame_all_data = true;
            for channel in &frame.channels {
                let hint = placeholder_channel(channel);
                let raw_data_info = outbound.raw_data_for_channel(&hint, channel.rawdata.clone());
                frame_all_data &= raw_data_info.is_all_data();
                channels.push(senscord_proto::Channel {
                    channel_id: channel.channel_id,
                    allocator_key: channel.allocator_key.clone(),
                    raw_data_info,
                    rawdata_type: channel.rawdata_type.clone(),
                    timestamp: channel.timestamp,
                    properties: channel
                        .properties
                        .iter()
                        .map(|(key, value)| PropertyEntry { key: key.clone(), value: value.clone() })
                        .collect(),
                    updated_property_keys: channel.updated_property_keys.clone(),
                });
            }

            let wire_frame = senscord_proto::Frame {
                sequence_number: frame.sequence_number,
                sent_time: frame.sent_time,
                user_data: frame.user_data.clone(),
                channels,
            };
            if wire_frame.is_pending() {
                to_pend.push((frame.sequence_number, frame_all_data));
            }
            wire_frames.push(wire_frame);
        }

        let msg = Message::new(
            Header::new(self.resource_id, first_seq, MessageType::SendFrame, DataType::SendFrame),
            Payload::SendFrame(SendFramePayload { frames: wire_frames }),
        );

        match outbound.send_message_to_client(msg).await {
            Ok(()) => {
                let mut pending = self.pending.lock().expect("pending mutex poisoned");
                for (seq, all_data) in to_pend {
                    pending.insert(seq, PendingFrame { rawdata_accessed: all_data });
                }
            }
            Err(e) => {
                tracing::warn!(resource_id = self.resource_id, error = %e, "frame send failed, releasing batch");
                for (seq, all_data) in to_pend {
                    let _ = self.stream.release_frame(seq, !all_data).await;
                }
            }
        }
    }
}

/// Translates an SDK-level event into its wire shape (spec §4.6 "Event
/// publishing").
fn to_wire_event(event: SdkEvent) -> SendEventPayload {
    SendEventPayload {
        event_type: event.event_type,
        args: event
            .args
            .into_iter()
            .map(|(key, value)| (key, to_wire_event_arg(value)))
            .collect(),
    }
}

fn to_wire_event_arg(value: SdkEventArgValue) -> EventArgValue {
    match value {
        SdkEventArgValue::Int(v) => EventArgValue::Int(v),
        SdkEventArgValue::Float(v) => EventArgValue::Float(v),
        SdkEventArgValue::Text(v) => EventArgValue::Text(v),
        SdkEventArgValue::Bytes(v) => EventArgValue::Bytes(v),
    }
}

/// Builds the hint `Channel` a transport's `get_channel_raw_data` needs,
/// carrying an empty placeholder for the raw-data field it will overwrite.
fn placeholder_channel(channel: &SdkChannel) -> Channel {
    Channel {
        channel_id: channel.channel_id,
        allocator_key: channel.allocator_key.clone(),
        raw_data_info: senscord_proto::RawDataInfo::AllData(Vec::new()),
        rawdata_type: channel.rawdata_type.clone(),
        timestamp: channel.timestamp,
        properties: Vec::new(),
        updated_property_keys: Vec::new(),
    }
}

type AdapterErrorLike = senscord_sdk::SdkError;

fn status_for(err: &AdapterErrorLike) -> MessageStatus {
    let cause = sdk_cause(err);
    MessageStatus::error(cause, "stream_adapter", err.to_string())
}

fn sdk_cause(err: &senscord_sdk::SdkError) -> Cause {
    use senscord_sdk::SdkError;
    match err {
        SdkError::UnknownStream(_) | SdkError::UnknownLockResource(_) => Cause::NotFound,
        SdkError::AlreadyStarted | SdkError::NotStarted => Cause::InvalidOperation,
        SdkError::UnknownProperty(_) => Cause::NotFound,
        SdkError::LockTimeout(_) => Cause::Timeout,
        SdkError::PublishRejected(_) => Cause::InvalidArgument,
    }
}

#[async_trait]
impl ResourceAdapter for StreamResourceAdapter {
    fn resource_id(&self) -> u64 {
        self.resource_id
    }

    async fn close(&self, core: &dyn SensorCore) -> Result<(), AdapterError> {
        core.close_stream(self.resource_id).await?;
        Ok(())
    }

    async fn start_monitoring(self: Arc<Self>, outbound: Arc<dyn OutboundSink>) {
        let mut workers = self.workers.lock().await;

        let standard_self = self.clone();
        let standard_outbound = outbound.clone();
        workers.push(tokio::spawn(async move {
            while let Some(msg) = standard_self.standard_queue.pop().await {
                standard_self.handle_standard(msg, &standard_outbound).await;
            }
        }));

        let lockunlock_self = self.clone();
        let lockunlock_outbound = outbound.clone();
        workers.push(tokio::spawn(async move {
            while let Some(msg) = lockunlock_self.lockunlock_queue.pop().await {
                lockunlock_self.handle_lockunlock(msg, &lockunlock_outbound).await;
            }
        }));

        let frame_self = self.clone();
        let frame_outbound = outbound.clone();
        workers.push(tokio::spawn(frame_self.frame_publisher_loop(frame_outbound)));

        let event_self = self.clone();
        workers.push(tokio::spawn(event_self.event_publisher_loop(outbound)));
    }

    async fn stop_monitoring(&self) {
        self.standard_queue.begin_end();
        self.lockunlock_queue.begin_end();
        self.ending.store(true, Ordering::Release);
        self.stop_notify.notify_waiters();

        let mut workers = self.workers.lock().await;
        for handle in workers.drain(..) {
            let _ = handle.await;
        }
        for _ in self.standard_queue.drain() {}
        for _ in self.lockunlock_queue.drain() {}

        let pending: Vec<u64> = {
            let mut pending = self.pending.lock().expect("pending mutex poisoned");
            pending.drain().map(|(seq, _)| seq).collect()
        };
        for seq in pending {
            let _ = self.stream.release_frame(seq, false).await;
        }
    }

    async fn push_message(&self, msg: Message) {
        let target = match msg.header.data_type {
            DataType::LockProperty | DataType::UnlockProperty => &self.lockunlock_queue,
            _ => &self.standard_queue,
        };
        target.push(msg);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use senscord_proto::{DataType, Header, MessageType, Payload, PropertyReqReply};
    use senscord_sdk::mock::MockStream;
    use senscord_transport::TransportError;
    use std::collections::HashMap;
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

        fn raw_data_for_channel(
            &self,
            _channel_hint: &Channel,
            bytes: Vec<u8>,
        ) -> senscord_proto::RawDataInfo {
            senscord_proto::RawDataInfo::AllData(bytes)
        }
    }

    fn sink_sent(sink: &Arc<RecordingSink>) -> Vec<Message> {
        sink.sent.lock().unwrap().clone()
    }

    #[tokio::test]
    async fn get_property_round_trips_through_the_standard_queue() {
        let mut initial = HashMap::new();
        initial.insert("key_a".to_owned(), b"value".to_vec());
        let stream = MockStream::new(initial);
        let resource_id = stream.resource_id();
        let adapter = StreamResourceAdapter::new(resource_id, stream);
        let sink = RecordingSink::new();
        let dyn_sink: Arc<dyn OutboundSink> = sink.clone();
        adapter.clone().start_monitoring(dyn_sink).await;

        adapter
            .push_message(Message::new(
                Header::new(resource_id, 7, MessageType::Request, DataType::GetProperty),
                Payload::PropertyReqReply(PropertyReqReply {
                    status: MessageStatus::ok(),
                    key: "key_a".into(),
                    property: Vec::new(),
                }),
            ))
            .await;

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        adapter.stop_monitoring().await;

        let sent = sink_sent(&sink);
        assert_eq!(sent.len(), 1);
        match &sent[0].payload {
            Payload::PropertyReqReply(reply) => {
                assert!(reply.status.ok);
                assert_eq!(reply.property, b"value");
            }
            other => panic!("unexpected payload: {:?}", other),
        }
    }

    #[tokio::test]
    async fn registered_event_is_delivered_as_send_event() {
        let stream = MockStream::new(HashMap::new());
        let resource_id = stream.resource_id();
        let adapter = StreamResourceAdapter::new(resource_id, stream.clone());
        let sink = RecordingSink::new();
        let dyn_sink: Arc<dyn OutboundSink> = sink.clone();
        adapter.clone().start_monitoring(dyn_sink).await;

        stream.register_event("error").await;
        stream
            .push_event(senscord_sdk::SdkEvent { event_type: "error".into(), args: HashMap::new() })
            .await;

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        adapter.stop_monitoring().await;

        let sent = sink_sent(&sink);
        assert_eq!(sent.len(), 1);
        match &sent[0].payload {
            Payload::SendEvent(event) => assert_eq!(event.event_type, "error"),
            other => panic!("unexpected payload: {:?}", other),
        }
    }

    #[tokio::test]
    async fn release_frame_for_unknown_sequence_still_replies_ok() {
        let stream = MockStream::new(HashMap::new());
        let resource_id = stream.resource_id();
        let adapter = StreamResourceAdapter::new(resource_id, stream);
        let sink = RecordingSink::new();
        let dyn_sink: Arc<dyn OutboundSink> = sink.clone();
        adapter.clone().start_monitoring(dyn_sink).await;

        adapter
            .push_message(Message::new(
                Header::new(resource_id, 9, MessageType::Request, DataType::ReleaseFrame),
                Payload::ReleaseFrameRequest(ReleaseFrameRequest {
                    sequence_number: 999,
                    rawdata_accessed: true,
                }),
            ))
            .await;

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        adapter.stop_monitoring().await;

        let sent = sink_sent(&sink);
        assert_eq!(sent.len(), 1);
        match &sent[0].payload {
            Payload::StandardReply(reply) => assert!(reply.status.ok),
            other => panic!("unexpected payload: {:?}", other),
        }
    }
}
