mod fps_meter;
mod master_slave;
mod queue;

pub use fps_meter::FpsMeter;
pub use master_slave::{MasterSlaveSyncPolicy, SyncedGroup, TimedItem};
pub use queue::{BoundedDropOldest, PushOutcome, SyncEventQueue, SyncFrameQueue};
