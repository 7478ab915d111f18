//! [`TaskQueue`](centinela_core::queue::TaskQueue) 백엔드
//!
//! - [`MemoryTaskQueue`]: 단일 프로세스용 채널 큐
//! - [`SqliteTaskQueue`]: 임대(lease) 기반 sqlite 큐, 프로세스 간 공유

pub mod memory;
pub mod sqlite;

pub use memory::MemoryTaskQueue;
pub use sqlite::SqliteTaskQueue;
