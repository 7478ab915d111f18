//! [`StatusStore`](centinela_core::store::StatusStore) 백엔드
//!
//! - [`MemoryStatusStore`]: 단일 프로세스용 인메모리 저장소
//! - [`SqliteStatusStore`]: 여러 프로세스가 공유하는 sqlite 저장소

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStatusStore;
pub use sqlite::SqliteStatusStore;
