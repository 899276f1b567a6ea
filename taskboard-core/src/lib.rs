/// Taskboard core: board model, drag-and-drop reorder engine, persistence
/// reconciliation and the filter overlay. No UI and no network code here;
/// stores plug in through [`storage::BoardStore`].
pub mod config;
pub mod filter;
pub mod hierarchy;
pub mod position;
pub mod reconcile;
pub mod reorder;
pub mod session;
pub mod storage;
pub mod types;

pub use filter::CardFilter;
pub use reorder::{BoardState, DragEvent, DragItem, DropTarget};
pub use session::BoardSession;
pub use storage::{BoardStore, StoreError};
