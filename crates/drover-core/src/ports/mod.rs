//! Ports - 抽象化レイヤー
//!
//! core が外部の協力者に求めるインターフェース。
//!
//! - **Clock**: `now` の供給源（テストでは差し替える）
//! - **TaskSource**: scheduler tick から呼ばれるタスク生成フック

pub mod clock;
pub mod task_source;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::task_source::{SourceError, TaskSource};
