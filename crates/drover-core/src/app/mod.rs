//! App - アプリケーション層
//!
//! store と ports を組み合わせてコーディネータのロジックを実装します。
//!
//! # 主要コンポーネント
//! - **Coordinator**: transport 層が呼ぶファサード（heartbeat / request_task / submit_result / get_status）
//! - **SchedulerLoop**: dead-node sweep → timeout sweep → タスク生成 を定期実行
//! - **StatusSnapshot**: 両 store の読み取り専用スナップショット

pub mod coordinator;
pub mod scheduler_loop;
pub mod status;

// 主要な型を再エクスポート
pub use self::coordinator::{Coordinator, DeadSweep};
pub use self::scheduler_loop::{SchedulerHandle, SchedulerLoop, TickReport};
pub use self::status::{NodeSummary, StatusSnapshot, TaskSummary};
