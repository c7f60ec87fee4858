//! Stores - 状態の所有者
//!
//! - **TaskStore**: タスクとペンディングキュー
//! - **NodeRegistry**: ワーカーノードと生存状態
//!
//! # 設計原則
//! - 各 store は自分のロックを 1 つだけ持つ
//! - 1 操作 = 1 回のロック取得で check-and-transition を完結させる
//! - 2 つの store のロックを同時に保持しない（跨ぐ処理は Coordinator が順に呼ぶ）

pub mod node_registry;
pub mod task_store;

pub use self::node_registry::{DeadNode, NodeCounts, NodeRegistry};
pub use self::task_store::{Requeue, TaskCounts, TaskStore, TaskStoreSnapshot};
