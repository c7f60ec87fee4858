//! drover-core
//!
//! Task/node lifecycle coordinator for a small fleet of worker nodes.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, task, node）
//! - **store**: 状態の所有者（TaskStore, NodeRegistry）
//! - **ports**: 抽象化レイヤー（Clock, TaskSource）
//! - **app**: アプリケーションロジック（Coordinator, SchedulerLoop, StatusSnapshot）
//! - **protocol**: ワーカーノードとの JSON 形式
//! - **config**: 設定
//! - **error**: エラー型

pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod ports;
pub mod protocol;
pub mod store;

pub use app::{Coordinator, SchedulerHandle, SchedulerLoop, StatusSnapshot, TickReport};
pub use config::DroverConfig;
pub use error::{DroverError, Result};
