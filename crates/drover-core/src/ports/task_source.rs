//! TaskSource port - 上流データからタスクを生成するフック
//!
//! スケジューラの tick ごとに呼ばれ、新しい payload のバッチを返す。
//! 「新しいデータがない」は正常系（`Ok(None)` または空の Vec）。

use async_trait::async_trait;
use thiserror::Error;

/// Failure of the upstream source. Logged by the scheduler, never fatal.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("upstream unavailable: {0}")]
    Unavailable(String),

    #[error("{0}")]
    Other(String),
}

/// TaskSource は上流データから payload を供給
///
/// # 設計原則
/// - store のロックを保持した状態では呼ばれない（I/O してよい）
/// - `limit` はその tick で作ってよいタスク数の上限
/// - payload の中身は core からは不透明
#[async_trait]
pub trait TaskSource: Send + Sync {
    async fn next_batch(&self, limit: usize)
    -> Result<Option<Vec<serde_json::Value>>, SourceError>;
}
