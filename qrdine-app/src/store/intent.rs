//! Compensating-action intent log
//!
//! 多步写入 (订单 header + items、整菜单替换) 没有事务保证。后一步失败时
//! 立即执行补偿；补偿本身失败则记入意图日志，由 `retry_compensations` 重放。

use chrono::Utc;
use qrdine_client::ClientResult;

use super::{AppContext, Compensation, PendingCompensation};

impl AppContext {
    async fn run_compensation(&self, compensation: &Compensation) -> ClientResult<()> {
        match compensation {
            Compensation::DeleteOrder { order_id } => self.backend.delete_order(order_id).await,
            Compensation::RestoreMenu { items, .. } => {
                self.backend.insert_menu_items(items).await.map(|_| ())
            }
        }
    }

    /// Run a compensation now; log it as pending if it fails
    pub(crate) async fn compensate(&self, compensation: Compensation) -> bool {
        match self.run_compensation(&compensation).await {
            Ok(()) => {
                tracing::info!(compensation = ?compensation, "Compensation applied");
                true
            }
            Err(e) => {
                tracing::error!(compensation = ?compensation, error = %e, "Compensation failed, recorded for retry");
                self.state
                    .write()
                    .await
                    .pending_compensations
                    .push(PendingCompensation {
                        compensation,
                        last_error: e.to_string(),
                        attempts: 1,
                        recorded_at: Utc::now(),
                    });
                false
            }
        }
    }

    pub async fn pending_compensations(&self) -> Vec<PendingCompensation> {
        self.state.read().await.pending_compensations.clone()
    }

    /// Replay logged compensations in order
    ///
    /// Entries that fail again stay in the log with their attempt count
    /// bumped. Returns how many entries were resolved.
    pub async fn retry_compensations(&self) -> usize {
        let pending = std::mem::take(&mut self.state.write().await.pending_compensations);
        if pending.is_empty() {
            return 0;
        }

        let mut resolved = 0;
        let mut menu_restored = false;
        let mut remaining = Vec::new();
        for mut entry in pending {
            match self.run_compensation(&entry.compensation).await {
                Ok(()) => {
                    tracing::info!(compensation = ?entry.compensation, attempts = entry.attempts + 1, "Pending compensation resolved");
                    resolved += 1;
                    menu_restored |= matches!(entry.compensation, Compensation::RestoreMenu { .. });
                }
                Err(e) => {
                    entry.attempts += 1;
                    entry.last_error = e.to_string();
                    remaining.push(entry);
                }
            }
        }

        {
            let mut state = self.state.write().await;
            // 重放期间新记录的条目排在后面
            remaining.append(&mut state.pending_compensations);
            state.pending_compensations = remaining;
        }

        if menu_restored && let Err(e) = self.refresh_menu().await {
            tracing::warn!(error = %e, "Menu refresh after restore failed");
        }
        resolved
    }
}
