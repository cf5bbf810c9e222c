//! Notification port that writes outcomes to the log

use async_trait::async_trait;
use tracing::info;

use crate::core::traits::NotificationPort;
use crate::types::{DeliveryError, TransferData};

#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingNotifier;

#[async_trait]
impl NotificationPort for LoggingNotifier {
    async fn notify_completed(&self, data: &TransferData) -> Result<(), DeliveryError> {
        info!(
            transfer_id = %data.transfer_id,
            origin = %data.origin_account_id,
            target = %data.target_account_number,
            amount = %data.amount,
            "Notify: transfer completed"
        );
        Ok(())
    }

    async fn notify_failed(&self, data: &TransferData, reason: &str) -> Result<(), DeliveryError> {
        info!(
            transfer_id = %data.transfer_id,
            origin = %data.origin_account_id,
            amount = %data.amount,
            reason,
            "Notify: transfer failed"
        );
        Ok(())
    }
}
