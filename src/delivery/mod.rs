//! Report delivery.

pub mod email;

pub use email::{EmailConfig, SmtpDelivery};

use async_trait::async_trait;

use crate::error::DeliveryError;
use crate::report::DailyReport;

/// Sends a finished report to the user.
#[async_trait]
pub trait Delivery: Send + Sync {
    fn name(&self) -> &str;

    async fn deliver(&self, report: &DailyReport) -> Result<(), DeliveryError>;
}
