//! Buzzer control on the ESP32-CAM.

use crate::camera::{Esp32Cam, PeripheralError};
use std::time::Duration;

/// Reply body the camera sends when a command was accepted.
const ACK: &str = "OK";

impl Esp32Cam {
    /// Sound the buzzer for `duration`.
    ///
    /// Single attempt; succeeds only if the camera replies with exactly `OK`.
    pub async fn sound_buzzer(&self, duration: Duration) -> Result<(), PeripheralError> {
        let url = format!(
            "{}/control?cmd=buzzer&duration={}",
            self.base_url(),
            duration.as_millis()
        );
        tracing::debug!(%url, "activating buzzer");

        let reply = self
            .client()
            .get(url)
            .timeout(self.timeout())
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        if reply == ACK {
            Ok(())
        } else {
            Err(PeripheralError::UnexpectedReply(reply))
        }
    }
}
