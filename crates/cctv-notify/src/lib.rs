//! cctv-notify: Telegram alerts for the IoT CCTV daemon.
//!
//! Detection summaries go out as HTML-formatted photo captions when the
//! annotated frame is on disk, plain messages otherwise.

pub mod message;
pub mod telegram;

pub use telegram::{NotifyError, TelegramNotifier};
