//! Notification texts (HTML parse mode).

use cctv_core::types::{Age, FaceResult};
use chrono::NaiveDateTime;

pub const ONLINE_MESSAGE: &str = "✅ IoT CCTV System is ONLINE";
pub const OFFLINE_MESSAGE: &str = "❌ IoT CCTV System is OFFLINE";
pub const TEST_MESSAGE: &str = "🧪 This is a test notification from IoT CCTV";

/// Per-face summary of one detection, stamped with `now`.
pub fn faces_message(faces: &[FaceResult], now: NaiveDateTime) -> String {
    let mut msg = format!("👥 People detected: {} faces in frame\n\n", faces.len());
    for (i, face) in faces.iter().enumerate() {
        let age = match face.age {
            Age::Years(y) => y.to_string(),
            Age::Unknown => "-".to_string(),
        };
        msg.push_str(&format!("<b>Wajah {}</b>\n", i + 1));
        msg.push_str(&format!("Wajah : {}\n", face.name));
        msg.push_str(&format!("Usia : {age}\n"));
        msg.push_str(&format!("Gender : {}\n", face.gender.as_str()));
        msg.push_str(&format!("Masker : {}\n", face.mask.as_str()));
        msg.push_str(&format!(
            "Keyakinan : {}%\n\n",
            (face.face_confidence * 100.0).round() as i32
        ));
    }
    msg.push_str(&format!("Waktu : {}", now.format("%Y-%m-%d %H:%M:%S")));
    msg
}

pub fn system_status_message(online: bool) -> &'static str {
    if online {
        ONLINE_MESSAGE
    } else {
        OFFLINE_MESSAGE
    }
}
