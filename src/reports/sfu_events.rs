use serde::Serialize;

use crate::models::Sfu;
use crate::samples::CustomSfuEvent;
use crate::time::Timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SfuEventType {
    SfuJoined,
    SfuLeft,
}

impl SfuEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SfuEventType::SfuJoined => "SFU_JOINED",
            SfuEventType::SfuLeft => "SFU_LEFT",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SfuEventReport {
    pub name: String,
    pub service_id: String,
    pub media_unit_id: String,
    pub sfu_id: String,
    pub transport_id: Option<String>,
    pub sfu_stream_id: Option<String>,
    pub sfu_sink_id: Option<String>,
    pub value: Option<String>,
    pub message: Option<String>,
    pub attachments: Option<String>,
    pub marker: Option<String>,
    pub timestamp: Timestamp,
}

impl SfuEventReport {
    pub fn sfu_joined(
        sfu: &Sfu,
        timestamp: Timestamp,
    ) -> Self {
        Self::for_sfu(SfuEventType::SfuJoined.as_str().to_string(), sfu, timestamp)
    }

    pub fn sfu_left(
        sfu: &Sfu,
        timestamp: Timestamp,
    ) -> Self {
        Self::for_sfu(SfuEventType::SfuLeft.as_str().to_string(), sfu, timestamp)
    }

    pub fn custom(
        sfu: &Sfu,
        event: &CustomSfuEvent,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            transport_id: event.transport_id.clone(),
            sfu_stream_id: event.sfu_stream_id.clone(),
            sfu_sink_id: event.sfu_sink_id.clone(),
            value: event.value.clone(),
            message: event.message.clone(),
            attachments: event.attachments.clone(),
            timestamp: event.timestamp.unwrap_or(timestamp),
            ..Self::for_sfu(event.name.clone(), sfu, timestamp)
        }
    }

    fn for_sfu(
        name: String,
        sfu: &Sfu,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            name,
            service_id: sfu.service_id.clone(),
            media_unit_id: sfu.media_unit_id.clone(),
            sfu_id: sfu.sfu_id.clone(),
            marker: sfu.marker.clone(),
            timestamp,
            ..Default::default()
        }
    }
}
