use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::models::{RecordChanges, RecordFilter, RecordKind};

#[derive(Debug, Default, Deserialize)]
pub struct RecordQueryParams {
    pub home_id: Option<Uuid>,
    #[serde(default)]
    pub include_inactive: bool,
}

impl From<RecordQueryParams> for RecordFilter {
    fn from(params: RecordQueryParams) -> Self {
        RecordFilter {
            kind: None,
            home_id: params.home_id,
            include_inactive: params.include_inactive,
        }
    }
}

/// `organization_id` defaults to the session's organization when omitted.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateRecordRequest {
    pub organization_id: Option<Uuid>,
    pub home_id: Option<Uuid>,
    #[serde(default = "empty_object")]
    pub data: serde_json::Value,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateRecordRequest {
    pub organization_id: Option<Uuid>,
    pub home_id: Option<Uuid>,
    pub data: Option<serde_json::Value>,
}

impl From<UpdateRecordRequest> for RecordChanges {
    fn from(req: UpdateRecordRequest) -> Self {
        RecordChanges {
            organization_id: req.organization_id,
            home_id: req.home_id,
            data: req.data,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct BypassQueryRequest {
    pub organization_id: Option<Uuid>,
    pub kind: Option<RecordKind>,
    pub home_id: Option<Uuid>,
    #[serde(default)]
    pub include_inactive: bool,
}

impl BypassQueryRequest {
    pub fn filter(&self) -> RecordFilter {
        RecordFilter {
            kind: self.kind,
            home_id: self.home_id,
            include_inactive: self.include_inactive,
        }
    }
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}
