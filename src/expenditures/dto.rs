use serde::{Deserialize, Serialize};
use time::Date;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct DateRange {
    pub start: Date,
    pub end: Date,
}

#[derive(Debug, Serialize)]
pub struct ApprovedCount {
    pub count: u64,
}

#[derive(Debug, Serialize)]
pub struct DeletedExpenditure {
    pub id: Uuid,
}
