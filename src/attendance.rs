/*!
Daily attendance marks.
*/
use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};

use crate::store::Record;

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    #[serde(default, skip_serializing)]
    pub id: String,
    pub student_id: String,
    pub teacher_id: String,
    #[serde(with = "crate::dates::day")]
    pub date: Date,
    pub present: bool,
    #[serde(default, with = "crate::dates::stamp::option")]
    pub updated_at: Option<OffsetDateTime>,
}

impl Record for AttendanceRecord {
    const KIND: &'static str = "Attendance record";

    fn with_id(mut self, id: String) -> Self {
        self.id = id;
        self
    }
}

/// Document id of the mark for one student, day, and teacher. Writing to the
/// same id again replaces the mark.
pub fn record_id(student_id: &str, day: &str, teacher_id: &str) -> String {
    format!("{}_{}_{}", student_id, day, teacher_id)
}
