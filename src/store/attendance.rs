/*!
`Store` methods for attendance marks.

Each mark is keyed by (student, day, teacher), so marking again overwrites
rather than duplicates.
*/
use serde_json::json;
use time::Date;

use super::*;
use crate::{
    attendance::{record_id, AttendanceRecord},
    dates::format_day,
};

impl Store {
    pub async fn mark_attendance(
        &self,
        teacher_id: &str,
        student_id: &str,
        date: Date,
        present: bool,
    ) -> Result<(), Error> {
        log::trace!(
            "Store::mark_attendance( {:?}, {:?}, {}, {} ) called.",
            teacher_id, student_id, &date, present
        );

        let day = format_day(&date).map_err(DbError::from)?;
        let id = record_id(student_id, &day, teacher_id);
        let data = json!({
            "studentId": student_id,
            "teacherId": teacher_id,
            "date": day,
            "present": present,
            "updatedAt": now_value()?,
        });

        self.docs.set(ATTENDANCE, &id, data).await?;
        Ok(())
    }

    /// A student's marks from every teacher with `start <= date <= end`,
    /// latest day first.
    pub async fn attendance_for_student(
        &self,
        student_id: &str,
        start: Date,
        end: Date,
    ) -> Result<Vec<AttendanceRecord>, Error> {
        log::trace!(
            "Store::attendance_for_student( {:?}, {}, {} ) called.",
            student_id, &start, &end
        );

        let q = Query::new(ATTENDANCE)
            .eq("studentId", student_id)
            .gte("date", format_day(&start).map_err(DbError::from)?)
            .lte("date", format_day(&end).map_err(DbError::from)?)
            .order_by("date", Direction::Desc);
        self.fetch_all(&q).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::mem_store;
    use crate::tests::ensure_logging;

    use time::macros::date;

    #[tokio::test]
    async fn marking_again_overwrites() {
        ensure_logging();
        let db = mem_store();

        db.mark_attendance("t1", "s1", date!(2024-03-04), true).await.unwrap();
        db.mark_attendance("t1", "s1", date!(2024-03-04), false).await.unwrap();

        let marks = db.attendance_for_student(
            "s1", date!(2024-03-04), date!(2024-03-04)
        ).await.unwrap();
        assert_eq!(marks.len(), 1);
        assert_eq!(marks[0].id, "s1_2024-03-04_t1");
        assert!(!marks[0].present);
        assert!(marks[0].updated_at.is_some());

        // A different teacher on the same day is a separate mark.
        db.mark_attendance("t2", "s1", date!(2024-03-04), true).await.unwrap();
        let marks = db.attendance_for_student(
            "s1", date!(2024-03-01), date!(2024-03-31)
        ).await.unwrap();
        assert_eq!(marks.len(), 2);
    }

    #[tokio::test]
    async fn range_is_inclusive_and_descending() {
        ensure_logging();
        let db = mem_store();

        for (d, present) in [
            (date!(2024-02-28), true),
            (date!(2024-03-01), false),
            (date!(2024-03-05), true),
            (date!(2024-03-06), true),
        ] {
            db.mark_attendance("t1", "s1", d, present).await.unwrap();
        }
        db.mark_attendance("t1", "s2", date!(2024-03-02), true).await.unwrap();

        let days: Vec<Date> = db.attendance_for_student(
            "s1", date!(2024-03-01), date!(2024-03-05)
        ).await.unwrap()
            .into_iter().map(|a| a.date).collect();
        assert_eq!(days, vec![date!(2024-03-05), date!(2024-03-01)]);

        assert!(db.attendance_for_student(
            "s1", date!(2024-04-01), date!(2024-03-01)
        ).await.unwrap().is_empty());
    }
}
