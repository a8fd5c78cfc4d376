/*!
`Store` methods for students, including the teacher-scoped roster queries.
*/
use std::collections::HashSet;

use futures::stream::{FuturesUnordered, StreamExt};
use serde_json::{json, Value};

use super::*;
use crate::{
    class::Class,
    student::{NewStudent, Student, StudentUpdate},
};

impl Store {
    pub async fn create_student(&self, s: NewStudent) -> Result<String, Error> {
        log::trace!("Store::create_student( {:?} ) called.", &s);

        let now = now_value()?;
        let data = json!({
            "name": s.name,
            "studentId": s.student_id,
            "email": s.email.unwrap_or_default(),
            "phone": s.phone.unwrap_or_default(),
            "classTeachers": s.class_teachers.unwrap_or_default(),
            "createdAt": now.clone(),
            "updatedAt": now,
        });

        let id = self.docs.add(STUDENTS, data).await?;
        log::trace!("Inserted Student {:?}.", &id);
        Ok(id)
    }

    pub async fn update_student(&self, id: &str, u: &StudentUpdate) -> Result<(), Error> {
        log::trace!("Store::update_student( {:?}, {:?} ) called.", id, u);

        let mut fields = to_object(u)?;
        as_object(&mut fields)?.insert("updatedAt".to_owned(), now_value()?);

        self.docs.update(STUDENTS, id, fields).await
            .map_err(|e| e.annotate(&format!("Unable to update Student {:?}", id)))?;
        Ok(())
    }

    pub async fn get_student(&self, id: &str) -> Result<Option<Student>, Error> {
        log::trace!("Store::get_student( {:?} ) called.", id);
        self.fetch(STUDENTS, id).await
    }

    /// All students, ordered by name.
    pub async fn get_students(&self) -> Result<Vec<Student>, Error> {
        log::trace!("Store::get_students() called.");

        let q = Query::new(STUDENTS).order_by("name", Direction::Asc);
        self.fetch_all(&q).await
    }

    /**
    Flag every one of the student's associations with `class_id` as
    completed, leaving the rest alone.

    The read and the write-back happen as one atomic step on the student
    document.
    */
    pub async fn mark_student_completed(
        &self,
        id: &str,
        class_id: &str
    ) -> Result<(), Error> {
        log::trace!("Store::mark_student_completed( {:?}, {:?} ) called.", id, class_id);

        let stamp = now_value()?;
        let doc_id = id.to_owned();
        let class_id = class_id.to_owned();

        let found = self.docs.modify(STUDENTS, id, Box::new(move |mut data: Value| -> Result<Value, DbError> {
            let mut s: Student = Doc { id: doc_id, data: data.clone() }.decode()?;
            let n = s.complete_class(&class_id);
            if n == 0 {
                log::warn!(
                    "Student {:?} has no association with class {:?}.",
                    &s.id, &class_id
                );
            }

            let map = as_object(&mut data)?;
            map.insert("classTeachers".to_owned(), serde_json::to_value(&s.class_teachers)?);
            map.insert("updatedAt".to_owned(), stamp);
            Ok(data)
        })).await?;

        if found {
            Ok(())
        } else {
            Err(Error::not_found("Student", id))
        }
    }

    /**
    Delete a student along with their fee and attendance records.

    Fee records go first, then attendance records, then the student. Each
    group is deleted concurrently. This is not a transaction: if a step fails,
    the steps before it stay done and the error is returned.

    Returns the number of (fee, attendance) records removed.
    */
    pub async fn delete_student(&self, id: &str) -> Result<(usize, usize), Error> {
        log::trace!("Store::delete_student( {:?} ) called.", id);

        let fee_ids = self.matching_ids(&Query::new(FEES).eq("studentId", id)).await?;
        let n_fees = self.delete_all(FEES, &fee_ids).await
            .map_err(|e| e.annotate(&format!("Deleting fee records of Student {:?}", id)))?;

        let att_ids = self.matching_ids(&Query::new(ATTENDANCE).eq("studentId", id)).await?;
        let n_att = self.delete_all(ATTENDANCE, &att_ids).await
            .map_err(|e| e.annotate(&format!("Deleting attendance records of Student {:?}", id)))?;

        self.docs.delete(STUDENTS, id).await?;

        log::trace!(
            "Deleted Student {:?} with {} fee and {} attendance records.",
            id, n_fees, n_att
        );
        Ok((n_fees, n_att))
    }

    async fn delete_all(&self, collection: &str, ids: &[String]) -> Result<usize, DbError> {
        let mut deletes = FuturesUnordered::new();
        for id in ids.iter() {
            deletes.push(self.docs.delete(collection, id));
        }

        let mut n_deleted: usize = 0;
        while let Some(res) = deletes.next().await {
            match res {
                Ok(_) => { n_deleted += 1; },
                Err(e) => {
                    log::error!(
                        "Error deleting from {:?} after {} deletions: {}",
                        collection, n_deleted, &e
                    );
                    return Err(e);
                },
            }
        }

        Ok(n_deleted)
    }

    /// Students with at least one association with `teacher_id`, ordered by
    /// name.
    pub async fn students_for_teacher(&self, teacher_id: &str) -> Result<Vec<Student>, Error> {
        log::trace!("Store::students_for_teacher( {:?} ) called.", teacher_id);

        let students = self.get_students().await?;
        Ok(students.into_iter()
            .filter(|s| s.has_teacher(teacher_id))
            .collect())
    }

    /// Classes `teacher_id` teaches to at least one student.
    pub async fn classes_for_teacher(&self, teacher_id: &str) -> Result<Vec<Class>, Error> {
        log::trace!("Store::classes_for_teacher( {:?} ) called.", teacher_id);

        let students = self.students_for_teacher(teacher_id).await?;
        let class_ids: HashSet<&str> = students.iter()
            .flat_map(|s| s.class_ids_for_teacher(teacher_id))
            .collect();

        let classes: Vec<Class> = self.fetch_all(&Query::new(CLASSES)).await?;
        Ok(classes.into_iter()
            .filter(|c| class_ids.contains(c.id.as_str()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::mem_store;
    use crate::student::ClassTeacher;
    use crate::tests::ensure_logging;

    use time::macros::date;

    fn new_student(name: &str, links: &[(&str, &str)]) -> NewStudent {
        NewStudent {
            name: name.to_owned(),
            student_id: format!("ID-{}", name),
            class_teachers: Some(
                links.iter().map(|(t, c)| ClassTeacher::new(t, c)).collect()
            ),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn create_fills_defaults_and_stamps() {
        ensure_logging();
        let db = mem_store();

        let id = db.create_student(NewStudent {
            name: "Kofi".to_owned(),
            student_id: "S-1".to_owned(),
            ..Default::default()
        }).await.unwrap();

        let s = db.get_student(&id).await.unwrap().unwrap();
        assert_eq!(s.id, id);
        assert_eq!(s.name, "Kofi");
        assert_eq!(s.email, "");
        assert_eq!(s.phone, "");
        assert!(s.class_teachers.is_empty());
        assert!(s.created_at.is_some());
        assert_eq!(s.created_at, s.updated_at);

        assert!(db.get_student("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_merges_and_restamps() {
        ensure_logging();
        let db = mem_store();

        let id = db.create_student(new_student("Ama", &[("t1", "c1")])).await.unwrap();
        let before = db.get_student(&id).await.unwrap().unwrap();

        db.update_student(&id, &StudentUpdate {
            phone: Some("555-0199".to_owned()),
            ..Default::default()
        }).await.unwrap();

        let after = db.get_student(&id).await.unwrap().unwrap();
        assert_eq!(after.phone, "555-0199");
        assert_eq!(after.name, "Ama");
        assert_eq!(after.class_teachers, before.class_teachers);
        assert_eq!(after.created_at, before.created_at);
        assert!(after.updated_at >= before.updated_at);

        assert!(db.update_student("nobody", &StudentUpdate::default()).await.is_err());
    }

    #[tokio::test]
    async fn students_come_back_by_name() {
        ensure_logging();
        let db = mem_store();

        for name in ["Zainab", "Bola", "Musa"] {
            db.create_student(new_student(name, &[])).await.unwrap();
        }
        let names: Vec<String> = db.get_students().await.unwrap()
            .into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["Bola", "Musa", "Zainab"]);
    }

    #[tokio::test]
    async fn completion() {
        ensure_logging();
        let db = mem_store();

        let id = db.create_student(
            new_student("Efe", &[("t1", "math"), ("t2", "art"), ("t3", "math")])
        ).await.unwrap();

        db.mark_student_completed(&id, "math").await.unwrap();
        let s = db.get_student(&id).await.unwrap().unwrap();
        let flags: Vec<bool> = s.class_teachers.iter().map(|ct| ct.is_completed).collect();
        assert_eq!(flags, vec![true, false, true]);

        match db.mark_student_completed("nobody", "math").await {
            Err(Error::NotFound { kind, id }) => {
                assert_eq!(kind, "Student");
                assert_eq!(id, "nobody");
            },
            x => panic!("expected NotFound, got {:?}", x),
        }
    }

    #[tokio::test]
    async fn delete_cascades() {
        ensure_logging();
        let db = mem_store();

        let doomed = db.create_student(new_student("Ngozi", &[("t1", "c1")])).await.unwrap();
        let spared = db.create_student(new_student("Tunde", &[("t1", "c1")])).await.unwrap();

        for who in [&doomed, &spared] {
            db.create_fee_record(who, 300.0, "Term 1").await.unwrap();
            db.create_fee_record(who, 50.0, "Books").await.unwrap();
        }
        db.create_fee_record(&doomed, 20.0, "Trip").await.unwrap();
        for d in [date!(2024-01-08), date!(2024-01-09)] {
            db.mark_attendance("t1", &doomed, d, true).await.unwrap();
            db.mark_attendance("t1", &spared, d, false).await.unwrap();
        }

        let (n_fees, n_att) = db.delete_student(&doomed).await.unwrap();
        assert_eq!((n_fees, n_att), (3, 2));

        assert!(db.get_student(&doomed).await.unwrap().is_none());
        assert!(db.fee_records_for_student(&doomed).await.unwrap().is_empty());
        assert!(db.attendance_for_student(
            &doomed, date!(2024-01-01), date!(2024-12-31)
        ).await.unwrap().is_empty());

        assert!(db.get_student(&spared).await.unwrap().is_some());
        assert_eq!(db.fee_records_for_student(&spared).await.unwrap().len(), 2);
        assert_eq!(db.attendance_for_student(
            &spared, date!(2024-01-01), date!(2024-12-31)
        ).await.unwrap().len(), 2);

        // Nothing left to cascade to.
        assert_eq!(db.delete_student(&doomed).await.unwrap(), (0, 0));
    }

    #[tokio::test]
    async fn teacher_scoping() {
        ensure_logging();
        let db = mem_store();

        let math = db.create_class("Mathematics", "JSS1").await.unwrap();
        let art = db.create_class("Art", "JSS1").await.unwrap();
        let music = db.create_class("Music", "JSS2").await.unwrap();

        let layout: &[(&str, &[(&str, &str)])] = &[
            ("Adaeze", &[("t1", math.as_str()), ("t2", art.as_str())]),
            ("Bayo", &[("t2", art.as_str())]),
            ("Chidi", &[]),
            ("Dami", &[("t2", music.as_str()), ("t1", math.as_str())]),
            ("Eko", &[("t3", music.as_str())]),
        ];
        for (name, links) in layout.iter() {
            db.create_student(new_student(name, links)).await.unwrap();
        }

        for teacher in ["t1", "t2", "t3", "t4"] {
            let expected: Vec<&str> = layout.iter()
                .filter(|(_, links)| links.iter().any(|(t, _)| *t == teacher))
                .map(|(name, _)| *name)
                .collect();
            let got: Vec<String> = db.students_for_teacher(teacher).await.unwrap()
                .into_iter().map(|s| s.name).collect();
            assert_eq!(got, expected, "students of {}", teacher);
        }

        let mut t2_classes: Vec<String> = db.classes_for_teacher("t2").await.unwrap()
            .into_iter().map(|c| c.name).collect();
        t2_classes.sort();
        assert_eq!(t2_classes, vec!["Art", "Music"]);

        let t1_classes = db.classes_for_teacher("t1").await.unwrap();
        assert_eq!(t1_classes.len(), 1);
        assert_eq!(t1_classes[0].id, math);

        assert!(db.classes_for_teacher("t4").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn sloppy_documents_do_not_break_listings() {
        ensure_logging();
        let db = mem_store();
        let math = db.create_class("Math", "JSS1").await.unwrap();
        db.create_student(new_student("Ada", &[("t1", math.as_str())])).await.unwrap();
        db.docs.add(STUDENTS, json!({
            "name": "Bola",
            "classTeachers": [ { "teacherId": "t1" }, { "classId": math } ],
        })).await.unwrap();

        let names: Vec<String> = db.get_students().await.unwrap()
            .into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["Ada", "Bola"]);

        assert_eq!(db.students_for_teacher("t1").await.unwrap().len(), 2);
        let classes = db.classes_for_teacher("t1").await.unwrap();
        assert_eq!(classes.len(), 1);
        assert_eq!(classes[0].id, math);
    }
}
