/*!
Students and their teacher/class associations.
*/
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::store::Record;

/// Links a student to one teacher teaching one class.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassTeacher {
    #[serde(default)]
    pub teacher_id: String,
    #[serde(default)]
    pub class_id: String,
    #[serde(default)]
    pub is_completed: bool,
}

impl ClassTeacher {
    pub fn new(teacher_id: &str, class_id: &str) -> Self {
        Self {
            teacher_id: teacher_id.to_owned(),
            class_id: class_id.to_owned(),
            is_completed: false,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    /// Document id.
    #[serde(default, skip_serializing)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// The school's own student number; not the document id.
    #[serde(default)]
    pub student_id: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub class_teachers: Vec<ClassTeacher>,
    #[serde(default, with = "crate::dates::stamp::option")]
    pub created_at: Option<OffsetDateTime>,
    #[serde(default, with = "crate::dates::stamp::option")]
    pub updated_at: Option<OffsetDateTime>,
}

impl Student {
    pub fn has_teacher(&self, teacher_id: &str) -> bool {
        self.class_teachers.iter().any(|ct| ct.teacher_id == teacher_id)
    }

    /// Class ids of every association with `teacher_id`, in association order.
    pub fn class_ids_for_teacher<'a>(
        &'a self,
        teacher_id: &'a str
    ) -> impl Iterator<Item = &'a str> + 'a {
        self.class_teachers.iter()
            .filter(move |ct| ct.teacher_id == teacher_id)
            .map(|ct| ct.class_id.as_str())
    }

    /// Flags every association with `class_id` as completed. Returns how many
    /// associations matched.
    pub fn complete_class(&mut self, class_id: &str) -> usize {
        let mut n = 0;
        for ct in self.class_teachers.iter_mut() {
            if ct.class_id == class_id {
                ct.is_completed = true;
                n += 1;
            }
        }
        n
    }
}

impl Record for Student {
    const KIND: &'static str = "Student";

    fn with_id(mut self, id: String) -> Self {
        self.id = id;
        self
    }
}

/// Fields for a new student; the optional ones default to blank.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewStudent {
    pub name: String,
    pub student_id: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub class_teachers: Option<Vec<ClassTeacher>>,
}

/// A partial update; only the fields that are `Some` get written.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_teachers: Option<Vec<ClassTeacher>>,
}
