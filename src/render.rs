/*!
Writing records into page targets.

A [`Page`] stands in for a document: elements keyed by selector, each with
some markup, some text, a class list, and maybe a chart; plus a location that
guards can redirect. Markup comes from handlebars templates, which escape
everything they interpolate.

The renderers here never fail outward. Fetch errors are logged and shown in
the page instead.
*/
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use handlebars::Handlebars;
use once_cell::sync::OnceCell;
use serde::Serialize;
use serde_json::json;
use tokio::sync::{watch, RwLock};

use crate::{store::Store, Error};

static TEMPLATES: OnceCell<Handlebars> = OnceCell::new();

/// Name of the category for students with no (known) class.
pub const UNKNOWN_CLASS: &str = "Unknown";
pub const CHART_LABEL: &str = "Students per Class";
pub const CHART_COLOR: &str = "#dc2626";

static STATUS_ROW: &str = r#"<tr><td class="p-3{{#if error}} text-red-600{{/if}}">{{message}}</td></tr>"#;

static STUDENT_ROWS: &str = r#"{{#each rows}}
<tr class="border-t hover:bg-gray-50">
  <td class="p-3">{{this.display_id}}</td>
  <td class="p-3"><a class="text-primary hover:underline" href="student-profile.html?id={{this.id}}">{{this.name}}</a></td>
  <td class="p-3">{{this.classes}}</td>
</tr>{{/each}}"#;

fn builtin_templates() -> Result<Handlebars<'static>, String> {
    let mut h = Handlebars::new();
    for (name, text) in [("status_row", STATUS_ROW), ("student_rows", STUDENT_ROWS)] {
        h.register_template_string(name, text)
            .map_err(|e| format!("Error registering built-in template {:?}: {}", name, &e))?;
    }
    Ok(h)
}

/**
Load the templates used by the renderers.

The built-in templates are always registered; if `template_dir` is given,
any `.html` templates found there replace the built-ins of the same name.
Without a call to this, the first render loads just the built-ins.
*/
pub fn init(template_dir: Option<&Path>) -> Result<(), String> {
    if TEMPLATES.get().is_some() {
        log::warn!("Templates already initialized; ignoring.");
        return Ok(());
    }

    let mut h = builtin_templates()?;
    if let Some(dir) = template_dir {
        h.register_templates_directory(".html", dir)
            .map_err(|e| format!(
                "Error registering templates directory {}: {}",
                dir.display(), &e
            ))?;
    }

    TEMPLATES.set(h)
        .map_err(|_| "Templates initialized concurrently.".to_owned())
}

fn render_template<S: Serialize + std::fmt::Debug>(name: &str, data: &S) -> Result<String, String> {
    log::trace!("render_template( {:?}, ... ) called.", name);

    let h = TEMPLATES.get_or_try_init(builtin_templates)?;
    h.render(name, data).map_err(|e| {
        let estr = format!("Error rendering template {:?} with data {:?}: {}", name, data, &e);
        log::error!("{}", &estr);
        estr
    })
}

fn status_row(message: &str, error: bool) -> String {
    render_template("status_row", &json!({ "message": message, "error": error }))
        .unwrap_or_default()
}

/// A bar chart, shaped the way browser charting libraries take their config.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Chart {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: ChartData,
    pub options: ChartOptions,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChartData {
    pub labels: Vec<String>,
    pub datasets: Vec<Dataset>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dataset {
    pub label: String,
    pub data: Vec<usize>,
    pub background_color: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChartOptions {
    pub responsive: bool,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Element {
    pub html: String,
    pub text: String,
    pub classes: BTreeSet<String>,
    pub chart: Option<Chart>,
}

pub struct Page {
    elements: RwLock<HashMap<String, Element>>,
    location: watch::Sender<String>,
    redirects: AtomicUsize,
}

impl std::fmt::Debug for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Page")
            .field("location", &*self.location.borrow())
            .field("redirects", &self.redirects.load(Ordering::SeqCst))
            .finish()
    }
}

impl Page {
    pub fn new(location: &str) -> Self {
        Self::with_elements(location, &[])
    }

    /// A page at `location` holding an empty element for each selector.
    pub fn with_elements(location: &str, selectors: &[&str]) -> Self {
        let elements: HashMap<String, Element> = selectors.iter()
            .map(|s| (s.to_string(), Element::default()))
            .collect();
        let (location, _) = watch::channel(location.to_owned());

        Self {
            elements: RwLock::new(elements),
            location,
            redirects: AtomicUsize::new(0),
        }
    }

    pub async fn add_element(&self, selector: &str) {
        self.elements.write().await
            .entry(selector.to_owned())
            .or_default();
    }

    pub async fn has_element(&self, selector: &str) -> bool {
        self.elements.read().await.contains_key(selector)
    }

    pub async fn element(&self, selector: &str) -> Option<Element> {
        self.elements.read().await.get(selector).cloned()
    }

    /// Apply `f` to the element at `selector`; `false` if there isn't one.
    async fn with_element<F: FnOnce(&mut Element)>(&self, selector: &str, f: F) -> bool {
        match self.elements.write().await.get_mut(selector) {
            Some(elt) => { f(elt); true },
            None => false,
        }
    }

    pub async fn set_html(&self, selector: &str, html: String) -> bool {
        self.with_element(selector, |e| e.html = html).await
    }

    pub async fn set_text(&self, selector: &str, text: String) -> bool {
        self.with_element(selector, |e| e.text = text).await
    }

    pub async fn add_class(&self, selector: &str, class: &str) -> bool {
        self.with_element(selector, |e| { e.classes.insert(class.to_owned()); }).await
    }

    pub async fn remove_class(&self, selector: &str, class: &str) -> bool {
        self.with_element(selector, |e| { e.classes.remove(class); }).await
    }

    pub async fn set_chart(&self, selector: &str, chart: Chart) -> bool {
        self.with_element(selector, |e| e.chart = Some(chart)).await
    }

    pub fn location(&self) -> String { self.location.borrow().clone() }

    pub fn redirect(&self, to: &str) {
        let from = self.location();
        log::debug!("Redirecting from {:?} to {:?}.", &from, to);
        self.redirects.fetch_add(1, Ordering::SeqCst);
        self.location.send_replace(to.to_owned());
    }

    /// How many redirects this page has seen.
    pub fn redirect_count(&self) -> usize { self.redirects.load(Ordering::SeqCst) }

    pub fn watch_location(&self) -> watch::Receiver<String> {
        self.location.subscribe()
    }
}

#[derive(Debug, Serialize)]
struct StudentRow {
    display_id: String,
    id: String,
    name: String,
    classes: String,
}

async fn student_rows(store: &Store) -> Result<Vec<StudentRow>, Error> {
    let (students, classes) = tokio::try_join!(store.get_students(), store.get_classes())?;
    let class_names: HashMap<&str, &str> = classes.iter()
        .map(|c| (c.id.as_str(), c.name.as_str()))
        .collect();

    let rows = students.into_iter().map(|s| {
        let mut names: Vec<&str> = Vec::new();
        for ct in s.class_teachers.iter() {
            if let Some(&name) = class_names.get(ct.class_id.as_str()) {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }

        StudentRow {
            display_id: if s.student_id.is_empty() { s.id.clone() } else { s.student_id },
            name: if s.name.is_empty() { "—".to_owned() } else { s.name },
            classes: if names.is_empty() { "—".to_owned() } else { names.join(", ") },
            id: s.id,
        }
    }).collect();

    Ok(rows)
}

/**
Fill the element at `selector` with one table row per student.

Does nothing if the page has no such element.
*/
pub async fn render_students_table(store: &Store, page: &Page, selector: &str) {
    log::trace!("render_students_table( [ Store ], {:?}, {:?} ) called.", page, selector);

    if !page.has_element(selector).await {
        return;
    }
    page.set_html(selector, status_row("Loading...", false)).await;

    let html = match student_rows(store).await {
        Ok(rows) if rows.is_empty() => status_row("No students found", false),
        Ok(rows) => match render_template("student_rows", &json!({ "rows": rows })) {
            Ok(html) => html,
            Err(_) => status_row("Error loading students", true),
        },
        Err(e) => {
            log::error!("Error loading students table: {}", &e);
            status_row("Error loading students", true)
        },
    };

    page.set_html(selector, html).await;
}

/// Dashboard counters.
#[derive(Clone, Debug, PartialEq)]
pub struct DashboardStats {
    pub students: usize,
    /// Payment entries across every fee record.
    pub receipts: usize,
    pub classes: usize,
    /// Students per class name. A student counts once toward each distinct
    /// class they are associated with.
    pub per_class: BTreeMap<String, usize>,
}

impl DashboardStats {
    pub fn chart(&self) -> Chart {
        Chart {
            kind: "bar".to_owned(),
            data: ChartData {
                labels: self.per_class.keys().cloned().collect(),
                datasets: vec![Dataset {
                    label: CHART_LABEL.to_owned(),
                    data: self.per_class.values().copied().collect(),
                    background_color: CHART_COLOR.to_owned(),
                }],
            },
            options: ChartOptions { responsive: true },
        }
    }
}

pub async fn dashboard_stats(store: &Store) -> Result<DashboardStats, Error> {
    log::trace!("dashboard_stats( [ Store ] ) called.");

    let (students, fees, classes) = tokio::try_join!(
        store.get_students(),
        store.all_fee_records(),
        store.get_classes()
    )?;

    let class_names: HashMap<&str, &str> = classes.iter()
        .map(|c| (c.id.as_str(), c.name.as_str()))
        .collect();

    let mut per_class: BTreeMap<String, usize> = BTreeMap::new();
    for s in students.iter() {
        let names: BTreeSet<&str> = s.class_teachers.iter()
            .filter_map(|ct| class_names.get(ct.class_id.as_str()).copied())
            .collect();
        if names.is_empty() {
            *per_class.entry(UNKNOWN_CLASS.to_owned()).or_default() += 1;
        }
        for name in names.into_iter() {
            *per_class.entry(name.to_owned()).or_default() += 1;
        }
    }

    Ok(DashboardStats {
        students: students.len(),
        receipts: fees.iter().map(|f| f.payments.len()).sum(),
        classes: classes.len(),
        per_class,
    })
}

/// Fill `#totalStudents`, `#totalReceipts`, `#activeClasses`, and the
/// `#dashboardChart` bar chart. Missing targets are skipped.
pub async fn render_dashboard_stats(store: &Store, page: &Page) {
    log::trace!("render_dashboard_stats( [ Store ], {:?} ) called.", page);

    match dashboard_stats(store).await {
        Ok(stats) => {
            page.set_text("#totalStudents", stats.students.to_string()).await;
            page.set_text("#totalReceipts", stats.receipts.to_string()).await;
            page.set_text("#activeClasses", stats.classes.to_string()).await;
            page.set_chart("#dashboardChart", stats.chart()).await;
        },
        Err(e) => {
            log::error!("Error loading dashboard stats: {}", &e);
            for sel in ["#totalStudents", "#totalReceipts", "#activeClasses"] {
                page.set_text(sel, "Error".to_owned()).await;
            }
        },
    }
}

pub async fn show_modal(page: &Page, msg: &str) {
    page.set_text("#modalText", msg.to_owned()).await;
    page.remove_class("#modal", "hidden").await;
}

pub async fn close_modal(page: &Page) {
    page.add_class("#modal", "hidden").await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{tests::mem_store, DbError, Doc, Docs, Modifier, Query, Store};
    use crate::student::{ClassTeacher, NewStudent};
    use crate::tests::ensure_logging;

    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::Value;
    use time::macros::date;

    /// A backend where everything fails.
    struct Broken;

    #[async_trait]
    impl Docs for Broken {
        async fn get(&self, _: &str, _: &str) -> Result<Option<Value>, DbError> {
            Err(DbError::from("backend down".to_owned()))
        }
        async fn add(&self, _: &str, _: Value) -> Result<String, DbError> {
            Err(DbError::from("backend down".to_owned()))
        }
        async fn set(&self, _: &str, _: &str, _: Value) -> Result<(), DbError> {
            Err(DbError::from("backend down".to_owned()))
        }
        async fn update(&self, _: &str, _: &str, _: Value) -> Result<(), DbError> {
            Err(DbError::from("backend down".to_owned()))
        }
        async fn modify(&self, _: &str, _: &str, _: Modifier) -> Result<bool, DbError> {
            Err(DbError::from("backend down".to_owned()))
        }
        async fn delete(&self, _: &str, _: &str) -> Result<(), DbError> {
            Err(DbError::from("backend down".to_owned()))
        }
        async fn query(&self, _: &Query) -> Result<Vec<Doc>, DbError> {
            Err(DbError::from("backend down".to_owned()))
        }
    }

    async fn populated() -> Store {
        let db = mem_store();
        let math = db.create_class("Mathematics", "JSS1").await.unwrap();
        let art = db.create_class("Art", "JSS1").await.unwrap();

        for (name, sid, classes) in [
            ("Ada", "S-1", vec![math.as_str(), art.as_str(), math.as_str()]),
            ("<Bo>", "", vec![art.as_str()]),
            ("Cy", "S-3", vec![]),
        ] {
            let id = db.create_student(NewStudent {
                name: name.to_owned(),
                student_id: sid.to_owned(),
                class_teachers: Some(
                    classes.iter().map(|c| ClassTeacher::new("t1", c)).collect()
                ),
                ..Default::default()
            }).await.unwrap();
            let fee = db.create_fee_record(&id, 100.0, "").await.unwrap();
            db.add_payment(&fee, 10.0, date!(2024-01-01), "").await.unwrap();
        }

        db
    }

    #[tokio::test]
    async fn students_table() {
        ensure_logging();
        let db = populated().await;
        let page = Page::with_elements("students.html", &["#studentsBody"]);

        render_students_table(&db, &page, "#studentsBody").await;
        let html = page.element("#studentsBody").await.unwrap().html;

        assert_eq!(html.matches("<tr").count(), 3);
        assert!(html.contains(r#"<td class="p-3">S-1</td>"#));
        assert!(html.contains("Mathematics, Art"));
        assert!(html.contains("&lt;Bo&gt;"));
        assert!(!html.contains("<Bo>"));
        assert!(html.contains("—"));
        assert!(html.contains("student-profile.html?id="));
        // Ordered by name.
        assert!(html.find("&lt;Bo&gt;").unwrap() < html.find("Ada").unwrap());
    }

    #[tokio::test]
    async fn students_table_states() {
        ensure_logging();

        let page = Page::with_elements("students.html", &["tbody"]);
        render_students_table(&mem_store(), &page, "tbody").await;
        assert!(page.element("tbody").await.unwrap().html.contains("No students found"));

        render_students_table(&Store::new(Arc::new(Broken)), &page, "tbody").await;
        let html = page.element("tbody").await.unwrap().html;
        assert!(html.contains("Error loading students"));
        assert!(html.contains("text-red-600"));

        // No target, no problem.
        render_students_table(&mem_store(), &page, "#nothere").await;
        assert!(!page.has_element("#nothere").await);
    }

    #[tokio::test]
    async fn dashboard() {
        ensure_logging();
        let db = populated().await;
        let page = Page::with_elements("index.html", &[
            "#totalStudents", "#totalReceipts", "#activeClasses", "#dashboardChart",
        ]);

        render_dashboard_stats(&db, &page).await;
        assert_eq!(page.element("#totalStudents").await.unwrap().text, "3");
        assert_eq!(page.element("#totalReceipts").await.unwrap().text, "3");
        assert_eq!(page.element("#activeClasses").await.unwrap().text, "2");

        let chart = page.element("#dashboardChart").await.unwrap().chart.unwrap();
        assert_eq!(chart.data.labels, vec!["Art", "Mathematics", "Unknown"]);
        assert_eq!(chart.data.datasets[0].data, vec![2, 1, 1]);
        assert_eq!(
            serde_json::to_value(&chart).unwrap(),
            json!({
                "type": "bar",
                "data": {
                    "labels": ["Art", "Mathematics", "Unknown"],
                    "datasets": [{
                        "label": "Students per Class",
                        "data": [2, 1, 1],
                        "backgroundColor": "#dc2626",
                    }],
                },
                "options": { "responsive": true },
            })
        );
    }

    #[tokio::test]
    async fn dashboard_errors() {
        ensure_logging();
        let page = Page::with_elements("index.html", &["#totalStudents", "#activeClasses"]);

        render_dashboard_stats(&Store::new(Arc::new(Broken)), &page).await;
        assert_eq!(page.element("#totalStudents").await.unwrap().text, "Error");
        assert_eq!(page.element("#activeClasses").await.unwrap().text, "Error");
        assert!(page.element("#totalReceipts").await.is_none());
    }

    #[tokio::test]
    async fn modal() {
        ensure_logging();
        let page = Page::with_elements("index.html", &["#modal", "#modalText"]);
        page.add_class("#modal", "hidden").await;
        page.add_class("#modal", "fixed").await;

        show_modal(&page, "Saved.").await;
        assert_eq!(page.element("#modalText").await.unwrap().text, "Saved.");
        let modal = page.element("#modal").await.unwrap();
        assert!(!modal.classes.contains("hidden"));
        assert!(modal.classes.contains("fixed"));

        close_modal(&page).await;
        assert!(page.element("#modal").await.unwrap().classes.contains("hidden"));
    }

    #[tokio::test]
    async fn elements_added_later_get_rendered() {
        ensure_logging();
        let store = populated().await;
        let page = Page::new("students.html");

        render_students_table(&store, &page, "#studentsTable").await;
        assert!(!page.has_element("#studentsTable").await);

        page.add_element("#studentsTable").await;
        render_students_table(&store, &page, "#studentsTable").await;
        let html = page.element("#studentsTable").await.unwrap().html;
        assert!(html.contains("<tr"));

        // Adding it again leaves what's there.
        page.add_element("#studentsTable").await;
        assert_eq!(page.element("#studentsTable").await.unwrap().html, html);
    }

    #[tokio::test]
    async fn redirects_are_watched() {
        let page = Page::new("dashboard.html");
        let mut rx = page.watch_location();
        page.redirect("login.html");
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().as_str(), "login.html");
        assert_eq!(page.location(), "login.html");
        assert_eq!(page.redirect_count(), 1);
    }
}
