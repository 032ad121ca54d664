use rusqlite::Connection;
use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_schoold");
    let mut child = Command::new(exe)
        .env_remove("SCHOOLD_WORKSPACE")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn schoold");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown error")
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn error_code(value: &serde_json::Value) -> &str {
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .unwrap_or("")
}

fn str_field(value: &serde_json::Value, key: &str) -> String {
    value
        .get(key)
        .and_then(|v| v.as_str())
        .unwrap_or_else(|| panic!("missing {}", key))
        .to_string()
}

fn super_admin() -> serde_json::Value {
    json!({ "role": "super_admin", "userId": "root" })
}

fn admin(school_id: &str) -> serde_json::Value {
    json!({ "role": "school_admin", "schoolId": school_id, "userId": "admin-1" })
}

#[allow(dead_code)]
struct Seed {
    school_id: String,
    class_id: String,
    student_id: String,
    subject_ids: Vec<String>,
    year: serde_json::Value,
}

/// One school with a class, an enrolled student, the given subjects and a
/// current 2025-2026 year.
fn seed(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    workspace: &Path,
    subjects: &[(&str, &str, bool)],
) -> Seed {
    request_ok(
        stdin,
        reader,
        "seed-ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let school = request_ok(
        stdin,
        reader,
        "seed-school",
        "schools.create",
        json!({ "caller": super_admin(), "schoolName": "Riverside Academy" }),
    );
    let school_id = str_field(&school, "id");
    let class = request_ok(
        stdin,
        reader,
        "seed-class",
        "classes.create",
        json!({ "caller": admin(&school_id), "className": "Grade 7A" }),
    );
    let class_id = str_field(&class, "id");
    let student = request_ok(
        stdin,
        reader,
        "seed-student",
        "students.create",
        json!({
            "caller": admin(&school_id),
            "studentNumber": "STU-001",
            "firstName": "Ada",
            "lastName": "Okafor"
        }),
    );
    let student_id = str_field(&student, "id");
    request_ok(
        stdin,
        reader,
        "seed-enroll",
        "students.enroll",
        json!({ "caller": admin(&school_id), "studentId": student_id, "classId": class_id }),
    );

    let mut subject_ids = Vec::new();
    for (i, (name, code, core)) in subjects.iter().enumerate() {
        let subject = request_ok(
            stdin,
            reader,
            &format!("seed-subject-{i}"),
            "subjects.create",
            json!({
                "caller": admin(&school_id),
                "subjectName": name,
                "subjectCode": code,
                "isCore": core
            }),
        );
        let subject_id = str_field(&subject, "id");
        request_ok(
            stdin,
            reader,
            &format!("seed-assign-{i}"),
            "classes.assignSubject",
            json!({
                "caller": admin(&school_id),
                "classId": class_id,
                "subjectId": subject_id,
                "teacherId": "teacher-1"
            }),
        );
        subject_ids.push(subject_id);
    }

    let year = request_ok(
        stdin,
        reader,
        "seed-year",
        "calendar.years.create",
        json!({
            "caller": admin(&school_id),
            "yearName": "2025-2026",
            "startDate": "2025-09-01",
            "endDate": "2026-06-30",
            "makeCurrent": true
        }),
    );

    Seed {
        school_id,
        class_id,
        student_id,
        subject_ids,
        year,
    }
}

fn open_db(workspace: &Path) -> Connection {
    let db = Connection::open(workspace.join("school.sqlite3")).expect("open db");
    db.busy_timeout(Duration::from_secs(2)).expect("busy timeout");
    db
}

fn current_flags(db: &Connection, school_id: &str) -> (Vec<String>, i64) {
    let mut stmt = db
        .prepare("SELECT year_name FROM academic_years WHERE school_id = ? AND is_current = 1")
        .expect("prepare");
    let years = stmt
        .query_map([school_id], |r| r.get::<_, String>(0))
        .expect("query")
        .collect::<Result<Vec<_>, _>>()
        .expect("rows");
    let semesters: i64 = db
        .query_row(
            "SELECT COUNT(*) FROM semesters WHERE school_id = ? AND is_current = 1",
            [school_id],
            |r| r.get(0),
        )
        .expect("count");
    (years, semesters)
}

#[test]
fn academic_year_is_split_into_semesters_and_periods() {
    let workspace = temp_dir("schoold-calendar-split");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let s = seed(&mut stdin, &mut reader, &workspace, &[]);

    let semesters = s.year["semesters"].as_array().expect("semesters");
    assert_eq!(semesters.len(), 2);
    assert_eq!(semesters[0]["startDate"], "2025-09-01");
    assert_eq!(semesters[0]["endDate"], "2026-01-30");
    assert_eq!(semesters[1]["startDate"], "2026-01-31");
    assert_eq!(semesters[1]["endDate"], "2026-06-30");
    assert_eq!(s.year["isCurrent"], true);
    assert_eq!(semesters[0]["isCurrent"], true);
    assert_eq!(semesters[1]["isCurrent"], false);

    let mut names = Vec::new();
    for semester in semesters {
        let periods = semester["periods"].as_array().expect("periods");
        assert_eq!(periods.len(), 4);
        let weight: f64 = periods
            .iter()
            .map(|p| p["weightPercentage"].as_f64().expect("weight"))
            .sum();
        assert_eq!(weight, 100.0);
        assert_eq!(periods[3]["endDate"], semester["endDate"]);
        assert_eq!(periods[3]["periodType"], "exam");
        let numbers: Vec<i64> = periods
            .iter()
            .map(|p| p["periodNumber"].as_i64().expect("number"))
            .collect();
        assert_eq!(numbers, vec![1, 2, 3, 4]);
        names.extend(periods.iter().map(|p| p["periodName"].as_str().expect("name").to_string()));
    }
    assert_eq!(
        names,
        vec![
            "1st Period",
            "2nd Period",
            "3rd Period",
            "Semester 1 Exam",
            "4th Period",
            "5th Period",
            "6th Period",
            "Semester 2 Exam"
        ]
    );

    let dup = request(
        &mut stdin,
        &mut reader,
        "1",
        "calendar.years.create",
        json!({
            "caller": admin(&s.school_id),
            "yearName": "2025-2026",
            "startDate": "2025-09-01",
            "endDate": "2026-06-30"
        }),
    );
    assert_eq!(error_code(&dup), "conflict");
    assert_eq!(dup["error"]["details"]["status"], 409);

    let backwards = request(
        &mut stdin,
        &mut reader,
        "2",
        "calendar.years.create",
        json!({
            "caller": admin(&s.school_id),
            "yearName": "Backwards",
            "startDate": "2026-06-30",
            "endDate": "2025-09-01"
        }),
    );
    assert_eq!(error_code(&backwards), "bad_params");

    let by_teacher = request(
        &mut stdin,
        &mut reader,
        "3",
        "calendar.years.create",
        json!({
            "caller": { "role": "teacher", "schoolId": s.school_id, "userId": "teacher-1" },
            "yearName": "2026-2027",
            "startDate": "2026-09-01",
            "endDate": "2027-06-30"
        }),
    );
    assert_eq!(error_code(&by_teacher), "forbidden");

    let db = open_db(&workspace);
    let periods: i64 = db
        .query_row("SELECT COUNT(*) FROM assessment_periods", [], |r| r.get(0))
        .expect("count periods");
    assert_eq!(periods, 8);

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn current_year_switch_stays_inside_one_school() {
    let workspace = temp_dir("schoold-calendar-current");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let a = seed(&mut stdin, &mut reader, &workspace, &[]);
    let first_year_id = str_field(&a.year, "id");

    let b = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "schools.create",
        json!({ "caller": super_admin(), "schoolName": "Hillside" }),
    );
    let b_id = str_field(&b, "id");
    request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "calendar.years.create",
        json!({
            "caller": admin(&b_id),
            "yearName": "2025-2026",
            "startDate": "2025-09-01",
            "endDate": "2026-06-30",
            "makeCurrent": true
        }),
    );

    let next = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "calendar.years.create",
        json!({
            "caller": admin(&a.school_id),
            "yearName": "2026-2027",
            "startDate": "2026-09-01",
            "endDate": "2027-06-30",
            "makeCurrent": true
        }),
    );

    let db = open_db(&workspace);
    assert_eq!(current_flags(&db, &a.school_id), (vec!["2026-2027".to_string()], 1));
    assert_eq!(current_flags(&db, &b_id), (vec!["2025-2026".to_string()], 1));

    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "calendar.years.list",
        json!({ "caller": admin(&a.school_id) }),
    );
    let listed = listed.as_array().expect("years");
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0]["yearName"], "2026-2027");
    assert_eq!(listed[0]["semesterCount"], 2);

    request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "calendar.years.setCurrent",
        json!({ "caller": admin(&a.school_id), "academicYearId": first_year_id }),
    );
    assert_eq!(current_flags(&db, &a.school_id), (vec!["2025-2026".to_string()], 1));
    assert_eq!(current_flags(&db, &b_id), (vec!["2025-2026".to_string()], 1));

    let cross = request(
        &mut stdin,
        &mut reader,
        "6",
        "calendar.years.setCurrent",
        json!({ "caller": admin(&b_id), "academicYearId": str_field(&next, "id") }),
    );
    assert_eq!(error_code(&cross), "forbidden");
    assert_eq!(cross["error"]["details"]["status"], 403);

    let missing = request(
        &mut stdin,
        &mut reader,
        "7",
        "calendar.years.open",
        json!({ "caller": admin(&a.school_id), "academicYearId": "no-such-year" }),
    );
    assert_eq!(error_code(&missing), "not_found");
    assert_eq!(missing["error"]["details"]["status"], 404);

    // A semester of a non-current year may be made current; year flags stay as they are.
    let later_semester = next["semesters"][1]["id"].as_str().expect("semester id").to_string();
    let semester = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "calendar.semesters.setCurrent",
        json!({ "caller": admin(&a.school_id), "semesterId": later_semester }),
    );
    assert_eq!(semester["isCurrent"], true);
    assert_eq!(current_flags(&db, &a.school_id), (vec!["2025-2026".to_string()], 1));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn grading_config_reads_defaults_and_saves_partial_updates() {
    let workspace = temp_dir("schoold-grading-config");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let s = seed(&mut stdin, &mut reader, &workspace, &[]);
    let teacher = json!({ "role": "teacher", "schoolId": s.school_id, "userId": "teacher-1" });

    let defaults = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "calendar.gradingConfig.get",
        json!({ "caller": teacher }),
    );
    assert_eq!(defaults["schoolId"], s.school_id.as_str());
    assert_eq!(defaults["passMark"], 70.0);
    assert_eq!(defaults["useCustomWeights"], false);
    assert_eq!(defaults["periodWeight"], 25.0);
    assert_eq!(defaults["examWeight"], 25.0);
    assert_eq!(defaults["semesterCalculation"], "average");
    assert_eq!(defaults["yearCalculation"], "average");
    assert!(defaults["updatedAt"].is_null());

    let by_teacher = request(
        &mut stdin,
        &mut reader,
        "2",
        "calendar.gradingConfig.update",
        json!({ "caller": teacher, "passMark": 50.0 }),
    );
    assert_eq!(error_code(&by_teacher), "forbidden");

    let empty = request(
        &mut stdin,
        &mut reader,
        "3",
        "calendar.gradingConfig.update",
        json!({ "caller": admin(&s.school_id) }),
    );
    assert_eq!(error_code(&empty), "bad_params");
    assert_eq!(empty["error"]["message"], "No fields to update");

    let saved = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "calendar.gradingConfig.update",
        json!({ "caller": admin(&s.school_id), "passMark": 65.0, "examWeight": 40.0 }),
    );
    assert_eq!(saved["passMark"], 65.0);
    assert_eq!(saved["examWeight"], 40.0);
    assert_eq!(saved["periodWeight"], 25.0);
    assert!(saved["updatedAt"].is_string());

    request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "calendar.gradingConfig.update",
        json!({ "caller": admin(&s.school_id), "useCustomWeights": true }),
    );
    let reread = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "calendar.gradingConfig.get",
        json!({ "caller": super_admin(), "schoolId": s.school_id }),
    );
    assert_eq!(reread["passMark"], 65.0);
    assert_eq!(reread["examWeight"], 40.0);
    assert_eq!(reread["useCustomWeights"], true);

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
