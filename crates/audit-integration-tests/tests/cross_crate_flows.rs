//! # Cross-Crate Flows
//!
//! Exercises the testing engine and the state machines together: samples
//! tested in a session feed control submission, control conclusions feed
//! the engagement roll-up, and a locked matrix seeds an engagement.

use audit_core::{Actor, SampleId, Timestamp};
use audit_state::{
    Assertion, ControlError, ControlStatus, Engagement, EngagementControl, EngagementForm,
    EngagementStatus, EngagementType, MatrixForm, MatrixStatus, RiskControlMatrix, RowPatch,
    TrailAction,
};
use audit_testing::{
    check_readiness, Conclusion, ConclusionRule, ControlFullDetail, ControlOverview, InputUpdate,
    PopulationSnapshot, Readiness, RuleKind, RuleLogic, SampleFinalStatus, SampleRecord,
    SnapshotStatus, SystemResult, TestProcedure, TestScript, TestScriptRule, TestingBlocked,
    TestingError, TestingSession,
};
use chrono::NaiveDate;

// =========================================================================
// Fixtures
// =========================================================================

fn now() -> Timestamp {
    Timestamp::parse("2025-10-15T09:00:00Z").expect("fixed timestamp")
}

fn auditor() -> Actor {
    Actor::new("Riya Sharma")
}

fn reviewer() -> Actor {
    Actor::new("Daniel Okafor")
}

fn sid(raw: &str) -> SampleId {
    SampleId::parse(raw).expect("sample id")
}

/// A control with one rule (`approved == true`) and `total` samples, the
/// first `failing` of which are unapproved.
fn approval_detail(code: &str, total: usize, failing: usize) -> ControlFullDetail {
    let samples = (1..=total)
        .map(|i| {
            SampleRecord::new(sid(&format!("{code}-S{i:02}")))
                .with_field("approved", i > failing)
                .with_field("amount", 1000 * i as u64)
        })
        .collect();
    ControlFullDetail {
        overview: ControlOverview {
            control_code: code.to_string(),
            control_name: "Purchase Order Approval".to_string(),
            description: String::new(),
            classification: "Key · Preventive · Manual".to_string(),
            assertions: vec!["Existence".to_string()],
        },
        procedure: TestProcedure::TestScript(TestScript {
            version: "TS-v1.0".to_string(),
            generated_date: "1 Oct 2025".to_string(),
            rules: vec![TestScriptRule {
                id: 1,
                name: "Approved".to_string(),
                description: "PO carries an approval".to_string(),
                kind: RuleKind::Validity,
                logic: RuleLogic::equals("approved", true),
            }],
        }),
        snapshot: Some(PopulationSnapshot {
            snapshot_id: format!("SNAP-{code}"),
            dataset_name: "purchase_orders.csv".to_string(),
            record_count: 1200,
            uploaded_by: "Riya Sharma".to_string(),
            upload_date: "1 Oct 2025".to_string(),
            status: SnapshotStatus::Frozen,
        }),
        samples,
    }
}

/// Open every sample of the session so each resolves from its rule.
fn test_every_sample(session: &mut TestingSession) {
    let ids: Vec<SampleId> = session
        .detail()
        .samples
        .iter()
        .map(|s| s.sample_id.clone())
        .collect();
    for id in &ids {
        session.visit_sample(id).expect("visit sample");
    }
}

/// Plan and start a control against its detail.
fn start(control: &mut EngagementControl, detail: &ControlFullDetail) {
    control.plan(&auditor(), now()).expect("plan");
    let readiness = check_readiness(Some(detail), false);
    control
        .start_testing(readiness, &auditor(), now())
        .expect("start testing");
}

/// Test every sample, submit and approve.
fn conclude(control: &mut EngagementControl, detail: ControlFullDetail) -> Conclusion {
    start(control, &detail);
    let mut session = TestingSession::new(detail);
    test_every_sample(&mut session);
    let summary = session.summary();
    control
        .submit_for_review(&summary, ConclusionRule::DeficiencyRate, &auditor(), now())
        .expect("submit");
    session.lock();
    control
        .approve(ConclusionRule::DeficiencyRate, &reviewer(), now())
        .expect("approve")
}

fn internal_audit(name: &str) -> Engagement {
    let form = EngagementForm {
        name: name.to_string(),
        engagement_type: Some(EngagementType::InternalAudit),
        period_start: NaiveDate::from_ymd_opt(2025, 1, 1),
        period_end: NaiveDate::from_ymd_opt(2025, 12, 31),
        linked_matrix: None,
        lead_partner: "A. Mehta".to_string(),
        description: String::new(),
    };
    Engagement::create(form, &[], &[], &auditor(), now()).expect("valid form")
}

// =========================================================================
// Engagement roll-up over tested controls
// =========================================================================

#[test]
fn mixed_controls_roll_up_to_in_progress_with_one_deficiency() {
    let mut engagement = internal_audit("FY25 Procurement Review");
    assert_eq!(engagement.status(), EngagementStatus::NotStarted);

    let effective = EngagementControl::new("PO-01", "PO approval", "Existence", true, now());
    let ineffective = EngagementControl::new("PO-02", "PO matching", "Accuracy", true, now());
    let in_testing = EngagementControl::new("PO-03", "Vendor master", "Completeness", false, now());
    let ids = [effective.id, ineffective.id, in_testing.id];
    for control in [effective, ineffective, in_testing] {
        engagement.add_control(control).expect("open engagement");
    }
    assert_eq!(engagement.status(), EngagementStatus::NotStarted);

    // 1 of 10 failed: exactly on the boundary, still effective
    let first = engagement.control_mut(ids[0]).expect("control");
    assert_eq!(conclude(first, approval_detail("PO-01", 10, 1)), Conclusion::Effective);

    // 2 of 10 failed
    let second = engagement.control_mut(ids[1]).expect("control");
    assert_eq!(conclude(second, approval_detail("PO-02", 10, 2)), Conclusion::Ineffective);
    assert_eq!(second.exceptions, 2);
    assert_eq!(second.samples_tested.to_string(), "10/10");

    let third = engagement.control_mut(ids[2]).expect("control");
    start(third, &approval_detail("PO-03", 5, 0));

    assert_eq!(engagement.status(), EngagementStatus::InProgress);
    assert_eq!(engagement.total_deficiencies(), 1);
}

#[test]
fn pending_review_takes_precedence_over_concluded() {
    let mut engagement = internal_audit("FY25 Treasury Review");
    let done = EngagementControl::new("TR-01", "Bank reconciliation", "Existence", true, now());
    let review = EngagementControl::new("TR-02", "Payment release", "Accuracy", true, now());
    let (done_id, review_id) = (done.id, review.id);
    engagement.add_control(done).expect("open");
    engagement.add_control(review).expect("open");

    conclude(
        engagement.control_mut(done_id).expect("control"),
        approval_detail("TR-01", 4, 0),
    );
    // concluded mixed with not started is not closed
    assert_eq!(engagement.status(), EngagementStatus::InProgress);

    let detail = approval_detail("TR-02", 4, 0);
    let control = engagement.control_mut(review_id).expect("control");
    start(control, &detail);
    let mut session = TestingSession::new(detail);
    test_every_sample(&mut session);
    control
        .submit_for_review(&session.summary(), ConclusionRule::DeficiencyRate, &auditor(), now())
        .expect("submit");

    assert_eq!(engagement.status(), EngagementStatus::UnderReview);
}

#[test]
fn close_and_reopen_preserve_stored_statuses() {
    let mut engagement = internal_audit("FY25 Payroll Review");
    let control = EngagementControl::new("PY-01", "Payroll approval", "Accuracy", true, now());
    let id = control.id;
    engagement.add_control(control).expect("open");
    start(engagement.control_mut(id).expect("control"), &approval_detail("PY-01", 3, 0));

    engagement.close(&reviewer(), now()).expect("close");
    assert_eq!(engagement.status(), EngagementStatus::Closed);
    let shown = engagement.display_controls();
    assert_eq!(shown[0].status, ControlStatus::Concluded);
    assert_eq!(shown[0].conclusion, Some(Conclusion::Effective));
    assert!(engagement.control_mut(id).is_err());

    engagement.reopen().expect("reopen");
    assert_eq!(engagement.status(), EngagementStatus::InProgress);
    assert_eq!(engagement.controls[0].status, ControlStatus::InTesting);
    assert_eq!(engagement.controls[0].conclusion, None);
}

// =========================================================================
// Session ↔ control lifecycle
// =========================================================================

#[test]
fn submit_is_refused_until_every_sample_is_tested() {
    let detail = approval_detail("AP-01", 3, 0);
    let mut control = EngagementControl::new("AP-01", "Invoice approval", "Existence", true, now());
    start(&mut control, &detail);

    let mut session = TestingSession::new(detail);
    session.visit_sample(&sid("AP-01-S01")).expect("visit");
    let err = control
        .submit_for_review(&session.summary(), ConclusionRule::DeficiencyRate, &auditor(), now())
        .unwrap_err();
    assert!(matches!(err, ControlError::NotAllSamplesTested { remaining: 2 }));
    assert_eq!(control.status, ControlStatus::InTesting);
    assert!(control.submission.is_none());
}

#[test]
fn submit_then_reject_restores_testing_and_records_reason() {
    let detail = approval_detail("AP-02", 2, 0);
    let mut control = EngagementControl::new("AP-02", "Three-way match", "Accuracy", true, now());
    start(&mut control, &detail);

    let mut session = TestingSession::new(detail);
    test_every_sample(&mut session);
    control
        .submit_for_review(&session.summary(), ConclusionRule::DeficiencyRate, &auditor(), now())
        .expect("submit");
    session.lock();
    assert!(matches!(
        session.visit_sample(&sid("AP-02-S01")),
        Err(TestingError::SessionLocked { .. })
    ));

    control
        .reject("Evidence for S02 is illegible", &reviewer(), now())
        .expect("reject");
    session.unlock();

    assert_eq!(control.status, ControlStatus::InTesting);
    assert_eq!(control.conclusion, None);
    let latest = &control.audit_trail[0];
    assert_eq!(latest.action, TrailAction::Rejected);
    assert_eq!(latest.details.as_deref(), Some("Evidence for S02 is illegible"));

    // the auditor can rework the sample and resubmit
    session
        .record_input(&sid("AP-02-S02"), 1, InputUpdate::override_with(SystemResult::Fail))
        .expect("unlocked");
    assert_eq!(
        session.sample_status(&sid("AP-02-S02")).expect("known"),
        SampleFinalStatus::Fail
    );
    let conclusion = control
        .submit_for_review(&session.summary(), ConclusionRule::DeficiencyRate, &auditor(), now())
        .expect("resubmit");
    assert_eq!(conclusion, Conclusion::Ineffective);
}

#[test]
fn final_decision_drives_the_submitted_exception_count() {
    let detail = approval_detail("AP-03", 10, 0);
    let mut control = EngagementControl::new("AP-03", "Vendor approval", "Existence", true, now());
    start(&mut control, &detail);

    let mut session = TestingSession::new(detail);
    test_every_sample(&mut session);
    session
        .set_final_decision(&sid("AP-03-S04"), SystemResult::Fail)
        .expect("decision");

    let conclusion = control
        .submit_for_review(&session.summary(), ConclusionRule::ZeroTolerance, &auditor(), now())
        .expect("submit");
    assert_eq!(conclusion, Conclusion::Ineffective);
    assert_eq!(control.exceptions, 1);

    let approved = control
        .approve(ConclusionRule::DeficiencyRate, &reviewer(), now())
        .expect("approve");
    assert_eq!(approved, Conclusion::Effective);
    assert_eq!(control.status, ControlStatus::Concluded);
}

#[test]
fn unfrozen_population_blocks_testing() {
    let mut detail = approval_detail("GL-01", 2, 0);
    if let Some(snapshot) = detail.snapshot.as_mut() {
        snapshot.status = SnapshotStatus::Active;
    }
    let mut control = EngagementControl::new("GL-01", "Journal review", "Accuracy", true, now());
    control.plan(&auditor(), now()).expect("plan");

    let readiness = check_readiness(Some(&detail), false);
    assert_eq!(readiness, Readiness::Blocked(TestingBlocked::PopulationNotFrozen));
    assert!(control.start_testing(readiness, &auditor(), now()).is_err());
    assert_eq!(control.status, ControlStatus::Planning);

    // an ad-hoc upload clears the gate
    let readiness = check_readiness(Some(&detail), true);
    control
        .start_testing(readiness, &auditor(), now())
        .expect("ready after upload");
    assert_eq!(control.status, ControlStatus::InTesting);
}

// =========================================================================
// Matrix → engagement
// =========================================================================

fn row(risk: &str, control: &str, key: bool) -> RowPatch {
    RowPatch {
        risk_id: Some(risk.to_string()),
        risk_description: Some(format!("Risk {risk}")),
        assertion: Some(Some(Assertion::Existence)),
        control_name: Some(control.to_string()),
        control_description: Some(format!("{control} is performed")),
        is_key_control: Some(key),
    }
}

fn sox_matrix() -> RiskControlMatrix {
    let form = MatrixForm {
        name: "FY25 SOX RACM".to_string(),
        owner: "Riya Sharma".to_string(),
        framework: "SOX".to_string(),
        financial_year: "FY25".to_string(),
    };
    RiskControlMatrix::create(form, &[], now()).expect("valid matrix form")
}

#[test]
fn locked_matrix_seeds_a_planned_sox_engagement() {
    let mut matrix = sox_matrix();
    matrix.add_row(row("R-1", "PO approval", true), now()).expect("draft");
    matrix.add_row(row("R-1", "PO matching", false), now()).expect("draft");
    matrix.add_row(row("R-2", "Vendor review", true), now()).expect("draft");

    let report = matrix.validate(now()).expect("unlocked");
    assert!(report.is_valid());
    assert_eq!(matrix.status, MatrixStatus::Validated);
    matrix.lock(now()).expect("validated");

    let form = EngagementForm {
        name: "FY25 SOX Audit".to_string(),
        engagement_type: Some(EngagementType::Sox),
        period_start: NaiveDate::from_ymd_opt(2025, 4, 1),
        period_end: NaiveDate::from_ymd_opt(2026, 3, 31),
        linked_matrix: Some(matrix.id),
        lead_partner: "A. Mehta".to_string(),
        description: String::new(),
    };
    let engagement =
        Engagement::create(form, &[], std::slice::from_ref(&matrix), &auditor(), now()).expect("eligible");

    let codes: Vec<&str> = engagement.controls.iter().map(|c| c.control_code.as_str()).collect();
    assert_eq!(codes, ["R-1-C01", "R-1-C02", "R-2-C03"]);
    assert!(engagement.controls.iter().all(|c| c.status == ControlStatus::Planning));
    assert_eq!(engagement.status(), EngagementStatus::Planning);
    assert_eq!(engagement.period, "Q2 2025");
}

#[test]
fn invalid_matrix_cannot_be_locked_or_linked() {
    let mut matrix = sox_matrix();
    matrix.add_row(row("R-1", "PO approval", false), now()).expect("draft");
    matrix.add_row(row("R-1", "PO matching", false), now()).expect("draft");

    let report = matrix.validate(now()).expect("unlocked");
    assert!(!report.is_valid());
    assert!(report.is_row_invalid(1) && report.is_row_invalid(2));
    assert_eq!(report.global.len(), 1);
    assert!(report.global[0].contains("R-1"));
    assert_eq!(matrix.status, MatrixStatus::Draft);
    assert!(matrix.lock(now()).is_err());

    let form = EngagementForm {
        name: "FY25 SOX Audit".to_string(),
        engagement_type: Some(EngagementType::Sox),
        period_start: NaiveDate::from_ymd_opt(2025, 4, 1),
        period_end: NaiveDate::from_ymd_opt(2026, 3, 31),
        linked_matrix: Some(matrix.id),
        ..EngagementForm::default()
    };
    let errors = Engagement::create(form, &[], std::slice::from_ref(&matrix), &auditor(), now())
        .unwrap_err();
    assert!(errors.fields.contains_key("linked_matrix"));
}

// =========================================================================
// CLI ↔ session agreement
// =========================================================================

#[test]
fn cli_evaluation_matches_session_summary() {
    let detail = approval_detail("EX-01", 5, 2);

    let mut session = TestingSession::new(detail.clone());
    test_every_sample(&mut session);
    let from_session = session.summary();

    let inputs: audit_cli::testing::InputsDocument = serde_json::from_value(serde_json::json!({
        "inputs": {
            "EX-01-S01": {}, "EX-01-S02": {}, "EX-01-S03": {}, "EX-01-S04": {}, "EX-01-S05": {}
        }
    }))
    .expect("inputs document");
    let evaluation = audit_cli::testing::evaluate(&detail, inputs, ConclusionRule::DeficiencyRate);

    assert_eq!(evaluation.summary, from_session);
    assert_eq!(evaluation.summary.failed, 2);
    assert_eq!(evaluation.conclusion, Some(Conclusion::Ineffective));
}
