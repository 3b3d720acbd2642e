use jump_harness::fuzzy::FuzzyLabel;
use jump_harness::thresholds::ThresholdSet;
use jump_harness::verify::{
    render_report_markdown, render_trace, synthesize_trace, CheckedField, FailureKind,
    FailurePolicy, FieldValue, ParseError, RecordFailure, SyntheticTraceSpec, TraceSchema,
    TraitField, VerificationReport, Verifier, VerifyError, VerifyOptions,
};

const SHARED_TRACE: &str = "\
a 0.75 0.05 0.5 :HI :VLO 0.4 0.4 0.9 True
b 0.2 0.4 0.3 :LO :MID 0.20000000000000007 0.0 0.9 false
c 0.8 0.6 0.45 :VHI :HI 0.5 0.04999999999999999 0.9 TRUE
d 0.0 0.99 0.7 :VLO :VHI 0.09999999999999998 0.19999999999999996 0.9 true
";

const INDIVIDUAL_TRACE: &str = "\
e 0.3 0.1 0.6 :LO :VLO -0.39999999999999997 0.5 False
f 0.45 0.25 0.15 :MID :LO -0.14999999999999997 -0.05000000000000002 false
g 0.85 0.85 0.55 :VHI :VHI 0.44999999999999996 0.050000000000000044 true
";

fn verifier(policy: FailurePolicy) -> Verifier {
    Verifier::new(
        ThresholdSet::canonical(),
        VerifyOptions {
            policy,
            parallelism: 1,
        },
    )
}

fn verify(policy: FailurePolicy, trace: &str) -> VerificationReport {
    verifier(policy).verify_str(trace).unwrap()
}

#[test]
fn consistent_shared_baseline_trace_passes() {
    let report = verify(FailurePolicy::CollectAll, SHARED_TRACE);
    assert!(report.is_success(), "{}", render_report_markdown(&report));
    assert_eq!(report.summary.records_checked, 4);
    assert_eq!(report.summary.shared_baseline_records, 4);
    assert_eq!(report.summary.common_cooperation, Some(0.9));
    assert_eq!(report.summary.halted_at, None);
}

#[test]
fn consistent_individual_trace_uses_own_cooperation_as_baseline() {
    let report = verify(FailurePolicy::CollectAll, INDIVIDUAL_TRACE);
    assert!(report.is_success(), "{}", render_report_markdown(&report));
    assert_eq!(report.summary.individual_records, 3);
    assert_eq!(report.summary.common_cooperation, None);
    assert!(report
        .outcomes
        .iter()
        .all(|o| o.schema == Some(TraceSchema::Individual)));
}

#[test]
fn mixed_schemas_are_resolved_per_line() {
    let trace = format!("{SHARED_TRACE}{INDIVIDUAL_TRACE}");
    let report = verify(FailurePolicy::CollectAll, &trace);
    assert!(report.is_success());
    assert_eq!(report.summary.shared_baseline_records, 4);
    assert_eq!(report.summary.individual_records, 3);
}

#[test]
fn wrong_jump_is_a_single_mismatch_on_jumped() {
    let report = verify(
        FailurePolicy::CollectAll,
        "a 0.75 0.05 0.5 :HI :VLO 0.4 0.4 0.9 False\n",
    );
    assert!(!report.is_success());
    assert_eq!(report.summary.mismatches, 1);
    assert_eq!(report.summary.mismatches_by_field.get("jumped"), Some(&1));

    let outcome = &report.outcomes[0];
    assert_eq!(outcome.id.as_deref(), Some("a"));
    assert_eq!(outcome.failures.len(), 1);
    let mismatch = outcome.failures[0].as_mismatch().unwrap();
    assert_eq!(mismatch.field, CheckedField::Jumped);
    assert_eq!(mismatch.expected, FieldValue::Flag(true));
    assert_eq!(mismatch.actual, FieldValue::Flag(false));
}

#[test]
fn unknown_label_is_a_parse_error_and_later_lines_still_verify() {
    let trace = format!("x 0.3 0.1 0.6 :XHI :VLO -0.39999999999999997 0.5 False\n{INDIVIDUAL_TRACE}");
    let report = verify(FailurePolicy::CollectAll, &trace);

    assert_eq!(report.summary.records_checked, 4);
    assert_eq!(report.summary.parse_errors, 1);
    assert_eq!(report.summary.mismatches, 0);
    assert_eq!(report.summary.records_passed, 3);

    let first = &report.outcomes[0];
    assert!(!first.passed);
    assert_eq!(first.id.as_deref(), Some("x"));
    assert_eq!(
        first.failures[0],
        RecordFailure::Parse(ParseError::Label {
            field: "cooperation_label",
            raw: ":XHI".to_string()
        })
    );
    assert!(report.outcomes[1..].iter().all(|o| o.passed));
}

#[test]
fn desire_mismatch_reports_expected_actual_and_delta() {
    let report = verify(
        FailurePolicy::CollectAll,
        "a 0.75 0.05 0.5 :HI :VLO 0.41 0.4 0.9 True\n",
    );
    let failures = &report.outcomes[0].failures;
    assert_eq!(failures.len(), 1);
    let mismatch = failures[0].as_mismatch().unwrap();
    assert_eq!(mismatch.field, CheckedField::CooperationDesire);
    assert_eq!(mismatch.expected, FieldValue::Number(0.4));
    assert_eq!(mismatch.actual, FieldValue::Number(0.41));
    assert_eq!(mismatch.delta, Some(0.41 - 0.4));
}

#[test]
fn tiny_float_divergence_is_still_a_mismatch() {
    // 0.20000000000000007 is what the subtraction yields; 0.2 is one rounding off.
    let report = verify(
        FailurePolicy::CollectAll,
        "b 0.2 0.4 0.3 :LO :MID 0.2 0.0 0.9 false\n",
    );
    assert_eq!(report.summary.mismatches, 1);
    assert_eq!(
        report.summary.mismatches_by_field.get("cooperation_desire"),
        Some(&1)
    );
}

#[test]
fn wrong_label_is_reported_with_both_labels() {
    let report = verify(
        FailurePolicy::CollectAll,
        "a 0.75 0.05 0.5 :HI :LO 0.4 0.3 0.9 True\n",
    );
    let failures = &report.outcomes[0].failures;
    assert_eq!(failures.len(), 1);
    let mismatch = failures[0].as_mismatch().unwrap();
    assert_eq!(mismatch.field, CheckedField::AggressionLabel);
    assert_eq!(mismatch.expected, FieldValue::Label(FuzzyLabel::VeryLow));
    assert_eq!(mismatch.actual, FieldValue::Label(FuzzyLabel::Low));
}

#[test]
fn out_of_range_trait_is_a_range_error_isolated_to_its_record() {
    let trace = format!("r 0.75 1.2 0.5 :HI :VHI 0.4 0.0 0.9 false\n{SHARED_TRACE}");
    let report = verify(FailurePolicy::CollectAll, &trace);

    assert_eq!(report.summary.range_errors, 1);
    assert_eq!(report.summary.records_failed, 1);
    assert_eq!(
        report.outcomes[0].failures,
        vec![RecordFailure::Range {
            field: TraitField::Aggression,
            value: 1.2
        }]
    );
    assert!(report.outcomes[1..].iter().all(|o| o.passed));
}

#[test]
fn drifting_common_cooperation_is_reported() {
    let trace = "\
a 0.75 0.05 0.5 :HI :VLO 0.4 0.4 0.9 True
b 0.2 0.4 0.3 :LO :MID 0.20000000000000007 0.0 0.8 false
";
    let report = verify(FailurePolicy::CollectAll, trace);
    assert_eq!(report.summary.common_cooperation, Some(0.9));
    let failures = &report.outcomes[1].failures;
    assert_eq!(failures.len(), 1);
    let mismatch = failures[0].as_mismatch().unwrap();
    assert_eq!(mismatch.field, CheckedField::CommonCooperation);
    assert_eq!(mismatch.expected, FieldValue::Number(0.9));
    assert_eq!(mismatch.actual, FieldValue::Number(0.8));
}

#[test]
fn duplicate_identifier_is_a_parse_error() {
    let trace = "\
a 0.75 0.05 0.5 :HI :VLO 0.4 0.4 0.9 True
a 0.75 0.05 0.5 :HI :VLO 0.4 0.4 0.9 True
";
    let report = verify(FailurePolicy::CollectAll, trace);
    assert_eq!(
        report.outcomes[1].failures,
        vec![RecordFailure::Parse(ParseError::DuplicateId {
            id: "a".to_string(),
            first_line: 1
        })]
    );
}

#[test]
fn blank_lines_are_skipped_but_counted_for_line_numbers() {
    let trace = "\n\na 0.75 0.05 0.5 :HI :VLO 0.4 0.4 0.9 False\n   \n";
    let report = verify(FailurePolicy::CollectAll, trace);
    assert_eq!(report.summary.records_checked, 1);
    assert_eq!(report.outcomes[0].line, 3);
}

#[test]
fn wrong_field_count_is_a_parse_error() {
    let report = verify(FailurePolicy::CollectAll, "a 0.75 0.05 0.5 :HI :VLO 0.4\n");
    assert_eq!(
        report.outcomes[0].failures,
        vec![RecordFailure::Parse(ParseError::FieldCount { found: 7 })]
    );
}

#[test]
fn fail_fast_stops_at_first_failing_record() {
    let trace = format!(
        "{SHARED_TRACE}z 0.75 0.05 0.5 :LO :LO 0.1 0.1 0.9 False\ny 0.75 0.05 0.5 :HI :VLO 0.4 0.4 0.9 False\n"
    );
    let report = verify(FailurePolicy::FailFast, &trace);
    assert_eq!(report.summary.halted_at, Some(5));
    assert_eq!(report.summary.records_checked, 5);
    assert_eq!(report.summary.records_failed, 1);
    // Only the first failure of the halting record is kept.
    assert_eq!(report.outcomes[4].failures.len(), 1);
    assert_eq!(
        report.outcomes[4].failures[0].as_mismatch().unwrap().field,
        CheckedField::CooperationLabel
    );

    let all = verify(FailurePolicy::CollectAll, &trace);
    assert_eq!(all.summary.records_failed, 2);
    assert!(all.outcomes[4].failures.len() > 1);
}

#[test]
fn fail_fast_also_halts_on_parse_errors() {
    let trace = format!("bad line\n{SHARED_TRACE}");
    let report = verify(FailurePolicy::FailFast, &trace);
    assert_eq!(report.summary.halted_at, Some(1));
    assert_eq!(report.summary.records_checked, 1);
    assert_eq!(report.outcomes[0].failures[0].kind(), FailureKind::Parse);
}

#[test]
fn into_result_raises_for_failing_reports() {
    let ok = verify(FailurePolicy::CollectAll, SHARED_TRACE);
    assert!(ok.into_result().is_ok());

    let bad = verify(
        FailurePolicy::CollectAll,
        &format!("{SHARED_TRACE}a2 0.75 0.05 0.5 :HI :VLO 0.4 0.4 0.9 False\n"),
    );
    match bad.into_result() {
        Err(VerifyError::Failed {
            failed,
            first_line,
            report,
        }) => {
            assert_eq!(failed, 1);
            assert_eq!(first_line, 5);
            assert_eq!(report.summary.mismatches, 1);
        }
        other => panic!("expected Failed, got {other:?}"),
    }
}

#[test]
fn generated_traces_verify_cleanly_for_both_schemas_and_tables() {
    for thresholds in [ThresholdSet::canonical(), ThresholdSet::inverted_will_to_live()] {
        for schema in [TraceSchema::Individual, TraceSchema::SharedBaseline] {
            let spec = SyntheticTraceSpec {
                agents: 500,
                schema,
                seed: 7,
                common_cooperation: None,
            };
            let records = synthesize_trace(&spec, &thresholds).unwrap();
            let trace = render_trace(&records);
            let report = Verifier::new(thresholds.clone(), VerifyOptions::default())
                .verify_str(&trace)
                .unwrap();
            assert!(
                report.is_success(),
                "{} / {:?}: {}",
                thresholds.name,
                schema,
                render_report_markdown(&report)
            );
            assert_eq!(report.summary.records_checked, 500);
        }
    }
}

#[test]
fn wrong_table_polarity_is_detected() {
    let spec = SyntheticTraceSpec {
        agents: 200,
        schema: TraceSchema::SharedBaseline,
        seed: 11,
        common_cooperation: Some(0.9),
    };
    let records = synthesize_trace(&spec, &ThresholdSet::inverted_will_to_live()).unwrap();
    let report = verify(FailurePolicy::CollectAll, &render_trace(&records));
    assert!(!report.is_success());
    assert!(report
        .summary
        .mismatches_by_field
        .contains_key("will_to_live_desire"));
    assert!(!report
        .summary
        .mismatches_by_field
        .contains_key("cooperation_desire"));
}

fn corrupted_trace() -> String {
    let spec = SyntheticTraceSpec {
        agents: 300,
        schema: TraceSchema::SharedBaseline,
        seed: 3,
        common_cooperation: None,
    };
    let mut records = synthesize_trace(&spec, &ThresholdSet::canonical()).unwrap();
    records[40].jumped = !records[40].jumped;
    records[121].will_to_live_desire += 1e-9;
    records[250].cooperation_desire = -records[250].cooperation_desire - 1.0;
    let mut lines: Vec<String> = records.iter().map(|r| r.to_line()).collect();
    lines[77] = "p77 0.1 nope 0.2 :VLO :LO 0 0 0.5 false".to_string();
    lines.join("\n") + "\n"
}

#[test]
fn partitioned_collect_all_matches_sequential() {
    let trace = corrupted_trace();
    let sequential = verify(FailurePolicy::CollectAll, &trace);
    let partitioned = Verifier::new(
        ThresholdSet::canonical(),
        VerifyOptions {
            policy: FailurePolicy::CollectAll,
            parallelism: 4,
        },
    )
    .verify_str(&trace)
    .unwrap();

    assert!(sequential.summary.records_failed >= 4);
    assert_eq!(sequential.trace_hash, partitioned.trace_hash);
    assert_eq!(
        serde_json::to_value(&sequential.outcomes).unwrap(),
        serde_json::to_value(&partitioned.outcomes).unwrap()
    );
    assert_eq!(
        serde_json::to_value(&sequential.summary).unwrap(),
        serde_json::to_value(&partitioned.summary).unwrap()
    );
}

#[test]
fn partitioned_fail_fast_reports_first_failure_in_file_order() {
    let trace = corrupted_trace();
    let sequential = verify(FailurePolicy::FailFast, &trace);
    for parallelism in [2, 3, 8] {
        let partitioned = Verifier::new(
            ThresholdSet::canonical(),
            VerifyOptions {
                policy: FailurePolicy::FailFast,
                parallelism,
            },
        )
        .verify_str(&trace)
        .unwrap();
        assert_eq!(sequential.summary.halted_at, Some(41));
        assert_eq!(partitioned.summary.halted_at, Some(41));
        assert_eq!(sequential.trace_hash, partitioned.trace_hash);
        assert_eq!(
            serde_json::to_value(&sequential.outcomes).unwrap(),
            serde_json::to_value(&partitioned.outcomes).unwrap()
        );
        assert_eq!(
            serde_json::to_value(&sequential.summary).unwrap(),
            serde_json::to_value(&partitioned.summary).unwrap()
        );
    }
}

#[test]
fn partitioned_fail_fast_ignores_lines_after_the_halt() {
    let halt_line = "e 0.3 0.1 0.6 :LO :VLO -0.39999999999999997 0.5 True\n";
    let trace = format!("{halt_line}a 0.75 0.05 0.5 :HI :VLO 0.4 0.4 0.9 True\n");
    let sequential = verify(FailurePolicy::FailFast, &trace);
    assert_eq!(sequential.summary.halted_at, Some(1));
    assert_eq!(sequential.summary.common_cooperation, None);
    assert_eq!(
        sequential.trace_hash,
        blake3::hash(halt_line.as_bytes()).to_hex().to_string()
    );

    for parallelism in [2, 4] {
        let partitioned = Verifier::new(
            ThresholdSet::canonical(),
            VerifyOptions {
                policy: FailurePolicy::FailFast,
                parallelism,
            },
        )
        .verify_str(&trace)
        .unwrap();
        assert_eq!(partitioned.summary.halted_at, Some(1));
        assert_eq!(partitioned.summary.common_cooperation, None);
        assert_eq!(partitioned.trace_hash, sequential.trace_hash);
    }
}

#[test]
fn markdown_report_lists_failures() {
    let report = verify(
        FailurePolicy::CollectAll,
        &format!("{SHARED_TRACE}q 0.75 0.05 0.5 :HI :VLO 0.4 0.4 0.9 False\n"),
    );
    let md = render_report_markdown(&report);
    assert!(md.starts_with("# Trace Verification Report"));
    assert!(md.contains("FAIL: 5 records, 4 passed, 1 failed"));
    assert!(md.contains("- `jumped`: 1"));
    assert!(md.contains("line 5 (`q`)"));
    assert!(md.contains("name=canonical"));
}
